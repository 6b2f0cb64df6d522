use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Utf8Bom,
    Windows1252,
    Latin1,
}

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
    #[error("empty input")]
    Empty,
}

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Decodes a raw statement buffer into text.
///
/// UTF-8 (with or without BOM) is taken at face value. Invalid UTF-8 falls
/// back to Windows-1252 when any byte sits in `0x80..=0x9F` (a range only
/// Windows-1252 assigns), otherwise to Latin-1. The order matters: Latin-1
/// accepts every byte sequence, so it can only ever be the last resort.
pub fn decode_bytes(input: &[u8]) -> Result<(String, Encoding), DecodeError> {
    if input.is_empty() {
        return Err(DecodeError::Empty);
    }

    if let Some(rest) = input.strip_prefix(UTF8_BOM) {
        let (text, _, _) = encoding_rs::UTF_8.decode(rest);
        return Ok((normalize_line_endings(&text), Encoding::Utf8Bom));
    }

    if let Ok(text) = std::str::from_utf8(input) {
        return Ok((normalize_line_endings(text), Encoding::Utf8));
    }

    if input.iter().any(|&b| (0x80..=0x9F).contains(&b)) {
        let (text, _, _) = encoding_rs::WINDOWS_1252.decode(input);
        return Ok((normalize_line_endings(&text), Encoding::Windows1252));
    }

    // Latin-1 maps every byte directly onto the same code point.
    let text: String = input.iter().map(|&b| b as char).collect();
    Ok((normalize_line_endings(&text), Encoding::Latin1))
}

pub fn normalize_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_utf8() {
        let (text, enc) = decode_bytes("Buchungstag;Betrag\n".as_bytes()).unwrap();
        assert_eq!(enc, Encoding::Utf8);
        assert_eq!(text, "Buchungstag;Betrag\n");
    }

    #[test]
    fn utf8_bom_is_stripped() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("Datum".as_bytes());
        let (text, enc) = decode_bytes(&bytes).unwrap();
        assert_eq!(enc, Encoding::Utf8Bom);
        assert_eq!(text, "Datum");
    }

    #[test]
    fn windows_1252_euro_sign() {
        // 0x80 is € in Windows-1252 and unassigned in Latin-1.
        let bytes = b"Betrag \x80\n";
        let (text, enc) = decode_bytes(bytes).unwrap();
        assert_eq!(enc, Encoding::Windows1252);
        assert!(text.contains('€'));
    }

    #[test]
    fn latin1_umlauts() {
        // "Empfänger" in ISO-8859-1: ä = 0xE4, no 0x80..0x9F bytes present.
        let bytes = b"Empf\xE4nger";
        let (text, enc) = decode_bytes(bytes).unwrap();
        assert_eq!(enc, Encoding::Latin1);
        assert_eq!(text, "Empfänger");
    }

    #[test]
    fn line_endings_are_normalized() {
        let (text, _) = decode_bytes(b"a\r\nb\rc\n").unwrap();
        assert_eq!(text, "a\nb\nc\n");
    }

    #[test]
    fn empty_input_errors() {
        assert_eq!(decode_bytes(b"").unwrap_err(), DecodeError::Empty);
    }
}

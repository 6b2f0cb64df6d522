use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MoneyError {
    #[error("amount missing")]
    Missing,
    #[error("invalid amount \"{0}\"")]
    Invalid(String),
}

/// Parses a German-locale amount string to signed minor units.
///
/// Accepts a leading or trailing minus, accounting parentheses, a `EUR`/`€`
/// suffix, thousands dots and a decimal comma. `"1.234,56"` → `123456`,
/// `"66,99-"` → `-6699`, `"(12,00)"` → `-1200`.
///
/// Rounds to the nearest cent instead of truncating; float-style parsing of
/// `"12,34"` may otherwise land on `1233`.
pub fn parse_euro_amount(raw: &str) -> Result<i64, MoneyError> {
    let mut value = raw.trim().to_string();
    if value.is_empty() {
        return Err(MoneyError::Missing);
    }

    let mut negative = false;
    if value.starts_with('(') && value.ends_with(')') {
        negative = true;
        value = value[1..value.len() - 1].trim().to_string();
    }
    if let Some(stripped) = value.strip_suffix('-') {
        negative = true;
        value = stripped.to_string();
    }

    let upper = value.to_uppercase();
    if let Some(stripped) = upper.strip_suffix("EUR") {
        value = stripped.to_string();
    } else if let Some(stripped) = value.strip_suffix('€') {
        value = stripped.to_string();
    }

    // Whitespace includes the non-breaking space some exports pad with.
    value.retain(|c| !c.is_whitespace());
    if let Some(stripped) = value.strip_prefix('-') {
        negative = true;
        value = stripped.to_string();
    }

    let value = value.replace('.', "").replace(',', ".");
    if value.is_empty() {
        return Err(MoneyError::Missing);
    }

    let dec =
        Decimal::from_str(&value).map_err(|_| MoneyError::Invalid(raw.trim().to_string()))?;
    let cents = (dec * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| MoneyError::Invalid(raw.trim().to_string()))?;

    Ok(if negative { -cents.abs() } else { cents })
}

/// Formats minor units back into the German statement representation,
/// `-1234567` → `"-12.345,67"`.
pub fn format_euro_cents(cents: i64) -> String {
    let negative = cents < 0;
    let abs = cents.unsigned_abs();
    let whole = abs / 100;
    let frac = abs % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(c);
    }

    format!("{}{},{:02}", if negative { "-" } else { "" }, grouped, frac)
}

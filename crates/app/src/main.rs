use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "kontoflow", about = "Kontoauszüge importieren, kategorisieren und abgleichen")]
struct Cli {
    /// Pfad zur SQLite-Datenbank. Standard: Datenverzeichnis des Benutzers.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// CSV- oder CAMT-Datei einlesen und Buchungen übernehmen
    Import {
        file: PathBuf,
        /// Bankprofil vorgeben (comdirect, sparkasse, dkb, ing, generic_de)
        #[arg(long)]
        bank: Option<String>,
    },
    /// PayPal- und Bankbuchungen als interne Umbuchungen verknüpfen
    Reconcile,
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("de", "kontoflow", "Kontoflow")
        .context("Kein Datenverzeichnis ermittelbar")?;
    let data_dir = dirs.data_dir().to_path_buf();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Datenverzeichnis nicht anlegbar: {}", data_dir.display()))?;
    Ok(data_dir.join("kontoflow.db"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    let db = kontoflow_storage::create_db(&db_path)
        .await
        .with_context(|| format!("Datenbank nicht nutzbar: {}", db_path.display()))?;

    match cli.command {
        Command::Import { file, bank } => commands::run_import(&db, &file, bank.as_deref()).await,
        Command::Reconcile => commands::run_reconcile(&db).await,
    }
}

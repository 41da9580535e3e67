pub mod init;
pub mod report;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Result;
use crate::importer::load_transactions;
use crate::models::Transaction;
use crate::settings::{shellexpand_path, Settings};

/// Resolve the data file and sheet from flags, falling back to settings.
pub(crate) fn load_source(
    settings: &Settings,
    file: Option<&str>,
    sheet: Option<&str>,
) -> Result<Vec<Transaction>> {
    let path = PathBuf::from(shellexpand_path(file.unwrap_or(&settings.data_file)));
    let sheet = sheet.or(settings.sheet.as_deref());
    load_transactions(&path, sheet)
}

#[derive(Parser)]
#[command(name = "txreport", about = "Monthly reports over a bank transaction export.")]
pub struct Cli {
    /// Transaction export (XLSX or CSV); defaults to the configured data file
    #[arg(long, global = true)]
    pub file: Option<String>,
    /// Worksheet name inside an XLSX export (default: first sheet)
    #[arg(long, global = true)]
    pub sheet: Option<String>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save default data file and rounding step.
    Init {
        /// Path to the transaction export
        #[arg(long = "data-file")]
        data_file: Option<String>,
        /// Default round-up step in rubles
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Spend per category for one month.
    Categories {
        /// Month: YYYY-MM
        #[arg(long)]
        month: String,
        /// Show a table instead of JSON
        #[arg(long)]
        table: bool,
    },
    /// Savings from rounding every outflow up to the next step.
    RoundUp {
        /// Month: YYYY-MM
        #[arg(long)]
        month: String,
        /// Rounding step in rubles (default from settings)
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Find transactions whose description or category contains a query.
    Search {
        /// Text to look for (case-insensitive)
        query: String,
    },
    /// Transactions mentioning a +7 phone number.
    Phones,
    /// Transfers to private persons, reduced to the recipient's name.
    Transfers,
    /// Run every report.
    All {
        /// Month: YYYY-MM
        #[arg(long)]
        month: String,
        /// Search query; the search report is skipped without one
        #[arg(long)]
        query: Option<String>,
        /// Rounding step in rubles (default from settings)
        #[arg(long)]
        limit: Option<i64>,
    },
}

mod cli;
mod error;
mod fmt;
mod importer;
mod models;
mod reports;
mod settings;

use clap::Parser;
use env_logger::Env;

use cli::report::Source;
use cli::{Cli, Commands};

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let source = Source {
        settings: settings::load_settings(),
        file: cli.file.as_deref(),
        sheet: cli.sheet.as_deref(),
    };

    let result = match cli.command {
        Commands::Init { data_file, limit } => cli::init::run(data_file, limit),
        Commands::Categories { month, table } => cli::report::categories(&source, &month, table),
        Commands::RoundUp { month, limit } => cli::report::round_up(&source, &month, limit),
        Commands::Search { query } => cli::report::search(&source, &query),
        Commands::Phones => cli::report::phones(&source),
        Commands::Transfers => cli::report::transfers(&source),
        Commands::All {
            month,
            query,
            limit,
        } => cli::report::all(&source, &month, query.as_deref(), limit),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::load_source;
use crate::error::{Result, TxError};
use crate::fmt::{rubles, to_json};
use crate::models::Transaction;
use crate::reports::{self, CategorySpend, RoundUp};
use crate::settings::Settings;

/// Flags shared by every report command.
pub struct Source<'a> {
    pub settings: Settings,
    pub file: Option<&'a str>,
    pub sheet: Option<&'a str>,
}

impl Source<'_> {
    fn load(&self) -> Result<Vec<Transaction>> {
        load_source(&self.settings, self.file, self.sheet)
    }

    fn limit(&self, limit: Option<i64>) -> i64 {
        limit.unwrap_or(self.settings.round_up_limit)
    }
}

fn category_text(month: &str, transactions: &[Transaction], table: bool) -> Result<String> {
    let (year, m) = reports::parse_month_token(month)?;
    let spend = reports::category_spend(transactions, year, m)?;
    if table {
        Ok(category_table(&spend))
    } else {
        to_json(&spend)
    }
}

fn category_table(spend: &CategorySpend) -> String {
    if spend.is_empty() {
        return "No spending in this month.".to_string();
    }
    let mut table = Table::new();
    table.set_header(vec!["Category", "Spent"]);
    for (name, total) in spend.iter() {
        table.add_row(vec![Cell::new(name), Cell::new(rubles(total))]);
    }
    let total: f64 = spend.iter().map(|(_, t)| t).sum();
    table.add_row(vec![Cell::new("Total".bold()), Cell::new(rubles(total))]);
    table.to_string()
}

fn round_up_text(month: &str, transactions: &[Transaction], limit: i64) -> Result<String> {
    let RoundUp { total, skipped } = reports::round_up_savings(month, transactions, limit)?;
    for row in &skipped {
        eprintln!("Skipped record #{}: {}", row.row, row.reason);
    }
    Ok(format!("Round-up savings: {}", rubles(total)))
}

pub fn categories(source: &Source, month: &str, table: bool) -> Result<()> {
    let transactions = source.load()?;
    println!("{}", category_text(month, &transactions, table)?);
    Ok(())
}

pub fn round_up(source: &Source, month: &str, limit: Option<i64>) -> Result<()> {
    let transactions = source.load()?;
    println!("{}", round_up_text(month, &transactions, source.limit(limit))?);
    Ok(())
}

pub fn search(source: &Source, query: &str) -> Result<()> {
    let transactions = source.load()?;
    println!("{}", to_json(&reports::search(&transactions, query))?);
    Ok(())
}

pub fn phones(source: &Source) -> Result<()> {
    let transactions = source.load()?;
    println!("{}", to_json(&reports::phone_transactions(&transactions))?);
    Ok(())
}

pub fn transfers(source: &Source) -> Result<()> {
    let transactions = source.load()?;
    println!("{}", to_json(&reports::person_transfers(&transactions))?);
    Ok(())
}

/// Run every report over one load of the data file. A failing report is
/// reported and the rest still run.
pub fn all(source: &Source, month: &str, query: Option<&str>, limit: Option<i64>) -> Result<()> {
    let transactions = source.load()?;
    let limit = source.limit(limit);

    let search = match query {
        Some(q) => to_json(&reports::search(&transactions, q)),
        None => Err(TxError::InvalidArgument("no --query given".to_string())),
    };

    let sections: Vec<(String, Result<String>)> = vec![
        (
            format!("Category spend for {month}"),
            category_text(month, &transactions, false),
        ),
        (
            format!("Round-up savings for {month}, step {limit}"),
            round_up_text(month, &transactions, limit),
        ),
        (format!("Search for {:?}", query.unwrap_or("")), search),
        (
            "Transactions with phone numbers".to_string(),
            to_json(&reports::phone_transactions(&transactions)),
        ),
        (
            "Transfers to private persons".to_string(),
            to_json(&reports::person_transfers(&transactions)),
        ),
    ];

    for (title, result) in sections {
        println!("\n{}", title.cyan().bold());
        match result {
            Ok(content) => println!("{content}"),
            Err(e) => eprintln!("Skipping {title}: {e}"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Transaction> {
        vec![
            Transaction::new("01.12.2021 14:01:01", Some("Супермаркеты"), Some("Магнит"), -99.0),
            Transaction::new("02.12.2021 15:01:01", Some("Переводы"), Some("Дмитрий Ш."), -101.0),
        ]
    }

    #[test]
    fn test_category_text_json() {
        let text = category_text("2021-12", &sample(), false).unwrap();
        assert_eq!(text, "{\n  \"Супермаркеты\": 99.0,\n  \"Переводы\": 101.0\n}");
    }

    #[test]
    fn test_category_table_lists_totals() {
        let text = category_text("2021-12", &sample(), true).unwrap();
        assert!(text.contains("Супермаркеты"));
        assert!(text.contains("99.00 ₽"));
        assert!(text.contains("200.00 ₽"));
    }

    #[test]
    fn test_round_up_text() {
        let text = round_up_text("2021-12", &sample(), 50).unwrap();
        assert_eq!(text, "Round-up savings: 50.00 ₽");
    }

    #[test]
    fn test_round_up_text_propagates_bad_limit() {
        assert!(matches!(
            round_up_text("2021-12", &sample(), 0),
            Err(TxError::InvalidArgument(_))
        ));
    }
}

use std::collections::HashMap;
use std::fmt;

use chrono::{Datelike, NaiveDateTime};
use lazy_static::lazy_static;
use log::{debug, error, info, warn};
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{Result, TxError};
use crate::models::Transaction;

// ---------------------------------------------------------------------------
// Month helpers
// ---------------------------------------------------------------------------

fn validate_month(month: u32) -> Result<()> {
    if (1..=12).contains(&month) {
        Ok(())
    } else {
        Err(TxError::InvalidArgument(format!("month must be 1-12, got {month}")))
    }
}

/// Parse a `YYYY-MM` token into year and month.
pub fn parse_month_token(token: &str) -> Result<(i32, u32)> {
    let invalid = || TxError::InvalidArgument(format!("expected YYYY-MM, got {token:?}"));
    let (y, m) = token.trim().split_once('-').ok_or_else(invalid)?;
    let year: i32 = y.parse().map_err(|_| invalid())?;
    let month: u32 = m.parse().map_err(|_| invalid())?;
    validate_month(month)?;
    Ok((year, month))
}

fn in_month(date: &NaiveDateTime, year: i32, month: u32) -> bool {
    date.year() == year && date.month() == month
}

// ---------------------------------------------------------------------------
// Category spend
// ---------------------------------------------------------------------------

/// Absolute spend per category, in the order categories were first seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategorySpend {
    totals: Vec<(String, f64)>,
}

impl CategorySpend {
    fn add(&mut self, index: &mut HashMap<String, usize>, category: &str, amount: f64) {
        match index.get(category) {
            Some(&i) => self.totals[i].1 += amount,
            None => {
                index.insert(category.to_string(), self.totals.len());
                self.totals.push((category.to_string(), amount));
            }
        }
    }

    #[cfg(test)]
    pub fn get(&self, category: &str) -> Option<f64> {
        self.totals
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, total)| *total)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.totals.iter().map(|(name, total)| (name.as_str(), *total))
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

impl Serialize for CategorySpend {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.totals.len()))?;
        for (name, total) in &self.totals {
            map.serialize_entry(name, total)?;
        }
        map.end()
    }
}

/// Sum `abs(amount)` per category for one calendar month.
///
/// Every record's date must parse, and every record inside the month must
/// carry a numeric amount; the first violation aborts the report.
pub fn category_spend(transactions: &[Transaction], year: i32, month: u32) -> Result<CategorySpend> {
    info!("Category spend for {year}-{month:02}");
    let result = collect_category_spend(transactions, year, month);
    match &result {
        Ok(spend) => debug!("{} categories", spend.len()),
        Err(e) => error!("Category spend failed: {e}"),
    }
    result
}

fn collect_category_spend(
    transactions: &[Transaction],
    year: i32,
    month: u32,
) -> Result<CategorySpend> {
    validate_month(month)?;

    let mut in_target = Vec::new();
    for txn in transactions {
        if in_month(&txn.parsed_date()?, year, month) {
            in_target.push(txn);
        }
    }
    debug!("{} transactions in {year}-{month:02}", in_target.len());

    let mut spend = CategorySpend::default();
    let mut index = HashMap::new();
    for txn in in_target {
        let amount = txn.amount_value()?.abs();
        spend.add(&mut index, txn.category_or_default(), amount);
    }
    Ok(spend)
}

// ---------------------------------------------------------------------------
// Round-up savings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    InvalidDate(String),
    InvalidAmount(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDate(raw) => write!(f, "invalid operation date {raw:?}"),
            Self::InvalidAmount(raw) => write!(f, "non-numeric amount {raw}"),
        }
    }
}

/// A record left out of a resilient report. `row` is its position in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundUp {
    /// Total in rubles, rounded to kopecks.
    pub total: f64,
    pub skipped: Vec<SkippedRow>,
}

/// Amounts are rounded to whole kopecks first; sub-kopeck fractions are dropped.
fn to_kopecks(rubles: f64) -> i64 {
    (rubles * 100.0).round() as i64
}

fn round_up_kopecks(kopecks: i64, step: i64) -> i64 {
    (step - kopecks % step) % step
}

/// How much would go to savings in `month` if every outflow were rounded up
/// to the next multiple of `limit` rubles.
///
/// Rows with an unparseable date or amount are skipped and reported in
/// [`RoundUp::skipped`] instead of failing the calculation.
pub fn round_up_savings(month: &str, transactions: &[Transaction], limit: i64) -> Result<RoundUp> {
    info!("Round-up savings for {month} with step {limit}");
    if limit <= 0 {
        return Err(TxError::InvalidArgument(format!("rounding limit must be positive, got {limit}")));
    }
    let step = limit
        .checked_mul(100)
        .ok_or_else(|| TxError::InvalidArgument(format!("rounding limit too large: {limit}")))?;
    let (year, month_num) = parse_month_token(month)?;

    let mut skipped = Vec::new();
    let mut outflows = Vec::new();
    for (row, txn) in transactions.iter().enumerate() {
        let Ok(date) = txn.parsed_date() else {
            let reason = SkipReason::InvalidDate(txn.operation_date.clone());
            warn!("Skipping row {row}: {reason}");
            skipped.push(SkippedRow { row, reason });
            continue;
        };
        if !in_month(&date, year, month_num) {
            continue;
        }
        let Some(amount) = txn.amount.value() else {
            let reason = SkipReason::InvalidAmount(txn.amount.to_string());
            warn!("Skipping row {row}: {reason}");
            skipped.push(SkippedRow { row, reason });
            continue;
        };
        if amount < 0.0 {
            outflows.push(to_kopecks(amount.abs()));
        }
    }
    debug!("{} outflows in {month}", outflows.len());

    let total_kopecks = outflows
        .iter()
        .try_fold(0_i64, |acc, &k| acc.checked_add(round_up_kopecks(k, step)))
        .ok_or_else(|| {
            TxError::InvalidArgument(format!("round-up total overflows with step {limit}"))
        })?;
    let total = total_kopecks as f64 / 100.0;
    info!("Round-up total: {total:.2}");
    Ok(RoundUp { total, skipped })
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Case-insensitive substring search over description and category.
pub fn search(transactions: &[Transaction], query: &str) -> Vec<Transaction> {
    info!("Searching for {query:?}");
    let needle = query.to_lowercase();
    let found: Vec<Transaction> = transactions
        .iter()
        .filter(|t| {
            t.description_text().to_lowercase().contains(&needle)
                || t.category_text().to_lowercase().contains(&needle)
        })
        .cloned()
        .collect();
    debug!("{} matches", found.len());
    found
}

// ---------------------------------------------------------------------------
// Phone numbers
// ---------------------------------------------------------------------------

lazy_static! {
    // +7, area code with optional parentheses, then 3(or 2)-2-2 digit groups
    static ref PHONE_REGEX: Regex =
        Regex::new(r"\+7[\s\-]?\(?\d{3}\)?[\s\-]?\d{2,3}[\s\-]?\d{2}[\s\-]?\d{2}").unwrap();
}

pub fn has_phone_number(text: &str) -> bool {
    PHONE_REGEX.is_match(text)
}

/// Records whose description mentions a +7 mobile number.
pub fn phone_transactions(transactions: &[Transaction]) -> Vec<Transaction> {
    info!("Searching for phone numbers");
    let found: Vec<Transaction> = transactions
        .iter()
        .filter(|t| has_phone_number(t.description_text()))
        .cloned()
        .collect();
    debug!("{} transactions with phone numbers", found.len());
    found
}

// ---------------------------------------------------------------------------
// Person-to-person transfers
// ---------------------------------------------------------------------------

const TRANSFER_CATEGORIES: [&str; 4] = [
    "переводы",
    "перевод физическому лицу",
    "transfers",
    "transfer to private person",
];

const CREDIT_CARD_TRANSFER: &str = "Перевод Кредитная";

lazy_static! {
    // "Имя Ф." / "Имя Ф" / "Имя Фамилия"
    static ref PERSON_NAME_REGEX: Regex =
        Regex::new(r"\b\p{Lu}\p{Ll}+(?: \p{Lu}\.|\s+\p{Lu}\p{Ll}+\b| \p{Lu}\b)").unwrap();
}

pub fn find_person_name(text: &str) -> Option<&str> {
    PERSON_NAME_REGEX.find(text).map(|m| m.as_str())
}

fn is_transfer_category(category: &str) -> bool {
    let lowered = category.to_lowercase();
    TRANSFER_CATEGORIES.contains(&lowered.as_str())
}

/// Transfers to private persons, with the description cut down to the
/// recipient's name. Transfers without a recognisable name are dropped.
pub fn person_transfers(transactions: &[Transaction]) -> Vec<Transaction> {
    info!("Searching for person-to-person transfers");
    let mut found = Vec::new();
    for txn in transactions {
        if !is_transfer_category(txn.category_text()) {
            continue;
        }
        let description = txn.description_text();
        if description.contains(CREDIT_CARD_TRANSFER) {
            debug!("Skipping credit card transfer: {description}");
            continue;
        }
        if let Some(name) = find_person_name(description) {
            let mut rewritten = txn.clone();
            rewritten.description = Some(name.to_string());
            found.push(rewritten);
        }
    }
    debug!("{} person transfers", found.len());
    found
}

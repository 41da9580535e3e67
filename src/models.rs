use std::fmt;

use chrono::NaiveDateTime;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, TxError};
use crate::importer::{parse_amount, parse_operation_date};

pub const COL_DATE: &str = "Дата операции";
pub const COL_CATEGORY: &str = "Категория";
pub const COL_AMOUNT: &str = "Сумма операции";
pub const COL_DESCRIPTION: &str = "Описание";

pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Amount cell as it came out of the source file. Spreadsheets hand over
/// numbers, CSV exports hand over text; both are kept as-is so reports can
/// decide how strict to be about malformed values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Amount {
    Number(f64),
    Text(String),
}

impl Amount {
    pub fn value(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Number(_) => None,
            Self::Text(s) => parse_amount(s),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<f64> for Amount {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Amount {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// One row of the bank export. Serializes with the export's own column
/// headers, followed by any columns the reports do not interpret.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    #[serde(rename = "Дата операции")]
    pub operation_date: String,
    #[serde(rename = "Категория", default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "Сумма операции")]
    pub amount: Amount,
    #[serde(rename = "Описание", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Transaction {
    #[cfg(test)]
    pub fn new(
        operation_date: &str,
        category: Option<&str>,
        description: Option<&str>,
        amount: impl Into<Amount>,
    ) -> Self {
        Self {
            operation_date: operation_date.to_string(),
            category: category.map(str::to_string),
            amount: amount.into(),
            description: description.map(str::to_string),
            extra: Map::new(),
        }
    }

    pub fn parsed_date(&self) -> Result<NaiveDateTime> {
        parse_operation_date(&self.operation_date).ok_or_else(|| {
            TxError::Format(format!("invalid operation date {:?}", self.operation_date))
        })
    }

    pub fn amount_value(&self) -> Result<f64> {
        self.amount
            .value()
            .ok_or_else(|| TxError::Format(format!("non-numeric amount {}", self.amount)))
    }

    /// Grouping key for category totals.
    pub fn category_or_default(&self) -> &str {
        self.category.as_deref().unwrap_or(DEFAULT_CATEGORY)
    }

    pub fn category_text(&self) -> &str {
        self.category.as_deref().unwrap_or("")
    }

    pub fn description_text(&self) -> &str {
        self.description.as_deref().unwrap_or("")
    }
}

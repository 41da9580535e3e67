use std::io::Read;
use std::path::Path;

use chrono::NaiveDateTime;
use log::{debug, info};
use serde_json::{Map, Value};

use crate::error::{Result, TxError};
use crate::models::{Amount, Transaction, COL_AMOUNT, COL_CATEGORY, COL_DATE, COL_DESCRIPTION};

pub const DATE_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse a textual amount as found in Russian bank exports: `-1 234,56`,
/// `"-99.00"`, `1\u{a0}000`. Non-finite values are rejected.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s: String = raw
        .trim()
        .trim_matches('"')
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    if s.is_empty() {
        return None;
    }
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_operation_date(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATE_FORMAT).ok()
}

#[cfg(any(feature = "xlsx", test))]
pub fn excel_serial_to_datetime(serial: f64) -> Option<String> {
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let seconds = (serial * 86_400.0).round() as i64;
    let dt = base.checked_add_signed(chrono::Duration::seconds(seconds))?;
    Some(dt.format(DATE_FORMAT).to_string())
}

fn text_value(raw: &str) -> Value {
    let s = raw.trim();
    if s.is_empty() {
        Value::Null
    } else {
        Value::String(s.to_string())
    }
}

/// Pick `;` for exports that use it as the field separator, `,` otherwise.
fn sniff_delimiter(first_line: &str) -> u8 {
    if first_line.matches(';').count() > first_line.matches(',').count() {
        b';'
    } else {
        b','
    }
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

const KNOWN_COLUMNS: [&str; 4] = [COL_DATE, COL_AMOUNT, COL_CATEGORY, COL_DESCRIPTION];

struct Columns {
    headers: Vec<String>,
    date: usize,
    amount: usize,
    category: Option<usize>,
    description: Option<usize>,
}

impl Columns {
    fn locate(headers: Vec<String>) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let date = find(COL_DATE).ok_or_else(|| TxError::MissingColumn(COL_DATE.to_string()))?;
        let amount =
            find(COL_AMOUNT).ok_or_else(|| TxError::MissingColumn(COL_AMOUNT.to_string()))?;
        let category = find(COL_CATEGORY);
        let description = find(COL_DESCRIPTION);
        Ok(Self {
            headers,
            date,
            amount,
            category,
            description,
        })
    }

    /// Build a record from one row of cell values. Fully blank rows yield `None`.
    fn build(&self, mut cells: Vec<Value>) -> Option<Transaction> {
        if cells.iter().all(Value::is_null) {
            return None;
        }
        cells.resize(self.headers.len(), Value::Null);

        let operation_date = match cells[self.date].take() {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let amount = match cells[self.amount].take() {
            Value::Number(n) => n.as_f64().map(Amount::Number).unwrap_or(Amount::Text(n.to_string())),
            Value::String(s) => Amount::Text(s),
            Value::Null => Amount::Text(String::new()),
            other => Amount::Text(other.to_string()),
        };
        let category = self.category.and_then(|i| optional_text(cells[i].take()));
        let description = self.description.and_then(|i| optional_text(cells[i].take()));

        // Known headers and repeated headers keep only their first column.
        let mut extra = Map::new();
        for (header, value) in self.headers.iter().zip(cells) {
            if header.is_empty()
                || KNOWN_COLUMNS.contains(&header.as_str())
                || extra.contains_key(header)
            {
                continue;
            }
            extra.insert(header.clone(), value);
        }

        Some(Transaction {
            operation_date,
            category,
            amount,
            description,
            extra,
        })
    }
}

fn optional_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Source kinds
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceKind {
    Csv,
    #[cfg(feature = "xlsx")]
    Workbook,
}

impl SourceKind {
    pub fn key(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            #[cfg(feature = "xlsx")]
            Self::Workbook => "workbook",
        }
    }

    pub fn extensions(&self) -> &[&str] {
        match self {
            Self::Csv => &["csv"],
            #[cfg(feature = "xlsx")]
            Self::Workbook => &["xlsx", "xlsm", "xls", "ods"],
        }
    }

    pub fn detect(file_path: &Path) -> Option<Self> {
        let ext = file_path.extension()?.to_str()?.to_ascii_lowercase();
        ALL_SOURCES
            .iter()
            .find(|s| s.extensions().contains(&ext.as_str()))
            .copied()
    }

    #[allow(unused_variables)]
    pub fn load(&self, file_path: &Path, sheet: Option<&str>) -> Result<Vec<Transaction>> {
        match self {
            Self::Csv => load_csv(file_path),
            #[cfg(feature = "xlsx")]
            Self::Workbook => load_workbook(file_path, sheet),
        }
    }
}

const ALL_SOURCES: &[SourceKind] = &[
    SourceKind::Csv,
    #[cfg(feature = "xlsx")]
    SourceKind::Workbook,
];

pub fn load_transactions(file_path: &Path, sheet: Option<&str>) -> Result<Vec<Transaction>> {
    let kind = SourceKind::detect(file_path)
        .ok_or_else(|| TxError::UnsupportedFile(file_path.display().to_string()))?;
    info!("Loading transactions from {} ({})", file_path.display(), kind.key());
    let transactions = kind.load(file_path, sheet)?;
    debug!("Loaded {} transactions", transactions.len());
    Ok(transactions)
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

fn load_csv(file_path: &Path) -> Result<Vec<Transaction>> {
    let content = std::fs::read_to_string(file_path)?;
    let first_line = content.lines().next().unwrap_or("");
    read_csv(content.as_bytes(), sniff_delimiter(first_line))
}

pub fn read_csv(reader: impl Read, delimiter: u8) -> Result<Vec<Transaction>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(reader);

    let headers: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();
    let columns = Columns::locate(headers)?;

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let cells = record.iter().map(text_value).collect();
        if let Some(txn) = columns.build(cells) {
            rows.push(txn);
        }
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Workbook (feature-gated)
// ---------------------------------------------------------------------------

#[cfg(feature = "xlsx")]
fn cell_value(cell: &calamine::Data) -> Value {
    use calamine::Data;
    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) => text_value(s),
        Data::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Data::Int(i) => Value::from(*i),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => excel_serial_to_datetime(dt.as_f64())
            .map(Value::String)
            .unwrap_or(Value::Null),
        Data::DateTimeIso(s) | Data::DurationIso(s) => text_value(s),
    }
}

#[cfg(feature = "xlsx")]
fn load_workbook(file_path: &Path, sheet: Option<&str>) -> Result<Vec<Transaction>> {
    use calamine::Reader;

    let mut workbook = calamine::open_workbook_auto(file_path)
        .map_err(|e| TxError::Workbook(format!("Failed to open {}: {e}", file_path.display())))?;

    let range = match sheet {
        Some(name) => workbook
            .worksheet_range(name)
            .map_err(|e| TxError::Workbook(format!("Sheet {name:?}: {e}")))?,
        None => workbook
            .worksheet_range_at(0)
            .ok_or_else(|| TxError::Workbook("Workbook has no sheets".to_string()))?
            .map_err(|e| TxError::Workbook(e.to_string()))?,
    };

    let mut rows_iter = range.rows();
    let headers: Vec<String> = match rows_iter.next() {
        Some(row) => row.iter().map(|c| c.to_string().trim().to_string()).collect(),
        None => return Ok(Vec::new()),
    };
    let columns = Columns::locate(headers)?;

    Ok(rows_iter
        .filter_map(|row| columns.build(row.iter().map(cell_value).collect()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "Дата операции;Номер карты;Сумма операции;Категория;Описание";

    fn write_csv(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("-99.00"), Some(-99.0));
        assert_eq!(parse_amount("\"500.00\""), Some(500.0));
        assert_eq!(parse_amount("  -42,50  "), Some(-42.5));
        assert_eq!(parse_amount("-1 234,56"), Some(-1234.56));
        assert_eq!(parse_amount("1\u{a0}000"), Some(1000.0));
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("not_a_number"), None);
        assert_eq!(parse_amount("NaN"), None);
        assert_eq!(parse_amount("inf"), None);
    }

    #[test]
    fn test_parse_operation_date() {
        let dt = parse_operation_date("31.12.2021 16:44:00").unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2021-12-31 16:44");
        assert!(parse_operation_date("31.12.2021").is_none());
        assert!(parse_operation_date("2021-12-31 16:44:00").is_none());
        assert!(parse_operation_date("30.02.2021 10:00:00").is_none());
    }

    #[test]
    fn test_excel_serial_to_datetime() {
        assert_eq!(excel_serial_to_datetime(45667.0).as_deref(), Some("10.01.2025 00:00:00"));
        assert_eq!(excel_serial_to_datetime(45667.5).as_deref(), Some("10.01.2025 12:00:00"));
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter(HEADER), b';');
        assert_eq!(sniff_delimiter("a,b,c"), b',');
    }

    #[test]
    fn test_read_csv_maps_columns() {
        let body = format!(
            "{HEADER}\n\
             01.12.2021 14:01:01;*7197;-99,00;Супермаркеты;Магнит\n\
             02.12.2021 15:01:01;*7197;-101.00;;\n"
        );
        let rows = read_csv(body.as_bytes(), b';').unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].operation_date, "01.12.2021 14:01:01");
        assert_eq!(rows[0].category.as_deref(), Some("Супермаркеты"));
        assert_eq!(rows[0].description.as_deref(), Some("Магнит"));
        assert_eq!(rows[0].amount.value(), Some(-99.0));
        assert_eq!(rows[0].extra.get("Номер карты"), Some(&Value::from("*7197")));
        assert_eq!(rows[1].category, None);
        assert_eq!(rows[1].description, None);
    }

    #[test]
    fn test_read_csv_ignores_repeated_columns() {
        let body = "Дата операции;Сумма операции;Описание;Описание;MCC;MCC\n\
                    01.12.2021 14:01:01;-1;Магнит;копия;5411;0000\n";
        let rows = read_csv(body.as_bytes(), b';').unwrap();
        assert_eq!(rows[0].description.as_deref(), Some("Магнит"));
        assert!(!rows[0].extra.contains_key(COL_DESCRIPTION));
        assert_eq!(rows[0].extra.get("MCC"), Some(&Value::from("5411")));
        let json = serde_json::to_string(&rows[0]).unwrap();
        assert_eq!(json.matches(COL_DESCRIPTION).count(), 1);
        assert!(!json.contains("копия"));
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_cell_value_conversions() {
        use calamine::{CellErrorType, Data, ExcelDateTime, ExcelDateTimeType};

        let dt = Data::DateTime(ExcelDateTime::new(45667.5, ExcelDateTimeType::DateTime, false));
        assert_eq!(cell_value(&dt), Value::from("10.01.2025 12:00:00"));
        assert_eq!(cell_value(&Data::Float(-99.5)), Value::from(-99.5));
        assert_eq!(cell_value(&Data::Int(5411)), Value::from(5411));
        assert_eq!(cell_value(&Data::String("  Магнит ".to_string())), Value::from("Магнит"));
        assert_eq!(cell_value(&Data::String("   ".to_string())), Value::Null);
        assert_eq!(cell_value(&Data::Empty), Value::Null);
        assert_eq!(cell_value(&Data::Error(CellErrorType::Div0)), Value::Null);
        assert_eq!(cell_value(&Data::Float(f64::NAN)), Value::Null);
    }

    #[test]
    fn test_read_csv_skips_blank_rows() {
        let body = format!("{HEADER}\n;;;;\n01.12.2021 14:01:01;;-1;;\n");
        let rows = read_csv(body.as_bytes(), b';').unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_read_csv_requires_date_and_amount() {
        let err = read_csv("Категория,Описание\nA,B\n".as_bytes(), b',').unwrap_err();
        assert!(matches!(err, TxError::MissingColumn(c) if c == COL_DATE));
        let err = read_csv("Дата операции,Описание\nA,B\n".as_bytes(), b',').unwrap_err();
        assert!(matches!(err, TxError::MissingColumn(c) if c == COL_AMOUNT));
    }

    #[test]
    fn test_load_transactions_from_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(
            dir.path(),
            "operations.csv",
            &format!("{HEADER}\n01.12.2021 14:01:01;*7197;-99,00;Переводы;Дмитрий Ш.\n"),
        );
        let rows = load_transactions(&path, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description.as_deref(), Some("Дмитрий Ш."));
    }

    #[test]
    fn test_load_transactions_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_csv(dir.path(), "operations.txt", HEADER);
        assert!(matches!(
            load_transactions(&path, None),
            Err(TxError::UnsupportedFile(_))
        ));
    }

    #[test]
    fn test_source_kind_detect() {
        assert_eq!(SourceKind::detect(Path::new("ops.CSV")), Some(SourceKind::Csv));
        assert_eq!(SourceKind::detect(Path::new("ops")), None);
    }
}

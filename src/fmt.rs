use serde::Serialize;

use crate::error::Result;

/// Render a report as pretty JSON. Cyrillic text is written as-is.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Format a float as a ruble amount with space-separated thousands: 1 234.56 ₽
pub fn rubles(val: f64) -> String {
    let negative = val < 0.0;
    let cents = format!("{:.2}", val.abs());
    let (int_part, dec_part) = cents.split_once('.').unwrap_or((cents.as_str(), "00"));

    let mut grouped = String::new();
    for (i, c) in int_part.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(c);
    }
    let grouped: String = grouped.chars().rev().collect();

    if negative {
        format!("-{grouped}.{dec_part} ₽")
    } else {
        format!("{grouped}.{dec_part} ₽")
    }
}

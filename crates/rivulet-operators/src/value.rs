//! Row field access and on-demand parsing shared by the operators.
//!
//! A failure here is a row-level error: the owning operator logs it and
//! drops the single row, never the channel.

use std::fmt;

/// Why one row was dropped.
#[derive(Debug)]
pub struct RowError(pub String);

impl fmt::Display for RowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn field<'r>(row: &'r [String], idx: usize, name: &str) -> Result<&'r str, RowError> {
    row.get(idx)
        .map(String::as_str)
        .ok_or_else(|| RowError(format!("missing field '{name}' (index {idx})")))
}

pub fn parse_f64(row: &[String], idx: usize, name: &str) -> Result<f64, RowError> {
    let raw = field(row, idx, name)?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| RowError(format!("field '{name}' is not numeric: '{raw}'")))
}

//! Column derivations: fields computed from a date column before
//! projection.
//!
//! Dates arrive as `YYYY-MM-DD[ HH:MM:SS]` strings; only the year/month
//! prefix is read, and a malformed prefix is a row-level error.

use crate::error::Result;
use crate::spec::{index_of, DeriveSpec};
use crate::value::{field, RowError};

#[derive(Debug, Clone, Copy)]
enum DeriveKind {
    MonthsSinceEpoch,
    HalfYear,
}

#[derive(Debug, Clone)]
pub struct Derivation {
    idx: usize,
    from: String,
    alias: String,
    kind: DeriveKind,
}

impl Derivation {
    pub fn compile(spec: &DeriveSpec, layout: &[String]) -> Result<Self> {
        let (from, alias, kind) = match spec {
            DeriveSpec::MonthsSinceEpoch { from, alias } => {
                (from, alias, DeriveKind::MonthsSinceEpoch)
            }
            DeriveSpec::HalfYear { from, alias } => (from, alias, DeriveKind::HalfYear),
        };
        Ok(Self {
            idx: index_of(layout, from)?,
            from: from.clone(),
            alias: alias.clone(),
            kind,
        })
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn eval(&self, row: &[String]) -> std::result::Result<String, RowError> {
        let raw = field(row, self.idx, &self.from)?;
        let (year, month) = year_month(raw)?;
        Ok(match self.kind {
            DeriveKind::MonthsSinceEpoch => {
                let months = (i64::from(year) - 1970) * 12 + i64::from(month) - 1;
                months.to_string()
            }
            DeriveKind::HalfYear => {
                let half = if month <= 6 { 1 } else { 2 };
                format!("{year}H{half}")
            }
        })
    }
}

/// Parse the `YYYY-MM` prefix of a date field.
fn year_month(raw: &str) -> std::result::Result<(i32, u32), RowError> {
    let bad = || RowError(format!("malformed date '{raw}'"));
    if raw.len() < 7 || raw.as_bytes()[4] != b'-' {
        return Err(bad());
    }
    let year: i32 = raw[0..4].parse().map_err(|_| bad())?;
    let month: u32 = raw[5..7].parse().map_err(|_| bad())?;
    if !(1..=12).contains(&month) {
        return Err(bad());
    }
    Ok((year, month))
}

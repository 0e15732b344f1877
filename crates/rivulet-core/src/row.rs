//! Flat row values and the wire codec for batch bodies.
//!
//! A row is an ordered list of string fields (one decoded CSV line).
//! Numbers and dates are parsed on demand by whichever operator consumes
//! them; rows are never stored typed. Operators emit new rows instead of
//! mutating — aggregate accumulators are the one sanctioned exception.

use crate::error::{Error, Result};

/// One decoded CSV line.
pub type Row = Vec<String>;

/// Field separator inside one wire row.
pub const FIELD_SEP: char = ',';

/// Row separator inside one batch body.
pub const ROW_SEP: char = '\n';

/// Encode rows into a batch body: newline-separated, comma-joined.
///
/// Values are carried verbatim; the wire format does not quote, so fields
/// must not contain the separators (true for every table this pipeline
/// ingests).
pub fn encode_rows(rows: &[Row]) -> String {
    let mut out = String::new();
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            out.push(ROW_SEP);
        }
        for (j, field) in row.iter().enumerate() {
            if j > 0 {
                out.push(FIELD_SEP);
            }
            out.push_str(field);
        }
    }
    out
}

/// Decode a batch body back into rows.
///
/// An empty body decodes to zero rows — that is the delivery-partition
/// boundary, not an error. Blank lines are skipped.
pub fn decode_rows(body: &[u8]) -> Result<Vec<Row>> {
    let text = std::str::from_utf8(body)
        .map_err(|e| Error::Envelope(format!("batch body is not UTF-8: {e}")))?;
    let mut rows = Vec::new();
    for line in text.split(ROW_SEP) {
        if line.is_empty() {
            continue;
        }
        rows.push(line.split(FIELD_SEP).map(|f| f.to_string()).collect());
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_rows() {
        let rows = vec![
            vec!["1".to_string(), "store-7".to_string(), "35.5".to_string()],
            vec!["2".to_string(), "store-9".to_string(), "12".to_string()],
        ];
        let body = encode_rows(&rows);
        assert_eq!(body, "1,store-7,35.5\n2,store-9,12");
        assert_eq!(decode_rows(body.as_bytes()).unwrap(), rows);
    }

    #[test]
    fn empty_body_is_zero_rows() {
        assert!(decode_rows(b"").unwrap().is_empty());
    }

    #[test]
    fn non_utf8_body_is_an_error() {
        assert!(decode_rows(&[0xff, 0xfe]).is_err());
    }
}

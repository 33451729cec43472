//! Row files.
//!
//! Uploads reach the engine already parsed; on the command line they arrive
//! as JSONL, one JSON object per line, in spreadsheet order.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::Row;

/// Read all rows from a JSONL file.
///
/// Blank lines are ignored. Field order within each object is kept.
///
/// # Errors
///
/// Returns an error if:
/// - The file does not exist ([`Error::FileNotFound`])
/// - The file cannot be read
/// - Any line is not a flat JSON object ([`Error::InvalidRow`], with its
///   1-based line number)
pub fn read_rows_jsonl(path: &Path) -> Result<Vec<Row>> {
    if !path.exists() {
        return Err(Error::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let reader = BufReader::new(File::open(path)?);
    let mut rows = Vec::new();

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }

        let row: Row = serde_json::from_str(&line).map_err(|e| Error::InvalidRow {
            line: line_num + 1,
            message: e.to_string(),
        })?;
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldValue;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_reads_rows_in_order() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"form_no":"F1","item_amount":100.5,"remark":null}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"form_no":"F2"}}"#).unwrap();

        let rows = read_rows_jsonl(file.path()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].names().collect::<Vec<_>>(), vec!["form_no", "item_amount", "remark"]);
        assert_eq!(rows[0].value("item_amount"), &FieldValue::Number(100.5));
        assert_eq!(rows[0].value("remark"), &FieldValue::Null);
        assert_eq!(rows[1].value("form_no"), &FieldValue::from("F2"));
    }

    #[test]
    fn test_bad_line_reports_its_number() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"form_no":"F1"}}"#).unwrap();
        writeln!(file, r#"{{"form_no":["nested"]}}"#).unwrap();

        match read_rows_jsonl(file.path()).unwrap_err() {
            Error::InvalidRow { line, .. } => assert_eq!(line, 2),
            other => panic!("expected an invalid row, got {other}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = read_rows_jsonl(&dir.path().join("rows.jsonl")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }
}

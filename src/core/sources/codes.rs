//! Code-to-short-name table for observation codes
//!
//! Loaded once from a CSV file with a header row. The code column is
//! `LOINC_NUM` and the short-name column `SHORTNAME`; other columns are
//! ignored. The delimiter is detected from the header line.

use crate::domain::{ImportError, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const CODE_COLUMN: &str = "LOINC_NUM";
pub const SHORT_NAME_COLUMN: &str = "SHORTNAME";

/// Lookup from observation code to short name
pub trait CodeTable: Send + Sync {
    fn short_name(&self, code: &str) -> Option<&str>;
}

/// In-memory code table
#[derive(Debug, Clone, Default)]
pub struct CsvCodeTable {
    entries: HashMap<String, String>,
}

impl CsvCodeTable {
    /// Reads the table from `path`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or lacks
    /// one of the required columns.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            ImportError::Configuration(format!(
                "Failed to read code table {}: {}",
                path.display(),
                e
            ))
        })?;
        let table = Self::from_csv(&contents)?;
        tracing::debug!(path = %path.display(), entries = table.len(), "Code table loaded");
        Ok(table)
    }

    /// Parses CSV text
    pub fn from_csv(contents: &str) -> Result<Self> {
        let delimiter = sniff_delimiter(contents.lines().next().unwrap_or_default());
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .flexible(true)
            .from_reader(contents.as_bytes());

        let headers = reader.headers()?.clone();
        let column = |name: &str| {
            headers.iter().position(|h| h.trim() == name).ok_or_else(|| {
                ImportError::Configuration(format!("Code table has no {name} column"))
            })
        };
        let code_idx = column(CODE_COLUMN)?;
        let name_idx = column(SHORT_NAME_COLUMN)?;

        let mut entries = HashMap::new();
        for record in reader.records() {
            let record = record?;
            let (Some(code), Some(name)) = (record.get(code_idx), record.get(name_idx)) else {
                continue;
            };
            if code.is_empty() || name.is_empty() {
                continue;
            }
            // first occurrence wins
            entries
                .entry(code.to_string())
                .or_insert_with(|| name.to_string());
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds an entry; used when building tables in code
    pub fn insert(&mut self, code: impl Into<String>, short_name: impl Into<String>) {
        self.entries.insert(code.into(), short_name.into());
    }
}

impl CodeTable for CsvCodeTable {
    fn short_name(&self, code: &str) -> Option<&str> {
        self.entries.get(code).map(String::as_str)
    }
}

fn sniff_delimiter(header: &str) -> u8 {
    [b',', b';', b'\t', b'|']
        .into_iter()
        .max_by_key(|d| header.bytes().filter(|b| b == d).count())
        .filter(|d| header.as_bytes().contains(d))
        .unwrap_or(b',')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TABLE: &str = "\"LOINC_NUM\",\"COMPONENT\",\"SHORTNAME\"\n\
        \"15074-8\",\"Glucose\",\"Glucose Bld-sCnc\"\n\
        \"8867-4\",\"Heart rate\",\"Heart rate\"\n";

    #[test]
    fn test_lookup() {
        let table = CsvCodeTable::from_csv(TABLE).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.short_name("15074-8"), Some("Glucose Bld-sCnc"));
        assert_eq!(table.short_name("0000-0"), None);
    }

    #[test]
    fn test_semicolon_delimiter() {
        let table = CsvCodeTable::from_csv("LOINC_NUM;SHORTNAME\n1-8;Acyclovir\n").unwrap();
        assert_eq!(table.short_name("1-8"), Some("Acyclovir"));
    }

    #[test]
    fn test_missing_column() {
        let err = CsvCodeTable::from_csv("CODE,NAME\n1,a\n").unwrap_err();
        assert!(err.to_string().contains("LOINC_NUM"));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();
        let table = CsvCodeTable::from_path(file.path()).unwrap();
        assert!(!table.is_empty());
        assert!(CsvCodeTable::from_path("/nonexistent/table.csv").is_err());
    }
}

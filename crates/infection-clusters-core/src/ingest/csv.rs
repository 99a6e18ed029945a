//! Minimal CSV reader for the two import files.
//!
//! Handles a header row, quoted fields with doubled quotes, embedded commas
//! and newlines inside quotes, and LF or CRLF line endings. Blank lines are
//! skipped.

use std::collections::HashMap;

use super::{IngestError, IngestResult};

/// One data row with its 1-based starting line in the source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvRow {
    pub line: usize,
    pub fields: Vec<String>,
}

/// Parsed CSV text with header lookup.
#[derive(Debug, Clone)]
pub struct CsvTable {
    columns: HashMap<String, usize>,
    rows: Vec<CsvRow>,
}

impl CsvTable {
    pub fn parse(text: &str) -> IngestResult<Self> {
        let mut records = split_records(text)?.into_iter();

        let header = records.next().map(|r| r.fields).unwrap_or_default();
        let columns = header
            .iter()
            .enumerate()
            .map(|(i, name)| (normalize_header(name), i))
            .collect();

        Ok(Self {
            columns,
            rows: records.collect(),
        })
    }

    /// Column positions for `names`, in order. Fails on the first missing one.
    pub fn require_columns<const N: usize>(&self, names: [&str; N]) -> IngestResult<[usize; N]> {
        let mut positions = [0usize; N];
        for (slot, name) in positions.iter_mut().zip(names) {
            *slot = *self
                .columns
                .get(name)
                .ok_or_else(|| IngestError::MissingColumn(name.to_string()))?;
        }
        Ok(positions)
    }

    pub fn rows(&self) -> &[CsvRow] {
        &self.rows
    }
}

impl CsvRow {
    /// Trimmed field value; missing trailing fields read as empty.
    pub fn get(&self, index: usize) -> &str {
        self.fields.get(index).map(|f| f.trim()).unwrap_or("")
    }
}

fn normalize_header(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').trim().to_ascii_lowercase()
}

fn split_records(text: &str) -> IngestResult<Vec<CsvRow>> {
    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;
    let mut record_line = 1;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push('\n');
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => fields.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                fields.push(std::mem::take(&mut field));
                push_record(&mut records, std::mem::take(&mut fields), record_line);
                line += 1;
                record_line = line;
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(IngestError::InvalidRecord {
            line: record_line,
            message: "unterminated quoted field".to_string(),
        });
    }

    fields.push(field);
    push_record(&mut records, fields, record_line);
    Ok(records)
}

fn push_record(records: &mut Vec<CsvRow>, fields: Vec<String>, line: usize) {
    let blank = fields.iter().all(|f| f.trim().is_empty());
    if !blank {
        records.push(CsvRow { line, fields });
    }
}

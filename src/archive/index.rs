//! Yearly index parsing.
//!
//! The source index is a tab-separated file with one line per declared
//! filing: prefix, last name, first name, suffix, filing-type code,
//! state+district, year, filing date, document id.

use chrono::{NaiveDate, Utc};
use thiserror::Error;

use crate::models::Filing;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("index is empty")]
    Empty,

    #[error("line {line}: expected {expected} tab-separated fields, got {got}")]
    FieldCount {
        line: usize,
        expected: usize,
        got: usize,
    },
}

const FIELD_COUNT: usize = 9;

/// One parsed index line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub last_name: String,
    pub first_name: String,
    pub suffix: Option<String>,
    pub filing_type: String,
    pub state: Option<String>,
    pub district: Option<String>,
    pub year: i32,
    pub filing_date: Option<NaiveDate>,
    pub doc_id: String,
}

impl IndexEntry {
    pub fn into_filing(self) -> Filing {
        Filing {
            doc_id: self.doc_id,
            year: self.year,
            last_name: self.last_name,
            first_name: self.first_name,
            suffix: self.suffix,
            state: self.state,
            district: self.district,
            filing_type: self.filing_type,
            filing_date: self.filing_date,
            ingested_at: Utc::now(),
        }
    }
}

/// Parse a yearly index. Header line is detected and skipped; blank lines
/// are ignored. Malformed lines are reported, not silently dropped.
pub fn parse_index(content: &str, year: i32) -> Result<(Vec<IndexEntry>, Vec<IndexError>), IndexError> {
    let mut entries = Vec::new();
    let mut issues = Vec::new();
    let mut saw_line = false;

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }
        saw_line = true;

        let fields: Vec<&str> = line.split('\t').collect();
        if idx == 0 && is_header(&fields) {
            continue;
        }
        if fields.len() != FIELD_COUNT {
            issues.push(IndexError::FieldCount {
                line: idx + 1,
                expected: FIELD_COUNT,
                got: fields.len(),
            });
            continue;
        }

        let (state, district) = split_state_district(fields[5]);
        let entry_year = fields[6].trim().parse().unwrap_or(year);
        entries.push(IndexEntry {
            last_name: fields[1].trim().to_string(),
            first_name: fields[2].trim().to_string(),
            suffix: non_empty(fields[3]),
            filing_type: fields[4].trim().to_string(),
            state,
            district,
            year: entry_year,
            filing_date: parse_filing_date(fields[7]),
            doc_id: fields[8].trim().to_string(),
        });
    }

    if !saw_line {
        return Err(IndexError::Empty);
    }
    Ok((entries, issues))
}

fn is_header(fields: &[&str]) -> bool {
    fields
        .first()
        .map(|f| f.trim().eq_ignore_ascii_case("prefix"))
        .unwrap_or(false)
}

fn non_empty(field: &str) -> Option<String> {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Split a combined state+district field like "CA12" or "AZ03".
/// At-large and non-voting entries may have no digits. Fields that do not
/// start with two single-byte characters are kept verbatim as the state.
fn split_state_district(field: &str) -> (Option<String>, Option<String>) {
    let trimmed = field.trim();
    if trimmed.len() < 2 || !trimmed.is_char_boundary(2) {
        return (non_empty(trimmed), None);
    }
    let (state, district) = trimmed.split_at(2);
    let district = district.trim_start_matches('0');
    (
        Some(state.to_ascii_uppercase()),
        if district.is_empty() {
            None
        } else {
            Some(district.to_string())
        },
    )
}

fn parse_filing_date(field: &str) -> Option<NaiveDate> {
    let trimmed = field.trim();
    NaiveDate::parse_from_str(trimmed, "%m/%d/%Y")
        .or_else(|_| NaiveDate::parse_from_str(trimmed, "%Y-%m-%d"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "Prefix\tLast\tFirst\tSuffix\tFilingType\tStateDst\tYear\tFilingDate\tDocID\n\
        Hon.\tDoe\tJane\t\tP\tCA12\t2025\t1/12/2025\t8221216\n\
        Hon.\tRoe\tRichard\tJr.\tO\tTX03\t2025\t5/15/2025\t10061347\n";

    #[test]
    fn test_parse_index() {
        let (entries, issues) = parse_index(SAMPLE, 2025).unwrap();
        assert!(issues.is_empty());
        assert_eq!(entries.len(), 2);

        let first = &entries[0];
        assert_eq!(first.doc_id, "8221216");
        assert_eq!(first.state.as_deref(), Some("CA"));
        assert_eq!(first.district.as_deref(), Some("12"));
        assert_eq!(first.filing_type, "P");
        assert_eq!(first.filing_date, NaiveDate::from_ymd_opt(2025, 1, 12));

        let second = &entries[1];
        assert_eq!(second.suffix.as_deref(), Some("Jr."));
        assert_eq!(second.district.as_deref(), Some("3"));
    }

    #[test]
    fn test_malformed_lines_are_reported_not_dropped() {
        let content = format!("{SAMPLE}broken line without tabs\n");
        let (entries, issues) = parse_index(&content, 2025).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(issues.len(), 1);
        assert!(matches!(issues[0], IndexError::FieldCount { line: 4, .. }));
    }

    #[test]
    fn test_non_ascii_state_field_is_kept_not_split() {
        let content =
            format!("{SAMPLE}Hon.\tLee\tAnn\t\tP\t\u{2014}12\t2025\t1/15/2025\t8221301\n");
        let (entries, issues) = parse_index(&content, 2025).unwrap();
        assert!(issues.is_empty());
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].state.as_deref(), Some("\u{2014}12"));
        assert_eq!(entries[2].district, None);
    }

    #[test]
    fn test_empty_index() {
        assert!(matches!(parse_index("\n\n", 2025), Err(IndexError::Empty)));
    }

    #[test]
    fn test_into_filing() {
        let (entries, _) = parse_index(SAMPLE, 2025).unwrap();
        let filing = entries[0].clone().into_filing();
        assert_eq!(filing.doc_id, "8221216");
        assert_eq!(filing.year, 2025);
        assert_eq!(filing.filing_type, "P");
    }
}

//! Referential-integrity gate for the dimensional store.
//!
//! Runs inside the fact-build transaction, after the inserts. Any violation
//! blocks publication of the year's partition; nothing is auto-repaired.

use rusqlite::Connection;

#[derive(Debug, Clone)]
pub enum IntegrityViolation {
    /// A fact references a business key with no current dimension row.
    MissingDimension {
        dimension: &'static str,
        key: String,
        record_id: String,
    },
    /// A fact row's surrogate key resolves to no dimension row.
    DanglingSurrogate {
        fact_table: &'static str,
        column: &'static str,
        record_id: String,
    },
    /// A fact references a document that is not successfully extracted.
    DocumentNotExtracted { doc_id: String, record_id: String },
    /// A structured record has no Filing row to resolve a member from.
    MissingFiling { doc_id: String, record_id: String },
}

impl std::fmt::Display for IntegrityViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDimension {
                dimension,
                key,
                record_id,
            } => write!(f, "record {record_id}: no current {dimension} row for key {key:?}"),
            Self::DanglingSurrogate {
                fact_table,
                column,
                record_id,
            } => write!(f, "{fact_table}.{column} dangling for record {record_id}"),
            Self::DocumentNotExtracted { doc_id, record_id } => {
                write!(f, "record {record_id}: document {doc_id} is not extracted")
            }
            Self::MissingFiling { doc_id, record_id } => {
                write!(f, "record {record_id}: no filing row for document {doc_id}")
            }
        }
    }
}

const FACT_TABLES: &[&str] = &["fact_transactions", "fact_holdings"];

/// Verify every fact row for a year resolves cleanly.
///
/// Checks that each surrogate key lands on a dimension row and that every
/// referenced document has extraction_status = success. The fact builder
/// already refuses unresolvable keys at insert time; this pass re-checks
/// the committed shape so schema drift cannot slip through.
pub fn check_facts(conn: &Connection, year: i32) -> rusqlite::Result<Vec<IntegrityViolation>> {
    let mut violations = Vec::new();

    for &fact_table in FACT_TABLES {
        for (column, dim_table, dim_sk) in [
            ("member_sk", "dim_members", "member_sk"),
            ("asset_sk", "dim_assets", "asset_sk"),
            ("filing_type_sk", "dim_filing_types", "filing_type_sk"),
        ] {
            let sql = format!(
                "SELECT f.record_id FROM {fact_table} f
                 LEFT JOIN {dim_table} d ON d.{dim_sk} = f.{column}
                 WHERE f.year = ?1 AND d.{dim_sk} IS NULL"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([year], |row| row.get::<_, String>(0))?;
            for record_id in rows {
                violations.push(IntegrityViolation::DanglingSurrogate {
                    fact_table,
                    column,
                    record_id: record_id?,
                });
            }
        }

        let sql = format!(
            "SELECT f.record_id, f.doc_id FROM {fact_table} f
             LEFT JOIN documents doc ON doc.year = f.year AND doc.doc_id = f.doc_id
             WHERE f.year = ?1
               AND (doc.doc_id IS NULL OR doc.extraction_status != 'success')"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([year], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (record_id, doc_id) = row?;
            violations.push(IntegrityViolation::DocumentNotExtracted { doc_id, record_id });
        }
    }

    Ok(violations)
}

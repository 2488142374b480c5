//! Fact rebuild: delete and repopulate one year's fact partition.
//!
//! Rebuilding is a pure function of the active Silver records and the
//! current dimension snapshot, so the whole partition is dropped and
//! reinserted in one transaction. Record ids are the fact keys, which makes
//! two rebuilds from the same inputs byte-identical. Violations collected
//! during the build, or by the integrity pass afterwards, roll the
//! transaction back.

use std::collections::HashMap;

use rusqlite::params;

use super::integrity::{self, IntegrityViolation};
use super::{date_sk, GoldError, GoldStore, Result, DIM_ASSETS, DIM_FILING_TYPES, DIM_MEMBERS};
use crate::models::{Filing, RecordKind, StructuredRecord};

#[derive(Debug, Clone, Default)]
pub struct FactBuildStats {
    pub transactions: usize,
    pub holdings: usize,
}

impl GoldStore {
    /// Rebuild both fact tables for one year.
    pub fn build_facts(
        &self,
        year: i32,
        filings: &[Filing],
        records: &[StructuredRecord],
    ) -> Result<FactBuildStats> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM fact_transactions WHERE year = ?", params![year])?;
        tx.execute("DELETE FROM fact_holdings WHERE year = ?", params![year])?;

        let filing_by_doc: HashMap<&str, &Filing> = filings
            .iter()
            .map(|f| (f.doc_id.as_str(), f))
            .collect();

        let mut sorted: Vec<&StructuredRecord> = records.iter().collect();
        sorted.sort_by(|a, b| a.record_id.cmp(&b.record_id));

        let mut stats = FactBuildStats::default();
        let mut violations = Vec::new();

        for record in sorted {
            match self.insert_fact(&tx, year, record, &filing_by_doc) {
                Ok(Some(RecordKind::Transaction)) => stats.transactions += 1,
                Ok(Some(RecordKind::AssetHolding)) => stats.holdings += 1,
                Ok(None) => {}
                Err(FactError::Violation(violation)) => violations.push(violation),
                Err(FactError::Sqlite(e)) => return Err(e.into()),
            }
        }

        violations.extend(integrity::check_facts(&tx, year)?);

        if !violations.is_empty() {
            for violation in &violations {
                tracing::error!("integrity violation: {violation}");
            }
            // Dropping the transaction rolls the partition back.
            return Err(GoldError::IntegrityBlocked(violations));
        }

        tx.commit()?;
        tracing::info!(
            year,
            transactions = stats.transactions,
            holdings = stats.holdings,
            "fact partition rebuilt"
        );
        Ok(stats)
    }

    fn insert_fact(
        &self,
        tx: &rusqlite::Connection,
        year: i32,
        record: &StructuredRecord,
        filing_by_doc: &HashMap<&str, &Filing>,
    ) -> std::result::Result<Option<RecordKind>, FactError> {
        let Some(filing) = filing_by_doc.get(record.doc_id.as_str()) else {
            return Err(FactError::Violation(IntegrityViolation::MissingFiling {
                doc_id: record.doc_id.clone(),
                record_id: record.record_id.clone(),
            }));
        };

        let member_key = filing.member_key();
        let Some(member_sk) = DIM_MEMBERS.current_sk(tx, &member_key)? else {
            return Err(FactError::missing("dim_members", member_key, record));
        };

        let Some(asset_key) = record.asset_key() else {
            // Validation upstream rejects asset-less records; anything that
            // still lacks a key cannot join and is a violation here.
            return Err(FactError::missing("dim_assets", String::new(), record));
        };
        let Some(asset_sk) = DIM_ASSETS.current_sk(tx, &asset_key)? else {
            return Err(FactError::missing("dim_assets", asset_key, record));
        };

        let Some(filing_type_sk) = DIM_FILING_TYPES.current_sk(tx, &filing.filing_type)? else {
            return Err(FactError::missing(
                "dim_filing_types",
                filing.filing_type.clone(),
                record,
            ));
        };

        let amount_min = record.amount.as_ref().map(|a| a.min);
        let amount_max = record.amount.as_ref().and_then(|a| a.max);
        let amount_mid = record.amount.as_ref().map(|a| a.midpoint());

        match record.kind {
            RecordKind::Transaction => {
                let Some(transaction_type) = record.transaction_type else {
                    return Ok(None);
                };
                tx.execute(
                    r#"
                    INSERT INTO fact_transactions (
                        record_id, year, doc_id, member_sk, asset_sk,
                        filing_type_sk, date_sk, transaction_date,
                        transaction_type, owner, amount_min, amount_max,
                        amount_mid, confidence
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                    "#,
                    params![
                        record.record_id,
                        year,
                        record.doc_id,
                        member_sk,
                        asset_sk,
                        filing_type_sk,
                        record.transaction_date.map(date_sk),
                        record.transaction_date.map(|d| d.to_string()),
                        transaction_type.as_str(),
                        record.owner.as_str(),
                        amount_min,
                        amount_max,
                        amount_mid,
                        record.confidence,
                    ],
                )?;
                Ok(Some(RecordKind::Transaction))
            }
            RecordKind::AssetHolding => {
                tx.execute(
                    r#"
                    INSERT INTO fact_holdings (
                        record_id, year, doc_id, member_sk, asset_sk,
                        filing_type_sk, owner, amount_min, amount_max,
                        amount_mid, confidence
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                    "#,
                    params![
                        record.record_id,
                        year,
                        record.doc_id,
                        member_sk,
                        asset_sk,
                        filing_type_sk,
                        record.owner.as_str(),
                        amount_min,
                        amount_max,
                        amount_mid,
                        record.confidence,
                    ],
                )?;
                Ok(Some(RecordKind::AssetHolding))
            }
        }
    }
}

enum FactError {
    Violation(IntegrityViolation),
    Sqlite(GoldError),
}

impl FactError {
    fn missing(dimension: &'static str, key: String, record: &StructuredRecord) -> Self {
        Self::Violation(IntegrityViolation::MissingDimension {
            dimension,
            key,
            record_id: record.record_id.clone(),
        })
    }
}

impl From<rusqlite::Error> for FactError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e.into())
    }
}

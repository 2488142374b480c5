//! Dimensional store: star schema over the normalized tiers.
//!
//! Dimensions are effective-dated (SCD Type 2), facts are rebuilt per year
//! as a pure function of the Silver snapshot and the current dimension
//! state, and aggregates are deterministic reductions over facts. The build
//! is a single serialized pass per year; nothing here is written by the
//! pipeline workers.

mod aggregates;
mod facts;
pub mod integrity;
mod scd2;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

pub use aggregates::AggregateStats;
pub use facts::FactBuildStats;
pub use integrity::IntegrityViolation;
pub use scd2::{Scd2Outcome, Scd2Table};

use crate::models::{Filing, FilingType, StructuredRecord};
use crate::repository::{self, parse_datetime};

#[derive(Debug, Error)]
pub enum GoldError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Repository(#[from] crate::repository::RepositoryError),

    #[error("integrity check blocked publication: {} violation(s)", .0.len())]
    IntegrityBlocked(Vec<IntegrityViolation>),
}

pub type Result<T> = std::result::Result<T, GoldError>;

pub const DIM_MEMBERS: Scd2Table = Scd2Table {
    table: "dim_members",
    sk_col: "member_sk",
    key_col: "member_key",
    attr_cols: &["display_name", "state", "district"],
};

pub const DIM_ASSETS: Scd2Table = Scd2Table {
    table: "dim_assets",
    sk_col: "asset_sk",
    key_col: "asset_key",
    attr_cols: &["ticker", "asset_name"],
};

pub const DIM_FILING_TYPES: Scd2Table = Scd2Table {
    table: "dim_filing_types",
    sk_col: "filing_type_sk",
    key_col: "code",
    attr_cols: &["label"],
};

/// Counts from one dimension pass.
#[derive(Debug, Clone, Default)]
pub struct DimensionBuildStats {
    pub members_changed: usize,
    pub assets_changed: usize,
    pub filing_types_changed: usize,
    pub dates_added: usize,
}

/// A recorded stage boundary, e.g. "extraction complete for 2025 at v1".
#[derive(Debug, Clone)]
pub struct BuildWatermark {
    pub stage: String,
    pub year: i32,
    pub extraction_version: i32,
    pub completed_at: DateTime<Utc>,
}

/// SQLite-backed dimensional store.
pub struct GoldStore {
    db_path: PathBuf,
}

impl GoldStore {
    pub fn new(db_path: &Path) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_path_buf(),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        Ok(repository::connect(&self.db_path)?)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS dim_members (
                member_sk INTEGER PRIMARY KEY AUTOINCREMENT,
                member_key TEXT NOT NULL,
                display_name TEXT,
                state TEXT,
                district TEXT,
                effective_from TEXT NOT NULL,
                effective_to TEXT,
                is_current INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_dim_members_key
                ON dim_members(member_key, is_current);

            CREATE TABLE IF NOT EXISTS dim_assets (
                asset_sk INTEGER PRIMARY KEY AUTOINCREMENT,
                asset_key TEXT NOT NULL,
                ticker TEXT,
                asset_name TEXT,
                effective_from TEXT NOT NULL,
                effective_to TEXT,
                is_current INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_dim_assets_key
                ON dim_assets(asset_key, is_current);

            CREATE TABLE IF NOT EXISTS dim_filing_types (
                filing_type_sk INTEGER PRIMARY KEY AUTOINCREMENT,
                code TEXT NOT NULL,
                label TEXT,
                effective_from TEXT NOT NULL,
                effective_to TEXT,
                is_current INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_dim_filing_types_code
                ON dim_filing_types(code, is_current);

            CREATE TABLE IF NOT EXISTS dim_dates (
                date_sk INTEGER PRIMARY KEY,
                date TEXT NOT NULL UNIQUE,
                year INTEGER NOT NULL,
                month INTEGER NOT NULL,
                day INTEGER NOT NULL,
                weekday INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fact_transactions (
                record_id TEXT PRIMARY KEY,
                year INTEGER NOT NULL,
                doc_id TEXT NOT NULL,
                member_sk INTEGER NOT NULL,
                asset_sk INTEGER NOT NULL,
                filing_type_sk INTEGER NOT NULL,
                date_sk INTEGER,
                transaction_date TEXT,
                transaction_type TEXT NOT NULL,
                owner TEXT NOT NULL,
                amount_min INTEGER,
                amount_max INTEGER,
                amount_mid INTEGER,
                confidence REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_fact_transactions_year
                ON fact_transactions(year);

            CREATE TABLE IF NOT EXISTS fact_holdings (
                record_id TEXT PRIMARY KEY,
                year INTEGER NOT NULL,
                doc_id TEXT NOT NULL,
                member_sk INTEGER NOT NULL,
                asset_sk INTEGER NOT NULL,
                filing_type_sk INTEGER NOT NULL,
                owner TEXT NOT NULL,
                amount_min INTEGER,
                amount_max INTEGER,
                amount_mid INTEGER,
                confidence REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_fact_holdings_year
                ON fact_holdings(year);

            CREATE TABLE IF NOT EXISTS agg_ticker_activity (
                year INTEGER NOT NULL,
                ticker TEXT NOT NULL,
                window_days INTEGER NOT NULL,
                as_of TEXT NOT NULL,
                buy_count INTEGER NOT NULL,
                sell_count INTEGER NOT NULL,
                amount_mid_total INTEGER NOT NULL,
                PRIMARY KEY (year, ticker, window_days)
            );

            CREATE TABLE IF NOT EXISTS agg_member_stats (
                year INTEGER NOT NULL,
                member_sk INTEGER NOT NULL,
                trade_count INTEGER NOT NULL,
                amount_mid_total INTEGER NOT NULL,
                distinct_assets INTEGER NOT NULL,
                mean_confidence REAL NOT NULL,
                PRIMARY KEY (year, member_sk)
            );

            CREATE TABLE IF NOT EXISTS agg_document_quality (
                year INTEGER NOT NULL,
                extraction_method TEXT NOT NULL,
                doc_count INTEGER NOT NULL,
                mean_extraction_confidence REAL,
                mean_parse_confidence REAL,
                PRIMARY KEY (year, extraction_method)
            );

            CREATE TABLE IF NOT EXISTS agg_member_pairs (
                year INTEGER NOT NULL,
                member_a_sk INTEGER NOT NULL,
                member_b_sk INTEGER NOT NULL,
                shared_assets INTEGER NOT NULL,
                PRIMARY KEY (year, member_a_sk, member_b_sk)
            );

            CREATE TABLE IF NOT EXISTS build_watermarks (
                stage TEXT NOT NULL,
                year INTEGER NOT NULL,
                extraction_version INTEGER NOT NULL,
                completed_at TEXT NOT NULL,
                PRIMARY KEY (stage, year)
            );
            "#,
        )?;
        Ok(())
    }

    /// Advance all dimensions from one year's Silver snapshot.
    ///
    /// Members and filing types come from the Filing rows, assets and dates
    /// from the active structured records. Input order is the observation
    /// order, which fixes effective-date ordering for same-pass changes.
    pub fn build_dimensions(
        &self,
        filings: &[Filing],
        records: &[StructuredRecord],
    ) -> Result<DimensionBuildStats> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let observed_at = Utc::now().to_rfc3339();
        let mut stats = DimensionBuildStats::default();

        for filing in filings {
            let attrs = vec![
                Some(filing.display_name()),
                filing.state.clone(),
                filing.district.clone(),
            ];
            if DIM_MEMBERS.apply(&tx, &filing.member_key(), &attrs, &observed_at)?
                != Scd2Outcome::Unchanged
            {
                stats.members_changed += 1;
            }

            let label = FilingType::from_code(&filing.filing_type).map(|ft| ft.label().to_string());
            if DIM_FILING_TYPES.apply(&tx, &filing.filing_type, &[label], &observed_at)?
                != Scd2Outcome::Unchanged
            {
                stats.filing_types_changed += 1;
            }
        }

        for record in records {
            if let Some(asset_key) = record.asset_key() {
                let attrs = vec![
                    record.ticker.as_ref().map(|t| t.to_ascii_uppercase()),
                    record.asset_name.clone(),
                ];
                if DIM_ASSETS.apply(&tx, &asset_key, &attrs, &observed_at)?
                    != Scd2Outcome::Unchanged
                {
                    stats.assets_changed += 1;
                }
            }
            if let Some(date) = record.transaction_date {
                stats.dates_added += ensure_date(&tx, date)?;
            }
        }

        tx.commit()?;
        tracing::info!(
            members = stats.members_changed,
            assets = stats.assets_changed,
            filing_types = stats.filing_types_changed,
            dates = stats.dates_added,
            "dimension pass complete"
        );
        Ok(stats)
    }

    pub fn set_watermark(&self, stage: &str, year: i32, extraction_version: i32) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO build_watermarks (stage, year, extraction_version, completed_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(stage, year) DO UPDATE SET
                extraction_version = excluded.extraction_version,
                completed_at = excluded.completed_at
            "#,
            params![stage, year, extraction_version, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn watermark(&self, stage: &str, year: i32) -> Result<Option<BuildWatermark>> {
        let conn = self.connect()?;
        let mark = conn
            .query_row(
                "SELECT extraction_version, completed_at FROM build_watermarks
                 WHERE stage = ?1 AND year = ?2",
                params![stage, year],
                |row| {
                    let completed_at: String = row.get(1)?;
                    Ok(BuildWatermark {
                        stage: stage.to_string(),
                        year,
                        extraction_version: row.get(0)?,
                        completed_at: parse_datetime(&completed_at),
                    })
                },
            )
            .optional()?;
        Ok(mark)
    }
}

/// Surrogate key for a calendar date, `yyyymmdd`.
pub fn date_sk(date: NaiveDate) -> i64 {
    date.year() as i64 * 10_000 + date.month() as i64 * 100 + date.day() as i64
}

fn ensure_date(conn: &Connection, date: NaiveDate) -> rusqlite::Result<usize> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO dim_dates (date_sk, date, year, month, day, weekday)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        params![
            date_sk(date),
            date.to_string(),
            date.year(),
            date.month(),
            date.day(),
            date.weekday().num_days_from_monday(),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AmountRange, OwnerCode, RecordKind, TransactionType};
    use tempfile::tempdir;

    pub(crate) fn filing(doc_id: &str, filing_type: &str, state: &str) -> Filing {
        Filing {
            doc_id: doc_id.to_string(),
            year: 2025,
            last_name: "Doe".to_string(),
            first_name: "Jane".to_string(),
            suffix: None,
            state: Some(state.to_string()),
            district: Some("12".to_string()),
            filing_type: filing_type.to_string(),
            filing_date: NaiveDate::from_ymd_opt(2025, 1, 12),
            ingested_at: Utc::now(),
        }
    }

    pub(crate) fn transaction_record(record_id: &str, doc_id: &str, ticker: &str) -> StructuredRecord {
        StructuredRecord {
            record_id: record_id.to_string(),
            doc_id: doc_id.to_string(),
            year: 2025,
            extraction_version: 1,
            kind: RecordKind::Transaction,
            owner: OwnerCode::Filer,
            ticker: Some(ticker.to_string()),
            asset_name: None,
            transaction_type: Some(TransactionType::Purchase),
            transaction_date: NaiveDate::from_ymd_opt(2025, 1, 10),
            amount: Some(AmountRange::new(1_001, Some(15_000), "$1,001\u{2013}$15,000")),
            confidence: 1.0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_dimension_build_and_scd2_change() {
        let dir = tempdir().unwrap();
        let store = GoldStore::new(&dir.path().join("test.db")).unwrap();

        let records = vec![transaction_record("r1", "8221216", "AAPL")];
        let stats = store
            .build_dimensions(&[filing("8221216", "P", "CA")], &records)
            .unwrap();
        assert_eq!(stats.members_changed, 1);
        assert_eq!(stats.assets_changed, 1);
        assert_eq!(stats.filing_types_changed, 1);
        assert_eq!(stats.dates_added, 1);

        // Same snapshot again: everything unchanged
        let stats = store
            .build_dimensions(&[filing("8221216", "P", "CA")], &records)
            .unwrap();
        assert_eq!(stats.members_changed, 0);
        assert_eq!(stats.assets_changed, 0);

        // Member moved state: close and insert
        let stats = store
            .build_dimensions(&[filing("8221216", "P", "TX")], &records)
            .unwrap();
        assert_eq!(stats.members_changed, 1);

        let conn = store.connect().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM dim_members", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 2);
        let current: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM dim_members WHERE is_current = 1",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(current, 1);
    }

    #[test]
    fn test_watermark_round_trip() {
        let dir = tempdir().unwrap();
        let store = GoldStore::new(&dir.path().join("test.db")).unwrap();

        assert!(store.watermark("extraction", 2025).unwrap().is_none());
        store.set_watermark("extraction", 2025, 1).unwrap();
        let mark = store.watermark("extraction", 2025).unwrap().unwrap();
        assert_eq!(mark.extraction_version, 1);

        store.set_watermark("extraction", 2025, 2).unwrap();
        let mark = store.watermark("extraction", 2025).unwrap().unwrap();
        assert_eq!(mark.extraction_version, 2);
    }

    #[test]
    fn test_date_sk_shape() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        assert_eq!(date_sk(date), 20_250_110);
    }
}

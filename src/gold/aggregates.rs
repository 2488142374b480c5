//! Aggregate tables: deterministic reductions over the fact partition.
//!
//! Every aggregate is recomputed from scratch for its year, never
//! incrementally patched, so a rebuild from identical facts yields
//! identical aggregates. Rolling windows are anchored at the latest
//! transaction date in the partition, not the wall clock, to keep the
//! reduction a pure function of the facts.

use rusqlite::{params, OptionalExtension};

use super::{GoldStore, Result};

#[derive(Debug, Clone, Default)]
pub struct AggregateStats {
    pub ticker_windows: usize,
    pub member_rows: usize,
    pub quality_rows: usize,
    pub pair_rows: usize,
}

impl GoldStore {
    /// Recompute all aggregate tables for one year.
    pub fn build_aggregates(&self, year: i32, windows: &[u32]) -> Result<AggregateStats> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut stats = AggregateStats::default();

        for table in [
            "agg_ticker_activity",
            "agg_member_stats",
            "agg_document_quality",
            "agg_member_pairs",
        ] {
            tx.execute(&format!("DELETE FROM {table} WHERE year = ?"), params![year])?;
        }

        let as_of: Option<String> = tx
            .query_row(
                "SELECT MAX(transaction_date) FROM fact_transactions WHERE year = ?",
                params![year],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        if let Some(as_of) = &as_of {
            for &window in windows {
                stats.ticker_windows += tx.execute(
                    r#"
                    INSERT INTO agg_ticker_activity (
                        year, ticker, window_days, as_of,
                        buy_count, sell_count, amount_mid_total
                    )
                    SELECT
                        f.year, a.ticker, ?3, ?2,
                        SUM(CASE WHEN f.transaction_type = 'Purchase' THEN 1 ELSE 0 END),
                        SUM(CASE WHEN f.transaction_type != 'Purchase' THEN 1 ELSE 0 END),
                        COALESCE(SUM(f.amount_mid), 0)
                    FROM fact_transactions f
                    JOIN dim_assets a ON a.asset_sk = f.asset_sk
                    WHERE f.year = ?1
                      AND a.ticker IS NOT NULL
                      AND f.transaction_date IS NOT NULL
                      AND julianday(?2) - julianday(f.transaction_date) < ?3
                    GROUP BY a.ticker
                    "#,
                    params![year, as_of, window],
                )?;
            }
        }

        stats.member_rows = tx.execute(
            r#"
            INSERT INTO agg_member_stats (
                year, member_sk, trade_count, amount_mid_total,
                distinct_assets, mean_confidence
            )
            SELECT
                year, member_sk, COUNT(*),
                COALESCE(SUM(amount_mid), 0),
                COUNT(DISTINCT asset_sk),
                AVG(confidence)
            FROM fact_transactions
            WHERE year = ?1
            GROUP BY member_sk
            "#,
            params![year],
        )?;

        stats.quality_rows = tx.execute(
            r#"
            INSERT INTO agg_document_quality (
                year, extraction_method, doc_count,
                mean_extraction_confidence, mean_parse_confidence
            )
            SELECT
                year, COALESCE(extraction_method, 'none'), COUNT(*),
                AVG(extraction_confidence), AVG(parse_confidence)
            FROM documents
            WHERE year = ?1
            GROUP BY COALESCE(extraction_method, 'none')
            "#,
            params![year],
        )?;

        stats.pair_rows = tx.execute(
            r#"
            INSERT INTO agg_member_pairs (year, member_a_sk, member_b_sk, shared_assets)
            SELECT a.year, a.member_sk, b.member_sk, COUNT(DISTINCT a.asset_sk)
            FROM fact_transactions a
            JOIN fact_transactions b
              ON b.year = a.year
             AND b.asset_sk = a.asset_sk
             AND b.member_sk > a.member_sk
            WHERE a.year = ?1
            GROUP BY a.member_sk, b.member_sk
            "#,
            params![year],
        )?;

        tx.commit()?;
        tracing::info!(
            year,
            ticker_windows = stats.ticker_windows,
            members = stats.member_rows,
            quality = stats.quality_rows,
            pairs = stats.pair_rows,
            "aggregates rebuilt"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{filing, transaction_record};
    use super::super::GoldStore;
    use crate::models::{Document, ExtractionMethod, ExtractionStatus, OwnerCode, TransactionType};
    use crate::repository::{DocumentRepository, ExtractionOutcomeUpdate};
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn extracted_doc(db_path: &std::path::Path, doc_id: &str) {
        let docs = DocumentRepository::new(db_path).unwrap();
        let doc = Document::pending(doc_id, 2025, doc_id.as_bytes(), 1);
        docs.ensure_pending(&doc).unwrap();
        docs.apply_extraction(&ExtractionOutcomeUpdate {
            doc_id: doc_id.to_string(),
            year: 2025,
            content_hash: doc.content_hash.clone(),
            byte_size: 8,
            page_count: Some(1),
            has_text_layer: Some(true),
            method: Some(ExtractionMethod::DirectText),
            status: ExtractionStatus::Success,
            extraction_version: 1,
            confidence: Some(1.0),
            text_blob_path: None,
            error_detail: None,
        })
        .unwrap();
    }

    #[test]
    fn test_aggregates_from_small_fact_set() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let store = GoldStore::new(&db_path).unwrap();
        extracted_doc(&db_path, "1001");
        extracted_doc(&db_path, "1002");

        // Two members trading AAPL, one also selling MSFT
        let mut f2 = filing("1002", "P", "NY");
        f2.last_name = "Smith".to_string();
        let filings = vec![filing("1001", "P", "CA"), f2];

        let mut records = vec![
            transaction_record("a1", "1001", "AAPL"),
            transaction_record("a2", "1002", "AAPL"),
            transaction_record("a3", "1002", "MSFT"),
        ];
        records[2].transaction_type = Some(TransactionType::Sale);
        records[2].transaction_date = NaiveDate::from_ymd_opt(2025, 1, 5);
        records[1].owner = OwnerCode::Spouse;

        store.build_dimensions(&filings, &records).unwrap();
        store.build_facts(2025, &filings, &records).unwrap();
        let stats = store.build_aggregates(2025, &[7, 30]).unwrap();

        // AAPL in both windows; MSFT traded 5 days before as_of, also both
        assert_eq!(stats.ticker_windows, 4);
        assert_eq!(stats.member_rows, 2);
        assert_eq!(stats.pair_rows, 1);

        let conn = store.connect().unwrap();
        let (buys, sells): (i64, i64) = conn
            .query_row(
                "SELECT buy_count, sell_count FROM agg_ticker_activity
                 WHERE year = 2025 AND ticker = 'AAPL' AND window_days = 30",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!((buys, sells), (2, 0));

        let shared: i64 = conn
            .query_row(
                "SELECT shared_assets FROM agg_member_pairs WHERE year = 2025",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(shared, 1);
    }

    #[test]
    fn test_aggregates_rebuild_identically() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let store = GoldStore::new(&db_path).unwrap();
        extracted_doc(&db_path, "1001");

        let filings = vec![filing("1001", "P", "CA")];
        let records = vec![transaction_record("r1", "1001", "AAPL")];
        store.build_dimensions(&filings, &records).unwrap();
        store.build_facts(2025, &filings, &records).unwrap();

        store.build_aggregates(2025, &[7]).unwrap();
        let conn = store.connect().unwrap();
        let read = |conn: &rusqlite::Connection| -> (i64, i64) {
            conn.query_row(
                "SELECT buy_count, amount_mid_total FROM agg_ticker_activity
                 WHERE ticker = 'AAPL' AND window_days = 7",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap()
        };
        let first = read(&conn);
        store.build_aggregates(2025, &[7]).unwrap();
        assert_eq!(read(&conn), first);
    }

    #[test]
    fn test_document_quality_rows() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let store = GoldStore::new(&db_path).unwrap();
        extracted_doc(&db_path, "1001");

        let stats = store.build_aggregates(2025, &[]).unwrap();
        assert_eq!(stats.quality_rows, 1);

        let conn = store.connect().unwrap();
        let (method, count): (String, i64) = conn
            .query_row(
                "SELECT extraction_method, doc_count FROM agg_document_quality
                 WHERE year = 2025",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(method, "direct_text");
        assert_eq!(count, 1);
    }
}

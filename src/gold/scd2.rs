//! Slowly-changing-dimension engine (Type 2).
//!
//! One [`Scd2Table`] describes a dimension table: its business-key column
//! and the tracked attribute columns. `apply` compares the incoming
//! attribute snapshot against the current row for the key and either
//! no-ops, inserts a first row, or closes the current row and inserts a
//! successor. Historical rows are never updated in place.
//!
//! Effective ranges are half-open: a closed row's `effective_to` equals its
//! successor's `effective_from`. When several changes for one key land in
//! the same build pass, observation order is the effective ordering.

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scd2Outcome {
    /// Snapshot matches the current row.
    Unchanged,
    /// First row for this business key.
    Inserted,
    /// Current row closed, successor inserted.
    Superseded,
}

/// Static description of one SCD2 dimension table.
pub struct Scd2Table {
    pub table: &'static str,
    pub sk_col: &'static str,
    pub key_col: &'static str,
    pub attr_cols: &'static [&'static str],
}

impl Scd2Table {
    /// Apply one observed attribute snapshot for a business key.
    ///
    /// Callers run this inside the build transaction; `observed_at` is the
    /// build timestamp and becomes the effective boundary on change.
    pub fn apply(
        &self,
        conn: &Connection,
        key: &str,
        attrs: &[Option<String>],
        observed_at: &str,
    ) -> rusqlite::Result<Scd2Outcome> {
        debug_assert_eq!(attrs.len(), self.attr_cols.len());

        let select = format!(
            "SELECT {} FROM {} WHERE {} = ?1 AND is_current = 1",
            self.attr_cols.join(", "),
            self.table,
            self.key_col,
        );
        let current: Option<Vec<Option<String>>> = conn
            .query_row(&select, [key], |row| {
                (0..self.attr_cols.len())
                    .map(|i| row.get::<_, Option<String>>(i))
                    .collect()
            })
            .optional()?;

        match current {
            Some(existing) if existing == attrs => Ok(Scd2Outcome::Unchanged),
            Some(_) => {
                self.close_current(conn, key, observed_at)?;
                self.insert_current(conn, key, attrs, observed_at)?;
                Ok(Scd2Outcome::Superseded)
            }
            None => {
                self.insert_current(conn, key, attrs, observed_at)?;
                Ok(Scd2Outcome::Inserted)
            }
        }
    }

    /// Surrogate key of the current row for a business key.
    pub fn current_sk(&self, conn: &Connection, key: &str) -> rusqlite::Result<Option<i64>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 AND is_current = 1",
            self.sk_col, self.table, self.key_col,
        );
        conn.query_row(&sql, [key], |row| row.get(0)).optional()
    }

    fn close_current(&self, conn: &Connection, key: &str, observed_at: &str) -> rusqlite::Result<()> {
        let sql = format!(
            "UPDATE {} SET effective_to = ?2, is_current = 0 WHERE {} = ?1 AND is_current = 1",
            self.table, self.key_col,
        );
        conn.execute(&sql, [key, observed_at])?;
        Ok(())
    }

    fn insert_current(
        &self,
        conn: &Connection,
        key: &str,
        attrs: &[Option<String>],
        observed_at: &str,
    ) -> rusqlite::Result<()> {
        let sql = format!(
            "INSERT INTO {} ({}, {}, effective_from, effective_to, is_current)
             VALUES ({}, 1)",
            self.table,
            self.key_col,
            self.attr_cols.join(", "),
            // key + attrs + effective_from + effective_to
            vec!["?"; 1 + self.attr_cols.len() + 2].join(", "),
        );

        let mut values: Vec<Value> = Vec::with_capacity(attrs.len() + 3);
        values.push(Value::Text(key.to_string()));
        for attr in attrs {
            values.push(match attr {
                Some(s) => Value::Text(s.clone()),
                None => Value::Null,
            });
        }
        values.push(Value::Text(observed_at.to_string()));
        values.push(Value::Null);

        conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_DIM: Scd2Table = Scd2Table {
        table: "dim_test",
        sk_col: "test_sk",
        key_col: "test_key",
        attr_cols: &["name", "state"],
    };

    fn conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE dim_test (
                test_sk INTEGER PRIMARY KEY AUTOINCREMENT,
                test_key TEXT NOT NULL,
                name TEXT,
                state TEXT,
                effective_from TEXT NOT NULL,
                effective_to TEXT,
                is_current INTEGER NOT NULL
            );
            "#,
        )
        .unwrap();
        conn
    }

    fn attrs(name: &str, state: &str) -> Vec<Option<String>> {
        vec![Some(name.to_string()), Some(state.to_string())]
    }

    #[test]
    fn test_first_observation_inserts() {
        let conn = conn();
        let outcome = TEST_DIM
            .apply(&conn, "doe|jane", &attrs("Jane Doe", "CA"), "t1")
            .unwrap();
        assert_eq!(outcome, Scd2Outcome::Inserted);
        assert!(TEST_DIM.current_sk(&conn, "doe|jane").unwrap().is_some());
    }

    #[test]
    fn test_unchanged_snapshot_is_noop() {
        let conn = conn();
        TEST_DIM
            .apply(&conn, "doe|jane", &attrs("Jane Doe", "CA"), "t1")
            .unwrap();
        let sk_before = TEST_DIM.current_sk(&conn, "doe|jane").unwrap();

        let outcome = TEST_DIM
            .apply(&conn, "doe|jane", &attrs("Jane Doe", "CA"), "t2")
            .unwrap();
        assert_eq!(outcome, Scd2Outcome::Unchanged);
        assert_eq!(TEST_DIM.current_sk(&conn, "doe|jane").unwrap(), sk_before);
    }

    #[test]
    fn test_change_closes_and_inserts() {
        let conn = conn();
        TEST_DIM
            .apply(&conn, "doe|jane", &attrs("Jane Doe", "CA"), "t1")
            .unwrap();
        let outcome = TEST_DIM
            .apply(&conn, "doe|jane", &attrs("Jane Doe", "TX"), "t2")
            .unwrap();
        assert_eq!(outcome, Scd2Outcome::Superseded);

        let (closed_to, closed_current): (Option<String>, i64) = conn
            .query_row(
                "SELECT effective_to, is_current FROM dim_test
                 WHERE test_key = 'doe|jane' AND state = 'CA'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(closed_to.as_deref(), Some("t2"));
        assert_eq!(closed_current, 0);
    }

    #[test]
    fn test_at_most_one_current_row_per_key() {
        let conn = conn();
        for (state, ts) in [("CA", "t1"), ("TX", "t2"), ("NY", "t3"), ("NY", "t4")] {
            TEST_DIM
                .apply(&conn, "doe|jane", &attrs("Jane Doe", state), ts)
                .unwrap();
        }
        let current_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM dim_test WHERE test_key = 'doe|jane' AND is_current = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(current_count, 1);

        let total: i64 = conn
            .query_row("SELECT COUNT(*) FROM dim_test", [], |row| row.get(0))
            .unwrap();
        assert_eq!(total, 3);
    }

    #[test]
    fn test_ranges_do_not_overlap() {
        let conn = conn();
        // Two changes in the same pass share a timestamp; ranges stay
        // half-open and ordered by observation.
        for (state, ts) in [("CA", "t1"), ("TX", "t1"), ("NY", "t2")] {
            TEST_DIM
                .apply(&conn, "doe|jane", &attrs("Jane Doe", state), ts)
                .unwrap();
        }
        let mut stmt = conn
            .prepare(
                "SELECT effective_from, effective_to FROM dim_test
                 WHERE test_key = 'doe|jane' ORDER BY test_sk",
            )
            .unwrap();
        let ranges: Vec<(String, Option<String>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        for pair in ranges.windows(2) {
            let (_, prev_to) = &pair[0];
            let (next_from, _) = &pair[1];
            assert_eq!(prev_to.as_deref(), Some(next_from.as_str()));
        }
        assert!(ranges.last().unwrap().1.is_none());
    }
}

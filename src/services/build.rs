//! Dimensional build orchestration.
//!
//! One serialized pass per year: dimensions first, then facts, then
//! aggregates, all from the same Silver snapshot. The pass refuses to run
//! until extraction for the year is complete, so facts never publish
//! against a half-extracted year.

use crate::config::Settings;
use crate::gold::{AggregateStats, DimensionBuildStats, FactBuildStats, GoldStore};
use crate::repository::{DocumentRepository, FilingRepository, RecordRepository};

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub year: i32,
    pub dimensions: DimensionBuildStats,
    pub facts: FactBuildStats,
    pub aggregates: AggregateStats,
}

pub struct BuildService {
    filings: FilingRepository,
    records: RecordRepository,
    documents: DocumentRepository,
    gold: GoldStore,
    windows: Vec<u32>,
    extraction_version: i32,
}

impl BuildService {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let db_path = settings.database_path();
        Ok(Self {
            filings: FilingRepository::new(&db_path)?,
            records: RecordRepository::new(&db_path)?,
            documents: DocumentRepository::new(&db_path)?,
            gold: GoldStore::new(&db_path)?,
            windows: settings.gold.windows.clone(),
            extraction_version: settings.extraction.version,
        })
    }

    /// Build the star schema for one year.
    ///
    /// `force` skips the extraction-completeness gate, for partial-data
    /// inspection. Facts from a forced build are rebuilt identically once
    /// the year finishes, so forcing is safe but noisy.
    pub fn build_year(&self, year: i32, force: bool) -> anyhow::Result<BuildReport> {
        if !force && !self.year_ready(year)? {
            anyhow::bail!(
                "extraction for {year} is not complete at version {}; \
                 finish the extract pass or build with --force",
                self.extraction_version
            );
        }

        let filings = self.filings.list_by_year(year)?;
        if filings.is_empty() {
            anyhow::bail!("no filings ingested for {year}");
        }
        let records = self.records.list_active_for_year(year)?;

        tracing::info!(
            year,
            filings = filings.len(),
            records = records.len(),
            "starting dimensional build"
        );

        let dimensions = self.gold.build_dimensions(&filings, &records)?;
        let facts = self.gold.build_facts(year, &filings, &records)?;
        let aggregates = self.gold.build_aggregates(year, &self.windows)?;

        self.gold
            .set_watermark("build", year, self.extraction_version)?;

        tracing::info!(
            year,
            transactions = facts.transactions,
            holdings = facts.holdings,
            "dimensional build complete"
        );
        Ok(BuildReport {
            year,
            dimensions,
            facts,
            aggregates,
        })
    }

    fn year_ready(&self, year: i32) -> anyhow::Result<bool> {
        if let Some(mark) = self.gold.watermark("extraction", year)? {
            if mark.extraction_version >= self.extraction_version {
                return Ok(true);
            }
        }
        // The watermark is advanced by the extract pass; fall back to the
        // document table in case that run was interrupted after finishing.
        Ok(self
            .documents
            .year_extraction_complete(year, self.extraction_version)?)
    }
}

//! Service layer: the pipeline stages behind the CLI.
//!
//! Each service owns its repositories and does one stage of the medallion
//! pipeline. Stages communicate only through the database and the blob
//! stores, so any of them can be re-run independently.

pub mod build;
pub mod extract;
pub mod ingest;
pub mod parse;

#[allow(unused_imports)]
pub use build::{BuildReport, BuildService};
#[allow(unused_imports)]
pub use extract::{ExtractEvent, ExtractResult, ExtractService};
#[allow(unused_imports)]
pub use ingest::{IngestReport, IngestService};
#[allow(unused_imports)]
pub use parse::{ParseReport, ParseService};

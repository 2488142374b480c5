//! Data models for the disclosure pipeline.

mod document;
mod filing;
mod record;

pub use document::{Document, ExtractionMethod, ExtractionStatus, ParseStatus};
pub use filing::{Filing, FilingType};
pub use record::{AmountRange, OwnerCode, RecordKind, StructuredRecord, TransactionType};

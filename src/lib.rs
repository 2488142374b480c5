//! Disclose - financial disclosure extraction and analytics pipeline.
//!
//! Implements a three-tier medallion pipeline over disclosure PDFs:
//! raw archive (byte-faithful), normalized store (typed/validated), and
//! dimensional store (star schema with SCD2 dimensions and aggregates).

pub mod archive;
pub mod cli;
pub mod config;
pub mod extraction;
pub mod gold;
pub mod models;
pub mod parsing;
pub mod queue;
pub mod repository;
pub mod services;
pub mod silver;

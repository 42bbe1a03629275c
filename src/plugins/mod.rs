//! Pipeline stages: ingestion, compliance, correlation, rendering and
//! notification dispatch.

pub mod compliance;
pub mod correlate;
pub mod ingest;
pub mod notify;
pub mod render;

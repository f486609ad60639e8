//! Persisted schema versions.
//!
//! These strings are emitted as the first field of every persisted artifact
//! and must only change with a deliberate format migration.

pub const INGESTION_SCHEMA_VERSION: &str = "1.0.0";
pub const VERIFICATION_LEDGER_SCHEMA_VERSION: &str = "1.0.0";
pub const QUALITY_BASELINE_SCHEMA_VERSION: &str = "1.0.0";
pub const RELEASE_GATE_SCHEMA_VERSION: &str = "1.0.0";

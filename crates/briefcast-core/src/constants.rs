//! Package-level constants.

/// Current version of briefcast (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "briefcast";

/// Schema version stamped on every newly built event record.
pub const EVENT_SCHEMA_VERSION: &str = "1.0.0";

/// Major schema version this build knows how to read.
pub const SUPPORTED_SCHEMA_MAJOR: u64 = 1;

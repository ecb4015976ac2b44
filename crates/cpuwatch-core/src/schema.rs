//! Schema ID constants for JSON contracts.
//!
//! Every cpuwatch JSON document (CLI output and condition config input)
//! carries or is validated against a `schema_id`. These constants define the
//! canonical schema URLs.
//!
//! ## URI Structure
//!
//! ```text
//! https://schemas.3leaps.dev/<module>/<topic>/<version>/<filename>
//! ```
//!
//! Where:
//! - `module` = `cpuwatch`
//! - `topic` = feature area (`process`, `condition`)
//! - `version` = SemVer (e.g., `v1.0.0`)
//! - `filename` = schema file with `.schema.json` suffix
//!
//! cpuwatch does NOT perform runtime JSON schema validation. Input is guarded
//! by `serde(deny_unknown_fields)` plus explicit range checks.

/// Schema ID for process-tree CPU usage output (v1.0.0).
///
/// This schema defines the structure of `cpuwatch tree --json` output.
pub const TREE_USAGE_V1: &str =
    "https://schemas.3leaps.dev/cpuwatch/process/v1.0.0/tree-usage.schema.json";

/// Schema ID for a single condition evaluation (v1.0.0).
///
/// This schema defines one line of `cpuwatch watch --json` output.
pub const POLL_REPORT_V1: &str =
    "https://schemas.3leaps.dev/cpuwatch/condition/v1.0.0/poll-report.schema.json";

/// Schema ID for condition configuration input (v1.0.0).
pub const CONDITION_CONFIG_V1: &str =
    "https://schemas.3leaps.dev/cpuwatch/condition/v1.0.0/condition-config.schema.json";

/// Schema ID for error output on the CLI (v1.0.0).
pub const ERROR_REPORT_V1: &str =
    "https://schemas.3leaps.dev/cpuwatch/condition/v1.0.0/error-report.schema.json";

/// Base URL for cpuwatch schemas.
pub const SCHEMA_HOST: &str = "https://schemas.3leaps.dev";

/// Module name for cpuwatch in schema URIs.
pub const SCHEMA_MODULE: &str = "cpuwatch";

//! Front-end request parsing and validation.
//!
//! A request names the probe parameters (target(s), base configuration
//! tokens, save location) and the judge parameters (variant, flavor, mode).
//! It is validated against `schema/scan_request.schema.json` and then
//! against the closed variant/flavor table, so a malformed request fails
//! before any probe runs.

mod parser;
mod schema;

pub use parser::{JudgeParams, ProbeParams, ScanRequest};
pub use schema::{is_valid_request, validate_request_schema};

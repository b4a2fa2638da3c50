//! Output files handed to the persistence and scoring collaborators.
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! └── 2025-05-06/
//!     ├── ghana.json      # CountryReport, ranked articles first
//!     ├── kenya.json
//!     └── _run.json       # RunSummary: per-country counts and failures
//! ```

pub mod json;

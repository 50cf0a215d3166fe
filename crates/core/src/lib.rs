//! Core library for relatorio
//!
//! This crate implements the **Functional Core** of the relatorio application,
//! following the Functional Core - Imperative Shell architectural pattern.
//!
//! # Architecture Overview
//!
//! The relatorio project uses a three-crate architecture:
//!
//! - **`relatorio_core`** (this crate): Pure transformation functions with zero network I/O
//! - **`docx`**: The document package the reports are rendered into
//! - **`relatorio`**: I/O operations and orchestration (the Imperative Shell)
//!
//! ## Functional Core Principles
//!
//! All functions in this crate adhere to these principles:
//!
//! - **Pure functions**: Same input always produces the same output
//! - **Total coercion**: Malformed source values degrade to documented defaults
//! - **Explicit configuration**: Lookup tables are parsed once and passed in, never read
//!   from global state
//! - **Testable**: Can be tested with literal fixture data, no mocking required
//!
//! # Module Organization
//!
//! - [`record`]: Raw source values and the normalized attribute map
//! - [`coerce`]: Field coercers (composite splitting, dates, integers, currency, names)
//! - [`schema`]: The enumerated source-label → coercer → output-key table
//! - [`lookups`]: Directorate and division code tables
//! - [`normalize`]: Applies the schema to one raw record and builds the template context
//! - [`status`]: Report-type / process-type status resolution
//! - [`outline`]: Heading tree cleaning and flattening into a heading plan
//! - [`signature`]: The signature block appended after the closing section
//! - [`job`]: Report job submission, status model and bookkeeping helpers
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use relatorio_core::coerce::alternate_split;
//! use relatorio_core::record::RawValue;
//!
//! let value = RawValue::from("codeA;#ValueA;#codeB;#ValueB");
//! assert_eq!(alternate_split(&value), "ValueA, ValueB");
//! ```

pub mod coerce;
mod error;
pub mod job;
pub mod lookups;
pub mod normalize;
pub mod outline;
pub mod record;
pub mod schema;
pub mod signature;
pub mod status;

pub use error::ConfigError;

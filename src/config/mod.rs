//! Configuration parsing and types.
//!
//! - `types` - Config structure (`Config`, `ServiceConfig`, `EnvFileConfig`, `PatchConfig`)
//! - `parser` - YAML config discovery and parsing
//! - `validation` - Config validation

mod parser;
mod types;
mod validation;

pub use parser::*;
pub use types::*;

pub(crate) use validation::is_sql_identifier;

//! Input file parsing and validation.
//!
//! An input file is a JSON document holding one prompt template and an
//! ordered list of data points. It is validated against an embedded JSON
//! Schema before it is deserialized.

mod parser;
mod schema;

pub use parser::InputData;
pub use schema::validate_input_schema;

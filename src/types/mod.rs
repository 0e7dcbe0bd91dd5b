//! Literal values carried by expressions.

mod value;

pub use value::Value;

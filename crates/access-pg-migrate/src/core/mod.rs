//! Core types shared across the migration engine.
//!
//! - [`schema`]: table, column and foreign key metadata
//! - [`value`]: cell values, source records and transformed records

pub mod schema;
pub mod value;

pub use schema::{AccessType, Column, ForeignKeyRef, TableSchema};
pub use value::{Record, SqlValue, TransformedRecord};

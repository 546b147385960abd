//! Dialect-neutral building blocks: schema metadata and row values.

pub mod schema;
pub mod value;

pub use schema::{
    Column, DatabaseSchema, ForeignKey, Index, PrimaryKey, Table, TableKind, ViewDefinition,
};
pub use value::{Record, SqlValue};

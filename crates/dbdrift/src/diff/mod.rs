//! Schema and data diff engines.

pub mod data;
pub mod rule;
pub mod schema;

pub use data::{stream_compare_data, stream_compare_to_diff};
pub use rule::{create_compare_rule, CompareRule, FieldsEqualRule};
pub use schema::{compare_schemas, compare_schemas_with_adapters};

use std::fmt;

use crate::core::schema::{Column, ForeignKey, Index, PrimaryKey, Table, ViewDefinition};
use crate::core::value::Record;

/// Classification of one row in the data diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffType {
    /// Present in the source but not in the target.
    Add,
    /// Present in the target but not in the source.
    Drop,
    /// Present on both sides but unequal under the comparison rule.
    Modify,
}

impl fmt::Display for DiffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffType::Add => write!(f, "ADD"),
            DiffType::Drop => write!(f, "DROP"),
            DiffType::Modify => write!(f, "MODIFY"),
        }
    }
}

/// Structural difference between two database schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaDiff {
    pub tables_added: Vec<Table>,
    pub tables_dropped: Vec<Table>,
    pub tables_modified: Vec<TableDiff>,
}

/// All changes detected for one jointly present table.
#[derive(Debug, Clone)]
pub struct TableDiff {
    /// The target-side table the changes apply to.
    pub table: Table,
    pub columns_added: Vec<Column>,
    pub columns_dropped: Vec<Column>,
    pub columns_modified: Vec<ColumnDiff>,
    pub indexes_added: Vec<Index>,
    pub indexes_dropped: Vec<Index>,
    pub indexes_modified: Vec<IndexDiff>,
    pub primary_key_change: Option<PrimaryKeyDiff>,
    pub foreign_keys_added: Vec<ForeignKey>,
    pub foreign_keys_dropped: Vec<ForeignKey>,
    pub foreign_keys_modified: Vec<ForeignKeyDiff>,
    pub view_definition_change: Option<ViewDefinitionDiff>,
}

impl TableDiff {
    pub(crate) fn new(table: Table) -> Self {
        Self {
            table,
            columns_added: Vec::new(),
            columns_dropped: Vec::new(),
            columns_modified: Vec::new(),
            indexes_added: Vec::new(),
            indexes_dropped: Vec::new(),
            indexes_modified: Vec::new(),
            primary_key_change: None,
            foreign_keys_added: Vec::new(),
            foreign_keys_dropped: Vec::new(),
            foreign_keys_modified: Vec::new(),
            view_definition_change: None,
        }
    }

    /// True when no change of any category was recorded.
    pub fn is_empty(&self) -> bool {
        self.columns_added.is_empty()
            && self.columns_dropped.is_empty()
            && self.columns_modified.is_empty()
            && self.indexes_added.is_empty()
            && self.indexes_dropped.is_empty()
            && self.indexes_modified.is_empty()
            && self.primary_key_change.is_none()
            && self.foreign_keys_added.is_empty()
            && self.foreign_keys_dropped.is_empty()
            && self.foreign_keys_modified.is_empty()
            && self.view_definition_change.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct ColumnDiff {
    pub old: Column,
    pub new: Column,
}

#[derive(Debug, Clone)]
pub struct IndexDiff {
    pub old: Index,
    pub new: Index,
}

#[derive(Debug, Clone)]
pub struct PrimaryKeyDiff {
    pub old: Option<PrimaryKey>,
    pub new: Option<PrimaryKey>,
}

#[derive(Debug, Clone)]
pub struct ForeignKeyDiff {
    pub old: ForeignKey,
    pub new: ForeignKey,
}

#[derive(Debug, Clone)]
pub struct ViewDefinitionDiff {
    pub old: ViewDefinition,
    pub new: ViewDefinition,
}

/// Materialized result of a data diff.
#[derive(Debug, Clone, Default)]
pub struct DataDiff {
    pub added: Vec<Record>,
    pub dropped: Vec<Record>,
    pub modified: Vec<ModifiedRow>,
}

/// A row present on both sides with unequal compared columns.
#[derive(Debug, Clone)]
pub struct ModifiedRow {
    pub old: Record,
    pub new: Record,
}

//! Runtime module schema: the tables and reducers a connection speaks.
//!
//! The core is schema-generic: generated bindings describe their module with
//! these types at startup, and everything downstream (row decoding, cache
//! keys, callback table order) is driven by the description.

use std::collections::HashSet;

use sats::ProductType;

use crate::error::SchemaError;

/// One table's client-side schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: Box<str>,
    pub row_type: ProductType,
    /// Column index of the table's unique/primary-key column, if any.
    pub primary_key: Option<usize>,
}

impl TableSchema {
    /// Creates a table schema without a primary key.
    #[must_use]
    pub fn new(name: &str, row_type: ProductType) -> Self {
        Self {
            name: name.into(),
            row_type,
            primary_key: None,
        }
    }

    /// Sets the primary-key column index.
    #[must_use]
    pub const fn with_primary_key(mut self, column: usize) -> Self {
        self.primary_key = Some(column);
        self
    }
}

/// One reducer's client-side schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReducerSchema {
    pub name: Box<str>,
    /// Product of the reducer's parameters, in declared order.
    pub params: ProductType,
}

impl ReducerSchema {
    /// Creates a reducer schema.
    #[must_use]
    pub fn new(name: &str, params: ProductType) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }
}

/// A module's full client-side schema.
///
/// Table declaration order is load-bearing: per-diff row callbacks fire
/// table by table in this order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleSchema {
    tables: Vec<TableSchema>,
    reducers: Vec<ReducerSchema>,
}

impl ModuleSchema {
    /// Creates a schema from parts after validation.
    pub fn new(tables: Vec<TableSchema>, reducers: Vec<ReducerSchema>) -> Result<Self, SchemaError> {
        let schema = Self { tables, reducers };
        schema.validate()?;
        Ok(schema)
    }

    /// Creates a schema builder.
    #[must_use]
    pub fn builder() -> ModuleSchemaBuilder {
        ModuleSchemaBuilder::default()
    }

    /// The tables, in declaration order.
    #[must_use]
    pub fn tables(&self) -> &[TableSchema] {
        &self.tables
    }

    /// The reducers, in declaration order.
    #[must_use]
    pub fn reducers(&self) -> &[ReducerSchema] {
        &self.reducers
    }

    /// Looks up a table by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.iter().find(|t| &*t.name == name)
    }

    /// Looks up a reducer by name.
    #[must_use]
    pub fn reducer(&self, name: &str) -> Option<&ReducerSchema> {
        self.reducers.iter().find(|r| &*r.name == name)
    }

    /// Validates schema invariants.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut table_names = HashSet::new();
        for table in &self.tables {
            if !table_names.insert(&table.name) {
                return Err(SchemaError::DuplicateTable {
                    name: table.name.clone(),
                });
            }
            if let Some(column) = table.primary_key {
                let columns = table.row_type.elements.len();
                if column >= columns {
                    return Err(SchemaError::PrimaryKeyOutOfRange {
                        table: table.name.clone(),
                        column,
                        columns,
                    });
                }
            }
        }

        let mut reducer_names = HashSet::new();
        for reducer in &self.reducers {
            if !reducer_names.insert(&reducer.name) {
                return Err(SchemaError::DuplicateReducer {
                    name: reducer.name.clone(),
                });
            }
        }
        Ok(())
    }
}

/// Builder for [`ModuleSchema`].
#[derive(Debug, Default)]
pub struct ModuleSchemaBuilder {
    tables: Vec<TableSchema>,
    reducers: Vec<ReducerSchema>,
}

impl ModuleSchemaBuilder {
    /// Adds a table definition.
    #[must_use]
    pub fn table(mut self, table: TableSchema) -> Self {
        self.tables.push(table);
        self
    }

    /// Adds a reducer definition.
    #[must_use]
    pub fn reducer(mut self, reducer: ReducerSchema) -> Self {
        self.reducers.push(reducer);
        self
    }

    /// Builds the schema after validation.
    pub fn build(self) -> Result<ModuleSchema, SchemaError> {
        ModuleSchema::new(self.tables, self.reducers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sats::{AlgebraicType, BuiltinType, ProductElement};

    fn user_row() -> ProductType {
        ProductType::new(vec![
            ProductElement::new("identity", AlgebraicType::builtin(BuiltinType::U64)),
            ProductElement::new("name", AlgebraicType::builtin(BuiltinType::String)),
        ])
    }

    #[test]
    fn builder_builds_valid_schema() {
        let schema = ModuleSchema::builder()
            .table(TableSchema::new("user", user_row()).with_primary_key(0))
            .reducer(ReducerSchema::new("set_name", user_row()))
            .build()
            .unwrap();
        assert_eq!(schema.tables().len(), 1);
        assert_eq!(schema.reducers().len(), 1);
        assert!(schema.table("user").is_some());
        assert!(schema.table("message").is_none());
        assert!(schema.reducer("set_name").is_some());
    }

    #[test]
    fn duplicate_table_rejected() {
        let err = ModuleSchema::builder()
            .table(TableSchema::new("user", user_row()))
            .table(TableSchema::new("user", user_row()))
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateTable { name: "user".into() });
    }

    #[test]
    fn duplicate_reducer_rejected() {
        let err = ModuleSchema::builder()
            .reducer(ReducerSchema::new("go", ProductType::new(vec![])))
            .reducer(ReducerSchema::new("go", ProductType::new(vec![])))
            .build()
            .unwrap_err();
        assert_eq!(err, SchemaError::DuplicateReducer { name: "go".into() });
    }

    #[test]
    fn primary_key_out_of_range_rejected() {
        let err = ModuleSchema::builder()
            .table(TableSchema::new("user", user_row()).with_primary_key(2))
            .build()
            .unwrap_err();
        assert!(matches!(err, SchemaError::PrimaryKeyOutOfRange { column: 2, columns: 2, .. }));
    }

    #[test]
    fn declaration_order_is_preserved() {
        let schema = ModuleSchema::builder()
            .table(TableSchema::new("zebra", user_row()))
            .table(TableSchema::new("aardvark", user_row()))
            .build()
            .unwrap();
        let names: Vec<_> = schema.tables().iter().map(|t| &*t.name).collect();
        assert_eq!(names, ["zebra", "aardvark"]);
    }
}

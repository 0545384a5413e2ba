//! The client cache: per-table row sets and diff application.
//!
//! Rows are keyed by their encoded bytes, so equality is exact byte equality
//! and no ordering over values is needed. Tables with a primary key also
//! maintain a key index so a delete and an insert sharing a primary key can
//! be coalesced into an update.
//!
//! # Design Principles
//!
//! - **Apply, then announce** - [`ClientCache::apply_diff`] mutates every
//!   table before returning; callers dispatch callbacks from the returned
//!   [`AppliedDiff`] against settled state.
//! - **Decoded once** - Each row payload is decoded exactly once per diff;
//!   the diff owns its rows so dispatch never re-reads the cache.

use std::collections::HashMap;

use bytes::Bytes;
use sats::{from_slice, AlgebraicType, AlgebraicValue, ProductValue};
use tracing::warn;
use wire::DatabaseUpdate;

use crate::error::ApplyError;
use crate::schema::ModuleSchema;

/// One table's cached rows.
#[derive(Debug, Default)]
pub struct TableCache {
    /// Rows keyed by their encoded bytes.
    entries: HashMap<Bytes, ProductValue>,
    /// Primary-key value to row key, for tables that declare one.
    pk_index: HashMap<AlgebraicValue, Bytes>,
}

impl TableCache {
    /// Number of cached rows.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Iterates the cached rows in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &ProductValue> {
        self.entries.values()
    }

    /// Looks up a row by its encoded bytes.
    #[must_use]
    pub fn get(&self, row: &Bytes) -> Option<&ProductValue> {
        self.entries.get(row)
    }

    /// Looks up a row by primary-key value.
    ///
    /// Always `None` for tables without a primary key.
    #[must_use]
    pub fn get_by_pk(&self, key: &AlgebraicValue) -> Option<&ProductValue> {
        self.entries.get(self.pk_index.get(key)?)
    }
}

/// An insert and delete paired by primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowUpdate {
    pub old: ProductValue,
    pub new: ProductValue,
}

/// One table's share of an applied diff, rows decoded and coalesced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDiff {
    pub table_name: Box<str>,
    pub deletes: Vec<ProductValue>,
    pub updates: Vec<RowUpdate>,
    pub inserts: Vec<ProductValue>,
}

impl TableDiff {
    /// Returns `true` if the diff touched no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.updates.is_empty() && self.inserts.is_empty()
    }
}

/// The decoded, coalesced result of applying one database update.
///
/// Tables appear in module schema declaration order; tables the update did
/// not touch are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedDiff {
    pub tables: Vec<TableDiff>,
}

impl AppliedDiff {
    /// Returns `true` if no table changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(TableDiff::is_empty)
    }
}

struct CachedTable {
    name: Box<str>,
    row_type: AlgebraicType,
    primary_key: Option<usize>,
    cache: TableCache,
}

/// All cached tables for one connection.
pub struct ClientCache {
    tables: Vec<CachedTable>,
}

impl ClientCache {
    /// Creates an empty cache with one table per schema entry.
    #[must_use]
    pub fn new(schema: &ModuleSchema) -> Self {
        let tables = schema
            .tables()
            .iter()
            .map(|table| CachedTable {
                name: table.name.clone(),
                row_type: AlgebraicType::Product(table.row_type.clone()),
                primary_key: table.primary_key,
                cache: TableCache::default(),
            })
            .collect();
        Self { tables }
    }

    /// Looks up a table's cache by name.
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&TableCache> {
        self.tables
            .iter()
            .find(|table| &*table.name == name)
            .map(|table| &table.cache)
    }

    /// Applies a database update atomically and returns the decoded diff.
    ///
    /// Every table's deletes run before its inserts. For tables with a
    /// primary key, a delete and an insert sharing a key value become one
    /// entry in [`TableDiff::updates`]. Duplicate table blocks within the
    /// update are merged. On error the cache is left untouched.
    pub fn apply_diff(&mut self, update: &DatabaseUpdate) -> Result<AppliedDiff, ApplyError> {
        // Merge table blocks and decode every row before mutating anything,
        // so a decode failure cannot leave the cache half-applied.
        let mut decoded: Vec<DecodedTable> = Vec::new();
        for table_update in &update.tables {
            let index = self
                .tables
                .iter()
                .position(|table| table.name == table_update.table_name)
                .ok_or_else(|| ApplyError::UnknownTable {
                    name: table_update.table_name.clone(),
                })?;
            let row_type = &self.tables[index].row_type;
            let pos = match decoded.iter().position(|d| d.index == index) {
                Some(pos) => pos,
                None => {
                    decoded.push(DecodedTable {
                        index,
                        deletes: Vec::new(),
                        inserts: Vec::new(),
                    });
                    decoded.len() - 1
                }
            };
            let slot = &mut decoded[pos];
            for bytes in &table_update.deletes {
                let row = decode_row(bytes, row_type, &table_update.table_name)?;
                slot.deletes.push((bytes.clone(), row));
            }
            for bytes in &table_update.inserts {
                let row = decode_row(bytes, row_type, &table_update.table_name)?;
                slot.inserts.push((bytes.clone(), row));
            }
        }
        decoded.sort_by_key(|d| d.index);

        let mut diff = AppliedDiff::default();
        for table in decoded {
            let entry = &mut self.tables[table.index];
            diff.tables
                .push(apply_table(entry, table.deletes, table.inserts));
        }
        Ok(diff)
    }
}

impl std::fmt::Debug for ClientCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for table in &self.tables {
            map.entry(&table.name, &table.cache.count());
        }
        map.finish()
    }
}

struct DecodedTable {
    index: usize,
    deletes: Vec<(Bytes, ProductValue)>,
    inserts: Vec<(Bytes, ProductValue)>,
}

fn decode_row(bytes: &Bytes, row_type: &AlgebraicType, table: &str) -> Result<ProductValue, ApplyError> {
    let value = from_slice(bytes, row_type).map_err(|source| ApplyError::RowDecode {
        table: table.into(),
        source,
    })?;
    match value {
        AlgebraicValue::Product(row) => Ok(row),
        // Unreachable: row_type is always a product.
        _ => unreachable!("row type decoded to a non-product value"),
    }
}

fn pk_value(row: &ProductValue, column: usize) -> AlgebraicValue {
    row.field(column)
        .cloned()
        .unwrap_or_else(|| AlgebraicValue::Product(ProductValue::new(vec![])))
}

fn apply_table(
    entry: &mut CachedTable,
    mut deletes: Vec<(Bytes, ProductValue)>,
    inserts: Vec<(Bytes, ProductValue)>,
) -> TableDiff {
    let mut diff = TableDiff {
        table_name: entry.name.clone(),
        deletes: Vec::new(),
        updates: Vec::new(),
        inserts: Vec::new(),
    };

    // Pair deletes and inserts sharing a primary-key value into updates.
    let mut updates: Vec<(Bytes, ProductValue, Bytes, ProductValue)> = Vec::new();
    let mut plain_inserts: Vec<(Bytes, ProductValue)> = Vec::new();
    if let Some(column) = entry.primary_key {
        let mut by_pk: HashMap<AlgebraicValue, usize> = HashMap::new();
        for (i, (_, row)) in deletes.iter().enumerate() {
            by_pk.insert(pk_value(row, column), i);
        }
        let mut consumed = vec![false; deletes.len()];
        for (bytes, row) in inserts {
            match by_pk.remove(&pk_value(&row, column)) {
                Some(i) => {
                    consumed[i] = true;
                    let (old_bytes, old_row) = deletes[i].clone();
                    updates.push((old_bytes, old_row, bytes, row));
                }
                None => plain_inserts.push((bytes, row)),
            }
        }
        let mut remaining = Vec::new();
        for (i, pair) in deletes.into_iter().enumerate() {
            if !consumed[i] {
                remaining.push(pair);
            }
        }
        deletes = remaining;
    } else {
        plain_inserts = inserts;
    }

    // Deletes land before inserts so a row moving between keys never
    // transiently doubles.
    for (bytes, row) in deletes {
        if entry.cache.entries.remove(&bytes).is_none() {
            warn!(table = &*entry.name, "delete for a row not in the cache");
        }
        if let Some(column) = entry.primary_key {
            entry.cache.pk_index.remove(&pk_value(&row, column));
        }
        diff.deletes.push(row);
    }

    for (old_bytes, old_row, new_bytes, new_row) in updates {
        if entry.cache.entries.remove(&old_bytes).is_none() {
            warn!(table = &*entry.name, "update for a row not in the cache");
        }
        if let Some(column) = entry.primary_key {
            entry
                .cache
                .pk_index
                .insert(pk_value(&new_row, column), new_bytes.clone());
        }
        entry.cache.entries.insert(new_bytes, new_row.clone());
        diff.updates.push(RowUpdate {
            old: old_row,
            new: new_row,
        });
    }

    for (bytes, row) in plain_inserts {
        if let Some(column) = entry.primary_key {
            entry
                .cache
                .pk_index
                .insert(pk_value(&row, column), bytes.clone());
        }
        entry.cache.entries.insert(bytes, row.clone());
        diff.inserts.push(row);
    }

    diff
}

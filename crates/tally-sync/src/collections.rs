//! # In-Memory Collections
//!
//! The terminal's working copy of each table for the active business.
//!
//! Every mutation here is replace-by-id, so applying the same record or the
//! same delete twice leaves the collection unchanged.

use serde_json::Value;
use tally_core::{Entity, Product, Supplier, Table, Transaction, ValidationError};
use tracing::warn;

// =============================================================================
// Collection
// =============================================================================

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted,
    Replaced,
}

/// Ordered records of one table.
#[derive(Debug, Clone)]
pub struct Collection<T: Entity> {
    items: Vec<T>,
}

impl<T: Entity> Default for Collection<T> {
    fn default() -> Self {
        Collection { items: Vec::new() }
    }
}

impl<T: Entity> Collection<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.items.iter().find(|item| item.id() == id)
    }

    /// Replaces the record with the same id in place, or inserts it.
    ///
    /// New records go to the front for recency-ordered tables.
    pub fn upsert(&mut self, record: T) -> Upserted {
        match self.items.iter_mut().find(|item| item.id() == record.id()) {
            Some(existing) => {
                *existing = record;
                Upserted::Replaced
            }
            None if T::PREPEND_ON_INSERT => {
                self.items.insert(0, record);
                Upserted::Inserted
            }
            None => {
                self.items.push(record);
                Upserted::Inserted
            }
        }
    }

    /// Returns whether a record was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id() != id);
        self.items.len() != before
    }

    pub fn replace_all(&mut self, items: Vec<T>) {
        self.items = items;
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// The collection as a JSON array, as stored in the local cache.
    pub(crate) fn to_records(&self) -> Result<Value, ValidationError> {
        self.items
            .iter()
            .map(Entity::to_record)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

/// Normalizes raw records, dropping (and logging) the invalid ones.
pub fn decode_records<T: Entity>(records: Vec<Value>) -> (Vec<T>, usize) {
    let mut rejected = 0;
    let items = records
        .into_iter()
        .filter_map(|record| match T::from_record(record) {
            Ok(item) => Some(item),
            Err(e) => {
                rejected += 1;
                warn!(table = %T::TABLE, error = %e, "Dropping invalid record");
                None
            }
        })
        .collect();
    (items, rejected)
}

// =============================================================================
// Collections
// =============================================================================

/// Every table of the active business.
#[derive(Debug, Clone, Default)]
pub struct Collections {
    pub products: Collection<Product>,
    pub transactions: Collection<Transaction>,
    pub suppliers: Collection<Supplier>,
}

/// Typed access to the collection an entity lives in.
pub trait Stored: Entity {
    fn collection(all: &Collections) -> &Collection<Self>;
    fn collection_mut(all: &mut Collections) -> &mut Collection<Self>;
}

impl Stored for Product {
    fn collection(all: &Collections) -> &Collection<Self> {
        &all.products
    }
    fn collection_mut(all: &mut Collections) -> &mut Collection<Self> {
        &mut all.products
    }
}

impl Stored for Transaction {
    fn collection(all: &Collections) -> &Collection<Self> {
        &all.transactions
    }
    fn collection_mut(all: &mut Collections) -> &mut Collection<Self> {
        &mut all.transactions
    }
}

impl Stored for Supplier {
    fn collection(all: &Collections) -> &Collection<Self> {
        &all.suppliers
    }
    fn collection_mut(all: &mut Collections) -> &mut Collection<Self> {
        &mut all.suppliers
    }
}

impl Collections {
    pub fn of<T: Stored>(&self) -> &Collection<T> {
        T::collection(self)
    }

    pub fn of_mut<T: Stored>(&mut self) -> &mut Collection<T> {
        T::collection_mut(self)
    }

    pub fn len(&self, table: Table) -> usize {
        match table {
            Table::Products => self.products.len(),
            Table::Transactions => self.transactions.len(),
            Table::Suppliers => self.suppliers.len(),
        }
    }

    pub fn remove(&mut self, table: Table, id: &str) -> bool {
        match table {
            Table::Products => self.products.remove(id),
            Table::Transactions => self.transactions.remove(id),
            Table::Suppliers => self.suppliers.remove(id),
        }
    }

    /// Replaces a whole table from raw records. Returns `(kept, rejected)`.
    pub fn replace_from_records(&mut self, table: Table, records: Vec<Value>) -> (usize, usize) {
        fn replace<T: Stored>(all: &mut Collections, records: Vec<Value>) -> (usize, usize) {
            let (items, rejected) = decode_records::<T>(records);
            let kept = items.len();
            all.of_mut::<T>().replace_all(items);
            (kept, rejected)
        }

        match table {
            Table::Products => replace::<Product>(self, records),
            Table::Transactions => replace::<Transaction>(self, records),
            Table::Suppliers => replace::<Supplier>(self, records),
        }
    }

    /// The table as a JSON array, as stored in the local cache.
    pub fn snapshot(&self, table: Table) -> Result<Value, ValidationError> {
        match table {
            Table::Products => self.products.to_records(),
            Table::Transactions => self.transactions.to_records(),
            Table::Suppliers => self.suppliers.to_records(),
        }
    }

    pub fn clear(&mut self) {
        self.products.clear();
        self.transactions.clear();
        self.suppliers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{product, transaction};
    use serde_json::json;

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut products = Collection::<Product>::default();
        assert_eq!(products.upsert(product("p1", 100, 5)), Upserted::Inserted);
        assert_eq!(products.upsert(product("p2", 100, 5)), Upserted::Inserted);
        assert_eq!(products.upsert(product("p1", 250, 2)), Upserted::Replaced);

        assert_eq!(products.len(), 2);
        assert_eq!(products.items()[0].id, "p1");
        assert_eq!(products.items()[0].price_cents, 250);
    }

    #[test]
    fn test_transactions_prepend() {
        let mut all = Collections::default();
        all.of_mut::<Transaction>().upsert(transaction("t1", "p1", 1));
        all.of_mut::<Transaction>().upsert(transaction("t2", "p1", 1));

        let ids: Vec<&str> = all.transactions.items().iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t1"]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut all = Collections::default();
        all.products.upsert(product("p1", 100, 1));
        assert!(all.remove(Table::Products, "p1"));
        assert!(!all.remove(Table::Products, "p1"));
        assert_eq!(all.len(Table::Products), 0);
    }

    #[test]
    fn test_replace_from_records_drops_invalid() {
        let mut all = Collections::default();
        all.products.upsert(product("old", 100, 1));

        let good = product("p1", 100, 1).to_record().unwrap();
        let (kept, rejected) =
            all.replace_from_records(Table::Products, vec![good, json!({ "id": "broken" })]);

        assert_eq!((kept, rejected), (1, 1));
        assert!(all.products.get("old").is_none());
        assert!(all.products.get("p1").is_some());
    }

    #[test]
    fn test_snapshot_round_trips() {
        let mut all = Collections::default();
        all.products.upsert(product("p1", 100, 3));
        let snapshot = all.snapshot(Table::Products).unwrap();

        let mut restored = Collections::default();
        let records = snapshot.as_array().cloned().unwrap_or_default();
        restored.replace_from_records(Table::Products, records);
        assert_eq!(restored.products.items(), all.products.items());
    }
}

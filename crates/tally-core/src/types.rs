//! # Domain Types
//!
//! Records, queue entries and change notifications shared by every crate.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Persisted records (Entity)        Sync plumbing                        │
//! │  ┌─────────────┐ ┌──────────────┐  ┌───────────────┐ ┌──────────────┐  │
//! │  │  Product    │ │ Transaction  │  │ PendingAction │ │ ChangeEvent  │  │
//! │  │  stock ≥ 0  │ │ amount frozen│  │ FIFO per table│ │ ephemeral    │  │
//! │  └─────────────┘ └──────────────┘  └───────────────┘ └──────────────┘  │
//! │  ┌─────────────┐                   ┌───────────────┐                    │
//! │  │  Supplier   │                   │SyncDiagnostic │ (derived)          │
//! │  └─────────────┘                   └───────────────┘                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Boundary Normalization
//! Records from the remote store or the cache are loosely shaped JSON. They
//! enter the domain only through [`Entity::from_record`], which deserializes
//! with defaulted optional fields, normalizes, and validates.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::validation::{
    validate_id, validate_non_negative, validate_price_cents, validate_product_name,
    validate_quantity, validate_sku, ValidationResult,
};

// =============================================================================
// Rates
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so 1200 bps = 12%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

/// Discount rate in basis points, always within 0..=10000 (0% to 100%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscountRate(u32);

impl DiscountRate {
    /// Creates a discount rate, clamping anything above 100%.
    #[inline]
    pub fn from_bps(bps: u32) -> Self {
        DiscountRate(bps.min(10_000))
    }

    /// Creates a discount rate from a percentage entered at the till.
    ///
    /// Values are clamped to `0..=100`; non-finite input means no discount.
    pub fn from_percent(percent: f64) -> Self {
        if !percent.is_finite() {
            return DiscountRate(0);
        }
        let clamped = percent.clamp(0.0, 100.0);
        DiscountRate((clamped * 100.0).round() as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }
}

// =============================================================================
// Tables
// =============================================================================

/// An entity collection known to both the local cache and the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Products,
    Transactions,
    Suppliers,
}

impl Table {
    /// Every table the terminal keeps in memory.
    pub const ALL: [Table; 3] = [Table::Products, Table::Transactions, Table::Suppliers];

    /// Wire name of the table.
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Products => "products",
            Table::Transactions => "transactions",
            Table::Suppliers => "suppliers",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Table {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "products" => Ok(Table::Products),
            "transactions" => Ok(Table::Transactions),
            "suppliers" => Ok(Table::Suppliers),
            _ => Err(ValidationError::NotAllowed {
                field: "table".to_string(),
                allowed: Table::ALL.iter().map(|t| t.as_str().to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Entity Trait
// =============================================================================

/// A record type stored per business in one [`Table`].
///
/// Identity is the `id` field; every merge and every replay is a
/// replace-by-id, which is what makes them idempotent.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table this entity lives in.
    const TABLE: Table;

    /// Whether new records go to the front of the in-memory collection.
    const PREPEND_ON_INSERT: bool = false;

    fn id(&self) -> &str;

    fn business_id(&self) -> &str;

    /// Fixes up representable-but-sloppy input (whitespace, negative stock).
    fn normalize(&mut self) {}

    /// Input rules for records created or edited at this terminal.
    fn validate(&self) -> ValidationResult<()>;

    /// The minimum a record needs to be stored and merged by id.
    ///
    /// Records from the remote store are authoritative, so they are held to
    /// this and not to the input rules of [`Entity::validate`].
    fn check_structure(&self) -> ValidationResult<()> {
        validate_id(self.id())
    }

    /// Builds an entity from a record the remote store or the cache holds.
    fn from_record(record: Value) -> ValidationResult<Self> {
        let mut entity: Self =
            serde_json::from_value(record).map_err(|e| ValidationError::InvalidFormat {
                field: Self::TABLE.as_str().to_string(),
                reason: e.to_string(),
            })?;
        entity.normalize();
        entity.check_structure()?;
        Ok(entity)
    }

    /// Serializes the entity into the record shape the remote store expects.
    fn to_record(&self) -> ValidationResult<Value> {
        serde_json::to_value(self).map_err(|e| ValidationError::InvalidFormat {
            field: Self::TABLE.as_str().to_string(),
            reason: e.to_string(),
        })
    }
}

/// Extracts the `id` of a raw record, if it has a non-empty string id.
pub fn record_id(record: &Value) -> Option<&str> {
    record
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
}

/// Extracts the `business_id` of a raw record, if present.
pub fn record_business_id(record: &Value) -> Option<&str> {
    record.get("business_id").and_then(Value::as_str)
}

// =============================================================================
// Product
// =============================================================================

/// A product available for sale.
///
/// `stock` is never negative. It is lowered by the stock ledger and edited
/// by inventory changes; deletion always goes through the write queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    pub id: String,

    pub business_id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name shown to cashier and on receipt.
    pub name: String,

    #[serde(default)]
    pub category: String,

    /// Unit price in cents.
    pub price_cents: i64,

    /// Units on hand.
    #[serde(default)]
    pub stock: i64,

    /// Reference to a [`Supplier`] record.
    #[serde(default)]
    pub supplier_id: Option<String>,

    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Checks if the known stock covers `quantity`.
    pub fn can_sell(&self, quantity: i64) -> bool {
        self.stock >= quantity
    }

    /// Returns a copy with stock lowered by `quantity`, floored at zero.
    pub fn with_stock_decremented(&self, quantity: i64) -> Product {
        let mut next = self.clone();
        next.stock = (self.stock - quantity.max(0)).max(0);
        next.updated_at = Some(Utc::now());
        next
    }
}

impl Entity for Product {
    const TABLE: Table = Table::Products;

    fn id(&self) -> &str {
        &self.id
    }

    fn business_id(&self) -> &str {
        &self.business_id
    }

    fn normalize(&mut self) {
        self.sku = self.sku.trim().to_string();
        self.name = self.name.trim().to_string();
        self.category = self.category.trim().to_string();
        self.stock = self.stock.max(0);
        if self.supplier_id.as_deref().is_some_and(|s| s.trim().is_empty()) {
            self.supplier_id = None;
        }
    }

    fn validate(&self) -> ValidationResult<()> {
        validate_id(&self.id)?;
        validate_sku(&self.sku)?;
        validate_product_name(&self.name)?;
        validate_price_cents(self.price_cents)?;
        validate_non_negative("stock", self.stock)?;
        Ok(())
    }
}

// =============================================================================
// Supplier
// =============================================================================

/// A supplier referenced by products.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Supplier {
    pub id: String,
    pub business_id: String,
    pub name: String,
    #[serde(default)]
    pub contact_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Entity for Supplier {
    const TABLE: Table = Table::Suppliers;

    fn id(&self) -> &str {
        &self.id
    }

    fn business_id(&self) -> &str {
        &self.business_id
    }

    fn normalize(&mut self) {
        self.name = self.name.trim().to_string();
    }

    fn validate(&self) -> ValidationResult<()> {
        validate_id(&self.id)?;
        if self.name.is_empty() {
            return Err(ValidationError::Required {
                field: "name".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// The status of a committed sale line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Completed,
    Refunded,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Completed => write!(f, "completed"),
            TransactionStatus::Refunded => write!(f, "refunded"),
        }
    }
}

/// Payment instrument offered at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash; requires a tendered amount.
    Cash,
    /// Card on an external terminal.
    Card,
    BankTransfer,
    MobileWallet,
}

impl PaymentMethod {
    /// Cash is the only method that collects a tendered amount at the till.
    pub fn requires_tender(&self) -> bool {
        matches!(self, PaymentMethod::Cash)
    }
}

/// One committed sale line.
///
/// `amount_cents` is frozen at sale time as unit price × quantity and is
/// never recomputed. The only permitted mutation is [`Transaction::refund`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Transaction {
    pub id: String,

    /// Shared by every line of the same sale.
    pub sale_id: String,

    pub business_id: String,

    pub product_id: String,

    pub quantity: i64,

    pub amount_cents: i64,

    pub payment_method: PaymentMethod,

    #[serde(default)]
    pub status: TransactionStatus,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Creates a completed line for `sale_id`, freezing its amount.
    pub fn completed(
        sale_id: &str,
        business_id: &str,
        product_id: &str,
        unit_price: Money,
        quantity: i64,
        payment_method: PaymentMethod,
        created_at: DateTime<Utc>,
    ) -> Self {
        Transaction {
            id: Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            business_id: business_id.to_string(),
            product_id: product_id.to_string(),
            quantity,
            amount_cents: unit_price.multiply_quantity(quantity).cents(),
            payment_method,
            status: TransactionStatus::Completed,
            created_at,
        }
    }

    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// Moves the line from Completed to Refunded.
    pub fn refund(&self) -> CoreResult<Transaction> {
        if self.status != TransactionStatus::Completed {
            return Err(CoreError::InvalidStatusTransition {
                id: self.id.clone(),
                current: self.status.to_string(),
                requested: TransactionStatus::Refunded.to_string(),
            });
        }
        let mut refunded = self.clone();
        refunded.status = TransactionStatus::Refunded;
        Ok(refunded)
    }
}

impl Entity for Transaction {
    const TABLE: Table = Table::Transactions;
    const PREPEND_ON_INSERT: bool = true;

    fn id(&self) -> &str {
        &self.id
    }

    fn business_id(&self) -> &str {
        &self.business_id
    }

    fn validate(&self) -> ValidationResult<()> {
        validate_id(&self.id)?;
        validate_id(&self.product_id)?;
        validate_quantity(self.quantity)?;
        validate_non_negative("amount", self.amount_cents)?;
        Ok(())
    }

    fn check_structure(&self) -> ValidationResult<()> {
        validate_id(&self.id)?;
        validate_id(&self.product_id)
    }
}

// =============================================================================
// Pending Action
// =============================================================================

/// Kind of queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MutationOp {
    Upsert,
    Delete,
}

impl std::fmt::Display for MutationOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MutationOp::Upsert => write!(f, "upsert"),
            MutationOp::Delete => write!(f, "delete"),
        }
    }
}

/// A mutation not yet acknowledged by the remote store.
///
/// Entries replay per table in `seq` order and are removed only after the
/// remote acknowledges them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PendingAction {
    pub id: String,

    /// Enqueue order; strictly increasing across the whole queue.
    pub seq: u64,

    pub table: Table,

    pub operation: MutationOp,

    /// Id of the record the action targets.
    pub record_id: String,

    /// Full record for upserts, `{ "id": .. }` for deletes.
    pub payload: Value,

    pub business_id: String,

    #[ts(as = "String")]
    pub enqueued_at: DateTime<Utc>,

    #[serde(default)]
    pub attempts: u32,

    #[serde(default)]
    pub last_error: Option<String>,
}

impl PendingAction {
    pub fn upsert(seq: u64, table: Table, business_id: &str, record_id: &str, payload: Value) -> Self {
        Self::build(seq, table, MutationOp::Upsert, business_id, record_id, payload)
    }

    pub fn delete(seq: u64, table: Table, business_id: &str, record_id: &str) -> Self {
        let payload = serde_json::json!({ "id": record_id });
        Self::build(seq, table, MutationOp::Delete, business_id, record_id, payload)
    }

    fn build(
        seq: u64,
        table: Table,
        operation: MutationOp,
        business_id: &str,
        record_id: &str,
        payload: Value,
    ) -> Self {
        PendingAction {
            id: Uuid::new_v4().to_string(),
            seq,
            table,
            operation,
            record_id: record_id.to_string(),
            payload,
            business_id: business_id.to_string(),
            enqueued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }
}

// =============================================================================
// Change Event
// =============================================================================

/// Operation carried by a realtime change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

/// An inbound change notification. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ChangeEvent {
    pub table: Table,
    pub operation: ChangeOperation,
    pub payload: Value,
}

impl ChangeEvent {
    pub fn new(table: Table, operation: ChangeOperation, payload: Value) -> Self {
        ChangeEvent {
            table,
            operation,
            payload,
        }
    }

    pub fn record_id(&self) -> Option<&str> {
        record_id(&self.payload)
    }
}

// =============================================================================
// Sync Diagnostic
// =============================================================================

/// Sentinel `cloud_count` when the remote store cannot be reached.
pub const CLOUD_COUNT_UNREACHABLE: i64 = -1;

/// Result of asking the remote store for a table's row count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudCount {
    Count(i64),
    /// Network failure or timeout.
    Offline,
    /// The remote answered with a failure.
    Failed,
}

/// Drift classification of one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStatus {
    Synced,
    Discrepancy,
    Offline,
    Error,
}

impl DiagnosticStatus {
    /// Classifies a table from its local count, remote count and queue depth.
    ///
    /// Equal counts with a non-empty queue are still a discrepancy: the
    /// remote has not seen every local change yet.
    pub fn classify(local_count: i64, cloud: CloudCount, pending_actions: i64) -> Self {
        match cloud {
            CloudCount::Offline => DiagnosticStatus::Offline,
            CloudCount::Failed => DiagnosticStatus::Error,
            CloudCount::Count(count) if count == local_count && pending_actions == 0 => {
                DiagnosticStatus::Synced
            }
            CloudCount::Count(_) => DiagnosticStatus::Discrepancy,
        }
    }
}

/// Per-table comparison of local vs. remote state. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncDiagnostic {
    pub table: Table,
    pub local_count: i64,
    /// [`CLOUD_COUNT_UNREACHABLE`] when the remote could not answer.
    pub cloud_count: i64,
    pub pending_actions: i64,
    pub status: DiagnosticStatus,
}

impl SyncDiagnostic {
    pub fn new(table: Table, local_count: i64, cloud: CloudCount, pending_actions: i64) -> Self {
        let cloud_count = match cloud {
            CloudCount::Count(count) => count,
            CloudCount::Offline | CloudCount::Failed => CLOUD_COUNT_UNREACHABLE,
        };
        SyncDiagnostic {
            table,
            local_count,
            cloud_count,
            pending_actions,
            status: DiagnosticStatus::classify(local_count, cloud, pending_actions),
        }
    }
}

// =============================================================================
// Session
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
}

/// Tenant scope for every record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Business {
    pub id: String,
    pub name: String,
    /// Overrides the configured tax rate when present.
    #[serde(default)]
    pub tax_rate_bps: Option<u32>,
}

/// Persisted session marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Session {
    pub user: AuthUser,
    pub business: Business,
    #[ts(as = "String")]
    pub signed_in_at: DateTime<Utc>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn product_record() -> Value {
        json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "business_id": "biz-1",
            "sku": "  COKE-330 ",
            "name": "Coca-Cola 330ml",
            "price_cents": 150,
            "stock": -4
        })
    }

    #[test]
    fn test_product_from_record_normalizes() {
        let product = Product::from_record(product_record()).unwrap();
        assert_eq!(product.sku, "COKE-330");
        assert_eq!(product.stock, 0);
        assert_eq!(product.category, "");
        assert_eq!(product.supplier_id, None);
    }

    #[test]
    fn test_product_from_record_rejects_missing_fields() {
        let err = Product::from_record(json!({ "id": "x" })).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidFormat { .. }));
    }

    #[test]
    fn test_remote_records_skip_input_rules() {
        let mut record = product_record();
        record["sku"] = json!("A/B-12");
        let product = Product::from_record(record).unwrap();
        assert_eq!(product.sku, "A/B-12");
        assert!(product.validate().is_err());

        let bulk = Transaction::from_record(json!({
            "id": "t1", "sale_id": "s1", "business_id": "biz-1", "product_id": "p1",
            "quantity": 5_000, "amount_cents": 500_000, "payment_method": "card",
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        assert!(bulk.validate().is_err());

        assert!(Product::from_record(json!({
            "id": " ", "business_id": "b", "sku": "A", "name": "A", "price_cents": 1
        }))
        .is_err());
    }

    #[test]
    fn test_decrement_never_goes_negative() {
        let product = Product::from_record(json!({
            "id": "p1", "business_id": "b", "sku": "A", "name": "A",
            "price_cents": 100, "stock": 3
        }))
        .unwrap();

        for qty in [0, 1, 3, 5, 1_000, -2] {
            let next = product.with_stock_decremented(qty);
            assert!(next.stock >= 0);
            assert!(next.stock <= product.stock);
        }
        assert_eq!(product.with_stock_decremented(2).stock, 1);
        assert_eq!(product.with_stock_decremented(5).stock, 0);
    }

    #[test]
    fn test_transaction_amount_is_frozen() {
        let tx = Transaction::completed(
            "sale-1",
            "biz-1",
            "p1",
            Money::from_cents(10_000),
            2,
            PaymentMethod::Cash,
            Utc::now(),
        );
        assert_eq!(tx.amount_cents, 20_000);
        assert_eq!(tx.status, TransactionStatus::Completed);

        let refunded = tx.refund().unwrap();
        assert_eq!(refunded.status, TransactionStatus::Refunded);
        assert_eq!(refunded.amount_cents, tx.amount_cents);
        assert!(refunded.refund().is_err());
    }

    #[test]
    fn test_table_round_trip_names() {
        assert_eq!("products".parse::<Table>().unwrap(), Table::Products);
        assert_eq!(" Suppliers ".parse::<Table>().unwrap(), Table::Suppliers);
        assert!("customers".parse::<Table>().is_err());
        assert_eq!(Table::Transactions.to_string(), "transactions");
    }

    #[test]
    fn test_change_event_wire_shape() {
        let event: ChangeEvent = serde_json::from_value(json!({
            "table": "transactions",
            "operation": "DELETE",
            "payload": { "id": "t1" }
        }))
        .unwrap();
        assert_eq!(event.operation, ChangeOperation::Delete);
        assert_eq!(event.record_id(), Some("t1"));
    }

    #[test]
    fn test_discount_rate_clamps() {
        assert_eq!(DiscountRate::from_percent(150.0).bps(), 10_000);
        assert_eq!(DiscountRate::from_percent(-5.0).bps(), 0);
        assert_eq!(DiscountRate::from_percent(f64::NAN).bps(), 0);
        assert_eq!(DiscountRate::from_percent(10.0).bps(), 1_000);
        assert_eq!(DiscountRate::from_bps(20_000).bps(), 10_000);
    }

    #[test]
    fn test_diagnostic_classification() {
        use DiagnosticStatus::*;
        assert_eq!(DiagnosticStatus::classify(5, CloudCount::Count(5), 0), Synced);
        assert_eq!(DiagnosticStatus::classify(5, CloudCount::Count(4), 0), Discrepancy);
        assert_eq!(DiagnosticStatus::classify(5, CloudCount::Count(5), 2), Discrepancy);
        assert_eq!(DiagnosticStatus::classify(5, CloudCount::Offline, 0), Offline);
        assert_eq!(DiagnosticStatus::classify(5, CloudCount::Failed, 0), Error);

        let diag = SyncDiagnostic::new(Table::Products, 3, CloudCount::Offline, 1);
        assert_eq!(diag.cloud_count, CLOUD_COUNT_UNREACHABLE);
    }

    #[test]
    fn test_pending_delete_payload_carries_id() {
        let action = PendingAction::delete(7, Table::Transactions, "biz", "t1");
        assert_eq!(action.seq, 7);
        assert_eq!(record_id(&action.payload), Some("t1"));
        assert_eq!(action.operation, MutationOp::Delete);
    }
}

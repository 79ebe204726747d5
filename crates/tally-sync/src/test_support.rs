//! Fixtures shared by the unit tests of this crate.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tally_core::{Money, PaymentMethod, Product, Transaction, TransactionStatus};
use tally_db::MemoryCache;

use crate::config::TallyConfig;
use crate::context::SyncContext;
use crate::remote::InMemoryRemote;

pub const BUSINESS: &str = "biz-1";

/// Short enough that hanging-remote tests finish quickly.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(100);

pub async fn context() -> (Arc<SyncContext>, Arc<InMemoryRemote>, Arc<MemoryCache>) {
    let remote = Arc::new(InMemoryRemote::new());
    let cache = Arc::new(MemoryCache::new());
    let ctx = SyncContext::new(remote.clone(), cache.clone(), TEST_TIMEOUT)
        .await
        .expect("context");
    (Arc::new(ctx), remote, cache)
}

pub fn test_config() -> TallyConfig {
    let mut config = TallyConfig::default();
    config.device.id = "test-terminal".into();
    config.remote.request_timeout_secs = 1;
    config.pos.tax_rate_bps = 1200;
    config
}

pub fn product(id: &str, price_cents: i64, stock: i64) -> Product {
    Product {
        id: id.to_string(),
        business_id: BUSINESS.to_string(),
        sku: format!("SKU-{}", id.to_uppercase()),
        name: format!("Product {}", id),
        category: "General".into(),
        price_cents,
        stock,
        supplier_id: None,
        updated_at: None,
    }
}

pub fn transaction(id: &str, product_id: &str, quantity: i64) -> Transaction {
    Transaction {
        id: id.to_string(),
        sale_id: format!("sale-{}", id),
        business_id: BUSINESS.to_string(),
        product_id: product_id.to_string(),
        quantity,
        amount_cents: Money::from_cents(100).multiply_quantity(quantity).cents(),
        payment_method: PaymentMethod::Cash,
        status: TransactionStatus::Completed,
        created_at: Utc::now(),
    }
}

//! In-memory commodity and order stores.
//!
//! Back the coordinator and worker tests, mirroring the Postgres
//! repositories' observable behavior. `set_fail_create` injects a persist
//! failure to exercise the counter-compensation path.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::core_types::{CommodityId, OrderId, UserId};
use crate::models::{Commodity, NewOrder, Order};

use super::{CommodityStore, NewCommodity, OrderStore, PersistError};

#[derive(Default)]
pub struct MemoryCommodityStore {
    rows: Mutex<HashMap<CommodityId, Commodity>>,
    next_id: AtomicI64,
    fail_discount: AtomicBool,
}

impl MemoryCommodityStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    /// Insert a row directly, bypassing the zero-stock creation default.
    pub fn seed(&self, id: CommodityId, name: &str, stock: i64) {
        let now = Utc::now();
        self.rows.lock().unwrap().insert(
            id,
            Commodity {
                id,
                name: name.to_string(),
                price: rust_decimal::Decimal::ZERO,
                stock,
                status: true,
                created_at: now,
                updated_at: now,
            },
        );
        self.next_id.fetch_max(id + 1, Ordering::SeqCst);
    }

    pub fn set_fail_discount(&self, fail: bool) {
        self.fail_discount.store(fail, Ordering::SeqCst);
    }

    pub fn stock_of(&self, id: CommodityId) -> Option<i64> {
        self.rows.lock().unwrap().get(&id).map(|c| c.stock)
    }
}

#[async_trait]
impl CommodityStore for MemoryCommodityStore {
    async fn create(&self, new: NewCommodity) -> Result<Commodity, PersistError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let commodity = Commodity {
            id,
            name: new.name,
            price: new.price,
            stock: 0,
            status: true,
            created_at: now,
            updated_at: now,
        };
        self.rows.lock().unwrap().insert(id, commodity.clone());
        Ok(commodity)
    }

    async fn update(&self, commodity: &Commodity) -> Result<(), PersistError> {
        let mut rows = self.rows.lock().unwrap();
        let existing = rows.get_mut(&commodity.id).ok_or(PersistError::NotFound)?;
        existing.name = commodity.name.clone();
        existing.price = commodity.price;
        existing.stock = commodity.stock;
        existing.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: CommodityId) -> Result<(), PersistError> {
        self.rows
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(PersistError::NotFound)
    }

    async fn find_by_id(&self, id: CommodityId) -> Result<Commodity, PersistError> {
        self.rows
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(PersistError::NotFound)
    }

    async fn find_by_name(&self, name: &str) -> Result<Vec<Commodity>, PersistError> {
        let rows = self.rows.lock().unwrap();
        let mut found: Vec<Commodity> = rows
            .values()
            .filter(|c| c.name.contains(name))
            .cloned()
            .collect();
        found.sort_by_key(|c| c.id);
        Ok(found)
    }

    async fn list(&self) -> Result<Vec<Commodity>, PersistError> {
        let rows = self.rows.lock().unwrap();
        let mut all: Vec<Commodity> = rows.values().cloned().collect();
        all.sort_by_key(|c| c.id);
        Ok(all)
    }

    async fn discount_stock(&self, id: CommodityId, delta: i64) -> Result<(), PersistError> {
        if self.fail_discount.load(Ordering::SeqCst) {
            return Err(PersistError::Unavailable("injected discount failure".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        let commodity = rows.get_mut(&id).ok_or(PersistError::NotFound)?;
        commodity.stock -= delta;
        commodity.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryOrderStore {
    rows: Mutex<HashMap<OrderId, Order>>,
    next_id: AtomicI64,
    fail_create: AtomicBool,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn create(&self, new: NewOrder) -> Result<Order, PersistError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(PersistError::Unavailable("injected insert failure".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let order = Order {
            id,
            user_id: new.user_id,
            commodity_id: new.commodity_id,
            quantity: new.quantity,
            total_price: new.total_price,
            address: new.address,
            status: new.status,
            created_at: new.created_at,
            updated_at: new.updated_at,
        };
        self.rows.lock().unwrap().insert(id, order.clone());
        Ok(order)
    }

    async fn update_status(&self, id: OrderId, status: &str) -> Result<(), PersistError> {
        let mut rows = self.rows.lock().unwrap();
        let order = rows.get_mut(&id).ok_or(PersistError::NotFound)?;
        order.status = status.to_string();
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn update_address(&self, id: OrderId, address: &str) -> Result<(), PersistError> {
        let mut rows = self.rows.lock().unwrap();
        let order = rows.get_mut(&id).ok_or(PersistError::NotFound)?;
        order.address = address.to_string();
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn delete(&self, id: OrderId) -> Result<(), PersistError> {
        self.rows
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(PersistError::NotFound)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Order, PersistError> {
        self.rows
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(PersistError::NotFound)
    }

    async fn find_by_user(&self, user_id: UserId) -> Result<Vec<Order>, PersistError> {
        let rows = self.rows.lock().unwrap();
        let mut found: Vec<Order> = rows
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|o| std::cmp::Reverse(o.id));
        Ok(found)
    }
}

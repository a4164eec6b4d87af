//! In-memory order store, used by tests and local development. A single
//! mutex over the map makes every guarded update atomic.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::aggregates::order::{CompletionReport, Order, PaymentStatus, WorkStatus};
use crate::error::{Error, Result};

use super::{OrderScope, OrderStore};

#[derive(Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<Uuid, Order>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.lock().await;
        if orders.contains_key(&order.id) {
            return Err(Error::Storage(format!("duplicate order id {}", order.id)));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Order> {
        self.orders
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("order {id}")))
    }

    async fn list(&self, scope: OrderScope) -> Result<Vec<Order>> {
        let orders = self.orders.lock().await;
        let mut matched: Vec<Order> = orders.values().filter(|o| scope.includes(o)).cloned().collect();
        matched.sort_by_key(|o| o.created_at);
        Ok(matched)
    }

    async fn transition_work_status(
        &self,
        id: Uuid,
        from: WorkStatus,
        to: WorkStatus,
        completion: Option<&CompletionReport>,
    ) -> Result<Option<Order>> {
        let mut orders = self.orders.lock().await;
        let order = orders.get_mut(&id).ok_or_else(|| Error::NotFound(format!("order {id}")))?;
        if order.work_status != from {
            return Ok(None);
        }
        order.work_status = to;
        if let Some(report) = completion {
            order.completion_comment = Some(report.comment.clone());
            order.artifact_url = Some(report.artifact_url.clone());
        }
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn mark_paid(&self, id: Uuid, payment_id: &str) -> Result<Option<Order>> {
        let mut orders = self.orders.lock().await;
        let order = orders.get_mut(&id).ok_or_else(|| Error::NotFound(format!("order {id}")))?;
        if order.payment_status != PaymentStatus::Unpaid {
            return Ok(None);
        }
        order.payment_status = PaymentStatus::Paid;
        order.payment_id = Some(payment_id.to_string());
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }
}

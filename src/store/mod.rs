//! Order store port
//!
//! The backing store is treated as a record service with get-by-id, scoped
//! listing, and guarded updates. There are deliberately no raw overwrites:
//! `mark_paid` and `transition_work_status` are compare-and-set operations so
//! that two racing writers cannot double-apply or interleave inconsistently.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::aggregates::order::{CompletionReport, Order, WorkStatus};
use crate::error::Result;

pub mod memory;
pub mod pg;

pub use memory::InMemoryOrderStore;
pub use pg::PgOrderStore;

/// Visibility scope supplied by the identity collaborator. A clinic actor
/// sees its own orders; admin and design actors see everything.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderScope {
    All,
    Clinic(Uuid),
}

impl OrderScope {
    pub fn includes(&self, order: &Order) -> bool {
        match self {
            OrderScope::All => true,
            OrderScope::Clinic(id) => order.owner_clinic_id == *id,
        }
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Fetches an order, failing with `NotFound` when the id is unknown.
    async fn get(&self, id: Uuid) -> Result<Order>;

    async fn list(&self, scope: OrderScope) -> Result<Vec<Order>>;

    /// Applies a work-status transition guarded by the expected `from` status.
    /// Returns `None` when the guard missed (the order moved concurrently);
    /// the completion report, when present, is persisted in the same write.
    async fn transition_work_status(
        &self,
        id: Uuid,
        from: WorkStatus,
        to: WorkStatus,
        completion: Option<&CompletionReport>,
    ) -> Result<Option<Order>>;

    /// Sets `payment_status = paid` and `payment_id` in a single conditional
    /// write guarded by `payment_status = unpaid`. Returns `None` when the
    /// guard missed, i.e. the order was already settled — both fields update
    /// together or not at all.
    async fn mark_paid(&self, id: Uuid, payment_id: &str) -> Result<Option<Order>>;
}

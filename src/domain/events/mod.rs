//! Domain events
//!
//! Published to NATS (when configured) after a state change commits.
//! Publishing is best-effort notification glue and never affects the
//! outcome of the request that produced the event.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::aggregates::order::{ApplianceType, WorkStatus};

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: Uuid, owner_clinic_id: Uuid, appliance_type: ApplianceType },
    StatusChanged { order_id: Uuid, from: WorkStatus, to: WorkStatus },
    Paid { order_id: Uuid, payment_id: String },
}

impl OrderEvent {
    pub fn order_id(&self) -> Uuid {
        match self {
            Self::Created { order_id, .. }
            | Self::StatusChanged { order_id, .. }
            | Self::Paid { order_id, .. } => *order_id,
        }
    }

    pub fn subject(&self) -> String {
        format!("labflow.orders.{}", self.order_id())
    }
}

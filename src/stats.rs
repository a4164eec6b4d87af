//! Status Aggregator
//!
//! Read-side projection of work-status counts for dashboards. Counts are
//! recomputed from a fresh scoped listing on every call; `incomplete` is a
//! union view over the four non-terminal statuses, not a status of its own.

use serde::Serialize;

use crate::domain::aggregates::order::{Order, WorkStatus};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub in_progress: u64,
    pub paused: u64,
    pub on_hold: u64,
    pub completed: u64,
    pub rejected: u64,
    /// Union of pending, in_progress, paused and on_hold.
    pub incomplete: u64,
    pub total: u64,
}

impl StatusCounts {
    pub fn from_orders<'a, I>(orders: I) -> Self
    where
        I: IntoIterator<Item = &'a Order>,
    {
        let mut counts = Self::default();
        for order in orders {
            match order.work_status {
                WorkStatus::Pending => counts.pending += 1,
                WorkStatus::InProgress => counts.in_progress += 1,
                WorkStatus::Paused => counts.paused += 1,
                WorkStatus::OnHold => counts.on_hold += 1,
                WorkStatus::Completed => counts.completed += 1,
                WorkStatus::Rejected => counts.rejected += 1,
            }
            counts.total += 1;
        }
        counts.incomplete = counts.pending + counts.in_progress + counts.paused + counts.on_hold;
        counts
    }
}

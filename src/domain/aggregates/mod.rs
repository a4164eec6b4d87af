//! Aggregates module
pub mod order;

pub use order::{ApplianceType, Arch, CompletionReport, Order, PaymentStatus, WorkStatus};

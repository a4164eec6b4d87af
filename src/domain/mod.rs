//! Domain model: the lab order aggregate, pricing catalog, money value
//! object and the lifecycle events raised by state changes.
pub mod aggregates;
pub mod catalog;
pub mod events;
pub mod value_objects;

pub use aggregates::{ApplianceType, Arch, CompletionReport, Order, PaymentStatus, WorkStatus};
pub use catalog::PricingCatalog;
pub use value_objects::Money;

//! Labflow — Lab Order & Payment Service
//!
//! Self-hosted backend for a dental lab portal: clinics submit lab scripts,
//! design and production actors drive them through a fixed work-status
//! lifecycle, and settlement with an external payment processor is pulled in
//! through an idempotent reconciler.
//!
//! ## Features
//! - Lab order lifecycle (pending → in_progress → paused/on_hold → completed,
//!   with rejection), enforced by a transition table
//! - Creation-time pricing from a static appliance catalog, with a coupon
//!   policy for qualifying cases
//! - Hosted-checkout session initiation with the payment processor
//! - Exactly-once payment reconciliation via a compare-and-set store write
//! - On-demand status aggregation for dashboards

pub mod checkout;
pub mod domain;
pub mod error;
pub mod payments;
pub mod reconcile;
pub mod stats;
pub mod store;

pub use error::{Error, Result};

//! Checkout Session Initiator
//!
//! Builds a single line item from an order's creation-time total and opens a
//! hosted checkout session with the processor. This path never touches
//! `payment_status`: confirmation only ever happens in the reconciler, so a
//! processor failure here leaves the order exactly as it was.

use std::sync::Arc;
use tracing::info;

use crate::domain::aggregates::order::Order;
use crate::domain::catalog::PricingCatalog;
use crate::error::{Error, Result};
use crate::payments::{CheckoutRequest, CheckoutSession, PaymentProcessor};

pub struct CheckoutInitiator {
    processor: Arc<dyn PaymentProcessor>,
    catalog: Arc<PricingCatalog>,
    /// Redirect targets handed to the processor; both may carry the
    /// `{CHECKOUT_SESSION_ID}` placeholder the processor substitutes.
    success_url: String,
    cancel_url: String,
}

impl CheckoutInitiator {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        catalog: Arc<PricingCatalog>,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        Self { processor, catalog, success_url: success_url.into(), cancel_url: cancel_url.into() }
    }

    /// Opens a checkout session for an unpaid order and returns the redirect
    /// target for the hosted checkout page.
    pub async fn begin(&self, order: &Order) -> Result<CheckoutSession> {
        if order.is_paid() {
            return Err(Error::Validation(format!("order {} is already paid", order.id)));
        }
        let product_id = self.catalog.external_product_id(order.appliance_type)?.to_string();
        let request = CheckoutRequest {
            order_id: order.id,
            product_id,
            amount_minor: order.total_amount.minor_units(),
            currency: order.total_amount.currency().to_string(),
            appliance_type: order.appliance_type.to_string(),
            arch: order.arch.to_string(),
            coupon_code: order.coupon_code.clone(),
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
        };
        let session = self.processor.create_session(&request).await?;
        info!(order_id = %order.id, session_id = %session.session_id, "checkout session opened");
        Ok(session)
    }
}

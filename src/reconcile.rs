//! Payment Status Reconciler
//!
//! The single entry point that pulls a checkout session's authoritative state
//! from the processor and applies a successful payment to the order exactly
//! once. Both reconciliation triggers in the portal (the redirect-return
//! callback and client-side polling) land here, keyed by order id; the
//! paid-path write is a compare-and-set in the store, so two racing calls
//! settle to one effective update.

use std::sync::Arc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::payments::{PaymentProcessor, SessionPaymentStatus};
use crate::store::OrderStore;

/// What a reconciliation call observed and did. `NotSettled` is not an error:
/// the caller may poll again later.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// The session is paid and this call applied it to the order.
    Applied { payment_id: String },
    /// The order was already settled; nothing was written.
    AlreadyPaid,
    /// The session has not settled successfully; nothing was written.
    NotSettled { observed: SessionPaymentStatus },
}

pub struct PaymentReconciler {
    store: Arc<dyn OrderStore>,
    processor: Arc<dyn PaymentProcessor>,
}

impl PaymentReconciler {
    pub fn new(store: Arc<dyn OrderStore>, processor: Arc<dyn PaymentProcessor>) -> Self {
        Self { store, processor }
    }

    /// Reconciles the payment state for one order. Safe to call any number of
    /// times: at most one call ever writes, and a failure on any step leaves
    /// `payment_status` untouched.
    pub async fn reconcile(&self, order_id: Uuid) -> Result<ReconcileOutcome> {
        let order = self.store.get(order_id).await?;
        if order.is_paid() {
            return Ok(ReconcileOutcome::AlreadyPaid);
        }

        let session = self.processor.find_session(order_id).await?;
        match session.payment_status {
            SessionPaymentStatus::Paid => {
                let payment_id = session.payment_reference.ok_or_else(|| {
                    Error::Processor("paid session is missing a payment reference".into())
                })?;
                match self.store.mark_paid(order_id, &payment_id).await? {
                    Some(_) => {
                        info!(order_id = %order_id, payment_id = %payment_id, "payment applied");
                        Ok(ReconcileOutcome::Applied { payment_id })
                    }
                    // A concurrent reconciliation won the compare-and-set.
                    None => Ok(ReconcileOutcome::AlreadyPaid),
                }
            }
            observed => {
                if observed == SessionPaymentStatus::Failed {
                    warn!(order_id = %order_id, "checkout session reported failed payment");
                }
                Ok(ReconcileOutcome::NotSettled { observed })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::order::{ApplianceType, Arch, Order, PaymentStatus};
    use crate::domain::value_objects::Money;
    use crate::payments::{CheckoutRequest, CheckoutSession, SessionState};
    use crate::store::InMemoryOrderStore;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubProcessor {
        state: SessionPaymentStatus,
        reference: Option<String>,
        lookups: AtomicUsize,
    }

    impl StubProcessor {
        fn paid(reference: &str) -> Self {
            Self {
                state: SessionPaymentStatus::Paid,
                reference: Some(reference.to_string()),
                lookups: AtomicUsize::new(0),
            }
        }
        fn with_state(state: SessionPaymentStatus) -> Self {
            Self { state, reference: None, lookups: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl PaymentProcessor for StubProcessor {
        async fn create_session(&self, _request: &CheckoutRequest) -> Result<CheckoutSession> {
            unimplemented!("not used by reconciliation tests")
        }
        async fn find_session(&self, _order_id: Uuid) -> Result<SessionState> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(SessionState {
                payment_status: self.state,
                payment_reference: self.reference.clone(),
                amount_total: 50000,
                created_at: Utc::now(),
            })
        }
    }

    async fn seeded_store() -> (Arc<InMemoryOrderStore>, Order) {
        let store = Arc::new(InMemoryOrderStore::new());
        let order = Order::create(
            ApplianceType::Nightguard,
            Arch::Upper,
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc::now() + Duration::days(5),
            Money::usd(Decimal::new(50000, 2)),
        )
        .unwrap();
        store.insert(&order).await.unwrap();
        (store, order)
    }

    #[tokio::test]
    async fn test_paid_session_applies_payment() {
        let (store, order) = seeded_store().await;
        let reconciler = PaymentReconciler::new(store.clone(), Arc::new(StubProcessor::paid("pi_1")));

        let outcome = reconciler.reconcile(order.id).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Applied { payment_id: "pi_1".into() });

        let settled = store.get(order.id).await.unwrap();
        assert_eq!(settled.payment_status, PaymentStatus::Paid);
        assert_eq!(settled.payment_id.as_deref(), Some("pi_1"));
    }

    #[tokio::test]
    async fn test_second_call_is_a_no_op() {
        let (store, order) = seeded_store().await;
        let processor = Arc::new(StubProcessor::paid("pi_1"));
        let reconciler = PaymentReconciler::new(store.clone(), processor.clone());

        reconciler.reconcile(order.id).await.unwrap();
        let second = reconciler.reconcile(order.id).await.unwrap();
        assert_eq!(second, ReconcileOutcome::AlreadyPaid);

        // The settled order short-circuits before any processor lookup.
        assert_eq!(processor.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(order.id).await.unwrap().payment_id.as_deref(), Some("pi_1"));
    }

    #[tokio::test]
    async fn test_unsettled_session_writes_nothing() {
        for state in [SessionPaymentStatus::Unpaid, SessionPaymentStatus::Failed] {
            let (store, order) = seeded_store().await;
            let reconciler =
                PaymentReconciler::new(store.clone(), Arc::new(StubProcessor::with_state(state)));

            let outcome = reconciler.reconcile(order.id).await.unwrap();
            assert_eq!(outcome, ReconcileOutcome::NotSettled { observed: state });

            let untouched = store.get(order.id).await.unwrap();
            assert_eq!(untouched.payment_status, PaymentStatus::Unpaid);
            assert!(untouched.payment_id.is_none());
        }
    }

    #[tokio::test]
    async fn test_paid_session_without_reference_is_rejected() {
        let (store, order) = seeded_store().await;
        let reconciler = PaymentReconciler::new(
            store.clone(),
            Arc::new(StubProcessor::with_state(SessionPaymentStatus::Paid)),
        );

        let err = reconciler.reconcile(order.id).await.unwrap_err();
        assert!(matches!(err, Error::Processor(_)));
        assert_eq!(store.get(order.id).await.unwrap().payment_status, PaymentStatus::Unpaid);
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let store: Arc<InMemoryOrderStore> = Arc::new(InMemoryOrderStore::new());
        let reconciler = PaymentReconciler::new(store, Arc::new(StubProcessor::paid("pi_1")));
        assert!(matches!(reconciler.reconcile(Uuid::new_v4()).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_concurrent_reconciliation_applies_once() {
        let (store, order) = seeded_store().await;
        let reconciler =
            Arc::new(PaymentReconciler::new(store.clone(), Arc::new(StubProcessor::paid("pi_1"))));

        let (a, b) = tokio::join!(
            tokio::spawn({ let r = reconciler.clone(); let id = order.id; async move { r.reconcile(id).await } }),
            tokio::spawn({ let r = reconciler.clone(); let id = order.id; async move { r.reconcile(id).await } }),
        );
        let outcomes = [a.unwrap().unwrap(), b.unwrap().unwrap()];

        let applied = outcomes
            .iter()
            .filter(|o| matches!(o, ReconcileOutcome::Applied { .. }))
            .count();
        assert_eq!(applied, 1, "exactly one call may apply the payment");

        let settled = store.get(order.id).await.unwrap();
        assert_eq!(settled.payment_status, PaymentStatus::Paid);
        assert_eq!(settled.payment_id.as_deref(), Some("pi_1"));
    }
}

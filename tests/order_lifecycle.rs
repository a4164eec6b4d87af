//! End-to-end lifecycle over the in-memory store and a scripted processor:
//! create an order, open checkout, reconcile the payment, and drive the work
//! status to completion. Exercises the same wiring the HTTP handlers use.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use labflow::checkout::CheckoutInitiator;
use labflow::domain::aggregates::order::{
    ApplianceType, Arch, CompletionReport, Order, PaymentStatus, WorkStatus,
};
use labflow::domain::catalog::PricingCatalog;
use labflow::error::{Error, Result};
use labflow::payments::{
    CheckoutRequest, CheckoutSession, PaymentProcessor, SessionPaymentStatus, SessionState,
};
use labflow::reconcile::{PaymentReconciler, ReconcileOutcome};
use labflow::stats::StatusCounts;
use labflow::store::{InMemoryOrderStore, OrderScope, OrderStore};

/// A processor whose sessions settle when the test says so: checkout creates
/// an unpaid session, `settle` flips it to paid.
#[derive(Default)]
struct ScriptedProcessor {
    sessions: Mutex<Vec<(Uuid, SessionPaymentStatus, Option<String>)>>,
}

impl ScriptedProcessor {
    async fn settle(&self, order_id: Uuid, reference: &str) {
        let mut sessions = self.sessions.lock().await;
        for session in sessions.iter_mut() {
            if session.0 == order_id {
                session.1 = SessionPaymentStatus::Paid;
                session.2 = Some(reference.to_string());
            }
        }
    }
}

#[async_trait]
impl PaymentProcessor for ScriptedProcessor {
    async fn create_session(&self, request: &CheckoutRequest) -> Result<CheckoutSession> {
        let mut sessions = self.sessions.lock().await;
        sessions.push((request.order_id, SessionPaymentStatus::Unpaid, None));
        Ok(CheckoutSession {
            session_id: format!("cs_{}", sessions.len()),
            redirect_url: format!("https://pay.example.com/cs_{}", sessions.len()),
        })
    }

    async fn find_session(&self, order_id: Uuid) -> Result<SessionState> {
        let sessions = self.sessions.lock().await;
        let (_, status, reference) = sessions
            .iter()
            .find(|(id, _, _)| *id == order_id)
            .ok_or_else(|| Error::NotFound("payment session".into()))?;
        Ok(SessionState {
            payment_status: *status,
            payment_reference: reference.clone(),
            amount_total: 9500,
            created_at: Utc::now(),
        })
    }
}

struct Harness {
    store: Arc<InMemoryOrderStore>,
    processor: Arc<ScriptedProcessor>,
    checkout: CheckoutInitiator,
    reconciler: PaymentReconciler,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryOrderStore::new());
    let processor = Arc::new(ScriptedProcessor::default());
    let catalog = Arc::new(PricingCatalog::standard());
    let checkout = CheckoutInitiator::new(
        processor.clone(),
        catalog,
        "https://portal.example.com/paid?session={CHECKOUT_SESSION_ID}",
        "https://portal.example.com/cancelled",
    );
    let reconciler = PaymentReconciler::new(store.clone(), processor.clone());
    Harness { store, processor, checkout, reconciler }
}

async fn submit(store: &InMemoryOrderStore, appliance: ApplianceType, clinic: Uuid) -> Order {
    let catalog = PricingCatalog::standard();
    let total = catalog.order_total(appliance, Arch::Upper).unwrap();
    let order = Order::create(
        appliance,
        Arch::Upper,
        clinic,
        Uuid::new_v4(),
        Utc::now() + Duration::days(10),
        total,
    )
    .unwrap();
    store.insert(&order).await.unwrap();
    order
}

#[tokio::test]
async fn full_lifecycle_checkout_then_reconcile_then_complete() {
    let h = harness();
    let order = submit(&h.store, ApplianceType::Nightguard, Uuid::new_v4()).await;

    // Checkout opens a session but does not touch payment state.
    let session = h.checkout.begin(&order).await.unwrap();
    assert!(session.redirect_url.starts_with("https://pay.example.com/"));
    assert_eq!(h.store.get(order.id).await.unwrap().payment_status, PaymentStatus::Unpaid);

    // Polling before settlement observes the unpaid session and writes nothing.
    let pending = h.reconciler.reconcile(order.id).await.unwrap();
    assert_eq!(pending, ReconcileOutcome::NotSettled { observed: SessionPaymentStatus::Unpaid });

    // Settlement arrives; reconciliation applies it exactly once.
    h.processor.settle(order.id, "pi_1").await;
    let applied = h.reconciler.reconcile(order.id).await.unwrap();
    assert_eq!(applied, ReconcileOutcome::Applied { payment_id: "pi_1".into() });
    let paid = h.store.get(order.id).await.unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.payment_id.as_deref(), Some("pi_1"));

    // A redirect-return callback racing a poll is a safe no-op.
    assert_eq!(h.reconciler.reconcile(order.id).await.unwrap(), ReconcileOutcome::AlreadyPaid);

    // Production proceeds independently of payment.
    let o = h.store.get(order.id).await.unwrap();
    o.ensure_transition(WorkStatus::InProgress, None).unwrap();
    h.store
        .transition_work_status(order.id, WorkStatus::Pending, WorkStatus::InProgress, None)
        .await
        .unwrap()
        .unwrap();

    let report = CompletionReport {
        comment: "occlusion verified".into(),
        artifact_url: "https://files.example.com/designs/final.stl".into(),
    };
    let o = h.store.get(order.id).await.unwrap();
    o.ensure_transition(WorkStatus::Completed, Some(&report)).unwrap();
    let done = h.store
        .transition_work_status(order.id, WorkStatus::InProgress, WorkStatus::Completed, Some(&report))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.work_status, WorkStatus::Completed);
    assert_eq!(done.artifact_url.as_deref(), Some("https://files.example.com/designs/final.stl"));

    // payment_id is non-null iff paid, across the whole run.
    assert!(done.payment_id.is_some());
}

#[tokio::test]
async fn completion_can_precede_payment() {
    let h = harness();
    let order = submit(&h.store, ApplianceType::Nightguard, Uuid::new_v4()).await;

    h.store
        .transition_work_status(order.id, WorkStatus::Pending, WorkStatus::InProgress, None)
        .await
        .unwrap()
        .unwrap();
    let report = CompletionReport {
        comment: "shipped to clinic".into(),
        artifact_url: "https://files.example.com/designs/ng.stl".into(),
    };
    let done = h.store
        .transition_work_status(order.id, WorkStatus::InProgress, WorkStatus::Completed, Some(&report))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(done.work_status, WorkStatus::Completed);
    assert_eq!(done.payment_status, PaymentStatus::Unpaid);

    // Payment settles afterwards; the completed order still reconciles.
    h.checkout.begin(&done).await.unwrap();
    h.processor.settle(order.id, "pi_late").await;
    assert_eq!(
        h.reconciler.reconcile(order.id).await.unwrap(),
        ReconcileOutcome::Applied { payment_id: "pi_late".into() }
    );
}

#[tokio::test]
async fn reconcile_without_session_is_not_found() {
    let h = harness();
    let order = submit(&h.store, ApplianceType::Nightguard, Uuid::new_v4()).await;
    assert!(matches!(h.reconciler.reconcile(order.id).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn stats_reflect_scoped_snapshot() {
    let h = harness();
    let clinic = Uuid::new_v4();
    let other = Uuid::new_v4();

    let a = submit(&h.store, ApplianceType::Nightguard, clinic).await;
    let _b = submit(&h.store, ApplianceType::SurgicalDay, clinic).await;
    let _c = submit(&h.store, ApplianceType::TiBar, other).await;

    h.store
        .transition_work_status(a.id, WorkStatus::Pending, WorkStatus::InProgress, None)
        .await
        .unwrap()
        .unwrap();

    let mine = h.store.list(OrderScope::Clinic(clinic)).await.unwrap();
    let counts = StatusCounts::from_orders(&mine);
    assert_eq!(counts.total, 2);
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.in_progress, 1);
    assert_eq!(counts.incomplete, 2);
    assert_eq!(counts.completed, 0);

    let all = h.store.list(OrderScope::All).await.unwrap();
    assert_eq!(StatusCounts::from_orders(&all).total, 3);
}

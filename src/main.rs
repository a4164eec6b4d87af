//! Labflow - Lab Order & Payment Reconciliation Service

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use labflow::checkout::CheckoutInitiator;
use labflow::domain::aggregates::order::{ApplianceType, Arch, CompletionReport, Order, WorkStatus};
use labflow::domain::catalog::PricingCatalog;
use labflow::domain::events::OrderEvent;
use labflow::error::Error;
use labflow::payments::{HttpPaymentProcessor, PaymentProcessor};
use labflow::reconcile::{PaymentReconciler, ReconcileOutcome};
use labflow::stats::StatusCounts;
use labflow::store::{OrderScope, OrderStore, PgOrderStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub catalog: Arc<PricingCatalog>,
    pub checkout: Arc<CheckoutInitiator>,
    pub reconciler: Arc<PaymentReconciler>,
    pub nats: Option<async_nats::Client>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db = PgPoolOptions::new()
        .max_connections(10)
        .connect(&std::env::var("DATABASE_URL")?)
        .await?;
    sqlx::migrate!("./migrations").run(&db).await?;

    let nats = match std::env::var("NATS_URL") {
        Ok(url) => async_nats::connect(&url).await.ok(),
        Err(_) => None,
    };

    let store: Arc<dyn OrderStore> = Arc::new(PgOrderStore::new(db));
    let catalog = Arc::new(PricingCatalog::standard());
    let processor: Arc<dyn PaymentProcessor> = Arc::new(HttpPaymentProcessor::new(
        std::env::var("PROCESSOR_URL")?,
        std::env::var("PROCESSOR_API_KEY")?,
    )?);
    let checkout = Arc::new(CheckoutInitiator::new(
        processor.clone(),
        catalog.clone(),
        std::env::var("CHECKOUT_SUCCESS_URL")?,
        std::env::var("CHECKOUT_CANCEL_URL")?,
    ));
    let reconciler = Arc::new(PaymentReconciler::new(store.clone(), processor.clone()));
    let state = AppState { store, catalog, checkout, reconciler, nats };

    let app = Router::new()
        .route("/health", get(|| async { Json(json!({"status": "healthy", "service": "labflow"})) }))
        .route("/api/v1/orders", get(list_orders).post(create_order))
        .route("/api/v1/orders/:id", get(get_order))
        .route("/api/v1/orders/:id/status", post(transition_order))
        .route("/api/v1/orders/:id/checkout", post(begin_checkout))
        .route("/api/v1/orders/:id/reconcile", post(reconcile_payment))
        .route("/api/v1/stats", get(order_stats))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8084".to_string());
    tracing::info!("labflow listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}

/// Best-effort event publication; never fails the request.
async fn publish(state: &AppState, event: OrderEvent) {
    if let Some(nats) = &state.nats {
        match serde_json::to_vec(&event) {
            Ok(payload) => {
                if let Err(e) = nats.publish(event.subject(), payload.into()).await {
                    tracing::warn!("failed to publish order event: {e}");
                }
            }
            Err(e) => tracing::warn!("failed to serialize order event: {e}"),
        }
    }
}

/// Scope query handed to us by the identity collaborator; a missing clinic id
/// means an admin/design actor seeing everything. No authorization happens
/// here.
#[derive(Debug, Deserialize)]
pub struct ScopeParams {
    pub clinic_id: Option<Uuid>,
}

impl ScopeParams {
    fn scope(&self) -> OrderScope {
        match self.clinic_id {
            Some(id) => OrderScope::Clinic(id),
            None => OrderScope::All,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub appliance_type: ApplianceType,
    pub arch: Arch,
    pub owner_clinic_id: Uuid,
    pub patient_id: Uuid,
    pub due_date: DateTime<Utc>,
}

async fn create_order(
    State(s): State<AppState>,
    Json(r): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), Error> {
    let total = s.catalog.order_total(r.appliance_type, r.arch)?;
    let order = Order::create(r.appliance_type, r.arch, r.owner_clinic_id, r.patient_id, r.due_date, total)?;
    s.store.insert(&order).await?;
    publish(&s, OrderEvent::Created {
        order_id: order.id,
        owner_clinic_id: order.owner_clinic_id,
        appliance_type: order.appliance_type,
    })
    .await;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(
    State(s): State<AppState>,
    Query(p): Query<ScopeParams>,
) -> Result<Json<Vec<Order>>, Error> {
    Ok(Json(s.store.list(p.scope()).await?))
}

async fn get_order(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Order>, Error> {
    Ok(Json(s.store.get(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub to: WorkStatus,
    pub comment: Option<String>,
    pub artifact_url: Option<String>,
}

async fn transition_order(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
    Json(r): Json<TransitionRequest>,
) -> Result<Json<Order>, Error> {
    let completion = (r.to == WorkStatus::Completed).then(|| CompletionReport {
        comment: r.comment.unwrap_or_default(),
        artifact_url: r.artifact_url.unwrap_or_default(),
    });

    let order = s.store.get(id).await?;
    order.ensure_transition(r.to, completion.as_ref())?;

    match s.store.transition_work_status(id, order.work_status, r.to, completion.as_ref()).await? {
        Some(updated) => {
            publish(&s, OrderEvent::StatusChanged { order_id: id, from: order.work_status, to: r.to }).await;
            Ok(Json(updated))
        }
        None => {
            // Guard miss: a concurrent actor moved the order first.
            let fresh = s.store.get(id).await?;
            Err(Error::InvalidTransition { from: fresh.work_status, to: r.to })
        }
    }
}

async fn begin_checkout(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, Error> {
    let order = s.store.get(id).await?;
    let session = s.checkout.begin(&order).await?;
    Ok(Json(json!({ "session_id": session.session_id, "redirect_url": session.redirect_url })))
}

async fn reconcile_payment(
    State(s): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReconcileOutcome>, Error> {
    let outcome = s.reconciler.reconcile(id).await?;
    if let ReconcileOutcome::Applied { payment_id } = &outcome {
        publish(&s, OrderEvent::Paid { order_id: id, payment_id: payment_id.clone() }).await;
    }
    Ok(Json(outcome))
}

async fn order_stats(
    State(s): State<AppState>,
    Query(p): Query<ScopeParams>,
) -> Result<Json<StatusCounts>, Error> {
    let orders = s.store.list(p.scope()).await?;
    Ok(Json(StatusCounts::from_orders(&orders)))
}

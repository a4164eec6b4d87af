//! Postgres order store (sqlx)
//!
//! Statuses are stored as text and parsed back through the domain enums; the
//! two guarded updates push their compare-and-set into the `WHERE` clause so
//! the row either moves atomically or the statement matches nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::aggregates::order::{CompletionReport, Order, WorkStatus};
use crate::domain::value_objects::Money;
use crate::error::{Error, Result};

use super::{OrderScope, OrderStore};

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    appliance_type: String,
    arch: String,
    work_status: String,
    payment_status: String,
    payment_id: Option<String>,
    coupon_code: Option<String>,
    total_amount: Decimal,
    currency: String,
    completion_comment: Option<String>,
    artifact_url: Option<String>,
    owner_clinic_id: Uuid,
    patient_id: Uuid,
    created_at: DateTime<Utc>,
    due_date: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = Error;

    fn try_from(row: OrderRow) -> Result<Self> {
        Ok(Order {
            id: row.id,
            appliance_type: row.appliance_type.parse()?,
            arch: row.arch.parse()?,
            work_status: row.work_status.parse()?,
            payment_status: row.payment_status.parse()?,
            payment_id: row.payment_id,
            coupon_code: row.coupon_code,
            total_amount: Money::new(row.total_amount, &row.currency),
            completion_comment: row.completion_comment,
            artifact_url: row.artifact_url,
            owner_clinic_id: row.owner_clinic_id,
            patient_id: row.patient_id,
            created_at: row.created_at,
            due_date: row.due_date,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO lab_orders (id, appliance_type, arch, work_status, payment_status, payment_id, coupon_code, total_amount, currency, completion_comment, artifact_url, owner_clinic_id, patient_id, created_at, due_date, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(order.id)
        .bind(order.appliance_type.as_str())
        .bind(order.arch.as_str())
        .bind(order.work_status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.payment_id)
        .bind(&order.coupon_code)
        .bind(order.total_amount.amount())
        .bind(order.total_amount.currency())
        .bind(&order.completion_comment)
        .bind(&order.artifact_url)
        .bind(order.owner_clinic_id)
        .bind(order.patient_id)
        .bind(order.created_at)
        .bind(order.due_date)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Order> {
        sqlx::query_as::<_, OrderRow>("SELECT * FROM lab_orders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("order {id}")))?
            .try_into()
    }

    async fn list(&self, scope: OrderScope) -> Result<Vec<Order>> {
        let rows = match scope {
            OrderScope::All => {
                sqlx::query_as::<_, OrderRow>("SELECT * FROM lab_orders ORDER BY created_at DESC")
                    .fetch_all(&self.pool)
                    .await?
            }
            OrderScope::Clinic(clinic_id) => {
                sqlx::query_as::<_, OrderRow>(
                    "SELECT * FROM lab_orders WHERE owner_clinic_id = $1 ORDER BY created_at DESC",
                )
                .bind(clinic_id)
                .fetch_all(&self.pool)
                .await?
            }
        };
        rows.into_iter().map(Order::try_from).collect()
    }

    async fn transition_work_status(
        &self,
        id: Uuid,
        from: WorkStatus,
        to: WorkStatus,
        completion: Option<&CompletionReport>,
    ) -> Result<Option<Order>> {
        let updated = sqlx::query_as::<_, OrderRow>(
            "UPDATE lab_orders SET work_status = $3, \
             completion_comment = COALESCE($4, completion_comment), \
             artifact_url = COALESCE($5, artifact_url), \
             updated_at = NOW() \
             WHERE id = $1 AND work_status = $2 RETURNING *",
        )
        .bind(id)
        .bind(from.as_str())
        .bind(to.as_str())
        .bind(completion.map(|c| c.comment.as_str()))
        .bind(completion.map(|c| c.artifact_url.as_str()))
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Ok(Some(row.try_into()?)),
            None => {
                // Distinguish a guard miss from an unknown id.
                self.get(id).await?;
                Ok(None)
            }
        }
    }

    async fn mark_paid(&self, id: Uuid, payment_id: &str) -> Result<Option<Order>> {
        let updated = sqlx::query_as::<_, OrderRow>(
            "UPDATE lab_orders SET payment_status = 'paid', payment_id = $2, updated_at = NOW() \
             WHERE id = $1 AND payment_status = 'unpaid' RETURNING *",
        )
        .bind(id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Ok(Some(row.try_into()?)),
            None => {
                self.get(id).await?;
                Ok(None)
            }
        }
    }
}

//! Lab Order Aggregate
//!
//! A lab order (the "lab script") tracks a clinical work request through two
//! independent axes: the production lifecycle (`WorkStatus`, driven by design
//! and production actors) and the settlement state (`PaymentStatus`, driven
//! exclusively by the payment reconciler). Payment is not a gate on
//! production: an order may complete while still unpaid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::catalog::coupon_for;
use crate::domain::value_objects::Money;
use crate::error::{Error, Result};

/// Catalog category of the ordered appliance. Immutable after creation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApplianceType {
    SurgicalDay,
    PrintedTryIn,
    Nightguard,
    DirectLoadPmma,
    DirectLoadZirconia,
    TiBar,
}

impl ApplianceType {
    pub const ALL: [ApplianceType; 6] = [
        Self::SurgicalDay, Self::PrintedTryIn, Self::Nightguard,
        Self::DirectLoadPmma, Self::DirectLoadZirconia, Self::TiBar,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SurgicalDay => "surgical-day",
            Self::PrintedTryIn => "printed-try-in",
            Self::Nightguard => "nightguard",
            Self::DirectLoadPmma => "direct-load-pmma",
            Self::DirectLoadZirconia => "direct-load-zirconia",
            Self::TiBar => "ti-bar",
        }
    }
}

impl fmt::Display for ApplianceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ApplianceType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "surgical-day" => Ok(Self::SurgicalDay),
            "printed-try-in" => Ok(Self::PrintedTryIn),
            "nightguard" => Ok(Self::Nightguard),
            "direct-load-pmma" => Ok(Self::DirectLoadPmma),
            "direct-load-zirconia" => Ok(Self::DirectLoadZirconia),
            "ti-bar" => Ok(Self::TiBar),
            other => Err(Error::Configuration(format!("unknown appliance type '{other}'"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch { Upper, Lower, Dual }

impl Arch {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Upper => "upper", Self::Lower => "lower", Self::Dual => "dual" }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Arch {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upper" => Ok(Self::Upper),
            "lower" => Ok(Self::Lower),
            "dual" => Ok(Self::Dual),
            other => Err(Error::Storage(format!("unknown arch '{other}'"))),
        }
    }
}

/// Production lifecycle state. `Pending` is the only initial state;
/// `Completed` and `Rejected` are terminal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    #[default]
    Pending,
    InProgress,
    Paused,
    OnHold,
    Completed,
    Rejected,
}

impl WorkStatus {
    pub const ALL: [WorkStatus; 6] = [
        Self::Pending, Self::InProgress, Self::Paused,
        Self::OnHold, Self::Completed, Self::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Paused => "paused",
            Self::OnHold => "on_hold",
            Self::Completed => "completed",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Rejected)
    }

    /// The transition table. Anything not listed here is an illegal edge.
    pub fn can_transition_to(&self, to: WorkStatus) -> bool {
        use WorkStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress | Rejected)
                | (InProgress, Paused | OnHold | Completed | Rejected)
                | (Paused, InProgress)
                | (OnHold, InProgress)
        )
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for WorkStatus {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "paused" => Ok(Self::Paused),
            "on_hold" => Ok(Self::OnHold),
            "completed" => Ok(Self::Completed),
            "rejected" => Ok(Self::Rejected),
            other => Err(Error::Storage(format!("unknown work status '{other}'"))),
        }
    }
}

/// Settlement state with the payment processor. Written only by the reconciler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Unpaid,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Unpaid => "unpaid", Self::Paid => "paid", Self::Failed => "failed" }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for PaymentStatus {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "unpaid" => Ok(Self::Unpaid),
            "paid" => Ok(Self::Paid),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Storage(format!("unknown payment status '{other}'"))),
        }
    }
}

/// Payload required when moving an order to `Completed`. Both fields are
/// mandatory and are persisted atomically with the transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompletionReport {
    pub comment: String,
    pub artifact_url: String,
}

impl CompletionReport {
    pub fn validate(&self) -> Result<()> {
        if self.comment.trim().is_empty() {
            return Err(Error::Validation("completion comment must not be empty".into()));
        }
        if self.artifact_url.trim().is_empty() {
            return Err(Error::Validation("design artifact reference must not be empty".into()));
        }
        if !validator::validate_url(&self.artifact_url) {
            return Err(Error::Validation(format!(
                "design artifact reference '{}' is not a valid URL",
                self.artifact_url
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub appliance_type: ApplianceType,
    pub arch: Arch,
    pub work_status: WorkStatus,
    pub payment_status: PaymentStatus,
    pub payment_id: Option<String>,
    pub coupon_code: Option<String>,
    pub total_amount: Money,
    pub completion_comment: Option<String>,
    pub artifact_url: Option<String>,
    pub owner_clinic_id: Uuid,
    pub patient_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new pending, unpaid order. The coupon code is derived here so
    /// it can never be retro-fitted after creation.
    pub fn create(
        appliance_type: ApplianceType,
        arch: Arch,
        owner_clinic_id: Uuid,
        patient_id: Uuid,
        due_date: DateTime<Utc>,
        total_amount: Money,
    ) -> Result<Self> {
        let now = Utc::now();
        if due_date < now {
            return Err(Error::Validation("due date must not be in the past".into()));
        }
        let id = Uuid::now_v7();
        Ok(Self {
            id,
            appliance_type,
            arch,
            work_status: WorkStatus::Pending,
            payment_status: PaymentStatus::Unpaid,
            payment_id: None,
            coupon_code: coupon_for(appliance_type, id),
            total_amount,
            completion_comment: None,
            artifact_url: None,
            owner_clinic_id,
            patient_id,
            created_at: now,
            due_date,
            updated_at: now,
        })
    }

    pub fn is_paid(&self) -> bool { self.payment_status == PaymentStatus::Paid }

    /// Checks that a work-status transition is legal for this order and that a
    /// completing transition carries a valid completion report. Performs no
    /// mutation; the store applies the transition with an optimistic guard on
    /// the `from` status.
    pub fn ensure_transition(&self, to: WorkStatus, completion: Option<&CompletionReport>) -> Result<()> {
        if !self.work_status.can_transition_to(to) {
            return Err(Error::InvalidTransition { from: self.work_status, to });
        }
        if to == WorkStatus::Completed {
            let report = completion.ok_or_else(|| {
                Error::Validation("completing an order requires a comment and a design artifact reference".into())
            })?;
            report.validate()?;
        }
        Ok(())
    }
}

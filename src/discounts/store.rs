use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{
    AssignmentStatus, ContactId, DiscountPolicy, PolicyAssignment, PolicyId, StudentId,
};

/// Error enumeration for store failures.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("conflicting write against an existing row")]
    Conflict,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Student master-data fields the engine reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: StudentId,
    pub religion_id: Option<String>,
    pub religion_name: Option<String>,
    pub is_baptized: bool,
}

/// Guardian-contact link flagged as fee payer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianLink {
    pub contact_id: ContactId,
    /// Platform user account behind the contact, when one is linked.
    pub user_id: Option<String>,
}

/// Keyed lookups and filtered scans over student, guardian, enrollment, and
/// staff data. The platform's relational store supplies the implementation.
pub trait StudentDirectory: Send + Sync {
    fn student(&self, id: &StudentId) -> Result<Option<StudentRecord>, StoreError>;

    /// Guardian links for the student that are flagged as fee payers.
    fn fee_payer_links(&self, student: &StudentId) -> Result<Vec<GuardianLink>, StoreError>;

    /// Every student linked as fee payer to any of the given contacts.
    fn fee_payer_students(&self, contacts: &[ContactId]) -> Result<Vec<StudentId>, StoreError>;

    fn has_active_enrollment(
        &self,
        student: &StudentId,
        school_id: &str,
        school_year_id: &str,
    ) -> Result<bool, StoreError>;

    /// Classroom placements of the student for the given school year.
    fn classroom_ids(
        &self,
        student: &StudentId,
        school_id: &str,
        school_year_id: &str,
    ) -> Result<Vec<String>, StoreError>;

    fn is_school_staff(&self, user_id: &str, school_id: &str) -> Result<bool, StoreError>;
}

/// Filtered scan over a school's discount policies. Scope filtering and the
/// canonical ordering belong to [`super::policies::PolicyRepository`].
pub trait PolicyStore: Send + Sync {
    fn policies_for_school(&self, school_id: &str) -> Result<Vec<DiscountPolicy>, StoreError>;
}

/// Payload for an automatic ALLOW grant.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoAllowGrant {
    pub policy_id: PolicyId,
    pub student_id: StudentId,
    pub note: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

/// What the conditional auto-grant write did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoGrantOutcome {
    /// No row existed; an AUTO/ALLOW row was created.
    Created,
    /// An AUTO/ALLOW row existed; note and metadata were refreshed.
    Refreshed,
    /// A MANUAL row existed and was left untouched.
    KeptManual,
    /// A DENY row existed (either source) and was left untouched.
    KeptDeny,
}

/// Result of clearing a manual assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum ManualClearOutcome {
    Removed(PolicyAssignment),
    /// The row's source is not MANUAL; returned unchanged.
    Kept(PolicyAssignment),
    Missing,
}

/// Keyed reads and conditional writes over entitlement rows, unique per
/// (policy, student).
pub trait AssignmentStore: Send + Sync {
    fn assignment(
        &self,
        policy: &PolicyId,
        student: &StudentId,
    ) -> Result<Option<PolicyAssignment>, StoreError>;

    fn assignments_for_student(
        &self,
        student: &StudentId,
    ) -> Result<Vec<PolicyAssignment>, StoreError>;

    /// Insert or refresh an AUTO/ALLOW row, leaving MANUAL and DENY rows
    /// untouched. Implementations must apply the condition atomically (row
    /// lock or compare-and-swap on source/status); two concurrent syncs for
    /// the same pair must not downgrade a manual override.
    fn grant_auto_allow(&self, grant: AutoAllowGrant) -> Result<AutoGrantOutcome, StoreError>;

    /// Upsert with source MANUAL; wins over any existing row.
    fn upsert_manual(
        &self,
        policy: &PolicyId,
        student: &StudentId,
        status: AssignmentStatus,
        note: Option<String>,
    ) -> Result<PolicyAssignment, StoreError>;

    /// Delete the row only when its source is MANUAL.
    fn remove_if_manual(
        &self,
        policy: &PolicyId,
        student: &StudentId,
    ) -> Result<ManualClearOutcome, StoreError>;
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifier wrapper for discount policies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyId(pub String);

/// Identifier wrapper for students.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StudentId(pub String);

/// Identifier wrapper for guardian contacts.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContactId(pub String);

/// How a policy's `value` is interpreted against the fee total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountValueType {
    Percent,
    Fixed,
}

/// Fields of a religion criterion. The matcher honors them in strict fallback
/// order: id, then name, then baptism flag; all unset fails closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReligionCriterion {
    pub religion_id: Option<String>,
    pub religion_name: Option<String>,
    pub is_baptized: Option<bool>,
}

/// Default sibling threshold when a SIBLING_COUNT criterion omits `minChildren`.
pub const DEFAULT_MIN_CHILDREN: u32 = 2;

/// Eligibility rule carried by a policy.
///
/// Policies are authored against a loosely typed `(criterionType,
/// criterionConfig)` pair; [`PolicyCriterion::decode`] interprets that pair
/// exactly once when the policy is loaded, so matching never re-reads raw
/// configuration. Unknown criterion types decode to [`Unrecognized`] and deny
/// rather than grant.
///
/// [`Unrecognized`]: PolicyCriterion::Unrecognized
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyCriterion {
    Always,
    SiblingCount { min_children: u32 },
    StaffChild,
    Religion(ReligionCriterion),
    Unrecognized,
}

impl PolicyCriterion {
    /// Decode the stored criterion type and config map.
    ///
    /// Numeric fields tolerate numbers-as-strings; `isBaptized` is honored
    /// only when it is an actual JSON boolean.
    pub fn decode(criterion_type: &str, config: Option<&Value>) -> Self {
        match criterion_type.trim().to_ascii_uppercase().as_str() {
            "ALWAYS" => Self::Always,
            "SIBLING_COUNT" => Self::SiblingCount {
                min_children: config
                    .and_then(|map| map.get("minChildren"))
                    .and_then(lenient_u32)
                    .unwrap_or(DEFAULT_MIN_CHILDREN),
            },
            "STAFF_CHILD" => Self::StaffChild,
            "RELIGION" => Self::Religion(ReligionCriterion {
                religion_id: config
                    .and_then(|map| map.get("religionId"))
                    .and_then(lenient_id),
                religion_name: config
                    .and_then(|map| map.get("religionName"))
                    .and_then(Value::as_str)
                    .filter(|name| !name.trim().is_empty())
                    .map(str::to_string),
                is_baptized: config
                    .and_then(|map| map.get("isBaptized"))
                    .and_then(Value::as_bool),
            }),
            _ => Self::Unrecognized,
        }
    }
}

fn lenient_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn lenient_id(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    }
}

/// A school's configured discount rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountPolicy {
    pub id: PolicyId,
    pub school_id: String,
    pub name: String,
    pub criterion: PolicyCriterion,
    pub value_type: DiscountValueType,
    pub value: f64,
    /// Optional cap on the amount a single application may contribute.
    pub max_amount: Option<f64>,
    /// Whether this discount may layer on top of other applied discounts.
    pub stackable: bool,
    /// Primary ordering key; lower values evaluate first.
    pub priority: i32,
    pub active_from: Option<DateTime<Utc>>,
    pub active_to: Option<DateTime<Utc>>,
    /// `None` means the policy applies to every school year.
    pub school_year_id: Option<String>,
    /// `None` means the policy applies to every classroom.
    pub classroom_id: Option<String>,
    pub is_active: bool,
    /// Tie-break after `priority`; the canonical ordering must be stable.
    pub created_at: DateTime<Utc>,
}

impl DiscountPolicy {
    /// Whether `as_of` falls inside the activity window. Bounds are inclusive;
    /// open ends are unbounded.
    pub fn window_contains(&self, as_of: DateTime<Utc>) -> bool {
        self.active_from.map_or(true, |from| as_of >= from)
            && self.active_to.map_or(true, |to| as_of <= to)
    }
}

/// Whether an assignment row allows or denies the policy for its student.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Allow,
    Deny,
}

impl AssignmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AssignmentStatus::Allow => "ALLOW",
            AssignmentStatus::Deny => "DENY",
        }
    }
}

/// Who wrote an assignment row: the synchronizer or an administrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentSource {
    Auto,
    Manual,
}

impl AssignmentSource {
    pub const fn label(self) -> &'static str {
        match self {
            AssignmentSource::Auto => "AUTO",
            AssignmentSource::Manual => "MANUAL",
        }
    }
}

/// Persisted per-(policy, student) entitlement override.
///
/// A MANUAL row is never overwritten or deleted by automatic synchronization.
/// A DENY row, whatever its source, suppresses the policy outright; an ALLOW
/// row applies the policy without re-running the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAssignment {
    pub policy_id: PolicyId,
    pub student_id: StudentId,
    pub status: AssignmentStatus,
    pub source: AssignmentSource,
    pub note: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

/// Derived snapshot of discount-relevant facts about a student.
///
/// Rebuilt on demand for every evaluation; never cached across calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityContext {
    pub student_id: StudentId,
    pub school_id: String,
    pub school_year_id: String,
    /// At least 1; the student counts as their own sibling-group member.
    pub sibling_count: u32,
    pub is_staff_child: bool,
    pub religion_id: Option<String>,
    pub religion_name: Option<String>,
    pub is_baptized: bool,
}

/// Lifecycle event that caused a synchronization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncTrigger {
    StudentCreated,
    StudentUpdated,
    ContactLinked,
}

impl SyncTrigger {
    pub const fn label(self) -> &'static str {
        match self {
            SyncTrigger::StudentCreated => "STUDENT_CREATED",
            SyncTrigger::StudentUpdated => "STUDENT_UPDATED",
            SyncTrigger::ContactLinked => "CONTACT_LINKED",
        }
    }
}

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::Value;

use crate::discounts::domain::{
    AssignmentSource, AssignmentStatus, ContactId, DiscountPolicy, DiscountValueType,
    EligibilityContext, PolicyAssignment, PolicyCriterion, PolicyId, StudentId,
};
use crate::discounts::service::DiscountBillingService;
use crate::discounts::store::{
    AssignmentStore, AutoAllowGrant, AutoGrantOutcome, GuardianLink, ManualClearOutcome,
    PolicyStore, StoreError, StudentDirectory, StudentRecord,
};

pub(super) const SCHOOL: &str = "school-01";
pub(super) const YEAR: &str = "2025-2026";

/// Classroom-agnostic, always-active, stackable 10% policy; tests override
/// the fields they care about via struct update.
pub(super) fn policy(id: &str, criterion: PolicyCriterion) -> DiscountPolicy {
    DiscountPolicy {
        id: PolicyId(id.to_string()),
        school_id: SCHOOL.to_string(),
        name: format!("Policy {id}"),
        criterion,
        value_type: DiscountValueType::Percent,
        value: 10.0,
        max_amount: None,
        stackable: true,
        priority: 10,
        active_from: None,
        active_to: None,
        school_year_id: None,
        classroom_id: None,
        is_active: true,
        created_at: Utc.with_ymd_and_hms(2025, 7, 1, 8, 0, 0).unwrap(),
    }
}

pub(super) fn context(student: &str) -> EligibilityContext {
    EligibilityContext {
        student_id: StudentId(student.to_string()),
        school_id: SCHOOL.to_string(),
        school_year_id: YEAR.to_string(),
        sibling_count: 1,
        is_staff_child: false,
        religion_id: None,
        religion_name: None,
        is_baptized: false,
    }
}

pub(super) fn assignment(
    policy: &str,
    student: &str,
    status: AssignmentStatus,
    source: AssignmentSource,
) -> PolicyAssignment {
    PolicyAssignment {
        policy_id: PolicyId(policy.to_string()),
        student_id: StudentId(student.to_string()),
        status,
        source,
        note: None,
        metadata: Default::default(),
    }
}

pub(super) fn assignment_map(rows: Vec<PolicyAssignment>) -> HashMap<PolicyId, PolicyAssignment> {
    rows.into_iter()
        .map(|row| (row.policy_id.clone(), row))
        .collect()
}

#[derive(Default)]
pub(super) struct MemoryDirectory {
    students: Mutex<HashMap<StudentId, StudentRecord>>,
    links: Mutex<HashMap<StudentId, Vec<GuardianLink>>>,
    enrollments: Mutex<HashSet<(StudentId, String, String)>>,
    classrooms: Mutex<HashMap<(StudentId, String, String), Vec<String>>>,
    staff: Mutex<HashSet<(String, String)>>,
}

impl MemoryDirectory {
    pub(super) fn add_student(
        &self,
        id: &str,
        religion_id: Option<&str>,
        religion_name: Option<&str>,
        is_baptized: bool,
    ) {
        self.students.lock().expect("directory mutex poisoned").insert(
            StudentId(id.to_string()),
            StudentRecord {
                id: StudentId(id.to_string()),
                religion_id: religion_id.map(str::to_string),
                religion_name: religion_name.map(str::to_string),
                is_baptized,
            },
        );
    }

    pub(super) fn link_fee_payer(&self, student: &str, contact: &str, user_id: Option<&str>) {
        self.links
            .lock()
            .expect("directory mutex poisoned")
            .entry(StudentId(student.to_string()))
            .or_default()
            .push(GuardianLink {
                contact_id: ContactId(contact.to_string()),
                user_id: user_id.map(str::to_string),
            });
    }

    pub(super) fn enroll(&self, student: &str, school: &str, year: &str) {
        self.enrollments
            .lock()
            .expect("directory mutex poisoned")
            .insert((
                StudentId(student.to_string()),
                school.to_string(),
                year.to_string(),
            ));
    }

    pub(super) fn place_in_classroom(
        &self,
        student: &str,
        school: &str,
        year: &str,
        classroom: &str,
    ) {
        self.classrooms
            .lock()
            .expect("directory mutex poisoned")
            .entry((
                StudentId(student.to_string()),
                school.to_string(),
                year.to_string(),
            ))
            .or_default()
            .push(classroom.to_string());
    }

    pub(super) fn add_staff(&self, user_id: &str, school: &str) {
        self.staff
            .lock()
            .expect("directory mutex poisoned")
            .insert((user_id.to_string(), school.to_string()));
    }
}

impl StudentDirectory for MemoryDirectory {
    fn student(&self, id: &StudentId) -> Result<Option<StudentRecord>, StoreError> {
        Ok(self
            .students
            .lock()
            .expect("directory mutex poisoned")
            .get(id)
            .cloned())
    }

    fn fee_payer_links(&self, student: &StudentId) -> Result<Vec<GuardianLink>, StoreError> {
        Ok(self
            .links
            .lock()
            .expect("directory mutex poisoned")
            .get(student)
            .cloned()
            .unwrap_or_default())
    }

    fn fee_payer_students(&self, contacts: &[ContactId]) -> Result<Vec<StudentId>, StoreError> {
        let links = self.links.lock().expect("directory mutex poisoned");
        let mut students: Vec<StudentId> = links
            .iter()
            .filter(|(_, rows)| {
                rows.iter()
                    .any(|link| contacts.contains(&link.contact_id))
            })
            .map(|(student, _)| student.clone())
            .collect();
        students.sort();
        Ok(students)
    }

    fn has_active_enrollment(
        &self,
        student: &StudentId,
        school_id: &str,
        school_year_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .enrollments
            .lock()
            .expect("directory mutex poisoned")
            .contains(&(
                student.clone(),
                school_id.to_string(),
                school_year_id.to_string(),
            )))
    }

    fn classroom_ids(
        &self,
        student: &StudentId,
        school_id: &str,
        school_year_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .classrooms
            .lock()
            .expect("directory mutex poisoned")
            .get(&(
                student.clone(),
                school_id.to_string(),
                school_year_id.to_string(),
            ))
            .cloned()
            .unwrap_or_default())
    }

    fn is_school_staff(&self, user_id: &str, school_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .staff
            .lock()
            .expect("directory mutex poisoned")
            .contains(&(user_id.to_string(), school_id.to_string())))
    }
}

#[derive(Default)]
pub(super) struct MemoryPolicyStore {
    policies: Mutex<Vec<DiscountPolicy>>,
}

impl MemoryPolicyStore {
    pub(super) fn add(&self, policy: DiscountPolicy) {
        self.policies
            .lock()
            .expect("policy mutex poisoned")
            .push(policy);
    }
}

impl PolicyStore for MemoryPolicyStore {
    fn policies_for_school(&self, school_id: &str) -> Result<Vec<DiscountPolicy>, StoreError> {
        Ok(self
            .policies
            .lock()
            .expect("policy mutex poisoned")
            .iter()
            .filter(|policy| policy.school_id == school_id)
            .cloned()
            .collect())
    }
}

/// In-memory assignment rows; the single mutex stands in for the row-level
/// atomicity real implementations must provide.
#[derive(Default)]
pub(super) struct MemoryAssignmentStore {
    rows: Mutex<HashMap<(PolicyId, StudentId), PolicyAssignment>>,
}

impl MemoryAssignmentStore {
    pub(super) fn insert(&self, row: PolicyAssignment) {
        self.rows
            .lock()
            .expect("assignment mutex poisoned")
            .insert((row.policy_id.clone(), row.student_id.clone()), row);
    }

    pub(super) fn len(&self) -> usize {
        self.rows.lock().expect("assignment mutex poisoned").len()
    }
}

impl AssignmentStore for MemoryAssignmentStore {
    fn assignment(
        &self,
        policy: &PolicyId,
        student: &StudentId,
    ) -> Result<Option<PolicyAssignment>, StoreError> {
        Ok(self
            .rows
            .lock()
            .expect("assignment mutex poisoned")
            .get(&(policy.clone(), student.clone()))
            .cloned())
    }

    fn assignments_for_student(
        &self,
        student: &StudentId,
    ) -> Result<Vec<PolicyAssignment>, StoreError> {
        Ok(self
            .rows
            .lock()
            .expect("assignment mutex poisoned")
            .values()
            .filter(|row| &row.student_id == student)
            .cloned()
            .collect())
    }

    fn grant_auto_allow(&self, grant: AutoAllowGrant) -> Result<AutoGrantOutcome, StoreError> {
        let mut rows = self.rows.lock().expect("assignment mutex poisoned");
        let key = (grant.policy_id.clone(), grant.student_id.clone());
        match rows.get_mut(&key) {
            None => {
                rows.insert(
                    key,
                    PolicyAssignment {
                        policy_id: grant.policy_id,
                        student_id: grant.student_id,
                        status: AssignmentStatus::Allow,
                        source: AssignmentSource::Auto,
                        note: grant.note,
                        metadata: grant.metadata,
                    },
                );
                Ok(AutoGrantOutcome::Created)
            }
            Some(row) if row.source == AssignmentSource::Manual => Ok(AutoGrantOutcome::KeptManual),
            Some(row) if row.status == AssignmentStatus::Deny => Ok(AutoGrantOutcome::KeptDeny),
            Some(row) => {
                row.note = grant.note;
                row.metadata = grant.metadata;
                Ok(AutoGrantOutcome::Refreshed)
            }
        }
    }

    fn upsert_manual(
        &self,
        policy: &PolicyId,
        student: &StudentId,
        status: AssignmentStatus,
        note: Option<String>,
    ) -> Result<PolicyAssignment, StoreError> {
        let mut rows = self.rows.lock().expect("assignment mutex poisoned");
        let row = PolicyAssignment {
            policy_id: policy.clone(),
            student_id: student.clone(),
            status,
            source: AssignmentSource::Manual,
            note,
            metadata: Default::default(),
        };
        rows.insert((policy.clone(), student.clone()), row.clone());
        Ok(row)
    }

    fn remove_if_manual(
        &self,
        policy: &PolicyId,
        student: &StudentId,
    ) -> Result<ManualClearOutcome, StoreError> {
        let mut rows = self.rows.lock().expect("assignment mutex poisoned");
        let key = (policy.clone(), student.clone());
        match rows.get(&key) {
            None => Ok(ManualClearOutcome::Missing),
            Some(row) if row.source == AssignmentSource::Manual => {
                let row = rows.remove(&key).expect("row present under lock");
                Ok(ManualClearOutcome::Removed(row))
            }
            Some(row) => Ok(ManualClearOutcome::Kept(row.clone())),
        }
    }
}

/// Assignment store that fails every write, for abort-path coverage.
pub(super) struct UnavailableAssignmentStore;

impl AssignmentStore for UnavailableAssignmentStore {
    fn assignment(
        &self,
        _policy: &PolicyId,
        _student: &StudentId,
    ) -> Result<Option<PolicyAssignment>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn assignments_for_student(
        &self,
        _student: &StudentId,
    ) -> Result<Vec<PolicyAssignment>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn grant_auto_allow(&self, _grant: AutoAllowGrant) -> Result<AutoGrantOutcome, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn upsert_manual(
        &self,
        _policy: &PolicyId,
        _student: &StudentId,
        _status: AssignmentStatus,
        _note: Option<String>,
    ) -> Result<PolicyAssignment, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn remove_if_manual(
        &self,
        _policy: &PolicyId,
        _student: &StudentId,
    ) -> Result<ManualClearOutcome, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

pub(super) type MemoryBillingService =
    DiscountBillingService<MemoryDirectory, MemoryPolicyStore, MemoryAssignmentStore>;

pub(super) fn build_service() -> (
    Arc<MemoryBillingService>,
    Arc<MemoryDirectory>,
    Arc<MemoryPolicyStore>,
    Arc<MemoryAssignmentStore>,
) {
    let directory = Arc::new(MemoryDirectory::default());
    let policies = Arc::new(MemoryPolicyStore::default());
    let assignments = Arc::new(MemoryAssignmentStore::default());
    let service = Arc::new(DiscountBillingService::new(
        directory.clone(),
        policies.clone(),
        assignments.clone(),
    ));
    (service, directory, policies, assignments)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use super::domain::{
    AssignmentStatus, ContactId, DiscountPolicy, EligibilityContext, PolicyAssignment, PolicyId,
    StudentId, SyncTrigger,
};
use super::eligibility::{EligibilityContextBuilder, EligibilityError};
use super::matching;
use super::policies::PolicyRepository;
use super::store::{
    AssignmentStore, AutoAllowGrant, AutoGrantOutcome, ManualClearOutcome, PolicyStore, StoreError,
    StudentDirectory,
};

/// Errors raised while synchronizing entitlement rows. A failure aborts the
/// whole pass; every individual write is idempotent for non-manual, non-deny
/// state, so the caller can simply retry.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Eligibility(#[from] EligibilityError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What a sync pass did for one matched policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedPolicy {
    pub policy_id: PolicyId,
    pub outcome: AutoGrantOutcome,
}

/// Summary of one `sync_for_student` pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub student_id: StudentId,
    pub trigger: SyncTrigger,
    /// Policies in sync scope that were evaluated against the context.
    pub evaluated: usize,
    /// Matched policies, with the write outcome for each.
    pub synced: Vec<SyncedPolicy>,
}

/// Reacts to lifecycle events by re-evaluating matching and idempotently
/// upserting automatic entitlement rows, without ever clobbering manual
/// overrides. Also hosts the administrator's manual allow/deny calls.
pub struct AssignmentSynchronizer<D, P, A> {
    directory: Arc<D>,
    contexts: EligibilityContextBuilder<D>,
    policies: PolicyRepository<P>,
    assignments: Arc<A>,
}

impl<D, P, A> AssignmentSynchronizer<D, P, A>
where
    D: StudentDirectory,
    P: PolicyStore,
    A: AssignmentStore,
{
    pub fn new(directory: Arc<D>, policy_store: Arc<P>, assignments: Arc<A>) -> Self {
        Self {
            contexts: EligibilityContextBuilder::new(Arc::clone(&directory)),
            directory,
            policies: PolicyRepository::new(policy_store),
            assignments,
        }
    }

    /// Re-evaluate matching for one student and upsert automatic grants.
    ///
    /// Grants only: a policy that stopped matching keeps any earlier auto
    /// grant until an explicit DENY or an upstream policy change removes it.
    pub fn sync_for_student(
        &self,
        student_id: &StudentId,
        school_id: &str,
        school_year_id: &str,
        trigger: SyncTrigger,
    ) -> Result<SyncReport, SyncError> {
        let context = self.contexts.build(student_id, school_id, school_year_id)?;
        let classroom_ids = self
            .directory
            .classroom_ids(student_id, school_id, school_year_id)?;
        let policies =
            self.policies
                .sync_scope(school_id, school_year_id, &classroom_ids, Utc::now())?;

        let evaluated = policies.len();
        let mut synced = Vec::new();
        for policy in &policies {
            if !matching::matches(policy, &context) {
                continue;
            }
            let outcome = self.ensure_auto_allow(policy, &context, trigger)?;
            debug!(
                policy = %policy.id.0,
                student = %student_id.0,
                ?outcome,
                "auto entitlement write"
            );
            synced.push(SyncedPolicy {
                policy_id: policy.id.clone(),
                outcome,
            });
        }

        info!(
            student = %student_id.0,
            trigger = trigger.label(),
            evaluated,
            matched = synced.len(),
            "entitlement sync completed"
        );

        Ok(SyncReport {
            student_id: student_id.clone(),
            trigger,
            evaluated,
            synced,
        })
    }

    /// Fan a contact-linked event out to every fee-paying student it touches.
    pub fn sync_for_contacts(
        &self,
        contact_ids: &[ContactId],
        school_id: &str,
        school_year_id: &str,
    ) -> Result<Vec<SyncReport>, SyncError> {
        let mut reports = Vec::new();
        let mut seen = BTreeSet::new();
        for student_id in self.directory.fee_payer_students(contact_ids)? {
            if !seen.insert(student_id.clone()) {
                continue;
            }
            reports.push(self.sync_for_student(
                &student_id,
                school_id,
                school_year_id,
                SyncTrigger::ContactLinked,
            )?);
        }
        Ok(reports)
    }

    /// Administrator override; always wins, whatever the current row says.
    pub fn set_manual_assignment(
        &self,
        policy_id: &PolicyId,
        student_id: &StudentId,
        status: AssignmentStatus,
        note: Option<String>,
    ) -> Result<PolicyAssignment, SyncError> {
        let row = self
            .assignments
            .upsert_manual(policy_id, student_id, status, note)?;
        info!(
            policy = %policy_id.0,
            student = %student_id.0,
            status = status.label(),
            "manual assignment recorded"
        );
        Ok(row)
    }

    /// Remove a manual override. AUTO rows are refused through this path and
    /// come back unchanged.
    pub fn clear_manual_assignment(
        &self,
        policy_id: &PolicyId,
        student_id: &StudentId,
    ) -> Result<ManualClearOutcome, SyncError> {
        let outcome = self.assignments.remove_if_manual(policy_id, student_id)?;
        match &outcome {
            ManualClearOutcome::Removed(_) => {
                info!(policy = %policy_id.0, student = %student_id.0, "manual assignment cleared");
            }
            ManualClearOutcome::Kept(row) => {
                debug!(
                    policy = %policy_id.0,
                    student = %student_id.0,
                    source = row.source.label(),
                    "clear refused: assignment is not manual"
                );
            }
            ManualClearOutcome::Missing => {
                debug!(policy = %policy_id.0, student = %student_id.0, "clear skipped: no row");
            }
        }
        Ok(outcome)
    }

    fn ensure_auto_allow(
        &self,
        policy: &DiscountPolicy,
        context: &EligibilityContext,
        trigger: SyncTrigger,
    ) -> Result<AutoGrantOutcome, SyncError> {
        let mut metadata = BTreeMap::new();
        metadata.insert("trigger".to_string(), Value::from(trigger.label()));
        metadata.insert(
            "siblingCount".to_string(),
            Value::from(context.sibling_count),
        );
        metadata.insert(
            "isStaffChild".to_string(),
            Value::from(context.is_staff_child),
        );
        metadata.insert(
            "religionId".to_string(),
            context
                .religion_id
                .clone()
                .map_or(Value::Null, Value::from),
        );

        let outcome = self.assignments.grant_auto_allow(AutoAllowGrant {
            policy_id: policy.id.clone(),
            student_id: context.student_id.clone(),
            note: Some(trigger.label().to_string()),
            metadata,
        })?;
        Ok(outcome)
    }
}

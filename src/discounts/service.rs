use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::computation::{self, DiscountOutcome};
use super::domain::{
    AssignmentStatus, ContactId, EligibilityContext, PolicyAssignment, PolicyId, StudentId,
    SyncTrigger,
};
use super::eligibility::{EligibilityContextBuilder, EligibilityError};
use super::ledger::{self, Transaction, TransactionSummary};
use super::policies::PolicyRepository;
use super::store::{AssignmentStore, ManualClearOutcome, PolicyStore, StoreError, StudentDirectory};
use super::sync::{AssignmentSynchronizer, SyncError, SyncReport};

/// Billing-scope parameters for one discount evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountQuery {
    pub school_id: String,
    pub school_year_id: String,
    pub classroom_id: Option<String>,
    pub fee_total: f64,
    /// Evaluation instant; defaults to now.
    pub as_of: Option<DateTime<Utc>>,
}

/// Error raised by the billing facade.
#[derive(Debug, thiserror::Error)]
pub enum BillingServiceError {
    #[error(transparent)]
    Eligibility(#[from] EligibilityError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Facade composing the context builder, policy repository, synchronizer,
/// and discount computer behind the contract the rest of the platform calls.
pub struct DiscountBillingService<D, P, A> {
    contexts: EligibilityContextBuilder<D>,
    policies: PolicyRepository<P>,
    assignments: Arc<A>,
    synchronizer: AssignmentSynchronizer<D, P, A>,
}

impl<D, P, A> DiscountBillingService<D, P, A>
where
    D: StudentDirectory + 'static,
    P: PolicyStore + 'static,
    A: AssignmentStore + 'static,
{
    pub fn new(directory: Arc<D>, policy_store: Arc<P>, assignments: Arc<A>) -> Self {
        Self {
            contexts: EligibilityContextBuilder::new(Arc::clone(&directory)),
            policies: PolicyRepository::new(Arc::clone(&policy_store)),
            assignments: Arc::clone(&assignments),
            synchronizer: AssignmentSynchronizer::new(directory, policy_store, assignments),
        }
    }

    /// Aggregate a student's ledger entries into reconciliation totals.
    pub fn summarize(&self, transactions: &[Transaction]) -> TransactionSummary {
        ledger::summarize(transactions)
    }

    /// Derive the discount-relevant snapshot for a student.
    pub fn build_eligibility_context(
        &self,
        student_id: &StudentId,
        school_id: &str,
        school_year_id: &str,
    ) -> Result<EligibilityContext, BillingServiceError> {
        Ok(self.contexts.build(student_id, school_id, school_year_id)?)
    }

    /// Compute the automatic discount for a fee total.
    ///
    /// Amounts are never persisted; every billing evaluation recomputes from
    /// the current policies, assignment rows, and fee total.
    pub fn compute_automatic_discount(
        &self,
        query: &DiscountQuery,
        context: &EligibilityContext,
    ) -> Result<DiscountOutcome, BillingServiceError> {
        let as_of = query.as_of.unwrap_or_else(Utc::now);
        let policies = self.policies.billing_scope(
            &query.school_id,
            &query.school_year_id,
            query.classroom_id.as_deref(),
            as_of,
        )?;

        let assignments: HashMap<PolicyId, PolicyAssignment> = self
            .assignments
            .assignments_for_student(&context.student_id)?
            .into_iter()
            .map(|row| (row.policy_id.clone(), row))
            .collect();

        Ok(computation::compute_automatic_discount(
            &policies,
            &assignments,
            context,
            query.fee_total,
        ))
    }

    /// React to a student lifecycle event.
    pub fn sync_for_student(
        &self,
        student_id: &StudentId,
        school_id: &str,
        school_year_id: &str,
        trigger: SyncTrigger,
    ) -> Result<SyncReport, BillingServiceError> {
        Ok(self
            .synchronizer
            .sync_for_student(student_id, school_id, school_year_id, trigger)?)
    }

    /// React to a guardian-contact link event.
    pub fn sync_for_contacts(
        &self,
        contact_ids: &[ContactId],
        school_id: &str,
        school_year_id: &str,
    ) -> Result<Vec<SyncReport>, BillingServiceError> {
        Ok(self
            .synchronizer
            .sync_for_contacts(contact_ids, school_id, school_year_id)?)
    }

    /// Record an administrator's explicit allow/deny for a (policy, student).
    pub fn set_manual_assignment(
        &self,
        policy_id: &PolicyId,
        student_id: &StudentId,
        status: AssignmentStatus,
        note: Option<String>,
    ) -> Result<PolicyAssignment, BillingServiceError> {
        Ok(self
            .synchronizer
            .set_manual_assignment(policy_id, student_id, status, note)?)
    }

    /// Remove an administrator's override, refusing to touch AUTO rows.
    pub fn clear_manual_assignment(
        &self,
        policy_id: &PolicyId,
        student_id: &StudentId,
    ) -> Result<ManualClearOutcome, BillingServiceError> {
        Ok(self
            .synchronizer
            .clear_manual_assignment(policy_id, student_id)?)
    }
}

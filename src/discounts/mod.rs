//! Discount-policy billing engine.
//!
//! Lifecycle events (student created/updated, guardian-contact linked) feed
//! the [`AssignmentSynchronizer`], which rebuilds the student's eligibility
//! snapshot, re-runs the matcher, and idempotently upserts automatic
//! entitlement rows. Independently, billing evaluations combine in-scope
//! policies and stored assignment rows through
//! [`compute_automatic_discount`] to produce a deterministic stacked amount.
//! Discount amounts are never persisted; every evaluation recomputes from
//! current state.

pub mod computation;
pub mod domain;
pub mod eligibility;
pub mod ledger;
pub mod matching;
pub mod policies;
pub mod router;
pub mod service;
pub mod store;
pub mod sync;

#[cfg(test)]
mod tests;

pub use computation::{compute_automatic_discount, AppliedDiscount, DiscountOutcome};
pub use domain::{
    AssignmentSource, AssignmentStatus, ContactId, DiscountPolicy, DiscountValueType,
    EligibilityContext, PolicyAssignment, PolicyCriterion, PolicyId, ReligionCriterion, StudentId,
    SyncTrigger, DEFAULT_MIN_CHILDREN,
};
pub use eligibility::{EligibilityContextBuilder, EligibilityError};
pub use ledger::{summarize, Transaction, TransactionSummary, TransactionType};
pub use matching::matches;
pub use policies::PolicyRepository;
pub use router::billing_router;
pub use service::{BillingServiceError, DiscountBillingService, DiscountQuery};
pub use store::{
    AssignmentStore, AutoAllowGrant, AutoGrantOutcome, GuardianLink, ManualClearOutcome,
    PolicyStore, StoreError, StudentDirectory, StudentRecord,
};
pub use sync::{AssignmentSynchronizer, SyncError, SyncReport, SyncedPolicy};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::domain::{
    AssignmentStatus, DiscountPolicy, DiscountValueType, EligibilityContext, PolicyAssignment,
    PolicyId,
};
use super::matching;

/// One policy's contribution to a computed discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedDiscount {
    pub policy_id: PolicyId,
    pub policy_name: String,
    pub amount: f64,
    pub value_type: DiscountValueType,
    pub value: f64,
}

/// Deterministic result of one discount evaluation. The sum of the applied
/// amounts always equals `total`, and `total` never exceeds the fee total.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountOutcome {
    pub total: f64,
    pub applied: Vec<AppliedDiscount>,
}

impl DiscountOutcome {
    fn empty() -> Self {
        Self {
            total: 0.0,
            applied: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    /// Discounts may still accumulate.
    Accumulating,
    /// Terminal: an exclusive policy applied, or the fee is fully discounted.
    Settled,
}

/// Outcome of offering one policy to a [`DiscountRun`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum OfferOutcome {
    /// The amount was accepted. `terminal` marks an exclusive (non-stackable)
    /// application, which consumes the whole evaluation.
    Applied { amount: f64, terminal: bool },
    /// Policy skipped; the run continues.
    Skipped(SkipReason),
    /// Nothing of the fee remains; the run is settled.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipReason {
    /// A non-stackable policy arrived after discount had already accumulated.
    /// It may never layer on top, and it never terminates the run by itself.
    ExclusiveAfterAccumulation,
    /// The candidate clamped to nothing (zero value or zero cap).
    NothingToApply,
}

/// Small state machine accumulating stacked discounts against one fee total.
///
/// Policies must be offered in canonical `(priority, created_at)` order; the
/// run owns the termination contract (`Accumulating` until an exclusive
/// application or fee exhaustion settles it) so that contract is testable
/// apart from iteration.
#[derive(Debug)]
pub(crate) struct DiscountRun {
    fee_total: f64,
    total: f64,
    applied: Vec<AppliedDiscount>,
    phase: RunPhase,
}

impl DiscountRun {
    pub(crate) fn new(fee_total: f64) -> Self {
        Self {
            fee_total,
            total: 0.0,
            applied: Vec::new(),
            phase: RunPhase::Accumulating,
        }
    }

    pub(crate) fn is_settled(&self) -> bool {
        self.phase == RunPhase::Settled
    }

    /// Offer the next eligible policy in canonical order.
    pub(crate) fn offer(&mut self, policy: &DiscountPolicy) -> OfferOutcome {
        debug_assert!(!self.is_settled(), "offer after the run settled");

        if !policy.stackable && self.total > 0.0 {
            return OfferOutcome::Skipped(SkipReason::ExclusiveAfterAccumulation);
        }

        let remaining = (self.fee_total - self.total).max(0.0);
        if remaining <= 0.0 {
            self.phase = RunPhase::Settled;
            return OfferOutcome::Exhausted;
        }

        let amount = candidate_amount(policy, self.fee_total).min(remaining);
        if amount <= 0.0 {
            return OfferOutcome::Skipped(SkipReason::NothingToApply);
        }

        self.total += amount;
        self.applied.push(AppliedDiscount {
            policy_id: policy.id.clone(),
            policy_name: policy.name.clone(),
            amount,
            value_type: policy.value_type,
            value: policy.value,
        });

        let terminal = !policy.stackable;
        if terminal {
            self.phase = RunPhase::Settled;
        }
        OfferOutcome::Applied { amount, terminal }
    }

    pub(crate) fn finish(self) -> DiscountOutcome {
        DiscountOutcome {
            total: self.total,
            applied: self.applied,
        }
    }
}

/// Raw candidate before the remaining-fee clamp: interpret the value, floor
/// at zero, then honor the optional cap (itself floored at zero).
fn candidate_amount(policy: &DiscountPolicy, fee_total: f64) -> f64 {
    let raw = match policy.value_type {
        DiscountValueType::Percent => fee_total * policy.value / 100.0,
        DiscountValueType::Fixed => policy.value,
    };

    let mut amount = raw.max(0.0);
    if let Some(cap) = policy.max_amount {
        amount = amount.min(cap.max(0.0));
    }
    amount
}

/// Compute the stacked automatic discount for a fee total.
///
/// `policies` must already be filtered to the billing scope and canonically
/// ordered (see [`super::policies::PolicyRepository`]). A DENY assignment
/// suppresses its policy unconditionally; an ALLOW assignment applies it
/// without consulting the matcher.
pub fn compute_automatic_discount(
    policies: &[DiscountPolicy],
    assignments: &HashMap<PolicyId, PolicyAssignment>,
    context: &EligibilityContext,
    fee_total: f64,
) -> DiscountOutcome {
    if fee_total <= 0.0 {
        return DiscountOutcome::empty();
    }

    let mut run = DiscountRun::new(fee_total);
    for policy in policies {
        if run.is_settled() {
            break;
        }

        let assignment = assignments.get(&policy.id);
        if assignment.is_some_and(|row| row.status == AssignmentStatus::Deny) {
            continue;
        }

        // Any surviving row is an explicit ALLOW and skips the matcher.
        let eligible = assignment.is_some() || matching::matches(policy, context);
        if !eligible {
            continue;
        }

        run.offer(policy);
    }

    run.finish()
}

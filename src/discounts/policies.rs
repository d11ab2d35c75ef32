use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::domain::DiscountPolicy;
use super::store::{PolicyStore, StoreError};

/// Read-side access to applicable policies in canonical order.
///
/// Every downstream consumer relies on `(priority asc, created_at asc)` as
/// the tie-break for stacking and exclusivity, so the ordering is applied
/// here and nowhere else.
pub struct PolicyRepository<P> {
    store: Arc<P>,
}

impl<P: PolicyStore> PolicyRepository<P> {
    pub fn new(store: Arc<P>) -> Self {
        Self { store }
    }

    /// Policies applicable when billing against one classroom placement.
    ///
    /// With a classroom id, classroom-agnostic policies and policies pinned
    /// to that classroom match; without one, only classroom-agnostic policies
    /// match.
    pub fn billing_scope(
        &self,
        school_id: &str,
        school_year_id: &str,
        classroom_id: Option<&str>,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<DiscountPolicy>, StoreError> {
        self.scoped(school_id, school_year_id, as_of, |policy| {
            match (policy.classroom_id.as_deref(), classroom_id) {
                (None, _) => true,
                (Some(own), Some(given)) => own == given,
                (Some(_), None) => false,
            }
        })
    }

    /// Policies applicable while synchronizing a student currently placed in
    /// any of `classroom_ids`.
    pub fn sync_scope(
        &self,
        school_id: &str,
        school_year_id: &str,
        classroom_ids: &[String],
        as_of: DateTime<Utc>,
    ) -> Result<Vec<DiscountPolicy>, StoreError> {
        self.scoped(school_id, school_year_id, as_of, |policy| {
            policy
                .classroom_id
                .as_ref()
                .map_or(true, |own| classroom_ids.iter().any(|id| id == own))
        })
    }

    fn scoped<F>(
        &self,
        school_id: &str,
        school_year_id: &str,
        as_of: DateTime<Utc>,
        classroom_filter: F,
    ) -> Result<Vec<DiscountPolicy>, StoreError>
    where
        F: Fn(&DiscountPolicy) -> bool,
    {
        let mut policies: Vec<DiscountPolicy> = self
            .store
            .policies_for_school(school_id)?
            .into_iter()
            .filter(|policy| policy.is_active)
            .filter(|policy| policy.window_contains(as_of))
            .filter(|policy| {
                policy
                    .school_year_id
                    .as_deref()
                    .map_or(true, |year| year == school_year_id)
            })
            .filter(|policy| classroom_filter(policy))
            .collect();

        // Stable sort: rows with equal keys keep the store's scan order.
        policies.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });

        Ok(policies)
    }
}

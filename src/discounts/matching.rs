use super::domain::{DiscountPolicy, EligibilityContext, PolicyCriterion, ReligionCriterion};

/// Pure predicate: does the student snapshot satisfy the policy's criterion?
///
/// Malformed or unrecognized criteria never error; they fail closed, so a
/// broken policy configuration denies a discount rather than granting one.
pub fn matches(policy: &DiscountPolicy, context: &EligibilityContext) -> bool {
    match &policy.criterion {
        PolicyCriterion::Always => true,
        PolicyCriterion::SiblingCount { min_children } => context.sibling_count >= *min_children,
        PolicyCriterion::StaffChild => context.is_staff_child,
        PolicyCriterion::Religion(criterion) => matches_religion(criterion, context),
        PolicyCriterion::Unrecognized => false,
    }
}

/// Strict fallback order: id, then name, then baptism flag. A religion
/// criterion with none of its fields set matches nothing.
fn matches_religion(criterion: &ReligionCriterion, context: &EligibilityContext) -> bool {
    if let Some(required_id) = &criterion.religion_id {
        return context.religion_id.as_deref() == Some(required_id.as_str());
    }

    if let Some(required_name) = &criterion.religion_name {
        return context
            .religion_name
            .as_deref()
            .is_some_and(|name| names_equal(name, required_name));
    }

    if let Some(required) = criterion.is_baptized {
        return context.is_baptized == required;
    }

    false
}

fn names_equal(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

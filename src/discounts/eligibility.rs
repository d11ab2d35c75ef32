use std::collections::BTreeSet;
use std::sync::Arc;

use super::domain::{ContactId, EligibilityContext, StudentId};
use super::store::{StoreError, StudentDirectory};

/// Errors raised while deriving an eligibility snapshot.
#[derive(Debug, thiserror::Error)]
pub enum EligibilityError {
    /// The student is expected to exist; absence is a data-integrity fault,
    /// not a business outcome, and must propagate to the caller.
    #[error("student {0} not found")]
    StudentNotFound(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Derives the per-student snapshot of discount-relevant facts.
///
/// Pure read, no side effects. The snapshot is rebuilt on every call and
/// never cached; sibling counts and staff links move underneath us as
/// enrollment data changes.
pub struct EligibilityContextBuilder<D> {
    directory: Arc<D>,
}

impl<D: StudentDirectory> EligibilityContextBuilder<D> {
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }

    pub fn build(
        &self,
        student_id: &StudentId,
        school_id: &str,
        school_year_id: &str,
    ) -> Result<EligibilityContext, EligibilityError> {
        let student = self
            .directory
            .student(student_id)?
            .ok_or_else(|| EligibilityError::StudentNotFound(student_id.0.clone()))?;

        let links = self.directory.fee_payer_links(student_id)?;

        let contact_ids: Vec<ContactId> = {
            let mut seen = BTreeSet::new();
            links
                .iter()
                .filter(|link| seen.insert(link.contact_id.clone()))
                .map(|link| link.contact_id.clone())
                .collect()
        };
        let user_ids: BTreeSet<String> = links
            .iter()
            .filter_map(|link| link.user_id.clone())
            .collect();

        // A student with no fee-paying guardians is a sibling group of one.
        let mut sibling_count = 1;
        if !contact_ids.is_empty() {
            let mut counted = BTreeSet::new();
            let mut enrolled: u32 = 0;
            for sibling in self.directory.fee_payer_students(&contact_ids)? {
                if !counted.insert(sibling.clone()) {
                    continue;
                }
                if self
                    .directory
                    .has_active_enrollment(&sibling, school_id, school_year_id)?
                {
                    enrolled += 1;
                }
            }
            sibling_count = enrolled.max(1);
        }

        let mut is_staff_child = false;
        for user_id in &user_ids {
            if self.directory.is_school_staff(user_id, school_id)? {
                is_staff_child = true;
                break;
            }
        }

        Ok(EligibilityContext {
            student_id: student_id.clone(),
            school_id: school_id.to_string(),
            school_year_id: school_year_id.to_string(),
            sibling_count,
            is_staff_child,
            religion_id: student.religion_id,
            religion_name: student.religion_name,
            is_baptized: student.is_baptized,
        })
    }
}

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    routing::put,
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{AssignmentStatus, ContactId, PolicyId, StudentId, SyncTrigger};
use super::eligibility::EligibilityError;
use super::ledger::Transaction;
use super::service::{BillingServiceError, DiscountBillingService, DiscountQuery};
use super::store::{AssignmentStore, ManualClearOutcome, PolicyStore, StudentDirectory};
use super::sync::SyncError;

/// Router builder exposing the billing facade to the host service.
///
/// The engine itself is transport-free; these routes are the thin adapter
/// the platform mounts next to its own CRUD surface.
pub fn billing_router<D, P, A>(service: Arc<DiscountBillingService<D, P, A>>) -> Router
where
    D: StudentDirectory + 'static,
    P: PolicyStore + 'static,
    A: AssignmentStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/billing/students/:student_id/discount-preview",
            post(preview_handler::<D, P, A>),
        )
        .route(
            "/api/v1/billing/students/:student_id/sync",
            post(student_sync_handler::<D, P, A>),
        )
        .route(
            "/api/v1/billing/contacts/sync",
            post(contact_sync_handler::<D, P, A>),
        )
        .route(
            "/api/v1/billing/policies/:policy_id/assignments/:student_id",
            put(manual_assignment_handler::<D, P, A>)
                .delete(clear_assignment_handler::<D, P, A>),
        )
        .route(
            "/api/v1/billing/transactions/summary",
            post(summary_handler::<D, P, A>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub struct StudentSyncRequest {
    pub school_id: String,
    pub school_year_id: String,
    pub trigger: SyncTrigger,
}

#[derive(Debug, Deserialize)]
pub struct ContactSyncRequest {
    pub contact_ids: Vec<ContactId>,
    pub school_id: String,
    pub school_year_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ManualAssignmentRequest {
    pub status: AssignmentStatus,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    pub transactions: Vec<Transaction>,
}

pub(crate) async fn preview_handler<D, P, A>(
    State(service): State<Arc<DiscountBillingService<D, P, A>>>,
    Path(student_id): Path<String>,
    axum::Json(query): axum::Json<DiscountQuery>,
) -> Response
where
    D: StudentDirectory + 'static,
    P: PolicyStore + 'static,
    A: AssignmentStore + 'static,
{
    let student_id = StudentId(student_id);
    let context = match service.build_eligibility_context(
        &student_id,
        &query.school_id,
        &query.school_year_id,
    ) {
        Ok(context) => context,
        Err(error) => return error_response(&error),
    };

    match service.compute_automatic_discount(&query, &context) {
        Ok(outcome) => {
            let payload = json!({
                "student_id": student_id.0,
                "fee_total": query.fee_total,
                "amount": outcome.total,
                "applied": outcome.applied,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn student_sync_handler<D, P, A>(
    State(service): State<Arc<DiscountBillingService<D, P, A>>>,
    Path(student_id): Path<String>,
    axum::Json(request): axum::Json<StudentSyncRequest>,
) -> Response
where
    D: StudentDirectory + 'static,
    P: PolicyStore + 'static,
    A: AssignmentStore + 'static,
{
    let student_id = StudentId(student_id);
    match service.sync_for_student(
        &student_id,
        &request.school_id,
        &request.school_year_id,
        request.trigger,
    ) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn contact_sync_handler<D, P, A>(
    State(service): State<Arc<DiscountBillingService<D, P, A>>>,
    axum::Json(request): axum::Json<ContactSyncRequest>,
) -> Response
where
    D: StudentDirectory + 'static,
    P: PolicyStore + 'static,
    A: AssignmentStore + 'static,
{
    match service.sync_for_contacts(
        &request.contact_ids,
        &request.school_id,
        &request.school_year_id,
    ) {
        Ok(reports) => (StatusCode::OK, axum::Json(reports)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn manual_assignment_handler<D, P, A>(
    State(service): State<Arc<DiscountBillingService<D, P, A>>>,
    Path((policy_id, student_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<ManualAssignmentRequest>,
) -> Response
where
    D: StudentDirectory + 'static,
    P: PolicyStore + 'static,
    A: AssignmentStore + 'static,
{
    match service.set_manual_assignment(
        &PolicyId(policy_id),
        &StudentId(student_id),
        request.status,
        request.note,
    ) {
        Ok(row) => (StatusCode::OK, axum::Json(row)).into_response(),
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn clear_assignment_handler<D, P, A>(
    State(service): State<Arc<DiscountBillingService<D, P, A>>>,
    Path((policy_id, student_id)): Path<(String, String)>,
) -> Response
where
    D: StudentDirectory + 'static,
    P: PolicyStore + 'static,
    A: AssignmentStore + 'static,
{
    match service.clear_manual_assignment(&PolicyId(policy_id), &StudentId(student_id)) {
        Ok(ManualClearOutcome::Removed(row)) => {
            let payload = json!({ "removed": true, "assignment": row });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Ok(ManualClearOutcome::Kept(row)) => {
            let payload = json!({ "removed": false, "assignment": row });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Ok(ManualClearOutcome::Missing) => {
            let payload = json!({ "error": "no assignment for policy/student" });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(&error),
    }
}

pub(crate) async fn summary_handler<D, P, A>(
    State(service): State<Arc<DiscountBillingService<D, P, A>>>,
    axum::Json(request): axum::Json<SummaryRequest>,
) -> Response
where
    D: StudentDirectory + 'static,
    P: PolicyStore + 'static,
    A: AssignmentStore + 'static,
{
    let summary = service.summarize(&request.transactions);
    (StatusCode::OK, axum::Json(summary)).into_response()
}

fn error_response(error: &BillingServiceError) -> Response {
    let status = match error {
        BillingServiceError::Eligibility(EligibilityError::StudentNotFound(_))
        | BillingServiceError::Sync(SyncError::Eligibility(
            EligibilityError::StudentNotFound(_),
        )) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let body = axum::Json(json!({ "error": error.to_string() }));
    (status, body).into_response()
}

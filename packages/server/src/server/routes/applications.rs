//! Application submission endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::domains::applications::{Application, ApplyError, ApplyRequest};
use crate::server::app::AppState;

#[derive(Serialize)]
pub struct ApplicationResponse {
    #[serde(flatten)]
    application: Application,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for ApplyError {
    fn into_response(self) -> Response {
        match self {
            ApplyError::InvalidUrl(message) => error_response(StatusCode::BAD_REQUEST, message),
            ApplyError::NotFound => error_response(StatusCode::NOT_FOUND, "application not found"),
            ApplyError::NotCancellable { .. } => {
                error_response(StatusCode::CONFLICT, self.to_string())
            }
            ApplyError::Internal(e) => {
                error!(error = %e, "application request failed");
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
            }
        }
    }
}

/// POST /applications
pub async fn create_application_handler(
    State(state): State<AppState>,
    Json(request): Json<ApplyRequest>,
) -> Result<Response, ApplyError> {
    let (application, created) = state.applications.apply(request).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(ApplicationResponse { application })).into_response())
}

/// GET /applications/:id
pub async fn get_application_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApplicationResponse>, ApplyError> {
    let application = state.applications.get(id).await?;
    Ok(Json(ApplicationResponse { application }))
}

/// POST /applications/:id/cancel
pub async fn cancel_application_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApplicationResponse>, ApplyError> {
    let application = state.applications.cancel(id).await?;
    Ok(Json(ApplicationResponse { application }))
}

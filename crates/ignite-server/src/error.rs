use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use ignite_core::error::IgniteError;

// ---------------------------------------------------------------------------
// Internal sentinels for statuses that have no IgniteError variant
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 400 through the `anyhow::Error` chain.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

/// Carries an explicit HTTP 401 through the `anyhow::Error` chain.
#[derive(Debug)]
struct UnauthorizedError(String);

impl std::fmt::Display for UnauthorizedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for UnauthorizedError {}

// ---------------------------------------------------------------------------
// AppError
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }

    /// Construct a 401 Unauthorized error.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self(UnauthorizedError(msg.into()).into())
    }
}

fn status_of(e: &IgniteError) -> StatusCode {
    match e {
        IgniteError::NotInitialized => StatusCode::BAD_REQUEST,
        IgniteError::ProjectNotFound(_)
        | IgniteError::LessonNotFound(_)
        | IgniteError::StepNotFound(_)
        | IgniteError::StateNotFound { .. }
        | IgniteError::DraftNotFound { .. }
        | IgniteError::DraftNotAllowed(_) => StatusCode::NOT_FOUND,
        IgniteError::IsDraft { .. }
        | IgniteError::InvalidField { .. }
        | IgniteError::InvalidPublishMode(_)
        | IgniteError::InvalidModeTransition { .. }
        | IgniteError::Mismatch { .. }
        | IgniteError::PublishCheck(_) => StatusCode::BAD_REQUEST,
        IgniteError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        IgniteError::NotEditable { .. } => StatusCode::CONFLICT,
        IgniteError::Db(_) | IgniteError::Io(_) | IgniteError::Yaml(_) | IgniteError::Json(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(b) = self.0.downcast_ref::<BadRequestError>() {
            let body = serde_json::json!({ "error": b.0.clone() });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }
        if let Some(u) = self.0.downcast_ref::<UnauthorizedError>() {
            let body = serde_json::json!({ "error": u.0.clone() });
            return (StatusCode::UNAUTHORIZED, axum::Json(body)).into_response();
        }

        let Some(e) = self.0.downcast_ref::<IgniteError>() else {
            tracing::error!(error = %self.0, "unhandled error");
            let body = serde_json::json!({ "error": self.0.to_string() });
            return (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response();
        };

        let status = status_of(e);
        if status.is_server_error() {
            tracing::error!(error = %e, "request failed");
        }
        let body = match e {
            IgniteError::PublishCheck(issues) => serde_json::json!({
                "error": e.to_string(),
                "publish_errors": issues,
            }),
            _ => serde_json::json!({ "error": e.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ignite_core::publish::PublishIssue;

    fn status(e: IgniteError) -> StatusCode {
        AppError(e.into()).into_response().status()
    }

    #[test]
    fn not_found_kinds_map_to_404() {
        assert_eq!(status(IgniteError::ProjectNotFound(1)), StatusCode::NOT_FOUND);
        assert_eq!(status(IgniteError::LessonNotFound(1)), StatusCode::NOT_FOUND);
        assert_eq!(
            status(IgniteError::DraftNotFound { kind: "project", id: 1 }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status(IgniteError::DraftNotAllowed(3)), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_transition_maps_to_400() {
        let err = IgniteError::InvalidModeTransition {
            from: "published".into(),
            to: "edit".into(),
        };
        assert_eq!(status(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn permission_denied_maps_to_403() {
        assert_eq!(
            status(IgniteError::PermissionDenied("nope".into())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn not_editable_maps_to_409() {
        let err = IgniteError::NotEditable {
            project: 1,
            mode: "review".into(),
        };
        assert_eq!(status(err), StatusCode::CONFLICT);
    }

    #[test]
    fn publish_check_maps_to_400() {
        let err = IgniteError::PublishCheck(vec![PublishIssue {
            path: "title".into(),
            message: "required".into(),
        }]);
        assert_eq!(status(err), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn db_error_maps_to_500() {
        assert_eq!(
            status(IgniteError::Db("corrupt".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn non_ignite_error_maps_to_500() {
        let response = AppError(anyhow::anyhow!("something unexpected")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn constructors_map_to_their_status() {
        assert_eq!(
            AppError::bad_request("bad").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::unauthorized("who").into_response().status(),
            StatusCode::UNAUTHORIZED
        );
    }
}

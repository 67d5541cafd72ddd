//! HTTP error mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::data::DataError;
use crate::onboarding::OnboardingError;
use crate::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Onboarding(#[from] OnboardingError),

    #[error(transparent)]
    Auth(#[from] DataError),

    #[error("validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("{0}")]
    BadRequest(String),
}

fn data_status(e: &DataError) -> StatusCode {
    if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else if e.is_constraint() {
        StatusCode::CONFLICT
    } else {
        match e {
            DataError::InvalidIdentifier(_) | DataError::MissingFilter(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

fn store_status(e: &StoreError) -> StatusCode {
    match e {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Validation(_) | StoreError::Money(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::Unsupported(_) => StatusCode::BAD_REQUEST,
        StoreError::Remote(e) => data_status(e),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Store(e) => store_status(e),
            Self::Onboarding(e) => match e {
                OnboardingError::Validation(_) | OnboardingError::InvalidStoreName(_) => StatusCode::UNPROCESSABLE_ENTITY,
                OnboardingError::Auth(e) => data_status(e),
                OnboardingError::Store(e) => store_status(e),
            },
            Self::Auth(e) => data_status(e),
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        // local failures stay internal
        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            _ => self.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let missing = ApiError::from(StoreError::NotFound { entity: "wallet", id: Uuid::nil() });
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let remote = ApiError::from(StoreError::Remote(DataError::Remote { message: "timeout".into(), code: None }));
        assert_eq!(remote.status(), StatusCode::BAD_GATEWAY);

        let conflict = ApiError::from(StoreError::Remote(DataError::Constraint("duplicate".into())));
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let row_missing = ApiError::from(DataError::Remote { message: "no rows".into(), code: Some("PGRST116".into()) });
        assert_eq!(row_missing.status(), StatusCode::NOT_FOUND);

        assert_eq!(ApiError::from(StoreError::Unsupported("store")).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(StoreError::NotAnObject).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::services::error::ErrorBody;
use crate::services::ServiceError;

/// JSON extractor that runs `validator` rules before the handler sees the
/// payload. Rule failures surface as [`ServiceError::Validation`].
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            let body = ErrorBody {
                code: "error.validation_failed".to_string(),
                message: format!("Json parse error: {e}"),
                missing: None,
            };
            (StatusCode::BAD_REQUEST, Json(body)).into_response()
        })?;

        value
            .validate()
            .map_err(|e| ServiceError::Validation(e).into_response())?;

        Ok(ValidatedJson(value))
    }
}

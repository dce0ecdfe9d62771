use axum::{
    extract::{FromRequest, Request},
    Json,
};

use crate::handlers::ApiError;

/// JSON body extractor whose rejections use the API's JSON error shape.
pub struct AppJson<T>(pub T);

impl<T, S> FromRequest<S> for AppJson<T>
where
    T: serde::de::DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| AppJson(value))
            .map_err(|rejection| {
                tracing::warn!(error = %rejection.body_text(), "rejected request body");
                ApiError::bad_request(format!("Invalid JSON body: {}", rejection.body_text()))
            })
    }
}

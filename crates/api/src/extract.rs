//! Request body extraction.

use axum::extract::{FromRequest, Request};
use axum::Json;
use galilee_core::outcome::OperationOutcome;
use serde::de::DeserializeOwned;

use crate::response::OutcomeResponse;

/// JSON body extractor whose rejection is a `validation_error` outcome
/// (400), so unknown or forbidden keys, missing fields and wrong types
/// answer in the same envelope as every other request problem.
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = OutcomeResponse<()>;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                let message = rejection.body_text();
                tracing::debug!(error = %message, "Request body rejected");
                Err(OperationOutcome::validation(message).into())
            }
        }
    }
}

//! JSON body extractor for the checkout routes
//!
//! Body rejections (bad JSON, wrong field types, missing content type) come
//! back as `400 {errors: [...]}` like every other checkout validation failure,
//! instead of axum's plain-text 4xx.

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::checkout::CheckoutError;

pub struct CheckoutJson<T>(pub T);

impl<T, S> FromRequest<S> for CheckoutJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = CheckoutError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let axum::Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection: JsonRejection| {
                tracing::debug!(error = %rejection, "Rejected checkout body");
                CheckoutError::Invalid(vec![rejection.body_text()])
            })?;
        Ok(Self(value))
    }
}

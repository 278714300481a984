//! Extractors that reject with the service's JSON error shape.

use axum::async_trait;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::Json;
use serde::de::DeserializeOwned;

use zenit_core::DomainError;

use crate::ApiError;

/// `Json<T>` whose rejections become `400 {"error": ...}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    let message = match rejection {
        JsonRejection::MissingJsonContentType(_) => "expected a JSON body".to_string(),
        other => other.body_text(),
    };
    ApiError(DomainError::validation(message))
}

/// `Query<T>` whose rejections become `400 {"error": ...}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Query::<T>::from_request_parts(parts, state)
            .await
            .map(|Query(value)| Self(value))
            .map_err(|rejection: QueryRejection| ApiError(DomainError::validation(rejection.body_text())))
    }
}

/// The token of an `Authorization: Bearer <token>` header.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, DomainError> {
    let missing = || DomainError::unauthenticated("missing bearer token");

    let header = headers.get(AUTHORIZATION).ok_or_else(missing)?;
    let header = header.to_str().map_err(|_| missing())?;
    let header = header.strip_prefix("Bearer ").ok_or_else(missing)?;

    let token = header.trim();
    if token.is_empty() {
        return Err(missing());
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")).unwrap(), "abc.def");
        assert_eq!(extract_bearer(&headers("Bearer   padded  ")).unwrap(), "padded");
    }

    #[test]
    fn missing_or_malformed_header_is_unauthenticated() {
        assert!(matches!(
            extract_bearer(&HeaderMap::new()),
            Err(DomainError::Unauthenticated(_))
        ));
        assert!(extract_bearer(&headers("Basic dXNlcjpwYXNz")).is_err());
        assert!(extract_bearer(&headers("Bearer ")).is_err());
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_error() {
        #[derive(Debug, serde::Deserialize)]
        struct Body {
            #[allow(dead_code)]
            name: String,
        }

        let req = Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{\"name\": 5}"))
            .unwrap();
        let err = ApiJson::<Body>::from_request(req, &()).await.unwrap_err();
        assert!(matches!(err.0, DomainError::Validation(_)));
    }
}

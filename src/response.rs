//! Response envelope: a status and an optional JSON body, written once per request.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;

#[derive(Debug)]
pub struct Envelope {
    pub status: StatusCode,
    pub body: Option<Value>,
    pub pretty: bool,
}

impl Envelope {
    pub fn ok(body: Value) -> Self {
        Envelope {
            status: StatusCode::OK,
            body: Some(body),
            pretty: false,
        }
    }

    pub fn created(body: Value) -> Self {
        Envelope {
            status: StatusCode::CREATED,
            body: Some(body),
            pretty: false,
        }
    }

    /// 200 with no body.
    pub fn empty() -> Self {
        Envelope {
            status: StatusCode::OK,
            body: None,
            pretty: false,
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let Some(body) = self.body else {
            return self.status.into_response();
        };
        let rendered = if self.pretty {
            serde_json::to_vec_pretty(&body)
        } else {
            serde_json::to_vec(&body)
        };
        match rendered {
            Ok(bytes) => (
                self.status,
                [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                bytes,
            )
                .into_response(),
            Err(e) => crate::error::AppError::Store(format!("cannot serialize response: {}", e)).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn empty_envelope_has_no_body() {
        let resp = Envelope::empty().into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn pretty_output_is_indented() {
        let resp = Envelope::created(json!({"a": 1})).pretty(true).into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), "{\n  \"a\": 1\n}");
    }
}

// src/handlers/success.rs

use super::base::{Outcome, ResponseHandler};
use crate::models::ChatCompletionResponse;
use axum::{body::Bytes, http::StatusCode};
use tracing::warn;

/// 2xx with a usable `choices[0].message.content`. A 2xx body without one is a transient
/// failure, not a success.
pub struct SuccessHandler;

impl ResponseHandler for SuccessHandler {
    fn handle(&self, status: StatusCode, body: &Bytes) -> Option<Outcome> {
        if !status.is_success() {
            return None;
        }

        let content = serde_json::from_slice::<ChatCompletionResponse>(body)
            .ok()
            .and_then(ChatCompletionResponse::into_content);

        Some(match content {
            Some(content) => Outcome::Success(content),
            None => {
                warn!(status = status.as_u16(), "Upstream returned 2xx without completion content");
                Outcome::TransientError("malformed completion body".to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_handler_extracts_content() {
        let body = Bytes::from_static(br#"{"choices":[{"message":{"role":"assistant","content":"ok"}}]}"#);
        assert_eq!(
            SuccessHandler.handle(StatusCode::OK, &body),
            Some(Outcome::Success("ok".to_string()))
        );
    }

    #[test]
    fn test_success_handler_flags_malformed_body() {
        let body = Bytes::from_static(b"<html>oops</html>");
        assert!(matches!(
            SuccessHandler.handle(StatusCode::OK, &body),
            Some(Outcome::TransientError(_))
        ));
    }

    #[test]
    fn test_success_handler_ignores_errors() {
        let body = Bytes::new();
        assert!(SuccessHandler.handle(StatusCode::BAD_REQUEST, &body).is_none());
        assert!(SuccessHandler.handle(StatusCode::TOO_MANY_REQUESTS, &body).is_none());
        assert!(SuccessHandler.handle(StatusCode::INTERNAL_SERVER_ERROR, &body).is_none());
    }
}

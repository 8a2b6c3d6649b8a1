// src/handlers/invalid_api_key.rs

use super::base::{body_snippet, Outcome, ResponseHandler};
use axum::{body::Bytes, http::StatusCode};

/// Rejected credentials: 401, 403, or a 400 whose body names an invalid key.
pub struct InvalidApiKeyHandler;

impl ResponseHandler for InvalidApiKeyHandler {
    fn handle(&self, status: StatusCode, body: &Bytes) -> Option<Outcome> {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(Outcome::FatalError(format!(
                "credential rejected ({}): {}",
                status.as_u16(),
                body_snippet(body)
            ))),
            StatusCode::BAD_REQUEST => {
                let text = String::from_utf8_lossy(body).to_ascii_lowercase();
                (text.contains("invalid_api_key") || text.contains("invalid api key"))
                    .then(|| Outcome::FatalError("invalid API key".to_string()))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_is_fatal() {
        let body = Bytes::from_static(br#"{"error":{"message":"Invalid API Key"}}"#);
        assert!(matches!(
            InvalidApiKeyHandler.handle(StatusCode::UNAUTHORIZED, &body),
            Some(Outcome::FatalError(_))
        ));
    }

    #[test]
    fn test_bad_request_only_matches_key_errors() {
        let key_error = Bytes::from_static(br#"{"error":{"code":"invalid_api_key"}}"#);
        let other = Bytes::from_static(br#"{"error":{"message":"messages must not be empty"}}"#);
        assert!(InvalidApiKeyHandler.handle(StatusCode::BAD_REQUEST, &key_error).is_some());
        assert!(InvalidApiKeyHandler.handle(StatusCode::BAD_REQUEST, &other).is_none());
    }
}

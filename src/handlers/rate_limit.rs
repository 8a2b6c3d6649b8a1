// src/handlers/rate_limit.rs

use super::base::{Outcome, ResponseHandler};
use axum::{body::Bytes, http::StatusCode};

pub struct RateLimitHandler;

impl ResponseHandler for RateLimitHandler {
    fn handle(&self, status: StatusCode, _body: &Bytes) -> Option<Outcome> {
        (status == StatusCode::TOO_MANY_REQUESTS).then_some(Outcome::RateLimited)
    }
}

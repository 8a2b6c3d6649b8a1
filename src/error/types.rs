//! `From` conversions so `?` works across the crate.

use super::AppError;

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            operation: format!("{:?}", err.kind()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        let line = err.location().map(|loc| loc.line());
        Self::ConfigParse {
            message: format!("Failed to parse config file: {err}"),
            line,
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let status_code = err.status().map(|s| s.as_u16());
        Self::HttpClient {
            message: err.to_string(),
            status_code,
        }
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidRequest {
            message: format!("Invalid URL: {err}"),
        }
    }
}

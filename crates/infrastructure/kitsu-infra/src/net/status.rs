use camino::Utf8PathBuf;
use std::fmt;

use super::rate_limit::RateLimit;

/// HTTP statuses the catalog API is documented to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    Successful,
    InvalidIdGiven,
    Unauthenticated,
    EntryNotFound,
    RateLimitExceeded,
    Other(u16),
}

impl ResponseCode {
    pub fn from_u16(code: u16) -> Self {
        match code {
            200 => ResponseCode::Successful,
            400 => ResponseCode::InvalidIdGiven,
            401 => ResponseCode::Unauthenticated,
            404 => ResponseCode::EntryNotFound,
            429 => ResponseCode::RateLimitExceeded,
            other => ResponseCode::Other(other),
        }
    }

    pub fn code(&self) -> u16 {
        match self {
            ResponseCode::Successful => 200,
            ResponseCode::InvalidIdGiven => 400,
            ResponseCode::Unauthenticated => 401,
            ResponseCode::EntryNotFound => 404,
            ResponseCode::RateLimitExceeded => 429,
            ResponseCode::Other(code) => *code,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ResponseCode::Successful => "successful",
            ResponseCode::InvalidIdGiven => "invalid_id_given",
            ResponseCode::Unauthenticated => "unauthenticated",
            ResponseCode::EntryNotFound => "entry_not_found",
            ResponseCode::RateLimitExceeded => "rate_limit_exceeded",
            ResponseCode::Other(_) => "unexpected_status",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResponseCode::Successful)
    }
}

impl From<reqwest::StatusCode> for ResponseCode {
    fn from(status: reqwest::StatusCode) -> Self {
        ResponseCode::from_u16(status.as_u16())
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name().replace('_', " "))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("got {kind} while trying to download {url}")]
    Connection { url: String, kind: &'static str },
    #[error("got response {} ({}).", .status.code(), .status)]
    BadStatus { url: String, status: ResponseCode },
    #[error("got response {} ({}). Status: {rate_limit}.", .status.code(), .status)]
    RateLimited {
        url: String,
        status: ResponseCode,
        rate_limit: RateLimit,
    },
    #[error("could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
    #[error("failed to write {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    pub(crate) fn connection(url: &str, err: &reqwest::Error) -> Self {
        FetchError::Connection {
            url: url.to_string(),
            kind: error_kind_name(err),
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            FetchError::Connection { url, .. }
            | FetchError::BadStatus { url, .. }
            | FetchError::RateLimited { url, .. }
            | FetchError::Decode { url, .. } => Some(url),
            FetchError::Io { .. } => None,
        }
    }

    pub fn status(&self) -> Option<ResponseCode> {
        match self {
            FetchError::BadStatus { status, .. } | FetchError::RateLimited { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    pub fn rate_limit(&self) -> Option<&RateLimit> {
        match self {
            FetchError::RateLimited { rate_limit, .. } => Some(rate_limit),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, FetchError::RateLimited { .. })
    }
}

fn error_kind_name(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        "TimeoutError"
    } else if err.is_connect() {
        "ConnectError"
    } else if err.is_redirect() {
        "RedirectError"
    } else if err.is_body() {
        "BodyError"
    } else if err.is_decode() {
        "DecodeError"
    } else {
        "RequestError"
    }
}

use thiserror::Error;

/// Failure of a call made by the Lawmatics client wrapper.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The server answered with a non-2xx status.
    #[error("API request failed with status {status}: {body}")]
    Http {
        status: u16,
        status_text: String,
        body: String,
    },
    /// No response was received.
    #[error("Request error: {message}")]
    Transport {
        code: Option<String>,
        message: String,
    },
    #[error("Failed to parse response: {0}")]
    Decode(String),
    #[error("{0}")]
    Io(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ApiError::Decode(err.to_string());
        }
        ApiError::Transport {
            code: transport_code(&err),
            message: err.to_string(),
        }
    }
}

/// Short machine code for a transport failure, when reqwest can classify it.
pub(crate) fn transport_code(err: &reqwest::Error) -> Option<String> {
    let code = if err.is_timeout() {
        "ETIMEDOUT"
    } else if err.is_connect() {
        "ECONNREFUSED"
    } else if err.is_redirect() {
        "ERR_TOO_MANY_REDIRECTS"
    } else if err.is_body() {
        "ERR_BODY"
    } else if err.is_request() {
        "ERR_REQUEST"
    } else {
        return None;
    };
    Some(code.to_string())
}

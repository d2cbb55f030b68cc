use gateway_operator_core::{encoding, portal};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("kubernetes API request failed: {0}")]
    Kube(#[source] kube::Error),

    #[error("{kind} {name} was modified concurrently")]
    Conflict { kind: String, name: String },

    #[error("{kind} {name} not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: String, name: String },

    #[error("request timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("invalid bundle: {0}")]
    Bundle(#[from] portal::Error),

    #[error("invalid payload: {0}")]
    Encoding(#[from] encoding::Error),

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} rejected the request with {status}: {body}")]
    Rejected {
        url: String,
        status: u16,
        body: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{kind} is missing {field}")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("secret {secret} has no {key} entry")]
    MissingKey { secret: String, key: &'static str },

    #[error("state store probe failed: {0}")]
    Probe(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

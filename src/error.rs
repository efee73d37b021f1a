//! Unified setup and infrastructure error type.

use thiserror::Error;

/// The error type returned by handles' fallible setup operations.
///
/// Request-level failures (404, 422, a handler returning `Err`, etc.) are
/// [`ApiError`](crate::ApiError) values and end up in the response body.
/// This type surfaces the failures that stop an application from starting:
/// invalid middleware configuration, binding to a port, accepting a
/// connection.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("transaction_trust `ip` must have a list of ips")]
    MissingTrustIps,

    #[error("transaction_trust_ips contains an invalid ip `{0}`")]
    InvalidTrustIp(String),

    #[error("transaction_trust must be true, false or \"ip\", got `{0}`")]
    InvalidTrustMode(String),

    #[error("invalid socket address `{0}`")]
    InvalidAddr(String),
}

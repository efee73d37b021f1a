//! Request tracking: correlation ids and response timing.
//!
//! Every response gets an `x-request-id` (fresh per request) and an
//! `x-transaction-id` (shared by every request of one client transaction).
//! Whether a client may choose its own transaction id is decided by the
//! [`TransactionTrust`] policy:
//!
//! | Policy | Inbound `x-transaction-id` |
//! |---|---|
//! | `false` (default) | ignored, transaction id = request id |
//! | `true` | used verbatim |
//! | `"ip"` | used only from peers listed in `transaction_trust_ips` |
//!
//! Only the socket peer address counts for `"ip"`; forwarding headers are
//! client-controlled and never consulted.

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Instant;

use serde::Deserialize;
use tracing::debug;

use crate::api_error::ApiError;
use crate::context::Context;
use crate::error::Error;
use crate::id;
use crate::request::Request;

use super::{BoxFuture, Middleware, Next};

pub const REQUEST_ID: &str = "x-request-id";
pub const TRANSACTION_ID: &str = "x-transaction-id";
pub const RESPONSE_TIME: &str = "x-response-time";
pub const POWERED_BY: &str = "x-powered-by";

const DEFAULT_POWERED_BY: &str = "handles";

// ── Configuration ─────────────────────────────────────────────────────────────

/// Whether an inbound `x-transaction-id` is trusted.
///
/// Deserialises from `false`, `true` or `"ip"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "TrustSetting")]
pub enum TransactionTrust {
    #[default]
    Never,
    Always,
    Ip,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TrustSetting {
    Flag(bool),
    Mode(String),
}

impl TryFrom<TrustSetting> for TransactionTrust {
    type Error = Error;

    fn try_from(setting: TrustSetting) -> Result<Self, Self::Error> {
        match setting {
            TrustSetting::Flag(false) => Ok(Self::Never),
            TrustSetting::Flag(true) => Ok(Self::Always),
            TrustSetting::Mode(mode) if mode == "ip" => Ok(Self::Ip),
            TrustSetting::Mode(mode) => Err(Error::InvalidTrustMode(mode)),
        }
    }
}

/// Setup options of a [`Tracker`].
///
/// ```rust
/// use handles::middleware::{Tracker, TrackingConfig};
///
/// let config: TrackingConfig = serde_json::from_str(r#"{
///     "transaction_trust": "ip",
///     "transaction_trust_ips": ["127.0.0.1", "::1"]
/// }"#).unwrap();
/// let tracker = Tracker::new(config).unwrap();
/// ```
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub transaction_trust: TransactionTrust,
    /// Peers allowed to set their own transaction id when trust is `"ip"`.
    pub transaction_trust_ips: Option<Vec<String>>,
    /// Value of the `x-powered-by` header.
    pub powered_by: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            transaction_trust: TransactionTrust::Never,
            transaction_trust_ips: None,
            powered_by: DEFAULT_POWERED_BY.to_owned(),
        }
    }
}

// ── Tracker ───────────────────────────────────────────────────────────────────

/// Validated trust policy. IP sets hold canonical addresses so
/// `::ffff:127.0.0.1` and `127.0.0.1` compare equal.
#[derive(Clone, Debug)]
enum Trust {
    Never,
    Always,
    Ips(HashSet<IpAddr>),
}

/// Assigns request and transaction ids before the rest of the chain runs and
/// records the elapsed time after.
#[derive(Clone, Debug)]
pub struct Tracker {
    trust: Trust,
    powered_by: String,
}

impl Tracker {
    /// Validates `config`.
    ///
    /// # Errors
    ///
    /// [`Error::MissingTrustIps`] if trust is `"ip"` without a non-empty
    /// list, [`Error::InvalidTrustIp`] if an entry does not parse.
    pub fn new(config: TrackingConfig) -> Result<Self, Error> {
        let trust = match config.transaction_trust {
            TransactionTrust::Never => Trust::Never,
            TransactionTrust::Always => Trust::Always,
            TransactionTrust::Ip => {
                let ips = config
                    .transaction_trust_ips
                    .filter(|ips| !ips.is_empty())
                    .ok_or(Error::MissingTrustIps)?;
                let parsed = ips
                    .iter()
                    .map(|raw| {
                        raw.trim()
                            .parse::<IpAddr>()
                            .map(|ip| ip.to_canonical())
                            .map_err(|_| Error::InvalidTrustIp(raw.clone()))
                    })
                    .collect::<Result<HashSet<_>, _>>()?;
                Trust::Ips(parsed)
            }
        };
        Ok(Self { trust, powered_by: config.powered_by })
    }

    /// Picks the transaction id for `request` given its fresh `request_id`.
    fn transaction_id(&self, request: &Request, request_id: &str) -> String {
        let inbound = match request.header(TRANSACTION_ID) {
            Some(value) if !value.is_empty() => value,
            _ => return request_id.to_owned(),
        };

        let trusted = match &self.trust {
            Trust::Never => false,
            Trust::Always => true,
            Trust::Ips(ips) => request
                .ip()
                .is_some_and(|ip| ips.contains(&ip.to_canonical())),
        };

        if trusted {
            debug!(transaction_id = inbound, "trusted inbound transaction id");
            inbound.to_owned()
        } else {
            debug!(transaction_id = inbound, ip = ?request.ip(), "inbound transaction id ignored");
            request_id.to_owned()
        }
    }
}

impl Default for Tracker {
    /// No transaction trust, `x-powered-by: handles`.
    fn default() -> Self {
        Self { trust: Trust::Never, powered_by: DEFAULT_POWERED_BY.to_owned() }
    }
}

impl Middleware for Tracker {
    fn handle<'a>(
        &'a self,
        ctx: &'a mut Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<(), ApiError>> {
        Box::pin(async move {
            let start = Instant::now();
            let request_id = id::request_id();
            let transaction_id = self.transaction_id(ctx.request(), &request_id);

            ctx.set(REQUEST_ID, &request_id);
            ctx.set(TRANSACTION_ID, &transaction_id);
            ctx.set(POWERED_BY, &self.powered_by);

            debug!(
                request_id = %request_id,
                transaction_id = %transaction_id,
                ip = ?ctx.request().ip(),
                method = %ctx.request().method(),
                url = %ctx.request().url(),
                "tracking request"
            );

            let state = ctx.state_mut();
            state.request_time_start = Some(start);
            state.request_id = Some(request_id);
            state.transaction_id = Some(transaction_id);

            let result = next.run(ctx).await;

            let total = start.elapsed();
            ctx.state_mut().request_time_total = Some(total);
            ctx.set(RESPONSE_TIME, &format!("{}ms", total.as_millis()));

            debug!(
                request_id = ctx.state().request_id.as_deref().unwrap_or("-"),
                elapsed_ms = total.as_millis() as u64,
                ok = result.is_ok(),
                "tracking response"
            );
            result
        })
    }
}

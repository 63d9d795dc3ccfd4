use actix_web::HttpRequest;
use availability_snapshot::SnapshotError;
use serde::Deserialize;
use subtle::ConstantTimeEq;

/// Header carrying the trigger secret
pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Shared secret that scheduler and admin callers must present
#[derive(Clone)]
pub struct CronSecret(String);

impl CronSecret {
    /// Wraps the configured secret
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Accepts the request when either the `x-cron-secret` header or the
    /// `secret` query value matches. Neither form takes precedence.
    pub fn authorize(&self, req: &HttpRequest, query: &TriggerQuery) -> Result<(), SnapshotError> {
        let header = req
            .headers()
            .get(CRON_SECRET_HEADER)
            .and_then(|value| value.to_str().ok());
        let presented = [header, query.secret.as_deref()];

        if presented.iter().flatten().any(|candidate| self.matches(candidate)) {
            return Ok(());
        }

        if presented.iter().all(Option::is_none) {
            log::warn!("🚫 Snapshot trigger rejected: no secret presented");
        } else {
            log::warn!("🚫 Snapshot trigger rejected: wrong secret");
        }
        Err(SnapshotError::Unauthorized)
    }

    fn matches(&self, candidate: &str) -> bool {
        !self.0.is_empty() && bool::from(self.0.as_bytes().ct_eq(candidate.as_bytes()))
    }
}

/// Query string accepted by trigger endpoints
#[derive(Debug, Default, Deserialize)]
pub struct TriggerQuery {
    /// Secret for callers that cannot set headers (e.g. a cron URL)
    pub secret: Option<String>,
}

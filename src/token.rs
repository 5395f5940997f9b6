// Stored OAuth credentials and the renewal policy.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Renew once the token has less than this much life left.
pub const RENEWAL_MARGIN_MINUTES: i64 = 30;

/// Token triple persisted alongside the rest of the config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: String,
    pub expiry: DateTime<Utc>,
}

/// Token endpoint response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenGrant {
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl Credentials {
    pub fn should_renew(&self) -> bool {
        self.should_renew_at(Utc::now())
    }

    /// True when `now - expiry` is at or above minus thirty minutes, i.e. the
    /// token expires within the margin or has already expired.
    pub fn should_renew_at(&self, now: DateTime<Utc>) -> bool {
        now - self.expiry >= -Duration::minutes(RENEWAL_MARGIN_MINUTES)
    }

    /// Replace the triple with a fresh grant received at `now`.
    pub fn apply(&mut self, grant: &TokenGrant, now: DateTime<Utc>) {
        self.access_token = grant.access_token.clone();
        self.refresh_token = grant.refresh_token.clone();
        self.expiry = now + Duration::seconds(grant.expires_in);
    }

    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }
}

//! Status-to-expiration policy.
//!
//! A [`PolicyTable`] maps status values to a [`PolicyRule`]; [`PolicyTable::resolve`]
//! turns a status and a point in time into an [`ExpirationOutcome`]. Statuses with
//! no entry resolve to [`ExpirationOutcome::Noop`], which leaves any existing deadline
//! untouched. That is different from [`ExpirationOutcome::Clear`].

use crate::core::{ExpiryError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STATUS_ACTIVE: &str = "Active";
pub const STATUS_TEMPORARY: &str = "Temporary";
pub const STATUS_INACTIVE: &str = "Inactive";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;
/// Upper bound accepted for a relative expiration (100 years).
pub const MAX_EXPIRE_AFTER_SECS: u64 = 100 * 365 * SECONDS_PER_DAY;

/// Deadline computation rule for one status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    /// Expire this many seconds after the status change is observed.
    ExpireAfterSecs(u64),
    /// Remove any deadline; the record becomes permanent.
    Clear,
}

impl PolicyRule {
    pub fn expire_after_days(days: u64) -> Self {
        Self::ExpireAfterSecs(days.saturating_mul(SECONDS_PER_DAY))
    }
}

/// Result of applying the policy to a status at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationOutcome {
    Set(DateTime<Utc>),
    Clear,
    Noop,
}

/// Mapping from status value to rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyTable {
    rules: BTreeMap<String, PolicyRule>,
}

impl PolicyTable {
    /// A table with no rules; every status resolves to `Noop`.
    pub fn empty() -> Self {
        Self {
            rules: BTreeMap::new(),
        }
    }

    pub fn with_rule(mut self, status: impl Into<String>, rule: PolicyRule) -> Self {
        self.rules.insert(status.into(), rule);
        self
    }

    pub fn insert(&mut self, status: impl Into<String>, rule: PolicyRule) -> Option<PolicyRule> {
        self.rules.insert(status.into(), rule)
    }

    pub fn remove(&mut self, status: &str) -> Option<PolicyRule> {
        self.rules.remove(status)
    }

    pub fn rule_for(&self, status: &str) -> Option<PolicyRule> {
        self.rules.get(status).copied()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, PolicyRule)> {
        self.rules.iter().map(|(status, rule)| (status.as_str(), *rule))
    }

    /// Computes the expiration outcome for `status` at `now`.
    ///
    /// Pure: no clock reads, no store access. A deadline that would overflow the
    /// representable range resolves to `Noop`.
    pub fn resolve(&self, status: &str, now: DateTime<Utc>) -> ExpirationOutcome {
        match self.rule_for(status) {
            None => ExpirationOutcome::Noop,
            Some(PolicyRule::Clear) => ExpirationOutcome::Clear,
            Some(PolicyRule::ExpireAfterSecs(secs)) => i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|delta| now.checked_add_signed(delta))
                .map(ExpirationOutcome::Set)
                .unwrap_or(ExpirationOutcome::Noop),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (status, rule) in self.iter() {
            if status.is_empty() {
                return Err(ExpiryError::InvalidConfig(
                    "policy status values cannot be empty".to_string(),
                ));
            }
            if let PolicyRule::ExpireAfterSecs(secs) = rule {
                if secs > MAX_EXPIRE_AFTER_SECS {
                    return Err(ExpiryError::InvalidConfig(format!(
                        "expire_after_secs for '{}' exceeds {} seconds",
                        status, MAX_EXPIRE_AFTER_SECS
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Default for PolicyTable {
    /// `Temporary` expires after 10 days, `Inactive` after 7, `Active` clears.
    fn default() -> Self {
        Self::empty()
            .with_rule(STATUS_TEMPORARY, PolicyRule::expire_after_days(10))
            .with_rule(STATUS_INACTIVE, PolicyRule::expire_after_days(7))
            .with_rule(STATUS_ACTIVE, PolicyRule::Clear)
    }
}

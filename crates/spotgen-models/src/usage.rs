//! Per-user monthly usage and quota records.

use chrono::{DateTime, Datelike, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription tier determining the monthly video quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    #[default]
    Free,
    Pro,
    Studio,
}

impl PlanTier {
    /// Videos a user on this plan may generate per month.
    pub fn monthly_quota(&self) -> u32 {
        match self {
            PlanTier::Free => 5,
            PlanTier::Pro => 50,
            PlanTier::Studio => 200,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanTier::Free => "free",
            PlanTier::Pro => "pro",
            PlanTier::Studio => "studio",
        }
    }
}

impl fmt::Display for PlanTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(PlanTier::Free),
            "pro" => Ok(PlanTier::Pro),
            "studio" => Ok(PlanTier::Studio),
            other => Err(format!("unknown plan tier: {other}")),
        }
    }
}

/// Current usage period key in "YYYY-MM" format.
pub fn current_period() -> String {
    let now = Utc::now();
    format!("{:04}-{:02}", now.year(), now.month())
}

/// Usage document id for a user and period.
pub fn usage_doc_id(user_id: &str, period: &str) -> String {
    format!("{user_id}_{period}")
}

/// Monthly usage counter, keyed by `{user_id, period}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Usage {
    pub user_id: String,
    /// "YYYY-MM"
    pub period: String,
    pub monthly_quota: u32,
    pub quota_remaining: u32,
    /// Submissions accepted this period (successful quota decrements)
    pub request_count: u32,
    /// Videos that reached `completed`
    pub videos_generated: u32,
    /// Total seconds of completed video this period
    pub total_duration_secs: u32,
    pub last_updated: DateTime<Utc>,
}

impl Usage {
    /// Fresh usage record for a user entering a new period.
    pub fn new(user_id: impl Into<String>, period: impl Into<String>, plan: PlanTier) -> Self {
        let quota = plan.monthly_quota();
        Self {
            user_id: user_id.into(),
            period: period.into(),
            monthly_quota: quota,
            quota_remaining: quota,
            request_count: 0,
            videos_generated: 0,
            total_duration_secs: 0,
            last_updated: Utc::now(),
        }
    }

    pub fn doc_id(&self) -> String {
        usage_doc_id(&self.user_id, &self.period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_key_format() {
        let key = current_period();
        assert_eq!(key.len(), 7);
        let (year, month) = key.split_once('-').unwrap();
        let year: i32 = year.parse().unwrap();
        let month: u32 = month.parse().unwrap();
        assert!((2020..=2100).contains(&year));
        assert!((1..=12).contains(&month));
    }

    #[test]
    fn test_new_usage_starts_full() {
        let usage = Usage::new("user-1", "2026-08", PlanTier::Free);
        assert_eq!(usage.monthly_quota, 5);
        assert_eq!(usage.quota_remaining, 5);
        assert_eq!(usage.request_count, 0);
        assert_eq!(usage.doc_id(), "user-1_2026-08");
    }

    #[test]
    fn test_plan_quotas_ordered() {
        assert!(PlanTier::Free.monthly_quota() < PlanTier::Pro.monthly_quota());
        assert!(PlanTier::Pro.monthly_quota() < PlanTier::Studio.monthly_quota());
    }
}

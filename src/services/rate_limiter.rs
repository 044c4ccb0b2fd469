//! Login rate limiter
//!
//! Two sliding windows kept in memory:
//! - failed attempts per account (email + school), 5 per 15 minutes
//! - login requests per client IP, 10 per minute

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::net::IpAddr;
use tokio::sync::RwLock;

const ACCOUNT_LIMIT: usize = 5;
const ACCOUNT_WINDOW_MINUTES: i64 = 15;
const IP_LIMIT: usize = 10;
const IP_WINDOW_MINUTES: i64 = 1;

pub struct LoginRateLimiter {
    account_failures: RwLock<HashMap<String, Vec<DateTime<Utc>>>>,
    ip_requests: RwLock<HashMap<IpAddr, Vec<DateTime<Utc>>>>,
}

/// Limiter key of an account; super-admins have no school
fn account_key(email: &str, school_code: Option<&str>) -> String {
    format!(
        "{}|{}",
        school_code.map(|c| c.trim().to_lowercase()).unwrap_or_default(),
        email.trim().to_lowercase()
    )
}

impl LoginRateLimiter {
    pub fn new() -> Self {
        Self {
            account_failures: RwLock::new(HashMap::new()),
            ip_requests: RwLock::new(HashMap::new()),
        }
    }

    pub async fn is_account_limited(&self, email: &str, school_code: Option<&str>) -> bool {
        let cutoff = Utc::now() - Duration::minutes(ACCOUNT_WINDOW_MINUTES);
        let mut failures = self.account_failures.write().await;
        let entry = failures.entry(account_key(email, school_code)).or_default();
        entry.retain(|t| *t > cutoff);
        entry.len() >= ACCOUNT_LIMIT
    }

    pub async fn record_failure(&self, email: &str, school_code: Option<&str>) {
        let mut failures = self.account_failures.write().await;
        failures
            .entry(account_key(email, school_code))
            .or_default()
            .push(Utc::now());
    }

    /// Forget failures after a successful login
    pub async fn clear_account(&self, email: &str, school_code: Option<&str>) {
        self.account_failures
            .write()
            .await
            .remove(&account_key(email, school_code));
    }

    pub async fn is_ip_limited(&self, ip: IpAddr) -> bool {
        let cutoff = Utc::now() - Duration::minutes(IP_WINDOW_MINUTES);
        let mut requests = self.ip_requests.write().await;
        let entry = requests.entry(ip).or_default();
        entry.retain(|t| *t > cutoff);
        entry.len() >= IP_LIMIT
    }

    pub async fn record_ip_request(&self, ip: IpAddr) {
        self.ip_requests.write().await.entry(ip).or_default().push(Utc::now());
    }

    /// Drop expired entries; run periodically
    pub async fn cleanup(&self) {
        let now = Utc::now();
        let account_cutoff = now - Duration::minutes(ACCOUNT_WINDOW_MINUTES);
        let ip_cutoff = now - Duration::minutes(IP_WINDOW_MINUTES);

        self.account_failures.write().await.retain(|_, times| {
            times.retain(|t| *t > account_cutoff);
            !times.is_empty()
        });
        self.ip_requests.write().await.retain(|_, times| {
            times.retain(|t| *t > ip_cutoff);
            !times.is_empty()
        });
    }
}

impl Default for LoginRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_account_limit_is_per_school() {
        let limiter = LoginRateLimiter::new();
        for _ in 0..ACCOUNT_LIMIT {
            assert!(!limiter.is_account_limited("bursar@school.test", Some("greenfield")).await);
            limiter.record_failure("Bursar@School.test", Some("GreenField")).await;
        }
        assert!(limiter.is_account_limited("bursar@school.test", Some("greenfield")).await);
        assert!(!limiter.is_account_limited("bursar@school.test", Some("hillside")).await);
        assert!(!limiter.is_account_limited("bursar@school.test", None).await);

        limiter.clear_account("bursar@school.test", Some("greenfield")).await;
        assert!(!limiter.is_account_limited("bursar@school.test", Some("greenfield")).await);
    }

    #[tokio::test]
    async fn test_ip_limit() {
        let limiter = LoginRateLimiter::new();
        let ip: IpAddr = "10.0.0.7".parse().unwrap();
        for _ in 0..IP_LIMIT {
            assert!(!limiter.is_ip_limited(ip).await);
            limiter.record_ip_request(ip).await;
        }
        assert!(limiter.is_ip_limited(ip).await);
        assert!(!limiter.is_ip_limited("10.0.0.8".parse().unwrap()).await);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_entries() {
        let limiter = LoginRateLimiter::new();
        limiter.record_failure("a@b.test", None).await;
        limiter.cleanup().await;
        assert_eq!(limiter.account_failures.read().await.len(), 1);
    }
}

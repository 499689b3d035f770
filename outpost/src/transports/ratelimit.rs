use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use httpdate::parse_http_date;

use crate::protocol::DataCategory;
use crate::Envelope;

use super::DeliveryResponse;

/// Cooldown applied to a bare `429` response without any rate limit header.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);
/// Upper bound for a cooldown announced by the server.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// The time `seconds` from now, rounded up and capped at [`MAX_RETRY_AFTER`].
fn after_seconds(seconds: f64) -> SystemTime {
    let seconds = seconds.max(0.0).ceil().min(MAX_RETRY_AFTER.as_secs_f64());
    SystemTime::now() + Duration::from_secs(seconds as u64)
}

/// A Utility that helps with rate limiting requests to the ingestion endpoint.
///
/// Limits are kept per [`DataCategory`], plus a global limit covering every
/// category.
#[derive(Debug, Default)]
pub struct RateLimiter {
    global: Option<SystemTime>,
    categories: HashMap<DataCategory, SystemTime>,
}

impl RateLimiter {
    /// Create a new RateLimiter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Updates the RateLimiter from a delivery response.
    ///
    /// `X-Sentry-Rate-Limits` takes precedence over `Retry-After`, which
    /// takes precedence over a bare `429` status.
    pub fn update_from_response(&mut self, response: &DeliveryResponse) {
        if let Some(ref header) = response.rate_limits {
            self.update_from_sentry_header(header);
        } else if let Some(ref header) = response.retry_after {
            self.update_from_retry_after(header);
        } else if response.status == 429 {
            self.update_from_429();
        }
    }

    /// Updates the RateLimiter with information from a `Retry-After` header.
    pub fn update_from_retry_after(&mut self, header: &str) {
        let header = header.trim();
        let new_time = if let Ok(value) = header.parse::<f64>() {
            Some(after_seconds(value))
        } else {
            parse_http_date(header).ok()
        };

        if new_time.is_some() {
            self.global = new_time;
        }
    }

    /// Updates the RateLimiter with information from a `X-Sentry-Rate-Limits` header.
    pub fn update_from_sentry_header(&mut self, header: &str) {
        // <rate-limit> = (<group>,)+
        // <group> = <time>:(<category>;)+:<scope>(:<reason>)?

        let mut parse_group = |group: &str| {
            let mut splits = group.split(':');
            let seconds = splits.next()?.trim().parse::<f64>().ok()?;
            let categories = splits.next()?;
            let _scope = splits.next()?;

            let new_time = after_seconds(seconds);

            if categories.is_empty() {
                self.global = Some(new_time);
            }

            for category in categories.split(';') {
                // unknown categories belong to other SDK features
                if let Ok(category) = category.parse::<DataCategory>() {
                    self.categories.insert(category, new_time);
                }
            }
            Some(())
        };

        for group in header.split(',') {
            parse_group(group.trim());
        }
    }

    /// Updates the RateLimiter for a `429` response without headers.
    pub fn update_from_429(&mut self) {
        self.global = Some(SystemTime::now() + DEFAULT_RETRY_AFTER);
    }

    /// Query the RateLimiter for a certain category of item.
    ///
    /// Returns the time left until the category may be sent again.
    pub fn is_disabled(&self, category: DataCategory) -> Option<Duration> {
        if let Some(time_left) = self.global.and_then(time_left) {
            return Some(time_left);
        }
        let until = match category {
            DataCategory::Default => None,
            _ => self.categories.get(&category).copied(),
        };
        until
            .or_else(|| self.categories.get(&DataCategory::Default).copied())
            .and_then(time_left)
    }

    /// Removes all items from the envelope that are currently rate limited.
    ///
    /// [`None`] is returned if no items remain.
    pub fn filter_envelope(&self, envelope: Envelope) -> Option<Envelope> {
        envelope.filter(|item| self.is_disabled(item.category()).is_none())
    }
}

fn time_left(until: SystemTime) -> Option<Duration> {
    until
        .duration_since(SystemTime::now())
        .ok()
        .filter(|left| !left.is_zero())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::protocol::{Event, Log, LogLevel};

    #[test]
    fn test_sentry_header() {
        let mut rl = RateLimiter::new();
        rl.update_from_sentry_header("120:error:project:reason, 60:transaction:foo");

        assert!(rl.is_disabled(DataCategory::Error).unwrap() <= Duration::from_secs(120));
        assert!(rl.is_disabled(DataCategory::Transaction).unwrap() <= Duration::from_secs(60));
        assert!(rl.is_disabled(DataCategory::LogItem).is_none());
        assert!(rl.is_disabled(DataCategory::Default).is_none());

        rl.update_from_sentry_header(
            r#"
                30::bar,
                120:invalid:invalid,
                4711:foo;bar;baz;log_item:project
            "#,
        );

        assert!(rl.is_disabled(DataCategory::Monitor).unwrap() <= Duration::from_secs(30));
        assert!(rl.is_disabled(DataCategory::Default).unwrap() <= Duration::from_secs(30));
    }

    #[rstest]
    #[case::error(DataCategory::Error)]
    #[case::monitor(DataCategory::Monitor)]
    #[case::transaction(DataCategory::Transaction)]
    #[case::log_item(DataCategory::LogItem)]
    #[case::default(DataCategory::Default)]
    fn test_retry_after_is_global(#[case] category: DataCategory) {
        let mut rl = RateLimiter::new();
        rl.update_from_retry_after("60");
        assert!(rl.is_disabled(category).unwrap() <= Duration::from_secs(60));
    }

    #[rstest]
    #[case("0")]
    #[case("-5")]
    fn test_retry_after_elapsed(#[case] header: &str) {
        let mut rl = RateLimiter::new();
        rl.update_from_retry_after(header);
        assert!(rl.is_disabled(DataCategory::Error).is_none());
    }

    #[rstest]
    #[case("1e300")]
    #[case("inf")]
    fn test_huge_cooldowns_are_capped(#[case] seconds: &str) {
        let mut rl = RateLimiter::new();
        rl.update_from_retry_after(seconds);
        assert!(rl.is_disabled(DataCategory::Error).unwrap() <= MAX_RETRY_AFTER);

        let mut rl = RateLimiter::new();
        rl.update_from_sentry_header(&format!("{seconds}:transaction:project"));
        assert!(rl.is_disabled(DataCategory::Transaction).unwrap() <= MAX_RETRY_AFTER);
    }

    #[test]
    fn test_retry_after_http_date() {
        let mut rl = RateLimiter::new();
        let later = SystemTime::now() + Duration::from_secs(3600);
        rl.update_from_retry_after(&httpdate::fmt_http_date(later));
        assert!(rl.is_disabled(DataCategory::Error).is_some());

        let mut rl = RateLimiter::new();
        rl.update_from_retry_after("not a date");
        assert!(rl.is_disabled(DataCategory::Error).is_none());
    }

    #[test]
    fn test_bare_429() {
        let mut rl = RateLimiter::new();
        rl.update_from_response(&DeliveryResponse {
            status: 429,
            retry_after: None,
            rate_limits: None,
        });
        let left = rl.is_disabled(DataCategory::Error).unwrap();
        assert!(left <= DEFAULT_RETRY_AFTER && left > Duration::from_secs(50));
    }

    #[test]
    fn test_sentry_header_wins_over_retry_after() {
        let mut rl = RateLimiter::new();
        rl.update_from_response(&DeliveryResponse {
            status: 429,
            retry_after: Some("600".into()),
            rate_limits: Some("60:error:organization".into()),
        });
        assert!(rl.is_disabled(DataCategory::Error).is_some());
        assert!(rl.is_disabled(DataCategory::Transaction).is_none());
    }

    #[test]
    fn test_filter_envelope() {
        let mut rl = RateLimiter::new();
        rl.update_from_sentry_header("60:error:organization");

        let mut envelope = Envelope::new();
        envelope.add_item(Event::default());
        envelope.add_item(vec![Log::new(LogLevel::Info, "kept")]);
        let filtered = rl.filter_envelope(envelope).unwrap();
        assert_eq!(filtered.items().count(), 1);
        assert!(filtered.event().is_none());

        let mut envelope = Envelope::new();
        envelope.add_item(Event::default());
        assert!(rl.filter_envelope(envelope).is_none());
    }
}

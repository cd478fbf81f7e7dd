use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A value together with the moment it entered the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedData<T> {
    pub data: T,
    pub cached_at: DateTime<Utc>,
}

impl<T> CachedData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }

    /// Time since the entry was stored; clock skew counts as zero.
    pub fn age(&self) -> Duration {
        age_since(self.cached_at)
    }

    pub fn age_display(&self) -> String {
        age_display_since(self.cached_at)
    }
}

pub fn age_since(cached_at: DateTime<Utc>) -> Duration {
    (Utc::now() - cached_at).max(Duration::zero())
}

pub fn age_display_since(cached_at: DateTime<Utc>) -> String {
    format_age(age_since(cached_at).num_minutes())
}

/// Compact relative age: "just now", "12m ago", "3h ago", "2d ago".
/// Hours and days round to nearest.
fn format_age(minutes: i64) -> String {
    const HOUR: i64 = 60;
    const DAY: i64 = 24 * HOUR;

    match minutes {
        m if m < 1 => "just now".to_string(),
        m if m < HOUR => format!("{}m ago", m),
        m if m < DAY => format!("{}h ago", (m + HOUR / 2) / HOUR),
        m => format!("{}d ago", (m + DAY / 2) / DAY),
    }
}

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
/// Bookings never reach further than today + 29.
pub const MAX_HORIZON_DAYS: u32 = 30;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub request_timeout_secs: u64,
    pub scheduling: SchedulingConfig,
}

/// Booking horizon shown by the date step of the scheduling wizard.
///
/// `BOOKING_HORIZON_DAYS` may shorten the horizon but never lengthen it past
/// `MAX_HORIZON_DAYS`; see `clamped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulingConfig {
    pub horizon_days: u32,
    pub page_days: u32,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            horizon_days: 30,
            page_days: 7,
        }
    }
}

impl SchedulingConfig {
    /// Horizon limited to `1..=MAX_HORIZON_DAYS`, page size at least one day.
    pub fn clamped(self) -> Self {
        Self {
            horizon_days: self.horizon_days.clamp(1, MAX_HORIZON_DAYS),
            page_days: self.page_days.max(1),
        }
    }
}

impl AppConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let defaults = SchedulingConfig::default();

        let mut config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            request_timeout_secs: parse_or_default("PORTAL_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS),
            scheduling: SchedulingConfig {
                horizon_days: parse_or_default("BOOKING_HORIZON_DAYS", defaults.horizon_days),
                page_days: parse_or_default("BOOKING_PAGE_DAYS", defaults.page_days),
            },
        };

        if config.scheduling.horizon_days > MAX_HORIZON_DAYS {
            warn!(
                "BOOKING_HORIZON_DAYS={} exceeds the {}-day limit, capping it",
                config.scheduling.horizon_days, MAX_HORIZON_DAYS
            );
        }
        config.scheduling = config.scheduling.clamped();

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    /// Config pointing at an explicit backend, with default scheduling settings.
    pub fn for_backend(supabase_url: impl Into<String>, supabase_anon_key: impl Into<String>) -> Self {
        Self {
            supabase_url: supabase_url.into(),
            supabase_anon_key: supabase_anon_key.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            scheduling: SchedulingConfig::default(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_or_default<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + PartialOrd + Default + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) if value > T::default() => value,
            _ => {
                warn!("{} has invalid value '{}', using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

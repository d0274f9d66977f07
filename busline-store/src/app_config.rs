use busline_core::MAX_HOLD_TTL_SECONDS;
use chrono::Duration;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: Option<RedisConfig>,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
    #[serde(default)]
    pub booking_rules: BookingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BookingRules {
    /// How long a pending booking waits for payment.
    #[serde(default = "default_hold_window")]
    pub hold_window_seconds: u64,
    /// TTL of a seat hold taken during seat selection.
    #[serde(default = "default_seat_hold")]
    pub seat_hold_seconds: u64,
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_seconds: u64,
    #[serde(default = "default_workers")]
    pub notification_workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub notification_queue_capacity: usize,
}

fn default_hold_window() -> u64 { 1800 }
fn default_seat_hold() -> u64 { 600 }
fn default_reaper_interval() -> u64 { 300 }
fn default_workers() -> usize { 4 }
fn default_queue_capacity() -> usize { 256 }

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            hold_window_seconds: default_hold_window(),
            seat_hold_seconds: default_seat_hold(),
            reaper_interval_seconds: default_reaper_interval(),
            notification_workers: default_workers(),
            notification_queue_capacity: default_queue_capacity(),
        }
    }
}

impl BookingRules {
    /// Clamped to at most one day.
    pub fn hold_window(&self) -> Duration {
        clamped_seconds(self.hold_window_seconds)
    }

    /// Clamped to the longest hold the reservation store accepts.
    pub fn seat_hold_ttl(&self) -> Duration {
        clamped_seconds(self.seat_hold_seconds)
    }

    pub fn reaper_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.reaper_interval_seconds.clamp(1, MAX_HOLD_TTL_SECONDS as u64))
    }
}

fn clamped_seconds(seconds: u64) -> Duration {
    Duration::seconds(seconds.min(MAX_HOLD_TTL_SECONDS as u64) as i64)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 10 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_rate_limit")]
    pub requests_per_minute: i64,
}

fn default_rate_limit() -> i64 { 120 }

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `BUSLINE_BOOKING_RULES__HOLD_WINDOW_SECONDS=120`
            .add_source(config::Environment::with_prefix("BUSLINE").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_rules_defaults() {
        let rules = BookingRules::default();
        assert_eq!(rules.hold_window(), Duration::minutes(30));
        assert_eq!(rules.seat_hold_ttl(), Duration::minutes(10));
        assert_eq!(rules.reaper_interval(), std::time::Duration::from_secs(300));
    }

    #[test]
    fn test_oversized_rules_are_clamped() {
        let rules = BookingRules {
            hold_window_seconds: u64::MAX,
            seat_hold_seconds: 10_000_000_000_000_000,
            ..BookingRules::default()
        };
        assert_eq!(rules.hold_window(), Duration::hours(24));
        assert_eq!(rules.seat_hold_ttl(), Duration::hours(24));

        let rules = BookingRules {
            reaper_interval_seconds: 0,
            ..BookingRules::default()
        };
        assert_eq!(rules.reaper_interval(), std::time::Duration::from_secs(1));
    }

    #[test]
    fn test_partial_rules_fill_defaults() {
        let parsed: BookingRules = config::Config::builder()
            .set_override("hold_window_seconds", 120_i64)
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(parsed.hold_window(), Duration::minutes(2));
        assert_eq!(parsed.notification_workers, 4);
    }
}

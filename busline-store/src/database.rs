use busline_core::{CoreError, CoreResult};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;

use crate::app_config::{BookingRules, DatabaseConfig};

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Overlay rule overrides stored in `business_rules` on top of file config.
    pub async fn fetch_booking_rules(&self, defaults: BookingRules) -> Result<BookingRules, sqlx::Error> {
        #[derive(sqlx::FromRow)]
        struct RuleRow {
            rule_key: String,
            rule_value: Value,
        }

        let rows = sqlx::query_as::<_, RuleRow>("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;

        for row in rows {
            // Expected format: {"value": <number>}
            let Some(v) = row.rule_value.get("value").and_then(Value::as_u64) else {
                continue;
            };
            match row.rule_key.as_str() {
                "hold_window_seconds" => rules.hold_window_seconds = v,
                "seat_hold_seconds" => rules.seat_hold_seconds = v,
                "reaper_interval_seconds" => rules.reaper_interval_seconds = v,
                _ => {}
            }
        }

        Ok(rules)
    }
}

/// Translate driver errors into the shared taxonomy.
pub(crate) fn db_err(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &err {
        // unique_violation, exclusion_violation
        if matches!(db.code().as_deref(), Some("23505") | Some("23P01")) {
            return CoreError::Conflict(db.message().to_string());
        }
    }
    match err {
        sqlx::Error::RowNotFound => CoreError::not_found("row", "query"),
        other => CoreError::Transient(other.to_string()),
    }
}

pub(crate) trait DbResultExt<T> {
    fn db(self) -> CoreResult<T>;
}

impl<T> DbResultExt<T> for Result<T, sqlx::Error> {
    fn db(self) -> CoreResult<T> {
        self.map_err(db_err)
    }
}

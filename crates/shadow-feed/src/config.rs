use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Local, Offset};
use serde::Deserialize;

/// Backoff for re-opening the realtime subscription.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Consecutive failed attempts before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            max_attempts: 6,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(
            self.initial_delay_ms
                .saturating_mul(factor)
                .min(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Messages per initial/older page.
    pub page_size: usize,
    /// Upper bound on messages pulled by one catch-up fetch.
    pub catch_up_limit: usize,
    /// Height assumed for rows that haven't been measured.
    pub default_row_height_px: f64,
    /// Extra rows rendered above and below the visible window.
    pub overscan_rows: usize,
    /// A live append re-pins to the bottom only within this distance of it.
    pub bottom_proximity_px: f64,
    /// Older pages are requested once the offset is within this distance
    /// of the top.
    pub near_top_threshold_px: f64,
    /// Zone for day dividers; the machine's local offset when unset.
    pub utc_offset_minutes: Option<i32>,
    pub reconnect: ReconnectPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            catch_up_limit: 200,
            default_row_height_px: 80.0,
            overscan_rows: 5,
            bottom_proximity_px: 200.0,
            near_top_threshold_px: 100.0,
            utc_offset_minutes: None,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl FeedConfig {
    /// Defaults overridden by `SHADOW_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        override_from_env("SHADOW_PAGE_SIZE", &mut config.page_size)?;
        override_from_env("SHADOW_CATCH_UP_LIMIT", &mut config.catch_up_limit)?;
        override_from_env("SHADOW_ROW_HEIGHT", &mut config.default_row_height_px)?;
        override_from_env("SHADOW_OVERSCAN", &mut config.overscan_rows)?;
        override_from_env("SHADOW_BOTTOM_PROXIMITY", &mut config.bottom_proximity_px)?;
        override_from_env("SHADOW_NEAR_TOP", &mut config.near_top_threshold_px)?;
        override_from_env(
            "SHADOW_RECONNECT_MAX_ATTEMPTS",
            &mut config.reconnect.max_attempts,
        )?;
        if let Ok(raw) = env::var("SHADOW_UTC_OFFSET_MINUTES") {
            let minutes = raw
                .parse()
                .with_context(|| format!("SHADOW_UTC_OFFSET_MINUTES: invalid value '{}'", raw))?;
            config.utc_offset_minutes = Some(minutes);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.page_size > 0, "page_size must be positive");
        anyhow::ensure!(
            self.default_row_height_px > 0.0,
            "default_row_height_px must be positive"
        );
        if let Some(minutes) = self.utc_offset_minutes {
            anyhow::ensure!(
                FixedOffset::east_opt(minutes * 60).is_some(),
                "utc_offset_minutes out of range: {}",
                minutes
            );
        }
        Ok(())
    }

    /// Zone used for day dividers.
    pub fn time_zone(&self) -> FixedOffset {
        self.utc_offset_minutes
            .and_then(|minutes| FixedOffset::east_opt(minutes * 60))
            .unwrap_or_else(|| Local::now().offset().fix())
    }
}

fn override_from_env<T>(key: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Ok(raw) = env::var(key) {
        *slot = raw
            .parse()
            .with_context(|| format!("{}: invalid value '{}'", key, raw))?;
    }
    Ok(())
}

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::grid::GridGeometry;
use crate::limits::*;
use crate::model::{parse_hhmm, DayOfWeek, Min};

/// Gesture thresholds. Defaults come from `limits`; every field is tunable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureConfig {
    pub resize_edge_px: f64,
    pub long_press: Duration,
    pub conflict_debounce: Duration,
    /// Collapses all gesture handling to click → select.
    pub read_only: bool,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            resize_edge_px: RESIZE_EDGE_PX,
            long_press: Duration::from_millis(LONG_PRESS_MS),
            conflict_debounce: Duration::from_millis(CONFLICT_DEBOUNCE_MS),
            read_only: false,
        }
    }
}

/// Driver configuration, read from `CLASSGRID_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub metrics_port: Option<u16>,
    pub seed_path: Option<PathBuf>,
    pub geometry: GridGeometry,
    pub gesture: GestureConfig,
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn env_time(key: &str) -> Option<Min> {
    std::env::var(key).ok().and_then(|s| parse_hhmm(&s).ok())
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = GridGeometry::default();
        let geometry = GridGeometry {
            min_time: env_time("CLASSGRID_DAY_START").unwrap_or(defaults.min_time),
            max_time: env_time("CLASSGRID_DAY_END").unwrap_or(defaults.max_time),
            slot_minutes: env_parse("CLASSGRID_SLOT_MINUTES").unwrap_or(defaults.slot_minutes),
            slot_height: env_parse("CLASSGRID_SLOT_HEIGHT").unwrap_or(defaults.slot_height),
            day_column_width: env_parse("CLASSGRID_DAY_WIDTH").unwrap_or(defaults.day_column_width),
            visible_days: env_parse("CLASSGRID_VISIBLE_DAYS").unwrap_or(defaults.visible_days),
            first_day: env_parse::<DayOfWeek>("CLASSGRID_FIRST_DAY").unwrap_or(defaults.first_day),
            ..defaults
        };

        let gesture = GestureConfig {
            resize_edge_px: env_parse("CLASSGRID_RESIZE_EDGE_PX").unwrap_or(RESIZE_EDGE_PX),
            long_press: Duration::from_millis(
                env_parse("CLASSGRID_LONG_PRESS_MS").unwrap_or(LONG_PRESS_MS),
            ),
            conflict_debounce: Duration::from_millis(
                env_parse("CLASSGRID_CONFLICT_DEBOUNCE_MS").unwrap_or(CONFLICT_DEBOUNCE_MS),
            ),
            read_only: env_parse("CLASSGRID_READ_ONLY").unwrap_or(false),
        };

        Self {
            metrics_port: env_parse("CLASSGRID_METRICS_PORT"),
            seed_path: std::env::var("CLASSGRID_SEED").ok().map(PathBuf::from),
            geometry,
            gesture,
        }
    }
}

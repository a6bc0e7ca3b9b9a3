use crate::model::Min;

/// Snap granularity for committed start/end values.
pub const SNAP_MINUTES: Min = 15;

/// Smallest block a create gesture or draft may commit.
pub const MIN_COMMIT_MINUTES: Min = 30;

/// Resize keeps duration within `[MIN_RESIZE_MINUTES, MAX_BLOCK_MINUTES]`.
pub const MIN_RESIZE_MINUTES: Min = 15;
pub const MAX_BLOCK_MINUTES: Min = 12 * 60;

pub const MINUTES_PER_DAY: Min = 24 * 60;

/// Pixel band at a block's top/bottom edge that starts a resize.
/// Tunable through `GestureConfig`.
pub const RESIZE_EDGE_PX: f64 = 10.0;

/// Dwell on a block body before a press becomes a move.
/// Tunable through `GestureConfig`.
pub const LONG_PRESS_MS: u64 = 500;

/// Quiet period before a conflict lookup is issued.
pub const CONFLICT_DEBOUNCE_MS: u64 = 500;

/// Members of an overlap group rendered before `+K more` collapse.
pub const OVERFLOW_VISIBLE_CAP: usize = 3;

pub const OVERFLOW_BADGE_HEIGHT: f64 = 16.0;

pub const MAX_TITLE_LEN: usize = 200;

/// Default valid time range, 09:00..22:00.
pub const DEFAULT_DAY_START: Min = 9 * 60;
pub const DEFAULT_DAY_END: Min = 22 * 60;

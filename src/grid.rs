//! Pixel <-> (day, minutes) mapping for the day-of-week × time-of-day grid.
//!
//! The grid is laid out as a header row on top, a time-label column on the
//! left, then `visible_days` equal-width day columns. Vertical position maps
//! linearly onto `[min_time, max_time]`, `slot_height` pixels per
//! `slot_minutes`.

use serde::{Deserialize, Serialize};

use crate::error::GridError;
use crate::limits::*;
use crate::model::{DayOfWeek, Min, Span};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridGeometry {
    pub header_height: f64,
    pub time_column_width: f64,
    pub day_column_width: f64,
    /// Pixel height of one visual slot.
    pub slot_height: f64,
    /// Minutes covered by one visual slot.
    pub slot_minutes: Min,
    /// Grid-line granularity results are snapped to.
    pub snap_minutes: Min,
    pub min_time: Min,
    pub max_time: Min,
    /// 1 (day view) or 7 (week view).
    pub visible_days: usize,
    /// Day shown in column 0.
    pub first_day: DayOfWeek,
}

impl Default for GridGeometry {
    fn default() -> Self {
        Self {
            header_height: 40.0,
            time_column_width: 60.0,
            day_column_width: 120.0,
            slot_height: 30.0,
            slot_minutes: 30,
            snap_minutes: SNAP_MINUTES,
            min_time: DEFAULT_DAY_START,
            max_time: DEFAULT_DAY_END,
            visible_days: 7,
            first_day: DayOfWeek::Monday,
        }
    }
}

impl GridGeometry {
    pub fn validate(&self) -> Result<(), GridError> {
        if !(self.header_height >= 0.0
            && self.time_column_width >= 0.0
            && self.day_column_width > 0.0
            && self.slot_height > 0.0)
        {
            return Err(GridError::LimitExceeded("grid dimensions must be positive"));
        }
        if self.slot_minutes <= 0 || self.snap_minutes <= 0 {
            return Err(GridError::LimitExceeded("slot and snap minutes must be positive"));
        }
        if self.visible_days != 1 && self.visible_days != 7 {
            return Err(GridError::LimitExceeded("visible days must be 1 or 7"));
        }
        if self.min_time < 0 || self.max_time > MINUTES_PER_DAY || self.min_time >= self.max_time {
            return Err(GridError::LimitExceeded("time range out of bounds"));
        }
        if self.min_time % self.snap_minutes != 0 || self.max_time % self.snap_minutes != 0 {
            return Err(GridError::LimitExceeded("time range not aligned to snap"));
        }
        Ok(())
    }

    pub fn px_per_minute(&self) -> f64 {
        self.slot_height / self.slot_minutes as f64
    }

    /// Weekday rendered in column `index`, if that column is visible.
    pub fn day_at(&self, index: usize) -> Option<DayOfWeek> {
        if index >= self.visible_days {
            return None;
        }
        DayOfWeek::from_index((self.first_day.index() + index) % 7)
    }

    /// Column rendering `day`, if visible.
    pub fn column_of(&self, day: DayOfWeek) -> Option<usize> {
        let index = (day.index() + 7 - self.first_day.index()) % 7;
        (index < self.visible_days).then_some(index)
    }

    pub fn column_left(&self, index: usize) -> f64 {
        self.time_column_width + index as f64 * self.day_column_width
    }

    pub fn y_of(&self, minutes: Min) -> f64 {
        self.header_height + (minutes - self.min_time) as f64 * self.px_per_minute()
    }

    pub fn bounds(&self) -> PixelRect {
        PixelRect {
            x: 0.0,
            y: 0.0,
            width: self.column_left(self.visible_days),
            height: self.y_of(self.max_time),
        }
    }

    /// Day-column area below the header, right of the time labels.
    pub fn body(&self) -> PixelRect {
        let top = self.header_height;
        PixelRect {
            x: self.time_column_width,
            y: top,
            width: self.visible_days as f64 * self.day_column_width,
            height: self.y_of(self.max_time) - top,
        }
    }

    /// Fit a span of `duration` starting at `start` inside `[min_time, max_time]`,
    /// shifting it earlier rather than truncating when it would overrun.
    pub fn fit_span(&self, start: Min, duration: Min) -> Span {
        let latest_start = (self.max_time - duration).max(self.min_time);
        let start = start.clamp(self.min_time, latest_start);
        Span::new(start, (start + duration).min(self.max_time))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    pub day_index: usize,
    pub minutes: Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PixelRect {
    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.x <= x && x < self.right() && self.y <= y && y < self.bottom()
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v }
}

/// Resolve a pixel position to the nearest valid cell. Never fails: points
/// outside the grid, negative or NaN coordinates clamp to the closest cell
/// so a gesture in progress keeps tracking.
pub fn pixel_to_cell(x: f64, y: f64, geometry: &GridGeometry) -> Cell {
    let g = geometry;
    let x = finite_or_zero(x);
    let y = finite_or_zero(y);

    let column = ((x - g.time_column_width) / g.day_column_width).floor();
    let day_index = column.clamp(0.0, (g.visible_days.max(1) - 1) as f64) as usize;

    // Fractional slot index, interpolated inside the slot, then snapped to
    // the nearest grid line rather than the slot's top edge.
    let slot = (y - g.header_height) / g.slot_height;
    let raw = g.min_time as f64 + slot * g.slot_minutes as f64;
    let snap = g.snap_minutes as f64;
    let snapped = (raw / snap).round() * snap;
    let minutes = snapped.clamp(g.min_time as f64, g.max_time as f64) as Min;

    Cell { day_index, minutes }
}

/// Pixel box of one snap cell; `(x, y)` is the cell's top-left grid line.
pub fn cell_to_pixel(cell: Cell, geometry: &GridGeometry) -> PixelRect {
    PixelRect {
        x: geometry.column_left(cell.day_index),
        y: geometry.y_of(cell.minutes),
        width: geometry.day_column_width,
        height: geometry.snap_minutes as f64 * geometry.px_per_minute(),
    }
}

/// Full-column box of `span` in column `day_index`, clipped to the visible range.
pub fn span_rect(day_index: usize, span: Span, geometry: &GridGeometry) -> PixelRect {
    let top = span.start.clamp(geometry.min_time, geometry.max_time);
    let bottom = span.end.clamp(geometry.min_time, geometry.max_time);
    PixelRect {
        x: geometry.column_left(day_index),
        y: geometry.y_of(top),
        width: geometry.day_column_width,
        height: (bottom - top) as f64 * geometry.px_per_minute(),
    }
}

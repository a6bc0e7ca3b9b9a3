use std::time::Duration;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::grid::Cell;
use crate::layout::{BlockPlacement, GroupKey};
use crate::model::{BlockPatch, DayOfWeek, Span};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerButton {
    #[default]
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerInput {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub button: PointerButton,
}

impl PointerInput {
    pub fn primary(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            button: PointerButton::Primary,
        }
    }

    pub fn secondary(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            button: PointerButton::Secondary,
        }
    }
}

/// Handle for a long-press timer. Only the token held by the live session
/// is honored when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(pub(super) u64);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureEvent {
    PointerDown(PointerInput),
    PointerMove(PointerInput),
    PointerUp(PointerInput),
    TimerFired(TimerToken),
    /// Owning view torn down or gesture aborted; emits no intent.
    Cancel,
}

/// Live placement a gesture would commit if released now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub day: DayOfWeek,
    pub day_index: usize,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Intent {
    /// Short press on a block: open/select, no mutation.
    Click { block_id: Ulid },
    ContextMenu { block_id: Ulid, x: f64, y: f64 },
    Create { day: DayOfWeek, span: Span },
    Update { block_id: Ulid, patch: BlockPatch },
    ToggleOverflow { group: GroupKey },
}

/// Side effects requested by the state machine. The host interprets them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    ArmTimer { token: TimerToken, after: Duration },
    CancelTimer(TimerToken),
    /// Install global pointer tracking for the gesture's duration.
    CapturePointer,
    ReleasePointer,
    Preview {
        block_id: Option<Ulid>,
        candidate: Candidate,
    },
    ClearPreview,
    Emit(Intent),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragMode {
    /// Press on a block body, waiting to become a click or a move.
    /// No timer in read-only mode.
    PendingClick { timer: Option<TimerToken> },
    Creating { anchor: Cell },
    Moving,
    ResizingTop,
    ResizingBottom,
}

impl DragMode {
    pub fn label(&self) -> &'static str {
        match self {
            DragMode::PendingClick { .. } => "pending_click",
            DragMode::Creating { .. } => "create",
            DragMode::Moving => "move",
            DragMode::ResizingTop => "resize_top",
            DragMode::ResizingBottom => "resize_bottom",
        }
    }

    pub fn shows_preview(&self) -> bool {
        !matches!(self, DragMode::PendingClick { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Offset {
    pub dx: f64,
    pub dy: f64,
}

/// State for exactly one gesture. Created on pointer-down, dropped on
/// pointer-up or cancel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    pub mode: DragMode,
    /// Block being moved/resized/pressed; `None` while creating.
    pub anchor: Option<BlockPlacement>,
    /// Pointer offset from the anchor's grabbed corner or edge.
    pub grab: Offset,
    pub last_pointer: PointerInput,
    pub candidate: Candidate,
}

impl DragSession {
    pub fn timer(&self) -> Option<TimerToken> {
        match self.mode {
            DragMode::PendingClick { timer } => timer,
            _ => None,
        }
    }
}

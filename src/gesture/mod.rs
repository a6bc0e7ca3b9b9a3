//! Pointer gesture state machine.
//!
//! `Idle → {PendingClick, Creating, Moving, ResizingTop, ResizingBottom} → Idle`.
//! The machine is synchronous and clock-free: it consumes `GestureEvent`s and
//! returns `Effect`s. Long-press timers and global pointer capture are
//! requested as effects and interpreted by the host, so the machine can be
//! driven by any pointer source, including synthetic ones in tests.

mod session;
#[cfg(test)]
mod tests;

pub use session::{
    Candidate, DragMode, DragSession, Effect, GestureEvent, Intent, Offset, PointerButton,
    PointerInput, TimerToken,
};

use crate::config::GestureConfig;
use crate::grid::{pixel_to_cell, Cell, GridGeometry};
use crate::layout::{BlockPlacement, GridLayout, HitTarget, HitZone};
use crate::limits::*;
use crate::model::{BlockPatch, Min, Span};

/// Capability interface for pointer sources (mouse, touch, synthetic).
pub trait PointerHandler {
    fn on_pointer_down(&mut self, input: PointerInput) -> Vec<Effect>;
    fn on_pointer_move(&mut self, input: PointerInput) -> Vec<Effect>;
    fn on_pointer_up(&mut self, input: PointerInput) -> Vec<Effect>;
    fn on_cancel(&mut self) -> Vec<Effect>;
}

pub struct GestureMachine {
    config: GestureConfig,
    layout: GridLayout,
    session: Option<DragSession>,
    next_token: u64,
}

impl GestureMachine {
    pub fn new(config: GestureConfig, layout: GridLayout) -> Self {
        Self {
            config,
            layout,
            session: None,
            next_token: 0,
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    fn geometry(&self) -> &GridGeometry {
        &self.layout.geometry
    }

    /// Swap in a freshly rendered layout. A live session keeps its own copy
    /// of the anchor placement and is unaffected.
    pub fn set_layout(&mut self, layout: GridLayout) {
        self.layout = layout;
    }

    /// Toggling read-only aborts any gesture in flight.
    pub fn set_read_only(&mut self, read_only: bool) -> Vec<Effect> {
        if self.config.read_only == read_only {
            return Vec::new();
        }
        self.config.read_only = read_only;
        self.teardown()
    }

    pub fn session(&self) -> Option<&DragSession> {
        self.session.as_ref()
    }

    pub fn is_idle(&self) -> bool {
        self.session.is_none()
    }

    pub fn mode_label(&self) -> &'static str {
        self.session.map_or("idle", |s| s.mode.label())
    }

    pub fn handle(&mut self, event: GestureEvent) -> Vec<Effect> {
        match event {
            GestureEvent::PointerDown(input) => self.pointer_down(input),
            GestureEvent::PointerMove(input) => self.pointer_move(input),
            GestureEvent::PointerUp(input) => self.pointer_up(input),
            GestureEvent::TimerFired(token) => self.timer_fired(token),
            GestureEvent::Cancel => self.teardown(),
        }
    }

    /// Drop the session without emitting an intent.
    pub fn teardown(&mut self) -> Vec<Effect> {
        match self.session.take() {
            Some(session) => exit_effects(&session),
            None => Vec::new(),
        }
    }

    fn next_timer(&mut self) -> TimerToken {
        self.next_token += 1;
        TimerToken(self.next_token)
    }

    // ── Pointer down ─────────────────────────────────────────

    fn pointer_down(&mut self, input: PointerInput) -> Vec<Effect> {
        if input.button == PointerButton::Secondary {
            return self.secondary_down(input);
        }
        if self.session.is_some() {
            return Vec::new();
        }

        let hit = self
            .layout
            .hit_test(input.x, input.y, self.config.resize_edge_px);
        match hit {
            HitTarget::Overflow(group) => vec![Effect::Emit(Intent::ToggleOverflow { group })],
            HitTarget::Block { placement, .. } if self.config.read_only => {
                self.begin(DragMode::PendingClick { timer: None }, Some(placement), input)
            }
            HitTarget::Empty(_) if self.config.read_only => Vec::new(),
            HitTarget::Block { placement, zone } => match zone {
                HitZone::TopEdge => self.begin(DragMode::ResizingTop, Some(placement), input),
                HitZone::BottomEdge => self.begin(DragMode::ResizingBottom, Some(placement), input),
                HitZone::Body => {
                    let timer = self.next_timer();
                    self.begin(
                        DragMode::PendingClick { timer: Some(timer) },
                        Some(placement),
                        input,
                    )
                }
            },
            HitTarget::Empty(cell) => {
                let g = self.geometry();
                let anchor = Cell {
                    minutes: cell.minutes.min(g.max_time - g.snap_minutes),
                    ..cell
                };
                self.begin(DragMode::Creating { anchor }, None, input)
            }
        }
    }

    fn begin(
        &mut self,
        mode: DragMode,
        anchor: Option<BlockPlacement>,
        input: PointerInput,
    ) -> Vec<Effect> {
        let candidate = match (mode, anchor) {
            (DragMode::Creating { anchor: cell }, _) => {
                let Some(day) = self.geometry().day_at(cell.day_index) else {
                    return Vec::new();
                };
                Candidate {
                    day,
                    day_index: cell.day_index,
                    span: live_create_span(cell.minutes, cell.minutes, self.geometry()),
                }
            }
            (_, Some(placement)) => Candidate {
                day: placement.day,
                day_index: placement.day_index,
                span: placement.span,
            },
            (_, None) => return Vec::new(),
        };

        // A resize grabs the edge itself, wherever inside the band it was pressed.
        let grab_dy = match (mode, anchor) {
            (DragMode::ResizingTop, Some(p)) => input.y - p.rect.y,
            (DragMode::ResizingBottom, Some(p)) => input.y - p.rect.bottom(),
            _ => 0.0,
        };
        let session = DragSession {
            mode,
            anchor,
            grab: Offset { dx: 0.0, dy: grab_dy },
            last_pointer: input,
            candidate,
        };
        self.session = Some(session);

        let mut effects = vec![Effect::CapturePointer];
        if let Some(token) = session.timer() {
            effects.push(Effect::ArmTimer {
                token,
                after: self.config.long_press,
            });
        }
        if mode.shows_preview() {
            effects.push(preview(&session));
        }
        effects
    }

    /// Right-click bypasses click/move disambiguation and never drags.
    fn secondary_down(&mut self, input: PointerInput) -> Vec<Effect> {
        let mut effects = Vec::new();
        match self.session {
            Some(session) if matches!(session.mode, DragMode::PendingClick { .. }) => {
                self.session = None;
                effects.extend(exit_effects(&session));
            }
            Some(_) => return effects,
            None => {}
        }
        if self.config.read_only {
            return effects;
        }
        if let HitTarget::Block { placement, .. } =
            self.layout
                .hit_test(input.x, input.y, self.config.resize_edge_px)
        {
            effects.push(Effect::Emit(Intent::ContextMenu {
                block_id: placement.block_id,
                x: input.x,
                y: input.y,
            }));
        }
        effects
    }

    // ── Pointer move ─────────────────────────────────────────

    fn pointer_move(&mut self, input: PointerInput) -> Vec<Effect> {
        let Some(mut session) = self.session else {
            return Vec::new();
        };
        session.last_pointer = input;
        let before = session.candidate;
        if let Some(candidate) = self.track(&session, input) {
            session.candidate = candidate;
        }
        self.session = Some(session);

        if session.mode.shows_preview() && session.candidate != before {
            vec![preview(&session)]
        } else {
            Vec::new()
        }
    }

    /// Candidate for the current pointer position, or `None` while pending.
    fn track(&self, session: &DragSession, input: PointerInput) -> Option<Candidate> {
        let g = self.geometry();
        match session.mode {
            DragMode::PendingClick { .. } => None,
            DragMode::Creating { anchor } => {
                let current = pixel_to_cell(input.x, input.y, g);
                Some(Candidate {
                    span: live_create_span(anchor.minutes, current.minutes, g),
                    ..session.candidate
                })
            }
            DragMode::Moving => {
                let anchor = session.anchor?;
                // The block's corner, not the cursor, picks the cell.
                let corner = pixel_to_cell(input.x - session.grab.dx, input.y - session.grab.dy, g);
                let day = g.day_at(corner.day_index)?;
                Some(Candidate {
                    day,
                    day_index: corner.day_index,
                    span: g.fit_span(corner.minutes, anchor.span.duration()),
                })
            }
            DragMode::ResizingTop => {
                let anchor = session.anchor?;
                let current = pixel_to_cell(input.x, input.y - session.grab.dy, g);
                Some(Candidate {
                    span: resize_top(anchor.span, current.minutes, g),
                    ..session.candidate
                })
            }
            DragMode::ResizingBottom => {
                let anchor = session.anchor?;
                let current = pixel_to_cell(input.x, input.y - session.grab.dy, g);
                Some(Candidate {
                    span: resize_bottom(anchor.span, current.minutes, g),
                    ..session.candidate
                })
            }
        }
    }

    // ── Pointer up ───────────────────────────────────────────

    fn pointer_up(&mut self, input: PointerInput) -> Vec<Effect> {
        let Some(mut session) = self.session.take() else {
            return Vec::new();
        };
        if let Some(candidate) = self.track(&session, input) {
            session.candidate = candidate;
        }

        let mut effects = exit_effects(&session);
        if let Some(intent) = self.release_intent(&session) {
            effects.push(Effect::Emit(intent));
        }
        effects
    }

    fn release_intent(&self, session: &DragSession) -> Option<Intent> {
        let candidate = session.candidate;
        match session.mode {
            DragMode::PendingClick { .. } => Some(Intent::Click {
                block_id: session.anchor?.block_id,
            }),
            DragMode::Creating { .. } => {
                let span = commit_create_span(candidate.span, self.geometry());
                Some(Intent::Create {
                    day: candidate.day,
                    span,
                })
            }
            DragMode::Moving => {
                let anchor = session.anchor?;
                if candidate.day == anchor.day && candidate.span == anchor.span {
                    return None;
                }
                Some(Intent::Update {
                    block_id: anchor.block_id,
                    patch: BlockPatch {
                        day_of_week: Some(candidate.day),
                        start: Some(candidate.span.start),
                        end: Some(candidate.span.end),
                    },
                })
            }
            DragMode::ResizingTop => {
                let anchor = session.anchor?;
                (candidate.span.start != anchor.span.start).then_some(Intent::Update {
                    block_id: anchor.block_id,
                    patch: BlockPatch {
                        start: Some(candidate.span.start),
                        ..Default::default()
                    },
                })
            }
            DragMode::ResizingBottom => {
                let anchor = session.anchor?;
                (candidate.span.end != anchor.span.end).then_some(Intent::Update {
                    block_id: anchor.block_id,
                    patch: BlockPatch {
                        end: Some(candidate.span.end),
                        ..Default::default()
                    },
                })
            }
        }
    }

    // ── Long press ───────────────────────────────────────────

    fn timer_fired(&mut self, token: TimerToken) -> Vec<Effect> {
        let Some(mut session) = self.session else {
            return Vec::new();
        };
        if session.timer() != Some(token) {
            return Vec::new();
        }
        let Some(anchor) = session.anchor else {
            return Vec::new();
        };

        // Grab where the pointer is now, so the block does not jump.
        session.mode = DragMode::Moving;
        session.grab = Offset {
            dx: session.last_pointer.x - anchor.rect.x,
            dy: session.last_pointer.y - anchor.rect.y,
        };
        self.session = Some(session);
        vec![preview(&session)]
    }
}

impl PointerHandler for GestureMachine {
    fn on_pointer_down(&mut self, input: PointerInput) -> Vec<Effect> {
        self.handle(GestureEvent::PointerDown(input))
    }

    fn on_pointer_move(&mut self, input: PointerInput) -> Vec<Effect> {
        self.handle(GestureEvent::PointerMove(input))
    }

    fn on_pointer_up(&mut self, input: PointerInput) -> Vec<Effect> {
        self.handle(GestureEvent::PointerUp(input))
    }

    fn on_cancel(&mut self) -> Vec<Effect> {
        self.handle(GestureEvent::Cancel)
    }
}

fn preview(session: &DragSession) -> Effect {
    Effect::Preview {
        block_id: session.anchor.map(|a| a.block_id),
        candidate: session.candidate,
    }
}

/// Effects leaving any mode for `Idle`: cancel a pending timer, clear the
/// preview, release global tracking.
fn exit_effects(session: &DragSession) -> Vec<Effect> {
    let mut effects = Vec::new();
    if let Some(token) = session.timer() {
        effects.push(Effect::CancelTimer(token));
    }
    if session.mode.shows_preview() {
        effects.push(Effect::ClearPreview);
    }
    effects.push(Effect::ReleasePointer);
    effects
}

/// Preview while creating: `[min, max)` of anchor and pointer, one snap
/// cell when they coincide.
/// Never longer than `MAX_BLOCK_MINUTES`; the anchor end stays put.
fn live_create_span(anchor: Min, current: Min, g: &GridGeometry) -> Span {
    if anchor == current {
        g.fit_span(anchor, g.snap_minutes)
    } else if current > anchor {
        Span::new(anchor, current.min(anchor + MAX_BLOCK_MINUTES))
    } else {
        Span::new(current.max(anchor - MAX_BLOCK_MINUTES), anchor)
    }
}

/// Committed create span, kept within `[MIN_COMMIT_MINUTES, MAX_BLOCK_MINUTES]`.
fn commit_create_span(live: Span, g: &GridGeometry) -> Span {
    if live.duration() < MIN_COMMIT_MINUTES {
        g.fit_span(live.start, MIN_COMMIT_MINUTES)
    } else if live.duration() > MAX_BLOCK_MINUTES {
        Span::new(live.start, live.start + MAX_BLOCK_MINUTES)
    } else {
        live
    }
}

/// New start for a top-edge resize; duration stays in
/// `[MIN_RESIZE_MINUTES, MAX_BLOCK_MINUTES]`.
fn resize_top(original: Span, pointer: Min, g: &GridGeometry) -> Span {
    let latest = original.end - MIN_RESIZE_MINUTES;
    let earliest = (original.end - MAX_BLOCK_MINUTES).max(g.min_time).min(latest);
    Span::new(pointer.clamp(earliest, latest), original.end)
}

fn resize_bottom(original: Span, pointer: Min, g: &GridGeometry) -> Span {
    let earliest = original.start + MIN_RESIZE_MINUTES;
    let latest = (original.start + MAX_BLOCK_MINUTES)
        .min(g.max_time)
        .max(earliest);
    Span::new(original.start, pointer.clamp(earliest, latest))
}

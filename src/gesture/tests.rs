use std::collections::HashSet;

use ulid::Ulid;

use super::*;
use crate::layout::layout_week;
use crate::model::{BlockDraft, DayOfWeek, ResourceRefs, ScheduleBlock};

// Default geometry: header 40px, time column 60px, day columns 120px,
// 1px per minute starting at 09:00.

fn y(minutes: Min) -> f64 {
    40.0 + (minutes - 540) as f64
}

fn x(day_index: usize) -> f64 {
    90.0 + 120.0 * day_index as f64
}

fn block(day: DayOfWeek, start: Min, end: Min) -> ScheduleBlock {
    BlockDraft {
        day_of_week: day,
        start,
        end,
        resources: ResourceRefs::default(),
        title: "Yoga".into(),
        color: None,
        capacity: None,
    }
    .into_block(Ulid::new())
}

fn machine_with(blocks: &[ScheduleBlock], geometry: GridGeometry, config: GestureConfig) -> GestureMachine {
    let layout = layout_week(blocks, &geometry, &HashSet::new());
    GestureMachine::new(config, layout)
}

fn machine(blocks: &[ScheduleBlock]) -> GestureMachine {
    machine_with(blocks, GridGeometry::default(), GestureConfig::default())
}

fn intents(effects: &[Effect]) -> Vec<Intent> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::Emit(intent) => Some(*intent),
            _ => None,
        })
        .collect()
}

fn armed_timer(effects: &[Effect]) -> Option<TimerToken> {
    effects.iter().find_map(|e| match e {
        Effect::ArmTimer { token, .. } => Some(*token),
        _ => None,
    })
}

fn last_preview(effects: &[Effect]) -> Option<Candidate> {
    effects.iter().rev().find_map(|e| match e {
        Effect::Preview { candidate, .. } => Some(*candidate),
        _ => None,
    })
}

fn down(m: &mut GestureMachine, x: f64, y: f64) -> Vec<Effect> {
    m.on_pointer_down(PointerInput::primary(x, y))
}

fn drag(m: &mut GestureMachine, x: f64, y: f64) -> Vec<Effect> {
    m.on_pointer_move(PointerInput::primary(x, y))
}

fn up(m: &mut GestureMachine, x: f64, y: f64) -> Vec<Effect> {
    m.on_pointer_up(PointerInput::primary(x, y))
}

// ── Create ───────────────────────────────────────────────

#[test]
fn press_on_empty_cell_starts_create_with_one_cell_candidate() {
    let mut m = machine(&[]);
    let effects = down(&mut m, x(0), y(600));

    assert_eq!(m.mode_label(), "create");
    assert!(effects.contains(&Effect::CapturePointer));
    assert!(armed_timer(&effects).is_none());
    let candidate = last_preview(&effects).unwrap();
    assert_eq!(candidate.day, DayOfWeek::Monday);
    assert_eq!(candidate.span, Span::new(600, 615));
}

#[test]
fn create_without_movement_yields_minimum_block() {
    let mut m = machine(&[]);
    down(&mut m, x(1), y(600));
    let effects = up(&mut m, x(1), y(600));

    assert_eq!(
        intents(&effects),
        vec![Intent::Create {
            day: DayOfWeek::Tuesday,
            span: Span::new(600, 600 + MIN_COMMIT_MINUTES),
        }]
    );
    assert!(effects.contains(&Effect::ReleasePointer));
    assert!(m.is_idle());
}

#[test]
fn create_drag_down_spans_anchor_to_pointer() {
    let mut m = machine(&[]);
    down(&mut m, x(0), y(600));
    let preview = last_preview(&drag(&mut m, x(0), y(690))).unwrap();
    assert_eq!(preview.span, Span::new(600, 690));

    let effects = up(&mut m, x(0), y(720));
    assert_eq!(
        intents(&effects),
        vec![Intent::Create {
            day: DayOfWeek::Monday,
            span: Span::new(600, 720),
        }]
    );
}

#[test]
fn create_drag_up_orders_interval() {
    let mut m = machine(&[]);
    down(&mut m, x(0), y(720));
    let effects = up(&mut m, x(0), y(630));
    assert_eq!(
        intents(&effects),
        vec![Intent::Create {
            day: DayOfWeek::Monday,
            span: Span::new(630, 720),
        }]
    );
}

#[test]
fn short_create_is_extended_to_minimum() {
    let mut m = machine(&[]);
    down(&mut m, x(0), y(600));
    let effects = up(&mut m, x(0), y(615));
    assert_eq!(
        intents(&effects),
        vec![Intent::Create {
            day: DayOfWeek::Monday,
            span: Span::new(600, 630),
        }]
    );
}

#[test]
fn create_at_end_of_day_shifts_earlier() {
    let mut m = machine(&[]);
    down(&mut m, x(0), y(1320) + 50.0);
    let effects = up(&mut m, x(0), y(1320) + 50.0);
    assert_eq!(
        intents(&effects),
        vec![Intent::Create {
            day: DayOfWeek::Monday,
            span: Span::new(1290, 1320),
        }]
    );
}

#[test]
fn create_is_capped_at_longest_block() {
    let mut m = machine(&[]);
    down(&mut m, x(0), y(540));
    let preview = last_preview(&drag(&mut m, x(0), y(1320))).unwrap();
    assert_eq!(preview.span, Span::new(540, 540 + MAX_BLOCK_MINUTES));

    let effects = up(&mut m, x(0), y(1320));
    let created = intents(&effects);
    assert_eq!(
        created,
        vec![Intent::Create {
            day: DayOfWeek::Monday,
            span: Span::new(540, 540 + MAX_BLOCK_MINUTES),
        }]
    );

    let Intent::Create { day, span } = created[0] else {
        unreachable!()
    };
    let draft = BlockDraft {
        day_of_week: day,
        start: span.start,
        end: span.end,
        resources: ResourceRefs::default(),
        title: String::new(),
        color: None,
        capacity: None,
    };
    assert!(crate::conflict::validate_draft(&draft).is_ok());
}

#[test]
fn create_dragged_up_is_capped_below_anchor() {
    let mut m = machine(&[]);
    down(&mut m, x(2), y(1290));
    let effects = up(&mut m, x(2), y(540));
    assert_eq!(
        intents(&effects),
        vec![Intent::Create {
            day: DayOfWeek::Wednesday,
            span: Span::new(1290 - MAX_BLOCK_MINUTES, 1290),
        }]
    );
}

#[test]
fn create_keeps_anchor_day_when_dragged_sideways() {
    let mut m = machine(&[]);
    down(&mut m, x(2), y(600));
    let effects = up(&mut m, x(5), y(660));
    assert_eq!(
        intents(&effects),
        vec![Intent::Create {
            day: DayOfWeek::Wednesday,
            span: Span::new(600, 660),
        }]
    );
}

// ── Click vs. long press ─────────────────────────────────

#[test]
fn quick_release_on_body_is_click() {
    let b = block(DayOfWeek::Monday, 600, 660);
    let mut m = machine(&[b.clone()]);

    let effects = down(&mut m, x(0), y(630));
    let token = armed_timer(&effects).expect("long-press timer armed");
    assert_eq!(m.mode_label(), "pending_click");
    assert!(last_preview(&effects).is_none());

    let effects = up(&mut m, x(0), y(630));
    assert_eq!(intents(&effects), vec![Intent::Click { block_id: b.id }]);
    assert!(effects.contains(&Effect::CancelTimer(token)));
    assert!(effects.contains(&Effect::ReleasePointer));
    assert!(!effects.contains(&Effect::ClearPreview));
    assert!(m.is_idle());
}

#[test]
fn stale_timer_after_click_is_ignored() {
    let b = block(DayOfWeek::Monday, 600, 660);
    let mut m = machine(&[b]);
    let token = armed_timer(&down(&mut m, x(0), y(630))).unwrap();
    up(&mut m, x(0), y(630));

    assert!(m.handle(GestureEvent::TimerFired(token)).is_empty());
    assert!(m.is_idle());
}

#[test]
fn timer_from_previous_press_does_not_promote_new_press() {
    let b = block(DayOfWeek::Monday, 600, 660);
    let mut m = machine(&[b]);
    let first = armed_timer(&down(&mut m, x(0), y(630))).unwrap();
    up(&mut m, x(0), y(630));
    let second = armed_timer(&down(&mut m, x(0), y(630))).unwrap();
    assert_ne!(first, second);

    assert!(m.handle(GestureEvent::TimerFired(first)).is_empty());
    assert_eq!(m.mode_label(), "pending_click");
}

#[test]
fn long_press_then_drag_moves_block() {
    let b = block(DayOfWeek::Monday, 600, 660); // y 100..160
    let mut m = machine(&[b.clone()]);
    let token = armed_timer(&down(&mut m, x(0), y(630))).unwrap();

    let effects = m.handle(GestureEvent::TimerFired(token));
    assert_eq!(m.mode_label(), "move");
    assert_eq!(last_preview(&effects).unwrap().span, Span::new(600, 660));

    // Grab offset is (30, 30). Pointer to Wednesday, 34px lower:
    // the block's corner lands on 10:34 which snaps to 10:30.
    let target_x = x(2) + 20.0;
    let target_y = y(630) + 34.0;
    let preview = last_preview(&drag(&mut m, target_x, target_y)).unwrap();
    assert_eq!(preview.day, DayOfWeek::Wednesday);
    assert_eq!(preview.span, Span::new(630, 690));

    let effects = up(&mut m, target_x, target_y);
    assert_eq!(
        intents(&effects),
        vec![Intent::Update {
            block_id: b.id,
            patch: BlockPatch {
                day_of_week: Some(DayOfWeek::Wednesday),
                start: Some(630),
                end: Some(690),
            },
        }]
    );
    assert!(effects.contains(&Effect::ClearPreview));
    assert!(effects.contains(&Effect::ReleasePointer));
}

#[test]
fn move_uses_pointer_position_at_expiry_for_grab() {
    let b = block(DayOfWeek::Monday, 600, 660);
    let mut m = machine(&[b]);
    let token = armed_timer(&down(&mut m, x(0), y(630))).unwrap();
    drag(&mut m, x(0) + 4.0, y(640));
    m.handle(GestureEvent::TimerFired(token));

    let session = m.session().unwrap();
    assert_eq!(session.grab.dy, 40.0);
    assert_eq!(session.grab.dx, 34.0);
}

#[test]
fn move_past_grid_boundary_keeps_tracking() {
    let b = block(DayOfWeek::Monday, 600, 660);
    let mut m = machine(&[b.clone()]);
    let token = armed_timer(&down(&mut m, x(0), y(630))).unwrap();
    m.handle(GestureEvent::TimerFired(token));

    let preview = last_preview(&drag(&mut m, 5_000.0, 9_000.0)).unwrap();
    assert_eq!(preview.day, DayOfWeek::Sunday);
    assert_eq!(preview.span, Span::new(1260, 1320));
    assert!(!m.is_idle());

    let effects = up(&mut m, -400.0, -400.0);
    assert_eq!(
        intents(&effects),
        vec![Intent::Update {
            block_id: b.id,
            patch: BlockPatch {
                day_of_week: Some(DayOfWeek::Monday),
                start: Some(540),
                end: Some(600),
            },
        }]
    );
}

#[test]
fn move_released_in_place_emits_nothing() {
    let b = block(DayOfWeek::Monday, 600, 660);
    let mut m = machine(&[b]);
    let token = armed_timer(&down(&mut m, x(0), y(630))).unwrap();
    m.handle(GestureEvent::TimerFired(token));

    let effects = up(&mut m, x(0), y(630));
    assert!(intents(&effects).is_empty());
    assert!(effects.contains(&Effect::ReleasePointer));
}

// ── Resize ───────────────────────────────────────────────

#[test]
fn top_edge_resizes_immediately() {
    let b = block(DayOfWeek::Monday, 600, 720); // y 100..220
    let mut m = machine(&[b.clone()]);
    let effects = down(&mut m, x(0), y(603));

    assert_eq!(m.mode_label(), "resize_top");
    assert!(armed_timer(&effects).is_none());

    let preview = last_preview(&drag(&mut m, x(0), y(570))).unwrap();
    assert_eq!(preview.span, Span::new(570, 720));

    let effects = up(&mut m, x(0), y(570));
    assert_eq!(
        intents(&effects),
        vec![Intent::Update {
            block_id: b.id,
            patch: BlockPatch {
                start: Some(570),
                ..Default::default()
            },
        }]
    );
}

#[test]
fn top_resize_cannot_cross_end() {
    let b = block(DayOfWeek::Monday, 600, 720);
    let mut m = machine(&[b.clone()]);
    down(&mut m, x(0), y(603));
    let effects = up(&mut m, x(0), y(900));
    assert_eq!(
        intents(&effects),
        vec![Intent::Update {
            block_id: b.id,
            patch: BlockPatch {
                start: Some(720 - MIN_RESIZE_MINUTES),
                ..Default::default()
            },
        }]
    );
}

#[test]
fn bottom_resize_clamps_to_twelve_hours_and_keeps_day() {
    let geometry = GridGeometry {
        min_time: 0,
        max_time: 1440,
        ..Default::default()
    };
    let b = block(DayOfWeek::Monday, 60, 120); // y 100..160
    let mut m = machine_with(&[b.clone()], geometry, GestureConfig::default());

    down(&mut m, x(0), 157.0);
    assert_eq!(m.mode_label(), "resize_bottom");

    let preview = last_preview(&drag(&mut m, x(4), 40.0 + 1400.0)).unwrap();
    assert_eq!(preview.day, DayOfWeek::Monday);
    assert_eq!(preview.span, Span::new(60, 60 + MAX_BLOCK_MINUTES));

    let effects = up(&mut m, x(4), 40.0 + 1400.0);
    assert_eq!(
        intents(&effects),
        vec![Intent::Update {
            block_id: b.id,
            patch: BlockPatch {
                end: Some(60 + MAX_BLOCK_MINUTES),
                ..Default::default()
            },
        }]
    );
}

#[test]
fn bottom_resize_never_inverts() {
    let b = block(DayOfWeek::Monday, 600, 720);
    let mut m = machine(&[b]);
    down(&mut m, x(0), y(716));
    let preview = last_preview(&drag(&mut m, x(0), -100.0)).unwrap();
    assert_eq!(preview.span, Span::new(600, 615));
    assert!(preview.span.start < preview.span.end);
}

#[test]
fn resize_released_in_place_emits_nothing() {
    let b = block(DayOfWeek::Monday, 600, 720);
    let mut m = machine(&[b]);
    down(&mut m, x(0), y(716));
    assert!(intents(&up(&mut m, x(0), y(716))).is_empty());
}

#[test]
fn resize_press_deep_in_edge_band_does_not_move_edge() {
    let b = block(DayOfWeek::Monday, 600, 720); // y 100..220
    let mut m = machine(&[b]);

    down(&mut m, x(0), y(712));
    assert_eq!(m.mode_label(), "resize_bottom");
    assert!(intents(&up(&mut m, x(0), y(712))).is_empty());

    down(&mut m, x(0), y(608));
    assert_eq!(m.mode_label(), "resize_top");
    assert!(intents(&drag(&mut m, x(0), y(609))).is_empty());
    assert!(intents(&up(&mut m, x(0), y(608))).is_empty());
}

#[test]
fn resize_follows_pointer_relative_to_grab() {
    let b = block(DayOfWeek::Monday, 600, 720);
    let mut m = machine(&[b.clone()]);
    down(&mut m, x(0), y(712));
    let preview = last_preview(&drag(&mut m, x(0), y(742))).unwrap();
    assert_eq!(preview.span, Span::new(600, 750));

    let effects = up(&mut m, x(0), y(742));
    assert_eq!(
        intents(&effects),
        vec![Intent::Update {
            block_id: b.id,
            patch: BlockPatch {
                end: Some(750),
                ..Default::default()
            },
        }]
    );
}

// ── Secondary click ──────────────────────────────────────

#[test]
fn right_click_opens_context_menu_without_drag() {
    let b = block(DayOfWeek::Monday, 600, 660);
    let mut m = machine(&[b.clone()]);
    let effects = m.on_pointer_down(PointerInput::secondary(x(0), y(630)));

    assert_eq!(
        intents(&effects),
        vec![Intent::ContextMenu {
            block_id: b.id,
            x: x(0),
            y: y(630),
        }]
    );
    assert!(armed_timer(&effects).is_none());
    assert!(!effects.contains(&Effect::CapturePointer));
    assert!(m.is_idle());
}

#[test]
fn right_click_cancels_pending_press() {
    let b = block(DayOfWeek::Monday, 600, 660);
    let mut m = machine(&[b.clone()]);
    let token = armed_timer(&down(&mut m, x(0), y(630))).unwrap();

    let effects = m.on_pointer_down(PointerInput::secondary(x(0), y(630)));
    assert!(effects.contains(&Effect::CancelTimer(token)));
    assert!(effects.contains(&Effect::ReleasePointer));
    assert_eq!(intents(&effects).len(), 1);
    assert!(m.is_idle());

    // The old timer no longer promotes anything.
    assert!(m.handle(GestureEvent::TimerFired(token)).is_empty());
}

#[test]
fn right_click_on_empty_cell_does_nothing() {
    let mut m = machine(&[]);
    assert!(m.on_pointer_down(PointerInput::secondary(x(0), y(600))).is_empty());
    assert!(m.is_idle());
}

// ── Read-only ────────────────────────────────────────────

#[test]
fn read_only_collapses_to_click() {
    let b = block(DayOfWeek::Monday, 600, 720);
    let config = GestureConfig {
        read_only: true,
        ..Default::default()
    };
    let mut m = machine_with(&[b.clone()], GridGeometry::default(), config);

    // Empty cell: nothing.
    assert!(down(&mut m, x(3), y(900)).is_empty());

    // Top edge behaves like a body press, with no timer.
    let effects = down(&mut m, x(0), y(602));
    assert!(armed_timer(&effects).is_none());
    drag(&mut m, x(0), y(800));
    let effects = up(&mut m, x(0), y(800));
    assert_eq!(intents(&effects), vec![Intent::Click { block_id: b.id }]);

    // No context menu.
    assert!(intents(&m.on_pointer_down(PointerInput::secondary(x(0), y(650)))).is_empty());
}

#[test]
fn switching_to_read_only_aborts_gesture() {
    let mut m = machine(&[]);
    down(&mut m, x(0), y(600));
    let effects = m.set_read_only(true);
    assert!(intents(&effects).is_empty());
    assert!(effects.contains(&Effect::ReleasePointer));
    assert!(m.is_idle());
}

// ── Lifecycle ────────────────────────────────────────────

#[test]
fn cancel_mid_drag_emits_no_intent() {
    let b = block(DayOfWeek::Monday, 600, 660);
    let mut m = machine(&[b]);
    let token = armed_timer(&down(&mut m, x(0), y(630))).unwrap();
    m.handle(GestureEvent::TimerFired(token));
    drag(&mut m, x(1), y(700));

    let effects = m.on_cancel();
    assert!(intents(&effects).is_empty());
    assert_eq!(effects, vec![Effect::ClearPreview, Effect::ReleasePointer]);
    assert!(m.is_idle());
}

#[test]
fn cancel_while_pending_cancels_timer() {
    let b = block(DayOfWeek::Monday, 600, 660);
    let mut m = machine(&[b]);
    let token = armed_timer(&down(&mut m, x(0), y(630))).unwrap();
    assert_eq!(
        m.on_cancel(),
        vec![Effect::CancelTimer(token), Effect::ReleasePointer]
    );
}

#[test]
fn second_press_during_gesture_is_ignored() {
    let mut m = machine(&[]);
    down(&mut m, x(0), y(600));
    assert!(down(&mut m, x(3), y(800)).is_empty());
    assert_eq!(m.session().unwrap().candidate.day, DayOfWeek::Monday);
}

#[test]
fn capture_and_release_are_balanced() {
    let b = block(DayOfWeek::Monday, 600, 720);
    let mut m = machine(&[b]);
    let mut captured = 0i32;
    let mut count = |effects: &[Effect]| {
        for e in effects {
            match e {
                Effect::CapturePointer => captured += 1,
                Effect::ReleasePointer => captured -= 1,
                _ => {}
            }
        }
    };

    count(&down(&mut m, x(2), y(600)));
    count(&up(&mut m, x(2), y(700)));
    count(&down(&mut m, x(0), y(650)));
    count(&up(&mut m, x(0), y(650)));
    count(&down(&mut m, x(0), y(603)));
    count(&m.on_cancel());
    count(&m.on_pointer_up(PointerInput::primary(0.0, 0.0)));

    assert_eq!(captured, 0);
}

#[test]
fn moves_without_session_are_ignored() {
    let mut m = machine(&[]);
    assert!(drag(&mut m, x(0), y(600)).is_empty());
    assert!(up(&mut m, x(0), y(600)).is_empty());
}

#[test]
fn overflow_badge_press_toggles_group() {
    let blocks: Vec<_> = (0..4).map(|_| block(DayOfWeek::Monday, 600, 660)).collect();
    let mut m = machine(&blocks);
    let badge = m.layout().days[0].badges[0];
    let effects = down(&mut m, badge.rect.x + 2.0, badge.rect.y + 2.0);
    assert_eq!(
        intents(&effects),
        vec![Intent::ToggleOverflow { group: badge.group }]
    );
    assert!(m.is_idle());
}

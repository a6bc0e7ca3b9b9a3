//! Async controller that hosts the gesture machine.
//!
//! A single task owns all board state and drains two queues: commands from
//! the shell and completions from work it spawned (long-press timers,
//! conflict lookups, store listings, commits). Nothing else mutates the
//! board, so transitions stay sequential even though store round-trips run
//! concurrently with pointer tracking.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::config::GestureConfig;
use crate::conflict::{check_capacity, ConflictValidator, Placement};
use crate::debounce::{spawn_after, Debouncer, TaskHandle};
use crate::error::GridError;
use crate::gesture::{
    Candidate, Effect, GestureEvent, GestureMachine, Intent, PointerHandler, PointerInput,
    TimerToken,
};
use crate::grid::GridGeometry;
use crate::layout::{layout_week, GridLayout, GroupKey};
use crate::model::*;
use crate::observability;
use crate::store::ScheduleStore;

/// Line-protocol commands from the UI shell.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "cmd", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ShellCommand {
    PointerDown(PointerInput),
    PointerMove(PointerInput),
    PointerUp(PointerInput),
    /// Abort the gesture in flight (e.g. escape key, lost focus).
    Cancel,
    Refresh,
    SetFilter(ResourceFilter),
    SetReadOnly {
        read_only: bool,
    },
    SetView {
        visible_days: usize,
        first_day: DayOfWeek,
    },
    Delete {
        block_id: Ulid,
    },
    FormChanged {
        draft: BlockDraft,
        #[serde(default)]
        editing: Option<Ulid>,
    },
    SubmitForm {
        draft: BlockDraft,
        #[serde(default)]
        editing: Option<Ulid>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitOp {
    Create,
    Update,
    Delete,
}

impl CommitOp {
    pub fn label(self) -> &'static str {
        match self {
            CommitOp::Create => "create",
            CommitOp::Update => "update",
            CommitOp::Delete => "delete",
        }
    }
}

/// Everything the board tells the shell.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "notice", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ShellNotice {
    Rendered {
        layout: GridLayout,
    },
    Preview {
        block_id: Option<Ulid>,
        candidate: Candidate,
    },
    ClearPreview,
    /// Advisory; an empty list means no known conflicts.
    Conflicts {
        block_id: Option<Ulid>,
        reports: Vec<ConflictReport>,
    },
    Selected {
        block_id: Ulid,
    },
    ContextMenu {
        block_id: Ulid,
        x: f64,
        y: f64,
    },
    Committed {
        op: CommitOp,
        block_id: Ulid,
    },
    CommitFailed {
        op: CommitOp,
        block_id: Option<Ulid>,
        message: String,
    },
    LoadFailed {
        message: String,
    },
}

/// Point-in-time view of board state, for tests and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct BoardSnapshot {
    pub blocks: Vec<ScheduleBlock>,
    pub layout: GridLayout,
    pub mode: &'static str,
    /// Global pointer tracking installed.
    pub captured: bool,
    pub armed_timers: usize,
    pub pending_commits: usize,
    pub read_only: bool,
    pub filter: ResourceFilter,
}

type Responder = oneshot::Sender<Result<Ulid, GridError>>;

enum BoardMsg {
    Shell(ShellCommand),
    Submit {
        draft: BlockDraft,
        editing: Option<Ulid>,
        response: Option<Responder>,
    },
    Snapshot(oneshot::Sender<BoardSnapshot>),
    Unmount,
}

enum Mutation {
    Create(BlockDraft),
    Update { id: Ulid, patch: BlockPatch },
    Delete(Ulid),
    /// Form path: capacity is checked against the room before writing.
    Submit {
        draft: BlockDraft,
        editing: Option<Ulid>,
    },
}

impl Mutation {
    fn op(&self) -> CommitOp {
        match self {
            Mutation::Create(_) | Mutation::Submit { editing: None, .. } => CommitOp::Create,
            Mutation::Update { .. } | Mutation::Submit { editing: Some(_), .. } => CommitOp::Update,
            Mutation::Delete(_) => CommitOp::Delete,
        }
    }

    fn target(&self) -> Option<Ulid> {
        match self {
            Mutation::Create(_) => None,
            Mutation::Update { id, .. } | Mutation::Delete(id) => Some(*id),
            Mutation::Submit { editing, .. } => *editing,
        }
    }
}

/// Completions of work the board spawned.
enum Internal {
    Timer(TimerToken),
    Conflicts {
        generation: u64,
        block_id: Option<Ulid>,
        reports: Vec<ConflictReport>,
    },
    Listed {
        generation: u64,
        result: Result<Vec<ScheduleBlock>, GridError>,
    },
    Committed {
        op: CommitOp,
        target: Option<Ulid>,
        result: Result<Ulid, GridError>,
        response: Option<Responder>,
    },
}

/// Handle to a mounted board. Dropping it unmounts the board.
pub struct Board {
    tx: mpsc::UnboundedSender<BoardMsg>,
    task: JoinHandle<()>,
}

impl Board {
    /// Validate geometry, spawn the board task and issue the initial listing.
    pub fn mount<S>(
        store: Arc<S>,
        geometry: GridGeometry,
        config: GestureConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ShellNotice>), GridError>
    where
        S: ScheduleStore + ?Sized + 'static,
    {
        geometry.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let state = BoardState {
            validator: ConflictValidator::new(store.clone()),
            store,
            geometry,
            machine: GestureMachine::new(config, GridLayout::empty(geometry)),
            filter: ResourceFilter::default(),
            blocks: Vec::new(),
            known_good: Vec::new(),
            expanded: HashSet::new(),
            captured: false,
            timers: HashMap::new(),
            debouncer: Debouncer::new(config.conflict_debounce),
            conflict_generation: 0,
            list_generation: 0,
            pending_commits: 0,
            internal: internal_tx,
            notices: notice_tx,
        };
        let task = tokio::spawn(board_loop(state, rx, internal_rx));
        Ok((Self { tx, task }, notice_rx))
    }

    pub fn send(&self, command: ShellCommand) -> Result<(), GridError> {
        self.tx
            .send(BoardMsg::Shell(command))
            .map_err(|_| GridError::BoardClosed)
    }

    pub fn pointer_down(&self, input: PointerInput) -> Result<(), GridError> {
        self.send(ShellCommand::PointerDown(input))
    }

    pub fn pointer_move(&self, input: PointerInput) -> Result<(), GridError> {
        self.send(ShellCommand::PointerMove(input))
    }

    pub fn pointer_up(&self, input: PointerInput) -> Result<(), GridError> {
        self.send(ShellCommand::PointerUp(input))
    }

    /// Schedule a debounced conflict check for the form's current values.
    pub fn form_changed(&self, draft: BlockDraft, editing: Option<Ulid>) -> Result<(), GridError> {
        self.send(ShellCommand::FormChanged { draft, editing })
    }

    /// Create (or update `editing`) from a form. Fails without writing when
    /// the requested capacity exceeds the room's; conflicts never block it.
    pub async fn submit_form(
        &self,
        draft: BlockDraft,
        editing: Option<Ulid>,
    ) -> Result<Ulid, GridError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(BoardMsg::Submit {
                draft,
                editing,
                response: Some(tx),
            })
            .map_err(|_| GridError::BoardClosed)?;
        rx.await.map_err(|_| GridError::BoardClosed)?
    }

    pub async fn snapshot(&self) -> Result<BoardSnapshot, GridError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(BoardMsg::Snapshot(tx))
            .map_err(|_| GridError::BoardClosed)?;
        rx.await.map_err(|_| GridError::BoardClosed)
    }

    /// Tear down: any gesture in flight is discarded without an intent.
    /// Commits already issued still reach the store.
    pub async fn unmount(self) {
        let _ = self.tx.send(BoardMsg::Unmount);
        if let Err(e) = self.task.await {
            warn!("board task ended abnormally: {e}");
        }
    }
}

async fn board_loop<S: ScheduleStore + ?Sized + 'static>(
    mut state: BoardState<S>,
    mut rx: mpsc::UnboundedReceiver<BoardMsg>,
    mut internal: mpsc::UnboundedReceiver<Internal>,
) {
    state.refresh();
    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(BoardMsg::Unmount) | None => break,
                Some(msg) => state.on_message(msg),
            },
            Some(event) = internal.recv() => state.on_internal(event),
        }
    }
    state.teardown();
    debug!("board unmounted");
}

struct BoardState<S: ?Sized> {
    store: Arc<S>,
    validator: ConflictValidator<S>,
    geometry: GridGeometry,
    machine: GestureMachine,
    filter: ResourceFilter,
    /// What is rendered, including optimistic edits.
    blocks: Vec<ScheduleBlock>,
    /// Last listing the store confirmed; rollback target.
    known_good: Vec<ScheduleBlock>,
    expanded: HashSet<GroupKey>,
    captured: bool,
    timers: HashMap<TimerToken, TaskHandle>,
    debouncer: Debouncer,
    conflict_generation: u64,
    list_generation: u64,
    pending_commits: usize,
    internal: mpsc::UnboundedSender<Internal>,
    notices: mpsc::UnboundedSender<ShellNotice>,
}

impl<S: ScheduleStore + ?Sized + 'static> BoardState<S> {
    fn notify(&self, notice: ShellNotice) {
        // The shell may have stopped listening; the board keeps running.
        let _ = self.notices.send(notice);
    }

    fn on_message(&mut self, msg: BoardMsg) {
        match msg {
            BoardMsg::Shell(command) => self.on_command(command),
            BoardMsg::Submit {
                draft,
                editing,
                response,
            } => self.submit(draft, editing, response),
            BoardMsg::Snapshot(tx) => {
                let _ = tx.send(self.snapshot());
            }
            BoardMsg::Unmount => {}
        }
    }

    fn on_command(&mut self, command: ShellCommand) {
        match command {
            ShellCommand::PointerDown(input) => {
                // Presses start on the day columns only.
                if !self.geometry.body().contains(input.x, input.y) {
                    return;
                }
                let was_idle = self.machine.is_idle();
                let effects = self.machine.on_pointer_down(input);
                if was_idle && !self.machine.is_idle() {
                    metrics::counter!(observability::GESTURES_TOTAL, "mode" => self.machine.mode_label())
                        .increment(1);
                }
                self.apply(effects);
            }
            ShellCommand::PointerMove(input) => {
                if self.tracks(input) {
                    let effects = self.machine.on_pointer_move(input);
                    self.apply(effects);
                }
            }
            ShellCommand::PointerUp(input) => {
                if self.tracks(input) {
                    let effects = self.machine.on_pointer_up(input);
                    self.apply(effects);
                }
            }
            ShellCommand::Cancel => {
                let effects = self.machine.on_cancel();
                self.apply(effects);
            }
            ShellCommand::Refresh => self.refresh(),
            ShellCommand::SetFilter(filter) => {
                if filter != self.filter {
                    self.filter = filter;
                    self.refresh();
                }
            }
            ShellCommand::SetReadOnly { read_only } => {
                let effects = self.machine.set_read_only(read_only);
                self.apply(effects);
                info!("read-only {read_only}");
            }
            ShellCommand::SetView {
                visible_days,
                first_day,
            } => self.set_view(visible_days, first_day),
            ShellCommand::Delete { block_id } => self.delete(block_id),
            ShellCommand::FormChanged { draft, editing } => self.form_changed(draft, editing),
            ShellCommand::SubmitForm { draft, editing } => self.submit(draft, editing, None),
        }
    }

    /// Inside the grid, or anywhere while a gesture holds the capture.
    fn tracks(&self, input: PointerInput) -> bool {
        self.captured || self.geometry.body().contains(input.x, input.y)
    }

    // ── Effects ──────────────────────────────────────────────

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ArmTimer { token, after } => {
                    let tx = self.internal.clone();
                    let handle = spawn_after(after, async move {
                        let _ = tx.send(Internal::Timer(token));
                    });
                    self.timers.insert(token, handle);
                }
                Effect::CancelTimer(token) => {
                    self.timers.remove(&token);
                }
                Effect::CapturePointer => self.captured = true,
                Effect::ReleasePointer => self.captured = false,
                Effect::Preview {
                    block_id,
                    candidate,
                } => {
                    self.notify(ShellNotice::Preview {
                        block_id,
                        candidate,
                    });
                    let placement = Placement {
                        day_of_week: candidate.day,
                        span: candidate.span,
                        resources: self.resources_for(block_id),
                    };
                    self.check_conflicts(placement, block_id);
                }
                Effect::ClearPreview => {
                    self.cancel_conflicts();
                    self.notify(ShellNotice::ClearPreview);
                }
                Effect::Emit(intent) => self.on_intent(intent),
            }
        }
    }

    fn on_intent(&mut self, intent: Intent) {
        metrics::counter!(observability::INTENTS_TOTAL, "intent" => observability::intent_label(&intent))
            .increment(1);
        match intent {
            Intent::Click { block_id } => self.notify(ShellNotice::Selected { block_id }),
            Intent::ContextMenu { block_id, x, y } => {
                self.notify(ShellNotice::ContextMenu { block_id, x, y })
            }
            Intent::ToggleOverflow { group } => {
                if !self.expanded.remove(&group) {
                    self.expanded.insert(group);
                }
                self.render();
            }
            Intent::Create { day, span } => {
                let draft = BlockDraft {
                    day_of_week: day,
                    start: span.start,
                    end: span.end,
                    resources: self.resources_for(None),
                    title: String::new(),
                    color: None,
                    capacity: None,
                };
                info!("create {day} {span}");
                self.blocks.push(draft.clone().into_block(Ulid::new()));
                self.render();
                self.commit(Mutation::Create(draft), None);
            }
            Intent::Update { block_id, patch } => {
                if let Some(block) = self.blocks.iter_mut().find(|b| b.id == block_id) {
                    patch.apply(block);
                }
                info!("update {block_id} {}", serde_json::to_string(&patch).unwrap_or_default());
                self.render();
                self.commit(Mutation::Update { id: block_id, patch }, None);
            }
        }
    }

    /// Resources a candidate would occupy: the anchor block's, or the
    /// active filter's for a new block.
    fn resources_for(&self, block_id: Option<Ulid>) -> ResourceRefs {
        match block_id.and_then(|id| self.blocks.iter().find(|b| b.id == id)) {
            Some(block) => block.resources.clone(),
            None => ResourceRefs {
                instructor_id: self.filter.instructor_id,
                room_id: self.filter.room_id,
                room_name: None,
            },
        }
    }

    // ── Conflicts ────────────────────────────────────────────

    fn check_conflicts(&mut self, placement: Placement, exclude: Option<Ulid>) {
        self.conflict_generation += 1;
        if placement.queries().is_empty() {
            self.debouncer.cancel();
            return;
        }
        let generation = self.conflict_generation;
        let validator = self.validator.clone();
        let tx = self.internal.clone();
        self.debouncer.schedule(async move {
            let reports = validator.check(&placement, exclude).await;
            let _ = tx.send(Internal::Conflicts {
                generation,
                block_id: exclude,
                reports,
            });
        });
    }

    /// Drop the pending lookup and ignore any still in flight.
    fn cancel_conflicts(&mut self) {
        self.conflict_generation += 1;
        self.debouncer.cancel();
    }

    fn form_changed(&mut self, draft: BlockDraft, editing: Option<Ulid>) {
        if draft.start >= draft.end {
            debug!("form span {}..{} incomplete, skipping conflict check", draft.start, draft.end);
            self.cancel_conflicts();
            return;
        }
        self.check_conflicts(Placement::from(&draft), editing);
    }

    // ── Store round-trips ────────────────────────────────────

    fn refresh(&mut self) {
        self.list_generation += 1;
        let generation = self.list_generation;
        let store = self.store.clone();
        let filter = self.filter;
        let tx = self.internal.clone();
        tokio::spawn(async move {
            let result = store.list_schedules(&filter).await;
            let _ = tx.send(Internal::Listed { generation, result });
        });
    }

    fn delete(&mut self, block_id: Ulid) {
        if self.machine.config().read_only {
            self.notify(ShellNotice::CommitFailed {
                op: CommitOp::Delete,
                block_id: Some(block_id),
                message: GridError::ReadOnly.to_string(),
            });
            return;
        }
        self.blocks.retain(|b| b.id != block_id);
        info!("delete {block_id}");
        self.render();
        self.commit(Mutation::Delete(block_id), None);
    }

    fn submit(&mut self, draft: BlockDraft, editing: Option<Ulid>, response: Option<Responder>) {
        if self.machine.config().read_only {
            let op = if editing.is_some() { CommitOp::Update } else { CommitOp::Create };
            self.fail(op, editing, GridError::ReadOnly, response);
            return;
        }
        self.cancel_conflicts();
        self.commit(Mutation::Submit { draft, editing }, response);
    }

    /// Fire-and-forget write; the outcome comes back as `Internal::Committed`.
    fn commit(&mut self, mutation: Mutation, response: Option<Responder>) {
        self.pending_commits += 1;
        let store = self.store.clone();
        let tx = self.internal.clone();
        tokio::spawn(async move {
            let op = mutation.op();
            let target = mutation.target();
            let started = Instant::now();
            let result = write(store.as_ref(), mutation).await;
            metrics::histogram!(observability::COMMIT_DURATION_SECONDS, "op" => op.label())
                .record(started.elapsed().as_secs_f64());
            let _ = tx.send(Internal::Committed {
                op,
                target,
                result,
                response,
            });
        });
    }

    fn fail(&self, op: CommitOp, block_id: Option<Ulid>, e: GridError, response: Option<Responder>) {
        warn!("{} failed: {e}", op.label());
        self.notify(ShellNotice::CommitFailed {
            op,
            block_id,
            message: e.to_string(),
        });
        if let Some(tx) = response {
            let _ = tx.send(Err(e));
        }
    }

    fn on_internal(&mut self, event: Internal) {
        match event {
            Internal::Timer(token) => {
                self.timers.remove(&token);
                let was = self.machine.mode_label();
                let effects = self.machine.handle(GestureEvent::TimerFired(token));
                if was != self.machine.mode_label() {
                    metrics::counter!(observability::GESTURES_TOTAL, "mode" => self.machine.mode_label())
                        .increment(1);
                }
                self.apply(effects);
            }
            Internal::Conflicts {
                generation,
                block_id,
                reports,
            } => {
                if generation == self.conflict_generation {
                    self.notify(ShellNotice::Conflicts { block_id, reports });
                }
            }
            Internal::Listed { generation, result } => {
                if generation != self.list_generation {
                    return;
                }
                match result {
                    Ok(blocks) => {
                        self.known_good = blocks;
                        // Keep optimistic edits on screen until their commits land.
                        if self.pending_commits == 0 {
                            self.blocks = self.known_good.clone();
                            self.render();
                        }
                    }
                    Err(e) => {
                        warn!("list failed: {e}");
                        self.notify(ShellNotice::LoadFailed {
                            message: e.to_string(),
                        });
                    }
                }
            }
            Internal::Committed {
                op,
                target,
                result,
                response,
            } => {
                self.pending_commits -= 1;
                match result {
                    Ok(id) => {
                        metrics::counter!(observability::COMMITS_TOTAL, "op" => op.label(), "status" => "ok")
                            .increment(1);
                        info!("{} {id} committed", op.label());
                        self.notify(ShellNotice::Committed { op, block_id: id });
                        if let Some(tx) = response {
                            let _ = tx.send(Ok(id));
                        }
                    }
                    Err(e) => {
                        metrics::counter!(observability::COMMITS_TOTAL, "op" => op.label(), "status" => "error")
                            .increment(1);
                        metrics::counter!(observability::ROLLBACKS_TOTAL).increment(1);
                        self.blocks = self.known_good.clone();
                        self.render();
                        self.fail(op, target, e, response);
                    }
                }
                self.refresh();
            }
        }
    }

    // ── Rendering ────────────────────────────────────────────

    fn render(&mut self) {
        let layout = layout_week(&self.blocks, &self.geometry, &self.expanded);
        self.expanded
            .retain(|key| layout.placements().any(|p| p.group == *key));
        metrics::gauge!(observability::BLOCKS_RENDERED).set(layout.placements().count() as f64);
        self.machine.set_layout(layout.clone());
        self.notify(ShellNotice::Rendered { layout });
    }

    fn set_view(&mut self, visible_days: usize, first_day: DayOfWeek) {
        let geometry = GridGeometry {
            visible_days,
            first_day,
            ..self.geometry
        };
        if let Err(e) = geometry.validate() {
            warn!("rejected view change: {e}");
            return;
        }
        let effects = self.machine.teardown();
        self.apply(effects);
        self.geometry = geometry;
        self.render();
    }

    fn snapshot(&self) -> BoardSnapshot {
        BoardSnapshot {
            blocks: self.blocks.clone(),
            layout: self.machine.layout().clone(),
            mode: self.machine.mode_label(),
            captured: self.captured,
            armed_timers: self.timers.values().filter(|t| !t.is_finished()).count(),
            pending_commits: self.pending_commits,
            read_only: self.machine.config().read_only,
            filter: self.filter,
        }
    }

    /// Unmount path: drop the session silently and release everything it held.
    fn teardown(&mut self) {
        let discarded = self.machine.mode_label();
        let _ = self.machine.teardown();
        if discarded != "idle" {
            debug!("discarded {discarded} gesture on unmount");
        }
        self.captured = false;
        self.timers.clear();
        self.cancel_conflicts();
    }
}

async fn write<S: ScheduleStore + ?Sized>(store: &S, mutation: Mutation) -> Result<Ulid, GridError> {
    match mutation {
        Mutation::Create(draft) => store.create_schedule(draft).await,
        Mutation::Update { id, patch } => store.update_schedule(id, patch).await.map(|()| id),
        Mutation::Delete(id) => store.delete_schedule(id).await.map(|()| id),
        Mutation::Submit { draft, editing } => {
            if let Some(room_id) = draft.resources.room_id {
                let room = store.get_room(room_id).await?;
                check_capacity(draft.capacity, room.as_ref())?;
            }
            match editing {
                None => store.create_schedule(draft).await,
                Some(id) => store.replace_schedule(id, draft).await.map(|()| id),
            }
        }
    }
}

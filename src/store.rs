use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;
use ulid::Ulid;

use crate::conflict::{check_capacity, conflicts_with, validate_draft, validate_span};
use crate::error::GridError;
use crate::model::*;

/// Boundary to persistence. Implementations are last-write-wins; the grid
/// never holds locks across calls.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn list_schedules(&self, filter: &ResourceFilter) -> Result<Vec<ScheduleBlock>, GridError>;

    async fn create_schedule(&self, draft: BlockDraft) -> Result<Ulid, GridError>;

    /// `patch` carries only the fields a gesture changed.
    async fn update_schedule(&self, id: Ulid, patch: BlockPatch) -> Result<(), GridError>;

    /// Overwrite every editable field of `id` from a submitted form.
    async fn replace_schedule(&self, id: Ulid, draft: BlockDraft) -> Result<(), GridError>;

    async fn delete_schedule(&self, id: Ulid) -> Result<(), GridError>;

    async fn find_conflicts(
        &self,
        query: &ConflictQuery,
        exclude: Option<Ulid>,
    ) -> Result<Vec<ConflictingBlock>, GridError>;

    async fn get_room(&self, id: Ulid) -> Result<Option<Room>, GridError>;
}

/// Initial contents for an `InMemoryStore`, e.g. loaded from JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub blocks: Vec<ScheduleBlock>,
}

pub struct InMemoryStore {
    blocks: DashMap<Ulid, ScheduleBlock>,
    rooms: DashMap<Ulid, Room>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            blocks: DashMap::new(),
            rooms: DashMap::new(),
        }
    }

    pub fn from_seed(seed: Seed) -> Self {
        let store = Self::new();
        for room in seed.rooms {
            store.insert_room(room);
        }
        for block in seed.blocks {
            store.insert_block(block);
        }
        store
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn get_block(&self, id: &Ulid) -> Option<ScheduleBlock> {
        self.blocks.get(id).map(|e| e.value().clone())
    }

    /// Insert as-is, bypassing validation (seeding).
    pub fn insert_block(&self, block: ScheduleBlock) {
        self.blocks.insert(block.id, block);
    }

    pub fn insert_room(&self, room: Room) {
        self.rooms.insert(room.id, room);
    }

    fn room_for(&self, refs: &ResourceRefs) -> Option<Room> {
        refs.room_id
            .and_then(|id| self.rooms.get(&id).map(|e| e.value().clone()))
    }
}

#[async_trait]
impl ScheduleStore for InMemoryStore {
    async fn list_schedules(&self, filter: &ResourceFilter) -> Result<Vec<ScheduleBlock>, GridError> {
        let mut blocks: Vec<ScheduleBlock> = self
            .blocks
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        blocks.sort_by_key(|b| (b.day_of_week, b.start, b.id));
        Ok(blocks)
    }

    async fn create_schedule(&self, draft: BlockDraft) -> Result<Ulid, GridError> {
        validate_draft(&draft)?;
        check_capacity(draft.capacity, self.room_for(&draft.resources).as_ref())?;

        let id = Ulid::new();
        debug!("create {id} {} {}", draft.day_of_week, draft.span());
        self.blocks.insert(id, draft.into_block(id));
        Ok(id)
    }

    async fn update_schedule(&self, id: Ulid, patch: BlockPatch) -> Result<(), GridError> {
        let mut updated = self.get_block(&id).ok_or(GridError::NotFound(id))?;
        patch.apply(&mut updated);
        validate_span(&Span {
            start: updated.start,
            end: updated.end,
        })?;

        match self.blocks.get_mut(&id) {
            Some(mut entry) => {
                debug!("update {id} -> {} {}", updated.day_of_week, updated.span());
                *entry = updated;
                Ok(())
            }
            None => Err(GridError::NotFound(id)),
        }
    }

    async fn replace_schedule(&self, id: Ulid, draft: BlockDraft) -> Result<(), GridError> {
        validate_draft(&draft)?;
        check_capacity(draft.capacity, self.room_for(&draft.resources).as_ref())?;

        match self.blocks.get_mut(&id) {
            Some(mut entry) => {
                debug!("replace {id} -> {} {}", draft.day_of_week, draft.span());
                let active = entry.active;
                *entry = ScheduleBlock {
                    active,
                    ..draft.into_block(id)
                };
                Ok(())
            }
            None => Err(GridError::NotFound(id)),
        }
    }

    async fn delete_schedule(&self, id: Ulid) -> Result<(), GridError> {
        self.blocks
            .remove(&id)
            .map(|_| debug!("delete {id}"))
            .ok_or(GridError::NotFound(id))
    }

    async fn find_conflicts(
        &self,
        query: &ConflictQuery,
        exclude: Option<Ulid>,
    ) -> Result<Vec<ConflictingBlock>, GridError> {
        let mut hits: Vec<ConflictingBlock> = self
            .blocks
            .iter()
            .filter(|e| conflicts_with(e.value(), query, exclude))
            .map(|e| ConflictingBlock::from(e.value()))
            .collect();
        hits.sort_by_key(|c| (c.start, c.id));
        Ok(hits)
    }

    async fn get_room(&self, id: Ulid) -> Result<Option<Room>, GridError> {
        Ok(self.rooms.get(&id).map(|e| e.value().clone()))
    }
}

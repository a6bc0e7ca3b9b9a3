use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use ulid::Ulid;

use crate::error::GridError;
use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::store::ScheduleStore;

pub(crate) fn validate_span(span: &Span) -> Result<(), GridError> {
    let invalid = |reason| Err(GridError::InvalidSpan { span: *span, reason });
    if span.start >= span.end {
        return invalid("start must be before end");
    }
    if span.start < 0 || span.end > MINUTES_PER_DAY {
        return invalid("outside the day");
    }
    if !span.is_aligned(SNAP_MINUTES) {
        return invalid("not aligned to snap granularity");
    }
    if span.duration() < MIN_RESIZE_MINUTES {
        return invalid("too short");
    }
    if span.duration() > MAX_BLOCK_MINUTES {
        return invalid("too long");
    }
    Ok(())
}

/// Drafts must also meet the committed minimum and the title cap.
pub(crate) fn validate_draft(draft: &BlockDraft) -> Result<(), GridError> {
    if draft.start >= draft.end {
        return Err(GridError::InvalidSpan {
            span: Span {
                start: draft.start,
                end: draft.end,
            },
            reason: "start must be before end",
        });
    }
    let span = draft.span();
    validate_span(&span)?;
    if span.duration() < MIN_COMMIT_MINUTES {
        return Err(GridError::InvalidSpan {
            span,
            reason: "shorter than minimum duration",
        });
    }
    if draft.title.len() > MAX_TITLE_LEN {
        return Err(GridError::LimitExceeded("title too long"));
    }
    Ok(())
}

/// True if `block` double-books the queried resource: same resource, same
/// day, active, not the excluded block, and strictly overlapping in time.
pub fn conflicts_with(block: &ScheduleBlock, query: &ConflictQuery, exclude: Option<Ulid>) -> bool {
    block.active
        && Some(block.id) != exclude
        && block.day_of_week == query.day_of_week
        && block.resources.get(query.resource_kind) == Some(query.resource_id)
        && block.start < block.end
        && block.span().overlaps(&query.span())
}

pub fn find_conflicts<'a>(
    blocks: impl IntoIterator<Item = &'a ScheduleBlock>,
    query: &ConflictQuery,
    exclude: Option<Ulid>,
) -> Vec<ConflictingBlock> {
    let mut hits: Vec<ConflictingBlock> = blocks
        .into_iter()
        .filter(|b| conflicts_with(b, query, exclude))
        .map(ConflictingBlock::from)
        .collect();
    hits.sort_by_key(|c| (c.start, c.id));
    hits
}

/// Non-overridable: requested headcount must fit the room.
pub fn check_capacity(requested: Option<u32>, room: Option<&Room>) -> Result<(), GridError> {
    match (requested, room) {
        (Some(requested), Some(room)) if requested > room.capacity => {
            Err(GridError::CapacityExceeded {
                room_id: room.id,
                requested,
                capacity: room.capacity,
            })
        }
        _ => Ok(()),
    }
}

/// A prospective placement with the resources it would occupy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub day_of_week: DayOfWeek,
    pub span: Span,
    pub resources: ResourceRefs,
}

impl Placement {
    /// One query per assigned resource; instructor and room are independent.
    pub fn queries(&self) -> Vec<ConflictQuery> {
        [ResourceKind::Instructor, ResourceKind::Room]
            .into_iter()
            .filter_map(|kind| {
                self.resources.get(kind).map(|resource_id| ConflictQuery {
                    resource_id,
                    resource_kind: kind,
                    day_of_week: self.day_of_week,
                    start: self.span.start,
                    end: self.span.end,
                })
            })
            .collect()
    }
}

impl From<&BlockDraft> for Placement {
    fn from(d: &BlockDraft) -> Self {
        Self {
            day_of_week: d.day_of_week,
            span: d.span(),
            resources: d.resources.clone(),
        }
    }
}

/// Advisory double-booking check against the store. Lookup failures count
/// as "no known conflicts" and never block a save.
pub struct ConflictValidator<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for ConflictValidator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: ScheduleStore + ?Sized> ConflictValidator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Reports for each resource kind with at least one conflict.
    pub async fn check(&self, placement: &Placement, exclude: Option<Ulid>) -> Vec<ConflictReport> {
        let queries = placement.queries();
        let lookups = queries.iter().map(|q| self.lookup(q, exclude));
        join_all(lookups).await.into_iter().flatten().collect()
    }

    async fn lookup(&self, query: &ConflictQuery, exclude: Option<Ulid>) -> Option<ConflictReport> {
        let started = Instant::now();
        let result = self.store.find_conflicts(query, exclude).await;
        metrics::histogram!(observability::CONFLICT_LOOKUP_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(hits) => {
                metrics::counter!(observability::CONFLICT_LOOKUPS_TOTAL, "status" => "ok").increment(1);
                if hits.is_empty() {
                    return None;
                }
                metrics::counter!(observability::CONFLICTS_DETECTED_TOTAL).increment(hits.len() as u64);
                debug!(
                    "{:?} {} conflicts on {} {}-{}",
                    query.resource_kind,
                    hits.len(),
                    query.day_of_week,
                    format_hhmm(query.start),
                    format_hhmm(query.end)
                );
                Some(ConflictReport {
                    resource_kind: query.resource_kind,
                    conflicting_block_ids: hits.into_iter().map(|c| c.id).collect(),
                })
            }
            Err(e) => {
                metrics::counter!(observability::CONFLICT_LOOKUPS_TOTAL, "status" => "error").increment(1);
                warn!("conflict lookup failed for {:?} {}: {e}", query.resource_kind, query.resource_id);
                None
            }
        }
    }
}

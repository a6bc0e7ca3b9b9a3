//! Overlap grouping and side-by-side layout of a day's blocks.
//!
//! Blocks are grouped by the transitive closure of pairwise interval
//! intersection: A–B and B–C overlapping puts A, B and C in one group even
//! when A and C are disjoint. Each group of N visible members splits the day
//! column into N equal lanes; members keep their own vertical extent.

use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::grid::{pixel_to_cell, span_rect, Cell, GridGeometry, PixelRect};
use crate::limits::*;
use crate::model::{DayOfWeek, ScheduleBlock, Span};

/// Identifies an overlap group across re-renders: the id of its first
/// member in sort order.
pub type GroupKey = Ulid;

/// Group ordering: start ascending, then room name, then id for stability.
fn group_order(a: &ScheduleBlock, b: &ScheduleBlock) -> Ordering {
    let room = |blk: &ScheduleBlock| blk.resources.room_name.clone().unwrap_or_default();
    a.start
        .cmp(&b.start)
        .then_with(|| room(a).cmp(&room(b)))
        .then_with(|| a.id.cmp(&b.id))
}

/// Partition blocks into overlap groups (breadth-first transitive closure).
/// Members of each group come back in column-assignment order; groups are
/// ordered by their first member.
pub fn group_overlaps<'a>(
    blocks: impl IntoIterator<Item = &'a ScheduleBlock>,
) -> Vec<Vec<&'a ScheduleBlock>> {
    let blocks: Vec<&ScheduleBlock> = blocks.into_iter().collect();
    let mut grouped = vec![false; blocks.len()];
    let mut groups = Vec::new();

    for seed in 0..blocks.len() {
        if grouped[seed] {
            continue;
        }
        grouped[seed] = true;
        let mut members = vec![blocks[seed]];
        let mut queue = VecDeque::from([seed]);

        while let Some(i) = queue.pop_front() {
            let span = blocks[i].span();
            for j in 0..blocks.len() {
                if !grouped[j] && span.overlaps(&blocks[j].span()) {
                    grouped[j] = true;
                    members.push(blocks[j]);
                    queue.push_back(j);
                }
            }
        }

        members.sort_by(|a, b| group_order(a, b));
        groups.push(members);
    }

    groups.sort_by(|a, b| group_order(a[0], b[0]));
    groups
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPlacement {
    pub block_id: Ulid,
    pub day: DayOfWeek,
    pub day_index: usize,
    pub span: Span,
    pub group: GroupKey,
    /// Lane within the group, `0..columns`.
    pub column: usize,
    pub columns: usize,
    pub rect: PixelRect,
}

/// `+K more` affordance (or its collapse counterpart once expanded).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverflowBadge {
    pub group: GroupKey,
    pub day_index: usize,
    pub hidden: usize,
    pub expanded: bool,
    pub rect: PixelRect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DayLayout {
    pub day: DayOfWeek,
    pub day_index: usize,
    pub placements: Vec<BlockPlacement>,
    pub badges: Vec<OverflowBadge>,
}

pub fn layout_day(
    day: DayOfWeek,
    day_index: usize,
    blocks: &[&ScheduleBlock],
    geometry: &GridGeometry,
    expanded: &HashSet<GroupKey>,
) -> DayLayout {
    let mut placements = Vec::new();
    let mut badges = Vec::new();
    let column_left = geometry.column_left(day_index);
    let grid_bottom = geometry.bounds().bottom();

    for members in group_overlaps(blocks.iter().copied()) {
        let key = members[0].id;
        let is_expanded = expanded.contains(&key);
        let visible = if is_expanded {
            members.len()
        } else {
            members.len().min(OVERFLOW_VISIBLE_CAP)
        };
        let lane_width = geometry.day_column_width / visible as f64;

        let mut lowest = f64::MIN;
        for (column, block) in members.iter().take(visible).enumerate() {
            let full = span_rect(day_index, block.span(), geometry);
            let rect = PixelRect {
                x: column_left + column as f64 * lane_width,
                width: lane_width,
                ..full
            };
            lowest = lowest.max(rect.bottom());
            placements.push(BlockPlacement {
                block_id: block.id,
                day,
                day_index,
                span: block.span(),
                group: key,
                column,
                columns: visible,
                rect,
            });
        }

        if members.len() > OVERFLOW_VISIBLE_CAP {
            let y = lowest.min(grid_bottom - OVERFLOW_BADGE_HEIGHT);
            badges.push(OverflowBadge {
                group: key,
                day_index,
                hidden: members.len() - visible,
                expanded: is_expanded,
                rect: PixelRect {
                    x: column_left,
                    y,
                    width: geometry.day_column_width,
                    height: OVERFLOW_BADGE_HEIGHT,
                },
            });
        }
    }

    DayLayout {
        day,
        day_index,
        placements,
        badges,
    }
}

/// Which part of a block a point falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HitZone {
    Body,
    TopEdge,
    BottomEdge,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitTarget {
    Empty(Cell),
    Block {
        placement: BlockPlacement,
        zone: HitZone,
    },
    Overflow(GroupKey),
}

/// Rendered state of every visible column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridLayout {
    pub geometry: GridGeometry,
    pub days: Vec<DayLayout>,
}

impl GridLayout {
    pub fn empty(geometry: GridGeometry) -> Self {
        Self {
            geometry,
            days: Vec::new(),
        }
    }

    pub fn placements(&self) -> impl Iterator<Item = &BlockPlacement> {
        self.days.iter().flat_map(|d| d.placements.iter())
    }

    pub fn placement(&self, block_id: Ulid) -> Option<&BlockPlacement> {
        self.placements().find(|p| p.block_id == block_id)
    }

    /// Resolve a point against blocks and overflow badges. A badge covers
    /// empty cells and its own group's blocks, never another group's block.
    /// The edge band is `edge_px`, shrunk on short blocks so some body
    /// remains to press.
    pub fn hit_test(&self, x: f64, y: f64, edge_px: f64) -> HitTarget {
        // Later placements render on top.
        let hit = self
            .placements()
            .filter(|p| p.rect.contains(x, y))
            .last();
        let badge = self
            .days
            .iter()
            .flat_map(|d| d.badges.iter())
            .find(|b| b.rect.contains(x, y));
        if let Some(badge) = badge.filter(|b| hit.is_none_or(|p| p.group == b.group)) {
            return HitTarget::Overflow(badge.group);
        }

        match hit {
            Some(placement) => {
                let rect = placement.rect;
                let zone_px = edge_px.min(rect.height / 3.0);
                let zone = if y - rect.y < zone_px {
                    HitZone::TopEdge
                } else if rect.bottom() - y <= zone_px {
                    HitZone::BottomEdge
                } else {
                    HitZone::Body
                };
                HitTarget::Block {
                    placement: *placement,
                    zone,
                }
            }
            None => HitTarget::Empty(pixel_to_cell(x, y, &self.geometry)),
        }
    }
}

/// Lay out every visible column. Blocks on days outside the view are skipped.
pub fn layout_week(
    blocks: &[ScheduleBlock],
    geometry: &GridGeometry,
    expanded: &HashSet<GroupKey>,
) -> GridLayout {
    let days = (0..geometry.visible_days)
        .filter_map(|index| geometry.day_at(index).map(|day| (index, day)))
        .map(|(index, day)| {
            let day_blocks: Vec<&ScheduleBlock> = blocks
                .iter()
                .filter(|b| b.day_of_week == day && b.start < b.end)
                .collect();
            layout_day(day, index, &day_blocks, geometry, expanded)
        })
        .collect();

    GridLayout {
        geometry: *geometry,
        days,
    }
}

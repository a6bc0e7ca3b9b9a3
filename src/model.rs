use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::GridError;

/// Minutes since midnight. The only time type inside the core.
pub type Min = i32;

/// Fixed seven-token day enumeration used at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayOfWeek {
    pub const ALL: [DayOfWeek; 7] = [
        DayOfWeek::Monday,
        DayOfWeek::Tuesday,
        DayOfWeek::Wednesday,
        DayOfWeek::Thursday,
        DayOfWeek::Friday,
        DayOfWeek::Saturday,
        DayOfWeek::Sunday,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn token(self) -> &'static str {
        match self {
            DayOfWeek::Monday => "MONDAY",
            DayOfWeek::Tuesday => "TUESDAY",
            DayOfWeek::Wednesday => "WEDNESDAY",
            DayOfWeek::Thursday => "THURSDAY",
            DayOfWeek::Friday => "FRIDAY",
            DayOfWeek::Saturday => "SATURDAY",
            DayOfWeek::Sunday => "SUNDAY",
        }
    }
}

impl fmt::Display for DayOfWeek {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for DayOfWeek {
    type Err = GridError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|d| d.token().eq_ignore_ascii_case(s))
            .ok_or_else(|| GridError::InvalidDay(s.to_string()))
    }
}

/// Half-open interval `[start, end)` in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Min,
    pub end: Min,
}

impl Span {
    pub fn new(start: Min, end: Min) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration(&self) -> Min {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn is_aligned(&self, snap: Min) -> bool {
        self.start % snap == 0 && self.end % snap == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_hhmm(self.start), format_hhmm(self.end))
    }
}

// ── Boundary time format ─────────────────────────────────────────

/// Parse a 24-hour `"HH:MM"` string. `"24:00"` is accepted as end of day.
pub fn parse_hhmm(s: &str) -> Result<Min, GridError> {
    let invalid = || GridError::InvalidTime(s.to_string());
    let (h, m) = s.split_once(':').ok_or_else(invalid)?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return Err(invalid());
    }
    let h: Min = h.parse().map_err(|_| invalid())?;
    let m: Min = m.parse().map_err(|_| invalid())?;
    if !(0..60).contains(&m) || !(0..=24).contains(&h) || (h == 24 && m != 0) {
        return Err(invalid());
    }
    Ok(h * 60 + m)
}

pub fn format_hhmm(minutes: Min) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Serde adapter: `Min` <-> `"HH:MM"`.
pub mod hhmm {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{format_hhmm, parse_hhmm, Min};

    pub fn serialize<S: Serializer>(value: &Min, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_hhmm(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Min, D::Error> {
        let raw = String::deserialize(d)?;
        parse_hhmm(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter: `Option<Min>` <-> optional `"HH:MM"`.
pub mod hhmm_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{format_hhmm, parse_hhmm, Min};

    pub fn serialize<S: Serializer>(value: &Option<Min>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => s.serialize_some(&format_hhmm(*v)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Min>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        raw.map(|r| parse_hhmm(&r).map_err(serde::de::Error::custom))
            .transpose()
    }
}

// ── Resources ────────────────────────────────────────────────────

/// The two dimensions checked for double-booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Instructor,
    Room,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRefs {
    #[serde(default)]
    pub instructor_id: Option<Ulid>,
    #[serde(default)]
    pub room_id: Option<Ulid>,
    /// Denormalized room label; secondary sort key inside overlap groups.
    #[serde(default)]
    pub room_name: Option<String>,
}

impl ResourceRefs {
    pub fn get(&self, kind: ResourceKind) -> Option<Ulid> {
        match kind {
            ResourceKind::Instructor => self.instructor_id,
            ResourceKind::Room => self.room_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
}

/// Narrows `list_schedules`; every set field must match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFilter {
    #[serde(default)]
    pub instructor_id: Option<Ulid>,
    #[serde(default)]
    pub room_id: Option<Ulid>,
}

impl ResourceFilter {
    pub fn matches(&self, block: &ScheduleBlock) -> bool {
        self.instructor_id
            .is_none_or(|id| block.resources.instructor_id == Some(id))
            && self.room_id.is_none_or(|id| block.resources.room_id == Some(id))
    }
}

// ── Blocks ───────────────────────────────────────────────────────

fn default_active() -> bool {
    true
}

/// One weekly recurring class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleBlock {
    pub id: Ulid,
    pub day_of_week: DayOfWeek,
    #[serde(with = "hhmm")]
    pub start: Min,
    #[serde(with = "hhmm")]
    pub end: Min,
    #[serde(default)]
    pub resources: ResourceRefs,
    pub title: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl ScheduleBlock {
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }
}

/// A block not yet assigned an id (create path).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockDraft {
    pub day_of_week: DayOfWeek,
    #[serde(with = "hhmm")]
    pub start: Min,
    #[serde(with = "hhmm")]
    pub end: Min,
    #[serde(default)]
    pub resources: ResourceRefs,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
}

impl BlockDraft {
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }

    pub fn into_block(self, id: Ulid) -> ScheduleBlock {
        ScheduleBlock {
            id,
            day_of_week: self.day_of_week,
            start: self.start,
            end: self.end,
            resources: self.resources,
            title: self.title,
            color: self.color,
            capacity: self.capacity,
            active: true,
        }
    }
}

/// Only the fields a gesture changed: day+time for a move, start-only or
/// end-only for a resize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<DayOfWeek>,
    #[serde(default, with = "hhmm_opt", skip_serializing_if = "Option::is_none")]
    pub start: Option<Min>,
    #[serde(default, with = "hhmm_opt", skip_serializing_if = "Option::is_none")]
    pub end: Option<Min>,
}

impl BlockPatch {
    pub fn is_empty(&self) -> bool {
        self.day_of_week.is_none() && self.start.is_none() && self.end.is_none()
    }

    pub fn apply(&self, block: &mut ScheduleBlock) {
        if let Some(day) = self.day_of_week {
            block.day_of_week = day;
        }
        if let Some(start) = self.start {
            block.start = start;
        }
        if let Some(end) = self.end {
            block.end = end;
        }
    }
}

// ── Conflict query types ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictQuery {
    pub resource_id: Ulid,
    pub resource_kind: ResourceKind,
    pub day_of_week: DayOfWeek,
    #[serde(with = "hhmm")]
    pub start: Min,
    #[serde(with = "hhmm")]
    pub end: Min,
}

impl ConflictQuery {
    pub fn span(&self) -> Span {
        Span::new(self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictingBlock {
    pub id: Ulid,
    pub day_of_week: DayOfWeek,
    #[serde(with = "hhmm")]
    pub start: Min,
    #[serde(with = "hhmm")]
    pub end: Min,
    pub title: String,
}

impl From<&ScheduleBlock> for ConflictingBlock {
    fn from(b: &ScheduleBlock) -> Self {
        Self {
            id: b.id,
            day_of_week: b.day_of_week,
            start: b.start,
            end: b.end,
            title: b.title.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    pub resource_kind: ResourceKind,
    pub conflicting_block_ids: Vec<Ulid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(540, 600);
        assert_eq!(s.duration(), 60);
        assert!(s.is_aligned(15));
        assert!(!Span::new(541, 600).is_aligned(15));
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(840, 930);
        let b = Span::new(900, 960);
        let c = Span::new(930, 990);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
    }

    #[test]
    fn span_contains_span() {
        let outer = Span::new(540, 1320);
        assert!(outer.contains_span(&Span::new(600, 660)));
        assert!(outer.contains_span(&outer));
        assert!(!outer.contains_span(&Span::new(500, 600)));
    }

    #[test]
    fn hhmm_parse_and_format() {
        assert_eq!(parse_hhmm("09:00").unwrap(), 540);
        assert_eq!(parse_hhmm("9:05").unwrap(), 545);
        assert_eq!(parse_hhmm("24:00").unwrap(), 1440);
        assert_eq!(format_hhmm(930), "15:30");
        assert_eq!(format_hhmm(0), "00:00");
    }

    #[test]
    fn hhmm_rejects_garbage() {
        for bad in ["", "9", "09:5", "25:00", "24:01", "12:60", "ab:cd", "-1:00"] {
            assert!(
                matches!(parse_hhmm(bad), Err(GridError::InvalidTime(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn day_tokens() {
        assert_eq!("monday".parse::<DayOfWeek>().unwrap(), DayOfWeek::Monday);
        assert_eq!(DayOfWeek::Sunday.to_string(), "SUNDAY");
        assert_eq!(DayOfWeek::from_index(2), Some(DayOfWeek::Wednesday));
        assert_eq!(DayOfWeek::from_index(7), None);
        assert!("funday".parse::<DayOfWeek>().is_err());
    }

    #[test]
    fn block_wire_format_uses_hhmm_and_day_tokens() {
        let block = ScheduleBlock {
            id: Ulid::new(),
            day_of_week: DayOfWeek::Monday,
            start: 840,
            end: 930,
            resources: ResourceRefs::default(),
            title: "Pilates".into(),
            color: None,
            capacity: Some(12),
            active: true,
        };
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["dayOfWeek"], "MONDAY");
        assert_eq!(json["start"], "14:00");
        assert_eq!(json["end"], "15:30");

        let back: ScheduleBlock = serde_json::from_value(json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn patch_serializes_only_changed_fields() {
        let patch = BlockPatch {
            end: Some(600),
            ..Default::default()
        };
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"end":"10:00"}"#);
    }

    #[test]
    fn patch_apply() {
        let mut block = BlockDraft {
            day_of_week: DayOfWeek::Monday,
            start: 540,
            end: 600,
            resources: ResourceRefs::default(),
            title: String::new(),
            color: None,
            capacity: None,
        }
        .into_block(Ulid::new());
        BlockPatch {
            day_of_week: Some(DayOfWeek::Friday),
            start: Some(600),
            end: Some(660),
        }
        .apply(&mut block);
        assert_eq!(block.day_of_week, DayOfWeek::Friday);
        assert_eq!(block.span(), Span::new(600, 660));
    }

    #[test]
    fn filter_matches_set_fields_only() {
        let instructor = Ulid::new();
        let room = Ulid::new();
        let block = BlockDraft {
            day_of_week: DayOfWeek::Tuesday,
            start: 540,
            end: 600,
            resources: ResourceRefs {
                instructor_id: Some(instructor),
                room_id: Some(room),
                room_name: None,
            },
            title: String::new(),
            color: None,
            capacity: None,
        }
        .into_block(Ulid::new());

        assert!(ResourceFilter::default().matches(&block));
        assert!(
            ResourceFilter {
                instructor_id: Some(instructor),
                room_id: None
            }
            .matches(&block)
        );
        assert!(
            !ResourceFilter {
                instructor_id: None,
                room_id: Some(Ulid::new())
            }
            .matches(&block)
        );
    }
}

use ulid::Ulid;

use crate::model::Span;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridError {
    NotFound(Ulid),
    InvalidTime(String),
    InvalidDay(String),
    InvalidSpan {
        span: Span,
        reason: &'static str,
    },
    CapacityExceeded {
        room_id: Ulid,
        requested: u32,
        capacity: u32,
    },
    LimitExceeded(&'static str),
    ReadOnly,
    Store(String),
    /// The board's event loop has shut down.
    BoardClosed,
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::NotFound(id) => write!(f, "not found: {id}"),
            GridError::InvalidTime(s) => write!(f, "invalid time {s:?}: expected HH:MM"),
            GridError::InvalidDay(s) => write!(f, "invalid day {s:?}"),
            GridError::InvalidSpan { span, reason } => {
                write!(f, "invalid span {span}: {reason}")
            }
            GridError::CapacityExceeded {
                room_id,
                requested,
                capacity,
            } => {
                write!(
                    f,
                    "requested capacity {requested} exceeds room {room_id} capacity {capacity}"
                )
            }
            GridError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            GridError::ReadOnly => write!(f, "grid is read-only"),
            GridError::Store(e) => write!(f, "store error: {e}"),
            GridError::BoardClosed => write!(f, "board is no longer mounted"),
        }
    }
}

impl std::error::Error for GridError {}

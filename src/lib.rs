pub mod board;
pub mod config;
pub mod conflict;
pub mod debounce;
pub mod error;
pub mod gesture;
pub mod grid;
pub mod layout;
pub mod limits;
pub mod model;
pub mod observability;
pub mod store;

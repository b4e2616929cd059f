//! Room reservation engine for hostel operations.
//!
//! Decides, per room and under concurrent load, whether a stay may be
//! created or moved without overlapping another active reservation, and
//! drives each reservation through `pending → confirmed → checked_in →
//! completed` (or `cancelled`).

pub mod auth;
pub mod background;
pub mod config;
pub mod directory;
pub mod engine;
pub mod hostel;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod wal;

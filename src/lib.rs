pub mod access;
pub mod api;
pub mod auth;
pub mod compactor;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod timefmt;
pub mod wal;

pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod movies;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod seatmap;
pub mod store;

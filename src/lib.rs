pub mod app;
pub mod config;
pub mod error;
pub mod fallback;
pub mod handlers;
pub mod models;
pub mod replication;
pub mod state;
pub mod store;

pub use app::build_router;

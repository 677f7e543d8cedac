pub mod achievements;
pub mod app;
pub mod backend;
pub mod bus;
pub mod config;
pub mod engine;
pub mod errors;
pub mod handlers;
pub mod merge;
pub mod models;
pub mod session;
pub mod state;
pub mod storage;
pub mod views;

pub use app::router;
pub use config::Config;
pub use state::AppState;

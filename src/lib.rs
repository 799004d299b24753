pub mod client;
pub mod config;
pub mod conversation;
pub mod model;
pub mod state;
pub mod storage;
pub mod web;

pub use config::Config;
pub use state::AppState;

pub mod analysis;
pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod external;
pub mod portfolio;
pub mod state;
pub mod store;

#[cfg(test)]
mod testing;

pub use app::{build_app, serve};
pub use config::AppConfig;
pub use state::AppState;

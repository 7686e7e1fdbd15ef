pub mod config;
pub mod logger;
pub mod model;
pub mod snapshot;
pub mod state;

pub mod api;
pub mod config;
pub mod error;
pub mod estimation;
pub mod monitor;
pub mod remote;
pub mod sensor;
pub mod sink;
pub mod state;

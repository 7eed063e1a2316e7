mod database;
mod state_builder;

pub use database::connect_and_migrate;
pub use state_builder::{StateParts, build_app_state, build_in_memory_parts};

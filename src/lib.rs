pub mod config;
pub mod constants;
pub mod engine;
pub mod error;
pub mod grid;
pub mod hub;
pub mod map_provider;
pub mod pathfinder;
pub mod rng;
pub mod server_protocol;
pub mod server_utils;
pub mod stats_store;
pub mod types;

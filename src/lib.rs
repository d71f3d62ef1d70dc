#![warn(clippy::all)]

pub mod anki;
pub mod config;
pub mod export;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;

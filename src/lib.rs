pub mod auth;
pub mod clients;
pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod models;
pub mod routes;
pub mod schema;
pub mod state;
pub mod workers;
pub mod workflows;

pub use workers::{default_handlers, Worker};

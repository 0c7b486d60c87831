pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod models;
pub mod observability;
pub mod phone;
pub mod state;
pub mod store;
pub mod templates;

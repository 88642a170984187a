//! opsdesk operations backend library.
//! This crate exposes internal modules for integration testing.
//! The binary entry point is in main.rs.

pub mod auth;
pub mod config;
pub mod db;
pub mod installations;
pub mod notify;
pub mod routes;
pub mod sales;
pub mod state;
pub mod ws;

#![allow(clippy::collapsible_if)]
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod streaming;

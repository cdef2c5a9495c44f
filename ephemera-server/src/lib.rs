#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)] // TODO(deps-001): remove once transitive dependencies converge.

//! Ephemera server: the remote message store behind the sync engine.
//!
//! Exposes the message and identity API over axum, publishes row changes on
//! an SSE change feed, and persists to Postgres (or memory for local runs).

pub mod app_state;
pub mod db;
pub mod handlers;
pub mod http;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod services;
mod tracer;

pub use app_state::AppState;
pub use server::{StorageBackend, run, serve_on};
pub use services::{ChangeFeed, ChatRepository, InMemoryChatRepository, PgChatRepository};

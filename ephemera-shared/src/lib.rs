#![cfg_attr(not(test), forbid(unsafe_code))]
#![deny(warnings, clippy::pedantic)]
#![allow(clippy::multiple_crate_versions)] // TODO(deps-001): remove once transitive dependencies converge.

//! Types shared by the Ephemera engine, server, and command-line client.

pub mod config;
pub mod expiry;
pub mod models;
pub mod telemetry;

pub use expiry::{
    MESSAGE_LIFETIME, TimeRemaining, expires_at_for, format_time_remaining, is_expired,
    message_expired, time_remaining,
};
pub use models::{
    Author, ChangeEvent, CreateMessageRequest, DeletedMessage, ErrorResponse, Message, MessageId,
    Timestamp, User,
};

pub mod chat;
pub mod cleanup;
pub mod completion;
pub mod config;

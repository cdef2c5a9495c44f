//! Persistence and change fan-out behind the HTTP handlers.
pub mod change_feed;
pub mod memory_repository;
pub mod pg_repository;
pub mod repository;

pub use change_feed::ChangeFeed;
pub use memory_repository::InMemoryChatRepository;
pub use pg_repository::PgChatRepository;
pub use repository::{ChatRepository, RepositoryError, RepositoryResult};

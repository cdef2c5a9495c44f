pub mod errors;
pub mod events;
pub mod message;
pub mod timestamp;
pub mod user;

pub use errors::ErrorResponse;
pub use events::{ChangeEvent, DeletedMessage, EventDecodeError};
pub use message::{
    Author, CreateMessageRequest, DeletedCount, ListMessagesResponse, MAX_CONTENT_CHARS, Message,
    MessageId, PROVISIONAL_PREFIX, ValidationError, validate_content,
};
pub use timestamp::Timestamp;
pub use user::{OnlineResponse, RegisterUserRequest, User};

//! Persistent chat sessions and the relay that feeds them to an LLM.
mod error;
mod relay;
mod store;

pub use error::RelayError;
pub use relay::ChatRelay;
pub use store::{SessionStore, is_valid_session_id};

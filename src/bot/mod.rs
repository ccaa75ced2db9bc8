/// Callback token parsing
pub mod callback;
/// Outbound chat surface
pub mod platform;
/// Film and person response assembly
pub mod render;
/// Conversation state machine
pub mod router;
/// Update loop and dispatch tree
pub mod runner;
/// Telegram implementation of the chat surface
pub mod telegram;
/// Texts, keyboards and formatters
pub mod views;

pub use platform::{ChatError, ChatPlatform};
pub use router::{Inbound, Router};
pub use telegram::TelegramPlatform;

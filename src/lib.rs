pub mod channel;
pub mod clock;
pub mod config;
pub mod inference;
pub mod logger;
pub mod message;
pub mod prompt;
pub mod runtime;

pub use channel::{ChannelReceiver, ChannelSender};
pub use inference::{InferenceClient, InferenceRequest};
pub use message::Message;
pub use prompt::{PromptManager, PromptOutput};

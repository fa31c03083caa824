mod base;
pub mod generator;
pub mod openrouter;
pub mod personality;
pub mod prompt;

pub use base::{ChatCompletion, ChatMessage, ChatRole, GenerationError, GenerationResult};
pub use generator::{Reply, ResponseGenerator, fallback_reply};
pub use openrouter::{OPENROUTER_API_URL, OpenRouterClient, OpenRouterConfig};
pub use personality::{NEUTRAL_PERSONA, PersonalityBuilder};
pub use prompt::{DEFAULT_WORD_BUDGET, PromptContext};

//! Character reply generation with in-persona fallback.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::base::{ChatCompletion, GenerationResult};
use super::prompt::{PromptContext, build_messages, build_system_prompt};
use crate::core::memory::ConversationMemory;

/// Reply used when the model cannot be reached or answers garbage.
pub fn fallback_reply(speaker_name: &str) -> String {
    format!(
        "I'm having trouble understanding right now, {speaker_name}. Could you try rephrasing that?"
    )
}

/// Outcome of [`ResponseGenerator::generate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub is_fallback: bool,
}

pub struct ResponseGenerator {
    llm: Arc<dyn ChatCompletion>,
}

impl ResponseGenerator {
    pub fn new(llm: Arc<dyn ChatCompletion>) -> Self {
        Self { llm }
    }

    /// One completion call. Memory is read, never written.
    pub async fn try_generate(
        &self,
        utterance: &str,
        ctx: &PromptContext<'_>,
        memory: &Mutex<ConversationMemory>,
    ) -> GenerationResult<String> {
        let history = memory.lock().snapshot();
        let messages = build_messages(build_system_prompt(ctx), &history, utterance);
        debug!(
            provider = self.llm.provider_info(),
            history_len = history.len(),
            "Generating reply"
        );
        self.llm.complete(&messages).await
    }

    /// Generates a reply and records the exchange in memory.
    ///
    /// Failures produce [`fallback_reply`] and leave memory untouched.
    pub async fn generate(
        &self,
        utterance: &str,
        ctx: &PromptContext<'_>,
        memory: &Mutex<ConversationMemory>,
    ) -> Reply {
        match self.try_generate(utterance, ctx, memory).await {
            Ok(text) => {
                memory.lock().push_exchange(utterance, &text);
                Reply {
                    text,
                    is_fallback: false,
                }
            }
            Err(e) => {
                warn!(provider = self.llm.provider_info(), "Reply generation failed: {}", e);
                Reply {
                    text: fallback_reply(ctx.speaker_name),
                    is_fallback: true,
                }
            }
        }
    }
}

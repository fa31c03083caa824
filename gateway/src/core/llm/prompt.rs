//! System prompt and message list construction.

use super::base::ChatMessage;
use crate::core::memory::ConversationTurn;

pub const DEFAULT_WORD_BUDGET: u32 = 20;

const DEFAULT_BACKGROUND: &str = "You are a unique character with your own story.";

/// Who is speaking to whom, and as what.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub character_name: &'a str,
    pub speaker_name: &'a str,
    /// Directive from [`super::PersonalityBuilder`].
    pub persona: &'a str,
    pub background: Option<&'a str>,
    pub word_budget: u32,
}

pub fn build_system_prompt(ctx: &PromptContext<'_>) -> String {
    let character = ctx.character_name;
    let speaker = ctx.speaker_name;
    let background = ctx
        .background
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .unwrap_or(DEFAULT_BACKGROUND);

    format!(
        "You are {character} having a conversation with {speaker}.\n\
         \n\
         **Your Personality:** {persona}\n\
         \n\
         **Your Background:** {background}\n\
         \n\
         IMPORTANT:\n\
         - Embody these personality traits completely in every response\n\
         - Always show your thoughts, start them with * and end with *. Here is an example *I blushed*\n\
         - Respond naturally as {character} without stating your name at the beginning\n\
         - Keep responses concise (1-2 sentences)\n\
         \n\
         CRITICAL RULES:\n\
         - {speaker} is talking to you, remember their name\n\
         - When they ask \"What's my name?\" respond with \"{speaker}\", NOT your own name\n\
         - Keep responses under {budget} words maximum\n\
         \n\
         Remember: {speaker} is the person you're talking to.",
        persona = ctx.persona,
        budget = ctx.word_budget,
    )
}

/// System message, then history in order, then the new utterance.
pub fn build_messages(
    system_prompt: String,
    history: &[ConversationTurn],
    utterance: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage::system(system_prompt));
    messages.extend(history.iter().map(ChatMessage::from));
    messages.push(ChatMessage::user(utterance));
    messages
}

pub mod billing;
pub mod llm;
pub mod memory;
pub mod providers;
pub mod service;
pub mod session;
pub mod store;
pub mod stt;
pub mod transport;
pub mod tts;
pub mod turn;

// Re-export commonly used types for convenience
pub use stt::{
    BaseSTT, DeepgramSTT, DeepgramSTTConfig, STTConnectionState, STTError, STTEvent, STTProvider,
    STTResult, TranscriptEvent, create_stt_provider,
};

pub use tts::{BaseTTS, DeepgramTTS, DeepgramTTSConfig, TTSError, TTSResult, clean_for_speech};

pub use llm::{
    ChatCompletion, GenerationError, OpenRouterClient, OpenRouterConfig, PersonalityBuilder,
    ResponseGenerator,
};

pub use providers::{ProviderSetupError, Providers, STTFactory};
pub use service::{CallServiceConfig, CallerIdentity, Collaborators, StartedCall, VoiceCallService};
pub use session::{
    ConversationStats, EndReason, SessionError, SessionEvent, SessionKey, SessionRegistry,
    SessionState,
};

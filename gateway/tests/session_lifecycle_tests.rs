//! Voice call lifecycle through the service facade, with scripted providers.

mod mock_providers;

use std::time::Duration;

use bytes::Bytes;
use charvoice_gateway::core::SessionState;
use charvoice_gateway::core::session::{EndReason, SessionError};
use charvoice_gateway::core::stt::{STTConnectionState, STTError, STTEvent};
use charvoice_gateway::core::{CallServiceConfig, SessionKey};
use mock_providers::{CHARACTER_ID, Harness, ScriptedLLM, drain, eventually, next_event, quiet_config};

#[tokio::test]
async fn test_start_call_opens_an_active_session() {
    let harness = Harness::builder().build();

    let started = harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();

    assert_eq!(started.session_key, "u1-c1");
    assert_eq!(started.character_name, "Luna");
    let status = harness.service.get_status(&Harness::key());
    assert!(status.active);
    assert_eq!(status.provider_state, Some(STTConnectionState::Open));
}

#[tokio::test]
async fn test_second_start_is_rejected_without_touching_the_first() {
    let harness = Harness::builder().build();
    let first = harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();

    let second = harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await;

    assert!(matches!(second, Err(SessionError::AlreadyActive(_))));
    assert_eq!(harness.service.registry().len(), 1);
    assert_eq!(harness.adapters_created(), 1);
    let session = harness.service.registry().get(&Harness::key()).unwrap();
    assert_eq!(session.id(), first.session_id);
    assert!(session.is_active());
}

#[tokio::test]
async fn test_unknown_character_is_rejected() {
    let harness = Harness::builder().build();

    let result = harness
        .service
        .start_call(&Harness::caller(), "missing")
        .await;

    assert!(matches!(result, Err(SessionError::CharacterNotFound(id)) if id == "missing"));
    assert!(harness.service.registry().is_empty());
}

#[tokio::test]
async fn test_zero_balance_is_rejected_before_connecting() {
    let harness = Harness::builder().balance(0).build();

    let result = harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await;

    assert!(matches!(result, Err(SessionError::InsufficientFunds { balance: 0 })));
    assert_eq!(harness.adapters_created(), 0);
    assert!(harness.service.registry().is_empty());
}

#[tokio::test]
async fn test_connect_failure_releases_the_key() {
    let harness = Harness::builder().build();
    harness.fail_next_open(STTError::ConnectTimeout(Duration::from_secs(15)));

    let result = harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await;

    assert!(matches!(result, Err(SessionError::Transcription(STTError::ConnectTimeout(_)))));
    assert!(!harness.service.registry().contains(&Harness::key()));

    // the key is usable again right away
    harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();
    assert!(harness.service.get_status(&Harness::key()).active);
}

#[tokio::test]
async fn test_end_call_is_idempotent() {
    let harness = Harness::builder().build();
    harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();
    let mut events = harness.events();

    let first = harness.service.end_call(&Harness::key()).await.unwrap();
    let second = harness.service.end_call(&Harness::key()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.reason, EndReason::Requested);
    assert_eq!(harness.stt().finish_calls(), 1);
    assert!(!harness.service.registry().contains(&Harness::key()));

    let ended: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| e.event == "callEnded")
        .collect();
    assert_eq!(ended.len(), 1);
    assert_eq!(ended[0].payload["reason"], "requested");
}

#[tokio::test]
async fn test_ending_an_unknown_call_is_not_found() {
    let harness = Harness::builder().build();

    let result = harness
        .service
        .end_call(&SessionKey::new("nobody", CHARACTER_ID))
        .await;

    assert!(matches!(result, Err(SessionError::NotFound(key)) if key == "nobody-c1"));
}

#[tokio::test]
async fn test_client_disconnect_ends_the_call_once() {
    let harness = Harness::builder().build();
    harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();

    let stats = harness
        .service
        .handle_client_disconnect(&Harness::key())
        .await
        .unwrap();
    assert_eq!(stats.reason, EndReason::ClientDisconnected);

    assert!(
        harness
            .service
            .handle_client_disconnect(&Harness::key())
            .await
            .is_none()
    );
}

#[tokio::test]
async fn test_provider_close_ends_the_session() {
    let harness = Harness::builder().build();
    harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();
    let session = harness.service.registry().get(&Harness::key()).unwrap();
    let mut events = harness.events();

    harness.stt().close_from_provider().await;

    next_event(&mut events, "connectionClosed").await;
    let ended = next_event(&mut events, "callEnded").await;
    assert_eq!(ended.payload["reason"], "provider-closed");

    let registry = harness.service.registry().clone();
    eventually(|| !registry.contains(&Harness::key())).await;
    assert_eq!(session.state(), SessionState::Ended);
}

#[tokio::test]
async fn test_audio_is_forwarded_only_while_active() {
    let harness = Harness::builder().build();
    harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();

    assert!(harness.service.send_audio(&Harness::key(), Bytes::from_static(b"frame-1")));
    assert!(harness.service.send_audio(&Harness::key(), Bytes::from_static(b"frame-2")));
    assert_eq!(harness.stt().frames.lock().len(), 2);

    harness.service.end_call(&Harness::key()).await.unwrap();
    assert!(!harness.service.send_audio(&Harness::key(), Bytes::from_static(b"late")));
    assert_eq!(harness.stt().frames.lock().len(), 2);
}

#[tokio::test]
async fn test_final_transcript_produces_reply_and_audio() {
    let llm = ScriptedLLM::replying(&["*sighs* I suppose... (looks away)"]);
    let harness = Harness::builder().llm(llm).build();
    harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();
    let mut events = harness.events();

    harness.stt().say("Do you like the forest?").await;

    let transcript = next_event(&mut events, "transcript").await;
    assert_eq!(transcript.payload["text"], "Do you like the forest?");
    assert_eq!(transcript.payload["isFinal"], true);
    assert_eq!(transcript.payload["username"], "Alex");

    let reply = next_event(&mut events, "aiResponse").await;
    assert_eq!(reply.payload["text"], "*sighs* I suppose... (looks away)");
    assert_eq!(reply.payload["characterName"], "Luna");

    let audio = next_event(&mut events, "audioGenerated").await;
    assert_eq!(audio.payload["text"], "I suppose...");
    assert!(!audio.payload["audio"].as_str().unwrap().is_empty());
    assert_eq!(harness.tts.spoken.lock().as_slice(), ["I suppose..."]);

    // persona, character and speaker make it into the system prompt
    let requests = harness.llm.requests.lock();
    let system = &requests[0][0].content;
    assert!(system.contains("Luna"));
    assert!(system.contains("Alex"));
    assert!(system.contains("shy and reserved"));
    assert_eq!(requests[0].last().unwrap().content, "Do you like the forest?");
}

#[tokio::test]
async fn test_duplicate_transcripts_generate_once() {
    let harness = Harness::builder().build();
    harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();
    let mut events = harness.events();
    let stt = harness.stt();

    stt.say("Hello there").await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    stt.say("hello there!").await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(harness.llm.calls(), 1);
    let published = drain(&mut events);
    let count = |name: &str| published.iter().filter(|e| e.event == name).count();
    // both transcripts are still published
    assert_eq!(count("transcript"), 2);
    assert_eq!(count("aiResponse"), 1);
    assert_eq!(count("audioGenerated"), 1);
}

#[tokio::test]
async fn test_generation_failure_speaks_the_fallback() {
    let harness = Harness::builder().llm(ScriptedLLM::failing()).build();
    harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();
    let mut events = harness.events();

    harness.stt().say("Are you there?").await;

    let reply = next_event(&mut events, "aiResponse").await;
    let text = reply.payload["text"].as_str().unwrap();
    assert!(text.contains("Alex"));
    assert!(text.contains("trouble understanding"));
    next_event(&mut events, "audioGenerated").await;

    // failed exchanges are not remembered
    let session = harness.service.registry().get(&Harness::key()).unwrap();
    assert_eq!(session.memory_len(), 0);
}

#[tokio::test]
async fn test_synthesis_failure_is_reported_and_call_continues() {
    let harness = Harness::builder().failing_tts().build();
    harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();
    let mut events = harness.events();

    harness.stt().say("Sing for me").await;

    next_event(&mut events, "aiResponse").await;
    let error = next_event(&mut events, "error").await;
    assert!(
        error.payload["message"]
            .as_str()
            .unwrap()
            .contains("Speech synthesis failed")
    );
    assert!(harness.service.get_status(&Harness::key()).active);
}

#[tokio::test]
async fn test_vad_events_are_published() {
    let harness = Harness::builder().build();
    harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();
    let mut events = harness.events();

    harness.stt().push(STTEvent::SpeechStarted).await;
    harness.stt().push(STTEvent::UtteranceEnd).await;

    next_event(&mut events, "speechStarted").await;
    next_event(&mut events, "utteranceEnd").await;
}

#[tokio::test]
async fn test_list_active_sessions_reports_the_call() {
    let harness = Harness::builder().build();
    harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();

    let sessions = harness.service.list_active_sessions().await;

    assert_eq!(sessions.len(), 1);
    let info = &sessions[0];
    assert_eq!(info.session_key, "u1-c1");
    assert_eq!(info.username, "Alex");
    assert_eq!(info.character_name, "Luna");
    assert_eq!(info.state, SessionState::Active);
    assert_eq!(info.coins_spent, 0);
}

#[tokio::test(start_paused = true)]
async fn test_idle_calls_are_cleaned_up() {
    let config = CallServiceConfig {
        idle_timeout: Duration::from_secs(60),
        ..quiet_config()
    };
    let harness = Harness::builder().config(config).build();
    harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(harness.service.cleanup_inactive().await, 0);

    tokio::time::advance(Duration::from_secs(31)).await;
    assert_eq!(harness.service.cleanup_inactive().await, 1);
    assert!(!harness.service.registry().contains(&Harness::key()));

    let stats = harness.service.end_call(&Harness::key()).await.unwrap();
    assert_eq!(stats.reason, EndReason::Idle);
}

#[tokio::test]
async fn test_shutdown_ends_every_call() {
    let harness = Harness::builder().build();
    harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();
    let session = harness.service.registry().get(&Harness::key()).unwrap();

    harness.service.shutdown().await;

    assert!(harness.service.registry().is_empty());
    assert_eq!(session.state(), SessionState::Ended);
    assert_eq!(session.final_stats().unwrap().reason, EndReason::Shutdown);
}

#[tokio::test]
async fn test_finals_flushed_while_ending_get_no_reply() {
    let harness = Harness::builder().build();
    harness
        .service
        .start_call(&Harness::caller(), CHARACTER_ID)
        .await
        .unwrap();
    harness.stt().flush_on_finish("wait, one more thing");

    harness.service.end_call(&Harness::key()).await.unwrap();

    assert_eq!(harness.llm.calls(), 0);
    assert_eq!(harness.tts.spoken.lock().len(), 0);
}

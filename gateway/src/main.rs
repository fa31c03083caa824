use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use bytes::Bytes;
use clap::{Args, Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use charvoice_gateway::GatewayConfig;
use charvoice_gateway::core::llm::PersonalityBuilder;
use charvoice_gateway::core::store::{Character, InMemoryBalanceStore, StaticCharacterStore};
use charvoice_gateway::core::transport::TracingTransport;
use charvoice_gateway::core::{
    CallerIdentity, Collaborators, Providers, SessionEvent, SessionKey, VoiceCallService,
};

/// Character voice-call gateway
#[derive(Parser, Debug)]
#[command(name = "charvoice-gateway")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the persona directive built from character tags
    Persona {
        #[arg(short = 't', long = "tag")]
        tags: Vec<String>,
    },

    /// Place a call against the live providers, streaming audio from a file
    Call(CallArgs),
}

#[derive(Args, Debug)]
struct CallArgs {
    /// Raw audio to stream, in the configured ASR encoding
    #[arg(long, value_name = "FILE")]
    audio: PathBuf,

    #[arg(long, default_value = "local-user")]
    user_id: String,

    #[arg(long, default_value = "caller")]
    username: String,

    #[arg(long, default_value = "character")]
    character_id: String,

    #[arg(long, default_value = "Luna")]
    character_name: String,

    #[arg(long)]
    description: Option<String>,

    #[arg(short = 't', long = "tag")]
    tags: Vec<String>,

    /// Starting coin balance
    #[arg(long, default_value_t = 60)]
    coins: i64,

    #[arg(long, default_value_t = 3200)]
    chunk_bytes: usize,

    #[arg(long, default_value_t = 100)]
    chunk_interval_ms: u64,

    /// How long to keep listening for replies after the audio is sent
    #[arg(long, default_value_t = 10)]
    listen_secs: u64,

    /// Where synthesized replies are written
    #[arg(long, default_value = "replies")]
    out_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if it exists (must be done before config loading)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Must happen before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Persona { tags } => {
            println!("{}", PersonalityBuilder::build(&tags));
            Ok(())
        }
        Commands::Call(args) => {
            let config = if let Some(config_path) = cli.config {
                println!("Loading configuration from {}", config_path.display());
                GatewayConfig::from_file(&config_path)?
            } else {
                GatewayConfig::from_env()?
            };
            run_call(config, args).await
        }
    }
}

async fn run_call(config: GatewayConfig, args: CallArgs) -> anyhow::Result<()> {
    config.require_api_keys()?;
    let providers = Providers::from_config(&config)?;

    let character = Character {
        id: args.character_id.clone(),
        name: args.character_name.clone(),
        description: args.description.clone(),
        tags: args.tags.clone(),
    };
    let collaborators = Collaborators {
        characters: Arc::new(StaticCharacterStore::new().with_character(character)),
        balances: Arc::new(InMemoryBalanceStore::new().with_balance(&args.user_id, args.coins)),
        transport: Arc::new(TracingTransport),
    };
    let service = VoiceCallService::new(collaborators, providers, config.call_service_config());

    let audio = tokio::fs::read(&args.audio)
        .await
        .with_context(|| format!("Failed to read {}", args.audio.display()))?;
    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .with_context(|| format!("Failed to create {}", args.out_dir.display()))?;

    let caller = CallerIdentity::new(&args.user_id, &args.username);
    let started = service.start_call(&caller, &args.character_id).await?;
    println!(
        "Call started with {} (session {})",
        started.character_name, started.session_id
    );

    let key = SessionKey::new(&args.user_id, &args.character_id);
    let session = service
        .registry()
        .get(&key)
        .ok_or_else(|| anyhow!("Call {key} ended before it could be observed"))?;
    let writer = tokio::spawn(print_events(session.subscribe(), args.out_dir.clone()));
    drop(session);

    let interrupted = tokio::select! {
        _ = stream_audio(&service, &key, &audio, &args) => false,
        _ = tokio::signal::ctrl_c() => true,
    };
    if !interrupted {
        info!(listen_secs = args.listen_secs, "Audio sent, waiting for replies");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(args.listen_secs)) => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    match service.end_call(&key).await {
        Ok(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
        Err(e) => warn!("Ending call failed: {}", e),
    }
    service.shutdown().await;

    if let Err(e) = writer.await {
        warn!("Event printer ended abnormally: {}", e);
    }
    Ok(())
}

async fn stream_audio(service: &VoiceCallService, key: &SessionKey, audio: &[u8], args: &CallArgs) {
    let mut pacing = tokio::time::interval(Duration::from_millis(args.chunk_interval_ms.max(1)));
    for chunk in audio.chunks(args.chunk_bytes.max(1)) {
        pacing.tick().await;
        if !service.send_audio(key, Bytes::copy_from_slice(chunk)) {
            break;
        }
    }
}

async fn print_events(
    mut events: tokio::sync::broadcast::Receiver<SessionEvent>,
    out_dir: PathBuf,
) {
    let mut replies = 0usize;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event printer lagged");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match &event {
            SessionEvent::Transcript { username, text, .. } => println!("{username}: {text}"),
            SessionEvent::AiResponse {
                character_name,
                text,
                ..
            } => println!("{character_name}: {text}"),
            SessionEvent::AudioGenerated { audio, .. } => {
                replies += 1;
                if let Err(e) = write_reply(&out_dir, replies, audio).await {
                    warn!("Failed to write reply audio: {}", e);
                }
            }
            SessionEvent::Error { message, .. } => eprintln!("error: {message}"),
            SessionEvent::InsufficientFunds { message, .. } => eprintln!("{message}"),
            SessionEvent::CallEnded(_) => break,
            _ => {}
        }
    }
}

async fn write_reply(out_dir: &Path, index: usize, audio: &[u8]) -> std::io::Result<()> {
    let path = out_dir.join(format!("reply-{index:03}.raw"));
    tokio::fs::write(&path, audio).await?;
    println!("  wrote {} ({} bytes)", path.display(), audio.len());
    Ok(())
}

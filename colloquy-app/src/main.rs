//! Colloquy — a local voice assistant.
//!
//! The binary wires the engine SDK to concrete collaborators: the energy
//! segmenter, the built-in stub speech backends (hardware-specific decoders
//! and voices plug in through the same traits), and an Ollama-compatible
//! conversation endpoint. Events stream to stdout; ctrl-c shuts down.

mod cli;
mod settings;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use colloquy_core::{
    assistant::{Assistant, Collaborators},
    audio::device,
    converse::{ChatBackend, OllamaClient},
    provider,
    stt::stub::StubTranscriber,
    tts::stub::StubSynthesizer,
    vad::EnergySegmenter,
    AssistantEvent,
};

use cli::{Cli, Commands};
use settings::{default_settings_path, load_settings, save_settings, AppSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "colloquy=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let settings_path = cli.config.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    info!(settings_path = ?settings_path, "settings loaded");
    if !settings_path.exists() {
        if let Err(e) = save_settings(&settings_path, &settings) {
            warn!(error = %e, "could not write default settings file");
        }
    }

    match cli.command {
        Some(Commands::Devices) => {
            print_devices();
            Ok(())
        }
        // The conversation client is blocking; keep it off the runtime.
        Some(Commands::Check) => tokio::task::spawn_blocking(move || check(&settings)).await?,
        Some(Commands::Run {
            interrupt_mode,
            wake_word,
            endpoint,
            model,
        }) => {
            if let Some(mode) = interrupt_mode {
                settings.interrupt_mode = mode;
            }
            if let Some(wake) = wake_word {
                settings.wake_word = Some(wake);
            }
            if let Some(endpoint) = endpoint {
                settings.chat_endpoint = endpoint;
            }
            if let Some(model) = model {
                settings.chat_model = model;
            }
            settings.normalize();
            run(settings).await
        }
        None => run(settings).await,
    }
}

fn print_devices() {
    println!("Input devices:");
    for dev in device::list_input_devices() {
        let marker = if dev.is_default { " (default)" } else { "" };
        println!("  {}{marker}", dev.name);
    }
    println!("Output devices:");
    for dev in device::list_output_devices() {
        let marker = if dev.is_default { " (default)" } else { "" };
        println!("  {}{marker}", dev.name);
    }
}

fn check(settings: &AppSettings) -> anyhow::Result<()> {
    let detected = provider::detect();
    let threads = provider::auto_threads(settings.num_threads);
    println!("provider: {detected}");
    println!("threads:  {threads}");

    let client = OllamaClient::new(&settings.chat_endpoint, &settings.chat_model)?;
    match client.health_check() {
        Ok(()) => {
            println!("endpoint: {} reachable", settings.chat_endpoint);
            Ok(())
        }
        Err(e) => Err(e).context("conversation endpoint health check failed"),
    }
}

async fn run(settings: AppSettings) -> anyhow::Result<()> {
    let config = settings.assistant_config()?;

    // Providers resolve per subsystem: explicit override, global override,
    // then host auto-detection.
    let global = AppSettings::provider_override(&settings.provider)?;
    let recognizer_provider = provider::resolve(
        AppSettings::provider_override(&settings.recognizer_provider)?,
        global,
    );
    let synthesizer_provider = provider::resolve(
        AppSettings::provider_override(&settings.synthesizer_provider)?,
        global,
    );
    let threads = provider::auto_threads(settings.num_threads);
    info!(
        %recognizer_provider,
        %synthesizer_provider,
        threads,
        "hardware selection"
    );

    // This binary ships the built-in speech backends; hardware decoders and
    // voices implement the same traits.
    warn!("using built-in stub speech backends; conversation flows end-to-end without model blobs");
    let detector = Box::new(EnergySegmenter::new(&config.detector));
    let transcriber = Box::new(StubTranscriber::new());
    let synthesizer = Box::new(StubSynthesizer::new());
    let chat = Box::new(
        OllamaClient::new(&settings.chat_endpoint, &settings.chat_model)
            .context("building conversation client")?,
    );

    let assistant = Arc::new(Assistant::new(
        config,
        Collaborators {
            detector,
            transcriber,
            synthesizer,
            chat,
        },
    ));

    // start() health-checks the endpoint with the blocking client and joins
    // audio-thread handshakes; run it off the async runtime.
    let starter = Arc::clone(&assistant);
    tokio::task::spawn_blocking(move || starter.start())
        .await?
        .context("starting the voice pipeline")?;

    // Forward pipeline events to the terminal.
    let mut events = assistant.subscribe_events();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AssistantEvent::Listening) => println!("· listening"),
                Ok(AssistantEvent::Heard { text }) => println!("you: {text}"),
                Ok(AssistantEvent::Reply { text }) => println!("assistant: {text}"),
                Ok(AssistantEvent::Interrupted) => println!("· interrupted"),
                Ok(AssistantEvent::Error { detail }) => eprintln!("error: {detail}"),
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("event receiver lagged by {n}");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    let stopper = Arc::clone(&assistant);
    tokio::task::spawn_blocking(move || stopper.stop()).await??;
    printer.abort();
    Ok(())
}

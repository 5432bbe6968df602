//! sleepy-news-rs: a bedtime news narrator.
//!
//! Top stories are retold by an LLM in a calm voice and read aloud through
//! a TTS API until the listener drifts off (or presses Ctrl-C).

mod config;
mod error;
mod history;
mod news;
mod pipeline;
mod speech;
mod text;

#[cfg(test)]
mod test_support;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::{Config, Credentials};
use history::NarrationLog;
use pipeline::{Pipeline, PipelineSettings};
use speech::elevenlabs::ElevenLabsClient;
use speech::playback::RodioPlayer;

#[derive(Parser, Debug)]
#[command(name = "sleepy-news-rs", about = "Bedtime news narrator")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // RUST_LOG wins; otherwise keep HTTP and audio internals quiet.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.verbose {
            EnvFilter::new("debug,reqwest=info,hyper_util=info,rodio=info")
        } else {
            EnvFilter::new("info,reqwest=warn,hyper_util=warn,rodio=warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();

    info!("sleepy-news-rs starting");

    dotenv::dotenv().ok();

    let config = Config::load(args.config.as_deref())?;
    config.validate()?;
    let credentials = Credentials::from_env(&config)?;
    info!(
        "Queue capacity {}, low watermark {}, voice {}",
        config.pipeline.queue_capacity, config.pipeline.low_watermark, config.tts.voice_id
    );

    let synthesizer = ElevenLabsClient::new(
        &config.tts,
        credentials.elevenlabs_api_key.clone(),
        credentials.elevenlabs_model_id.clone(),
    )?;
    let player = RodioPlayer::spawn(&config.playback)?;
    let source = news::build_source(&config, &credentials)?;

    let log = if config.history.enabled {
        let dir = config.history.dir.clone().or_else(NarrationLog::default_dir);
        match dir {
            Some(dir) => {
                info!("Narration history in {}", dir.display());
                Some(NarrationLog::new(dir))
            }
            None => {
                warn!("No home directory, narration history disabled");
                None
            }
        }
    } else {
        None
    };

    let pipeline = Pipeline::new(PipelineSettings::from_config(&config));
    tokio::spawn(stop_on_signal(pipeline.shutdown_handle()));

    let summary = pipeline
        .run(source, Arc::new(synthesizer), Arc::new(player), log)
        .await?;
    info!("Session finished: {summary}");

    Ok(())
}

/// Cancel `shutdown` on Ctrl-C or, on Unix, SIGTERM.
async fn stop_on_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Cannot listen for Ctrl-C: {e}");
                return;
            }
        }
        _ = terminate => {}
    }

    info!("Shutdown requested, finishing the current paragraph");
    shutdown.cancel();
}

//! Audio playback through rodio on a dedicated OS thread.
//!
//! `rodio::OutputStream` is `!Send` on some platforms, so it never leaves the
//! audio thread. The async side sends [`AudioCommand`]s over a channel and
//! awaits a oneshot reply. Playback is strictly sequential: the thread blocks
//! on each sink until it drains before taking the next command.

use std::fs::File;
use std::io::{BufReader, Cursor};
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{AudioPlayer, SpeechAudio};
use crate::config::PlaybackConfig;
use crate::error::PlaybackError;

enum AudioCommand {
    Play {
        audio: Vec<u8>,
        reply: oneshot::Sender<Result<Duration, PlaybackError>>,
    },
    Shutdown,
}

/// `Send + Sync` handle to the audio thread.
pub struct RodioPlayer {
    cmd_tx: mpsc::Sender<AudioCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RodioPlayer {
    /// Start the audio thread and open the default output device.
    ///
    /// Blocks until the device is open, so a missing device fails here
    /// rather than on the first paragraph.
    pub fn spawn(config: &PlaybackConfig) -> Result<Self, PlaybackError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();
        let config = config.clone();

        let thread = thread::Builder::new()
            .name("audio".into())
            .spawn(move || audio_thread_main(&config, &cmd_rx, &ready_tx))
            .map_err(|e| PlaybackError::Output(e.to_string()))?;

        ready_rx.recv().map_err(|_| PlaybackError::ThreadGone)??;
        info!("Audio playback initialized on default output device");

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
        })
    }
}

#[async_trait]
impl AudioPlayer for RodioPlayer {
    async fn play(&self, audio: SpeechAudio) -> Result<Duration, PlaybackError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(AudioCommand::Play {
                audio: audio.bytes,
                reply: reply_tx,
            })
            .map_err(|_| PlaybackError::ThreadGone)?;
        reply_rx.await.map_err(|_| PlaybackError::ThreadGone)?
    }
}

impl Drop for RodioPlayer {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(AudioCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

fn audio_thread_main(
    config: &PlaybackConfig,
    cmd_rx: &mpsc::Receiver<AudioCommand>,
    ready_tx: &mpsc::Sender<Result<(), PlaybackError>>,
) {
    let stream = match OutputStreamBuilder::open_default_stream() {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(PlaybackError::Output(e.to_string())));
            return;
        }
    };
    let _ = ready_tx.send(Ok(()));

    let music = config.background_music.as_deref().and_then(|path| {
        BackgroundMusic::start(&stream, path, config)
    });

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            AudioCommand::Play { audio, reply } => {
                let result = play_to_end(&stream, music.as_ref(), audio);
                let _ = reply.send(result);
            }
            AudioCommand::Shutdown => break,
        }
    }

    debug!("Audio thread exiting");
}

fn play_to_end(
    stream: &OutputStream,
    music: Option<&BackgroundMusic>,
    audio: Vec<u8>,
) -> Result<Duration, PlaybackError> {
    let source =
        Decoder::new(Cursor::new(audio)).map_err(|e| PlaybackError::Decode(e.to_string()))?;

    // rodio 0.21: Sink::connect_new takes &Mixer
    let sink = Sink::connect_new(stream.mixer());
    if let Some(music) = music {
        music.duck();
    }

    let started = Instant::now();
    sink.append(source);
    sink.sleep_until_end();
    let elapsed = started.elapsed();

    if let Some(music) = music {
        music.restore();
    }
    debug!("Played {:.1}s of audio", elapsed.as_secs_f64());
    Ok(elapsed)
}

/// Volume updates per second during a fade.
const FADE_STEPS_PER_SEC: u128 = 30;

/// Looping music bed under the narration.
struct BackgroundMusic {
    sink: Sink,
    volume: f32,
    ducked_volume: f32,
    fade: Duration,
}

impl BackgroundMusic {
    /// Start looping the configured track. Returns `None` (music disabled) if
    /// the file cannot be opened or decoded.
    fn start(stream: &OutputStream, path: &Path, config: &PlaybackConfig) -> Option<Self> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                warn!("Background music disabled, cannot open {}: {e}", path.display());
                return None;
            }
        };
        let source = match Decoder::new(BufReader::new(file)) {
            Ok(s) => s,
            Err(e) => {
                warn!("Background music disabled, cannot decode {}: {e}", path.display());
                return None;
            }
        };

        let sink = Sink::connect_new(stream.mixer());
        sink.set_volume(config.music_volume);
        sink.append(source.repeat_infinite());
        info!("Background music looping from {}", path.display());

        Some(Self {
            sink,
            volume: config.music_volume,
            ducked_volume: config.ducked_volume,
            fade: Duration::from_millis(config.fade_ms),
        })
    }

    fn duck(&self) {
        self.fade_to(self.ducked_volume);
    }

    fn restore(&self) {
        self.fade_to(self.volume);
    }

    /// Step the music volume to `target`, blocking the audio thread for the
    /// fade length.
    fn fade_to(&self, target: f32) {
        let steps = volume_ramp(self.sink.volume(), target, self.fade);
        let pause = self.fade / steps.len() as u32;
        for volume in steps {
            self.sink.set_volume(volume);
            if !pause.is_zero() {
                thread::sleep(pause);
            }
        }
    }
}

/// Evenly spaced volumes from `from` (exclusive) to `to` (inclusive).
fn volume_ramp(from: f32, to: f32, duration: Duration) -> Vec<f32> {
    let steps = (duration.as_millis() * FADE_STEPS_PER_SEC / 1000).clamp(1, 10_000) as u32;
    (1..=steps)
        .map(|i| {
            if i == steps {
                to
            } else {
                from + (to - from) * (i as f32 / steps as f32)
            }
        })
        .collect()
}

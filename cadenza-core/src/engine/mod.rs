//! `CadenzaEngine`: top-level playback lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! CadenzaEngine::new()
//!     └─► warm_up()          → synth patches loaded
//!         └─► start()        → device open, producer spawned, status = Running
//!             ├─► pause()    → callback emits silence, producer idles
//!             ├─► resume()   → status = Running
//!             ├─► seek(pos)  → producer repositions synth, pool reset
//!             └─► stop()     → running=false, stream dropped, status = Idle
//! ```
//!
//! `start()`/`stop()` are guarded: calling them in the wrong state returns
//! an error rather than panicking. End of stream is reported by the producer
//! as status `Finished` once the pool has drained out.
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS (COM / CoreAudio thread
//! affinity). The output stream is therefore created *inside* the
//! `spawn_blocking` closure that runs the producer loop, so it never crosses
//! a thread boundary. A sync mpsc channel propagates any open-device error
//! back to the `start()` caller.

pub mod producer;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    buffering::{FramePool, DEFAULT_POOL_SLOTS},
    error::{CadenzaError, Result},
    events::{PlaybackProgressEvent, PlayerStatus, PlayerStatusEvent},
    output::AudioOutput,
    synth::SynthHandle,
};

/// Broadcast channel capacity: 256 events buffered for slow consumers.
const BROADCAST_CAP: usize = 256;

/// Configuration for `CadenzaEngine`.
///
/// Fixed at pool construction; changing any field requires a stop/start
/// cycle, which rebuilds the pool.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Output sample rate (Hz). The synth renders at this rate. Default: 44100.
    pub sample_rate: u32,
    /// Samples per channel per frame. One frame is the unit of transfer
    /// between producer and output callback. Default: 4096 (~93 ms at 44.1 kHz).
    pub frame_length: usize,
    /// Output channel count. Default: 2.
    pub channels: usize,
    /// Ring slots. Usable capacity is one less. Default: 24.
    pub pool_slots: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            frame_length: 4_096,
            channels: 2,
            pool_slots: DEFAULT_POOL_SLOTS,
        }
    }
}

impl EngineConfig {
    /// Duration of one frame in milliseconds.
    pub fn frame_millis(&self) -> u64 {
        (self.frame_length as u64 * 1_000) / u64::from(self.sample_rate.max(1))
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(CadenzaError::InvalidConfig("sample_rate must be non-zero".into()));
        }
        if u16::try_from(self.channels).is_err() || self.channels == 0 {
            return Err(CadenzaError::InvalidConfig(format!(
                "unsupported channel count: {}",
                self.channels
            )));
        }
        // frame_length and pool_slots are checked again by FramePool::new.
        Ok(())
    }
}

/// Shared playback counters, incremented from the producer loop and the
/// output callback, read from anywhere via [`PlaybackDiagnostics::snapshot`].
#[derive(Default)]
pub struct PlaybackDiagnostics {
    pub frames_rendered: AtomicUsize,
    pub frames_played: AtomicUsize,
    /// Output callback found the pool empty while running.
    pub underruns: AtomicUsize,
    /// Producer found the pool full and skipped a fill cycle.
    pub overruns: AtomicUsize,
    pub render_errors: AtomicUsize,
    /// Renders that returned fewer samples than a full frame.
    pub short_renders: AtomicUsize,
}

impl PlaybackDiagnostics {
    pub fn reset(&self) {
        self.frames_rendered.store(0, Ordering::Relaxed);
        self.frames_played.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        self.overruns.store(0, Ordering::Relaxed);
        self.render_errors.store(0, Ordering::Relaxed);
        self.short_renders.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            frames_played: self.frames_played.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            render_errors: self.render_errors.load(Ordering::Relaxed),
            short_renders: self.short_renders.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiagnosticsSnapshot {
    pub frames_rendered: usize,
    pub frames_played: usize,
    pub underruns: usize,
    pub overruns: usize,
    pub render_errors: usize,
    pub short_renders: usize,
}

/// The top-level engine handle.
///
/// `CadenzaEngine` is `Send + Sync`; all fields use interior mutability.
/// Wrap in `Arc<CadenzaEngine>` to share between an app's command handlers
/// and event-forwarding tasks.
pub struct CadenzaEngine {
    config: EngineConfig,
    synth: SynthHandle,
    /// `true` while the output stream and producer loop are active.
    running: Arc<AtomicBool>,
    /// `true` while playback is paused (running stays `true`).
    paused: Arc<AtomicBool>,
    /// Pending seek target in samples; `producer::NO_SEEK` means none.
    pending_seek: Arc<AtomicU64>,
    /// Canonical status (written via Mutex, read from commands).
    status: Arc<Mutex<PlayerStatus>>,
    status_tx: broadcast::Sender<PlayerStatusEvent>,
    progress_tx: broadcast::Sender<PlaybackProgressEvent>,
    /// Monotonically increasing progress-event sequence counter.
    seq: Arc<AtomicU64>,
    diagnostics: Arc<PlaybackDiagnostics>,
}

impl CadenzaEngine {
    /// Create a new engine. Does not touch the audio device; call
    /// `warm_up()` then `start()`.
    pub fn new(config: EngineConfig, synth: SynthHandle) -> Self {
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        let (progress_tx, _) = broadcast::channel(BROADCAST_CAP);

        Self {
            config,
            synth,
            running: Arc::new(AtomicBool::new(false)),
            paused: Arc::new(AtomicBool::new(false)),
            pending_seek: Arc::new(AtomicU64::new(producer::NO_SEEK)),
            status: Arc::new(Mutex::new(PlayerStatus::Idle)),
            status_tx,
            progress_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::new(PlaybackDiagnostics::default()),
        }
    }

    /// Warm up the synth backend (load patches, allocate voice state).
    ///
    /// Call once at application startup, before `start()`.
    pub fn warm_up(&self) -> Result<()> {
        info!("warming up synth backend");
        self.synth.0.lock().warm_up()?;
        info!("synth backend ready");
        Ok(())
    }

    /// Start the output stream and the producer loop.
    ///
    /// Blocks until the audio device is confirmed open (or fails), then
    /// returns. The producer keeps running in a background blocking thread.
    ///
    /// # Errors
    /// - `CadenzaError::AlreadyRunning` if already started.
    /// - `CadenzaError::InvalidConfig` for a degenerate configuration.
    /// - `CadenzaError::NoDefaultOutputDevice` / `CadenzaError::AudioStream`
    ///   on device error.
    pub fn start(&self) -> Result<()> {
        self.start_with_device(None)
    }

    /// Start playback on a preferred output device name.
    ///
    /// If `preferred_output_device` is `None`, default output selection is
    /// used.
    pub fn start_with_device(&self, preferred_output_device: Option<String>) -> Result<()> {
        self.config.validate()?;

        if self.running.load(Ordering::SeqCst) {
            return Err(CadenzaError::AlreadyRunning);
        }

        let pool = FramePool::new(
            self.config.pool_slots,
            self.config.channels,
            self.config.frame_length,
        )?;

        self.diagnostics.reset();
        self.paused.store(false, Ordering::SeqCst);
        self.pending_seek.store(producer::NO_SEEK, Ordering::SeqCst);
        self.running.store(true, Ordering::SeqCst);
        self.set_status(PlayerStatus::Running, None);

        // Clone all shared state before moving into the closure.
        let config = self.config.clone();
        let synth = self.synth.clone();
        let running = Arc::clone(&self.running);
        let paused = Arc::clone(&self.paused);
        let pending_seek = Arc::clone(&self.pending_seek);
        let status = Arc::clone(&self.status);
        let status_tx = self.status_tx.clone();
        let progress_tx = self.progress_tx.clone();
        let seq = Arc::clone(&self.seq);
        let diagnostics = Arc::clone(&self.diagnostics);

        // Sync channel: the producer thread signals open success/failure back
        // to start().
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<()>>();

        tokio::task::spawn_blocking(move || {
            // Open the audio device on THIS thread: cpal::Stream is !Send.
            let output = match AudioOutput::open_with_preference(
                pool.clone(),
                Arc::clone(&running),
                Arc::clone(&paused),
                Arc::clone(&diagnostics),
                &config,
                preferred_output_device.as_deref(),
            ) {
                Ok(o) => {
                    let _ = open_tx.send(Ok(()));
                    o
                }
                Err(e) => {
                    let _ = open_tx.send(Err(e));
                    running.store(false, Ordering::SeqCst);
                    return;
                }
            };

            producer::run(producer::ProducerContext {
                config,
                synth,
                pool,
                running,
                paused,
                pending_seek,
                status,
                status_tx,
                progress_tx,
                seq,
                diagnostics,
            });

            // Stream drops here, releasing the audio device on this thread.
            drop(output);
        });

        match open_rx.recv() {
            Ok(Ok(())) => {
                info!("engine started, playing");
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                self.set_status(PlayerStatus::Error, Some(e.to_string()));
                Err(e)
            }
            Err(_) => {
                // Channel closed before a message was sent; spawn_blocking
                // panicked?
                self.running.store(false, Ordering::SeqCst);
                self.set_status(PlayerStatus::Error, Some("producer failed to start".into()));
                Err(CadenzaError::Other(anyhow::anyhow!(
                    "producer task died unexpectedly"
                )))
            }
        }
    }

    /// Pause playback: the output callback switches to silence, the producer
    /// stops filling instead of spinning against a full pool.
    ///
    /// # Errors
    /// - `CadenzaError::NotRunning` if not currently running.
    pub fn pause(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CadenzaError::NotRunning);
        }
        self.paused.store(true, Ordering::SeqCst);
        self.set_status(PlayerStatus::Paused, None);
        info!("playback paused");
        Ok(())
    }

    /// Resume after [`pause`](CadenzaEngine::pause).
    ///
    /// # Errors
    /// - `CadenzaError::NotRunning` if not currently running.
    pub fn resume(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CadenzaError::NotRunning);
        }
        self.paused.store(false, Ordering::SeqCst);
        self.set_status(PlayerStatus::Running, None);
        info!("playback resumed");
        Ok(())
    }

    /// Request a jump to an absolute sample position. Applied by the
    /// producer on its next cycle; queued frames from before the seek are
    /// dropped. Works while running or paused.
    ///
    /// # Errors
    /// - `CadenzaError::NotRunning` if not currently running.
    pub fn seek(&self, position: u64) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CadenzaError::NotRunning);
        }
        self.pending_seek
            .store(position.min(producer::NO_SEEK - 1), Ordering::SeqCst);
        Ok(())
    }

    /// Stop playback and release the audio device.
    ///
    /// # Errors
    /// - `CadenzaError::NotRunning` if not currently running (including
    ///   after the producer reported `Finished`).
    pub fn stop(&self) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CadenzaError::NotRunning);
        }

        self.running.store(false, Ordering::SeqCst);
        self.paused.store(false, Ordering::SeqCst);
        self.set_status(PlayerStatus::Idle, None);
        info!("engine stop requested");
        Ok(())
    }

    /// Current player status (snapshot).
    pub fn status(&self) -> PlayerStatus {
        *self.status.lock()
    }

    /// Subscribe to status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<PlayerStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Subscribe to playback progress events.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<PlaybackProgressEvent> {
        self.progress_tx.subscribe()
    }

    /// Snapshot of playback counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────

    fn set_status(&self, new_status: PlayerStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(PlayerStatusEvent {
            status: new_status,
            detail,
        });
    }
}

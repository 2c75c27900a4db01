//! Producer loop behaviour against a scripted synth: flow control, pause,
//! seek, render failures and end of stream. The tests stand in for the
//! output callback by draining the pool directly.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;

use cadenza_core::engine::producer::{self, ProducerContext, NO_SEEK};
use cadenza_core::engine::{EngineConfig, PlaybackDiagnostics};
use cadenza_core::error::Result;
use cadenza_core::events::{PlaybackProgressEvent, PlayerStatus, PlayerStatusEvent};
use cadenza_core::{CadenzaError, FrameBuffer, FramePool, SynthHandle, Synthesizer};

const FRAME_LENGTH: usize = 64;

/// Deterministic synth: every rendered frame carries its start position in
/// sample 0 of channel 0, so tests can verify ordering and seeks by tag.
struct ScriptedSynth {
    total: u64,
    position: u64,
    /// Fail every n-th render call (1-based), if set.
    fail_every: Option<u64>,
    renders: u64,
}

impl ScriptedSynth {
    fn new(total: u64) -> Self {
        Self {
            total,
            position: 0,
            fail_every: None,
            renders: 0,
        }
    }

    fn failing_every(total: u64, n: u64) -> Self {
        Self {
            fail_every: Some(n),
            ..Self::new(total)
        }
    }
}

impl Synthesizer for ScriptedSynth {
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    fn render(&mut self, frame: &mut FrameBuffer) -> Result<usize> {
        self.renders += 1;
        if let Some(n) = self.fail_every {
            if self.renders % n == 0 {
                return Err(CadenzaError::Synth("scripted render failure".into()));
            }
        }

        let remaining = self.total.saturating_sub(self.position);
        let count = (frame.frame_length() as u64).min(remaining) as usize;
        if count > 0 {
            let tag = self.position as f32;
            for channel in 0..frame.channels() {
                for sample in frame.channel_mut(channel)[..count].iter_mut() {
                    *sample = tag;
                }
            }
        }
        self.position += count as u64;
        Ok(count)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        self.position = position.min(self.total);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn total_samples(&self) -> Option<u64> {
        Some(self.total)
    }

    fn reset(&mut self) {
        self.position = 0;
        self.renders = 0;
    }
}

/// A running producer loop plus handles to everything the engine would hold.
struct Harness {
    pool: FramePool,
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    pending_seek: Arc<AtomicU64>,
    status: Arc<Mutex<PlayerStatus>>,
    diagnostics: Arc<PlaybackDiagnostics>,
    progress_rx: broadcast::Receiver<PlaybackProgressEvent>,
    handle: thread::JoinHandle<()>,
}

impl Harness {
    fn spawn(synth: ScriptedSynth, slots: usize, start_paused: bool) -> Self {
        let config = EngineConfig {
            frame_length: FRAME_LENGTH,
            pool_slots: slots,
            ..EngineConfig::default()
        };
        let pool = FramePool::new(slots, config.channels, config.frame_length).expect("pool");
        let running = Arc::new(AtomicBool::new(true));
        let paused = Arc::new(AtomicBool::new(start_paused));
        let pending_seek = Arc::new(AtomicU64::new(NO_SEEK));
        let status = Arc::new(Mutex::new(PlayerStatus::Running));
        let diagnostics = Arc::new(PlaybackDiagnostics::default());

        let (status_tx, _status_rx) = broadcast::channel::<PlayerStatusEvent>(64);
        let (progress_tx, progress_rx) = broadcast::channel::<PlaybackProgressEvent>(256);

        let ctx = ProducerContext {
            config,
            synth: SynthHandle::new(synth),
            pool: pool.clone(),
            running: Arc::clone(&running),
            paused: Arc::clone(&paused),
            pending_seek: Arc::clone(&pending_seek),
            status: Arc::clone(&status),
            status_tx,
            progress_tx,
            seq: Arc::new(AtomicU64::new(0)),
            diagnostics: Arc::clone(&diagnostics),
        };

        let handle = thread::spawn(move || producer::run(ctx));

        Self {
            pool,
            running,
            paused,
            pending_seek,
            status,
            diagnostics,
            progress_rx,
            handle,
        }
    }

    fn stop_and_join(self) {
        self.running.store(false, Ordering::SeqCst);
        self.handle.join().expect("producer thread panicked");
    }

    /// Pop one frame and return its position tag.
    fn pop_tag(&self) -> Option<f32> {
        self.pool.take().map(|frame| frame.channel(0)[0])
    }
}

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}

#[test]
fn fills_ring_to_capacity_then_backs_off() {
    let harness = Harness::spawn(ScriptedSynth::new(u64::MAX / 2), 8, false);

    assert!(
        wait_until(Duration::from_secs(2), || harness.pool.filled() == 7),
        "producer never filled the ring"
    );

    // Held at capacity with nobody consuming: the producer must keep
    // skipping cycles, not overwrite queued frames.
    thread::sleep(Duration::from_millis(40));
    assert_eq!(harness.pool.filled(), 7);
    assert!(harness.diagnostics.overruns.load(Ordering::Relaxed) > 0);

    harness.stop_and_join();
}

#[test]
fn paused_producer_does_not_fill() {
    let harness = Harness::spawn(ScriptedSynth::new(u64::MAX / 2), 8, true);

    thread::sleep(Duration::from_millis(50));
    assert_eq!(harness.pool.filled(), 0);
    assert_eq!(harness.diagnostics.frames_rendered.load(Ordering::Relaxed), 0);

    // Resume: filling starts without a restart.
    harness.paused.store(false, Ordering::SeqCst);
    assert!(
        wait_until(Duration::from_secs(2), || harness.pool.filled() > 0),
        "producer did not resume filling"
    );

    harness.stop_and_join();
}

#[test]
fn seek_drops_queued_frames_and_repositions() {
    let harness = Harness::spawn(ScriptedSynth::new(u64::MAX / 2), 8, false);

    assert!(wait_until(Duration::from_secs(2), || harness.pool.is_full()));

    // Pause so the post-seek state is observable before refilling starts.
    harness.paused.store(true, Ordering::SeqCst);
    harness.pending_seek.store(40_960, Ordering::SeqCst);

    assert!(
        wait_until(Duration::from_secs(2), || {
            harness.pending_seek.load(Ordering::SeqCst) == NO_SEEK && harness.pool.is_empty()
        }),
        "seek was not applied"
    );

    harness.paused.store(false, Ordering::SeqCst);
    assert!(wait_until(Duration::from_secs(2), || !harness.pool.is_empty()));

    // The first frame after the seek starts at the target, not at the old
    // position.
    assert_eq!(harness.pop_tag(), Some(40_960.0));

    harness.stop_and_join();
}

#[test]
fn failed_renders_leave_no_gaps() {
    let harness = Harness::spawn(ScriptedSynth::failing_every(u64::MAX / 2, 3), 8, false);

    assert!(
        wait_until(Duration::from_secs(2), || harness.pool.filled() >= 6),
        "producer never recovered from scripted failures"
    );
    harness.paused.store(true, Ordering::SeqCst);
    assert!(harness.diagnostics.render_errors.load(Ordering::Relaxed) > 0);

    // Every committed frame is a real render; failed calls were discarded,
    // so tags stay contiguous.
    for i in 0..6 {
        assert_eq!(
            harness.pop_tag(),
            Some((i * FRAME_LENGTH) as f32),
            "gap after a failed render at frame {i}"
        );
    }

    harness.stop_and_join();
}

#[test]
fn end_of_stream_drains_out_and_reports_finished() {
    // Two full frames plus a short tail: 64 + 64 + 32 samples.
    let total = (2 * FRAME_LENGTH + FRAME_LENGTH / 2) as u64;
    let mut harness = Harness::spawn(ScriptedSynth::new(total), 8, false);

    // Play the consumer role: drain until the producer reports Finished.
    assert!(
        wait_until(Duration::from_secs(3), || {
            let _ = harness.pool.take();
            *harness.status.lock() == PlayerStatus::Finished
        }),
        "producer never reached Finished"
    );

    assert!(
        wait_until(Duration::from_secs(1), || {
            !harness.running.load(Ordering::SeqCst)
        }),
        "producer did not clear the running flag"
    );

    assert_eq!(harness.diagnostics.frames_rendered.load(Ordering::Relaxed), 3);
    assert_eq!(harness.diagnostics.short_renders.load(Ordering::Relaxed), 1);

    // Progress events were emitted in order and carry the known total.
    let mut last_seq = None;
    let mut last_position = 0;
    loop {
        match harness.progress_rx.try_recv() {
            Ok(event) => {
                if let Some(prev) = last_seq {
                    assert!(event.seq > prev, "progress seq went backwards");
                }
                last_seq = Some(event.seq);
                last_position = event.position;
                assert_eq!(event.total_samples, Some(total));
            }
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    assert!(last_seq.is_some(), "no progress events were emitted");
    assert_eq!(last_position, total);

    harness.handle.join().expect("producer thread panicked");
}

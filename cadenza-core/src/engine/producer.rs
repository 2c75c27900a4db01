//! Blocking producer loop: keeps the frame ring as full as possible.
//!
//! ## Per-iteration steps
//!
//! ```text
//! 1. Check the running flag
//! 2. Apply a pending seek (reposition synth, reset the ring)
//! 3. If paused: sleep, do not fill
//! 4. prepare() a slot; on a full ring back off and retry next cycle
//! 5. Render into the slot via the synth backend
//!    - error        → discard the slot, retry next cycle
//!    - 0 samples    → end of stream: drain out, status = Finished
//!    - short render → pad the tail with silence, commit
//!    - full render  → commit
//! 6. Broadcast a progress event
//! ```
//!
//! The loop runs in `spawn_blocking`; the synth render call is the only
//! variable-time step and it is kept here, off the real-time callback path.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    buffering::FramePool,
    engine::{EngineConfig, PlaybackDiagnostics},
    events::{PlaybackProgressEvent, PlayerStatus, PlayerStatusEvent},
    synth::SynthHandle,
};

/// Sentinel stored in `pending_seek` when no seek is requested.
pub const NO_SEEK: u64 = u64::MAX;

/// Back-off when the ring is full (the overrun path). One frame is ~93 ms at
/// the defaults, so a short sleep loses no ground.
const FULL_BACKOFF_MS: u64 = 5;

/// Sleep while paused; the pool stays as-is and drains on resume.
const PAUSED_SLEEP_MS: u64 = 5;

/// Back-off after a failed render before retrying the same slot.
const RENDER_RETRY_MS: u64 = 5;

/// Poll interval while waiting for the ring to drain at end of stream.
const DRAIN_POLL_MS: u64 = 10;

/// All context the producer needs, passed as one struct so the closure stays
/// tidy.
pub struct ProducerContext {
    pub config: EngineConfig,
    pub synth: SynthHandle,
    pub pool: FramePool,
    pub running: Arc<AtomicBool>,
    pub paused: Arc<AtomicBool>,
    pub pending_seek: Arc<AtomicU64>,
    pub status: Arc<Mutex<PlayerStatus>>,
    pub status_tx: broadcast::Sender<PlayerStatusEvent>,
    pub progress_tx: broadcast::Sender<PlaybackProgressEvent>,
    pub seq: Arc<AtomicU64>,
    pub diagnostics: Arc<PlaybackDiagnostics>,
}

/// Run the blocking producer loop until `ctx.running` becomes false or the
/// synth reports end of stream.
pub fn run(ctx: ProducerContext) {
    info!("producer started");

    let mut finished = false;

    loop {
        // ── 1. Check running flag ─────────────────────────────────────────
        if !ctx.running.load(Ordering::Relaxed) {
            break;
        }

        // ── 2. Pending seek ───────────────────────────────────────────────
        let target = ctx.pending_seek.swap(NO_SEEK, Ordering::AcqRel);
        if target != NO_SEEK {
            let seek_result = ctx.synth.0.lock().seek(target);
            match seek_result {
                Ok(()) => {
                    // Drop queued pre-seek frames so the jump is audible now,
                    // not 23 frames from now.
                    ctx.pool.reset();
                    debug!(position = target, "seek applied, ring reset");
                }
                Err(e) => warn!("seek to sample {target} failed: {e}"),
            }
            emit_progress(&ctx);
        }

        // ── 3. Paused? ────────────────────────────────────────────────────
        if ctx.paused.load(Ordering::Relaxed) {
            std::thread::sleep(Duration::from_millis(PAUSED_SLEEP_MS));
            continue;
        }

        // ── 4. Reserve a slot ─────────────────────────────────────────────
        let Some(mut slot) = ctx.pool.prepare() else {
            // Ring full: flow control, not an error. Skip this cycle.
            ctx.diagnostics.overruns.fetch_add(1, Ordering::Relaxed);
            std::thread::sleep(Duration::from_millis(FULL_BACKOFF_MS));
            continue;
        };

        // ── 5. Render ─────────────────────────────────────────────────────
        let rendered = ctx.synth.0.lock().render(&mut slot);
        match rendered {
            Err(e) => {
                ctx.diagnostics.render_errors.fetch_add(1, Ordering::Relaxed);
                warn!("render failed, skipping commit: {e}");
                slot.discard();
                std::thread::sleep(Duration::from_millis(RENDER_RETRY_MS));
                continue;
            }
            Ok(0) => {
                slot.discard();
                finished = true;
                break;
            }
            Ok(count) => {
                if count < ctx.config.frame_length {
                    // Final partial block: pad so the consumer always copies
                    // a whole frame.
                    slot.fill_tail_silence(count);
                    ctx.diagnostics.short_renders.fetch_add(1, Ordering::Relaxed);
                    debug!(count, "short render padded with silence");
                }
                drop(slot); // commit
                ctx.diagnostics
                    .frames_rendered
                    .fetch_add(1, Ordering::Relaxed);
            }
        }

        // ── 6. Progress ───────────────────────────────────────────────────
        emit_progress(&ctx);
    }

    if finished && ctx.running.load(Ordering::Relaxed) {
        drain_out(&ctx);
        set_status(&ctx, PlayerStatus::Finished, None);
        info!("playback finished");
    }

    ctx.running.store(false, Ordering::SeqCst);
    ctx.pool.reset();
    info!("producer stopped");
}

/// Wait for the consumer to play out the committed frames, bounded by the
/// queue's own duration plus a margin so a stalled device cannot hang stop.
fn drain_out(ctx: &ProducerContext) {
    let frame_ms = ctx.config.frame_millis().max(1);
    let queued = ctx.pool.filled() as u64 + 1;
    let deadline = Instant::now() + Duration::from_millis(queued * frame_ms + 500);

    while ctx.running.load(Ordering::Relaxed)
        && !ctx.pool.is_empty()
        && Instant::now() < deadline
    {
        std::thread::sleep(Duration::from_millis(DRAIN_POLL_MS));
    }
}

fn emit_progress(ctx: &ProducerContext) {
    let (position, total_samples) = {
        let synth = ctx.synth.0.lock();
        (synth.position(), synth.total_samples())
    };
    let seq = ctx.seq.fetch_add(1, Ordering::Relaxed);
    let _ = ctx.progress_tx.send(PlaybackProgressEvent {
        seq,
        position,
        total_samples,
    });
}

fn set_status(ctx: &ProducerContext, status: PlayerStatus, detail: Option<String>) {
    *ctx.status.lock() = status;
    let _ = ctx.status_tx.send(PlayerStatusEvent { status, detail });
}

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::foundation::core::MediaTimestamp;
use crate::foundation::error::{KinettaError, KinettaResult};
use crate::record::sample::{EncodedSample, TrackFormat};

/// The container seam: a destination for encoded tracks.
///
/// Lifecycle: `prepare`, then `add_track` once per track, then `start`,
/// then any number of `write_sample`, then `stop`. `stop` must produce a
/// valid (possibly empty) container even when `start` was never reached.
pub trait ContainerWriter: Send {
    /// Open the destination.
    fn prepare(&mut self) -> KinettaResult<()>;

    /// Register a track. Only valid between `prepare` and `start`.
    fn add_track(&mut self, format: &TrackFormat) -> KinettaResult<()>;

    /// Begin accepting samples.
    fn start(&mut self) -> KinettaResult<()>;

    /// Append one encoded sample to its track.
    fn write_sample(&mut self, sample: &EncodedSample) -> KinettaResult<()>;

    /// Finalize the container. Idempotent.
    fn stop(&mut self) -> KinettaResult<()>;
}

#[derive(Default)]
struct MemoryContainerState {
    prepared: bool,
    started: bool,
    stop_count: u32,
    tracks: Vec<TrackFormat>,
    samples: Vec<EncodedSample>,
}

/// In-memory container used by tests and headless runs. A paired
/// [`MemoryContainerView`] observes everything the writer received.
pub struct MemoryContainer {
    state: Arc<Mutex<MemoryContainerState>>,
}

/// Read side of a [`MemoryContainer`].
#[derive(Clone)]
pub struct MemoryContainerView {
    state: Arc<Mutex<MemoryContainerState>>,
}

fn lock_state(
    state: &Mutex<MemoryContainerState>,
) -> MutexGuard<'_, MemoryContainerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryContainer {
    /// Create a container plus its observer handle.
    pub fn new() -> (Self, MemoryContainerView) {
        let state = Arc::new(Mutex::new(MemoryContainerState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MemoryContainerView { state },
        )
    }
}

impl ContainerWriter for MemoryContainer {
    fn prepare(&mut self) -> KinettaResult<()> {
        lock_state(&self.state).prepared = true;
        Ok(())
    }

    fn add_track(&mut self, format: &TrackFormat) -> KinettaResult<()> {
        let mut state = lock_state(&self.state);
        if state.started {
            return Err(KinettaError::muxer("add_track after start"));
        }
        state.tracks.push(format.clone());
        Ok(())
    }

    fn start(&mut self) -> KinettaResult<()> {
        let mut state = lock_state(&self.state);
        if state.started {
            return Err(KinettaError::muxer("container started twice"));
        }
        state.started = true;
        Ok(())
    }

    fn write_sample(&mut self, sample: &EncodedSample) -> KinettaResult<()> {
        let mut state = lock_state(&self.state);
        if !state.started {
            return Err(KinettaError::evaluation(
                "write_sample on a container that was never started",
            ));
        }
        state.samples.push(sample.clone());
        Ok(())
    }

    fn stop(&mut self) -> KinettaResult<()> {
        lock_state(&self.state).stop_count += 1;
        Ok(())
    }
}

impl MemoryContainerView {
    /// Whether `prepare` ran.
    pub fn prepared(&self) -> bool {
        lock_state(&self.state).prepared
    }

    /// Whether `start` ran.
    pub fn started(&self) -> bool {
        lock_state(&self.state).started
    }

    /// How many times `stop` ran.
    pub fn stop_count(&self) -> u32 {
        lock_state(&self.state).stop_count
    }

    /// Registered track formats, in registration order.
    pub fn tracks(&self) -> Vec<TrackFormat> {
        lock_state(&self.state).tracks.clone()
    }

    /// Samples written, in write order.
    pub fn samples(&self) -> Vec<EncodedSample> {
        lock_state(&self.state).samples.clone()
    }
}

struct MuxerInner {
    writer: Box<dyn ContainerWriter>,
    expected: u32,
    ready: u32,
    stopped_encoders: u32,
    armed: bool,
    started: bool,
    finalized: bool,
    stop_requested: bool,
    pending: Vec<EncodedSample>,
    last_pts: [Option<MediaTimestamp>; 2],
}

/// Serializes concurrent encoder access to a [`ContainerWriter`].
///
/// Encoders register with `expect_encoder` before recording is armed. The
/// wrapped writer starts only once every expected track has reported its
/// format, and stops exactly once, when the last encoder deregisters via
/// `encoder_stopped`. Samples that arrive before start are buffered and
/// flushed in pts order.
pub struct MuxerWrapper {
    inner: Mutex<MuxerInner>,
}

impl MuxerWrapper {
    /// Wrap a container writer.
    pub fn new(writer: Box<dyn ContainerWriter>) -> Self {
        Self {
            inner: Mutex::new(MuxerInner {
                writer,
                expected: 0,
                ready: 0,
                stopped_encoders: 0,
                armed: false,
                started: false,
                finalized: false,
                stop_requested: false,
                pending: Vec::new(),
                last_pts: [None, None],
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MuxerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the underlying writer.
    pub fn prepare(&self) -> KinettaResult<()> {
        self.lock().writer.prepare()
    }

    /// Declare one more encoder the muxer must wait for.
    pub fn expect_encoder(&self) -> KinettaResult<()> {
        let mut inner = self.lock();
        if inner.armed {
            return Err(KinettaError::muxer(
                "encoder registered after recording was armed",
            ));
        }
        inner.expected += 1;
        Ok(())
    }

    /// Arm the muxer: no further encoders may register, and the writer
    /// starts as soon as all registered tracks are format-ready.
    pub fn start_recording(&self) -> KinettaResult<()> {
        let mut inner = self.lock();
        if inner.armed {
            return Err(KinettaError::muxer("recording started twice"));
        }
        inner.armed = true;
        maybe_start(&mut inner)
    }

    /// Report one track's output format. When this completes the expected
    /// set and the muxer is armed, the writer starts and buffered samples
    /// flush in pts order.
    pub fn format_ready(&self, format: &TrackFormat) -> KinettaResult<()> {
        let mut inner = self.lock();
        if inner.started {
            return Err(KinettaError::muxer("format change after start"));
        }
        inner.writer.add_track(format)?;
        inner.ready += 1;
        if inner.ready > inner.expected {
            return Err(KinettaError::muxer(
                "more formats reported than encoders registered",
            ));
        }
        maybe_start(&mut inner)
    }

    /// Write one sample, buffering it if the writer has not started yet.
    ///
    /// Encoder workers run ahead of `start_recording`, so pre-start samples
    /// are held and flushed once every track is format-ready.
    pub fn write_sample(&self, sample: &EncodedSample) -> KinettaResult<()> {
        let mut inner = self.lock();
        if inner.finalized {
            tracing::warn!(track = ?sample.track, pts_us = sample.pts.as_us(), "dropping sample written after finalize");
            return Ok(());
        }
        if !inner.started {
            inner.pending.push(sample.clone());
            return Ok(());
        }
        write_checked(&mut inner, sample)
    }

    /// Deregister one encoder. Returns `true` when this was the last one
    /// and the container was finalized.
    pub fn encoder_stopped(&self) -> KinettaResult<bool> {
        let mut inner = self.lock();
        inner.stopped_encoders += 1;
        if inner.stopped_encoders >= inner.expected {
            finalize(&mut inner)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Request finalization. Idempotent; when no encoders are registered
    /// (or all have already deregistered) the container finalizes here,
    /// otherwise the last `encoder_stopped` call finalizes it.
    pub fn stop_recording(&self) -> KinettaResult<()> {
        let mut inner = self.lock();
        inner.stop_requested = true;
        if inner.stopped_encoders >= inner.expected {
            finalize(&mut inner)?;
        }
        Ok(())
    }

    /// Finalize the container now, regardless of outstanding encoder
    /// deregistrations. Idempotent. For teardown paths where a worker is
    /// known to be gone without having deregistered.
    pub fn force_finalize(&self) -> KinettaResult<()> {
        let mut inner = self.lock();
        finalize(&mut inner)
    }

    /// Whether the underlying writer has started.
    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    /// Whether the container has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.lock().finalized
    }
}

fn maybe_start(inner: &mut MuxerInner) -> KinettaResult<()> {
    if !inner.armed || inner.started || inner.ready < inner.expected {
        return Ok(());
    }
    inner.writer.start()?;
    inner.started = true;
    let mut pending = std::mem::take(&mut inner.pending);
    pending.sort_by_key(|s| s.pts);
    for sample in &pending {
        write_checked(inner, sample)?;
    }
    Ok(())
}

fn write_checked(inner: &mut MuxerInner, sample: &EncodedSample) -> KinettaResult<()> {
    let slot = &mut inner.last_pts[sample.track.index()];
    if let Some(last) = *slot
        && sample.pts < last
    {
        return Err(KinettaError::evaluation(format!(
            "pts went backwards on {:?} track: {} < {}",
            sample.track,
            sample.pts.as_us(),
            last.as_us()
        )));
    }
    *slot = Some(sample.pts);
    inner.writer.write_sample(sample)
}

fn finalize(inner: &mut MuxerInner) -> KinettaResult<()> {
    if inner.finalized {
        return Ok(());
    }
    inner.finalized = true;
    inner.pending.clear();
    inner.writer.stop()
}

#[cfg(test)]
#[path = "../../tests/unit/record/muxer.rs"]
mod tests;

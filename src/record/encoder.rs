use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::foundation::core::MediaTimestamp;
use crate::foundation::error::{KinettaError, KinettaResult};
use crate::gpu::device::{RawFrame, SinkFrame, SurfaceSink};
use crate::record::codec::{
    AudioCodec, AudioCodecConfig, PcmChunk, VideoCodec, VideoCodecConfig,
};
use crate::record::muxer::MuxerWrapper;
use crate::record::sample::{EncodedSample, TrackKind};

/// Lifecycle notifications an encoder worker posts to its owner.
#[derive(Debug)]
pub enum EncoderEvent {
    /// The encoder configured its codec and registered with the muxer.
    Prepared(TrackKind),
    /// The encoder drained its codec and deregistered from the muxer.
    Stopped(TrackKind),
    /// This encoder was the last one out and the container finalized.
    MuxerStopped,
    /// The worker hit an unrecoverable error and is shutting down.
    Error(TrackKind, KinettaError),
}

/// Frames queued between the render thread and a video encoder worker.
///
/// Bounded: when the worker falls behind, the oldest frame is dropped so
/// the render thread never blocks on the encoder.
const VIDEO_QUEUE_CAP: usize = 8;

struct VideoInputQueue {
    frames: Mutex<VecDeque<SinkFrame>>,
    cond: Condvar,
    stop: AtomicBool,
}

fn lock_frames(queue: &VideoInputQueue) -> MutexGuard<'_, VecDeque<SinkFrame>> {
    queue.frames.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SurfaceSink for VideoInputQueue {
    fn on_frame(&self, frame: SinkFrame) {
        let mut frames = lock_frames(self);
        if frames.len() >= VIDEO_QUEUE_CAP {
            tracing::warn!("video encoder input queue full, dropping oldest frame");
            frames.pop_front();
        }
        frames.push_back(frame);
        drop(frames);
        self.cond.notify_one();
    }
}

impl VideoInputQueue {
    fn pop_wait(&self, timeout: Duration) -> Option<SinkFrame> {
        let mut frames = lock_frames(self);
        if frames.is_empty() && !self.stop.load(Ordering::Acquire) {
            let (guard, _) = self
                .cond
                .wait_timeout(frames, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            frames = guard;
        }
        frames.pop_front()
    }
}

/// Return a pts that is monotonic relative to `prev`, Android-encoder style:
/// wall-clock elapsed time, clamped forward by at least one microsecond.
fn monotonic_pts(elapsed_us: i64, prev: Option<MediaTimestamp>) -> MediaTimestamp {
    match prev {
        Some(p) if elapsed_us <= p.as_us() => p.add_us(1),
        _ => MediaTimestamp(elapsed_us),
    }
}

fn forward_format(
    muxer: &MuxerWrapper,
    format: Option<crate::record::sample::TrackFormat>,
    forwarded: &mut bool,
) -> KinettaResult<()> {
    if !*forwarded
        && let Some(format) = format
    {
        muxer.format_ready(&format)?;
        *forwarded = true;
    }
    Ok(())
}

fn forward_samples(
    muxer: &MuxerWrapper,
    samples: impl IntoIterator<Item = EncodedSample>,
) -> KinettaResult<()> {
    for sample in samples {
        muxer.write_sample(&sample)?;
    }
    Ok(())
}

/// Owns a video codec on a worker thread, fed by a [`SurfaceSink`] that the
/// render thread attaches to an encoder surface.
pub struct VideoEncoder {
    input: Arc<VideoInputQueue>,
    worker: Option<JoinHandle<()>>,
}

impl VideoEncoder {
    /// Configure `codec`, register with `muxer`, and spawn the drain worker.
    pub fn new(
        muxer: Arc<MuxerWrapper>,
        events: Sender<EncoderEvent>,
        mut codec: Box<dyn VideoCodec>,
        cfg: VideoCodecConfig,
    ) -> KinettaResult<Self> {
        codec.configure(&cfg)?;
        muxer.expect_encoder()?;
        let _ = events.send(EncoderEvent::Prepared(TrackKind::Video));

        let input = Arc::new(VideoInputQueue {
            frames: Mutex::new(VecDeque::new()),
            cond: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let queue = Arc::clone(&input);
        let worker = std::thread::Builder::new()
            .name("kinetta-venc".to_string())
            .spawn(move || video_worker(queue, muxer, events, codec))
            .map_err(|e| KinettaError::codec(format!("failed to spawn video worker: {e}")))?;

        Ok(Self {
            input,
            worker: Some(worker),
        })
    }

    /// The sink to attach to an encoder surface.
    pub fn sink(&self) -> Arc<dyn SurfaceSink> {
        Arc::clone(&self.input) as Arc<dyn SurfaceSink>
    }

    /// Nudge the worker; frames may be waiting.
    pub fn frame_available_soon(&self) {
        self.input.cond.notify_one();
    }

    /// Stop accepting frames, drain the codec, and join the worker.
    pub fn stop(&mut self) -> KinettaResult<()> {
        self.input.stop.store(true, Ordering::Release);
        self.input.cond.notify_all();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            return Err(KinettaError::codec("video encoder worker panicked"));
        }
        Ok(())
    }
}

impl Drop for VideoEncoder {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn video_worker(
    queue: Arc<VideoInputQueue>,
    muxer: Arc<MuxerWrapper>,
    events: Sender<EncoderEvent>,
    mut codec: Box<dyn VideoCodec>,
) {
    let started = Instant::now();
    let mut forwarded = false;
    let mut prev: Option<MediaTimestamp> = None;

    let result = (|| -> KinettaResult<()> {
        loop {
            forward_format(&muxer, codec.format(), &mut forwarded)?;
            match queue.pop_wait(Duration::from_millis(10)) {
                Some(frame) => {
                    let elapsed = started.elapsed().as_micros() as i64;
                    let pts = monotonic_pts(elapsed, prev);
                    prev = Some(pts);
                    let raw = RawFrame {
                        resolution: frame.resolution,
                        data: frame.data,
                        pts,
                    };
                    forward_samples(&muxer, codec.encode(&raw)?)?;
                }
                None => {
                    if queue.stop.load(Ordering::Acquire) && lock_frames(&queue).is_empty() {
                        break;
                    }
                }
            }
        }
        let tail = codec.finish()?;
        forward_format(&muxer, codec.format(), &mut forwarded)?;
        forward_samples(&muxer, tail)?;
        Ok(())
    })();

    if let Err(err) = result {
        let _ = events.send(EncoderEvent::Error(TrackKind::Video, err));
    }
    match muxer.encoder_stopped() {
        Ok(finalized) => {
            let _ = events.send(EncoderEvent::Stopped(TrackKind::Video));
            if finalized {
                let _ = events.send(EncoderEvent::MuxerStopped);
            }
        }
        Err(err) => {
            let _ = events.send(EncoderEvent::Error(TrackKind::Video, err));
        }
    }
}

/// Where an audio encoder pulls PCM from.
///
/// `next_chunk` returns `Ok(None)` when no data is available right now; the
/// worker parks briefly and asks again until stopped.
pub trait AudioSource: Send {
    /// Sample rate of produced PCM in Hz.
    fn sample_rate(&self) -> u32;
    /// Interleaved channel count.
    fn channels(&self) -> u16;
    /// Pull the next chunk, if any is ready.
    fn next_chunk(&mut self) -> KinettaResult<Option<PcmChunk>>;
}

/// Real-time silence generator, used when a recording wants an audio track
/// but no capture device is wired up. Paces itself against the wall clock
/// and never produces ahead of it.
pub struct SilenceSource {
    sample_rate: u32,
    channels: u16,
    started: Instant,
    produced_frames: u64,
}

/// Largest chunk the silence generator emits at once, in sample frames.
const SILENCE_CHUNK_FRAMES: u64 = 1024;

impl SilenceSource {
    /// Create a silence source with the given stream parameters. The wall
    /// clock starts here, so time spent before the first pull still yields
    /// samples.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            started: Instant::now(),
            produced_frames: 0,
        }
    }
}

impl AudioSource for SilenceSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn next_chunk(&mut self) -> KinettaResult<Option<PcmChunk>> {
        let elapsed_frames =
            self.started.elapsed().as_micros() as u64 * u64::from(self.sample_rate) / 1_000_000;
        if elapsed_frames <= self.produced_frames {
            return Ok(None);
        }
        let frames = (elapsed_frames - self.produced_frames).min(SILENCE_CHUNK_FRAMES);
        let pts = MediaTimestamp(
            (self.produced_frames.saturating_mul(1_000_000) / u64::from(self.sample_rate.max(1)))
                as i64,
        );
        self.produced_frames += frames;
        Ok(Some(PcmChunk {
            samples: vec![0.0; (frames * u64::from(self.channels)) as usize],
            pts,
        }))
    }
}

/// Deterministic source backed by a preloaded buffer; yields fixed-size
/// chunks until the buffer is exhausted, then `None` forever.
pub struct BufferSource {
    sample_rate: u32,
    channels: u16,
    samples: Vec<f32>,
    cursor: usize,
}

impl BufferSource {
    /// Wrap interleaved f32 PCM.
    pub fn new(sample_rate: u32, channels: u16, samples: Vec<f32>) -> Self {
        Self {
            sample_rate,
            channels,
            samples,
            cursor: 0,
        }
    }
}

impl AudioSource for BufferSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn next_chunk(&mut self) -> KinettaResult<Option<PcmChunk>> {
        if self.cursor >= self.samples.len() {
            return Ok(None);
        }
        let per_chunk = (SILENCE_CHUNK_FRAMES as usize) * usize::from(self.channels.max(1));
        let end = (self.cursor + per_chunk).min(self.samples.len());
        let pts = MediaTimestamp(
            ((self.cursor / usize::from(self.channels.max(1))) as i64)
                .saturating_mul(1_000_000)
                / i64::from(self.sample_rate.max(1)),
        );
        let chunk = PcmChunk {
            samples: self.samples[self.cursor..end].to_vec(),
            pts,
        };
        self.cursor = end;
        Ok(Some(chunk))
    }
}

/// Owns an audio codec on a worker thread that pulls from an [`AudioSource`].
pub struct AudioEncoder {
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl AudioEncoder {
    /// Configure `codec`, register with `muxer`, and spawn the pull worker.
    pub fn new(
        muxer: Arc<MuxerWrapper>,
        events: Sender<EncoderEvent>,
        mut codec: Box<dyn AudioCodec>,
        cfg: AudioCodecConfig,
        source: Box<dyn AudioSource>,
    ) -> KinettaResult<Self> {
        if source.sample_rate() != cfg.sample_rate || source.channels() != cfg.channels {
            return Err(KinettaError::codec(
                "audio source format does not match codec configuration",
            ));
        }
        codec.configure(&cfg)?;
        muxer.expect_encoder()?;
        let _ = events.send(EncoderEvent::Prepared(TrackKind::Audio));

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let worker = std::thread::Builder::new()
            .name("kinetta-aenc".to_string())
            .spawn(move || audio_worker(flag, muxer, events, codec, source))
            .map_err(|e| KinettaError::codec(format!("failed to spawn audio worker: {e}")))?;

        Ok(Self {
            stop,
            worker: Some(worker),
        })
    }

    /// Stop pulling, drain the codec, and join the worker.
    pub fn stop(&mut self) -> KinettaResult<()> {
        self.stop.store(true, Ordering::Release);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            return Err(KinettaError::codec("audio encoder worker panicked"));
        }
        Ok(())
    }
}

impl Drop for AudioEncoder {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn audio_worker(
    stop: Arc<AtomicBool>,
    muxer: Arc<MuxerWrapper>,
    events: Sender<EncoderEvent>,
    mut codec: Box<dyn AudioCodec>,
    mut source: Box<dyn AudioSource>,
) {
    let mut forwarded = false;

    let result = (|| -> KinettaResult<()> {
        while !stop.load(Ordering::Acquire) {
            forward_format(&muxer, codec.format(), &mut forwarded)?;
            match source.next_chunk()? {
                Some(chunk) => forward_samples(&muxer, codec.encode(&chunk)?)?,
                None => std::thread::sleep(Duration::from_millis(2)),
            }
        }
        let tail = codec.finish()?;
        forward_format(&muxer, codec.format(), &mut forwarded)?;
        forward_samples(&muxer, tail)?;
        Ok(())
    })();

    if let Err(err) = result {
        let _ = events.send(EncoderEvent::Error(TrackKind::Audio, err));
    }
    match muxer.encoder_stopped() {
        Ok(finalized) => {
            let _ = events.send(EncoderEvent::Stopped(TrackKind::Audio));
            if finalized {
                let _ = events.send(EncoderEvent::MuxerStopped);
            }
        }
        Err(err) => {
            let _ = events.send(EncoderEvent::Error(TrackKind::Audio, err));
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/record/encoder.rs"]
mod tests;

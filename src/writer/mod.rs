//! Recording as a filter: a terminal pipeline stage that mirrors each frame
//! into an encoder-bound surface while recording is active.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Arc, Mutex, PoisonError};

use crate::foundation::core::{Fps, Resolution};
use crate::foundation::error::{KinettaError, KinettaResult};
use crate::filter::base::{Filter, FilterState};
use crate::gpu::device::{GpuDevice, QuadGeometry, SurfaceId, TextureId};
use crate::record::codec::{AudioCodec, AudioCodecConfig, VideoCodec, VideoCodecConfig};
use crate::record::encoder::{
    AudioEncoder, AudioSource, EncoderEvent, SilenceSource, VideoEncoder,
};
use crate::record::ffmpeg::{AdtsAudioCodec, IvfVideoCodec};
use crate::record::mp4::{Mp4Writer, Mp4WriterOpts};
use crate::record::muxer::{ContainerWriter, MuxerWrapper};

/// Where a recording lands.
pub enum RecordingTarget {
    /// Remux to an MP4 file at this path.
    Mp4Path(PathBuf),
    /// Write into a caller-supplied container.
    Container(Box<dyn ContainerWriter>),
}

/// Audio side of a recording.
pub struct AudioTrackConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    /// The codec encoding the track.
    pub codec: Box<dyn AudioCodec>,
    /// Where PCM comes from.
    pub source: Box<dyn AudioSource>,
}

/// Everything one recording needs: output geometry, codecs, and target.
pub struct RecordingConfig {
    /// Recorded frame dimensions.
    pub resolution: Resolution,
    /// Nominal recorded frame rate.
    pub fps: Fps,
    /// Video bitrate in bits per second.
    pub video_bitrate: u32,
    /// Destination container.
    pub target: RecordingTarget,
    /// The codec encoding the video track.
    pub video_codec: Box<dyn VideoCodec>,
    /// Optional audio track.
    pub audio: Option<AudioTrackConfig>,
}

impl RecordingConfig {
    /// The stock configuration: VP9 video plus silent AAC audio, remuxed to
    /// an MP4 file. Requires `ffmpeg` on `PATH` at start time.
    pub fn mp4(out_path: impl Into<PathBuf>, resolution: Resolution, fps: Fps) -> Self {
        let sample_rate = 44_100;
        let channels = 2;
        Self {
            resolution,
            fps,
            video_bitrate: 4_000_000,
            target: RecordingTarget::Mp4Path(out_path.into()),
            video_codec: Box::new(IvfVideoCodec::new()),
            audio: Some(AudioTrackConfig {
                sample_rate,
                channels,
                bitrate: 128_000,
                codec: Box::new(AdtsAudioCodec::new()),
                source: Box::new(SilenceSource::new(sample_rate, channels)),
            }),
        }
    }
}

enum WriterCommand {
    Start(Box<RecordingConfig>),
    Stop,
}

/// Cloneable control handle for a [`MovieWriter`].
///
/// Commands are queued and take effect on the render thread during the
/// writer's next draw; errors raised there surface through `take_error`.
#[derive(Clone)]
pub struct MovieWriterHandle {
    tx: Sender<WriterCommand>,
    last_error: Arc<Mutex<Option<KinettaError>>>,
    recording: Arc<AtomicBool>,
}

impl MovieWriterHandle {
    /// Queue a recording start. A no-op (with a warning) if a recording is
    /// already active when the command is processed.
    pub fn start_recording(&self, config: RecordingConfig) -> KinettaResult<()> {
        self.tx
            .send(WriterCommand::Start(Box::new(config)))
            .map_err(|_| KinettaError::validation("movie writer is gone"))
    }

    /// Queue a recording stop. A no-op if idle when processed.
    pub fn stop_recording(&self) -> KinettaResult<()> {
        self.tx
            .send(WriterCommand::Stop)
            .map_err(|_| KinettaError::validation("movie writer is gone"))
    }

    /// Take the most recent render-thread error, if any.
    pub fn take_error(&self) -> Option<KinettaError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Whether a recording session is currently active.
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Acquire)
    }

    fn post_error(&self, err: KinettaError) {
        tracing::warn!(error = %err, "movie writer error");
        let mut slot = self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            *slot = Some(err);
        }
    }
}

struct RecordingSession {
    muxer: Arc<MuxerWrapper>,
    video: VideoEncoder,
    audio: Option<AudioEncoder>,
    events: Receiver<EncoderEvent>,
    codec_surface: Option<SurfaceId>,
    resolution: Resolution,
}

enum WriterState {
    Idle,
    Recording(Box<RecordingSession>),
}

/// A terminal filter that passes frames through to the bound target and,
/// while a recording is active, draws each frame a second time into an
/// encoder-bound surface and swaps it toward the video encoder.
///
/// The encoder surface is created lazily on the first recorded frame and
/// recreated (with a warning) if the device reports it lost.
pub struct MovieWriter {
    base: FilterState,
    control_rx: Receiver<WriterCommand>,
    handle: MovieWriterHandle,
    state: WriterState,
}

impl MovieWriter {
    /// Create an idle writer.
    pub fn new() -> Self {
        let (tx, control_rx) = channel();
        Self {
            base: FilterState::passthrough(),
            control_rx,
            handle: MovieWriterHandle {
                tx,
                last_error: Arc::new(Mutex::new(None)),
                recording: Arc::new(AtomicBool::new(false)),
            },
            state: WriterState::Idle,
        }
    }

    /// The control handle paired with this writer.
    pub fn handle(&self) -> MovieWriterHandle {
        self.handle.clone()
    }

    /// Drain queued control commands. Runs on the render thread; also
    /// callable between frames so start/stop take effect while no frames
    /// flow.
    pub fn process_control(&mut self, device: &mut dyn GpuDevice) {
        while let Ok(cmd) = self.control_rx.try_recv() {
            match cmd {
                WriterCommand::Start(config) => self.begin_recording(*config),
                WriterCommand::Stop => self.end_recording(device),
            }
        }
    }

    /// Start a recording immediately. A no-op (with a warning) when one is
    /// already active. Must run on the render thread.
    pub(crate) fn begin_recording(&mut self, config: RecordingConfig) {
        if matches!(self.state, WriterState::Recording(_)) {
            tracing::warn!("start_recording ignored, already recording");
            return;
        }
        match start_session(config) {
            Ok(session) => {
                self.handle.recording.store(true, Ordering::Release);
                self.state = WriterState::Recording(Box::new(session));
            }
            Err(err) => self.handle.post_error(err),
        }
    }

    /// Stop the active recording immediately, if any. Must run on the
    /// render thread.
    pub(crate) fn end_recording(&mut self, device: &mut dyn GpuDevice) {
        self.stop_session(device);
    }

    fn stop_session(&mut self, device: &mut dyn GpuDevice) {
        let WriterState::Recording(mut session) =
            std::mem::replace(&mut self.state, WriterState::Idle)
        else {
            return;
        };
        self.handle.recording.store(false, Ordering::Release);

        if let Err(err) = session.muxer.stop_recording() {
            self.handle.post_error(err);
        }
        // A failed join means that worker never deregistered; the muxer
        // would otherwise wait on it forever.
        let mut worker_lost = false;
        if let Err(err) = session.video.stop() {
            worker_lost = true;
            self.handle.post_error(err);
        }
        if let Some(mut audio) = session.audio.take()
            && let Err(err) = audio.stop()
        {
            worker_lost = true;
            self.handle.post_error(err);
        }
        while let Ok(event) = session.events.try_recv() {
            match event {
                EncoderEvent::Error(kind, err) => {
                    tracing::warn!(track = ?kind, "encoder reported error");
                    self.handle.post_error(err);
                }
                EncoderEvent::MuxerStopped => {
                    tracing::debug!("container finalized");
                }
                EncoderEvent::Prepared(_) | EncoderEvent::Stopped(_) => {}
            }
        }
        if !session.muxer.is_finalized() {
            let result = if worker_lost {
                session.muxer.force_finalize()
            } else {
                session.muxer.stop_recording()
            };
            if let Err(err) = result {
                self.handle.post_error(err);
            }
        }
        if let Some(surface) = session.codec_surface.take() {
            device.destroy_surface(surface);
        }
    }
}

impl Default for MovieWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn start_session(config: RecordingConfig) -> KinettaResult<RecordingSession> {
    let writer: Box<dyn ContainerWriter> = match config.target {
        RecordingTarget::Mp4Path(path) => Box::new(Mp4Writer::new(Mp4WriterOpts::new(path))),
        RecordingTarget::Container(writer) => writer,
    };
    let muxer = Arc::new(MuxerWrapper::new(writer));
    muxer.prepare()?;

    let (events_tx, events) = channel();
    let video = VideoEncoder::new(
        Arc::clone(&muxer),
        events_tx.clone(),
        config.video_codec,
        VideoCodecConfig {
            resolution: config.resolution,
            fps: config.fps,
            bitrate: config.video_bitrate,
        },
    )?;

    let audio = match config.audio {
        Some(audio_cfg) => Some(AudioEncoder::new(
            Arc::clone(&muxer),
            events_tx,
            audio_cfg.codec,
            AudioCodecConfig {
                sample_rate: audio_cfg.sample_rate,
                channels: audio_cfg.channels,
                bitrate: audio_cfg.bitrate,
            },
            audio_cfg.source,
        )?),
        None => None,
    };

    muxer.start_recording()?;
    Ok(RecordingSession {
        muxer,
        video,
        audio,
        events,
        codec_surface: None,
        resolution: config.resolution,
    })
}

fn encoder_surface(
    session: &mut RecordingSession,
    device: &mut dyn GpuDevice,
) -> KinettaResult<SurfaceId> {
    if let Some(surface) = session.codec_surface {
        if device.surface_alive(surface) {
            return Ok(surface);
        }
        tracing::warn!("encoder surface lost, recreating");
        device.destroy_surface(surface);
        session.codec_surface = None;
    }
    let surface = device.create_encoder_surface(session.resolution, session.video.sink())?;
    session.codec_surface = Some(surface);
    Ok(surface)
}

fn encode_pass(
    session: &mut RecordingSession,
    base: &mut FilterState,
    device: &mut dyn GpuDevice,
    input: TextureId,
    geometry: &QuadGeometry,
) -> KinettaResult<()> {
    let surface = encoder_surface(session, device)?;
    device.make_current(surface)?;
    base.draw(device, input, geometry)?;
    device.swap(surface)?;
    session.video.frame_available_soon();
    Ok(())
}

impl Filter for MovieWriter {
    fn init(&mut self, device: &mut dyn GpuDevice) -> KinettaResult<()> {
        self.base.init(device)
    }

    fn output_size_changed(
        &mut self,
        _device: &mut dyn GpuDevice,
        size: Resolution,
    ) -> KinettaResult<()> {
        self.base.set_output_size(size);
        Ok(())
    }

    fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        input: TextureId,
        geometry: &QuadGeometry,
    ) -> KinettaResult<()> {
        self.process_control(device);

        // First draw: the live target.
        if !self.base.draw(device, input, geometry)? {
            return Ok(());
        }

        // Second draw: mirror into the encoder surface, restoring the live
        // surface afterwards even when the encode pass fails.
        if let WriterState::Recording(session) = &mut self.state {
            let prev = device.current_surface();
            let result = encode_pass(session, &mut self.base, device, input, geometry);
            if let Some(prev) = prev {
                let _ = device.make_current(prev);
            }
            result?;
        }
        Ok(())
    }

    fn destroy(&mut self, device: &mut dyn GpuDevice) {
        self.stop_session(device);
        self.base.destroy(device);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/writer.rs"]
mod tests;

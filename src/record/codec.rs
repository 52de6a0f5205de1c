use smallvec::SmallVec;

use crate::foundation::core::{Fps, MediaTimestamp, Resolution};
use crate::foundation::error::{KinettaError, KinettaResult};
use crate::gpu::device::RawFrame;
use crate::record::sample::{
    EncodedSample, SampleFlags, Timebase, TrackDetail, TrackFormat, TrackKind,
};

/// Samples produced by one codec drain.
pub type SampleBatch = SmallVec<[EncodedSample; 4]>;

/// Video codec configuration.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct VideoCodecConfig {
    /// Coded frame dimensions.
    pub resolution: Resolution,
    /// Nominal frame rate.
    pub fps: Fps,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
}

/// Audio codec configuration.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct AudioCodecConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
}

/// A chunk of interleaved f32 PCM with the timestamp of its first frame.
#[derive(Clone, Debug)]
pub struct PcmChunk {
    /// Interleaved samples.
    pub samples: Vec<f32>,
    /// Timestamp of the first sample frame.
    pub pts: MediaTimestamp,
}

/// The platform video-codec seam.
///
/// `configure` validates and arms the codec; `encode` consumes one raw frame
/// and returns whatever encoded samples the codec has produced so far;
/// `finish` signals end of stream and drains the remainder. `format`
/// becomes `Some` once the codec knows its output format: immediately
/// after configuration for raw codecs, after the first drained sample for
/// stream codecs.
pub trait VideoCodec: Send {
    /// Configure the codec. Failure is [`KinettaError::CodecConfig`] and
    /// aborts the recording-start sequence.
    ///
    /// [`KinettaError::CodecConfig`]: crate::KinettaError::CodecConfig
    fn configure(&mut self, cfg: &VideoCodecConfig) -> KinettaResult<()>;

    /// The output format, once known.
    fn format(&self) -> Option<TrackFormat>;

    /// Consume one raw frame, returning any samples produced.
    fn encode(&mut self, frame: &RawFrame) -> KinettaResult<SampleBatch>;

    /// Signal end of stream and drain remaining samples.
    fn finish(&mut self) -> KinettaResult<Vec<EncodedSample>>;
}

/// The platform audio-codec seam. See [`VideoCodec`] for the drive protocol.
pub trait AudioCodec: Send {
    /// Configure the codec. Failure aborts the recording-start sequence.
    fn configure(&mut self, cfg: &AudioCodecConfig) -> KinettaResult<()>;

    /// The output format, once known.
    fn format(&self) -> Option<TrackFormat>;

    /// Consume one PCM chunk, returning any samples produced.
    fn encode(&mut self, pcm: &PcmChunk) -> KinettaResult<SampleBatch>;

    /// Signal end of stream and drain remaining samples.
    fn finish(&mut self) -> KinettaResult<Vec<EncodedSample>>;
}

/// Store-raw video "codec": every input frame becomes one key sample
/// carrying the untouched RGBA bytes.
///
/// Deterministic and dependency-free; the test and debugging counterpart of
/// the ffmpeg-backed codecs.
#[derive(Default)]
pub struct RawVideoCodec {
    format: Option<TrackFormat>,
}

impl RawVideoCodec {
    /// Create an unconfigured codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl VideoCodec for RawVideoCodec {
    fn configure(&mut self, cfg: &VideoCodecConfig) -> KinettaResult<()> {
        if self.format.is_some() {
            return Err(KinettaError::codec("video codec configured twice"));
        }
        self.format = Some(TrackFormat {
            kind: TrackKind::Video,
            codec_name: "rawvideo".to_string(),
            extradata: Vec::new(),
            timebase: Timebase::MICROS,
            detail: TrackDetail::Video {
                resolution: cfg.resolution,
                fps: cfg.fps,
            },
        });
        Ok(())
    }

    fn format(&self) -> Option<TrackFormat> {
        self.format.clone()
    }

    fn encode(&mut self, frame: &RawFrame) -> KinettaResult<SampleBatch> {
        if self.format.is_none() {
            return Err(KinettaError::codec("video codec not configured"));
        }
        let mut out = SampleBatch::new();
        out.push(EncodedSample {
            track: TrackKind::Video,
            pts: frame.pts,
            flags: SampleFlags {
                key: true,
                end_of_stream: false,
            },
            data: frame.data.clone(),
        });
        Ok(out)
    }

    fn finish(&mut self) -> KinettaResult<Vec<EncodedSample>> {
        Ok(Vec::new())
    }
}

/// Store-raw audio "codec": PCM chunks pass through as f32le bytes.
#[derive(Default)]
pub struct PcmAudioCodec {
    format: Option<TrackFormat>,
}

impl PcmAudioCodec {
    /// Create an unconfigured codec.
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioCodec for PcmAudioCodec {
    fn configure(&mut self, cfg: &AudioCodecConfig) -> KinettaResult<()> {
        if self.format.is_some() {
            return Err(KinettaError::codec("audio codec configured twice"));
        }
        if cfg.sample_rate == 0 || cfg.channels == 0 {
            return Err(KinettaError::codec(
                "audio sample_rate and channels must be non-zero",
            ));
        }
        self.format = Some(TrackFormat {
            kind: TrackKind::Audio,
            codec_name: "pcm_f32le".to_string(),
            extradata: Vec::new(),
            timebase: Timebase::hz(cfg.sample_rate),
            detail: TrackDetail::Audio {
                sample_rate: cfg.sample_rate,
                channels: cfg.channels,
            },
        });
        Ok(())
    }

    fn format(&self) -> Option<TrackFormat> {
        self.format.clone()
    }

    fn encode(&mut self, pcm: &PcmChunk) -> KinettaResult<SampleBatch> {
        if self.format.is_none() {
            return Err(KinettaError::codec("audio codec not configured"));
        }
        let mut out = SampleBatch::new();
        if pcm.samples.is_empty() {
            return Ok(out);
        }
        let mut data = Vec::with_capacity(pcm.samples.len() * 4);
        for s in &pcm.samples {
            data.extend_from_slice(&s.to_le_bytes());
        }
        out.push(EncodedSample {
            track: TrackKind::Audio,
            pts: pcm.pts,
            flags: SampleFlags {
                key: true,
                end_of_stream: false,
            },
            data,
        });
        Ok(out)
    }

    fn finish(&mut self) -> KinettaResult<Vec<EncodedSample>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/record/codec.rs"]
mod tests;

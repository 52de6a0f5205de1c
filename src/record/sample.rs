use crate::foundation::core::{Fps, MediaTimestamp, Resolution};

/// Which stream of the container a sample or format belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TrackKind {
    /// The video track.
    Video,
    /// The audio track.
    Audio,
}

impl TrackKind {
    pub(crate) fn index(self) -> usize {
        match self {
            TrackKind::Video => 0,
            TrackKind::Audio => 1,
        }
    }
}

/// Flags attached to an encoded sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SampleFlags {
    /// Sample is a sync point (key frame).
    pub key: bool,
    /// Sample is the last of its track.
    pub end_of_stream: bool,
}

/// A timestamped encoded buffer belonging to one track.
///
/// Ordering within a track is non-decreasing by `pts`; the muxer serializes
/// cross-track interleaving.
#[derive(Clone, Debug)]
pub struct EncodedSample {
    /// Owning track.
    pub track: TrackKind,
    /// Presentation timestamp.
    pub pts: MediaTimestamp,
    /// Sample flags.
    pub flags: SampleFlags,
    /// Encoded payload bytes.
    pub data: Vec<u8>,
}

/// Stream-level detail of a track format.
#[derive(Clone, Debug, PartialEq)]
pub enum TrackDetail {
    /// Video stream parameters.
    Video {
        /// Coded frame dimensions.
        resolution: Resolution,
        /// Nominal frame rate.
        fps: Fps,
    },
    /// Audio stream parameters.
    Audio {
        /// Sample rate in Hz.
        sample_rate: u32,
        /// Interleaved channel count.
        channels: u16,
    },
}

/// Tick duration of a track's container timestamps: each tick lasts
/// `num / den` seconds. Kept rational so fractional rates such as NTSC
/// 1001/30000 survive without truncation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Timebase {
    /// Seconds-per-tick numerator.
    pub num: u32,
    /// Seconds-per-tick denominator.
    pub den: u32,
}

impl Timebase {
    /// One tick per microsecond.
    pub const MICROS: Timebase = Timebase {
        num: 1,
        den: 1_000_000,
    };

    /// `rate` ticks per second.
    pub fn hz(rate: u32) -> Self {
        Self {
            num: 1,
            den: rate.max(1),
        }
    }

    /// Convert a tick count to microseconds, truncating.
    pub fn ticks_to_us(self, ticks: u64) -> i64 {
        let num = u128::from(self.num.max(1));
        let den = u128::from(self.den.max(1));
        (u128::from(ticks) * 1_000_000 * num / den).min(i64::MAX as u128) as i64
    }

    /// Convert microseconds to the nearest tick count. Rounds rather than
    /// floors: at coarse timebases flooring maps consecutive frame
    /// timestamps onto the same tick.
    pub fn us_to_ticks(self, us: i64) -> u64 {
        let num = u128::from(self.num.max(1));
        let den = u128::from(self.den.max(1));
        let unit = 1_000_000 * num;
        (((us.max(0) as u128) * den + unit / 2) / unit).min(u64::MAX as u128) as u64
    }
}

/// Format a codec reports for its output stream, exactly once, when the
/// underlying codec learns it.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackFormat {
    /// Owning track.
    pub kind: TrackKind,
    /// Codec identifier, e.g. `vp9(ivf)` or `aac(adts)`.
    pub codec_name: String,
    /// Out-of-band stream header bytes, empty when the stream is
    /// self-delimiting.
    pub extradata: Vec<u8>,
    /// Timebase of the pts ticks a container writer should emit for this
    /// track.
    pub timebase: Timebase,
    /// Stream-level parameters.
    pub detail: TrackDetail,
}

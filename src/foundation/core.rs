use crate::foundation::error::{KinettaError, KinettaResult};

/// Absolute 0-based frame index in pipeline submission order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

/// Frames-per-second represented as a rational `num/den`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Fps {
    /// Numerator (frames).
    pub num: u32,
    /// Denominator (seconds), must be non-zero.
    pub den: u32,
}

impl Fps {
    /// Create a validated FPS value.
    pub fn new(num: u32, den: u32) -> KinettaResult<Self> {
        if den == 0 {
            return Err(KinettaError::validation("Fps den must be > 0"));
        }
        if num == 0 {
            return Err(KinettaError::validation("Fps num must be > 0"));
        }
        Ok(Self { num, den })
    }

    /// Convert to floating-point FPS.
    pub fn as_f64(self) -> f64 {
        f64::from(self.num) / f64::from(self.den)
    }

    /// Duration of one frame in microseconds.
    pub fn frame_duration_us(self) -> i64 {
        (1_000_000u64 * u64::from(self.den) / u64::from(self.num)) as i64
    }

    /// Presentation timestamp of frame `idx` in this timebase.
    pub fn frame_pts(self, idx: FrameIndex) -> MediaTimestamp {
        MediaTimestamp((idx.0 as i64).saturating_mul(self.frame_duration_us()))
    }
}

/// Output dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Create a validated resolution with non-zero dimensions.
    pub fn new(width: u32, height: u32) -> KinettaResult<Self> {
        if width == 0 || height == 0 {
            return Err(KinettaError::validation(
                "Resolution width/height must be non-zero",
            ));
        }
        Ok(Self { width, height })
    }

    /// Byte length of one tightly packed RGBA8 frame at this resolution.
    pub fn rgba_len(self) -> usize {
        (self.width as usize) * (self.height as usize) * 4
    }
}

/// Presentation timestamp in microseconds.
///
/// Within a track, timestamps must be non-decreasing; the muxer uses them to
/// serialize cross-track interleaving.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct MediaTimestamp(pub i64);

impl MediaTimestamp {
    /// Timestamp zero.
    pub const ZERO: Self = Self(0);

    /// The value in microseconds.
    pub fn as_us(self) -> i64 {
        self.0
    }

    /// Saturating addition of a microsecond delta.
    pub fn add_us(self, delta: i64) -> Self {
        Self(self.0.saturating_add(delta))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;

/// Codec seams and the deterministic raw codecs.
pub mod codec;
/// Encoder workers driving codecs from surface frames and audio sources.
pub mod encoder;
/// ffmpeg-CLI-backed codecs producing VP9/IVF and AAC/ADTS streams.
pub mod ffmpeg;
/// MP4 container writer backed by the system ffmpeg binary.
pub mod mp4;
/// The muxer wrapper and the container-writer seam.
pub mod muxer;
/// Encoded samples and track formats.
pub mod sample;

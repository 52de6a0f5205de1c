use super::*;

use crate::foundation::core::{Fps, MediaTimestamp, Resolution};
use crate::gpu::device::RawFrame;

fn video_cfg() -> VideoCodecConfig {
    VideoCodecConfig {
        resolution: Resolution::new(4, 4).unwrap(),
        fps: Fps::new(30, 1).unwrap(),
        bitrate: 1_000_000,
    }
}

fn audio_cfg() -> AudioCodecConfig {
    AudioCodecConfig {
        sample_rate: 48_000,
        channels: 2,
        bitrate: 128_000,
    }
}

#[test]
fn raw_video_reports_format_after_configure() {
    let mut codec = RawVideoCodec::new();
    assert!(codec.format().is_none());
    codec.configure(&video_cfg()).unwrap();

    let format = codec.format().unwrap();
    assert_eq!(format.kind, TrackKind::Video);
    assert_eq!(format.codec_name, "rawvideo");
    assert_eq!(format.timebase, Timebase::MICROS);
    assert!(format.extradata.is_empty());
}

#[test]
fn raw_video_rejects_double_configure() {
    let mut codec = RawVideoCodec::new();
    codec.configure(&video_cfg()).unwrap();
    assert!(codec.configure(&video_cfg()).is_err());
}

#[test]
fn raw_video_encode_passes_frames_through() {
    let mut codec = RawVideoCodec::new();
    codec.configure(&video_cfg()).unwrap();

    let res = Resolution::new(4, 4).unwrap();
    let frame = RawFrame::solid(res, [1, 2, 3, 255], MediaTimestamp(42));
    let batch = codec.encode(&frame).unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].pts, MediaTimestamp(42));
    assert!(batch[0].flags.key);
    assert_eq!(batch[0].data, frame.data);
    assert!(codec.finish().unwrap().is_empty());
}

#[test]
fn raw_video_encode_before_configure_fails() {
    let mut codec = RawVideoCodec::new();
    let res = Resolution::new(1, 1).unwrap();
    let frame = RawFrame::solid(res, [0; 4], MediaTimestamp::ZERO);
    assert!(codec.encode(&frame).is_err());
}

#[test]
fn pcm_audio_rejects_degenerate_configs() {
    let mut codec = PcmAudioCodec::new();
    assert!(
        codec
            .configure(&AudioCodecConfig {
                sample_rate: 0,
                ..audio_cfg()
            })
            .is_err()
    );
    assert!(
        codec
            .configure(&AudioCodecConfig {
                channels: 0,
                ..audio_cfg()
            })
            .is_err()
    );
}

#[test]
fn pcm_audio_encodes_f32le_bytes() {
    let mut codec = PcmAudioCodec::new();
    codec.configure(&audio_cfg()).unwrap();

    let chunk = PcmChunk {
        samples: vec![0.0, 1.0],
        pts: MediaTimestamp(7),
    };
    let batch = codec.encode(&chunk).unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].pts, MediaTimestamp(7));
    let mut expected = Vec::new();
    expected.extend_from_slice(&0.0f32.to_le_bytes());
    expected.extend_from_slice(&1.0f32.to_le_bytes());
    assert_eq!(batch[0].data, expected);
}

#[test]
fn pcm_audio_empty_chunk_yields_no_samples() {
    let mut codec = PcmAudioCodec::new();
    codec.configure(&audio_cfg()).unwrap();
    let batch = codec
        .encode(&PcmChunk {
            samples: Vec::new(),
            pts: MediaTimestamp::ZERO,
        })
        .unwrap();
    assert!(batch.is_empty());
}

#[test]
fn pcm_audio_timebase_matches_sample_rate() {
    let mut codec = PcmAudioCodec::new();
    codec.configure(&audio_cfg()).unwrap();
    assert_eq!(codec.format().unwrap().timebase, Timebase::hz(48_000));
}

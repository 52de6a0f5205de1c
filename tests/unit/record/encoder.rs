use super::*;

use std::sync::mpsc::channel;

use crate::foundation::core::{Fps, Resolution};
use crate::record::codec::{PcmAudioCodec, RawVideoCodec};
use crate::record::muxer::MemoryContainer;

fn video_cfg() -> VideoCodecConfig {
    VideoCodecConfig {
        resolution: Resolution::new(2, 2).unwrap(),
        fps: Fps::new(30, 1).unwrap(),
        bitrate: 1_000_000,
    }
}

fn audio_cfg() -> AudioCodecConfig {
    AudioCodecConfig {
        sample_rate: 48_000,
        channels: 1,
        bitrate: 128_000,
    }
}

#[test]
fn monotonic_pts_clamps_forward() {
    assert_eq!(monotonic_pts(100, None).as_us(), 100);
    assert_eq!(monotonic_pts(200, Some(MediaTimestamp(100))).as_us(), 200);
    assert_eq!(monotonic_pts(100, Some(MediaTimestamp(100))).as_us(), 101);
    assert_eq!(monotonic_pts(50, Some(MediaTimestamp(100))).as_us(), 101);
}

#[test]
fn silence_source_paces_against_the_wall_clock() {
    let mut source = SilenceSource::new(48_000, 2);
    std::thread::sleep(Duration::from_millis(3));
    // The clock runs from construction, so the very first pull already
    // carries the elapsed time.
    let chunk = source.next_chunk().unwrap().unwrap();
    assert_eq!(chunk.pts, MediaTimestamp::ZERO);
    assert!(!chunk.samples.is_empty());
    assert!(chunk.samples.len() <= 1024 * 2);
    assert!(chunk.samples.iter().all(|s| *s == 0.0));
}

#[test]
fn buffer_source_chunks_and_exhausts() {
    let mut source = BufferSource::new(48_000, 1, vec![0.5; 2500]);
    let first = source.next_chunk().unwrap().unwrap();
    assert_eq!(first.samples.len(), 1024);
    assert_eq!(first.pts, MediaTimestamp::ZERO);

    let second = source.next_chunk().unwrap().unwrap();
    assert_eq!(second.samples.len(), 1024);
    assert_eq!(second.pts.as_us(), 1024 * 1_000_000 / 48_000);

    let third = source.next_chunk().unwrap().unwrap();
    assert_eq!(third.samples.len(), 452);
    assert!(source.next_chunk().unwrap().is_none());
}

#[test]
fn video_encoder_drains_queued_frames_before_stopping() {
    let (container, view) = MemoryContainer::new();
    let muxer = Arc::new(MuxerWrapper::new(Box::new(container)));
    muxer.prepare().unwrap();
    let (events_tx, events) = channel();

    let mut encoder = VideoEncoder::new(
        Arc::clone(&muxer),
        events_tx,
        Box::new(RawVideoCodec::new()),
        video_cfg(),
    )
    .unwrap();
    muxer.start_recording().unwrap();

    let sink = encoder.sink();
    let res = Resolution::new(2, 2).unwrap();
    for shade in [10u8, 20, 30] {
        sink.on_frame(SinkFrame {
            resolution: res,
            data: vec![shade; res.rgba_len()],
        });
    }
    encoder.frame_available_soon();
    encoder.stop().unwrap();

    assert!(muxer.is_finalized());
    let samples = view.samples();
    assert_eq!(samples.len(), 3);
    assert!(samples.windows(2).all(|w| w[0].pts < w[1].pts));
    assert_eq!(samples[0].data, vec![10u8; res.rgba_len()]);

    let kinds: Vec<_> = events.try_iter().collect();
    assert!(
        kinds
            .iter()
            .any(|e| matches!(e, EncoderEvent::Prepared(TrackKind::Video)))
    );
    assert!(
        kinds
            .iter()
            .any(|e| matches!(e, EncoderEvent::Stopped(TrackKind::Video)))
    );
    assert!(kinds.iter().any(|e| matches!(e, EncoderEvent::MuxerStopped)));
}

#[test]
fn video_queue_drops_oldest_when_full() {
    let (container, view) = MemoryContainer::new();
    let muxer = Arc::new(MuxerWrapper::new(Box::new(container)));
    muxer.prepare().unwrap();
    let (events_tx, _events) = channel();

    let mut encoder = VideoEncoder::new(
        Arc::clone(&muxer),
        events_tx,
        Box::new(RawVideoCodec::new()),
        video_cfg(),
    )
    .unwrap();

    // Saturate the queue before the worker can possibly drain 2x capacity.
    let sink = encoder.sink();
    let res = Resolution::new(2, 2).unwrap();
    for shade in 0..(VIDEO_QUEUE_CAP as u8 * 2) {
        sink.on_frame(SinkFrame {
            resolution: res,
            data: vec![shade; res.rgba_len()],
        });
    }
    muxer.start_recording().unwrap();
    encoder.stop().unwrap();

    assert!(view.samples().len() <= VIDEO_QUEUE_CAP * 2);
    assert!(!view.samples().is_empty());
}

#[test]
fn audio_encoder_consumes_a_buffer_source() {
    let (container, view) = MemoryContainer::new();
    let muxer = Arc::new(MuxerWrapper::new(Box::new(container)));
    muxer.prepare().unwrap();
    let (events_tx, events) = channel();

    let mut encoder = AudioEncoder::new(
        Arc::clone(&muxer),
        events_tx,
        Box::new(PcmAudioCodec::new()),
        audio_cfg(),
        Box::new(BufferSource::new(48_000, 1, vec![0.25; 2500])),
    )
    .unwrap();
    muxer.start_recording().unwrap();

    std::thread::sleep(Duration::from_millis(30));
    encoder.stop().unwrap();

    assert!(muxer.is_finalized());
    let samples = view.samples();
    assert_eq!(samples.len(), 3);
    assert_eq!(samples[0].track, TrackKind::Audio);
    assert!(samples.windows(2).all(|w| w[0].pts <= w[1].pts));
    assert!(
        events
            .try_iter()
            .any(|e| matches!(e, EncoderEvent::MuxerStopped))
    );
}

#[test]
fn audio_encoder_rejects_mismatched_source() {
    let (container, _view) = MemoryContainer::new();
    let muxer = Arc::new(MuxerWrapper::new(Box::new(container)));
    muxer.prepare().unwrap();
    let (events_tx, _events) = channel();

    let result = AudioEncoder::new(
        muxer,
        events_tx,
        Box::new(PcmAudioCodec::new()),
        audio_cfg(),
        Box::new(BufferSource::new(44_100, 1, Vec::new())),
    );
    assert!(result.is_err());
}

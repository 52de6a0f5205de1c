use super::*;

use crate::filter::effects::ShaderFilter;
use crate::foundation::core::Fps;
use crate::gpu::software::SoftwareDevice;
use crate::record::codec::RawVideoCodec;
use crate::record::muxer::{MemoryContainer, MemoryContainerView};
use crate::writer::RecordingTarget;

fn res(w: u32, h: u32) -> Resolution {
    Resolution::new(w, h).unwrap()
}

fn memory_config(size: Resolution) -> (RecordingConfig, MemoryContainerView) {
    let (container, view) = MemoryContainer::new();
    let config = RecordingConfig {
        resolution: size,
        fps: Fps::new(30, 1).unwrap(),
        video_bitrate: 1_000_000,
        target: RecordingTarget::Container(Box::new(container)),
        video_codec: Box::new(RawVideoCodec::new()),
        audio: None,
    };
    (config, view)
}

fn frame(size: Resolution, shade: u8) -> RawFrame {
    RawFrame::solid(
        size,
        [shade, shade, shade, 255],
        crate::foundation::core::MediaTimestamp::ZERO,
    )
}

#[test]
fn submitted_frames_reach_an_active_recording() {
    let size = res(2, 2);
    let pipeline = Pipeline::spawn(Box::new(SoftwareDevice::new()), PipelineOpts::new(size))
        .unwrap();
    let handle = pipeline.handle();
    let (config, view) = memory_config(size);

    handle.start_recording(config).unwrap();
    for shade in [10, 20, 30] {
        handle.submit_frame(frame(size, shade)).unwrap();
    }
    handle.stop_recording().unwrap();
    pipeline.shutdown().unwrap();

    let samples = view.samples();
    assert_eq!(samples.len(), 3);
    assert_eq!(view.stop_count(), 1);
    assert_eq!(samples[0].data, vec![10, 10, 10, 255]);
    assert!(samples.windows(2).all(|w| w[0].pts < w[1].pts));
}

#[test]
fn stop_is_ordered_after_earlier_frame_submissions() {
    let size = res(2, 2);
    let pipeline = Pipeline::spawn(Box::new(SoftwareDevice::new()), PipelineOpts::new(size))
        .unwrap();
    let handle = pipeline.handle();
    let (config, view) = memory_config(size);

    handle.start_recording(config).unwrap();
    for shade in [1, 2, 3] {
        handle.submit_frame(frame(size, shade)).unwrap();
    }
    handle.stop_recording().unwrap();
    // Submitted after the stop, so it must not be recorded.
    handle.submit_frame(frame(size, 9)).unwrap();
    pipeline.shutdown().unwrap();

    let samples = view.samples();
    assert_eq!(samples.len(), 3);
    assert_eq!(samples[2].data, vec![3, 3, 3, 255]);
    assert_eq!(view.stop_count(), 1);
}

#[test]
fn pushed_filters_shape_recorded_frames() {
    let size = res(1, 1);
    let pipeline = Pipeline::spawn(Box::new(SoftwareDevice::new()), PipelineOpts::new(size))
        .unwrap();
    let handle = pipeline.handle();
    let (config, view) = memory_config(size);

    handle
        .push_filter(Box::new(ShaderFilter::invert()))
        .unwrap();
    handle.start_recording(config).unwrap();
    handle.submit_frame(frame(size, 0)).unwrap();
    handle.stop_recording().unwrap();
    pipeline.shutdown().unwrap();

    assert_eq!(view.samples()[0].data, vec![255, 255, 255, 255]);
}

#[test]
fn mismatched_frames_are_dropped_not_fatal() {
    let size = res(2, 2);
    let pipeline = Pipeline::spawn(Box::new(SoftwareDevice::new()), PipelineOpts::new(size))
        .unwrap();
    let handle = pipeline.handle();
    let (config, view) = memory_config(size);

    handle.start_recording(config).unwrap();
    handle.submit_frame(frame(res(4, 4), 50)).unwrap();
    handle.submit_frame(frame(size, 60)).unwrap();
    handle.stop_recording().unwrap();
    pipeline.shutdown().unwrap();

    let samples = view.samples();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].data, vec![60, 60, 60, 255]);
}

#[test]
fn pop_filter_restores_the_previous_chain() {
    let size = res(1, 1);
    let pipeline = Pipeline::spawn(Box::new(SoftwareDevice::new()), PipelineOpts::new(size))
        .unwrap();
    let handle = pipeline.handle();
    let (config, view) = memory_config(size);

    handle
        .push_filter(Box::new(ShaderFilter::invert()))
        .unwrap();
    handle.pop_filter().unwrap();
    handle.start_recording(config).unwrap();
    handle.submit_frame(frame(size, 7)).unwrap();
    handle.stop_recording().unwrap();
    pipeline.shutdown().unwrap();

    assert_eq!(view.samples()[0].data, vec![7, 7, 7, 255]);
}

#[test]
fn resize_keeps_the_pipeline_alive() {
    let pipeline = Pipeline::spawn(
        Box::new(SoftwareDevice::new()),
        PipelineOpts::new(res(2, 2)),
    )
    .unwrap();
    let handle = pipeline.handle();

    handle.resize(res(4, 4)).unwrap();
    handle.submit_frame(frame(res(4, 4), 1)).unwrap();
    pipeline.shutdown().unwrap();
}

#[test]
fn recording_can_start_and_stop_without_frames() {
    let size = res(2, 2);
    let pipeline = Pipeline::spawn(Box::new(SoftwareDevice::new()), PipelineOpts::new(size))
        .unwrap();
    let handle = pipeline.handle();
    let (config, view) = memory_config(size);

    handle.start_recording(config).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(25));
    assert!(handle.writer().is_recording());
    handle.stop_recording().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(25));
    assert!(!handle.writer().is_recording());

    pipeline.shutdown().unwrap();
    assert_eq!(view.stop_count(), 1);
    assert!(view.samples().is_empty());
}

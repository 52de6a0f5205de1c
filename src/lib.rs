//! Kinetta is a real-time image filter pipeline with concurrent recording.
//!
//! Frames flow through an ordered chain of [`Filter`]s onto a display
//! surface. While a recording is active, the [`MovieWriter`] filter repeats
//! each draw onto an encoder-bound surface that feeds a video encoder;
//! encoded video and audio samples are interleaved by a [`MuxerWrapper`]
//! into an MP4 container.
//!
//! The public API is pipeline-oriented:
//!
//! - Spawn a [`Pipeline`] over a [`GpuDevice`]
//! - Push filters and submit [`RawFrame`]s through its [`PipelineHandle`]
//! - Start and stop recordings with a [`RecordingConfig`]
//!
//! The GPU, codec, and container primitives the pipeline is built on are
//! trait seams ([`GpuDevice`], [`VideoCodec`], [`AudioCodec`],
//! [`ContainerWriter`]). A software reference device ships in-crate, and the
//! shipped MP4 path drives the system `ffmpeg` binary.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

/// Filter capability trait, base state, built-in filters, and filter groups.
pub mod filter;
/// GPU seam: shader programs, surfaces, and the software reference device.
pub mod gpu;
/// Pipeline harness: the dedicated render thread and its command handle.
pub mod pipeline;
/// Encoding and muxing: codecs, encoders, the muxer wrapper, containers.
pub mod record;
/// The movie-writer filter and recording session state machine.
pub mod writer;

pub use crate::foundation::core::{Fps, FrameIndex, MediaTimestamp, Resolution};
pub use crate::foundation::error::{KinettaError, KinettaResult};

pub use crate::filter::base::Filter;
pub use crate::filter::group::FilterGroup;
pub use crate::gpu::device::{GpuDevice, RawFrame};
pub use crate::gpu::software::SoftwareDevice;
pub use crate::pipeline::{Pipeline, PipelineHandle, PipelineOpts};
pub use crate::record::codec::{AudioCodec, VideoCodec};
pub use crate::record::muxer::{ContainerWriter, MemoryContainer, MuxerWrapper};
pub use crate::writer::{
    AudioTrackConfig, MovieWriter, MovieWriterHandle, RecordingConfig, RecordingTarget,
};

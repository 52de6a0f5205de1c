use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender, sync_channel};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::filter::base::Filter;
use crate::filter::group::FilterGroup;
use crate::foundation::core::Resolution;
use crate::foundation::error::{KinettaError, KinettaResult};
use crate::gpu::device::{GpuDevice, QuadGeometry, RawFrame, SurfaceId, TextureId};
use crate::writer::{MovieWriter, MovieWriterHandle, RecordingConfig};

/// Pipeline construction options.
#[derive(Clone, Copy, Debug)]
pub struct PipelineOpts {
    /// Display and recording dimensions.
    pub resolution: Resolution,
    /// Frame channel capacity; submission blocks when the render thread
    /// falls this many frames behind.
    pub channel_capacity: usize,
}

impl PipelineOpts {
    /// Defaults for a given resolution.
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            channel_capacity: 8,
        }
    }
}

enum Command {
    Frame(RawFrame),
    PushFilter(Box<dyn Filter>),
    PopFilter,
    Resize(Resolution),
    StartRecording(Box<RecordingConfig>),
    StopRecording,
    Shutdown,
}

/// Cloneable handle for submitting frames and mutating the pipeline.
///
/// Frame submission provides backpressure: it blocks once the bounded
/// channel to the render thread is full. Filter mutations and recording
/// control are applied on the render thread in submission order.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: SyncSender<Command>,
    writer: MovieWriterHandle,
}

impl PipelineHandle {
    /// Submit one frame for rendering (and recording, when active).
    pub fn submit_frame(&self, frame: RawFrame) -> KinettaResult<()> {
        self.tx
            .send(Command::Frame(frame))
            .map_err(|_| KinettaError::validation("pipeline is gone"))
    }

    /// Append a filter to the end of the chain.
    pub fn push_filter(&self, filter: Box<dyn Filter>) -> KinettaResult<()> {
        self.tx
            .send(Command::PushFilter(filter))
            .map_err(|_| KinettaError::validation("pipeline is gone"))
    }

    /// Remove the last filter in the chain.
    pub fn pop_filter(&self) -> KinettaResult<()> {
        self.tx
            .send(Command::PopFilter)
            .map_err(|_| KinettaError::validation("pipeline is gone"))
    }

    /// Change the output dimensions.
    pub fn resize(&self, resolution: Resolution) -> KinettaResult<()> {
        self.tx
            .send(Command::Resize(resolution))
            .map_err(|_| KinettaError::validation("pipeline is gone"))
    }

    /// Start a recording with `config`. Ordered with frame submission:
    /// frames submitted before this call are not recorded, frames
    /// submitted after it are.
    pub fn start_recording(&self, config: RecordingConfig) -> KinettaResult<()> {
        self.tx
            .send(Command::StartRecording(Box::new(config)))
            .map_err(|_| KinettaError::validation("pipeline is gone"))
    }

    /// Stop the active recording, if any. Ordered with frame submission:
    /// every frame submitted before this call is recorded first.
    pub fn stop_recording(&self) -> KinettaResult<()> {
        self.tx
            .send(Command::StopRecording)
            .map_err(|_| KinettaError::validation("pipeline is gone"))
    }

    /// The movie writer's control handle, for error polling and recording
    /// state queries. Prefer [`PipelineHandle::start_recording`] and
    /// [`PipelineHandle::stop_recording`] for control: commands sent on
    /// this handle are not ordered with frame submission.
    pub fn writer(&self) -> &MovieWriterHandle {
        &self.writer
    }
}

/// Owns the render thread: a [`FilterGroup`] followed by a [`MovieWriter`],
/// drawing onto a display surface created from the given device.
pub struct Pipeline {
    handle: PipelineHandle,
    thread: Option<JoinHandle<()>>,
}

/// How long the render thread waits for a command before ticking recording
/// control, so start/stop take effect while no frames flow.
const IDLE_TICK: Duration = Duration::from_millis(5);

impl Pipeline {
    /// Spawn the render thread over `device`.
    ///
    /// Fails if the display surface or the initial filter setup cannot be
    /// created.
    pub fn spawn(device: Box<dyn GpuDevice>, opts: PipelineOpts) -> KinettaResult<Self> {
        let (tx, rx) = sync_channel(opts.channel_capacity.max(1));
        let writer = MovieWriter::new();
        let writer_handle = writer.handle();

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<KinettaResult<()>>();
        let thread = std::thread::Builder::new()
            .name("kinetta-render".to_string())
            .spawn(move || render_thread(device, writer, opts, rx, ready_tx))
            .map_err(|e| {
                KinettaError::validation(format!("failed to spawn render thread: {e}"))
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                let _ = thread.join();
                return Err(err);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(KinettaError::validation(
                    "render thread exited before initializing",
                ));
            }
        }

        Ok(Self {
            handle: PipelineHandle {
                tx,
                writer: writer_handle,
            },
            thread: Some(thread),
        })
    }

    /// A handle for submitting frames and control.
    pub fn handle(&self) -> PipelineHandle {
        self.handle.clone()
    }

    /// Stop the render thread and release its resources.
    pub fn shutdown(mut self) -> KinettaResult<()> {
        let _ = self.handle.tx.send(Command::Shutdown);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            return Err(KinettaError::validation("render thread panicked"));
        }
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        let _ = self.handle.tx.send(Command::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct RenderState {
    device: Box<dyn GpuDevice>,
    group: FilterGroup,
    writer: MovieWriter,
    screen: SurfaceId,
    resolution: Resolution,
    input: Option<(TextureId, Resolution)>,
}

impl RenderState {
    fn init(
        mut device: Box<dyn GpuDevice>,
        mut writer: MovieWriter,
        resolution: Resolution,
    ) -> KinettaResult<Self> {
        let screen = device.create_display_surface(resolution)?;
        device.make_current(screen)?;

        let mut group = FilterGroup::new();
        group.init(device.as_mut())?;
        group.output_size_changed(device.as_mut(), resolution)?;
        writer.init(device.as_mut())?;
        writer.output_size_changed(device.as_mut(), resolution)?;

        Ok(Self {
            device,
            group,
            writer,
            screen,
            resolution,
            input: None,
        })
    }

    fn input_texture(&mut self, resolution: Resolution) -> KinettaResult<TextureId> {
        if let Some((texture, existing)) = self.input
            && existing == resolution
        {
            return Ok(texture);
        }
        if let Some((texture, _)) = self.input.take() {
            self.device.delete_texture(texture);
        }
        let texture = self.device.create_texture(resolution)?;
        self.input = Some((texture, resolution));
        Ok(texture)
    }

    fn render_frame(&mut self, frame: RawFrame) -> KinettaResult<()> {
        if frame.resolution != self.resolution {
            return Err(KinettaError::validation(format!(
                "frame is {}x{}, pipeline expects {}x{}",
                frame.resolution.width,
                frame.resolution.height,
                self.resolution.width,
                self.resolution.height
            )));
        }
        let texture = self.input_texture(frame.resolution)?;
        self.device
            .upload_texture(texture, frame.resolution, &frame.data)?;

        let filtered = self.group.draw_offscreen(self.device.as_mut(), texture)?;
        self.writer
            .draw(self.device.as_mut(), filtered, &QuadGeometry::upright())?;
        self.device.swap(self.screen)
    }

    fn resize(&mut self, resolution: Resolution) -> KinettaResult<()> {
        if resolution == self.resolution {
            return Ok(());
        }
        self.resolution = resolution;
        if let Some((texture, _)) = self.input.take() {
            self.device.delete_texture(texture);
        }
        self.device.destroy_surface(self.screen);
        self.screen = self.device.create_display_surface(resolution)?;
        self.device.make_current(self.screen)?;
        self.group
            .output_size_changed(self.device.as_mut(), resolution)?;
        self.writer
            .output_size_changed(self.device.as_mut(), resolution)?;
        Ok(())
    }

    fn cleanup(&mut self) {
        self.writer.destroy(self.device.as_mut());
        self.group.destroy(self.device.as_mut());
        if let Some((texture, _)) = self.input.take() {
            self.device.delete_texture(texture);
        }
        self.device.destroy_surface(self.screen);
    }
}

fn render_thread(
    device: Box<dyn GpuDevice>,
    writer: MovieWriter,
    opts: PipelineOpts,
    rx: Receiver<Command>,
    ready_tx: std::sync::mpsc::Sender<KinettaResult<()>>,
) {
    let mut state = match RenderState::init(device, writer, opts.resolution) {
        Ok(state) => {
            let _ = ready_tx.send(Ok(()));
            state
        }
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };

    loop {
        match rx.recv_timeout(IDLE_TICK) {
            Ok(Command::Frame(frame)) => {
                if let Err(err) = state.render_frame(frame) {
                    tracing::warn!(error = %err, "frame dropped");
                }
            }
            Ok(Command::PushFilter(filter)) => {
                if let Err(err) = state.group.push(state.device.as_mut(), filter) {
                    tracing::warn!(error = %err, "push_filter failed");
                }
            }
            Ok(Command::PopFilter) => {
                state.group.pop(state.device.as_mut());
            }
            Ok(Command::Resize(resolution)) => {
                if let Err(err) = state.resize(resolution) {
                    tracing::warn!(error = %err, "resize failed");
                }
            }
            Ok(Command::StartRecording(config)) => {
                state.writer.begin_recording(*config);
            }
            Ok(Command::StopRecording) => {
                state.writer.end_recording(state.device.as_mut());
            }
            Ok(Command::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                state.writer.process_control(state.device.as_mut());
            }
        }
    }

    state.cleanup();
}

#[cfg(test)]
#[path = "../tests/unit/pipeline.rs"]
mod tests;

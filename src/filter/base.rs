use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use crate::foundation::core::Resolution;
use crate::foundation::error::KinettaResult;
use crate::gpu::device::{GpuDevice, ProgramId, QuadGeometry, TextureId, UniformValue};
use crate::gpu::shader::ShaderSource;

/// A unit of GPU-based image transformation applied per frame.
///
/// Lifecycle: `init` compiles the program (idempotent), `output_size_changed`
/// updates cached dimensions, `draw` renders the input texture into the
/// bound target, `destroy` releases GPU resources and is safe to repeat.
/// All methods run on the render thread.
pub trait Filter: Send {
    /// Compile and link the filter's program. Idempotent; a repeated call is
    /// a no-op. Shader failure is fatal to this instance.
    fn init(&mut self, device: &mut dyn GpuDevice) -> KinettaResult<()>;

    /// Update the cached output dimensions.
    fn output_size_changed(
        &mut self,
        device: &mut dyn GpuDevice,
        size: Resolution,
    ) -> KinettaResult<()>;

    /// Drain deferred tasks, then draw the input texture into the bound
    /// target. A draw before `init` is a no-op.
    fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        input: TextureId,
        geometry: &QuadGeometry,
    ) -> KinettaResult<()>;

    /// Release the program. Safe to call multiple times.
    fn destroy(&mut self, device: &mut dyn GpuDevice);
}

type DeferredTask = Box<dyn FnOnce(&mut dyn GpuDevice, ProgramId) + Send>;

/// Cloneable producer handle for a filter's deferred task queue.
///
/// Tasks enqueue without blocking from any thread and are drained only on
/// the render thread immediately before the owning filter's next draw, after
/// the filter is initialized.
#[derive(Clone)]
pub struct TaskQueueHandle {
    queue: Arc<Mutex<VecDeque<DeferredTask>>>,
}

impl TaskQueueHandle {
    fn new() -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Enqueue a task to run on the render thread before the next draw.
    pub fn run_on_draw(&self, task: impl FnOnce(&mut dyn GpuDevice, ProgramId) + Send + 'static) {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(Box::new(task));
    }

    /// Number of queued tasks. Intended for tests.
    pub fn len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue a float uniform update by name.
    ///
    /// An undeclared name is silently ignored, matching GL's behavior for a
    /// `-1` uniform location.
    pub fn set_float(&self, name: impl Into<String>, value: f32) {
        let name = name.into();
        self.run_on_draw(move |device, program| {
            if let Some(loc) = device.uniform_location(program, &name) {
                let _ = device.set_uniform(program, loc, UniformValue::Float(value));
            }
        });
    }

    /// Enqueue an integer uniform update by name.
    pub fn set_int(&self, name: impl Into<String>, value: i32) {
        let name = name.into();
        self.run_on_draw(move |device, program| {
            if let Some(loc) = device.uniform_location(program, &name) {
                let _ = device.set_uniform(program, loc, UniformValue::Int(value));
            }
        });
    }

    /// Enqueue a vec3 uniform update by name.
    pub fn set_vec3(&self, name: impl Into<String>, value: [f32; 3]) {
        let name = name.into();
        self.run_on_draw(move |device, program| {
            if let Some(loc) = device.uniform_location(program, &name) {
                let _ = device.set_uniform(program, loc, UniformValue::Vec3(value));
            }
        });
    }

    fn drain(&self, device: &mut dyn GpuDevice, program: ProgramId) {
        loop {
            // Pop under the lock, run outside it, so a task enqueueing
            // further tasks cannot deadlock.
            let task = self
                .queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .pop_front();
            match task {
                Some(task) => task(device, program),
                None => return,
            }
        }
    }
}

/// Shared state for shader-program-backed filters: the program handle,
/// cached output size, the initialized flag, and the pending-task queue.
pub struct FilterState {
    source: ShaderSource,
    program: Option<ProgramId>,
    output_size: Option<Resolution>,
    tasks: TaskQueueHandle,
}

impl FilterState {
    /// Create state around a shader pair.
    pub fn new(source: ShaderSource) -> Self {
        Self {
            source,
            program: None,
            output_size: None,
            tasks: TaskQueueHandle::new(),
        }
    }

    /// State for the no-filter passthrough program.
    pub fn passthrough() -> Self {
        Self::new(ShaderSource::no_filter())
    }

    /// Whether `init` has completed successfully.
    pub fn is_initialized(&self) -> bool {
        self.program.is_some()
    }

    /// The linked program, once initialized.
    pub fn program(&self) -> Option<ProgramId> {
        self.program
    }

    /// The cached output size, if one has been set.
    pub fn output_size(&self) -> Option<Resolution> {
        self.output_size
    }

    /// Cache the output size.
    pub fn set_output_size(&mut self, size: Resolution) {
        self.output_size = Some(size);
    }

    /// Producer handle for this filter's deferred task queue.
    pub fn tasks(&self) -> TaskQueueHandle {
        self.tasks.clone()
    }

    /// Compile and link the program. Idempotent.
    pub fn init(&mut self, device: &mut dyn GpuDevice) -> KinettaResult<()> {
        if self.program.is_some() {
            return Ok(());
        }
        self.program = Some(device.compile_program(&self.source)?);
        Ok(())
    }

    /// Drain deferred tasks, then draw. Returns `false` (and leaves the
    /// queue untouched) when not yet initialized.
    pub fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        input: TextureId,
        geometry: &QuadGeometry,
    ) -> KinettaResult<bool> {
        let Some(program) = self.program else {
            return Ok(false);
        };
        self.tasks.drain(device, program);
        device.draw_quad(program, input, geometry)?;
        Ok(true)
    }

    /// Delete the program. Safe to call multiple times.
    pub fn destroy(&mut self, device: &mut dyn GpuDevice) {
        if let Some(program) = self.program.take() {
            device.delete_program(program);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/filter/base.rs"]
mod tests;

use crate::foundation::core::Resolution;
use crate::foundation::error::KinettaResult;
use crate::filter::base::{Filter, FilterState, TaskQueueHandle};
use crate::gpu::device::{GpuDevice, QuadGeometry, TextureId};
use crate::gpu::shader::{
    BRIGHTNESS_FRAGMENT_SHADER, CONTRAST_FRAGMENT_SHADER, GRAYSCALE_FRAGMENT_SHADER,
    INVERT_FRAGMENT_SHADER, ShaderSource,
};

/// A filter running a single shader program over its input.
///
/// Covers every effect that needs no per-draw state beyond its uniforms.
pub struct ShaderFilter {
    state: FilterState,
}

impl ShaderFilter {
    /// Create a filter around an arbitrary shader pair.
    pub fn new(source: ShaderSource) -> Self {
        Self {
            state: FilterState::new(source),
        }
    }

    /// The no-op passthrough filter.
    pub fn passthrough() -> Self {
        Self::new(ShaderSource::no_filter())
    }

    /// Luminance-weighted grayscale.
    pub fn grayscale() -> Self {
        Self::new(ShaderSource::with_fragment(GRAYSCALE_FRAGMENT_SHADER))
    }

    /// Channel inversion.
    pub fn invert() -> Self {
        Self::new(ShaderSource::with_fragment(INVERT_FRAGMENT_SHADER))
    }

    /// Producer handle for deferred uniform updates.
    pub fn tasks(&self) -> TaskQueueHandle {
        self.state.tasks()
    }
}

impl Filter for ShaderFilter {
    fn init(&mut self, device: &mut dyn GpuDevice) -> KinettaResult<()> {
        self.state.init(device)
    }

    fn output_size_changed(
        &mut self,
        _device: &mut dyn GpuDevice,
        size: Resolution,
    ) -> KinettaResult<()> {
        self.state.set_output_size(size);
        Ok(())
    }

    fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        input: TextureId,
        geometry: &QuadGeometry,
    ) -> KinettaResult<()> {
        self.state.draw(device, input, geometry)?;
        Ok(())
    }

    fn destroy(&mut self, device: &mut dyn GpuDevice) {
        self.state.destroy(device);
    }
}

/// Additive brightness adjustment, `level` in `[-1, 1]`.
pub struct BrightnessFilter {
    inner: ShaderFilter,
}

impl BrightnessFilter {
    /// Create the filter with an initial brightness level.
    pub fn new(level: f32) -> Self {
        let inner = ShaderFilter::new(ShaderSource::with_fragment(BRIGHTNESS_FRAGMENT_SHADER));
        inner.tasks().set_float("brightness", level);
        Self { inner }
    }

    /// Update the brightness level; applied before the next draw.
    pub fn set_level(&self, level: f32) {
        self.inner.tasks().set_float("brightness", level);
    }
}

impl Filter for BrightnessFilter {
    fn init(&mut self, device: &mut dyn GpuDevice) -> KinettaResult<()> {
        self.inner.init(device)
    }

    fn output_size_changed(
        &mut self,
        device: &mut dyn GpuDevice,
        size: Resolution,
    ) -> KinettaResult<()> {
        self.inner.output_size_changed(device, size)
    }

    fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        input: TextureId,
        geometry: &QuadGeometry,
    ) -> KinettaResult<()> {
        self.inner.draw(device, input, geometry)
    }

    fn destroy(&mut self, device: &mut dyn GpuDevice) {
        self.inner.destroy(device);
    }
}

/// Contrast scale about mid-gray, `amount` in `[0, 4]`, identity at 1.
pub struct ContrastFilter {
    inner: ShaderFilter,
}

impl ContrastFilter {
    /// Create the filter with an initial contrast amount.
    pub fn new(amount: f32) -> Self {
        let inner = ShaderFilter::new(ShaderSource::with_fragment(CONTRAST_FRAGMENT_SHADER));
        inner.tasks().set_float("contrast", amount);
        Self { inner }
    }

    /// Update the contrast amount; applied before the next draw.
    pub fn set_amount(&self, amount: f32) {
        self.inner.tasks().set_float("contrast", amount);
    }
}

impl Filter for ContrastFilter {
    fn init(&mut self, device: &mut dyn GpuDevice) -> KinettaResult<()> {
        self.inner.init(device)
    }

    fn output_size_changed(
        &mut self,
        device: &mut dyn GpuDevice,
        size: Resolution,
    ) -> KinettaResult<()> {
        self.inner.output_size_changed(device, size)
    }

    fn draw(
        &mut self,
        device: &mut dyn GpuDevice,
        input: TextureId,
        geometry: &QuadGeometry,
    ) -> KinettaResult<()> {
        self.inner.draw(device, input, geometry)
    }

    fn destroy(&mut self, device: &mut dyn GpuDevice) {
        self.inner.destroy(device);
    }
}

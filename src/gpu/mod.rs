/// GPU device seam and identifier types.
pub mod device;
/// Shader sources and program reflection.
pub mod shader;
/// Software reference implementation of [`device::GpuDevice`].
pub mod software;

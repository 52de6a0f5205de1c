use std::sync::Arc;

use crate::foundation::core::{MediaTimestamp, Resolution};
use crate::foundation::error::KinettaResult;
use crate::gpu::shader::ShaderSource;

/// Handle to a compiled and linked shader program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Handle to a device texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// Handle to an offscreen framebuffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

/// Handle to a drawable surface (display or encoder-bound).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceId(pub u32);

/// An offscreen framebuffer together with its backing texture.
#[derive(Clone, Copy, Debug)]
pub struct Framebuffer {
    /// The framebuffer handle, bindable as a draw target.
    pub id: FramebufferId,
    /// The texture the framebuffer renders into.
    pub texture: TextureId,
}

/// A uniform value set on a program.
#[derive(Clone, Debug, PartialEq)]
pub enum UniformValue {
    /// `float`
    Float(f32),
    /// `int`
    Int(i32),
    /// `vec2`
    Vec2([f32; 2]),
    /// `vec3`
    Vec3([f32; 3]),
    /// `vec4`
    Vec4([f32; 4]),
}

/// Quad vertex positions and texture coordinates for a full-screen draw.
///
/// The software device supports the two layouts the pipeline uses: the
/// identity orientation and a vertically flipped texture sampling (used when
/// rendering into an encoder surface).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadGeometry {
    /// Interleaved x,y positions of the quad corners (triangle strip order).
    pub positions: [f32; 8],
    /// Interleaved u,v texture coordinates matching `positions`.
    pub tex_coords: [f32; 8],
}

/// Triangle-strip corner positions shared by every quad layout.
const QUAD_POSITIONS: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

impl QuadGeometry {
    /// Upright full-screen quad.
    pub fn upright() -> Self {
        Self {
            positions: QUAD_POSITIONS,
            tex_coords: [0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        }
    }

    /// Full-screen quad sampling the texture vertically flipped.
    pub fn flipped_vertically() -> Self {
        Self {
            positions: QUAD_POSITIONS,
            tex_coords: [0.0, 1.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
        }
    }

    /// Whether the texture coordinates sample the input upside down.
    pub fn is_vertically_flipped(&self) -> bool {
        self.tex_coords == Self::flipped_vertically().tex_coords
    }
}

impl Default for QuadGeometry {
    fn default() -> Self {
        Self::upright()
    }
}

/// A raw RGBA8 frame entering or leaving the pipeline.
#[derive(Clone, Debug)]
pub struct RawFrame {
    /// Frame dimensions.
    pub resolution: Resolution,
    /// Tightly packed RGBA8 bytes, row-major, top row first.
    pub data: Vec<u8>,
    /// Capture timestamp.
    pub pts: MediaTimestamp,
}

impl RawFrame {
    /// A solid-color frame, useful for tests and demos.
    pub fn solid(resolution: Resolution, rgba: [u8; 4], pts: MediaTimestamp) -> Self {
        let mut data = Vec::with_capacity(resolution.rgba_len());
        for _ in 0..resolution.rgba_len() / 4 {
            data.extend_from_slice(&rgba);
        }
        Self {
            resolution,
            data,
            pts,
        }
    }
}

/// Pixels delivered by an encoder surface on swap.
#[derive(Clone, Debug)]
pub struct SinkFrame {
    /// Frame dimensions.
    pub resolution: Resolution,
    /// Tightly packed RGBA8 bytes.
    pub data: Vec<u8>,
}

/// Consumer attached to an encoder-bound surface.
///
/// `swap` on such a surface delivers the swapped back buffer here. The video
/// encoder's input queue is the canonical implementation. Invoked on the
/// render thread; implementations must not block.
pub trait SurfaceSink: Send + Sync {
    /// Accept one swapped frame.
    fn on_frame(&self, frame: SinkFrame);
}

/// The GPU seam: programs, textures, framebuffers, surfaces, and the
/// full-screen quad draw every filter is built from.
///
/// All methods are called from the render thread only; the device is the
/// render thread's exclusively owned resource.
pub trait GpuDevice: Send {
    /// Compile and link a shader pair.
    ///
    /// Compile or link failure is [`KinettaError::ShaderCompile`] and fatal
    /// to the would-be program; no handle is allocated.
    ///
    /// [`KinettaError::ShaderCompile`]: crate::KinettaError::ShaderCompile
    fn compile_program(&mut self, source: &ShaderSource) -> KinettaResult<ProgramId>;

    /// Delete a program. Unknown handles are ignored.
    fn delete_program(&mut self, program: ProgramId);

    /// Location of a uniform declared by the program.
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<u32>;

    /// Location of a vertex attribute declared by the program.
    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32>;

    /// Set a uniform value by location.
    fn set_uniform(
        &mut self,
        program: ProgramId,
        location: u32,
        value: UniformValue,
    ) -> KinettaResult<()>;

    /// Create an uninitialized texture.
    fn create_texture(&mut self, resolution: Resolution) -> KinettaResult<TextureId>;

    /// Upload RGBA8 pixels into a texture, replacing its contents.
    fn upload_texture(
        &mut self,
        texture: TextureId,
        resolution: Resolution,
        rgba: &[u8],
    ) -> KinettaResult<()>;

    /// Delete a texture. Unknown handles are ignored.
    fn delete_texture(&mut self, texture: TextureId);

    /// Create an offscreen framebuffer with a backing texture.
    fn create_framebuffer(&mut self, resolution: Resolution) -> KinettaResult<Framebuffer>;

    /// Delete a framebuffer and its backing texture. Unknown handles are
    /// ignored.
    fn delete_framebuffer(&mut self, framebuffer: FramebufferId);

    /// Bind a framebuffer as the draw target, or `None` for the current
    /// surface's back buffer.
    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> KinettaResult<()>;

    /// Draw a textured quad with `program` into the bound target.
    ///
    /// Binds the quad attributes and the input texture, issues the draw, and
    /// leaves GL state minimally mutated (attributes disabled, texture unit
    /// zero unbound) on return.
    fn draw_quad(
        &mut self,
        program: ProgramId,
        texture: TextureId,
        geometry: &QuadGeometry,
    ) -> KinettaResult<()>;

    /// Create an on-screen (display) surface.
    fn create_display_surface(&mut self, resolution: Resolution) -> KinettaResult<SurfaceId>;

    /// Create an encoder-bound surface delivering swapped frames to `sink`.
    fn create_encoder_surface(
        &mut self,
        resolution: Resolution,
        sink: Arc<dyn SurfaceSink>,
    ) -> KinettaResult<SurfaceId>;

    /// Make a surface the current draw target for unbound draws.
    fn make_current(&mut self, surface: SurfaceId) -> KinettaResult<()>;

    /// The currently bound surface, if any.
    fn current_surface(&self) -> Option<SurfaceId>;

    /// Swap a surface's buffers. For encoder surfaces this delivers the back
    /// buffer to the attached sink.
    fn swap(&mut self, surface: SurfaceId) -> KinettaResult<()>;

    /// Whether the surface still exists and has not been lost.
    fn surface_alive(&self, surface: SurfaceId) -> bool;

    /// Destroy a surface. Unknown handles are ignored.
    fn destroy_surface(&mut self, surface: SurfaceId);

    /// Read back the bound draw target. Intended for tests and debugging.
    fn read_pixels(&mut self) -> KinettaResult<SinkFrame>;
}

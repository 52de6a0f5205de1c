use std::collections::HashMap;
use std::sync::Arc;

use xxhash_rust::xxh3::xxh3_64;

use crate::foundation::core::Resolution;
use crate::foundation::error::{KinettaError, KinettaResult};
use crate::gpu::device::{
    Framebuffer, FramebufferId, GpuDevice, ProgramId, QuadGeometry, SinkFrame, SurfaceId,
    SurfaceSink, TextureId, UniformValue,
};
use crate::gpu::shader::{
    BRIGHTNESS_FRAGMENT_SHADER, CONTRAST_FRAGMENT_SHADER, GRAYSCALE_FRAGMENT_SHADER,
    INVERT_FRAGMENT_SHADER, NO_FILTER_FRAGMENT_SHADER, ProgramReflection, ShaderSource,
    reflect_program,
};

/// Per-pixel kernel backing a compiled fragment shader.
///
/// The software rasterizer executes a fixed set of fragment shaders. Linking
/// resolves the fragment source against this set; sources outside it fail
/// with a shader error, the same surface a broken shader has on real GL.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kernel {
    Passthrough,
    Grayscale,
    Brightness,
    Contrast,
    Invert,
}

impl Kernel {
    fn registry() -> HashMap<u64, Kernel> {
        let mut m = HashMap::new();
        for (src, kernel) in [
            (NO_FILTER_FRAGMENT_SHADER, Kernel::Passthrough),
            (GRAYSCALE_FRAGMENT_SHADER, Kernel::Grayscale),
            (BRIGHTNESS_FRAGMENT_SHADER, Kernel::Brightness),
            (CONTRAST_FRAGMENT_SHADER, Kernel::Contrast),
            (INVERT_FRAGMENT_SHADER, Kernel::Invert),
        ] {
            m.insert(fragment_key(src), kernel);
        }
        m
    }

    /// Evaluate the kernel for one RGBA8 pixel. `p0` is the value of the
    /// kernel's scalar uniform, when it has one.
    fn shade(self, px: [u8; 4], p0: f32) -> [u8; 4] {
        let [r, g, b, a] = px.map(|c| f32::from(c) / 255.0);
        let (r, g, b) = match self {
            Kernel::Passthrough => (r, g, b),
            Kernel::Grayscale => {
                let y = 0.2125 * r + 0.7154 * g + 0.0721 * b;
                (y, y, y)
            }
            Kernel::Brightness => (r + p0, g + p0, b + p0),
            Kernel::Contrast => (
                (r - 0.5) * p0 + 0.5,
                (g - 0.5) * p0 + 0.5,
                (b - 0.5) * p0 + 0.5,
            ),
            Kernel::Invert => (1.0 - r, 1.0 - g, 1.0 - b),
        };
        [
            (r.clamp(0.0, 1.0) * 255.0).round() as u8,
            (g.clamp(0.0, 1.0) * 255.0).round() as u8,
            (b.clamp(0.0, 1.0) * 255.0).round() as u8,
            (a.clamp(0.0, 1.0) * 255.0).round() as u8,
        ]
    }

    /// Name of the scalar uniform the kernel reads, if any.
    fn scalar_uniform(self) -> Option<&'static str> {
        match self {
            Kernel::Brightness => Some("brightness"),
            Kernel::Contrast => Some("contrast"),
            _ => None,
        }
    }
}

fn fragment_key(src: &str) -> u64 {
    // Key on the trimmed bytes so trailing whitespace differences do not
    // produce distinct "binaries".
    xxh3_64(src.trim().as_bytes())
}

struct Program {
    reflection: ProgramReflection,
    kernel: Kernel,
    uniforms: HashMap<u32, UniformValue>,
}

struct Texture {
    resolution: Resolution,
    data: Vec<u8>,
}

struct FramebufferSlot {
    texture: TextureId,
}

enum SurfaceKind {
    Display,
    Encoder(Arc<dyn SurfaceSink>),
}

struct Surface {
    resolution: Resolution,
    back: Vec<u8>,
    kind: SurfaceKind,
    alive: bool,
}

/// Software reference implementation of [`GpuDevice`].
///
/// Textures, framebuffers, and surfaces are plain RGBA8 buffers; draws run
/// the kernel resolved at link time over the input texture. This is the
/// always-available device, used by tests and as the behavioral reference
/// for hardware-backed implementations.
pub struct SoftwareDevice {
    kernels: HashMap<u64, Kernel>,
    programs: HashMap<u32, Program>,
    textures: HashMap<u32, Texture>,
    framebuffers: HashMap<u32, FramebufferSlot>,
    surfaces: HashMap<u32, Surface>,
    bound_framebuffer: Option<FramebufferId>,
    current: Option<SurfaceId>,
    next_id: u32,
}

impl SoftwareDevice {
    /// Create an empty device.
    pub fn new() -> Self {
        Self {
            kernels: Kernel::registry(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            surfaces: HashMap::new(),
            bound_framebuffer: None,
            current: None,
            next_id: 1,
        }
    }

    fn alloc_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Simulate surface loss: the surface stops accepting draws and
    /// [`GpuDevice::surface_alive`] reports `false`. Test hook for the
    /// movie writer's recovery path.
    pub fn invalidate_surface(&mut self, surface: SurfaceId) {
        if let Some(s) = self.surfaces.get_mut(&surface.0) {
            s.alive = false;
        }
    }

    fn scalar_param(&self, program: &Program) -> f32 {
        let Some(name) = program.kernel.scalar_uniform() else {
            return 0.0;
        };
        let Some(loc) = program.reflection.uniform_location(name) else {
            return 0.0;
        };
        match program.uniforms.get(&loc) {
            Some(UniformValue::Float(v)) => *v,
            // Uninitialized uniforms read as zero, as on real GL.
            _ => 0.0,
        }
    }

    fn target_resolution(&self) -> KinettaResult<Resolution> {
        if let Some(fb) = self.bound_framebuffer {
            let slot = self
                .framebuffers
                .get(&fb.0)
                .ok_or_else(|| KinettaError::evaluation("bound framebuffer no longer exists"))?;
            let tex = self
                .textures
                .get(&slot.texture.0)
                .ok_or_else(|| KinettaError::evaluation("framebuffer texture no longer exists"))?;
            return Ok(tex.resolution);
        }
        let current = self
            .current
            .ok_or_else(|| KinettaError::evaluation("no framebuffer bound and no surface current"))?;
        let surface = self
            .surfaces
            .get(&current.0)
            .ok_or_else(|| KinettaError::evaluation("current surface no longer exists"))?;
        Ok(surface.resolution)
    }
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for SoftwareDevice {
    fn compile_program(&mut self, source: &ShaderSource) -> KinettaResult<ProgramId> {
        let reflection = reflect_program(source)?;
        let kernel = self
            .kernels
            .get(&fragment_key(&source.fragment))
            .copied()
            .ok_or_else(|| {
                KinettaError::shader(
                    "fragment shader is not supported by the software rasterizer",
                )
            })?;

        let id = self.alloc_id();
        self.programs.insert(
            id,
            Program {
                reflection,
                kernel,
                uniforms: HashMap::new(),
            },
        );
        Ok(ProgramId(id))
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program.0);
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs
            .get(&program.0)
            .and_then(|p| p.reflection.uniform_location(name))
    }

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        self.programs
            .get(&program.0)
            .and_then(|p| p.reflection.attrib_location(name))
    }

    fn set_uniform(
        &mut self,
        program: ProgramId,
        location: u32,
        value: UniformValue,
    ) -> KinettaResult<()> {
        let p = self
            .programs
            .get_mut(&program.0)
            .ok_or_else(|| KinettaError::evaluation("set_uniform on unknown program"))?;
        if location as usize >= p.reflection.uniforms.len() {
            return Err(KinettaError::evaluation(format!(
                "uniform location {location} out of range"
            )));
        }
        p.uniforms.insert(location, value);
        Ok(())
    }

    fn create_texture(&mut self, resolution: Resolution) -> KinettaResult<TextureId> {
        let id = self.alloc_id();
        self.textures.insert(
            id,
            Texture {
                resolution,
                data: vec![0; resolution.rgba_len()],
            },
        );
        Ok(TextureId(id))
    }

    fn upload_texture(
        &mut self,
        texture: TextureId,
        resolution: Resolution,
        rgba: &[u8],
    ) -> KinettaResult<()> {
        if rgba.len() != resolution.rgba_len() {
            return Err(KinettaError::validation(format!(
                "texture upload size mismatch: got {} bytes, expected {}",
                rgba.len(),
                resolution.rgba_len()
            )));
        }
        let tex = self
            .textures
            .get_mut(&texture.0)
            .ok_or_else(|| KinettaError::evaluation("upload to unknown texture"))?;
        tex.resolution = resolution;
        tex.data.clear();
        tex.data.extend_from_slice(rgba);
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture.0);
    }

    fn create_framebuffer(&mut self, resolution: Resolution) -> KinettaResult<Framebuffer> {
        let texture = self.create_texture(resolution)?;
        let id = self.alloc_id();
        self.framebuffers.insert(id, FramebufferSlot { texture });
        Ok(Framebuffer {
            id: FramebufferId(id),
            texture,
        })
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        if let Some(slot) = self.framebuffers.remove(&framebuffer.0) {
            self.textures.remove(&slot.texture.0);
        }
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<FramebufferId>) -> KinettaResult<()> {
        if let Some(fb) = framebuffer
            && !self.framebuffers.contains_key(&fb.0)
        {
            return Err(KinettaError::evaluation("bind of unknown framebuffer"));
        }
        self.bound_framebuffer = framebuffer;
        Ok(())
    }

    fn draw_quad(
        &mut self,
        program: ProgramId,
        texture: TextureId,
        geometry: &QuadGeometry,
    ) -> KinettaResult<()> {
        let flipped = if geometry.is_vertically_flipped() {
            true
        } else if *geometry == QuadGeometry::upright() {
            false
        } else {
            return Err(KinettaError::evaluation(
                "software rasterizer supports upright and vertically flipped quads only",
            ));
        };

        let target_res = self.target_resolution()?;
        let p = self
            .programs
            .get(&program.0)
            .ok_or_else(|| KinettaError::evaluation("draw with unknown program"))?;
        let kernel = p.kernel;
        let p0 = self.scalar_param(p);
        let src = self
            .textures
            .get(&texture.0)
            .ok_or_else(|| KinettaError::evaluation("draw with unknown texture"))?;

        let (sw, sh) = (src.resolution.width as usize, src.resolution.height as usize);
        let (tw, th) = (target_res.width as usize, target_res.height as usize);
        let mut out = vec![0u8; target_res.rgba_len()];
        for y in 0..th {
            // Nearest sampling; v flip happens in texture space.
            let mut sy = y * sh / th;
            if flipped {
                sy = sh - 1 - sy;
            }
            for x in 0..tw {
                let sx = x * sw / tw;
                let si = (sy * sw + sx) * 4;
                let px = [
                    src.data[si],
                    src.data[si + 1],
                    src.data[si + 2],
                    src.data[si + 3],
                ];
                let shaded = kernel.shade(px, p0);
                let di = (y * tw + x) * 4;
                out[di..di + 4].copy_from_slice(&shaded);
            }
        }

        if let Some(fb) = self.bound_framebuffer {
            let slot = self
                .framebuffers
                .get(&fb.0)
                .ok_or_else(|| KinettaError::evaluation("bound framebuffer no longer exists"))?;
            let tex = self
                .textures
                .get_mut(&slot.texture.0)
                .ok_or_else(|| KinettaError::evaluation("framebuffer texture no longer exists"))?;
            tex.data = out;
        } else {
            let current = self.current.ok_or_else(|| {
                KinettaError::evaluation("no framebuffer bound and no surface current")
            })?;
            let surface = self
                .surfaces
                .get_mut(&current.0)
                .ok_or_else(|| KinettaError::evaluation("current surface no longer exists"))?;
            if !surface.alive {
                return Err(KinettaError::evaluation("draw onto a lost surface"));
            }
            surface.back = out;
        }
        Ok(())
    }

    fn create_display_surface(&mut self, resolution: Resolution) -> KinettaResult<SurfaceId> {
        let id = self.alloc_id();
        self.surfaces.insert(
            id,
            Surface {
                resolution,
                back: vec![0; resolution.rgba_len()],
                kind: SurfaceKind::Display,
                alive: true,
            },
        );
        Ok(SurfaceId(id))
    }

    fn create_encoder_surface(
        &mut self,
        resolution: Resolution,
        sink: Arc<dyn SurfaceSink>,
    ) -> KinettaResult<SurfaceId> {
        let id = self.alloc_id();
        self.surfaces.insert(
            id,
            Surface {
                resolution,
                back: vec![0; resolution.rgba_len()],
                kind: SurfaceKind::Encoder(sink),
                alive: true,
            },
        );
        Ok(SurfaceId(id))
    }

    fn make_current(&mut self, surface: SurfaceId) -> KinettaResult<()> {
        let s = self
            .surfaces
            .get(&surface.0)
            .ok_or_else(|| KinettaError::evaluation("make_current on unknown surface"))?;
        if !s.alive {
            return Err(KinettaError::evaluation("make_current on a lost surface"));
        }
        self.current = Some(surface);
        Ok(())
    }

    fn current_surface(&self) -> Option<SurfaceId> {
        self.current
    }

    fn swap(&mut self, surface: SurfaceId) -> KinettaResult<()> {
        let s = self
            .surfaces
            .get(&surface.0)
            .ok_or_else(|| KinettaError::evaluation("swap on unknown surface"))?;
        if !s.alive {
            return Err(KinettaError::evaluation("swap on a lost surface"));
        }
        if let SurfaceKind::Encoder(sink) = &s.kind {
            sink.on_frame(SinkFrame {
                resolution: s.resolution,
                data: s.back.clone(),
            });
        }
        Ok(())
    }

    fn surface_alive(&self, surface: SurfaceId) -> bool {
        self.surfaces.get(&surface.0).is_some_and(|s| s.alive)
    }

    fn destroy_surface(&mut self, surface: SurfaceId) {
        self.surfaces.remove(&surface.0);
        if self.current == Some(surface) {
            self.current = None;
        }
    }

    fn read_pixels(&mut self) -> KinettaResult<SinkFrame> {
        if let Some(fb) = self.bound_framebuffer {
            let slot = self
                .framebuffers
                .get(&fb.0)
                .ok_or_else(|| KinettaError::evaluation("bound framebuffer no longer exists"))?;
            let tex = self
                .textures
                .get(&slot.texture.0)
                .ok_or_else(|| KinettaError::evaluation("framebuffer texture no longer exists"))?;
            return Ok(SinkFrame {
                resolution: tex.resolution,
                data: tex.data.clone(),
            });
        }
        let current = self
            .current
            .ok_or_else(|| KinettaError::evaluation("no framebuffer bound and no surface current"))?;
        let surface = self
            .surfaces
            .get(&current.0)
            .ok_or_else(|| KinettaError::evaluation("current surface no longer exists"))?;
        Ok(SinkFrame {
            resolution: surface.resolution,
            data: surface.back.clone(),
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/gpu/software.rs"]
mod tests;

use super::*;

use std::sync::Mutex;

fn res(w: u32, h: u32) -> Resolution {
    Resolution::new(w, h).unwrap()
}

fn upload(device: &mut SoftwareDevice, resolution: Resolution, rgba: &[u8]) -> TextureId {
    let tex = device.create_texture(resolution).unwrap();
    device.upload_texture(tex, resolution, rgba).unwrap();
    tex
}

fn draw_into_fbo(
    device: &mut SoftwareDevice,
    program: ProgramId,
    input: TextureId,
    resolution: Resolution,
    geometry: &QuadGeometry,
) -> Vec<u8> {
    let fbo = device.create_framebuffer(resolution).unwrap();
    device.bind_framebuffer(Some(fbo.id)).unwrap();
    device.draw_quad(program, input, geometry).unwrap();
    let frame = device.read_pixels().unwrap();
    device.bind_framebuffer(None).unwrap();
    frame.data
}

#[test]
fn passthrough_copies_pixels() {
    let mut device = SoftwareDevice::new();
    let program = device.compile_program(&ShaderSource::no_filter()).unwrap();
    let r = res(2, 2);
    let pixels = [
        10, 20, 30, 255, 40, 50, 60, 255, 70, 80, 90, 255, 100, 110, 120, 255,
    ];
    let tex = upload(&mut device, r, &pixels);
    let out = draw_into_fbo(&mut device, program, tex, r, &QuadGeometry::upright());
    assert_eq!(out, pixels);
}

#[test]
fn grayscale_weights_luminance() {
    let mut device = SoftwareDevice::new();
    let program = device
        .compile_program(&ShaderSource::with_fragment(GRAYSCALE_FRAGMENT_SHADER))
        .unwrap();
    let r = res(1, 1);
    let tex = upload(&mut device, r, &[255, 0, 0, 255]);
    let out = draw_into_fbo(&mut device, program, tex, r, &QuadGeometry::upright());
    // 0.2125 * 255 = 54.2
    assert_eq!(out, vec![54, 54, 54, 255]);
}

#[test]
fn brightness_uniform_shifts_channels() {
    let mut device = SoftwareDevice::new();
    let program = device
        .compile_program(&ShaderSource::with_fragment(BRIGHTNESS_FRAGMENT_SHADER))
        .unwrap();
    let loc = device.uniform_location(program, "brightness").unwrap();
    device
        .set_uniform(program, loc, UniformValue::Float(0.5))
        .unwrap();
    let r = res(1, 1);
    let tex = upload(&mut device, r, &[0, 100, 250, 255]);
    let out = draw_into_fbo(&mut device, program, tex, r, &QuadGeometry::upright());
    assert_eq!(out, vec![128, 228, 255, 255]);
}

#[test]
fn unset_uniform_reads_as_zero() {
    let mut device = SoftwareDevice::new();
    let program = device
        .compile_program(&ShaderSource::with_fragment(BRIGHTNESS_FRAGMENT_SHADER))
        .unwrap();
    let r = res(1, 1);
    let tex = upload(&mut device, r, &[5, 6, 7, 255]);
    let out = draw_into_fbo(&mut device, program, tex, r, &QuadGeometry::upright());
    assert_eq!(out, vec![5, 6, 7, 255]);
}

#[test]
fn unsupported_fragment_fails_to_link() {
    let mut device = SoftwareDevice::new();
    let source = ShaderSource::with_fragment(
        "uniform sampler2D inputImageTexture;\nvoid main()\n{\n    gl_FragColor = vec4(1.0);\n}\n",
    );
    let err = device.compile_program(&source).unwrap_err();
    assert!(matches!(err, KinettaError::ShaderCompile(_)));
}

#[test]
fn flipped_geometry_reverses_rows() {
    let mut device = SoftwareDevice::new();
    let program = device.compile_program(&ShaderSource::no_filter()).unwrap();
    let r = res(1, 2);
    let tex = upload(&mut device, r, &[1, 1, 1, 255, 2, 2, 2, 255]);
    let out = draw_into_fbo(
        &mut device,
        program,
        tex,
        r,
        &QuadGeometry::flipped_vertically(),
    );
    assert_eq!(out, vec![2, 2, 2, 255, 1, 1, 1, 255]);
}

#[test]
fn arbitrary_geometry_is_rejected() {
    let mut device = SoftwareDevice::new();
    let program = device.compile_program(&ShaderSource::no_filter()).unwrap();
    let r = res(1, 1);
    let tex = upload(&mut device, r, &[0, 0, 0, 255]);
    let fbo = device.create_framebuffer(r).unwrap();
    device.bind_framebuffer(Some(fbo.id)).unwrap();
    let mut geometry = QuadGeometry::upright();
    geometry.tex_coords[0] = 0.25;
    assert!(device.draw_quad(program, tex, &geometry).is_err());
}

struct CollectSink(Mutex<Vec<SinkFrame>>);

impl SurfaceSink for CollectSink {
    fn on_frame(&self, frame: SinkFrame) {
        self.0.lock().unwrap().push(frame);
    }
}

#[test]
fn encoder_surface_swap_delivers_back_buffer() {
    let mut device = SoftwareDevice::new();
    let program = device.compile_program(&ShaderSource::no_filter()).unwrap();
    let r = res(2, 1);
    let sink = Arc::new(CollectSink(Mutex::new(Vec::new())));
    let surface = device.create_encoder_surface(r, sink.clone()).unwrap();
    device.make_current(surface).unwrap();

    let tex = upload(&mut device, r, &[9, 8, 7, 255, 6, 5, 4, 255]);
    device
        .draw_quad(program, tex, &QuadGeometry::upright())
        .unwrap();
    device.swap(surface).unwrap();

    let frames = sink.0.lock().unwrap();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].resolution, r);
    assert_eq!(frames[0].data, vec![9, 8, 7, 255, 6, 5, 4, 255]);
}

#[test]
fn display_surface_swap_delivers_nothing_but_succeeds() {
    let mut device = SoftwareDevice::new();
    let surface = device.create_display_surface(res(1, 1)).unwrap();
    device.make_current(surface).unwrap();
    device.swap(surface).unwrap();
}

#[test]
fn lost_surface_rejects_use_and_reports_dead() {
    let mut device = SoftwareDevice::new();
    let surface = device.create_display_surface(res(1, 1)).unwrap();
    assert!(device.surface_alive(surface));

    device.invalidate_surface(surface);
    assert!(!device.surface_alive(surface));
    assert!(device.make_current(surface).is_err());
    assert!(device.swap(surface).is_err());
}

#[test]
fn destroyed_surface_is_not_alive() {
    let mut device = SoftwareDevice::new();
    let surface = device.create_display_surface(res(1, 1)).unwrap();
    device.destroy_surface(surface);
    assert!(!device.surface_alive(surface));
    assert!(device.current_surface().is_none());
}

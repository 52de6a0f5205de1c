use super::*;

use crate::filter::effects::{BrightnessFilter, ShaderFilter};
use crate::gpu::software::SoftwareDevice;

fn res(w: u32, h: u32) -> Resolution {
    Resolution::new(w, h).unwrap()
}

fn ready_group(device: &mut SoftwareDevice, size: Resolution) -> FilterGroup {
    let mut group = FilterGroup::new();
    group.init(device).unwrap();
    group.output_size_changed(device, size).unwrap();
    group
}

fn read_texture(device: &mut SoftwareDevice, texture: TextureId, size: Resolution) -> Vec<u8> {
    // Draw the texture through a passthrough program into a scratch fbo.
    let mut passthrough = FilterState::passthrough();
    passthrough.init(device).unwrap();
    let fbo = device.create_framebuffer(size).unwrap();
    device.bind_framebuffer(Some(fbo.id)).unwrap();
    passthrough
        .draw(device, texture, &QuadGeometry::upright())
        .unwrap();
    let frame = device.read_pixels().unwrap();
    device.bind_framebuffer(None).unwrap();
    frame.data
}

#[test]
fn empty_chain_returns_input_unchanged() {
    let mut device = SoftwareDevice::new();
    let mut group = ready_group(&mut device, res(2, 2));
    let input = device.create_texture(res(2, 2)).unwrap();
    let out = group.draw_offscreen(&mut device, input).unwrap();
    assert_eq!(out, input);
}

#[test]
fn snapshot_is_immutable_across_mutation() {
    let mut device = SoftwareDevice::new();
    let mut group = ready_group(&mut device, res(2, 2));

    let before = group.snapshot();
    group
        .push(&mut device, Box::new(ShaderFilter::grayscale()))
        .unwrap();
    let after = group.snapshot();

    assert_eq!(before.len(), 0);
    assert_eq!(after.len(), 1);
}

#[test]
fn push_initializes_filters_when_group_is_live() {
    let mut device = SoftwareDevice::new();
    let mut group = ready_group(&mut device, res(1, 1));
    group
        .push(&mut device, Box::new(ShaderFilter::invert()))
        .unwrap();

    let chain = group.snapshot();
    let input = device.create_texture(res(1, 1)).unwrap();
    device
        .upload_texture(input, res(1, 1), &[0, 0, 0, 255])
        .unwrap();
    // Filter draws without an explicit init because push already did it.
    let out = group.draw_offscreen(&mut device, input).unwrap();
    assert_ne!(out, input);
    assert_eq!(chain.len(), 1);
}

#[test]
fn chained_filters_compose_in_order() {
    let mut device = SoftwareDevice::new();
    let size = res(1, 1);
    let mut group = ready_group(&mut device, size);
    group
        .push(&mut device, Box::new(BrightnessFilter::new(1.0)))
        .unwrap();
    group
        .push(&mut device, Box::new(ShaderFilter::invert()))
        .unwrap();

    let input = device.create_texture(size).unwrap();
    device
        .upload_texture(input, size, &[0, 0, 0, 255])
        .unwrap();
    let out = group.draw_offscreen(&mut device, input).unwrap();
    // Brightness saturates to white, invert turns it black again.
    assert_eq!(read_texture(&mut device, out, size), vec![0, 0, 0, 255]);
}

#[test]
fn pop_on_empty_group_is_a_no_op() {
    let mut device = SoftwareDevice::new();
    let mut group = ready_group(&mut device, res(1, 1));
    group.pop(&mut device);
    assert_eq!(group.snapshot().len(), 0);
}

#[test]
fn pop_removes_the_last_filter() {
    let mut device = SoftwareDevice::new();
    let mut group = ready_group(&mut device, res(1, 1));
    group
        .push(&mut device, Box::new(ShaderFilter::grayscale()))
        .unwrap();
    group
        .push(&mut device, Box::new(ShaderFilter::invert()))
        .unwrap();
    group.pop(&mut device);

    let input = device.create_texture(res(1, 1)).unwrap();
    device
        .upload_texture(input, res(1, 1), &[255, 0, 0, 255])
        .unwrap();
    let out = group.draw_offscreen(&mut device, input).unwrap();
    // Only grayscale remains.
    assert_eq!(
        read_texture(&mut device, out, res(1, 1)),
        vec![54, 54, 54, 255]
    );
}

#[test]
fn draw_before_init_is_a_no_op() {
    let mut device = SoftwareDevice::new();
    let mut group = FilterGroup::new();
    let input = device.create_texture(res(1, 1)).unwrap();
    group
        .draw(&mut device, input, &QuadGeometry::upright())
        .unwrap();
}

#[test]
fn resize_drops_and_recreates_intermediate_buffers() {
    let mut device = SoftwareDevice::new();
    let mut group = ready_group(&mut device, res(2, 2));
    group
        .push(&mut device, Box::new(ShaderFilter::grayscale()))
        .unwrap();

    let input = device.create_texture(res(2, 2)).unwrap();
    group.draw_offscreen(&mut device, input).unwrap();

    group.output_size_changed(&mut device, res(4, 4)).unwrap();
    let input = device.create_texture(res(4, 4)).unwrap();
    let out = group.draw_offscreen(&mut device, input).unwrap();
    assert_eq!(
        read_texture(&mut device, out, res(4, 4)).len(),
        res(4, 4).rgba_len()
    );
}

use super::*;

#[test]
fn fps_rejects_zero_parts() {
    assert!(Fps::new(0, 1).is_err());
    assert!(Fps::new(30, 0).is_err());
    assert!(Fps::new(30, 1).is_ok());
}

#[test]
fn fps_frame_duration_rounds_down() {
    assert_eq!(Fps::new(30, 1).unwrap().frame_duration_us(), 33_333);
    assert_eq!(Fps::new(25, 1).unwrap().frame_duration_us(), 40_000);
    assert_eq!(Fps::new(30_000, 1001).unwrap().frame_duration_us(), 33_366);
}

#[test]
fn fps_frame_pts_scales_by_index() {
    let fps = Fps::new(25, 1).unwrap();
    assert_eq!(fps.frame_pts(FrameIndex(0)), MediaTimestamp::ZERO);
    assert_eq!(fps.frame_pts(FrameIndex(10)).as_us(), 400_000);
}

#[test]
fn fps_as_f64() {
    assert!((Fps::new(30_000, 1001).unwrap().as_f64() - 29.97).abs() < 0.01);
}

#[test]
fn resolution_rejects_zero_dimensions() {
    assert!(Resolution::new(0, 1080).is_err());
    assert!(Resolution::new(1920, 0).is_err());
}

#[test]
fn resolution_rgba_len() {
    let res = Resolution::new(4, 3).unwrap();
    assert_eq!(res.rgba_len(), 48);
}

#[test]
fn timestamp_add_saturates() {
    assert_eq!(MediaTimestamp(5).add_us(3).as_us(), 8);
    assert_eq!(MediaTimestamp(i64::MAX).add_us(1).as_us(), i64::MAX);
}

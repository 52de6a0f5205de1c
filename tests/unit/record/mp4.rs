use super::*;

use crate::foundation::core::{Fps, MediaTimestamp, Resolution};
use crate::record::sample::{SampleFlags, TrackDetail};

fn scratch_path(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("kinetta_test_{tag}_{}_{nanos}.mp4", std::process::id()))
}

#[test]
fn zero_track_stop_writes_a_minimal_valid_mp4() {
    let path = scratch_path("empty");
    let mut writer = Mp4Writer::new(Mp4WriterOpts::new(&path));
    writer.stop().unwrap();

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 144);
    let ftyp_len = u32::from_be_bytes(bytes[0..4].try_into().unwrap()) as usize;
    assert_eq!(&bytes[4..8], b"ftyp");
    assert_eq!(&bytes[8..12], b"isom");
    // The next box must begin exactly where ftyp's declared size ends.
    assert_eq!(&bytes[ftyp_len + 4..ftyp_len + 8], b"moov");
    let moov_len =
        u32::from_be_bytes(bytes[ftyp_len..ftyp_len + 4].try_into().unwrap()) as usize;
    assert_eq!(ftyp_len + moov_len, bytes.len());
    assert_eq!(&bytes[ftyp_len + 12..ftyp_len + 16], b"mvhd");

    // Repeat stop leaves the file alone.
    writer.stop().unwrap();
    assert_eq!(fs::read(&path).unwrap(), bytes);
    fs::remove_file(&path).unwrap();
}

#[test]
fn add_track_outside_the_prepare_window_fails() {
    let mut writer = Mp4Writer::new(Mp4WriterOpts::new(scratch_path("window")));
    let format = TrackFormat {
        kind: TrackKind::Video,
        codec_name: "vp9(ivf)".to_string(),
        extradata: Vec::new(),
        timebase: Timebase::hz(30),
        detail: TrackDetail::Video {
            resolution: Resolution::new(2, 2).unwrap(),
            fps: Fps::new(30, 1).unwrap(),
        },
    };
    assert!(writer.add_track(&format).is_err());
}

#[test]
fn write_sample_before_start_fails() {
    let mut writer = Mp4Writer::new(Mp4WriterOpts::new(scratch_path("early")));
    let sample = EncodedSample {
        track: TrackKind::Video,
        pts: MediaTimestamp::ZERO,
        flags: SampleFlags {
            key: true,
            end_of_stream: false,
        },
        data: vec![0],
    };
    assert!(writer.write_sample(&sample).is_err());
}

#[test]
fn temp_stream_paths_are_distinct_per_track() {
    let video = temp_stream_path(TrackKind::Video, "ivf");
    let audio = temp_stream_path(TrackKind::Audio, "adts");
    assert_ne!(video, audio);
    assert!(video.to_string_lossy().ends_with(".ivf"));
    assert!(audio.to_string_lossy().ends_with(".adts"));
}

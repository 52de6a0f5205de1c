use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::foundation::error::{KinettaError, KinettaResult};
use crate::record::ffmpeg::is_ffmpeg_on_path;
use crate::record::muxer::ContainerWriter;
use crate::record::sample::{EncodedSample, Timebase, TrackFormat, TrackKind};

/// Options for [`Mp4Writer`].
#[derive(Clone, Debug)]
pub struct Mp4WriterOpts {
    /// Destination path, conventionally ending in `.mp4`.
    pub out_path: PathBuf,
    /// Replace an existing file instead of refusing.
    pub overwrite: bool,
}

impl Mp4WriterOpts {
    /// Options with overwrite enabled.
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: out_path.into(),
            overwrite: true,
        }
    }
}

struct TrackFile {
    kind: TrackKind,
    path: PathBuf,
    file: File,
    timebase: Timebase,
    frames: u32,
}

/// Deletes its paths on drop; used so intermediate streams never outlive
/// the remux.
struct TempFileGuard(Vec<PathBuf>);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        for path in &self.0 {
            let _ = fs::remove_file(path);
        }
    }
}

fn ensure_parent_dir(path: &Path) -> KinettaResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| {
            KinettaError::muxer(format!(
                "failed to create output directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}

fn temp_stream_path(kind: TrackKind, ext: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!(
        "kinetta_track_{}_{}_{:?}.{ext}",
        std::process::id(),
        nanos,
        kind
    ))
}

/// MP4 destination backed by per-track elementary-stream files and a final
/// stream-copy remux through the system `ffmpeg`.
///
/// Video tracks must arrive as IVF-framed VP9 (`vp9(ivf)`) and audio tracks
/// as ADTS-framed AAC (`aac(adts)`); raw codecs are rejected at `add_track`.
/// A recording that never registered a track still finalizes to a minimal
/// valid empty MP4.
pub struct Mp4Writer {
    opts: Mp4WriterOpts,
    tracks: Vec<TrackFile>,
    guard: TempFileGuard,
    prepared: bool,
    started: bool,
    finished: bool,
}

impl Mp4Writer {
    /// Create a writer for `opts`.
    pub fn new(opts: Mp4WriterOpts) -> Self {
        Self {
            opts,
            tracks: Vec::new(),
            guard: TempFileGuard(Vec::new()),
            prepared: false,
            started: false,
            finished: false,
        }
    }

    fn track_mut(&mut self, kind: TrackKind) -> KinettaResult<&mut TrackFile> {
        self.tracks
            .iter_mut()
            .find(|t| t.kind == kind)
            .ok_or_else(|| KinettaError::muxer(format!("no {kind:?} track registered")))
    }

    fn remux(&mut self) -> KinettaResult<()> {
        for track in &mut self.tracks {
            track.file.flush().map_err(|e| {
                KinettaError::muxer(format!("failed to flush track stream: {e}"))
            })?;
            // IVF carries a stream-level frame count at offset 24.
            if track.kind == TrackKind::Video {
                track
                    .file
                    .seek(SeekFrom::Start(24))
                    .and_then(|_| track.file.write_all(&track.frames.to_le_bytes()))
                    .map_err(|e| {
                        KinettaError::muxer(format!("failed to patch IVF frame count: {e}"))
                    })?;
                track.file.flush().map_err(|e| {
                    KinettaError::muxer(format!("failed to flush track stream: {e}"))
                })?;
            }
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-loglevel").arg("error").arg("-y");
        for track in &self.tracks {
            cmd.arg("-i").arg(&track.path);
        }
        cmd.arg("-c")
            .arg("copy")
            .arg("-movflags")
            .arg("+faststart")
            .arg(&self.opts.out_path);

        let output = cmd.output().map_err(|e| {
            KinettaError::muxer(format!("failed to run ffmpeg for remux: {e}"))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(KinettaError::muxer(format!(
                "ffmpeg remux exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl ContainerWriter for Mp4Writer {
    fn prepare(&mut self) -> KinettaResult<()> {
        if self.prepared {
            return Err(KinettaError::muxer("mp4 writer prepared twice"));
        }
        if !is_ffmpeg_on_path() {
            return Err(KinettaError::muxer(
                "ffmpeg is required for mp4 output, but was not found on PATH",
            ));
        }
        ensure_parent_dir(&self.opts.out_path)?;
        if self.opts.out_path.exists() && !self.opts.overwrite {
            return Err(KinettaError::muxer(format!(
                "output file already exists: {}",
                self.opts.out_path.display()
            )));
        }
        self.prepared = true;
        Ok(())
    }

    fn add_track(&mut self, format: &TrackFormat) -> KinettaResult<()> {
        if !self.prepared || self.started {
            return Err(KinettaError::muxer("add_track outside prepare/start window"));
        }
        let ext = match (format.kind, format.codec_name.as_str()) {
            (TrackKind::Video, "vp9(ivf)") => "ivf",
            (TrackKind::Audio, "aac(adts)") => "adts",
            (kind, name) => {
                return Err(KinettaError::codec(format!(
                    "mp4 writer cannot accept {kind:?} codec {name:?}"
                )));
            }
        };
        if self.tracks.iter().any(|t| t.kind == format.kind) {
            return Err(KinettaError::muxer(format!(
                "{:?} track registered twice",
                format.kind
            )));
        }

        let path = temp_stream_path(format.kind, ext);
        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| {
                KinettaError::muxer(format!(
                    "failed to create track stream {}: {e}",
                    path.display()
                ))
            })?;
        file.write_all(&format.extradata).map_err(|e| {
            KinettaError::muxer(format!("failed to write stream header: {e}"))
        })?;
        self.guard.0.push(path.clone());
        self.tracks.push(TrackFile {
            kind: format.kind,
            path,
            file,
            timebase: format.timebase,
            frames: 0,
        });
        Ok(())
    }

    fn start(&mut self) -> KinettaResult<()> {
        if !self.prepared || self.started {
            return Err(KinettaError::muxer("mp4 writer start out of order"));
        }
        self.started = true;
        Ok(())
    }

    fn write_sample(&mut self, sample: &EncodedSample) -> KinettaResult<()> {
        if !self.started {
            return Err(KinettaError::evaluation("write_sample before start"));
        }
        let track = self.track_mut(sample.track)?;
        match track.kind {
            TrackKind::Video => {
                let ticks = track.timebase.us_to_ticks(sample.pts.as_us());
                let mut header = [0u8; 12];
                header[0..4].copy_from_slice(&(sample.data.len() as u32).to_le_bytes());
                header[4..12].copy_from_slice(&ticks.to_le_bytes());
                track
                    .file
                    .write_all(&header)
                    .and_then(|_| track.file.write_all(&sample.data))
                    .map_err(|e| {
                        KinettaError::muxer(format!("failed to append video frame: {e}"))
                    })?;
                track.frames += 1;
            }
            TrackKind::Audio => {
                track.file.write_all(&sample.data).map_err(|e| {
                    KinettaError::muxer(format!("failed to append audio frame: {e}"))
                })?;
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> KinettaResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        if self.tracks.is_empty() {
            ensure_parent_dir(&self.opts.out_path)?;
            return write_empty_mp4(&self.opts.out_path);
        }
        self.remux()
    }
}

/// Write a structurally valid zero-track, zero-duration MP4: `ftyp` plus a
/// `moov` holding only an `mvhd`.
fn write_empty_mp4(path: &Path) -> KinettaResult<()> {
    let mut bytes = Vec::with_capacity(144);

    // ftyp: isom major brand, isom/iso2/mp41 compatible. 28 bytes: size,
    // type, major brand, minor version, three compatible brands.
    bytes.extend_from_slice(&28u32.to_be_bytes());
    bytes.extend_from_slice(b"ftyp");
    bytes.extend_from_slice(b"isom");
    bytes.extend_from_slice(&512u32.to_be_bytes());
    bytes.extend_from_slice(b"isom");
    bytes.extend_from_slice(b"iso2");
    bytes.extend_from_slice(b"mp41");

    // moov { mvhd }
    bytes.extend_from_slice(&116u32.to_be_bytes());
    bytes.extend_from_slice(b"moov");
    bytes.extend_from_slice(&108u32.to_be_bytes());
    bytes.extend_from_slice(b"mvhd");
    bytes.extend_from_slice(&[0u8; 4]); // version + flags
    bytes.extend_from_slice(&[0u8; 8]); // creation + modification time
    bytes.extend_from_slice(&1000u32.to_be_bytes()); // timescale
    bytes.extend_from_slice(&0u32.to_be_bytes()); // duration
    bytes.extend_from_slice(&0x0001_0000u32.to_be_bytes()); // rate 1.0
    bytes.extend_from_slice(&0x0100u16.to_be_bytes()); // volume 1.0
    bytes.extend_from_slice(&[0u8; 10]); // reserved
    for v in [
        0x0001_0000u32,
        0,
        0,
        0,
        0x0001_0000,
        0,
        0,
        0,
        0x4000_0000,
    ] {
        bytes.extend_from_slice(&v.to_be_bytes()); // unity matrix
    }
    bytes.extend_from_slice(&[0u8; 24]); // pre-defined
    bytes.extend_from_slice(&1u32.to_be_bytes()); // next track id

    fs::write(path, &bytes).map_err(|e| {
        KinettaError::muxer(format!(
            "failed to write empty mp4 {}: {e}",
            path.display()
        ))
    })
}

#[cfg(test)]
#[path = "../../tests/unit/record/mp4.rs"]
mod tests;

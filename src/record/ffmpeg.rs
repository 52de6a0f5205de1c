use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::JoinHandle;

use crate::foundation::core::MediaTimestamp;
use crate::foundation::error::{KinettaError, KinettaResult};
use crate::gpu::device::RawFrame;
use crate::record::codec::{
    AudioCodec, AudioCodecConfig, PcmChunk, SampleBatch, VideoCodec, VideoCodecConfig,
};
use crate::record::sample::{
    EncodedSample, SampleFlags, Timebase, TrackDetail, TrackFormat, TrackKind,
};

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

struct FfmpegChild {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
}

fn spawn_ffmpeg(args: &[&str]) -> KinettaResult<(FfmpegChild, std::process::ChildStdout)> {
    if !is_ffmpeg_on_path() {
        return Err(KinettaError::codec(
            "ffmpeg is required for stream encoding, but was not found on PATH",
        ));
    }

    let mut cmd = Command::new("ffmpeg");
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| KinettaError::codec(format!("failed to spawn ffmpeg: {e}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| KinettaError::codec("failed to open ffmpeg stdin (unexpected)"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| KinettaError::codec("failed to open ffmpeg stdout (unexpected)"))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| KinettaError::codec("failed to open ffmpeg stderr (unexpected)"))?;
    let stderr_drain = std::thread::spawn(move || {
        let mut bytes = Vec::new();
        stderr.read_to_end(&mut bytes)?;
        Ok(bytes)
    });

    Ok((
        FfmpegChild {
            child,
            stdin: Some(stdin),
            stderr_drain: Some(stderr_drain),
        },
        stdout,
    ))
}

impl FfmpegChild {
    /// Close stdin, wait for exit, and surface a failing status together
    /// with the captured stderr.
    fn finish(&mut self) -> KinettaResult<()> {
        drop(self.stdin.take());
        let status = self
            .child
            .wait()
            .map_err(|e| KinettaError::codec(format!("failed to wait for ffmpeg: {e}")))?;
        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| KinettaError::codec("ffmpeg stderr drain thread panicked"))?
                .map_err(|e| KinettaError::codec(format!("ffmpeg stderr read failed: {e}")))?,
            None => Vec::new(),
        };
        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr_bytes);
            return Err(KinettaError::codec(format!(
                "ffmpeg exited with status {}: {}",
                status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Parsed IVF stream header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct IvfHeader {
    pub(crate) width: u16,
    pub(crate) height: u16,
    /// Timebase denominator: pts ticks per `tb_num` seconds.
    pub(crate) tb_den: u32,
    /// Timebase numerator.
    pub(crate) tb_num: u32,
}

pub(crate) const IVF_HEADER_LEN: usize = 32;
pub(crate) const IVF_FRAME_HEADER_LEN: usize = 12;

pub(crate) fn parse_ivf_header(raw: &[u8]) -> KinettaResult<IvfHeader> {
    if raw.len() != IVF_HEADER_LEN || &raw[0..4] != b"DKIF" {
        return Err(KinettaError::codec("invalid IVF stream header"));
    }
    let u16le = |i: usize| u16::from_le_bytes([raw[i], raw[i + 1]]);
    let u32le = |i: usize| u32::from_le_bytes([raw[i], raw[i + 1], raw[i + 2], raw[i + 3]]);
    let header = IvfHeader {
        width: u16le(12),
        height: u16le(14),
        tb_den: u32le(16),
        tb_num: u32le(20),
    };
    if header.tb_den == 0 || header.tb_num == 0 {
        return Err(KinettaError::codec("IVF header has a zero timebase"));
    }
    Ok(header)
}

/// Length in bytes of the ADTS frame starting at `buf`, when `buf` holds a
/// complete 7-byte header with a valid syncword.
pub(crate) fn adts_frame_len(buf: &[u8]) -> Option<usize> {
    if buf.len() < 7 || buf[0] != 0xFF || (buf[1] & 0xF0) != 0xF0 {
        return None;
    }
    let len = ((usize::from(buf[3]) & 0x03) << 11)
        | (usize::from(buf[4]) << 3)
        | (usize::from(buf[5]) >> 5);
    if len < 7 { None } else { Some(len) }
}

enum ReaderMsg {
    IvfHeader { raw: Vec<u8>, header: IvfHeader },
    Frame { pts_ticks: u64, data: Vec<u8> },
}

fn ivf_reader(mut stdout: impl Read, tx: Sender<ReaderMsg>) {
    let mut header = [0u8; IVF_HEADER_LEN];
    if stdout.read_exact(&mut header).is_err() {
        return;
    }
    let Ok(parsed) = parse_ivf_header(&header) else {
        return;
    };
    if tx
        .send(ReaderMsg::IvfHeader {
            raw: header.to_vec(),
            header: parsed,
        })
        .is_err()
    {
        return;
    }

    loop {
        let mut fh = [0u8; IVF_FRAME_HEADER_LEN];
        if stdout.read_exact(&mut fh).is_err() {
            return;
        }
        let size = u32::from_le_bytes([fh[0], fh[1], fh[2], fh[3]]) as usize;
        let pts_ticks = u64::from_le_bytes([
            fh[4], fh[5], fh[6], fh[7], fh[8], fh[9], fh[10], fh[11],
        ]);
        let mut data = vec![0u8; size];
        if stdout.read_exact(&mut data).is_err() {
            return;
        }
        if tx.send(ReaderMsg::Frame { pts_ticks, data }).is_err() {
            return;
        }
    }
}

fn adts_reader(mut stdout: impl Read, tx: Sender<ReaderMsg>) {
    let mut index: u64 = 0;
    loop {
        let mut head = [0u8; 7];
        if stdout.read_exact(&mut head).is_err() {
            return;
        }
        let Some(len) = adts_frame_len(&head) else {
            return;
        };
        let mut data = head.to_vec();
        data.resize(len, 0);
        if stdout.read_exact(&mut data[7..]).is_err() {
            return;
        }
        if tx
            .send(ReaderMsg::Frame {
                pts_ticks: index,
                data,
            })
            .is_err()
        {
            return;
        }
        index += 1;
    }
}

/// VP9 video codec driving the system `ffmpeg`: raw RGBA frames in, IVF
/// framing out. The IVF stream header becomes the track extradata; frame
/// timestamps come from the IVF frame headers.
pub struct IvfVideoCodec {
    cfg: Option<VideoCodecConfig>,
    process: Option<FfmpegChild>,
    rx: Option<Receiver<ReaderMsg>>,
    reader: Option<JoinHandle<()>>,
    format: Option<TrackFormat>,
    emitted: u64,
}

impl IvfVideoCodec {
    /// Create an unconfigured codec.
    pub fn new() -> Self {
        Self {
            cfg: None,
            process: None,
            rx: None,
            reader: None,
            format: None,
            emitted: 0,
        }
    }

    fn drain(&mut self, out: &mut SampleBatch) {
        let Some(cfg) = self.cfg else { return };
        let msgs: Vec<ReaderMsg> = match self.rx.as_ref() {
            Some(rx) => rx.try_iter().collect(),
            None => return,
        };
        for msg in msgs {
            match msg {
                ReaderMsg::IvfHeader { raw, header } => {
                    self.format = Some(TrackFormat {
                        kind: TrackKind::Video,
                        codec_name: "vp9(ivf)".to_string(),
                        extradata: raw,
                        // Kept rational: NTSC streams report 1001/30000.
                        timebase: Timebase {
                            num: header.tb_num,
                            den: header.tb_den,
                        },
                        detail: TrackDetail::Video {
                            resolution: cfg.resolution,
                            fps: cfg.fps,
                        },
                    });
                }
                ReaderMsg::Frame { pts_ticks, data } => {
                    let tb = self
                        .format
                        .as_ref()
                        .map(|f| f.timebase)
                        .unwrap_or(Timebase::MICROS);
                    let pts_us = tb.ticks_to_us(pts_ticks);
                    out.push(EncodedSample {
                        track: TrackKind::Video,
                        pts: MediaTimestamp(pts_us),
                        flags: SampleFlags {
                            key: self.emitted == 0,
                            end_of_stream: false,
                        },
                        data,
                    });
                    self.emitted += 1;
                }
            }
        }
    }
}

impl Default for IvfVideoCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoCodec for IvfVideoCodec {
    fn configure(&mut self, cfg: &VideoCodecConfig) -> KinettaResult<()> {
        if self.process.is_some() {
            return Err(KinettaError::codec("video codec configured twice"));
        }
        let size = format!("{}x{}", cfg.resolution.width, cfg.resolution.height);
        let rate = format!("{}/{}", cfg.fps.num, cfg.fps.den);
        let bitrate = cfg.bitrate.to_string();
        let args = [
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            size.as_str(),
            "-r",
            rate.as_str(),
            "-i",
            "pipe:0",
            "-c:v",
            "libvpx-vp9",
            "-b:v",
            bitrate.as_str(),
            "-deadline",
            "realtime",
            "-f",
            "ivf",
            "pipe:1",
        ];

        let (process, stdout) = spawn_ffmpeg(&args)?;
        let (tx, rx) = channel();
        let reader = std::thread::spawn(move || ivf_reader(stdout, tx));

        self.cfg = Some(*cfg);
        self.process = Some(process);
        self.rx = Some(rx);
        self.reader = Some(reader);
        Ok(())
    }

    fn format(&self) -> Option<TrackFormat> {
        self.format.clone()
    }

    fn encode(&mut self, frame: &RawFrame) -> KinettaResult<SampleBatch> {
        let cfg = self
            .cfg
            .ok_or_else(|| KinettaError::codec("video codec not configured"))?;
        if frame.data.len() != cfg.resolution.rgba_len() {
            return Err(KinettaError::validation(format!(
                "frame size mismatch: got {} bytes, expected {}",
                frame.data.len(),
                cfg.resolution.rgba_len()
            )));
        }
        let stdin = self
            .process
            .as_mut()
            .and_then(|p| p.stdin.as_mut())
            .ok_or_else(|| KinettaError::codec("video codec is already finished"))?;
        stdin
            .write_all(&frame.data)
            .map_err(|e| KinettaError::codec(format!("failed to write frame to ffmpeg: {e}")))?;

        let mut out = SampleBatch::new();
        self.drain(&mut out);
        Ok(out)
    }

    fn finish(&mut self) -> KinettaResult<Vec<EncodedSample>> {
        let Some(mut process) = self.process.take() else {
            return Ok(Vec::new());
        };
        drop(process.stdin.take());
        if let Some(reader) = self.reader.take()
            && reader.join().is_err()
        {
            return Err(KinettaError::codec("ffmpeg reader thread panicked"));
        }
        process.finish()?;

        let mut out = SampleBatch::new();
        self.drain(&mut out);
        let mut tail: Vec<EncodedSample> = out.into_vec();
        if let Some(last) = tail.last_mut() {
            last.flags.end_of_stream = true;
        }
        Ok(tail)
    }
}

/// AAC audio codec driving the system `ffmpeg`: f32le PCM in, ADTS framing
/// out. ADTS frames are self-delimiting, so the track has no extradata;
/// timestamps derive from the per-frame sample count.
pub struct AdtsAudioCodec {
    cfg: Option<AudioCodecConfig>,
    process: Option<FfmpegChild>,
    rx: Option<Receiver<ReaderMsg>>,
    reader: Option<JoinHandle<()>>,
    format: Option<TrackFormat>,
}

/// Samples per AAC frame.
const AAC_FRAME_SAMPLES: u64 = 1024;

impl AdtsAudioCodec {
    /// Create an unconfigured codec.
    pub fn new() -> Self {
        Self {
            cfg: None,
            process: None,
            rx: None,
            reader: None,
            format: None,
        }
    }

    fn drain(&mut self, out: &mut SampleBatch) {
        let Some(cfg) = self.cfg else { return };
        let msgs: Vec<ReaderMsg> = match self.rx.as_ref() {
            Some(rx) => rx.try_iter().collect(),
            None => return,
        };
        for msg in msgs {
            if let ReaderMsg::Frame { pts_ticks, data } = msg {
                if self.format.is_none() {
                    self.format = Some(TrackFormat {
                        kind: TrackKind::Audio,
                        codec_name: "aac(adts)".to_string(),
                        extradata: Vec::new(),
                        timebase: Timebase::hz(cfg.sample_rate),
                        detail: TrackDetail::Audio {
                            sample_rate: cfg.sample_rate,
                            channels: cfg.channels,
                        },
                    });
                }
                let pts_us = (pts_ticks.saturating_mul(AAC_FRAME_SAMPLES) as i64)
                    .saturating_mul(1_000_000)
                    / i64::from(cfg.sample_rate.max(1));
                out.push(EncodedSample {
                    track: TrackKind::Audio,
                    pts: MediaTimestamp(pts_us),
                    flags: SampleFlags {
                        key: true,
                        end_of_stream: false,
                    },
                    data,
                });
            }
        }
    }
}

impl Default for AdtsAudioCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioCodec for AdtsAudioCodec {
    fn configure(&mut self, cfg: &AudioCodecConfig) -> KinettaResult<()> {
        if self.process.is_some() {
            return Err(KinettaError::codec("audio codec configured twice"));
        }
        if cfg.sample_rate == 0 || cfg.channels == 0 {
            return Err(KinettaError::codec(
                "audio sample_rate and channels must be non-zero",
            ));
        }
        let sample_rate = cfg.sample_rate.to_string();
        let channels = cfg.channels.to_string();
        let bitrate = cfg.bitrate.to_string();
        let args = [
            "-loglevel",
            "error",
            "-f",
            "f32le",
            "-ar",
            sample_rate.as_str(),
            "-ac",
            channels.as_str(),
            "-i",
            "pipe:0",
            "-c:a",
            "aac",
            "-b:a",
            bitrate.as_str(),
            "-f",
            "adts",
            "pipe:1",
        ];

        let (process, stdout) = spawn_ffmpeg(&args)?;
        let (tx, rx) = channel();
        let reader = std::thread::spawn(move || adts_reader(stdout, tx));

        self.cfg = Some(*cfg);
        self.process = Some(process);
        self.rx = Some(rx);
        self.reader = Some(reader);
        Ok(())
    }

    fn format(&self) -> Option<TrackFormat> {
        self.format.clone()
    }

    fn encode(&mut self, pcm: &PcmChunk) -> KinettaResult<SampleBatch> {
        if self.cfg.is_none() {
            return Err(KinettaError::codec("audio codec not configured"));
        }
        let stdin = self
            .process
            .as_mut()
            .and_then(|p| p.stdin.as_mut())
            .ok_or_else(|| KinettaError::codec("audio codec is already finished"))?;
        let mut bytes = Vec::with_capacity(pcm.samples.len() * 4);
        for s in &pcm.samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        stdin
            .write_all(&bytes)
            .map_err(|e| KinettaError::codec(format!("failed to write PCM to ffmpeg: {e}")))?;

        let mut out = SampleBatch::new();
        self.drain(&mut out);
        Ok(out)
    }

    fn finish(&mut self) -> KinettaResult<Vec<EncodedSample>> {
        let Some(mut process) = self.process.take() else {
            return Ok(Vec::new());
        };
        drop(process.stdin.take());
        if let Some(reader) = self.reader.take()
            && reader.join().is_err()
        {
            return Err(KinettaError::codec("ffmpeg reader thread panicked"));
        }
        process.finish()?;

        let mut out = SampleBatch::new();
        self.drain(&mut out);
        let mut tail: Vec<EncodedSample> = out.into_vec();
        if let Some(last) = tail.last_mut() {
            last.flags.end_of_stream = true;
        }
        Ok(tail)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/record/ffmpeg.rs"]
mod tests;

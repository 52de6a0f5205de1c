use std::path::Path;

use kinetta::filter::effects::{BrightnessFilter, ShaderFilter};
use kinetta::{
    Fps, FrameIndex, Pipeline, PipelineOpts, RawFrame, RecordingConfig, Resolution,
    SoftwareDevice,
};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let resolution = Resolution::new(256, 256)?;
    let fps = Fps::new(30, 1)?;

    let pipeline = Pipeline::spawn(
        Box::new(SoftwareDevice::new()),
        PipelineOpts::new(resolution),
    )?;
    let handle = pipeline.handle();

    handle.push_filter(Box::new(ShaderFilter::grayscale()))?;
    handle.push_filter(Box::new(BrightnessFilter::new(0.1)))?;

    let out_path = Path::new("target/demos/clip.mp4");
    handle.start_recording(RecordingConfig::mp4(out_path, resolution, fps))?;

    // Two seconds of a color sweep.
    for i in 0..60u32 {
        let shade = (i * 4) as u8;
        let frame = RawFrame::solid(
            resolution,
            [shade, 128, 255 - shade, 255],
            fps.frame_pts(FrameIndex(u64::from(i))),
        );
        handle.submit_frame(frame)?;
        std::thread::sleep(std::time::Duration::from_millis(
            (fps.frame_duration_us() / 1000) as u64,
        ));
    }

    handle.stop_recording()?;
    pipeline.shutdown()?;

    if let Some(err) = handle.writer().take_error() {
        return Err(err.into());
    }
    eprintln!("wrote {}", out_path.display());
    Ok(())
}

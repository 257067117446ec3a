// offline render: same pipeline and engine as live playback, no device, straight to a WAV
use std::path::Path;

use anyhow::Context;
use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::{info, warn};

use crate::audio::{StereoFrame, offline_engine};
use crate::config::EngineConfig;

use super::Pipeline;
use super::track::ProjectState;

const TAIL_SECS: f64 = 2.0; // room for release and reverb after the last tick

/// Render `ticks` grid ticks of `project` and return the frames.
pub fn render(project: &ProjectState, ticks: u64, config: &EngineConfig) -> Vec<StereoFrame> {
    let (sink, mut engine) = offline_engine(config);
    let clock = sink.clock().clone();
    let mut pipeline = Pipeline::new(sink, config, project.bpm);

    let report = pipeline.reconcile(&project.tracks);
    for (id, e) in &report.failures {
        warn!("track {} left out of the bounce: {}", id, e);
    }
    pipeline.start();

    let block_frames = config.block_frames.max(1);
    let mut block = vec![StereoFrame::zero(); block_frames];
    let mut out = Vec::new();
    let mut tail_end: Option<u64> = None;

    loop {
        if pipeline.counter().is_some_and(|t| t + 1 >= ticks) || ticks == 0 {
            if pipeline.is_playing() {
                pipeline.pause();
            }
            let end = *tail_end.get_or_insert_with(|| clock.frames() + clock.frame_at(TAIL_SECS));
            if clock.frames() >= end {
                break;
            }
        }
        pipeline.pump();
        engine.drain_commands();
        engine.render_block(&mut block);
        out.extend_from_slice(&block);
    }
    out
}

pub fn write_wav(path: &Path, frames: &[StereoFrame], sample_rate: u32) -> anyhow::Result<()> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec).with_context(|| format!("creating {}", path.display()))?;
    let to_i16 = |x: f32| (x.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
    for f in frames {
        writer.write_sample(to_i16(f.left))?;
        writer.write_sample(to_i16(f.right))?;
    }
    writer.finalize()?;
    Ok(())
}

pub fn bounce(project: &ProjectState, ticks: u64, config: &EngineConfig, path: &Path) -> anyhow::Result<()> {
    let frames = render(project, ticks, config);
    write_wav(path, &frames, config.offline_sample_rate)?;
    info!("bounced {} ticks ({} frames) to {}", ticks, frames.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::track::Track;

    fn config() -> EngineConfig {
        EngineConfig {
            offline_sample_rate: 8000,
            block_frames: 64,
            ..EngineConfig::default()
        }
    }

    fn project(on: &[usize]) -> ProjectState {
        let mut track = Track::with_note("A4");
        for step in on {
            track.sequencer.toggle(*step);
        }
        ProjectState {
            tracks: vec![track],
            bpm: 120.0,
        }
    }

    #[test]
    fn test_note_lands_on_its_tick() {
        // step 2 at 120 bpm is 0.5s in, frame 4000 at 8 kHz
        let frames = render(&project(&[2]), 4, &config());
        let first = frames.iter().position(|f| f.peak() > 0.0).unwrap();
        assert!((4000..4010).contains(&first), "first sound at {}", first);
    }

    #[test]
    fn test_empty_grid_is_silent() {
        let frames = render(&project(&[]), 8, &config());
        assert!(!frames.is_empty());
        assert!(frames.iter().all(|f| f.peak() == 0.0));
    }

    #[test]
    fn test_wav_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        bounce(&project(&[0]), 2, &config(), &path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8000);
        assert!(reader.duration() >= 8000 * 2);
    }
}

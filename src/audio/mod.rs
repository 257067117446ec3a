use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{error, info};

use crate::audio_api::{CommandQueue, CommandSink, command_channel};
use crate::config::EngineConfig;

mod chain;
mod clock;
mod effect;
mod engine;
mod envelope;
mod frame;
mod instrument_id;
mod voice;

pub use chain::Chain;
pub use clock::AudioClock;
pub use effect::{Effect, build_effect};
pub use engine::Engine;
pub use frame::StereoFrame;
pub use instrument_id::{InstrumentId, next_instrument_id};
pub use voice::Voice;

/// The running output device. Dropping it stops the stream.
pub struct AudioOutput {
    sink: CommandSink,
    _stream: cpal::Stream,
}

impl AudioOutput {
    pub fn sink(&self) -> &CommandSink {
        &self.sink
    }
}

pub fn start_audio(config: &EngineConfig) -> anyhow::Result<AudioOutput> {
    let host = cpal::default_host();
    let device = host.default_output_device().context("no default output device")?;
    let supported = device.default_output_config().context("no default output config")?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    info!(
        "output device {} at {} Hz, {} channels",
        device.name().unwrap_or_else(|_| "<unnamed>".into()),
        sample_rate,
        channels
    );

    let clock = AudioClock::new(sample_rate);
    let (sink, queue) = command_channel(clock.clone(), config.max_instruments, config.command_queue);
    let engine = Engine::new(queue, clock, config.max_instruments);

    match supported.sample_format() {
        cpal::SampleFormat::F32 => {
            let stream = build_output_stream_f32(&device, &supported.into(), engine, channels)?;
            stream.play().context("failed to play output stream")?;
            Ok(AudioOutput { sink, _stream: stream })
        }
        other => anyhow::bail!("unsupported sample format {:?} (only f32 supported)", other),
    }
}

fn build_output_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut engine: Engine,
    channels: usize,
) -> anyhow::Result<cpal::Stream> {
    let mut block: Vec<StereoFrame> = Vec::new();
    let err_fn = |err| error!("audio output stream error: {}", err);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
            engine.drain_commands();

            let n_frames = data.len() / channels.max(1);
            if block.len() != n_frames {
                block.resize(n_frames, StereoFrame::zero());
            }
            engine.render_block(&mut block);
            interleave(&block, data, channels);
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

// stereo frames out to however many channels the device has
fn interleave(block: &[StereoFrame], data: &mut [f32], channels: usize) {
    match channels {
        0 => {}
        1 => {
            for (out, f) in data.iter_mut().zip(block) {
                *out = 0.5 * (f.left + f.right);
            }
        }
        _ => {
            for (out, f) in data.chunks_exact_mut(channels).zip(block) {
                out[0] = f.left;
                out[1] = f.right;
                for extra in out[2..].iter_mut() {
                    *extra = 0.0;
                }
            }
        }
    }
}

/// An engine with no device behind it, driven block by block by the caller.
pub fn offline_engine(config: &EngineConfig) -> (CommandSink, Engine) {
    let clock = AudioClock::new(config.offline_sample_rate);
    let (sink, queue): (CommandSink, CommandQueue) =
        command_channel(clock.clone(), config.max_instruments, config.command_queue);
    (sink, Engine::new(queue, clock, config.max_instruments))
}

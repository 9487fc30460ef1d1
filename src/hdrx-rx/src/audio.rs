// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Audio outputs fed from the buffer pool: WAV capture and device playback.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{error, info};

use hdrx_core::{AudioPool, AudioSink};

/// Decoded program audio is 44.1 kHz interleaved stereo.
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;
pub const AUDIO_CHANNELS: u16 = 2;

pub type SinkFactory = Box<dyn FnOnce() -> io::Result<Box<dyn AudioSink>> + Send>;

fn to_io(e: impl std::fmt::Display) -> io::Error {
    io::Error::other(e.to_string())
}

/// Writes 16-bit stereo PCM to a WAV file.
pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    written: u64,
}

impl WavSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        let spec = hound::WavSpec {
            channels: AUDIO_CHANNELS,
            sample_rate: AUDIO_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec).map_err(to_io)?;
        info!("Writing audio to {}", path.display());
        Ok(Self {
            writer: Some(writer),
            written: 0,
        })
    }

    /// Close the file, fixing up the header lengths.
    pub fn finalize(&mut self) -> io::Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().map_err(to_io)?;
            info!("WAV output closed after {} samples", self.written);
        }
        Ok(())
    }
}

impl AudioSink for WavSink {
    fn play(&mut self, samples: &[i16]) -> io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "WAV output closed"));
        };
        for &sample in samples {
            writer.write_sample(sample).map_err(to_io)?;
        }
        self.written += samples.len() as u64;
        Ok(())
    }
}

impl Drop for WavSink {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            error!("Failed to finalize WAV output: {}", e);
        }
    }
}

/// Sends every buffer to each of several sinks.
pub struct FanOut(pub Vec<Box<dyn AudioSink>>);

impl AudioSink for FanOut {
    fn play(&mut self, samples: &[i16]) -> io::Result<()> {
        for sink in &mut self.0 {
            sink.play(samples)?;
        }
        Ok(())
    }
}

#[cfg(feature = "playback")]
pub use playback::PlaybackSink;

#[cfg(feature = "playback")]
mod playback {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::Duration;

    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use tracing::{info, warn};

    use hdrx_core::AudioSink;

    use super::{to_io, AUDIO_CHANNELS, AUDIO_SAMPLE_RATE};

    /// Half a second of interleaved samples.
    const RING_LIMIT: usize = AUDIO_SAMPLE_RATE as usize * AUDIO_CHANNELS as usize / 2;
    const DRAIN_POLL: Duration = Duration::from_millis(10);

    /// Plays PCM on an output device through cpal.
    ///
    /// `play` blocks while the device ring holds more than half a second, so
    /// the pool consumer runs at the device's pace.
    pub struct PlaybackSink {
        ring: Arc<Mutex<VecDeque<f32>>>,
        _stream: cpal::Stream,
    }

    impl PlaybackSink {
        pub fn open(device_name: Option<&str>) -> io::Result<Self> {
            let host = cpal::default_host();
            let device = if let Some(name) = device_name {
                host.output_devices()
                    .map_err(to_io)?
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| to_io(format!("audio output device '{name}' not found")))?
            } else {
                host.default_output_device()
                    .ok_or_else(|| to_io("no default audio output device"))?
            };

            info!(
                "Audio playback: using device '{}'",
                device.name().unwrap_or_else(|_| "unknown".into())
            );

            let config = cpal::StreamConfig {
                channels: AUDIO_CHANNELS,
                sample_rate: cpal::SampleRate(AUDIO_SAMPLE_RATE),
                buffer_size: cpal::BufferSize::Default,
            };

            let ring = Arc::new(Mutex::new(VecDeque::<f32>::with_capacity(RING_LIMIT * 2)));
            let reader = ring.clone();
            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut ring = reader.lock().unwrap_or_else(PoisonError::into_inner);
                        for sample in data.iter_mut() {
                            *sample = ring.pop_front().unwrap_or(0.0);
                        }
                    },
                    |err| warn!("Audio output stream error: {}", err),
                    None,
                )
                .map_err(to_io)?;
            stream.play().map_err(to_io)?;
            info!(
                "Audio playback: ready ({}Hz, {} ch)",
                AUDIO_SAMPLE_RATE, AUDIO_CHANNELS
            );

            Ok(Self {
                ring,
                _stream: stream,
            })
        }

        fn queued(&self) -> usize {
            self.ring
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len()
        }
    }

    impl AudioSink for PlaybackSink {
        fn play(&mut self, samples: &[i16]) -> io::Result<()> {
            while self.queued() > RING_LIMIT {
                std::thread::sleep(DRAIN_POLL);
            }
            let mut ring = self.ring.lock().unwrap_or_else(PoisonError::into_inner);
            ring.extend(samples.iter().map(|&s| f32::from(s) / 32768.0));
            Ok(())
        }
    }
}

/// Run the pool consumer on its own thread.
///
/// The sink is built on that thread since device streams are not always
/// `Send`. The thread ends once the pool is finished and drained, or on the
/// first sink error.
pub fn spawn_consumer(pool: Arc<AudioPool>, make_sink: SinkFactory) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("hdrx-audio".into())
        .spawn(move || {
            let result = make_sink().and_then(|mut sink| pool.run_consumer(sink.as_mut()));
            if let Err(e) = result {
                error!("Audio output error: {}", e);
                pool.finish();
            }
        })
}

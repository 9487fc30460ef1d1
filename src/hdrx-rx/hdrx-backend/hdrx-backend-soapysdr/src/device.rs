// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use num_complex::Complex;
use soapysdr::{Device, Direction, ErrorCode, RxStream};

use hdrx_core::error::{AcqError, AcqResult};
use hdrx_core::radio::SAMPLE_RATE_CS16_FM;
use hdrx_core::{
    BackendKind, Delivery, Freq, SampleFormat, SampleSink, Samples, TunerBackend,
    TunerCapabilities, TunerInfo,
};

use crate::gain::{parse_gain_settings, GainSetting};
use crate::{BANDWIDTH_HZ, BIAS_TEE_SETTING};

/// Complex samples requested per stream read.
const READ_SAMPLES: usize = 128 * 256 / 2;
const READ_TIMEOUT_US: i64 = 100_000;

/// SoapySDR device read as a cs16 stream.
pub struct SoapyTuner {
    info: TunerInfo,
    device: Device,
    stream: Option<RxStream<Complex<i16>>>,
    buf: Vec<Complex<i16>>,
    flat: Vec<i16>,
    gain: Option<f32>,
}

impl SoapyTuner {
    /// Open the device selected by `args` (e.g. `"driver=airspy"`), applying
    /// an optional `name=value,...` gain settings string.
    pub fn open(args: &str, gains: Option<&str>) -> AcqResult<Self> {
        tracing::info!("Initializing SoapySDR device with args: {}", args);
        let device = Device::new(args).map_err(|e| {
            AcqError::Open(format!("failed to open SoapySDR device (args={args}): {e}"))
        })?;

        device
            .set_sample_rate(Direction::Rx, 0, SAMPLE_RATE_CS16_FM)
            .map_err(|e| AcqError::Open(format!("failed to set sample rate: {e}")))?;
        let actual_rate = device
            .sample_rate(Direction::Rx, 0)
            .unwrap_or(SAMPLE_RATE_CS16_FM);
        tracing::info!(
            "Set sample rate to {} Hz (actual: {} Hz)",
            SAMPLE_RATE_CS16_FM,
            actual_rate
        );

        if let Err(e) = device.set_bandwidth(Direction::Rx, 0, BANDWIDTH_HZ) {
            tracing::warn!("Failed to set bandwidth: {}; continuing with default", e);
        }

        let label = device
            .driver_key()
            .map(|driver| format!("{driver} ({args})"))
            .unwrap_or_else(|_| args.to_string());

        let mut tuner = Self {
            info: TunerInfo {
                kind: BackendKind::GenericRadioLibrary,
                driver: "soapysdr".into(),
                label,
                format: SampleFormat::Cs16,
                delivery: Delivery::Pull,
                live: true,
                capabilities: TunerCapabilities {
                    auto_gain: false,
                    bias_tee: true,
                    antenna: true,
                    freq_correction: false,
                    direct_sampling: false,
                },
            },
            device,
            stream: None,
            buf: vec![Complex::new(0, 0); READ_SAMPLES],
            flat: Vec::with_capacity(READ_SAMPLES * 2),
            gain: None,
        };
        if let Some(gains) = gains {
            tuner
                .apply_gain_settings(gains)
                .map_err(|e| AcqError::Open(e.to_string()))?;
        }
        tracing::info!("SoapySDR tuner ready: {}", tuner.info.label);
        Ok(tuner)
    }

    /// Apply a `name=value,...` gain settings string element by element.
    pub fn apply_gain_settings(&mut self, settings: &str) -> AcqResult<()> {
        let parsed = parse_gain_settings(settings).map_err(AcqError::Rejected)?;
        for setting in parsed {
            let applied = match &setting {
                GainSetting::Agc(on) => self.device.set_gain_mode(Direction::Rx, 0, *on),
                GainSetting::Element { name, value_db } => {
                    self.device
                        .set_gain_element(Direction::Rx, 0, name.as_str(), *value_db)
                }
            };
            applied.map_err(|e| AcqError::rejected(format!("{setting}: {e}")))?;
            tracing::debug!("SoapySDR gain setting {}", setting);
        }
        self.gain = None;
        Ok(())
    }

    fn open_stream(&mut self) -> AcqResult<()> {
        let mut stream = self
            .device
            .rx_stream::<Complex<i16>>(&[0])
            .map_err(|e| AcqError::Read(format!("setting up stream: {e}")))?;
        stream
            .activate(None)
            .map_err(|e| AcqError::Read(format!("activating stream: {e}")))?;
        tracing::debug!("SoapySDR stream activated");
        self.stream = Some(stream);
        Ok(())
    }

    fn drop_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.deactivate(None) {
                tracing::warn!("SoapySDR stream deactivate failed: {}", e);
            }
        }
    }
}

impl TunerBackend for SoapyTuner {
    fn info(&self) -> &TunerInfo {
        &self.info
    }

    fn set_frequency(&mut self, freq: Freq) -> AcqResult<()> {
        self.device
            .set_frequency(Direction::Rx, 0, freq.hz as f64, ())
            .map_err(|e| AcqError::rejected(format!("failed to set frequency: {e}")))
    }

    fn frequency(&self) -> Option<Freq> {
        self.device
            .frequency(Direction::Rx, 0)
            .ok()
            .map(|hz| Freq::new(hz.round() as u64))
    }

    fn set_gain(&mut self, gain_db: f32) -> AcqResult<()> {
        self.device
            .set_gain(Direction::Rx, 0, f64::from(gain_db))
            .map_err(|e| AcqError::rejected(format!("failed to set gain: {e}")))?;
        self.gain = Some(gain_db);
        Ok(())
    }

    fn gain(&self) -> Option<f32> {
        self.gain
    }

    fn set_bias_tee(&mut self, on: bool) -> AcqResult<()> {
        self.device
            .write_setting(BIAS_TEE_SETTING, if on { "true" } else { "false" })
            .map_err(|e| AcqError::rejected(format!("failed to set bias tee: {e}")))
    }

    fn set_antenna(&mut self, name: &str) -> AcqResult<()> {
        self.device
            .set_antenna(Direction::Rx, 0, name)
            .map_err(|e| AcqError::rejected(format!("failed to select antenna {name}: {e}")))
    }

    /// Restart the stream so no sample from before a retune is delivered.
    fn reset_buffer(&mut self) -> AcqResult<()> {
        self.drop_stream();
        Ok(())
    }

    fn read(&mut self, sink: &dyn SampleSink) -> AcqResult<()> {
        if self.stream.is_none() {
            self.open_stream()?;
        }
        let Some(stream) = self.stream.as_mut() else {
            return Err(AcqError::Read("stream unavailable".into()));
        };
        let n = match stream.read(&mut [&mut self.buf[..]], READ_TIMEOUT_US) {
            Ok(n) => n,
            Err(e) if matches!(e.code, ErrorCode::Timeout | ErrorCode::Overflow) => {
                tracing::debug!("SoapySDR read: {}", e);
                0
            }
            Err(e) => return Err(AcqError::Read(format!("SoapySDR read failed: {e}"))),
        };

        self.flat.clear();
        self.flat
            .extend(self.buf[..n].iter().flat_map(|sample| [sample.re, sample.im]));
        if !self.flat.is_empty() {
            sink.deliver(Samples::Cs16(&self.flat));
        }
        Ok(())
    }

    fn close(&mut self) {
        self.drop_stream();
        tracing::info!("SoapySDR device closed");
    }
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{AcqError, AcqResult};
use crate::radio::{DirectSampling, Freq, SampleFormat};

/// Which family of hardware or transport a backend drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    UsbDongle,
    NetworkRelay,
    VendorStreamingApi,
    GenericRadioLibrary,
    FileReplay,
}

/// How samples leave the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delivery {
    /// The acquisition worker repeatedly calls [`TunerBackend::read`].
    Pull,
    /// A driver thread calls into the [`SampleSink`] handed to
    /// [`TunerBackend::start_streaming`].
    Push,
}

/// Static info describing a tuner backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunerInfo {
    pub kind: BackendKind,
    /// Driver or transport name, e.g. "rtlsdr" or "rtltcp".
    pub driver: String,
    /// Human readable device label.
    pub label: String,
    pub format: SampleFormat,
    pub delivery: Delivery,
    /// Live hardware (as opposed to recorded input).
    pub live: bool,
    pub capabilities: TunerCapabilities,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TunerCapabilities {
    /// Backend exposes a gain table and raw snapshots for automatic gain.
    pub auto_gain: bool,
    pub bias_tee: bool,
    pub antenna: bool,
    pub freq_correction: bool,
    pub direct_sampling: bool,
}

/// A borrowed block of raw samples in the backend's native encoding.
#[derive(Debug, Clone, Copy)]
pub enum Samples<'a> {
    Cu8(&'a [u8]),
    Cs16(&'a [i16]),
}

impl Samples<'_> {
    pub fn format(&self) -> SampleFormat {
        match self {
            Samples::Cu8(_) => SampleFormat::Cu8,
            Samples::Cs16(_) => SampleFormat::Cs16,
        }
    }

    /// Number of scalar elements (bytes for cu8, components for cs16).
    pub fn len(&self) -> usize {
        match self {
            Samples::Cu8(data) => data.len(),
            Samples::Cs16(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Destination for samples produced by a backend.
///
/// Pull backends receive it as a borrowed reference for the duration of one
/// [`TunerBackend::read`]; push backends keep a clone until
/// [`TunerBackend::stop_streaming`].
pub trait SampleSink: Send + Sync {
    fn deliver(&self, samples: Samples<'_>);

    /// Cooperative cancellation flag, polled from driver callbacks.
    fn is_cancelled(&self) -> bool;

    /// Called from a driver thread when the device stops producing samples.
    fn device_lost(&self, reason: &str);
}

/// Common operations every tuner backend implements.
///
/// Configuration calls are only issued while the receiver is stopped, so a
/// backend never sees a setter racing its own read loop.
pub trait TunerBackend: Send {
    fn info(&self) -> &TunerInfo;

    fn set_frequency(&mut self, freq: Freq) -> AcqResult<()>;

    /// Frequency actually applied by the hardware, when it can report one.
    fn frequency(&self) -> Option<Freq> {
        None
    }

    /// Apply a manual gain in dB.
    fn set_gain(&mut self, gain_db: f32) -> AcqResult<()>;

    fn gain(&self) -> Option<f32> {
        None
    }

    fn set_bias_tee(&mut self, _on: bool) -> AcqResult<()> {
        Err(AcqError::Unsupported("bias tee"))
    }

    fn set_antenna(&mut self, _name: &str) -> AcqResult<()> {
        Err(AcqError::Unsupported("antenna selection"))
    }

    fn set_freq_correction(&mut self, _ppm: i32) -> AcqResult<()> {
        Err(AcqError::Unsupported("frequency correction"))
    }

    fn set_direct_sampling(&mut self, _mode: DirectSampling) -> AcqResult<()> {
        Err(AcqError::Unsupported("direct sampling"))
    }

    /// Discrete hardware gains in tenths of a dB, ascending.
    fn gain_table(&mut self) -> AcqResult<Vec<i32>> {
        Err(AcqError::GainTableUnavailable)
    }

    /// Throw away samples buffered before the last configuration change.
    fn reset_buffer(&mut self) -> AcqResult<()> {
        Ok(())
    }

    /// Fill `buf` with fresh cu8 samples, returning the number of bytes read.
    fn read_snapshot(&mut self, _buf: &mut [u8]) -> AcqResult<usize> {
        Err(AcqError::Unsupported("raw snapshots"))
    }

    /// Pull backends: block until some samples were delivered to `sink`, the
    /// sink reports cancellation, or the source fails.
    fn read(&mut self, _sink: &dyn SampleSink) -> AcqResult<()> {
        Err(AcqError::Unsupported("pull reads"))
    }

    /// Push backends: start the driver stream feeding `sink`.
    fn start_streaming(&mut self, _sink: Arc<dyn SampleSink>) -> AcqResult<()> {
        Err(AcqError::Unsupported("streaming"))
    }

    /// Push backends: stop the driver stream and drop the sink.
    fn stop_streaming(&mut self) -> AcqResult<()> {
        Ok(())
    }

    /// Release the device. Called once, after the worker has exited.
    fn close(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare {
        info: TunerInfo,
    }

    impl TunerBackend for Bare {
        fn info(&self) -> &TunerInfo {
            &self.info
        }

        fn set_frequency(&mut self, _freq: Freq) -> AcqResult<()> {
            Ok(())
        }

        fn set_gain(&mut self, _gain_db: f32) -> AcqResult<()> {
            Ok(())
        }
    }

    #[test]
    fn defaults_report_unsupported() {
        let mut tuner = Bare {
            info: TunerInfo {
                kind: BackendKind::FileReplay,
                driver: "bare".into(),
                label: "bare".into(),
                format: SampleFormat::Cu8,
                delivery: Delivery::Pull,
                live: false,
                capabilities: TunerCapabilities::default(),
            },
        };
        assert!(matches!(tuner.set_bias_tee(true), Err(AcqError::Unsupported(_))));
        assert!(matches!(tuner.gain_table(), Err(AcqError::GainTableUnavailable)));
        assert!(tuner.reset_buffer().is_ok());
        assert!(tuner.frequency().is_none());
    }

    #[test]
    fn samples_len_and_format() {
        let raw = [0u8; 8];
        let iq = [0i16; 6];
        assert_eq!(Samples::Cu8(&raw).len(), 8);
        assert_eq!(Samples::Cs16(&iq).format(), SampleFormat::Cs16);
        assert!(Samples::Cu8(&[]).is_empty());
    }
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sample rate expected by the pipeline for cu8 input, in Hz.
pub const SAMPLE_RATE_CU8: u32 = 1_488_375;
/// Sample rate expected by the pipeline for cs16 input in FM mode, in Hz.
pub const SAMPLE_RATE_CS16_FM: f64 = 744_187.5;
/// Sample rate expected by the pipeline for cs16 input in AM mode, in Hz.
pub const SAMPLE_RATE_CS16_AM: f64 = 46_511.718_75;

/// Broadcast modulation the pipeline is decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Fm,
    Am,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Fm => f.write_str("FM"),
            Mode::Am => f.write_str("AM"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fm" => Ok(Mode::Fm),
            "am" => Ok(Mode::Am),
            other => Err(format!("unknown mode '{other}'")),
        }
    }
}

/// Wire encoding of raw I/Q samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Unsigned 8-bit, two interleaved I/Q pairs per group.
    #[default]
    Cu8,
    /// Signed 16-bit little endian, one I/Q pair per group.
    Cs16,
}

impl SampleFormat {
    /// Size of one complete sample group in bytes.
    pub const fn group_bytes(self) -> usize {
        match self {
            SampleFormat::Cu8 => 4,
            SampleFormat::Cs16 => 4,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleFormat::Cu8 => f.write_str("cu8"),
            SampleFormat::Cs16 => f.write_str("cs16"),
        }
    }
}

impl FromStr for SampleFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cu8" | "u8" => Ok(SampleFormat::Cu8),
            "cs16" | "s16" | "i16" => Ok(SampleFormat::Cs16),
            other => Err(format!("unknown sample format '{other}'")),
        }
    }
}

/// Whether the receiver picks its gain or uses the one it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GainMode {
    #[default]
    Auto,
    Manual,
}

/// RTL2832 direct sampling input selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectSampling {
    #[default]
    Off,
    /// I branch (ADC I input).
    I,
    /// Q branch (ADC Q input).
    Q,
}

impl DirectSampling {
    /// Numeric value understood by librtlsdr and the rtl_tcp protocol.
    pub const fn as_raw(self) -> u32 {
        match self {
            DirectSampling::Off => 0,
            DirectSampling::I => 1,
            DirectSampling::Q => 2,
        }
    }
}

impl TryFrom<u32> for DirectSampling {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(DirectSampling::Off),
            1 => Ok(DirectSampling::I),
            2 => Ok(DirectSampling::Q),
            other => Err(format!("invalid direct sampling mode {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mode_and_format() {
        assert_eq!("AM".parse::<Mode>(), Ok(Mode::Am));
        assert_eq!(" fm ".parse::<Mode>(), Ok(Mode::Fm));
        assert!("usb".parse::<Mode>().is_err());
        assert_eq!("cs16".parse::<SampleFormat>(), Ok(SampleFormat::Cs16));
        assert!("cf32".parse::<SampleFormat>().is_err());
    }

    #[test]
    fn direct_sampling_raw_values() {
        for raw in 0..3 {
            let mode = DirectSampling::try_from(raw).unwrap();
            assert_eq!(mode.as_raw(), raw);
        }
        assert!(DirectSampling::try_from(3).is_err());
    }
}

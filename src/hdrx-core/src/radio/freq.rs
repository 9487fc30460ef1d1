// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

use serde::{Deserialize, Serialize};

use super::mode::Mode;

/// Broadcast band range in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub low_hz: u64,
    pub high_hz: u64,
    pub mode: Mode,
}

impl Band {
    /// Midpoint frequency of the band in Hz.
    #[must_use]
    pub fn center_hz(&self) -> u64 {
        u64::midpoint(self.low_hz, self.high_hz)
    }
}

pub const FM_BAND: Band = Band {
    low_hz: 87_500_000,
    high_hz: 108_000_000,
    mode: Mode::Fm,
};

pub const AM_BAND: Band = Band {
    low_hz: 520_000,
    high_hz: 1_710_000,
    mode: Mode::Am,
};

/// Frequency wrapper (Hz).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Freq {
    pub hz: u64,
}

impl Freq {
    #[must_use]
    pub fn new(hz: u64) -> Self {
        Self { hz }
    }

    /// Interpret a user supplied value: anything below 10000 is taken as MHz,
    /// larger values as Hz.
    pub fn from_user(value: f64) -> Option<Self> {
        if !value.is_finite() || value <= 0.0 {
            return None;
        }
        let hz = if value < 10_000.0 { value * 1e6 } else { value };
        Some(Self { hz: hz.round() as u64 })
    }

    #[must_use]
    pub fn mhz(&self) -> f64 {
        self.hz as f64 / 1e6
    }

    /// Broadcast band containing this frequency, if any.
    pub fn band(&self) -> Option<Band> {
        band_for_freq(&[FM_BAND, AM_BAND], self).copied()
    }
}

impl Default for Freq {
    fn default() -> Self {
        // bottom of the FM scan range
        Self { hz: 87_900_000 }
    }
}

impl fmt::Display for Freq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hz >= 10_000_000 {
            write!(f, "{:.1} MHz", self.mhz())
        } else {
            write!(f, "{} kHz", self.hz / 1000)
        }
    }
}

/// Find the band that contains the given frequency (inclusive), if any.
pub fn band_for_freq<'a>(bands: &'a [Band], freq: &Freq) -> Option<&'a Band> {
    bands
        .iter()
        .find(|b| freq.hz >= b.low_hz && freq.hz <= b.high_hz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_are_megahertz() {
        assert_eq!(Freq::from_user(90.1), Some(Freq::new(90_100_000)));
        assert_eq!(Freq::from_user(1_070_000.0), Some(Freq::new(1_070_000)));
        assert_eq!(Freq::from_user(-1.0), None);
        assert_eq!(Freq::from_user(f64::NAN), None);
    }

    #[test]
    fn band_lookup() {
        assert_eq!(Freq::new(98_500_000).band().map(|b| b.mode), Some(Mode::Fm));
        assert_eq!(Freq::new(1_070_000).band().map(|b| b.mode), Some(Mode::Am));
        assert!(Freq::new(433_920_000).band().is_none());
        assert_eq!(FM_BAND.center_hz(), 97_750_000);
    }

    #[test]
    fn display_units() {
        assert_eq!(Freq::new(90_100_000).to_string(), "90.1 MHz");
        assert_eq!(Freq::new(1_070_000).to_string(), "1070 kHz");
    }
}

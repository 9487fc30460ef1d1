// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod freq;
pub mod mode;

pub use freq::{band_for_freq, Band, Freq, AM_BAND, FM_BAND};
pub use mode::{
    DirectSampling, GainMode, Mode, SampleFormat, SAMPLE_RATE_CS16_AM, SAMPLE_RATE_CS16_FM,
    SAMPLE_RATE_CU8,
};

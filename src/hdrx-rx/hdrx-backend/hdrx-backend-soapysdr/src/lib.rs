// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Generic radio library backend (SoapySDR).

pub mod gain;

#[cfg(feature = "soapysdr-sys")]
mod device;

pub use gain::{parse_gain_settings, GainSetting};

#[cfg(feature = "soapysdr-sys")]
pub use device::SoapyTuner;

/// Front-end filter bandwidth requested from the device, in Hz.
pub const BANDWIDTH_HZ: f64 = 600e3;

/// Device setting toggling antenna port power on drivers that have one.
pub const BIAS_TEE_SETTING: &str = "biasT_ctrl";

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Discrete gain steps of the tuners behind the rtl and vendor backends.

/// Tuner chip reported in the rtl_tcp greeting (librtlsdr `rtlsdr_tuner`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtlTuner {
    Unknown,
    E4000,
    Fc0012,
    Fc0013,
    Fc2580,
    R820t,
    R828d,
}

impl From<u32> for RtlTuner {
    fn from(value: u32) -> Self {
        match value {
            1 => RtlTuner::E4000,
            2 => RtlTuner::Fc0012,
            3 => RtlTuner::Fc0013,
            4 => RtlTuner::Fc2580,
            5 => RtlTuner::R820t,
            6 => RtlTuner::R828d,
            _ => RtlTuner::Unknown,
        }
    }
}

const E4000_GAINS: &[i32] = &[
    -10, 15, 40, 65, 90, 115, 140, 165, 190, 215, 240, 290, 340, 420,
];
const FC0012_GAINS: &[i32] = &[-99, -40, 71, 179, 192];
const FC0013_GAINS: &[i32] = &[
    -99, -73, -65, -63, -60, -58, -54, 58, 61, 63, 65, 67, 68, 70, 71, 179, 181, 182, 184, 186,
    188, 191, 197,
];
const FC2580_GAINS: &[i32] = &[0];
const R82XX_GAINS: &[i32] = &[
    0, 9, 14, 27, 37, 77, 87, 125, 144, 157, 166, 197, 207, 229, 254, 280, 297, 328, 338, 364,
    372, 386, 402, 421, 434, 439, 445, 480, 496,
];

impl RtlTuner {
    /// Gain steps in tenths of a dB, ascending. Empty for unknown tuners.
    pub fn gains(self) -> &'static [i32] {
        match self {
            RtlTuner::Unknown => &[],
            RtlTuner::E4000 => E4000_GAINS,
            RtlTuner::Fc0012 => FC0012_GAINS,
            RtlTuner::Fc0013 => FC0013_GAINS,
            RtlTuner::Fc2580 => FC2580_GAINS,
            RtlTuner::R820t | RtlTuner::R828d => R82XX_GAINS,
        }
    }
}

/// Gain step closest to `gain_db`, in tenths of a dB.
pub fn nearest_gain(table: &[i32], gain_db: f32) -> Option<i32> {
    let wanted = (gain_db * 10.0).round() as i32;
    table
        .iter()
        .copied()
        .min_by_key(|step| (step - wanted).abs())
}

pub const HACKRF_LNA_MAX_DB: u32 = 40;
pub const HACKRF_LNA_STEP_DB: u32 = 8;
pub const HACKRF_VGA_MAX_DB: u32 = 62;
pub const HACKRF_VGA_STEP_DB: u32 = 2;

/// Split a total gain into HackRF LNA and VGA settings.
///
/// The LNA takes as much as it can in 8 dB steps, the VGA the remainder in
/// 2 dB steps. Values above the combined range saturate.
pub fn split_hackrf_gain(gain_db: f32) -> (u32, u32) {
    let total = gain_db.max(0.0).round() as u32;
    let lna = (total / HACKRF_LNA_STEP_DB * HACKRF_LNA_STEP_DB).min(HACKRF_LNA_MAX_DB);
    let vga = ((total - lna) / HACKRF_VGA_STEP_DB * HACKRF_VGA_STEP_DB).min(HACKRF_VGA_MAX_DB);
    (lna, vga)
}

/// HackRF gain steps (LNA + VGA sums) in tenths of a dB, ascending.
pub fn hackrf_gain_table() -> Vec<i32> {
    let max = HACKRF_LNA_MAX_DB + HACKRF_VGA_MAX_DB;
    (0..=max)
        .step_by(HACKRF_VGA_STEP_DB as usize)
        .map(|db| db as i32 * 10)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tuner_tables_are_ascending() {
        for raw in 0..=7 {
            let table = RtlTuner::from(raw).gains();
            assert!(table.windows(2).all(|w| w[0] < w[1]), "tuner {raw}");
        }
        assert!(RtlTuner::from(0).gains().is_empty());
        assert_eq!(RtlTuner::from(5).gains().len(), 29);
        assert_eq!(RtlTuner::from(6), RtlTuner::R828d);
    }

    #[test]
    fn nearest_gain_picks_closest_step() {
        assert_eq!(nearest_gain(R82XX_GAINS, 20.0), Some(197));
        assert_eq!(nearest_gain(R82XX_GAINS, 100.0), Some(496));
        assert_eq!(nearest_gain(R82XX_GAINS, -5.0), Some(0));
        assert_eq!(nearest_gain(&[], 10.0), None);
    }

    #[test]
    fn hackrf_split_fills_lna_first() {
        assert_eq!(split_hackrf_gain(0.0), (0, 0));
        assert_eq!(split_hackrf_gain(7.0), (0, 6));
        assert_eq!(split_hackrf_gain(30.0), (24, 6));
        assert_eq!(split_hackrf_gain(52.0), (40, 12));
        assert_eq!(split_hackrf_gain(200.0), (40, 62));
        assert_eq!(split_hackrf_gain(-3.0), (0, 0));
    }

    #[test]
    fn hackrf_table_spans_both_stages() {
        let table = hackrf_gain_table();
        assert_eq!(table.first(), Some(&0));
        assert_eq!(table.last(), Some(&1020));
        for step in &table {
            let (lna, vga) = split_hackrf_gain(*step as f32 / 10.0);
            assert_eq!((lna + vga) as i32 * 10, *step);
        }
    }
}

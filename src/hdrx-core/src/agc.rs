// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Automatic gain selection.
//!
//! Binary search over the tuner's gain table for the highest gain whose raw
//! cu8 amplitude stays below the clipping threshold.

use tracing::{debug, info};

use crate::error::{AcqError, AcqResult};
use crate::event::Reporter;
use crate::tuner::TunerBackend;

/// Bytes of raw cu8 captured per trial.
pub const SNAPSHOT_LEN: usize = 128 * 1024;

/// Peak-to-peak amplitude above which a gain is considered clipping.
pub const CLIP_THRESHOLD_DB: f32 = -6.0;

/// Outcome of one auto gain run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgcOutcome {
    /// Position of the chosen gain in the table.
    pub index: usize,
    pub gain_db: f32,
    pub amplitude_db: f32,
    /// Number of gains tried.
    pub trials: usize,
}

/// Peak-to-peak amplitude in dBFS, ignoring the first quarter of `snapshot`.
///
/// The head of a capture right after a gain change still carries samples taken
/// at the previous setting.
pub fn amplitude_db(snapshot: &[u8]) -> Option<f32> {
    let tail = &snapshot[snapshot.len() / 4..];
    let max = *tail.iter().max()?;
    let min = *tail.iter().min()?;
    let span = f32::from(max - min) + 1.0;
    Some(20.0 * (span / 256.0).log10())
}

fn tenths_to_db(tenths: i32) -> f32 {
    tenths as f32 / 10.0
}

/// Pick and apply a gain on `backend`, reporting every trial.
///
/// A gain the tuner refuses narrows the search towards lower gains without
/// becoming a candidate. Gain table or read failures abort the run.
pub fn run(backend: &mut dyn TunerBackend, reporter: &Reporter) -> AcqResult<AgcOutcome> {
    let table = backend.gain_table()?;
    if table.is_empty() {
        return Err(AcqError::GainTableUnavailable);
    }

    let mut snapshot = vec![0u8; SNAPSHOT_LEN];
    let mut low: isize = 0;
    let mut high: isize = table.len() as isize - 1;
    let mut best: Option<(usize, f32)> = None;
    let mut trials = 0;

    while low <= high {
        let mid = (low + high) / 2;
        let index = mid as usize;
        let gain_db = tenths_to_db(table[index]);
        trials += 1;

        if let Err(e) = backend.set_gain(gain_db) {
            debug!("agc: gain {:.1} dB refused: {}", gain_db, e);
            high = mid - 1;
            continue;
        }
        backend.reset_buffer()?;

        let len = backend.read_snapshot(&mut snapshot)?;
        let amplitude = amplitude_db(&snapshot[..len])
            .ok_or_else(|| AcqError::Read("empty gain snapshot".into()))?;
        debug!("agc: gain {:.1} dB -> {:.1} dBFS", gain_db, amplitude);
        reporter.report_agc(gain_db, amplitude, false);

        if amplitude < CLIP_THRESHOLD_DB {
            best = Some((index, amplitude));
            low = mid + 1;
        } else {
            high = mid - 1;
        }

        if high == -1 {
            best = Some((index, amplitude));
        }
    }

    let (index, amplitude_db) = best.unwrap_or((0, 0.0));
    let gain_db = tenths_to_db(table[index]);
    backend.set_gain(gain_db)?;
    reporter.report_agc(gain_db, amplitude_db, true);
    info!(
        "agc selected {:.1} dB ({:.1} dBFS) after {} trials",
        gain_db, amplitude_db, trials
    );

    Ok(AgcOutcome {
        index,
        gain_db,
        amplitude_db,
        trials,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::event::Event;
    use crate::radio::{Freq, SampleFormat};
    use crate::tuner::{BackendKind, Delivery, TunerCapabilities, TunerInfo};
    use std::sync::{Arc, Mutex};

    /// Tuner whose captured amplitude depends only on the applied gain.
    pub(crate) struct ScriptedTuner {
        info: TunerInfo,
        pub table: Vec<i32>,
        /// Highest table index that stays below the threshold.
        pub quiet_up_to: Option<usize>,
        pub refused: Vec<usize>,
        pub applied: Vec<f32>,
        current: Option<usize>,
    }

    impl ScriptedTuner {
        pub(crate) fn new(len: usize, quiet_up_to: Option<usize>) -> Self {
            Self {
                info: TunerInfo {
                    kind: BackendKind::UsbDongle,
                    driver: "scripted".into(),
                    label: "scripted".into(),
                    format: SampleFormat::Cu8,
                    delivery: Delivery::Pull,
                    live: true,
                    capabilities: TunerCapabilities {
                        auto_gain: true,
                        ..Default::default()
                    },
                },
                table: (0..len as i32).map(|i| i * 10).collect(),
                quiet_up_to,
                refused: Vec::new(),
                applied: Vec::new(),
                current: None,
            }
        }
    }

    impl TunerBackend for ScriptedTuner {
        fn info(&self) -> &TunerInfo {
            &self.info
        }

        fn set_frequency(&mut self, _freq: Freq) -> AcqResult<()> {
            Ok(())
        }

        fn set_gain(&mut self, gain_db: f32) -> AcqResult<()> {
            let index = self
                .table
                .iter()
                .position(|t| tenths_to_db(*t) == gain_db)
                .ok_or_else(|| AcqError::rejected("not in table"))?;
            if self.refused.contains(&index) {
                return Err(AcqError::rejected("refused"));
            }
            self.current = Some(index);
            self.applied.push(gain_db);
            Ok(())
        }

        fn gain_table(&mut self) -> AcqResult<Vec<i32>> {
            Ok(self.table.clone())
        }

        fn read_snapshot(&mut self, buf: &mut [u8]) -> AcqResult<usize> {
            let quiet = match (self.current, self.quiet_up_to) {
                (Some(cur), Some(limit)) => cur <= limit,
                _ => false,
            };
            let (lo, hi) = if quiet { (112, 143) } else { (0, 255) };
            for (i, b) in buf.iter_mut().enumerate() {
                *b = if i % 2 == 0 { lo } else { hi };
            }
            // a full-scale spike in the settling quarter must be ignored
            buf[0] = 0;
            buf[1] = 255;
            Ok(buf.len())
        }
    }

    fn recorder(reporter: &Reporter) -> Arc<Mutex<Vec<(f32, bool)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        reporter.set_callback(move |event| {
            if let Event::Agc(info) = event {
                sink.lock().unwrap().push((info.gain_db, info.is_final));
            }
        });
        seen
    }

    #[test]
    fn amplitude_ignores_first_quarter() {
        let mut buf = vec![128u8; 400];
        buf[10] = 255;
        assert!(amplitude_db(&buf).unwrap() < -40.0);
        buf[398] = 0;
        buf[399] = 255;
        assert!(amplitude_db(&buf).unwrap() > -1.0);
        assert!(amplitude_db(&[]).is_none());
    }

    #[test]
    fn converges_on_highest_quiet_gain() {
        let reporter = Reporter::new();
        let seen = recorder(&reporter);
        let mut tuner = ScriptedTuner::new(50, Some(30));

        let outcome = run(&mut tuner, &reporter).unwrap();
        assert_eq!(outcome.index, 30);
        assert_eq!(outcome.gain_db, 30.0);
        assert!(outcome.trials <= 7, "trials = {}", outcome.trials);
        assert_eq!(tuner.applied.last().copied(), Some(30.0));

        let events = seen.lock().unwrap();
        assert_eq!(events.iter().filter(|(_, f)| *f).count(), 1);
        assert_eq!(events.last(), Some(&(30.0, true)));
        assert_eq!(events.len(), outcome.trials + 1);
    }

    fn ceil_log2(n: usize) -> usize {
        (usize::BITS - (n - 1).leading_zeros()) as usize
    }

    #[test]
    fn gain_trials_stay_logarithmic() {
        for n in [1, 2, 3, 29, 50] {
            let first = (n - 1) / 2;
            let limits = [None, Some(0), Some(n / 2), Some(n - 1)];
            for quiet in limits {
                // refusing the first gain must not cost extra trials either
                for refuse_first in [false, true] {
                    if refuse_first && n < 3 {
                        continue;
                    }
                    let reporter = Reporter::new();
                    let seen = recorder(&reporter);
                    let mut tuner = ScriptedTuner::new(n, quiet);
                    if refuse_first {
                        tuner.refused = vec![first];
                    }

                    let outcome = run(&mut tuner, &reporter).unwrap();
                    let case = format!("n={n} quiet={quiet:?} refuse_first={refuse_first}");
                    assert!(
                        outcome.trials <= ceil_log2(n) + 1,
                        "{case}: {} trials",
                        outcome.trials
                    );

                    let expected = match (quiet, refuse_first) {
                        (None, _) => 0,
                        (Some(q), false) => q,
                        (Some(q), true) => q.min(first - 1),
                    };
                    assert_eq!(outcome.index, expected, "{case}");
                    if quiet.is_none() {
                        // lowest gain measured and kept though it clips
                        assert!(outcome.amplitude_db > CLIP_THRESHOLD_DB, "{case}");
                    }
                    assert_eq!(
                        tuner.applied.last().copied(),
                        Some(outcome.gain_db),
                        "{case}"
                    );
                    assert_eq!(
                        seen.lock().unwrap().last(),
                        Some(&(outcome.gain_db, true)),
                        "{case}"
                    );
                }
            }
        }
    }

    #[test]
    fn everything_clipping_falls_back_to_lowest() {
        let reporter = Reporter::new();
        let mut tuner = ScriptedTuner::new(29, None);
        let outcome = run(&mut tuner, &reporter).unwrap();
        assert_eq!(outcome.index, 0);
        assert!(outcome.amplitude_db > CLIP_THRESHOLD_DB);
    }

    #[test]
    fn refused_gain_narrows_downwards() {
        let reporter = Reporter::new();
        let mut tuner = ScriptedTuner::new(16, Some(15));
        // middle gain is refused; search must continue below it
        tuner.refused = vec![7];
        let outcome = run(&mut tuner, &reporter).unwrap();
        assert_eq!(outcome.index, 6);
        assert!(outcome.trials <= 5);
    }

    #[test]
    fn all_refused_still_terminates() {
        let reporter = Reporter::new();
        let mut tuner = ScriptedTuner::new(8, None);
        tuner.refused = (1..8).collect();
        let outcome = run(&mut tuner, &reporter).unwrap();
        assert_eq!(outcome.index, 0);
        assert_eq!(outcome.amplitude_db, 0.0);
    }

    #[test]
    fn missing_gain_table_fails() {
        let reporter = Reporter::new();
        let mut tuner = ScriptedTuner::new(0, None);
        assert!(matches!(
            run(&mut tuner, &reporter),
            Err(AcqError::GainTableUnavailable)
        ));
    }
}

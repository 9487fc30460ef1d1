// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use crate::event::Reporter;
use crate::radio::Mode;
use crate::tuner::Samples;

/// Downstream consumer of normalized sample groups.
///
/// Implementations receive only whole groups and report their findings
/// through the [`Reporter`] they were built with.
pub trait Pipeline: Send {
    /// Drop all demodulator state, e.g. after a retune.
    fn reset(&mut self);

    /// Whole cu8 groups (a multiple of four bytes).
    fn push_cu8(&mut self, groups: &[u8]);

    /// Whole cs16 groups (a multiple of two components).
    fn push_cs16(&mut self, groups: &[i16]);

    fn set_mode(&mut self, mode: Mode);
}

/// Pipeline that forwards every block as an I/Q event.
pub struct IqPassthrough {
    reporter: Reporter,
    mode: Mode,
}

impl IqPassthrough {
    pub fn new(reporter: &Reporter) -> Self {
        Self {
            reporter: reporter.clone(),
            mode: Mode::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }
}

impl Pipeline for IqPassthrough {
    fn reset(&mut self) {
        self.reporter.clear_sig();
    }

    fn push_cu8(&mut self, groups: &[u8]) {
        self.reporter.report_iq(Samples::Cu8(groups));
    }

    fn push_cs16(&mut self, groups: &[i16]) {
        self.reporter.report_iq(Samples::Cs16(groups));
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::sig::tests::sample_services;
    use crate::event::Event;
    use std::sync::{Arc, Mutex};

    #[test]
    fn passthrough_reports_iq_and_clears_table_on_reset() {
        let reporter = Reporter::new();
        let counts = Arc::new(Mutex::new(Vec::new()));
        let sink = counts.clone();
        reporter.set_callback(move |event| {
            if let Event::Iq(samples) = event {
                sink.lock().unwrap().push(samples.len());
            }
        });

        let mut pipeline = IqPassthrough::new(&reporter);
        pipeline.push_cu8(&[0; 8]);
        pipeline.push_cs16(&[0; 4]);
        assert_eq!(*counts.lock().unwrap(), vec![8, 4]);

        reporter.report_sig(sample_services());
        pipeline.reset();
        assert!(reporter.sig_table().is_none());

        pipeline.set_mode(Mode::Am);
        assert_eq!(pipeline.mode(), Mode::Am);
    }
}

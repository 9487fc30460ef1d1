// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::{AcqError, AcqResult};
use crate::normalize::{Cs16Normalizer, Cu8Normalizer};
use crate::pipeline::Pipeline;
use crate::radio::{Mode, SampleFormat};
use crate::tuner::Samples;

struct InputState {
    /// Latched encoding; fixed for the lifetime of the receiver once set.
    format: Option<SampleFormat>,
    cu8: Cu8Normalizer,
    cs16: Cs16Normalizer,
    pipeline: Box<dyn Pipeline>,
}

/// Normalizers and the pipeline they feed.
pub(crate) struct Input {
    inner: Mutex<InputState>,
}

impl Input {
    pub(crate) fn new(pipeline: Box<dyn Pipeline>, format: Option<SampleFormat>) -> Self {
        Self {
            inner: Mutex::new(InputState {
                format,
                cu8: Cu8Normalizer::new(),
                cs16: Cs16Normalizer::new(),
                pipeline,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, InputState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, samples: Samples<'_>) -> AcqResult<()> {
        let mut guard = self.lock();
        let state = &mut *guard;
        match state.format {
            Some(format) if format != samples.format() => {
                return Err(AcqError::rejected(format!(
                    "{} samples pushed into a {} input",
                    samples.format(),
                    format
                )));
            }
            Some(_) => {}
            None => state.format = Some(samples.format()),
        }

        let InputState {
            cu8, cs16, pipeline, ..
        } = state;
        match samples {
            Samples::Cu8(data) => cu8.push(data, |groups| pipeline.push_cu8(groups)),
            Samples::Cs16(data) => cs16.push(data, |groups| pipeline.push_cs16(groups)),
        }
        Ok(())
    }

    /// Drop carries and demodulator state.
    pub(crate) fn reset(&self) {
        let mut state = self.lock();
        state.cu8.clear();
        state.cs16.clear();
        state.pipeline.reset();
    }

    pub(crate) fn set_mode(&self, mode: Mode) {
        self.lock().pipeline.set_mode(mode);
    }

    pub(crate) fn format(&self) -> Option<SampleFormat> {
        self.lock().format
    }
}

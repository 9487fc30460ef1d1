// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Receiver handle: owns one tuner backend, its acquisition worker and the
//! pipeline the samples are fed into.

mod input;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use tracing::{debug, error, info, warn};

use crate::error::{AcqError, AcqResult};
use crate::event::{Event, Reporter};
use crate::pipeline::Pipeline;
use crate::radio::{DirectSampling, Freq, GainMode, Mode, SampleFormat};
use crate::tuner::{Delivery, SampleSink, Samples, TunerBackend, TunerInfo};

use input::Input;

pub(crate) struct State {
    closed: bool,
    stopped: bool,
    worker_stopped: bool,
    /// Bumped every time the worker enters the running state.
    epoch: u64,
    start_error: Option<AcqError>,
    /// Last requested frequency; `None` until the first retune.
    freq: Option<Freq>,
    /// Frequency the hardware reported after the last retune.
    tuned: Freq,
    gain_mode: GainMode,
    gain: Option<f32>,
    mode: Mode,
    bias_tee: bool,
    antenna: Option<String>,
    ppm: i32,
    direct_sampling: DirectSampling,
}

impl State {
    fn new() -> Self {
        Self {
            closed: false,
            stopped: true,
            worker_stopped: true,
            epoch: 0,
            start_error: None,
            freq: None,
            tuned: Freq::default(),
            gain_mode: GainMode::Auto,
            gain: None,
            mode: Mode::default(),
            bias_tee: false,
            antenna: None,
            ppm: 0,
            direct_sampling: DirectSampling::Off,
        }
    }

    fn wants_auto_gain(&self, info: &TunerInfo) -> bool {
        self.gain_mode == GainMode::Auto
            && self.gain.is_none()
            && info.live
            && info.capabilities.auto_gain
    }
}

pub(crate) struct Shared {
    state: Mutex<State>,
    cond: Condvar,
    cancel: AtomicBool,
    backend: Mutex<Option<Box<dyn TunerBackend>>>,
    input: Input,
    reporter: Reporter,
    info: Option<TunerInfo>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_backend(&self) -> MutexGuard<'_, Option<Box<dyn TunerBackend>>> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
        self.cond
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold the state lock once the worker has fully stopped, so no read is
    /// in flight while the backend is reconfigured.
    fn configurable<'a>(
        &self,
        mut state: MutexGuard<'a, State>,
        what: &str,
    ) -> AcqResult<MutexGuard<'a, State>> {
        loop {
            if state.closed {
                return Err(AcqError::rejected("receiver is closed"));
            }
            if !state.stopped {
                return Err(AcqError::rejected(format!("cannot {what} while running")));
            }
            if state.worker_stopped {
                return Ok(state);
            }
            state = self.wait(state);
        }
    }

    fn delivery(&self) -> Option<Delivery> {
        self.info.as_ref().map(|info| info.delivery)
    }

    /// Stop after a source failure, reporting it once.
    fn mark_lost(&self, reason: &str) {
        let mut state = self.lock_state();
        if state.stopped {
            debug!("ignoring tuner failure while stopping: {}", reason);
            return;
        }
        state.stopped = true;
        self.cancel.store(true, Ordering::Release);
        self.cond.notify_all();
        drop(state);

        warn!("lost tuner: {}", reason);
        self.reporter.report_lost_device();
    }
}

impl SampleSink for Shared {
    fn deliver(&self, samples: Samples<'_>) {
        if let Err(e) = self.input.push(samples) {
            debug!("dropping samples: {}", e);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn device_lost(&self, reason: &str) {
        self.mark_lost(reason);
    }
}

/// Handle to one receiver.
///
/// Configuration setters only succeed while stopped (setting a value equal to
/// the current one always succeeds). Dropping the handle stops and closes it.
pub struct Receiver {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Receiver {
    /// Open a receiver driven by `backend`.
    ///
    /// `pipeline` is built with the receiver's reporter so that it can emit
    /// events through the same callback.
    pub fn open<F>(backend: Box<dyn TunerBackend>, pipeline: F) -> AcqResult<Self>
    where
        F: FnOnce(&Reporter) -> Box<dyn Pipeline>,
    {
        let info = backend.info().clone();
        let reporter = Reporter::new();
        let pipeline = pipeline(&reporter);
        let shared = Arc::new(Shared {
            state: Mutex::new(State::new()),
            cond: Condvar::new(),
            cancel: AtomicBool::new(true),
            backend: Mutex::new(Some(backend)),
            input: Input::new(pipeline, Some(info.format)),
            reporter,
            info: Some(info),
        });
        let worker = worker::spawn(shared.clone())?;

        if let Some(info) = shared.info.as_ref() {
            info!(
                "opened {} tuner '{}' ({}, {:?} delivery)",
                info.driver, info.label, info.format, info.delivery
            );
        }
        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Open a receiver fed by the application through `push_samples_*`.
    pub fn open_pipe<F>(pipeline: F) -> Self
    where
        F: FnOnce(&Reporter) -> Box<dyn Pipeline>,
    {
        let reporter = Reporter::new();
        let pipeline = pipeline(&reporter);
        let shared = Arc::new(Shared {
            state: Mutex::new(State::new()),
            cond: Condvar::new(),
            cancel: AtomicBool::new(true),
            backend: Mutex::new(None),
            input: Input::new(pipeline, None),
            reporter,
            info: None,
        });
        debug!("opened application pipe");
        Self {
            shared,
            worker: None,
        }
    }

    /// Backend description; `None` for the application pipe.
    pub fn info(&self) -> Option<&TunerInfo> {
        self.shared.info.as_ref()
    }

    pub fn reporter(&self) -> &Reporter {
        &self.shared.reporter
    }

    /// Register the event callback, replacing any previous one.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&Event<'_>) + Send + Sync + 'static,
    {
        self.shared.reporter.set_callback(callback);
    }

    pub fn clear_callback(&self) {
        self.shared.reporter.clear_callback();
    }

    /// Start acquisition, blocking until the worker is running.
    ///
    /// Auto gain runs inside this call when enabled and no gain has been
    /// selected since the last retune; its failure is returned here.
    pub fn start(&self) -> AcqResult<()> {
        let mut state = self.shared.lock_state();
        if state.closed {
            return Err(AcqError::rejected("receiver is closed"));
        }
        if self.worker.is_none() {
            state.stopped = false;
            state.worker_stopped = false;
            return Ok(());
        }
        while state.stopped != state.worker_stopped {
            state = self.shared.wait(state);
        }
        if !state.stopped {
            return Ok(());
        }

        let epoch = state.epoch;
        state.start_error = None;
        state.stopped = false;
        self.shared.cancel.store(false, Ordering::Release);
        self.shared.cond.notify_all();

        loop {
            if state.epoch != epoch {
                info!("receiver started at {}", state.tuned);
                return Ok(());
            }
            if state.stopped && state.worker_stopped {
                return Err(state
                    .start_error
                    .take()
                    .unwrap_or_else(|| AcqError::rejected("stopped while starting")));
            }
            state = self.shared.wait(state);
        }
    }

    /// Stop acquisition, blocking until the worker has stopped.
    pub fn stop(&self) -> AcqResult<()> {
        let mut state = self.shared.lock_state();
        if state.closed {
            return Err(AcqError::rejected("receiver is closed"));
        }
        if self.worker.is_none() {
            state.stopped = true;
            state.worker_stopped = true;
            return Ok(());
        }

        let was_running = !state.stopped;
        state.stopped = true;
        self.shared.cancel.store(true, Ordering::Release);
        self.shared.cond.notify_all();
        while !state.worker_stopped {
            state = self.shared.wait(state);
        }
        if was_running {
            info!("receiver stopped");
        }
        Ok(())
    }

    /// Shut the worker down and release the backend. Only legal while stopped.
    pub fn close(&mut self) -> AcqResult<()> {
        {
            let mut state = self.shared.lock_state();
            if state.closed {
                return Ok(());
            }
            if !state.stopped {
                return Err(AcqError::rejected("cannot close while running"));
            }
            while !state.worker_stopped {
                state = self.shared.wait(state);
            }
            state.closed = true;
            self.shared.cond.notify_all();
        }

        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                error!("acquisition worker panicked");
            }
        }
        if let Some(mut backend) = self.shared.lock_backend().take() {
            backend.close();
            info!("closed {} tuner", backend.info().driver);
        }
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.shared.lock_state().stopped
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock_state().closed
    }

    /// Retune. Resets the pipeline and, with automatic gain, forgets the
    /// selected gain so the next start measures again.
    ///
    /// The pipeline is reset after the state lock is released: a push holds
    /// the input lock while its callback may read the state.
    pub fn set_frequency(&self, freq: Freq) -> AcqResult<()> {
        let state = self.shared.lock_state();
        if state.freq == Some(freq) {
            return Ok(());
        }
        let mut state = self.shared.configurable(state, "retune")?;

        let tuned = match self.shared.lock_backend().as_mut() {
            Some(backend) => {
                backend
                    .set_frequency(freq)
                    .map_err(AcqError::into_rejected)?;
                backend.frequency().unwrap_or(freq)
            }
            None => freq,
        };

        if state.gain_mode == GainMode::Auto {
            state.gain = None;
        }
        state.freq = Some(freq);
        state.tuned = tuned;
        drop(state);

        self.shared.input.reset();
        debug!("tuned to {}", tuned);
        Ok(())
    }

    pub fn frequency(&self) -> Freq {
        self.shared.lock_state().tuned
    }

    /// Apply a manual gain in dB until the next retune (with automatic gain
    /// enabled) or the next gain change.
    pub fn set_gain(&self, gain_db: f32) -> AcqResult<()> {
        let state = self.shared.lock_state();
        if state.gain == Some(gain_db) {
            return Ok(());
        }
        if !gain_db.is_finite() {
            return Err(AcqError::rejected(format!("invalid gain {gain_db}")));
        }
        let mut state = self.shared.configurable(state, "change gain")?;

        if let Some(backend) = self.shared.lock_backend().as_mut() {
            backend.set_gain(gain_db).map_err(AcqError::into_rejected)?;
        }
        state.gain = Some(gain_db);
        debug!("gain set to {:.1} dB", gain_db);
        Ok(())
    }

    /// Selected gain in dB, `None` until one is set or measured.
    pub fn gain(&self) -> Option<f32> {
        self.shared.lock_state().gain
    }

    pub fn gain_mode(&self) -> GainMode {
        self.shared.lock_state().gain_mode
    }

    /// Enable or disable automatic gain. Either way the current gain is
    /// forgotten.
    pub fn set_auto_gain(&self, enabled: bool) {
        let mut state = self.shared.lock_state();
        state.gain_mode = if enabled {
            GainMode::Auto
        } else {
            GainMode::Manual
        };
        state.gain = None;
    }

    pub fn set_bias_tee(&self, on: bool) -> AcqResult<()> {
        let state = self.shared.lock_state();
        if state.bias_tee == on {
            return Ok(());
        }
        let mut state = self.shared.configurable(state, "switch bias tee")?;
        if let Some(backend) = self.shared.lock_backend().as_mut() {
            backend.set_bias_tee(on).map_err(AcqError::into_rejected)?;
        }
        state.bias_tee = on;
        debug!("bias tee {}", if on { "on" } else { "off" });
        Ok(())
    }

    pub fn set_antenna(&self, name: &str) -> AcqResult<()> {
        let state = self.shared.lock_state();
        if state.antenna.as_deref() == Some(name) {
            return Ok(());
        }
        let mut state = self.shared.configurable(state, "switch antenna")?;
        if let Some(backend) = self.shared.lock_backend().as_mut() {
            backend.set_antenna(name).map_err(AcqError::into_rejected)?;
        }
        state.antenna = Some(name.to_string());
        debug!("antenna {}", name);
        Ok(())
    }

    pub fn set_freq_correction(&self, ppm: i32) -> AcqResult<()> {
        let state = self.shared.lock_state();
        if state.ppm == ppm {
            return Ok(());
        }
        let mut state = self.shared.configurable(state, "change frequency correction")?;
        if let Some(backend) = self.shared.lock_backend().as_mut() {
            backend
                .set_freq_correction(ppm)
                .map_err(AcqError::into_rejected)?;
        }
        state.ppm = ppm;
        debug!("frequency correction {} ppm", ppm);
        Ok(())
    }

    pub fn set_direct_sampling(&self, mode: DirectSampling) -> AcqResult<()> {
        let state = self.shared.lock_state();
        if state.direct_sampling == mode {
            return Ok(());
        }
        let mut state = self.shared.configurable(state, "change direct sampling")?;
        if let Some(backend) = self.shared.lock_backend().as_mut() {
            backend
                .set_direct_sampling(mode)
                .map_err(AcqError::into_rejected)?;
        }
        state.direct_sampling = mode;
        debug!("direct sampling {:?}", mode);
        Ok(())
    }

    /// Switch the pipeline between FM and AM. Allowed while running.
    pub fn set_mode(&self, mode: Mode) -> AcqResult<()> {
        let mut state = self.shared.lock_state();
        if state.closed {
            return Err(AcqError::rejected("receiver is closed"));
        }
        if state.mode == mode {
            return Ok(());
        }
        state.mode = mode;
        drop(state);

        self.shared.input.set_mode(mode);
        debug!("mode {}", mode);
        Ok(())
    }

    pub fn mode(&self) -> Mode {
        self.shared.lock_state().mode
    }

    /// Encoding the pipeline is fed with; `None` for a pipe nothing was
    /// pushed into yet.
    pub fn sample_format(&self) -> Option<SampleFormat> {
        self.shared.input.format()
    }

    /// Feed unsigned 8-bit I/Q of any length.
    pub fn push_samples_cu8(&self, samples: &[u8]) -> AcqResult<()> {
        self.push(Samples::Cu8(samples))
    }

    /// Feed signed 16-bit I/Q components of any length.
    pub fn push_samples_cs16(&self, samples: &[i16]) -> AcqResult<()> {
        self.push(Samples::Cs16(samples))
    }

    fn push(&self, samples: Samples<'_>) -> AcqResult<()> {
        if self.shared.lock_state().closed {
            return Err(AcqError::rejected("receiver is closed"));
        }
        self.shared.input.push(samples)
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.stop() {
            warn!("failed to stop receiver on drop: {}", e);
        }
        if let Err(e) = self.close() {
            warn!("failed to close receiver on drop: {}", e);
        }
    }
}

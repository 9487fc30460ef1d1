// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Acquisition worker: one thread per receiver converging on the requested
//! run state.
//!
//! The controller only flips `stopped` and waits; all device work (buffer
//! reset, auto gain, stream start/stop, blocking reads) happens here with the
//! state lock released.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};

use super::Shared;
use crate::agc;
use crate::error::AcqResult;
use crate::tuner::{Delivery, SampleSink};

pub(super) fn spawn(shared: Arc<Shared>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("hdrx-worker".into())
        .spawn(move || run(&shared))
}

fn run(shared: &Arc<Shared>) {
    let push = shared.delivery() == Some(Delivery::Push);
    let mut state = shared.lock_state();

    while !state.closed {
        if state.stopped && !state.worker_stopped {
            drop(state);
            if push {
                stop_streaming(shared);
            }
            state = shared.lock_state();
            state.worker_stopped = true;
            shared.cond.notify_all();
            continue;
        }

        if !state.stopped && state.worker_stopped {
            let auto_gain = shared
                .info
                .as_ref()
                .is_some_and(|info| state.wants_auto_gain(info));
            drop(state);
            let result = start(shared, auto_gain, push);
            state = shared.lock_state();
            match result {
                Ok(selected) => {
                    if let Some(gain_db) = selected {
                        state.gain = Some(gain_db);
                    }
                    state.worker_stopped = false;
                    state.epoch += 1;
                }
                Err(e) => {
                    error!("failed to start tuner: {}", e);
                    state.stopped = true;
                    shared.cancel.store(true, Ordering::Release);
                    state.start_error = Some(e);
                }
            }
            shared.cond.notify_all();
            continue;
        }

        if state.stopped || push {
            state = shared.wait(state);
            continue;
        }

        drop(state);
        if let Err(e) = read_chunk(shared) {
            shared.mark_lost(&e.to_string());
        }
        state = shared.lock_state();
    }

    drop(state);
    debug!("acquisition worker exiting");
}

fn start(shared: &Arc<Shared>, auto_gain: bool, push: bool) -> AcqResult<Option<f32>> {
    let mut guard = shared.lock_backend();
    let Some(backend) = guard.as_mut() else {
        return Ok(None);
    };

    if let Err(e) = backend.reset_buffer() {
        warn!("failed to reset tuner buffer: {}", e);
    }

    let selected = if auto_gain {
        Some(agc::run(&mut **backend, &shared.reporter)?.gain_db)
    } else {
        None
    };

    if push {
        let sink: Arc<dyn SampleSink> = shared.clone();
        backend.start_streaming(sink)?;
    }
    Ok(selected)
}

fn stop_streaming(shared: &Shared) {
    if let Some(backend) = shared.lock_backend().as_mut() {
        if let Err(e) = backend.stop_streaming() {
            warn!("failed to stop tuner stream: {}", e);
        }
    }
}

fn read_chunk(shared: &Shared) -> AcqResult<()> {
    match shared.lock_backend().as_mut() {
        Some(backend) => backend.read(shared),
        None => Ok(()),
    }
}

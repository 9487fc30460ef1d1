// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! HackRF backend over the libhackrf C API.
//!
//! The driver pushes cs8 transfers from its own thread; they are widened,
//! decimated to the cs16 FM rate and handed straight to the sample sink.

use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use hdrx_core::error::{AcqError, AcqResult};
use hdrx_core::radio::SAMPLE_RATE_CS16_FM;
use hdrx_core::{
    BackendKind, Delivery, Freq, SampleFormat, SampleSink, Samples, TunerBackend,
    TunerCapabilities, TunerInfo,
};

use crate::cs8::Cs8Decimator;
use crate::gains::{hackrf_gain_table, split_hackrf_gain};

const HACKRF_SUCCESS: c_int = 0;
const HACKRF_TRUE: c_int = 1;
const DECIMATION: u32 = 4;
const DEFAULT_GAIN_DB: f32 = 30.0;
const WATCHDOG_PERIOD: Duration = Duration::from_millis(500);

#[repr(C)]
#[allow(dead_code)]
struct HackrfTransfer {
    device: *mut c_void,
    buffer: *mut u8,
    buffer_length: c_int,
    valid_length: c_int,
    rx_ctx: *mut c_void,
    tx_ctx: *mut c_void,
}

type HackrfDevice = c_void;

extern "C" {
    fn hackrf_init() -> c_int;
    fn hackrf_open(device: *mut *mut HackrfDevice) -> c_int;
    fn hackrf_open_by_serial(serial: *const c_char, device: *mut *mut HackrfDevice) -> c_int;
    fn hackrf_close(device: *mut HackrfDevice) -> c_int;
    fn hackrf_set_sample_rate(device: *mut HackrfDevice, freq_hz: f64) -> c_int;
    fn hackrf_set_freq(device: *mut HackrfDevice, freq_hz: u64) -> c_int;
    fn hackrf_set_lna_gain(device: *mut HackrfDevice, value: u32) -> c_int;
    fn hackrf_set_vga_gain(device: *mut HackrfDevice, value: u32) -> c_int;
    fn hackrf_set_antenna_enable(device: *mut HackrfDevice, value: u8) -> c_int;
    fn hackrf_start_rx(
        device: *mut HackrfDevice,
        callback: unsafe extern "C" fn(*mut HackrfTransfer) -> c_int,
        rx_ctx: *mut c_void,
    ) -> c_int;
    fn hackrf_stop_rx(device: *mut HackrfDevice) -> c_int;
    fn hackrf_is_streaming(device: *mut HackrfDevice) -> c_int;
}

static LIBRARY: OnceLock<c_int> = OnceLock::new();

/// Initialize libhackrf once per process.
fn ensure_library() -> AcqResult<()> {
    // SAFETY: hackrf_init has no preconditions; OnceLock runs it once.
    let code = *LIBRARY.get_or_init(|| unsafe { hackrf_init() });
    if code != HACKRF_SUCCESS {
        return Err(AcqError::Open(format!("hackrf_init failed: {code}")));
    }
    Ok(())
}

fn check(what: &str, code: c_int) -> AcqResult<()> {
    if code == HACKRF_SUCCESS {
        Ok(())
    } else {
        Err(AcqError::rejected(format!("{what} failed: {code}")))
    }
}

/// State owned by the driver callback while streaming.
struct StreamContext {
    sink: Arc<dyn SampleSink>,
    decimator: Cs8Decimator,
    scratch: Vec<i16>,
}

unsafe extern "C" fn rx_callback(transfer: *mut HackrfTransfer) -> c_int {
    let transfer = &*transfer;
    let ctx = &mut *(transfer.rx_ctx as *mut StreamContext);
    if ctx.sink.is_cancelled() {
        // Non-zero asks libhackrf to stop calling back.
        return -1;
    }
    let valid = transfer.valid_length.max(0) as usize;
    let raw = std::slice::from_raw_parts(transfer.buffer, valid);
    ctx.scratch.clear();
    ctx.decimator.process(raw, &mut ctx.scratch);
    if !ctx.scratch.is_empty() {
        ctx.sink.deliver(Samples::Cs16(&ctx.scratch));
    }
    0
}

struct DevicePtr(*mut HackrfDevice);

// Only used for hackrf_is_streaming, which reads device state.
unsafe impl Send for DevicePtr {}

struct Stream {
    ctx: *mut StreamContext,
    running: Arc<AtomicBool>,
    watchdog: Option<JoinHandle<()>>,
}

pub struct HackrfTuner {
    info: TunerInfo,
    dev: *mut HackrfDevice,
    stream: Option<Stream>,
    freq: Option<Freq>,
    gain: f32,
}

// The device handle has a single owner; the receiver serializes every call.
unsafe impl Send for HackrfTuner {}

impl HackrfTuner {
    pub fn open(serial: Option<&str>) -> AcqResult<Self> {
        ensure_library()?;

        let mut dev: *mut HackrfDevice = ptr::null_mut();
        // SAFETY: `dev` is a valid out pointer.
        let r = unsafe {
            match serial {
                Some(serial) => {
                    let serial = CString::new(serial)
                        .map_err(|e| AcqError::Open(format!("bad serial: {e}")))?;
                    hackrf_open_by_serial(serial.as_ptr(), &mut dev)
                }
                None => hackrf_open(&mut dev),
            }
        };
        if r != HACKRF_SUCCESS || dev.is_null() {
            return Err(AcqError::Open(format!("hackrf_open failed: {r}")));
        }
        info!("HackRF opened (serial={:?})", serial);

        let mut tuner = Self {
            info: TunerInfo {
                kind: BackendKind::VendorStreamingApi,
                driver: "hackrf".into(),
                label: serial.map_or_else(|| "hackrf".to_string(), |s| format!("hackrf-{s}")),
                format: SampleFormat::Cs16,
                delivery: Delivery::Push,
                live: true,
                capabilities: TunerCapabilities {
                    auto_gain: false,
                    bias_tee: true,
                    antenna: true,
                    freq_correction: false,
                    direct_sampling: false,
                },
            },
            dev,
            stream: None,
            freq: None,
            gain: DEFAULT_GAIN_DB,
        };

        let rate = SAMPLE_RATE_CS16_FM * f64::from(DECIMATION);
        // SAFETY: `dev` was just opened; dropping `tuner` closes it on error.
        check("hackrf_set_sample_rate", unsafe {
            hackrf_set_sample_rate(tuner.dev, rate)
        })
        .map_err(|e| AcqError::Open(e.to_string()))?;
        tuner
            .set_gain(DEFAULT_GAIN_DB)
            .map_err(|e| AcqError::Open(e.to_string()))?;
        Ok(tuner)
    }

    fn halt_stream(&mut self) {
        let Some(mut stream) = self.stream.take() else {
            return;
        };
        stream.running.store(false, Ordering::Release);
        if let Some(watchdog) = stream.watchdog.take() {
            if watchdog.join().is_err() {
                warn!("HackRF watchdog panicked");
            }
        }
        // SAFETY: after hackrf_stop_rx returns the driver no longer touches
        // the context, so it can be freed.
        unsafe {
            let r = hackrf_stop_rx(self.dev);
            if r != HACKRF_SUCCESS {
                warn!("hackrf_stop_rx failed: {}", r);
            }
            drop(Box::from_raw(stream.ctx));
        }
        info!("HackRF streaming stopped");
    }
}

impl TunerBackend for HackrfTuner {
    fn info(&self) -> &TunerInfo {
        &self.info
    }

    fn set_frequency(&mut self, freq: Freq) -> AcqResult<()> {
        // SAFETY: `self.dev` is open until `close`.
        check("hackrf_set_freq", unsafe { hackrf_set_freq(self.dev, freq.hz) })?;
        self.freq = Some(freq);
        Ok(())
    }

    fn frequency(&self) -> Option<Freq> {
        self.freq
    }

    fn set_gain(&mut self, gain_db: f32) -> AcqResult<()> {
        let (lna, vga) = split_hackrf_gain(gain_db);
        // SAFETY: `self.dev` is open until `close`.
        unsafe {
            check("hackrf_set_lna_gain", hackrf_set_lna_gain(self.dev, lna))?;
            check("hackrf_set_vga_gain", hackrf_set_vga_gain(self.dev, vga))?;
        }
        debug!("HackRF gain {:.0} dB (LNA {} dB, VGA {} dB)", gain_db, lna, vga);
        self.gain = (lna + vga) as f32;
        Ok(())
    }

    fn gain(&self) -> Option<f32> {
        Some(self.gain)
    }

    /// Antenna port power.
    fn set_bias_tee(&mut self, on: bool) -> AcqResult<()> {
        // SAFETY: `self.dev` is open until `close`.
        check("hackrf_set_antenna_enable", unsafe {
            hackrf_set_antenna_enable(self.dev, u8::from(on))
        })
    }

    fn set_antenna(&mut self, name: &str) -> AcqResult<()> {
        if name.eq_ignore_ascii_case("default") {
            Ok(())
        } else {
            Err(AcqError::rejected(format!("unknown HackRF antenna '{name}'")))
        }
    }

    fn gain_table(&mut self) -> AcqResult<Vec<i32>> {
        Ok(hackrf_gain_table())
    }

    fn start_streaming(&mut self, sink: Arc<dyn SampleSink>) -> AcqResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let ctx = Box::into_raw(Box::new(StreamContext {
            sink: Arc::clone(&sink),
            decimator: Cs8Decimator::new(DECIMATION),
            scratch: Vec::with_capacity(64 * 1024),
        }));
        // SAFETY: `ctx` stays allocated until `halt_stream` frees it after
        // hackrf_stop_rx.
        let r = unsafe { hackrf_start_rx(self.dev, rx_callback, ctx.cast()) };
        if r != HACKRF_SUCCESS {
            // SAFETY: the driver never saw `ctx`.
            unsafe { drop(Box::from_raw(ctx)) };
            return Err(AcqError::Read(format!("hackrf_start_rx failed: {r}")));
        }

        let running = Arc::new(AtomicBool::new(true));
        self.stream = Some(Stream {
            ctx,
            running: Arc::clone(&running),
            watchdog: None,
        });
        let spawned = {
            let running = Arc::clone(&running);
            let dev = DevicePtr(self.dev);
            thread::Builder::new()
                .name("hdrx-hackrf-watchdog".into())
                .spawn(move || {
                    let dev = dev;
                    while running.load(Ordering::Acquire) {
                        thread::sleep(WATCHDOG_PERIOD);
                        if !running.load(Ordering::Acquire) || sink.is_cancelled() {
                            break;
                        }
                        // SAFETY: the device outlives the watchdog, which is
                        // joined before the handle is stopped or closed.
                        if unsafe { hackrf_is_streaming(dev.0) } != HACKRF_TRUE {
                            error!("HackRF stopped streaming");
                            sink.device_lost("HackRF stopped streaming");
                            break;
                        }
                    }
                })
        };
        match spawned {
            Ok(watchdog) => {
                if let Some(stream) = self.stream.as_mut() {
                    stream.watchdog = Some(watchdog);
                }
            }
            Err(e) => {
                self.halt_stream();
                return Err(AcqError::Io(e));
            }
        }
        info!(
            "HackRF streaming started ({:.0} S/s, decimation {})",
            SAMPLE_RATE_CS16_FM * f64::from(DECIMATION),
            DECIMATION
        );
        Ok(())
    }

    fn stop_streaming(&mut self) -> AcqResult<()> {
        self.halt_stream();
        Ok(())
    }

    fn close(&mut self) {
        if self.dev.is_null() {
            return;
        }
        self.halt_stream();
        // SAFETY: streaming has stopped and nothing else holds the handle.
        let r = unsafe { hackrf_close(self.dev) };
        if r != HACKRF_SUCCESS {
            warn!("hackrf_close failed: {}", r);
        }
        self.dev = ptr::null_mut();
        info!("HackRF closed");
    }
}

impl Drop for HackrfTuner {
    fn drop(&mut self) {
        self.close();
    }
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! RTL2832 USB dongle backend over the librtlsdr C API.

use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;

use tracing::{debug, info, warn};

use hdrx_core::error::{AcqError, AcqResult};
use hdrx_core::radio::SAMPLE_RATE_CU8;
use hdrx_core::{
    BackendKind, Delivery, DirectSampling, Freq, SampleFormat, SampleSink, Samples,
    TunerBackend, TunerCapabilities, TunerInfo,
};

/// librtlsdr's "not supported / unchanged" result.
const RTLSDR_UNCHANGED: c_int = -2;
const ASYNC_BUFFERS: u32 = 120;
const ASYNC_BUFFER_LEN: u32 = 32 * 1024;

type RtlsdrDev = c_void;
type ReadAsyncCb = unsafe extern "C" fn(buf: *mut u8, len: u32, ctx: *mut c_void);

extern "C" {
    fn rtlsdr_get_device_count() -> u32;
    fn rtlsdr_get_device_name(index: u32) -> *const c_char;
    fn rtlsdr_open(dev: *mut *mut RtlsdrDev, index: u32) -> c_int;
    fn rtlsdr_close(dev: *mut RtlsdrDev) -> c_int;
    fn rtlsdr_set_sample_rate(dev: *mut RtlsdrDev, rate: u32) -> c_int;
    fn rtlsdr_set_center_freq(dev: *mut RtlsdrDev, freq: u32) -> c_int;
    fn rtlsdr_get_center_freq(dev: *mut RtlsdrDev) -> u32;
    fn rtlsdr_set_tuner_gain_mode(dev: *mut RtlsdrDev, manual: c_int) -> c_int;
    fn rtlsdr_set_tuner_gain(dev: *mut RtlsdrDev, gain: c_int) -> c_int;
    fn rtlsdr_get_tuner_gain(dev: *mut RtlsdrDev) -> c_int;
    fn rtlsdr_get_tuner_gains(dev: *mut RtlsdrDev, gains: *mut c_int) -> c_int;
    fn rtlsdr_set_freq_correction(dev: *mut RtlsdrDev, ppm: c_int) -> c_int;
    fn rtlsdr_set_direct_sampling(dev: *mut RtlsdrDev, on: c_int) -> c_int;
    fn rtlsdr_set_offset_tuning(dev: *mut RtlsdrDev, on: c_int) -> c_int;
    fn rtlsdr_set_bias_tee(dev: *mut RtlsdrDev, on: c_int) -> c_int;
    fn rtlsdr_reset_buffer(dev: *mut RtlsdrDev) -> c_int;
    fn rtlsdr_read_sync(
        dev: *mut RtlsdrDev,
        buf: *mut c_void,
        len: c_int,
        n_read: *mut c_int,
    ) -> c_int;
    fn rtlsdr_read_async(
        dev: *mut RtlsdrDev,
        cb: ReadAsyncCb,
        ctx: *mut c_void,
        buf_num: u32,
        buf_len: u32,
    ) -> c_int;
    fn rtlsdr_cancel_async(dev: *mut RtlsdrDev) -> c_int;
}

/// Names of the attached dongles, by index.
pub fn list_devices() -> Vec<String> {
    // SAFETY: plain queries with no device handle involved.
    unsafe {
        (0..rtlsdr_get_device_count())
            .map(|i| {
                let name = rtlsdr_get_device_name(i);
                if name.is_null() {
                    String::new()
                } else {
                    CStr::from_ptr(name).to_string_lossy().into_owned()
                }
            })
            .collect()
    }
}

fn check(what: &str, code: c_int) -> AcqResult<()> {
    if code == 0 {
        Ok(())
    } else {
        Err(AcqError::rejected(format!("{what} failed: {code}")))
    }
}

/// Per-read context handed to the driver callback.
struct ReadContext<'a> {
    dev: *mut RtlsdrDev,
    sink: &'a dyn SampleSink,
    cancelled: bool,
}

unsafe extern "C" fn read_cb(buf: *mut u8, len: u32, ctx: *mut c_void) {
    let ctx = &mut *(ctx as *mut ReadContext<'_>);
    if ctx.cancelled {
        return;
    }
    if ctx.sink.is_cancelled() {
        ctx.cancelled = true;
        rtlsdr_cancel_async(ctx.dev);
        return;
    }
    if !buf.is_null() && len > 0 {
        let data = std::slice::from_raw_parts(buf, len as usize);
        ctx.sink.deliver(Samples::Cu8(data));
    }
}

pub struct RtlSdrTuner {
    info: TunerInfo,
    dev: *mut RtlsdrDev,
}

// The device handle has a single owner; the receiver serializes every call.
unsafe impl Send for RtlSdrTuner {}

impl RtlSdrTuner {
    pub fn open(index: u32) -> AcqResult<Self> {
        let label = list_devices()
            .get(index as usize)
            .cloned()
            .ok_or_else(|| AcqError::Open(format!("no rtl-sdr device at index {index}")))?;

        let mut dev: *mut RtlsdrDev = ptr::null_mut();
        // SAFETY: `dev` is a valid out pointer; the handle is closed on every
        // error path below and in `close`.
        unsafe {
            let r = rtlsdr_open(&mut dev, index);
            if r != 0 || dev.is_null() {
                return Err(AcqError::Open(format!("rtlsdr_open failed: {r}")));
            }
            info!("rtl-sdr opened: #{} {}", index, label);

            let r = rtlsdr_set_sample_rate(dev, SAMPLE_RATE_CU8);
            if r != 0 {
                rtlsdr_close(dev);
                return Err(AcqError::Open(format!("rtlsdr_set_sample_rate failed: {r}")));
            }
            let r = rtlsdr_set_tuner_gain_mode(dev, 1);
            if r != 0 {
                rtlsdr_close(dev);
                return Err(AcqError::Open(format!(
                    "rtlsdr_set_tuner_gain_mode failed: {r}"
                )));
            }
            let r = rtlsdr_set_offset_tuning(dev, 1);
            if r != 0 && r != RTLSDR_UNCHANGED {
                rtlsdr_close(dev);
                return Err(AcqError::Open(format!("rtlsdr_set_offset_tuning failed: {r}")));
            }
        }

        Ok(Self {
            info: TunerInfo {
                kind: BackendKind::UsbDongle,
                driver: "rtlsdr".into(),
                label,
                format: SampleFormat::Cu8,
                delivery: Delivery::Pull,
                live: true,
                capabilities: TunerCapabilities {
                    auto_gain: true,
                    bias_tee: true,
                    antenna: false,
                    freq_correction: true,
                    direct_sampling: true,
                },
            },
            dev,
        })
    }
}

impl TunerBackend for RtlSdrTuner {
    fn info(&self) -> &TunerInfo {
        &self.info
    }

    fn set_frequency(&mut self, freq: Freq) -> AcqResult<()> {
        let hz = u32::try_from(freq.hz)
            .map_err(|_| AcqError::rejected(format!("{freq} is out of the dongle's range")))?;
        // SAFETY: `self.dev` is open until `close`.
        check("rtlsdr_set_center_freq", unsafe {
            rtlsdr_set_center_freq(self.dev, hz)
        })
    }

    fn frequency(&self) -> Option<Freq> {
        // SAFETY: `self.dev` is open until `close`.
        match unsafe { rtlsdr_get_center_freq(self.dev) } {
            0 => None,
            hz => Some(Freq::new(u64::from(hz))),
        }
    }

    fn set_gain(&mut self, gain_db: f32) -> AcqResult<()> {
        let tenths = (gain_db * 10.0).round() as c_int;
        // SAFETY: `self.dev` is open until `close`.
        check("rtlsdr_set_tuner_gain", unsafe {
            rtlsdr_set_tuner_gain(self.dev, tenths)
        })
    }

    fn gain(&self) -> Option<f32> {
        // SAFETY: `self.dev` is open until `close`.
        let tenths = unsafe { rtlsdr_get_tuner_gain(self.dev) };
        Some(tenths as f32 / 10.0)
    }

    fn set_bias_tee(&mut self, on: bool) -> AcqResult<()> {
        // SAFETY: `self.dev` is open until `close`.
        check("rtlsdr_set_bias_tee", unsafe {
            rtlsdr_set_bias_tee(self.dev, c_int::from(on))
        })
    }

    fn set_freq_correction(&mut self, ppm: i32) -> AcqResult<()> {
        // SAFETY: `self.dev` is open until `close`.
        let r = unsafe { rtlsdr_set_freq_correction(self.dev, ppm) };
        if r == RTLSDR_UNCHANGED {
            return Ok(());
        }
        check("rtlsdr_set_freq_correction", r)
    }

    fn set_direct_sampling(&mut self, mode: DirectSampling) -> AcqResult<()> {
        // SAFETY: `self.dev` is open until `close`.
        check("rtlsdr_set_direct_sampling", unsafe {
            rtlsdr_set_direct_sampling(self.dev, mode.as_raw() as c_int)
        })
    }

    fn gain_table(&mut self) -> AcqResult<Vec<i32>> {
        // SAFETY: a null list asks for the count only; the second call writes
        // at most `count` entries.
        unsafe {
            let count = rtlsdr_get_tuner_gains(self.dev, ptr::null_mut());
            if count <= 0 {
                return Err(AcqError::GainTableUnavailable);
            }
            let mut gains = vec![0 as c_int; count as usize];
            let filled = rtlsdr_get_tuner_gains(self.dev, gains.as_mut_ptr());
            if filled <= 0 {
                return Err(AcqError::GainTableUnavailable);
            }
            gains.truncate(filled as usize);
            Ok(gains)
        }
    }

    fn reset_buffer(&mut self) -> AcqResult<()> {
        // SAFETY: `self.dev` is open until `close`.
        let r = unsafe { rtlsdr_reset_buffer(self.dev) };
        if r != 0 {
            return Err(AcqError::Read(format!("rtlsdr_reset_buffer failed: {r}")));
        }
        Ok(())
    }

    fn read_snapshot(&mut self, buf: &mut [u8]) -> AcqResult<usize> {
        let len = c_int::try_from(buf.len())
            .map_err(|_| AcqError::rejected("snapshot buffer too large"))?;
        let mut n_read: c_int = 0;
        // SAFETY: `buf` is valid for `len` bytes for the whole call.
        let r = unsafe {
            rtlsdr_read_sync(self.dev, buf.as_mut_ptr().cast(), len, &mut n_read)
        };
        if r != 0 {
            return Err(AcqError::Read(format!("rtlsdr_read_sync failed: {r}")));
        }
        if n_read != len {
            return Err(AcqError::Read(format!("short read: {n_read} of {len} bytes")));
        }
        Ok(n_read as usize)
    }

    /// Blocks inside the driver's async loop until the sink cancels.
    fn read(&mut self, sink: &dyn SampleSink) -> AcqResult<()> {
        let mut ctx = ReadContext {
            dev: self.dev,
            sink,
            cancelled: false,
        };
        debug!("rtl-sdr async read starting");
        // SAFETY: `ctx` outlives the call, which only returns once the driver
        // stopped invoking the callback.
        let r = unsafe {
            rtlsdr_read_async(
                self.dev,
                read_cb,
                (&mut ctx as *mut ReadContext<'_>).cast(),
                ASYNC_BUFFERS,
                ASYNC_BUFFER_LEN,
            )
        };
        if r != 0 {
            return Err(AcqError::Read(format!("rtlsdr_read_async failed: {r}")));
        }
        if !ctx.cancelled {
            return Err(AcqError::Read("rtl-sdr stream ended".into()));
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.dev.is_null() {
            return;
        }
        // SAFETY: the worker has exited, nothing else uses the handle.
        let r = unsafe { rtlsdr_close(self.dev) };
        if r != 0 {
            warn!("rtlsdr_close failed: {}", r);
        }
        self.dev = ptr::null_mut();
        info!("rtl-sdr closed");
    }
}

impl Drop for RtlSdrTuner {
    fn drop(&mut self) {
        self.close();
    }
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! SDRplay RSP backend over the vendor API 3.x.
//!
//! Settings are written into the parameter block the API hands out and take
//! effect when the stream is initialized. The API calls back with split I and
//! Q blocks already decimated to the cs16 FM rate.

use std::ffi::CStr;
use std::os::raw::{c_int, c_short, c_uint, c_void};
use std::ptr;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use hdrx_core::error::{AcqError, AcqResult};
use hdrx_core::radio::SAMPLE_RATE_CS16_FM;
use hdrx_core::{
    BackendKind, Delivery, Freq, SampleFormat, SampleSink, Samples, TunerBackend,
    TunerCapabilities, TunerInfo,
};

use super::ffi;
use super::{
    duo_tuner_for, interleave, Antenna, BiasTee, DeviceSelector, DuoTuner, DxPort, Rsp2Port,
    RspGain, RspModel, AGC_SET_POINT_DBFS,
};

const DECIMATION: u8 = 4;
const MIN_FREQ_HZ: u64 = 1_000;
const MAX_FREQ_HZ: u64 = 2_000_000_000;

fn check(what: &str, code: ffi::ErrT) -> AcqResult<()> {
    if code == ffi::SUCCESS {
        Ok(())
    } else {
        Err(AcqError::Open(format!("{what} failed: {code}")))
    }
}

fn serial_of(device: &ffi::DeviceT) -> String {
    // SAFETY: the API NUL-terminates SerNo within its fixed buffer.
    unsafe { CStr::from_ptr(device.SerNo.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

fn tuner_code(tuner: DuoTuner) -> c_int {
    match tuner {
        DuoTuner::A => ffi::TUNER_A,
        DuoTuner::B => ffi::TUNER_B,
    }
}

/// State shared with the API callbacks while streaming.
struct StreamContext {
    sink: Arc<dyn SampleSink>,
    scratch: Mutex<Vec<i16>>,
    dev: ffi::Handle,
    tuner: c_int,
}

unsafe extern "C" fn stream_callback(
    xi: *mut c_short,
    xq: *mut c_short,
    _params: *mut c_void,
    num_samples: c_uint,
    _reset: c_uint,
    ctx: *mut c_void,
) {
    let ctx = &*(ctx as *const StreamContext);
    if ctx.sink.is_cancelled() || xi.is_null() || xq.is_null() {
        return;
    }
    let n = num_samples as usize;
    let xi = std::slice::from_raw_parts(xi, n);
    let xq = std::slice::from_raw_parts(xq, n);
    let mut scratch = ctx.scratch.lock().unwrap_or_else(PoisonError::into_inner);
    interleave(xi, xq, &mut scratch);
    ctx.sink.deliver(Samples::Cs16(&scratch));
}

unsafe extern "C" fn event_callback(
    event_id: c_int,
    _tuner: c_int,
    params: *mut c_void,
    ctx: *mut c_void,
) {
    let ctx = &*(ctx as *const StreamContext);
    match event_id {
        ffi::EVENT_POWER_OVERLOAD_CHANGE => {
            if let Some(params) = params.cast::<ffi::PowerOverloadParamsT>().as_ref() {
                match params.powerOverloadChangeType {
                    ffi::OVERLOAD_DETECTED => {
                        warn!("RSP overload detected, increase gain reduction")
                    }
                    ffi::OVERLOAD_CORRECTED => warn!("RSP overload corrected"),
                    other => debug!("RSP overload event {}", other),
                }
            }
            let r = ffi::sdrplay_api_Update(
                ctx.dev,
                ctx.tuner,
                ffi::UPDATE_CTRL_OVERLOAD_MSG_ACK,
                ffi::UPDATE_EXT1_NONE,
            );
            if r != ffi::SUCCESS {
                warn!("RSP overload acknowledge failed: {}", r);
            }
        }
        ffi::EVENT_DEVICE_REMOVED => ctx.sink.device_lost("RSP removed"),
        ffi::EVENT_DEVICE_FAILURE => ctx.sink.device_lost("RSP device failure"),
        other => debug!("RSP event {}", other),
    }
}

pub struct SdrplayTuner {
    info: TunerInfo,
    model: RspModel,
    /// Boxed: the API keeps pointers into the selected device entry.
    device: Box<ffi::DeviceT>,
    params: *mut ffi::DeviceParamsT,
    stream: Option<*mut StreamContext>,
    freq: Option<Freq>,
    gain: Option<RspGain>,
    bias_tee: bool,
    open: bool,
}

// The API handles have a single owner; the receiver serializes every call.
unsafe impl Send for SdrplayTuner {}

impl SdrplayTuner {
    /// Open an RSP by index (a single digit) or serial number.
    pub fn open(serial: Option<&str>) -> AcqResult<Self> {
        let selector = DeviceSelector::parse(serial)?;
        // SAFETY: plain library calls; every exit below undoes what was done.
        check("sdrplay_api_Open", unsafe { ffi::sdrplay_api_Open() })?;
        unsafe { ffi::sdrplay_api_LockDeviceApi() };

        let selected = Self::select(&selector);
        unsafe { ffi::sdrplay_api_UnlockDeviceApi() };
        let device = match selected {
            Ok(device) => device,
            Err(e) => {
                unsafe { ffi::sdrplay_api_Close() };
                return Err(e);
            }
        };

        let serial = serial_of(&device);
        let model = RspModel::from_hw_ver(device.hwVer).unwrap_or(RspModel::Rsp1);
        info!("{} opened (serial {})", model.name(), serial);

        let mut tuner = Self {
            info: TunerInfo {
                kind: BackendKind::VendorStreamingApi,
                driver: "sdrplay".into(),
                label: format!("{}-{}", model.name(), serial),
                format: SampleFormat::Cs16,
                delivery: Delivery::Push,
                live: true,
                capabilities: TunerCapabilities {
                    auto_gain: false,
                    bias_tee: model.bias_tee().is_some(),
                    antenna: model.has_antenna_choice(),
                    freq_correction: true,
                    direct_sampling: false,
                },
            },
            model,
            device,
            params: ptr::null_mut(),
            stream: None,
            freq: None,
            gain: None,
            bias_tee: false,
            open: true,
        };
        // dropping `tuner` releases the device on error
        tuner.load_params()?;
        Ok(tuner)
    }

    /// Enumerate and select a device. Called with the API lock held.
    fn select(selector: &DeviceSelector) -> AcqResult<Box<ffi::DeviceT>> {
        // SAFETY: DeviceT is plain data; all-zero is a valid empty entry.
        let mut devices: [ffi::DeviceT; ffi::MAX_DEVICES] = unsafe { std::mem::zeroed() };
        let mut count: c_uint = 0;
        check("sdrplay_api_GetDevices", unsafe {
            ffi::sdrplay_api_GetDevices(devices.as_mut_ptr(), &mut count, ffi::MAX_DEVICES as c_uint)
        })?;
        let found = &devices[..(count as usize).min(ffi::MAX_DEVICES)];
        let serials: Vec<(bool, String)> = found
            .iter()
            .map(|d| (d.valid != 0, serial_of(d)))
            .collect();
        let index = selector
            .find(serials.iter().map(|(valid, s)| (*valid, s.as_str())))
            .ok_or_else(|| AcqError::Open(format!("RSP not found ({} present)", found.len())))?;

        let mut device = Box::new(found[index]);
        if RspModel::from_hw_ver(device.hwVer) == Some(RspModel::RspDuo) {
            if device.rspDuoMode & ffi::RSPDUO_MODE_SINGLE_TUNER == 0 {
                return Err(AcqError::Open("RSPduo not in single tuner mode".into()));
            }
            device.rspDuoMode = ffi::RSPDUO_MODE_SINGLE_TUNER;
            device.tuner = tuner_code(duo_tuner_for(None));
        }
        check("sdrplay_api_SelectDevice", unsafe {
            ffi::sdrplay_api_SelectDevice(&mut *device)
        })?;
        Ok(device)
    }

    /// Fetch the parameter block and apply the receive defaults.
    fn load_params(&mut self) -> AcqResult<()> {
        let mut params = ptr::null_mut();
        check("sdrplay_api_GetDeviceParams", unsafe {
            ffi::sdrplay_api_GetDeviceParams(self.device.dev, &mut params)
        })?;
        if params.is_null() {
            return Err(AcqError::Open("RSP returned no parameters".into()));
        }
        self.params = params;

        if let Some(dev) = self.dev_params() {
            dev.fsFreq.fsHz = SAMPLE_RATE_CS16_FM * f64::from(DECIMATION);
        }
        let channel = self
            .channel()
            .ok_or_else(|| AcqError::Open("RSP channel parameters missing".into()))?;
        channel.ctrlParams.decimation.enable = 1;
        channel.ctrlParams.decimation.decimationFactor = DECIMATION;
        // HD Radio needs about 400 kHz
        channel.tunerParams.bwType = ffi::BW_0_600;
        Ok(())
    }

    fn dev_params(&mut self) -> Option<&mut ffi::DevParamsT> {
        // SAFETY: the API owns these blocks until the device is released.
        unsafe { self.params.as_mut()?.devParams.as_mut() }
    }

    fn channel(&mut self) -> Option<&mut ffi::RxChannelParamsT> {
        let tuner = self.device.tuner;
        // SAFETY: as in `dev_params`.
        unsafe {
            let params = self.params.as_mut()?;
            if tuner == ffi::TUNER_B {
                params.rxChannelB.as_mut()
            } else {
                params.rxChannelA.as_mut()
            }
        }
    }

    fn channel_or_reject(&mut self) -> AcqResult<&mut ffi::RxChannelParamsT> {
        self.channel()
            .ok_or_else(|| AcqError::rejected("RSP channel parameters missing"))
    }

    /// Move an RSPduo to the other tuner; settings are carried over.
    fn switch_duo_tuner(&mut self, tuner: DuoTuner) -> AcqResult<()> {
        let code = tuner_code(tuner);
        if self.device.tuner == code {
            return Ok(());
        }
        // SAFETY: streaming is stopped while the receiver reconfigures.
        let r = unsafe {
            ffi::sdrplay_api_LockDeviceApi();
            ffi::sdrplay_api_ReleaseDevice(&mut *self.device);
            self.device.tuner = code;
            self.device.rspDuoMode = ffi::RSPDUO_MODE_SINGLE_TUNER;
            let r = ffi::sdrplay_api_SelectDevice(&mut *self.device);
            ffi::sdrplay_api_UnlockDeviceApi();
            r
        };
        if r != ffi::SUCCESS {
            // the device is gone, only the API remains open
            self.params = ptr::null_mut();
            self.open = false;
            unsafe { ffi::sdrplay_api_Close() };
            return Err(AcqError::rejected(format!(
                "RSPduo tuner {tuner:?} unavailable: {r}"
            )));
        }
        self.load_params().map_err(|e| AcqError::rejected(e.to_string()))?;
        info!("RSPduo switched to tuner {:?}", tuner);

        if let Some(freq) = self.freq {
            self.set_frequency(freq)?;
        }
        if let Some(gain) = self.gain {
            self.apply_gain(gain)?;
        }
        if self.bias_tee {
            self.set_bias_tee(true)?;
        }
        Ok(())
    }

    fn apply_gain(&mut self, gain: RspGain) -> AcqResult<()> {
        let channel = self.channel_or_reject()?;
        channel.tunerParams.gain.LNAstate = gain.lna_state;
        match gain.if_gr {
            None => {
                channel.ctrlParams.agc.setPoint_dBfs = AGC_SET_POINT_DBFS;
                channel.ctrlParams.agc.enable = ffi::AGC_50HZ;
            }
            Some(if_gr) => {
                channel.ctrlParams.agc.enable = ffi::AGC_DISABLE;
                channel.tunerParams.gain.gRdB = c_int::from(if_gr);
            }
        }
        self.gain = Some(gain);
        Ok(())
    }

    fn halt_stream(&mut self) {
        let Some(ctx) = self.stream.take() else {
            return;
        };
        // SAFETY: after Uninit returns the API makes no further callbacks, so
        // the context can be freed.
        unsafe {
            let r = ffi::sdrplay_api_Uninit(self.device.dev);
            if r != ffi::SUCCESS {
                warn!("sdrplay_api_Uninit failed: {}", r);
            }
            drop(Box::from_raw(ctx));
        }
        info!("{} streaming stopped", self.model.name());
    }
}

impl TunerBackend for SdrplayTuner {
    fn info(&self) -> &TunerInfo {
        &self.info
    }

    fn set_frequency(&mut self, freq: Freq) -> AcqResult<()> {
        if !(MIN_FREQ_HZ..=MAX_FREQ_HZ).contains(&freq.hz) {
            return Err(AcqError::rejected(format!("{freq} outside the RSP range")));
        }
        self.channel_or_reject()?.tunerParams.rfFreq.rfHz = freq.hz as f64;
        self.freq = Some(freq);
        Ok(())
    }

    fn frequency(&self) -> Option<Freq> {
        self.freq
    }

    /// `gain` is `LNAstate.IFgr`, see [`RspGain`].
    fn set_gain(&mut self, gain: f32) -> AcqResult<()> {
        let decoded = RspGain::decode(gain)?;
        self.apply_gain(decoded)?;
        debug!(
            "RSP LNA state {}, IF {}",
            decoded.lna_state,
            decoded
                .if_gr
                .map_or_else(|| "AGC".to_string(), |gr| format!("{gr} dB reduction"))
        );
        Ok(())
    }

    fn gain(&self) -> Option<f32> {
        self.gain.map(RspGain::encode)
    }

    fn set_bias_tee(&mut self, on: bool) -> AcqResult<()> {
        let flag = u8::from(on);
        match self.model.bias_tee() {
            None => return Err(AcqError::Unsupported("bias tee")),
            Some(BiasTee::Rsp1aTuner) => self.channel_or_reject()?.rsp1aTunerParams.biasTEnable = flag,
            Some(BiasTee::Rsp2Tuner) => self.channel_or_reject()?.rsp2TunerParams.biasTEnable = flag,
            Some(BiasTee::RspDuoTuner) => {
                self.channel_or_reject()?.rspDuoTunerParams.biasTEnable = flag
            }
            Some(BiasTee::RspDxDevice) => {
                self.dev_params()
                    .ok_or_else(|| AcqError::rejected("RSP device parameters missing"))?
                    .rspDxParams
                    .biasTEnable = flag
            }
        }
        self.bias_tee = on;
        Ok(())
    }

    fn set_antenna(&mut self, name: &str) -> AcqResult<()> {
        match self.model.antenna(name)? {
            Antenna::Rsp2(port) => {
                let params = &mut self.channel_or_reject()?.rsp2TunerParams;
                match port {
                    Rsp2Port::A => {
                        params.antennaSel = ffi::RSP2_ANTENNA_A;
                        params.amPortSel = ffi::RSP2_AMPORT_2;
                    }
                    Rsp2Port::B => {
                        params.antennaSel = ffi::RSP2_ANTENNA_B;
                        params.amPortSel = ffi::RSP2_AMPORT_2;
                    }
                    Rsp2Port::HiZ => params.amPortSel = ffi::RSP2_AMPORT_1,
                }
            }
            Antenna::Duo { tuner, hi_z } => {
                self.switch_duo_tuner(tuner)?;
                self.channel_or_reject()?.rspDuoTunerParams.tuner1AmPortSel = if hi_z {
                    ffi::RSPDUO_AMPORT_1
                } else {
                    ffi::RSPDUO_AMPORT_2
                };
            }
            Antenna::Dx(port) => {
                let dev = self
                    .dev_params()
                    .ok_or_else(|| AcqError::rejected("RSP device parameters missing"))?;
                dev.rspDxParams.antennaSel = match port {
                    DxPort::A => ffi::RSPDX_ANTENNA_A,
                    DxPort::B => ffi::RSPDX_ANTENNA_B,
                    DxPort::C => ffi::RSPDX_ANTENNA_C,
                };
            }
        }
        info!("{} antenna {}", self.model.name(), name);
        Ok(())
    }

    fn set_freq_correction(&mut self, ppm: i32) -> AcqResult<()> {
        self.dev_params()
            .ok_or_else(|| AcqError::rejected("RSP device parameters missing"))?
            .ppm = f64::from(ppm);
        Ok(())
    }

    fn start_streaming(&mut self, sink: Arc<dyn SampleSink>) -> AcqResult<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let ctx = Box::into_raw(Box::new(StreamContext {
            sink,
            scratch: Mutex::new(Vec::with_capacity(64 * 1024)),
            dev: self.device.dev,
            tuner: self.device.tuner,
        }));
        let mut callbacks = ffi::CallbackFnsT {
            StreamACbFn: Some(stream_callback),
            StreamBCbFn: None,
            EventCbFn: Some(event_callback),
        };
        // SAFETY: `ctx` stays allocated until `halt_stream` frees it after
        // sdrplay_api_Uninit.
        let r = unsafe { ffi::sdrplay_api_Init(self.device.dev, &mut callbacks, ctx.cast()) };
        if r != ffi::SUCCESS {
            // SAFETY: the API never kept `ctx`.
            unsafe { drop(Box::from_raw(ctx)) };
            return Err(AcqError::Read(format!("sdrplay_api_Init failed: {r}")));
        }
        self.stream = Some(ctx);
        info!(
            "{} streaming started ({:.0} S/s, decimation {})",
            self.model.name(),
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
        if !self.open {
            return;
        }
        self.halt_stream();
        // SAFETY: streaming has stopped and nothing else holds the device.
        unsafe {
            ffi::sdrplay_api_LockDeviceApi();
            ffi::sdrplay_api_ReleaseDevice(&mut *self.device);
            ffi::sdrplay_api_UnlockDeviceApi();
            ffi::sdrplay_api_Close();
        }
        self.params = ptr::null_mut();
        self.open = false;
        info!("{} closed", self.model.name());
    }
}

impl Drop for SdrplayTuner {
    fn drop(&mut self) {
        self.close();
    }
}

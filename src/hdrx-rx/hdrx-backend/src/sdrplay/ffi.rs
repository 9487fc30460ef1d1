// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Declarations for the subset of the SDRplay API 3.x used here.

#![allow(non_snake_case, dead_code)]

use std::os::raw::{c_char, c_int, c_short, c_uint, c_ushort, c_void};

pub type Handle = *mut c_void;
pub type ErrT = c_int;

pub const SUCCESS: ErrT = 0;
pub const MAX_DEVICES: usize = 16;
pub const MAX_SER_NO_LEN: usize = 64;

pub const TUNER_A: c_int = 1;
pub const TUNER_B: c_int = 2;

pub const RSPDUO_MODE_SINGLE_TUNER: c_int = 1;

pub const BW_0_600: c_int = 600;

pub const AGC_DISABLE: c_int = 0;
pub const AGC_50HZ: c_int = 2;

pub const RSP2_ANTENNA_A: c_int = 5;
pub const RSP2_ANTENNA_B: c_int = 6;
pub const RSP2_AMPORT_1: c_int = 1;
pub const RSP2_AMPORT_2: c_int = 0;

pub const RSPDUO_AMPORT_1: c_int = 1;
pub const RSPDUO_AMPORT_2: c_int = 0;

pub const RSPDX_ANTENNA_A: c_int = 0;
pub const RSPDX_ANTENNA_B: c_int = 1;
pub const RSPDX_ANTENNA_C: c_int = 2;

pub const EVENT_GAIN_CHANGE: c_int = 0;
pub const EVENT_POWER_OVERLOAD_CHANGE: c_int = 1;
pub const EVENT_DEVICE_REMOVED: c_int = 2;
pub const EVENT_RSPDUO_MODE_CHANGE: c_int = 3;
pub const EVENT_DEVICE_FAILURE: c_int = 4;

pub const OVERLOAD_DETECTED: c_int = 0;
pub const OVERLOAD_CORRECTED: c_int = 1;

pub const UPDATE_CTRL_OVERLOAD_MSG_ACK: c_int = 0x0004_0000;
pub const UPDATE_EXT1_NONE: c_int = 0;

#[repr(C)]
#[derive(Clone, Copy)]
pub struct DeviceT {
    pub SerNo: [c_char; MAX_SER_NO_LEN],
    pub hwVer: u8,
    pub tuner: c_int,
    pub rspDuoMode: c_int,
    pub valid: u8,
    pub rspDuoSampleFreq: f64,
    pub dev: Handle,
}

#[repr(C)]
pub struct FsFreqT {
    pub fsHz: f64,
    pub syncUpdate: u8,
    pub reCal: u8,
}

#[repr(C)]
pub struct SyncUpdateT {
    pub sampleNum: c_uint,
    pub period: c_uint,
}

#[repr(C)]
pub struct ResetFlagsT {
    pub resetGainUpdate: u8,
    pub resetRfUpdate: u8,
    pub resetFsUpdate: u8,
}

#[repr(C)]
pub struct Rsp1aParamsT {
    pub rfNotchEnable: u8,
    pub rfDabNotchEnable: u8,
}

#[repr(C)]
pub struct Rsp2ParamsT {
    pub extRefOutputEn: u8,
}

#[repr(C)]
pub struct RspDuoParamsT {
    pub extRefOutputEn: c_int,
}

#[repr(C)]
pub struct RspDxParamsT {
    pub hdrEnable: u8,
    pub biasTEnable: u8,
    pub antennaSel: c_int,
    pub rfNotchEnable: u8,
    pub rfDabNotchEnable: u8,
}

#[repr(C)]
pub struct DevParamsT {
    pub ppm: f64,
    pub fsFreq: FsFreqT,
    pub syncUpdate: SyncUpdateT,
    pub resetFlags: ResetFlagsT,
    pub mode: c_int,
    pub samplesPerPkt: c_uint,
    pub rsp1aParams: Rsp1aParamsT,
    pub rsp2Params: Rsp2ParamsT,
    pub rspDuoParams: RspDuoParamsT,
    pub rspDxParams: RspDxParamsT,
}

#[repr(C)]
pub struct GainValuesT {
    pub curr: f32,
    pub max: f32,
    pub min: f32,
}

#[repr(C)]
pub struct GainT {
    pub gRdB: c_int,
    pub LNAstate: u8,
    pub syncUpdate: u8,
    pub minGr: c_int,
    pub gainVals: GainValuesT,
}

#[repr(C)]
pub struct RfFreqT {
    pub rfHz: f64,
    pub syncUpdate: u8,
}

#[repr(C)]
pub struct DcOffsetTunerT {
    pub dcCal: u8,
    pub speedUp: u8,
    pub trackTime: c_int,
    pub refreshRateTime: c_int,
}

#[repr(C)]
pub struct TunerParamsT {
    pub bwType: c_int,
    pub ifType: c_int,
    pub loMode: c_int,
    pub gain: GainT,
    pub rfFreq: RfFreqT,
    pub dcOffsetTuner: DcOffsetTunerT,
}

#[repr(C)]
pub struct DcOffsetT {
    pub DCenable: u8,
    pub IQenable: u8,
}

#[repr(C)]
pub struct DecimationT {
    pub enable: u8,
    pub decimationFactor: u8,
    pub wideBandSignal: u8,
}

#[repr(C)]
pub struct AgcT {
    pub enable: c_int,
    pub setPoint_dBfs: c_int,
    pub attack_ms: c_ushort,
    pub decay_ms: c_ushort,
    pub decay_delay_ms: c_ushort,
    pub decay_threshold_dB: c_ushort,
    pub syncUpdate: c_int,
}

#[repr(C)]
pub struct ControlParamsT {
    pub dcOffset: DcOffsetT,
    pub decimation: DecimationT,
    pub agc: AgcT,
    pub adsbMode: c_int,
}

#[repr(C)]
pub struct Rsp1aTunerParamsT {
    pub biasTEnable: u8,
}

#[repr(C)]
pub struct Rsp2TunerParamsT {
    pub biasTEnable: u8,
    pub amPortSel: c_int,
    pub antennaSel: c_int,
    pub rfNotchEnable: u8,
}

#[repr(C)]
pub struct RspDuoTunerParamsT {
    pub biasTEnable: u8,
    pub tuner1AmPortSel: c_int,
    pub tuner1AmNotchEnable: u8,
    pub rfNotchEnable: u8,
    pub rfDabNotchEnable: u8,
}

#[repr(C)]
pub struct RspDxTunerParamsT {
    pub hdrBw: c_int,
}

#[repr(C)]
pub struct RxChannelParamsT {
    pub tunerParams: TunerParamsT,
    pub ctrlParams: ControlParamsT,
    pub rsp1aTunerParams: Rsp1aTunerParamsT,
    pub rsp2TunerParams: Rsp2TunerParamsT,
    pub rspDuoTunerParams: RspDuoTunerParamsT,
    pub rspDxTunerParams: RspDxTunerParamsT,
}

#[repr(C)]
pub struct DeviceParamsT {
    pub devParams: *mut DevParamsT,
    pub rxChannelA: *mut RxChannelParamsT,
    pub rxChannelB: *mut RxChannelParamsT,
}

/// Leading member of `sdrplay_api_EventParamsT` for overload events.
#[repr(C)]
pub struct PowerOverloadParamsT {
    pub powerOverloadChangeType: c_int,
}

pub type StreamCallback = unsafe extern "C" fn(
    xi: *mut c_short,
    xq: *mut c_short,
    params: *mut c_void,
    num_samples: c_uint,
    reset: c_uint,
    ctx: *mut c_void,
);

pub type EventCallback = unsafe extern "C" fn(
    event_id: c_int,
    tuner: c_int,
    params: *mut c_void,
    ctx: *mut c_void,
);

#[repr(C)]
pub struct CallbackFnsT {
    pub StreamACbFn: Option<StreamCallback>,
    pub StreamBCbFn: Option<StreamCallback>,
    pub EventCbFn: Option<EventCallback>,
}

extern "C" {
    pub fn sdrplay_api_Open() -> ErrT;
    pub fn sdrplay_api_Close() -> ErrT;
    pub fn sdrplay_api_LockDeviceApi() -> ErrT;
    pub fn sdrplay_api_UnlockDeviceApi() -> ErrT;
    pub fn sdrplay_api_GetDevices(
        devices: *mut DeviceT,
        num_devs: *mut c_uint,
        max_devs: c_uint,
    ) -> ErrT;
    pub fn sdrplay_api_SelectDevice(device: *mut DeviceT) -> ErrT;
    pub fn sdrplay_api_ReleaseDevice(device: *mut DeviceT) -> ErrT;
    pub fn sdrplay_api_GetDeviceParams(dev: Handle, params: *mut *mut DeviceParamsT) -> ErrT;
    pub fn sdrplay_api_Init(dev: Handle, callbacks: *mut CallbackFnsT, ctx: *mut c_void) -> ErrT;
    pub fn sdrplay_api_Uninit(dev: Handle) -> ErrT;
    pub fn sdrplay_api_Update(dev: Handle, tuner: c_int, reason: c_int, reason_ext1: c_int)
        -> ErrT;
}

// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! SDRplay RSP support.
//!
//! Model, antenna, gain and device selection rules live here so they can be
//! checked without the vendor library; the API v3 binding is behind the
//! `sdrplay` feature.

use hdrx_core::error::{AcqError, AcqResult};

#[cfg(feature = "sdrplay")]
mod device;
#[cfg(feature = "sdrplay")]
mod ffi;

#[cfg(feature = "sdrplay")]
pub use device::SdrplayTuner;

/// RSP hardware models, keyed by the API's `hwVer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RspModel {
    Rsp1,
    Rsp1a,
    Rsp1b,
    Rsp2,
    RspDuo,
    RspDx,
    RspDxR2,
}

impl RspModel {
    pub fn from_hw_ver(hw_ver: u8) -> Option<Self> {
        match hw_ver {
            1 => Some(Self::Rsp1),
            255 => Some(Self::Rsp1a),
            6 => Some(Self::Rsp1b),
            2 => Some(Self::Rsp2),
            3 => Some(Self::RspDuo),
            4 => Some(Self::RspDx),
            7 => Some(Self::RspDxR2),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rsp1 => "RSP1",
            Self::Rsp1a => "RSP1A",
            Self::Rsp1b => "RSP1B",
            Self::Rsp2 => "RSP2",
            Self::RspDuo => "RSPduo",
            Self::RspDx => "RSPdx",
            Self::RspDxR2 => "RSPdx-R2",
        }
    }

    /// Where the bias tee switch lives, if the model has one.
    pub fn bias_tee(self) -> Option<BiasTee> {
        match self {
            Self::Rsp1 => None,
            Self::Rsp1a | Self::Rsp1b => Some(BiasTee::Rsp1aTuner),
            Self::Rsp2 => Some(BiasTee::Rsp2Tuner),
            Self::RspDuo => Some(BiasTee::RspDuoTuner),
            Self::RspDx | Self::RspDxR2 => Some(BiasTee::RspDxDevice),
        }
    }

    pub fn has_antenna_choice(self) -> bool {
        matches!(
            self,
            Self::Rsp2 | Self::RspDuo | Self::RspDx | Self::RspDxR2
        )
    }

    /// Parse an antenna name valid for this model.
    pub fn antenna(self, name: &str) -> AcqResult<Antenna> {
        let antenna = match (self, name) {
            (Self::Rsp2, "Antenna A") => Some(Antenna::Rsp2(Rsp2Port::A)),
            (Self::Rsp2, "Antenna B") => Some(Antenna::Rsp2(Rsp2Port::B)),
            (Self::Rsp2, "Hi-Z") => Some(Antenna::Rsp2(Rsp2Port::HiZ)),
            (Self::RspDuo, "Tuner 1 50 ohm") => Some(Antenna::Duo {
                tuner: DuoTuner::A,
                hi_z: false,
            }),
            (Self::RspDuo, "Tuner 2 50 ohm") => Some(Antenna::Duo {
                tuner: DuoTuner::B,
                hi_z: false,
            }),
            (Self::RspDuo, "Tuner 1 Hi-Z") => Some(Antenna::Duo {
                tuner: DuoTuner::A,
                hi_z: true,
            }),
            (Self::RspDx | Self::RspDxR2, "Antenna A") => Some(Antenna::Dx(DxPort::A)),
            (Self::RspDx | Self::RspDxR2, "Antenna B") => Some(Antenna::Dx(DxPort::B)),
            (Self::RspDx | Self::RspDxR2, "Antenna C") => Some(Antenna::Dx(DxPort::C)),
            _ => None,
        };
        antenna.ok_or_else(|| {
            AcqError::rejected(format!("{} has no antenna '{}'", self.name(), name))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasTee {
    Rsp1aTuner,
    Rsp2Tuner,
    RspDuoTuner,
    RspDxDevice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rsp2Port {
    A,
    B,
    /// High impedance AM port; leaves the 50 ohm selection alone.
    HiZ,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuoTuner {
    A,
    B,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DxPort {
    A,
    B,
    C,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Antenna {
    Rsp2(Rsp2Port),
    Duo { tuner: DuoTuner, hi_z: bool },
    Dx(DxPort),
}

/// Tuner an RSPduo opens on, picked from the configured antenna name.
pub fn duo_tuner_for(antenna: Option<&str>) -> DuoTuner {
    match antenna {
        Some(name) if name == "Tuner 2" || name.starts_with("Tuner 2 ") => DuoTuner::B,
        _ => DuoTuner::A,
    }
}

/// Which enumerated device to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceSelector {
    Index(usize),
    Serial(String),
}

impl DeviceSelector {
    /// A single character is a device index, anything longer a serial number.
    pub fn parse(serial: Option<&str>) -> AcqResult<Self> {
        match serial {
            None | Some("") => Ok(Self::Index(0)),
            Some(s) if s.len() == 1 => s
                .parse()
                .map(Self::Index)
                .map_err(|_| AcqError::Open(format!("bad RSP index '{s}'"))),
            Some(s) => Ok(Self::Serial(s.to_string())),
        }
    }

    /// Position of the selected device among `(valid, serial)` entries.
    pub fn find<'a, I>(&self, devices: I) -> Option<usize>
    where
        I: IntoIterator<Item = (bool, &'a str)>,
    {
        let mut devices = devices.into_iter();
        match self {
            Self::Index(index) => devices.nth(*index).map(|_| *index),
            Self::Serial(serial) => devices.position(|(valid, s)| valid && s == serial.as_str()),
        }
    }
}

/// RSP gains are written `LNAstate.IFgr`: the integer part is the LNA state,
/// the first two decimals the IF gain reduction in dB. A zero IF part leaves
/// the IF gain to the hardware AGC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RspGain {
    pub lna_state: u8,
    /// `None` selects the IF AGC.
    pub if_gr: Option<u8>,
}

const MAX_LNA_STATE: f32 = 27.0;
const IF_GR_RANGE: std::ops::RangeInclusive<u8> = 20..=59;

impl RspGain {
    pub fn decode(value: f32) -> AcqResult<Self> {
        if !value.is_finite() || !(0.0..MAX_LNA_STATE + 1.0).contains(&value) {
            return Err(AcqError::rejected(format!(
                "RSP gain {value} is not LNAstate.IFgr"
            )));
        }
        let lna_state = value.trunc() as u8;
        let if_gr = ((value - value.trunc()) * 100.0 + 0.00001) as u8;
        if if_gr == 0 {
            return Ok(Self {
                lna_state,
                if_gr: None,
            });
        }
        if !IF_GR_RANGE.contains(&if_gr) {
            return Err(AcqError::rejected(format!(
                "IF gain reduction {if_gr} dB outside {}-{}",
                IF_GR_RANGE.start(),
                IF_GR_RANGE.end()
            )));
        }
        Ok(Self {
            lna_state,
            if_gr: Some(if_gr),
        })
    }

    pub fn encode(self) -> f32 {
        f32::from(self.lna_state) + f32::from(self.if_gr.unwrap_or(0)) / 100.0
    }
}

/// IF AGC set point used when the gain leaves IF to the hardware.
pub const AGC_SET_POINT_DBFS: i32 = -60;

/// Interleave the driver's split I and Q blocks into cs16 pairs.
pub fn interleave(xi: &[i16], xq: &[i16], out: &mut Vec<i16>) {
    out.clear();
    out.reserve(xi.len() * 2);
    for (&i, &q) in xi.iter().zip(xq) {
        out.push(i);
        out.push(q);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hw_versions_map_to_models() {
        assert_eq!(RspModel::from_hw_ver(255), Some(RspModel::Rsp1a));
        assert_eq!(RspModel::from_hw_ver(3), Some(RspModel::RspDuo));
        assert_eq!(RspModel::from_hw_ver(7), Some(RspModel::RspDxR2));
        assert_eq!(RspModel::from_hw_ver(42), None);
    }

    #[test]
    fn bias_tee_location_per_model() {
        assert_eq!(RspModel::Rsp1.bias_tee(), None);
        assert_eq!(RspModel::Rsp1b.bias_tee(), Some(BiasTee::Rsp1aTuner));
        assert_eq!(RspModel::Rsp2.bias_tee(), Some(BiasTee::Rsp2Tuner));
        assert_eq!(RspModel::RspDuo.bias_tee(), Some(BiasTee::RspDuoTuner));
        assert_eq!(RspModel::RspDx.bias_tee(), Some(BiasTee::RspDxDevice));
    }

    #[test]
    fn antenna_names_follow_model() {
        assert_eq!(
            RspModel::Rsp2.antenna("Hi-Z").unwrap(),
            Antenna::Rsp2(Rsp2Port::HiZ)
        );
        assert_eq!(
            RspModel::RspDuo.antenna("Tuner 2 50 ohm").unwrap(),
            Antenna::Duo {
                tuner: DuoTuner::B,
                hi_z: false
            }
        );
        assert_eq!(
            RspModel::RspDxR2.antenna("Antenna C").unwrap(),
            Antenna::Dx(DxPort::C)
        );
        assert!(matches!(
            RspModel::Rsp2.antenna("Antenna C"),
            Err(AcqError::Rejected(_))
        ));
        assert!(RspModel::Rsp1a.antenna("Antenna A").is_err());
        assert!(!RspModel::Rsp1a.has_antenna_choice());
    }

    #[test]
    fn duo_opens_tuner_two_only_when_named() {
        assert_eq!(duo_tuner_for(None), DuoTuner::A);
        assert_eq!(duo_tuner_for(Some("Tuner 2")), DuoTuner::B);
        assert_eq!(duo_tuner_for(Some("Tuner 2 50 ohm")), DuoTuner::B);
        assert_eq!(duo_tuner_for(Some("Tuner 20")), DuoTuner::A);
        assert_eq!(duo_tuner_for(Some("Tuner 1 Hi-Z")), DuoTuner::A);
    }

    #[test]
    fn selector_by_index_or_serial() {
        let devices = [(true, "1234567890"), (false, "2222222222"), (true, "2222222222")];
        assert_eq!(DeviceSelector::parse(None).unwrap(), DeviceSelector::Index(0));
        assert_eq!(
            DeviceSelector::parse(Some("1")).unwrap().find(devices),
            Some(1)
        );
        assert_eq!(DeviceSelector::parse(Some("5")).unwrap().find(devices), None);
        assert_eq!(
            DeviceSelector::parse(Some("2222222222")).unwrap().find(devices),
            Some(2)
        );
        assert_eq!(
            DeviceSelector::parse(Some("99")).unwrap().find(devices),
            None
        );
        assert!(DeviceSelector::parse(Some("x")).is_err());
    }

    #[test]
    fn gain_splits_into_lna_state_and_if_reduction() {
        assert_eq!(
            RspGain::decode(4.4).unwrap(),
            RspGain {
                lna_state: 4,
                if_gr: Some(40)
            }
        );
        assert_eq!(
            RspGain::decode(3.0).unwrap(),
            RspGain {
                lna_state: 3,
                if_gr: None
            }
        );
        assert_eq!(RspGain::decode(2.59).unwrap().if_gr, Some(59));
        assert!(RspGain::decode(2.05).is_err());
        assert!(RspGain::decode(-1.0).is_err());
        assert!(RspGain::decode(30.0).is_err());
        assert!((RspGain::decode(5.25).unwrap().encode() - 5.25).abs() < 1e-4);
    }

    #[test]
    fn split_blocks_interleave() {
        let mut out = vec![9; 3];
        interleave(&[1, 2, 3], &[-1, -2, -3], &mut out);
        assert_eq!(out, vec![1, -1, 2, -2, 3, -3]);
    }
}

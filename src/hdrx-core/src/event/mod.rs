// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Events delivered to the receiver's callback.
//!
//! Payloads borrow from the producer for the duration of a single callback
//! invocation. Use [`EventRecord`] to keep a copy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tuner::Samples;

pub mod record;
pub mod reporter;
pub mod sig;

pub use record::EventRecord;
pub use reporter::{EventCallback, Reporter};
pub use sig::{ComponentKind, SigComponent, SigService, SigServiceType, SigTable};

/// Whether a service is free to air.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Public,
    Restricted,
}

impl From<u32> for Access {
    fn from(raw: u32) -> Self {
        if raw == 0 {
            Access::Public
        } else {
            Access::Restricted
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgcInfo {
    pub gain_db: f32,
    pub peak_dbfs: f32,
    pub is_final: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct HdcPacket<'a> {
    pub program: u32,
    /// `None` when the packet arrived incomplete.
    pub data: Option<&'a [u8]>,
    pub crc_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f32,
    pub longitude: f32,
    pub altitude: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioServiceInfo {
    pub program: u32,
    pub access: Access,
    pub service_type: u32,
    pub codec_mode: u32,
    pub blend_control: u32,
    pub digital_audio_gain: i32,
    pub common_delay: u32,
    pub latency: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioServiceDescriptor {
    pub program: u32,
    pub access: Access,
    pub program_type: u32,
    pub sound_exp: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataServiceDescriptor {
    pub access: Access,
    pub service_type: u32,
    pub mime_type: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct AlertInfo<'a> {
    pub message: &'a str,
    pub control_data: &'a [u8],
    pub category1: i32,
    pub category2: i32,
    pub location_format: i32,
    pub locations: &'a [i32],
}

/// Station information service summary.
#[derive(Debug, Clone, Copy, Default)]
pub struct SisInfo<'a> {
    pub country_code: Option<&'a str>,
    pub fcc_facility_id: i32,
    pub name: Option<&'a str>,
    pub slogan: Option<&'a str>,
    pub message: Option<&'a str>,
    pub alert: Option<AlertInfo<'a>>,
    pub location: Option<Location>,
    pub audio_services: &'a [AudioServiceDescriptor],
    pub data_services: &'a [DataServiceDescriptor],
}

#[derive(Debug, Clone, Copy)]
pub struct HereImage<'a> {
    pub image_type: i32,
    pub seq: i32,
    pub n1: i32,
    pub n2: i32,
    pub time_utc: Option<DateTime<Utc>>,
    pub latitude1: f32,
    pub longitude1: f32,
    pub latitude2: f32,
    pub longitude2: f32,
    pub name: &'a str,
    pub data: &'a [u8],
}

/// Large object transfer, either the header or the completed object.
#[derive(Debug, Clone, Copy)]
pub struct LotInfo<'a> {
    pub port: u16,
    pub lot: u32,
    pub size: u32,
    pub mime: u32,
    pub name: &'a str,
    /// Empty for header events.
    pub data: &'a [u8],
    pub expiry_utc: Option<DateTime<Utc>>,
    pub service: &'a SigService,
    pub component: &'a SigComponent,
}

#[derive(Debug, Clone, Copy)]
pub struct LotFragment<'a> {
    pub port: u16,
    pub lot: u32,
    pub seq: u32,
    pub repeat: u32,
    pub is_duplicate: bool,
    pub size: u32,
    pub bytes_so_far: u32,
    pub data: &'a [u8],
    pub service: &'a SigService,
    pub component: &'a SigComponent,
}

/// Payload of a byte stream or packet data component.
#[derive(Debug, Clone, Copy)]
pub struct PortData<'a> {
    pub port: u16,
    pub seq: u16,
    pub mime: u32,
    pub data: &'a [u8],
    pub service: &'a SigService,
    pub component: &'a SigComponent,
}

/// Every observation the receiver reports.
#[derive(Debug, Clone, Copy)]
pub enum Event<'a> {
    /// The tuner stopped producing samples; the receiver is now stopped.
    LostDevice,
    Agc(AgcInfo),
    /// Raw samples as fed to the pipeline.
    Iq(Samples<'a>),
    Sync {
        freq_offset: f32,
        psmi: i32,
    },
    LostSync,
    Hdc(HdcPacket<'a>),
    Audio {
        program: u32,
        data: &'a [i16],
    },
    Mer {
        lower: f32,
        upper: f32,
    },
    Ber {
        cber: f32,
    },
    Sig(&'a SigTable),
    Sis(SisInfo<'a>),
    StationId {
        country_code: &'a str,
        fcc_facility_id: i32,
    },
    StationName(&'a str),
    StationSlogan(&'a str),
    StationMessage(&'a str),
    StationLocation(Location),
    AudioService(AudioServiceInfo),
    AudioServiceDescriptor(AudioServiceDescriptor),
    DataServiceDescriptor(DataServiceDescriptor),
    EmergencyAlert(AlertInfo<'a>),
    HereImage(HereImage<'a>),
    LotHeader(LotInfo<'a>),
    Lot(LotInfo<'a>),
    LotFragment(LotFragment<'a>),
    Stream(PortData<'a>),
    Packet(PortData<'a>),
}

impl Event<'_> {
    /// Stable snake_case name of the event kind.
    pub fn name(&self) -> &'static str {
        match self {
            Event::LostDevice => "lost_device",
            Event::Agc(_) => "agc",
            Event::Iq(_) => "iq",
            Event::Sync { .. } => "sync",
            Event::LostSync => "lost_sync",
            Event::Hdc(_) => "hdc",
            Event::Audio { .. } => "audio",
            Event::Mer { .. } => "mer",
            Event::Ber { .. } => "ber",
            Event::Sig(_) => "sig",
            Event::Sis(_) => "sis",
            Event::StationId { .. } => "station_id",
            Event::StationName(_) => "station_name",
            Event::StationSlogan(_) => "station_slogan",
            Event::StationMessage(_) => "station_message",
            Event::StationLocation(_) => "station_location",
            Event::AudioService(_) => "audio_service",
            Event::AudioServiceDescriptor(_) => "audio_service_descriptor",
            Event::DataServiceDescriptor(_) => "data_service_descriptor",
            Event::EmergencyAlert(_) => "emergency_alert",
            Event::HereImage(_) => "here_image",
            Event::LotHeader(_) => "lot_header",
            Event::Lot(_) => "lot",
            Event::LotFragment(_) => "lot_fragment",
            Event::Stream(_) => "stream",
            Event::Packet(_) => "packet",
        }
    }
}

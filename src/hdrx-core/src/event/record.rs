// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Owned copies of events that outlive the callback invocation.
//!
//! Bulk payloads (sample blocks, PCM) are reduced to counts. Object payloads are
//! kept but left out of the serialized form.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    AgcInfo, AlertInfo, AudioServiceDescriptor, AudioServiceInfo, DataServiceDescriptor, Event,
    Location, SigComponent, SigService, SigTable,
};
use crate::radio::SampleFormat;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub message: String,
    pub control_data: Vec<u8>,
    pub category1: i32,
    pub category2: i32,
    pub location_format: i32,
    pub locations: Vec<i32>,
}

impl From<&AlertInfo<'_>> for AlertRecord {
    fn from(alert: &AlertInfo<'_>) -> Self {
        Self {
            message: alert.message.to_string(),
            control_data: alert.control_data.to_vec(),
            category1: alert.category1,
            category2: alert.category2,
            location_format: alert.location_format,
            locations: alert.locations.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SisRecord {
    pub country_code: Option<String>,
    pub fcc_facility_id: i32,
    pub name: Option<String>,
    pub slogan: Option<String>,
    pub message: Option<String>,
    pub alert: Option<AlertRecord>,
    pub location: Option<Location>,
    pub audio_services: Vec<AudioServiceDescriptor>,
    pub data_services: Vec<DataServiceDescriptor>,
}

/// Where an object payload came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Origin {
    pub port: u16,
    pub service_number: u16,
    pub service_name: String,
    pub component_id: u8,
}

impl Origin {
    fn new(port: u16, service: &SigService, component: &SigComponent) -> Self {
        Self {
            port,
            service_number: service.number,
            service_name: service.name.clone(),
            component_id: component.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LotRecord {
    #[serde(flatten)]
    pub origin: Origin,
    pub lot: u32,
    pub size: u32,
    pub mime: u32,
    pub name: String,
    pub expiry_utc: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FragmentRecord {
    #[serde(flatten)]
    pub origin: Origin,
    pub lot: u32,
    pub seq: u32,
    pub repeat: u32,
    pub is_duplicate: bool,
    pub size: u32,
    pub bytes_so_far: u32,
    #[serde(skip)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortRecord {
    #[serde(flatten)]
    pub origin: Origin,
    pub seq: u16,
    pub mime: u32,
    pub size: usize,
    #[serde(skip)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HereImageRecord {
    pub image_type: i32,
    pub seq: i32,
    pub n1: i32,
    pub n2: i32,
    pub time_utc: Option<DateTime<Utc>>,
    pub latitude1: f32,
    pub longitude1: f32,
    pub latitude2: f32,
    pub longitude2: f32,
    pub name: String,
    pub size: usize,
    #[serde(skip)]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventRecord {
    LostDevice,
    Agc(AgcInfo),
    Iq {
        format: SampleFormat,
        count: usize,
    },
    Sync {
        freq_offset: f32,
        psmi: i32,
    },
    LostSync,
    Hdc {
        program: u32,
        size: Option<usize>,
        crc_error: bool,
        #[serde(skip)]
        data: Option<Vec<u8>>,
    },
    Audio {
        program: u32,
        count: usize,
    },
    Mer {
        lower: f32,
        upper: f32,
    },
    Ber {
        cber: f32,
    },
    Sig(SigTable),
    Sis(SisRecord),
    StationId {
        country_code: String,
        fcc_facility_id: i32,
    },
    StationName {
        name: String,
    },
    StationSlogan {
        slogan: String,
    },
    StationMessage {
        message: String,
    },
    StationLocation(Location),
    AudioService(AudioServiceInfo),
    AudioServiceDescriptor(AudioServiceDescriptor),
    DataServiceDescriptor(DataServiceDescriptor),
    EmergencyAlert(AlertRecord),
    HereImage(HereImageRecord),
    LotHeader(LotRecord),
    Lot(LotRecord),
    LotFragment(FragmentRecord),
    Stream(PortRecord),
    Packet(PortRecord),
}

impl From<&Event<'_>> for EventRecord {
    fn from(event: &Event<'_>) -> Self {
        match *event {
            Event::LostDevice => EventRecord::LostDevice,
            Event::Agc(info) => EventRecord::Agc(info),
            Event::Iq(samples) => EventRecord::Iq {
                format: samples.format(),
                count: samples.len(),
            },
            Event::Sync { freq_offset, psmi } => EventRecord::Sync { freq_offset, psmi },
            Event::LostSync => EventRecord::LostSync,
            Event::Hdc(pkt) => EventRecord::Hdc {
                program: pkt.program,
                size: pkt.data.map(<[u8]>::len),
                crc_error: pkt.crc_error,
                data: pkt.data.map(<[u8]>::to_vec),
            },
            Event::Audio { program, data } => EventRecord::Audio {
                program,
                count: data.len(),
            },
            Event::Mer { lower, upper } => EventRecord::Mer { lower, upper },
            Event::Ber { cber } => EventRecord::Ber { cber },
            Event::Sig(table) => EventRecord::Sig(table.clone()),
            Event::Sis(ref sis) => EventRecord::Sis(SisRecord {
                country_code: sis.country_code.map(str::to_string),
                fcc_facility_id: sis.fcc_facility_id,
                name: sis.name.map(str::to_string),
                slogan: sis.slogan.map(str::to_string),
                message: sis.message.map(str::to_string),
                alert: sis.alert.as_ref().map(AlertRecord::from),
                location: sis.location,
                audio_services: sis.audio_services.to_vec(),
                data_services: sis.data_services.to_vec(),
            }),
            Event::StationId {
                country_code,
                fcc_facility_id,
            } => EventRecord::StationId {
                country_code: country_code.to_string(),
                fcc_facility_id,
            },
            Event::StationName(name) => EventRecord::StationName {
                name: name.to_string(),
            },
            Event::StationSlogan(slogan) => EventRecord::StationSlogan {
                slogan: slogan.to_string(),
            },
            Event::StationMessage(message) => EventRecord::StationMessage {
                message: message.to_string(),
            },
            Event::StationLocation(loc) => EventRecord::StationLocation(loc),
            Event::AudioService(info) => EventRecord::AudioService(info),
            Event::AudioServiceDescriptor(asd) => EventRecord::AudioServiceDescriptor(asd),
            Event::DataServiceDescriptor(dsd) => EventRecord::DataServiceDescriptor(dsd),
            Event::EmergencyAlert(ref alert) => EventRecord::EmergencyAlert(alert.into()),
            Event::HereImage(ref img) => EventRecord::HereImage(HereImageRecord {
                image_type: img.image_type,
                seq: img.seq,
                n1: img.n1,
                n2: img.n2,
                time_utc: img.time_utc,
                latitude1: img.latitude1,
                longitude1: img.longitude1,
                latitude2: img.latitude2,
                longitude2: img.longitude2,
                name: img.name.to_string(),
                size: img.data.len(),
                data: img.data.to_vec(),
            }),
            Event::LotHeader(ref lot) => EventRecord::LotHeader(lot_record(lot)),
            Event::Lot(ref lot) => EventRecord::Lot(lot_record(lot)),
            Event::LotFragment(ref frag) => EventRecord::LotFragment(FragmentRecord {
                origin: Origin::new(frag.port, frag.service, frag.component),
                lot: frag.lot,
                seq: frag.seq,
                repeat: frag.repeat,
                is_duplicate: frag.is_duplicate,
                size: frag.size,
                bytes_so_far: frag.bytes_so_far,
                data: frag.data.to_vec(),
            }),
            Event::Stream(ref data) => EventRecord::Stream(port_record(data)),
            Event::Packet(ref data) => EventRecord::Packet(port_record(data)),
        }
    }
}

fn lot_record(lot: &super::LotInfo<'_>) -> LotRecord {
    LotRecord {
        origin: Origin::new(lot.port, lot.service, lot.component),
        lot: lot.lot,
        size: lot.size,
        mime: lot.mime,
        name: lot.name.to_string(),
        expiry_utc: lot.expiry_utc,
        data: lot.data.to_vec(),
    }
}

fn port_record(data: &super::PortData<'_>) -> PortRecord {
    PortRecord {
        origin: Origin::new(data.port, data.service, data.component),
        seq: data.seq,
        mime: data.mime,
        size: data.data.len(),
        data: data.data.to_vec(),
    }
}

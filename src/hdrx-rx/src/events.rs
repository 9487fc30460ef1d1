// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Receiver event handling: audio routing, JSON lines or log output, and
//! lost-device notification.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use hdrx_core::{AudioFiller, Event, EventRecord};

pub struct EventHandler {
    program: u32,
    json: Option<Mutex<Box<dyn Write + Send>>>,
    filler: Option<Mutex<AudioFiller>>,
    lost_tx: watch::Sender<bool>,
}

impl EventHandler {
    pub fn new(program: u32, filler: Option<AudioFiller>, lost_tx: watch::Sender<bool>) -> Self {
        Self {
            program,
            json: None,
            filler: filler.map(Mutex::new),
            lost_tx,
        }
    }

    /// Print events as JSON lines on `out` instead of logging them.
    pub fn with_json(mut self, out: Box<dyn Write + Send>) -> Self {
        self.json = Some(Mutex::new(out));
        self
    }

    pub fn handle(&self, event: &Event<'_>) {
        match event {
            Event::Audio { program, data } => {
                if *program == self.program {
                    if let Some(filler) = &self.filler {
                        filler
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .write(data);
                    }
                }
                return;
            }
            Event::Iq(_) => return,
            Event::LostDevice => {
                self.lost_tx.send_replace(true);
            }
            _ => {}
        }

        match &self.json {
            Some(out) => self.write_json(out, event),
            None => log_event(event),
        }
    }

    fn write_json(&self, out: &Mutex<Box<dyn Write + Send>>, event: &Event<'_>) {
        let record = EventRecord::from(event);
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize {} event: {}", event.name(), e);
                return;
            }
        };
        let mut out = out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            error!("Failed to write event: {}", e);
        }
    }

    /// Samples dropped so far because the audio pool was full.
    pub fn dropped_audio_samples(&self) -> u64 {
        self.filler
            .as_ref()
            .map(|f| f.lock().unwrap_or_else(PoisonError::into_inner).dropped_samples())
            .unwrap_or(0)
    }

    /// Hand the partially filled audio buffer to the consumer.
    pub fn flush_audio(&self) {
        if let Some(filler) = &self.filler {
            filler.lock().unwrap_or_else(PoisonError::into_inner).flush();
        }
    }
}

fn opt(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn log_event(event: &Event<'_>) {
    match event {
        Event::LostDevice => error!("Lost device"),
        Event::Agc(agc) if agc.is_final => info!(
            "Gain: {:.1} dB, peak {:.1} dBFS",
            agc.gain_db, agc.peak_dbfs
        ),
        Event::Agc(agc) => debug!(
            "Gain trial: {:.1} dB, peak {:.1} dBFS",
            agc.gain_db, agc.peak_dbfs
        ),
        Event::Sync { freq_offset, psmi } => {
            info!("Synchronized (offset {:.1} Hz, psmi {})", freq_offset, psmi)
        }
        Event::LostSync => warn!("Lost synchronization"),
        Event::Mer { lower, upper } => info!("MER: {:.1} dB (lower), {:.1} dB (upper)", lower, upper),
        Event::Ber { cber } => info!("BER: {:.6}", cber),
        Event::Hdc(pkt) if pkt.crc_error => debug!("HDC packet for program {} failed CRC", pkt.program),
        Event::Hdc(_) => {}
        Event::Sig(table) => {
            for service in &table.services {
                info!("SIG service {}: {}", service.number, service.name);
            }
        }
        Event::Sis(sis) => info!(
            "SIS: country {} facility {} name {} slogan {}",
            opt(sis.country_code),
            sis.fcc_facility_id,
            opt(sis.name),
            opt(sis.slogan)
        ),
        Event::StationId {
            country_code,
            fcc_facility_id,
        } => info!("Country: {}, FCC facility ID: {}", country_code, fcc_facility_id),
        Event::StationName(name) => info!("Station name: {}", name),
        Event::StationSlogan(slogan) => info!("Slogan: {}", slogan),
        Event::StationMessage(message) => info!("Message: {}", message),
        Event::StationLocation(loc) => info!(
            "Station location: {}, {}, {}m",
            loc.latitude, loc.longitude, loc.altitude
        ),
        Event::AudioService(asi) => info!(
            "Audio program {}: {:?}, type {}, codec mode {}",
            asi.program, asi.access, asi.service_type, asi.codec_mode
        ),
        Event::AudioServiceDescriptor(asd) => info!(
            "Audio service descriptor: program {}, {:?}, type {}",
            asd.program, asd.access, asd.program_type
        ),
        Event::DataServiceDescriptor(dsd) => info!(
            "Data service descriptor: {:?}, type {}, MIME {:#x}",
            dsd.access, dsd.service_type, dsd.mime_type
        ),
        Event::EmergencyAlert(alert) => warn!("Alert: {}", alert.message),
        Event::HereImage(img) => info!(
            "HERE image: type {}, seq {}, {} ({} bytes)",
            img.image_type,
            img.seq,
            img.name,
            img.data.len()
        ),
        Event::LotHeader(lot) => debug!(
            "LOT header: port {:#06x}, lot {}, {} ({} bytes)",
            lot.port, lot.lot, lot.name, lot.size
        ),
        Event::Lot(lot) => info!(
            "LOT file: port {:#06x}, lot {}, {} ({} bytes)",
            lot.port,
            lot.lot,
            lot.name,
            lot.data.len()
        ),
        Event::LotFragment(frag) => debug!(
            "LOT fragment: port {:#06x}, lot {}, seq {}, {}/{} bytes",
            frag.port, frag.lot, frag.seq, frag.bytes_so_far, frag.size
        ),
        Event::Stream(data) => debug!(
            "Stream data: port {:#06x}, seq {}, {} bytes",
            data.port,
            data.seq,
            data.data.len()
        ),
        Event::Packet(data) => debug!(
            "Packet data: port {:#06x}, seq {}, {} bytes",
            data.port,
            data.seq,
            data.data.len()
        ),
        Event::Audio { .. } | Event::Iq(_) => {}
    }
}

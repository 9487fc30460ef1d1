// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Single-callback event dispatch shared by a receiver and its pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::{
    AgcInfo, AlertInfo, AudioServiceDescriptor, AudioServiceInfo, DataServiceDescriptor, Event,
    HdcPacket, HereImage, Location, LotFragment, LotInfo, PortData, SigComponent, SigService,
    SigTable, SisInfo,
};
use crate::tuner::Samples;

/// Consumer callback. Whatever the closure captures is the consumer context.
pub type EventCallback = Arc<dyn Fn(&Event<'_>) + Send + Sync>;

/// A large object or its header, before the owning component is resolved.
#[derive(Debug, Clone, Copy)]
pub struct LotUpdate<'a> {
    pub port: u16,
    pub lot: u32,
    pub size: u32,
    pub mime: u32,
    pub name: &'a str,
    pub data: &'a [u8],
    pub expiry_utc: Option<DateTime<Utc>>,
}

/// One fragment of a large object, before the owning component is resolved.
#[derive(Debug, Clone, Copy)]
pub struct FragmentUpdate<'a> {
    pub port: u16,
    pub lot: u32,
    pub seq: u32,
    pub repeat: u32,
    pub is_duplicate: bool,
    pub size: u32,
    pub bytes_so_far: u32,
    pub data: &'a [u8],
}

#[derive(Default)]
struct Inner {
    callback: Mutex<Option<EventCallback>>,
    sig: Mutex<Option<Arc<SigTable>>>,
    generation: AtomicU64,
}

/// Cheap clonable handle used by every producer of events.
///
/// The callback is looked up under a short lock and invoked after the lock is
/// released, on the producing thread. Callbacks may therefore report further
/// events or replace the callback from inside an invocation.
#[derive(Clone, Default)]
pub struct Reporter {
    inner: Arc<Inner>,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(&Event<'_>) + Send + Sync + 'static,
    {
        *self.lock_callback() = Some(Arc::new(callback));
    }

    pub fn clear_callback(&self) {
        *self.lock_callback() = None;
    }

    pub fn has_callback(&self) -> bool {
        self.lock_callback().is_some()
    }

    pub fn report(&self, event: &Event<'_>) {
        let callback = self.lock_callback().clone();
        if let Some(callback) = callback {
            callback(event);
        }
    }

    fn lock_callback(&self) -> std::sync::MutexGuard<'_, Option<EventCallback>> {
        self.inner
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_sig(&self) -> std::sync::MutexGuard<'_, Option<Arc<SigTable>>> {
        self.inner.sig.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn report_lost_device(&self) {
        self.report(&Event::LostDevice);
    }

    pub fn report_agc(&self, gain_db: f32, peak_dbfs: f32, is_final: bool) {
        self.report(&Event::Agc(AgcInfo {
            gain_db,
            peak_dbfs,
            is_final,
        }));
    }

    pub fn report_iq(&self, samples: Samples<'_>) {
        self.report(&Event::Iq(samples));
    }

    pub fn report_sync(&self, freq_offset: f32, psmi: i32) {
        self.report(&Event::Sync { freq_offset, psmi });
    }

    pub fn report_lost_sync(&self) {
        self.report(&Event::LostSync);
    }

    pub fn report_hdc(&self, program: u32, data: Option<&[u8]>, crc_error: bool) {
        self.report(&Event::Hdc(HdcPacket {
            program,
            data,
            crc_error,
        }));
    }

    pub fn report_audio(&self, program: u32, data: &[i16]) {
        self.report(&Event::Audio { program, data });
    }

    pub fn report_mer(&self, lower: f32, upper: f32) {
        self.report(&Event::Mer { lower, upper });
    }

    pub fn report_ber(&self, cber: f32) {
        self.report(&Event::Ber { cber });
    }

    /// Replace the service table and announce it.
    pub fn report_sig(&self, services: Vec<SigService>) -> Arc<SigTable> {
        self.clear_sig();
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let table = Arc::new(SigTable::new(generation, services));
        *self.lock_sig() = Some(table.clone());
        debug!(
            "service table generation {} with {} services",
            generation,
            table.services.len()
        );
        self.report(&Event::Sig(table.as_ref()));
        table
    }

    /// Discard the current service table.
    pub fn clear_sig(&self) {
        *self.lock_sig() = None;
    }

    pub fn sig_table(&self) -> Option<Arc<SigTable>> {
        self.lock_sig().clone()
    }

    pub fn report_sis(&self, sis: SisInfo<'_>) {
        self.report(&Event::Sis(sis));
    }

    pub fn report_station_id(&self, country_code: &str, fcc_facility_id: i32) {
        self.report(&Event::StationId {
            country_code,
            fcc_facility_id,
        });
    }

    pub fn report_station_name(&self, name: &str) {
        self.report(&Event::StationName(name));
    }

    pub fn report_station_slogan(&self, slogan: &str) {
        self.report(&Event::StationSlogan(slogan));
    }

    pub fn report_station_message(&self, message: &str) {
        self.report(&Event::StationMessage(message));
    }

    pub fn report_station_location(&self, latitude: f32, longitude: f32, altitude: i32) {
        self.report(&Event::StationLocation(Location {
            latitude,
            longitude,
            altitude,
        }));
    }

    pub fn report_audio_service(&self, info: AudioServiceInfo) {
        self.report(&Event::AudioService(info));
    }

    pub fn report_asd(&self, asd: AudioServiceDescriptor) {
        self.report(&Event::AudioServiceDescriptor(asd));
    }

    pub fn report_dsd(&self, dsd: DataServiceDescriptor) {
        self.report(&Event::DataServiceDescriptor(dsd));
    }

    pub fn report_emergency_alert(&self, alert: AlertInfo<'_>) {
        self.report(&Event::EmergencyAlert(alert));
    }

    pub fn report_here_image(&self, image: HereImage<'_>) {
        self.report(&Event::HereImage(image));
    }

    pub fn report_lot_header(&self, update: LotUpdate<'_>) {
        self.with_data_port(update.port, "lot header", |service, component| {
            self.report(&Event::LotHeader(lot_info(&update, service, component)));
        });
    }

    pub fn report_lot(&self, update: LotUpdate<'_>) {
        self.with_data_port(update.port, "lot", |service, component| {
            self.report(&Event::Lot(lot_info(&update, service, component)));
        });
    }

    pub fn report_lot_fragment(&self, update: FragmentUpdate<'_>) {
        self.with_data_port(update.port, "lot fragment", |service, component| {
            self.report(&Event::LotFragment(LotFragment {
                port: update.port,
                lot: update.lot,
                seq: update.seq,
                repeat: update.repeat,
                is_duplicate: update.is_duplicate,
                size: update.size,
                bytes_so_far: update.bytes_so_far,
                data: update.data,
                service,
                component,
            }));
        });
    }

    pub fn report_stream(&self, port: u16, seq: u16, data: &[u8]) {
        self.with_data_port(port, "stream", |service, component| {
            self.report(&Event::Stream(PortData {
                port,
                seq,
                mime: component.mime(),
                data,
                service,
                component,
            }));
        });
    }

    pub fn report_packet(&self, port: u16, seq: u16, data: &[u8]) {
        self.with_data_port(port, "packet", |service, component| {
            self.report(&Event::Packet(PortData {
                port,
                seq,
                mime: component.mime(),
                data,
                service,
                component,
            }));
        });
    }

    fn with_data_port<F>(&self, port: u16, what: &str, emit: F)
    where
        F: FnOnce(&SigService, &SigComponent),
    {
        let Some(table) = self.sig_table() else {
            debug!("dropping {} on port {:#06x}: no service table", what, port);
            return;
        };
        match table.find_data_port(port) {
            Some((service, component)) => emit(service, component),
            None => debug!("dropping {} on unknown port {:#06x}", what, port),
        }
    }
}

fn lot_info<'a>(
    update: &LotUpdate<'a>,
    service: &'a SigService,
    component: &'a SigComponent,
) -> LotInfo<'a> {
    LotInfo {
        port: update.port,
        lot: update.lot,
        size: update.size,
        mime: update.mime,
        name: update.name,
        data: update.data,
        expiry_utc: update.expiry_utc,
        service,
        component,
    }
}

/// Convert a transmitted unix timestamp to UTC.
pub fn utc_from_unix(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::sig::tests::sample_services;
    use std::sync::atomic::AtomicUsize;

    fn collecting(reporter: &Reporter) -> Arc<Mutex<Vec<String>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        reporter.set_callback(move |event| {
            let label = match event {
                Event::Stream(data) => format!("stream:{}:{}", data.service.name, data.data.len()),
                Event::Sig(table) => format!("sig:{}", table.generation),
                other => other.name().to_string(),
            };
            sink.lock().unwrap().push(label);
        });
        seen
    }

    #[test]
    fn no_callback_is_noop() {
        let reporter = Reporter::new();
        assert!(!reporter.has_callback());
        reporter.report_lost_sync();
        reporter.report_audio(0, &[1, 2, 3]);
    }

    #[test]
    fn replacing_callback_takes_effect() {
        let reporter = Reporter::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let counter = first.clone();
        reporter.set_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        reporter.report_ber(0.01);

        let counter = second.clone();
        reporter.set_callback(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        reporter.report_ber(0.02);
        reporter.clear_callback();
        reporter.report_ber(0.03);

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn callback_may_report_reentrantly() {
        let reporter = Reporter::new();
        let count = Arc::new(AtomicUsize::new(0));
        let inner = reporter.clone();
        let counter = count.clone();
        reporter.set_callback(move |event| {
            counter.fetch_add(1, Ordering::SeqCst);
            if matches!(event, Event::Sync { .. }) {
                inner.report_lost_sync();
            }
        });
        reporter.report_sync(12.5, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        reporter.clear_callback();
    }

    #[test]
    fn stream_resolves_service_by_port() {
        let reporter = Reporter::new();
        let seen = collecting(&reporter);

        reporter.report_stream(0x2000, 1, b"early");
        reporter.report_sig(sample_services());
        reporter.report_stream(0x2000, 2, b"hello");
        reporter.report_stream(0x7777, 3, b"nobody");
        reporter.clear_sig();
        reporter.report_stream(0x2000, 4, b"late");

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["sig:1".to_string(), "stream:Traffic:5".to_string()]
        );
    }

    #[test]
    fn sig_generation_increases() {
        let reporter = Reporter::new();
        let first = reporter.report_sig(sample_services());
        let second = reporter.report_sig(Vec::new());
        assert!(second.generation > first.generation);
        assert_eq!(reporter.sig_table().unwrap().generation, second.generation);
        // an old snapshot stays valid for whoever still holds it
        assert_eq!(first.services.len(), 2);
    }

    #[test]
    fn lot_events_carry_component() {
        let reporter = Reporter::new();
        reporter.report_sig(sample_services());
        let mimes = Arc::new(Mutex::new(Vec::new()));
        let sink = mimes.clone();
        reporter.set_callback(move |event| match event {
            Event::LotHeader(info) | Event::Lot(info) => {
                sink.lock().unwrap().push((info.component.id, info.data.len()));
            }
            Event::LotFragment(frag) => sink.lock().unwrap().push((frag.component.id, 0)),
            _ => {}
        });
        let update = LotUpdate {
            port: 0x1000,
            lot: 7,
            size: 3,
            mime: 0,
            name: "cover.jpg",
            data: &[],
            expiry_utc: utc_from_unix(1_700_000_000),
        };
        reporter.report_lot_header(update);
        reporter.report_lot_fragment(FragmentUpdate {
            port: 0x1000,
            lot: 7,
            seq: 0,
            repeat: 0,
            is_duplicate: false,
            size: 3,
            bytes_so_far: 3,
            data: &[1, 2, 3],
        });
        reporter.report_lot(LotUpdate {
            data: &[1, 2, 3],
            ..update
        });
        assert_eq!(*mimes.lock().unwrap(), vec![(1, 0), (1, 0), (1, 3)]);
    }
}

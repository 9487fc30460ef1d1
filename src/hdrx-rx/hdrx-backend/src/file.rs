// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Replay of recorded I/Q samples from any byte stream.

use std::io::{self, Read};

use hdrx_core::error::{AcqError, AcqResult};
use hdrx_core::{
    BackendKind, Delivery, Freq, SampleFormat, SampleSink, Samples, TunerBackend,
    TunerCapabilities, TunerInfo,
};

/// Bytes requested from the reader per chunk.
const CHUNK_BYTES: usize = 32 * 1024;

/// File (or stdin) replay backend.
///
/// Tuning and gain calls are accepted and ignored; the recording already
/// fixes both.
pub struct FileReplay {
    info: TunerInfo,
    reader: Box<dyn Read + Send>,
    buf: Vec<u8>,
    filled: usize,
    cs16: Vec<i16>,
    freq: Option<Freq>,
}

impl FileReplay {
    pub fn new(reader: Box<dyn Read + Send>, format: SampleFormat) -> Self {
        Self {
            info: TunerInfo {
                kind: BackendKind::FileReplay,
                driver: "file".into(),
                label: "recording".into(),
                format,
                delivery: Delivery::Pull,
                live: false,
                capabilities: TunerCapabilities::default(),
            },
            reader,
            buf: vec![0u8; CHUNK_BYTES],
            filled: 0,
            cs16: Vec::with_capacity(CHUNK_BYTES / 2),
            freq: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.info.label = label.into();
        self
    }

    fn deliver_whole(&mut self, sink: &dyn SampleSink, whole: usize) {
        match self.info.format {
            SampleFormat::Cu8 => sink.deliver(Samples::Cu8(&self.buf[..whole])),
            SampleFormat::Cs16 => {
                self.cs16.clear();
                self.cs16.extend(
                    self.buf[..whole]
                        .chunks_exact(2)
                        .map(|pair| i16::from_le_bytes([pair[0], pair[1]])),
                );
                sink.deliver(Samples::Cs16(&self.cs16));
            }
        }
    }
}

impl TunerBackend for FileReplay {
    fn info(&self) -> &TunerInfo {
        &self.info
    }

    fn set_frequency(&mut self, freq: Freq) -> AcqResult<()> {
        self.freq = Some(freq);
        Ok(())
    }

    fn frequency(&self) -> Option<Freq> {
        self.freq
    }

    fn set_gain(&mut self, _gain_db: f32) -> AcqResult<()> {
        Ok(())
    }

    fn read(&mut self, sink: &dyn SampleSink) -> AcqResult<()> {
        let n = loop {
            match self.reader.read(&mut self.buf[self.filled..]) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(AcqError::Io(e)),
            }
        };
        if n == 0 {
            if self.filled > 0 {
                tracing::debug!("dropping {} trailing bytes of a partial group", self.filled);
                self.filled = 0;
            }
            return Err(AcqError::EndOfInput);
        }
        self.filled += n;

        let group = self.info.format.group_bytes();
        let whole = self.filled - self.filled % group;
        if whole > 0 {
            self.deliver_whole(sink, whole);
            self.buf.copy_within(whole..self.filled, 0);
            self.filled -= whole;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use hdrx_core::pipeline::IqPassthrough;
    use hdrx_core::Event;

    use super::*;

    #[derive(Default)]
    struct Collect {
        cu8: Mutex<Vec<u8>>,
        cs16: Mutex<Vec<i16>>,
    }

    impl SampleSink for Collect {
        fn deliver(&self, samples: Samples<'_>) {
            match samples {
                Samples::Cu8(data) => self.cu8.lock().unwrap().extend_from_slice(data),
                Samples::Cs16(data) => self.cs16.lock().unwrap().extend_from_slice(data),
            }
        }

        fn is_cancelled(&self) -> bool {
            false
        }

        fn device_lost(&self, _reason: &str) {}
    }

    /// Hands out at most `step` bytes per read.
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.step.min(buf.len()).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    fn drain(replay: &mut FileReplay, sink: &Collect) -> AcqError {
        loop {
            if let Err(e) = replay.read(sink) {
                return e;
            }
        }
    }

    #[test]
    fn cu8_is_delivered_in_whole_groups() {
        let data: Vec<u8> = (0..23).collect();
        let reader = Trickle {
            data: data.clone(),
            pos: 0,
            step: 3,
        };
        let mut replay = FileReplay::new(Box::new(reader), SampleFormat::Cu8);
        let sink = Collect::default();
        let err = drain(&mut replay, &sink);
        assert!(matches!(err, AcqError::EndOfInput));
        assert_eq!(*sink.cu8.lock().unwrap(), data[..20].to_vec());
    }

    #[test]
    fn cs16_is_decoded_little_endian() {
        let raw: Vec<u8> = [1i16, -2, 300, -400]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let mut replay = FileReplay::new(Box::new(Cursor::new(raw)), SampleFormat::Cs16);
        let sink = Collect::default();
        assert!(matches!(drain(&mut replay, &sink), AcqError::EndOfInput));
        assert_eq!(*sink.cs16.lock().unwrap(), vec![1, -2, 300, -400]);
    }

    #[test]
    fn setters_are_accepted() {
        let mut replay = FileReplay::new(Box::new(io::empty()), SampleFormat::Cu8);
        assert!(replay.set_frequency(Freq { hz: 90_100_000 }).is_ok());
        assert!(replay.set_gain(20.0).is_ok());
        assert_eq!(replay.frequency(), Some(Freq { hz: 90_100_000 }));
        assert!(!replay.info().live);
    }

    #[test]
    fn end_of_recording_reports_lost_device() {
        let mut tmp = tempfile::NamedTempFile::new().expect("tmp");
        io::Write::write_all(&mut tmp, &[128u8; 4096]).expect("write");
        let reader = std::fs::File::open(tmp.path()).expect("reopen");

        let mut receiver = crate::open_from_file(reader, SampleFormat::Cu8, |r| {
            Box::new(IqPassthrough::new(r))
        })
        .expect("open");
        let iq = Arc::new(AtomicUsize::new(0));
        let lost = Arc::new(AtomicUsize::new(0));
        {
            let iq = Arc::clone(&iq);
            let lost = Arc::clone(&lost);
            receiver.set_callback(move |event| match event {
                Event::Iq(samples) => {
                    iq.fetch_add(samples.len(), Ordering::SeqCst);
                }
                Event::LostDevice => {
                    lost.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            });
        }
        receiver.start().expect("start");

        let deadline = Instant::now() + Duration::from_secs(5);
        while lost.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(!receiver.is_running());
        assert_eq!(iq.load(Ordering::SeqCst), 4096);
        assert_eq!(lost.load(Ordering::SeqCst), 1);
        receiver.close().expect("close");
    }
}

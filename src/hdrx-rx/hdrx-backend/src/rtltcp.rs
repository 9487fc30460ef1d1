// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! rtl_tcp network relay client.
//!
//! The relay greets with 12 bytes (`RTL0`, tuner type, gain count, both big
//! endian) and then streams raw cu8 samples. Commands are 5 bytes: an opcode
//! followed by a big endian u32 argument.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use tracing::{debug, info, warn};

use hdrx_core::error::{AcqError, AcqResult};
use hdrx_core::radio::SAMPLE_RATE_CU8;
use hdrx_core::{
    BackendKind, Delivery, DirectSampling, Freq, SampleFormat, SampleSink, Samples,
    TunerBackend, TunerCapabilities, TunerInfo,
};

use crate::gains::RtlTuner;

pub const DEFAULT_PORT: u16 = 1234;

const MAGIC: &[u8; 4] = b"RTL0";
const GREETING_LEN: usize = 12;
const CHUNK_BYTES: usize = 32 * 1024;
/// Socket read timeout; lets the read loop notice cancellation on a silent relay.
const READ_TIMEOUT: Duration = Duration::from_secs(1);
/// Timeouts in a row before a silent relay counts as lost.
const MAX_IDLE_READS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    SetFrequency = 0x01,
    SetSampleRate = 0x02,
    SetGainMode = 0x03,
    SetGain = 0x04,
    SetFreqCorrection = 0x05,
    SetDirectSampling = 0x09,
    SetOffsetTuning = 0x0a,
    SetBiasTee = 0x0e,
}

impl Command {
    pub fn encode(self, arg: u32) -> [u8; 5] {
        let mut out = [0u8; 5];
        out[0] = self as u8;
        out[1..].copy_from_slice(&arg.to_be_bytes());
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Greeting {
    pub tuner: RtlTuner,
    pub gain_count: u32,
}

impl Greeting {
    pub fn parse(raw: &[u8; GREETING_LEN]) -> AcqResult<Self> {
        if &raw[..4] != MAGIC {
            return Err(AcqError::Open("not an rtl_tcp relay (bad magic)".into()));
        }
        let tuner = u32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]);
        let gain_count = u32::from_be_bytes([raw[8], raw[9], raw[10], raw[11]]);
        Ok(Self {
            tuner: RtlTuner::from(tuner),
            gain_count,
        })
    }
}

/// Discard length after a configuration change: 250 ms of cu8 samples.
pub const fn reset_discard_bytes() -> usize {
    (SAMPLE_RATE_CU8 as usize / 4) * 2
}

pub struct RtlTcpTuner {
    info: TunerInfo,
    stream: TcpStream,
    greeting: Greeting,
    buf: Vec<u8>,
    filled: usize,
    idle_reads: u32,
    freq: Option<Freq>,
    gain: Option<f32>,
}

impl RtlTcpTuner {
    /// Connect to a relay at `host:port`.
    pub fn connect(addr: &str) -> AcqResult<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| AcqError::Open(format!("connect to {addr}: {e}")))?;
        info!("connected to rtl_tcp relay at {}", addr);
        Self::from_stream(stream, addr)
    }

    /// Take over an already connected socket and configure the relay.
    pub fn from_stream(mut stream: TcpStream, label: &str) -> AcqResult<Self> {
        let mut raw = [0u8; GREETING_LEN];
        stream
            .read_exact(&mut raw)
            .map_err(|e| AcqError::Open(format!("reading relay greeting: {e}")))?;
        let greeting = Greeting::parse(&raw)?;
        info!(
            "relay tuner {:?} with {} gain steps",
            greeting.tuner, greeting.gain_count
        );
        if let Err(e) = stream.set_nodelay(true) {
            warn!("relay: TCP_NODELAY not applied: {}", e);
        }
        stream.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut tuner = Self {
            info: TunerInfo {
                kind: BackendKind::NetworkRelay,
                driver: "rtltcp".into(),
                label: label.to_string(),
                format: SampleFormat::Cu8,
                delivery: Delivery::Pull,
                live: true,
                capabilities: TunerCapabilities {
                    auto_gain: !greeting.tuner.gains().is_empty(),
                    bias_tee: true,
                    antenna: false,
                    freq_correction: true,
                    direct_sampling: true,
                },
            },
            stream,
            greeting,
            buf: vec![0u8; CHUNK_BYTES],
            filled: 0,
            idle_reads: 0,
            freq: None,
            gain: None,
        };
        tuner
            .send(Command::SetSampleRate, SAMPLE_RATE_CU8)
            .map_err(|e| AcqError::Open(e.to_string()))?;
        tuner
            .send(Command::SetGainMode, 1)
            .map_err(|e| AcqError::Open(e.to_string()))?;
        tuner
            .send(Command::SetOffsetTuning, 1)
            .map_err(|e| AcqError::Open(e.to_string()))?;
        Ok(tuner)
    }

    pub fn greeting(&self) -> Greeting {
        self.greeting
    }

    fn send(&mut self, command: Command, arg: u32) -> AcqResult<()> {
        debug!("relay command {:?} {}", command, arg);
        self.stream.write_all(&command.encode(arg))?;
        Ok(())
    }

    /// One socket read. `Ok(None)` means the read timed out.
    fn read_some(&mut self, at: usize) -> AcqResult<Option<usize>> {
        loop {
            match self.stream.read(&mut self.buf[at..]) {
                Ok(n) => return Ok(Some(n)),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    return Ok(None)
                }
                Err(e) => return Err(AcqError::Io(e)),
            }
        }
    }
}

impl TunerBackend for RtlTcpTuner {
    fn info(&self) -> &TunerInfo {
        &self.info
    }

    fn set_frequency(&mut self, freq: Freq) -> AcqResult<()> {
        let hz = u32::try_from(freq.hz)
            .map_err(|_| AcqError::rejected(format!("{freq} is out of the relay's range")))?;
        self.send(Command::SetFrequency, hz)?;
        self.freq = Some(freq);
        Ok(())
    }

    fn frequency(&self) -> Option<Freq> {
        self.freq
    }

    fn set_gain(&mut self, gain_db: f32) -> AcqResult<()> {
        let tenths = (gain_db * 10.0).round() as i32;
        self.send(Command::SetGain, tenths as u32)?;
        self.gain = Some(gain_db);
        Ok(())
    }

    fn gain(&self) -> Option<f32> {
        self.gain
    }

    fn set_bias_tee(&mut self, on: bool) -> AcqResult<()> {
        self.send(Command::SetBiasTee, u32::from(on))
    }

    fn set_freq_correction(&mut self, ppm: i32) -> AcqResult<()> {
        self.send(Command::SetFreqCorrection, ppm as u32)
    }

    fn set_direct_sampling(&mut self, mode: DirectSampling) -> AcqResult<()> {
        self.send(Command::SetDirectSampling, mode.as_raw())
    }

    fn gain_table(&mut self) -> AcqResult<Vec<i32>> {
        let gains = self.greeting.tuner.gains();
        if gains.is_empty() {
            return Err(AcqError::GainTableUnavailable);
        }
        Ok(gains.to_vec())
    }

    /// There is no way to wait for samples taken after a change, so drop a
    /// fixed amount of the stream instead.
    fn reset_buffer(&mut self) -> AcqResult<()> {
        self.filled = 0;
        self.idle_reads = 0;
        let mut left = reset_discard_bytes();
        while left > 0 {
            let want = left.min(self.buf.len());
            match self.stream.read(&mut self.buf[..want]) {
                Ok(0) => return Err(AcqError::Read("relay closed the connection".into())),
                Ok(n) => left -= n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(AcqError::Read(format!("discarding samples: {e}"))),
            }
        }
        Ok(())
    }

    fn read_snapshot(&mut self, buf: &mut [u8]) -> AcqResult<usize> {
        self.stream
            .read_exact(buf)
            .map_err(|e| AcqError::Read(format!("gain snapshot: {e}")))?;
        Ok(buf.len())
    }

    fn read(&mut self, sink: &dyn SampleSink) -> AcqResult<()> {
        let n = match self.read_some(self.filled)? {
            Some(n) => n,
            None => {
                self.idle_reads += 1;
                if self.idle_reads >= MAX_IDLE_READS {
                    return Err(AcqError::Read("relay stopped sending samples".into()));
                }
                return Ok(());
            }
        };
        self.idle_reads = 0;
        if n == 0 {
            self.filled = 0;
            return Err(AcqError::Read("relay closed the connection".into()));
        }
        self.filled += n;

        let whole = self.filled & !3;
        if whole > 0 {
            sink.deliver(Samples::Cu8(&self.buf[..whole]));
            self.buf.copy_within(whole..self.filled, 0);
            self.filled -= whole;
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("relay shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::Mutex;
    use std::thread::{self, JoinHandle};

    use super::*;

    fn greeting(tuner: u32, gains: u32) -> Vec<u8> {
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&tuner.to_be_bytes());
        out.extend_from_slice(&gains.to_be_bytes());
        out
    }

    /// Fake relay: greets, collects `commands` commands, streams `payload`,
    /// then closes the connection.
    fn relay(
        hello: Vec<u8>,
        commands: usize,
        payload: Vec<u8>,
    ) -> (String, JoinHandle<Vec<[u8; 5]>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr").to_string();
        let handle = thread::spawn(move || {
            let (mut conn, _) = listener.accept().expect("accept");
            conn.write_all(&hello).expect("greet");
            let mut seen = Vec::new();
            for _ in 0..commands {
                let mut cmd = [0u8; 5];
                conn.read_exact(&mut cmd).expect("command");
                seen.push(cmd);
            }
            conn.write_all(&payload).expect("payload");
            seen
        });
        (addr, handle)
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<u8>>);

    impl SampleSink for Collect {
        fn deliver(&self, samples: Samples<'_>) {
            if let Samples::Cu8(data) = samples {
                self.0.lock().unwrap().extend_from_slice(data);
            }
        }

        fn is_cancelled(&self) -> bool {
            false
        }

        fn device_lost(&self, _reason: &str) {}
    }

    #[test]
    fn commands_are_five_bytes_big_endian() {
        assert_eq!(
            Command::SetFrequency.encode(90_100_000),
            [0x01, 0x05, 0x5e, 0xd1, 0x20]
        );
        assert_eq!(Command::SetBiasTee.encode(1), [0x0e, 0, 0, 0, 1]);
        assert_eq!(Command::SetGain.encode(-10i32 as u32), [0x04, 0xff, 0xff, 0xff, 0xf6]);
    }

    #[test]
    fn greeting_requires_magic() {
        let mut raw = [0u8; GREETING_LEN];
        raw.copy_from_slice(&greeting(5, 29));
        let parsed = Greeting::parse(&raw).expect("greeting");
        assert_eq!(parsed.tuner, RtlTuner::R820t);
        assert_eq!(parsed.gain_count, 29);

        raw[0] = b'X';
        assert!(matches!(Greeting::parse(&raw), Err(AcqError::Open(_))));
    }

    #[test]
    fn open_configures_relay_then_streams() {
        let payload: Vec<u8> = (0..=201).map(|v| v as u8).collect();
        let (addr, server) = relay(greeting(5, 29), 5, payload.clone());

        let mut tuner = RtlTcpTuner::connect(&addr).expect("connect");
        assert_eq!(tuner.info().kind, BackendKind::NetworkRelay);
        assert_eq!(tuner.gain_table().expect("gains").len(), 29);
        tuner.set_frequency(Freq::new(90_100_000)).expect("tune");
        tuner.set_gain(19.7).expect("gain");

        let sink = Collect::default();
        let err = loop {
            if let Err(e) = tuner.read(&sink) {
                break e;
            }
        };
        assert!(err.is_read_failure());
        // 202 bytes: the two trailing bytes never form a group.
        assert_eq!(*sink.0.lock().unwrap(), payload[..200].to_vec());

        let seen = server.join().expect("server");
        assert_eq!(seen[0], Command::SetSampleRate.encode(SAMPLE_RATE_CU8));
        assert_eq!(seen[1], Command::SetGainMode.encode(1));
        assert_eq!(seen[2], Command::SetOffsetTuning.encode(1));
        assert_eq!(seen[3], Command::SetFrequency.encode(90_100_000));
        assert_eq!(seen[4], Command::SetGain.encode(197));
        assert_eq!(tuner.gain(), Some(19.7));
    }

    #[test]
    fn unknown_tuner_has_no_gain_table() {
        let (addr, server) = relay(greeting(0, 0), 3, Vec::new());
        let mut tuner = RtlTcpTuner::connect(&addr).expect("connect");
        assert!(matches!(tuner.gain_table(), Err(AcqError::GainTableUnavailable)));
        assert!(!tuner.info().capabilities.auto_gain);
        server.join().expect("server");
    }

    #[test]
    fn bad_greeting_fails_open() {
        let (addr, server) = relay(b"HTTP/1.1 200".to_vec(), 0, Vec::new());
        assert!(matches!(RtlTcpTuner::connect(&addr), Err(AcqError::Open(_))));
        server.join().expect("server");
    }

    #[test]
    fn out_of_range_frequency_is_rejected() {
        let (addr, server) = relay(greeting(5, 29), 3, Vec::new());
        let mut tuner = RtlTcpTuner::connect(&addr).expect("connect");
        let err = tuner.set_frequency(Freq::new(5_000_000_000)).expect_err("range");
        assert!(matches!(err, AcqError::Rejected(_)));
        server.join().expect("server");
    }

    #[test]
    fn reset_discards_quarter_second() {
        assert_eq!(reset_discard_bytes(), 744_186);
        let payload = vec![7u8; reset_discard_bytes() + 8];
        let (addr, server) = relay(greeting(1, 14), 3, payload);
        let mut tuner = RtlTcpTuner::connect(&addr).expect("connect");
        tuner.reset_buffer().expect("reset");
        let mut snapshot = [0u8; 8];
        assert_eq!(tuner.read_snapshot(&mut snapshot).expect("snapshot"), 8);
        assert_eq!(snapshot, [7u8; 8]);
        server.join().expect("server");
    }

    #[test]
    fn reset_clears_idle_count() {
        let payload = vec![7u8; reset_discard_bytes()];
        let (addr, server) = relay(greeting(5, 29), 3, payload);
        let mut tuner = RtlTcpTuner::connect(&addr).expect("connect");
        // timeouts left over from the previous session
        tuner.idle_reads = MAX_IDLE_READS - 1;
        tuner.reset_buffer().expect("reset");
        assert_eq!(tuner.idle_reads, 0);
        server.join().expect("server");
    }
}

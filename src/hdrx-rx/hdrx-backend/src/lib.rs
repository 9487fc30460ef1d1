// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use hdrx_core::error::{AcqError, AcqResult};
use hdrx_core::pipeline::Pipeline;
use hdrx_core::{Receiver, Reporter, SampleFormat, TunerBackend};

pub mod cs8;
pub mod file;
#[cfg(feature = "hackrf")]
pub mod hackrf;
pub mod gains;
#[cfg(feature = "rtlsdr")]
pub mod rtlsdr;
pub mod rtltcp;
pub mod sdrplay;

pub use file::FileReplay;
pub use rtltcp::RtlTcpTuner;
#[cfg(feature = "soapysdr")]
pub use hdrx_backend_soapysdr::SoapyTuner;

/// Connection details for instantiating a tuner backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TunerAccess {
    /// USB dongle by device index.
    Usb { index: u32 },
    /// rtl_tcp relay at `host[:port]`.
    Tcp { addr: String },
    /// Vendor streaming device, optionally selected by serial number.
    Vendor { serial: Option<String> },
    /// Generic radio library device arguments plus optional per-element gains.
    Sdr { args: String, gains: Option<String> },
    /// Recorded samples; "-" reads stdin.
    File { path: PathBuf, format: SampleFormat },
}

pub type BackendFactory = fn(TunerAccess) -> AcqResult<Box<dyn TunerBackend>>;

/// Context for registering and instantiating tuner backends.
#[derive(Clone)]
pub struct RegistrationContext {
    factories: HashMap<String, BackendFactory>,
}

impl RegistrationContext {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory under a stable name (e.g. "rtltcp").
    pub fn register_backend(&mut self, name: &str, factory: BackendFactory) {
        self.factories.insert(normalize_name(name), factory);
    }

    pub fn is_backend_registered(&self, name: &str) -> bool {
        self.factories.contains_key(&normalize_name(name))
    }

    /// Registered backend names, sorted.
    pub fn registered_backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Instantiate a tuner backend based on the selected name and access method.
    pub fn build_tuner(&self, name: &str, access: TunerAccess) -> AcqResult<Box<dyn TunerBackend>> {
        let factory = self
            .factories
            .get(&normalize_name(name))
            .ok_or_else(|| AcqError::Open(format!("unknown tuner backend: {name}")))?;
        factory(access)
    }

    /// Merge another registration context into this one.
    pub fn extend_from(&mut self, other: &RegistrationContext) {
        for (name, factory) in &other.factories {
            self.factories.insert(name.clone(), *factory);
        }
    }
}

impl Default for RegistrationContext {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_name(name: &str) -> String {
    name.to_ascii_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

/// Register all built-in backends enabled by features on a context.
pub fn register_builtin_backends_on(context: &mut RegistrationContext) {
    context.register_backend("file", file_factory);
    context.register_backend("rtltcp", rtltcp_factory);
    #[cfg(feature = "rtlsdr")]
    context.register_backend("rtlsdr", rtlsdr_factory);
    #[cfg(feature = "hackrf")]
    context.register_backend("hackrf", hackrf_factory);
    #[cfg(feature = "sdrplay")]
    context.register_backend("sdrplay", sdrplay_factory);
    #[cfg(feature = "soapysdr")]
    context.register_backend("soapysdr", soapysdr_factory);
}

/// Open the reader behind a file access path, with "-" meaning stdin.
pub fn open_reader(path: &std::path::Path) -> io::Result<Box<dyn Read + Send>> {
    if path.as_os_str() == "-" {
        Ok(Box::new(BufReader::new(io::stdin())))
    } else {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

/// Open a receiver that replays recorded samples from `reader`.
pub fn open_from_file<R, F>(reader: R, format: SampleFormat, pipeline: F) -> AcqResult<Receiver>
where
    R: Read + Send + 'static,
    F: FnOnce(&Reporter) -> Box<dyn Pipeline>,
{
    Receiver::open(Box::new(FileReplay::new(Box::new(reader), format)), pipeline)
}

fn wrong_access(backend: &str, expected: &str) -> AcqError {
    AcqError::Open(format!("{backend} backend requires {expected} access"))
}

fn file_factory(access: TunerAccess) -> AcqResult<Box<dyn TunerBackend>> {
    match access {
        TunerAccess::File { path, format } => {
            let reader = open_reader(&path)
                .map_err(|e| AcqError::Open(format!("{}: {e}", path.display())))?;
            Ok(Box::new(FileReplay::new(reader, format).with_label(path.display().to_string())))
        }
        _ => Err(wrong_access("file", "File")),
    }
}

fn rtltcp_factory(access: TunerAccess) -> AcqResult<Box<dyn TunerBackend>> {
    match access {
        TunerAccess::Tcp { addr } => Ok(Box::new(RtlTcpTuner::connect(&addr)?)),
        _ => Err(wrong_access("rtltcp", "Tcp")),
    }
}

#[cfg(feature = "rtlsdr")]
fn rtlsdr_factory(access: TunerAccess) -> AcqResult<Box<dyn TunerBackend>> {
    match access {
        TunerAccess::Usb { index } => Ok(Box::new(rtlsdr::RtlSdrTuner::open(index)?)),
        _ => Err(wrong_access("rtlsdr", "Usb")),
    }
}

#[cfg(feature = "hackrf")]
fn hackrf_factory(access: TunerAccess) -> AcqResult<Box<dyn TunerBackend>> {
    match access {
        TunerAccess::Vendor { serial } => {
            Ok(Box::new(hackrf::HackrfTuner::open(serial.as_deref())?))
        }
        _ => Err(wrong_access("hackrf", "Vendor")),
    }
}

#[cfg(feature = "sdrplay")]
fn sdrplay_factory(access: TunerAccess) -> AcqResult<Box<dyn TunerBackend>> {
    match access {
        TunerAccess::Vendor { serial } => {
            Ok(Box::new(sdrplay::SdrplayTuner::open(serial.as_deref())?))
        }
        _ => Err(wrong_access("sdrplay", "Vendor")),
    }
}

#[cfg(feature = "soapysdr")]
fn soapysdr_factory(access: TunerAccess) -> AcqResult<Box<dyn TunerBackend>> {
    match access {
        TunerAccess::Sdr { args, gains } => {
            Ok(Box::new(SoapyTuner::open(&args, gains.as_deref())?))
        }
        _ => Err(wrong_access("soapysdr", "Sdr")),
    }
}

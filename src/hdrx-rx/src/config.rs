// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for hdrx-rx.
//!
//! Config is loaded from the `[hdrx-rx]` section of `hdrx.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./hdrx.toml`
//! 3. `~/.config/hdrx/hdrx.toml`
//! 4. `/etc/hdrx/hdrx.toml`

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use hdrx_app::ConfigFile;
use hdrx_backend::TunerAccess;
use hdrx_core::{DirectSampling, Freq, Mode};

/// Highest audio program number a station can carry.
pub const MAX_PROGRAM: u32 = 7;
/// Some tuner gain tables start below 0 dB (FC0012 at -9.9 dB).
const MIN_GAIN_DB: f32 = -20.0;
const MAX_GAIN_DB: f32 = 100.0;
const MAX_PPM: i32 = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RxConfig {
    pub general: GeneralConfig,
    pub tuner: TunerConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    /// Backend name (file, rtltcp, rtlsdr, hackrf, soapysdr)
    pub backend: Option<String>,
    /// How to reach the selected backend
    pub access: Option<TunerAccess>,
    /// Center frequency; values below 10000 are MHz, otherwise Hz
    pub frequency: Option<f64>,
    /// Audio program to output
    pub program: u32,
    /// Fixed gain in dB; automatic gain when unset
    pub gain_db: Option<f32>,
    /// Frequency correction in ppm
    pub ppm: i32,
    pub bias_tee: bool,
    pub antenna: Option<String>,
    pub direct_sampling: DirectSampling,
    pub mode: Mode,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            backend: None,
            access: None,
            frequency: None,
            program: 0,
            gain_db: None,
            ppm: 0,
            bias_tee: false,
            antenna: None,
            direct_sampling: DirectSampling::Off,
            mode: Mode::Fm,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print events as JSON lines on stdout instead of logging them
    pub json: bool,
    /// Write the selected program's audio to this WAV file
    pub wav: Option<PathBuf>,
    /// Play the selected program's audio on an output device
    pub playback: bool,
    /// Output device name; the default device when unset
    pub device: Option<String>,
}

impl TunerConfig {
    /// Parsed center frequency, if one is configured and valid.
    pub fn freq(&self) -> Option<Freq> {
        self.frequency.and_then(Freq::from_user)
    }
}

impl RxConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(level) = self.general.log_level.as_deref() {
            if level.trim().parse::<tracing::Level>().is_err() {
                return Err(format!("[general].log_level '{level}' is not a log level"));
            }
        }

        let tuner = &self.tuner;
        if let Some(freq) = tuner.frequency {
            if Freq::from_user(freq).is_none() {
                return Err(format!("[tuner].frequency {freq} is not a valid frequency"));
            }
        }
        if tuner.program > MAX_PROGRAM {
            return Err(format!(
                "[tuner].program {} out of range (0-{MAX_PROGRAM})",
                tuner.program
            ));
        }
        if let Some(gain) = tuner.gain_db {
            if !(MIN_GAIN_DB..=MAX_GAIN_DB).contains(&gain) {
                return Err(format!(
                    "[tuner].gain_db {gain} out of range ({MIN_GAIN_DB} to {MAX_GAIN_DB})"
                ));
            }
        }
        if tuner.ppm.abs() > MAX_PPM {
            return Err(format!("[tuner].ppm {} out of range (±{MAX_PPM})", tuner.ppm));
        }
        if let Some(TunerAccess::Tcp { addr }) = &tuner.access {
            if addr.trim().is_empty() {
                return Err("[tuner.access].addr must not be empty".to_string());
            }
        }

        if self.output.device.is_some() && !self.output.playback {
            return Err("[output].device is set but [output].playback is disabled".to_string());
        }
        Ok(())
    }

    /// Example configuration wrapped in its `[hdrx-rx]` section.
    pub fn example_combined_toml() -> String {
        #[derive(serde::Serialize)]
        struct Wrapper {
            #[serde(rename = "hdrx-rx")]
            inner: RxConfig,
        }
        let example = RxConfig {
            general: GeneralConfig {
                log_level: Some("info".to_string()),
            },
            tuner: TunerConfig {
                backend: Some("rtltcp".to_string()),
                access: Some(TunerAccess::Tcp {
                    addr: "127.0.0.1:1234".to_string(),
                }),
                frequency: Some(90.1),
                ..TunerConfig::default()
            },
            output: OutputConfig {
                wav: Some(PathBuf::from("hdrx.wav")),
                ..OutputConfig::default()
            },
        };
        toml::to_string_pretty(&Wrapper { inner: example }).unwrap_or_default()
    }
}

impl ConfigFile for RxConfig {
    fn section_key() -> &'static str {
        "hdrx-rx"
    }

    fn validate(&self) -> Result<(), String> {
        RxConfig::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdrx_core::SampleFormat;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_config() {
        let config = RxConfig::default();
        assert!(config.general.log_level.is_none());
        assert!(config.tuner.backend.is_none());
        assert_eq!(config.tuner.program, 0);
        assert_eq!(config.tuner.mode, Mode::Fm);
        assert!(!config.output.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_tuner_section() {
        let toml_str = r#"
[general]
log_level = "debug"

[tuner]
backend = "rtltcp"
frequency = 90.1
program = 1
ppm = -12
bias_tee = true

[tuner.access]
type = "tcp"
addr = "radio.local:1234"

[output]
json = true
"#;
        let config: RxConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level.as_deref(), Some("debug"));
        assert_eq!(config.tuner.backend.as_deref(), Some("rtltcp"));
        assert_eq!(config.tuner.freq(), Some(Freq::new(90_100_000)));
        assert_eq!(config.tuner.program, 1);
        assert_eq!(config.tuner.ppm, -12);
        assert!(config.tuner.bias_tee);
        assert_eq!(
            config.tuner.access,
            Some(TunerAccess::Tcp {
                addr: "radio.local:1234".into()
            })
        );
        assert!(config.output.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_file_access() {
        let toml_str = r#"
[tuner]
backend = "file"
mode = "am"
direct_sampling = "q"

[tuner.access]
type = "file"
path = "capture.cs16"
format = "cs16"
"#;
        let config: RxConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.tuner.mode, Mode::Am);
        assert_eq!(config.tuner.direct_sampling, DirectSampling::Q);
        assert_eq!(
            config.tuner.access,
            Some(TunerAccess::File {
                path: PathBuf::from("capture.cs16"),
                format: SampleFormat::Cs16,
            })
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RxConfig::default();
        config.tuner.program = 8;
        assert!(config.validate().is_err());

        let mut config = RxConfig::default();
        config.tuner.gain_db = Some(-30.0);
        assert!(config.validate().is_err());

        let mut config = RxConfig::default();
        config.tuner.gain_db = Some(-4.0);
        assert!(config.validate().is_ok());

        let mut config = RxConfig::default();
        config.tuner.frequency = Some(-1.0);
        assert!(config.validate().is_err());

        let mut config = RxConfig::default();
        config.general.log_level = Some("loud".into());
        assert!(config.validate().is_err());

        let mut config = RxConfig::default();
        config.output.device = Some("pulse".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_example_combined_toml_parses() {
        let example = RxConfig::example_combined_toml();
        let table: toml::Table = toml::from_str(&example).unwrap();
        let section = toml::to_string(table.get("hdrx-rx").unwrap()).unwrap();
        let config: RxConfig = toml::from_str(&section).unwrap();
        assert_eq!(config.tuner.backend.as_deref(), Some("rtltcp"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let file = write_config("[hdrx-rx.tuner]\nfrequency = 101100000\nprogram = 2\n");
        let (config, path) = RxConfig::load(Some(file.path())).unwrap();
        assert_eq!(path.as_deref(), Some(file.path()));
        assert_eq!(config.tuner.freq(), Some(Freq::new(101_100_000)));
        assert_eq!(config.tuner.program, 2);
    }

    #[test]
    fn test_load_rejects_invalid_section() {
        let file = write_config("[hdrx-rx.tuner]\nprogram = 12\n");
        assert!(RxConfig::load(Some(file.path())).is_err());
    }
}

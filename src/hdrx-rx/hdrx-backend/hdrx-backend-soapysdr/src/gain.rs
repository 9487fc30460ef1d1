// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::fmt;

/// One entry of a `name=value,...` gain settings string.
#[derive(Debug, Clone, PartialEq)]
pub enum GainSetting {
    /// `AGC=0|1` switches the device's own gain control.
    Agc(bool),
    /// A named gain element (e.g. `LNA=24`) in dB.
    Element { name: String, value_db: f64 },
}

impl fmt::Display for GainSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GainSetting::Agc(on) => write!(f, "AGC={}", u8::from(*on)),
            GainSetting::Element { name, value_db } => write!(f, "{name}={value_db}"),
        }
    }
}

/// Parse a gain settings string such as `"LNA=24, VGA=20"` or `"AGC=1"`.
///
/// Entries are separated by commas, slashes or spaces.
pub fn parse_gain_settings(input: &str) -> Result<Vec<GainSetting>, String> {
    input
        .split([',', '/', ' '])
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, value) = entry
                .split_once('=')
                .ok_or_else(|| format!("gain setting '{entry}' is not name=value"))?;
            let name = name.trim();
            if name.is_empty() {
                return Err(format!("gain setting '{entry}' has no name"));
            }
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|_| format!("gain setting '{entry}' has a bad value"))?;
            if name.eq_ignore_ascii_case("agc") {
                Ok(GainSetting::Agc(value != 0.0))
            } else {
                Ok(GainSetting::Element {
                    name: name.to_string(),
                    value_db: value,
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_elements_and_agc() {
        let parsed = parse_gain_settings("AGC=0, LNA=24/VGA=20.5").expect("parse");
        assert_eq!(
            parsed,
            vec![
                GainSetting::Agc(false),
                GainSetting::Element {
                    name: "LNA".into(),
                    value_db: 24.0
                },
                GainSetting::Element {
                    name: "VGA".into(),
                    value_db: 20.5
                },
            ]
        );
    }

    #[test]
    fn empty_string_means_no_settings() {
        assert!(parse_gain_settings("").expect("parse").is_empty());
        assert!(parse_gain_settings(" , ").expect("parse").is_empty());
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(parse_gain_settings("LNA").is_err());
        assert!(parse_gain_settings("=3").is_err());
        assert!(parse_gain_settings("LNA=loud").is_err());
    }

    #[test]
    fn display_round_trips_through_parser() {
        let settings = vec![
            GainSetting::Agc(true),
            GainSetting::Element {
                name: "TUNER".into(),
                value_db: 12.5,
            },
        ];
        let text = settings
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        assert_eq!(text, "AGC=1,TUNER=12.5");
        assert_eq!(parse_gain_settings(&text).expect("parse"), settings);
    }
}

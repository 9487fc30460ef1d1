// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Station information guide: the table of services and their components.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigServiceType {
    Audio,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ComponentKind {
    Audio {
        port: u16,
        audio_type: u8,
        mime: u32,
    },
    Data {
        port: u16,
        service_data_type: u16,
        data_type: u8,
        mime: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigComponent {
    pub id: u8,
    #[serde(flatten)]
    pub kind: ComponentKind,
}

impl SigComponent {
    pub fn port(&self) -> u16 {
        match self.kind {
            ComponentKind::Audio { port, .. } | ComponentKind::Data { port, .. } => port,
        }
    }

    pub fn mime(&self) -> u32 {
        match self.kind {
            ComponentKind::Audio { mime, .. } | ComponentKind::Data { mime, .. } => mime,
        }
    }

    pub fn is_data(&self) -> bool {
        matches!(self.kind, ComponentKind::Data { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigService {
    #[serde(rename = "type")]
    pub service_type: SigServiceType,
    pub number: u16,
    pub name: String,
    pub components: Vec<SigComponent>,
}

impl SigService {
    /// The service's audio component, if it carries one.
    pub fn audio_component(&self) -> Option<&SigComponent> {
        self.components
            .iter()
            .find(|c| matches!(c.kind, ComponentKind::Audio { .. }))
    }
}

/// Immutable snapshot of the service table.
///
/// Every rebuild produces a new table with a higher generation, so a consumer
/// holding on to an older generation can tell it is stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigTable {
    pub generation: u64,
    pub services: Vec<SigService>,
}

impl SigTable {
    pub fn new(generation: u64, services: Vec<SigService>) -> Self {
        Self {
            generation,
            services,
        }
    }

    /// Find the data component bound to `port` and the service owning it.
    pub fn find_data_port(&self, port: u16) -> Option<(&SigService, &SigComponent)> {
        self.services.iter().find_map(|service| {
            service
                .components
                .iter()
                .find(|c| c.is_data() && c.port() == port)
                .map(|c| (service, c))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_services() -> Vec<SigService> {
        vec![
            SigService {
                service_type: SigServiceType::Audio,
                number: 1,
                name: "MPS".into(),
                components: vec![
                    SigComponent {
                        id: 0,
                        kind: ComponentKind::Audio {
                            port: 0,
                            audio_type: 0,
                            mime: 0x4DC6_6C5A,
                        },
                    },
                    SigComponent {
                        id: 1,
                        kind: ComponentKind::Data {
                            port: 0x1000,
                            service_data_type: 0,
                            data_type: 1,
                            mime: 0xBE4B_7536,
                        },
                    },
                ],
            },
            SigService {
                service_type: SigServiceType::Data,
                number: 2,
                name: "Traffic".into(),
                components: vec![SigComponent {
                    id: 0,
                    kind: ComponentKind::Data {
                        port: 0x2000,
                        service_data_type: 65,
                        data_type: 3,
                        mime: 0x82F0_3DFC,
                    },
                }],
            },
        ]
    }

    #[test]
    fn port_lookup_only_matches_data_components() {
        let table = SigTable::new(1, sample_services());
        let (service, component) = table.find_data_port(0x2000).unwrap();
        assert_eq!(service.name, "Traffic");
        assert_eq!(component.mime(), 0x82F0_3DFC);
        // port 0 belongs to an audio component
        assert!(table.find_data_port(0).is_none());
        assert!(table.find_data_port(0x3000).is_none());
    }

    #[test]
    fn audio_component_lookup() {
        let services = sample_services();
        assert_eq!(services[0].audio_component().map(|c| c.id), Some(0));
        assert!(services[1].audio_component().is_none());
    }
}

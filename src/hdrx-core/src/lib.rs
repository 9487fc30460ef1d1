// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod agc;
pub mod audio;
pub mod error;
pub mod event;
pub mod normalize;
pub mod pipeline;
pub mod radio;
pub mod receiver;
pub mod tuner;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use audio::{AudioFiller, AudioPool, AudioSink};
pub use error::{AcqError, AcqResult};
pub use event::{Event, EventRecord, Reporter};
pub use pipeline::Pipeline;
pub use radio::{DirectSampling, Freq, GainMode, Mode, SampleFormat};
pub use receiver::Receiver;
pub use tuner::{
    BackendKind, Delivery, SampleSink, Samples, TunerBackend, TunerCapabilities, TunerInfo,
};

/// Library version string.
#[must_use]
pub fn version() -> &'static str {
    concat!("hdrx ", env!("CARGO_PKG_VERSION"))
}

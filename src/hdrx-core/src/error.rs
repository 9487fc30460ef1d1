// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use thiserror::Error;

/// Errors raised by tuner backends and the receiver handle.
#[derive(Debug, Error)]
pub enum AcqError {
    /// Bad parameter or an operation invalid in the current state.
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("failed to open tuner: {0}")]
    Open(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("end of input")]
    EndOfInput,
    #[error("gain table unavailable")]
    GainTableUnavailable,
    #[error("{0} is not supported by this tuner")]
    Unsupported(&'static str),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type AcqResult<T> = Result<T, AcqError>;

impl AcqError {
    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    /// True for failures that mean the sample source is gone.
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Self::Read(_) | Self::EndOfInput | Self::Io(_))
    }

    /// Fold capability errors into plain rejections for callers of the receiver.
    pub(crate) fn into_rejected(self) -> Self {
        match self {
            Self::Unsupported(what) => Self::Rejected(format!("{what} is not supported")),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_maps_to_rejected() {
        let err = AcqError::Unsupported("bias tee").into_rejected();
        assert!(matches!(err, AcqError::Rejected(ref msg) if msg.contains("bias tee")));
    }

    #[test]
    fn read_failures_classified() {
        assert!(AcqError::EndOfInput.is_read_failure());
        assert!(AcqError::Read("usb".into()).is_read_failure());
        assert!(!AcqError::rejected("busy").is_read_failure());
    }
}

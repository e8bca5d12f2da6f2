// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {std::path::PathBuf, thiserror::Error};

/// Primary crate error type.
///
/// Rule evaluation has no variant. Evaluating a loaded rule against extracted
/// facts cannot fail.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("malformed artifact {}: {reason}", path.display())]
    MalformedArtifact { path: PathBuf, reason: String },

    #[error("invalid rule {rule}: {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("I/O error on {}: {source:?}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse dependency expression: {0}")]
    DependencyParse(String),

    #[error("malformed package index: {0}")]
    ControlParse(String),

    #[error("invalid package version: {0}")]
    Version(String),
}

impl ScanError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::MalformedArtifact {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn invalid_rule(rule: impl ToString, reason: impl ToString) -> Self {
        Self::InvalidRule {
            rule: rule.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, ScanError>;

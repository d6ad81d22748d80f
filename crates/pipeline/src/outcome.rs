use derive_more::Display;

/// Result of running one archive through the [`Pipeline`](crate::Pipeline).
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum Outcome {
    /// Not a manifest package. A normal outcome, not an error.
    #[display("skip-invalid")]
    SkipInvalid,
    /// The mirror destination received new bytes.
    #[display("copied")]
    Copied,
    /// The mirror destination already held identical bytes.
    #[display("exists-identical")]
    ExistsIdentical,
    /// Cleaning worked but the mirror copy did not.
    #[display("copy-failed: {_0}")]
    CopyFailed(String),
    /// Cleaning failed; nothing was copied.
    #[display("error")]
    Error(String),
}

impl Outcome {
    /// Value of the audit log `result` column.
    pub fn audit_result(&self) -> String {
        match self {
            Self::SkipInvalid => "skip_invalid".to_string(),
            other => other.to_string(),
        }
    }

    /// `true` when the archive went all the way through to the mirror.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Copied | Self::ExistsIdentical)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

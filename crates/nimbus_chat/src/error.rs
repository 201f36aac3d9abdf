//! Error types for the chat system.

use nimbus_core::CoreError;
use nimbus_realtime::RealtimeError;
use thiserror::Error;

use crate::rules::StepId;

/// Result type for chat operations
pub type ChatResult<T> = Result<T, ChatError>;

/// Chat system errors
#[derive(Error, Debug)]
pub enum ChatError {
    /// Blocked client-side before any network call
    #[error("{0}")]
    Validation(String),

    #[error("'{label}' is required in the {step} step")]
    MissingField {
        step: StepId,
        field: String,
        label: String,
    },

    #[error("The requirements wizard is not open")]
    WizardClosed,

    #[error("Chat input is disabled while the requirements wizard is open")]
    InputDisabled,

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Realtime(#[from] RealtimeError),
}

impl ChatError {
    /// Whether the error was raised client-side without contacting the backend.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::MissingField { .. } | Self::WizardClosed | Self::InputDisabled
        )
    }
}

//! What the presentation layer should show for a container's current state.

use crate::{
    error::{ErrorKind, InputField},
    state::AsyncResult,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Success,
    Error,
}

/// Transient, dismissible notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

/// Texts used by [`Feedback::from_state`] for one screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackMessages {
    /// Toast on success; `None` shows nothing.
    pub success: Option<&'static str>,
    /// Replaces the error message of non-validation failures.
    pub failure_override: Option<&'static str>,
}

impl FeedbackMessages {
    pub const SIGN_UP: FeedbackMessages = FeedbackMessages {
        success: Some("Account created successfully"),
        failure_override: None,
    };
    pub const SIGN_IN: FeedbackMessages = FeedbackMessages {
        success: None,
        failure_override: None,
    };
    pub const PROFILE_PICTURE: FeedbackMessages = FeedbackMessages {
        success: Some("Profile picture updated successfully"),
        failure_override: Some("Something goes wrong! Try again later"),
    };
    pub const SILENT: FeedbackMessages = FeedbackMessages {
        success: None,
        failure_override: None,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Feedback {
    pub toast: Option<Toast>,
    /// Persistent mark on the offending input of a validation failure.
    pub inline: Option<(InputField, String)>,
    /// Trigger should be disabled and a progress indicator shown.
    pub busy: bool,
}

impl Feedback {
    pub fn from_state<T>(state: &AsyncResult<T>, messages: &FeedbackMessages) -> Self {
        match state {
            AsyncResult::Idle => Self::default(),
            AsyncResult::Loading => Self {
                busy: true,
                ..Self::default()
            },
            AsyncResult::Success(_) => Self {
                toast: messages.success.map(|message| Toast {
                    level: ToastLevel::Success,
                    message: message.to_string(),
                }),
                ..Self::default()
            },
            AsyncResult::Failure(error) => {
                let message = match messages.failure_override {
                    Some(text) if error.kind() != ErrorKind::Validation => text.to_string(),
                    _ => error.message().to_string(),
                };
                Self {
                    inline: error
                        .field()
                        .filter(|_| error.is_validation())
                        .map(|field| (field, error.message().to_string())),
                    toast: Some(Toast {
                        level: ToastLevel::Error,
                        message,
                    }),
                    busy: false,
                }
            }
        }
    }
}

//! Notification rendering and fan-out delivery.

pub mod dispatch;
pub mod error;
pub mod format;

pub use dispatch::{dispatch, DispatchOutcome, Notifier};
pub use error::DeliveryError;
pub use format::{render, status_emoji, status_tone, Notification, Tone};

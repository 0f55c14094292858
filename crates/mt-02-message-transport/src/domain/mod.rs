//! Transport domain: options, validation, retry policy and errors.

pub mod errors;
pub mod options;
pub mod retry;
pub mod validation;

pub use errors::{TransportCause, TransportError};
pub use options::{CreatedMessage, MessageOptions};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use validation::{validate_content_size, validate_options};

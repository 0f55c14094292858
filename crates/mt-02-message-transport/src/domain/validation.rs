//! Pre-write checks on message options and content.

use super::errors::TransportError;
use super::options::MessageOptions;

/// Reject empty type/sender and recipient lists over `max_recipients`.
pub fn validate_options(options: &MessageOptions, max_recipients: usize) -> Result<(), TransportError> {
    if options.message_type.trim().is_empty() {
        return Err(TransportError::validation("message_type", "must not be empty"));
    }
    if options.sender_id.trim().is_empty() {
        return Err(TransportError::validation("sender_id", "must not be empty"));
    }
    if options.recipients.len() > max_recipients {
        return Err(TransportError::validation(
            "recipients",
            format!(
                "{} recipients exceeds the maximum of {max_recipients}",
                options.recipients.len()
            ),
        ));
    }
    Ok(())
}

/// Reject content longer than `max_size` bytes.
pub fn validate_content_size(len: usize, max_size: usize) -> Result<(), TransportError> {
    if len > max_size {
        return Err(TransportError::validation(
            "content",
            format!("{len} bytes exceeds the maximum of {max_size}"),
        ));
    }
    Ok(())
}

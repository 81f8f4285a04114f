use std::fmt;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Which end of a relay a channel id refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRole {
    Source,
    Target,
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelRole::Source => f.write_str("source"),
            ChannelRole::Target => f.write_str("target"),
        }
    }
}

/// Relay engine errors
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The source channel already has a relay
    #[error("a relay is already active for source channel {source_id}")]
    AlreadyActive { source_id: String },

    /// A channel could not be resolved on the remote platform
    #[error("invalid {role} channel: {channel_id}")]
    InvalidChannel { role: ChannelRole, channel_id: String },

    /// No usable webhook could be found or created in the target channel
    #[error("failed to provision a webhook in channel {target_id}: {message}; check permissions in the target channel")]
    EndpointProvisionFailure { target_id: String, message: String },

    /// A single message could not be delivered
    #[error("delivery to {target_id} failed: {message}")]
    DeliveryFailure { target_id: String, message: String },

    /// A saved relay could not be restored at startup
    #[error("failed to restore relay for {source_id}: {reason}")]
    RestorationFailure { source_id: String, reason: String },

    /// Reading or writing the state file failed
    #[error("relay store error: {0}")]
    Store(#[from] std::io::Error),

    /// State could not be serialized
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl RelayError {
    #[must_use]
    pub fn invalid_channel(role: ChannelRole, channel_id: impl Into<String>) -> Self {
        Self::InvalidChannel {
            role,
            channel_id: channel_id.into(),
        }
    }

    #[must_use]
    pub fn provision(target_id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::EndpointProvisionFailure {
            target_id: target_id.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn delivery(target_id: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::DeliveryFailure {
            target_id: target_id.into(),
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn restoration(source_id: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::RestorationFailure {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors the operator can fix and should be told about
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            RelayError::AlreadyActive { .. }
                | RelayError::InvalidChannel { .. }
                | RelayError::EndpointProvisionFailure { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_classification() {
        let already = RelayError::AlreadyActive {
            source_id: "1".to_string(),
        };
        assert!(already.is_user_facing());
        assert!(RelayError::invalid_channel(ChannelRole::Target, "2").is_user_facing());
        assert!(!RelayError::delivery("2", "timeout").is_user_facing());
        assert!(!RelayError::restoration("1", "gone").is_user_facing());
    }

    #[test]
    fn test_invalid_channel_message() {
        let err = RelayError::invalid_channel(ChannelRole::Source, "42");
        assert_eq!(err.to_string(), "invalid source channel: 42");
    }
}

//! Error types shared by the folder, search and connection layers

/// Errors surfaced by folder and search operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The connection dropped and must be re-established before retrying
    #[error("Connection to the IMAP server was lost: {0}")]
    TransportLost(String),

    /// The server answered NO/BAD (malformed criteria, permission, quota)
    #[error("{0}")]
    RemoteRejected(String),

    /// A junk/trash/inbox destination could not be resolved
    #[error("{0}")]
    PathInvalid(String),

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("You must be working online to complete this operation")]
    Offline,

    #[error("No IMAP mailbox available for folder '{0}'")]
    NoMailbox(String),

    #[error("No quota information available for folder '{0}'")]
    NoQuota(String),

    #[error("Invalid search expression: {0}")]
    InvalidQuery(String),

    #[error("Unknown message UID {0}")]
    InvalidUid(String),

    /// Error tagged with the synchronization phase it came from
    #[error("{phase}: {source}")]
    Phase {
        phase: &'static str,
        #[source]
        source: Box<Error>,
    },

    /// Failure in local persistence (summary store, message cache)
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error asks for a reconnect-and-retry
    pub fn is_transport_lost(&self) -> bool {
        matches!(self, Error::TransportLost(_))
    }

    /// Prefix the error with the phase it happened in
    pub fn in_phase(self, phase: &'static str) -> Self {
        Error::Phase {
            phase,
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_prefix() {
        let err = Error::PathInvalid("No destination folder specified".to_string())
            .in_phase("Unable to move junk messages");
        assert_eq!(
            err.to_string(),
            "Unable to move junk messages: No destination folder specified"
        );
    }

    #[test]
    fn test_transport_lost_detection() {
        assert!(Error::TransportLost("reset by peer".into()).is_transport_lost());
        assert!(!Error::RemoteRejected("BAD".into()).is_transport_lost());
        assert!(
            !Error::TransportLost("eof".into())
                .in_phase("Unable to move deleted messages")
                .is_transport_lost()
        );
    }

    #[test]
    fn test_storage_from_anyhow() {
        let err: Error = anyhow::anyhow!("disk full").into();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(err.to_string(), "disk full");
    }
}

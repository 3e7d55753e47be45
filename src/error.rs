use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DeckError {
    #[error("failed to load config from {path}")]
    ConfigLoad {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config from {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("{message}")]
    Libvirt {
        message: String,
        #[help]
        hint: String,
    },

    #[error("VM {name} does not exist on {connection} connection")]
    #[diagnostic(help("run `vmdeck list` to see the VMs on this connection"))]
    VmNotFound { name: String, connection: String },

    #[error("network {name} does not exist on {connection} connection")]
    #[diagnostic(help("run `vmdeck network list` to see the networks on this connection"))]
    NetworkNotFound { name: String, connection: String },

    #[error("{action} is not available for {name}: {reason}")]
    ActionNotPermitted {
        action: String,
        name: String,
        reason: String,
    },

    #[error("{text}")]
    ActionFailed {
        text: String,
        #[help]
        detail: String,
    },

    #[error("cancelled")]
    Cancelled,
}

/// Failure reported by the hypervisor for a single remote call.
///
/// Only the message survives: it becomes the `detail` of a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<virt::error::Error> for RemoteError {
    fn from(e: virt::error::Error) -> Self {
        Self::new(e.to_string())
    }
}

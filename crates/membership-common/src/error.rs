//! Error types for membership operations
//!
//! Errors are structured with fields to aid debugging. Every workflow step
//! wraps the errors of the layer below it with its own step name via
//! [`ResultExt::step`], so a failure reads like a breadcrumb trail while
//! [`Error::root`] still exposes the underlying category.

use thiserror::Error;

/// Main error type for membership operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The resource does not exist
    #[error("{resource} not found")]
    NotFound {
        /// Resource that was looked up
        resource: String,
    },

    /// The resource exists although it was required to be absent
    #[error("{resource} already exists: {body}")]
    AlreadyExists {
        /// Resource that was looked up
        resource: String,
        /// Response body returned by the server
        body: String,
    },

    /// A non-2xx response from a remote API
    #[error("{operation} failed with status {status}: {body}")]
    Api {
        /// Operation that issued the request
        operation: String,
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// The request never produced a response
    #[error("{operation} request failed: {message}")]
    Transport {
        /// Operation that issued the request
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// Marks an error that must never be retried
    #[error("unrecoverable: {source}")]
    Unrecoverable {
        /// The terminal error
        source: Box<Error>,
    },

    /// Poll attempts were exhausted
    #[error("timed out waiting for {operation} after {attempts} attempts")]
    Timeout {
        /// Operation being waited on
        operation: String,
        /// Attempts made
        attempts: u32,
    },

    /// Another Hub owns the cluster's exclusivity artifacts
    #[error("exclusivity conflict: {message}")]
    ExclusivityConflict {
        /// Message returned by the Hub, verbatim
        message: String,
    },

    /// A long-running operation completed with an error status
    #[error("operation {operation} failed with code {code}: {message}")]
    OperationFailed {
        /// Operation name
        operation: String,
        /// Status code reported by the Hub
        code: i32,
        /// Status message reported by the Hub
        message: String,
    },

    /// Malformed response or manifest body
    #[error("decode error in {context}: {message}")]
    Decode {
        /// What was being decoded
        context: String,
        /// Description of what failed
        message: String,
    },

    /// A resource was observed in a state the workflow cannot continue from
    #[error("{resource} is {actual}, expected {expected}")]
    InvalidState {
        /// Resource inspected
        resource: String,
        /// State the workflow requires
        expected: String,
        /// State observed
        actual: String,
    },

    /// The caller cancelled the invocation
    #[error("{operation} cancelled")]
    Cancelled {
        /// Operation in flight when cancellation was observed
        operation: String,
    },

    /// Invalid or missing configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's invalid
        message: String,
    },

    /// An error wrapped with the name of the step that failed
    #[error("{step}: {source}")]
    Step {
        /// Workflow step name
        step: String,
        /// The underlying error
        source: Box<Error>,
    },
}

impl Error {
    /// Create a not-found error for a resource
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an already-exists error for a resource
    pub fn already_exists(resource: impl Into<String>, body: impl Into<String>) -> Self {
        Self::AlreadyExists {
            resource: resource.into(),
            body: body.into(),
        }
    }

    /// Create an API error from a non-2xx response
    pub fn api(operation: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            operation: operation.into(),
            status,
            body: body.into(),
        }
    }

    /// Create a transport error
    pub fn transport(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Mark an error as terminal for the poller
    pub fn unrecoverable(source: Error) -> Self {
        if source.is_unrecoverable() {
            return source;
        }
        Self::Unrecoverable {
            source: Box::new(source),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, attempts: u32) -> Self {
        Self::Timeout {
            operation: operation.into(),
            attempts,
        }
    }

    /// Create an exclusivity conflict carrying the Hub's message
    pub fn exclusivity_conflict(msg: impl Into<String>) -> Self {
        Self::ExclusivityConflict {
            message: msg.into(),
        }
    }

    /// Create an operation-failed error
    pub fn operation_failed(
        operation: impl Into<String>,
        code: i32,
        msg: impl Into<String>,
    ) -> Self {
        Self::OperationFailed {
            operation: operation.into(),
            code,
            message: msg.into(),
        }
    }

    /// Create a decode error
    pub fn decode(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Decode {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Create an invalid-state error
    pub fn invalid_state(
        resource: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            resource: resource.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Wrap an error with the step that produced it
    pub fn in_step(step: impl Into<String>, source: Error) -> Self {
        Self::Step {
            step: step.into(),
            source: Box::new(source),
        }
    }

    /// Whether the poller must stop on this error
    ///
    /// Cancellation is terminal too; a cancelled invocation never retries.
    pub fn is_unrecoverable(&self) -> bool {
        match self {
            Error::Unrecoverable { .. } | Error::Cancelled { .. } => true,
            Error::Step { source, .. } => source.is_unrecoverable(),
            _ => false,
        }
    }

    /// Walk through step and unrecoverable wrappers to the underlying error
    pub fn root(&self) -> &Error {
        match self {
            Error::Step { source, .. } | Error::Unrecoverable { source } => source.root(),
            other => other,
        }
    }

    /// Whether the underlying error is a not-found signal
    ///
    /// Also recognizes kube 404 responses.
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            _ => false,
        }
    }
}

/// Extension trait for wrapping errors with a step name
pub trait ResultExt<T> {
    /// Wrap the error, if any, with the given step name
    fn step(self, step: &str) -> std::result::Result<T, Error>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn step(self, step: &str) -> std::result::Result<T, Error> {
        self.map_err(|e| Error::in_step(step, e.into()))
    }
}

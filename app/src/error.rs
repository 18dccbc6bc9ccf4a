//! Error taxonomy for the agent control client.

use std::fmt;
use thiserror::Error;

/// Failure class of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// Transport failure or unexpected HTTP status.
    Network,
    /// The agent answered with an explicit error.
    RemoteRejected,
    /// No answer within the request timeout.
    Timeout,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteErrorKind::Network => write!(f, "network error"),
            RemoteErrorKind::RemoteRejected => write!(f, "rejected by agent"),
            RemoteErrorKind::Timeout => write!(f, "timed out"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn network(message: impl Into<String>) -> Self {
        Self { kind: RemoteErrorKind::Network, message: message.into() }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self { kind: RemoteErrorKind::RemoteRejected, message: message.into() }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self { kind: RemoteErrorKind::Timeout, message: message.into() }
    }

    /// Transport-level failures may be retried; business rejections may not.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, RemoteErrorKind::Network | RemoteErrorKind::Timeout)
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::timeout(err.to_string())
        } else {
            RemoteError::network(err.to_string())
        }
    }
}

/// Unexpected response shape from the agent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("response carried no Data field")]
    MissingData,

    #[error("Data is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("unexpected payload shape: {0}")]
    UnexpectedShape(String),
}

/// A snapshot refresh that produced nothing to render.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Local precondition failure. Never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please connect your wallet first")]
    NotConnected,

    #[error("Caller process ID not initialized")]
    NoSession,

    #[error("Please enter a valid allowance amount")]
    NonPositiveAllowance,

    #[error("Input and target tokens must be different")]
    SameToken,

    #[error("Another operation is already in progress: {0}")]
    OperationPending(String),

    #[error("Agent must be {expected} to {action}")]
    InvalidState { expected: String, action: String },
}

/// Named step of the start/stop sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStep {
    Setup,
    StartAgent,
    StartCaller,
    Stop,
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleStep::Setup => write!(f, "Setup"),
            LifecycleStep::StartAgent => write!(f, "Start (agent)"),
            LifecycleStep::StartCaller => write!(f, "Start (caller)"),
            LifecycleStep::Stop => write!(f, "Stop"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{step} failed: {source}")]
pub struct StepFailure {
    pub step: LifecycleStep,
    pub source: RemoteError,
}

impl StepFailure {
    pub fn is_setup_failed(&self) -> bool {
        self.step == LifecycleStep::Setup
    }

    pub fn is_stop_failed(&self) -> bool {
        self.step == LifecycleStep::Stop
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Step(#[from] StepFailure),
}

impl LifecycleError {
    pub fn step(&self) -> Option<LifecycleStep> {
        match self {
            LifecycleError::Step(failure) => Some(failure.step),
            LifecycleError::Validation(_) => None,
        }
    }
}

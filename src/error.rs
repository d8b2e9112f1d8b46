//! Error kinds (§7).
//!
//! Each kind is a concrete, message-carrying struct rather than a
//! `thiserror`-derived type: a hand-written `Display`/`Error` impl plus
//! `From` conversions for wrapped causes.

use std::error::Error as StdError;
use std::fmt::{self, Display, Formatter};

/// Invalid topology mutation: duplicate child, missing endpoint, self-loop,
/// delete of a non-child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphError {
    message: String,
}

impl GraphError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "graph error: {}", self.message)
    }
}

impl StdError for GraphError {}

/// Factory not found, ABI mismatch, or plugin load failure, surfaced during
/// `load`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DynamicsError {
    LibraryNotFound { package: String, library: String },
    MissingVersionSymbol { path: String },
    AbiMismatch { expected: (u32, u32), found: (u32, u32) },
    MissingFactorySymbol { path: String, kind: String },
    UnknownStaticName { name: String },
}

impl Display for DynamicsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DynamicsError::LibraryNotFound { package, library } => {
                write!(f, "no library '{library}' in package '{package}'")
            }
            DynamicsError::MissingVersionSymbol { path } => {
                write!(f, "'{path}' does not export vle_api_level")
            }
            DynamicsError::AbiMismatch { expected, found } => write!(
                f,
                "ABI mismatch: kernel is {}.{}, library is {}.{}",
                expected.0, expected.1, found.0, found.1
            ),
            DynamicsError::MissingFactorySymbol { path, kind } => {
                write!(f, "'{path}' does not export a '{kind}' factory symbol")
            }
            DynamicsError::UnknownStaticName { name } => {
                write!(f, "no statically registered dynamics named '{name}'")
            }
        }
    }
}

impl StdError for DynamicsError {}

/// A user callback raised; the kernel wraps the message and aborts the
/// current run.
#[derive(Debug)]
pub struct RuntimeError {
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn wrap(message: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "runtime error: {}", self.message)
    }
}

impl StdError for RuntimeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|b| b.as_ref() as &(dyn StdError + 'static))
    }
}

/// Malformed project description: unknown view trigger, missing timestep
/// for a timed view, dangling reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "config error: {}", self.message)
    }
}

impl StdError for ConfigError {}

/// An internal invariant was violated (queue inconsistency). Always a bug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalError {
    message: String,
}

impl InternalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for InternalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "internal error (this is a bug): {}", self.message)
    }
}

impl StdError for InternalError {}

/// Dispatch enum surfaced to callers of `load`/`init`/`run`/`finish`,
/// tagging which kind fired (§7 propagation policy).
#[derive(Debug)]
pub enum VleError {
    Graph(GraphError),
    Dynamics(DynamicsError),
    Runtime(RuntimeError),
    Config(ConfigError),
    Internal(InternalError),
}

impl Display for VleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            VleError::Graph(e) => write!(f, "{e}"),
            VleError::Dynamics(e) => write!(f, "{e}"),
            VleError::Runtime(e) => write!(f, "{e}"),
            VleError::Config(e) => write!(f, "{e}"),
            VleError::Internal(e) => write!(f, "{e}"),
        }
    }
}

impl StdError for VleError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            VleError::Graph(e) => Some(e),
            VleError::Dynamics(e) => Some(e),
            VleError::Runtime(e) => Some(e),
            VleError::Config(e) => Some(e),
            VleError::Internal(e) => Some(e),
        }
    }
}

impl From<GraphError> for VleError {
    fn from(e: GraphError) -> Self {
        VleError::Graph(e)
    }
}

impl From<DynamicsError> for VleError {
    fn from(e: DynamicsError) -> Self {
        VleError::Dynamics(e)
    }
}

impl From<RuntimeError> for VleError {
    fn from(e: RuntimeError) -> Self {
        VleError::Runtime(e)
    }
}

impl From<ConfigError> for VleError {
    fn from(e: ConfigError) -> Self {
        VleError::Config(e)
    }
}

impl From<InternalError> for VleError {
    fn from(e: InternalError) -> Self {
        VleError::Internal(e)
    }
}

use std::fmt;
use std::io;

/// Result type for console operations.
pub type ConsoleResult<T = ()> = Result<T, ConsoleError>;

/// Failures reported to callers of the console core.
///
/// Most runtime problems (parse warnings, send failures, display backpressure)
/// never reach this type; they are logged and the component carries on.
#[derive(Debug)]
pub enum ConsoleError {
    /// The listen socket could not be bound.
    Bind { addr: String, source: io::Error },
    /// A log file could not be read or written.
    Io(io::Error),
    /// Forwarding would send messages back into our own listener.
    ForwardToSelf { host: String, port: u16 },
    /// A forward destination did not resolve to a socket address.
    Resolve { host: String, port: u16 },
}

impl From<io::Error> for ConsoleError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl fmt::Display for ConsoleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind { addr, source } => write!(f, "unable to bind {}: {}", addr, source),
            Self::Io(e) => write!(f, "IO error: {}", e),
            Self::ForwardToSelf { host, port } => {
                write!(f, "refusing to forward to own listener at {}:{}", host, port)
            }
            Self::Resolve { host, port } => write!(f, "cannot resolve {}:{}", host, port),
        }
    }
}

impl std::error::Error for ConsoleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConsoleError> for io::Error {
    fn from(e: ConsoleError) -> Self {
        match e {
            ConsoleError::Io(e) => e,
            ConsoleError::Bind { source, .. } => source,
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}

/// Result type for transport operations.
pub type TransportResult<T = ()> = Result<T, TransportError>;

/// Error from encoding or sending a single OSC message.
#[derive(Debug)]
pub enum TransportError {
    Io(io::Error),
    Encode(rosc::OscError),
    Resolve(String),
}

impl From<io::Error> for TransportError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<rosc::OscError> for TransportError {
    fn from(e: rosc::OscError) -> Self {
        Self::Encode(e)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "send failed: {}", e),
            Self::Encode(e) => write!(f, "encode failed: {:?}", e),
            Self::Resolve(dest) => write!(f, "cannot resolve {}", dest),
        }
    }
}

impl std::error::Error for TransportError {}

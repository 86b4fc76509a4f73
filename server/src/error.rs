use std::io;
use std::net::SocketAddr;

/// Failures the engine reports to its caller.
///
/// Per-datagram problems (decode failures, unknown players) never surface
/// here; they are answered on the wire and logged.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no free hardware id after {attempts} attempts")]
    RegistryExhausted { attempts: usize },

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("invalid destination address '{0}'")]
    InvalidAddress(String),

    #[error("match already finished, reset before starting again")]
    MatchFinished,
}

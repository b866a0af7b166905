use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("No credentials configured")]
    NoCredentials,

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid server url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("server_url must start with http:// or https://, got '{0}'")]
    UnsupportedScheme(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("session runtime has shut down")]
pub struct RuntimeClosed;

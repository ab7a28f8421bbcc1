use crate::tokenizer::TokenId;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way a load, encode or decode call can fail.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("pretrained tokenizer not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid tokenizer definition: {0}")]
    InvalidFormat(String),
    #[error("cannot encode input: {0}")]
    Encoding(String),
    #[error("unknown token id: {0}")]
    UnknownId(TokenId),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidFormat(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() {
            Error::Io(err.into())
        } else {
            Error::InvalidFormat(err.to_string())
        }
    }
}

impl From<fancy_regex::Error> for Error {
    fn from(err: fancy_regex::Error) -> Self {
        Error::InvalidFormat(format!("bad pattern: {err}"))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn json_syntax_errors_are_invalid_format() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{ nope")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::InvalidFormat(_)));
    }

    #[test]
    fn display_names_the_id() {
        assert_eq!(Error::UnknownId(42).to_string(), "unknown token id: 42");
    }
}

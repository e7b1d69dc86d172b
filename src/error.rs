use std::io;

use thiserror::Error;

pub type BeanstalkResult<T> = Result<T, BeanstalkError>;

#[derive(Debug, Error)]
pub enum BeanstalkError {
    /// Tube name rejected before anything was written.
    #[error("invalid tube name: {0:?}")]
    InvalidName(String),

    #[error("job size is {size} bytes (max allowed is {max})")]
    JobTooLarge { size: usize, max: usize },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Error token reported by the server for one specific command.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// The reply could not be matched to its command. The connection is
    /// desynchronized and gets closed.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("connection timed out")]
    ConnectionTimeout,

    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("malformed structured body: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Error tokens beanstalkd may send in reply to any command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ServerError {
    #[error("OUT_OF_MEMORY")]
    OutOfMemory,
    #[error("INTERNAL_ERROR")]
    InternalError,
    #[error("BAD_FORMAT")]
    BadFormat,
    #[error("UNKNOWN_COMMAND")]
    UnknownCommand,
    #[error("TIMED_OUT")]
    TimedOut,
    #[error("NOT_FOUND")]
    NotFound,
    #[error("DRAINING")]
    Draining,
    #[error("EXPECTED_CRLF")]
    ExpectedCrlf,
    #[error("JOB_TOO_BIG")]
    JobTooBig,
    #[error("DEADLINE_SOON")]
    DeadlineSoon,
    #[error("NOT_IGNORED")]
    NotIgnored,
}

impl ServerError {
    /// Map a status word to its error kind. Words outside the table are not
    /// errors and yield `None`.
    pub fn from_token(word: &str) -> Option<ServerError> {
        let err = match word {
            "OUT_OF_MEMORY" => ServerError::OutOfMemory,
            "INTERNAL_ERROR" => ServerError::InternalError,
            "BAD_FORMAT" => ServerError::BadFormat,
            "UNKNOWN_COMMAND" => ServerError::UnknownCommand,
            "TIMED_OUT" => ServerError::TimedOut,
            "NOT_FOUND" => ServerError::NotFound,
            "DRAINING" => ServerError::Draining,
            "EXPECTED_CRLF" => ServerError::ExpectedCrlf,
            "JOB_TOO_BIG" => ServerError::JobTooBig,
            "DEADLINE_SOON" => ServerError::DeadlineSoon,
            "NOT_IGNORED" => ServerError::NotIgnored,
            _ => return None,
        };
        Some(err)
    }

    /// Fail with the mapped error if `word` is an error token.
    pub fn check(word: &str) -> BeanstalkResult<()> {
        match ServerError::from_token(word) {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

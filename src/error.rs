//! Status taxonomy and internal error translation (spec §4.I, §7).
//!
//! Every public operation on an [`Engine`](crate::engine::Engine) or an
//! iterator returns a [`Status`]. Internally, engine and transaction code
//! works with the richer [`EngineError`], which is translated to the
//! nearest `Status` at the boundary, the same shape as the original
//! project's `catch_and_return_status` helper, which maps C++ exceptions
//! to integer status codes at the C API boundary.

use std::cell::RefCell;
use std::fmt;

/// Public result/status taxonomy (spec §4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum Status {
    Ok = 1,
    UnknownError = -1,
    NotFound = 0,
    NotSupported = -2,
    InvalidArgument = -3,
    ConfigParsingError = -4,
    ConfigTypeError = -5,
    StoppedByCb = -6,
    OutOfMemory = -7,
    WrongEngine = -8,
    TransactionScopeError = -9,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Ok => "ok",
            Status::UnknownError => "unknown error",
            Status::NotFound => "not found",
            Status::NotSupported => "not supported",
            Status::InvalidArgument => "invalid argument",
            Status::ConfigParsingError => "config parsing error",
            Status::ConfigTypeError => "config type error",
            Status::StoppedByCb => "stopped by callback",
            Status::OutOfMemory => "out of memory",
            Status::WrongEngine => "wrong engine",
            Status::TransactionScopeError => "transaction scope error",
        };
        f.write_str(s)
    }
}

impl std::error::Error for Status {}

/// Internal error type used by engine and transaction code.
///
/// Engines should generally propagate this with `?` and only convert to
/// [`Status`] when crossing the public `Engine`/iterator boundary (see
/// [`EngineError::into_status`]).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("key not found")]
    NotFound,

    #[error("operation not supported by this engine")]
    NotSupported,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config parsing error: {0}")]
    ConfigParsing(String),

    #[error("config type error: {0}")]
    ConfigType(String),

    #[error("iteration stopped by callback")]
    StoppedByCb,

    #[error("out of memory")]
    OutOfMemory,

    #[error("value (size {0}) exceeds destination buffer")]
    ValueTooLarge(usize),

    #[error("wrong engine: {0}")]
    WrongEngine(String),

    #[error("operation attempted inside a foreign transaction")]
    TransactionScope,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Translates this internal error into the public [`Status`] taxonomy,
    /// recording the message in the thread-local diagnostic slot.
    pub fn into_status(self) -> Status {
        let status = match &self {
            EngineError::NotFound => Status::NotFound,
            EngineError::NotSupported => Status::NotSupported,
            EngineError::InvalidArgument(_) => Status::InvalidArgument,
            EngineError::ConfigParsing(_) => Status::ConfigParsingError,
            EngineError::ConfigType(_) => Status::ConfigTypeError,
            EngineError::StoppedByCb => Status::StoppedByCb,
            EngineError::OutOfMemory => Status::OutOfMemory,
            EngineError::ValueTooLarge(_) => Status::OutOfMemory,
            EngineError::WrongEngine(_) => Status::WrongEngine,
            EngineError::TransactionScope => Status::TransactionScopeError,
            EngineError::Io(_) | EngineError::Internal(_) => Status::UnknownError,
        };
        if status != Status::Ok {
            log::error!("{}", self);
        }
        set_last_error(self.to_string());
        status
    }
}

impl EngineError {
    /// For [`EngineError::ValueTooLarge`], the size the caller's buffer
    /// would need to be to receive the whole value (spec §6 `get_copy`).
    pub fn needed_size(&self) -> Option<usize> {
        match self {
            EngineError::ValueTooLarge(n) => Some(*n),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

thread_local! {
    static LAST_ERROR: RefCell<Option<String>> = RefCell::new(None);
}

fn set_last_error(msg: String) {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(msg));
}

/// Returns the most recent error message recorded on this thread, if any.
///
/// Mirrors spec §7's "thread-local diagnostic string accessor for
/// operational logging."
pub fn last_error() -> Option<String> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Clears the thread-local diagnostic message.
pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

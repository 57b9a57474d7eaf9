//! Structured error type shared across the workspace.
//!
//! Mirrors the Status/ErrorKind taxonomy of the packager's error handling
//! design: a single `Error` wraps an `ErrorKind` plus an optional source and
//! a message, and `Result<T, Error>` stands in for the boolean-plus-string
//! Status value.

use std::fmt;

/// Error kind, matching the packager's Status taxonomy.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[non_exhaustive]
pub enum ErrorKind {
    InvalidArgument,
    FileFailure,
    EndOfStream,
    ParserFailure,
    EncryptionFailure,
    ChunkingError,
    MuxerFailure,
    ServerError,
    InternalError,
    NotFound,
    AlreadyExists,
    Unimplemented,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::FileFailure => "file failure",
            ErrorKind::EndOfStream => "end of stream",
            ErrorKind::ParserFailure => "parser failure",
            ErrorKind::EncryptionFailure => "encryption failure",
            ErrorKind::ChunkingError => "chunking error",
            ErrorKind::MuxerFailure => "muxer failure",
            ErrorKind::ServerError => "server error",
            ErrorKind::InternalError => "internal error",
            ErrorKind::NotFound => "not found",
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::Unimplemented => "unimplemented",
        };
        f.write_str(s)
    }
}

pub struct Error {
    kind: ErrorKind,
    msg: Option<String>,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Error {
            kind,
            msg: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[must_use]
    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }

    #[must_use]
    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (&self.msg, &self.source) {
            (Some(m), Some(s)) => write!(f, "{}: {} ({})", self.kind, m, s),
            (Some(m), None) => write!(f, "{}: {}", self.kind, m),
            (None, Some(s)) => write!(f, "{}: {}", self.kind, s),
            (None, None) => write!(f, "{}", self.kind),
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error::new(kind)
    }
}

/// Extension methods for annotating a foreign `Result` with a `Status` kind.
pub trait ResultExt<T> {
    fn err_kind(self, k: ErrorKind) -> Result<T, Error>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn err_kind(self, k: ErrorKind) -> Result<T, Error> {
        self.map_err(|e| Error::new(k).with_source(e))
    }
}

/// Builds an `Error` value. `err!(Kind, msg("..."))`, `err!(Kind,
/// msg("...", args))`, `err!(Kind, source(e))`.
#[macro_export]
macro_rules! err {
    ($kind:ident, msg($fmt:expr)) => {
        $crate::Error::new($crate::ErrorKind::$kind).with_msg($fmt)
    };
    ($kind:ident, msg($fmt:expr, $($arg:tt)+)) => {
        $crate::Error::new($crate::ErrorKind::$kind).with_msg(format!($fmt, $($arg)+))
    };
    ($kind:ident, source($src:expr)) => {
        $crate::Error::new($crate::ErrorKind::$kind).with_source($src)
    };
}

/// Returns early with an `Error`. Same argument grammar as [`err!`].
#[macro_export]
macro_rules! bail {
    ($($tt:tt)+) => {
        return Err($crate::err!($($tt)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_msg() {
        let e = err!(ParserFailure, msg("bad box size {}", 42));
        assert_eq!(e.kind(), ErrorKind::ParserFailure);
        assert_eq!(e.to_string(), "parser failure: bad box size 42");
    }

    #[test]
    fn bail_returns_early() {
        fn f() -> Result<(), Error> {
            bail!(EncryptionFailure, msg("bad key size"));
        }
        let e = f().unwrap_err();
        assert_eq!(e.kind(), ErrorKind::EncryptionFailure);
    }
}

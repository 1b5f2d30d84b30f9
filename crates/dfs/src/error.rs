// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;

use libc::c_int;

/// A specialized [`Result`][std::result::Result] for DFS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of a failed DFS operation.
///
/// Backend return codes are mapped to these kinds once, by [`translate`], so that callers never
/// have to match on raw integers. Codes without a dedicated kind are preserved in
/// [`BackendFailure`](ErrorKind::BackendFailure).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// The pool, container or entity does not exist.
    NotFound,
    /// The caller lacks the rights for the requested access.
    PermissionDenied,
    /// The entity (or container) already exists and exclusive creation was requested.
    AlreadyExists,
    /// An argument was rejected, or a caller contract was violated (double release, use of a
    /// closed session, read from a non-regular entity, ...).
    InvalidArgument,
    /// The backend failed to move data, or memory could not be allocated for marshalling.
    IoFailure,
    /// The resource is in use, e.g. a session still has open handles.
    Busy,
    /// The backend has no space (or quota) left.
    OutOfSpace,
    /// The operation is not supported by the backend or by this build.
    Unsupported,
    /// Any other non-zero backend code.
    BackendFailure(i32),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::AlreadyExists => f.write_str("already exists"),
            Self::InvalidArgument => f.write_str("invalid argument"),
            Self::IoFailure => f.write_str("I/O failure"),
            Self::Busy => f.write_str("resource busy"),
            Self::OutOfSpace => f.write_str("out of space"),
            Self::Unsupported => f.write_str("unsupported"),
            Self::BackendFailure(code) => write!(f, "backend failure {code}"),
        }
    }
}

/// An error returned by a DFS operation.
///
/// Carries the symbolic [`ErrorKind`], the raw code reported by the backend (or the errno value
/// the facade chose for errors it detected itself) and a context string naming the failed
/// operation and its salient identifiers. The context never contains caller buffer contents.
///
/// # Thread safety
///
/// This type is thread-safe.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{context}: {kind} (code {code})")]
pub struct Error {
    kind: ErrorKind,
    code: i32,
    context: String,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind, code: i32, context: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            context: context.into(),
        }
    }

    /// A caller contract violation, reported with `EINVAL`.
    pub(crate) fn invalid_argument(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, libc::EINVAL, context)
    }

    pub(crate) fn busy(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Busy, libc::EBUSY, context)
    }

    pub(crate) fn out_of_memory(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::IoFailure, libc::ENOMEM, context)
    }

    /// The symbolic kind of the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The raw code, as returned by the backend entry point.
    #[must_use]
    pub const fn code(&self) -> i32 {
        self.code
    }

    /// The failed operation and its identifiers, e.g. `open: name=foo, flags=read`.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }
}

impl From<Error> for std::io::Error {
    fn from(value: Error) -> Self {
        let kind = match value.kind {
            ErrorKind::NotFound => std::io::ErrorKind::NotFound,
            ErrorKind::PermissionDenied => std::io::ErrorKind::PermissionDenied,
            ErrorKind::AlreadyExists => std::io::ErrorKind::AlreadyExists,
            ErrorKind::InvalidArgument => std::io::ErrorKind::InvalidInput,
            ErrorKind::Busy => std::io::ErrorKind::ResourceBusy,
            ErrorKind::OutOfSpace => std::io::ErrorKind::StorageFull,
            ErrorKind::Unsupported => std::io::ErrorKind::Unsupported,
            ErrorKind::IoFailure | ErrorKind::BackendFailure(_) => std::io::ErrorKind::Other,
        };
        Self::new(kind, value)
    }
}

/// Maps a backend return code to its symbolic kind.
///
/// Both the errno value and its negation are accepted. Returns `None` for zero.
#[must_use]
pub fn kind_of(code: c_int) -> Option<ErrorKind> {
    if code == 0 {
        return None;
    }

    let kind = match code.saturating_abs() {
        libc::ENOENT => ErrorKind::NotFound,
        libc::EPERM | libc::EACCES => ErrorKind::PermissionDenied,
        libc::EEXIST => ErrorKind::AlreadyExists,
        libc::EINVAL => ErrorKind::InvalidArgument,
        libc::EIO => ErrorKind::IoFailure,
        libc::EBUSY => ErrorKind::Busy,
        libc::ENOSPC | libc::EDQUOT => ErrorKind::OutOfSpace,
        libc::ENOTSUP | libc::ENOSYS => ErrorKind::Unsupported,
        _ => ErrorKind::BackendFailure(code),
    };

    Some(kind)
}

/// Translates a backend return code into a [`Result`].
///
/// Zero is success. Any other value becomes an [`Error`] carrying the raw code and the context
/// produced by `context`, which is only evaluated on failure.
///
/// # Errors
///
/// Returns an error for every non-zero `code`.
///
/// # Examples
///
/// ```
/// use dfs::{ErrorKind, translate};
///
/// assert!(translate(0, || unreachable!()).is_ok());
///
/// let error = translate(libc::ENOENT, || "mount: pool=p, container=c".to_string()).unwrap_err();
/// assert_eq!(error.kind(), ErrorKind::NotFound);
/// assert_eq!(error.code(), libc::ENOENT);
/// ```
pub fn translate(code: c_int, context: impl FnOnce() -> String) -> Result<()> {
    match kind_of(code) {
        None => Ok(()),
        Some(kind) => Err(Error::new(kind, code, context())),
    }
}

#[cfg(test)]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn thread_safe_type() {
        assert_impl_all!(Error: Send, Sync);
    }

    #[test]
    fn zero_is_success() {
        translate(0, || panic!("context must not be built on success")).unwrap();
    }

    #[test]
    fn errno_table() {
        let cases = [
            (libc::ENOENT, ErrorKind::NotFound),
            (libc::EPERM, ErrorKind::PermissionDenied),
            (libc::EACCES, ErrorKind::PermissionDenied),
            (libc::EEXIST, ErrorKind::AlreadyExists),
            (libc::EINVAL, ErrorKind::InvalidArgument),
            (libc::EIO, ErrorKind::IoFailure),
            (libc::EBUSY, ErrorKind::Busy),
            (libc::ENOSPC, ErrorKind::OutOfSpace),
            (libc::EDQUOT, ErrorKind::OutOfSpace),
            (libc::ENOTSUP, ErrorKind::Unsupported),
            (libc::ENOSYS, ErrorKind::Unsupported),
        ];

        for (code, expected) in cases {
            assert_eq!(kind_of(code), Some(expected), "errno {code}");
            assert_eq!(kind_of(-code), Some(expected), "negated errno {code}");
        }
    }

    #[test]
    fn unknown_code_is_backend_failure() {
        let error = translate(-1005, || "open: name=x".to_string()).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::BackendFailure(-1005));
        assert_eq!(error.code(), -1005);

        assert_eq!(kind_of(libc::ENOTDIR), Some(ErrorKind::BackendFailure(libc::ENOTDIR)));
    }

    #[test]
    fn minimum_code_does_not_overflow() {
        assert_eq!(kind_of(c_int::MIN), Some(ErrorKind::BackendFailure(c_int::MIN)));
    }

    #[test]
    fn display_includes_context_kind_and_code() {
        let error = translate(libc::EACCES, || "connect: pool=pool-B".to_string()).unwrap_err();
        assert_eq!(error.to_string(), format!("connect: pool=pool-B: permission denied (code {})", libc::EACCES));
        assert_eq!(error.context(), "connect: pool=pool-B");
    }

    #[test]
    fn into_stdio_error() {
        let io_error: std::io::Error = Error::busy("umount").into();
        assert_eq!(io_error.kind(), std::io::ErrorKind::ResourceBusy);

        let io_error: std::io::Error = Error::new(ErrorKind::BackendFailure(9), 9, "read").into();
        assert_eq!(io_error.kind(), std::io::ErrorKind::Other);
    }
}

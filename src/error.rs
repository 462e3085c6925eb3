//! Error and result types for the `mutandis` crate.

use std::borrow::Cow;
use std::fmt;
use std::io;

/// A result that is either `Ok(T)` or `Err(mutandis::Error)`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An extension trait for [`mutandis::Result`][crate::Result] that provides
/// additional methods.
pub trait ResultExt<T> {
    /// Turns a [`NoCandidate`][ErrorKind::NoCandidate] error into `Ok(None)`,
    /// passing every other error through.
    ///
    /// # Examples
    ///
    /// ```
    /// use mutandis::{Error, Result, ResultExt};
    ///
    /// let result: Result<u32> = Err(Error::no_candidate("no callee"));
    /// assert_eq!(result.ignore_no_candidate().unwrap(), None);
    /// ```
    fn ignore_no_candidate(self) -> Result<Option<T>>;
}

impl<T> ResultExt<T> for Result<T> {
    #[inline]
    fn ignore_no_candidate(self) -> Result<Option<T>> {
        match self {
            Ok(x) => Ok(Some(x)),
            Err(err) if err.is_no_candidate() => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// An error that can occur when using the `mutandis` crate.
///
/// This type is a thin, boxed wrapper around [`ErrorKind`], which contains the
/// specific kind of error that occurred.
///
/// # Examples
///
/// ```
/// use mutandis::{Error, ErrorKind};
///
/// let error = Error::invalid_handle("method #7 is gone");
///
/// match error.kind() {
///     ErrorKind::NoCandidate(msg) => println!("nothing to mutate: {msg}"),
///     ErrorKind::InvalidHandle(msg) => println!("stale handle: {msg}"),
///     unknown => println!("unknown! {unknown:?}"),
/// }
/// ```
pub struct Error {
    kind: Box<ErrorKind>,
    postmortem: Option<Box<str>>,
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
            postmortem: None,
        }
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(e: io::Error) -> Self {
        ErrorKind::Io(e).into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.kind {
            ErrorKind::NoCandidate(msg) => write!(f, "no candidate for mutation: {msg}"),
            ErrorKind::InvalidHandle(msg) => write!(f, "invalid structural handle: {msg}"),
            ErrorKind::Io(e) => write!(f, "i/o error: {e}"),
            ErrorKind::Other(msg) => write!(f, "an unknown error occurred: {msg}"),
        }?;
        if let Some(program) = &self.postmortem {
            write!(f, "\nlast program state:\n{program}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &*self.kind {
            ErrorKind::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl Error {
    /// Returns a new error indicating that a structural precondition for a
    /// mutation was not met, for example there is no method to call.
    #[must_use]
    pub fn no_candidate(msg: impl Into<ErrorMessage>) -> Self {
        ErrorKind::NoCandidate(msg.into()).into()
    }

    /// Returns a new error indicating that a unit, field, method, local, or
    /// instruction handle does not refer to anything.
    #[must_use]
    pub fn invalid_handle(msg: impl Into<ErrorMessage>) -> Self {
        ErrorKind::InvalidHandle(msg.into()).into()
    }

    /// Returns a new error with the given message.
    #[must_use]
    pub fn other(msg: impl Into<ErrorMessage>) -> Self {
        ErrorKind::Other(msg.into()).into()
    }

    /// Attach the last known program state to an error that ends a
    /// campaign.
    #[must_use]
    pub fn with_postmortem(mut self, program: impl Into<String>) -> Self {
        self.postmortem = Some(program.into().into_boxed_str());
        self
    }

    /// The program dump attached by [`with_postmortem`][Error::with_postmortem],
    /// if any. Fatal campaign errors always carry one.
    #[must_use]
    pub fn postmortem(&self) -> Option<&str> {
        self.postmortem.as_deref()
    }

    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Returns `true` if the error's kind is
    /// [`NoCandidate`][ErrorKind::NoCandidate].
    #[must_use]
    pub fn is_no_candidate(&self) -> bool {
        matches!(self.kind(), ErrorKind::NoCandidate(_))
    }

    /// Returns `true` if the error's kind is
    /// [`InvalidHandle`][ErrorKind::InvalidHandle].
    #[must_use]
    pub fn is_invalid_handle(&self) -> bool {
        matches!(self.kind(), ErrorKind::InvalidHandle(_))
    }

    /// Returns `true` if the error's kind is [`Io`][ErrorKind::Io].
    ///
    /// The campaign treats these as fatal.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self.kind(), ErrorKind::Io(_))
    }
}

/// The kind of an error that can occur when using the `mutandis` crate.
///
/// This enum is not exhaustive, and new variants may be added in the future.
#[non_exhaustive]
#[derive(Debug)]
pub enum ErrorKind {
    /// A structural precondition was not met: no eligible field type, no
    /// method with a compatible signature, no free position, etc.
    NoCandidate(ErrorMessage),

    /// A handle did not resolve to a live unit, field, method, local, or
    /// instruction.
    InvalidHandle(ErrorMessage),

    /// Staging or persisting artifacts failed.
    Io(io::Error),

    /// Some other error occurred.
    Other(ErrorMessage),
}

impl From<Error> for ErrorKind {
    #[inline]
    fn from(err: Error) -> Self {
        *err.kind
    }
}

/// A message that can be attached to an error.
///
/// This is a borrowed or owned string.
///
/// # Examples
///
/// ```
/// use mutandis::ErrorMessage;
///
/// let msg = ErrorMessage::new("something went wrong");
/// assert_eq!(msg.as_str(), "something went wrong");
/// ```
#[derive(Debug)]
pub struct ErrorMessage {
    inner: Cow<'static, str>,
}

impl ErrorMessage {
    /// Returns a new error message with the given string.
    #[must_use]
    pub fn new(msg: impl Into<ErrorMessage>) -> Self {
        msg.into()
    }

    /// Returns the message as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.inner
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&'static str> for ErrorMessage {
    #[inline]
    fn from(s: &'static str) -> Self {
        Self {
            inner: Cow::Borrowed(s),
        }
    }
}

impl From<String> for ErrorMessage {
    #[inline]
    fn from(s: String) -> Self {
        Self {
            inner: Cow::Owned(s),
        }
    }
}

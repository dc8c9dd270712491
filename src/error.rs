use failure::Fail;
use log::error;
use std::borrow::Cow;

pub use folio_macros::ApiError;

/// Broad classification of an error crossing the crate boundary.
///
/// Callers (CLI, RPC adapters) use this to decide how to report a failure;
/// the fine-grained reason is carried by [`ApiError::code()`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// An entity or sub-entity is absent.
    NotFound,
    /// Malformed or out-of-enum input, detected before any write.
    InvalidArgument,
    /// The caller lacks a required capability.
    Forbidden,
    /// The operation conflicts with existing state (duplicate storage path,
    /// terminal-state violation).
    Conflict,
    /// Unexpected failure from a collaborator. Not reported in detail.
    Internal,
}

/// An error that occurred while handling a core operation.
pub trait ApiError: Fail {
    /// Classification of this error.
    fn kind(&self) -> ErrorKind;

    /// Internal code describing this error.
    ///
    /// This code is used to identify this error outside the system, and thus
    /// should only be present for errors which are intended to be reported
    /// to the user in detail.
    fn code(&self) -> Option<Cow<str>>;
}

/// This implementation is required to make `#[cause]` on a `Box<dyn ApiError>`
/// work.
impl Fail for Box<dyn ApiError> {
    fn name(&self) -> Option<&str> {
        (**self).name()
    }

    fn cause(&self) -> Option<&dyn Fail> {
        (**self).cause()
    }

    fn backtrace(&self) -> Option<&failure::Backtrace> {
        (**self).backtrace()
    }
}

/// A wrapper around many types of errors, including user-facing [`ApiError`]s
/// as well as many other errors that should not be reported to the user, such
/// as database connection errors.
#[derive(Debug, Fail)]
pub enum Error {
    #[fail(display = "{}", _0)]
    Api(#[cause] Box<dyn ApiError>),
    /// Generic system error.
    #[fail(display = "{}", _0)]
    System(#[cause] std::io::Error),
    /// Error communicating with the database.
    ///
    /// Note that this variant also includes errors related to missing records;
    /// you may want to turn them into [`ApiError`]s instead:
    ///
    /// ```ignore
    /// database_operation
    ///     .optional()?
    ///     .ok_or(MyApiError::NotFound)?
    /// ```
    #[fail(display = "{}", _0)]
    Db(#[cause] diesel::result::Error),
    /// Error obtaining a database connection from the pool.
    #[fail(display = "{}", _0)]
    DbPool(#[cause] r2d2::Error),
}

impl<T: ApiError> From<T> for Error {
    fn from(error: T) -> Error {
        Error::Api(Box::new(error))
    }
}

impl_from! { for Error ;
    std::io::Error => |e| Error::System(e),
    diesel::result::Error => |e| Error::Db(e),
    r2d2::Error => |e| Error::DbPool(e),
}

impl Error {
    /// Classify this error for reporting across the boundary.
    ///
    /// Everything that is not an [`ApiError`] is internal by definition, and
    /// is logged here rather than exposed.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Api(err) => err.kind(),
            _ => {
                error!("{}", self);
                ErrorKind::Internal
            }
        }
    }
}

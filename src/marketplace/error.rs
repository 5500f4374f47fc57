use std::fmt;

use crate::{auth, store};

pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while performing a marketplace operation
#[derive(Debug, PartialEq)]
pub struct Error {
	kind: ErrorKind,
}

impl Error {
	pub fn new(kind: ErrorKind) -> Error {
		Error { kind }
	}

	pub fn kind(&self) -> &ErrorKind {
		&self.kind
	}

	pub fn forbidden() -> Error {
		Error::new(ErrorKind::Forbidden)
	}

	pub fn not_found() -> Error {
		Error::new(ErrorKind::NotFound)
	}

	pub fn conflict(msg: impl Into<String>) -> Error {
		Error::new(ErrorKind::Conflict(msg.into()))
	}

	pub fn validation(msg: impl Into<String>) -> Error {
		Error::new(ErrorKind::Validation(msg.into()))
	}
}

/// The kind of an error that can occur.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
	/// No or invalid credential
	Unauthenticated,
	/// Wrong role or not the owner
	Forbidden,
	/// Missing or malformed fields
	Validation(String),
	NotFound,
	/// Operation not valid for the current document state
	Conflict(String),
	/// Unexpected store failure
	Store(store::Error),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match &self.kind {
			ErrorKind::Unauthenticated => write!(f, "authentication required"),
			ErrorKind::Forbidden => write!(f, "operation not permitted for this account"),
			ErrorKind::Validation(msg) => write!(f, "invalid request: {}", msg),
			ErrorKind::NotFound => write!(f, "resource not found"),
			ErrorKind::Conflict(msg) => write!(f, "conflict: {}", msg),
			ErrorKind::Store(e) => write!(f, "store error: {}", e),
		}
	}
}

impl From<store::Error> for Error {
	fn from(e: store::Error) -> Self {
		match e {
			store::Error::RecordNotFound => Error::new(ErrorKind::NotFound),
			store::Error::PreconditionFailed(msg) => Error::new(ErrorKind::Conflict(msg)),
			other => Error::new(ErrorKind::Store(other)),
		}
	}
}

impl From<auth::Error> for Error {
	fn from(e: auth::Error) -> Self {
		match e {
			auth::Error::InvalidToken => Error::new(ErrorKind::Unauthenticated),
			auth::Error::EmailTaken => Error::conflict("email is already registered"),
			auth::Error::UnknownUser => Error::new(ErrorKind::NotFound),
		}
	}
}

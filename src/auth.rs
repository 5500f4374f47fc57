use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::account::UserType;
use crate::types::Id;

pub type Result<T> = std::result::Result<T, Error>;

/// Error that can occur when talking to the identity directory
#[derive(Debug, PartialEq)]
pub enum Error {
	InvalidToken,
	EmailTaken,
	UnknownUser,
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Error::InvalidToken => write!(f, "token is missing, expired or malformed"),
			Error::EmailTaken => write!(f, "email is already registered"),
			Error::UnknownUser => write!(f, "identity does not exist"),
		}
	}
}

/// Verified caller identity attached to every authenticated request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
	pub uid: Id,
	pub email: String,
	pub user_type: UserType,
}

struct Identity {
	email: String,
	user_type: UserType,
}

/// In-process identity provider: registers identities and issues opaque
/// bearer tokens. Stands in for the hosted identity service the original
/// deployment delegated to; verification is read-only and terminal per
/// request.
#[derive(Clone, Default)]
pub struct Directory {
	identities: Arc<RwLock<HashMap<Id, Identity>>>,
	tokens: Arc<RwLock<HashMap<String, Id>>>,
}

impl Directory {
	pub fn new() -> Self {
		Directory::default()
	}

	pub fn register(&self, email: &str, user_type: UserType) -> Result<Id> {
		let mut identities = write(&self.identities);
		if identities.values().any(|identity| identity.email == email) {
			return Err(Error::EmailTaken);
		}
		let uid = uuid::Uuid::new_v4();
		identities.insert(
			uid,
			Identity {
				email: email.to_string(),
				user_type,
			},
		);
		Ok(uid)
	}

	/// Issue a new opaque bearer token for a registered identity
	pub fn issue(&self, uid: &Id) -> Result<String> {
		if !read(&self.identities).contains_key(uid) {
			return Err(Error::UnknownUser);
		}
		let token = uuid::Uuid::new_v4().simple().to_string();
		write(&self.tokens).insert(token.clone(), *uid);
		Ok(token)
	}

	/// Map a bearer token back to the identity it was issued for
	pub fn verify(&self, token: &str) -> Result<AuthUser> {
		let uid = read(&self.tokens).get(token).copied().ok_or(Error::InvalidToken)?;
		let identities = read(&self.identities);
		let identity = identities.get(&uid).ok_or(Error::InvalidToken)?;
		Ok(AuthUser {
			uid,
			email: identity.email.clone(),
			user_type: identity.user_type,
		})
	}

	pub fn revoke_tokens(&self, uid: &Id) {
		write(&self.tokens).retain(|_, owner| owner != uid);
	}

	/// Remove an identity and every token issued for it
	pub fn delete_identity(&self, uid: &Id) -> Result<()> {
		self.revoke_tokens(uid);
		write(&self.identities)
			.remove(uid)
			.map(|_| ())
			.ok_or(Error::UnknownUser)
	}
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
	lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
	lock.write().unwrap_or_else(|e| e.into_inner())
}

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::store::{self, collections, Store};
use crate::types::{now, Id, Time};

/// One-time invitation consumed during lender company-admin signup.
///
/// The document id is the token string itself; `consume` is guarded on
/// `used == false` so a token can never be redeemed twice, even by
/// concurrent signups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankSignupToken {
	pub token: String,
	pub used: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub used_by: Option<Id>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub used_at: Option<Time>,
	pub created_by: Id,
	pub created_at: Time,
}

#[derive(Clone)]
pub struct Repo {
	store: Store,
}

impl Repo {
	pub fn new(store: Store) -> Self {
		Repo { store }
	}

	pub fn create(&self, created_by: &Id) -> store::Result<BankSignupToken> {
		let token = BankSignupToken {
			token: uuid::Uuid::new_v4().simple().to_string(),
			used: false,
			used_by: None,
			used_at: None,
			created_by: *created_by,
			created_at: now(),
		};
		self.store
			.insert(collections::SIGNUP_TOKENS, &token.token, store::to_doc(&token)?)?;
		Ok(token)
	}

	pub fn find(&self, token: &str) -> store::Result<BankSignupToken> {
		store::from_doc(self.store.get(collections::SIGNUP_TOKENS, token)?)
	}

	pub fn list(&self) -> store::Result<Vec<BankSignupToken>> {
		let mut tokens: Vec<BankSignupToken> = self
			.store
			.find(collections::SIGNUP_TOKENS, |_| true)
			.into_iter()
			.map(store::from_doc)
			.collect::<store::Result<_>>()?;
		tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(tokens)
	}

	/// Redeem a token for `used_by`; fails with `PreconditionFailed` when it
	/// was already used.
	pub fn consume(&self, token: &str, used_by: &Id) -> store::Result<()> {
		let mut batch = self.store.batch();
		batch.merge_if(
			collections::SIGNUP_TOKENS,
			token,
			json!({
				"used": true,
				"usedBy": used_by.to_string(),
				"usedAt": now(),
			}),
			vec![("used".to_string(), json!(false))],
		);
		self.store.commit(batch)
	}

	pub fn delete(&self, token: &str) -> store::Result<()> {
		self.store.delete(collections::SIGNUP_TOKENS, token).map(|_| ())
	}
}

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum_macros::{Display, EnumString};

use crate::store::{self, collections, Store};
use crate::types::{now, Id, Time};

/// Role of an account, stored as the document's `type` field.
///
/// `user` borrows, `b_sale` submits proposals for a lender company,
/// `b_admin` manages a lender company's subaccounts, `super_admin` manages
/// signup invitations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserType {
	User,
	BSale,
	BAdmin,
	SuperAdmin,
}

/// Identity record in the `cuentas` collection.
///
/// `Empresa` / `Empresa_id` keep their historical wire names; they are only
/// present on lender-company accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
	pub uid: Id,
	pub email: String,
	#[serde(rename = "type")]
	pub user_type: UserType,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub address: Option<String>,
	#[serde(rename = "Empresa", default, skip_serializing_if = "Option::is_none")]
	pub company: Option<String>,
	#[serde(rename = "Empresa_id", default, skip_serializing_if = "Option::is_none")]
	pub company_id: Option<Id>,
	pub created_at: Time,
	pub updated_at: Time,
}

pub struct NewAccount<'a> {
	pub uid: Id,
	pub email: &'a str,
	pub user_type: UserType,
	pub name: Option<&'a str>,
	pub address: Option<&'a str>,
	pub company: Option<&'a str>,
	pub company_id: Option<Id>,
}

#[derive(Clone)]
pub struct Repo {
	store: Store,
}

impl Repo {
	pub fn new(store: Store) -> Self {
		Repo { store }
	}

	pub fn create(&self, new_account: NewAccount) -> store::Result<Account> {
		let created = now();
		let account = Account {
			uid: new_account.uid,
			email: new_account.email.to_string(),
			user_type: new_account.user_type,
			name: new_account.name.map(str::to_string),
			address: new_account.address.map(str::to_string),
			company: new_account.company.map(str::to_string),
			company_id: new_account.company_id,
			created_at: created,
			updated_at: created,
		};
		self.store.insert(
			collections::ACCOUNTS,
			&account.uid.to_string(),
			store::to_doc(&account)?,
		)?;
		Ok(account)
	}

	pub fn find_by_uid(&self, uid: &Id) -> store::Result<Account> {
		store::from_doc(self.store.get(collections::ACCOUNTS, &uid.to_string())?)
	}

	pub fn find_by_email(&self, email: &str) -> store::Result<Account> {
		self.store
			.find(collections::ACCOUNTS, |doc| {
				doc.get("email").and_then(Value::as_str) == Some(email)
			})
			.into_iter()
			.next()
			.ok_or(store::Error::RecordNotFound)
			.and_then(store::from_doc)
	}

	pub fn list_by_company(&self, company_id: &Id) -> store::Result<Vec<Account>> {
		let company_id = company_id.to_string();
		self.store
			.find(collections::ACCOUNTS, |doc| {
				doc.get("Empresa_id").and_then(Value::as_str) == Some(company_id.as_str())
			})
			.into_iter()
			.map(store::from_doc)
			.collect()
	}

	pub fn delete(&self, uid: &Id) -> store::Result<Account> {
		store::from_doc(self.store.delete(collections::ACCOUNTS, &uid.to_string())?)
	}

	/// Rewrite legacy role aliases (`sale`, `admin`) left behind by early
	/// clients on one company's accounts. Returns the number migrated.
	pub fn migrate_company_roles(&self, company_id: &Id) -> store::Result<usize> {
		let company_id = company_id.to_string();
		let legacy = self.store.find(collections::ACCOUNTS, |doc| {
			doc.get("Empresa_id").and_then(Value::as_str) == Some(company_id.as_str())
				&& matches!(
					doc.get("type").and_then(Value::as_str),
					Some("sale") | Some("admin")
				)
		});

		let mut migrated = 0;
		for doc in legacy {
			let uid = match doc.get("uid").and_then(Value::as_str) {
				Some(uid) => uid.to_string(),
				None => continue,
			};
			let canonical = match doc.get("type").and_then(Value::as_str) {
				Some("sale") => UserType::BSale,
				Some("admin") => UserType::BAdmin,
				_ => continue,
			};
			self.store.merge(
				collections::ACCOUNTS,
				&uid,
				json!({"type": canonical.to_string(), "updatedAt": now()}),
			)?;
			migrated += 1;
		}
		Ok(migrated)
	}
}

#[cfg(test)]
mod tests {
	use crate::testutil::*;

	use super::*;

	#[test]
	fn create_and_find_account() {
		let f = Fixture::new();
		let bob = f.accounts.bob();

		let found = f.suite().account_repo.find_by_uid(&bob.uid).unwrap();
		assert_eq!(found.email, bob.email);
		assert_eq!(found.user_type, UserType::User);

		let by_email = f.suite().account_repo.find_by_email(&bob.email).unwrap();
		assert_eq!(by_email.uid, bob.uid);
	}

	#[test]
	fn list_by_company() {
		let f = Fixture::new();
		let ana = f.accounts.ana();
		let _bob = f.accounts.bob();

		let company_id = ana.company_id.unwrap();
		let members = f.suite().account_repo.list_by_company(&company_id).unwrap();
		assert_eq!(members.len(), 1);
		assert_eq!(members[0].uid, ana.uid);
	}

	#[test]
	fn migrate_legacy_roles() {
		let f = Fixture::new();
		let admin = f.accounts.admin_norte();
		let company_id = admin.company_id.unwrap();

		// legacy document written by an early client
		let uid = uuid::Uuid::new_v4();
		f.store
			.insert(
				collections::ACCOUNTS,
				&uid.to_string(),
				json!({
					"uid": uid.to_string(),
					"email": "legacy@banconorte.mx",
					"type": "sale",
					"Empresa_id": company_id.to_string(),
					"createdAt": now(),
					"updatedAt": now(),
				}),
			)
			.unwrap();

		let migrated = f.suite().account_repo.migrate_company_roles(&company_id).unwrap();
		assert_eq!(migrated, 1);

		let fixed = f.suite().account_repo.find_by_uid(&uid).unwrap();
		assert_eq!(fixed.user_type, UserType::BSale);
	}
}

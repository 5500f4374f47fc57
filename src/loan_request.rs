use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum_macros::{Display, EnumString};

use crate::store::{self, collections, Store, WriteBatch};
use crate::types::{now, Id, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LoanStatus {
	Pending,
	Approved,
	Rejected,
}

impl Default for LoanStatus {
	fn default() -> Self {
		LoanStatus::Pending
	}
}

/// Borrower's published request in the `solicitudes` collection.
///
/// `status` moves from `pending` to `approved` only through the acceptance
/// workflow, which also sets `acceptedOfferId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanRequest {
	pub id: Id,
	pub user_id: Id,
	pub amount: BigDecimal,
	pub income: BigDecimal,
	pub term: String,
	/// Requested repayment frequency, e.g. "mensual"
	pub payment: String,
	pub purpose: String,
	#[serde(rename = "type")]
	pub kind: String,
	pub status: LoanStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub accepted_offer_id: Option<Id>,
	pub created_at: Time,
	pub updated_at: Time,
}

pub struct NewLoanRequest<'a> {
	pub user_id: Id,
	pub amount: BigDecimal,
	pub income: BigDecimal,
	pub term: &'a str,
	pub payment: &'a str,
	pub purpose: &'a str,
	pub kind: &'a str,
}

#[derive(Clone)]
pub struct Repo {
	store: Store,
}

impl Repo {
	pub fn new(store: Store) -> Self {
		Repo { store }
	}

	pub fn create(&self, new_loan: NewLoanRequest) -> store::Result<LoanRequest> {
		let created = now();
		let loan = LoanRequest {
			id: uuid::Uuid::new_v4(),
			user_id: new_loan.user_id,
			amount: new_loan.amount,
			income: new_loan.income,
			term: new_loan.term.to_string(),
			payment: new_loan.payment.to_string(),
			purpose: new_loan.purpose.to_string(),
			kind: new_loan.kind.to_string(),
			status: LoanStatus::default(),
			accepted_offer_id: None,
			created_at: created,
			updated_at: created,
		};
		self.store.insert(
			collections::LOAN_REQUESTS,
			&loan.id.to_string(),
			store::to_doc(&loan)?,
		)?;
		Ok(loan)
	}

	pub fn find_by_id(&self, id: &Id) -> store::Result<LoanRequest> {
		store::from_doc(self.store.get(collections::LOAN_REQUESTS, &id.to_string())?)
	}

	pub fn list_by_user(&self, user_id: &Id) -> store::Result<Vec<LoanRequest>> {
		let user_id = user_id.to_string();
		let mut loans: Vec<LoanRequest> = self
			.store
			.find(collections::LOAN_REQUESTS, |doc| {
				doc.get("userId").and_then(Value::as_str) == Some(user_id.as_str())
			})
			.into_iter()
			.map(store::from_doc)
			.collect::<store::Result<_>>()?;
		loans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(loans)
	}

	/// Requests still open for proposals, newest first
	pub fn list_open(&self) -> store::Result<Vec<LoanRequest>> {
		let mut loans: Vec<LoanRequest> = self
			.store
			.find(collections::LOAN_REQUESTS, |doc| {
				doc.get("status").and_then(Value::as_str) == Some("pending")
			})
			.into_iter()
			.map(store::from_doc)
			.collect::<store::Result<_>>()?;
		loans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(loans)
	}

	/// Stage the pending → approved transition on a batch, guarded so a
	/// concurrent acceptance fails the whole commit instead of racing.
	pub fn stage_approve(&self, batch: &mut WriteBatch, id: &Id, accepted_offer_id: &Id) {
		batch.merge_if(
			collections::LOAN_REQUESTS,
			&id.to_string(),
			json!({
				"status": LoanStatus::Approved.to_string(),
				"acceptedOfferId": accepted_offer_id.to_string(),
				"updatedAt": now(),
			}),
			vec![("status".to_string(), json!(LoanStatus::Pending.to_string()))],
		);
	}

	/// Stage deletion, guarded on the request still being pending
	pub fn stage_delete_pending(&self, batch: &mut WriteBatch, id: &Id) {
		batch.delete_if(
			collections::LOAN_REQUESTS,
			&id.to_string(),
			vec![("status".to_string(), json!(LoanStatus::Pending.to_string()))],
		);
	}
}

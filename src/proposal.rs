use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strum_macros::{Display, EnumString};

use crate::store::{self, collections, Store, WriteBatch};
use crate::types::{now, Id, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProposalStatus {
	Pending,
	Accepted,
	Rejected,
}

impl Default for ProposalStatus {
	fn default() -> Self {
		ProposalStatus::Pending
	}
}

/// Lender's competing offer in the `propuestas` collection.
///
/// At most one proposal per loan request ever reaches `accepted`; the
/// acceptance workflow rejects all pending siblings in the same batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
	pub id: Id,
	pub loan_id: Id,
	pub lender_id: Id,
	/// Display name of the lender company
	pub partner: String,
	pub amount: BigDecimal,
	pub interest_rate: BigDecimal,
	pub term: String,
	pub amortization_frequency: String,
	/// Periodic payment the lender quotes
	pub amortization: BigDecimal,
	pub comision: BigDecimal,
	pub medical_balance: BigDecimal,
	pub status: ProposalStatus,
	pub created_at: Time,
	pub updated_at: Time,
}

pub struct NewProposal<'a> {
	pub loan_id: Id,
	pub lender_id: Id,
	pub partner: &'a str,
	pub amount: BigDecimal,
	pub interest_rate: BigDecimal,
	pub term: &'a str,
	pub amortization_frequency: &'a str,
	pub amortization: BigDecimal,
	pub comision: BigDecimal,
	pub medical_balance: BigDecimal,
}

#[derive(Clone)]
pub struct Repo {
	store: Store,
}

impl Repo {
	pub fn new(store: Store) -> Self {
		Repo { store }
	}

	pub fn create(&self, new_proposal: NewProposal) -> store::Result<Proposal> {
		let created = now();
		let proposal = Proposal {
			id: uuid::Uuid::new_v4(),
			loan_id: new_proposal.loan_id,
			lender_id: new_proposal.lender_id,
			partner: new_proposal.partner.to_string(),
			amount: new_proposal.amount,
			interest_rate: new_proposal.interest_rate,
			term: new_proposal.term.to_string(),
			amortization_frequency: new_proposal.amortization_frequency.to_string(),
			amortization: new_proposal.amortization,
			comision: new_proposal.comision,
			medical_balance: new_proposal.medical_balance,
			status: ProposalStatus::default(),
			created_at: created,
			updated_at: created,
		};
		self.store.insert(
			collections::PROPOSALS,
			&proposal.id.to_string(),
			store::to_doc(&proposal)?,
		)?;
		Ok(proposal)
	}

	pub fn find_by_id(&self, id: &Id) -> store::Result<Proposal> {
		store::from_doc(self.store.get(collections::PROPOSALS, &id.to_string())?)
	}

	pub fn list_by_loan(&self, loan_id: &Id) -> store::Result<Vec<Proposal>> {
		self.collect(|doc| {
			doc.get("loanId").and_then(Value::as_str) == Some(loan_id.to_string().as_str())
		})
	}

	pub fn list_by_lender(&self, lender_id: &Id) -> store::Result<Vec<Proposal>> {
		self.collect(|doc| {
			doc.get("lenderId").and_then(Value::as_str) == Some(lender_id.to_string().as_str())
		})
	}

	pub fn pending_by_loan(&self, loan_id: &Id) -> store::Result<Vec<Proposal>> {
		self.collect(|doc| {
			doc.get("loanId").and_then(Value::as_str) == Some(loan_id.to_string().as_str())
				&& doc.get("status").and_then(Value::as_str) == Some("pending")
		})
	}

	/// Cascade used when a pending loan request is deleted; returns the
	/// number of proposals removed.
	pub fn delete_by_loan(&self, loan_id: &Id) -> usize {
		let loan_id = loan_id.to_string();
		self.store.delete_where(collections::PROPOSALS, |doc| {
			doc.get("loanId").and_then(Value::as_str) == Some(loan_id.as_str())
		})
	}

	/// Stage a guarded status transition on a batch; the commit fails if the
	/// proposal has moved away from `from` in the meantime.
	pub fn stage_status(&self, batch: &mut WriteBatch, id: &Id, from: ProposalStatus, to: ProposalStatus) {
		batch.merge_if(
			collections::PROPOSALS,
			&id.to_string(),
			json!({"status": to.to_string(), "updatedAt": now()}),
			vec![("status".to_string(), json!(from.to_string()))],
		);
	}

	pub fn stage_delete(&self, batch: &mut WriteBatch, id: &Id) {
		batch.delete(collections::PROPOSALS, &id.to_string());
	}

	fn collect<F>(&self, pred: F) -> store::Result<Vec<Proposal>>
	where
		F: Fn(&Value) -> bool,
	{
		let mut proposals: Vec<Proposal> = self
			.store
			.find(collections::PROPOSALS, pred)
			.into_iter()
			.map(store::from_doc)
			.collect::<store::Result<_>>()?;
		proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(proposals)
	}
}

#[cfg(test)]
mod tests {
	use crate::testutil::*;

	use super::*;

	#[test]
	fn create_and_list_by_loan() {
		let f = Fixture::new();
		let suite = f.suite();
		let bob = f.accounts.bob();
		let ana = f.accounts.ana();
		let loan = f.loan_for(&bob);

		let proposal = f.proposal_for(&ana, &loan);
		assert_eq!(proposal.status, ProposalStatus::Pending);

		let listed = suite.proposal_repo.list_by_loan(&loan.id).unwrap();
		assert_eq!(listed.len(), 1);
		assert_eq!(listed[0].id, proposal.id);

		let by_lender = suite.proposal_repo.list_by_lender(&ana.uid).unwrap();
		assert_eq!(by_lender.len(), 1);
	}

	#[test]
	fn pending_by_loan_ignores_settled() {
		let f = Fixture::new();
		let suite = f.suite();
		let bob = f.accounts.bob();
		let ana = f.accounts.ana();
		let marco = f.accounts.marco();
		let loan = f.loan_for(&bob);

		let winner = f.proposal_for(&ana, &loan);
		let _still_open = f.proposal_for(&marco, &loan);

		let mut batch = f.store.batch();
		suite
			.proposal_repo
			.stage_status(&mut batch, &winner.id, ProposalStatus::Pending, ProposalStatus::Accepted);
		f.store.commit(batch).unwrap();

		let pending = suite.proposal_repo.pending_by_loan(&loan.id).unwrap();
		assert_eq!(pending.len(), 1);
		assert_ne!(pending[0].id, winner.id);
	}

	#[test]
	fn delete_by_loan_counts() {
		let f = Fixture::new();
		let suite = f.suite();
		let bob = f.accounts.bob();
		let ana = f.accounts.ana();
		let marco = f.accounts.marco();

		let loan = f.loan_for(&bob);
		let other_loan = f.loan_for(&bob);
		f.proposal_for(&ana, &loan);
		f.proposal_for(&marco, &loan);
		let kept = f.proposal_for(&ana, &other_loan);

		assert_eq!(suite.proposal_repo.delete_by_loan(&loan.id), 2);
		assert!(suite.proposal_repo.find_by_id(&kept.id).is_ok());
	}
}

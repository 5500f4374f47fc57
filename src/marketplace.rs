use bigdecimal::BigDecimal;
use log::info;
use serde::Serialize;
use serde_json::json;

use crate::account::{self, Account, NewAccount, UserType};
use crate::auth::{AuthUser, Directory};
use crate::loan_request::{self, LoanRequest, LoanStatus, NewLoanRequest};
use crate::notification::{self, NewNotification, Notification, NotificationKind, Notifier};
use crate::proposal::{self, NewProposal, Proposal, ProposalStatus};
use crate::signup_token::{self, BankSignupToken};
use crate::store::{self, collections, Store};
use crate::types::Id;
use crate::validate;

pub use self::error::{Error, ErrorKind, Result};

pub mod error;

/// Parameter object for creating a new MarketplaceService
pub struct NewMarketplaceService {
	pub store: Store,
	pub directory: Directory,
	pub account_repo: account::Repo,
	pub loan_repo: loan_request::Repo,
	pub proposal_repo: proposal::Repo,
	pub notification_repo: notification::Repo,
	pub token_repo: signup_token::Repo,
	pub notifier: Notifier,
}

/// Service for performing marketplace operations.
///
/// Every operation validates its input, checks the caller's role or
/// ownership, then touches the store; the acceptance workflow is the only
/// multi-document atomic region.
#[derive(Clone)]
pub struct MarketplaceService {
	store: Store,
	directory: Directory,
	account_repo: account::Repo,
	loan_repo: loan_request::Repo,
	proposal_repo: proposal::Repo,
	notification_repo: notification::Repo,
	token_repo: signup_token::Repo,
	notifier: Notifier,
}

pub struct Signup<'a> {
	pub email: &'a str,
	pub user_type: UserType,
	pub name: Option<&'a str>,
	pub address: Option<&'a str>,
	pub company: Option<&'a str>,
	pub invite_token: Option<&'a str>,
}

pub struct LoanRequestInput<'a> {
	pub amount: BigDecimal,
	pub income: BigDecimal,
	pub term: &'a str,
	pub payment: &'a str,
	pub purpose: &'a str,
	pub kind: &'a str,
}

pub struct ProposalInput<'a> {
	pub loan_id: Id,
	pub amount: BigDecimal,
	pub interest_rate: BigDecimal,
	pub term: &'a str,
	pub amortization_frequency: &'a str,
	pub amortization: BigDecimal,
	pub comision: BigDecimal,
	pub medical_balance: BigDecimal,
}

pub struct NewSubaccount<'a> {
	pub email: &'a str,
	pub name: &'a str,
}

/// Result of the acceptance workflow, echoed to the borrower.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptOutcome {
	pub loan_id: Id,
	pub accepted_proposal_id: Id,
	pub rejected_proposal_ids: Vec<Id>,
}

impl MarketplaceService {
	pub fn new(n: NewMarketplaceService) -> Self {
		MarketplaceService {
			store: n.store,
			directory: n.directory,
			account_repo: n.account_repo,
			loan_repo: n.loan_repo,
			proposal_repo: n.proposal_repo,
			notification_repo: n.notification_repo,
			token_repo: n.token_repo,
			notifier: n.notifier,
		}
	}

	// ---- accounts ----

	/// Self-service signup. Borrowers register directly; lender company
	/// admins additionally redeem a one-time invitation token. Lender reps
	/// are provisioned by their admin and the super admin at boot, never
	/// here.
	pub fn signup(&self, new: Signup) -> Result<(Account, String)> {
		validate::email("email", new.email).map_err(Error::validation)?;
		match new.user_type {
			UserType::User => self.signup_user(new),
			UserType::BAdmin => self.signup_bank_admin(new),
			UserType::BSale | UserType::SuperAdmin => Err(Error::forbidden()),
		}
	}

	fn signup_user(&self, new: Signup) -> Result<(Account, String)> {
		let uid = self.directory.register(new.email, UserType::User)?;
		let account = self.create_account_or_compensate(NewAccount {
			uid,
			email: new.email,
			user_type: UserType::User,
			name: new.name,
			address: new.address,
			company: None,
			company_id: None,
		})?;
		let token = self.directory.issue(&uid)?;
		Ok((account, token))
	}

	fn signup_bank_admin(&self, new: Signup) -> Result<(Account, String)> {
		let invite = new
			.invite_token
			.ok_or_else(|| Error::validation("token is required for b_admin signup"))?;
		let company = new
			.company
			.ok_or_else(|| Error::validation("Empresa is required for b_admin signup"))?;
		validate::non_empty("Empresa", company).map_err(Error::validation)?;

		// cheap reject up front; the guarded consume below still closes the race
		let record = self
			.token_repo
			.find(invite)
			.map_err(|_| Error::conflict("invalid signup token"))?;
		if record.used {
			return Err(Error::conflict("signup token already used"));
		}

		let uid = self.directory.register(new.email, UserType::BAdmin)?;
		if let Err(e) = self.token_repo.consume(invite, &uid) {
			let _ = self.directory.delete_identity(&uid);
			return Err(match e {
				store::Error::PreconditionFailed(_) => Error::conflict("signup token already used"),
				store::Error::RecordNotFound => Error::conflict("invalid signup token"),
				other => other.into(),
			});
		}

		let account = self.create_account_or_compensate(NewAccount {
			uid,
			email: new.email,
			user_type: UserType::BAdmin,
			name: new.name,
			address: new.address,
			company: Some(company),
			company_id: Some(uuid::Uuid::new_v4()),
		})?;
		let token = self.directory.issue(&uid)?;
		Ok((account, token))
	}

	/// Ensure the super admin exists; returns a fresh token either way.
	pub fn bootstrap_super_admin(&self, email: &str) -> Result<(Account, String)> {
		if let Ok(existing) = self.account_repo.find_by_email(email) {
			let token = self.directory.issue(&existing.uid)?;
			return Ok((existing, token));
		}
		let uid = self.directory.register(email, UserType::SuperAdmin)?;
		let account = self.create_account_or_compensate(NewAccount {
			uid,
			email,
			user_type: UserType::SuperAdmin,
			name: Some("Super Admin"),
			address: None,
			company: None,
			company_id: None,
		})?;
		let token = self.directory.issue(&uid)?;
		Ok((account, token))
	}

	fn create_account_or_compensate(&self, new_account: NewAccount) -> Result<Account> {
		let uid = new_account.uid;
		match self.account_repo.create(new_account) {
			Ok(account) => Ok(account),
			Err(e) => {
				// roll the identity back so a failed signup leaves nothing
				let _ = self.directory.delete_identity(&uid);
				Err(e.into())
			}
		}
	}

	// ---- loan requests ----

	pub fn create_loan_request(&self, caller: &AuthUser, input: LoanRequestInput) -> Result<LoanRequest> {
		self.require_role(caller, UserType::User)?;
		validate::positive("amount", &input.amount).map_err(Error::validation)?;
		validate::positive("income", &input.income).map_err(Error::validation)?;
		validate::non_empty("term", input.term).map_err(Error::validation)?;
		validate::non_empty("payment", input.payment).map_err(Error::validation)?;
		validate::non_empty("purpose", input.purpose).map_err(Error::validation)?;
		validate::non_empty("type", input.kind).map_err(Error::validation)?;

		self.loan_repo
			.create(NewLoanRequest {
				user_id: caller.uid,
				amount: input.amount,
				income: input.income,
				term: input.term,
				payment: input.payment,
				purpose: input.purpose,
				kind: input.kind,
			})
			.map_err(Into::into)
	}

	pub fn list_loan_requests(&self, caller: &AuthUser) -> Result<Vec<LoanRequest>> {
		self.require_role(caller, UserType::User)?;
		self.loan_repo.list_by_user(&caller.uid).map_err(Into::into)
	}

	pub fn list_open_loan_requests(&self, caller: &AuthUser) -> Result<Vec<LoanRequest>> {
		self.require_role(caller, UserType::BSale)?;
		self.loan_repo.list_open().map_err(Into::into)
	}

	/// Delete an owned, still-pending loan request together with all of its
	/// proposals. Returns the number of proposals removed.
	pub fn delete_loan_request(&self, caller: &AuthUser, id: &Id) -> Result<usize> {
		let loan = self.loan_repo.find_by_id(id)?;
		if loan.user_id != caller.uid {
			return Err(Error::forbidden());
		}
		if loan.status != LoanStatus::Pending {
			return Err(Error::conflict("only pending loan requests can be deleted"));
		}

		let proposals = self.proposal_repo.list_by_loan(id)?;
		let mut batch = self.store.batch();
		self.loan_repo.stage_delete_pending(&mut batch, id);
		for proposal in &proposals {
			self.proposal_repo.stage_delete(&mut batch, &proposal.id);
		}
		// guarded: fails whole if the request got approved in the meantime
		self.store.commit(batch)?;
		Ok(proposals.len())
	}

	// ---- proposals ----

	pub fn create_proposal(&self, caller: &AuthUser, input: ProposalInput) -> Result<Proposal> {
		self.require_role(caller, UserType::BSale)?;
		validate::positive("amount", &input.amount).map_err(Error::validation)?;
		validate::positive("interestRate", &input.interest_rate).map_err(Error::validation)?;
		validate::non_empty("term", input.term).map_err(Error::validation)?;
		validate::non_empty("amortizationFrequency", input.amortization_frequency)
			.map_err(Error::validation)?;
		validate::positive("amortization", &input.amortization).map_err(Error::validation)?;
		validate::not_negative("comision", &input.comision).map_err(Error::validation)?;
		validate::not_negative("medicalBalance", &input.medical_balance).map_err(Error::validation)?;

		let loan = self.loan_repo.find_by_id(&input.loan_id)?;
		if loan.status != LoanStatus::Pending {
			return Err(Error::conflict("loan request is not open for proposals"));
		}

		let lender = self.account_repo.find_by_uid(&caller.uid)?;
		let partner = lender.company.unwrap_or_else(|| caller.email.clone());

		let proposal = self.proposal_repo.create(NewProposal {
			loan_id: loan.id,
			lender_id: caller.uid,
			partner: &partner,
			amount: input.amount,
			interest_rate: input.interest_rate,
			term: input.term,
			amortization_frequency: input.amortization_frequency,
			amortization: input.amortization,
			comision: input.comision,
			medical_balance: input.medical_balance,
		})?;

		let borrower_email = self.account_repo.find_by_uid(&loan.user_id).ok().map(|a| a.email);
		self.notifier.notify(
			NewNotification {
				recipient_id: loan.user_id,
				kind: NotificationKind::ProposalReceived,
				title: "Nueva propuesta",
				message: &format!("{} envió una propuesta para tu solicitud", partner),
				data: json!({"loanId": loan.id, "proposalId": proposal.id}),
			},
			borrower_email.as_deref(),
		);

		Ok(proposal)
	}

	pub fn list_offers(&self, _caller: &AuthUser, loan_id: &Id) -> Result<Vec<Proposal>> {
		// 404 for unknown requests rather than an empty list
		self.loan_repo.find_by_id(loan_id)?;
		self.proposal_repo.list_by_loan(loan_id).map_err(Into::into)
	}

	pub fn list_lender_proposals(&self, caller: &AuthUser) -> Result<Vec<Proposal>> {
		self.require_role(caller, UserType::BSale)?;
		self.proposal_repo.list_by_lender(&caller.uid).map_err(Into::into)
	}

	/// The acceptance workflow: one guarded batch flips the winner to
	/// `accepted`, the loan request to `approved`, and every other pending
	/// sibling to `rejected`. The notification fan-out that follows is
	/// intentionally outside the atomic region.
	pub fn accept_proposal(&self, caller: &AuthUser, proposal_id: &Id) -> Result<AcceptOutcome> {
		let winner = self.proposal_repo.find_by_id(proposal_id)?;
		let loan = self.loan_repo.find_by_id(&winner.loan_id)?;
		if loan.user_id != caller.uid {
			return Err(Error::forbidden());
		}
		if winner.status != ProposalStatus::Pending {
			return Err(Error::conflict("proposal is no longer pending"));
		}
		if loan.status != LoanStatus::Pending {
			return Err(Error::conflict("loan request is no longer pending"));
		}

		let losers: Vec<Proposal> = self
			.proposal_repo
			.pending_by_loan(&loan.id)?
			.into_iter()
			.filter(|p| p.id != winner.id)
			.collect();

		let mut batch = self.store.batch();
		self.proposal_repo
			.stage_status(&mut batch, &winner.id, ProposalStatus::Pending, ProposalStatus::Accepted);
		self.loan_repo.stage_approve(&mut batch, &loan.id, &winner.id);
		for loser in &losers {
			self.proposal_repo
				.stage_status(&mut batch, &loser.id, ProposalStatus::Pending, ProposalStatus::Rejected);
		}
		self.store.commit(batch)?;

		info!(
			target: "credito::marketplace",
			"loan request {} approved: proposal {} accepted, {} rejected",
			loan.id, winner.id, losers.len()
		);

		self.notify_lender(&winner, &loan, NotificationKind::LoanAccepted);
		for loser in &losers {
			self.notify_lender(loser, &loan, NotificationKind::LoanAssignedOther);
		}

		Ok(AcceptOutcome {
			loan_id: loan.id,
			accepted_proposal_id: winner.id,
			rejected_proposal_ids: losers.into_iter().map(|p| p.id).collect(),
		})
	}

	fn notify_lender(&self, proposal: &Proposal, loan: &LoanRequest, kind: NotificationKind) {
		let (title, message) = match kind {
			NotificationKind::LoanAccepted => (
				"Propuesta aceptada",
				format!("Tu propuesta por {} fue aceptada", proposal.amount),
			),
			NotificationKind::LoanAssignedOther => (
				"Solicitud asignada",
				"La solicitud fue asignada a otra entidad".to_string(),
			),
			NotificationKind::ProposalReceived => (
				"Nueva propuesta",
				format!("Nueva propuesta de {}", proposal.partner),
			),
		};
		let email = self
			.account_repo
			.find_by_uid(&proposal.lender_id)
			.ok()
			.map(|a| a.email);
		self.notifier.notify(
			NewNotification {
				recipient_id: proposal.lender_id,
				kind,
				title,
				message: &message,
				data: json!({"loanId": loan.id, "proposalId": proposal.id}),
			},
			email.as_deref(),
		);
	}

	// ---- subaccounts ----

	pub fn create_subaccount(&self, caller: &AuthUser, new: NewSubaccount) -> Result<Account> {
		self.require_role(caller, UserType::BAdmin)?;
		validate::email("email", new.email).map_err(Error::validation)?;
		validate::non_empty("name", new.name).map_err(Error::validation)?;

		let admin = self.account_repo.find_by_uid(&caller.uid)?;
		let company_id = admin
			.company_id
			.ok_or_else(|| Error::conflict("admin account is not attached to a company"))?;

		let uid = self.directory.register(new.email, UserType::BSale)?;
		self.create_account_or_compensate(NewAccount {
			uid,
			email: new.email,
			user_type: UserType::BSale,
			name: Some(new.name),
			address: None,
			company: admin.company.as_deref(),
			company_id: Some(company_id),
		})
	}

	pub fn list_subaccounts(&self, caller: &AuthUser) -> Result<Vec<Account>> {
		self.require_role(caller, UserType::BAdmin)?;
		let admin = self.account_repo.find_by_uid(&caller.uid)?;
		let company_id = admin
			.company_id
			.ok_or_else(|| Error::conflict("admin account is not attached to a company"))?;
		let members = self.account_repo.list_by_company(&company_id)?;
		Ok(members
			.into_iter()
			.filter(|a| a.user_type == UserType::BSale)
			.collect())
	}

	/// Remove a worker account from the caller's company. The store record
	/// goes first; if identity deletion then fails the record is restored,
	/// so neither side is left orphaned.
	pub fn delete_subaccount(&self, caller: &AuthUser, uid: &Id) -> Result<()> {
		self.require_role(caller, UserType::BAdmin)?;
		let admin = self.account_repo.find_by_uid(&caller.uid)?;
		let target = self.account_repo.find_by_uid(uid)?;

		if target.user_type != UserType::BSale
			|| target.company_id.is_none()
			|| target.company_id != admin.company_id
		{
			return Err(Error::forbidden());
		}

		let removed = self.account_repo.delete(uid)?;
		if let Err(e) = self.directory.delete_identity(uid) {
			if e != crate::auth::Error::UnknownUser {
				let _ = self
					.store
					.insert(collections::ACCOUNTS, &uid.to_string(), store::to_doc(&removed)?);
				return Err(Error::conflict("subaccount deletion could not complete"));
			}
			// identity already gone: treat as done
		}
		Ok(())
	}

	// ---- notifications ----

	pub fn list_notifications(&self, caller: &AuthUser) -> Result<Vec<Notification>> {
		self.notification_repo.list_by_recipient(&caller.uid).map_err(Into::into)
	}

	pub fn mark_notification_read(&self, caller: &AuthUser, id: &Id) -> Result<Notification> {
		let notification = self.notification_repo.find_by_id(id)?;
		if notification.recipient_id != caller.uid {
			return Err(Error::forbidden());
		}
		self.notification_repo.mark_read(id).map_err(Into::into)
	}

	/// Bulk-delete the caller's notifications; `read_only` keeps unread
	/// ones. Returns the deleted count.
	pub fn clear_notifications(&self, caller: &AuthUser, read_only: bool) -> Result<usize> {
		let deleted = if read_only {
			self.notification_repo.clear_read(&caller.uid)
		} else {
			self.notification_repo.clear_all(&caller.uid)
		};
		Ok(deleted)
	}

	// ---- signup tokens ----

	pub fn create_signup_token(&self, caller: &AuthUser) -> Result<BankSignupToken> {
		self.require_role(caller, UserType::SuperAdmin)?;
		self.token_repo.create(&caller.uid).map_err(Into::into)
	}

	pub fn list_signup_tokens(&self, caller: &AuthUser) -> Result<Vec<BankSignupToken>> {
		self.require_role(caller, UserType::SuperAdmin)?;
		self.token_repo.list().map_err(Into::into)
	}

	pub fn delete_signup_token(&self, caller: &AuthUser, token: &str) -> Result<()> {
		self.require_role(caller, UserType::SuperAdmin)?;
		self.token_repo.delete(token).map_err(Into::into)
	}

	// ---- one-off maintenance ----

	pub fn migrate_user_roles(&self, caller: &AuthUser) -> Result<usize> {
		self.require_role(caller, UserType::BAdmin)?;
		let admin = self.account_repo.find_by_uid(&caller.uid)?;
		let company_id = admin
			.company_id
			.ok_or_else(|| Error::conflict("admin account is not attached to a company"))?;
		self.account_repo.migrate_company_roles(&company_id).map_err(Into::into)
	}

	fn require_role(&self, caller: &AuthUser, role: UserType) -> Result<()> {
		if caller.user_type != role {
			return Err(Error::forbidden());
		}
		Ok(())
	}
}

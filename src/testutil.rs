use std::sync::Arc;

pub use bigdecimal::BigDecimal;

use crate::account::{self, Account, NewAccount, UserType};
use crate::auth::{AuthUser, Directory};
use crate::loan_request::{self, LoanRequest, NewLoanRequest};
use crate::marketplace::{MarketplaceService, NewMarketplaceService};
use crate::notification::{self, LogMailer, Notifier};
use crate::proposal::{self, NewProposal, Proposal};
use crate::signup_token;
use crate::store::Store;
use crate::types::Id;

/// Shared scaffolding for unit tests: a fresh in-memory store and identity
/// directory plus factories for the recurring cast.
pub struct Fixture {
	pub store: Store,
	pub directory: Directory,
	pub accounts: AccountFactory,
}

pub struct Suite {
	pub account_repo: account::Repo,
	pub loan_repo: loan_request::Repo,
	pub proposal_repo: proposal::Repo,
	pub notification_repo: notification::Repo,
	pub token_repo: signup_token::Repo,
}

impl Fixture {
	pub fn new() -> Fixture {
		let store = Store::new();
		let directory = Directory::new();
		let accounts = AccountFactory {
			store: store.clone(),
			directory: directory.clone(),
			norte_id: uuid::Uuid::new_v4(),
			sur_id: uuid::Uuid::new_v4(),
		};
		Fixture {
			store,
			directory,
			accounts,
		}
	}

	pub fn suite(&self) -> Suite {
		Suite {
			account_repo: account::Repo::new(self.store.clone()),
			loan_repo: loan_request::Repo::new(self.store.clone()),
			proposal_repo: proposal::Repo::new(self.store.clone()),
			notification_repo: notification::Repo::new(self.store.clone()),
			token_repo: signup_token::Repo::new(self.store.clone()),
		}
	}

	pub fn service(&self) -> MarketplaceService {
		let suite = self.suite();
		let notifier = Notifier::new(suite.notification_repo.clone(), Arc::new(LogMailer));
		MarketplaceService::new(NewMarketplaceService {
			store: self.store.clone(),
			directory: self.directory.clone(),
			account_repo: suite.account_repo,
			loan_repo: suite.loan_repo,
			proposal_repo: suite.proposal_repo,
			notification_repo: suite.notification_repo,
			token_repo: suite.token_repo,
			notifier,
		})
	}

	pub fn auth(&self, account: &Account) -> AuthUser {
		AuthUser {
			uid: account.uid,
			email: account.email.clone(),
			user_type: account.user_type,
		}
	}

	pub fn login(&self, account: &Account) -> String {
		self.directory.issue(&account.uid).unwrap()
	}

	pub fn loan_for(&self, borrower: &Account) -> LoanRequest {
		self.suite()
			.loan_repo
			.create(NewLoanRequest {
				user_id: borrower.uid,
				amount: BigDecimal::from(250_000),
				income: BigDecimal::from(40_000),
				term: "24",
				payment: "mensual",
				purpose: "negocio",
				kind: "personal",
			})
			.unwrap()
	}

	pub fn proposal_for(&self, lender: &Account, loan: &LoanRequest) -> Proposal {
		self.suite()
			.proposal_repo
			.create(NewProposal {
				loan_id: loan.id,
				lender_id: lender.uid,
				partner: lender.company.as_deref().unwrap_or(&lender.email),
				amount: BigDecimal::from(250_000),
				interest_rate: "12.5".parse().unwrap(),
				term: "24",
				amortization_frequency: "mensual",
				amortization: BigDecimal::from(11_800),
				comision: BigDecimal::from(2),
				medical_balance: BigDecimal::from(0),
			})
			.unwrap()
	}
}

/// Named accounts: borrowers bob and lucy, lender reps ana (BancoNorte) and
/// marco (BancoSur), BancoNorte's admin, and the super admin.
pub struct AccountFactory {
	store: Store,
	directory: Directory,
	norte_id: Id,
	sur_id: Id,
}

impl AccountFactory {
	pub fn bob(&self) -> Account {
		self.create("bob@gmail.com", UserType::User, "Bob", None, None)
	}

	pub fn lucy(&self) -> Account {
		self.create("lucy@gmail.com", UserType::User, "Lucy", None, None)
	}

	pub fn ana(&self) -> Account {
		self.create(
			"ana@banconorte.mx",
			UserType::BSale,
			"Ana",
			Some("BancoNorte"),
			Some(self.norte_id),
		)
	}

	pub fn marco(&self) -> Account {
		self.create(
			"marco@bancosur.mx",
			UserType::BSale,
			"Marco",
			Some("BancoSur"),
			Some(self.sur_id),
		)
	}

	pub fn admin_norte(&self) -> Account {
		self.create(
			"admin@banconorte.mx",
			UserType::BAdmin,
			"Admin Norte",
			Some("BancoNorte"),
			Some(self.norte_id),
		)
	}

	pub fn root(&self) -> Account {
		self.create("root@buscocredito.mx", UserType::SuperAdmin, "Root", None, None)
	}

	fn create(
		&self,
		email: &str,
		user_type: UserType,
		name: &str,
		company: Option<&str>,
		company_id: Option<Id>,
	) -> Account {
		let uid = self.directory.register(email, user_type).unwrap();
		account::Repo::new(self.store.clone())
			.create(NewAccount {
				uid,
				email,
				user_type,
				name: Some(name),
				address: None,
				company,
				company_id,
			})
			.unwrap()
	}
}

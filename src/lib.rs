pub mod account;
pub mod auth;
pub mod config;
pub mod http;
pub mod loan_request;
pub mod marketplace;
pub mod notification;
pub mod proposal;
pub mod signup_token;
pub mod store;
pub mod types;
pub mod validate;

#[cfg(test)]
mod testutil;

pub use account::{Account, UserType};
pub use auth::{AuthUser, Directory};
pub use config::Config;
pub use loan_request::{LoanRequest, LoanStatus};
pub use marketplace::{Error, ErrorKind, MarketplaceService, NewMarketplaceService};
pub use notification::{Notification, NotificationKind, Notifier};
pub use proposal::{Proposal, ProposalStatus};
pub use signup_token::BankSignupToken;
pub use store::Store;
pub use types::{Id, Time};

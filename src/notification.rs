use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};

use crate::store::{self, collections, Store};
use crate::types::{now, Id, Time};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NotificationKind {
	/// Borrower: a lender submitted a proposal for your request
	ProposalReceived,
	/// Winning lender: your proposal was accepted
	LoanAccepted,
	/// Losing lender: the request was assigned to another company
	LoanAssignedOther,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
	pub id: Id,
	pub recipient_id: Id,
	#[serde(rename = "type")]
	pub kind: NotificationKind,
	pub title: String,
	pub message: String,
	pub data: Value,
	pub read: bool,
	pub created_at: Time,
}

pub struct NewNotification<'a> {
	pub recipient_id: Id,
	pub kind: NotificationKind,
	pub title: &'a str,
	pub message: &'a str,
	pub data: Value,
}

#[derive(Clone)]
pub struct Repo {
	store: Store,
}

impl Repo {
	pub fn new(store: Store) -> Self {
		Repo { store }
	}

	pub fn create(&self, new_notification: NewNotification) -> store::Result<Notification> {
		let notification = Notification {
			id: uuid::Uuid::new_v4(),
			recipient_id: new_notification.recipient_id,
			kind: new_notification.kind,
			title: new_notification.title.to_string(),
			message: new_notification.message.to_string(),
			data: new_notification.data,
			read: false,
			created_at: now(),
		};
		self.store.insert(
			collections::NOTIFICATIONS,
			&notification.id.to_string(),
			store::to_doc(&notification)?,
		)?;
		Ok(notification)
	}

	pub fn find_by_id(&self, id: &Id) -> store::Result<Notification> {
		store::from_doc(self.store.get(collections::NOTIFICATIONS, &id.to_string())?)
	}

	pub fn list_by_recipient(&self, recipient_id: &Id) -> store::Result<Vec<Notification>> {
		let recipient_id = recipient_id.to_string();
		let mut notifications: Vec<Notification> = self
			.store
			.find(collections::NOTIFICATIONS, |doc| {
				doc.get("recipientId").and_then(Value::as_str) == Some(recipient_id.as_str())
			})
			.into_iter()
			.map(store::from_doc)
			.collect::<store::Result<_>>()?;
		notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(notifications)
	}

	pub fn mark_read(&self, id: &Id) -> store::Result<Notification> {
		store::from_doc(self.store.merge(
			collections::NOTIFICATIONS,
			&id.to_string(),
			serde_json::json!({"read": true}),
		)?)
	}

	pub fn clear_all(&self, recipient_id: &Id) -> usize {
		let recipient_id = recipient_id.to_string();
		self.store.delete_where(collections::NOTIFICATIONS, |doc| {
			doc.get("recipientId").and_then(Value::as_str) == Some(recipient_id.as_str())
		})
	}

	pub fn clear_read(&self, recipient_id: &Id) -> usize {
		let recipient_id = recipient_id.to_string();
		self.store.delete_where(collections::NOTIFICATIONS, |doc| {
			doc.get("recipientId").and_then(Value::as_str) == Some(recipient_id.as_str())
				&& doc.get("read") == Some(&Value::Bool(true))
		})
	}
}

/// Outbound email collaborator. The real transport lives outside this
/// service; sends are best-effort and a failure never propagates.
pub trait Mailer: Send + Sync {
	fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), String>;
}

/// Default mailer: writes the would-be email to the log.
pub struct LogMailer;

impl Mailer for LogMailer {
	fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), String> {
		info!(target: "credito::mail", "email to {}: {}", to, subject);
		Ok(())
	}
}

/// Creates notification documents and hands them to the mailer.
///
/// Every failure here is logged and swallowed: fan-out runs after the
/// acceptance batch has committed and must never undo it.
#[derive(Clone)]
pub struct Notifier {
	repo: Repo,
	mailer: Arc<dyn Mailer>,
}

impl Notifier {
	pub fn new(repo: Repo, mailer: Arc<dyn Mailer>) -> Self {
		Notifier { repo, mailer }
	}

	pub fn notify(&self, new_notification: NewNotification, email: Option<&str>) {
		let kind = new_notification.kind;
		let recipient = new_notification.recipient_id;
		match self.repo.create(new_notification) {
			Ok(notification) => {
				if let Some(address) = email {
					if let Err(e) = self.mailer.send(address, &notification.title, &notification.message) {
						warn!(
							target: "credito::notify",
							"email for {} notification to {} failed: {}", kind, address, e
						);
					}
				}
			}
			Err(e) => {
				warn!(
					target: "credito::notify",
					"dropping {} notification for {}: {}", kind, recipient, e
				);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use crate::testutil::*;

	use super::*;

	#[test]
	fn create_list_and_mark_read() {
		let f = Fixture::new();
		let suite = f.suite();
		let bob = f.accounts.bob();

		let notification = suite
			.notification_repo
			.create(NewNotification {
				recipient_id: bob.uid,
				kind: NotificationKind::ProposalReceived,
				title: "Nueva propuesta",
				message: "Recibiste una propuesta",
				data: json!({}),
			})
			.unwrap();
		assert!(!notification.read);

		let listed = suite.notification_repo.list_by_recipient(&bob.uid).unwrap();
		assert_eq!(listed.len(), 1);

		let read = suite.notification_repo.mark_read(&notification.id).unwrap();
		assert!(read.read);
	}

	#[test]
	fn clear_read_keeps_unread() {
		let f = Fixture::new();
		let suite = f.suite();
		let bob = f.accounts.bob();

		let seen = suite
			.notification_repo
			.create(NewNotification {
				recipient_id: bob.uid,
				kind: NotificationKind::ProposalReceived,
				title: "a",
				message: "a",
				data: json!({}),
			})
			.unwrap();
		suite
			.notification_repo
			.create(NewNotification {
				recipient_id: bob.uid,
				kind: NotificationKind::ProposalReceived,
				title: "b",
				message: "b",
				data: json!({}),
			})
			.unwrap();
		suite.notification_repo.mark_read(&seen.id).unwrap();

		assert_eq!(suite.notification_repo.clear_read(&bob.uid), 1);
		let left = suite.notification_repo.list_by_recipient(&bob.uid).unwrap();
		assert_eq!(left.len(), 1);
		assert!(!left[0].read);

		assert_eq!(suite.notification_repo.clear_all(&bob.uid), 1);
	}

	#[test]
	fn notifier_swallows_mailer_failure() {
		struct FailingMailer;
		impl Mailer for FailingMailer {
			fn send(&self, _: &str, _: &str, _: &str) -> Result<(), String> {
				Err("smtp down".to_string())
			}
		}

		let f = Fixture::new();
		let suite = f.suite();
		let bob = f.accounts.bob();
		let notifier = Notifier::new(suite.notification_repo.clone(), Arc::new(FailingMailer));

		notifier.notify(
			NewNotification {
				recipient_id: bob.uid,
				kind: NotificationKind::LoanAccepted,
				title: "t",
				message: "m",
				data: json!({}),
			},
			Some("bob@gmail.com"),
		);

		// the document is still created even though the email failed
		let listed = suite.notification_repo.list_by_recipient(&bob.uid).unwrap();
		assert_eq!(listed.len(), 1);
	}
}

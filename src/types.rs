use chrono::{DateTime, Utc};

pub type Id = uuid::Uuid;
pub type Time = DateTime<Utc>;

/// Current wall-clock time, the single timestamp source for documents.
pub fn now() -> Time {
	Utc::now()
}

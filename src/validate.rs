//! Field-presence and business-rule checks applied before any store call.
//! Each check returns a message suitable for the API's `error` field; the
//! service layer maps them into `Validation` errors.

use bigdecimal::BigDecimal;

pub fn non_empty(field: &str, value: &str) -> Result<(), String> {
	if value.trim().is_empty() {
		return Err(format!("{} is required", field));
	}
	Ok(())
}

pub fn positive(field: &str, value: &BigDecimal) -> Result<(), String> {
	if *value <= BigDecimal::from(0) {
		return Err(format!("{} must be greater than zero", field));
	}
	Ok(())
}

pub fn not_negative(field: &str, value: &BigDecimal) -> Result<(), String> {
	if *value < BigDecimal::from(0) {
		return Err(format!("{} must not be negative", field));
	}
	Ok(())
}

/// Minimal shape check; real mailbox verification belongs to the identity
/// provider.
pub fn email(field: &str, value: &str) -> Result<(), String> {
	non_empty(field, value)?;
	let valid = value
		.split_once('@')
		.map(|(local, domain)| !local.is_empty() && domain.contains('.'))
		.unwrap_or(false);
	if !valid {
		return Err(format!("{} is not a valid email address", field));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn non_empty_rejects_whitespace() {
		assert!(non_empty("term", "12 meses").is_ok());
		assert_eq!(non_empty("term", "   ").unwrap_err(), "term is required");
	}

	#[test]
	fn positive_rejects_zero_and_negative() {
		assert!(positive("amount", &BigDecimal::from(1)).is_ok());
		assert!(positive("amount", &BigDecimal::from(0)).is_err());
		assert!(positive("amount", &BigDecimal::from(-5)).is_err());

		assert!(not_negative("comision", &BigDecimal::from(0)).is_ok());
		assert!(not_negative("comision", &BigDecimal::from(-1)).is_err());
	}

	#[test]
	fn email_shape() {
		assert!(email("email", "bob@gmail.com").is_ok());
		assert!(email("email", "bob@localhost").is_err());
		assert!(email("email", "no-at-sign").is_err());
		assert!(email("email", "@gmail.com").is_err());
	}
}

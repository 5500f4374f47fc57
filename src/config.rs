use std::env;
use std::fmt::Debug;
use std::str::FromStr;

use log::info;

/// Runtime configuration, read from the environment with sane defaults.
#[derive(Debug, Clone)]
pub struct Config {
	pub host: String,
	pub port: u16,
	pub superadmin_email: String,
}

impl Config {
	pub fn load() -> Config {
		dotenv::dotenv().ok();
		Config {
			host: try_load("HOST", "0.0.0.0"),
			port: try_load("PORT", "8080"),
			superadmin_email: try_load("SUPERADMIN_EMAIL", "admin@buscocredito.mx"),
		}
	}

	pub fn addr(&self) -> String {
		format!("{}:{}", self.host, self.port)
	}
}

fn try_load<T>(var: &str, default: &str) -> T
where
	T: FromStr,
	<T as FromStr>::Err: Debug,
{
	let value = env::var(var).unwrap_or_else(|_| {
		info!(target: "credito::config", "{} not set, using default {:?}", var, default);
		default.to_string()
	});
	value
		.parse()
		.unwrap_or_else(|e| panic!("invalid value {:?} for {}: {:?}", value, var, e))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn falls_back_to_default() {
		let port: u16 = try_load("CREDITO_TEST_UNSET_PORT", "8080");
		assert_eq!(port, 8080);
	}

	#[test]
	fn reads_from_env() {
		env::set_var("CREDITO_TEST_HOST", "127.0.0.1");
		let host: String = try_load("CREDITO_TEST_HOST", "0.0.0.0");
		assert_eq!(host, "127.0.0.1");
	}
}

use std::env;
use std::sync::Arc;

use log::info;
use tokio::net::TcpListener;

use buscocredito::http::{self, AppState};
use buscocredito::marketplace::{MarketplaceService, NewMarketplaceService};
use buscocredito::notification::{LogMailer, Notifier};
use buscocredito::{account, loan_request, notification, proposal, signup_token};
use buscocredito::{Config, Directory, Store};

#[tokio::main]
async fn main() {
	if env::var("RUST_LOG").is_err() {
		env::set_var("RUST_LOG", "info");
	}
	pretty_env_logger::init();

	let config = Config::load();
	let store = Store::new();
	let directory = Directory::new();

	let account_repo = account::Repo::new(store.clone());
	let loan_repo = loan_request::Repo::new(store.clone());
	let proposal_repo = proposal::Repo::new(store.clone());
	let notification_repo = notification::Repo::new(store.clone());
	let token_repo = signup_token::Repo::new(store.clone());
	let notifier = Notifier::new(notification_repo.clone(), Arc::new(LogMailer));

	let service = MarketplaceService::new(NewMarketplaceService {
		store: store.clone(),
		directory: directory.clone(),
		account_repo,
		loan_repo,
		proposal_repo,
		notification_repo,
		token_repo,
		notifier,
	});

	match service.bootstrap_super_admin(&config.superadmin_email) {
		Ok((account, token)) => {
			info!(target: "credito", "super admin ready: {} (token {})", account.email, token)
		}
		Err(e) => panic!("failed to bootstrap super admin: {}", e),
	}

	let state = Arc::new(AppState { directory, service });
	let app = http::router(state);

	let addr = config.addr();
	let listener = TcpListener::bind(&addr)
		.await
		.unwrap_or_else(|e| panic!("failed to bind {}: {}", addr, e));
	info!(target: "credito", "listening on {}", addr);

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await
		.expect("server error");
}

async fn shutdown_signal() {
	let ctrl_c = async {
		tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
	};

	#[cfg(unix)]
	let terminate = async {
		tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}

	info!(target: "credito", "shutting down");
}

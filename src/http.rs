use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use bigdecimal::BigDecimal;
use log::{error, info};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};

use crate::account::UserType;
use crate::auth::{AuthUser, Directory};
use crate::marketplace::{
	ErrorKind, LoanRequestInput, MarketplaceService, NewSubaccount, ProposalInput, Signup,
};
use crate::types::{now, Id};

pub struct AppState {
	pub directory: Directory,
	pub service: MarketplaceService,
}

pub type SharedState = Arc<AppState>;

/// Uniform response envelope; every endpoint, success or failure, speaks it.
#[derive(Serialize)]
struct Envelope {
	success: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	data: Option<Value>,
	#[serde(skip_serializing_if = "Option::is_none")]
	error: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	message: Option<String>,
	timestamp: String,
}

fn ok<T: Serialize>(data: T) -> Response {
	let body = Envelope {
		success: true,
		data: Some(serde_json::to_value(data).unwrap_or(Value::Null)),
		error: None,
		message: None,
		timestamp: now().to_rfc3339(),
	};
	(StatusCode::OK, Json(body)).into_response()
}

fn ok_message(message: &str) -> Response {
	let body = Envelope {
		success: true,
		data: None,
		error: None,
		message: Some(message.to_string()),
		timestamp: now().to_rfc3339(),
	};
	(StatusCode::OK, Json(body)).into_response()
}

pub struct ApiError {
	status: StatusCode,
	message: String,
}

impl ApiError {
	fn new(status: StatusCode, message: impl Into<String>) -> ApiError {
		ApiError {
			status,
			message: message.into(),
		}
	}

	fn bad_request(message: impl Into<String>) -> ApiError {
		ApiError::new(StatusCode::BAD_REQUEST, message)
	}

	fn unauthorized() -> ApiError {
		ApiError::new(StatusCode::UNAUTHORIZED, "authentication required")
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let body = Envelope {
			success: false,
			data: None,
			error: Some(self.message),
			message: None,
			timestamp: now().to_rfc3339(),
		};
		(self.status, Json(body)).into_response()
	}
}

impl From<crate::marketplace::Error> for ApiError {
	fn from(e: crate::marketplace::Error) -> ApiError {
		match e.kind() {
			ErrorKind::Unauthenticated => ApiError::unauthorized(),
			ErrorKind::Forbidden => {
				ApiError::new(StatusCode::FORBIDDEN, "insufficient permissions")
			}
			ErrorKind::Validation(msg) => ApiError::new(StatusCode::BAD_REQUEST, msg.clone()),
			ErrorKind::NotFound => ApiError::new(StatusCode::NOT_FOUND, "resource not found"),
			ErrorKind::Conflict(msg) => ApiError::new(StatusCode::CONFLICT, msg.clone()),
			ErrorKind::Store(inner) => {
				error!(target: "credito::api", "store failure: {}", inner);
				ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
			}
		}
	}
}

type ApiResult = Result<Response, ApiError>;

/// Resolve the caller from `Authorization: Bearer <token>` or, as the web
/// client sends it, an `auth-token` cookie.
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthUser, ApiError> {
	let token = bearer_token(headers)
		.or_else(|| cookie_token(headers))
		.ok_or_else(ApiError::unauthorized)?;
	state.directory.verify(&token).map_err(|_| ApiError::unauthorized())
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
	let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
	value.strip_prefix("Bearer ").map(|t| t.trim().to_string())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
	let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
	cookies.split(';').find_map(|pair| {
		let (name, value) = pair.trim().split_once('=')?;
		(name == "auth-token").then(|| value.to_string())
	})
}

fn from_body<T: DeserializeOwned>(body: Value) -> Result<T, ApiError> {
	serde_json::from_value(body).map_err(|_| ApiError::bad_request("malformed payload"))
}

pub fn router(state: SharedState) -> Router {
	let cors = CorsLayer::new()
		.allow_origin(Any)
		.allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
		.allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

	Router::new()
		.route("/api/auth/signup", post(signup))
		.route("/api/loans", post(create_loan).get(list_loans))
		.route("/api/loans/open", get(list_open_loans))
		.route("/api/loans/:id", delete(delete_loan))
		.route("/api/loans/proposals", post(create_proposal))
		.route("/api/loans/offers", post(list_offers))
		.route("/api/proposals/status", post(set_proposal_status))
		.route("/api/proposals/lender", post(list_lender_proposals))
		.route("/api/notifications", post(list_notifications))
		.route("/api/notifications/read", post(mark_notification_read))
		.route("/api/notifications/clear", post(clear_notifications))
		.route("/api/notifications/clear-read", post(clear_read_notifications))
		.route(
			"/api/users/subaccounts",
			get(list_subaccounts).post(create_subaccount).delete(delete_subaccount),
		)
		.route(
			"/api/superadmin/tokens",
			get(list_tokens).post(create_token).delete(delete_token),
		)
		.route("/api/admin/migrate-user-roles", post(migrate_user_roles))
		.layer(middleware::from_fn(request_log))
		.layer(cors)
		.with_state(state)
}

async fn request_log(req: Request<Body>, next: Next) -> Response {
	let method = req.method().clone();
	let path = req.uri().path().to_string();
	let started = Instant::now();
	let response = next.run(req).await;
	info!(
		target: "credito::api",
		"\"{} {}\" {} {:?}",
		method,
		path,
		response.status().as_u16(),
		started.elapsed()
	);
	response
}

// ---- payloads ----

#[derive(Deserialize)]
struct SignupPayload {
	email: String,
	#[serde(rename = "type")]
	user_type: UserType,
	name: Option<String>,
	address: Option<String>,
	#[serde(rename = "Empresa")]
	company: Option<String>,
	token: Option<String>,
}

#[derive(Deserialize)]
struct LoanPayload {
	amount: BigDecimal,
	income: BigDecimal,
	term: String,
	payment: String,
	purpose: String,
	#[serde(rename = "type")]
	kind: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposalPayload {
	loan_id: Id,
	amount: BigDecimal,
	interest_rate: BigDecimal,
	term: String,
	amortization_frequency: String,
	amortization: BigDecimal,
	comision: BigDecimal,
	medical_balance: BigDecimal,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OffersPayload {
	loan_id: Id,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
	proposal_id: Id,
	status: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NotificationReadPayload {
	notification_id: Id,
}

#[derive(Deserialize)]
struct SubaccountPayload {
	email: String,
	name: String,
}

#[derive(Deserialize)]
struct SubaccountDeletePayload {
	uid: Id,
}

#[derive(Deserialize)]
struct TokenDeletePayload {
	token: String,
}

// ---- handlers ----

async fn signup(State(state): State<SharedState>, Json(body): Json<Value>) -> ApiResult {
	let payload: SignupPayload = from_body(body)?;
	let (account, token) = state.service.signup(Signup {
		email: &payload.email,
		user_type: payload.user_type,
		name: payload.name.as_deref(),
		address: payload.address.as_deref(),
		company: payload.company.as_deref(),
		invite_token: payload.token.as_deref(),
	})?;
	Ok(ok(serde_json::json!({"account": account, "token": token})))
}

async fn create_loan(
	State(state): State<SharedState>,
	headers: HeaderMap,
	Json(body): Json<Value>,
) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	let payload: LoanPayload = from_body(body)?;
	let loan = state.service.create_loan_request(
		&caller,
		LoanRequestInput {
			amount: payload.amount,
			income: payload.income,
			term: &payload.term,
			payment: &payload.payment,
			purpose: &payload.purpose,
			kind: &payload.kind,
		},
	)?;
	Ok(ok(loan))
}

async fn list_loans(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	Ok(ok(state.service.list_loan_requests(&caller)?))
}

async fn list_open_loans(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	Ok(ok(state.service.list_open_loan_requests(&caller)?))
}

async fn delete_loan(
	State(state): State<SharedState>,
	headers: HeaderMap,
	Path(id): Path<Id>,
) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	let deleted = state.service.delete_loan_request(&caller, &id)?;
	Ok(ok(serde_json::json!({"deletedProposals": deleted})))
}

async fn create_proposal(
	State(state): State<SharedState>,
	headers: HeaderMap,
	Json(body): Json<Value>,
) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	let payload: ProposalPayload = from_body(body)?;
	let proposal = state.service.create_proposal(
		&caller,
		ProposalInput {
			loan_id: payload.loan_id,
			amount: payload.amount,
			interest_rate: payload.interest_rate,
			term: &payload.term,
			amortization_frequency: &payload.amortization_frequency,
			amortization: payload.amortization,
			comision: payload.comision,
			medical_balance: payload.medical_balance,
		},
	)?;
	Ok(ok(proposal))
}

async fn list_offers(
	State(state): State<SharedState>,
	headers: HeaderMap,
	Json(body): Json<Value>,
) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	let payload: OffersPayload = from_body(body)?;
	Ok(ok(state.service.list_offers(&caller, &payload.loan_id)?))
}

async fn set_proposal_status(
	State(state): State<SharedState>,
	headers: HeaderMap,
	Json(body): Json<Value>,
) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	let payload: StatusPayload = from_body(body)?;
	if payload.status != "accepted" {
		return Err(ApiError::bad_request("status must be \"accepted\""));
	}
	let outcome = state.service.accept_proposal(&caller, &payload.proposal_id)?;
	Ok(ok(outcome))
}

async fn list_lender_proposals(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	Ok(ok(state.service.list_lender_proposals(&caller)?))
}

async fn list_notifications(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	Ok(ok(state.service.list_notifications(&caller)?))
}

async fn mark_notification_read(
	State(state): State<SharedState>,
	headers: HeaderMap,
	Json(body): Json<Value>,
) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	let payload: NotificationReadPayload = from_body(body)?;
	Ok(ok(state
		.service
		.mark_notification_read(&caller, &payload.notification_id)?))
}

async fn clear_notifications(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	let deleted = state.service.clear_notifications(&caller, false)?;
	Ok(ok(serde_json::json!({"deleted": deleted})))
}

async fn clear_read_notifications(
	State(state): State<SharedState>,
	headers: HeaderMap,
) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	let deleted = state.service.clear_notifications(&caller, true)?;
	Ok(ok(serde_json::json!({"deleted": deleted})))
}

async fn list_subaccounts(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	Ok(ok(state.service.list_subaccounts(&caller)?))
}

async fn create_subaccount(
	State(state): State<SharedState>,
	headers: HeaderMap,
	Json(body): Json<Value>,
) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	let payload: SubaccountPayload = from_body(body)?;
	let account = state.service.create_subaccount(
		&caller,
		NewSubaccount {
			email: &payload.email,
			name: &payload.name,
		},
	)?;
	Ok(ok(account))
}

async fn delete_subaccount(
	State(state): State<SharedState>,
	headers: HeaderMap,
	Json(body): Json<Value>,
) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	let payload: SubaccountDeletePayload = from_body(body)?;
	state.service.delete_subaccount(&caller, &payload.uid)?;
	Ok(ok_message("subaccount deleted"))
}

async fn list_tokens(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	Ok(ok(state.service.list_signup_tokens(&caller)?))
}

async fn create_token(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	Ok(ok(state.service.create_signup_token(&caller)?))
}

async fn delete_token(
	State(state): State<SharedState>,
	headers: HeaderMap,
	Json(body): Json<Value>,
) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	let payload: TokenDeletePayload = from_body(body)?;
	state.service.delete_signup_token(&caller, &payload.token)?;
	Ok(ok_message("token deleted"))
}

async fn migrate_user_roles(State(state): State<SharedState>, headers: HeaderMap) -> ApiResult {
	let caller = authenticate(&state, &headers)?;
	let migrated = state.service.migrate_user_roles(&caller)?;
	Ok(ok(serde_json::json!({"migrated": migrated})))
}

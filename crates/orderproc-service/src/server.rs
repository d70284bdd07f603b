//! HTTP server for the order-processing service (spec.md §6).
//!
//! Exposes the three endpoints consumed from the core (`/cluster/join`,
//! `/service/transfer`, `/cluster/state`), an `/orders` intake route, and
//! the `/raft` transport mount, all on one `axum::Router`.

use axum::{
	extract::State,
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Json},
	routing::{get, post},
	Router,
};
use orderproc_cluster::{ClusterCoordinator, JoinCommand};
use orderproc_config::Config;
use orderproc_pipeline::{Job, PipelineManager};
use orderproc_storage::OrderRecordStore;
use orderproc_types::{is_valid_uuid, ApiError, OrderStateInService};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

const TRANSFER_AUTH_HEADER: &str = "user";

#[derive(Clone)]
pub struct AppState {
	pub coordinator: ClusterCoordinator,
	pub manager: Arc<PipelineManager>,
	pub store: Arc<OrderRecordStore>,
}

pub async fn serve(
	bind_address: String,
	_config: Config,
	coordinator: ClusterCoordinator,
	manager: Arc<PipelineManager>,
	store: Arc<OrderRecordStore>,
) -> Result<(), Box<dyn std::error::Error>> {
	let state = AppState {
		coordinator,
		manager,
		store,
	};

	let app = Router::new()
		.route("/cluster/join", post(handle_join))
		.route("/cluster/state", get(handle_describe_state))
		.route("/service/transfer", post(handle_transfer))
		.route("/orders", post(handle_intake))
		.route("/raft/append-entries", post(handle_append_entries))
		.route("/raft/install-snapshot", post(handle_install_snapshot))
		.route("/raft/vote", post(handle_vote))
		.layer(ServiceBuilder::new().layer(CorsLayer::permissive()))
		.with_state(state);

	let listener = TcpListener::bind(&bind_address).await?;
	tracing::info!(bind_address, "order-processing HTTP server listening");
	axum::serve(listener, app).await?;
	Ok(())
}

/// `POST /cluster/join` — body: `{name, connection_string}`. 200 on
/// success, 307 with `Location` pointing at the leader otherwise.
async fn handle_join(State(state): State<AppState>, Json(command): Json<JoinCommand>) -> impl IntoResponse {
	if !state.coordinator.is_current_service_leader() {
		return match state.coordinator.get_leader_connection_string() {
			Ok(leader) => (
				StatusCode::TEMPORARY_REDIRECT,
				[("Location", format!("{leader}/cluster/join"))],
			)
				.into_response(),
			Err(_) => ApiError::Unavailable {
				message: "leader unknown".to_string(),
			}
			.into_response(),
		};
	}

	match state.coordinator.register_service(command).await {
		Ok(()) => StatusCode::OK.into_response(),
		Err(e) => ApiError::Internal { message: e.to_string() }.into_response(),
	}
}

/// `GET /cluster/state` → the `DescribeState()` JSON snapshot.
async fn handle_describe_state(State(state): State<AppState>) -> impl IntoResponse {
	Json(state.coordinator.describe_state())
}

#[derive(Debug, Deserialize)]
struct TransferRequest {
	service_id: String,
}

#[derive(Debug, Serialize)]
struct TransferResponse {
	accepted: bool,
}

/// `POST /service/transfer` — reassigns `service_id`'s active orders to
/// this node. Requires the `Authorization: user` placeholder credential
/// (spec.md §9).
async fn handle_transfer(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(request): Json<TransferRequest>,
) -> impl IntoResponse {
	let auth_ok = headers
		.get("authorization")
		.and_then(|v| v.to_str().ok())
		.map(|v| v == TRANSFER_AUTH_HEADER)
		.unwrap_or(false);
	if !auth_ok {
		return ApiError::Unauthorized {
			message: "missing or invalid Authorization header".to_string(),
		}
		.into_response();
	}

	if request.service_id == state.coordinator.service_id() {
		return ApiError::BadRequest {
			error_type: "self_transfer".to_string(),
			message: "cannot transfer a service's orders to itself".to_string(),
		}
		.into_response();
	}

	let active = match state.store.reload(&request.service_id, OrderStateInService::Active).await {
		Ok(records) => records,
		Err(e) => {
			return ApiError::Internal { message: e.to_string() }.into_response();
		},
	};

	let self_id = state.coordinator.service_id().to_string();
	tracing::info!(from = %request.service_id, to = %self_id, count = active.len(), "accepting order transfer");

	for mut record in active {
		record.service_id = self_id.clone();
		let mut job = Job::from_record(record, state.store.clone());
		job.set_service_id(self_id.clone());
		state.manager.dispatch(job);
	}

	Json(TransferResponse { accepted: true }).into_response()
}

#[derive(Debug, Deserialize)]
struct IntakeRequest {
	order_id: String,
	first_step: String,
}

/// `POST /orders` — intake endpoint modeled on the teacher's `/api/orders`
/// proxy route: here it dispatches a fresh `Job` directly into this node's
/// Pipeline Manager rather than forwarding to an external discovery
/// service, since order discovery is out of scope (spec.md §1 Non-goals).
async fn handle_intake(State(state): State<AppState>, Json(request): Json<IntakeRequest>) -> impl IntoResponse {
	if !is_valid_uuid(&request.order_id) {
		return ApiError::BadRequest {
			error_type: "invalid_order_id".to_string(),
			message: "order_id must be a UUID".to_string(),
		}
		.into_response();
	}

	let service_id = state.coordinator.service_id().to_string();
	let job = match Job::new(request.order_id, service_id, request.first_step.clone(), state.store.clone()).await {
		Ok(job) => job,
		Err(e) => return ApiError::Internal { message: e.to_string() }.into_response(),
	};

	state.manager.dispatch(job);
	StatusCode::ACCEPTED.into_response()
}

async fn handle_append_entries(
	State(state): State<AppState>,
	Json(rpc): Json<openraft::raft::AppendEntriesRequest<orderproc_cluster::TypeConfig>>,
) -> impl IntoResponse {
	match state.coordinator.raft().append_entries(rpc).await {
		Ok(resp) => Json(resp).into_response(),
		Err(e) => ApiError::Internal { message: e.to_string() }.into_response(),
	}
}

async fn handle_install_snapshot(
	State(state): State<AppState>,
	Json(rpc): Json<openraft::raft::InstallSnapshotRequest<orderproc_cluster::TypeConfig>>,
) -> impl IntoResponse {
	match state.coordinator.raft().install_snapshot(rpc).await {
		Ok(resp) => Json(resp).into_response(),
		Err(e) => ApiError::Internal { message: e.to_string() }.into_response(),
	}
}

async fn handle_vote(
	State(state): State<AppState>,
	Json(rpc): Json<openraft::raft::VoteRequest<String>>,
) -> impl IntoResponse {
	match state.coordinator.raft().vote(rpc).await {
		Ok(resp) => Json(resp).into_response(),
		Err(e) => ApiError::Internal { message: e.to_string() }.into_response(),
	}
}

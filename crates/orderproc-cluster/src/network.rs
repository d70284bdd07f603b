//! HTTP transport for consensus RPCs, mounted at `/raft` on the same HTTP
//! server as the rest of this node's public endpoints (spec.md §6).
//!
//! The wire format itself is opaque to this service; `reqwest` carries
//! `openraft`'s own request/response types as JSON, the way the teacher's
//! services use `reqwest` for all inter-node calls.

use openraft::error::{InstallSnapshotError, RPCError, RaftError};
use openraft::network::{RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
	AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse, VoteRequest,
	VoteResponse,
};
use openraft::BasicNode;

use crate::types::TypeConfig;

/// Builds a [`PeerClient`] per target node. `openraft` calls this once per
/// outbound RPC; the underlying `reqwest::Client` is cheap to clone and
/// pools connections across calls.
#[derive(Clone, Default)]
pub struct NetworkFactory {
	client: reqwest::Client,
}

impl NetworkFactory {
	pub fn new(client: reqwest::Client) -> Self {
		Self { client }
	}
}

impl RaftNetworkFactory<TypeConfig> for NetworkFactory {
	type Network = PeerClient;

	async fn new_client(&mut self, _target: String, node: &BasicNode) -> Self::Network {
		PeerClient {
			client: self.client.clone(),
			raft_endpoint: format!("{}/raft", node.addr),
		}
	}
}

/// One outbound connection to a peer's `/raft` transport.
pub struct PeerClient {
	client: reqwest::Client,
	raft_endpoint: String,
}

impl PeerClient {
	async fn post<Req: serde::Serialize, Resp: serde::de::DeserializeOwned>(
		&self,
		path: &str,
		body: &Req,
	) -> Result<Resp, reqwest::Error> {
		self.client
			.post(format!("{}/{}", self.raft_endpoint, path))
			.json(body)
			.send()
			.await?
			.json::<Resp>()
			.await
	}
}

impl RaftNetwork<TypeConfig> for PeerClient {
	async fn append_entries(
		&mut self,
		rpc: AppendEntriesRequest<TypeConfig>,
		_option: openraft::network::RPCOption,
	) -> Result<AppendEntriesResponse<String>, RPCError<String, BasicNode, RaftError<String>>> {
		self.post("append-entries", &rpc)
			.await
			.map_err(|e| RPCError::Network(openraft::error::NetworkError::new(&e)))
	}

	async fn install_snapshot(
		&mut self,
		rpc: InstallSnapshotRequest<TypeConfig>,
		_option: openraft::network::RPCOption,
	) -> Result<InstallSnapshotResponse<String>, RPCError<String, BasicNode, RaftError<String, InstallSnapshotError>>> {
		self.post("install-snapshot", &rpc)
			.await
			.map_err(|e| RPCError::Network(openraft::error::NetworkError::new(&e)))
	}

	async fn vote(
		&mut self,
		rpc: VoteRequest<String>,
		_option: openraft::network::RPCOption,
	) -> Result<VoteResponse<String>, RPCError<String, BasicNode, RaftError<String>>> {
		self.post("vote", &rpc)
			.await
			.map_err(|e| RPCError::Network(openraft::error::NetworkError::new(&e)))
	}
}

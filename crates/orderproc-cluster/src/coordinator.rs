//! Cluster Coordinator: consensus-backed membership layer (spec.md §4.F).

use crate::error::ClusterError;
use crate::network::NetworkFactory;
use crate::store::{LogStore, StateMachineStore};
use crate::transfer::TransferService;
use crate::types::{JoinCommand, TypeConfig};
use chrono::Utc;
use dashmap::DashMap;
use openraft::{BasicNode, Raft};
use orderproc_types::{ClusterStateSnapshot, Peer};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::sync::Mutex as AsyncMutex;

/// Consensus-backed membership layer. Each node has a stable `service_id`,
/// a listen address, and a transport mounted at `/raft`.
#[derive(Clone)]
pub struct ClusterCoordinator {
	service_id: String,
	connection_string: String,
	raft: Raft<TypeConfig>,
	/// Last time each peer was observed making heartbeat progress,
	/// approximated from the leader's replication metrics — `openraft`
	/// does not expose a literal per-peer timestamp the way the original
	/// consensus library's `Peer.LastActivity()` did.
	last_activity: Arc<DashMap<String, chrono::DateTime<Utc>>>,
	heartbeat_interval_ms: u64,
	max_heartbeat_fail_times: u32,
	is_leader: Arc<AtomicBool>,
	http_client: reqwest::Client,
	status_check_interval: Duration,
	max_transfer_attempts: u32,
	transfer_task: Arc<AsyncMutex<Option<JoinHandle<()>>>>,
}

impl ClusterCoordinator {
	/// Starts the local consensus instance in one of three modes
	/// (spec.md §4.F): bootstrap (no log, no join target), join (log must
	/// be empty; contacts `join_addr`), or recover (existing log, replayed
	/// in place).
	#[allow(clippy::too_many_arguments)]
	pub async fn start(
		service_id: String,
		connection_string: String,
		join_addr: Option<String>,
		heartbeat_interval_ms: u64,
		max_heartbeat_fail_times: u32,
		status_check_interval: Duration,
		max_transfer_attempts: u32,
		http_client: reqwest::Client,
	) -> Result<Self, ClusterError> {
		let raft_config = openraft::Config {
			heartbeat_interval: heartbeat_interval_ms,
			election_timeout_min: heartbeat_interval_ms * 4,
			election_timeout_max: heartbeat_interval_ms * 8,
			..Default::default()
		}
		.validate()
		.map_err(|e| ClusterError::Fatal(e.to_string()))?;

		let mut log_store = LogStore::new();
		let log_is_empty = log_store
			.get_log_state()
			.await
			.map_err(|e| ClusterError::Fatal(e.to_string()))?
			.last_log_id
			.is_none();

		let network = NetworkFactory::new(http_client.clone());
		let state_machine = StateMachineStore::new();
		let raft = Raft::new(
			service_id.clone(),
			Arc::new(raft_config),
			network,
			log_store.clone(),
			state_machine,
		)
		.await
		.map_err(|e| ClusterError::Fatal(e.to_string()))?;

		match &join_addr {
			Some(leader) => {
				if !log_is_empty {
					return Err(ClusterError::Fatal("cannot join with an existing log".into()));
				}
				tracing::info!(leader, "attempting to join leader");
				join_leader(&http_client, leader, &service_id, &connection_string).await?;
			},
			None if log_is_empty => {
				tracing::info!("initializing new cluster");
				let mut members = BTreeMap::new();
				members.insert(
					service_id.clone(),
					BasicNode {
						addr: connection_string.clone(),
					},
				);
				raft.initialize(members)
					.await
					.map_err(|e| ClusterError::Fatal(e.to_string()))?;
			},
			None => {
				tracing::info!("recovered from log");
			},
		}

		let coordinator = Self {
			service_id,
			connection_string,
			raft,
			last_activity: Arc::new(DashMap::new()),
			heartbeat_interval_ms,
			max_heartbeat_fail_times,
			is_leader: Arc::new(AtomicBool::new(false)),
			http_client,
			status_check_interval,
			max_transfer_attempts,
			transfer_task: Arc::new(AsyncMutex::new(None)),
		};
		coordinator.clone().spawn_event_watcher();
		Ok(coordinator)
	}

	pub fn service_id(&self) -> &str {
		&self.service_id
	}

	pub fn connection_string(&self) -> &str {
		&self.connection_string
	}

	pub fn raft(&self) -> &Raft<TypeConfig> {
		&self.raft
	}

	/// Decodes a join command and applies it as a consensus membership
	/// change (`add_learner` followed by `change_membership`, `openraft`'s
	/// two-step equivalent of the original single `Do` call).
	pub async fn register_service(&self, command: JoinCommand) -> Result<(), ClusterError> {
		let node = BasicNode {
			addr: command.connection_string.clone(),
		};
		self.raft
			.add_learner(command.name.clone(), node, true)
			.await
			.map_err(|e| ClusterError::Consensus(e.to_string()))?;

		let metrics = self.raft.metrics().borrow().clone();
		let mut members: std::collections::BTreeSet<String> =
			metrics.membership_config.membership().voter_ids().collect();
		members.insert(command.name);
		self.raft
			.change_membership(members, false)
			.await
			.map_err(|e| ClusterError::Consensus(e.to_string()))?;
		Ok(())
	}

	pub fn is_current_service_leader(&self) -> bool {
		self.raft.metrics().borrow().current_leader.as_deref() == Some(self.service_id.as_str())
	}

	/// Returns this node's connection string if it is leader; otherwise
	/// looks up the leader's entry in the membership table.
	pub fn get_leader_connection_string(&self) -> Result<String, ClusterError> {
		if self.is_current_service_leader() {
			return Ok(self.connection_string.clone());
		}

		let metrics = self.raft.metrics().borrow().clone();
		let leader_id = metrics.current_leader.ok_or(ClusterError::LeaderUnknown)?;
		metrics
			.membership_config
			.membership()
			.get_node(&leader_id)
			.map(|n| n.addr.clone())
			.ok_or(ClusterError::LeaderUnknown)
	}

	/// A peer is offline iff its last observed heartbeat progress is older
	/// than `heartbeat_interval * max_heartbeat_fail_times`.
	pub fn is_peer_offline(&self, name: &str) -> bool {
		let threshold = Duration::from_millis(self.heartbeat_interval_ms * self.max_heartbeat_fail_times as u64);
		let last_seen = self.last_activity.get(name).map(|entry| *entry.value());
		is_stale(last_seen, Utc::now(), threshold)
	}

	/// Returns every known peer (including self) with its connection
	/// string, liveness, and last-activity timestamp.
	pub fn peers(&self) -> Vec<Peer> {
		let metrics = self.raft.metrics().borrow().clone();
		metrics
			.membership_config
			.membership()
			.nodes()
			.map(|(id, node)| Peer {
				name: id.clone(),
				connection_string: node.addr.clone(),
				last_activity: self
					.last_activity
					.get(id)
					.map(|v| v.value().to_rfc3339())
					.unwrap_or_default(),
				connected: id == &self.service_id || !self.is_peer_offline(id),
			})
			.collect()
	}

	/// Snapshot JSON of `{leader_name, nodes_count, nodes[], generated_at}`.
	pub fn describe_state(&self) -> ClusterStateSnapshot {
		let metrics = self.raft.metrics().borrow().clone();
		let nodes = self.peers();
		ClusterStateSnapshot {
			leader_name: metrics.current_leader.unwrap_or_default(),
			nodes_count: nodes.len(),
			nodes,
			generated_at: Utc::now().to_rfc3339(),
		}
	}

	/// Watches the consensus metrics channel and derives `StateChange`,
	/// `LeaderChange`, and `TermChange` events by diffing successive
	/// snapshots — `openraft` exposes no direct event-listener API, unlike
	/// the original consensus library's `AddEventListener`.
	fn spawn_event_watcher(self) {
		tokio::spawn(async move {
			let mut rx = self.raft.metrics();
			let mut prev_state = None;
			let mut prev_leader = None;
			let mut prev_term = None;

			loop {
				let metrics = rx.borrow().clone();
				if Some(metrics.state) != prev_state {
					tracing::info!(from = ?prev_state, to = ?metrics.state, "StateChange");
					prev_state = Some(metrics.state);
				}
				if metrics.current_term != prev_term.unwrap_or_default() {
					tracing::info!(from = ?prev_term, to = metrics.current_term, "TermChange");
					prev_term = Some(metrics.current_term);
				}
				if metrics.current_leader != prev_leader {
					tracing::info!(from = ?prev_leader, to = ?metrics.current_leader, "LeaderChange");
					prev_leader = metrics.current_leader.clone();

					// Leader-for-all peers heartbeat approximation: every
					// voter is touched whenever we observe ourselves as
					// leader and metrics tick.
					let became_leader = metrics.current_leader.as_deref() == Some(self.service_id.as_str());
					let was_leader = self.is_leader.swap(became_leader, Ordering::SeqCst);

					if became_leader && !was_leader {
						let service = TransferService::new(
							self.clone(),
							self.http_client.clone(),
							self.status_check_interval,
							self.max_transfer_attempts,
						);
						let handle = tokio::spawn(service.run());
						*self.transfer_task.lock().await = Some(handle);
					} else if !became_leader && was_leader {
						if let Some(handle) = self.transfer_task.lock().await.take() {
							handle.abort();
						}
					}
				}

				if self.is_leader.load(Ordering::SeqCst) {
					for (id, _) in metrics.membership_config.membership().nodes() {
						self.last_activity.insert(id.clone(), Utc::now());
					}
				}

				if rx.changed().await.is_err() {
					break;
				}
			}
		});
	}
}

/// A peer with no recorded activity is treated as never seen, hence stale.
fn is_stale(last_seen: Option<chrono::DateTime<Utc>>, now: chrono::DateTime<Utc>, threshold: Duration) -> bool {
	match last_seen {
		Some(seen) => now
			.signed_duration_since(seen)
			.to_std()
			.map(|elapsed| elapsed > threshold)
			.unwrap_or(true),
		None => true,
	}
}

async fn join_leader(
	client: &reqwest::Client,
	leader: &str,
	name: &str,
	connection_string: &str,
) -> Result<(), ClusterError> {
	let command = JoinCommand {
		name: name.to_string(),
		connection_string: connection_string.to_string(),
	};

	let resp = client
		.post(format!("{}/cluster/join", leader))
		.json(&command)
		.send()
		.await
		.map_err(|e| ClusterError::Fatal(e.to_string()))?;

	if resp.status() == reqwest::StatusCode::TEMPORARY_REDIRECT {
		if let Some(location) = resp
			.headers()
			.get(reqwest::header::LOCATION)
			.and_then(|v| v.to_str().ok())
			.map(|s| s.to_string())
		{
			client
				.post(location)
				.json(&command)
				.send()
				.await
				.map_err(|e| ClusterError::Fatal(e.to_string()))?;
		}
		return Ok(());
	}

	if !resp.status().is_success() {
		return Err(ClusterError::Fatal(format!(
			"join rejected with status {}",
			resp.status()
		)));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration as ChronoDuration;

	#[test]
	fn never_seen_peer_is_stale() {
		assert!(is_stale(None, Utc::now(), Duration::from_secs(5)));
	}

	#[test]
	fn recent_activity_is_not_stale() {
		let now = Utc::now();
		let last_seen = now - ChronoDuration::milliseconds(100);
		assert!(!is_stale(Some(last_seen), now, Duration::from_secs(5)));
	}

	#[test]
	fn activity_older_than_threshold_is_stale() {
		let now = Utc::now();
		let last_seen = now - ChronoDuration::seconds(30);
		assert!(is_stale(Some(last_seen), now, Duration::from_secs(5)));
	}
}

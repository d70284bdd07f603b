//! Transfer Service: leader-only reassignment of an offline peer's order
//! processing (spec.md §4.G), grounded on the original consensus layer's
//! `checkPeersStatus`/`transferOrders` loop.

use crate::coordinator::ClusterCoordinator;
use crate::error::TransferError;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Header the original implementation used to mark an inter-node transfer
/// request as internal, rather than a public intake call.
const TRANSFER_AUTH_HEADER: &str = "user";

pub struct TransferService {
	coordinator: ClusterCoordinator,
	http_client: reqwest::Client,
	status_check_interval: Duration,
	connected: Arc<DashMap<String, bool>>,
	max_attempts: u32,
}

impl TransferService {
	pub fn new(
		coordinator: ClusterCoordinator,
		http_client: reqwest::Client,
		status_check_interval: Duration,
		max_attempts: u32,
	) -> Self {
		Self {
			coordinator,
			http_client,
			status_check_interval,
			connected: Arc::new(DashMap::new()),
			max_attempts,
		}
	}

	/// Runs until this node stops being leader. Intended to be spawned
	/// fresh each time `LeaderChange` promotes this node.
	pub async fn run(self) {
		let mut interval = tokio::time::interval(self.status_check_interval);
		interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
		interval.tick().await;

		loop {
			interval.tick().await;
			if !self.coordinator.is_current_service_leader() {
				return;
			}

			for peer in self.coordinator.peers() {
				if peer.name == self.coordinator.service_id() {
					continue;
				}

				let offline = self.coordinator.is_peer_offline(&peer.name);
				let was_connected = self
					.connected
					.get(&peer.name)
					.map(|v| *v.value())
					.unwrap_or(true);

				if offline {
					if was_connected {
						self.connected.insert(peer.name.clone(), false);
						let service_id = peer.name.clone();
						let this = self.clone_for_task();
						tokio::spawn(async move {
							if let Err(err) = this.transfer(&service_id).await {
								tracing::warn!(service_id, %err, "order transfer did not complete");
							}
						});
					}
				} else {
					self.connected.insert(peer.name.clone(), true);
				}

				if !self.coordinator.is_current_service_leader() {
					return;
				}
			}
		}
	}

	fn clone_for_task(&self) -> Self {
		Self {
			coordinator: self.coordinator.clone(),
			http_client: self.http_client.clone(),
			status_check_interval: self.status_check_interval,
			connected: Arc::clone(&self.connected),
			max_attempts: self.max_attempts,
		}
	}

	/// Reassigns `service_id`'s orders to an online peer, retrying with
	/// capped backoff while this node remains leader. Aborts if the
	/// service itself comes back online before a peer accepts (self
	/// recovery case).
	async fn transfer(&self, service_id: &str) -> Result<(), TransferError> {
		if service_id == self.coordinator.service_id() {
			return Err(TransferError::LeadershipLost);
		}

		let backoff = backoff::ExponentialBackoffBuilder::new()
			.with_max_elapsed_time(None)
			.build();
		let mut backoff = backoff;
		let mut attempts: u32 = 0;

		loop {
			if !self.coordinator.is_current_service_leader() {
				return Err(TransferError::LeadershipLost);
			}

			if self.try_transfer_once(service_id).await? {
				return Ok(());
			}

			attempts += 1;
			if attempts >= self.max_attempts {
				return Err(TransferError::NoPeerAccepted);
			}

			let wait = backoff::backoff::Backoff::next_backoff(&mut backoff).unwrap_or(self.status_check_interval);
			tokio::time::sleep(wait).await;
		}
	}

	/// One sweep over known peers: if the named service is itself back
	/// online, the transfer is aborted as unnecessary. Otherwise the first
	/// online peer that accepts the POST wins; self is the final fallback.
	async fn try_transfer_once(&self, service_id: &str) -> Result<bool, TransferError> {
		for peer in self.coordinator.peers() {
			if peer.name == self.coordinator.service_id() {
				continue;
			}
			if self.coordinator.is_peer_offline(&peer.name) {
				continue;
			}
			if peer.name == service_id {
				return Ok(true);
			}
			if self.post_transfer(&peer.connection_string, service_id).await {
				return Ok(true);
			}
		}

		Ok(self.post_transfer(self.coordinator.connection_string(), service_id).await)
	}

	async fn post_transfer(&self, connection_string: &str, service_id: &str) -> bool {
		let body = serde_json::json!({ "service_id": service_id });
		match self
			.http_client
			.post(format!("{}/service/transfer", connection_string))
			.header("Authorization", TRANSFER_AUTH_HEADER)
			.json(&body)
			.send()
			.await
		{
			Ok(resp) => resp.status().is_success(),
			Err(_) => false,
		}
	}
}

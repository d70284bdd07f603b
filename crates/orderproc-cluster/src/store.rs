//! In-memory log store and state machine backing this node's `Raft`
//! instance, following `openraft`'s own reference in-memory store shape.
//!
//! The consensus log and snapshot formats are treated as opaque per this
//! service's scope — nothing here inspects log entry contents beyond what
//! `openraft` itself requires to track membership.

use openraft::storage::{LogState, RaftLogReader, RaftLogStorage, RaftSnapshotBuilder, RaftStateMachine, Snapshot};
use openraft::{
	Entry, EntryPayload, LogId, OptionalSend, RaftSnapshotBuilder as _, SnapshotMeta, StorageError, StoredMembership,
	Vote,
};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::{ClusterCommand, ClusterResponse, TypeConfig};

#[derive(Debug, Default)]
struct LogStoreState {
	last_purged: Option<LogId<String>>,
	log: BTreeMap<u64, Entry<TypeConfig>>,
	vote: Option<Vote<String>>,
}

/// In-memory log storage for a single node's Raft instance.
#[derive(Clone)]
pub struct LogStore {
	state: Arc<RwLock<LogStoreState>>,
}

impl LogStore {
	pub fn new() -> Self {
		Self {
			state: Arc::new(RwLock::new(LogStoreState::default())),
		}
	}
}

impl Default for LogStore {
	fn default() -> Self {
		Self::new()
	}
}

impl RaftLogReader<TypeConfig> for LogStore {
	async fn try_get_log_entries<RB: std::ops::RangeBounds<u64> + Clone + std::fmt::Debug + OptionalSend>(
		&mut self,
		range: RB,
	) -> Result<Vec<Entry<TypeConfig>>, StorageError<String>> {
		let state = self.state.read().await;
		Ok(state.log.range(range).map(|(_, v)| v.clone()).collect())
	}
}

impl RaftLogStorage<TypeConfig> for LogStore {
	type LogReader = Self;

	async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError<String>> {
		let state = self.state.read().await;
		let last = state.log.values().last().map(|e| e.log_id);
		Ok(LogState {
			last_purged_log_id: state.last_purged,
			last_log_id: last,
		})
	}

	async fn get_log_reader(&mut self) -> Self::LogReader {
		self.clone()
	}

	async fn save_vote(&mut self, vote: &Vote<String>) -> Result<(), StorageError<String>> {
		self.state.write().await.vote = Some(*vote);
		Ok(())
	}

	async fn read_vote(&mut self) -> Result<Option<Vote<String>>, StorageError<String>> {
		Ok(self.state.read().await.vote)
	}

	async fn append<I>(&mut self, entries: I, callback: openraft::storage::LogFlushed<TypeConfig>)
	where
		I: IntoIterator<Item = Entry<TypeConfig>> + Send,
	{
		let mut state = self.state.write().await;
		for entry in entries {
			state.log.insert(entry.log_id.index, entry);
		}
		drop(state);
		callback.log_io_completed(Ok(()));
	}

	async fn truncate(&mut self, log_id: LogId<String>) -> Result<(), StorageError<String>> {
		let mut state = self.state.write().await;
		state.log.split_off(&log_id.index);
		Ok(())
	}

	async fn purge(&mut self, log_id: LogId<String>) -> Result<(), StorageError<String>> {
		let mut state = self.state.write().await;
		state.last_purged = Some(log_id);
		let keep = state.log.split_off(&(log_id.index + 1));
		state.log = keep;
		Ok(())
	}
}

#[derive(Debug, Clone, Default)]
struct StateMachineData {
	last_applied: Option<LogId<String>>,
	membership: StoredMembership<String, openraft::BasicNode>,
}

/// In-memory state machine. This service does not replicate domain data
/// through the log, so applying an entry only advances bookkeeping.
pub struct StateMachineStore {
	data: RwLock<StateMachineData>,
}

impl StateMachineStore {
	pub fn new() -> Self {
		Self {
			data: RwLock::new(StateMachineData::default()),
		}
	}
}

impl Default for StateMachineStore {
	fn default() -> Self {
		Self::new()
	}
}

impl RaftSnapshotBuilder<TypeConfig> for StateMachineStore {
	async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<String>> {
		let data = self.data.read().await;
		let meta = SnapshotMeta {
			last_log_id: data.last_applied,
			last_membership: data.membership.clone(),
			snapshot_id: "snapshot".to_string(),
		};
		Ok(Snapshot {
			meta,
			snapshot: Box::new(Cursor::new(Vec::new())),
		})
	}
}

impl RaftStateMachine<TypeConfig> for StateMachineStore {
	type SnapshotBuilder = Self;

	async fn applied_state(
		&mut self,
	) -> Result<(Option<LogId<String>>, StoredMembership<String, openraft::BasicNode>), StorageError<String>> {
		let data = self.data.read().await;
		Ok((data.last_applied, data.membership.clone()))
	}

	async fn apply<I>(&mut self, entries: I) -> Result<Vec<ClusterResponse>, StorageError<String>>
	where
		I: IntoIterator<Item = Entry<TypeConfig>> + OptionalSend,
	{
		let mut data = self.data.write().await;
		let mut responses = Vec::new();
		for entry in entries {
			data.last_applied = Some(entry.log_id);
			if let EntryPayload::Membership(membership) = entry.payload {
				data.membership = StoredMembership::new(Some(entry.log_id), membership);
			}
			responses.push(ClusterResponse);
		}
		Ok(responses)
	}

	async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
		Self::new()
	}

	async fn begin_receiving_snapshot(
		&mut self,
	) -> Result<Box<Cursor<Vec<u8>>>, StorageError<String>> {
		Ok(Box::new(Cursor::new(Vec::new())))
	}

	async fn install_snapshot(
		&mut self,
		meta: &SnapshotMeta<TypeConfig>,
		_snapshot: Box<Cursor<Vec<u8>>>,
	) -> Result<(), StorageError<String>> {
		let mut data = self.data.write().await;
		data.last_applied = meta.last_log_id;
		data.membership = meta.last_membership.clone();
		Ok(())
	}

	async fn get_current_snapshot(&mut self) -> Result<Option<Snapshot<TypeConfig>>, StorageError<String>> {
		Ok(None)
	}
}

#[allow(unused)]
type _UnusedCommandMarker = ClusterCommand;

//! Per-user memory spaces.
//!
//! Every user owns an independent [`UserMemory`]: items, activation state,
//! a vector index partition and a graph partition. Spaces are created lazily
//! and each sits behind its own mutex, so turns for one user are serialised
//! while different users proceed in parallel.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::activation::ActivationState;
use crate::backend::BackendFactory;
use crate::graph::GraphStore;
use crate::memory::{MemoryId, MemoryItem};
use crate::vector::VectorIndex;

/// Handle to one user's space.
pub type SharedUserMemory = Arc<Mutex<UserMemory>>;

/// All engine state belonging to one user.
pub struct UserMemory {
	pub(crate) user_id: String,
	pub(crate) items: BTreeMap<MemoryId, MemoryItem>,
	pub(crate) activation: ActivationState,
	pub(crate) vector: Box<dyn VectorIndex>,
	pub(crate) graph: Box<dyn GraphStore>,
	/// Memories selected into the previous turn's context
	pub(crate) previous_selection: Vec<MemoryId>,
	/// Most recently stored memory
	pub(crate) last_memory: Option<MemoryId>,
	pub(crate) last_turn_at: Option<DateTime<Utc>>,
	next_id: u64,
}

impl UserMemory {
	/// Empty space for `user_id` on the given backends.
	#[must_use]
	pub fn new(
		user_id: impl Into<String>,
		vector: Box<dyn VectorIndex>,
		graph: Box<dyn GraphStore>,
	) -> Self {
		Self {
			user_id: user_id.into(),
			items: BTreeMap::new(),
			activation: ActivationState::new(),
			vector,
			graph,
			previous_selection: Vec::new(),
			last_memory: None,
			last_turn_at: None,
			next_id: 1,
		}
	}

	/// Owning user.
	#[must_use]
	pub fn user_id(&self) -> &str {
		&self.user_id
	}

	/// Number of stored memories.
	#[must_use]
	pub fn len(&self) -> usize {
		self.items.len()
	}

	/// True when nothing is stored.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.items.is_empty()
	}

	/// Look up a memory.
	#[must_use]
	pub fn item(&self, id: MemoryId) -> Option<&MemoryItem> {
		self.items.get(&id)
	}

	/// Memories, oldest first.
	pub fn items(&self) -> impl DoubleEndedIterator<Item = &MemoryItem> {
		self.items.values()
	}

	/// Activation state of this user.
	#[must_use]
	pub const fn activation(&self) -> &ActivationState {
		&self.activation
	}

	/// Edges in this user's graph.
	#[must_use]
	pub fn edge_count(&self) -> usize {
		self.graph.edge_count()
	}

	/// Time of the last processed turn.
	#[must_use]
	pub const fn last_turn_at(&self) -> Option<DateTime<Utc>> {
		self.last_turn_at
	}

	pub(crate) fn allocate_id(&mut self) -> MemoryId {
		let id = MemoryId(self.next_id);
		self.next_id += 1;
		id
	}

	/// Remove a memory everywhere: item, activation, vector index and graph.
	///
	/// Backend failures are logged; the memory is gone from the user's space
	/// either way, so it can never be selected again. Returns whether the
	/// memory existed.
	pub(crate) fn remove_memory(&mut self, id: MemoryId) -> bool {
		if self.items.remove(&id).is_none() {
			return false;
		}
		let _ = self.activation.remove(id);
		self.previous_selection.retain(|&m| m != id);
		if self.last_memory == Some(id) {
			self.last_memory = self.items.keys().next_back().copied();
		}

		if let Err(err) = self.vector.remove(id) {
			warn!(user_id = %self.user_id, memory_id = %id, error = %err, "vector removal failed");
		}
		match self.graph.remove_node(id) {
			Ok(edges) => {
				tracing::trace!(
					user_id = %self.user_id,
					memory_id = %id,
					edges,
					"graph node removed"
				);
			}
			Err(err) => {
				warn!(
					user_id = %self.user_id,
					memory_id = %id,
					error = %err,
					"graph removal failed"
				);
			}
		}
		true
	}
}

/// Lazily created per-user spaces.
pub struct SessionStore {
	sessions: RwLock<HashMap<String, SharedUserMemory>>,
	factory: Arc<dyn BackendFactory>,
}

impl SessionStore {
	/// Store whose new spaces get backends from `factory`.
	#[must_use]
	pub fn new(factory: Arc<dyn BackendFactory>) -> Self {
		Self {
			sessions: RwLock::new(HashMap::new()),
			factory,
		}
	}

	/// Space for `user_id`, created on first access.
	pub fn get_or_create(&self, user_id: &str) -> SharedUserMemory {
		if let Some(existing) = self.sessions.read().get(user_id) {
			return Arc::clone(existing);
		}

		let mut sessions = self.sessions.write();
		Arc::clone(sessions.entry(user_id.to_string()).or_insert_with(|| {
			let vector = self.factory.vector_index(user_id);
			let graph = self.factory.graph_store(user_id);
			info!(
				user_id,
				vector_backend = vector.name(),
				graph_backend = graph.name(),
				"session created"
			);
			Arc::new(Mutex::new(UserMemory::new(user_id, vector, graph)))
		}))
	}

	/// Space for `user_id` if one exists.
	#[must_use]
	pub fn get(&self, user_id: &str) -> Option<SharedUserMemory> {
		self.sessions.read().get(user_id).map(Arc::clone)
	}

	/// Discard a user's space entirely. Returns whether it existed.
	///
	/// A turn already holding the space finishes on the detached copy.
	pub fn drop_user(&self, user_id: &str) -> bool {
		let removed = self.sessions.write().remove(user_id).is_some();
		if removed {
			info!(user_id, "session dropped");
		}
		removed
	}

	/// Reset every activation of a user to `initial`, keeping the memories.
	///
	/// Returns false for an unknown user.
	pub fn reset_activation(&self, user_id: &str, initial: f64) -> bool {
		let Some(space) = self.get(user_id) else {
			return false;
		};
		let mut space = space.lock();
		space.activation.reset(initial);
		space.previous_selection.clear();
		info!(user_id, memories = space.items.len(), "activation reset");
		true
	}

	/// Known users, sorted.
	#[must_use]
	pub fn users(&self) -> Vec<String> {
		let mut users: Vec<String> = self.sessions.read().keys().cloned().collect();
		users.sort_unstable();
		users
	}

	/// Number of users with a space.
	#[must_use]
	pub fn len(&self) -> usize {
		self.sessions.read().len()
	}

	/// True when no user has a space.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.sessions.read().is_empty()
	}
}

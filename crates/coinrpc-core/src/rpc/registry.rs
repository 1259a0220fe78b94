use std::sync::{Mutex, MutexGuard, PoisonError};

use lru::LruCache;

use crate::error::CoreError;

use super::future::Responder;

/// A registered call waiting for its reply.
pub(crate) struct PendingRequest {
    pub(crate) id: u64,
    pub(crate) method: String,
    /// Serialized envelope, kept for resending after a reconnect.
    pub(crate) payload: Vec<u8>,
    pub(crate) responder: Responder,
}

struct RegistryState {
    /// Unbounded linked hash map: O(1) insert/remove by ID and iteration in
    /// insertion order. Entries are only ever peeked, never promoted, so the
    /// least-recently-used end is always the oldest request.
    requests: LruCache<u64, PendingRequest>,
    closed: bool,
}

/// Outstanding requests by ID.
///
/// Every operation runs under one mutex, and the shutdown flag lives under
/// the same mutex, so a request can never be added after the final drain.
pub(crate) struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                requests: LruCache::unbounded(),
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Critical sections never panic mid-update, so a poisoned lock still
        // guards consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `request`. After shutdown the request is answered with
    /// `ClientShutdown` instead and the same error is returned.
    pub(crate) fn add(&self, request: PendingRequest) -> Result<(), CoreError> {
        let mut state = self.lock();
        if state.closed {
            drop(state);
            request.responder.deliver(Err(CoreError::ClientShutdown));
            return Err(CoreError::ClientShutdown);
        }
        let previous = state.requests.put(request.id, request);
        debug_assert!(previous.is_none(), "request IDs are never reused");
        Ok(())
    }

    pub(crate) fn remove(&self, id: u64) -> Option<PendingRequest> {
        self.lock().requests.pop(&id)
    }

    /// Detach every entry, oldest first, in one critical section.
    pub(crate) fn drain_all(&self) -> Vec<PendingRequest> {
        let mut state = self.lock();
        let mut drained = Vec::with_capacity(state.requests.len());
        while let Some((_, request)) = state.requests.pop_lru() {
            drained.push(request);
        }
        drained
    }

    /// Mark the registry closed. Returns `true` only for the call that
    /// closed it; every later `add` is rejected.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.lock();
        !std::mem::replace(&mut state.closed, true)
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.lock().requests.contains(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().requests.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().requests.is_empty()
    }

    /// `(id, method, payload)` of every pending request, oldest first.
    pub(crate) fn pending_requests(&self) -> Vec<(u64, String, Vec<u8>)> {
        self.lock()
            .requests
            .iter()
            .rev()
            .map(|(id, req)| (*id, req.method.clone(), req.payload.clone()))
            .collect()
    }
}

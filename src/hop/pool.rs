// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bookkeeping of open gateway sessions.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::endpoint::Endpoint;
use crate::error::Result;
use crate::gateway::GatewaySession;

/// Every session a resolver opened and has not closed yet.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: Mutex<HashMap<Uuid, Arc<dyn GatewaySession>>>,
}

impl SessionTracker {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<dyn GatewaySession>>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn track(&self, session: &Arc<dyn GatewaySession>) {
        self.lock().insert(session.id(), Arc::clone(session));
    }

    pub fn untrack(&self, session: &Arc<dyn GatewaySession>) {
        self.lock().remove(&session.id());
    }

    pub fn drain(&self) -> Vec<Arc<dyn GatewaySession>> {
        self.lock().drain().map(|(_, session)| session).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close a session and stop tracking it.
    pub async fn close(&self, session: &Arc<dyn GatewaySession>) -> Result<()> {
        self.untrack(session);
        session.close().await
    }
}

/// A shared session and the endpoint it was opened through.
pub(crate) struct PoolEntry {
    pub(crate) session: Arc<dyn GatewaySession>,
    pub(crate) upstream: Endpoint,
    leases: usize,
}

type Slot = Arc<tokio::sync::Mutex<Option<PoolEntry>>>;

/// Reference-counted gateway sessions keyed by gateway host name.
///
/// Each key has its own async lock, held while a missing session is being
/// opened so concurrent resolutions through the same gateway wait for one
/// session instead of racing to open several. Opening may take the lock of
/// the gateway's own upstream; since `from` chains are acyclic, locks are
/// always taken downstream to upstream.
#[derive(Default)]
pub struct SessionPool {
    slots: Mutex<HashMap<String, Slot>>,
}

impl SessionPool {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &str) -> Slot {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(key.to_string()).or_default())
    }

    fn existing_slot(&self, key: &str) -> Option<Slot> {
        let slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.get(key).cloned()
    }

    /// Take a lease on the session for `key`, opening it with `open` if
    /// there is none or the pooled one has been closed.
    ///
    /// A stale entry is returned in `.1` for the caller to dispose of,
    /// whether or not opening its replacement succeeded.
    pub(crate) async fn acquire<F>(
        &self,
        key: &str,
        open: F,
    ) -> (Result<Arc<dyn GatewaySession>>, Option<PoolEntry>)
    where
        F: Future<Output = Result<(Arc<dyn GatewaySession>, Endpoint)>>,
    {
        let slot = self.slot(key);
        let mut guard = slot.lock().await;

        let mut stale = None;
        if let Some(entry) = guard.as_mut() {
            if !entry.session.is_closed() {
                entry.leases += 1;
                debug!(
                    "Reusing session {} to {} ({} leases)",
                    entry.session.id(),
                    key,
                    entry.leases
                );
                return (Ok(Arc::clone(&entry.session)), None);
            }
            stale = guard.take();
        }

        let (session, upstream) = match open.await {
            Ok(opened) => opened,
            Err(e) => return (Err(e), stale),
        };
        *guard = Some(PoolEntry {
            session: Arc::clone(&session),
            upstream,
            leases: 1,
        });
        (Ok(session), stale)
    }

    /// Drop one lease on `key`. Returns the entry once the last lease is
    /// gone; the caller closes it.
    pub(crate) async fn release(&self, key: &str, session_id: Uuid) -> Option<PoolEntry> {
        let slot = self.existing_slot(key)?;
        let mut guard = slot.lock().await;
        let entry = guard.as_mut()?;
        if entry.session.id() != session_id {
            // The lease belongs to a session already swept or replaced.
            return None;
        }
        entry.leases = entry.leases.saturating_sub(1);
        if entry.leases > 0 {
            debug!("Session {} to {} still has {} leases", session_id, key, entry.leases);
            return None;
        }
        guard.take()
    }

    /// Remove every entry regardless of outstanding leases.
    pub(crate) async fn drain(&self) -> Vec<PoolEntry> {
        let slots: Vec<Slot> = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.drain().map(|(_, slot)| slot).collect()
        };
        let mut entries = Vec::new();
        for slot in slots {
            if let Some(entry) = slot.lock().await.take() {
                entries.push(entry);
            }
        }
        entries
    }

    /// Number of live leases on `key`.
    pub async fn leases(&self, key: &str) -> usize {
        match self.existing_slot(key) {
            Some(slot) => slot.lock().await.as_ref().map_or(0, |e| e.leases),
            None => 0,
        }
    }
}

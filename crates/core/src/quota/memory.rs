//! In-memory [`UsageLedger`] for tests and database-less development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::CoreError;
use crate::quota::ledger::{
    ActorUsage, ModuleUsage, NewUsageEvent, UsageLedger, UsageTotals,
};
use crate::types::{DbId, Timestamp};

#[derive(Debug, Clone)]
struct StoredEvent {
    id: DbId,
    event: NewUsageEvent,
    at: Timestamp,
    satisfaction: Option<i16>,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<StoredEvent>,
    next_id: DbId,
}

/// Usage ledger backed by a `Vec`. Can be switched into an "unavailable"
/// mode in which every call fails, to exercise failure policies.
#[derive(Debug, Default)]
pub struct MemoryUsageLedger {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryUsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail (or succeed again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored events across all tenants.
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored rating of an entry, if any.
    pub fn satisfaction_of(&self, entry_id: DbId) -> Option<i16> {
        self.lock()
            .events
            .iter()
            .find(|e| e.id == entry_id)
            .and_then(|e| e.satisfaction)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), CoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::Internal("usage ledger unavailable".into()));
        }
        Ok(())
    }

    fn tenant_events_since(&self, tenant_id: DbId, since: Timestamp) -> Vec<StoredEvent> {
        self.lock()
            .events
            .iter()
            .filter(|e| e.event.tenant_id == tenant_id && e.at >= since)
            .cloned()
            .collect()
    }
}

impl UsageLedger for MemoryUsageLedger {
    async fn count_actor_since(
        &self,
        tenant_id: DbId,
        user_id: DbId,
        since: Timestamp,
    ) -> Result<i64, CoreError> {
        self.check_available()?;
        let count = self
            .tenant_events_since(tenant_id, since)
            .iter()
            .filter(|e| e.event.user_id == user_id)
            .count();
        Ok(count as i64)
    }

    async fn count_tenant_since(&self, tenant_id: DbId, since: Timestamp) -> Result<i64, CoreError> {
        self.check_available()?;
        Ok(self.tenant_events_since(tenant_id, since).len() as i64)
    }

    async fn append(&self, event: &NewUsageEvent, at: Timestamp) -> Result<DbId, CoreError> {
        self.check_available()?;
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.events.push(StoredEvent {
            id,
            event: event.clone(),
            at,
            satisfaction: None,
        });
        Ok(id)
    }

    async fn totals_since(&self, tenant_id: DbId, since: Timestamp) -> Result<UsageTotals, CoreError> {
        self.check_available()?;
        let events = self.tenant_events_since(tenant_id, since);
        let ratings: Vec<f64> = events
            .iter()
            .filter_map(|e| e.satisfaction.map(f64::from))
            .collect();
        Ok(UsageTotals {
            requests: events.len() as i64,
            tokens: events.iter().map(|e| i64::from(e.event.tokens_used)).sum(),
            cost: events.iter().map(|e| e.event.cost).sum(),
            average_satisfaction: if ratings.is_empty() {
                None
            } else {
                Some(ratings.iter().sum::<f64>() / ratings.len() as f64)
            },
        })
    }

    async fn top_actors_since(
        &self,
        tenant_id: DbId,
        since: Timestamp,
        limit: i64,
    ) -> Result<Vec<ActorUsage>, CoreError> {
        self.check_available()?;
        let mut by_user: HashMap<DbId, ActorUsage> = HashMap::new();
        for e in self.tenant_events_since(tenant_id, since) {
            let entry = by_user.entry(e.event.user_id).or_insert_with(|| ActorUsage {
                user_id: e.event.user_id,
                user_name: e.event.user_name.clone(),
                requests: 0,
                cost: 0.0,
            });
            entry.requests += 1;
            entry.cost += e.event.cost;
        }
        let mut actors: Vec<ActorUsage> = by_user.into_values().collect();
        actors.sort_by(|a, b| b.requests.cmp(&a.requests).then(a.user_id.cmp(&b.user_id)));
        actors.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(actors)
    }

    async fn modules_since(
        &self,
        tenant_id: DbId,
        since: Timestamp,
    ) -> Result<Vec<ModuleUsage>, CoreError> {
        self.check_available()?;
        let mut by_module: HashMap<String, i64> = HashMap::new();
        for e in self.tenant_events_since(tenant_id, since) {
            *by_module.entry(e.event.module).or_default() += 1;
        }
        let mut modules: Vec<ModuleUsage> = by_module
            .into_iter()
            .map(|(module, requests)| ModuleUsage { module, requests })
            .collect();
        modules.sort_by(|a, b| b.requests.cmp(&a.requests).then(a.module.cmp(&b.module)));
        Ok(modules)
    }

    async fn set_satisfaction(
        &self,
        tenant_id: DbId,
        entry_id: DbId,
        rating: i16,
    ) -> Result<bool, CoreError> {
        self.check_available()?;
        let mut state = self.lock();
        match state
            .events
            .iter_mut()
            .find(|e| e.id == entry_id && e.event.tenant_id == tenant_id)
        {
            Some(e) => {
                e.satisfaction = Some(rating);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

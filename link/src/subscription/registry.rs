//! Registry of live subscriptions, keyed by logical subscription id.
//!
//! Entries are inserted once a subscription is established and removed when
//! it is terminated. The registry holds weak references only.

use super::state::SubscriptionState;
use crate::models::SubscriptionInfo;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};

#[derive(Clone, Default)]
pub(crate) struct SubscriptionRegistry {
    entries: Arc<Mutex<HashMap<String, Weak<SubscriptionState>>>>,
}

impl SubscriptionRegistry {
    pub(crate) fn insert(&self, state: &Arc<SubscriptionState>) {
        self.entries
            .lock()
            .insert(state.id().to_string(), Arc::downgrade(state));
    }

    pub(crate) fn remove(&self, id: &str) {
        self.entries.lock().remove(id);
    }

    /// Snapshot of every live subscription, oldest first.
    pub(crate) fn snapshot(&self) -> Vec<SubscriptionInfo> {
        let live: Vec<Arc<SubscriptionState>> = {
            let mut entries = self.entries.lock();
            entries.retain(|_, weak| weak.strong_count() > 0);
            entries.values().filter_map(Weak::upgrade).collect()
        };
        let mut infos: Vec<SubscriptionInfo> = live.iter().map(|state| state.info()).collect();
        infos.sort_by(|a, b| a.created_at_ms.cmp(&b.created_at_ms).then_with(|| a.id.cmp(&b.id)));
        infos
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

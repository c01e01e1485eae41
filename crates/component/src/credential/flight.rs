// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-key gate serializing check-cache-else-fetch sequences.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::cache::CacheKey;

/// At most one holder per [`CacheKey`] at a time.
///
/// A caller that waited re-checks the cache after acquiring, so it picks up
/// the value the previous holder stored instead of fetching again.
#[derive(Default)]
pub struct FlightGate {
    slots: Mutex<HashMap<CacheKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl FlightGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &CacheKey) -> OwnedMutexGuard<()> {
        let slot = Arc::clone(self.slots.lock().entry(key.clone()).or_default());
        slot.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let gate = Arc::new(FlightGate::new());
        let inside = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            let inside = Arc::clone(&inside);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _guard = gate.acquire(&CacheKey::platform("wx123")).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.expect("join");
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let gate = FlightGate::new();
        let _a = gate.acquire(&CacheKey::platform("wx123")).await;
        let b = tokio::time::timeout(
            Duration::from_millis(100),
            gate.acquire(&CacheKey::authorizer("wx123")),
        )
        .await;
        assert!(b.is_ok());
    }
}

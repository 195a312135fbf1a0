use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{FrameError, Result};
use crate::frame::Frame;

/// Default time an outgoing message may wait for its acknowledgement.
pub const MESSAGE_TIMEOUT: Duration = Duration::from_secs(60);

/// In-flight sequence numbers and the moment each was assigned.
///
/// Owned by one driver and shared with its sessions through `Arc`. Entries
/// leave the table on acknowledgement ([`free`](Self::free)) or when the
/// owner runs [`sweep_expired`](Self::sweep_expired).
#[derive(Debug, Default)]
pub struct SequenceRegistry {
    entries: Mutex<HashMap<u16, Instant>>,
    next: AtomicU8,
}

impl SequenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock only means another thread panicked mid-insert; the map
    // itself is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<u16, Instant>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `id` as awaiting acknowledgement, restarting its clock if already present.
    pub fn register(&self, id: u16) {
        self.lock().insert(id, Instant::now());
    }

    pub fn contains(&self, id: u16) -> bool {
        self.lock().contains_key(&id)
    }

    /// Remove `id`. Returns whether it was present.
    pub fn free(&self, id: u16) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!(id, "sequence number freed");
        }
        removed
    }

    /// Remove every entry older than `timeout` and return the removed ids.
    ///
    /// Expired ids are collected from a snapshot first, so a concurrent
    /// [`free`](Self::free) between the two phases is harmless.
    pub fn sweep_expired(&self, timeout: Duration) -> Vec<u16> {
        let snapshot: Vec<(u16, Instant)> =
            self.lock().iter().map(|(id, at)| (*id, *at)).collect();

        let now = Instant::now();
        let stale: Vec<u16> = snapshot
            .into_iter()
            .filter(|(_, at)| now.duration_since(*at) > timeout)
            .map(|(id, _)| id)
            .collect();

        let mut removed = Vec::with_capacity(stale.len());
        {
            let mut entries = self.lock();
            for id in stale {
                // Skip ids re-registered after the snapshot.
                if entries
                    .get(&id)
                    .is_some_and(|at| now.duration_since(*at) > timeout)
                {
                    entries.remove(&id);
                    removed.push(id);
                }
            }
        }

        if !removed.is_empty() {
            debug!(count = removed.len(), ?removed, "expired sequence numbers swept");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stamp `id` into `frame` and track it.
    pub fn assign(&self, frame: &mut Frame, id: u8) {
        frame.assign_sequence_number(id);
        self.register(u16::from(id));
    }

    /// Pick the next free 8-bit id, stamp it into `frame` and track it.
    pub fn allocate(&self, frame: &mut Frame) -> Result<u8> {
        let mut entries = self.lock();
        for _ in 0..=u8::MAX as usize {
            let candidate = self.next.fetch_add(1, Ordering::Relaxed);
            if let std::collections::hash_map::Entry::Vacant(slot) =
                entries.entry(u16::from(candidate))
            {
                slot.insert(Instant::now());
                drop(entries);
                frame.assign_sequence_number(candidate);
                return Ok(candidate);
            }
        }
        Err(FrameError::SequenceExhausted)
    }
}

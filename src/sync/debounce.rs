//! Per-group debounce timers for remote writes.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tracing::debug;

use super::keys::FieldGroup;
use crate::timer::TimerSlot;

/// One [`TimerSlot`] per field group.
pub struct Debouncer {
    delay: Duration,
    slots: HashMap<FieldGroup, TimerSlot>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        let slots = FieldGroup::ALL
            .iter()
            .map(|g| (*g, TimerSlot::new(g.table())))
            .collect();
        Self { delay, slots }
    }

    fn slot(&self, group: FieldGroup) -> &TimerSlot {
        // every group gets a slot in `new`
        &self.slots[&group]
    }

    /// (Re)start the group's quiet period; `write` runs once it elapses.
    pub fn schedule<F>(&self, group: FieldGroup, write: F) -> u64
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.slot(group).restart(self.delay, write);
        debug!(group = %group, generation, "Remote write scheduled");
        generation
    }

    pub fn cancel(&self, group: FieldGroup) -> bool {
        self.slot(group).cancel()
    }

    /// Cancel every pending write. Returns the groups that had one.
    pub fn cancel_all(&self) -> Vec<FieldGroup> {
        FieldGroup::ALL
            .iter()
            .copied()
            .filter(|g| self.cancel(*g))
            .collect()
    }

    pub fn is_pending(&self, group: FieldGroup) -> bool {
        self.slot(group).is_pending()
    }

    pub fn pending(&self) -> Vec<FieldGroup> {
        FieldGroup::ALL
            .iter()
            .copied()
            .filter(|g| self.is_pending(*g))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn bursts_collapse_per_group() {
        let debouncer = Debouncer::new(Duration::from_millis(20));
        let profile = Arc::new(AtomicUsize::new(0));
        let quiz = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let p = Arc::clone(&profile);
            debouncer.schedule(FieldGroup::Profile, async move {
                p.fetch_add(1, Ordering::SeqCst);
            });
        }
        let q = Arc::clone(&quiz);
        debouncer.schedule(FieldGroup::Quiz, async move {
            q.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(debouncer.pending(), vec![FieldGroup::Profile, FieldGroup::Quiz]);

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(profile.load(Ordering::SeqCst), 1);
        assert_eq!(quiz.load(Ordering::SeqCst), 1);
        assert!(debouncer.pending().is_empty());
    }

    #[tokio::test]
    async fn cancel_all_reports_pending_groups() {
        let debouncer = Debouncer::new(Duration::from_millis(20));
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        debouncer.schedule(FieldGroup::Progress, async move {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(debouncer.cancel_all(), vec![FieldGroup::Progress]);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(debouncer.cancel_all().is_empty());
    }
}

//! Pure debounce/coalescing state owned by the coordinator worker.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::domain::content::ContentUpdate;
use crate::domain::types::ContentType;

/// Lifecycle of one content type inside the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case", tag = "phase")]
pub enum SyncPhase {
    #[default]
    Idle,
    /// An update is waiting for the debounce timer.
    Pending,
    /// A write is in progress; `requeued` records an update that arrived meanwhile.
    Flushing { requeued: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    Queued,
    FlushStarted,
    FlushFinished { ok: bool },
}

impl SyncPhase {
    /// Next phase after `event`. Events that make no sense in the current
    /// phase leave it unchanged.
    pub fn transition(self, event: SyncEvent) -> SyncPhase {
        match (self, event) {
            (SyncPhase::Idle | SyncPhase::Pending, SyncEvent::Queued) => SyncPhase::Pending,
            (SyncPhase::Flushing { .. }, SyncEvent::Queued) => {
                SyncPhase::Flushing { requeued: true }
            }
            (SyncPhase::Pending, SyncEvent::FlushStarted) => SyncPhase::Flushing { requeued: false },
            (SyncPhase::Flushing { requeued: true }, SyncEvent::FlushFinished { .. }) => {
                SyncPhase::Pending
            }
            (SyncPhase::Flushing { requeued: false }, SyncEvent::FlushFinished { .. }) => {
                SyncPhase::Idle
            }
            (phase, _) => phase,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub update: ContentUpdate,
    pub queued_at: Instant,
}

impl PendingUpdate {
    pub fn content_type(&self) -> ContentType {
        self.update.content_type()
    }
}

/// Pending map, per-type phases and the single shared deadline.
#[derive(Debug, Default)]
pub struct SyncState {
    pending: HashMap<ContentType, PendingUpdate>,
    phases: HashMap<ContentType, SyncPhase>,
    deadline: Option<Instant>,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `update`, replacing any pending update of the same type, and
    /// re-arm the shared timer. Returns `true` when an earlier update was dropped.
    pub fn queue(&mut self, update: ContentUpdate, now: Instant, debounce: Duration) -> bool {
        let content_type = update.content_type();
        let coalesced = self
            .pending
            .insert(
                content_type,
                PendingUpdate {
                    update,
                    queued_at: now,
                },
            )
            .is_some();

        self.apply(content_type, SyncEvent::Queued);
        self.deadline = Some(now + debounce);
        coalesced
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel_timer(&mut self) {
        self.deadline = None;
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Swap out every pending update, oldest first, and disarm the timer.
    pub fn take_batch(&mut self) -> Vec<PendingUpdate> {
        self.deadline = None;
        let mut batch: Vec<PendingUpdate> = self.pending.drain().map(|(_, update)| update).collect();
        batch.sort_by_key(|pending| (pending.queued_at, pending.content_type()));

        for pending in &batch {
            self.apply(pending.content_type(), SyncEvent::FlushStarted);
        }
        batch
    }

    pub fn complete(&mut self, content_type: ContentType, ok: bool) {
        self.apply(content_type, SyncEvent::FlushFinished { ok });
    }

    pub fn phase(&self, content_type: ContentType) -> SyncPhase {
        self.phases.get(&content_type).copied().unwrap_or_default()
    }

    pub fn phases(&self) -> BTreeMap<ContentType, SyncPhase> {
        ContentType::ALL
            .into_iter()
            .map(|content_type| (content_type, self.phase(content_type)))
            .collect()
    }

    fn apply(&mut self, content_type: ContentType, event: SyncEvent) {
        let next = self.phase(content_type).transition(event);
        self.phases.insert(content_type, next);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::content::{CategoryMenu, HeroContent};

    const DEBOUNCE: Duration = Duration::from_millis(1000);

    fn hero(title: &str) -> ContentUpdate {
        ContentUpdate::Hero(
            serde_json::from_value::<HeroContent>(json!({"slides": [{"title": title}]}))
                .expect("hero"),
        )
    }

    fn categories() -> ContentUpdate {
        ContentUpdate::Categories(CategoryMenu { categories: vec![] })
    }

    #[test]
    fn transitions_follow_the_lifecycle() {
        let phase = SyncPhase::Idle.transition(SyncEvent::Queued);
        assert_eq!(phase, SyncPhase::Pending);
        let phase = phase.transition(SyncEvent::FlushStarted);
        assert_eq!(phase, SyncPhase::Flushing { requeued: false });
        assert_eq!(
            phase.transition(SyncEvent::FlushFinished { ok: false }),
            SyncPhase::Idle
        );
        assert_eq!(
            phase
                .transition(SyncEvent::Queued)
                .transition(SyncEvent::FlushFinished { ok: true }),
            SyncPhase::Pending
        );
    }

    #[test]
    fn stray_events_are_ignored() {
        assert_eq!(
            SyncPhase::Idle.transition(SyncEvent::FlushStarted),
            SyncPhase::Idle
        );
        assert_eq!(
            SyncPhase::Pending.transition(SyncEvent::FlushFinished { ok: true }),
            SyncPhase::Pending
        );
    }

    #[test]
    fn last_write_wins_per_type() {
        let mut state = SyncState::new();
        let now = Instant::now();

        assert!(!state.queue(hero("A"), now, DEBOUNCE));
        assert!(state.queue(hero("B"), now + Duration::from_millis(10), DEBOUNCE));
        assert_eq!(state.pending_len(), 1);

        let batch = state.take_batch();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].update, hero("B"));
    }

    #[test]
    fn requeue_rearms_single_timer() {
        let mut state = SyncState::new();
        let now = Instant::now();

        state.queue(hero("A"), now, DEBOUNCE);
        let later = now + Duration::from_millis(400);
        state.queue(categories(), later, DEBOUNCE);

        assert_eq!(state.deadline(), Some(later + DEBOUNCE));
        assert_eq!(state.phase(ContentType::Hero), SyncPhase::Pending);
        assert_eq!(state.phase(ContentType::Categories), SyncPhase::Pending);
    }

    #[test]
    fn take_batch_drains_in_queue_order() {
        let mut state = SyncState::new();
        let now = Instant::now();
        state.queue(categories(), now, DEBOUNCE);
        state.queue(hero("A"), now + Duration::from_millis(5), DEBOUNCE);

        let batch = state.take_batch();
        let types: Vec<_> = batch.iter().map(PendingUpdate::content_type).collect();
        assert_eq!(types, vec![ContentType::Categories, ContentType::Hero]);
        assert!(state.is_empty());
        assert!(state.deadline().is_none());
        assert_eq!(
            state.phase(ContentType::Hero),
            SyncPhase::Flushing { requeued: false }
        );

        state.complete(ContentType::Hero, true);
        state.complete(ContentType::Categories, false);
        assert_eq!(state.phase(ContentType::Hero), SyncPhase::Idle);
        assert_eq!(state.phase(ContentType::Categories), SyncPhase::Idle);
    }

    #[test]
    fn phases_cover_every_type() {
        let state = SyncState::new();
        let phases = state.phases();
        assert_eq!(phases.len(), ContentType::ALL.len());
        assert!(phases.values().all(|phase| *phase == SyncPhase::Idle));
    }
}

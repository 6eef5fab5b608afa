//! Deferred events that fire on a later tick.
//!
//! Events capture only a participant id. Whoever handles a fired event must
//! look the participant up again and do nothing if it is gone.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledEvent {
    CompleteCast { participant_id: u32 },
}

impl ScheduledEvent {
    pub fn participant_id(&self) -> u32 {
        match *self {
            ScheduledEvent::CompleteCast { participant_id } => participant_id,
        }
    }
}

#[derive(Debug, Clone)]
struct Pending {
    due: f64,
    seq: u64,
    event: ScheduledEvent,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    pending: Vec<Pending>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: f64, event: ScheduledEvent) {
        self.pending.push(Pending {
            due,
            seq: self.next_seq,
            event,
        });
        self.next_seq += 1;
    }

    /// Removes and returns every event due at `now`, earliest first. Events
    /// with the same due time keep their scheduling order.
    pub fn drain_due(&mut self, now: f64) -> Vec<ScheduledEvent> {
        let (mut due, later): (Vec<Pending>, Vec<Pending>) =
            self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = later;
        due.sort_by(|a, b| a.due.total_cmp(&b.due).then(a.seq.cmp(&b.seq)));
        due.into_iter().map(|p| p.event).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_only_due_events_in_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(3.0, ScheduledEvent::CompleteCast { participant_id: 3 });
        scheduler.schedule(1.0, ScheduledEvent::CompleteCast { participant_id: 1 });
        scheduler.schedule(2.0, ScheduledEvent::CompleteCast { participant_id: 2 });

        let fired = scheduler.drain_due(2.0);
        let ids: Vec<u32> = fired.iter().map(|e| e.participant_id()).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(scheduler.len(), 1);

        assert!(scheduler.drain_due(2.5).is_empty());
        assert_eq!(scheduler.drain_due(3.0).len(), 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_same_due_time_keeps_insertion_order() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(1.0, ScheduledEvent::CompleteCast { participant_id: 9 });
        scheduler.schedule(1.0, ScheduledEvent::CompleteCast { participant_id: 4 });
        let ids: Vec<u32> = scheduler
            .drain_due(1.0)
            .iter()
            .map(|e| e.participant_id())
            .collect();
        assert_eq!(ids, vec![9, 4]);
    }
}

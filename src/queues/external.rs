//! The external queue `X` (§4.4): a multimap from `(time, destination)` to
//! pending events.

use fxhash::FxHashMap;
use std::collections::BTreeMap;

use crate::simulator::{ExternalEvent, SimulatorId};
use crate::time::SimTime;

#[derive(Debug, Default)]
pub struct ExternalQueue {
    by_time: BTreeMap<SimTime, FxHashMap<SimulatorId, Vec<ExternalEvent>>>,
}

impl ExternalQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, dest: SimulatorId, time: SimTime, event: ExternalEvent) {
        self.by_time.entry(time).or_default().entry(dest).or_default().push(event);
    }

    #[must_use]
    pub fn peek_time(&self) -> Option<SimTime> {
        self.by_time.keys().next().copied()
    }

    /// Destinations with events pending at exactly `time`, without
    /// consuming them (§4.4 step 3's `XDests`).
    #[must_use]
    pub fn destinations_at(&self, time: SimTime) -> Vec<SimulatorId> {
        self.by_time
            .get(&time)
            .map(|m| m.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Removes and returns every destination's event list at exactly
    /// `time` (§4.4 step 5's delivery).
    pub fn pop_bundle(&mut self, time: SimTime) -> FxHashMap<SimulatorId, Vec<ExternalEvent>> {
        self.by_time.remove(&time).unwrap_or_default()
    }

    /// Drops every event destined for `sim`, regardless of time. Used when
    /// an executive deletes the model backing `sim` (§4.6, §8 property 6):
    /// no event destined to a deleted simulator is ever delivered.
    pub fn drop_destination(&mut self, sim: SimulatorId) {
        for (_, dests) in self.by_time.iter_mut() {
            dests.remove(&sim);
        }
        self.by_time.retain(|_, dests| !dests.is_empty());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_time.is_empty()
    }
}

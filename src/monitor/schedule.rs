//! Relative-delta schedule driving every monitored service off one clock.
//!
//! Each entry stores the number of ticks between itself and the entry before
//! it, so the head's delta is the countdown to the next batch and a tick is a
//! single decrement no matter how many services are queued.
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduleEntry<K> {
    key: K,
    delta: u32,
}

#[derive(Debug, Clone)]
pub struct DelayQueue<K> {
    entries: VecDeque<ScheduleEntry<K>>,
}

impl<K> Default for DelayQueue<K> {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }
}

impl<K: PartialEq + Clone> DelayQueue<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.iter().any(|entry| entry.key == *key)
    }

    /// Ticks until the next batch fires, `0` when idle.
    pub fn ticks_until_next(&self) -> u32 {
        self.entries.front().map_or(0, |entry| entry.delta)
    }

    /// Queues `key` to fire `interval` ticks from now.
    pub fn insert(&mut self, key: K, interval: u32) {
        let mut remaining = i64::from(interval.max(1));

        for index in 0..self.entries.len() {
            let delta = i64::from(self.entries[index].delta);
            let after = remaining - delta;

            if after == 0 && index + 1 < self.entries.len() {
                // Same batch as this node.
                self.entries.insert(index + 1, ScheduleEntry { key, delta: 0 });
                return;
            }

            if after < 0 {
                // `remaining` is strictly below `delta` here, so both fit in u32.
                let leftover = remaining as u32;
                self.entries[index].delta -= leftover;
                self.entries.insert(index, ScheduleEntry { key, delta: leftover });
                return;
            }

            remaining = after;
        }

        self.entries.push_back(ScheduleEntry {
            key,
            delta: remaining as u32,
        });
    }

    /// Splices `key` out, handing its delta to the successor so that every
    /// later entry keeps its absolute fire time.
    pub fn remove(&mut self, key: &K) -> bool {
        let Some(index) = self.entries.iter().position(|entry| entry.key == *key) else {
            return false;
        };
        let removed = self.entries.remove(index);
        if let (Some(removed), Some(next)) = (removed, self.entries.get_mut(index)) {
            next.delta += removed.delta;
        }
        true
    }

    pub fn reschedule(&mut self, key: K, interval: u32) {
        self.remove(&key);
        self.insert(key, interval);
    }

    /// Advances the schedule by one tick and returns the due batch.
    pub fn tick(&mut self) -> Vec<K> {
        let Some(head) = self.entries.front_mut() else {
            return Vec::new();
        };
        head.delta = head.delta.saturating_sub(1);
        if head.delta > 0 {
            return Vec::new();
        }

        let mut due = Vec::new();
        if let Some(head) = self.entries.pop_front() {
            due.push(head.key);
        }
        while self.entries.front().is_some_and(|entry| entry.delta == 0) {
            if let Some(entry) = self.entries.pop_front() {
                due.push(entry.key);
            }
        }
        due
    }

    /// Every queued key with its absolute ticks-until-fire, head first.
    pub fn fire_times(&self) -> Vec<(K, u32)> {
        let mut absolute = 0;
        self.entries
            .iter()
            .map(|entry| {
                absolute += entry.delta;
                (entry.key.clone(), absolute)
            })
            .collect()
    }

    pub fn deltas(&self) -> Vec<(K, u32)> {
        self.entries
            .iter()
            .map(|entry| (entry.key.clone(), entry.delta))
            .collect()
    }
}

impl<K: fmt::Display> fmt::Display for DelayQueue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DelayQueue <")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "[{}, {}]", entry.delta, entry.key)?;
        }
        write!(f, ">")
    }
}

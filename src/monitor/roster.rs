//! The set of monitored services together with their schedule. Every
//! structural change to either goes through here, under one lock held by
//! [`crate::Herald`].
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::differ::{self, NotifyDecision};
use super::pool::PollJob;
use super::schedule::DelayQueue;
use super::service::{MonitoredService, ServiceAddress, ServiceId, normalize_interval, validate_name};
use crate::error::HeraldError;
use crate::notifications::Notification;
use crate::ping::status::PresenceSnapshot;
use crate::store::{RosterRecord, ServiceRecord};

/// Read-only view of one service for rendering.
#[derive(Debug, Clone)]
pub struct ServiceView {
    pub service: MonitoredService,
    /// Ticks until the next scheduled poll; `None` while a poll is in flight.
    pub next_poll_in: Option<u32>,
}

#[derive(Debug)]
pub struct Roster {
    services: BTreeMap<ServiceId, MonitoredService>,
    schedule: DelayQueue<ServiceId>,
    next_id: u64,
    notifying: bool,
    default_interval: u32,
}

impl Roster {
    pub fn new(default_interval: u32, notifying: bool) -> Self {
        Self {
            services: BTreeMap::new(),
            schedule: DelayQueue::new(),
            next_id: 0,
            notifying,
            default_interval: default_interval.max(1),
        }
    }

    /// Rebuilds a roster from its persisted form, skipping invalid entries.
    pub fn from_record(record: RosterRecord, default_interval: u32) -> Self {
        let mut roster = Self::new(default_interval, record.notifying);
        roster.next_id = record.next_id;
        for stored in record.services {
            let id = stored.id;
            let interval = normalize_interval(i64::from(stored.interval), roster.default_interval);
            match MonitoredService::new(id, stored.host, &stored.name, stored.enabled, interval) {
                Ok(service) => {
                    roster.adopt(service);
                }
                Err(e) => warn!(service_id = %id, error = %e, "Skipping invalid stored service."),
            }
        }
        roster
    }

    pub fn to_record(&self) -> RosterRecord {
        RosterRecord {
            next_id: self.next_id,
            notifying: self.notifying,
            services: self
                .services
                .values()
                .map(|service| ServiceRecord {
                    id: service.id,
                    host: service.address.clone(),
                    name: service.name.clone(),
                    enabled: service.enabled,
                    interval: service.interval,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn get(&self, id: ServiceId) -> Option<&MonitoredService> {
        self.services.get(&id)
    }

    pub fn schedule(&self) -> &DelayQueue<ServiceId> {
        &self.schedule
    }

    pub fn default_interval(&self) -> u32 {
        self.default_interval
    }

    pub fn notifying(&self) -> bool {
        self.notifying
    }

    pub fn set_notifying(&mut self, notifying: bool) {
        self.notifying = notifying;
    }

    /// Creates a service with a fresh id and schedules it.
    pub fn create(
        &mut self,
        host: &str,
        name: &str,
        enabled: bool,
        interval: i64,
    ) -> Result<ServiceId, HeraldError> {
        let address = ServiceAddress::parse(host)?;
        let interval = normalize_interval(interval, self.default_interval);
        let id = ServiceId(self.next_id);
        let service = MonitoredService::new(id, address, name, enabled, interval)?;
        self.adopt(service);
        Ok(id)
    }

    /// Adds an existing service. A service whose id is already present is
    /// left untouched and `false` is returned.
    pub fn adopt(&mut self, service: MonitoredService) -> bool {
        let id = service.id;
        if self.services.contains_key(&id) {
            debug!(service_id = %id, "Service already present; ignoring add.");
            return false;
        }
        // Ids are never handed out twice.
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        self.schedule.insert(id, service.interval);
        info!(service_id = %id, name = %service.name, interval = service.interval, "Service added.");
        self.services.insert(id, service);
        true
    }

    pub fn remove(&mut self, id: ServiceId) -> Result<MonitoredService, HeraldError> {
        let service = self.services.remove(&id).ok_or(HeraldError::NotFound(id))?;
        self.schedule.remove(&id);
        info!(service_id = %id, name = %service.name, "Service removed.");
        Ok(service)
    }

    fn service_mut(&mut self, id: ServiceId) -> Result<&mut MonitoredService, HeraldError> {
        self.services.get_mut(&id).ok_or(HeraldError::NotFound(id))
    }

    pub fn set_enabled(&mut self, id: ServiceId, enabled: bool) -> Result<(), HeraldError> {
        self.service_mut(id)?.enabled = enabled;
        Ok(())
    }

    pub fn set_name(&mut self, id: ServiceId, name: &str) -> Result<(), HeraldError> {
        let name = validate_name(name)?;
        self.service_mut(id)?.name = name;
        Ok(())
    }

    /// Points the service at a new address. The old baseline belongs to a
    /// different service and is dropped.
    pub fn set_host(&mut self, id: ServiceId, host: &str) -> Result<(), HeraldError> {
        let address = ServiceAddress::parse(host)?;
        let service = self.service_mut(id)?;
        if service.address != address {
            service.address = address;
            service.last_snapshot = None;
            service.available = None;
        }
        Ok(())
    }

    /// Changes the interval. A queued service is rescheduled right away; one
    /// whose poll is in flight picks the new interval up on reinsertion.
    pub fn set_interval(&mut self, id: ServiceId, interval: i64) -> Result<u32, HeraldError> {
        let interval = normalize_interval(interval, self.default_interval);
        self.service_mut(id)?.interval = interval;
        if self.schedule.contains(&id) {
            self.schedule.reschedule(id, interval);
        }
        Ok(interval)
    }

    /// Advances the schedule one tick and returns the polls now due.
    pub fn tick(&mut self) -> Vec<PollJob> {
        self.schedule
            .tick()
            .into_iter()
            .filter_map(|id| match self.services.get(&id) {
                Some(service) => Some(PollJob {
                    id,
                    address: service.address.clone(),
                }),
                None => {
                    warn!(service_id = %id, "Scheduled service no longer exists.");
                    None
                }
            })
            .collect()
    }

    /// Polls for an out-of-band refresh: every enabled service.
    pub fn enabled_jobs(&self) -> Vec<PollJob> {
        self.services
            .values()
            .filter(|service| service.enabled)
            .map(|service| PollJob {
                id: service.id,
                address: service.address.clone(),
            })
            .collect()
    }

    /// Applies one poll result: diff against the baseline, update it, and put
    /// the service back on the schedule when `reschedule` is set.
    pub fn record(
        &mut self,
        id: ServiceId,
        snapshot: PresenceSnapshot,
        reschedule: bool,
    ) -> Option<Notification> {
        let Some(service) = self.services.get_mut(&id) else {
            debug!(service_id = %id, "Service removed while its poll was in flight; discarding result.");
            return None;
        };

        let decision = differ::diff(
            &service.name,
            service.last_snapshot.as_ref(),
            &snapshot,
            service.enabled,
            self.notifying,
        );
        service.available = Some(snapshot.success);
        if differ::should_store(&snapshot) {
            service.last_snapshot = Some(snapshot);
        }
        if reschedule && !self.schedule.contains(&id) {
            self.schedule.insert(id, service.interval);
        }

        match decision {
            NotifyDecision::Suppress => None,
            NotifyDecision::Notify { caption, body } => Some(Notification { caption, body }),
        }
    }

    /// Services ordered by id, with their countdown to the next poll.
    pub fn views(&self) -> Vec<ServiceView> {
        let fire_times: HashMap<ServiceId, u32> = self.schedule.fire_times().into_iter().collect();
        self.services
            .values()
            .map(|service| ServiceView {
                service: service.clone(),
                next_poll_in: fire_times.get(&service.id).copied(),
            })
            .collect()
    }
}

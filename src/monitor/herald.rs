use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, error, info, warn};

use super::pool::{PollJob, PollWorkerPool};
use super::roster::{Roster, ServiceView};
use super::service::{MonitoredService, ServiceId};
use crate::config::HeraldConfig;
use crate::error::HeraldError;
use crate::notifications::{Notification, NotificationSink};
use crate::ping::poller::ServicePoller;
use crate::ping::status::PresenceSnapshot;
use crate::store::{PersistentStore, RosterRecord};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub polled: usize,
    pub abandoned: usize,
    pub notified: usize,
}

/// Changes a view layer may want to redraw on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RosterEvent {
    Added(ServiceId),
    Removed(ServiceId),
    Updated(ServiceId),
    BatchCompleted(BatchSummary),
}

/// Owns the roster and its schedule and drives polls against them.
pub struct Herald {
    roster: Mutex<Roster>,
    poller: Arc<dyn ServicePoller>,
    pool: PollWorkerPool,
    sink: Arc<dyn NotificationSink>,
    store: Arc<dyn PersistentStore>,
    events: broadcast::Sender<RosterEvent>,
}

impl Herald {
    /// Restores the roster from `store`. An unreadable roster is logged and
    /// the session starts empty.
    pub fn open(
        config: &HeraldConfig,
        poller: Arc<dyn ServicePoller>,
        sink: Arc<dyn NotificationSink>,
        store: Arc<dyn PersistentStore>,
    ) -> Self {
        let fresh = || Roster::new(config.default_interval, config.notifications_enabled);
        let roster = match store.load().and_then(|bytes| bytes.map(|b| RosterRecord::decode(&b)).transpose()) {
            Ok(Some(record)) => {
                let roster = Roster::from_record(record, config.default_interval);
                info!(services = roster.len(), "Roster restored.");
                roster
            }
            Ok(None) => {
                info!("No saved roster found, starting empty.");
                fresh()
            }
            Err(e) => {
                error!(error = %e, "Failed to load saved roster, starting empty.");
                fresh()
            }
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            roster: Mutex::new(roster),
            poller,
            pool: PollWorkerPool::new(config.workers, config.batch_deadline()),
            sink,
            store,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RosterEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: RosterEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    pub async fn add_service(
        &self,
        host: &str,
        name: &str,
        enabled: bool,
        interval: i64,
    ) -> Result<ServiceId, HeraldError> {
        let id = self.roster.lock().await.create(host, name, enabled, interval)?;
        self.emit(RosterEvent::Added(id));
        self.persist().await;
        Ok(id)
    }

    /// Adds a fully built service. Returns `false` without touching anything
    /// when its id is already in the roster.
    pub async fn adopt(&self, service: MonitoredService) -> bool {
        let id = service.id;
        let added = self.roster.lock().await.adopt(service);
        if added {
            self.emit(RosterEvent::Added(id));
            self.persist().await;
        }
        added
    }

    pub async fn remove_service(&self, id: ServiceId) -> Result<(), HeraldError> {
        self.roster.lock().await.remove(id)?;
        self.emit(RosterEvent::Removed(id));
        self.persist().await;
        Ok(())
    }

    pub async fn set_enabled(&self, id: ServiceId, enabled: bool) -> Result<(), HeraldError> {
        self.roster.lock().await.set_enabled(id, enabled)?;
        self.updated(id).await;
        Ok(())
    }

    pub async fn set_host(&self, id: ServiceId, host: &str) -> Result<(), HeraldError> {
        self.roster.lock().await.set_host(id, host)?;
        self.updated(id).await;
        Ok(())
    }

    pub async fn set_name(&self, id: ServiceId, name: &str) -> Result<(), HeraldError> {
        self.roster.lock().await.set_name(id, name)?;
        self.updated(id).await;
        Ok(())
    }

    /// Returns the interval actually applied.
    pub async fn set_interval(&self, id: ServiceId, interval: i64) -> Result<u32, HeraldError> {
        let applied = self.roster.lock().await.set_interval(id, interval)?;
        self.updated(id).await;
        Ok(applied)
    }

    async fn updated(&self, id: ServiceId) {
        self.emit(RosterEvent::Updated(id));
        self.persist().await;
    }

    pub async fn set_notifying(&self, notifying: bool) {
        self.roster.lock().await.set_notifying(notifying);
        info!(notifying, "Global notifications toggled.");
        self.persist().await;
    }

    pub async fn notifying(&self) -> bool {
        self.roster.lock().await.notifying()
    }

    pub async fn snapshot(&self) -> Vec<ServiceView> {
        self.roster.lock().await.views()
    }

    /// Polls every enabled service now. The schedule is left as it is.
    pub async fn refresh_all(&self) -> BatchSummary {
        let jobs = self.roster.lock().await.enabled_jobs();
        debug!(services = jobs.len(), "Refreshing all enabled services.");
        self.poll_and_record(jobs, false).await
    }

    /// Advances the schedule by one tick and polls whatever came due.
    pub async fn tick(&self) -> Option<BatchSummary> {
        let jobs = self.roster.lock().await.tick();
        if jobs.is_empty() {
            return None;
        }
        debug!(services = jobs.len(), "Batch due.");
        Some(self.poll_and_record(jobs, true).await)
    }

    async fn poll_and_record(&self, jobs: Vec<PollJob>, reschedule: bool) -> BatchSummary {
        let report = self.pool.run_batch(Arc::clone(&self.poller), jobs).await;

        let notifications: Vec<Notification> = {
            let mut roster = self.roster.lock().await;
            let abandoned = report
                .abandoned
                .iter()
                .map(|id| (*id, PresenceSnapshot::unavailable()));
            report
                .outcomes
                .iter()
                .cloned()
                .chain(abandoned)
                .filter_map(|(id, snapshot)| roster.record(id, snapshot, reschedule))
                .collect()
        };

        let summary = BatchSummary {
            polled: report.polled(),
            abandoned: report.abandoned.len(),
            notified: notifications.len(),
        };
        for notification in notifications {
            self.sink.enqueue(notification);
        }
        if summary.abandoned > 0 {
            warn!(abandoned = summary.abandoned, "Some polls did not finish before the batch deadline.");
        }
        info!(
            polled = summary.polled,
            abandoned = summary.abandoned,
            notified = summary.notified,
            "Batch completed."
        );
        self.emit(RosterEvent::BatchCompleted(summary));
        summary
    }

    /// Writes the roster to the store. Failures are logged; the in-memory
    /// roster stays authoritative.
    pub async fn persist(&self) {
        // Held until the write lands so saves reach the store in order.
        let roster = self.roster.lock().await;
        let bytes = match roster.to_record().encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "Failed to encode roster.");
                return;
            }
        };
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || store.save(&bytes)).await;
        drop(roster);

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "Failed to save roster."),
            Err(join_error) => error!(error = ?join_error, "Roster save task failed."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::service::ServiceAddress;
    use crate::ping::PollError;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Answers from a per-host script; unknown hosts fail.
    #[derive(Default)]
    struct ScriptedPoller {
        answers: StdMutex<HashMap<String, PresenceSnapshot>>,
        calls: StdMutex<Vec<String>>,
    }

    impl ScriptedPoller {
        fn answer(&self, host: &str, names: &[&str]) {
            let snapshot = PresenceSnapshot::online(
                names.len() as i64,
                20,
                Some(names.iter().map(|n| n.to_string()).collect()),
            );
            self.answers.lock().unwrap().insert(host.to_string(), snapshot);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ServicePoller for ScriptedPoller {
        async fn poll(&self, address: &ServiceAddress) -> Result<PresenceSnapshot, PollError> {
            self.calls.lock().unwrap().push(address.host().to_string());
            if address.host().starts_with("hang") {
                tokio::time::sleep(Duration::from_secs(600)).await;
            }
            self.answers
                .lock()
                .unwrap()
                .get(address.host())
                .cloned()
                .ok_or(PollError::Timeout)
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        received: StdMutex<Vec<Notification>>,
    }

    impl NotificationSink for CollectingSink {
        fn enqueue(&self, notification: Notification) {
            self.received.lock().unwrap().push(notification);
        }
    }

    struct BrokenStore;

    impl PersistentStore for BrokenStore {
        fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(Some(b"not = [valid".to_vec()))
        }

        fn save(&self, _bytes: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::IoError(std::io::Error::other("disk full")))
        }
    }

    struct Fixture {
        herald: Herald,
        poller: Arc<ScriptedPoller>,
        sink: Arc<CollectingSink>,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let poller = Arc::new(ScriptedPoller::default());
        let sink = Arc::new(CollectingSink::default());
        let store = Arc::new(MemoryStore::new());
        let herald = Herald::open(
            &HeraldConfig::default(),
            poller.clone(),
            sink.clone(),
            store.clone(),
        );
        Fixture {
            herald,
            poller,
            sink,
            store,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_polls_due_services_and_notifies() {
        let f = fixture();
        let id = f.herald.add_service("survival.example", "Survival", true, 2).await.unwrap();
        f.poller.answer("survival.example", &["Alex"]);

        assert_eq!(f.herald.tick().await, None);
        let summary = f.herald.tick().await.unwrap();
        assert_eq!(summary.polled, 1);
        assert_eq!(summary.notified, 0);

        f.poller.answer("survival.example", &["Alex", "Steve"]);
        f.herald.tick().await;
        let summary = f.herald.tick().await.unwrap();
        assert_eq!(summary.notified, 1);

        let received = f.sink.received.lock().unwrap().clone();
        assert_eq!(
            received,
            vec![Notification {
                caption: "Survival".to_string(),
                body: "Steve has logged in!".to_string(),
            }]
        );

        let views = f.herald.snapshot().await;
        assert_eq!(views[0].service.id, id);
        assert_eq!(views[0].service.players_label(), "2/20");
        assert_eq!(views[0].next_poll_in, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_switch_mutes_notifications() {
        let f = fixture();
        f.herald.add_service("a.example", "A", true, 1).await.unwrap();
        f.poller.answer("a.example", &[]);
        f.herald.tick().await;

        f.herald.set_notifying(false).await;
        assert!(!f.herald.notifying().await);
        f.poller.answer("a.example", &["Alex"]);
        f.herald.tick().await;

        assert!(f.sink.received.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_polls_are_rescheduled() {
        let f = fixture();
        let fast = f.herald.add_service("fast.example", "Fast", true, 1).await.unwrap();
        let slow = f.herald.add_service("hang.example", "Hang", true, 1).await.unwrap();
        f.poller.answer("fast.example", &[]);

        let summary = f.herald.tick().await.unwrap();
        assert_eq!(summary.polled, 1);
        assert_eq!(summary.abandoned, 1);

        let views = f.herald.snapshot().await;
        let slow_view = views.iter().find(|view| view.service.id == slow).unwrap();
        assert_eq!(slow_view.next_poll_in, Some(1));
        assert_eq!(slow_view.service.players_label(), "?? / ??");
        let fast_view = views.iter().find(|view| view.service.id == fast).unwrap();
        assert_eq!(fast_view.service.available, Some(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_all_leaves_schedule_alone() {
        let f = fixture();
        f.herald.add_service("a.example", "A", true, 5).await.unwrap();
        let disabled = f.herald.add_service("b.example", "B", false, 7).await.unwrap();
        f.poller.answer("a.example", &["Alex"]);

        let before: Vec<Option<u32>> = f.herald.snapshot().await.iter().map(|v| v.next_poll_in).collect();
        let summary = f.herald.refresh_all().await;
        let after: Vec<Option<u32>> = f.herald.snapshot().await.iter().map(|v| v.next_poll_in).collect();

        assert_eq!(summary.polled, 1);
        assert_eq!(before, after);
        assert_eq!(f.poller.calls(), vec!["a.example".to_string()]);
        let views = f.herald.snapshot().await;
        assert!(views.iter().find(|v| v.service.id == disabled).unwrap().service.available.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_fills_counts_on_reopened_roster() {
        let f = fixture();
        f.herald.add_service("a.example", "A", true, 30).await.unwrap();
        let reopened = Herald::open(
            &HeraldConfig::default(),
            f.poller.clone(),
            f.sink.clone(),
            f.store.clone(),
        );
        assert_eq!(reopened.snapshot().await[0].service.players_label(), "?? / ??");

        f.poller.answer("a.example", &["Alex", "Steve"]);
        let summary = reopened.refresh_all().await;
        assert_eq!(summary.polled, 1);
        assert_eq!(reopened.snapshot().await[0].service.players_label(), "2/20");
    }

    #[tokio::test]
    async fn test_mutations_persist_and_restore() {
        let f = fixture();
        let a = f.herald.add_service("a.example:25570", "A", true, 3).await.unwrap();
        let b = f.herald.add_service("b.example", "B", true, 0).await.unwrap();
        f.herald.set_name(b, "Creative").await.unwrap();
        f.herald.set_enabled(a, false).await.unwrap();
        f.herald.remove_service(a).await.unwrap();
        assert!(matches!(
            f.herald.remove_service(a).await,
            Err(HeraldError::NotFound(_))
        ));

        let reopened = Herald::open(
            &HeraldConfig::default(),
            f.poller.clone(),
            f.sink.clone(),
            f.store.clone(),
        );
        let views = reopened.snapshot().await;
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].service.id, b);
        assert_eq!(views[0].service.name, "Creative");
        assert_eq!(views[0].service.interval, 30);

        let c = reopened.add_service("c.example", "C", true, 1).await.unwrap();
        assert_eq!(c, ServiceId(2));
    }

    /// Keeps every write so tests can check what landed last.
    #[derive(Default)]
    struct HistoryStore {
        saves: StdMutex<Vec<Vec<u8>>>,
    }

    impl PersistentStore for HistoryStore {
        fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
            Ok(None)
        }

        fn save(&self, bytes: &[u8]) -> Result<(), StoreError> {
            // Slow first write widens the window for reordering.
            let first = self.saves.lock().unwrap().is_empty();
            if first {
                std::thread::sleep(Duration::from_millis(50));
            }
            self.saves.lock().unwrap().push(bytes.to_vec());
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_mutations_save_latest_roster_last() {
        let store = Arc::new(HistoryStore::default());
        let herald = Arc::new(Herald::open(
            &HeraldConfig::default(),
            Arc::new(ScriptedPoller::default()),
            Arc::new(CollectingSink::default()),
            store.clone(),
        ));

        let mut tasks = tokio::task::JoinSet::new();
        for i in 0..8 {
            let herald = Arc::clone(&herald);
            tasks.spawn(async move {
                herald
                    .add_service(&format!("s{i}.example"), &format!("S{i}"), true, 1)
                    .await
                    .unwrap();
            });
        }
        while let Some(joined) = tasks.join_next().await {
            joined.unwrap();
        }

        let saves = store.saves.lock().unwrap().clone();
        assert_eq!(saves.len(), 8);
        let sizes: Vec<usize> = saves
            .iter()
            .map(|bytes| RosterRecord::decode(bytes).unwrap().services.len())
            .collect();
        assert!(sizes.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(sizes.last(), Some(&8));
    }

    #[tokio::test]
    async fn test_adopt_twice_is_noop() {
        let f = fixture();
        let mut events = f.herald.subscribe();
        let service = MonitoredService::new(
            ServiceId(7),
            ServiceAddress::parse("a.example").unwrap(),
            "A",
            true,
            4,
        )
        .unwrap();

        assert!(f.herald.adopt(service.clone()).await);
        assert!(!f.herald.adopt(service).await);
        assert_eq!(f.herald.snapshot().await.len(), 1);
        assert_eq!(events.recv().await.unwrap(), RosterEvent::Added(ServiceId(7)));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_invalid_input_is_rejected() {
        let f = fixture();
        assert!(matches!(
            f.herald.add_service("", "A", true, 1).await,
            Err(HeraldError::InvalidAddress(_))
        ));
        let id = f.herald.add_service("a.example", "A", true, 1).await.unwrap();
        assert!(matches!(
            f.herald.set_name(id, "   ").await,
            Err(HeraldError::InvalidName(_))
        ));
        assert_eq!(f.herald.set_interval(id, -5).await.unwrap(), 30);
        assert!(matches!(
            f.herald.set_host(ServiceId(42), "b.example").await,
            Err(HeraldError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_broken_store_is_survivable() {
        let herald = Herald::open(
            &HeraldConfig::default(),
            Arc::new(ScriptedPoller::default()),
            Arc::new(CollectingSink::default()),
            Arc::new(BrokenStore),
        );
        assert!(herald.snapshot().await.is_empty());
        herald.add_service("a.example", "A", true, 1).await.unwrap();
        assert_eq!(herald.snapshot().await.len(), 1);
    }
}

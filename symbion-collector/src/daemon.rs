/**
 * DAEMON COLLECTEUR - Cycle de vie, ordonnancement et cache des résultats
 *
 * RÔLE : possède la configuration et l'état partagé, orchestre
 * retriever -> agrégation -> composition, et sert les résultats aux accesseurs.
 *
 * MACHINE À ÉTATS :
 *   Constructed --start()--> Running{Polling | OnRequest} --stop()--> Stopped
 *   (un daemon arrêté peut être redémarré)
 *
 * FONCTIONNEMENT :
 * - Polling : un cycle complet synchrone au start, puis un ticker en tâche de fond
 * - OnRequest : rien au start, chaque accesseur déclenche un rafraîchissement
 * - Updater : boucle indépendante qui remplace la liste d'hôtes
 *
 * CONCURRENCE :
 * - config et état = `Snapshot` (RwLock<Arc<T>>), remplacés en bloc
 * - aucun verrou n'est tenu à travers un `.await`
 * - chaque start/stop change de génération : un cycle en vol qui finit après
 *   un stop voit sa génération périmée et son résultat est jeté
 * - stop() n'interrompt pas un cycle en cours (borné par le timeout par hôte),
 *   il empêche seulement les suivants
 */

use crate::aggregator;
use crate::composer;
use crate::config::{DaemonConfig, Mode, DEFAULT_POLLING_INTERVAL_SECS};
use crate::health::{get_memory_usage_mb, DaemonHealth};
use crate::models::SampleBatch;
use crate::resources;
use crate::retriever;
use crate::state::Snapshot;
use crate::updater::{AddressUpdater, UpdaterError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("daemon is already running")]
    AlreadyRunning,
    #[error("daemon is not running")]
    NotRunning,
}

/// Result of one refresh, shared read-only with accessors.
#[derive(Debug, Clone, Default)]
pub struct CycleSnapshot {
    pub sample_batches: Arc<Vec<SampleBatch>>,
    pub host_batches: Arc<Vec<SampleBatch>>,
    pub composed: String,
    pub entities: usize,
    /// Date du dernier cycle samples -> composition
    pub refreshed_at: Option<OffsetDateTime>,
    /// Date des `host_batches`, rafraîchis à part en mode OnRequest
    pub hosts_refreshed_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct DaemonState {
    pub current: Arc<CycleSnapshot>,
    /// Derniers snapshots, au plus `cache_count`, du plus ancien au plus récent
    pub history: VecDeque<Arc<CycleSnapshot>>,
}

#[derive(Default)]
struct Lifecycle {
    shutdown: Option<watch::Sender<bool>>,
    tasks: Vec<JoinHandle<()>>,
    started_at: Option<Instant>,
}

struct DaemonInner {
    config: Snapshot<DaemonConfig>,
    state: Snapshot<DaemonState>,
    running: AtomicBool,
    generation: AtomicU64,
    lifecycle: Mutex<Lifecycle>,
    client: reqwest::Client,
}

/// Handle to the collector daemon; clones share the same daemon.
#[derive(Clone)]
pub struct Daemon {
    inner: Arc<DaemonInner>,
}

impl Daemon {
    pub fn new(config: DaemonConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    pub fn with_client(config: DaemonConfig, client: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(DaemonInner {
                config: Snapshot::new(config),
                state: Snapshot::new(DaemonState::default()),
                running: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                lifecycle: Mutex::new(Lifecycle::default()),
                client,
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Current configuration (the host list may have been replaced by the updater).
    pub fn config(&self) -> Arc<DaemonConfig> {
        self.inner.config.load()
    }

    pub async fn start(&self) -> Result<(), DaemonError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(DaemonError::AlreadyRunning);
        }
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            lifecycle.shutdown = Some(shutdown_tx);
            lifecycle.started_at = Some(Instant::now());
        }

        let config = self.inner.config.load();
        info!(
            mode = ?config.mode(),
            hosts = config.hosts().len(),
            updater = config.updater_enabled(),
            host_monitor = config.host_monitor_enabled(),
            "starting collector daemon"
        );

        if let Some(updater) = config.updater().cloned() {
            if updater.update_on_start() {
                self.run_address_update(updater.as_ref()).await;
            }
            if updater.interval_secs() > 0 {
                let period = Duration::from_secs(updater.interval_secs());
                let handle = tokio::spawn(self.clone().updater_loop(updater, period, shutdown_rx.clone()));
                self.inner.lifecycle.lock().tasks.push(handle);
            }
        }

        if config.mode() == Mode::Polling {
            self.refresh_all(generation).await;

            let period = config
                .polling_interval()
                .unwrap_or(Duration::from_secs(DEFAULT_POLLING_INTERVAL_SECS));
            let handle = tokio::spawn(self.clone().polling_loop(period, generation, shutdown_rx));
            self.inner.lifecycle.lock().tasks.push(handle);
        }

        Ok(())
    }

    /// Clears cached results and prevents future cycles. Harmless when the
    /// daemon was never started.
    pub fn stop(&self) {
        // les tâches se terminent seules sur le signal d'arrêt
        drop(self.halt());
    }

    /// Like [`Daemon::stop`], then waits for the background loops to exit.
    pub async fn shutdown(&self) {
        for handle in self.halt() {
            let _ = handle.await;
        }
    }

    fn halt(&self) -> Vec<JoinHandle<()>> {
        let was_running = self.inner.running.swap(false, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        let tasks = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if let Some(shutdown) = lifecycle.shutdown.take() {
                shutdown.send_replace(true);
            }
            lifecycle.started_at = None;
            std::mem::take(&mut lifecycle.tasks)
        };

        self.inner.state.store(DaemonState::default());
        if was_running {
            info!("collector daemon stopped");
        }
        tasks
    }

    /// Parsed sample batches of the last (Polling) or a fresh (OnRequest) cycle.
    pub async fn sample_result(&self) -> Result<Arc<Vec<SampleBatch>>, DaemonError> {
        let generation = self.ensure_running()?;
        let config = self.inner.config.load();
        if config.mode() == Mode::Polling {
            return Ok(self.inner.state.load().current.sample_batches.clone());
        }

        let samples = Arc::new(self.collect_samples(&config).await);
        let (composed, entities) = compose_batches(&samples);
        self.commit(generation, |snapshot| {
            snapshot.sample_batches = samples.clone();
            snapshot.composed = composed;
            snapshot.entities = entities;
        });
        Ok(samples)
    }

    /// Host usage batches (`host_cpu_usage`/`host_memory_usage`).
    pub async fn host_result(&self) -> Result<Arc<Vec<SampleBatch>>, DaemonError> {
        let generation = self.ensure_running()?;
        let config = self.inner.config.load();
        if config.mode() == Mode::Polling {
            return Ok(self.inner.state.load().current.host_batches.clone());
        }

        let hosts = Arc::new(self.collect_hosts(&config).await);
        self.commit_hosts(generation, hosts.clone());
        Ok(hosts)
    }

    /// Aggregated exposition text.
    pub async fn composed_result(&self) -> Result<String, DaemonError> {
        let generation = self.ensure_running()?;
        let config = self.inner.config.load();
        if config.mode() == Mode::Polling {
            return Ok(self.inner.state.load().current.composed.clone());
        }

        let samples = self.collect_samples(&config).await;
        let (composed, entities) = compose_batches(&samples);
        let result = composed.clone();
        self.commit(generation, move |snapshot| {
            snapshot.sample_batches = Arc::new(samples);
            snapshot.composed = composed;
            snapshot.entities = entities;
        });
        Ok(result)
    }

    /// Up to `cache_count` most recent snapshots, oldest first. Never refreshes.
    pub fn recent_snapshots(&self) -> Result<Vec<Arc<CycleSnapshot>>, DaemonError> {
        self.ensure_running()?;
        Ok(self.inner.state.load().history.iter().cloned().collect())
    }

    pub fn health(&self) -> DaemonHealth {
        let config = self.inner.config.load();
        let state = self.inner.state.load();
        let uptime_seconds = self
            .inner
            .lifecycle
            .lock()
            .started_at
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0);

        DaemonHealth {
            running: self.is_running(),
            mode: config.mode(),
            hosts_tracked: saturating_u32(config.hosts().len()),
            uptime_seconds,
            last_refresh: state
                .current
                .refreshed_at
                .and_then(|t| t.format(&Rfc3339).ok()),
            snapshots: saturating_u32(state.history.len()),
            entities_in_last_result: saturating_u32(state.current.entities),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }

    fn ensure_running(&self) -> Result<u64, DaemonError> {
        if !self.is_running() {
            return Err(DaemonError::NotRunning);
        }
        Ok(self.inner.generation.load(Ordering::SeqCst))
    }

    fn is_current(&self, generation: u64) -> bool {
        self.is_running() && self.inner.generation.load(Ordering::SeqCst) == generation
    }

    async fn collect_samples(&self, config: &DaemonConfig) -> Vec<SampleBatch> {
        retriever::retrieve(
            &self.inner.client,
            config.hosts(),
            config.host_timeout(),
            config.filter(),
        )
        .await
    }

    async fn collect_hosts(&self, config: &DaemonConfig) -> Vec<SampleBatch> {
        if !config.host_monitor_enabled() {
            return Vec::new();
        }
        resources::retrieve_host_batches(
            &self.inner.client,
            config.hosts(),
            config.resource_api_port(),
            config.host_timeout(),
        )
        .await
    }

    /// One full refresh -> aggregate -> compose cycle.
    async fn refresh_all(&self, generation: u64) {
        let config = self.inner.config.load();
        let started = Instant::now();

        let (samples, hosts) = tokio::join!(self.collect_samples(&config), self.collect_hosts(&config));
        let (composed, entities) = compose_batches(&samples);
        let responding = samples.len();

        let committed = self.commit(generation, move |snapshot| {
            snapshot.sample_batches = Arc::new(samples);
            snapshot.host_batches = Arc::new(hosts);
            snapshot.hosts_refreshed_at = Some(OffsetDateTime::now_utc());
            snapshot.composed = composed;
            snapshot.entities = entities;
        });

        debug!(
            hosts = config.hosts().len(),
            responding,
            entities,
            committed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "refresh cycle complete"
        );
    }

    /// Snapshot-replace of the state, discarded if `generation` is stale.
    fn commit(&self, generation: u64, apply: impl FnOnce(&mut CycleSnapshot)) -> bool {
        let cache_count = self.inner.config.load().cache_count();

        self.inner.state.update(|state| {
            if !self.is_current(generation) {
                return (DaemonState::clone(state), false);
            }

            let mut next = CycleSnapshot::clone(&state.current);
            apply(&mut next);
            next.refreshed_at = Some(OffsetDateTime::now_utc());
            let next = Arc::new(next);

            let mut history = state.history.clone();
            history.push_back(next.clone());
            while history.len() > cache_count {
                history.pop_front();
            }

            (
                DaemonState {
                    current: next,
                    history,
                },
                true,
            )
        })
    }

    /// Host batches only: replaces the current snapshot in place, the history
    /// ring keeps whole cycles.
    fn commit_hosts(&self, generation: u64, hosts: Arc<Vec<SampleBatch>>) -> bool {
        self.inner.state.update(|state| {
            if !self.is_current(generation) {
                return (DaemonState::clone(state), false);
            }

            let mut next = CycleSnapshot::clone(&state.current);
            next.host_batches = hosts;
            next.hosts_refreshed_at = Some(OffsetDateTime::now_utc());

            (
                DaemonState {
                    current: Arc::new(next),
                    history: state.history.clone(),
                },
                true,
            )
        })
    }

    /// Bornée par le timeout par hôte : un annuaire bloqué ne fige ni `start()`
    /// ni la boucle de mise à jour.
    async fn run_address_update(&self, updater: &dyn AddressUpdater) {
        let current = self.inner.config.load();
        let limit = current.host_timeout();
        let outcome = tokio::time::timeout(limit, updater.update(&current))
            .await
            .unwrap_or(Err(UpdaterError::Timeout(limit)));

        match outcome {
            Ok(next) => {
                info!(
                    before = current.hosts().len(),
                    after = next.hosts().len(),
                    "host list updated"
                );
                self.inner.config.store(next);
            }
            Err(e) => warn!(
                error = %e,
                hosts = current.hosts().len(),
                "address update failed, keeping previous host list"
            ),
        }
    }

    async fn polling_loop(self, period: Duration, generation: u64, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.refresh_all(generation).await,
                _ = shutdown.changed() => break,
            }
        }
        debug!("polling loop exited");
    }

    async fn updater_loop(
        self,
        updater: Arc<dyn AddressUpdater>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.run_address_update(updater.as_ref()).await,
                _ = shutdown.changed() => break,
            }
        }
        debug!("address updater loop exited");
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Aggregate every sample of the cycle; returns the text and the entity count.
fn compose_batches(batches: &[SampleBatch]) -> (String, usize) {
    let aggregates = aggregator::aggregate(batches.iter().flat_map(|b| b.samples.iter()));
    (composer::compose(&aggregates), aggregates.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Sample;
    use crate::updater::NoopUpdater;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    // adresse sur laquelle rien n'écoute : chaque scrape échoue vite
    const DEAD_HOST: &str = "127.0.0.1:9";

    fn on_request() -> Daemon {
        Daemon::new(
            DaemonConfig::builder()
                .hosts([DEAD_HOST])
                .host_timeout_ms(200)
                .build()
                .unwrap(),
        )
    }

    #[derive(Debug, Default)]
    struct CountingUpdater {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl AddressUpdater for CountingUpdater {
        async fn update(&self, current: &DaemonConfig) -> Result<DaemonConfig, UpdaterError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(UpdaterError::Empty("test".into()));
            }
            Ok(current.with_hosts(vec![format!("127.0.0.1:{}", 10_000 + n)]))
        }

        fn update_on_start(&self) -> bool {
            true
        }

        fn interval_secs(&self) -> u64 {
            3600
        }
    }

    /// Toutes les secondes : les appels pairs remplacent les hôtes, les impairs échouent
    #[derive(Debug, Default)]
    struct AlternatingUpdater {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl AddressUpdater for AlternatingUpdater {
        async fn update(&self, current: &DaemonConfig) -> Result<DaemonConfig, UpdaterError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 1 {
                return Err(UpdaterError::Empty("directory".into()));
            }
            Ok(current.with_hosts(vec![format!("127.0.0.1:{}", 20_000 + n)]))
        }

        fn update_on_start(&self) -> bool {
            false
        }

        fn interval_secs(&self) -> u64 {
            1
        }
    }

    /// Annuaire qui ne répond jamais
    #[derive(Debug)]
    struct HangingUpdater;

    #[async_trait]
    impl AddressUpdater for HangingUpdater {
        async fn update(&self, current: &DaemonConfig) -> Result<DaemonConfig, UpdaterError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(current.clone())
        }

        fn update_on_start(&self) -> bool {
            true
        }

        fn interval_secs(&self) -> u64 {
            0
        }
    }

    async fn eventually(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[test]
    fn test_stop_before_start_is_harmless() {
        let daemon = on_request();
        daemon.stop();
        daemon.stop();
        assert!(!daemon.is_running());
    }

    #[tokio::test]
    async fn test_accessors_require_running() {
        let daemon = on_request();
        assert!(matches!(daemon.sample_result().await, Err(DaemonError::NotRunning)));
        assert!(matches!(daemon.composed_result().await, Err(DaemonError::NotRunning)));
        assert!(matches!(daemon.recent_snapshots(), Err(DaemonError::NotRunning)));
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let daemon = on_request();
        daemon.start().await.unwrap();
        assert!(matches!(daemon.start().await, Err(DaemonError::AlreadyRunning)));
        daemon.shutdown().await;
        // redémarrage possible après un arrêt
        daemon.start().await.unwrap();
        daemon.stop();
    }

    #[tokio::test]
    async fn test_on_request_start_does_no_work() {
        let daemon = on_request();
        daemon.start().await.unwrap();
        assert!(daemon.is_running());
        assert!(daemon.health().last_refresh.is_none());

        // l'accesseur déclenche un cycle : hôte mort => résultat vide mais pas d'erreur
        assert_eq!(daemon.composed_result().await.unwrap(), "");
        assert!(daemon.health().last_refresh.is_some());
        assert_eq!(daemon.recent_snapshots().unwrap().len(), 1);
        daemon.stop();
    }

    #[tokio::test]
    async fn test_stop_clears_state() {
        let daemon = on_request();
        daemon.start().await.unwrap();
        daemon.sample_result().await.unwrap();
        daemon.stop();
        assert!(!daemon.is_running());
        assert!(daemon.inner.state.load().history.is_empty());
        assert!(daemon.health().last_refresh.is_none());
    }

    #[tokio::test]
    async fn test_stale_generation_is_discarded() {
        let daemon = on_request();
        daemon.start().await.unwrap();
        let old = daemon.ensure_running().unwrap();
        daemon.stop();
        daemon.start().await.unwrap();

        let committed = daemon.commit(old, |s| s.composed = "stale".into());
        assert!(!committed);
        assert_eq!(daemon.inner.state.load().current.composed, "");
        daemon.stop();
    }

    #[tokio::test]
    async fn test_history_bounded_by_cache_count() {
        let daemon = Daemon::new(
            DaemonConfig::builder()
                .hosts([DEAD_HOST])
                .cache_count(2)
                .build()
                .unwrap(),
        );
        daemon.start().await.unwrap();
        let generation = daemon.ensure_running().unwrap();
        for i in 0..5 {
            assert!(daemon.commit(generation, |s| s.entities = i));
        }
        let history = daemon.recent_snapshots().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].entities, 3);
        assert_eq!(history[1].entities, 4);
        daemon.stop();
    }

    #[tokio::test]
    async fn test_polling_serves_snapshot_without_fetching() {
        let daemon = Daemon::new(
            DaemonConfig::builder()
                .mode(Mode::Polling)
                .polling_interval_secs(3600)
                .hosts([DEAD_HOST])
                .host_timeout_ms(200)
                .build()
                .unwrap(),
        );
        daemon.start().await.unwrap();
        // cycle synchrone au démarrage
        assert_eq!(daemon.recent_snapshots().unwrap().len(), 1);

        // on écrit un snapshot à la main : l'accesseur doit le renvoyer tel quel
        let generation = daemon.ensure_running().unwrap();
        let batch = SampleBatch::new("x:1", vec![Sample::new("container_cpu_usage_high_result", 1.0)]);
        daemon.commit(generation, |s| {
            s.composed = "cached".into();
            s.sample_batches = Arc::new(vec![batch]);
        });
        assert_eq!(daemon.composed_result().await.unwrap(), "cached");
        assert_eq!(daemon.sample_result().await.unwrap().len(), 1);
        assert_eq!(daemon.recent_snapshots().unwrap().len(), 2);
        daemon.shutdown().await;
    }

    #[tokio::test]
    async fn test_updater_runs_on_start() {
        let updater = Arc::new(CountingUpdater::default());
        let daemon = Daemon::new(
            DaemonConfig::builder()
                .updater(updater.clone())
                .build()
                .unwrap(),
        );
        assert!(daemon.config().hosts().is_empty());
        daemon.start().await.unwrap();
        assert_eq!(updater.calls.load(Ordering::SeqCst), 1);
        assert_eq!(daemon.config().hosts(), ["127.0.0.1:10000"]);
        daemon.shutdown().await;
    }

    #[tokio::test]
    async fn test_updater_failure_keeps_hosts() {
        let updater = Arc::new(CountingUpdater {
            fail: true,
            ..Default::default()
        });
        let daemon = Daemon::new(
            DaemonConfig::builder()
                .hosts([DEAD_HOST])
                .updater(updater.clone())
                .build()
                .unwrap(),
        );
        daemon.start().await.unwrap();
        assert_eq!(updater.calls.load(Ordering::SeqCst), 1);
        assert_eq!(daemon.config().hosts(), [DEAD_HOST]);
        assert!(daemon.is_running());
        daemon.shutdown().await;
    }

    #[tokio::test]
    async fn test_noop_updater_spawns_no_loop() {
        let daemon = Daemon::new(
            DaemonConfig::builder()
                .hosts([DEAD_HOST])
                .updater(Arc::new(NoopUpdater))
                .build()
                .unwrap(),
        );
        daemon.start().await.unwrap();
        assert!(daemon.inner.lifecycle.lock().tasks.is_empty());
        daemon.stop();
    }

    #[tokio::test]
    async fn test_shutdown_joins_background_loops() {
        let daemon = Daemon::new(
            DaemonConfig::builder()
                .mode(Mode::Polling)
                .polling_interval_secs(1)
                .hosts([DEAD_HOST])
                .host_timeout_ms(100)
                .build()
                .unwrap(),
        );
        daemon.start().await.unwrap();
        assert_eq!(daemon.inner.lifecycle.lock().tasks.len(), 1);
        tokio::time::timeout(Duration::from_secs(5), daemon.shutdown())
            .await
            .unwrap();
        assert!(daemon.inner.lifecycle.lock().tasks.is_empty());
    }

    #[tokio::test]
    async fn test_sample_result_snapshot_is_self_consistent() {
        let daemon = on_request();
        daemon.start().await.unwrap();
        let generation = daemon.ensure_running().unwrap();
        daemon.commit(generation, |s| {
            s.composed = "from an older cycle".into();
            s.entities = 3;
        });

        // l'hôte mort ne renvoie rien : la composition doit suivre ces samples
        let samples = daemon.sample_result().await.unwrap();
        assert!(samples.is_empty());
        let current = daemon.inner.state.load().current.clone();
        assert_eq!(current.composed, "");
        assert_eq!(current.entities, 0);
        assert_eq!(daemon.health().entities_in_last_result, 0);
        daemon.stop();
    }

    #[tokio::test]
    async fn test_host_result_does_not_touch_cycle_history() {
        let daemon = on_request();
        daemon.start().await.unwrap();
        daemon.composed_result().await.unwrap();
        let before = daemon.inner.state.load().current.clone();

        daemon.host_result().await.unwrap();
        let after = daemon.inner.state.load().current.clone();
        assert_eq!(daemon.recent_snapshots().unwrap().len(), 1);
        assert_eq!(after.refreshed_at, before.refreshed_at);
        assert!(after.hosts_refreshed_at.is_some());
        daemon.stop();
    }

    #[tokio::test]
    async fn test_updater_loop_runs_alongside_polling() {
        let updater = Arc::new(AlternatingUpdater::default());
        let daemon = Daemon::new(
            DaemonConfig::builder()
                .mode(Mode::Polling)
                .polling_interval_secs(1)
                .hosts([DEAD_HOST])
                .host_timeout_ms(200)
                .updater(updater.clone())
                .build()
                .unwrap(),
        );
        daemon.start().await.unwrap();
        // pas d'appel au démarrage
        assert_eq!(updater.calls.load(Ordering::SeqCst), 0);
        assert_eq!(daemon.config().hosts(), [DEAD_HOST]);

        // 1er tick : remplacement ; 2e tick : échec, la liste précédente reste
        assert!(eventually(Duration::from_secs(5), || updater.calls.load(Ordering::SeqCst) >= 2).await);
        assert_eq!(daemon.config().hosts(), ["127.0.0.1:20000"]);
        assert!(daemon.recent_snapshots().unwrap().len() >= 2);

        daemon.shutdown().await;
        let calls = updater.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        assert_eq!(updater.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_stuck_updater_does_not_block_start() {
        let daemon = Daemon::new(
            DaemonConfig::builder()
                .hosts([DEAD_HOST])
                .host_timeout_ms(200)
                .updater(Arc::new(HangingUpdater))
                .build()
                .unwrap(),
        );
        tokio::time::timeout(Duration::from_secs(2), daemon.start())
            .await
            .unwrap()
            .unwrap();
        assert!(daemon.is_running());
        assert_eq!(daemon.config().hosts(), [DEAD_HOST]);
        daemon.stop();
    }

    #[test]
    fn test_health_counters_saturate() {
        assert_eq!(saturating_u32(7), 7);
        assert_eq!(saturating_u32(usize::MAX), u32::MAX);
    }
}

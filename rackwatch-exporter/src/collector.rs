// Rackwatch Exporter - Poll cycle orchestration
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! The poll loop.
//!
//! Each cycle fetches every configured source, hands the documents to the
//! [`CycleEngine`] and persists the snapshot. Fetching may run the three
//! source groups concurrently; processing always runs servers, then power
//! shelves, then CDUs.

use crate::metrics;
use crate::poller::SourcePoller;
use rackwatch::snapshot::write_best_effort;
use rackwatch::{
    CduDescriptor, CduPoll, CycleEngine, CycleInput, CycleReport, MetricSink, PowerShelfPoll,
    ServerPoll, SnapshotSink, SourceDescriptor,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Progress of the poll loop, shared with the HTTP handlers.
#[derive(Debug, Default)]
pub struct CollectorState {
    /// Completed cycles.
    pub cycles: AtomicU64,
    /// Duration of the last cycle in milliseconds.
    pub last_cycle_ms: AtomicU64,
    /// Endpoints that failed in the last cycle.
    pub last_failed_endpoints: AtomicU64,
    /// Whether the loop is running.
    pub running: AtomicBool,
}

impl CollectorState {
    /// Ready once the first cycle has completed.
    pub fn is_ready(&self) -> bool {
        self.cycles.load(Ordering::SeqCst) > 0
    }
}

/// Sources polled each cycle.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    pub servers: Vec<SourceDescriptor>,
    pub power_shelves: Vec<SourceDescriptor>,
    pub cdus: Vec<CduDescriptor>,
}

/// Drives poll cycles at a fixed interval.
pub struct Collector {
    engine: CycleEngine,
    poller: Arc<dyn SourcePoller>,
    sink: Arc<dyn MetricSink>,
    snapshots: Option<Arc<dyn SnapshotSink>>,
    sources: Sources,
    parallel: bool,
    state: Arc<CollectorState>,
}

impl Collector {
    pub fn new(
        engine: CycleEngine,
        poller: Arc<dyn SourcePoller>,
        sink: Arc<dyn MetricSink>,
        sources: Sources,
    ) -> Self {
        Self {
            engine,
            poller,
            sink,
            snapshots: None,
            sources,
            parallel: false,
            state: Arc::new(CollectorState::default()),
        }
    }

    /// Persist a snapshot after every cycle.
    pub fn with_snapshot_sink(mut self, snapshots: Arc<dyn SnapshotSink>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    /// Fetch the three source groups concurrently.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn state(&self) -> Arc<CollectorState> {
        Arc::clone(&self.state)
    }

    async fn fetch_servers(&self) -> Vec<ServerPoll> {
        let mut polls = Vec::with_capacity(self.sources.servers.len());
        for source in &self.sources.servers {
            polls.push(self.poller.poll_server(source).await);
        }
        polls
    }

    async fn fetch_power_shelves(&self) -> Vec<PowerShelfPoll> {
        let mut polls = Vec::with_capacity(self.sources.power_shelves.len());
        for source in &self.sources.power_shelves {
            polls.push(self.poller.poll_power_shelf(source).await);
        }
        polls
    }

    async fn fetch_cdus(&self) -> Vec<CduPoll> {
        let mut polls = Vec::with_capacity(self.sources.cdus.len());
        for source in &self.sources.cdus {
            if source.url.is_none() {
                debug!(rack = %source.rack_name, "CDU has no url, skipped");
                continue;
            }
            polls.push(self.poller.poll_cdu(source).await);
        }
        polls
    }

    /// Fetch every source of one cycle.
    pub async fn fetch(&self) -> CycleInput {
        let (servers, power_shelves, cdus) = if self.parallel {
            tokio::join!(
                self.fetch_servers(),
                self.fetch_power_shelves(),
                self.fetch_cdus()
            )
        } else {
            let servers = self.fetch_servers().await;
            let power_shelves = self.fetch_power_shelves().await;
            let cdus = self.fetch_cdus().await;
            (servers, power_shelves, cdus)
        };

        CycleInput {
            servers,
            power_shelves,
            cdus,
        }
    }

    /// Run one complete cycle.
    pub async fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();

        let input = self.fetch().await;
        let report = self.engine.process_cycle(&input, self.sink.as_ref());

        if let Some(snapshots) = &self.snapshots {
            let ok = write_best_effort(snapshots.as_ref(), &report.snapshot);
            metrics::record_snapshot_write(ok);
        }

        let elapsed = start.elapsed();
        metrics::record_cycle(
            elapsed.as_secs_f64(),
            report.failed_endpoints,
            report.power.watts(),
        );

        let cycle = self.state.cycles.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .last_cycle_ms
            .store(elapsed.as_millis() as u64, Ordering::SeqCst);
        self.state
            .last_failed_endpoints
            .store(report.failed_endpoints as u64, Ordering::SeqCst);

        info!(
            cycle,
            duration_ms = elapsed.as_millis() as u64,
            failed_endpoints = report.failed_endpoints,
            power_watts = report.power.watts(),
            "Poll cycle complete"
        );
        report
    }

    /// Poll forever. A cycle that overruns the interval delays the next one.
    pub async fn run(&self, interval: Duration) {
        self.state.running.store(true, Ordering::SeqCst);
        info!(
            interval_secs = interval.as_secs(),
            parallel = self.parallel,
            servers = self.sources.servers.len(),
            power_shelves = self.sources.power_shelves.len(),
            cdus = self.sources.cdus.len(),
            "Starting poll loop"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_cycle().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rackwatch::{EngineConfig, JsonFileSnapshotSink, MemorySink, Metric, PollFailure};
    use serde_json::json;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Canned documents; records the order of calls.
    #[derive(Default)]
    struct FakePoller {
        calls: Mutex<Vec<String>>,
    }

    impl FakePoller {
        fn log(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl SourcePoller for FakePoller {
        async fn poll_server(&self, source: &SourceDescriptor) -> ServerPoll {
            self.log(format!("server:{}", source.address));
            ServerPoll {
                source: source.clone(),
                thermal: Ok(json!({"Temperatures": [{"Name": "Temp_CPU0", "ReadingCelsius": 58}]})),
                power: vec![(
                    "Pwr_Node_Total".to_string(),
                    Err(PollFailure::Transport("timed out".into())),
                )],
            }
        }

        async fn poll_power_shelf(&self, source: &SourceDescriptor) -> PowerShelfPoll {
            self.log(format!("shelf:{}", source.address));
            // Yield so a concurrent CDU fetch can finish first
            tokio::task::yield_now().await;
            PowerShelfPoll {
                source: source.clone(),
                output_power: Ok(json!({"Reading": 500, "ReadingUnits": "W"})),
                psu_status: vec![(1, Ok(json!({"Status": {"Health": "OK"}})))],
                chassis_status: vec![],
            }
        }

        async fn poll_cdu(&self, source: &CduDescriptor) -> CduPoll {
            self.log(format!("cdu:{}", source.rack_name));
            CduPoll {
                source: source.clone(),
                document: Ok(json!({"responses": [
                    {"T_WI": 20, "T_WO": 25, "T_CR": 40, "T_CCO": 30, "T_CCI": 28}
                ]})),
            }
        }
    }

    fn sources() -> Sources {
        Sources {
            servers: vec![SourceDescriptor::new("10.0.0.11").with_rack("R01")],
            power_shelves: vec![
                SourceDescriptor::new("10.0.1.1").with_rack("R01"),
                SourceDescriptor::new("10.0.1.2").with_rack("R01"),
            ],
            cdus: vec![
                CduDescriptor::new("http://cdu-1", "R01"),
                CduDescriptor {
                    url: None,
                    rack_name: "R02".into(),
                },
            ],
        }
    }

    fn collector(parallel: bool) -> (Collector, Arc<FakePoller>, Arc<MemorySink>) {
        let poller = Arc::new(FakePoller::default());
        let sink = Arc::new(MemorySink::new());
        let collector = Collector::new(
            CycleEngine::new(EngineConfig::default()),
            poller.clone(),
            sink.clone(),
            sources(),
        )
        .with_parallel(parallel);
        (collector, poller, sink)
    }

    #[tokio::test]
    async fn test_sequential_cycle() {
        let (collector, poller, sink) = collector(false);
        let report = collector.run_cycle().await;

        assert_eq!(
            *poller.calls.lock().unwrap(),
            vec!["server:10.0.0.11", "shelf:10.0.1.1", "shelf:10.0.1.2", "cdu:R01"]
        );
        assert_eq!(report.power.watts(), 1000.0);
        assert_eq!(
            sink.value(Metric::CduCalculated, &["LPM_W", "R01"]),
            Some(2.95)
        );
        assert_eq!(report.failed_endpoints, 1);
        assert!(!report.snapshot.cdu.contains_key("R02"));
        assert!(collector.state().is_ready());
    }

    #[tokio::test]
    async fn test_parallel_fetch_keeps_power_before_cdu() {
        let (collector, poller, sink) = collector(true);
        let report = collector.run_cycle().await;

        assert_eq!(poller.calls.lock().unwrap().len(), 4);
        // Flow uses the full two-shelf total regardless of fetch order
        assert_eq!(report.power.contributions(), 2);
        assert_eq!(
            sink.value(Metric::CduCalculated, &["LPM_C", "R01"]),
            Some(1.43)
        );
        assert_eq!(
            sink.value(Metric::CduCalculated, &["Heat_CC", "R01"]),
            Some(200.0)
        );
    }

    #[tokio::test]
    async fn test_state_counts_cycles() {
        let (collector, _, _) = collector(false);
        let state = collector.state();
        assert!(!state.is_ready());

        collector.run_cycle().await;
        collector.run_cycle().await;
        assert_eq!(state.cycles.load(Ordering::SeqCst), 2);
        assert_eq!(state.last_failed_endpoints.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_snapshot_written_each_cycle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sensors_snapshot.json");
        let (collector, _, _) = collector(false);
        let collector =
            collector.with_snapshot_sink(Arc::new(JsonFileSnapshotSink::new(path.clone())));

        collector.run_cycle().await;
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["nodes"]["10.0.0.11"]["sensors"]["Temp_CPU0"]["value"], json!(58));
        assert_eq!(written["CDU"]["R01"]["Calculated"]["LPM_W"]["value"], json!(2.95));
        assert_eq!(written["CDU"]["R01"]["Calculated"]["LPM_W"]["unit"], json!(null));
    }

    #[tokio::test]
    async fn test_hysteresis_persists_across_cycles() {
        let (collector, _, sink) = collector(false);
        let labels = ["server", "10.0.0.11", "Pwr_Node_Total"];

        collector.run_cycle().await;
        assert_eq!(sink.get(Metric::SourcePollFailed, &labels), None);

        collector.run_cycle().await;
        assert_eq!(sink.value(Metric::SourcePollFailed, &labels), Some(1.0));
    }
}

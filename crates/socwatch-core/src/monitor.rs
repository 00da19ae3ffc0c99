// ── Monitoring loop ──
//
// One iteration: retention sweep when due, fleet rediscovery when due,
// then fetch → analyze → publish. The fleet state is threaded through
// explicitly; nothing here is global. The loop only stops on
// cancellation.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, SystemTime};

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::analyze::analyze;
use crate::cache::DiscoveryCache;
use crate::config::MonitorConfig;
use crate::error::CoreError;
use crate::model::{ConfiguredSite, FleetSnapshot, Validations};
use crate::pipeline::FetchPipeline;
use crate::publish::Publisher;
use crate::retention::{RetentionSweep, SweepReport};
use crate::storage::{ANALYSIS_FILE, DataDir, FLEET_SNAPSHOT_FILE, RAW_TELEMETRY_FILE};
use crate::validate::validate;

// ── Fleet state ──────────────────────────────────────────────────────

/// The discovered fleet, its validation against configuration, and when
/// it was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct FleetState {
    pub snapshot: FleetSnapshot,
    pub validations: Validations,
    pub refreshed_at: NaiveDateTime,
}

impl FleetState {
    pub fn build(
        sites: &[ConfiguredSite],
        snapshot: FleetSnapshot,
        refreshed_at: NaiveDateTime,
    ) -> Self {
        let validations = validate(sites, &snapshot);
        Self {
            snapshot,
            validations,
            refreshed_at,
        }
    }

    pub fn valid_count(&self) -> usize {
        self.validations.values().filter(|v| v.is_valid()).count()
    }

    /// Due once `now` has passed today's `refresh_at` and the state was
    /// taken before that boundary.
    pub fn needs_refresh(&self, now: NaiveDateTime, refresh_at: NaiveTime) -> bool {
        let boundary = now.date().and_time(refresh_at);
        now >= boundary && self.refreshed_at < boundary
    }
}

// ── Daily trigger ────────────────────────────────────────────────────

/// Fires at most once per calendar day, on the first check at or after
/// the target time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    at: NaiveTime,
    last_fired: Option<NaiveDate>,
}

impl DailyTrigger {
    pub fn new(at: NaiveTime) -> Self {
        Self {
            at,
            last_fired: None,
        }
    }

    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now.time() >= self.at && self.last_fired != Some(now.date())
    }

    /// Returns `true` and records the firing if due.
    pub fn fire(&mut self, now: NaiveDateTime) -> bool {
        if self.is_due(now) {
            self.last_fired = Some(now.date());
            true
        } else {
            false
        }
    }
}

// ── Monitor ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    pub analysed: usize,
    pub published: bool,
}

pub struct Monitor<P> {
    sites: Vec<ConfiguredSite>,
    fetch_interval: Duration,
    error_backoff: Duration,
    discovery_at: NaiveTime,
    retention_at: NaiveTime,
    pipeline: FetchPipeline,
    cache: DiscoveryCache,
    data: DataDir,
    retention: RetentionSweep,
    publisher: P,
}

impl<P: Publisher> Monitor<P> {
    pub fn new(config: MonitorConfig, publisher: P) -> Result<Self, CoreError> {
        let client = config.api.build_client()?;
        let pipeline = FetchPipeline::new(
            client,
            config.api.credentials.clone(),
            config.api.page_count,
        );
        Ok(Self::with_pipeline(config, pipeline, publisher))
    }

    pub fn with_pipeline(config: MonitorConfig, pipeline: FetchPipeline, publisher: P) -> Self {
        let data = DataDir::new(config.data_dir);
        Self {
            sites: config.sites,
            fetch_interval: config.fetch_interval,
            error_backoff: config.error_backoff,
            discovery_at: config.discovery_at,
            retention_at: config.retention_at,
            pipeline,
            cache: DiscoveryCache::new(data.cache_dir()),
            data,
            retention: RetentionSweep::new(config.retention),
            publisher,
        }
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Fleet state from today's cache, if any.
    pub fn restore(&self, now: NaiveDateTime) -> Option<FleetState> {
        self.cache
            .load(now.date())
            .map(|cached| FleetState::build(&self.sites, cached.snapshot, cached.refreshed_at))
    }

    /// Rediscover the fleet and replace `state`. An empty discovery keeps
    /// the previous state untouched.
    pub async fn refresh(&self, state: &mut Option<FleetState>, now: NaiveDateTime) {
        info!("refreshing fleet");
        let snapshot = self.pipeline.discover_fleet().await;
        if snapshot.is_empty() {
            warn!(
                have_previous = state.is_some(),
                "discovery returned no sites, keeping current fleet state"
            );
            return;
        }

        let fresh = FleetState::build(&self.sites, snapshot, now);
        if let Err(e) = self.cache.store(&fresh.snapshot, now) {
            warn!(error = %e, "failed to write discovery cache");
        }
        self.data
            .dump(&self.data.raw_dir(), FLEET_SNAPSHOT_FILE, &fresh.snapshot);
        info!(
            sites = fresh.snapshot.len(),
            valid = fresh.valid_count(),
            "fleet state updated"
        );
        *state = Some(fresh);
    }

    /// Fetch, analyse and publish once for `fleet`.
    pub async fn cycle(&self, fleet: &FleetState, today: NaiveDate) -> Result<CycleReport, CoreError> {
        let raw = self.pipeline.fetch_cycle(&fleet.validations, today).await;
        let mut report = CycleReport {
            fetched: raw.len(),
            ..CycleReport::default()
        };
        if raw.is_empty() {
            error!("no telemetry fetched, nothing to publish");
            return Ok(report);
        }
        self.data.dump(&self.data.raw_dir(), RAW_TELEMETRY_FILE, &raw);

        let analyses = analyze(&raw);
        report.analysed = analyses.len();
        self.data
            .dump(&self.data.processed_dir(), ANALYSIS_FILE, &analyses);

        self.publisher.publish(&analyses).await?;
        report.published = true;
        Ok(report)
    }

    /// Refresh if due, then run one cycle.
    pub async fn tick(
        &self,
        state: &mut Option<FleetState>,
        now: NaiveDateTime,
    ) -> Result<CycleReport, CoreError> {
        let due = state
            .as_ref()
            .is_none_or(|s| s.needs_refresh(now, self.discovery_at));
        if due {
            self.refresh(state, now).await;
        }

        match state.as_ref() {
            Some(fleet) => self.cycle(fleet, now.date()).await,
            None => {
                warn!("no fleet state available, skipping cycle");
                Ok(CycleReport::default())
            }
        }
    }

    /// One loop iteration: retention sweep when due, then [`tick`](Self::tick).
    pub async fn iteration(
        &self,
        state: &mut Option<FleetState>,
        retention: &mut DailyTrigger,
        now: NaiveDateTime,
    ) -> Result<CycleReport, CoreError> {
        if retention.fire(now) {
            self.sweep();
        }
        self.tick(state, now).await
    }

    pub fn sweep(&self) -> SweepReport {
        self.retention.sweep(SystemTime::now())
    }

    /// Run until `cancel` fires. Failed or panicking iterations are logged
    /// and retried after the error backoff.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut state = self.restore(local_now());
        let mut retention = DailyTrigger::new(self.retention_at);
        info!(
            sites = self.sites.len(),
            interval_secs = self.fetch_interval.as_secs(),
            "monitor started"
        );

        loop {
            let pause = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                outcome = AssertUnwindSafe(self.iteration(&mut state, &mut retention, local_now())).catch_unwind() => {
                    self.pause_after(outcome)
                }
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(pause) => {}
            }
        }
        info!("monitor stopped");
    }

    fn pause_after(
        &self,
        outcome: Result<Result<CycleReport, CoreError>, Box<dyn Any + Send>>,
    ) -> Duration {
        match outcome {
            Ok(Ok(report)) => {
                info!(
                    fetched = report.fetched,
                    analysed = report.analysed,
                    published = report.published,
                    "cycle complete"
                );
                self.fetch_interval
            }
            Ok(Err(e)) => {
                error!(error = %e, backoff_secs = self.error_backoff.as_secs(), "iteration failed");
                self.error_backoff
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_default();
                error!(%message, backoff_secs = self.error_backoff.as_secs(), "iteration panicked");
                self.error_backoff
            }
        }
    }
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

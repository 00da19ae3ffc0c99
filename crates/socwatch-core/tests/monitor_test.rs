#![allow(clippy::unwrap_used, clippy::float_cmp)]
// End-to-end tests for discovery, the fetch cycle and the monitor, against
// a wiremock upstream.

use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use socwatch_api::RetryPolicy;
use socwatch_core::{
    AnalysisMap, ApiSettings, ConfiguredSite, CoreError, CycleReport, Credentials, DailyTrigger,
    FleetState, Monitor, MonitorConfig, Publisher, RetentionRule, SocLevel,
};

// ── Helpers ─────────────────────────────────────────────────────────

#[derive(Default)]
struct RecordingPublisher {
    published: Mutex<Vec<AnalysisMap>>,
}

impl RecordingPublisher {
    fn calls(&self) -> Vec<AnalysisMap> {
        self.published.lock().unwrap().clone()
    }
}

impl Publisher for RecordingPublisher {
    async fn publish(&self, analyses: &AnalysisMap) -> Result<(), CoreError> {
        self.published.lock().unwrap().push(analyses.clone());
        Ok(())
    }
}

struct FailingPublisher;

impl Publisher for FailingPublisher {
    async fn publish(&self, _analyses: &AnalysisMap) -> Result<(), CoreError> {
        Err(CoreError::Publish {
            message: "sheet unavailable".into(),
        })
    }
}

/// Counts attempts, then fails or panics.
struct BrokenPublisher {
    attempts: AtomicUsize,
    panics: bool,
}

impl BrokenPublisher {
    fn new(panics: bool) -> Self {
        Self {
            attempts: AtomicUsize::new(0),
            panics,
        }
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl Publisher for BrokenPublisher {
    async fn publish(&self, _analyses: &AnalysisMap) -> Result<(), CoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        assert!(!self.panics, "sheet client blew up");
        Err(CoreError::Publish {
            message: "sheet unavailable".into(),
        })
    }
}

fn config(server: &MockServer, data_dir: &Path, page_count: u32) -> MonitorConfig {
    let mut api = ApiSettings::new(
        Url::parse(&server.uri()).unwrap(),
        Credentials {
            username: "ops@example.com".into(),
            password: "pw".to_string().into(),
        },
    );
    api.rate_limit = 100;
    api.retry = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(5),
    };
    api.page_count = page_count;

    MonitorConfig {
        api,
        sites: vec![
            ConfiguredSite::new("Alpha", "1"),
            ConfiguredSite::new("Beta", "2"),
        ],
        fetch_interval: Duration::from_secs(300),
        error_backoff: Duration::from_secs(60),
        discovery_at: NaiveTime::from_hms_opt(5, 0, 0).unwrap(),
        retention_at: NaiveTime::from_hms_opt(4, 0, 0).unwrap(),
        data_dir: data_dir.to_path_buf(),
        retention: Vec::new(),
    }
}

fn ok(data: serde_json::Value) -> serde_json::Value {
    json!({ "code": 0, "msg": "Success", "success": true, "data": data })
}

fn now() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 9)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap()
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(ok(json!({ "access_token": "tok" }))),
        )
        .mount(server)
        .await;
}

/// One plant page holding site 1 ("Alpha Upstream") with inverter S1.
async fn mount_fleet(server: &MockServer, plant_calls: u64) {
    Mock::given(method("GET"))
        .and(path("/api/v1/plants"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "total": 1,
            "infos": [{ "id": 1, "name": "Alpha Upstream" }]
        }))))
        .expect(plant_calls)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/plant/1/inverters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "infos": [{ "sn": "S0", "equipMode": "X" }, { "sn": "S1", "equipMode": "M1" }]
        }))))
        .mount(server)
        .await;
}

async fn mount_s1_telemetry(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/inverter/S1/day"))
        .and(query_param("params", "16,18,106"))
        .and(query_param("date", "2024-03-09"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "infos": [
                { "label": "SOC", "records": [
                    { "value": "64", "time": "2024-03-09 06:00:00" },
                    { "value": "41", "time": "2024-03-09 07:30:00" },
                    { "value": "58", "time": "2024-03-09 09:55:00" }
                ]},
                { "label": "V-bat", "records": [
                    { "value": "52.4", "time": "2024-03-09 09:50:00" },
                    { "value": "52.6", "time": "2024-03-09 09:55:00" }
                ]},
                { "label": "BMS Voltage", "records": [
                    { "value": "52.0", "time": "2024-03-09 09:50:00" },
                    { "value": "52.5", "time": "2024-03-09 09:55:00" }
                ]}
            ]
        }))))
        .expect(1..)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/inverter/S1/day"))
        .and(query_param("params", "16"))
        .and(query_param("date", "2024-03-08"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "infos": [{ "label": "SOC", "records": [
                { "value": "90", "time": "2024-03-08 12:00:00" },
                { "value": "97", "time": "2024-03-08 14:00:00" },
                { "value": "95", "time": "2024-03-08 16:00:00" }
            ]}]
        }))))
        .expect(1..)
        .mount(server)
        .await;

    // Nothing else should ever be asked for.
    Mock::given(method("GET"))
        .and(path_regex(r"^/api/v1/inverter/[^/]+/day$"))
        .respond_with(ResponseTemplate::new(404))
        .with_priority(10)
        .expect(0)
        .mount(server)
        .await;
}

/// S1 telemetry for whatever date is asked, for tests driven by the real
/// clock.
async fn mount_any_day_telemetry(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/inverter/S1/day"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "infos": [{ "label": "SOC", "records": [
                { "value": "70", "time": "2024-03-09 09:00:00" }
            ]}]
        }))))
        .mount(server)
        .await;
}

/// Poll until `done` holds, then cancel.
async fn cancel_when(cancel: &CancellationToken, done: impl Fn() -> bool) {
    while !done() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cancel.cancel();
}

// ── Discovery ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_discovery_tolerates_failed_pages_and_rosters() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/plants"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "infos": [{ "id": 1, "name": "Alpha Upstream" }]
        }))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/plants"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/plants"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "infos": [{ "id": 3, "name": "Gamma" }]
        }))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/plant/1/inverters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "infos": [{ "sn": "S1" }]
        }))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/plant/3/inverters"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let monitor = Monitor::new(config(&server, tmp.path(), 3), RecordingPublisher::default())
        .unwrap();
    let mut state = None;
    monitor.refresh(&mut state, now()).await;

    let state = state.unwrap();
    let names: Vec<&str> = state.snapshot.sites.keys().map(String::as_str).collect();
    assert_eq!(names, ["Alpha Upstream", "Gamma"]);
    assert!(state.snapshot.sites["Gamma"].inverters.is_empty());
    assert!(state.validations["Alpha"].is_valid());
    assert!(!state.validations["Beta"].exists);
}

#[tokio::test]
async fn test_failed_login_keeps_previous_state() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let publisher = RecordingPublisher::default();
    let monitor = Monitor::new(config(&server, tmp.path(), 1), publisher).unwrap();

    let yesterday = now() - chrono::Duration::days(1);
    let previous = FleetState::build(&[ConfiguredSite::new("Alpha", "1")], Default::default(), yesterday);
    let mut state = Some(previous.clone());

    let report = monitor.tick(&mut state, now()).await.unwrap();

    assert_eq!(state, Some(previous));
    assert_eq!(report, CycleReport::default());
    assert!(monitor.publisher().calls().is_empty());
}

// ── Cycles ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_tick_publishes_only_valid_sites() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    mount_token(&server).await;
    mount_fleet(&server, 1).await;
    mount_s1_telemetry(&server).await;

    let monitor = Monitor::new(config(&server, tmp.path(), 1), RecordingPublisher::default())
        .unwrap();
    let mut state = None;

    let report = monitor.tick(&mut state, now()).await.unwrap();
    assert_eq!(
        report,
        CycleReport {
            fetched: 1,
            analysed: 1,
            published: true
        }
    );

    let calls = monitor.publisher().calls();
    assert_eq!(calls.len(), 1);
    let keys: Vec<&str> = calls[0].keys().map(String::as_str).collect();
    assert_eq!(keys, ["Alpha"]);

    let alpha = &calls[0]["Alpha"];
    assert_eq!(alpha.inverter_sn, "S1");
    assert_eq!(alpha.inverter_type, "M1");
    assert_eq!(alpha.lowest_soc, SocLevel::Percent(41.0));
    assert_eq!(alpha.lowest_soc_time.as_deref(), Some("2024-03-09 07:30:00"));
    assert_eq!(alpha.current_soc, SocLevel::Percent(58.0));
    assert_eq!(alpha.current_v_bat, Some(52.6));
    assert_eq!(alpha.max_diff_time.as_deref(), Some("2024-03-09 09:50:00"));
    assert_eq!(alpha.yesterday_max_soc, Some(97.0));

    assert!(tmp.path().join("cache/site_validator_cache.json").exists());
    assert!(tmp.path().join("cache/last_refresh.txt").exists());
    assert!(tmp.path().join("raw/all_sites_data.json").exists());
    assert!(tmp.path().join("raw/fetched_inverter_data.json").exists());
    assert!(tmp.path().join("processed/analysis_results.json").exists());
}

#[tokio::test]
async fn test_same_day_restart_uses_cache() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    mount_token(&server).await;
    // Discovery runs exactly once across both monitors.
    mount_fleet(&server, 1).await;
    mount_s1_telemetry(&server).await;

    let first = Monitor::new(config(&server, tmp.path(), 1), RecordingPublisher::default())
        .unwrap();
    let mut state = None;
    first.tick(&mut state, now()).await.unwrap();

    let second = Monitor::new(config(&server, tmp.path(), 1), RecordingPublisher::default())
        .unwrap();
    let later = now() + chrono::Duration::hours(2);
    let mut restored = second.restore(later);
    assert_eq!(
        restored.as_ref().map(|s| &s.validations),
        state.as_ref().map(|s| &s.validations)
    );

    let report = second.tick(&mut restored, later).await.unwrap();
    assert!(report.published);
}

#[tokio::test]
async fn test_empty_fetch_publishes_nothing() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    mount_token(&server).await;
    mount_fleet(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/inverter/S1/day"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let monitor = Monitor::new(config(&server, tmp.path(), 1), RecordingPublisher::default())
        .unwrap();
    let mut state = None;
    let report = monitor.tick(&mut state, now()).await.unwrap();

    assert_eq!(report.fetched, 0);
    assert!(!report.published);
    assert!(monitor.publisher().calls().is_empty());
    assert!(!tmp.path().join("processed/analysis_results.json").exists());
}

#[tokio::test]
async fn test_publish_failure_fails_the_iteration() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    mount_token(&server).await;
    mount_fleet(&server, 1).await;
    mount_s1_telemetry(&server).await;

    let monitor = Monitor::new(config(&server, tmp.path(), 1), FailingPublisher).unwrap();
    let mut state = None;
    let result = monitor.tick(&mut state, now()).await;

    assert!(matches!(result, Err(CoreError::Publish { .. })), "got: {result:?}");
    // Discovery still landed.
    assert!(state.is_some());
}

#[tokio::test]
async fn test_failing_site_does_not_affect_other_valid_sites() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    mount_token(&server).await;

    Mock::given(method("GET"))
        .and(path("/api/v1/plants"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "infos": [{ "id": 1, "name": "Alpha Upstream" }, { "id": 2, "name": "Beta Upstream" }]
        }))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/plant/1/inverters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "infos": [{ "sn": "S1", "equipMode": "M1" }]
        }))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/plant/2/inverters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "infos": [{ "sn": "S2", "equipMode": "M" }]
        }))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/inverter/S1/day"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/inverter/S2/day"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ok(json!({
            "infos": [{ "label": "SOC", "records": [
                { "value": "33", "time": "2024-03-09 09:00:00" }
            ]}]
        }))))
        .mount(&server)
        .await;

    let monitor = Monitor::new(config(&server, tmp.path(), 1), RecordingPublisher::default())
        .unwrap();
    let mut state = None;
    let report = monitor.tick(&mut state, now()).await.unwrap();

    assert_eq!(state.as_ref().unwrap().valid_count(), 2);
    assert_eq!(report.fetched, 1);
    let calls = monitor.publisher().calls();
    assert_eq!(calls.len(), 1);
    let keys: Vec<&str> = calls[0].keys().map(String::as_str).collect();
    assert_eq!(keys, ["Beta"]);
    assert_eq!(calls[0]["Beta"].current_soc, SocLevel::Percent(33.0));
}

// ── Loop ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_retention_sweep_runs_once_per_day() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let raw = tmp.path().join("raw");
    std::fs::create_dir_all(&raw).unwrap();
    let stale = |name: &str| {
        let file = File::create(raw.join(name)).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(3 * 86_400))
            .unwrap();
    };

    let mut cfg = config(&server, tmp.path(), 1);
    cfg.retention = vec![RetentionRule::days(&raw, 1)];
    let monitor = Monitor::new(cfg, RecordingPublisher::default()).unwrap();
    let mut state = None;
    let mut trigger = DailyTrigger::new(NaiveTime::from_hms_opt(4, 0, 0).unwrap());
    let day = |d: u32, h: u32| {
        NaiveDate::from_ymd_opt(2024, 3, d)
            .unwrap()
            .and_hms_opt(h, 30, 0)
            .unwrap()
    };

    stale("a.json");
    monitor.iteration(&mut state, &mut trigger, day(9, 3)).await.unwrap();
    assert!(raw.join("a.json").exists(), "swept before 04:00");

    monitor.iteration(&mut state, &mut trigger, day(9, 4)).await.unwrap();
    assert!(!raw.join("a.json").exists());

    stale("b.json");
    monitor.iteration(&mut state, &mut trigger, day(9, 9)).await.unwrap();
    assert!(raw.join("b.json").exists(), "swept twice in one day");

    monitor.iteration(&mut state, &mut trigger, day(10, 4)).await.unwrap();
    assert!(!raw.join("b.json").exists());
}

async fn assert_retries_after_backoff(panics: bool) {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    mount_token(&server).await;
    mount_fleet(&server, 1).await;
    mount_any_day_telemetry(&server).await;

    let mut cfg = config(&server, tmp.path(), 1);
    cfg.fetch_interval = Duration::from_secs(3600);
    cfg.error_backoff = Duration::from_millis(20);
    let monitor = Monitor::new(cfg, BrokenPublisher::new(panics)).unwrap();

    let cancel = CancellationToken::new();
    let stop = cancel_when(&cancel, || monitor.publisher().attempts() >= 2);
    tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(monitor.run(cancel.clone()), stop)
    })
    .await
    .expect("loop did not retry after the error backoff");

    assert!(monitor.publisher().attempts() >= 2);
}

#[tokio::test]
async fn test_failed_iteration_retries_after_error_backoff() {
    assert_retries_after_backoff(false).await;
}

#[tokio::test]
async fn test_panicking_iteration_retries_after_error_backoff() {
    assert_retries_after_backoff(true).await;
}

#[tokio::test]
async fn test_cancel_interrupts_fetch_interval() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    mount_token(&server).await;
    mount_fleet(&server, 1).await;
    mount_any_day_telemetry(&server).await;

    let mut cfg = config(&server, tmp.path(), 1);
    cfg.fetch_interval = Duration::from_secs(3600);
    cfg.error_backoff = Duration::from_secs(3600);
    let monitor = Monitor::new(cfg, RecordingPublisher::default()).unwrap();

    let cancel = CancellationToken::new();
    let stop = cancel_when(&cancel, || !monitor.publisher().calls().is_empty());
    tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(monitor.run(cancel.clone()), stop)
    })
    .await
    .expect("cancellation did not stop the loop");

    assert_eq!(monitor.publisher().calls().len(), 1);
}

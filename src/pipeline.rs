//! Monitor orchestration.
//!
//! Threads and what they own:
//! - one capture thread per camera: its `FrameSource` and latest-frame slot;
//!   the primary camera's thread also submits to the broker
//! - one dispatch thread: the `ClassifierGateway` (and through it the
//!   background model and classifier state) plus the `ActivityHistory`
//! - one sensor thread: the `SensorPoller`
//!
//! Everything readable from outside goes through `StatusBoard`.

use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::broker::{BrokerStats, FrameBroker};
use crate::config::{ConfigHandle, MonitorConfig, PipelineConfig};
use crate::detect::{
    ActivityResult, BreakerStatus, ClassifierGateway, LocalClassifier, RemoteClassifier, Route,
};
use crate::frame::{CameraId, Frame};
use crate::history::{ActivityHistory, ActivityPattern};
use crate::ingest::{CameraSource, FrameSource};
use crate::motion::BackgroundSettings;
use crate::sensors::{EnvironmentSensor, SensorPoller, SensorReading, SensorSettings, SimulatedSensor};
use crate::shutdown::ShutdownSignal;
use crate::slot::{slot, SlotReader, SlotWriter};
use crate::status::StatusReport;

/// Pause after a failed capture before asking the source again.
const CAPTURE_RETRY: Duration = Duration::from_millis(200);

/// Build the classifier gateway described by `config`.
pub fn build_gateway(config: &MonitorConfig) -> Result<ClassifierGateway> {
    let local = LocalClassifier::new(
        config.pipeline.rules(),
        config.pipeline.zones.clone(),
        config.background.clone(),
    );
    let mut gateway = ClassifierGateway::local_only(local)
        .with_failure_threshold(config.pipeline.failure_threshold)
        .with_policy(config.classifier.open_policy, config.classifier.probe_every);
    if let Some(remote) = config.classifier.remote_config() {
        log::info!("remote classifier at {}", remote.url);
        gateway = gateway.with_remote(RemoteClassifier::new(remote)?);
    }
    Ok(gateway)
}

// ----------------------------------------------------------------------------
// StatusBoard
// ----------------------------------------------------------------------------

/// Read side of the running monitor. Cheap to clone; every accessor returns a copy.
#[derive(Clone)]
pub struct StatusBoard {
    activity: SlotReader<ActivityResult>,
    pattern: SlotReader<ActivityPattern>,
    breaker: SlotReader<BreakerStatus>,
    route: SlotReader<Option<Route>>,
    sensor: SlotReader<Option<SensorReading>>,
    frames: Arc<BTreeMap<CameraId, SlotReader<Option<Arc<Frame>>>>>,
    broker: Arc<FrameBroker>,
    classified: Arc<AtomicU64>,
    config: Arc<ConfigHandle>,
    sensor_interval: Duration,
}

impl StatusBoard {
    /// Most recent activity result; `Unknown` until the first classification.
    pub fn latest_activity(&self) -> ActivityResult {
        self.activity.snapshot()
    }

    pub fn activity_pattern(&self) -> ActivityPattern {
        self.pattern.snapshot()
    }

    /// Last good sensor reading, however old.
    pub fn latest_sensor_reading(&self) -> Option<SensorReading> {
        self.sensor.snapshot()
    }

    pub fn sensor_interval(&self) -> Duration {
        self.sensor_interval
    }

    /// Most recent frame from `camera`, if it has produced any.
    pub fn latest_frame(&self, camera: &CameraId) -> Option<Arc<Frame>> {
        self.frames.get(camera).and_then(|reader| reader.snapshot())
    }

    pub fn cameras(&self) -> impl Iterator<Item = &CameraId> {
        self.frames.keys()
    }

    pub fn breaker(&self) -> BreakerStatus {
        self.breaker.snapshot()
    }

    /// Path that produced the most recent classification.
    pub fn route(&self) -> Option<Route> {
        self.route.snapshot()
    }

    pub fn broker_stats(&self) -> BrokerStats {
        self.broker.stats()
    }

    /// Frames the dispatch worker has run through the gateway.
    pub fn frames_classified(&self) -> u64 {
        self.classified.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> Arc<PipelineConfig> {
        self.config.current()
    }

    pub fn report(&self) -> StatusReport {
        StatusReport::from_board(self)
    }
}

// ----------------------------------------------------------------------------
// Monitor
// ----------------------------------------------------------------------------

type Threads = Vec<(String, JoinHandle<()>)>;

/// Assembles the threads of a monitor.
pub struct MonitorBuilder {
    config: Arc<ConfigHandle>,
    primary: CameraId,
    cameras: Vec<Box<dyn FrameSource>>,
    gateway: Option<ClassifierGateway>,
    background: BackgroundSettings,
    sensor: Option<(Box<dyn EnvironmentSensor>, SensorSettings)>,
}

impl MonitorBuilder {
    pub fn new(config: Arc<ConfigHandle>, primary: CameraId) -> Self {
        Self {
            config,
            primary,
            cameras: Vec::new(),
            gateway: None,
            background: BackgroundSettings::default(),
            sensor: None,
        }
    }

    pub fn camera<S: FrameSource + 'static>(mut self, source: S) -> Self {
        self.cameras.push(Box::new(source));
        self
    }

    pub fn gateway(mut self, gateway: ClassifierGateway) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Background model tuning for the local-only gateway built when no
    /// gateway is supplied.
    pub fn background(mut self, settings: BackgroundSettings) -> Self {
        self.background = settings;
        self
    }

    pub fn sensor<S: EnvironmentSensor + 'static>(mut self, sensor: S, settings: SensorSettings) -> Self {
        let sensor: Box<dyn EnvironmentSensor> = Box::new(sensor);
        self.sensor = Some((sensor, settings));
        self
    }

    fn default_gateway(&self, current: &PipelineConfig) -> ClassifierGateway {
        ClassifierGateway::local_only(LocalClassifier::new(
            current.rules(),
            current.zones.clone(),
            self.background.clone(),
        ))
        .with_failure_threshold(current.failure_threshold)
    }

    /// Start every thread. If any part fails to start, the threads already
    /// running are stopped and joined before the error is returned.
    pub fn spawn(mut self) -> Result<Monitor> {
        if !self.cameras.iter().any(|c| c.camera() == &self.primary) {
            return Err(anyhow!("primary camera {} has no source", self.primary));
        }
        let current = self.config.current();
        let gateway = match self.gateway.take() {
            Some(gateway) => gateway,
            None => self.default_gateway(&current),
        };

        let shutdown = ShutdownSignal::new();
        let broker = Arc::new(FrameBroker::new(current.queue_capacity, current.frame_stride));
        let mut threads = Vec::new();

        match self.start(gateway, &current, &shutdown, &broker, &mut threads) {
            Ok(board) => Ok(Monitor {
                board,
                config: self.config,
                broker,
                shutdown,
                threads,
            }),
            Err(err) => {
                log::error!("monitor failed to start: {:#}", err);
                shutdown.trigger();
                broker.close();
                join_threads(&mut threads);
                Err(err)
            }
        }
    }

    fn start(
        &mut self,
        gateway: ClassifierGateway,
        current: &PipelineConfig,
        shutdown: &ShutdownSignal,
        broker: &Arc<FrameBroker>,
        threads: &mut Threads,
    ) -> Result<StatusBoard> {
        let mut frames = BTreeMap::new();
        for source in std::mem::take(&mut self.cameras) {
            let camera = source.camera().clone();
            if frames.contains_key(&camera) {
                return Err(anyhow!("camera {} added twice", camera));
            }
            let (latest, reader) = slot(None);
            frames.insert(camera.clone(), reader);
            let feed = (camera == self.primary).then(|| (broker.clone(), self.config.clone()));
            let shutdown = shutdown.clone();
            let name = format!("capture-{}", camera);
            let handle = std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || capture_loop(source, latest, feed, shutdown))?;
            threads.push((name, handle));
        }

        let classified = Arc::new(AtomicU64::new(0));
        let (activity_w, activity) = slot(ActivityResult::unknown());
        let (pattern_w, pattern) = slot(ActivityHistory::new(current.history_capacity).snapshot());
        let (breaker_w, breaker) = slot(gateway.breaker());
        let (route_w, route) = slot(None);
        let outputs = DispatchOutputs {
            activity: activity_w,
            pattern: pattern_w,
            breaker: breaker_w,
            route: route_w,
        };
        {
            let broker = broker.clone();
            let config = self.config.clone();
            let classified = classified.clone();
            let handle = std::thread::Builder::new()
                .name("dispatch".to_string())
                .spawn(move || dispatch_loop(broker, gateway, config, outputs, classified))?;
            threads.push(("dispatch".to_string(), handle));
        }

        let (sensor_w, sensor) = slot(None);
        let mut sensor_interval = SensorSettings::default().interval();
        if let Some((device, settings)) = self.sensor.take() {
            sensor_interval = settings.interval();
            let shutdown = shutdown.clone();
            let handle = std::thread::Builder::new()
                .name("sensors".to_string())
                .spawn(move || SensorPoller::new(device, settings).run(sensor_w, shutdown))?;
            threads.push(("sensors".to_string(), handle));
        }

        log::info!(
            "monitor started: {} camera(s), primary {}",
            frames.len(),
            self.primary
        );
        Ok(StatusBoard {
            activity,
            pattern,
            breaker,
            route,
            sensor,
            frames: Arc::new(frames),
            broker: broker.clone(),
            classified,
            config: self.config.clone(),
            sensor_interval,
        })
    }
}

/// Join every handle, returning the names of threads that panicked.
fn join_threads(threads: &mut Threads) -> Vec<String> {
    let mut panicked = Vec::new();
    for (name, handle) in threads.drain(..) {
        if handle.join().is_err() {
            log::error!("{} thread panicked", name);
            panicked.push(name);
        }
    }
    panicked
}

/// A running monitor. Stop it with [`Monitor::stop`].
pub struct Monitor {
    board: StatusBoard,
    config: Arc<ConfigHandle>,
    broker: Arc<FrameBroker>,
    shutdown: ShutdownSignal,
    threads: Threads,
}

impl Monitor {
    /// Open every configured camera and start the simulated sensor.
    pub fn from_config(config: &MonitorConfig) -> Result<Self> {
        let primary = config.primary()?;
        let handle = Arc::new(ConfigHandle::new(
            config.pipeline.clone(),
            primary.width,
            primary.height,
        )?);
        let mut builder = MonitorBuilder::new(handle, primary.camera_id())
            .gateway(build_gateway(config)?)
            .sensor(
                SimulatedSensor::new(config.sensors.mq135.clone()),
                config.sensors.clone(),
            );
        for camera in &config.cameras {
            builder = builder.camera(CameraSource::open(camera)?);
        }
        builder.spawn()
    }

    pub fn board(&self) -> &StatusBoard {
        &self.board
    }

    pub fn config(&self) -> &Arc<ConfigHandle> {
        &self.config
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Signal every thread, wake the dispatch worker, and join.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.trigger();
        self.broker.close();
        let panicked = join_threads(&mut self.threads);
        log::info!("monitor stopped");
        if panicked.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("monitor threads panicked: {}", panicked.join(", ")))
        }
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if !self.threads.is_empty() {
            self.shutdown.trigger();
            self.broker.close();
        }
    }
}

// ----------------------------------------------------------------------------
// Worker loops
// ----------------------------------------------------------------------------

fn capture_loop(
    mut source: Box<dyn FrameSource>,
    latest: SlotWriter<Option<Arc<Frame>>>,
    feed: Option<(Arc<FrameBroker>, Arc<ConfigHandle>)>,
    shutdown: ShutdownSignal,
) {
    let camera = source.camera().clone();
    while !shutdown.is_triggered() {
        match source.next_frame() {
            Ok(Some(frame)) => {
                let frame = Arc::new(frame);
                latest.publish(Some(frame.clone()));
                if let Some((broker, config)) = &feed {
                    let current = config.current();
                    broker.set_stride(current.frame_stride);
                    broker.set_capacity(current.queue_capacity);
                    broker.submit(frame);
                }
            }
            Ok(None) => {
                log::info!("camera {}: end of stream", camera);
                break;
            }
            Err(err) => {
                log::warn!("camera {}: capture failed: {}", camera, err);
                if shutdown.wait_timeout(CAPTURE_RETRY) {
                    break;
                }
            }
        }
    }
    let stats = source.stats();
    log::info!(
        "camera {}: capture stopped after {} frames ({} errors)",
        camera,
        stats.frames_captured,
        stats.errors
    );
}

struct DispatchOutputs {
    activity: SlotWriter<ActivityResult>,
    pattern: SlotWriter<ActivityPattern>,
    breaker: SlotWriter<BreakerStatus>,
    route: SlotWriter<Option<Route>>,
}

fn dispatch_loop(
    broker: Arc<FrameBroker>,
    mut gateway: ClassifierGateway,
    config: Arc<ConfigHandle>,
    outputs: DispatchOutputs,
    classified: Arc<AtomicU64>,
) {
    let mut applied = config.current();
    let mut history = ActivityHistory::new(applied.history_capacity);

    while let Some(frame) = broker.dequeue() {
        let current = config.current();
        if !Arc::ptr_eq(&current, &applied) {
            gateway.reconfigure(current.rules(), current.zones.clone(), current.failure_threshold);
            history.set_capacity(current.history_capacity);
            applied = current;
        }

        let result = gateway.classify(&frame);
        let breaker = gateway.breaker();
        if result.is_unavailable() {
            // Below the threshold the last good result stays current.
            if breaker.open {
                outputs.activity.publish(result);
            }
        } else {
            log::debug!(
                "frame {}: {} ({:.2})",
                frame.sequence,
                result.label,
                result.confidence
            );
            history.record(result.clone());
            outputs.activity.publish(result);
            outputs.pattern.publish(history.snapshot());
        }
        outputs.breaker.publish(breaker);
        outputs.route.publish(gateway.last_route());
        classified.fetch_add(1, Ordering::SeqCst);
    }
    log::info!(
        "dispatch stopped after {} frames",
        classified.load(Ordering::SeqCst)
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{ActivityLabel, StubClassifier, StubOutcome};
    use crate::ingest::{Scene, SceneKind, SourceStats, SyntheticSource};
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    /// Raises `released` once its capture thread has let go of it.
    struct TrackedSource {
        inner: SyntheticSource,
        released: Arc<AtomicBool>,
    }

    impl FrameSource for TrackedSource {
        fn camera(&self) -> &CameraId {
            self.inner.camera()
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            self.inner.next_frame()
        }

        fn stats(&self) -> SourceStats {
            self.inner.stats()
        }
    }

    impl Drop for TrackedSource {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    fn handle() -> Arc<ConfigHandle> {
        let config = PipelineConfig {
            frame_stride: 1,
            queue_capacity: 64,
            ..PipelineConfig::default()
        };
        Arc::new(ConfigHandle::new(config, 640, 480).unwrap())
    }

    fn source(name: &str, kind: SceneKind, frames: u64) -> SyntheticSource {
        SyntheticSource::new(CameraId::new(name), 640, 480, vec![Scene::new(kind, 1000)])
            .unwrap()
            .with_frame_limit(frames)
    }

    fn wait_for(board: &StatusBoard, classified: u64) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while board.frames_classified() < classified && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn remote_results_reach_the_board() -> Result<()> {
        let gateway = ClassifierGateway::local_only(LocalClassifier::default())
            .with_remote(StubClassifier::always(ActivityLabel::Eating, 0.8));
        let monitor = MonitorBuilder::new(handle(), CameraId::new("top"))
            .camera(source("top", SceneKind::Still, 5))
            .gateway(gateway)
            .spawn()?;

        wait_for(monitor.board(), 5);
        let board = monitor.board().clone();
        assert_eq!(board.latest_activity().label, ActivityLabel::Eating);
        assert_eq!(board.route(), Some(Route::Remote));
        let pattern = board.activity_pattern();
        assert_eq!(pattern.len(), 5);
        assert!((pattern.get(ActivityLabel::Eating) - 0.8).abs() < 1e-6);
        assert!(board.latest_frame(&CameraId::new("top")).is_some());
        monitor.stop()
    }

    #[test]
    fn failures_below_threshold_keep_last_result() -> Result<()> {
        let stub = StubClassifier::new(
            vec![
                StubOutcome::label(ActivityLabel::Exploring, 0.7),
                StubOutcome::Fail,
                StubOutcome::Fail,
            ],
            StubOutcome::Fail,
        );
        let gateway = ClassifierGateway::local_only(LocalClassifier::default()).with_remote(stub);
        let monitor = MonitorBuilder::new(handle(), CameraId::new("top"))
            .camera(source("top", SceneKind::Still, 3))
            .gateway(gateway)
            .spawn()?;

        wait_for(monitor.board(), 3);
        let board = monitor.board();
        assert_eq!(board.latest_activity().label, ActivityLabel::Exploring);
        assert_eq!(board.breaker().consecutive_failures, 2);
        assert!(!board.breaker().open);
        monitor.stop()
    }

    #[test]
    fn open_breaker_publishes_unavailable() -> Result<()> {
        let gateway = ClassifierGateway::local_only(LocalClassifier::default())
            .with_remote(StubClassifier::unreachable());
        let monitor = MonitorBuilder::new(handle(), CameraId::new("top"))
            .camera(source("top", SceneKind::Still, 4))
            .gateway(gateway)
            .spawn()?;

        wait_for(monitor.board(), 4);
        let board = monitor.board();
        assert!(board.breaker().open);
        assert!(board.latest_activity().is_unavailable());
        // Unavailable results never enter the history.
        assert!(board.activity_pattern().iter().all(|(_, score)| score == 0.0));
        monitor.stop()
    }

    #[test]
    fn secondary_cameras_publish_frames_only() -> Result<()> {
        let monitor = MonitorBuilder::new(handle(), CameraId::new("top"))
            .camera(source("top", SceneKind::Still, 3))
            .camera(source("side", SceneKind::Wheel, 7))
            .spawn()?;

        wait_for(monitor.board(), 3);
        let deadline = Instant::now() + Duration::from_secs(10);
        let side = CameraId::new("side");
        while monitor.board().latest_frame(&side).map(|f| f.sequence) != Some(7)
            && Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(5));
        }
        let board = monitor.board();
        assert_eq!(board.latest_frame(&side).map(|f| f.sequence), Some(7));
        assert_eq!(board.cameras().count(), 2);
        assert_eq!(board.broker_stats().offered, 3);
        monitor.stop()
    }

    #[test]
    fn missing_primary_is_rejected() {
        let result = MonitorBuilder::new(handle(), CameraId::new("top"))
            .camera(source("side", SceneKind::Still, 1))
            .spawn();
        assert!(result.is_err());
    }

    #[test]
    fn stop_joins_running_threads() -> Result<()> {
        let endless = SyntheticSource::new(CameraId::new("top"), 64, 48, vec![Scene::new(SceneKind::Wheel, 10)])?;
        let config = PipelineConfig {
            zones: crate::detect::ZoneSet::new(Vec::new()),
            ..PipelineConfig::default()
        };
        let handle = Arc::new(ConfigHandle::new(config, 64, 48)?);
        let monitor = MonitorBuilder::new(handle, CameraId::new("top"))
            .camera(endless)
            .sensor(SimulatedSensor::default(), SensorSettings {
                interval_ms: 10,
                ..SensorSettings::default()
            })
            .spawn()?;
        std::thread::sleep(Duration::from_millis(50));
        assert!(monitor.board().frames_classified() > 0);
        monitor.stop()
    }

    #[test]
    fn failed_start_stops_threads_already_running() {
        let released = Arc::new(AtomicBool::new(false));
        let running = TrackedSource {
            inner: SyntheticSource::new(
                CameraId::new("top"),
                64,
                48,
                vec![Scene::new(SceneKind::Wheel, 10)],
            )
            .unwrap(),
            released: released.clone(),
        };
        let result = MonitorBuilder::new(handle(), CameraId::new("top"))
            .camera(running)
            .camera(source("top", SceneKind::Still, 1))
            .spawn();

        assert!(result.is_err());
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn default_gateway_uses_configured_background() {
        let settings = BackgroundSettings {
            history: 250,
            low_light_luminance: 30.0,
            ..BackgroundSettings::default()
        };
        let builder =
            MonitorBuilder::new(handle(), CameraId::new("top")).background(settings.clone());
        let gateway = builder.default_gateway(&builder.config.current());
        assert_eq!(gateway.local().background_settings(), &settings);
        assert!(!gateway.has_remote());
    }
}

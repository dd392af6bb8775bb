//! Background sampler.
//!
//! Polls the device gateway on a fixed period, folds readings into
//! per-second buckets and publishes each completed bucket average to the
//! history. Read failures are counted; reaching the threshold closes and
//! reopens the device. When no device is open the mock voltage is used and
//! the poll counts as a success.
//!
//! The loop body is [`Sampler::step`], which takes the poll time explicitly
//! and returns the delay before the next poll. [`Sampler::run`] wraps it with
//! sleeping and shutdown handling.

use crate::device::{DeviceError, DeviceGateway};
use crate::error::{Result, ScaleError};
use crate::sampling::{
    bucket::SecondBucket,
    clock::Clock,
    config::SamplerConfig,
    data::{HistoryEntry, Reading},
    service::ScaleService,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// The sampling loop state. At most one exists per [`ScaleService`].
pub struct Sampler {
    gateway: DeviceGateway,
    service: Arc<ScaleService>,
    config: SamplerConfig,
    bucket: Option<SecondBucket>,
    consecutive_failures: u32,
    last_open_attempt: Option<DateTime<Utc>>,
}

impl Sampler {
    /// Create a sampler publishing into `service`.
    ///
    /// Fails if the configuration is invalid or another sampler already
    /// publishes into the same service.
    pub fn new(
        gateway: DeviceGateway,
        service: Arc<ScaleService>,
        config: SamplerConfig,
    ) -> Result<Self> {
        config.validate()?;
        service.claim_sampler()?;
        Ok(Self {
            gateway,
            service,
            config,
            bucket: None,
            consecutive_failures: 0,
            last_open_attempt: None,
        })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Read failures since the last success or reinitialization.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Open the device. Failure leaves the sampler in degraded mode.
    pub fn initialize(&mut self, now: DateTime<Utc>) {
        self.last_open_attempt = Some(now);
        let connected = self.gateway.open().is_ok();
        if !connected {
            warn!(
                "Device not initialized, reporting mock value {} V",
                self.config.mock_voltage
            );
        }
        self.service.note_connected(connected);
    }

    /// Run one poll at time `now` and return the delay before the next one.
    pub fn step(&mut self, now: DateTime<Utc>) -> Duration {
        self.roll_bucket(now);
        self.maybe_reconnect(now);

        match self.gateway.read() {
            Ok(voltage) => {
                self.record(now, voltage, false);
                self.config.period
            }
            Err(e) if e.is_fallback() => {
                self.record(now, self.config.mock_voltage, true);
                self.config.period
            }
            Err(e) => {
                self.fail(e);
                self.config.failure_backoff
            }
        }
    }

    /// Commit the active bucket if `now` is in a later (or earlier) second.
    fn roll_bucket(&mut self, now: DateTime<Utc>) {
        let stale = self
            .bucket
            .as_ref()
            .map_or(true, |bucket| bucket.is_stale_at(now));
        if !stale {
            return;
        }

        if let Some(average) = self.bucket.take().and_then(|bucket| bucket.average()) {
            let entry = HistoryEntry {
                average_voltage: average,
                timestamp: now,
            };
            if self.service.commit(entry) {
                debug!(average, "Committed per-second average");
            }
        }
        self.bucket = Some(SecondBucket::starting_at(now));
    }

    fn maybe_reconnect(&mut self, now: DateTime<Utc>) {
        let Some(interval) = self.config.reconnect_interval else {
            return;
        };
        if self.gateway.is_open() {
            return;
        }
        let due = self.last_open_attempt.map_or(true, |last| {
            (now - last).to_std().map_or(true, |elapsed| elapsed >= interval)
        });
        if due {
            info!("Attempting to reconnect device");
            self.initialize(now);
        }
    }

    fn record(&mut self, now: DateTime<Utc>, voltage: f64, degraded: bool) {
        self.consecutive_failures = 0;
        self.service.note_success(degraded);
        self.service.record_reading(Reading {
            voltage,
            timestamp: now,
        });
        if let Some(bucket) = self.bucket.as_mut() {
            bucket.add(voltage);
        }
        trace!(voltage, degraded, "Polled");
    }

    fn fail(&mut self, err: DeviceError) {
        self.consecutive_failures += 1;
        self.service.note_failure(self.consecutive_failures);
        warn!(
            "Error reading voltage ({} consecutive): {}",
            self.consecutive_failures, err
        );

        if self.consecutive_failures >= self.config.failure_threshold {
            warn!(
                "Reinitializing device after {} consecutive failures",
                self.consecutive_failures
            );
            match self.gateway.reinitialize() {
                Ok(()) => info!("Device reinitialized"),
                Err(e) => error!("Device reinitialization failed: {}", e),
            }
            self.consecutive_failures = 0;
            self.service.note_reinitialized();
            self.service.note_connected(self.gateway.is_open());
        }
    }

    /// Poll until `shutdown` flips to `true` or its sender is dropped, then
    /// release the device.
    pub async fn run(mut self, clock: Arc<dyn Clock>, mut shutdown: watch::Receiver<bool>) {
        info!(
            driver = self.gateway.driver_name(),
            channel = self.gateway.channel(),
            "Sampler started with {}ms period",
            self.config.period.as_millis()
        );
        self.initialize(clock.now());

        loop {
            if *shutdown.borrow() {
                break;
            }
            let delay = self.step(clock.now());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.gateway.close();
        info!("Sampler stopped");
    }

    /// Spawn [`run`](Self::run) on the tokio runtime.
    pub fn spawn(self, clock: Arc<dyn Clock>) -> SamplerHandle {
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(self.run(clock, rx));
        SamplerHandle { shutdown, task }
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.gateway.close();
        self.service.release_sampler();
    }
}

/// Owner of a spawned sampler task.
///
/// Dropping the handle also stops the sampler, since the shutdown channel
/// closes with it.
#[derive(Debug)]
pub struct SamplerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SamplerHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the sampler to stop and wait for it to release the device.
    pub async fn shutdown(self) -> Result<()> {
        // The receiver is gone only if the task already exited.
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| ScaleError::invalid_state(format!("sampler task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{NoHardwareDriver, SimulatedDriver};
    use crate::sampling::calibration::Calibration;
    use crate::sampling::clock::AnchoredClock;
    use chrono::TimeZone;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + chrono::Duration::milliseconds(ms)
    }

    fn sampler_with(driver: &SimulatedDriver, config: SamplerConfig) -> (Sampler, Arc<ScaleService>) {
        let service = Arc::new(ScaleService::new(&config, Calibration::default()));
        let gateway = DeviceGateway::new(Box::new(driver.clone()), config.channel);
        let mut sampler = Sampler::new(gateway, service.clone(), config).unwrap();
        sampler.initialize(t(0));
        (sampler, service)
    }

    #[test]
    fn test_second_boundary_commits_mean() {
        let driver = SimulatedDriver::constant(0.0);
        driver.push_voltages(&[1.1, 1.3, 1.5, 9.9, 2.0]);
        let (mut sampler, service) = sampler_with(&driver, SamplerConfig::default());

        sampler.step(t(0));
        sampler.step(t(300));
        sampler.step(t(600));
        assert!(service.history_entries().is_empty());

        sampler.step(t(1000));
        let history = service.history_entries();
        assert_eq!(history.len(), 1);
        assert!((history[0].average_voltage - 1.3).abs() < 1e-9);
        assert_eq!(history[0].timestamp, t(1000));

        service.set_scale(10.0).unwrap();
        let points = service.history();
        assert!((points[0].weight - 13.0).abs() < 1e-9);

        // Next bucket holds only the readings taken after the commit.
        sampler.step(t(1300));
        sampler.step(t(2000));
        let history = service.history_entries();
        assert_eq!(history.len(), 2);
        assert!((history[1].average_voltage - 5.95).abs() < 1e-9);
    }

    #[test]
    fn test_current_value_tracks_every_poll() {
        let driver = SimulatedDriver::constant(0.0);
        driver.push_voltages(&[1.0, 2.0]);
        let (mut sampler, service) = sampler_with(&driver, SamplerConfig::default());

        sampler.step(t(0));
        sampler.step(t(200));
        let current = service.current_reading().unwrap();
        assert_eq!(current.voltage, 2.0);
        assert_eq!(current.timestamp, t(200));
    }

    #[test]
    fn test_degraded_mode_reads_mock_value() {
        let config = SamplerConfig::default();
        let service = Arc::new(ScaleService::new(&config, Calibration::default()));
        let gateway = DeviceGateway::new(Box::new(NoHardwareDriver::new()), 1);
        let mut sampler = Sampler::new(gateway, service.clone(), config).unwrap();
        sampler.initialize(t(0));

        for i in 0..5 {
            assert_eq!(sampler.step(t(i * 200)), Duration::from_millis(200));
            assert_eq!(service.current_reading().unwrap().voltage, 2.5);
        }
        let status = service.status();
        assert!(status.degraded);
        assert!(!status.device_connected);
        assert_eq!(status.total_failures, 0);
        assert_eq!(status.total_reads, 5);

        sampler.step(t(1000));
        assert_eq!(service.history_entries()[0].average_voltage, 2.5);
    }

    #[test]
    fn test_three_failures_trigger_one_reinitialization() {
        let driver = SimulatedDriver::constant(1.0);
        for _ in 0..6 {
            driver.push_read(Err(DeviceError::communication("timeout")));
        }
        let (mut sampler, service) = sampler_with(&driver, SamplerConfig::default());
        assert_eq!(driver.open_count(), 1);

        assert_eq!(sampler.step(t(0)), Duration::from_millis(500));
        sampler.step(t(500));
        assert_eq!(sampler.consecutive_failures(), 2);
        assert_eq!(driver.open_count(), 1);

        sampler.step(t(1000));
        assert_eq!(driver.open_count(), 2);
        assert_eq!(sampler.consecutive_failures(), 0);
        assert_eq!(service.status().reinitializations, 1);

        // Fourth failure starts a fresh count.
        sampler.step(t(1500));
        assert_eq!(driver.open_count(), 2);
        assert_eq!(sampler.consecutive_failures(), 1);

        sampler.step(t(2000));
        sampler.step(t(2500));
        assert_eq!(driver.open_count(), 3);
        assert_eq!(service.status().reinitializations, 2);
        assert_eq!(service.status().total_failures, 6);

        // Recovered device reads normally.
        assert_eq!(sampler.step(t(3000)), Duration::from_millis(200));
        assert_eq!(service.current_reading().unwrap().voltage, 1.0);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let driver = SimulatedDriver::constant(1.0);
        driver.push_read(Err(DeviceError::communication("timeout")));
        driver.push_read(Err(DeviceError::communication("timeout")));
        driver.push_read(Ok(1.0));
        driver.push_read(Err(DeviceError::communication("timeout")));
        let (mut sampler, service) = sampler_with(&driver, SamplerConfig::default());

        for i in 0..4 {
            sampler.step(t(i * 500));
        }
        assert_eq!(sampler.consecutive_failures(), 1);
        assert_eq!(service.status().reinitializations, 0);
    }

    #[test]
    fn test_failed_reinitialization_falls_back_to_mock() {
        let driver = SimulatedDriver::constant(1.0);
        for _ in 0..3 {
            driver.push_read(Err(DeviceError::communication("timeout")));
        }
        driver.push_open(Ok(()));
        driver.push_open(Err(DeviceError::open("unplugged")));
        let config = SamplerConfig::default();
        let service = Arc::new(ScaleService::new(&config, Calibration::default()));
        let gateway = DeviceGateway::new(Box::new(driver.clone()), 1);
        let mut sampler = Sampler::new(gateway, service.clone(), config).unwrap();
        sampler.initialize(t(0));

        for i in 0..3 {
            sampler.step(t(i * 500));
        }
        assert!(!service.status().device_connected);

        sampler.step(t(1500));
        assert_eq!(service.current_reading().unwrap().voltage, 2.5);
        assert!(service.status().degraded);
    }

    #[test]
    fn test_boundary_commit_happens_on_failed_poll() {
        let driver = SimulatedDriver::constant(0.0);
        driver.push_voltages(&[1.0, 3.0]);
        driver.push_read(Err(DeviceError::communication("timeout")));
        let (mut sampler, service) = sampler_with(&driver, SamplerConfig::default());

        sampler.step(t(100));
        sampler.step(t(400));
        sampler.step(t(1100));
        let history = service.history_entries();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].average_voltage, 2.0);
    }

    #[test]
    fn test_reconnects_while_degraded() {
        let driver = SimulatedDriver::constant(1.5);
        driver.push_open(Err(DeviceError::open("not plugged in")));
        let config = SamplerConfig::default().with_reconnect_interval(Some(Duration::from_secs(5)));
        let (mut sampler, service) = sampler_with(&driver, config);
        assert!(!service.status().device_connected);

        sampler.step(t(1000));
        assert_eq!(service.current_reading().unwrap().voltage, 2.5);
        assert_eq!(driver.open_count(), 1);

        sampler.step(t(5000));
        assert_eq!(driver.open_count(), 2);
        assert_eq!(service.current_reading().unwrap().voltage, 1.5);
        assert!(service.status().device_connected);
        assert!(!service.status().degraded);
    }

    #[test]
    fn test_only_one_sampler_per_service() {
        let service = Arc::new(ScaleService::default());
        let first = Sampler::new(
            DeviceGateway::new(Box::new(NoHardwareDriver::new()), 1),
            service.clone(),
            SamplerConfig::default(),
        )
        .unwrap();
        let second = Sampler::new(
            DeviceGateway::new(Box::new(NoHardwareDriver::new()), 1),
            service.clone(),
            SamplerConfig::default(),
        );
        assert!(second.is_err());

        drop(first);
        assert!(!service.status().running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_publishes_and_releases_device() {
        let driver = SimulatedDriver::constant(1.0);
        let config = SamplerConfig::default();
        let service = Arc::new(ScaleService::new(&config, Calibration::default()));
        let gateway = DeviceGateway::new(Box::new(driver.clone()), 1);
        let sampler = Sampler::new(gateway, service.clone(), config).unwrap();

        let clock = Arc::new(AnchoredClock::new(t(0)));
        let handle = sampler.spawn(clock);
        tokio::time::sleep(Duration::from_millis(3500)).await;

        let history = service.history_entries();
        assert!(history.len() >= 2, "expected commits, got {:?}", history);
        assert!(history.iter().all(|e| e.average_voltage == 1.0));
        assert!(driver.is_connected());

        handle.shutdown().await.unwrap();
        assert!(!driver.is_connected());
        assert!(!service.status().running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_observed_before_next_poll() {
        let driver = SimulatedDriver::constant(1.0);
        let config = SamplerConfig::default().with_period(Duration::from_secs(60));
        let service = Arc::new(ScaleService::new(&config, Calibration::default()));
        let gateway = DeviceGateway::new(Box::new(driver.clone()), 1);
        let handle = Sampler::new(gateway, service.clone(), config)
            .unwrap()
            .spawn(Arc::new(AnchoredClock::new(t(0))));

        tokio::time::sleep(Duration::from_millis(10)).await;
        let started = tokio::time::Instant::now();
        handle.shutdown().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(60));
        assert_eq!(service.status().total_reads, 1);
        assert!(!driver.is_connected());
    }
}

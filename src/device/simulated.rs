//! In-process drivers used when no vendor driver is available.

use super::driver::{AnalogConnection, AnalogDriver, DeviceError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Driver for builds without LabJack support. Every open fails, so the
/// sampler runs in degraded mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHardwareDriver;

impl NoHardwareDriver {
    pub fn new() -> Self {
        Self
    }
}

impl AnalogDriver for NoHardwareDriver {
    fn name(&self) -> &str {
        "none"
    }

    fn open(&mut self) -> Result<Box<dyn AnalogConnection>, DeviceError> {
        Err(DeviceError::open("no LabJack driver available in this build"))
    }
}

#[derive(Debug)]
enum Signal {
    Constant(f64),
    /// `base + amplitude * sin(n / 8)` where `n` is the read count
    Wave { base: f64, amplitude: f64 },
}

#[derive(Debug)]
struct SimState {
    signal: Signal,
    scripted_reads: VecDeque<Result<f64, DeviceError>>,
    scripted_opens: VecDeque<Result<(), DeviceError>>,
    connected: bool,
    opens: usize,
    closes: usize,
    force_releases: usize,
    reads: u64,
}

/// Scriptable driver.
///
/// Clones share state, so a test can keep one clone as a probe after handing
/// another to the gateway. Scripted open results and reads are consumed first;
/// once exhausted, opens succeed and reads follow the configured signal.
#[derive(Debug, Clone)]
pub struct SimulatedDriver {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDriver {
    /// A driver whose reads always return `voltage`.
    pub fn constant(voltage: f64) -> Self {
        Self::with_signal(Signal::Constant(voltage))
    }

    /// A driver producing a slow sine wave around `base`.
    pub fn wave(base: f64, amplitude: f64) -> Self {
        Self::with_signal(Signal::Wave { base, amplitude })
    }

    fn with_signal(signal: Signal) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                signal,
                scripted_reads: VecDeque::new(),
                scripted_opens: VecDeque::new(),
                connected: false,
                opens: 0,
                closes: 0,
                force_releases: 0,
                reads: 0,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the outcome of the next read.
    pub fn push_read(&self, result: Result<f64, DeviceError>) {
        self.state().scripted_reads.push_back(result);
    }

    /// Queue several successful reads.
    pub fn push_voltages(&self, voltages: &[f64]) {
        let mut state = self.state();
        state
            .scripted_reads
            .extend(voltages.iter().copied().map(Ok));
    }

    /// Queue the outcome of the next open.
    pub fn push_open(&self, result: Result<(), DeviceError>) {
        self.state().scripted_opens.push_back(result);
    }

    /// Number of successful and failed open attempts.
    pub fn open_count(&self) -> usize {
        self.state().opens
    }

    /// Number of connections closed.
    pub fn close_count(&self) -> usize {
        self.state().closes
    }

    /// Number of forced releases requested.
    pub fn force_release_count(&self) -> usize {
        self.state().force_releases
    }

    /// Whether a connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.state().connected
    }
}

impl AnalogDriver for SimulatedDriver {
    fn name(&self) -> &str {
        "simulated"
    }

    fn open(&mut self) -> Result<Box<dyn AnalogConnection>, DeviceError> {
        let mut state = self.state();
        state.opens += 1;
        if state.connected {
            return Err(DeviceError::AlreadyClaimed);
        }
        if let Some(result) = state.scripted_opens.pop_front() {
            result?;
        }
        state.connected = true;
        Ok(Box::new(SimulatedConnection {
            state: self.state.clone(),
            configured: None,
        }))
    }

    fn force_release(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.force_releases += 1;
        state.connected = false;
        Ok(())
    }
}

struct SimulatedConnection {
    state: Arc<Mutex<SimState>>,
    configured: Option<u8>,
}

impl AnalogConnection for SimulatedConnection {
    fn configure_analog(&mut self, channel: u8) -> Result<(), DeviceError> {
        self.configured = Some(channel);
        Ok(())
    }

    fn serial_number(&self) -> Option<u32> {
        Some(320_000_001)
    }

    fn read_voltage(&mut self, channel: u8) -> Result<f64, DeviceError> {
        if self.configured != Some(channel) {
            return Err(DeviceError::communication(format!(
                "AIN{} is not configured for analog input",
                channel
            )));
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.reads += 1;
        if let Some(result) = state.scripted_reads.pop_front() {
            return result;
        }
        Ok(match state.signal {
            Signal::Constant(v) => v,
            Signal::Wave { base, amplitude } => base + amplitude * (state.reads as f64 / 8.0).sin(),
        })
    }

    fn close(&mut self) -> Result<(), DeviceError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.closes += 1;
        state.connected = false;
        Ok(())
    }
}

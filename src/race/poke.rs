//! External write strategy: fork a victim that inherits the mapping, runs
//! the pressure loop over it in-process, and parks itself stopped and
//! traceable. The parent then hammers `PTRACE_POKEDATA` word writes at the
//! mapped address in the victim's address space.

use std::io;

use nix::sys::ptrace;
use nix::sys::signal::{self, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, ForkResult, Pid};

use super::{pressure, PressureHost, RaceBudget, RaceError, WriteStrategy};
use crate::mapping::RoMap;
use crate::util::WORD;

#[derive(Default)]
pub struct PtracePoke {
    victim: Option<Pid>,
}

impl PtracePoke {
    pub fn new() -> PtracePoke {
        PtracePoke::default()
    }

    fn reap(pid: Pid) {
        // the victim would otherwise spin its whole pressure budget down
        let _ = signal::kill(pid, Signal::SIGKILL);
        let _ = waitpid(pid, None);
    }
}

impl WriteStrategy for PtracePoke {
    fn name(&self) -> &'static str {
        "ptrace-poke"
    }

    fn begin(
        &mut self,
        map: &RoMap,
        window: usize,
        budget: &RaceBudget,
    ) -> Result<PressureHost, RaceError> {
        let base = map.base();
        let pressure_iters = budget.pressure_iters;

        match unsafe { fork() }? {
            ForkResult::Child => {
                // the forked copy of the mapping is the contested page;
                // keep evicting it, then park until the parent is done
                let inducer = pressure::spawn(base, window, pressure_iters);
                let _ = ptrace::traceme();
                let _ = signal::raise(Signal::SIGSTOP);
                let _ = inducer.join();
                unsafe { libc::_exit(0) }
            }
            ForkResult::Parent { child } => match waitpid(child, Some(WaitPidFlag::WUNTRACED)) {
                Ok(WaitStatus::Stopped(_, Signal::SIGSTOP)) => {
                    self.victim = Some(child);
                    Ok(PressureHost::Victim)
                }
                other => {
                    Self::reap(child);
                    Err(RaceError::VictimError(format!(
                        "victim never parked itself: {other:?}"
                    )))
                }
            },
        }
    }

    fn poke(&mut self, addr: usize, bytes: &[u8; WORD]) -> io::Result<()> {
        let pid = self
            .victim
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        let word = isize::from_ne_bytes(*bytes);
        let rc = unsafe {
            libc::ptrace(
                libc::PTRACE_POKEDATA,
                pid.as_raw(),
                addr as *mut libc::c_void,
                word as libc::c_long,
            )
        };

        if rc == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    fn finish(&mut self) -> Result<(), RaceError> {
        if let Some(pid) = self.victim.take() {
            Self::reap(pid);
        }
        Ok(())
    }
}

//! In-process write strategy: `/proc/self/mem` addresses our own memory
//! image by virtual address, and writes through it go down the same
//! privileged access path a debugger would use, ignoring the mapping's
//! read-only protection. The engine drives the pressure thread itself.

use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};

use super::{PressureHost, RaceBudget, RaceError, WriteStrategy};
use crate::mapping::RoMap;
use crate::util::WORD;

#[derive(Default)]
pub struct SelfMem {
    mem: Option<File>,
}

impl SelfMem {
    pub fn new() -> SelfMem {
        SelfMem::default()
    }
}

impl WriteStrategy for SelfMem {
    fn name(&self) -> &'static str {
        "procselfmem"
    }

    fn begin(
        &mut self,
        _map: &RoMap,
        _window: usize,
        _budget: &RaceBudget,
    ) -> Result<PressureHost, RaceError> {
        let mem = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/proc/self/mem")?;
        self.mem = Some(mem);
        Ok(PressureHost::Engine)
    }

    fn poke(&mut self, addr: usize, bytes: &[u8; WORD]) -> io::Result<()> {
        let mem = self
            .mem
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))?;

        // the virtual address doubles as the offset into the memory image
        mem.seek(SeekFrom::Start(addr as u64))?;
        mem.write_all(bytes)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), RaceError> {
        self.mem = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pokes_land_in_writable_memory() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(&[0u8; 64])?;
        let map = RoMap::open(file.path())?;

        let mut strategy = SelfMem::new();
        strategy.begin(&map, 256, &RaceBudget::default())?;

        // poking our own writable buffer proves the raw write path works;
        // the write is invisible to the compiler, so read it back volatile
        let mut scratch = [0u8; WORD];
        let addr = std::hint::black_box(scratch.as_mut_ptr());
        strategy.poke(addr as usize, b"RAWWRITE")?;
        let observed = unsafe { std::ptr::read_volatile(addr as *const [u8; WORD]) };
        assert_eq!(&observed, b"RAWWRITE");

        strategy.finish()?;
        Ok(())
    }

    #[test]
    fn poke_before_begin_fails() {
        let mut strategy = SelfMem::new();
        assert!(strategy.poke(0x1000, &[0u8; WORD]).is_err());
    }
}

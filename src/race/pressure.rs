//! The pressure half of the race: a tight `madvise(MADV_DONTNEED)` loop
//! telling the kernel to drop the mapped page so the next access has to be
//! re-resolved from backing storage. Each re-fault reopens the window the
//! writer is trying to hit.

use std::thread::JoinHandle;

use super::PressureReport;

/// Spawn the pressure loop on its own thread. The handle's result must be
/// joined by the controller so the counters are not discarded.
pub fn spawn(base: usize, window: usize, iters: u64) -> JoinHandle<PressureReport> {
    std::thread::spawn(move || run(base, window, iters))
}

/// Issue `iters` eviction advisories over `window` bytes at `base`.
///
/// A failed advisory is simply retried by the next iteration; the loop
/// never returns early.
pub fn run(base: usize, window: usize, iters: u64) -> PressureReport {
    let mut report = PressureReport::default();

    for _ in 0..iters {
        let rc = unsafe {
            libc::madvise(base as *mut libc::c_void, window, libc::MADV_DONTNEED)
        };
        if rc == 0 {
            report.advised += 1;
        }
        report.iterations += 1;
    }

    report
}

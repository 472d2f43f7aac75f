use std::sync::{Arc, Mutex};
use crate::logging;
use crate::race::RaceBudget;

/// Process-wide defaults shared by the library and the CLI. The race
/// iteration budgets live here so callers can retune them for their
/// kernel/hardware without touching the engine.
#[derive(Default)]
pub struct Context {
    pub log_level: logging::LogLevel,
    pub budget: RaceBudget,
}

lazy_static::lazy_static!{
    static ref CONTEXT: Arc<Mutex<Context>> = Arc::new(Mutex::new(Context::default()));
}

pub fn access<F, R>(f: F) -> R
where
    F: FnOnce(&mut Context) -> R,
{
    let mut guard = CONTEXT.lock().unwrap();
    f(&mut guard)
}

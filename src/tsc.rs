// The monitor's start/stop cycle counter, on top of rdtsc.

use crate::x86;
use spin::Mutex;

static TIMER: Mutex<Option<u64>> = Mutex::new(None);

pub(crate) fn timer_start() {
    *TIMER.lock() = Some(x86::rdtsc());
    crate::println!("timer started");
}

pub(crate) fn timer_stop() {
    let started = TIMER.lock().take();
    match started {
        Some(start) => {
            let cycles = x86::rdtsc() - start;
            crate::println!("timer stopped: {} cycles", cycles);
        }
        None => crate::println!("timer is not running; use timer_start first"),
    }
}

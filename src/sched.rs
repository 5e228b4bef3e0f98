// Round-robin scheduling: pick the next Runnable environment after
// the one this CPU ran last and switch to it.

use crate::env::{self, EnvTable};
use crate::{cpu, monitor, x86};
use spin::MutexGuard;

/// Choose an environment to run and run it. Never returns.
pub(crate) fn sched_yield() -> ! {
    let table = env::env_table();
    let next = table.find_runnable(cpu::this_cpu().cur_env_id());
    match next {
        Some(id) => env::env_run(id, table),
        None => sched_halt(table),
    }
}

/// Nothing left to run: drop into the monitor so the machine stays
/// inspectable.
fn sched_halt(table: MutexGuard<EnvTable>) -> ! {
    drop(table);
    log::info!("sched_halt: no runnable environments in the system");
    loop {
        monitor::monitor(None);
        x86::hlt();
    }
}

//! User-level page fault handler registration. The kernel always
//! vectors to the assembly entry in pfentry.S, which calls through
//! `_pgfault_handler`; installing the first handler also allocates the
//! exception stack.

use super::syscall::{sys_env_set_pgfault_upcall, sys_page_alloc};
use crate::constants::{PteFlags, PGSIZE, UXSTACKTOP};
use crate::env::EnvId;
use crate::pmap::VirtAddr;
use crate::trap::UTrapframe;

/// Read by pfentry.S; the indirection lets the handler change without
/// re-registering the upcall.
#[no_mangle]
#[allow(non_upper_case_globals)]
static mut _pgfault_handler: u32 = 0;

extern "C" {
    fn _pgfault_upcall();
}

pub type PgfaultHandler = extern "C" fn(&mut UTrapframe);

/// The address the kernel must be given as the upcall entry.
pub fn upcall_entry() -> VirtAddr {
    VirtAddr(_pgfault_upcall as usize as u32)
}

/// Install `handler` as this environment's page fault handler. On
/// first use, allocates the user exception stack and registers the
/// assembly entry with the kernel.
pub fn set_pgfault_handler(handler: PgfaultHandler) {
    unsafe {
        if _pgfault_handler == 0 {
            sys_page_alloc(
                EnvId(0),
                VirtAddr(UXSTACKTOP - PGSIZE),
                PteFlags::P | PteFlags::U | PteFlags::W,
            )
            .expect("set_pgfault_handler: cannot allocate exception stack");
            sys_env_set_pgfault_upcall(EnvId(0), upcall_entry())
                .expect("set_pgfault_handler: cannot register upcall");
        }

        _pgfault_handler = handler as usize as u32;
    }
}

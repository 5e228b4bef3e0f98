//! The user-side support library: system call wrappers, page fault
//! upcall plumbing, copy-on-write fork, and IPC. This code runs in
//! user text, with the kernel visible only through the system call
//! gate and the uvpt/uvpd introspection windows.

pub mod fork;
pub mod ipc;
pub mod pgfault;
pub mod syscall;

use crate::env::EnvId;
use crate::pmap::VirtAddr;

// The handle of the environment this library is linked into. Caches
// sys_getenvid; fork() refreshes it in the child.
static mut THIS_ENV: EnvId = EnvId(0);

pub fn thisenv() -> EnvId {
    unsafe { THIS_ENV }
}

pub(crate) fn set_thisenv(id: EnvId) {
    unsafe {
        THIS_ENV = id;
    }
}

/// The page table entry covering `va`, read through the current
/// environment's self-mapped page table. Only valid if uvpd says the
/// page table exists.
pub(crate) fn uvpt_entry(va: VirtAddr) -> u32 {
    let uvpt = crate::constants::UVPT as *const u32;
    unsafe { *uvpt.add((va.0 >> 12) as usize) }
}

/// The page directory entry covering `va`, via the UVPD window.
pub(crate) fn uvpd_entry(va: VirtAddr) -> u32 {
    let uvpd = crate::constants::UVPD as *const u32;
    unsafe { *uvpd.add((va.0 >> 22) as usize) }
}

//! User-level fork with copy-on-write: the principal client of the
//! page fault upcall machinery. The parent and child share every page
//! read-only until one of them writes, at which point the fault
//! handler below gives the writer its own copy.

use super::pgfault::{set_pgfault_handler, upcall_entry};
use super::syscall::*;
use super::{set_thisenv, uvpd_entry, uvpt_entry};
use crate::constants::*;
use crate::env::EnvId;
use crate::pmap::VirtAddr;
use crate::trap::UTrapframe;
use core::ptr;

/// Copy-on-write fault handler: a write to a COW page allocates a
/// private page at PFTEMP, copies the contents, and atomically remaps
/// it writable at the faulting address.
extern "C" fn pgfault(utf: &mut UTrapframe) {
    let addr = utf.utf_fault_va;
    let err = utf.utf_err;

    // Only a write to a page marked copy-on-write (checked through the
    // uvpt window) is ours to fix.
    if err & FEC_WR == 0 {
        panic!("pgfault: fault at {:08x} is not a write (err {:#x})", addr.0, err);
    }
    if uvpt_entry(addr) & PteFlags::COW.bits() == 0 {
        panic!("pgfault: {:08x} is not copy-on-write", addr.0);
    }

    let addr = addr.round_down(PGSIZE);
    let perm = PteFlags::P | PteFlags::U | PteFlags::W;

    sys_page_alloc(EnvId(0), VirtAddr(PFTEMP), perm).expect("pgfault: cannot allocate");
    unsafe {
        ptr::copy_nonoverlapping(
            addr.as_ptr::<u8>(),
            PFTEMP as *mut u8,
            PGSIZE as usize,
        );
    }
    sys_page_map(EnvId(0), VirtAddr(PFTEMP), EnvId(0), addr, perm).expect("pgfault: cannot remap");
    sys_page_unmap(EnvId(0), VirtAddr(PFTEMP)).expect("pgfault: cannot unmap staging page");
}

/// Map page number `pn` of this environment into `child` at the same
/// virtual address.
///
/// Explicitly shareable pages (PTE_SHARE) keep their full permissions
/// in both environments. Writable or already-COW pages are mapped
/// copy-on-write into the child first and then re-marked
/// copy-on-write here: the re-marking is required even when the page
/// already was COW, and the child must come first, so that no moment
/// exists where a writable parent view coexists with the child's
/// mapping. Read-only pages are simply shared read-only.
fn duppage(child: EnvId, pn: usize) -> Result<(), crate::error::KernErr> {
    let va = VirtAddr((pn as u32) << PGSHIFT);
    let pte = uvpt_entry(va);

    if pte & PteFlags::P.bits() == 0 {
        return Err(crate::error::KernErr::Inval);
    }

    if pte & PteFlags::SHARE.bits() != 0 {
        let perm = PteFlags::from_bits_truncate(pte) & PteFlags::SYSCALL;
        sys_page_map(EnvId(0), va, child, va, perm)?;
    } else if pte & (PteFlags::W.bits() | PteFlags::COW.bits()) != 0 {
        let perm = PteFlags::P | PteFlags::U | PteFlags::COW;
        sys_page_map(EnvId(0), va, child, va, perm)?;
        sys_page_map(EnvId(0), va, EnvId(0), va, perm)?;
    } else {
        sys_page_map(EnvId(0), va, child, va, PteFlags::P | PteFlags::U)?;
    }

    Ok(())
}

/// Fork this environment with copy-on-write sharing. Returns the
/// child's handle in the parent and EnvId(0) in the child. Panics on
/// failure.
pub fn fork() -> EnvId {
    set_pgfault_handler(pgfault);

    let ret = sys_exofork();
    if ret < 0 {
        panic!("fork: exofork failed ({})", ret);
    }
    if ret == 0 {
        // We are the child: the cached handle still names the parent.
        set_thisenv(sys_getenvid());
        return EnvId(0);
    }
    let child = EnvId(ret as u32);

    // Share every mapped page below UTOP with the child, except the
    // exception stack, which must never be copy-on-write: the fault
    // handler runs on it.
    let uxstack_pn = ((UXSTACKTOP - PGSIZE) >> PGSHIFT) as usize;
    let mut pn = 0;
    while pn < (UTOP >> PGSHIFT) as usize {
        let va = VirtAddr((pn as u32) << PGSHIFT);
        if uvpd_entry(va) & PteFlags::P.bits() == 0 {
            // Whole page table absent; skip it.
            pn += NPTENTRIES;
            continue;
        }
        if pn != uxstack_pn && uvpt_entry(va) & PteFlags::P.bits() != 0 {
            duppage(child, pn).expect("fork: duppage failed");
        }
        pn += 1;
    }

    // The child gets a fresh exception stack carrying a copy of ours,
    // staged through PFTEMP.
    let uxstack = VirtAddr(UXSTACKTOP - PGSIZE);
    let perm = PteFlags::P | PteFlags::U | PteFlags::W;
    sys_page_alloc(EnvId(0), VirtAddr(PFTEMP), perm).expect("fork: cannot allocate");
    unsafe {
        ptr::copy_nonoverlapping(
            uxstack.as_ptr::<u8>(),
            PFTEMP as *mut u8,
            PGSIZE as usize,
        );
    }
    sys_page_map(EnvId(0), VirtAddr(PFTEMP), child, uxstack, perm)
        .expect("fork: cannot map the child's exception stack");
    sys_page_unmap(EnvId(0), VirtAddr(PFTEMP)).expect("fork: cannot unmap staging page");

    // Same upcall in the child, then let it run.
    sys_env_set_pgfault_upcall(child, upcall_entry()).expect("fork: cannot set upcall");
    sys_env_set_status(child, true).expect("fork: cannot start the child");

    child
}

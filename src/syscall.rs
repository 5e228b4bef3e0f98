// The kernel side of the system call surface. Arguments arrive in
// (eax; edx, ecx, ebx, edi, esi), the result goes back in eax; every
// entry point returns a negative error value or succeeds.

use crate::constants::*;
use crate::env::{self, EnvId, EnvKind, EnvStatus};
use crate::error::{KernErr, KernResult};
use crate::pmap::{self, VirtAddr};
use crate::{console, cpu, sched};
use consts::*;
use core::slice;
use core::str;

pub(crate) mod consts {
    pub(crate) const SYS_CPUTS: u32 = 0;
    pub(crate) const SYS_CGETC: u32 = 1;
    pub(crate) const SYS_GETENVID: u32 = 2;
    pub(crate) const SYS_ENV_DESTROY: u32 = 3;
    pub(crate) const SYS_PAGE_ALLOC: u32 = 4;
    pub(crate) const SYS_PAGE_MAP: u32 = 5;
    pub(crate) const SYS_PAGE_UNMAP: u32 = 6;
    pub(crate) const SYS_EXOFORK: u32 = 7;
    pub(crate) const SYS_ENV_SET_STATUS: u32 = 8;
    pub(crate) const SYS_ENV_SET_PGFAULT_UPCALL: u32 = 9;
    pub(crate) const SYS_YIELD: u32 = 10;
    pub(crate) const SYS_IPC_TRY_SEND: u32 = 11;
    pub(crate) const SYS_IPC_RECV: u32 = 12;

    // The EnvStatus values as they cross the syscall ABI.
    pub(crate) const ENV_RUNNABLE: u32 = 2;
    pub(crate) const ENV_NOT_RUNNABLE: u32 = 4;
}

fn cur_env() -> KernResult<EnvId> {
    cpu::this_cpu().cur_env_id().ok_or(KernErr::BadEnv)
}

/// A user-supplied page address: below UTOP and page-aligned.
fn check_user_va(va: u32) -> KernResult<VirtAddr> {
    if va >= UTOP || va % PGSIZE != 0 {
        return Err(KernErr::Inval);
    }
    Ok(VirtAddr(va))
}

/// A user-supplied permission mask: PTE_U|PTE_P required, nothing
/// outside PTE_SYSCALL allowed.
fn check_perm(perm: u32) -> KernResult<PteFlags> {
    let flags = PteFlags::from_bits(perm).ok_or(KernErr::Inval)?;
    if !flags.contains(PteFlags::U | PteFlags::P) {
        return Err(KernErr::Inval);
    }
    if !PteFlags::SYSCALL.contains(flags) {
        return Err(KernErr::Inval);
    }
    Ok(flags)
}

/// Print a string from the caller's address space on the console.
fn sys_cputs(s: u32, len: u32) -> KernResult<u32> {
    let cur = cur_env()?;

    // Destroys the caller instead of returning on a bad range.
    let table = env::user_mem_assert(
        env::env_table(),
        cur,
        VirtAddr(s),
        len as usize,
        PteFlags::empty(),
    );
    drop(table);

    // The caller's page directory is still loaded, so its buffer is
    // directly addressable.
    let bytes = unsafe { slice::from_raw_parts(s as *const u8, len as usize) };
    let s = str::from_utf8(bytes).map_err(|_| KernErr::Inval)?;
    crate::print!("{}", s);
    Ok(0)
}

/// One pending console byte, or 0.
fn sys_cgetc() -> KernResult<u32> {
    Ok(console::getc() as u32)
}

fn sys_getenvid() -> KernResult<u32> {
    Ok(cur_env()?.0)
}

/// Destroy an environment (the caller or one of its children). Does
/// not return when the victim is the caller itself.
fn sys_env_destroy(envid: u32) -> KernResult<u32> {
    let mut table = env::env_table();
    let id = table.resolve(EnvId(envid), true)?.id();
    env::env_destroy(id, table);
    Ok(0)
}

/// Allocate a zeroed page and map it at va in the target environment.
fn sys_page_alloc(envid: u32, va: u32, perm: u32) -> KernResult<u32> {
    let va = check_user_va(va)?;
    let perm = check_perm(perm)?;

    let mut table = env::env_table();
    let e = table.resolve(EnvId(envid), true)?;
    let mut allocator = pmap::page_allocator();
    e.pgdir().alloc_page_at(va, perm, &mut allocator)?;
    Ok(0)
}

/// Map the page at srcva in srcenv at dstva in dstenv. The mapping is
/// shared: both environments see the same physical page. A writable
/// view can only be granted if the source mapping is writable.
fn sys_page_map(srcenvid: u32, srcva: u32, dstenvid: u32, dstva: u32, perm: u32) -> KernResult<u32> {
    let srcva = check_user_va(srcva)?;
    let dstva = check_user_va(dstva)?;
    let perm = check_perm(perm)?;

    let mut table = env::env_table();
    let src_id = table.resolve(EnvId(srcenvid), true)?.id();
    let dst_id = table.resolve(EnvId(dstenvid), true)?.id();

    let mut allocator = pmap::page_allocator();
    let (pa, src_flags) = {
        let pte = table
            .get_mut(src_id)
            .pgdir()
            .lookup(srcva, &mut allocator)
            .ok_or(KernErr::Inval)?;
        (pte.addr(), pte.flags())
    };

    if perm.contains(PteFlags::W) && !src_flags.contains(PteFlags::W) {
        return Err(KernErr::Inval);
    }

    table
        .get_mut(dst_id)
        .pgdir()
        .insert(pa, dstva, perm, &mut allocator)?;
    Ok(0)
}

/// Unmap the page at va in the target environment.
fn sys_page_unmap(envid: u32, va: u32) -> KernResult<u32> {
    let va = check_user_va(va)?;

    let mut table = env::env_table();
    let e = table.resolve(EnvId(envid), true)?;
    let mut allocator = pmap::page_allocator();
    e.pgdir().remove(va, &mut allocator);
    Ok(0)
}

/// Allocate a child environment sharing nothing: the register frame is
/// a copy of the caller's (with eax cleared, so the child observes a
/// zero return), the address space is empty, and the status is
/// NotRunnable until the parent finishes populating it.
fn sys_exofork() -> KernResult<u32> {
    let cur = cur_env()?;

    let mut table = env::env_table();
    let parent_tf = *table.get(cur).tf();

    let child = table.alloc(cur, EnvKind::User)?;
    let e = table.get_mut(child);
    e.set_status(EnvStatus::NotRunnable);
    e.set_tf(&parent_tf);
    e.tf_mut().tf_regs.reg_eax = 0;

    Ok(child.0)
}

/// Set a child's status to Runnable or NotRunnable.
fn sys_env_set_status(envid: u32, status: u32) -> KernResult<u32> {
    let status = match status {
        ENV_RUNNABLE => EnvStatus::Runnable,
        ENV_NOT_RUNNABLE => EnvStatus::NotRunnable,
        _ => return Err(KernErr::Inval),
    };

    let mut table = env::env_table();
    let e = table.resolve(EnvId(envid), true)?;
    e.set_status(status);
    Ok(0)
}

/// Register the page-fault upcall entry for an environment.
fn sys_env_set_pgfault_upcall(envid: u32, func: u32) -> KernResult<u32> {
    let mut table = env::env_table();
    let e = table.resolve(EnvId(envid), true)?;
    e.set_pgfault_upcall(VirtAddr(func));
    Ok(0)
}

/// Try to send a value (and optionally a page mapping) to a receiving
/// environment. No permission check on the target: any environment
/// may be sent to. Fails with IpcNotRecv unless the target is blocked
/// in sys_ipc_recv.
fn sys_ipc_try_send(envid: u32, value: u32, srcva: u32, perm: u32) -> KernResult<u32> {
    let cur = cur_env()?;

    let mut table = env::env_table();
    let dst_id = table.resolve(EnvId(envid), false)?.id();

    if !table.get(dst_id).ipc_recving() {
        return Err(KernErr::IpcNotRecv);
    }

    // A srcva below UTOP means the sender offers a page.
    let mut granted = PteFlags::empty();
    if srcva < UTOP {
        let srcva = check_user_va(srcva)?;
        let perm = check_perm(perm)?;

        let mut allocator = pmap::page_allocator();
        let (pa, src_flags) = {
            let pte = table
                .get_mut(cur)
                .pgdir()
                .lookup(srcva, &mut allocator)
                .ok_or(KernErr::Inval)?;
            (pte.addr(), pte.flags())
        };
        if perm.contains(PteFlags::W) && !src_flags.contains(PteFlags::W) {
            return Err(KernErr::Inval);
        }

        let dstva = table.get(dst_id).ipc_dstva();
        if dstva.0 < UTOP {
            table
                .get_mut(dst_id)
                .pgdir()
                .insert(pa, dstva, perm, &mut allocator)?;
            granted = perm;
        }
    }

    // Complete the receive: the target wakes up out of its
    // sys_ipc_recv with the results in its saved registers.
    let dst = table.get_mut(dst_id);
    dst.ipc_complete(cur, value, granted);
    dst.set_status(EnvStatus::Runnable);
    let tf = dst.tf_mut();
    tf.tf_regs.reg_eax = 0;
    tf.tf_regs.reg_edx = value;
    tf.tf_regs.reg_esi = cur.0;
    tf.tf_regs.reg_edi = granted.bits();

    Ok(0)
}

/// Block until a value is sent to this environment. dstva below UTOP
/// (page-aligned) announces willingness to receive a page there. Does
/// not return through the normal path; the sender deposits the results
/// directly in the saved registers.
fn sys_ipc_recv(dstva: u32) -> KernResult<u32> {
    let cur = cur_env()?;

    if dstva < UTOP && dstva % PGSIZE != 0 {
        return Err(KernErr::Inval);
    }

    let mut table = env::env_table();
    let e = table.get_mut(cur);
    e.ipc_start_recv(VirtAddr(dstva));
    e.set_status(EnvStatus::NotRunnable);
    drop(table);

    sched::sched_yield();
}

/// Dispatch to the kernel function, passing the arguments.
pub(crate) fn syscall(syscall_no: u32, a1: u32, a2: u32, a3: u32, a4: u32, a5: u32) -> i32 {
    let res = match syscall_no {
        SYS_CPUTS => sys_cputs(a1, a2),
        SYS_CGETC => sys_cgetc(),
        SYS_GETENVID => sys_getenvid(),
        SYS_ENV_DESTROY => sys_env_destroy(a1),
        SYS_PAGE_ALLOC => sys_page_alloc(a1, a2, a3),
        SYS_PAGE_MAP => sys_page_map(a1, a2, a3, a4, a5),
        SYS_PAGE_UNMAP => sys_page_unmap(a1, a2),
        SYS_EXOFORK => sys_exofork(),
        SYS_ENV_SET_STATUS => sys_env_set_status(a1, a2),
        SYS_ENV_SET_PGFAULT_UPCALL => sys_env_set_pgfault_upcall(a1, a2),
        SYS_YIELD => sched::sched_yield(),
        SYS_IPC_TRY_SEND => sys_ipc_try_send(a1, a2, a3, a4),
        SYS_IPC_RECV => sys_ipc_recv(a1),
        _ => Err(KernErr::Inval),
    };

    match res {
        Ok(value) => value as i32,
        Err(e) => e.code(),
    }
}

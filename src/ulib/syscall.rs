//! User-side system call stubs: number in eax, up to five arguments in
//! edx, ecx, ebx, edi, esi, result in eax, through interrupt gate 48.

use crate::constants::PteFlags;
use crate::env::EnvId;
use crate::error::KernErr;
use crate::pmap::VirtAddr;
use crate::syscall::consts::*;
use core::arch::asm;

fn syscall(num: u32, a1: u32, a2: u32, a3: u32, a4: u32, a5: u32) -> i32 {
    let ret: i32;
    unsafe {
        asm!(
            "int $48",
            inlateout("eax") num => ret,
            in("edx") a1,
            in("ecx") a2,
            in("ebx") a3,
            in("edi") a4,
            in("esi") a5,
            options(att_syntax),
        );
    }
    ret
}

fn check(ret: i32) -> Result<u32, KernErr> {
    match ret {
        0.. => Ok(ret as u32),
        -2 => Err(KernErr::BadEnv),
        -3 => Err(KernErr::Inval),
        -4 => Err(KernErr::NoMem),
        -5 => Err(KernErr::NoFreeEnv),
        -6 => Err(KernErr::IpcNotRecv),
        _ => Err(KernErr::Inval),
    }
}

pub fn sys_cputs(s: &str) {
    syscall(SYS_CPUTS, s.as_ptr() as u32, s.len() as u32, 0, 0, 0);
}

/// One pending console byte, or 0 when there is none.
pub fn sys_cgetc() -> u8 {
    syscall(SYS_CGETC, 0, 0, 0, 0, 0) as u8
}

pub fn sys_getenvid() -> EnvId {
    EnvId(syscall(SYS_GETENVID, 0, 0, 0, 0, 0) as u32)
}

pub fn sys_env_destroy(envid: EnvId) -> Result<u32, KernErr> {
    check(syscall(SYS_ENV_DESTROY, envid.0, 0, 0, 0, 0))
}

/// Exit by destroying the calling environment. Does not return.
pub fn exit() -> ! {
    sys_env_destroy(EnvId(0)).ok();
    unreachable!("the environment survived its own destruction");
}

pub fn sys_yield() {
    syscall(SYS_YIELD, 0, 0, 0, 0, 0);
}

pub fn sys_page_alloc(envid: EnvId, va: VirtAddr, perm: PteFlags) -> Result<u32, KernErr> {
    check(syscall(SYS_PAGE_ALLOC, envid.0, va.0, perm.bits(), 0, 0))
}

pub fn sys_page_map(
    srcenv: EnvId,
    srcva: VirtAddr,
    dstenv: EnvId,
    dstva: VirtAddr,
    perm: PteFlags,
) -> Result<u32, KernErr> {
    check(syscall(
        SYS_PAGE_MAP,
        srcenv.0,
        srcva.0,
        dstenv.0,
        dstva.0,
        perm.bits(),
    ))
}

pub fn sys_page_unmap(envid: EnvId, va: VirtAddr) -> Result<u32, KernErr> {
    check(syscall(SYS_PAGE_UNMAP, envid.0, va.0, 0, 0, 0))
}

/// Allocate a child sharing nothing. Returns the child's handle in
/// the parent and 0 in the child (via the copied frame).
pub fn sys_exofork() -> i32 {
    syscall(SYS_EXOFORK, 0, 0, 0, 0, 0)
}

pub fn sys_env_set_status(envid: EnvId, runnable: bool) -> Result<u32, KernErr> {
    let status = if runnable { ENV_RUNNABLE } else { ENV_NOT_RUNNABLE };
    check(syscall(SYS_ENV_SET_STATUS, envid.0, status, 0, 0, 0))
}

pub fn sys_env_set_pgfault_upcall(envid: EnvId, upcall: VirtAddr) -> Result<u32, KernErr> {
    check(syscall(SYS_ENV_SET_PGFAULT_UPCALL, envid.0, upcall.0, 0, 0, 0))
}

pub fn sys_ipc_try_send(
    envid: EnvId,
    value: u32,
    srcva: VirtAddr,
    perm: PteFlags,
) -> Result<u32, KernErr> {
    check(syscall(SYS_IPC_TRY_SEND, envid.0, value, srcva.0, perm.bits(), 0))
}

/// Block until someone sends to us. The kernel parks the environment
/// and the sender completes the call: the received value, the sender's
/// handle and the granted page permissions come back in the saved
/// registers, which is why this stub captures them explicitly.
pub fn sys_ipc_recv(dstva: VirtAddr) -> Result<(u32, EnvId, PteFlags), KernErr> {
    let ret: i32;
    let value: u32;
    let from: u32;
    let perm: u32;
    unsafe {
        asm!(
            "int $48",
            inlateout("eax") SYS_IPC_RECV => ret,
            inlateout("edx") dstva.0 => value,
            lateout("esi") from,
            lateout("edi") perm,
            out("ecx") _,
            out("ebx") _,
            options(att_syntax),
        );
    }
    check(ret)?;
    Ok((value, EnvId(from), PteFlags::from_bits_truncate(perm)))
}

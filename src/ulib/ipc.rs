//! Thin user-side IPC wrappers: send spins while the target is not
//! receiving, receive blocks in the kernel.

use super::syscall::{sys_ipc_recv, sys_ipc_try_send, sys_yield};
use crate::constants::{PteFlags, UTOP};
use crate::env::EnvId;
use crate::error::KernErr;
use crate::pmap::VirtAddr;

/// An address at or above UTOP means "no page transfer".
pub const IPC_NO_PAGE: VirtAddr = VirtAddr(UTOP);

/// Send `value` (and the page at `srcva`, unless IPC_NO_PAGE) to
/// `to`, yielding between attempts until the target receives.
pub fn ipc_send(to: EnvId, value: u32, srcva: VirtAddr, perm: PteFlags) {
    loop {
        match sys_ipc_try_send(to, value, srcva, perm) {
            Ok(_) => return,
            Err(KernErr::IpcNotRecv) => sys_yield(),
            Err(e) => panic!("ipc_send: {}", e),
        }
    }
}

/// Receive a value; a `dstva` below UTOP accepts a page mapping
/// there. Returns (value, sender, granted permissions).
pub fn ipc_recv(dstva: VirtAddr) -> (u32, EnvId, PteFlags) {
    match sys_ipc_recv(dstva) {
        Ok(res) => res,
        Err(e) => panic!("ipc_recv: {}", e),
    }
}

// The registry kernel-space images bind their global function-pointer
// symbols against. The interface is fixed (name in, address out); the
// set of exported calls is deliberately tiny.

use crate::env;
use crate::pmap::VirtAddr;

/// Look up an exported kernel function by symbol name.
pub(crate) fn find_function(name: &str) -> Option<VirtAddr> {
    let addr = match name {
        "sys_exit" => env::kspace_exit as usize,
        "sys_cputs" => env::kspace_cputs as usize,
        _ => return None,
    };
    Some(VirtAddr(addr as u32))
}

#![no_std]
#![no_main]

// The check kernel: boots the same way as the real kernel, runs the
// in-kernel checks against a quiescent system, then parks in the
// scheduler (which drops into the monitor with nothing to run).

#[no_mangle]
pub extern "C" fn i386_init() -> ! {
    exos::boot_init();
    exos::check::run_all();
    exos::schedule()
}

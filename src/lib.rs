#![no_std]

extern crate alloc;

#[macro_use]
pub mod console;

pub mod allocator;
pub mod check;
mod constants;
mod cpu;
mod elf;
mod env;
mod error;
mod gdt;
mod kclock;
mod kdebug;
pub mod logging;
mod monitor;
mod picirq;
mod pmap;
mod sched;
mod serial;
mod syscall;
mod trap;
mod tsc;
pub mod ulib;
mod vga_buffer;
mod x86;

pub use constants::PteFlags;
pub use env::{EnvId, EnvKind};
pub use error::{KernErr, KernResult};
pub use pmap::VirtAddr;
pub use trap::UTrapframe;

use core::arch::asm;
use core::panic::PanicInfo;

#[global_allocator]
static ALLOCATOR: allocator::HeapAllocator = allocator::HeapAllocator::empty();

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    // A panic in environment code (the ulib half of this crate) must
    // not touch the console hardware from ring 3; report through the
    // kernel and give the slot back.
    let cs: u16;
    unsafe {
        asm!("movw %cs, {0:x}", out(reg) cs, options(nomem, nostack, preserves_flags, att_syntax));
    }
    if cs & 3 == 3 {
        ulib::syscall::sys_cputs("user panic: ");
        if let Some(msg) = info.message().as_str() {
            ulib::syscall::sys_cputs(msg);
        }
        ulib::syscall::sys_cputs("\n");
        ulib::syscall::exit();
    }

    println!("kernel panic: {}", info);
    loop {
        x86::hlt();
    }
}

/// Bring up memory, environments, traps and the interrupt hardware.
/// Called from the assembly entry once a stack exists.
pub fn boot_init() {
    logging::init();
    println!();
    log::info!("exos is booting");

    pmap::mem_init();

    env::env_init();
    env::env_table().check_invariants();
    unsafe {
        trap::trap_init();
    }

    picirq::pic_init();
    kclock::rtc_init();
    picirq::unmask_8259a(trap::consts::IRQ_CLOCK);
}

/// Hand the CPU to the next runnable environment; with nothing to run,
/// the scheduler parks in the monitor.
pub fn schedule() -> ! {
    sched::sched_yield()
}

/// The standard boot path: initialize, load the init environment when
/// one is linked in, and start scheduling.
pub fn kernel_main() -> ! {
    boot_init();

    #[cfg(feature = "userinit")]
    {
        extern "C" {
            static _binary_user_init_start: u8;
            static _binary_user_init_size: usize;
        }
        unsafe {
            let binary = &_binary_user_init_start as *const u8;
            let size = &_binary_user_init_size as *const _ as usize;
            let mut table = env::env_table();
            table.create(binary, size, EnvKind::User);
        }
    }

    schedule();
}

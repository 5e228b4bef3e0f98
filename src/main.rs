#![no_std]
#![no_main]

use exos::kernel_main;

// entry.S lands here once paging is on and a stack exists.
#[no_mangle]
pub extern "C" fn i386_init() -> ! {
    kernel_main()
}

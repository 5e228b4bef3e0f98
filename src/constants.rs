// Virtual memory map and processor constants. The assembly and C boot
// pieces mirror a handful of these in inc/mmu.h and inc/memlayout.h;
// keep them in sync.
//
//     4GB +------------------------------+
//         |                              |
//         |  remapped physical memory    | RW/--
//         |                              |
// KERNBASE, KSTACKTOP -------------------+ 0xf0000000
//         |   CPU0's kernel stack        | RW/--  KSTKSIZE
//         |   - - - - - - - - - - - - -  |
//         |   unbacked guard, then the   |
//         |   other CPUs' stacks         |
// MMIOLIM +------------------------------+ 0xefc00000
//         |  memory-mapped I/O           | RW/--  PTSIZE
// MMIOBASE, ULIM ------------------------+ 0xef800000
//         |  UVPT: own page table        | R-/R-  PTSIZE
// UVPT    +------------------------------+ 0xef400000
//         |  kernel heap                 | RW/--  3 * PTSIZE
// KHEAPBASE, UTOP, UXSTACKTOP -----------+ 0xee800000
//         |  user exception stack        | RW/RW  PGSIZE
//         |  - - - - - - - - - - - - - - |
//         |  empty memory (guard)        | --/--  PGSIZE
// USTACKTOP ----------------------------—+
//         |  normal user stack           | RW/RW  PGSIZE
//         |         .  .  .              |
// UTEXT   +------------------------------+ 0x00800000
// PFTEMP  |  copy-on-write staging page  |
// UTEMP   +------------------------------+ 0x00400000
//         |  unused                      |
//         +------------------------------+ 0

use bitflags::bitflags;

pub(crate) const PGSIZE: u32 = 4096;
pub(crate) const PGSHIFT: u32 = 12;
pub(crate) const NPDENTRIES: usize = 1024;
pub(crate) const NPTENTRIES: usize = 1024;
pub(crate) const PTSIZE: u32 = (NPTENTRIES as u32) * PGSIZE;

pub(crate) const KERN_BASE: u32 = 0xf000_0000;
pub(crate) const KSTACKTOP: u32 = KERN_BASE;
pub(crate) const KSTKSIZE: u32 = 8 * PGSIZE;
pub(crate) const KSTKGAP: u32 = 8 * PGSIZE;
pub(crate) const MMIOLIM: u32 = KSTACKTOP - PTSIZE;
pub(crate) const MMIOBASE: u32 = MMIOLIM - PTSIZE;
pub(crate) const ULIM: u32 = MMIOBASE;

// The current environment's page directory, mapped into itself.
// User-readable; uvpd is the directory seen through its own window.
pub(crate) const UVPT: u32 = ULIM - PTSIZE;
pub(crate) const UVPD: u32 = UVPT + (UVPT >> 12) * 4;

// Kernel heap, in place of JOS's read-only PAGES/ENVS windows.
pub(crate) const KHEAP_SIZE: usize = 3 * PTSIZE as usize;
pub(crate) const KHEAP_BASE: u32 = UVPT - KHEAP_SIZE as u32;

// Top of the user-accessible address space; everything an environment
// owns lives strictly below this, which is also what env_free tears
// down.
pub(crate) const UTOP: u32 = KHEAP_BASE;
pub(crate) const UXSTACKTOP: u32 = UTOP;
// One page of guard space below the exception stack.
pub(crate) const USTACKTOP: u32 = UTOP - 2 * PGSIZE;

pub(crate) const UTEXT: u32 = 0x0080_0000;
pub(crate) const UTEMP: u32 = 0x0040_0000;
// Scratch address where copy-on-write stages a fresh page.
pub(crate) const PFTEMP: u32 = UTEMP + PTSIZE - PGSIZE;

const _: () = assert!(UTOP % PTSIZE == 0);
const _: () = assert!(UVPT % PTSIZE == 0);

bitflags! {
    /// Page table/directory entry permission bits. SHARE and COW live
    /// in the bits the hardware leaves to software.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        const P     = 0x001;
        const W     = 0x002;
        const U     = 0x004;
        const PWT   = 0x008;
        const PCD   = 0x010;
        const A     = 0x020;
        const D     = 0x040;
        const PS    = 0x080;
        const G     = 0x100;
        const AVAIL = 0xe00;
        const SHARE = 0x400;
        const COW   = 0x800;
        // The bits a user request to the page system calls may carry.
        const SYSCALL = 0xe07;
    }
}

// Page fault error code bits.
pub(crate) const FEC_PR: u32 = 0x1; // protection violation (vs not-present)
pub(crate) const FEC_WR: u32 = 0x2; // write (vs read)
pub(crate) const FEC_U: u32 = 0x4; // fault in user mode

// Eflags.
pub(crate) const FL_IF: u32 = 0x0000_0200; // interrupt enable
pub(crate) const FL_IOPL_MASK: u32 = 0x0000_3000; // I/O privilege level

// CR0 bits configured at the end of mem_init.
pub(crate) const CR0_PE: u32 = 0x0000001; // Protection Enable
pub(crate) const CR0_MP: u32 = 0x0000002; // Monitor coProcessor
pub(crate) const CR0_EM: u32 = 0x0000004; // Emulation
pub(crate) const CR0_TS: u32 = 0x0000008; // Task Switched
pub(crate) const CR0_NE: u32 = 0x0000020; // Numeric Error
pub(crate) const CR0_WP: u32 = 0x0010000; // Write Protect
pub(crate) const CR0_AM: u32 = 0x0040000; // Alignment Mask
pub(crate) const CR0_PG: u32 = 0x8000_0000; // Paging

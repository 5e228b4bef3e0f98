// Global descriptor table and task state segment.
//
// Set up the GDT with separate segments for kernel mode and user mode.
// Segments serve many purposes on the x86; we don't use any of their
// memory-mapping capabilities, but we need them to switch privilege
// levels. The kernel and user segments are identical except for the
// DPL: to load SS, the CPL must equal the DPL, so the segments are
// duplicated for ring 0 and ring 3.

use crate::pmap::{PhysAddr, VirtAddr};
use crate::x86;
use consts::*;
use core::arch::asm;
use core::mem;
use spin::Mutex;

pub(crate) mod consts {
    pub(crate) const GD_KT: u16 = 0x08; // kernel text
    pub(crate) const GD_KD: u16 = 0x10; // kernel data
    pub(crate) const GD_UT: u16 = 0x18; // user text
    pub(crate) const GD_UD: u16 = 0x20; // user data
    pub(crate) const GD_TSS0: u16 = 0x28; // task segment for CPU 0

    pub(crate) const GDT_A_PRESENT: u8 = 1 << 7;
    pub(crate) const GDT_A_RING_0: u8 = 0 << 5;
    pub(crate) const GDT_A_RING_3: u8 = 3 << 5;
    pub(crate) const GDT_A_SYSTEM: u8 = 1 << 4; // 0 for system, 1 for code or data
    pub(crate) const GDT_A_EXECUTABLE: u8 = 1 << 3;
    pub(crate) const GDT_A_PRIVILEGE: u8 = 1 << 1; // readable code / writable data
    pub(crate) const GDT_A_TSS_32A: u8 = 0x9; // available 32-bit TSS

    pub(crate) const GDT_F_PAGE_SIZE: u8 = 1 << 7;
    pub(crate) const GDT_F_PROTECTED_MODE: u8 = 1 << 6;
}

const NGDT: usize = crate::cpu::MAX_NUM_CPU + 5;

type GlobalDescriptorTable = [SegDesc; NGDT];

static GDT: Mutex<GlobalDescriptorTable> = Mutex::new(init_gdt());

const fn init_gdt() -> GlobalDescriptorTable {
    let mut gdt = [SegDesc::null(); NGDT];

    // 0x8 - kernel code segment
    gdt[(GD_KT >> 3) as usize] = SegDesc::new(
        0x0,
        0xffffffff,
        GDT_A_PRESENT | GDT_A_RING_0 | GDT_A_SYSTEM | GDT_A_EXECUTABLE | GDT_A_PRIVILEGE,
        GDT_F_PAGE_SIZE | GDT_F_PROTECTED_MODE,
    );
    // 0x10 - kernel data segment
    gdt[(GD_KD >> 3) as usize] = SegDesc::new(
        0x0,
        0xffffffff,
        GDT_A_PRESENT | GDT_A_RING_0 | GDT_A_SYSTEM | GDT_A_PRIVILEGE,
        GDT_F_PAGE_SIZE | GDT_F_PROTECTED_MODE,
    );
    // 0x18 - user code segment
    gdt[(GD_UT >> 3) as usize] = SegDesc::new(
        0x0,
        0xffffffff,
        GDT_A_PRESENT | GDT_A_RING_3 | GDT_A_SYSTEM | GDT_A_EXECUTABLE | GDT_A_PRIVILEGE,
        GDT_F_PAGE_SIZE | GDT_F_PROTECTED_MODE,
    );
    // 0x20 - user data segment
    gdt[(GD_UD >> 3) as usize] = SegDesc::new(
        0x0,
        0xffffffff,
        GDT_A_PRESENT | GDT_A_RING_3 | GDT_A_SYSTEM | GDT_A_PRIVILEGE,
        GDT_F_PAGE_SIZE | GDT_F_PROTECTED_MODE,
    );
    // Per-CPU TSS descriptors from GD_TSS0 are installed by
    // trap_init_percpu().

    gdt
}

#[derive(Clone, Copy)]
#[repr(C, packed)]
pub(crate) struct SegDesc {
    limitl: u16,
    offsetl: u16,
    offsetm: u8,
    access: u8,
    flags_limith: u8,
    offseth: u8,
}

impl SegDesc {
    const fn null() -> SegDesc {
        SegDesc::new(0x0, 0x0, 0x0, 0x0)
    }

    const fn new(offset: u32, limit: u32, access: u8, flags: u8) -> SegDesc {
        SegDesc {
            limitl: (limit & 0xffff) as u16,
            offsetl: (offset & 0xffff) as u16,
            offsetm: ((offset >> 16) & 0xff) as u8,
            access,
            flags_limith: (flags & 0xf0) | (((limit >> 16) & 0xff) as u8 & 0x0f),
            offseth: ((offset >> 24) & 0xff) as u8,
        }
    }

    /// A system descriptor for a task state segment: byte granularity,
    /// system bit clear.
    fn tss(base: u32, limit: u32) -> SegDesc {
        SegDesc::new(base, limit, GDT_A_PRESENT | GDT_A_RING_0 | GDT_A_TSS_32A, 0)
    }
}

#[repr(C, packed)]
pub(crate) struct TaskState {
    ts_link: u32, // old ts selector
    ts_esp0: VirtAddr, // stack pointer and segment selector
    ts_ss0: u16,       // used after an increase in privilege level
    ts_padding1: u16,
    ts_esp1: VirtAddr,
    ts_ss1: u16,
    ts_padding2: u16,
    ts_esp2: VirtAddr,
    ts_ss2: u16,
    ts_padding3: u16,
    ts_cr3: PhysAddr, // page directory base
    ts_eip: VirtAddr, // saved state from last task switch
    ts_eflags: u32,
    ts_eax: u32,
    ts_ecx: u32,
    ts_edx: u32,
    ts_ebx: u32,
    ts_esp: VirtAddr,
    ts_ebp: VirtAddr,
    ts_esi: u32,
    ts_edi: u32,
    ts_es: u16,
    ts_padding4: u16,
    ts_cs: u16,
    ts_padding5: u16,
    ts_ss: u16,
    ts_padding6: u16,
    ts_ds: u16,
    ts_padding7: u16,
    ts_fs: u16,
    ts_padding8: u16,
    ts_gs: u16,
    ts_padding9: u16,
    ts_ldt: u16,
    ts_padding10: u16,
    ts_t: u16,    // trap on task switch
    ts_iomb: u16, // I/O map base address
}

impl TaskState {
    pub(crate) const fn new() -> TaskState {
        TaskState {
            ts_link: 0,
            ts_esp0: VirtAddr(0),
            ts_ss0: 0,
            ts_padding1: 0,
            ts_esp1: VirtAddr(0),
            ts_ss1: 0,
            ts_padding2: 0,
            ts_esp2: VirtAddr(0),
            ts_ss2: 0,
            ts_padding3: 0,
            ts_cr3: PhysAddr(0),
            ts_eip: VirtAddr(0),
            ts_eflags: 0,
            ts_eax: 0,
            ts_ecx: 0,
            ts_edx: 0,
            ts_ebx: 0,
            ts_esp: VirtAddr(0),
            ts_ebp: VirtAddr(0),
            ts_esi: 0,
            ts_edi: 0,
            ts_es: 0,
            ts_padding4: 0,
            ts_cs: 0,
            ts_padding5: 0,
            ts_ss: 0,
            ts_padding6: 0,
            ts_ds: 0,
            ts_padding7: 0,
            ts_fs: 0,
            ts_padding8: 0,
            ts_gs: 0,
            ts_padding9: 0,
            ts_ldt: 0,
            ts_padding10: 0,
            ts_t: 0,
            ts_iomb: 0,
        }
    }

    pub(crate) fn set_kernel_stack(&mut self, esp0: VirtAddr, ss0: u16, iomb: u16) {
        self.ts_esp0 = esp0;
        self.ts_ss0 = ss0;
        self.ts_iomb = iomb;
    }
}

/// A pointer to a descriptor table in the format 'lgdt'/'lidt' expect.
#[derive(Debug, Clone, Copy)]
#[repr(C, packed)]
pub(crate) struct DescriptorTablePointer {
    pub limit: u16,
    pub base: u32,
}

/// Install a TSS descriptor at `selector`.
pub(crate) fn set_tss(selector: u16, ts: &'static TaskState) {
    let mut gdt = GDT.lock();
    gdt[(selector >> 3) as usize] = SegDesc::tss(
        ts as *const TaskState as u32,
        (mem::size_of::<TaskState>() - 1) as u32,
    );
}

/// Load the GDT and segment descriptors.
pub(crate) fn init_percpu() {
    let gdt = GDT.lock();
    let gdt_pointer = DescriptorTablePointer {
        limit: (mem::size_of::<GlobalDescriptorTable>() - 1) as u16,
        base: gdt.as_ptr() as u32,
    };
    x86::lgdt(&gdt_pointer);
    drop(gdt);

    unsafe {
        // The kernel never uses GS or FS, so we leave those set to
        // the user data segment.
        asm!("movw {0:x}, %gs", in(reg) GD_UD | 3, options(nostack, preserves_flags, att_syntax));
        asm!("movw {0:x}, %fs", in(reg) GD_UD | 3, options(nostack, preserves_flags, att_syntax));

        // The kernel does use ES, DS, and SS.  We'll change between
        // the kernel and user data segments as needed.
        asm!("movw {0:x}, %es", in(reg) GD_KD, options(nostack, preserves_flags, att_syntax));
        asm!("movw {0:x}, %ds", in(reg) GD_KD, options(nostack, preserves_flags, att_syntax));
        asm!("movw {0:x}, %ss", in(reg) GD_KD, options(nostack, preserves_flags, att_syntax));

        // Load the kernel text segment into CS with a far return.
        asm!(
            "pushl ${cs}",
            "leal 2f, {tmp}",
            "pushl {tmp}",
            "lret",
            "2:",
            cs = const GD_KT as u32,
            tmp = out(reg) _,
            options(att_syntax),
        );
    }

    // For good measure, clear the local descriptor table (LDT),
    // since we don't use it.
    x86::lldt(0);
}

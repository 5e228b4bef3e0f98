// IDT and TSS bring-up, trap frame marshalling, per-trap dispatch
// policy, and the page-fault path that synthesises user trap frames on
// the exception stack.

use crate::constants::*;
use crate::env::{self, EnvId, EnvStatus};
use crate::gdt::consts::*;
use crate::gdt::TaskState;
use crate::pmap::VirtAddr;
use crate::{cpu, gdt, kclock, monitor, picirq, sched, syscall, x86};
use consts::*;
use core::mem;
use spin::{Mutex, MutexGuard};

static IDT: Mutex<InterruptDescriptorTable> =
    Mutex::new(InterruptDescriptorTable([GateDesc::empty(); 256]));

// The last frame that really arrived from hardware, so
// print_trapframe can tell whether cr2 is still meaningful.
static LAST_TF: Mutex<Option<Trapframe>> = Mutex::new(None);

extern "C" {
    static vectors: [u32; 256];
}

pub(crate) mod consts {
    // Trap numbers defined by the processor:
    pub(crate) const T_DIVIDE: u32 = 0; // divide error
    pub(crate) const T_DEBUG: u32 = 1; // debug exception
    pub(crate) const T_NMI: u32 = 2; // non-maskable interrupt
    pub(crate) const T_BRKPT: u32 = 3; // breakpoint
    pub(crate) const T_OFLOW: u32 = 4; // overflow
    pub(crate) const T_BOUND: u32 = 5; // bounds check
    pub(crate) const T_ILLOP: u32 = 6; // illegal opcode
    pub(crate) const T_DEVICE: u32 = 7; // device not available
    pub(crate) const T_DBLFLT: u32 = 8; // double fault
    pub(crate) const T_TSS: u32 = 10; // invalid task switch segment
    pub(crate) const T_SEGNP: u32 = 11; // segment not present
    pub(crate) const T_STACK: u32 = 12; // stack exception
    pub(crate) const T_GPFLT: u32 = 13; // general protection fault
    pub(crate) const T_PGFLT: u32 = 14; // page fault
    pub(crate) const T_FPERR: u32 = 16; // floating point error
    pub(crate) const T_ALIGN: u32 = 17; // alignment check
    pub(crate) const T_MCHK: u32 = 18; // machine check
    pub(crate) const T_SIMDERR: u32 = 19; // SIMD floating point error

    // Chosen with care not to overlap processor-defined exceptions or
    // interrupt vectors.
    pub(crate) const T_SYSCALL: u32 = 48; // system call

    // System segment type bits
    pub(crate) const STS_IG32: u8 = 0xe; // 32-bit interrupt gate
    pub(crate) const STS_TG32: u8 = 0xf; // 32-bit trap gate

    // Hardware IRQs arrive as IRQ_OFFSET + irq.
    pub(crate) const IRQ_OFFSET: u8 = 32;

    pub(crate) const IRQ_TIMER: u8 = 0;
    pub(crate) const IRQ_KBD: u8 = 1;
    pub(crate) const IRQ_SERIAL: u8 = 4;
    pub(crate) const IRQ_SPURIOUS: u8 = 7;
    pub(crate) const IRQ_CLOCK: u8 = 8; // RTC periodic interrupt
    pub(crate) const IRQ_IDE: u8 = 14;
}

#[repr(align(4096))]
struct InterruptDescriptorTable([GateDesc; 256]);

#[derive(Clone, Copy)]
#[repr(C, align(8))]
struct GateDesc {
    offsetl: u16,
    selector: u16,
    count: u8,
    typ: u8,
    offseth: u16,
}

impl GateDesc {
    const fn empty() -> GateDesc {
        GateDesc {
            offsetl: 0,
            selector: 0,
            count: 0,
            typ: 0,
            offseth: 0,
        }
    }

    /// An interrupt/trap gate. istrap selects a trap gate, which
    /// leaves IF alone; every gate here is an interrupt gate so the
    /// handler runs with interrupts off. dpl is the privilege required
    /// to reach the gate with an explicit int instruction.
    fn new(istrap: bool, sel: u16, off: u32, dpl: u8) -> GateDesc {
        let typ = if istrap { STS_TG32 } else { STS_IG32 };
        GateDesc {
            offsetl: (off & 0x0000ffff) as u16,
            selector: sel,
            count: 0,
            typ: typ | (dpl << 5) | (1 << 7), // typ | dpl | present
            offseth: (off >> 16) as u16,
        }
    }
}

/// Registers as pushed by pushal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct PushRegs {
    pub reg_edi: u32,
    pub reg_esi: u32,
    pub reg_ebp: u32,
    pub reg_oesp: u32, // useless
    pub reg_ebx: u32,
    pub reg_edx: u32,
    pub reg_ecx: u32,
    pub reg_eax: u32,
}

impl PushRegs {
    pub(crate) const fn zeroed() -> PushRegs {
        PushRegs {
            reg_edi: 0,
            reg_esi: 0,
            reg_ebp: 0,
            reg_oesp: 0,
            reg_ebx: 0,
            reg_edx: 0,
            reg_ecx: 0,
            reg_eax: 0,
        }
    }
}

/// The exact frame the trap entry stub builds and the
/// return-from-trap sequence consumes; field order is the on-stack
/// layout and may not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct Trapframe {
    pub tf_regs: PushRegs,
    pub tf_es: u16,
    pub tf_padding1: u16,
    pub tf_ds: u16,
    pub tf_padding2: u16,
    pub tf_trapno: u32,
    // below here defined by x86 hardware
    pub tf_err: u32,
    pub tf_eip: VirtAddr,
    pub tf_cs: u16,
    pub tf_padding3: u16,
    pub tf_eflags: u32,
    // below here only when crossing rings, e.g. user to kernel
    pub tf_esp: VirtAddr,
    pub tf_ss: u16,
    pub tf_padding4: u16,
}

impl Trapframe {
    pub(crate) const fn zeroed() -> Trapframe {
        Trapframe {
            tf_regs: PushRegs::zeroed(),
            tf_es: 0,
            tf_padding1: 0,
            tf_ds: 0,
            tf_padding2: 0,
            tf_trapno: 0,
            tf_err: 0,
            tf_eip: VirtAddr(0),
            tf_cs: 0,
            tf_padding3: 0,
            tf_eflags: 0,
            tf_esp: VirtAddr(0),
            tf_ss: 0,
            tf_padding4: 0,
        }
    }

    pub(crate) fn set_entry_point(&mut self, va: VirtAddr) {
        self.tf_eip = va;
    }

    fn from_user_mode(&self) -> bool {
        self.tf_cs & 3 == 3
    }
}

const _: () = assert!(mem::size_of::<Trapframe>() == 68);

/// The frame pushed onto the user exception stack for a page-fault
/// upcall. Written by the kernel, consumed by the user-mode entry in
/// pfentry.S; layout is part of the ABI.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct UTrapframe {
    pub utf_fault_va: VirtAddr,
    pub utf_err: u32,
    pub utf_regs: PushRegs,
    pub utf_eip: VirtAddr,
    pub utf_eflags: u32,
    pub utf_esp: VirtAddr,
}

const _: () = assert!(mem::size_of::<UTrapframe>() == 52);
const _: () = assert!(mem::offset_of!(UTrapframe, utf_eip) == 0x28);
const _: () = assert!(mem::offset_of!(UTrapframe, utf_esp) == 0x30);

/// Build the IDT: an interrupt gate per exception vector and hardware
/// IRQ, all targeting the stubs from vectors.S in the kernel code
/// segment. Only the breakpoint and system call gates open to ring 3.
pub unsafe fn trap_init() {
    let vs = &vectors;
    let mut idt = IDT.lock();

    for vector in 0..=19 {
        idt.0[vector] = GateDesc::new(false, GD_KT, vs[vector], 0);
    }
    idt.0[T_BRKPT as usize] = GateDesc::new(false, GD_KT, vs[T_BRKPT as usize], 3);

    for irq in 0..16 {
        let vector = IRQ_OFFSET as usize + irq;
        idt.0[vector] = GateDesc::new(false, GD_KT, vs[vector], 0);
    }

    idt.0[T_SYSCALL as usize] = GateDesc::new(false, GD_KT, vs[T_SYSCALL as usize], 3);

    drop(idt);

    trap_init_percpu();
}

/// Initialize and load the per-CPU TSS and IDT.
pub(crate) unsafe fn trap_init_percpu() {
    // A TSS so that we get the right stack when we trap from ring 3
    // to ring 0.
    let cpu = cpu::this_cpu_mut();
    let selector = GD_TSS0 + ((cpu.cpu_id as u16) << 3);

    let esp0 = VirtAddr(KSTACKTOP - (KSTKSIZE + KSTKGAP) * (cpu.cpu_id as u32));
    let iomb = mem::size_of::<TaskState>() as u16;
    let ts = cpu.init_ts(esp0, GD_KD, iomb);

    gdt::set_tss(selector, ts);

    // Like other selectors, the bottom three bits are special; leave
    // them 0.
    x86::ltr(selector);

    let idt = IDT.lock();
    let idt_pointer = gdt::DescriptorTablePointer {
        limit: (mem::size_of::<InterruptDescriptorTable>() - 1) as u16,
        base: &*idt as *const InterruptDescriptorTable as u32,
    };
    x86::lidt(&idt_pointer);
}

fn trapname(trapno: u32) -> &'static str {
    match trapno {
        T_DIVIDE => "Divide error",
        T_DEBUG => "Debug",
        T_NMI => "Non-Maskable Interrupt",
        T_BRKPT => "Breakpoint",
        T_OFLOW => "Overflow",
        T_BOUND => "BOUND Range Exceeded",
        T_ILLOP => "Invalid Opcode",
        T_DEVICE => "Device Not Available",
        T_DBLFLT => "Double Fault",
        T_TSS => "Invalid TSS",
        T_SEGNP => "Segment Not Present",
        T_STACK => "Stack Fault",
        T_GPFLT => "General Protection",
        T_PGFLT => "Page Fault",
        T_FPERR => "x87 FPU Floating-Point Error",
        T_ALIGN => "Alignment Check",
        T_MCHK => "Machine-Check",
        T_SIMDERR => "SIMD Floating-Point Exception",
        T_SYSCALL => "System call",
        _ if trapno >= IRQ_OFFSET as u32 && trapno < IRQ_OFFSET as u32 + 16 => {
            "Hardware Interrupt"
        }
        _ => "(unknown trap)",
    }
}

pub(crate) fn print_trapframe(tf: &Trapframe) {
    crate::println!("TRAP frame at {:p}", tf as *const Trapframe);
    print_regs(&tf.tf_regs);
    crate::println!("  es    0x----{:04x}", tf.tf_es);
    crate::println!("  ds    0x----{:04x}", tf.tf_ds);
    crate::println!("  trap  0x{:08x} {}", tf.tf_trapno, trapname(tf.tf_trapno));
    // If this trap was a page fault that just happened (so cr2 is
    // meaningful), print the faulting linear address.
    if LAST_TF.lock().as_ref() == Some(tf) && tf.tf_trapno == T_PGFLT {
        crate::println!("  cr2   0x{:08x}", x86::rcr2().0);
    }
    crate::print!("  err   0x{:08x}", tf.tf_err);
    // For page faults, decode the fault error code:
    // user/kernel mode, write/read access, protection/not-present.
    if tf.tf_trapno == T_PGFLT {
        crate::println!(
            " [{}, {}, {}]",
            if tf.tf_err & FEC_U != 0 { "user" } else { "kernel" },
            if tf.tf_err & FEC_WR != 0 { "write" } else { "read" },
            if tf.tf_err & FEC_PR != 0 {
                "protection"
            } else {
                "not-present"
            }
        );
    } else {
        crate::println!();
    }
    crate::println!("  eip   0x{:08x}", tf.tf_eip.0);
    crate::println!("  cs    0x----{:04x}", tf.tf_cs);
    crate::println!("  flags 0x{:08x}", tf.tf_eflags);
    if tf.from_user_mode() {
        crate::println!("  esp   0x{:08x}", tf.tf_esp.0);
        crate::println!("  ss    0x----{:04x}", tf.tf_ss);
    }
}

fn print_regs(regs: &PushRegs) {
    crate::println!("  edi   0x{:08x}", regs.reg_edi);
    crate::println!("  esi   0x{:08x}", regs.reg_esi);
    crate::println!("  ebp   0x{:08x}", regs.reg_ebp);
    crate::println!("  oesp  0x{:08x}", regs.reg_oesp);
    crate::println!("  ebx   0x{:08x}", regs.reg_ebx);
    crate::println!("  edx   0x{:08x}", regs.reg_edx);
    crate::println!("  ecx   0x{:08x}", regs.reg_ecx);
    crate::println!("  eax   0x{:08x}", regs.reg_eax);
}

fn trap_dispatch(cur: EnvId) {
    let tf = *env::env_table().get(cur).tf();
    let trapno = tf.tf_trapno;

    // Page faults: the one arm that may re-enter user mode on the
    // exception stack. Yields afterwards (page_fault_handler only
    // returns by diverging).
    if trapno == T_PGFLT {
        page_fault_handler(cur);
    }

    // System calls: arguments arrive in eax, edx, ecx, ebx, edi, esi;
    // the result goes back in the saved eax.
    if trapno == T_SYSCALL {
        let ret = syscall::syscall(
            tf.tf_regs.reg_eax,
            tf.tf_regs.reg_edx,
            tf.tf_regs.reg_ecx,
            tf.tf_regs.reg_ebx,
            tf.tf_regs.reg_edi,
            tf.tf_regs.reg_esi,
        );
        env::env_table().get_mut(cur).tf_mut().tf_regs.reg_eax = ret as u32;
        sched::sched_yield();
    }

    // Breakpoint drops into the monitor; returning resumes the
    // environment.
    if trapno == T_BRKPT {
        monitor::monitor(Some(&tf));
        return;
    }

    // The hardware sometimes raises spurious interrupts because of
    // noise on the IRQ line. Ignore them.
    if trapno == (IRQ_OFFSET + IRQ_SPURIOUS) as u32 {
        log::warn!("spurious interrupt on irq 7");
        print_trapframe(&tf);
        return;
    }

    // The RTC clock tick: acknowledge the RTC, EOI the PIC, and give
    // the CPU to the next environment.
    if trapno == (IRQ_OFFSET + IRQ_CLOCK) as u32 {
        kclock::rtc_check_status();
        picirq::pic_send_eoi(IRQ_CLOCK);
        sched::sched_yield();
    }

    // Unexpected trap: the user process or the kernel has a bug.
    print_trapframe(&tf);
    if !tf.from_user_mode() {
        panic!("unhandled trap in kernel");
    }
    env::env_destroy(cur, env::env_table());
    unreachable!("destroyed the faulting current environment");
}

#[no_mangle]
extern "C" fn trap(tf_ptr: *mut Trapframe) -> ! {
    // The environment may have set DF; everything here relies on it
    // being clear.
    x86::cld();

    // Interrupts must be off in the kernel. If this fires, do NOT
    // be tempted to fix it by inserting a cli in the interrupt path.
    assert_eq!(
        x86::read_eflags() & FL_IF,
        0,
        "interrupts enabled on kernel entry"
    );

    let mut frame = unsafe { *tf_ptr };
    if !frame.from_user_mode() {
        // A same-ring trap pushes no esp/ss. Complete the frame so a
        // later resume of a kernel-space environment lands on the
        // stack it was interrupted on.
        frame.tf_esp = VirtAddr(unsafe { core::ptr::addr_of!((*tf_ptr).tf_esp) } as u32);
        frame.tf_ss = GD_KD;
    }
    let tf = &frame;
    log::trace!("trap {} from eip {:08x}", tf.tf_trapno, tf.tf_eip.0);

    let cur = cpu::this_cpu()
        .cur_env_id()
        .expect("trap with no current environment");

    {
        let mut table = env::env_table();

        // Garbage collect the current environment if it was marked
        // Dying while running here.
        if table.get(cur).is_dying() {
            unsafe { table.env_free(cur) };
            cpu::this_cpu_mut().unset_env();
            drop(table);
            sched::sched_yield();
        }

        // Copy the frame off the stack into the environment, so that
        // running the environment restarts at the trap point. From
        // here on the stack-resident frame is dead: the saved copy is
        // the single source of truth.
        table.get_mut(cur).set_tf(tf);
    }

    *LAST_TF.lock() = Some(*tf);

    trap_dispatch(cur);

    // No other environment was scheduled, so return to the current
    // one if doing so makes sense.
    let table = env::env_table();
    if table.get(cur).status() == EnvStatus::Running {
        env::env_run(cur, table);
    } else {
        drop(table);
        sched::sched_yield();
    }
}

/// Where the next user trap frame starts for a fault whose trap-time
/// stack pointer is `sp`. If sp already lies inside the
/// exception-stack page the fault is recursive and the frame goes
/// below it, keeping the one-word scratch hole the upcall's return
/// sequence needs; a fresh fault starts just below UXSTACKTOP (also
/// with the hole; the word above is free either way). Returns None
/// when the frame would leave the single exception-stack page, which
/// destroys the environment as overflow.
pub(crate) fn uxstack_frame_top(sp: u32) -> Option<u32> {
    let base = if sp >= UXSTACKTOP - PGSIZE && sp < UXSTACKTOP {
        sp
    } else {
        UXSTACKTOP
    };
    let new_sp = base - 4 - mem::size_of::<UTrapframe>() as u32;

    if new_sp < UXSTACKTOP - PGSIZE {
        None
    } else {
        Some(new_sp)
    }
}

/// The page fault arm. Kernel-mode faults are kernel bugs and panic.
/// A user fault with no registered upcall destroys the environment; an
/// upcall gets a UTrapframe synthesised on the user exception stack
/// and execution resumes at the upcall with esp at the new frame.
fn page_fault_handler(cur: EnvId) -> ! {
    let fault_va = x86::rcr2();

    let mut table = env::env_table();
    let tf = *table.get(cur).tf();

    if !tf.from_user_mode() {
        panic!(
            "kernel-mode page fault at va {:08x}, eip {:08x}",
            fault_va.0, tf.tf_eip.0
        );
    }

    let upcall = table.get(cur).pgfault_upcall();
    if upcall.0 == 0 {
        crate::println!(
            "[{:08x}] user fault va {:08x} ip {:08x}",
            cur,
            fault_va.0,
            tf.tf_eip.0
        );
        print_trapframe(&tf);
        env::env_destroy(cur, table);
        unreachable!()
    }

    let sp = tf.tf_esp.0;
    let Some(new_sp) = uxstack_frame_top(sp) else {
        crate::println!(
            "[{:08x}] user exception stack overflow, esp {:08x}",
            cur,
            sp
        );
        env::env_destroy(cur, table);
        unreachable!()
    };

    // The frame plus the scratch word must be writable by the
    // environment.
    table = env::user_mem_assert(
        table,
        cur,
        VirtAddr(new_sp),
        4 + mem::size_of::<UTrapframe>(),
        PteFlags::W,
    );

    // Write the frame through the kernel alias of the exception-stack
    // page; the environment's address space is still loaded but the
    // alias works regardless of the user mapping's permissions.
    let e = table.get_mut(cur);
    let page_pa = e
        .pgdir()
        .convert_to_pa(VirtAddr(UXSTACKTOP - PGSIZE))
        .expect("exception stack vanished");
    let offset = new_sp - (UXSTACKTOP - PGSIZE);
    let utf = unsafe { &mut *((page_pa.to_va() + offset).as_mut_ptr::<UTrapframe>()) };

    utf.utf_fault_va = fault_va;
    utf.utf_err = tf.tf_err;
    utf.utf_regs = tf.tf_regs;
    utf.utf_eip = tf.tf_eip;
    utf.utf_eflags = tf.tf_eflags;
    utf.utf_esp = tf.tf_esp;

    // Re-enter user mode at the upcall, on the exception stack.
    let tf = e.tf_mut();
    tf.tf_eip = upcall;
    tf.tf_esp = VirtAddr(new_sp);
    env::env_run(cur, table);
}

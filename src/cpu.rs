// Per-CPU state: the environment a CPU is running and its task state
// segment. Only the boot CPU is brought up, but the data layout keeps
// one slot per CPU so the Dying-while-Running handshake and per-CPU
// TSS selectors stay meaningful.

use crate::env::EnvId;
use crate::gdt::TaskState;
use crate::pmap::VirtAddr;
use core::ptr;

pub(crate) const MAX_NUM_CPU: usize = 8;

pub(crate) struct Cpu {
    pub(crate) cpu_id: u8,
    cpu_env: Option<EnvId>,
    cpu_ts: TaskState,
}

impl Cpu {
    const fn new(cpu_id: u8) -> Cpu {
        Cpu {
            cpu_id,
            cpu_env: None,
            cpu_ts: TaskState::new(),
        }
    }

    pub(crate) fn cur_env_id(&self) -> Option<EnvId> {
        self.cpu_env
    }

    pub(crate) fn set_env(&mut self, id: EnvId) {
        self.cpu_env = Some(id);
    }

    pub(crate) fn unset_env(&mut self) {
        self.cpu_env = None;
    }

    /// Record the ring-0 stack in this CPU's TSS and hand out a
    /// reference for the GDT descriptor.
    pub(crate) fn init_ts(&mut self, esp0: VirtAddr, ss0: u16, iomb: u16) -> &'static TaskState {
        self.cpu_ts.set_kernel_stack(esp0, ss0, iomb);
        unsafe { &*(&self.cpu_ts as *const TaskState) }
    }
}

static mut CPUS: [Cpu; MAX_NUM_CPU] = [
    Cpu::new(0),
    Cpu::new(1),
    Cpu::new(2),
    Cpu::new(3),
    Cpu::new(4),
    Cpu::new(5),
    Cpu::new(6),
    Cpu::new(7),
];

// Uniprocessor bring-up: we always run on the boot CPU. Interrupts are
// disabled whenever the kernel touches this state, so the accessors
// hand out plain references.
pub(crate) fn this_cpu() -> &'static Cpu {
    unsafe { &*ptr::addr_of!(CPUS[0]) }
}

pub(crate) fn this_cpu_mut() -> &'static mut Cpu {
    unsafe { &mut *ptr::addr_of_mut!(CPUS[0]) }
}

// The environment manager: allocation, generation-tagged identity,
// lifecycle, address-space construction and teardown, and the context
// switch into user (or kernel-space) code.

use crate::constants::*;
use crate::elf::{self, ElfParser};
use crate::error::{KernErr, KernResult};
use crate::gdt::consts::*;
use crate::pmap::{self, EnvPgdir, VirtAddr};
use crate::trap::Trapframe;
use crate::{cpu, gdt, kdebug, sched, x86};
use core::arch::asm;
use core::fmt;
use core::mem::offset_of;
use spin::{Mutex, MutexGuard};

pub(crate) const LOG2NENV: u32 = 10;
pub(crate) const NENV: usize = 1 << LOG2NENV;

// Generation field shift; must be >= LOG2NENV.
const ENVGENSHIFT: u32 = 12;

// Kernel-space environments get their stacks carved top-down from this
// reserved region, two pages at a time. The region is never given
// back: destroying a kernel-space environment leaks its stack (see
// DESIGN.md).
const KSPACE_STACK_TOP: u32 = KERN_BASE + 0x0021_0000;
const KSPACE_STACK_SIZE: u32 = 2 * PGSIZE;

/// A generation-tagged environment handle. The low LOG2NENV bits index
/// a slot; the bits from ENVGENSHIFT up count reuses of that slot, so
/// a stale handle never resolves after its slot is recycled. Handle 0
/// names the calling environment. Handles are always positive as
/// signed 32-bit values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvId(pub u32);

impl EnvId {
    pub(crate) fn slot(self) -> usize {
        (self.0 as usize) & (NENV - 1)
    }
}

impl fmt::LowerHex for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// What kind of environment to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvKind {
    User,
    /// A user environment holding the I/O privilege bits in its saved
    /// eflags.
    FileServer,
    /// Runs in ring 0 on a carved kernel stack.
    Kspace,
}

/// The stored type tag; the kernel-space variant owns its stack top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EnvType {
    User,
    FileServer,
    Kspace { stack_top: VirtAddr },
}

impl EnvType {
    fn is_kspace(self) -> bool {
        matches!(self, EnvType::Kspace { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvStatus {
    Free,
    Dying,
    Runnable,
    Running,
    NotRunnable,
}

#[repr(C)]
pub(crate) struct Env {
    env_tf: Trapframe,          // saved registers
    env_link: Option<u32>,      // next slot on the free list
    env_id: EnvId,              // unique environment identifier
    env_parent_id: EnvId,       // env_id of this env's parent
    env_type: EnvType,
    env_status: EnvStatus,
    env_runs: u32,              // number of times this env has run
    env_pgdir: EnvPgdir,        // kernel virtual address of the page dir
    env_pgfault_upcall: VirtAddr, // page fault upcall entry, 0 if none

    // IPC state.
    env_ipc_recving: bool,      // blocked in sys_ipc_recv
    env_ipc_dstva: VirtAddr,    // where a sent page should go
    env_ipc_value: u32,
    env_ipc_from: EnvId,
    env_ipc_perm: PteFlags,
}

impl Env {
    const EMPTY: Env = Env {
        env_tf: Trapframe::zeroed(),
        env_link: None,
        env_id: EnvId(0),
        env_parent_id: EnvId(0),
        env_type: EnvType::User,
        env_status: EnvStatus::Free,
        env_runs: 0,
        env_pgdir: EnvPgdir::NULL,
        env_pgfault_upcall: VirtAddr(0),
        env_ipc_recving: false,
        env_ipc_dstva: VirtAddr(0),
        env_ipc_value: 0,
        env_ipc_from: EnvId(0),
        env_ipc_perm: PteFlags::empty(),
    };

    pub(crate) fn id(&self) -> EnvId {
        self.env_id
    }

    pub(crate) fn status(&self) -> EnvStatus {
        self.env_status
    }

    pub(crate) fn set_status(&mut self, status: EnvStatus) {
        self.env_status = status;
    }

    pub(crate) fn is_running(&self) -> bool {
        self.env_status == EnvStatus::Running
    }

    pub(crate) fn is_dying(&self) -> bool {
        self.env_status == EnvStatus::Dying
    }

    pub(crate) fn tf(&self) -> &Trapframe {
        &self.env_tf
    }

    pub(crate) fn tf_mut(&mut self) -> &mut Trapframe {
        &mut self.env_tf
    }

    pub(crate) fn set_tf(&mut self, tf: &Trapframe) {
        self.env_tf = tf.clone();
    }

    pub(crate) fn pgdir(&mut self) -> &mut EnvPgdir {
        &mut self.env_pgdir
    }

    pub(crate) fn pgfault_upcall(&self) -> VirtAddr {
        self.env_pgfault_upcall
    }

    pub(crate) fn set_pgfault_upcall(&mut self, va: VirtAddr) {
        self.env_pgfault_upcall = va;
    }

    pub(crate) fn ipc_recving(&self) -> bool {
        self.env_ipc_recving
    }

    pub(crate) fn ipc_start_recv(&mut self, dstva: VirtAddr) {
        self.env_ipc_recving = true;
        self.env_ipc_dstva = dstva;
    }

    pub(crate) fn ipc_dstva(&self) -> VirtAddr {
        self.env_ipc_dstva
    }

    pub(crate) fn ipc_complete(&mut self, from: EnvId, value: u32, perm: PteFlags) {
        self.env_ipc_recving = false;
        self.env_ipc_from = from;
        self.env_ipc_value = value;
        self.env_ipc_perm = perm;
    }

    /// Allocate a physical page and map it user+write at the
    /// page-aligned `va`, returning the kernel alias for the caller to
    /// write through. Panics on failure: image loading is a boot-time
    /// operation where running out of memory is fatal.
    fn add_page(&mut self, va: VirtAddr) -> *mut u8 {
        assert!(va.is_page_aligned(), "add_page: {:#x} not page aligned", va.0);
        let mut allocator = pmap::page_allocator();
        let pa = self
            .env_pgdir
            .alloc_page_at(va, PteFlags::U | PteFlags::W, &mut allocator)
            .expect("failed to allocate a page for an environment");
        pa.to_va().as_mut_ptr::<u8>()
    }

    /// Load the program image: every LOAD segment is copied byte-wise
    /// into freshly mapped pages, honouring the segment's intra-page
    /// misalignment, with the memsz tail beyond filesz zero-filled.
    /// Maps one page of initial stack and leaves the entry point in
    /// the saved frame. Only called during kernel initialization,
    /// before the first environment runs.
    unsafe fn load_icode(&mut self, binary: *const u8, _size: usize) {
        let parser = ElfParser::new(binary).expect("ELF image does not have valid ELF_MAGIC");

        for ph in parser.program_headers() {
            if ph.p_type != elf::ELF_PROG_LOAD {
                continue;
            }

            let mut src = binary.add(ph.p_offset as usize);
            let mut dst_uva = VirtAddr(ph.p_va);
            let filesz = ph.p_filesz as usize;
            let memsz = ph.p_memsz as usize;

            // The first page is allocated rounded down and written
            // from the intra-page offset.
            let off = dst_uva.0 % PGSIZE;
            let mut dst_kva = self.add_page(dst_uva.round_down(PGSIZE));
            let mut page_end = dst_kva.add(PGSIZE as usize);
            dst_kva = dst_kva.add(off as usize);

            let mut count = 0;
            while count < memsz {
                if dst_kva == page_end {
                    dst_kva = self.add_page(dst_uva);
                    page_end = dst_kva.add(PGSIZE as usize);
                }

                *dst_kva = if count < filesz { *src } else { 0 };

                src = src.add(1);
                dst_kva = dst_kva.add(1);
                dst_uva += 1;
                count += 1;
            }
        }

        self.env_tf.set_entry_point(parser.entry_point());

        if self.env_type.is_kspace() {
            self.bind_functions(&parser);
        }

        // Now map one page for the program's initial stack at
        // USTACKTOP - PGSIZE.
        self.add_page(VirtAddr(USTACKTOP - PGSIZE));
    }

    /// For kernel-space images: walk the symbol tables and bind every
    /// global STT_OBJECT symbol whose name matches a registered kernel
    /// function, writing the function's address through the image's
    /// mapping of the symbol.
    unsafe fn bind_functions(&mut self, parser: &ElfParser) {
        let sections = parser.section_headers();
        for sh in sections {
            if sh.sh_type != elf::ELF_SHT_SYMTAB {
                continue;
            }
            let strtab = &sections[sh.sh_link as usize];

            for sym in parser.symbols(sh) {
                if sym.binding() != elf::ELF_STB_GLOBAL || sym.typ() != elf::ELF_STT_OBJECT {
                    continue;
                }

                let name = parser.symbol_name(strtab, sym.st_name);
                let Some(fun) = kdebug::find_function(name) else {
                    continue;
                };
                log::debug!("binding {} to {:08x}", name, fun.0);

                let sym_pa = self
                    .env_pgdir
                    .convert_to_pa(VirtAddr(sym.st_value))
                    .expect("kspace symbol not mapped");
                *sym_pa.to_va().as_mut_ptr::<u32>() = fun.0;
            }
        }
    }
}

pub(crate) struct EnvTable {
    envs: [Env; NENV],
    free_head: Option<u32>,
    kspace_esp: VirtAddr,
}

static ENV_TABLE: Mutex<EnvTable> = Mutex::new(EnvTable {
    envs: [Env::EMPTY; NENV],
    free_head: None,
    kspace_esp: VirtAddr(KSPACE_STACK_TOP),
});

pub(crate) fn env_table() -> MutexGuard<'static, EnvTable> {
    ENV_TABLE.lock()
}

impl EnvTable {
    /// The environment a (trusted) handle names. Panics on a handle
    /// the kernel did not just validate; user-supplied handles go
    /// through resolve().
    pub(crate) fn get(&self, id: EnvId) -> &Env {
        let e = &self.envs[id.slot()];
        assert!(e.env_status != EnvStatus::Free && e.env_id == id, "bad env handle");
        e
    }

    pub(crate) fn get_mut(&mut self, id: EnvId) -> &mut Env {
        let e = &mut self.envs[id.slot()];
        assert!(e.env_status != EnvStatus::Free && e.env_id == id, "bad env handle");
        e
    }

    /// Convert a handle to an environment. Handle 0 names the current
    /// environment; otherwise the slot's stored handle must equal the
    /// argument exactly, which catches handles whose slot has been
    /// recycled. With `check_perm`, the named environment must be the
    /// current one or an immediate child of it.
    pub(crate) fn resolve(&mut self, id: EnvId, check_perm: bool) -> KernResult<&mut Env> {
        let cur = cpu::this_cpu().cur_env_id();

        let id = if id.0 == 0 {
            cur.ok_or(KernErr::BadEnv)?
        } else {
            id
        };

        let e = &self.envs[id.slot()];
        if e.env_status == EnvStatus::Free || e.env_id != id {
            return Err(KernErr::BadEnv);
        }

        if check_perm {
            let cur = cur.ok_or(KernErr::BadEnv)?;
            if e.env_id != cur && e.env_parent_id != cur {
                return Err(KernErr::BadEnv);
            }
        }

        Ok(&mut self.envs[id.slot()])
    }

    /// Allocates and initializes a new environment: a slot popped off
    /// the free list, a fresh page directory sharing the kernel
    /// region, a bumped generation in the handle, and a zeroed
    /// register frame with the segment selectors and flags the
    /// environment's kind calls for.
    pub(crate) fn alloc(&mut self, parent: EnvId, kind: EnvKind) -> KernResult<EnvId> {
        let slot = self.free_head.ok_or(KernErr::NoFreeEnv)? as usize;

        let pgdir = pmap::env_setup_vm().ok_or(KernErr::NoMem)?;

        let env_type = match kind {
            EnvKind::User => EnvType::User,
            EnvKind::FileServer => EnvType::FileServer,
            EnvKind::Kspace => EnvType::Kspace {
                stack_top: self.carve_kspace_stack(),
            },
        };

        let cur_id = cpu::this_cpu().cur_env_id().map(|id| id.0).unwrap_or(0);

        let e = &mut self.envs[slot];

        // Bump the generation and keep the slot index. Handles must
        // stay positive as signed values; on wrap, restart at the
        // first positive generation.
        let mut generation = e.env_id.0.wrapping_add(1 << ENVGENSHIFT) & !((NENV as u32) - 1);
        if (generation as i32) <= 0 {
            generation = 1 << ENVGENSHIFT;
        }
        e.env_id = EnvId(generation | slot as u32);

        e.env_parent_id = parent;
        e.env_type = env_type;
        e.env_status = EnvStatus::Runnable;
        e.env_runs = 0;
        e.env_pgdir = pgdir;

        // Clear all saved register state so nothing leaks from a prior
        // occupant of this slot, then set up the segment registers.
        // The low 2 bits of each selector hold the requestor privilege
        // level: 3 for user mode, 0 for kernel mode.
        e.env_tf = Trapframe::zeroed();
        match env_type {
            EnvType::User | EnvType::FileServer => {
                e.env_tf.tf_ds = GD_UD | 3;
                e.env_tf.tf_es = GD_UD | 3;
                e.env_tf.tf_ss = GD_UD | 3;
                e.env_tf.tf_esp = VirtAddr(USTACKTOP);
                e.env_tf.tf_cs = GD_UT | 3;
            }
            EnvType::Kspace { stack_top } => {
                e.env_tf.tf_ds = GD_KD;
                e.env_tf.tf_es = GD_KD;
                e.env_tf.tf_ss = GD_KD;
                e.env_tf.tf_esp = stack_top;
                e.env_tf.tf_cs = GD_KT;
            }
        }
        e.env_tf.tf_eflags |= FL_IF;

        // The entry point is set by the image loader (or exofork's
        // frame copy).

        // No page fault handler until user code installs one, and not
        // receiving IPC.
        e.env_pgfault_upcall = VirtAddr(0);
        e.env_ipc_recving = false;

        // Commit the allocation.
        let id = e.env_id;
        self.free_head = e.env_link.take();

        crate::println!("[{:08x}] new env {:08x}", cur_id, id);
        Ok(id)
    }

    fn carve_kspace_stack(&mut self) -> VirtAddr {
        let top = self.kspace_esp;
        // TODO: reclaim these when a kernel-space environment dies; a
        // ring of per-slot stacks would do it.
        self.kspace_esp = top - KSPACE_STACK_SIZE;
        top
    }

    /// Allocate a new environment, load the ELF image into it, and
    /// set its type. Only called during kernel initialization, with
    /// parent handle 0.
    pub(crate) fn create(&mut self, binary: *const u8, size: usize, kind: EnvKind) -> EnvId {
        let id = self
            .alloc(EnvId(0), kind)
            .expect("env_create: cannot allocate at boot");

        let e = self.get_mut(id);
        // The file server gets the I/O privilege bits.
        if kind == EnvKind::FileServer {
            e.env_tf.tf_eflags |= FL_IOPL_MASK;
        }

        unsafe { e.load_icode(binary, size) };
        id
    }

    /// Free the environment's user address space and return its slot
    /// to the free list. Every present mapping strictly below UTOP is
    /// removed (dropping the page's reference), each page-table page
    /// and finally the directory page itself are decref'd.
    pub(crate) unsafe fn env_free(&mut self, id: EnvId) {
        let cur = cpu::this_cpu().cur_env_id();

        // If freeing the current environment, switch to the kernel
        // template first, in case the directory page gets reused.
        if cur == Some(id) {
            pmap::load_kern_pgdir();
        }

        // Note the environment's demise.
        crate::println!(
            "[{:08x}] free env {:08x}",
            cur.map(|c| c.0).unwrap_or(0),
            id
        );

        let e = &mut self.envs[id.slot()];
        let mut allocator = pmap::page_allocator();

        // Flush the user portion of the address space. The UVPT
        // self-reference lies above UTOP and must not be torn down
        // like a normal mapping; the directory is dropped explicitly
        // below.
        for pdeno in 0..pmap::pdx(VirtAddr(UTOP)) {
            if e.env_pgdir[pdeno].is_present() {
                e.env_pgdir.remove_pde(pdeno, &mut allocator);
            }
        }

        // Free the page directory itself.
        let pgdir_pa = e.env_pgdir.paddr();
        e.env_pgdir = EnvPgdir::NULL;
        allocator.decref(pgdir_pa);

        // Return the slot to the free list.
        e.env_status = EnvStatus::Free;
        e.env_link = self.free_head.replace(id.slot() as u32);
    }

    /// Verify the table's quiescent-point invariants: every occupied
    /// slot holds a positive handle indexing that slot and a page
    /// directory that maps itself at UVPT; the free list covers
    /// exactly the Free slots, each once.
    pub(crate) fn check_invariants(&self) {
        for (i, e) in self.envs.iter().enumerate() {
            if e.env_status == EnvStatus::Free {
                continue;
            }
            assert_eq!(e.env_id.slot(), i, "slot {} holds a foreign handle", i);
            assert!((e.env_id.0 as i32) > 0, "handle {:08x} is not positive", e.env_id);

            let pde = e.env_pgdir[pmap::pdx(VirtAddr(UVPT))];
            assert!(pde.is_present(), "env {:08x} lost its UVPT self-map", e.env_id);
            assert_eq!(pde.addr(), e.env_pgdir.paddr());
            assert!(pde.flags().contains(PteFlags::P | PteFlags::U));
        }

        let mut seen = [false; NENV];
        let mut on_list = 0;
        let mut link = self.free_head;
        while let Some(slot) = link {
            let slot = slot as usize;
            assert!(!seen[slot], "slot {} is on the free list twice", slot);
            seen[slot] = true;
            on_list += 1;
            link = self.envs[slot].env_link;
        }

        let free = self
            .envs
            .iter()
            .filter(|e| e.env_status == EnvStatus::Free)
            .count();
        assert_eq!(on_list, free, "free list does not cover the Free slots");
        for (i, e) in self.envs.iter().enumerate() {
            if e.env_status == EnvStatus::Free {
                assert!(seen[i], "free slot {} is missing from the free list", i);
            }
        }
    }

    /// The next Runnable environment in circular slot order, starting
    /// just after the one this CPU ran last. Falls back to a still
    /// Running current environment.
    pub(crate) fn find_runnable(&self, cur: Option<EnvId>) -> Option<EnvId> {
        let start = cur.map(|id| id.slot() + 1).unwrap_or(0);
        for i in 0..NENV {
            let e = &self.envs[(start + i) % NENV];
            if e.env_status == EnvStatus::Runnable {
                return Some(e.env_id);
            }
        }

        if let Some(id) = cur {
            if self.envs[id.slot()].env_status == EnvStatus::Running {
                return Some(id);
            }
        }

        None
    }
}

/// Mark every slot free, link the free list in array order (so the
/// first allocation returns slot 0), and load the per-CPU segment
/// state.
pub fn env_init() {
    let mut table = ENV_TABLE.lock();
    for i in (0..NENV).rev() {
        table.envs[i].env_id = EnvId(0);
        table.envs[i].env_status = EnvStatus::Free;
        table.envs[i].env_link = table.free_head.replace(i as u32);
    }
    drop(table);

    env_init_percpu();
}

/// Load GDT and segment descriptors.
fn env_init_percpu() {
    gdt::init_percpu();
}

/// Restore the register values in the Trapframe with the iret
/// instruction, leaving the kernel and starting execution at the
/// frame's saved eip. Used for ring-3 frames (iret pops esp/ss only on
/// a privilege change).
unsafe fn env_pop_tf(tf: *const Trapframe) -> ! {
    asm!(
        "movl {0}, %esp",
        "popal",
        "popl %es",
        "popl %ds",
        "addl $8, %esp", // skip tf_trapno and tf_err
        "iret",
        in(reg) tf,
        options(noreturn, att_syntax),
    );
}

/// The ring-0 variant: load seven general registers, push the saved
/// eip and eflags onto the frame's own stack, load eax, then pop flags
/// and return through the pushed eip.
unsafe fn env_pop_tf_kspace(tf: *const Trapframe) -> ! {
    asm!(
        "movl {ebx}(%eax), %ebx",
        "movl {ecx}(%eax), %ecx",
        "movl {edx}(%eax), %edx",
        "movl {esi}(%eax), %esi",
        "movl {edi}(%eax), %edi",
        "movl {ebp}(%eax), %ebp",
        "movl {esp}(%eax), %esp",
        "pushl {eip}(%eax)",
        "pushl {eflags}(%eax)",
        "movl {eax_}(%eax), %eax",
        "popfl",
        "ret",
        in("eax") tf,
        ebx = const offset_of!(Trapframe, tf_regs.reg_ebx),
        ecx = const offset_of!(Trapframe, tf_regs.reg_ecx),
        edx = const offset_of!(Trapframe, tf_regs.reg_edx),
        esi = const offset_of!(Trapframe, tf_regs.reg_esi),
        edi = const offset_of!(Trapframe, tf_regs.reg_edi),
        ebp = const offset_of!(Trapframe, tf_regs.reg_ebp),
        esp = const offset_of!(Trapframe, tf_esp),
        eip = const offset_of!(Trapframe, tf_eip),
        eflags = const offset_of!(Trapframe, tf_eflags),
        eax_ = const offset_of!(Trapframe, tf_regs.reg_eax),
        options(noreturn, att_syntax),
    );
}

/// Context switch to `id`: demote a preempted current environment to
/// Runnable, promote the target to Running, load its page directory,
/// and restore its saved frame. Consumes the table guard (the lock
/// must not be held across the return to user mode). Does not return.
pub(crate) fn env_run(id: EnvId, mut table: MutexGuard<EnvTable>) -> ! {
    if let Some(cur) = cpu::this_cpu().cur_env_id() {
        let cur = table.get_mut(cur);
        if cur.is_running() {
            cur.env_status = EnvStatus::Runnable;
        }
    }

    let e = table.get_mut(id);
    e.env_status = EnvStatus::Running;
    e.env_runs += 1;

    cpu::this_cpu_mut().set_env(id);

    // The address space must be switched strictly before the frame is
    // restored.
    x86::lcr3(e.env_pgdir.paddr());

    let tf = &e.env_tf as *const Trapframe;
    let is_kspace = e.env_type.is_kspace();
    drop(table);

    unsafe {
        if is_kspace {
            env_pop_tf_kspace(tf)
        } else {
            env_pop_tf(tf)
        }
    }
}

/// Destroy an environment. A victim Running on another CPU is only
/// marked Dying; that CPU reaps it at its next trap. Destroying the
/// current environment does not return.
pub(crate) fn env_destroy(id: EnvId, mut table: MutexGuard<EnvTable>) {
    let is_cur = cpu::this_cpu().cur_env_id() == Some(id);

    let e = table.get_mut(id);
    if e.is_running() && !is_cur {
        e.env_status = EnvStatus::Dying;
        return;
    }

    unsafe { table.env_free(id) };

    if is_cur {
        cpu::this_cpu_mut().unset_env();
        drop(table);
        sched::sched_yield();
    }
}

/// Check that environment `id` may access [va, va+len) with
/// permissions perm|PTE_U|PTE_P. On success the table guard is handed
/// back; on failure the environment is destroyed, which does not
/// return when it is the current one (its only caller).
pub(crate) fn user_mem_assert(
    mut table: MutexGuard<'static, EnvTable>,
    id: EnvId,
    va: VirtAddr,
    len: usize,
    perm: PteFlags,
) -> MutexGuard<'static, EnvTable> {
    let res = table
        .get_mut(id)
        .pgdir()
        .user_mem_check(va, len, perm | PteFlags::U | PteFlags::P);

    match res {
        Ok(()) => table,
        Err(addr) => {
            crate::println!(
                "[{:08x}] user_mem_check assertion failure for va {:08x}",
                id,
                addr.0
            );
            env_destroy(id, table);
            unreachable!("user_mem_assert on a non-current environment");
        }
    }
}

/// Service call for kernel-space environments, reached through a bound
/// function pointer: voluntary exit.
pub(crate) extern "C" fn kspace_exit() -> ! {
    let id = cpu::this_cpu()
        .cur_env_id()
        .expect("kspace_exit outside an environment");
    env_destroy(id, env_table());
    unreachable!()
}

/// Service call for kernel-space environments: console output.
pub(crate) extern "C" fn kspace_cputs(s: *const u8, len: u32) {
    let bytes = unsafe { core::slice::from_raw_parts(s, len as usize) };
    if let Ok(s) = core::str::from_utf8(bytes) {
        crate::print!("{}", s);
    }
}

// Keep the frame layout honest against the entry stubs.
const _: () = assert!(core::mem::size_of::<Trapframe>() == 68);

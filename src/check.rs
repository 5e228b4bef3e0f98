// In-kernel checks, in the spirit of the boot-time page checks: run
// by the check kernel (src/bin/check.rs) right after boot_init, before
// any real environment exists. Each check leaves the system in the
// state it found it.

use crate::constants::*;
use crate::elf::ELF_MAGIC;
use crate::env::{self, EnvId, EnvKind, EnvStatus};
use crate::error::KernErr;
use crate::pmap::{self, VirtAddr};
use crate::syscall::{self, consts::*};
use crate::{cpu, trap};
use alloc::vec::Vec;
use core::mem;

pub fn run_all() {
    check_env_handles();
    check_alloc_free_roundtrip();
    check_load_icode();
    check_user_mem_bounds();
    check_uxstack_placement();
    check_exofork_protocol();

    env::env_table().check_invariants();
    crate::println!("All checks passed.");
}

/// Handle generation: the very first allocation takes slot 0 with
/// generation 1; a freed slot comes back with the generation bumped
/// and the stale handle refuses to resolve.
fn check_env_handles() {
    let mut table = env::env_table();
    table.check_invariants();

    let id0 = table.alloc(EnvId(0), EnvKind::User).unwrap();
    assert_eq!(id0.0, (1 << 12) | 0);
    let id1 = table.alloc(EnvId(0), EnvKind::User).unwrap();
    assert_eq!(id1.0, (1 << 12) | 1);

    assert!(table.resolve(id0, false).is_ok());
    table.check_invariants();

    unsafe { table.env_free(id0) };
    assert_eq!(table.resolve(id0, false).err(), Some(KernErr::BadEnv));

    // The slot is reused under a new generation.
    let id0_again = table.alloc(EnvId(0), EnvKind::User).unwrap();
    assert_eq!(id0_again.0, (2 << 12) | 0);
    assert_eq!(table.resolve(id0, false).err(), Some(KernErr::BadEnv));

    unsafe {
        table.env_free(id0_again);
        table.env_free(id1);
    }
    table.check_invariants();

    crate::println!("check_env_handles: ok");
}

/// alloc then free is refcount-neutral: it returns exactly the pages
/// it took.
fn check_alloc_free_roundtrip() {
    let free_before = pmap::page_allocator().count_free();

    let mut table = env::env_table();
    let id = table.alloc(EnvId(0), EnvKind::User).unwrap();

    // Give it some address space so teardown has real work: a data
    // page (plus the page table backing it).
    {
        let e = table.get_mut(id);
        let mut allocator = pmap::page_allocator();
        e.pgdir()
            .alloc_page_at(VirtAddr(UTEXT), PteFlags::U | PteFlags::W, &mut allocator)
            .unwrap();
    }

    unsafe { table.env_free(id) };
    drop(table);

    assert_eq!(pmap::page_allocator().count_free(), free_before);

    crate::println!("check_alloc_free_roundtrip: ok");
}

fn push_u16(image: &mut Vec<u8>, x: u16) {
    image.extend_from_slice(&x.to_le_bytes());
}

fn push_u32(image: &mut Vec<u8>, x: u32) {
    image.extend_from_slice(&x.to_le_bytes());
}

/// A minimal 32-bit ELF executable image: header, LOAD program
/// headers, payload.
fn build_elf(entry: u32, segs: &[(u32, &[u8], u32)]) -> Vec<u8> {
    const EHSIZE: u32 = 52;
    const PHENTSIZE: u32 = 32;

    let mut image = Vec::new();

    push_u32(&mut image, ELF_MAGIC);
    image.extend_from_slice(&[1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0]); // ident tail
    push_u16(&mut image, 2); // ET_EXEC
    push_u16(&mut image, 3); // EM_386
    push_u32(&mut image, 1); // version
    push_u32(&mut image, entry);
    push_u32(&mut image, EHSIZE); // phoff
    push_u32(&mut image, 0); // shoff
    push_u32(&mut image, 0); // flags
    push_u16(&mut image, EHSIZE as u16);
    push_u16(&mut image, PHENTSIZE as u16);
    push_u16(&mut image, segs.len() as u16);
    push_u16(&mut image, 40); // shentsize
    push_u16(&mut image, 0); // shnum
    push_u16(&mut image, 0); // shstrndx

    let mut off = EHSIZE + PHENTSIZE * segs.len() as u32;
    for (va, data, memsz) in segs {
        push_u32(&mut image, 1); // PT_LOAD
        push_u32(&mut image, off);
        push_u32(&mut image, *va);
        push_u32(&mut image, *va);
        push_u32(&mut image, data.len() as u32);
        push_u32(&mut image, *memsz);
        push_u32(&mut image, 7); // rwx
        push_u32(&mut image, PGSIZE);
        off += data.len() as u32;
    }
    for (_, data, _) in segs {
        image.extend_from_slice(data);
    }

    image
}

/// Image loading honours intra-page misalignment and zero-fills the
/// bss tail, and the initial stack page appears below USTACKTOP.
fn check_load_icode() {
    // A segment starting 0x123 bytes into a page, 0x300 bytes of
    // payload, 0x500 bytes of memory image.
    let seg_va = UTEXT + 0x123;
    let payload = [0xaau8; 0x300];
    let image = build_elf(seg_va, &[(seg_va, &payload, 0x500)]);

    let mut table = env::env_table();
    let id = table.create(image.as_ptr(), image.len(), EnvKind::User);

    let e = table.get_mut(id);
    assert_eq!(e.tf().tf_eip, VirtAddr(seg_va));

    let byte_at = |e: &mut env::Env, va: u32| -> u8 {
        let pa = e
            .pgdir()
            .convert_to_pa(VirtAddr(va))
            .expect("image page not mapped");
        unsafe { *pa.to_va().as_ptr::<u8>() }
    };

    // Payload lands at the intra-page offset; the first allocated page
    // holds PGSIZE - 0x123 payload bytes from offset 0x123 on.
    assert_eq!(byte_at(e, seg_va), 0xaa);
    assert_eq!(byte_at(e, seg_va + 0x2ff), 0xaa);
    // The bss tail is zero-filled up to memsz.
    assert_eq!(byte_at(e, seg_va + 0x300), 0);
    assert_eq!(byte_at(e, seg_va + 0x4ff), 0);

    // One page of initial stack.
    let mut allocator = pmap::page_allocator();
    assert!(e
        .pgdir()
        .lookup(VirtAddr(USTACKTOP - PGSIZE), &mut allocator)
        .is_some());
    drop(allocator);

    unsafe { table.env_free(id) };

    crate::println!("check_load_icode: ok");
}

/// user_mem_check stops at unmapped pages, missing permissions and
/// ULIM.
fn check_user_mem_bounds() {
    let mut table = env::env_table();
    let id = table.alloc(EnvId(0), EnvKind::User).unwrap();

    {
        let e = table.get_mut(id);
        let mut allocator = pmap::page_allocator();
        e.pgdir()
            .alloc_page_at(VirtAddr(UTEXT), PteFlags::U | PteFlags::W, &mut allocator)
            .unwrap();
        drop(allocator);

        let user_rw = PteFlags::P | PteFlags::U | PteFlags::W;
        assert!(e.pgdir().user_mem_check(VirtAddr(UTEXT), 16, user_rw).is_ok());
        assert!(e
            .pgdir()
            .user_mem_check(VirtAddr(UTEXT + PGSIZE - 8), 16, user_rw)
            .is_err());
        assert_eq!(
            e.pgdir().user_mem_check(VirtAddr(ULIM), 16, user_rw),
            Err(VirtAddr(ULIM))
        );
    }

    unsafe { table.env_free(id) };

    crate::println!("check_user_mem_bounds: ok");
}

/// The exception-stack frame placement rules: a fresh fault starts
/// just below UXSTACKTOP, a nested fault lands 4 + sizeof(UTrapframe)
/// below the first frame, and the page bottom overflows.
fn check_uxstack_placement() {
    let frame = 4 + mem::size_of::<trap::UTrapframe>() as u32;

    let first = trap::uxstack_frame_top(USTACKTOP).unwrap();
    assert_eq!(first, UXSTACKTOP - frame);

    let second = trap::uxstack_frame_top(first).unwrap();
    assert_eq!(second, first - frame);

    // sp exactly at the bottom of the exception stack is an overflow.
    assert!(trap::uxstack_frame_top(UXSTACKTOP - PGSIZE).is_none());

    crate::println!("check_uxstack_placement: ok");
}

fn kern_syscall(no: u32, a1: u32, a2: u32, a3: u32, a4: u32, a5: u32) -> i32 {
    syscall::syscall(no, a1, a2, a3, a4, a5)
}

/// The kernel half of the copy-on-write fork protocol, driven through
/// the system call surface with a fabricated current environment:
/// exofork, duppage's mapping order and bits, the shared-page rule,
/// the copy-on-write resolution, and stale-handle behaviour after
/// destroy.
fn check_exofork_protocol() {
    let parent = {
        let mut table = env::env_table();
        table.alloc(EnvId(0), EnvKind::User).unwrap()
    };
    cpu::this_cpu_mut().set_env(parent);

    let va = UTEXT;
    let user_rw = (PteFlags::P | PteFlags::U | PteFlags::W).bits();

    // A writable page in the parent, with a known byte in it.
    assert_eq!(kern_syscall(SYS_PAGE_ALLOC, 0, va, user_rw, 0, 0), 0);
    let parent_pa = {
        let mut table = env::env_table();
        table.get_mut(parent).pgdir().convert_to_pa(VirtAddr(va)).unwrap()
    };
    unsafe { *parent_pa.to_va().as_mut_ptr::<u8>() = 0x5a };

    // exofork: a fresh, empty, NotRunnable child whose frame returns 0.
    let child = kern_syscall(SYS_EXOFORK, 0, 0, 0, 0, 0);
    assert!(child > 0);
    let child = EnvId(child as u32);
    {
        let mut table = env::env_table();
        let e = table.get_mut(child);
        assert_eq!(e.status(), EnvStatus::NotRunnable);
        assert_eq!(e.tf().tf_regs.reg_eax, 0);
    }

    // duppage for a writable page: child first, then the parent
    // re-marked; both end copy-on-write and not writable, on the same
    // physical page.
    let cow = (PteFlags::P | PteFlags::U | PteFlags::COW).bits();
    assert_eq!(kern_syscall(SYS_PAGE_MAP, 0, va, child.0, va, cow), 0);
    assert_eq!(kern_syscall(SYS_PAGE_MAP, 0, va, 0, va, cow), 0);
    {
        let mut table = env::env_table();
        let mut allocator = pmap::page_allocator();
        for id in [parent, child] {
            let pte = *table
                .get_mut(id)
                .pgdir()
                .lookup(VirtAddr(va), &mut allocator)
                .unwrap();
            assert_eq!(pte.addr(), parent_pa);
            assert!(pte.flags().contains(PteFlags::COW));
            assert!(!pte.flags().contains(PteFlags::W));
        }
        // Both views reference one page.
        assert_eq!(allocator.refcount(parent_pa), 2);
    }

    // Resolve the parent's write fault the way the user handler does:
    // stage a private copy at PFTEMP, remap it writable, unmap the
    // staging slot.
    assert_eq!(kern_syscall(SYS_PAGE_ALLOC, 0, PFTEMP, user_rw, 0, 0), 0);
    {
        let mut table = env::env_table();
        let staged = table
            .get_mut(parent)
            .pgdir()
            .convert_to_pa(VirtAddr(PFTEMP))
            .unwrap();
        unsafe {
            core::ptr::copy_nonoverlapping(
                parent_pa.to_va().round_down(PGSIZE).as_ptr::<u8>(),
                staged.to_va().as_mut_ptr::<u8>(),
                PGSIZE as usize,
            );
        }
    }
    assert_eq!(kern_syscall(SYS_PAGE_MAP, 0, PFTEMP, 0, va, user_rw), 0);
    assert_eq!(kern_syscall(SYS_PAGE_UNMAP, 0, PFTEMP, 0, 0, 0), 0);

    // The parent now writes its private copy; the child still sees
    // the original byte.
    {
        let mut table = env::env_table();
        let new_parent_pa = table
            .get_mut(parent)
            .pgdir()
            .convert_to_pa(VirtAddr(va))
            .unwrap();
        assert_ne!(new_parent_pa, parent_pa);
        unsafe { *new_parent_pa.to_va().as_mut_ptr::<u8>() = 0xab };

        let mut allocator = pmap::page_allocator();
        let parent_pte = *table
            .get_mut(parent)
            .pgdir()
            .lookup(VirtAddr(va), &mut allocator)
            .unwrap();
        assert!(parent_pte.flags().contains(PteFlags::W));
        assert!(!parent_pte.flags().contains(PteFlags::COW));

        let child_pte = *table
            .get_mut(child)
            .pgdir()
            .lookup(VirtAddr(va), &mut allocator)
            .unwrap();
        assert!(child_pte.flags().contains(PteFlags::COW));
        let child_byte = unsafe { *child_pte.addr().to_va().as_ptr::<u8>() };
        assert_eq!(child_byte, 0x5a);
    }

    // A PTE_SHARE page crosses as-is: writable and shared in both.
    let share_va = UTEXT + PTSIZE;
    let share = (PteFlags::P | PteFlags::U | PteFlags::W | PteFlags::SHARE).bits();
    assert_eq!(kern_syscall(SYS_PAGE_ALLOC, 0, share_va, share, 0, 0), 0);
    assert_eq!(kern_syscall(SYS_PAGE_MAP, 0, share_va, child.0, share_va, share), 0);
    {
        let mut table = env::env_table();
        let mut allocator = pmap::page_allocator();
        let p = *table
            .get_mut(parent)
            .pgdir()
            .lookup(VirtAddr(share_va), &mut allocator)
            .unwrap();
        let c = *table
            .get_mut(child)
            .pgdir()
            .lookup(VirtAddr(share_va), &mut allocator)
            .unwrap();
        assert_eq!(p.addr(), c.addr());
        assert!(p.flags().contains(PteFlags::W | PteFlags::SHARE));
        assert!(c.flags().contains(PteFlags::W | PteFlags::SHARE));
    }

    // The child becomes Runnable on request, and its handle goes
    // stale once destroyed.
    assert_eq!(kern_syscall(SYS_ENV_SET_STATUS, child.0, ENV_RUNNABLE, 0, 0, 0), 0);
    assert_eq!(kern_syscall(SYS_ENV_DESTROY, child.0, 0, 0, 0, 0), 0);
    assert_eq!(
        kern_syscall(SYS_ENV_DESTROY, child.0, 0, 0, 0, 0),
        KernErr::BadEnv.code()
    );

    {
        let mut table = env::env_table();
        unsafe { table.env_free(parent) };
    }
    cpu::this_cpu_mut().unset_env();

    crate::println!("check_exofork_protocol: ok");
}

// 32-bit little-endian ELF structures, plus the accessors load_icode
// and bind_functions need.
// ref. https://pdos.csail.mit.edu/6.828/2018/readings/elf.pdf

use crate::pmap::VirtAddr;
use core::mem;
use core::slice;

pub(crate) const ELF_MAGIC: u32 = 0x464c457f; // "\x7fELF" in little endian

/// ELF header. See Figure 1-3.
#[repr(C)]
pub(crate) struct Elf {
    pub(crate) e_magic: u32,
    pub(crate) e_elf: [u8; 12],
    pub(crate) e_type: u16,
    pub(crate) e_machine: u16,
    pub(crate) e_version: u32,
    pub(crate) e_entry: u32, // virtual address the system first transfers control to
    pub(crate) e_phoff: u32, // program header table's file offset in bytes
    pub(crate) e_shoff: u32, // section header table's file offset in bytes
    pub(crate) e_flags: u32,
    pub(crate) e_ehsize: u16,
    pub(crate) e_phentsize: u16,
    pub(crate) e_phnum: u16,
    pub(crate) e_shentsize: u16,
    pub(crate) e_shnum: u16,
    pub(crate) e_shstrndx: u16,
}

/// Program header. See Figure 2-1.
#[repr(C)]
pub(crate) struct Proghdr {
    pub(crate) p_type: u32,
    pub(crate) p_offset: u32, // offset of the segment's first byte in the file
    pub(crate) p_va: u32,     // virtual address of the segment's first byte in memory
    pub(crate) p_pa: u32,
    pub(crate) p_filesz: u32,
    pub(crate) p_memsz: u32,
    pub(crate) p_flags: u32,
    pub(crate) p_align: u32,
}

// Values for Proghdr::p_type. These and the section/symbol constants
// below deliberately stay plain integers: images carry values outside
// any closed set we could enumerate.
pub(crate) const ELF_PROG_LOAD: u32 = 1;

/// Section header. See Figure 1-8.
#[repr(C)]
pub(crate) struct Secthdr {
    pub(crate) sh_name: u32,
    pub(crate) sh_type: u32,
    pub(crate) sh_flags: u32,
    pub(crate) sh_addr: u32,
    pub(crate) sh_offset: u32,
    pub(crate) sh_size: u32,
    pub(crate) sh_link: u32,
    pub(crate) sh_info: u32,
    pub(crate) sh_addralign: u32,
    pub(crate) sh_entsize: u32,
}

// Values for Secthdr::sh_type.
pub(crate) const ELF_SHT_SYMTAB: u32 = 2;

/// Symbol table entry.
#[repr(C)]
pub(crate) struct Sym {
    pub(crate) st_name: u32,
    pub(crate) st_value: u32,
    pub(crate) st_size: u32,
    pub(crate) st_info: u8,
    pub(crate) st_other: u8,
    pub(crate) st_shndx: u16,
}

pub(crate) const ELF_STB_GLOBAL: u8 = 1;
pub(crate) const ELF_STT_OBJECT: u8 = 1;

impl Sym {
    pub(crate) fn binding(&self) -> u8 {
        self.st_info >> 4
    }

    pub(crate) fn typ(&self) -> u8 {
        self.st_info & 0xf
    }
}

/// Read-only view over an ELF image held in memory.
pub(crate) struct ElfParser {
    binary: *const u8,
}

impl ElfParser {
    /// Validates the magic; everything past that is trusted, which is
    /// fine for the boot-time images this is used on.
    pub(crate) unsafe fn new(binary: *const u8) -> Option<ElfParser> {
        let elf = &*(binary as *const Elf);
        if elf.e_magic == ELF_MAGIC {
            Some(ElfParser { binary })
        } else {
            None
        }
    }

    fn header(&self) -> &Elf {
        unsafe { &*(self.binary as *const Elf) }
    }

    pub(crate) fn entry_point(&self) -> VirtAddr {
        VirtAddr(self.header().e_entry)
    }

    pub(crate) fn program_headers(&self) -> &[Proghdr] {
        let elf = self.header();
        debug_assert_eq!(elf.e_phentsize as usize, mem::size_of::<Proghdr>());
        unsafe {
            slice::from_raw_parts(
                self.binary.add(elf.e_phoff as usize) as *const Proghdr,
                elf.e_phnum as usize,
            )
        }
    }

    pub(crate) fn section_headers(&self) -> &[Secthdr] {
        let elf = self.header();
        unsafe {
            slice::from_raw_parts(
                self.binary.add(elf.e_shoff as usize) as *const Secthdr,
                elf.e_shnum as usize,
            )
        }
    }

    /// Symbols of a SYMTAB section.
    pub(crate) fn symbols(&self, sh: &Secthdr) -> &[Sym] {
        debug_assert_eq!(sh.sh_type, ELF_SHT_SYMTAB);
        unsafe {
            slice::from_raw_parts(
                self.binary.add(sh.sh_offset as usize) as *const Sym,
                (sh.sh_size / sh.sh_entsize) as usize,
            )
        }
    }

    /// The NUL-terminated name at `offset` in the string table section
    /// `strtab`.
    pub(crate) fn symbol_name(&self, strtab: &Secthdr, offset: u32) -> &str {
        unsafe {
            let start = self.binary.add((strtab.sh_offset + offset) as usize);
            let mut len = 0;
            while *start.add(len) != 0 {
                len += 1;
            }
            core::str::from_utf8(slice::from_raw_parts(start, len)).unwrap_or("")
        }
    }
}

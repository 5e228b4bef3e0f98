fn main() {
    cc::Build::new()
        // cc cannot map the custom kernel target JSON to a compiler;
        // any i686 ELF target produces the right objects with the
        // freestanding flags below.
        .target("i686-unknown-linux-gnu")
        .file("src/entry.S")
        .file("src/entrypgdir.c")
        .file("src/vectors.S")
        .file("src/alltraps.S")
        .file("src/pfentry.S")
        .include("inc")
        .flag("-m32")
        .flag("-ffreestanding")
        .flag("-fno-pic")
        .flag("-fno-stack-protector")
        .compile("exoskernel");

    println!("cargo:rerun-if-changed=src/entry.S");
    println!("cargo:rerun-if-changed=src/entrypgdir.c");
    println!("cargo:rerun-if-changed=src/vectors.S");
    println!("cargo:rerun-if-changed=src/alltraps.S");
    println!("cargo:rerun-if-changed=src/pfentry.S");
    println!("cargo:rerun-if-changed=inc/memlayout.h");
    println!("cargo:rerun-if-changed=inc/mmu.h");
    println!("cargo:rerun-if-changed=kernel.ld");
}

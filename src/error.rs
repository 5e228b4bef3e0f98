use core::fmt;

/// Kernel error taxonomy. System calls report these as negative values
/// in eax; inside the kernel they travel as `Result`s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum KernErr {
    /// Invalid or stale environment handle, or permission denied.
    BadEnv = 2,
    /// Malformed arguments: misaligned address, bad permission bits,
    /// out-of-range address.
    Inval = 3,
    /// Physical page exhaustion.
    NoMem = 4,
    /// Environment table full.
    NoFreeEnv = 5,
    /// IPC target is not currently receiving.
    IpcNotRecv = 6,
}

pub type KernResult<T> = Result<T, KernErr>;

impl KernErr {
    /// The value returned on the system call ABI.
    pub fn code(self) -> i32 {
        -(self as i32)
    }
}

impl fmt::Display for KernErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            KernErr::BadEnv => "bad environment",
            KernErr::Inval => "invalid parameter",
            KernErr::NoMem => "out of memory",
            KernErr::NoFreeEnv => "out of environments",
            KernErr::IpcNotRecv => "env is not recving",
        };
        f.write_str(s)
    }
}

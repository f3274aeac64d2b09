//! Registers, memory references, and instruction operands.

use core::fmt;

/// x86-64 general-purpose register.
///
/// Covers the sixteen 64-bit registers and their 32-bit aliases.  Each
/// variant encodes its own size (see [`Register::size_bits`]) and hardware
/// register number (see [`Register::base_code`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Register {
    // -- 64-bit general-purpose registers (RAX–R15) --
    /// RAX — 64-bit accumulator.
    Rax,
    /// RCX — 64-bit counter (implicit shift-count register).
    Rcx,
    /// RDX — 64-bit data.
    Rdx,
    /// RBX — 64-bit base.
    Rbx,
    /// RSP — 64-bit stack pointer.
    Rsp,
    /// RBP — 64-bit frame pointer.
    Rbp,
    /// RSI — 64-bit source index.
    Rsi,
    /// RDI — 64-bit destination index.
    Rdi,
    /// R8–R15 — extended 64-bit registers (require REX prefix).
    R8,
    /// Extended 64-bit register.
    R9,
    /// Extended 64-bit register.
    R10,
    /// Extended 64-bit register.
    R11,
    /// Extended 64-bit register.
    R12,
    /// Extended 64-bit register.
    R13,
    /// Extended 64-bit register.
    R14,
    /// Extended 64-bit register.
    R15,
    // -- 32-bit general-purpose registers --
    /// EAX — 32-bit accumulator.
    Eax,
    /// ECX — 32-bit counter.
    Ecx,
    /// EDX — 32-bit data.
    Edx,
    /// EBX — 32-bit base.
    Ebx,
    /// ESP — 32-bit stack pointer.
    Esp,
    /// EBP — 32-bit frame pointer.
    Ebp,
    /// ESI — 32-bit source index.
    Esi,
    /// EDI — 32-bit destination index.
    Edi,
    /// R8D–R15D — low 32 bits of the extended registers.
    R8d,
    /// Low 32 bits of R9.
    R9d,
    /// Low 32 bits of R10.
    R10d,
    /// Low 32 bits of R11.
    R11d,
    /// Low 32 bits of R12.
    R12d,
    /// Low 32 bits of R13.
    R13d,
    /// Low 32 bits of R14.
    R14d,
    /// Low 32 bits of R15.
    R15d,
}

impl Register {
    /// The 3-bit register encoding (bits 0-2 of the register number).
    pub fn base_code(self) -> u8 {
        use Register::*;
        match self {
            Rax | Eax | R8 | R8d => 0,
            Rcx | Ecx | R9 | R9d => 1,
            Rdx | Edx | R10 | R10d => 2,
            Rbx | Ebx | R11 | R11d => 3,
            Rsp | Esp | R12 | R12d => 4,
            Rbp | Ebp | R13 | R13d => 5,
            Rsi | Esi | R14 | R14d => 6,
            Rdi | Edi | R15 | R15d => 7,
        }
    }

    /// Whether this is an extended register (R8–R15 family) requiring
    /// REX.B/R/X (bit 3 of the register index).
    pub fn is_extended(self) -> bool {
        use Register::*;
        matches!(
            self,
            R8 | R9
                | R10
                | R11
                | R12
                | R13
                | R14
                | R15
                | R8d
                | R9d
                | R10d
                | R11d
                | R12d
                | R13d
                | R14d
                | R15d
        )
    }

    /// Size of the register in bits (64 or 32).
    pub fn size_bits(self) -> u8 {
        use Register::*;
        match self {
            Rax | Rcx | Rdx | Rbx | Rsp | Rbp | Rsi | Rdi | R8 | R9 | R10 | R11 | R12 | R13
            | R14 | R15 => 64,
            _ => 32,
        }
    }

    /// Whether this is the accumulator (RAX/EAX), which has dedicated
    /// short-form immediate encodings for several instructions.
    pub fn is_accumulator(self) -> bool {
        matches!(self, Register::Rax | Register::Eax)
    }

    /// Whether byte-granular access to this register (SETcc) needs a bare
    /// REX prefix.  Without REX, register codes 4-7 select the legacy
    /// high-byte registers AH/CH/DH/BH instead of SPL/BPL/SIL/DIL.
    pub(crate) fn needs_rex_for_byte(self) -> bool {
        !self.is_extended() && self.base_code() >= 4
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Register::*;
        let name = match self {
            Rax => "rax",
            Rcx => "rcx",
            Rdx => "rdx",
            Rbx => "rbx",
            Rsp => "rsp",
            Rbp => "rbp",
            Rsi => "rsi",
            Rdi => "rdi",
            R8 => "r8",
            R9 => "r9",
            R10 => "r10",
            R11 => "r11",
            R12 => "r12",
            R13 => "r13",
            R14 => "r14",
            R15 => "r15",
            Eax => "eax",
            Ecx => "ecx",
            Edx => "edx",
            Ebx => "ebx",
            Esp => "esp",
            Ebp => "ebp",
            Esi => "esi",
            Edi => "edi",
            R8d => "r8d",
            R9d => "r9d",
            R10d => "r10d",
            R11d => "r11d",
            R12d => "r12d",
            R13d => "r13d",
            R14d => "r14d",
            R15d => "r15d",
        };
        f.write_str(name)
    }
}

/// A memory reference: `[base + index*scale + disp]`.
///
/// The base register is always present; scaled-index and displacement are
/// optional.  Built with [`Mem::base`]:
///
/// ```
/// use jit_asm::{Mem, Register};
///
/// let slot = Mem::base(Register::Rbp).disp(-8);
/// let elem = Mem::base(Register::Rbx).index(Register::Rcx, 8).disp(16);
/// # let _ = (slot, elem);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Mem {
    /// Base register.
    pub base: Register,
    /// Optional index register (never RSP — code 100 means "no index").
    pub index: Option<Register>,
    /// Index scale factor: 1, 2, 4, or 8.
    pub scale: u8,
    /// Signed displacement.
    pub disp: i32,
}

impl Mem {
    /// A reference to `[base]`.
    ///
    /// # Panics
    ///
    /// Panics if `base` is not a 64-bit register — x86-64 addresses are
    /// 64-bit.
    #[must_use]
    pub fn base(base: Register) -> Self {
        assert!(
            base.size_bits() == 64,
            "memory base must be a 64-bit register, got {base}"
        );
        Self {
            base,
            index: None,
            scale: 1,
            disp: 0,
        }
    }

    /// Add a scaled index register: `[base + index*scale]`.
    ///
    /// # Panics
    ///
    /// Panics if `scale` is not 1, 2, 4, or 8, or if `index` is RSP (the
    /// SIB index code 100 is reserved for "no index") or not 64-bit.
    #[must_use]
    pub fn index(mut self, index: Register, scale: u8) -> Self {
        assert!(
            matches!(scale, 1 | 2 | 4 | 8),
            "index scale must be 1, 2, 4, or 8, got {scale}"
        );
        assert!(
            index.size_bits() == 64 && index != Register::Rsp,
            "index must be a 64-bit register other than rsp, got {index}"
        );
        self.index = Some(index);
        self.scale = scale;
        self
    }

    /// Add a signed displacement: `[base + disp]`.
    #[must_use]
    pub fn disp(mut self, disp: i32) -> Self {
        self.disp = disp;
        self
    }
}

impl fmt::Display for Mem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}", self.base)?;
        if let Some(index) = self.index {
            write!(f, "+{}*{}", index, self.scale)?;
        }
        if self.disp < 0 {
            write!(f, "-{:#x}", -i64::from(self.disp))?;
        } else if self.disp > 0 {
            write!(f, "+{:#x}", self.disp)?;
        }
        f.write_str("]")
    }
}

/// An instruction operand.
///
/// At most one operand of a two-operand instruction may be
/// [`Operand::Memory`] — x86-64 has no memory-to-memory forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Operand {
    /// General-purpose register.
    Register(Register),
    /// Memory reference.
    Memory(Mem),
    /// Signed immediate value.
    Immediate(i64),
    /// Absolute 64-bit address, embedded verbatim as an 8-byte immediate.
    Ptr(u64),
}

impl From<Register> for Operand {
    fn from(reg: Register) -> Self {
        Operand::Register(reg)
    }
}

impl From<Mem> for Operand {
    fn from(mem: Mem) -> Self {
        Operand::Memory(mem)
    }
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Immediate(value)
    }
}

impl From<i32> for Operand {
    fn from(value: i32) -> Self {
        Operand::Immediate(i64::from(value))
    }
}

impl From<u64> for Operand {
    fn from(addr: u64) -> Self {
        Operand::Ptr(addr)
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Register(reg) => write!(f, "{}", reg),
            Operand::Memory(mem) => write!(f, "{}", mem),
            Operand::Immediate(value) => write!(f, "{}", value),
            Operand::Ptr(addr) => write!(f, "{:#x}", addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;

    #[test]
    fn base_codes_cover_all_eight() {
        use Register::*;
        let low = [Rax, Rcx, Rdx, Rbx, Rsp, Rbp, Rsi, Rdi];
        let high = [R8, R9, R10, R11, R12, R13, R14, R15];
        for (i, (lo, hi)) in low.iter().zip(high.iter()).enumerate() {
            assert_eq!(lo.base_code(), i as u8);
            assert_eq!(hi.base_code(), i as u8);
            assert!(!lo.is_extended());
            assert!(hi.is_extended());
        }
    }

    #[test]
    fn alias_pairs_share_encoding() {
        assert_eq!(Register::Eax.base_code(), Register::Rax.base_code());
        assert_eq!(Register::R11d.base_code(), Register::R11.base_code());
        assert!(Register::R11d.is_extended());
        assert_eq!(Register::Eax.size_bits(), 32);
        assert_eq!(Register::Rax.size_bits(), 64);
    }

    #[test]
    fn accumulator_detection() {
        assert!(Register::Rax.is_accumulator());
        assert!(Register::Eax.is_accumulator());
        assert!(!Register::R8.is_accumulator());
    }

    #[test]
    fn mem_display() {
        let mem = Mem::base(Register::Rbx).index(Register::Rcx, 4).disp(16);
        assert_eq!(format!("{}", mem), "[rbx+rcx*4+0x10]");
        assert_eq!(format!("{}", Mem::base(Register::Rbp).disp(-8)), "[rbp-0x8]");
    }

    #[test]
    #[should_panic(expected = "scale must be 1, 2, 4, or 8")]
    fn mem_rejects_bad_scale() {
        let _ = Mem::base(Register::Rax).index(Register::Rcx, 3);
    }

    #[test]
    #[should_panic(expected = "other than rsp")]
    fn mem_rejects_rsp_index() {
        let _ = Mem::base(Register::Rax).index(Register::Rsp, 1);
    }
}

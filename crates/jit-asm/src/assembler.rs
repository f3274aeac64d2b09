//! Public assembler API — the per-function emission session.
//!
//! One [`Assembler`] builds one function: it owns the code buffer, the
//! label table, and the spill-scope depth.  Instruction methods append
//! encoded bytes immediately; label references leave placeholder windows
//! that [`Assembler::finish`] backfills in a single patch pass.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;

use crate::buffer::CodeBuffer;
use crate::encoder::{
    self, emit_rex_mem, emit_rex_rr, mem_modrm, modrm, rex, AluSpec, Cond, ShiftSpec,
};
use crate::error::EmitError;
use crate::label::{AppliedPatch, LabelId, LabelTable, PatchKind};
use crate::operand::{Mem, Operand, Register};

/// The result of a successfully finalized session.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[must_use]
pub struct AssemblyResult {
    /// The generated machine code.
    bytes: Vec<u8>,
    /// Named label addresses (name → absolute address).
    labels: Vec<(String, u64)>,
    /// Applied patches in the output.
    patches: Vec<AppliedPatch>,
    /// Base address used for absolute patches.
    base_address: u64,
}

impl AssemblyResult {
    /// The generated bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consume and return the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Byte count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the output is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Named label addresses (name, absolute address).
    #[must_use]
    pub fn labels(&self) -> &[(String, u64)] {
        &self.labels
    }

    /// Look up a named label's absolute address.
    #[must_use]
    pub fn label_address(&self, name: &str) -> Option<u64> {
        self.labels.iter().find(|(n, _)| n == name).map(|(_, a)| *a)
    }

    /// The applied patches — where label references were written.
    #[must_use]
    pub fn patches(&self) -> &[AppliedPatch] {
        &self.patches
    }

    /// The base address the session was finalized against.
    #[must_use]
    pub fn base_address(&self) -> u64 {
        self.base_address
    }
}

/// A single code-generation session: one assembler, one function.
///
/// Not thread-safe; concurrent compilation uses one session per thread
/// with nothing shared.
///
/// # Examples
///
/// ```
/// use jit_asm::{Assembler, Register};
///
/// let mut asm = Assembler::new();
/// asm.prologue();
/// asm.mov(Register::Rax, 42)?;
/// asm.ret();
/// let code = asm.finish()?;
/// assert_eq!(code.bytes().last(), Some(&0xC3));
/// # Ok::<(), jit_asm::EmitError>(())
/// ```
#[derive(Debug, Default)]
pub struct Assembler {
    buf: CodeBuffer,
    labels: LabelTable,
    base_address: u64,
    spill_depth: usize,
}

fn invalid(mnemonic: &str, detail: impl Into<String>) -> EmitError {
    EmitError::InvalidOperands {
        mnemonic: String::from(mnemonic),
        detail: detail.into(),
    }
}

/// Immediate must fit a (sign-extended) 32-bit field.
fn check_imm32(value: i64) -> Result<i32, EmitError> {
    i32::try_from(value).map_err(|_| EmitError::ImmediateOverflow {
        value,
        min: i64::from(i32::MIN),
        max: i64::from(i32::MAX),
    })
}

fn check_same_size(mnemonic: &'static str, dst: Register, src: Register) -> Result<(), EmitError> {
    if dst.size_bits() == src.size_bits() {
        Ok(())
    } else {
        Err(invalid(
            mnemonic,
            format!("operand size mismatch: {dst}, {src}"),
        ))
    }
}

impl Assembler {
    /// Create a new, empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the base address the finished code will be loaded at.
    ///
    /// Absolute patches ([`Assembler::call_label`],
    /// [`Assembler::mov_label`]) embed `base_address + label offset`; the
    /// execution collaborator must place the buffer at this address.
    pub fn base_address(&mut self, addr: u64) -> &mut Self {
        self.base_address = addr;
        self
    }

    /// Current write offset — the address (relative to the buffer start)
    /// of the next emitted byte.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.buf.len()
    }

    // ── labels ─────────────────────────────────────────────

    /// Look up or create the named label.
    ///
    /// Names are scoped to this session; referencing a name that was never
    /// bound leaves the label unresolved, which [`Assembler::finish`]
    /// reports as an error.
    pub fn label(&mut self, name: &str) -> LabelId {
        self.labels.intern(name)
    }

    /// Create a fresh anonymous label.
    pub fn fresh_label(&mut self) -> LabelId {
        self.labels.fresh()
    }

    /// Bind a label to the current offset.  Each label binds exactly once.
    pub fn bind(&mut self, label: LabelId) -> Result<(), EmitError> {
        let offset = self.buf.len();
        self.labels.bind(label, offset)
    }

    // ── frame pseudo-instructions ──────────────────────────

    /// Standard frame prologue: `push rbp; mov rbp, rsp`.
    ///
    /// Spill slots address relative to RBP, so a session that uses
    /// [`Assembler::spill`] must emit the prologue first.
    pub fn prologue(&mut self) {
        self.buf.push(0x55);
        self.buf.push(0x48);
        self.buf.push(0x89);
        self.buf.push(0xE5);
    }

    /// Function epilogue and return: `mov rsp, rbp; pop rbp; ret`.
    ///
    /// The return value is whatever the generated code left in RAX, per
    /// the System-V convention.
    pub fn ret(&mut self) {
        self.buf.push(0x48);
        self.buf.push(0x89);
        self.buf.push(0xEC);
        self.buf.push(0x5D);
        self.buf.push(0xC3);
    }

    /// `nop`.
    pub fn nop(&mut self) {
        self.buf.push(0x90);
    }

    /// `int3` debug breakpoint.
    pub fn int3(&mut self) {
        self.buf.push(0xCC);
    }

    // ── data movement ──────────────────────────────────────

    /// `mov dst, src`.
    ///
    /// Supported forms: reg,reg / reg,imm (shortest encoding chosen) /
    /// reg64,ptr (absolute 8-byte immediate) / reg,\[mem\] / \[mem\],reg /
    /// \[mem\],imm32.  Memory stores without a register operand are 64-bit.
    pub fn mov(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        match (dst.into(), src.into()) {
            (Operand::Register(dst), Operand::Register(src)) => {
                check_same_size("mov", dst, src)?;
                let w = dst.size_bits() == 64;
                emit_rex_rr(&mut self.buf, w, src.is_extended(), dst.is_extended());
                self.buf.push(0x89);
                self.buf.push(modrm(0b11, src.base_code(), dst.base_code()));
                Ok(())
            }
            (Operand::Register(dst), Operand::Immediate(imm)) => self.mov_reg_imm(dst, imm),
            (Operand::Register(dst), Operand::Ptr(addr)) => {
                if dst.size_bits() != 64 {
                    return Err(invalid(
                        "mov",
                        format!("absolute pointer requires a 64-bit register, got {dst}"),
                    ));
                }
                self.buf.push(rex(true, false, false, dst.is_extended()));
                self.buf.push(0xB8 + dst.base_code());
                self.buf.push_u64(addr);
                Ok(())
            }
            (Operand::Register(dst), Operand::Memory(mem)) => {
                let w = dst.size_bits() == 64;
                emit_rex_mem(&mut self.buf, w, dst.is_extended(), &mem);
                self.buf.push(0x8B);
                mem_modrm(&mut self.buf, dst.base_code(), &mem);
                Ok(())
            }
            (Operand::Memory(mem), Operand::Register(src)) => {
                let w = src.size_bits() == 64;
                emit_rex_mem(&mut self.buf, w, src.is_extended(), &mem);
                self.buf.push(0x89);
                mem_modrm(&mut self.buf, src.base_code(), &mem);
                Ok(())
            }
            (Operand::Memory(mem), Operand::Immediate(imm)) => {
                let imm32 = check_imm32(imm)?;
                emit_rex_mem(&mut self.buf, true, false, &mem);
                self.buf.push(0xC7);
                mem_modrm(&mut self.buf, 0, &mem);
                self.buf.push_u32(imm32 as u32);
                Ok(())
            }
            (dst, src) => Err(invalid(
                "mov",
                format!("unsupported operand combination: {dst}, {src}"),
            )),
        }
    }

    /// `mov r, imm` with the shortest encoding: `mov r32, imm32`
    /// (zero-extends), sign-extended `imm32`, or the full 8-byte form.
    fn mov_reg_imm(&mut self, dst: Register, imm: i64) -> Result<(), EmitError> {
        let b = dst.is_extended();
        if dst.size_bits() == 32 {
            if imm < i64::from(i32::MIN) || imm > i64::from(u32::MAX) {
                return Err(EmitError::ImmediateOverflow {
                    value: imm,
                    min: i64::from(i32::MIN),
                    max: i64::from(u32::MAX),
                });
            }
            if b {
                self.buf.push(rex(false, false, false, true));
            }
            self.buf.push(0xB8 + dst.base_code());
            self.buf.push_u32(imm as u32);
        } else if (0..=i64::from(u32::MAX)).contains(&imm) {
            // mov r32, imm32 zero-extends to the full register.
            if b {
                self.buf.push(rex(false, false, false, true));
            }
            self.buf.push(0xB8 + dst.base_code());
            self.buf.push_u32(imm as u32);
        } else if i32::try_from(imm).is_ok() {
            // mov r/m64, sign-extended imm32
            self.buf.push(rex(true, false, false, b));
            self.buf.push(0xC7);
            self.buf.push(modrm(0b11, 0, dst.base_code()));
            self.buf.push_u32(imm as i32 as u32);
        } else {
            // movabs r64, imm64
            self.buf.push(rex(true, false, false, b));
            self.buf.push(0xB8 + dst.base_code());
            self.buf.push_u64(imm as u64);
        }
        Ok(())
    }

    /// Materialize a label's eventual absolute address into `dst`.
    ///
    /// Emits `movabs dst, 0` and registers an 8-byte absolute patch site;
    /// the finalize pass writes `base_address + label offset` verbatim.
    pub fn mov_label(&mut self, dst: Register, label: LabelId) -> Result<(), EmitError> {
        if dst.size_bits() != 64 {
            return Err(invalid(
                "mov",
                format!("label address requires a 64-bit register, got {dst}"),
            ));
        }
        self.buf.push(rex(true, false, false, dst.is_extended()));
        self.buf.push(0xB8 + dst.base_code());
        let site = self.buf.len();
        self.buf.push_u64(0);
        self.labels.use_at(label, site, 8, 0, PatchKind::Absolute);
        Ok(())
    }

    /// `lea dst, [mem]`.
    pub fn lea(&mut self, dst: Register, mem: Mem) -> Result<(), EmitError> {
        let w = dst.size_bits() == 64;
        emit_rex_mem(&mut self.buf, w, dst.is_extended(), &mem);
        self.buf.push(0x8D);
        mem_modrm(&mut self.buf, dst.base_code(), &mem);
        Ok(())
    }

    /// `push r64`.
    pub fn push(&mut self, reg: Register) -> Result<(), EmitError> {
        if reg.size_bits() != 64 {
            return Err(invalid("push", format!("requires a 64-bit register, got {reg}")));
        }
        if reg.is_extended() {
            self.buf.push(rex(false, false, false, true));
        }
        self.buf.push(0x50 + reg.base_code());
        Ok(())
    }

    /// `pop r64`.
    pub fn pop(&mut self, reg: Register) -> Result<(), EmitError> {
        if reg.size_bits() != 64 {
            return Err(invalid("pop", format!("requires a 64-bit register, got {reg}")));
        }
        if reg.is_extended() {
            self.buf.push(rex(false, false, false, true));
        }
        self.buf.push(0x58 + reg.base_code());
        Ok(())
    }

    // ── binary-ALU family ──────────────────────────────────

    /// `add dst, src`.
    pub fn add(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        self.alu(&encoder::ADD, dst.into(), src.into())
    }

    /// `or dst, src`.
    pub fn or(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        self.alu(&encoder::OR, dst.into(), src.into())
    }

    /// `and dst, src`.
    pub fn and(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        self.alu(&encoder::AND, dst.into(), src.into())
    }

    /// `sub dst, src`.
    pub fn sub(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        self.alu(&encoder::SUB, dst.into(), src.into())
    }

    /// `xor dst, src`.
    pub fn xor(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        self.alu(&encoder::XOR, dst.into(), src.into())
    }

    /// `cmp dst, src` — compare and set flags.
    pub fn cmp(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        self.alu(&encoder::CMP, dst.into(), src.into())
    }

    /// `test dst, src` — AND without a destination, flags only.
    ///
    /// A memory *source* is rejected: `test` has no register-destination
    /// opcode, and the operands are not interchangeable.
    pub fn test(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        self.alu(&encoder::TEST, dst.into(), src.into())
    }

    /// Shared two-operand ALU routine over an opcode row.
    ///
    /// Immediate sources prefer the accumulator short forms when the row
    /// has them, then the sign-extended imm8 group, then the imm32 group;
    /// the sub-operation rides in the ModR/M reg field (`digit`).
    fn alu(&mut self, spec: &AluSpec, dst: Operand, src: Operand) -> Result<(), EmitError> {
        match (dst, src) {
            (Operand::Register(dst), Operand::Immediate(imm)) => {
                let imm32 = check_imm32(imm)?;
                let w = dst.size_bits() == 64;
                emit_rex_rr(&mut self.buf, w, false, dst.is_extended());
                let fits8 = (-128..=127).contains(&imm);
                if dst.is_accumulator() {
                    if fits8 {
                        if let Some(opcode) = spec.acc_imm8 {
                            self.buf.push(opcode);
                            self.buf.push(imm as i8 as u8);
                            return Ok(());
                        }
                    } else {
                        self.buf.push(spec.acc_imm32);
                        self.buf.push_u32(imm32 as u32);
                        return Ok(());
                    }
                }
                match spec.imm8 {
                    Some(opcode) if fits8 => {
                        self.buf.push(opcode);
                        self.buf.push(modrm(0b11, spec.digit, dst.base_code()));
                        self.buf.push(imm as i8 as u8);
                    }
                    _ => {
                        self.buf.push(spec.imm32);
                        self.buf.push(modrm(0b11, spec.digit, dst.base_code()));
                        self.buf.push_u32(imm32 as u32);
                    }
                }
                Ok(())
            }
            (Operand::Memory(mem), Operand::Immediate(imm)) => {
                let imm32 = check_imm32(imm)?;
                emit_rex_mem(&mut self.buf, true, false, &mem);
                let fits8 = (-128..=127).contains(&imm);
                match spec.imm8 {
                    Some(opcode) if fits8 => {
                        self.buf.push(opcode);
                        mem_modrm(&mut self.buf, spec.digit, &mem);
                        self.buf.push(imm as i8 as u8);
                    }
                    _ => {
                        self.buf.push(spec.imm32);
                        mem_modrm(&mut self.buf, spec.digit, &mem);
                        self.buf.push_u32(imm32 as u32);
                    }
                }
                Ok(())
            }
            (Operand::Register(dst), Operand::Register(src)) => {
                check_same_size(spec.mnemonic, dst, src)?;
                let w = dst.size_bits() == 64;
                emit_rex_rr(&mut self.buf, w, src.is_extended(), dst.is_extended());
                self.buf.push(spec.mr);
                self.buf.push(modrm(0b11, src.base_code(), dst.base_code()));
                Ok(())
            }
            (Operand::Memory(mem), Operand::Register(src)) => {
                let w = src.size_bits() == 64;
                emit_rex_mem(&mut self.buf, w, src.is_extended(), &mem);
                self.buf.push(spec.mr);
                mem_modrm(&mut self.buf, src.base_code(), &mem);
                Ok(())
            }
            (Operand::Register(dst), Operand::Memory(mem)) => {
                let Some(opcode) = spec.rm else {
                    return Err(invalid(spec.mnemonic, "memory source is not supported"));
                };
                let w = dst.size_bits() == 64;
                emit_rex_mem(&mut self.buf, w, dst.is_extended(), &mem);
                self.buf.push(opcode);
                mem_modrm(&mut self.buf, dst.base_code(), &mem);
                Ok(())
            }
            (dst, src) => Err(invalid(
                spec.mnemonic,
                format!("unsupported operand combination: {dst}, {src}"),
            )),
        }
    }

    // ── shift family ───────────────────────────────────────

    /// `shl dst, count` — count is an immediate or RCX.
    pub fn shl(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        self.shift(&encoder::SHL, dst.into(), src.into())
    }

    /// `shr dst, count` — logical right shift.
    pub fn shr(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        self.shift(&encoder::SHR, dst.into(), src.into())
    }

    /// `sar dst, count` — arithmetic right shift.
    pub fn sar(
        &mut self,
        dst: impl Into<Operand>,
        src: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        self.shift(&encoder::SAR, dst.into(), src.into())
    }

    /// Shared shift routine: count comes from RCX (`by_cl` opcode) or an
    /// immediate byte (`imm` opcode); anything else is a caller bug.
    fn shift(&mut self, spec: &ShiftSpec, dst: Operand, src: Operand) -> Result<(), EmitError> {
        let count = match src {
            Operand::Register(Register::Rcx) => None,
            Operand::Immediate(count) => {
                if !(0..=63).contains(&count) {
                    return Err(EmitError::ImmediateOverflow {
                        value: count,
                        min: 0,
                        max: 63,
                    });
                }
                Some(count as u8)
            }
            src => {
                return Err(invalid(
                    spec.mnemonic,
                    format!("count must be rcx or an immediate, got {src}"),
                ))
            }
        };
        let opcode = if count.is_some() { spec.imm } else { spec.by_cl };
        match dst {
            Operand::Register(reg) => {
                let w = reg.size_bits() == 64;
                emit_rex_rr(&mut self.buf, w, false, reg.is_extended());
                self.buf.push(opcode);
                self.buf.push(modrm(0b11, spec.digit, reg.base_code()));
            }
            Operand::Memory(mem) => {
                emit_rex_mem(&mut self.buf, true, false, &mem);
                self.buf.push(opcode);
                mem_modrm(&mut self.buf, spec.digit, &mem);
            }
            dst => {
                return Err(invalid(
                    spec.mnemonic,
                    format!("destination must be a register or memory, got {dst}"),
                ))
            }
        }
        if let Some(count) = count {
            self.buf.push(count);
        }
        Ok(())
    }

    // ── unary ──────────────────────────────────────────────

    /// `neg op` — two's-complement negate in place.
    pub fn neg(&mut self, op: impl Into<Operand>) -> Result<(), EmitError> {
        match op.into() {
            Operand::Register(reg) => {
                let w = reg.size_bits() == 64;
                emit_rex_rr(&mut self.buf, w, false, reg.is_extended());
                self.buf.push(0xF7);
                self.buf.push(modrm(0b11, 3, reg.base_code()));
                Ok(())
            }
            Operand::Memory(mem) => {
                emit_rex_mem(&mut self.buf, true, false, &mem);
                self.buf.push(0xF7);
                mem_modrm(&mut self.buf, 3, &mem);
                Ok(())
            }
            op => Err(invalid(
                "neg",
                format!("expected register or memory, got {op}"),
            )),
        }
    }

    // ── jumps ──────────────────────────────────────────────

    /// Short unconditional jump: `jmp rel8`.  The target must end up
    /// within ±127 bytes or [`Assembler::finish`] fails.
    pub fn jmp_short(&mut self, target: LabelId) -> Result<(), EmitError> {
        self.buf.push(0xEB);
        self.relative_site(target, 1);
        Ok(())
    }

    /// Short conditional jump: `jcc rel8`.
    pub fn jcc_short(&mut self, cond: Cond, target: LabelId) -> Result<(), EmitError> {
        self.buf.push(0x70 + cond.code());
        self.relative_site(target, 1);
        Ok(())
    }

    /// Near unconditional jump: `jmp rel32`.
    pub fn jmp(&mut self, target: LabelId) -> Result<(), EmitError> {
        self.buf.push(0xE9);
        self.relative_site(target, 4);
        Ok(())
    }

    /// Near conditional jump: `0x0F`-escaped `jcc rel32`.
    pub fn jcc(&mut self, cond: Cond, target: LabelId) -> Result<(), EmitError> {
        self.buf.push(0x0F);
        self.buf.push(0x80 + cond.code());
        self.relative_site(target, 4);
        Ok(())
    }

    /// Append a zeroed placeholder window and record the pending site.
    /// The patched displacement is measured from the byte after the
    /// window: `target - (site + size)`.
    fn relative_site(&mut self, target: LabelId, size: u8) {
        let site = self.buf.len();
        match size {
            1 => self.buf.push(0),
            _ => self.buf.push_u32(0),
        }
        self.labels.use_at(target, site, size, 0, PatchKind::Relative);
    }

    // ── conditional set / move ─────────────────────────────

    /// `setcc dst` — write 1 or 0 into a register/memory byte.
    pub fn set(&mut self, cond: Cond, dst: impl Into<Operand>) -> Result<(), EmitError> {
        match dst.into() {
            Operand::Register(reg) => {
                let b = reg.is_extended();
                // Byte access to codes 4-7 selects AH/CH/DH/BH unless a
                // (possibly empty) REX prefix is present.
                if b || reg.needs_rex_for_byte() {
                    self.buf.push(rex(false, false, false, b));
                }
                self.buf.push(0x0F);
                self.buf.push(0x90 + cond.code());
                self.buf.push(modrm(0b11, 0, reg.base_code()));
                Ok(())
            }
            Operand::Memory(mem) => {
                emit_rex_mem(&mut self.buf, false, false, &mem);
                self.buf.push(0x0F);
                self.buf.push(0x90 + cond.code());
                mem_modrm(&mut self.buf, 0, &mem);
                Ok(())
            }
            op => Err(invalid(
                "set",
                format!("expected register or memory, got {op}"),
            )),
        }
    }

    /// `cmovcc dst, src` — copy `src` into `dst` when the condition holds.
    pub fn cmov(
        &mut self,
        cond: Cond,
        dst: Register,
        src: impl Into<Operand>,
    ) -> Result<(), EmitError> {
        let w = dst.size_bits() == 64;
        match src.into() {
            Operand::Register(src) => {
                check_same_size("cmov", dst, src)?;
                emit_rex_rr(&mut self.buf, w, dst.is_extended(), src.is_extended());
                self.buf.push(0x0F);
                self.buf.push(0x40 + cond.code());
                self.buf.push(modrm(0b11, dst.base_code(), src.base_code()));
                Ok(())
            }
            Operand::Memory(mem) => {
                emit_rex_mem(&mut self.buf, w, dst.is_extended(), &mem);
                self.buf.push(0x0F);
                self.buf.push(0x40 + cond.code());
                mem_modrm(&mut self.buf, dst.base_code(), &mem);
                Ok(())
            }
            op => Err(invalid(
                "cmov",
                format!("expected register or memory source, got {op}"),
            )),
        }
    }

    // ── calls ──────────────────────────────────────────────

    /// Indirect `call` through a register or memory operand.
    pub fn call(&mut self, target: impl Into<Operand>) -> Result<(), EmitError> {
        self.indirect("call", 2, target.into())
    }

    /// Call a label: materialize its absolute address into `scratch`
    /// ([`Assembler::mov_label`]), then `call scratch`.
    pub fn call_label(&mut self, scratch: Register, target: LabelId) -> Result<(), EmitError> {
        self.mov_label(scratch, target)?;
        self.indirect("call", 2, Operand::Register(scratch))
    }

    /// Indirect tail call: `jmp` through the operand without pushing a
    /// return address.
    pub fn tail_call(&mut self, target: impl Into<Operand>) -> Result<(), EmitError> {
        self.indirect("tail_call", 4, target.into())
    }

    /// Shared 0xFF-group encoder: `/2` call, `/4` jmp.
    fn indirect(
        &mut self,
        mnemonic: &'static str,
        digit: u8,
        target: Operand,
    ) -> Result<(), EmitError> {
        match target {
            Operand::Register(reg) => {
                if reg.size_bits() != 64 {
                    return Err(invalid(
                        mnemonic,
                        format!("requires a 64-bit register, got {reg}"),
                    ));
                }
                if reg.is_extended() {
                    self.buf.push(rex(false, false, false, true));
                }
                self.buf.push(0xFF);
                self.buf.push(modrm(0b11, digit, reg.base_code()));
                Ok(())
            }
            Operand::Memory(mem) => {
                // 64-bit operand size is the default here; REX.W is redundant.
                emit_rex_mem(&mut self.buf, false, false, &mem);
                self.buf.push(0xFF);
                mem_modrm(&mut self.buf, digit, &mem);
                Ok(())
            }
            op => Err(invalid(
                mnemonic,
                format!("expected register or memory, got {op}"),
            )),
        }
    }

    // ── spill scopes ───────────────────────────────────────

    /// Reserve one anonymous 8-byte stack slot for the scope of `body`.
    ///
    /// The stack adjustment is exactly undone when the scope ends, even if
    /// `body` returns an error.  Requires a frame set up by
    /// [`Assembler::prologue`].
    ///
    /// # Examples
    ///
    /// ```
    /// use jit_asm::{Assembler, Register};
    ///
    /// let mut asm = Assembler::new();
    /// asm.prologue();
    /// asm.spill(|asm, slot| {
    ///     asm.mov(slot, 42)?;
    ///     asm.mov(Register::Rax, slot)
    /// })?;
    /// asm.ret();
    /// # let _ = asm.finish()?;
    /// # Ok::<(), jit_asm::EmitError>(())
    /// ```
    pub fn spill<F>(&mut self, body: F) -> Result<(), EmitError>
    where
        F: FnOnce(&mut Self, Mem) -> Result<(), EmitError>,
    {
        self.spill_many(1, |asm, slots| body(asm, slots[0]))
    }

    /// Reserve `count` contiguous anonymous slots in one stack adjustment
    /// pair; all released together when the scope ends.
    pub fn spill_many<F>(&mut self, count: usize, body: F) -> Result<(), EmitError>
    where
        F: FnOnce(&mut Self, &[Mem]) -> Result<(), EmitError>,
    {
        if count == 0 {
            return body(self, &[]);
        }
        let frame_bytes = 8 * count as i64;
        self.sub(Register::Rsp, frame_bytes)?;
        let base_depth = self.spill_depth;
        self.spill_depth += count;
        let slots: Vec<Mem> = (0..count)
            .map(|i| {
                let slot_index = (base_depth + i + 1) as i32;
                Mem::base(Register::Rbp).disp(-8 * slot_index)
            })
            .collect();
        let result = body(self, &slots);
        self.spill_depth = base_depth;
        let release = self.add(Register::Rsp, frame_bytes);
        result.and(release)
    }

    /// Save `reg` for the scope of `body`: `push reg` before, `pop reg`
    /// after.  The body may clobber the register freely; code outside the
    /// scope observes its pre-scope value.
    pub fn spill_reg<F>(&mut self, reg: Register, body: F) -> Result<(), EmitError>
    where
        F: FnOnce(&mut Self) -> Result<(), EmitError>,
    {
        self.push(reg)?;
        let result = body(self);
        let restore = self.pop(reg);
        result.and(restore)
    }

    // ── finalize ───────────────────────────────────────────

    /// Run the relocation patch pass and return the finished code.
    ///
    /// Consuming `self` makes a second finalize unrepresentable.  Fails if
    /// any referenced label was never bound; no buffer escapes a failed
    /// session.
    pub fn finish(mut self) -> Result<AssemblyResult, EmitError> {
        let patches = self.labels.finalize(&mut self.buf, self.base_address)?;
        let labels = self.labels.resolved_names(self.base_address);
        Ok(AssemblyResult {
            bytes: self.buf.into_bytes(),
            labels,
            patches,
            base_address: self.base_address,
        })
    }
}

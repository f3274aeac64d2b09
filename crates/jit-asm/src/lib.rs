//! # jit-asm — Pure Rust x86-64 Runtime Code Generator
//!
//! `jit-asm` is a pure Rust, zero-C-dependency library for emitting x86-64
//! machine code at runtime — one instruction per call, into a growable
//! buffer that an execution collaborator can later map executable and
//! invoke.
//!
//! ## Quick Start
//!
//! ```rust
//! use jit_asm::{Assembler, Register};
//!
//! let mut asm = Assembler::new();
//! asm.prologue();
//! asm.mov(Register::Rax, 42)?;
//! asm.ret();
//! let code = asm.finish()?.into_bytes();
//! assert_eq!(code, vec![0x55, 0x48, 0x89, 0xE5,       // push rbp; mov rbp, rsp
//!                       0xB8, 0x2A, 0x00, 0x00, 0x00, // mov eax, 42
//!                       0x48, 0x89, 0xEC, 0x5D, 0xC3]); // mov rsp, rbp; pop rbp; ret
//! # Ok::<(), jit_asm::EmitError>(())
//! ```
//!
//! ## Features
//!
//! - **Pure Rust** — no C/C++ FFI, no LLVM, no system assembler at runtime.
//! - **Programmatic emission** — typed registers/operands, no text parsing.
//! - **Labels** — forward/backward jump and call targets with deferred
//!   patching, resolved in one finalize pass.
//! - **Spill scopes** — balanced stack-slot and register borrowing with
//!   guaranteed release.
//! - **`no_std` + `alloc`** — embeddable in runtimes, sandboxes, kernels.
//!
//! The crate only *produces* bytes.  Placing them in executable memory at
//! the configured base address and calling into them is deliberately left
//! to the embedder — that boundary is what keeps this crate
//! `#![forbid(unsafe_code)]`.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]
// ── Pedantic lint policy ─────────────────────────────────────────────────
// An encoder intentionally performs many narrowing / sign-changing casts
// between integer widths and uses dense hex literals without separators
// (0x48, 0xC7, 0xDEAD).  The lints below are expected and acceptable in
// this context.
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::unreadable_literal,
    clippy::match_same_arms,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::similar_names,
    clippy::unnecessary_wraps,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc
)]

extern crate alloc;

/// Public assembler API — the per-function emission session.
pub mod assembler;
/// Growable machine-code buffer with in-place patching.
pub mod buffer;
/// x86-64 encoding primitives: REX, ModR/M, SIB, opcode descriptors.
pub mod encoder;
/// Error types.
pub mod error;
/// Label table and deferred patching.
pub mod label;
/// Registers, memory references, and operands.
pub mod operand;

// Re-exports
pub use assembler::{Assembler, AssemblyResult};
pub use buffer::CodeBuffer;
pub use encoder::Cond;
pub use error::EmitError;
pub use label::{AppliedPatch, LabelId, PatchKind};
pub use operand::{Mem, Operand, Register};

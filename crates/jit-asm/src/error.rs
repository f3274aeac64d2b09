//! Error types for instruction encoding and session finalization.

use alloc::string::String;
use core::fmt;

/// Code-generation error.
///
/// Every variant describes a caller bug detected synchronously at the
/// offending emission call, except [`EmitError::UnresolvedLabel`] and
/// [`EmitError::BranchOutOfRange`], which surface during the finalize
/// patch pass.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EmitError {
    /// Invalid operand kind or combination for the instruction.
    InvalidOperands {
        /// The mnemonic that rejected its operands.
        mnemonic: String,
        /// Description of why the operands are invalid.
        detail: String,
    },

    /// Immediate value exceeds the allowed range for the encoding.
    ImmediateOverflow {
        /// The immediate value that overflowed.
        value: i64,
        /// Minimum allowed value.
        min: i64,
        /// Maximum allowed value.
        max: i64,
    },

    /// A label with pending references was never bound to an offset.
    UnresolvedLabel {
        /// The unresolved label's name.
        label: String,
    },

    /// A label was bound a second time.
    LabelRedefined {
        /// The rebound label's name.
        label: String,
    },

    /// A short jump's target is beyond the reach of its displacement width.
    BranchOutOfRange {
        /// The target label name.
        label: String,
        /// The actual displacement to the target.
        disp: i64,
        /// Maximum allowed displacement magnitude.
        max: i64,
    },
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::InvalidOperands { mnemonic, detail } => {
                write!(f, "{}: invalid operands: {}", mnemonic, detail)
            }
            EmitError::ImmediateOverflow { value, min, max } => {
                write!(
                    f,
                    "immediate value {} out of range [{}..{}]",
                    value, min, max
                )
            }
            EmitError::UnresolvedLabel { label } => {
                write!(f, "unresolved label '{}'", label)
            }
            EmitError::LabelRedefined { label } => {
                write!(f, "label '{}' bound more than once", label)
            }
            EmitError::BranchOutOfRange { label, disp, max } => {
                write!(
                    f,
                    "branch target '{}' out of range (displacement={}, max=±{})",
                    label, disp, max
                )
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EmitError {}

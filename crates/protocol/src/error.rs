// Copyright 2025-2026 CEMAXECUTER LLC

use thiserror::Error;

/// Operator input rejected before any device interaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("MAC address is wrong length ({0} characters, expected 17)")]
    InvalidLength(usize),

    #[error("MAC address contains invalid character(s) at offset {0}")]
    InvalidCharacter(usize),

    #[error("invalid access address '{0}' (expected 8 hex digits)")]
    InvalidAccessAddress(String),

    #[error("advertising index must be 37, 38, or 39 (got {0})")]
    InvalidChannelIndex(u32),

    #[error("can tolerate 0-32 access address bit errors (got {0})")]
    BudgetOutOfRange(u32),
}

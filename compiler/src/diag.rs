// diag.rs — Unified diagnostics model
//
// Provides the shared diagnostic types used across all phases, and the
// table of stable diagnostic codes.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use crate::ast::Span;

// ── Diagnostic code ──────────────────────────────────────────────────────

/// A stable diagnostic code (e.g., `E0100`, `W0200`).
///
/// Codes are `&'static str` constants defined in the `codes` module.
/// Once assigned, a code must never be reassigned to a different meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DiagCode(pub &'static str);

impl fmt::Display for DiagCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod codes {
    use super::DiagCode;

    // ── Front-end ──
    pub const E0001: DiagCode = DiagCode("E0001"); // syntax error
    pub const E0100: DiagCode = DiagCode("E0100"); // unknown array
    pub const E0101: DiagCode = DiagCode("E0101"); // unknown induction variable
    pub const E0102: DiagCode = DiagCode("E0102"); // duplicate name
    pub const E0103: DiagCode = DiagCode("E0103"); // index count != array rank
    pub const E0104: DiagCode = DiagCode("E0104"); // zero-sized dimension
    pub const E0105: DiagCode = DiagCode("E0105"); // zero loop step
    pub const E0106: DiagCode = DiagCode("E0106"); // duplicate node in region
    pub const E0107: DiagCode = DiagCode("E0107"); // bad `set` value
    pub const E0108: DiagCode = DiagCode("E0108"); // memory space out of range
    pub const W0100: DiagCode = DiagCode("W0100"); // unknown `set` key

    // ── Scheduling ──
    pub const W0200: DiagCode = DiagCode("W0200"); // buffer violation blocked a node
    pub const W0201: DiagCode = DiagCode("W0201"); // region not legal

    // ── Verification ──
    pub const E0600: DiagCode = DiagCode("E0600"); // partition verification failed
    pub const E0601: DiagCode = DiagCode("E0601"); // schedule verification failed
}

// ── Severity level ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagLevel {
    Error,
    Warning,
}

// ── Diagnostic ───────────────────────────────────────────────────────────

/// A diagnostic emitted by any phase.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<DiagCode>,
    pub level: DiagLevel,
    pub span: Span,
    pub message: String,
    pub hint: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with no code or hint.
    pub fn new(level: DiagLevel, span: Span, message: impl Into<String>) -> Self {
        Self {
            code: None,
            level,
            span,
            message: message.into(),
            hint: None,
        }
    }

    pub fn error(code: DiagCode, span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Error, span, message).with_code(code)
    }

    pub fn warning(code: DiagCode, span: Span, message: impl Into<String>) -> Self {
        Self::new(DiagLevel::Warning, span, message).with_code(code)
    }

    /// Attach a stable diagnostic code.
    pub fn with_code(mut self, code: DiagCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Attach a remediation hint.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagLevel::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagLevel::Error => "error",
            DiagLevel::Warning => "warning",
        };
        if let Some(code) = &self.code {
            write!(f, "{}[{}]: {}", level, code, self.message)?;
        } else {
            write!(f, "{}: {}", level, self.message)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

//! Diagnostics: the error taxonomy from `spec.md` §7, and the sink every
//! non-ICE error is reported through.
//!
//! Errors never halt traversal (§7, §8): the analyser keeps a `Vec` of
//! accumulated diagnostics and a total count, mirroring
//! `original_source/semantics.cpp`'s `Semantics::AddError`. An [`Ice`]
//! is different in kind - it is a compiler bug, not a user error - and is
//! realized as a genuine panic via [`ice!`].

use std::fmt;

/// A source location. The lexer/parser (out of scope here) is the only
/// producer of real locations; tests construct them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, PartialOrd, Ord, Hash)]
pub struct Loc {
  pub line: u32,
  pub col: u32,
}

impl Loc {
  #[must_use] pub fn new(line: u32, col: u32) -> Self { Loc { line, col } }

  /// A placeholder location for synthesized nodes (inserted casts,
  /// trampolines, fixups) that have no direct source counterpart. These
  /// inherit the location of the node they were synthesized from instead,
  /// in every call site in this crate; `synthetic()` exists only for the
  /// rare case where no ancestor location is available.
  #[must_use] pub fn synthetic() -> Self { Loc::default() }
}

impl fmt::Display for Loc {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if *self == Loc::default() {
      write!(f, "<synthetic>")
    } else {
      write!(f, "{}:{}", self.line, self.col)
    }
  }
}

/// The non-ICE error taxonomy from `spec.md` §7.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
  /// Operands or arguments inconsistent with operator/parameter.
  TypeMismatch,
  /// Operator cannot be applied to the given kinds at all.
  InvalidOperand,
  /// Compile-time-detected subrange violation.
  OutOfRange,
  /// Wrong argument count to an intrinsic, builtin, or user call.
  WrongArity,
  /// Wrong argument type to an intrinsic, builtin, or user call.
  WrongArgType,
  /// Non-addressable assignment target, protected target, duplicate
  /// case label, multiple `otherwise`, incompatible I/O arguments, and
  /// similar structural errors that aren't a simple type mismatch.
  MalformedConstruct,
}

impl fmt::Display for DiagnosticKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      DiagnosticKind::TypeMismatch => "type mismatch",
      DiagnosticKind::InvalidOperand => "invalid operand",
      DiagnosticKind::OutOfRange => "out of range",
      DiagnosticKind::WrongArity => "wrong arity",
      DiagnosticKind::WrongArgType => "wrong argument type",
      DiagnosticKind::MalformedConstruct => "malformed construct",
    };
    f.write_str(s)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
  pub kind: DiagnosticKind,
  pub loc: Loc,
  pub message: String,
}

impl fmt::Display for Diagnostic {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} Error: {}", self.loc, self.message)
  }
}

/// Anything that can receive diagnostics as they're discovered. The
/// `source` parameter is the optional source-listing collaborator
/// (out of scope, §1) used to echo the offending line; implementations
/// that don't have one just ignore it, matching the original's
/// `source.PrintSource(...)` being skippable when there's no source text.
pub trait DiagnosticSink {
  fn report(&mut self, diag: &Diagnostic);
}

/// Writes diagnostics to stderr in the original's `"<loc> Error: <text>"`
/// format.
#[derive(Default)]
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
  fn report(&mut self, diag: &Diagnostic) {
    eprintln!("{diag}");
  }
}

/// Collects diagnostics in memory. Used by tests, and by any driver that
/// wants to inspect errors before deciding how to present them.
#[derive(Default, Debug)]
pub struct CollectingSink {
  pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink for CollectingSink {
  fn report(&mut self, diag: &Diagnostic) {
    self.diagnostics.push(diag.clone());
  }
}

/// Signals an Internal Compiler Error: an invariant the rest of this
/// crate assumes has been violated. This is a programming-bug signal,
/// not a user error (§7) - it is not localized, not recorded in a
/// [`DiagnosticSink`], and not recoverable.
#[macro_export]
macro_rules! ice {
  ($loc:expr, $($arg:tt)*) => {
    panic!("ICE at {}: {}", $loc, format_args!($($arg)*))
  };
}

//! Process-wide configuration, threaded explicitly rather than kept in
//! globals.
//!
//! `original_source` keeps `caseInsensitive`, `rangeCheck` and `verbosity`
//! as free globals read directly by `Stack<T>` and the type-check visitor.
//! Per `SPEC_FULL.md` §9 we thread an explicit [`Config`] instead - the
//! `Analyser` and `symtab::Stack` both take one by reference, so a driver
//! can run two independent analyses with different settings without any
//! shared mutable state.

/// Default bound on set ranges: 16 words of 32 bits, matching
/// `original_source/types.h`'s `SetDecl::MaxSetWords = 16`.
pub const DEFAULT_MAX_SET_SIZE: u32 = 16 * 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  /// Symbol lookup folds case before comparing. Pascal identifiers are
  /// traditionally case-insensitive.
  pub case_insensitive: bool,
  /// Emit `RangeCheck` (runtime-checked) instead of `RangeReduce`
  /// (unchecked) for array/subrange index normalization.
  pub range_check: bool,
  /// Trace verbosity. `0` is silent; `>= 2` matches the original's
  /// "dump every visited node" level. Mapped onto `log`'s level filter
  /// by whoever constructs the `Analyser`, not consulted directly by
  /// leaf code.
  pub verbosity: u8,
  /// Upper bound on the number of elements a `Set` type's range may
  /// span. Ranges larger than this are truncated to `[0, max_set_size)`.
  pub max_set_size: u32,
}

impl Default for Config {
  fn default() -> Self {
    Config {
      case_insensitive: true,
      range_check: true,
      verbosity: 0,
      max_set_size: DEFAULT_MAX_SET_SIZE,
    }
  }
}

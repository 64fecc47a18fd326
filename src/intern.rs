//! Symbol interning for identifiers (variable, field, enum-member and
//! procedure names).
//!
//! The original C++ front end carries `std::string` through every AST and
//! type node. We intern instead: a `Symbol` is a small `Copy` handle, and
//! equality/hashing never touches the character data. Case-folding for
//! case-insensitive lookup (`Config::case_insensitive`) happens once, at
//! intern time, in [`Interner::intern_fold`] - this is also where
//! `original_source/stack.h`'s `strlower` call before every map operation
//! would otherwise happen on every lookup instead of once per name.

use hashbrown::HashMap;
use std::rc::Rc;

/// A handle to an interned identifier. Cheap to copy, compare and hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl std::fmt::Debug for Symbol {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "Symbol({})", self.0)
  }
}

impl Default for Symbol {
  /// A placeholder handle for types that have no declared name (e.g. an
  /// anonymous `^T` pointer built directly from a resolved target). Never
  /// looked up in an [`Interner`]; only ever compared against itself.
  fn default() -> Self { Symbol(u32::MAX) }
}

/// Owns the backing storage for every interned string produced during one
/// compilation. Never shrinks; symbols remain valid for the interner's
/// entire lifetime, which in practice is the lifetime of the compilation.
#[derive(Default)]
pub struct Interner {
  strings: Vec<Rc<str>>,
  map: HashMap<Rc<str>, Symbol>,
}

impl Interner {
  #[must_use] pub fn new() -> Self { Self::default() }

  /// Intern `s` verbatim (case preserved).
  pub fn intern(&mut self, s: &str) -> Symbol {
    if let Some(&sym) = self.map.get(s) {
      return sym;
    }
    let rc: Rc<str> = Rc::from(s);
    let sym = Symbol(u32::try_from(self.strings.len()).expect("too many interned symbols"));
    self.strings.push(rc.clone());
    self.map.insert(rc, sym);
    sym
  }

  /// Intern `s`, first folding to lowercase if `case_insensitive` is set.
  /// Two names differing only in case become the same [`Symbol`] whenever
  /// `case_insensitive` is true, matching `original_source/stack.h`'s
  /// `strlower`-before-insert behaviour.
  pub fn intern_fold(&mut self, s: &str, case_insensitive: bool) -> Symbol {
    if case_insensitive && s.chars().any(char::is_uppercase) {
      self.intern(&s.to_lowercase())
    } else {
      self.intern(s)
    }
  }

  #[must_use] pub fn resolve(&self, sym: Symbol) -> &str { &self.strings[sym.0 as usize] }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn same_string_interns_to_same_symbol() {
    let mut i = Interner::new();
    let a = i.intern("foo");
    let b = i.intern("foo");
    assert_eq!(a, b);
  }

  #[test]
  fn case_folding_unifies_symbols() {
    let mut i = Interner::new();
    let a = i.intern_fold("Foo", true);
    let b = i.intern_fold("FOO", true);
    let c = i.intern_fold("foo", true);
    assert_eq!(a, b);
    assert_eq!(b, c);
  }

  #[test]
  fn case_sensitive_mode_keeps_distinct_symbols() {
    let mut i = Interner::new();
    let a = i.intern_fold("Foo", false);
    let b = i.intern_fold("foo", false);
    assert_ne!(a, b);
  }

  #[test]
  fn resolve_round_trips() {
    let mut i = Interner::new();
    let sym = i.intern("hello");
    assert_eq!(i.resolve(sym), "hello");
  }
}

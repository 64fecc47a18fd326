//! The scoped symbol stack (component C4): a stack of lexical levels,
//! each mapping a name to a binding. Grounded directly on
//! `original_source/stack.h`'s `Stack<T>` and `StackWrapper<T>`.
//!
//! `stack.h` case-folds (`strlower`) the name on every `Add`/`Find` call.
//! This crate folds once, at intern time (`intern::Interner::intern_fold`),
//! so by the time a name reaches here as a [`Symbol`] two spellings that
//! should be the same identifier already compare equal - there is nothing
//! left for this module to fold.

use crate::intern::Symbol;
use hashbrown::HashMap;
use log::trace;

type Level<T> = HashMap<Symbol, T>;

/// A stack of lexical scopes. The outermost ("global") level is opened by
/// [`Stack::new`], matching `Stack()`'s constructor calling `NewLevel()`
/// immediately.
pub struct Stack<T> {
  levels: Vec<Level<T>>,
  verbosity: u8,
}

impl<T: Clone> Stack<T> {
  #[must_use]
  pub fn new(verbosity: u8) -> Self {
    Stack { levels: vec![Level::new()], verbosity }
  }

  pub fn new_level(&mut self) { self.levels.push(Level::new()); }

  /// # Panics
  /// Panics if called with no open level beyond the outermost one -
  /// a caller bug (`NewLevel`/`DropLevel` mismatch), not a user error.
  pub fn drop_level(&mut self) {
    assert!(self.levels.len() > 1, "dropped the outermost scope level");
    self.levels.pop();
  }

  #[must_use] pub fn max_level(&self) -> usize { self.levels.len() - 1 }

  /// `Add`: bind `name` to `value` in the current (innermost) level.
  /// Returns `false` if `name` is already bound *at this level* - shadowing
  /// a name bound in an outer level is fine, a collision within the same
  /// level is a declaration-site name clash for the caller to report.
  pub fn add(&mut self, name: Symbol, value: T) -> bool {
    let level = self.levels.last_mut().expect("stack always has at least one level");
    if level.contains_key(&name) {
      return false;
    }
    if self.verbosity > 1 {
      trace!("adding value: {name:?}");
    }
    level.insert(name, value);
    true
  }

  /// `Find`, reporting the level the binding was found at (innermost is
  /// `max_level()`, outermost is `0`).
  #[must_use]
  pub fn find_at(&self, name: Symbol) -> Option<(T, usize)> {
    if self.verbosity > 1 {
      trace!("finding value: {name:?}");
    }
    for (lvl, level) in self.levels.iter().enumerate().rev() {
      if let Some(v) = level.get(&name) {
        if self.verbosity > 1 {
          trace!("found at lvl {lvl}");
        }
        return Some((v.clone(), lvl));
      }
    }
    if self.verbosity > 1 {
      trace!("not found: {name:?}");
    }
    None
  }

  #[must_use] pub fn find(&self, name: Symbol) -> Option<T> { self.find_at(name).map(|(v, _)| v) }

  /// `FindTopLevel`: only consult the innermost level, ignoring outer ones.
  #[must_use]
  pub fn find_top_level(&self, name: Symbol) -> Option<T> { self.levels.last().expect("non-empty").get(&name).cloned() }
}

/// `StackWrapper<T>`: opens a new level for its lifetime, drops it on
/// scope exit. Lets callers use ordinary block scoping instead of manual
/// `new_level`/`drop_level` pairs.
pub struct ScopeGuard<'a, T> {
  stack: &'a mut Stack<T>,
}

impl<'a, T: Clone> ScopeGuard<'a, T> {
  pub fn new(stack: &'a mut Stack<T>) -> Self {
    stack.new_level();
    ScopeGuard { stack }
  }
}

impl<T> Drop for ScopeGuard<'_, T> {
  fn drop(&mut self) { self.stack.levels.pop(); }
}

impl<T> std::ops::Deref for ScopeGuard<'_, T> {
  type Target = Stack<T>;
  fn deref(&self) -> &Stack<T> { self.stack }
}

impl<T> std::ops::DerefMut for ScopeGuard<'_, T> {
  fn deref_mut(&mut self) -> &mut Stack<T> { self.stack }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::intern::Interner;
  use pretty_assertions::assert_eq;

  #[test]
  fn add_then_find_in_same_level() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let mut s: Stack<i32> = Stack::new(0);
    assert!(s.add(x, 1));
    assert_eq!(s.find(x), Some(1));
  }

  #[test]
  fn duplicate_add_at_same_level_fails() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let mut s: Stack<i32> = Stack::new(0);
    assert!(s.add(x, 1));
    assert!(!s.add(x, 2));
    assert_eq!(s.find(x), Some(1));
  }

  #[test]
  fn inner_scope_shadows_outer() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let mut s: Stack<i32> = Stack::new(0);
    s.add(x, 1);
    {
      let mut guard = ScopeGuard::new(&mut s);
      assert!(guard.add(x, 2));
      assert_eq!(guard.find(x), Some(2));
    }
    assert_eq!(s.find(x), Some(1));
  }

  #[test]
  fn find_at_reports_declaring_level() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let mut s: Stack<i32> = Stack::new(0);
    s.add(x, 1);
    s.new_level();
    let (v, lvl) = s.find_at(x).unwrap();
    assert_eq!(v, 1);
    assert_eq!(lvl, 0);
  }

  #[test]
  fn find_top_level_ignores_outer_scopes() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let mut s: Stack<i32> = Stack::new(0);
    s.add(x, 1);
    s.new_level();
    assert_eq!(s.find_top_level(x), None);
    assert_eq!(s.find(x), Some(1));
  }

  #[test]
  fn unknown_name_is_not_found() {
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let s: Stack<i32> = Stack::new(0);
    assert_eq!(s.find(x), None);
  }

  #[test]
  fn verbose_stack_operations_do_not_panic_with_tracing_enabled() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut interner = Interner::new();
    let x = interner.intern("x");
    let mut s: Stack<i32> = Stack::new(2);
    assert!(s.add(x, 1));
    assert_eq!(s.find(x), Some(1));
    assert_eq!(s.find(interner.intern("missing")), None);
  }
}

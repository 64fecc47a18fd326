//! Deferred type resolution (`spec.md` §4.5 "Fixups"), grounded on
//! `original_source/semantics.cpp`'s `SemaFixup`/`SetRangeFixup`.
//!
//! A fixup is registered while a node is being checked but can only be
//! resolved after later context has been established (an empty set's
//! subtype arriving from an assignment target, say). Fixups run once,
//! in registration order, after the top-level traversal completes.

use crate::types::{lattice, Ty, TypeKind};

/// `SetRangeFixup`: a set type whose range still needs to be derived
/// from its (by-then-resolved) element type.
pub struct SetRangeFixup {
  pub set_ty: Ty,
  pub elem_ty: Ty,
}

impl SetRangeFixup {
  /// `DoIt()`: idempotent - if something else already gave this set a
  /// range by the time the fixup runs, do nothing.
  pub fn apply(&self, table: &crate::types::TypeTable, cfg: &crate::config::Config) {
    let TypeKind::Set(s) = &self.set_ty.kind else { crate::ice!(crate::diag::Loc::synthetic(), "SetRangeFixup on a non-set type") };
    if s.range().is_some() {
      return;
    }
    let range = lattice::set_index_range(table, cfg, &self.elem_ty);
    self.set_ty.update_set_range(range);
  }
}

pub enum Fixup {
  SetRange(SetRangeFixup),
}

impl Fixup {
  pub fn apply(&self, table: &crate::types::TypeTable, cfg: &crate::config::Config) {
    match self {
      Fixup::SetRange(f) => f.apply(table, cfg),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Config;
  use crate::types::{Range, TypeTable};

  fn set_range_of(ty: &Ty) -> Option<Ty> {
    let TypeKind::Set(s) = &ty.kind else { panic!("not a set type") };
    s.range()
  }

  #[test]
  fn fixup_derives_range_from_element_type() {
    let table = TypeTable::new();
    let cfg = Config::default();
    let elem = table.range(Range::new(0, 9), table.integer.clone());
    let set_ty = table.empty_set();
    set_ty.update_set_subtype(elem.clone());
    let fixup = Fixup::SetRange(SetRangeFixup { set_ty: set_ty.clone(), elem_ty: elem });
    fixup.apply(&table, &cfg);
    assert!(set_range_of(&set_ty).is_some());
  }

  #[test]
  fn fixup_is_idempotent_when_range_already_present() {
    let table = TypeTable::new();
    let cfg = Config::default();
    let elem = table.integer.clone();
    let set_ty = table.empty_set();
    let preset = table.range(Range::new(5, 10), table.integer.clone());
    set_ty.update_set_range(preset.clone());
    let fixup = Fixup::SetRange(SetRangeFixup { set_ty: set_ty.clone(), elem_ty: elem });
    fixup.apply(&table, &cfg);
    assert!(crate::types::ty_eq(&set_range_of(&set_ty).unwrap(), &preset));
  }
}

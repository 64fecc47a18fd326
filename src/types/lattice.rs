//! The compatibility predicates and coercion rules that sit on top of the
//! raw [`TypeKind`] data (`spec.md` §4.1). Kept separate from `types/mod.rs`
//! so the data definitions and the rules that reason about them don't blur
//! together - the same split `original_source/types.h` draws between the
//! `TypeDecl` hierarchy and the free functions in `semantics.cpp` that
//! answer `IsIntegral`/`CompatibleType`/`AssignableType` about it.

use super::{Range, Ty, TypeKind, TypeTable, ty_eq};
use crate::config::Config;

/// `Integer`, `Int64`, `Char`, `Boolean`, `Enum`, or a `Range` whose base
/// is itself integral.
#[must_use]
pub fn is_integral(t: &Ty) -> bool {
  match &t.kind {
    TypeKind::Integer | TypeKind::Int64 | TypeKind::Char | TypeKind::Boolean | TypeKind::Enum(_) => true,
    TypeKind::Range(r) => is_integral(&r.base),
    TypeKind::Field(f) => is_integral(&f.ty),
    _ => false,
  }
}

/// `IsIntegral(t)` or `Real` or `Complex`.
#[must_use]
pub fn is_numeric(t: &Ty) -> bool {
  is_integral(t) || matches!(t.kind, TypeKind::Real | TypeKind::Complex)
}

/// `String`, array-of-`Char`, or `Char` itself.
#[must_use]
pub fn is_string_like(t: &Ty) -> bool {
  match &t.kind {
    TypeKind::String(_) | TypeKind::Char => true,
    TypeKind::Array(a) => matches!(a.elem.kind, TypeKind::Char),
    _ => false,
  }
}

/// Anything not representable in a single machine scalar: arrays,
/// strings, records, variants, files, sets. Pointers, function pointers,
/// enums and subranges are all single-word and so are scalar.
#[must_use]
pub fn is_compound(t: &Ty) -> bool {
  matches!(
    t.kind,
    TypeKind::Array(_) | TypeKind::String(_) | TypeKind::Record(_) | TypeKind::Variant(_) | TypeKind::File(_) | TypeKind::Set(_)
  )
}

/// If `t` is a `Range`, its integral base; if `t` is itself integral,
/// `t`. Used to compare a subrange against its base kind without caring
/// which one the caller happened to be holding.
fn integral_base(t: &Ty) -> Option<&Ty> {
  match &t.kind {
    TypeKind::Range(r) => Some(&r.base),
    _ if is_integral(t) => Some(t),
    _ => None,
  }
}

fn is_char_like(t: &Ty) -> bool {
  matches!(integral_base(t).map(|b| &b.kind), Some(TypeKind::Char))
}

fn enum_base(t: &Ty) -> Option<&Ty> {
  let base = integral_base(t)?;
  matches!(&base.kind, TypeKind::Enum(_)).then_some(base)
}

/// The string length an array-like or string-like type can hold, for
/// fit-checking against a target string capacity.
fn string_like_size(t: &Ty) -> Option<u64> {
  match &t.kind {
    TypeKind::String(s) => Some(u64::from(s.size)),
    TypeKind::Char => Some(1),
    TypeKind::Array(a) if matches!(a.elem.kind, TypeKind::Char) && a.ranges.len() == 1 => {
      a.ranges[0].get_range().map(|r| r.size())
    }
    _ => None,
  }
}

/// `CompatibleType(a,b)`: the common super-type for a binary operation
/// between `a` and `b`, or `None` if the two are simply incompatible.
/// This is the *generic* fallback rule from `spec.md` §4.5 step 12 -
/// most binary operators have already been resolved by more specific
/// rules (`semantics::binary`) before this is ever consulted.
#[must_use]
pub fn compatible(table: &TypeTable, a: &Ty, b: &Ty) -> Option<Ty> {
  if ty_eq(a, b) {
    return Some(a.clone());
  }
  match (&a.kind, &b.kind) {
    (TypeKind::Integer, TypeKind::Int64) | (TypeKind::Int64, TypeKind::Integer) => Some(table.int64.clone()),
    _ if matches!(a.kind, TypeKind::Real) && is_numeric(b) => Some(table.real.clone()),
    _ if matches!(b.kind, TypeKind::Real) && is_numeric(a) => Some(table.real.clone()),
    _ if matches!(a.kind, TypeKind::Complex) && is_numeric(b) => Some(table.complex.clone()),
    _ if matches!(b.kind, TypeKind::Complex) && is_numeric(a) => Some(table.complex.clone()),
    _ if is_char_like(a) && is_char_like(b) => Some(table.char.clone()),
    _ if is_string_like(a) && is_string_like(b) => Some(table.string(255)),
    (TypeKind::Record(_) | TypeKind::Variant(_) | TypeKind::File(_) | TypeKind::FuncPtr(_), _) => None,
    _ => {
      let (Some(ea), Some(eb)) = (enum_base(a), enum_base(b)) else { return None };
      ty_eq(ea, eb).then(|| ea.clone())
    }
  }
}

/// `AssignableType(target, source)`: the type `source` must be coerced to
/// in order to be assigned into a `target`-typed location, or `None` if
/// no coercion exists.
#[must_use]
pub fn assignable(table: &TypeTable, target: &Ty, source: &Ty) -> Option<Ty> {
  if ty_eq(target, source) {
    return Some(target.clone());
  }
  match (&target.kind, &source.kind) {
    (TypeKind::Int64, TypeKind::Integer) | (TypeKind::Integer, TypeKind::Int64) => Some(target.clone()),
    (TypeKind::Real, _) if is_numeric(source) => Some(target.clone()),
    (TypeKind::Complex, _) if is_numeric(source) => Some(target.clone()),
    _ if is_char_like(target) && is_char_like(source) => Some(target.clone()),
    (TypeKind::Record(_) | TypeKind::Variant(_) | TypeKind::File(_) | TypeKind::FuncPtr(_), _) => None,
    (TypeKind::String(cap), _) => string_like_size(source).filter(|&n| n <= u64::from(cap.size)).map(|_| target.clone()),
    (TypeKind::Array(arr), _) if matches!(arr.elem.kind, TypeKind::Char) && arr.ranges.len() == 1 => {
      let target_len = arr.ranges[0].get_range()?.size();
      string_like_size(source).filter(|&n| n <= target_len).map(|_| target.clone())
    }
    (TypeKind::Set(_), TypeKind::Set(src)) if src.range().is_none() && src.subtype().is_none() => Some(target.clone()),
    _ => {
      let (Some(et), Some(es)) = (enum_base(target), enum_base(source)) else { return compatible(table, target, source).filter(|c| ty_eq(c, target)) };
      ty_eq(et, es).then(|| target.clone())
    }
  }
}

/// Clip `range` to `[0, max_set_size)` when it exceeds the configured
/// bound (`spec.md` §3.1, §4.1: "if the base range exceeds this, the
/// range is truncated to `[0, MaxSetSize-1]`").
#[must_use]
pub fn bounded_set_range(cfg: &Config, range: Range) -> Range {
  if range.size() > u64::from(cfg.max_set_size) {
    Range::new(0, i64::from(cfg.max_set_size) - 1)
  } else {
    range
  }
}

/// `GetRangeDecl`: the provisional index range for a set built over
/// element type `elem`, truncated per [`bounded_set_range`]. Used both
/// when an element type is known up front and by `semantics::fixup`'s
/// deferred resolution.
#[must_use]
pub fn set_index_range(table: &TypeTable, cfg: &Config, elem: &Ty) -> Ty {
  let range = elem.get_range().unwrap_or_else(|| Range::new(0, i64::from(cfg.max_set_size) - 1));
  table.range(bounded_set_range(cfg, range), table.integer.clone())
}

#[must_use]
pub fn is_pointer(t: &Ty) -> bool { matches!(t.kind, TypeKind::Pointer(_)) }

#[must_use]
pub fn is_set(t: &Ty) -> bool { matches!(t.kind, TypeKind::Set(_)) }

#[must_use]
pub fn is_boolean(t: &Ty) -> bool { matches!(t.kind, TypeKind::Boolean) }

#[must_use]
pub fn is_complex(t: &Ty) -> bool { matches!(t.kind, TypeKind::Complex) }

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn table() -> TypeTable { TypeTable::new() }

  #[test]
  fn integral_covers_enum_and_char_subrange() {
    let t = table();
    assert!(is_integral(&t.integer));
    assert!(is_integral(&t.char));
    let sub = t.range(Range::new(0, 10), t.char.clone());
    assert!(is_integral(&sub));
    assert!(!is_integral(&t.real));
  }

  #[test]
  fn numeric_includes_real_and_complex() {
    let t = table();
    assert!(is_numeric(&t.real));
    assert!(is_numeric(&t.complex));
    assert!(is_numeric(&t.integer));
  }

  #[test]
  fn string_like_covers_char_arrays() {
    let t = table();
    let r = t.range(Range::new(0, 9), t.integer.clone());
    let arr = t.array(vec![r], t.char.clone());
    assert!(is_string_like(&arr));
    assert!(is_string_like(&t.char));
    assert!(!is_string_like(&t.integer));
  }

  #[test]
  fn compatible_widens_integer_to_int64() {
    let t = table();
    let c = compatible(&t, &t.integer, &t.int64).unwrap();
    assert!(ty_eq(&c, &t.int64));
  }

  #[test]
  fn compatible_promotes_to_real() {
    let t = table();
    let c = compatible(&t, &t.integer, &t.real).unwrap();
    assert!(ty_eq(&c, &t.real));
  }

  #[test]
  fn assignable_rejects_record_structural_mismatch() {
    let t = table();
    let r1 = t.record(vec![], None);
    let r2 = t.record(vec![], None);
    assert!(assignable(&t, &r1, &r2).is_none());
  }

  #[test]
  fn assignable_char_array_checks_capacity() {
    let t = table();
    let small = t.array(vec![t.range(Range::new(0, 2), t.integer.clone())], t.char.clone());
    let big = t.string(10);
    assert!(assignable(&t, &small, &big).is_none());
    let fits = t.string(2);
    assert!(assignable(&t, &small, &fits).is_some());
  }

  #[test]
  fn set_bounds_truncate_oversized_ranges() {
    let cfg = Config::default();
    let huge = Range::new(0, 10_000);
    let clipped = bounded_set_range(&cfg, huge);
    assert_eq!(clipped.size(), u64::from(cfg.max_set_size));
  }
}

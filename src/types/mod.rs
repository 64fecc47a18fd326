//! The type lattice (component C1): every type kind the front end knows
//! about, plus the structural-equality rule that ties them together.
//!
//! Types are heap-allocated once and shared via `Rc` for the remainder of
//! the compilation - there is no explicit deallocation (`spec.md` §5), and
//! a `TypeDecl` is never mutated away from under a live reference except
//! through the specific late-binding cells documented below (`Pointer`'s
//! `target`, `Set`'s `range`/`subtype`). This is the Rust realization of
//! "arena-allocated nodes with stable handles" from `SPEC_FULL.md` §3, but
//! not the same realization the teacher's own front end uses for this
//! layer - `mmcc`'s typed tree is `ty::Ty<'a>`/`ty::TyKind<'a>`, arena
//! nodes tied to a lifetime. `Rc<TyKind>`/`Rc<ExprKind>` is instead how
//! this corpus's sibling MIR layer (`types::mir`, downstream of the typed
//! tree) represents *its* nodes. We borrow that shape for the typed tree
//! itself rather than the arena-lifetime one because a self-referential
//! `&'a` arena is one of the harder patterns to get right without a
//! compiler in the loop, and this crate is written without ever invoking
//! one - see `DESIGN.md` for the full tradeoff.

pub mod lattice;
pub mod range;

pub use range::Range;

use crate::intern::Symbol;
use std::cell::{OnceCell, RefCell};
use std::rc::Rc;

/// A shared handle to a type. `Rc` rather than a raw arena reference -
/// see the module doc comment.
pub type Ty = Rc<TypeDecl>;

/// An ordered, named parameter of a [`TypeKind::FuncPtr`] signature.
#[derive(Debug, Clone)]
pub struct Param {
  pub name: Symbol,
  pub ty: Ty,
  /// `var` parameters in Pascal: the argument must be addressable.
  pub by_ref: bool,
}

impl PartialEq for Param {
  fn eq(&self, other: &Self) -> bool { self.by_ref == other.by_ref && ty_eq(&self.ty, &other.ty) }
}

/// A field of a [`TypeKind::Record`] or [`TypeKind::Variant`]. A field is
/// itself a type kind (`original_source/types.h`'s `FieldDecl : TypeDecl`),
/// not a bare payload - it carries its own backend type and participates
/// in the same singleton/equality machinery as everything else.
#[derive(Debug, Clone)]
pub struct FieldTy {
  pub name: Symbol,
  pub ty: Ty,
}

impl PartialEq for FieldTy {
  fn eq(&self, other: &Self) -> bool { self.name == other.name && ty_eq(&self.ty, &other.ty) }
}

/// `Array`: one or more index ranges plus an element type.
#[derive(Debug, Clone)]
pub struct ArrayTy {
  pub ranges: Vec<Ty>,
  pub elem: Ty,
}

/// `Range`/subrange: an inclusive interval plus its base (integral) type.
#[derive(Debug, Clone)]
pub struct RangeTy {
  pub range: Range,
  pub base: Ty,
}

/// `String`: a fixed-capacity array of `Char`, indexed `[0, size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringTy {
  pub size: u32,
}

/// `Enum`: an ordered list of `(name, ordinal)` pairs, ordinals assigned
/// `0..n-1` by declaration order.
#[derive(Debug, Clone)]
pub struct EnumTy {
  pub values: Vec<(Symbol, i64)>,
}

/// `Pointer`: either *incomplete* (only a name, awaiting resolution) or
/// *resolved* (a target type). The transition from incomplete to
/// resolved is one-way (`spec.md` §3.1); enforced by
/// [`TypeDecl::resolve_pointer`] rather than by exposing `target`
/// directly.
#[derive(Debug)]
pub struct PointerTy {
  pub name: Symbol,
  target: RefCell<Option<Ty>>,
}

impl PointerTy {
  #[must_use] pub fn is_incomplete(&self) -> bool { self.target.borrow().is_none() }
  #[must_use] pub fn target(&self) -> Option<Ty> { self.target.borrow().clone() }
}

/// `Record`: ordered fields (each a [`TypeKind::Field`]) plus an optional
/// variant part. Field names are unique within the record (enforced by
/// the builder, not here).
#[derive(Debug, Clone)]
pub struct RecordTy {
  pub fields: Vec<Ty>,
  pub variant: Option<Ty>,
}

/// `Variant`: the variant part of a record, itself a list of fields.
#[derive(Debug, Clone)]
pub struct VariantTy {
  pub fields: Vec<Ty>,
}

/// `FuncPtr`: a procedure/function signature.
#[derive(Debug, Clone)]
pub struct FuncPtrTy {
  pub params: Vec<Param>,
  pub ret: Ty,
}

/// `File`/`Text`: a file of some element type. `Text` is `File` of
/// `Char` with `is_text` set, per `original_source/types.h`'s
/// `TextDecl : FileDecl`.
#[derive(Debug, Clone)]
pub struct FileTy {
  pub elem: Ty,
  pub is_text: bool,
}

/// `Set`: an optional index range and optional element type, both
/// resolvable only via later context (empty-set literals, forward
/// references). Resolved in place by [`TypeDecl::update_set_range`] /
/// [`TypeDecl::update_set_subtype`] - see `semantics::fixup` and
/// `semantics::binary`.
#[derive(Debug)]
pub struct SetTy {
  range: RefCell<Option<Ty>>,
  subtype: RefCell<Option<Ty>>,
}

impl SetTy {
  #[must_use] pub fn range(&self) -> Option<Ty> { self.range.borrow().clone() }
  #[must_use] pub fn subtype(&self) -> Option<Ty> { self.subtype.borrow().clone() }
}

#[derive(Debug)]
pub enum TypeKind {
  Integer,
  Int64,
  Real,
  Char,
  Boolean,
  Complex,
  Void,
  Array(ArrayTy),
  String(StringTy),
  Range(RangeTy),
  Enum(EnumTy),
  Pointer(PointerTy),
  Field(FieldTy),
  Record(RecordTy),
  Variant(VariantTy),
  FuncPtr(FuncPtrTy),
  File(FileTy),
  Set(SetTy),
}

/// The concrete backend representation a code generator would need.
/// Computed lazily and memoized on [`TypeDecl`] (`LlvmType()` in the
/// original; `spec.md` §6 requires the call be idempotent).
#[derive(Debug, Clone, PartialEq)]
pub enum BackendTy {
  I8,
  I32,
  I64,
  F64,
  Bool,
  Void,
  Complex,
  Ptr(Box<BackendTy>),
  Array(Box<BackendTy>, u64),
  /// Struct layout, one entry per field in declaration order. The
  /// variant part (if any) is appended as a single trailing entry.
  Struct(Vec<BackendTy>),
  FuncPtr,
  /// A set's backend representation: a bit-vector `size` bits wide,
  /// rounded up to whole 32-bit words exactly as
  /// `original_source/types.h`'s `MaxSetWords` does.
  SetWords(u32),
}

#[derive(Debug)]
pub struct TypeDecl {
  pub kind: TypeKind,
  backend: OnceCell<BackendTy>,
}

impl TypeDecl {
  #[must_use] pub fn new(kind: TypeKind) -> Ty { Rc::new(TypeDecl { kind, backend: OnceCell::new() }) }

  /// The backend type a code generator would emit for this type.
  /// Idempotent: computed once, memoized thereafter (`spec.md` §6).
  pub fn backend_type(&self) -> BackendTy {
    self.backend.get_or_init(|| self.compute_backend_type()).clone()
  }

  fn compute_backend_type(&self) -> BackendTy {
    match &self.kind {
      TypeKind::Integer | TypeKind::Int64 => BackendTy::I64,
      TypeKind::Real => BackendTy::F64,
      TypeKind::Char => BackendTy::I8,
      TypeKind::Boolean => BackendTy::Bool,
      TypeKind::Complex => BackendTy::Complex,
      TypeKind::Void => BackendTy::Void,
      TypeKind::Array(a) => {
        let count: u64 = a
          .ranges
          .iter()
          .map(|r| r.get_range().unwrap_or_else(|| crate::ice!(crate::diag::Loc::synthetic(), "array range not resolved")).size())
          .product();
        BackendTy::Array(Box::new(a.elem.backend_type()), count)
      }
      TypeKind::String(s) => BackendTy::Array(Box::new(BackendTy::I8), u64::from(s.size) + 1),
      TypeKind::Range(r) => r.base.backend_type(),
      TypeKind::Enum(_) => BackendTy::I64,
      TypeKind::Pointer(p) => BackendTy::Ptr(Box::new(
        p.target().map_or(BackendTy::Void, |t| t.backend_type()),
      )),
      TypeKind::Field(f) => f.ty.backend_type(),
      TypeKind::Record(r) => {
        let mut fields: Vec<_> = r.fields.iter().map(|f| f.backend_type()).collect();
        if let Some(v) = &r.variant {
          fields.push(v.backend_type());
        }
        BackendTy::Struct(fields)
      }
      TypeKind::Variant(v) => BackendTy::Struct(v.fields.iter().map(|f| f.backend_type()).collect()),
      TypeKind::FuncPtr(_) => BackendTy::FuncPtr,
      TypeKind::File(_) => BackendTy::Ptr(Box::new(BackendTy::I64)),
      TypeKind::Set(s) => {
        let bits = s.range().map_or(0, |r| r.get_range().map_or(0, |r| r.size()));
        BackendTy::SetWords(u32::try_from(bits.div_ceil(32)).unwrap_or(u32::MAX))
      }
    }
  }

  /// `GetRange()`: the inclusive range backing this type, if it has one
  /// directly (subranges) or via its declared index (arrays are not
  /// covered here - see [`ArrayTy::ranges`] for those).
  #[must_use] pub fn get_range(&self) -> Option<Range> {
    match &self.kind {
      TypeKind::Range(r) => Some(r.range),
      TypeKind::Enum(e) => Some(Range::new(0, (e.values.len() as i64) - 1)),
      TypeKind::Field(f) => f.ty.get_range(),
      _ => None,
    }
  }

  /// Resolve an incomplete pointer to its target. One-way: panics (an
  /// ICE, since this indicates a logic error in the caller, never a
  /// user-facing condition) if called twice.
  ///
  /// # Panics
  /// Panics if `self` is not a [`TypeKind::Pointer`], or if it is
  /// already resolved.
  pub fn resolve_pointer(&self, target: Ty) {
    let TypeKind::Pointer(p) = &self.kind else { crate::ice!(crate::diag::Loc::synthetic(), "resolve_pointer on non-pointer type") };
    let mut slot = p.target.borrow_mut();
    assert!(slot.is_none(), "pointer already resolved");
    *slot = Some(target);
  }

  /// Late-bind a set's range (`SetDecl::UpdateRange` in the original).
  /// Used by `semantics::binary::update_set_range` and
  /// `semantics::fixup::SetRangeFixup`.
  ///
  /// # Panics
  /// Panics if `self` is not a [`TypeKind::Set`].
  pub fn update_set_range(&self, range: Ty) {
    let TypeKind::Set(s) = &self.kind else { crate::ice!(crate::diag::Loc::synthetic(), "update_set_range on non-set type") };
    *s.range.borrow_mut() = Some(range);
  }

  /// Late-bind a set's element type (`SetDecl::UpdateSubtype`).
  ///
  /// # Panics
  /// Panics if `self` is not a [`TypeKind::Set`].
  pub fn update_set_subtype(&self, subtype: Ty) {
    let TypeKind::Set(s) = &self.kind else { crate::ice!(crate::diag::Loc::synthetic(), "update_set_subtype on non-set type") };
    *s.subtype.borrow_mut() = Some(subtype);
  }
}

impl PartialEq for TypeDecl {
  fn eq(&self, other: &Self) -> bool { kind_eq(&self.kind, &other.kind) }
}

impl Eq for TypeDecl {}

/// Structural equality for type handles, per `spec.md` §4.1's `equal(a,b)`.
/// Takes a pointer-identity fast path first (most comparisons in this
/// crate are between a variable's declared type and itself or a
/// singleton), which also happens to be what keeps recursive record
/// types (`type Node = record next: ^Node end`) from recursing forever:
/// see [`TypeKind`'s `Pointer` case in `kind_eq`], which never descends
/// into the pointee's structure, only its identity.
#[must_use] pub fn ty_eq(a: &Ty, b: &Ty) -> bool {
  Rc::ptr_eq(a, b) || kind_eq(&a.kind, &b.kind)
}

fn opt_ty_eq(a: &Option<Ty>, b: &Option<Ty>) -> bool {
  match (a, b) {
    (Some(x), Some(y)) => ty_eq(x, y),
    (None, None) => true,
    _ => false,
  }
}

/// Pointer targets are compared by identity only, never recursed into -
/// this is what makes `kind_eq` total on recursive Pascal types (every
/// cycle in a legal type graph passes through a `Pointer`, since direct
/// self-embedding would be infinite in size).
fn opt_ty_ptr_eq(a: &Option<Ty>, b: &Option<Ty>) -> bool {
  match (a, b) {
    (Some(x), Some(y)) => Rc::ptr_eq(x, y),
    (None, None) => true,
    _ => false,
  }
}

fn kind_eq(a: &TypeKind, b: &TypeKind) -> bool {
  match (a, b) {
    (TypeKind::Integer, TypeKind::Integer)
    | (TypeKind::Int64, TypeKind::Int64)
    | (TypeKind::Real, TypeKind::Real)
    | (TypeKind::Char, TypeKind::Char)
    | (TypeKind::Boolean, TypeKind::Boolean)
    | (TypeKind::Complex, TypeKind::Complex)
    | (TypeKind::Void, TypeKind::Void) => true,
    (TypeKind::Array(x), TypeKind::Array(y)) => {
      x.ranges.len() == y.ranges.len()
        && x.ranges.iter().zip(&y.ranges).all(|(p, q)| ty_eq(p, q))
        && ty_eq(&x.elem, &y.elem)
    }
    (TypeKind::String(x), TypeKind::String(y)) => x == y,
    (TypeKind::Range(x), TypeKind::Range(y)) => x.range == y.range && ty_eq(&x.base, &y.base),
    (TypeKind::Enum(x), TypeKind::Enum(y)) => x.values == y.values,
    (TypeKind::Pointer(x), TypeKind::Pointer(y)) => {
      if x.is_incomplete() || y.is_incomplete() {
        x.is_incomplete() && y.is_incomplete() && x.name == y.name
      } else {
        opt_ty_ptr_eq(&x.target.borrow(), &y.target.borrow())
      }
    }
    (TypeKind::Field(x), TypeKind::Field(y)) => x == y,
    (TypeKind::Record(x), TypeKind::Record(y)) => {
      x.fields.len() == y.fields.len()
        && x.fields.iter().zip(&y.fields).all(|(p, q)| ty_eq(p, q))
        && opt_ty_eq(&x.variant, &y.variant)
    }
    (TypeKind::Variant(x), TypeKind::Variant(y)) => {
      x.fields.len() == y.fields.len() && x.fields.iter().zip(&y.fields).all(|(p, q)| ty_eq(p, q))
    }
    (TypeKind::FuncPtr(x), TypeKind::FuncPtr(y)) => {
      x.params == y.params && ty_eq(&x.ret, &y.ret)
    }
    (TypeKind::File(x), TypeKind::File(y)) => x.is_text == y.is_text && ty_eq(&x.elem, &y.elem),
    (TypeKind::Set(x), TypeKind::Set(y)) => {
      opt_ty_eq(&x.range.borrow(), &y.range.borrow()) && opt_ty_eq(&x.subtype.borrow(), &y.subtype.borrow())
    }
    _ => false,
  }
}

/// A program-lifetime table of the named primitive singletons
/// (`spec.md` §3.1: "named primitives are singletons accessible by
/// kind"), plus constructors for the structural types built from them.
pub struct TypeTable {
  pub integer: Ty,
  pub int64: Ty,
  pub real: Ty,
  pub char: Ty,
  pub boolean: Ty,
  pub complex: Ty,
  pub void: Ty,
}

impl Default for TypeTable {
  fn default() -> Self {
    TypeTable {
      integer: TypeDecl::new(TypeKind::Integer),
      int64: TypeDecl::new(TypeKind::Int64),
      real: TypeDecl::new(TypeKind::Real),
      char: TypeDecl::new(TypeKind::Char),
      boolean: TypeDecl::new(TypeKind::Boolean),
      complex: TypeDecl::new(TypeKind::Complex),
      void: TypeDecl::new(TypeKind::Void),
    }
  }
}

impl TypeTable {
  #[must_use] pub fn new() -> Self { Self::default() }

  #[must_use] pub fn string(&self, size: u32) -> Ty { TypeDecl::new(TypeKind::String(StringTy { size })) }

  #[must_use] pub fn array(&self, ranges: Vec<Ty>, elem: Ty) -> Ty {
    assert!(!ranges.is_empty(), "Empty range not allowed");
    TypeDecl::new(TypeKind::Array(ArrayTy { ranges, elem }))
  }

  #[must_use] pub fn range(&self, range: Range, base: Ty) -> Ty { TypeDecl::new(TypeKind::Range(RangeTy { range, base })) }

  #[must_use] pub fn enum_type(&self, names: Vec<Symbol>) -> Ty {
    assert!(!names.is_empty(), "Must have names in the enum type.");
    let values = names.into_iter().enumerate().map(|(i, n)| (n, i as i64)).collect();
    TypeDecl::new(TypeKind::Enum(EnumTy { values }))
  }

  /// An incomplete pointer, awaiting a later call to
  /// [`TypeDecl::resolve_pointer`].
  #[must_use] pub fn incomplete_pointer(&self, name: Symbol) -> Ty {
    TypeDecl::new(TypeKind::Pointer(PointerTy { name, target: RefCell::new(None) }))
  }

  /// A resolved pointer to `target` directly (used for anonymous
  /// `^T` types that never go through the incomplete phase).
  #[must_use] pub fn pointer_to(&self, target: Ty) -> Ty {
    TypeDecl::new(TypeKind::Pointer(PointerTy { name: crate::intern::Symbol::default(), target: RefCell::new(Some(target)) }))
  }

  #[must_use] pub fn field(&self, name: Symbol, ty: Ty) -> Ty { TypeDecl::new(TypeKind::Field(FieldTy { name, ty })) }

  /// `fields` must each be a [`TypeKind::Field`] built via
  /// [`TypeTable::field`].
  #[must_use] pub fn record(&self, fields: Vec<Ty>, variant: Option<Ty>) -> Ty {
    TypeDecl::new(TypeKind::Record(RecordTy { fields, variant }))
  }

  /// `fields` must each be a [`TypeKind::Field`] built via
  /// [`TypeTable::field`].
  #[must_use] pub fn variant(&self, fields: Vec<Ty>) -> Ty { TypeDecl::new(TypeKind::Variant(VariantTy { fields })) }

  #[must_use] pub fn func_ptr(&self, params: Vec<Param>, ret: Ty) -> Ty {
    TypeDecl::new(TypeKind::FuncPtr(FuncPtrTy { params, ret }))
  }

  #[must_use] pub fn file_of(&self, elem: Ty) -> Ty { TypeDecl::new(TypeKind::File(FileTy { elem, is_text: false })) }

  #[must_use] pub fn text(&self) -> Ty { TypeDecl::new(TypeKind::File(FileTy { elem: self.char.clone(), is_text: true })) }

  /// An empty set literal's type: no range, no element type yet; both
  /// are resolved later from context (`spec.md` §3.1, §4.5).
  #[must_use] pub fn empty_set(&self) -> Ty {
    TypeDecl::new(TypeKind::Set(SetTy { range: RefCell::new(None), subtype: RefCell::new(None) }))
  }

  #[must_use] pub fn set_of(&self, range: Ty, subtype: Ty) -> Ty {
    TypeDecl::new(TypeKind::Set(SetTy { range: RefCell::new(Some(range)), subtype: RefCell::new(Some(subtype)) }))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn table() -> TypeTable { TypeTable::new() }

  #[test]
  fn primitives_are_singletons_in_a_table() {
    let t = table();
    assert!(ty_eq(&t.integer, &t.integer));
    assert!(Rc::ptr_eq(&t.integer, &t.integer));
  }

  #[test]
  fn distinct_primitive_kinds_are_unequal() {
    let t = table();
    assert!(!ty_eq(&t.integer, &t.real));
  }

  #[test]
  fn arrays_compare_structurally() {
    let t = table();
    let r1 = t.range(Range::new(1, 10), t.integer.clone());
    let r2 = t.range(Range::new(1, 10), t.integer.clone());
    let a1 = t.array(vec![r1], t.integer.clone());
    let a2 = t.array(vec![r2], t.integer.clone());
    assert!(!Rc::ptr_eq(&a1, &a2));
    assert!(ty_eq(&a1, &a2));
  }

  #[test]
  fn recursive_pointer_record_does_not_diverge() {
    let t = table();
    let name = crate::intern::Interner::new().intern("Node");
    let ptr = t.incomplete_pointer(name);
    let rec = t.record(vec![t.field(name, ptr.clone())], None);
    ptr.resolve_pointer(rec.clone());
    // Comparing the recursive type to itself must terminate.
    assert!(ty_eq(&rec, &rec));
    // A second, independently-built isomorphic type is not field-equal,
    // because pointer identity (not structure) gates the recursive edge.
    let ptr2 = t.incomplete_pointer(name);
    let rec2 = t.record(vec![t.field(name, ptr2.clone())], None);
    ptr2.resolve_pointer(rec2.clone());
    assert!(!ty_eq(&rec, &rec2));
  }

  #[test]
  fn set_equality_accounts_for_unresolved_fields() {
    let t = table();
    let s1 = t.empty_set();
    let s2 = t.empty_set();
    assert!(ty_eq(&s1, &s2));
    s1.update_set_subtype(t.integer.clone());
    assert!(!ty_eq(&s1, &s2));
  }

  #[test]
  fn backend_type_is_memoized() {
    let t = table();
    let first = t.integer.backend_type();
    let second = t.integer.backend_type();
    assert_eq!(first, second);
    assert_eq!(first, BackendTy::I64);
  }
}

//! Compile-time constant representation and folding (component C2):
//! typed constant variants plus arithmetic/relational/intrinsic
//! evaluation, grounded in `original_source/constants.cpp`.
//!
//! Folding never panics on bad input - it returns `None` so the caller
//! (the semantic pass, or a constant-expression parser) can fall back to
//! a runtime-evaluated expression instead, per `spec.md` §7: "Constant
//! folding returns a null constant on failure". Arity/type mismatches in
//! [`eval_intrinsic`] report through the caller-supplied
//! [`crate::diag::DiagnosticSink`]; arithmetic operand mismatches are
//! reported the way `original_source/constants.cpp`'s `ErrorConst` does,
//! straight to stderr - see `DESIGN.md`'s Open Question note on this.

use crate::diag::Loc;
use crate::intern::Symbol;
use crate::types::{Range, Ty};
use bit_set::BitSet;

#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
  Int(i64),
  Real(f64),
  Char(u8),
  Bool(bool),
  String(String),
  /// An enum member: the enum's type plus its ordinal.
  Enum(Ty, i64),
  Range(Range),
  /// Bit-indexed membership over an integral domain, offset by the
  /// set's range's `start` (so element `v` lives at bit `v - start`).
  Set(BitSet),
  /// An expression that could not be folded to a scalar at this point;
  /// carried through so the semantic pass can still type it.
  Compound,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstDecl {
  pub value: ConstValue,
  pub loc: Loc,
}

impl ConstDecl {
  #[must_use] pub fn new(value: ConstValue, loc: Loc) -> Self { ConstDecl { value, loc } }
  #[must_use] pub fn int(v: i64, loc: Loc) -> Self { ConstDecl::new(ConstValue::Int(v), loc) }
  #[must_use] pub fn real(v: f64, loc: Loc) -> Self { ConstDecl::new(ConstValue::Real(v), loc) }
  #[must_use] pub fn char(v: u8, loc: Loc) -> Self { ConstDecl::new(ConstValue::Char(v), loc) }
  #[must_use] pub fn bool(v: bool, loc: Loc) -> Self { ConstDecl::new(ConstValue::Bool(v), loc) }
  #[must_use] pub fn string(v: impl Into<String>, loc: Loc) -> Self { ConstDecl::new(ConstValue::String(v.into()), loc) }
}

/// `ToInt(c)`: the ordinal of any integral constant.
#[must_use]
pub fn to_int(c: &ConstDecl) -> Option<i64> {
  match &c.value {
    ConstValue::Int(v) => Some(*v),
    ConstValue::Char(v) => Some(i64::from(*v)),
    ConstValue::Bool(v) => Some(i64::from(*v)),
    ConstValue::Enum(_, ord) => Some(*ord),
    _ => None,
  }
}

/// `ToReal(c)`: a real value, promoting integers.
#[must_use]
pub fn to_real(c: &ConstDecl) -> Option<f64> {
  match &c.value {
    ConstValue::Real(v) => Some(*v),
    _ => to_int(c).map(|v| v as f64),
  }
}

fn as_string_like(c: &ConstDecl) -> Option<String> {
  match &c.value {
    ConstValue::String(s) => Some(s.clone()),
    ConstValue::Char(ch) => Some((*ch as char).to_string()),
    _ => None,
  }
}

/// `original_source/constants.cpp`'s `ErrorConst`: writes directly to
/// the error stream and returns `None`, bypassing any
/// [`crate::diag::DiagnosticSink`]. Retained verbatim - see `DESIGN.md`.
fn error_const(msg: &str) -> Option<ConstDecl> {
  eprintln!("Error: {msg}");
  None
}

/// The four arithmetic operators foldable per `spec.md` §4.2's dispatch
/// table: `+ - * /`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
  Add,
  Sub,
  Mul,
  Div,
}

impl ArithOp {
  fn name(self) -> &'static str {
    match self {
      ArithOp::Add => "+",
      ArithOp::Sub => "-",
      ArithOp::Mul => "*",
      ArithOp::Div => "/",
    }
  }
}

/// `operator+`/`-`/`*`/`/` on [`ConstDecl`]s. Dispatch: real if either
/// side is real and both are numeric; else integer if both are
/// integers; else (`+` only) string concatenation if both sides are
/// string-like; else an error.
///
/// The `+` path queries [`to_real`]/[`to_int`] with operands swapped
/// (`rhs` before `lhs`) relative to `-`/`*`/`/`. This mirrors
/// `original_source/constants.cpp`'s `operator+` calling
/// `DoRealMath(rhs, lhs, ...)` while `operator-`/`*`/`/` call
/// `DoRealMath(lhs, rhs, ...)`. Harmless for these commutative
/// operators; retained verbatim per `spec.md` §9.
#[must_use]
pub fn fold_arithmetic(op: ArithOp, lhs: &ConstDecl, rhs: &ConstDecl, loc: Loc) -> Option<ConstDecl> {
  let (real_l, real_r) = if op == ArithOp::Add { (rhs, lhs) } else { (lhs, rhs) };
  if let (Some(l), Some(r)) = (to_real_if_numeric(real_l), to_real_if_numeric(real_r)) {
    let v = match op {
      ArithOp::Add => l + r,
      ArithOp::Sub => l - r,
      ArithOp::Mul => l * r,
      ArithOp::Div => l / r,
    };
    return Some(ConstDecl::real(v, loc));
  }
  if let (ConstValue::Int(l), ConstValue::Int(r)) = (&lhs.value, &rhs.value) {
    let v = match op {
      ArithOp::Add => l.wrapping_add(*r),
      ArithOp::Sub => l.wrapping_sub(*r),
      ArithOp::Mul => l.wrapping_mul(*r),
      ArithOp::Div => {
        if *r == 0 {
          return error_const(&format!("Invalid operand for {}", op.name()));
        }
        l.wrapping_div(*r)
      }
    };
    return Some(ConstDecl::int(v, loc));
  }
  if op == ArithOp::Add {
    if let (Some(l), Some(r)) = (as_string_like(lhs), as_string_like(rhs)) {
      return Some(ConstDecl::string(l + &r, loc));
    }
  }
  error_const(&format!("Invalid operand for {}", op.name()))
}

/// Only `Real`/`Int` constants are numeric inputs to arithmetic folding
/// (booleans, chars, enums require an explicit `ord`/`chr` first,
/// matching `GetAsReal`'s `dyn_cast<RealConstDecl>`/`IntConstDecl`).
fn to_real_if_numeric(c: &ConstDecl) -> Option<f64> {
  match &c.value {
    ConstValue::Real(v) => Some(*v),
    ConstValue::Int(v) => Some(*v as f64),
    _ => None,
  }
}

/// Bit-wise and modulo operators: integers only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntOp {
  Mod,
  And,
  Or,
  Xor,
  Shl,
  Shr,
}

impl IntOp {
  fn name(self) -> &'static str {
    match self {
      IntOp::Mod => "mod",
      IntOp::And => "and",
      IntOp::Or => "or",
      IntOp::Xor => "xor",
      IntOp::Shl => "shl",
      IntOp::Shr => "shr",
    }
  }
}

#[must_use]
pub fn fold_int_op(op: IntOp, lhs: &ConstDecl, rhs: &ConstDecl, loc: Loc) -> Option<ConstDecl> {
  let (ConstValue::Int(l), ConstValue::Int(r)) = (&lhs.value, &rhs.value) else {
    return error_const(&format!("Invalid operand for {}", op.name()));
  };
  let v = match op {
    IntOp::Mod => {
      if *r == 0 {
        return error_const("Invalid operand for mod");
      }
      l.wrapping_rem(*r)
    }
    IntOp::And => l & r,
    IntOp::Or => l | r,
    IntOp::Xor => l ^ r,
    IntOp::Shl => l.wrapping_shl(*r as u32),
    IntOp::Shr => l.wrapping_shr(*r as u32),
  };
  Some(ConstDecl::int(v, loc))
}

/// `Pow(base, expInt)`: integer exponent, supports integer and real
/// bases. Negative exponents return `1 / x^|y|` - for an integer base
/// this truncates to `0` unless `|x| == 1` (see the folding-scenario
/// test `pow_negative_exponent_truncates`).
#[must_use]
pub fn pow(base: &ConstDecl, exp_int: i64, loc: Loc) -> Option<ConstDecl> {
  match &base.value {
    ConstValue::Int(b) => {
      if exp_int >= 0 {
        Some(ConstDecl::int(b.wrapping_pow(u32::try_from(exp_int).ok()?), loc))
      } else {
        let denom = b.checked_pow(u32::try_from(-exp_int).ok()?)?;
        if denom == 0 {
          return error_const("Invalid operand for Pow");
        }
        Some(ConstDecl::int(1i64.wrapping_div(denom), loc))
      }
    }
    ConstValue::Real(b) => Some(ConstDecl::real(b.powi(i32::try_from(exp_int).ok()?), loc)),
    _ => error_const("Invalid operand for Pow"),
  }
}

/// `Power(base, exp)`: general exponent; both operands are coerced to
/// real and evaluated as `exp(log(x) * y)`.
#[must_use]
pub fn power(base: &ConstDecl, exp: &ConstDecl, loc: Loc) -> Option<ConstDecl> {
  let b = to_real(base)?;
  let e = to_real(exp)?;
  Some(ConstDecl::real((b.ln() * e).exp(), loc))
}

/// The arity window `[min, max]` for an intrinsic, and whether it folds
/// to a constant at all (`IsEvaluableFunc`).
#[must_use]
pub fn intrinsic_arity(name: Symbol, interner: &crate::intern::Interner) -> Option<(usize, usize)> {
  let n = interner.resolve(name).to_ascii_lowercase();
  Some(match n.as_str() {
    "chr" | "ord" | "length" | "sin" | "cos" | "ln" | "exp" | "frac" | "int" | "trunc" | "round" | "odd" => (1, 1),
    "succ" | "pred" => (1, 2),
    _ => return None,
  })
}

/// `IsEvaluableFunc(name)`: whether the named intrinsic participates in
/// constant folding at all.
#[must_use]
pub fn is_evaluable_func(name: Symbol, interner: &crate::intern::Interner) -> bool {
  intrinsic_arity(name, interner).is_some()
}

/// Fold a call to intrinsic `name` over `args`, already evaluated to
/// constants. Wrong arity produces a formatted [`crate::diag::Diagnostic`]
/// via `sink`; wrong argument *type* returns `None` silently so the
/// caller treats the call as non-foldable (`spec.md` §4.2) rather than
/// as a hard error.
pub fn eval_intrinsic(
  name: Symbol,
  args: &[ConstDecl],
  loc: Loc,
  interner: &crate::intern::Interner,
  sink: &mut dyn crate::diag::DiagnosticSink,
) -> Option<ConstDecl> {
  let Some((min, max)) = intrinsic_arity(name, interner) else { return None };
  if args.len() < min || args.len() > max {
    sink.report(&crate::diag::Diagnostic {
      kind: crate::diag::DiagnosticKind::WrongArity,
      loc,
      message: format!("'{}' expects {}..{} argument(s), got {}", interner.resolve(name), min, max, args.len()),
    });
    return None;
  }
  let n = interner.resolve(name).to_ascii_lowercase();
  match n.as_str() {
    "chr" => Some(ConstDecl::char((to_int(&args[0])? & 0xff) as u8, loc)),
    "succ" => fold_step(&args[0], args.get(1).map_or(1, |n| to_int(n).unwrap_or(1)), loc),
    "pred" => fold_step(&args[0], -args.get(1).map_or(1, |n| to_int(n).unwrap_or(1)), loc),
    "ord" => Some(ConstDecl::int(to_int(&args[0])?, loc)),
    "length" => as_string_like(&args[0]).map(|s| ConstDecl::int(s.len() as i64, loc)),
    "sin" => Some(ConstDecl::real(to_real(&args[0])?.sin(), loc)),
    "cos" => Some(ConstDecl::real(to_real(&args[0])?.cos(), loc)),
    "ln" => Some(ConstDecl::real(to_real(&args[0])?.ln(), loc)),
    "exp" => Some(ConstDecl::real(to_real(&args[0])?.exp(), loc)),
    "frac" => Some(ConstDecl::real(to_real(&args[0])?.fract(), loc)),
    "int" => {
      let v = to_real(&args[0])?;
      Some(ConstDecl::real(v.signum() * v.abs().floor(), loc))
    }
    "trunc" => Some(ConstDecl::int(to_real(&args[0])?.trunc() as i64, loc)),
    "round" => Some(ConstDecl::int(to_real(&args[0])?.round() as i64, loc)),
    "odd" => Some(ConstDecl::bool(to_int(&args[0])? % 2 != 0, loc)),
    _ => None,
  }
}

/// `succ(v, n)`/`pred(v, -n)`: same-typed `v` shifted by `n`, preserving
/// the constant's original variant (`Char`, `Enum`, plain `Int`).
fn fold_step(v: &ConstDecl, n: i64, loc: Loc) -> Option<ConstDecl> {
  let base = to_int(v)?;
  let next = base.wrapping_add(n);
  match &v.value {
    ConstValue::Char(_) => Some(ConstDecl::char((next & 0xff) as u8, loc)),
    ConstValue::Enum(ty, _) => Some(ConstDecl::new(ConstValue::Enum(ty.clone(), next), loc)),
    ConstValue::Bool(_) => Some(ConstDecl::bool(next != 0, loc)),
    _ => Some(ConstDecl::int(next, loc)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::diag::CollectingSink;
  use crate::intern::Interner;
  use pretty_assertions::assert_eq;

  fn loc() -> Loc { Loc::synthetic() }

  #[test]
  fn int_plus_int() {
    let r = fold_arithmetic(ArithOp::Add, &ConstDecl::int(3, loc()), &ConstDecl::int(4, loc()), loc()).unwrap();
    assert_eq!(r.value, ConstValue::Int(7));
  }

  #[test]
  fn int_plus_real_promotes() {
    let r = fold_arithmetic(ArithOp::Add, &ConstDecl::int(3, loc()), &ConstDecl::real(0.5, loc()), loc()).unwrap();
    assert_eq!(r.value, ConstValue::Real(3.5));
  }

  #[test]
  fn string_plus_char_concatenates() {
    let r = fold_arithmetic(ArithOp::Add, &ConstDecl::string("ab", loc()), &ConstDecl::char(b'c', loc()), loc()).unwrap();
    assert_eq!(r.value, ConstValue::String("abc".into()));
  }

  #[test]
  fn mismatched_operands_report_error_without_a_sink() {
    let r = fold_arithmetic(ArithOp::Sub, &ConstDecl::string("a", loc()), &ConstDecl::bool(true, loc()), loc());
    assert!(r.is_none());
  }

  #[test]
  fn succ_default_and_explicit_step() {
    let mut interner = Interner::new();
    let mut sink = CollectingSink::default();
    let succ = interner.intern("succ");
    let one = ConstDecl::int(5, loc());
    let r = eval_intrinsic(succ, &[one.clone()], loc(), &interner, &mut sink).unwrap();
    assert_eq!(r.value, ConstValue::Int(6));
    let r2 = eval_intrinsic(succ, &[one, ConstDecl::int(3, loc())], loc(), &interner, &mut sink).unwrap();
    assert_eq!(r2.value, ConstValue::Int(8));
    assert!(sink.diagnostics.is_empty());
  }

  #[test]
  fn chr_extracts_low_byte() {
    let mut interner = Interner::new();
    let mut sink = CollectingSink::default();
    let chr = interner.intern("chr");
    let r = eval_intrinsic(chr, &[ConstDecl::int(65, loc())], loc(), &interner, &mut sink).unwrap();
    assert_eq!(r.value, ConstValue::Char(b'A'));
  }

  #[test]
  fn wrong_arity_reports_through_sink() {
    let mut interner = Interner::new();
    let mut sink = CollectingSink::default();
    let chr = interner.intern("chr");
    let r = eval_intrinsic(chr, &[], loc(), &interner, &mut sink);
    assert!(r.is_none());
    assert_eq!(sink.diagnostics.len(), 1);
    assert_eq!(sink.diagnostics[0].kind, crate::diag::DiagnosticKind::WrongArity);
  }

  #[test]
  fn pow_of_two_to_the_ten() {
    let r = pow(&ConstDecl::int(2, loc()), 10, loc()).unwrap();
    assert_eq!(r.value, ConstValue::Int(1024));
  }

  #[test]
  fn pow_negative_exponent_truncates() {
    let r = pow(&ConstDecl::int(2, loc()), -2, loc()).unwrap();
    assert_eq!(r.value, ConstValue::Int(0));
  }

  #[test]
  fn to_int_covers_every_integral_variant() {
    assert_eq!(to_int(&ConstDecl::int(5, loc())), Some(5));
    assert_eq!(to_int(&ConstDecl::char(b'A', loc())), Some(65));
    assert_eq!(to_int(&ConstDecl::bool(true, loc())), Some(1));
  }
}

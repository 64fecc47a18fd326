//! Binary-expression type checking (`spec.md` §4.5 "Binary expressions"
//! and "Binary set update"), grounded step-for-step on
//! `original_source/semantics.cpp`'s `BinaryExprType`/`BinarySetUpdate`/
//! `Check<BinaryExprAST>`.

use super::Analyser;
use crate::ast::{BinOp, BinaryExpr, Expr, ExprKind, ExprNode, TypeCastExpr};
use crate::diag::DiagnosticKind;
use crate::types::{lattice, ty_eq, Ty, TypeKind};
use std::cell::RefCell;

/// `Recast(a, ty)`: wrap `a` in a `TypeCast` to `ty`, but only if it isn't
/// already that type - skipping the redundant cast the original's pointer
/// equality check (`*ty != *a->Type()`) skips.
///
/// # Panics
/// Panics if the current occupant of `slot` has no type yet - every
/// operand reaching a cast site has already been visited post-order.
pub fn recast(slot: &RefCell<Expr>, to: &Ty) {
  let current = slot.borrow().clone();
  let loc = current.loc;
  let cur_ty = current.ty().unwrap_or_else(|| crate::ice!(loc, "recast on an untyped expression"));
  if ty_eq(&cur_ty, to) {
    return;
  }
  let cast = ExprNode::new(ExprKind::TypeCast(TypeCastExpr { expr: RefCell::new(current), to: to.clone() }), loc);
  cast.set_ty(to.clone());
  *slot.borrow_mut() = cast;
}

fn is_empty_set_literal(e: &Expr) -> bool { matches!(&e.kind, ExprKind::Set(s) if s.elements.is_empty()) }

/// `BinarySetUpdate`: reconciles two set-typed operands' element types
/// and index ranges in place, widening to their union range when they
/// disagree. Returns the (possibly just-updated) result type.
fn binary_set_update(an: &mut Analyser, b: &BinaryExpr, loc: crate::diag::Loc) -> Ty {
  let lhs = b.lhs.borrow().clone();
  let rhs = b.rhs.borrow().clone();
  let lty = lhs.ty().unwrap_or_else(|| crate::ice!(loc, "set operand missing a type"));
  let rty = rhs.ty().unwrap_or_else(|| crate::ice!(loc, "set operand missing a type"));
  let TypeKind::Set(lset) = &lty.kind else { crate::ice!(loc, "expected a set type on the left") };
  let TypeKind::Set(rset) = &rty.kind else { crate::ice!(loc, "expected a set type on the right") };

  if is_empty_set_literal(&lhs) {
    if let Some(st) = rset.subtype() {
      lty.update_set_subtype(st);
    }
  }
  if matches!(&rhs.kind, ExprKind::Set(_)) && (is_empty_set_literal(&rhs) || rset.subtype().is_none()) {
    if let Some(st) = lset.subtype() {
      rty.update_set_subtype(st);
    }
  }

  if lset.range().is_none() && rset.range().is_none() {
    let base = lset.subtype().or_else(|| rset.subtype()).unwrap_or_else(|| an.table.integer.clone());
    if lset.subtype().is_none() && rset.subtype().is_none() {
      lty.update_set_subtype(base.clone());
      rty.update_set_subtype(base.clone());
    }
    let r = lattice::set_index_range(an.table, an.config, &base);
    lty.update_set_range(r.clone());
    rty.update_set_range(r);
  }
  if lset.range().is_none() && rset.range().is_some() {
    if let Some(st) = rset.subtype() {
      lty.update_set_range(lattice::set_index_range(an.table, an.config, &st));
    }
  }
  if rset.range().is_none() && lset.range().is_some() {
    if let Some(st) = lset.subtype() {
      rty.update_set_range(lattice::set_index_range(an.table, an.config, &st));
    }
  }

  match (lset.subtype(), rset.subtype()) {
    (Some(ls), Some(rs)) if !ty_eq(&ls, &rs) => {
      an.error(DiagnosticKind::TypeMismatch, loc, "Set type content isn't the same!".into());
    }
    _ => {
      let lr = lset.range().and_then(|r| r.get_range());
      let rr = rset.range().and_then(|r| r.get_range());
      if let (Some(lr), Some(rr)) = (lr, rr) {
        if lr != rr {
          let subtype = rset.subtype().unwrap_or_else(|| an.table.integer.clone());
          let widened_range = an.table.range(lr.union(&rr), subtype.clone());
          let widened_set = an.table.set_of(widened_range, subtype);
          recast(&b.lhs, &widened_set);
          recast(&b.rhs, &widened_set);
        }
      }
    }
  }
  rty
}

/// The full dispatch from `spec.md` §4.5's numbered rule list. Returns
/// the result type, or `None` if no rule fired (the caller falls back to
/// the secondary/compatible-type rules).
fn binary_expr_type(an: &mut Analyser, b: &BinaryExpr, loc: crate::diag::Loc) -> Option<Ty> {
  let lty = b.lhs.borrow().ty().unwrap_or_else(|| crate::ice!(loc, "left operand missing a type"));
  let rty = b.rhs.borrow().ty().unwrap_or_else(|| crate::ice!(loc, "right operand missing a type"));

  if b.op == BinOp::In {
    if !lattice::is_integral(&lty) {
      an.error(DiagnosticKind::TypeMismatch, loc, "Left hand of 'in' expression should be integral type.".into());
    }
    if is_empty_set_literal(&b.rhs.borrow()) {
      if let TypeKind::Set(_) = &rty.kind {
        rty.update_set_subtype(lty.clone());
      }
    }
    if let TypeKind::Set(rs) = &rty.kind {
      let Some(subtype) = rs.subtype() else { crate::ice!(loc, "set should have a subtype") };
      if !ty_eq(&lty, &subtype) {
        an.error(DiagnosticKind::TypeMismatch, loc, "Left hand type does not match constituent parts of set".into());
      }
      if rs.range().is_none() {
        rty.update_set_range(lattice::set_index_range(an.table, an.config, &lty));
      }
    } else {
      an.error(DiagnosticKind::TypeMismatch, loc, "Right hand of 'in' expression should be a set.".into());
    }
    return Some(an.table.boolean.clone());
  }

  if matches!(lty.kind, TypeKind::Set(_)) && matches!(rty.kind, TypeKind::Set(_)) {
    let ty = binary_set_update(an, b, loc);
    return Some(if is_compare(b.op) { an.table.boolean.clone() } else { ty });
  }

  if is_compare(b.op) {
    if matches!(lty.kind, TypeKind::Complex) && matches!(rty.kind, TypeKind::Complex) {
      if !matches!(b.op, BinOp::Eq | BinOp::Ne) {
        an.error(DiagnosticKind::InvalidOperand, loc, "Only = and <> comparison allowed for complex types".into());
      }
      return Some(an.table.boolean.clone());
    }
    if lattice::is_string_like(&lty) || lattice::is_string_like(&rty) {
      let s = an.table.string(255);
      recast(&b.lhs, &s);
      recast(&b.rhs, &s);
      return Some(an.table.boolean.clone());
    }
  }

  match b.op {
    BinOp::AndThen | BinOp::OrElse => {
      if !matches!(lty.kind, TypeKind::Boolean) || !matches!(rty.kind, TypeKind::Boolean) {
        an.error(DiagnosticKind::TypeMismatch, loc, "Types for And_Then and Or_Else should be boolean".into());
      }
      return Some(an.table.boolean.clone());
    }
    BinOp::Add if lattice::is_string_like(&lty) && lattice::is_string_like(&rty) => {
      return Some(an.table.string(255));
    }
    BinOp::Pow if matches!(lty.kind, TypeKind::Complex) => {
      if !lattice::is_integral(&rty) || matches!(rty.kind, TypeKind::Char) {
        an.error(DiagnosticKind::TypeMismatch, loc, "Expect integer exponent in POW".into());
      }
      recast(&b.rhs, &an.table.real);
      return Some(lty);
    }
    BinOp::Div => {
      if !lattice::is_numeric(&lty) || !lattice::is_numeric(&rty) {
        an.error(DiagnosticKind::InvalidOperand, loc, "Invalid (non-numeric) type for divide or power".into());
      }
      let ty = if matches!(lty.kind, TypeKind::Complex) || matches!(rty.kind, TypeKind::Complex) {
        an.table.complex.clone()
      } else {
        an.table.real.clone()
      };
      recast(&b.lhs, &ty);
      recast(&b.rhs, &ty);
      if lattice::compatible(an.table, &ty, &ty).is_none() {
        an.error(DiagnosticKind::InvalidOperand, loc, "Incompatible type for divide".into());
      }
      return Some(ty);
    }
    BinOp::Power => {
      if !lattice::is_numeric(&lty) || !lattice::is_numeric(&rty) {
        an.error(DiagnosticKind::InvalidOperand, loc, "Invalid (non-numeric) type for divide or power".into());
      }
      let ty = if matches!(lty.kind, TypeKind::Complex) { an.table.complex.clone() } else { an.table.real.clone() };
      recast(&b.lhs, &ty);
      if matches!(rty.kind, TypeKind::Complex) {
        an.error(DiagnosticKind::InvalidOperand, loc, "Exponent for ** operator should not be a complex value".into());
      }
      recast(&b.rhs, &an.table.real);
      if !matches!(ty.kind, TypeKind::Real | TypeKind::Complex) {
        an.error(DiagnosticKind::InvalidOperand, loc, "Left hand side is wrong type (not possible to convert to real or complex)".into());
      }
      return Some(ty);
    }
    _ => {}
  }

  let lhs_is_nil = matches!(b.lhs.borrow().kind, ExprKind::Nil);
  let rhs_is_nil = matches!(b.rhs.borrow().kind, ExprKind::Nil);
  if matches!(b.op, BinOp::Eq | BinOp::Ne) && ((lattice::is_pointer(&lty) && rhs_is_nil) || (lattice::is_pointer(&rty) && lhs_is_nil)) {
    if rhs_is_nil {
      recast(&b.rhs, &lty);
      return Some(lty);
    }
    recast(&b.lhs, &rty);
    return Some(rty);
  }

  if matches!(lty.kind, TypeKind::Range(_)) && matches!(b.rhs.borrow().kind, ExprKind::Integer(_)) {
    return Some(lty);
  }
  if matches!(rty.kind, TypeKind::Range(_)) && matches!(b.lhs.borrow().kind, ExprKind::Integer(_)) {
    return Some(rty);
  }

  None
}

fn is_compare(op: BinOp) -> bool { matches!(op, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge) }

/// `Check<BinaryExprAST>`: run the primary dispatch, fall back to the
/// per-operator secondary rules, then to `CompatibleType` with a cast on
/// both sides if the result is scalar.
pub fn check_binary(an: &mut Analyser, node: &Expr) {
  let ExprKind::Binary(b) = &node.kind else { crate::ice!(node.loc, "check_binary on a non-binary node") };
  let loc = node.loc;

  if let Some(ty) = binary_expr_type(an, b, loc) {
    node.set_ty(ty);
    return;
  }

  let lty = b.lhs.borrow().ty().unwrap_or_else(|| crate::ice!(loc, "left operand missing a type"));
  let rty = b.rhs.borrow().ty().unwrap_or_else(|| crate::ice!(loc, "right operand missing a type"));
  let mut ty: Option<Ty> = None;

  match b.op {
    BinOp::Pow => {
      if !lattice::is_numeric(&lty) {
        an.error(DiagnosticKind::TypeMismatch, loc, "Left hand side of POW should be numeric type".into());
      }
      if matches!(rty.kind, TypeKind::Char) || !lattice::is_integral(&rty) {
        an.error(DiagnosticKind::TypeMismatch, loc, "Right hand side of POW should be an integer".into());
      }
    }
    BinOp::IntDiv | BinOp::Mod => {
      if matches!(lty.kind, TypeKind::Char) || matches!(rty.kind, TypeKind::Char) || !lattice::is_integral(&lty) || !lattice::is_integral(&rty) {
        an.error(DiagnosticKind::TypeMismatch, loc, "Types for DIV and MOD should be integer".into());
      }
    }
    BinOp::And | BinOp::Xor | BinOp::Or => {
      if matches!(lty.kind, TypeKind::Boolean) && matches!(rty.kind, TypeKind::Boolean) {
        ty = Some(an.table.boolean.clone());
      }
      if !lattice::is_integral(&lty) || !lattice::is_integral(&rty) {
        an.error(DiagnosticKind::TypeMismatch, loc, "Expression must be integral types on both sides".into());
      }
      if matches!(lty.kind, TypeKind::Char) || matches!(rty.kind, TypeKind::Char) {
        an.error(DiagnosticKind::TypeMismatch, loc, "Types for binary operation should not be CHARACTER".into());
      }
    }
    BinOp::Sub | BinOp::Mul | BinOp::Add => {
      if !lattice::is_numeric(&lty) || !lattice::is_numeric(&rty) {
        an.error(DiagnosticKind::TypeMismatch, loc, "Expression must be numeric types on both sides".into());
      }
      if matches!(lty.kind, TypeKind::Char) || matches!(rty.kind, TypeKind::Char) {
        an.error(DiagnosticKind::TypeMismatch, loc, "Types for binary operation should not be CHARACTER".into());
      }
    }
    _ => {}
  }

  if ty.is_none() {
    if let Some(common) = lattice::compatible(an.table, &lty, &rty) {
      if !lattice::is_compound(&common) {
        recast(&b.lhs, &common);
        recast(&b.rhs, &common);
      }
      ty = Some(common);
    } else {
      an.error(DiagnosticKind::InvalidOperand, loc, "Incompatible type in expression".into());
      ty = Some(an.table.void.clone());
    }
  }
  node.set_ty(ty.unwrap());
}

//! The typed AST (component C3): every expression node kind the front
//! end knows about (`spec.md` §3.3), plus the single-dispatch visitor
//! protocol the analyser drives traversal with.
//!
//! Nodes are heap-allocated once, shared via `Rc`, and never explicitly
//! freed - the same "arena with stable handles" realization `types/mod.rs`
//! uses for the type lattice (see that module's doc comment for the full
//! reasoning). A node's *type* starts out absent or under-specified (an
//! empty set literal has no element type yet; a variable reference has
//! none until its declaration is looked up) and is filled in by the
//! analyser, so it lives behind a `RefCell`. Child links that the
//! analyser may *rewrite* - wrapping a child in `TypeCast`/`RangeCheck`/
//! `RangeReduce` after the fact - are themselves `RefCell<Expr>` slots,
//! so a rewrite is a single in-place replacement rather than rebuilding
//! the parent.

use crate::diag::Loc;
use crate::intern::Symbol;
use crate::types::{Range, Ty};
use std::cell::RefCell;
use std::rc::Rc;

/// A shared handle to an expression node.
pub type Expr = Rc<ExprNode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
  Add,
  Sub,
  Mul,
  /// `/`: real division.
  Div,
  /// `div`: integer division.
  IntDiv,
  Mod,
  And,
  Or,
  Xor,
  AndThen,
  OrElse,
  Eq,
  Ne,
  Lt,
  Le,
  Gt,
  Ge,
  In,
  /// Integer-exponent power (`base ** intExp`), the fast repeated-squaring
  /// path.
  Pow,
  /// General real exponentiation (`base ^ exp` / `base ** realExp`).
  Power,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
  Neg,
  Not,
}

#[derive(Debug)]
pub struct BinaryExpr {
  pub op: BinOp,
  pub lhs: RefCell<Expr>,
  pub rhs: RefCell<Expr>,
}

#[derive(Debug)]
pub struct UnaryExpr {
  pub op: UnOp,
  pub operand: RefCell<Expr>,
}

#[derive(Debug)]
pub struct AssignExpr {
  pub lhs: RefCell<Expr>,
  pub rhs: RefCell<Expr>,
}

/// A name reference. `protected` mirrors the original's "protected value"
/// marking (loop variables inside their own loop, `for`-range bounds, and
/// similar compiler-introduced read-only bindings).
#[derive(Debug)]
pub struct VariableExpr {
  pub name: Symbol,
  pub protected: bool,
}

#[derive(Debug)]
pub struct RangeExpr {
  pub start: RefCell<Expr>,
  pub end: RefCell<Expr>,
}

#[derive(Debug)]
pub struct SetExpr {
  pub elements: Vec<RefCell<Expr>>,
}

/// `Array`: indexing with statically-known (fixed) declared ranges, one
/// index expression per dimension.
#[derive(Debug)]
pub struct ArrayExpr {
  pub array: RefCell<Expr>,
  pub indices: Vec<RefCell<Expr>>,
}

/// `DynArray`: indexing into an array whose bound isn't fixed at compile
/// time (an open array parameter). Checked the same way as `Array` but
/// kept distinct because its range-reduction has no static `Range` to
/// reduce against until the callee's bound is known.
#[derive(Debug)]
pub struct DynArrayExpr {
  pub array: RefCell<Expr>,
  pub index: RefCell<Expr>,
}

#[derive(Debug)]
pub struct BuiltinExpr {
  pub name: Symbol,
  pub args: Vec<RefCell<Expr>>,
}

#[derive(Debug)]
pub struct CallExpr {
  pub callee: Expr,
  pub args: Vec<RefCell<Expr>>,
}

/// A reference to a declared function/procedure. `used_vars` is the set
/// of free variables the function body reads from an enclosing scope -
/// populated by the parser/declaration pass, consumed when a `Trampoline`
/// needs to be synthesized for this function (`spec.md` §4.5 "Calls").
#[derive(Debug)]
pub struct FunctionExpr {
  pub name: Symbol,
  pub proto: Ty,
  pub used_vars: Vec<Symbol>,
}

/// A record of captured free variables materialized for a nested
/// procedure (`spec.md` glossary: "Closure").
#[derive(Debug)]
pub struct ClosureExpr {
  pub function: Expr,
  pub captures: Vec<Symbol>,
}

/// Adapts a function-with-closure to a plain function-pointer call site
/// (`spec.md` glossary: "Trampoline").
#[derive(Debug)]
pub struct TrampolineExpr {
  pub function: Expr,
  pub closure: Expr,
}

/// Either the counted form (`start..end`, with `end` present) or the
/// iterator form (`for x in coll`, with `end` absent and `start` holding
/// the collection expression instead) - matching
/// `original_source/semantics.cpp`'s `Check<ForExprAST>`, which reuses
/// `f->start` as the collection whenever `f->end` is null rather than
/// carrying a separate field for it.
#[derive(Debug)]
pub struct ForExpr {
  pub variable: Symbol,
  pub start: RefCell<Expr>,
  pub end: Option<RefCell<Expr>>,
  pub body: Expr,
}

#[derive(Debug)]
pub struct WhileExpr {
  pub cond: RefCell<Expr>,
  pub body: Expr,
}

#[derive(Debug)]
pub struct RepeatExpr {
  pub cond: RefCell<Expr>,
  pub body: Expr,
}

#[derive(Debug)]
pub struct IfExpr {
  pub cond: RefCell<Expr>,
  pub then_branch: Expr,
  pub else_branch: Option<Expr>,
}

/// One arm of a `case`: the label values it matches and the body to run.
/// `values` is already fully enumerated by the time it reaches the
/// analyser - a `1..3` range label contributes three entries `(1,1)`,
/// `(2,2)`, `(3,3)` rather than one `(1,3)` pair. Duplicate-label
/// detection compares these tuples for exact equality (matching
/// `original_source/semantics.cpp`'s `std::find` over `(int,int)` pairs),
/// so overlap between a plain value and a range is caught as a shared
/// enumerated entry rather than by interval-overlap math.
#[derive(Debug)]
pub struct CaseLabel {
  pub values: Vec<(i64, i64)>,
  pub body: Expr,
}

#[derive(Debug)]
pub struct CaseExpr {
  pub selector: RefCell<Expr>,
  pub labels: Vec<CaseLabel>,
  pub otherwise: Option<Expr>,
}

/// One argument of a text-mode `Read`/`Write`: the value plus optional
/// field `width`/`precision` (`Write` only).
#[derive(Debug)]
pub struct IoArg {
  pub expr: RefCell<Expr>,
  pub width: Option<RefCell<Expr>>,
  pub precision: Option<RefCell<Expr>>,
}

/// Distinguishes a file-based `Read`/`Write` from the `ReadStr`/`WriteStr`
/// form that targets a string variable instead of a file handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoKind {
  File,
  Str,
  /// `ReadLn`/`WriteLn`: like `File`, but the destination must additionally
  /// be a text file.
  FileLn,
}

#[derive(Debug)]
pub struct ReadExpr {
  pub kind: IoKind,
  pub dest: RefCell<Expr>,
  pub args: Vec<IoArg>,
}

#[derive(Debug)]
pub struct WriteExpr {
  pub kind: IoKind,
  pub dest: RefCell<Expr>,
  pub args: Vec<IoArg>,
}

/// An array-initializer literal: `(label ranges, value)` entries plus an
/// optional catch-all `otherwise` value.
#[derive(Debug)]
pub struct InitArrayExpr {
  pub entries: Vec<(Vec<(i64, i64)>, Expr)>,
  pub otherwise: Option<Expr>,
}

/// Explicit widening/promotion, inserted by the analyser.
#[derive(Debug)]
pub struct TypeCastExpr {
  pub expr: RefCell<Expr>,
  pub to: Ty,
}

/// Runtime-checked subrange adjustment, inserted by the analyser.
#[derive(Debug)]
pub struct RangeCheckExpr {
  pub expr: RefCell<Expr>,
  pub range: Range,
}

/// Unchecked offset adjustment, reducing an index to `0..size-1`.
#[derive(Debug)]
pub struct RangeReduceExpr {
  pub expr: RefCell<Expr>,
  pub range: Range,
}

#[derive(Debug)]
pub enum ExprKind {
  Integer(i64),
  Real(f64),
  Char(u8),
  String(String),
  Nil,
  Variable(VariableExpr),
  Binary(BinaryExpr),
  Unary(UnaryExpr),
  Assign(AssignExpr),
  Range(RangeExpr),
  Set(SetExpr),
  Array(ArrayExpr),
  DynArray(DynArrayExpr),
  Builtin(BuiltinExpr),
  Call(CallExpr),
  Function(FunctionExpr),
  Closure(ClosureExpr),
  Trampoline(TrampolineExpr),
  For(ForExpr),
  While(WhileExpr),
  Repeat(RepeatExpr),
  If(IfExpr),
  Case(CaseExpr),
  Read(ReadExpr),
  Write(WriteExpr),
  InitArray(InitArrayExpr),
  TypeCast(TypeCastExpr),
  RangeCheck(RangeCheckExpr),
  RangeReduce(RangeReduceExpr),
}

#[derive(Debug)]
pub struct ExprNode {
  pub kind: ExprKind,
  pub loc: Loc,
  ty: RefCell<Option<Ty>>,
}

impl ExprNode {
  #[must_use]
  pub fn new(kind: ExprKind, loc: Loc) -> Expr { Rc::new(ExprNode { kind, loc, ty: RefCell::new(None) }) }

  #[must_use] pub fn ty(&self) -> Option<Ty> { self.ty.borrow().clone() }

  pub fn set_ty(&self, ty: Ty) { *self.ty.borrow_mut() = Some(ty); }

  /// Whether this node's type has been resolved at all - used by
  /// invariant checks (`spec.md` §8: "every reachable expression's type
  /// is non-null") rather than by ordinary `Check` logic, which usually
  /// wants the type itself via [`ExprNode::ty`].
  #[must_use] pub fn is_typed(&self) -> bool { self.ty.borrow().is_some() }

  /// Traverse into this node's direct children, invoking `visitor.visit`
  /// on each. Mirrors the original's "nodes traverse their children,
  /// invoking the visitor at each" - there is no separate per-kind
  /// visitor method, just this one dispatch point.
  pub fn accept(&self, visitor: &mut dyn Visitor) {
    match &self.kind {
      ExprKind::Integer(_) | ExprKind::Real(_) | ExprKind::Char(_) | ExprKind::String(_) | ExprKind::Nil | ExprKind::Variable(_) => {}
      ExprKind::Binary(b) => {
        visitor.visit(&b.lhs.borrow());
        visitor.visit(&b.rhs.borrow());
      }
      ExprKind::Unary(u) => visitor.visit(&u.operand.borrow()),
      ExprKind::Assign(a) => {
        visitor.visit(&a.lhs.borrow());
        visitor.visit(&a.rhs.borrow());
      }
      ExprKind::Range(r) => {
        visitor.visit(&r.start.borrow());
        visitor.visit(&r.end.borrow());
      }
      ExprKind::Set(s) => {
        for e in &s.elements {
          visitor.visit(&e.borrow());
        }
      }
      ExprKind::Array(a) => {
        visitor.visit(&a.array.borrow());
        for i in &a.indices {
          visitor.visit(&i.borrow());
        }
      }
      ExprKind::DynArray(a) => {
        visitor.visit(&a.array.borrow());
        visitor.visit(&a.index.borrow());
      }
      ExprKind::Builtin(b) => {
        for a in &b.args {
          visitor.visit(&a.borrow());
        }
      }
      ExprKind::Call(c) => {
        visitor.visit(&c.callee);
        for a in &c.args {
          visitor.visit(&a.borrow());
        }
      }
      ExprKind::Function(_) => {}
      ExprKind::Closure(c) => visitor.visit(&c.function),
      ExprKind::Trampoline(t) => {
        visitor.visit(&t.function);
        visitor.visit(&t.closure);
      }
      ExprKind::For(f) => {
        visitor.visit(&f.start.borrow());
        if let Some(e) = &f.end {
          visitor.visit(&e.borrow());
        }
        visitor.visit(&f.body);
      }
      ExprKind::While(w) => {
        visitor.visit(&w.cond.borrow());
        visitor.visit(&w.body);
      }
      ExprKind::Repeat(r) => {
        visitor.visit(&r.cond.borrow());
        visitor.visit(&r.body);
      }
      ExprKind::If(i) => {
        visitor.visit(&i.cond.borrow());
        visitor.visit(&i.then_branch);
        if let Some(e) = &i.else_branch {
          visitor.visit(e);
        }
      }
      ExprKind::Case(c) => {
        visitor.visit(&c.selector.borrow());
        for label in &c.labels {
          visitor.visit(&label.body);
        }
        if let Some(o) = &c.otherwise {
          visitor.visit(o);
        }
      }
      ExprKind::Read(r) => {
        visitor.visit(&r.dest.borrow());
        for a in &r.args {
          visitor.visit(&a.expr.borrow());
        }
      }
      ExprKind::Write(w) => {
        visitor.visit(&w.dest.borrow());
        for a in &w.args {
          visitor.visit(&a.expr.borrow());
          if let Some(wd) = &a.width {
            visitor.visit(&wd.borrow());
          }
          if let Some(p) = &a.precision {
            visitor.visit(&p.borrow());
          }
        }
      }
      ExprKind::InitArray(i) => {
        for (_, v) in &i.entries {
          visitor.visit(v);
        }
        if let Some(o) = &i.otherwise {
          visitor.visit(o);
        }
      }
      ExprKind::TypeCast(t) => visitor.visit(&t.expr.borrow()),
      ExprKind::RangeCheck(r) => visitor.visit(&r.expr.borrow()),
      ExprKind::RangeReduce(r) => visitor.visit(&r.expr.borrow()),
    }
  }
}

/// Single-dispatch visitor protocol: one entry point, not one method per
/// node kind. Implementations that want to recurse call
/// `expr.accept(self)` from within `visit` themselves - the default
/// provided by [`walk`] does exactly that.
pub trait Visitor {
  fn visit(&mut self, expr: &Expr);
}

/// A `Visitor` that does nothing but recurse into every child, in
/// program order. Useful as a building block: wrap it, or call
/// [`walk`] directly from a custom `visit` to continue descending past
/// the current node.
pub fn walk(visitor: &mut dyn Visitor, expr: &Expr) { expr.accept(visitor); }

#[cfg(test)]
mod tests {
  use super::*;
  use crate::diag::Loc;
  use pretty_assertions::assert_eq;

  fn leaf(n: i64) -> Expr { ExprNode::new(ExprKind::Integer(n), Loc::synthetic()) }

  struct CountingVisitor {
    visited: usize,
  }

  impl Visitor for CountingVisitor {
    fn visit(&mut self, expr: &Expr) {
      self.visited += 1;
      walk(self, expr);
    }
  }

  #[test]
  fn accept_walks_binary_children_in_order() {
    let bin = ExprNode::new(
      ExprKind::Binary(BinaryExpr { op: BinOp::Add, lhs: RefCell::new(leaf(1)), rhs: RefCell::new(leaf(2)) }),
      Loc::synthetic(),
    );
    let mut v = CountingVisitor { visited: 0 };
    walk(&mut v, &bin);
    assert_eq!(v.visited, 2);
  }

  #[test]
  fn rewriting_a_child_slot_replaces_it_in_place() {
    let bin = ExprNode::new(
      ExprKind::Binary(BinaryExpr { op: BinOp::Add, lhs: RefCell::new(leaf(1)), rhs: RefCell::new(leaf(2)) }),
      Loc::synthetic(),
    );
    let ExprKind::Binary(b) = &bin.kind else { unreachable!() };
    let cast = ExprNode::new(
      ExprKind::TypeCast(TypeCastExpr { expr: RefCell::new(leaf(1)), to: crate::types::TypeTable::new().real }),
      Loc::synthetic(),
    );
    *b.lhs.borrow_mut() = cast.clone();
    assert!(Rc::ptr_eq(&b.lhs.borrow(), &cast));
  }

  #[test]
  fn fresh_node_has_no_type_until_set() {
    let n = leaf(1);
    assert!(!n.is_typed());
    n.set_ty(crate::types::TypeTable::new().integer);
    assert!(n.is_typed());
  }
}

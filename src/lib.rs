//! Typed AST, constant folder, and semantic analyser for the lacsap
//! Pascal compiler front end: the type lattice (C1), constant folding
//! (C2), the typed AST (C3), the scoped symbol stack (C4), and the
//! semantic analyser that ties them together (C5). Parsing, code
//! generation and everything downstream of a fully-checked AST are out
//! of scope - see `spec.md` §1 and `DESIGN.md`.

pub mod ast;
pub mod config;
pub mod constants;
pub mod diag;
pub mod intern;
pub mod semantics;
pub mod symtab;
pub mod types;

//! sieve — compile trait predicates to bytecode and filter records at
//! row speed.
//!
//! A trait expression is one S-expression predicate over a record's
//! fields, e.g. `(and (trait-eq "plan" "pro") (trait-gt "seats" "10"))`.
//! The [`compiler`] turns a batch of expressions into an immutable
//! [`program::Program`]; a [`vm::Vm`] executes that program against any
//! type implementing [`accessor::TraitAccessor`], writing one boolean
//! per expression. Programs are forkable and safely shared across
//! threads; VMs are per-thread and reusable across records.

pub mod accessor;
pub mod compiler;
pub mod lexer;
pub mod program;
pub mod schema;
pub mod value;
pub mod vm;

pub use accessor::{CachedMapAccessor, TraitAccessor};
pub use compiler::{compile, compile_one, CompileError};
pub use program::{Instruction, OpCode, Program};
pub use schema::{FieldType, Schema, SchemaError};
pub use value::{Value, ValueParseError};
pub use vm::{StackFault, Vm, VmOptions, DEFAULT_STACK_SIZE};

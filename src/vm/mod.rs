pub mod ops;
pub mod simd;

use crate::accessor::TraitAccessor;
use crate::program::{Instruction, OpCode, Program};
use crate::schema::FieldType;
use crate::value::Value;

/// Operand-stack capacity. Trait expressions are shallow; a program
/// that needs more slots than this is malformed.
pub const DEFAULT_STACK_SIZE: usize = 256;

/// VM construction options, fixed for the instance's lifetime.
#[derive(Debug, Clone, Copy)]
pub struct VmOptions {
    /// Route string equality/ordering through the lane-batched byte
    /// comparison instead of the scalar one.
    pub vectorized: bool,
}

impl Default for VmOptions {
    fn default() -> VmOptions {
        // The lane kernel is only worth it where a 128-bit SIMD
        // baseline exists.
        VmOptions {
            vectorized: cfg!(any(target_arch = "x86_64", target_arch = "aarch64")),
        }
    }
}

/// VM invariant violation. These indicate a corrupted or hand-built
/// program, never a data problem: missing fields and type mismatches
/// resolve to `false` inside the operator library and are not errors.
#[derive(Debug, thiserror::Error)]
pub enum StackFault {
    #[error("stack overflow: more than {limit} operands")]
    Overflow { limit: usize },
    #[error("stack underflow while executing {opcode:?}")]
    Underflow { opcode: OpCode },
    #[error("{opcode:?} carries a malformed operand")]
    MalformedOperand { opcode: OpCode },
    #[error("jump target {target} is outside the program")]
    JumpOutOfBounds { target: usize },
    #[error("{opcode:?} expected a boolean at the top of the stack")]
    NonBooleanTop { opcode: OpCode },
}

/// Stack interpreter for compiled trait programs.
///
/// One instance per thread: `evaluate` runs one program against one
/// record, `reset` clears the operand stack without reallocating, and
/// the same instance then serves the next record. The program counter
/// is local to each `evaluate` call, so any number of VMs may share one
/// program (or its forks) concurrently.
pub struct Vm {
    stack: Vec<Value>,
    results: Vec<bool>,
    vectorized: bool,
}

impl Default for Vm {
    fn default() -> Vm {
        Vm::new(VmOptions::default())
    }
}

impl Vm {
    pub fn new(options: VmOptions) -> Vm {
        Vm {
            stack: Vec::with_capacity(DEFAULT_STACK_SIZE),
            results: Vec::new(),
            vectorized: options.vectorized,
        }
    }

    /// Execute `program` against one record. Results land in
    /// [`Vm::results`] (and [`Vm::result`] for single expressions).
    pub fn evaluate(
        &mut self,
        program: &Program,
        traits: &mut dyn TraitAccessor,
    ) -> Result<(), StackFault> {
        self.reset();
        self.results.clear();
        self.results.resize(program.expression_count(), false);

        let instructions = program.instructions();
        let mut pc = 0;

        while let Some(instruction) = instructions.get(pc) {
            pc += 1;
            match instruction.opcode() {
                OpCode::Halt => break,

                OpCode::Load => {
                    let value = instruction
                        .operand(0)
                        .ok_or(StackFault::MalformedOperand { opcode: OpCode::Load })?;
                    self.push(value.clone())?;
                }

                OpCode::GetField => {
                    let name = self.pop(OpCode::GetField)?;
                    let marker = self.pop(OpCode::GetField)?;
                    let value = fetch_field(&marker, &name, traits)?;
                    self.push(value)?;
                }

                OpCode::Not => {
                    let value = self.pop(OpCode::Not)?;
                    match value {
                        Value::Boolean(b) => self.push(Value::Boolean(!b))?,
                        _ => return Err(StackFault::NonBooleanTop { opcode: OpCode::Not }),
                    }
                }

                OpCode::IsNotNull => {
                    let value = self.pop(OpCode::IsNotNull)?;
                    self.push(Value::Boolean(ops::is_not_null(&value)))?;
                }

                OpCode::Dup => {
                    let top = self
                        .stack
                        .last()
                        .cloned()
                        .ok_or(StackFault::Underflow { opcode: OpCode::Dup })?;
                    self.push(top)?;
                }

                OpCode::Pop => {
                    self.pop(OpCode::Pop)?;
                }

                OpCode::JumpIfTrue => {
                    let target = jump_target(instruction, instructions.len())?;
                    if self.pop_boolean(OpCode::JumpIfTrue)? {
                        pc = target;
                    }
                }

                OpCode::JumpIfFalse => {
                    let target = jump_target(instruction, instructions.len())?;
                    if !self.pop_boolean(OpCode::JumpIfFalse)? {
                        pc = target;
                    }
                }

                OpCode::StoreResult => {
                    let slot = match instruction.operand(0) {
                        Some(Value::Long(i)) if *i >= 0 && (*i as usize) < self.results.len() => {
                            *i as usize
                        }
                        _ => {
                            return Err(StackFault::MalformedOperand {
                                opcode: OpCode::StoreResult,
                            });
                        }
                    };
                    // Peek, not pop: the value stays as the final stack
                    // slot for `result()`.
                    match self.stack.last() {
                        Some(Value::Boolean(b)) => self.results[slot] = *b,
                        Some(_) => {
                            return Err(StackFault::NonBooleanTop {
                                opcode: OpCode::StoreResult,
                            });
                        }
                        None => {
                            return Err(StackFault::Underflow {
                                opcode: OpCode::StoreResult,
                            });
                        }
                    }
                }

                opcode => {
                    let right = self.pop(opcode)?;
                    let left = self.pop(opcode)?;
                    let outcome = self.apply(opcode, &right, &left);
                    self.push(Value::Boolean(outcome))?;
                }
            }
        }

        Ok(())
    }

    /// Dispatch a binary comparison opcode to the operator library.
    /// Only reached for comparison opcodes — the structural ones are
    /// handled in the interpreter loop.
    fn apply(&self, opcode: OpCode, right: &Value, left: &Value) -> bool {
        let v = self.vectorized;
        match opcode {
            OpCode::LongEq => ops::long_eq(right, left),
            OpCode::DoubleEq => ops::double_eq(right, left),
            OpCode::BooleanEq => ops::boolean_eq(right, left),
            OpCode::StringEq => ops::string_eq(right, left, v),
            OpCode::LongNe => !ops::long_eq(right, left),
            OpCode::DoubleNe => !ops::double_eq(right, left),
            OpCode::BooleanNe => !ops::boolean_eq(right, left),
            OpCode::StringNe => !ops::string_eq(right, left, v),
            OpCode::LongLt => ops::long_lt(right, left),
            OpCode::LongLe => ops::long_le(right, left),
            OpCode::LongGt => ops::long_gt(right, left),
            OpCode::LongGe => ops::long_ge(right, left),
            OpCode::DoubleLt => ops::double_lt(right, left),
            OpCode::DoubleLe => ops::double_le(right, left),
            OpCode::DoubleGt => ops::double_gt(right, left),
            OpCode::DoubleGe => ops::double_ge(right, left),
            OpCode::StringLt => ops::string_lt(right, left, v),
            OpCode::StringLe => ops::string_le(right, left, v),
            OpCode::StringGt => ops::string_gt(right, left, v),
            OpCode::StringGe => ops::string_ge(right, left, v),
            OpCode::StringCiEq => ops::string_ci_eq(right, left, v),
            OpCode::StringRegexpMatch => ops::string_regexp_match(right, left),
            OpCode::StringContains => ops::string_contains(right, left),
            OpCode::StringCiContains => ops::string_ci_contains(right, left),
            OpCode::LongArrayContains => ops::long_array_contains(right, left),
            OpCode::DoubleArrayContains => ops::double_array_contains(right, left),
            OpCode::BooleanArrayContains => ops::boolean_array_contains(right, left),
            OpCode::StringArrayContains => ops::string_array_contains(right, left, v),
            OpCode::StringArrayElementContains => ops::string_array_element_contains(right, left),
            OpCode::LongIn => ops::long_in(right, left),
            OpCode::DoubleIn => ops::double_in(right, left),
            OpCode::BooleanIn => ops::boolean_in(right, left),
            OpCode::StringIn => ops::string_in(right, left, v),
            OpCode::LongArrayIntersectsNonEmpty => ops::long_array_intersects(right, left),
            OpCode::DoubleArrayIntersectsNonEmpty => ops::double_array_intersects(right, left),
            OpCode::BooleanArrayIntersectsNonEmpty => ops::boolean_array_intersects(right, left),
            OpCode::StringArrayIntersectsNonEmpty => ops::string_array_intersects(right, left, v),
            // Structural opcodes never reach here.
            OpCode::Halt
            | OpCode::Load
            | OpCode::GetField
            | OpCode::Not
            | OpCode::IsNotNull
            | OpCode::Dup
            | OpCode::Pop
            | OpCode::JumpIfTrue
            | OpCode::JumpIfFalse
            | OpCode::StoreResult => unreachable!("structural opcode in comparison dispatch"),
        }
    }

    /// Clear the operand stack; capacity and results survive so the
    /// instance can take the next record without reallocating.
    pub fn reset(&mut self) {
        self.stack.clear();
    }

    /// Result of a single-expression evaluation: the boolean left at
    /// stack slot 0. Anything else (including an empty stack) is false.
    pub fn result(&self) -> bool {
        matches!(self.stack.first(), Some(Value::Boolean(true)))
    }

    /// Results of a multi-expression evaluation, indexed like the
    /// expression batch passed to the compiler.
    pub fn results(&self) -> &[bool] {
        &self.results
    }

    fn push(&mut self, value: Value) -> Result<(), StackFault> {
        if self.stack.len() >= DEFAULT_STACK_SIZE {
            return Err(StackFault::Overflow {
                limit: DEFAULT_STACK_SIZE,
            });
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self, opcode: OpCode) -> Result<Value, StackFault> {
        self.stack.pop().ok_or(StackFault::Underflow { opcode })
    }

    fn pop_boolean(&mut self, opcode: OpCode) -> Result<bool, StackFault> {
        match self.pop(opcode)? {
            Value::Boolean(b) => Ok(b),
            _ => Err(StackFault::NonBooleanTop { opcode }),
        }
    }
}

/// Typed field fetch: the marker decides which accessor getter runs;
/// absence becomes `Null` on the stack.
fn fetch_field(
    marker: &Value,
    name: &Value,
    traits: &mut dyn TraitAccessor,
) -> Result<Value, StackFault> {
    let (Value::FieldType(field_type), Value::Str(key)) = (marker, name) else {
        return Err(StackFault::MalformedOperand {
            opcode: OpCode::GetField,
        });
    };

    let value = match field_type {
        FieldType::Long => traits.get_long(key.as_str()).map(Value::Long),
        FieldType::Double => traits.get_double(key.as_str()).map(Value::Double),
        FieldType::Boolean => traits.get_boolean(key.as_str()).map(Value::Boolean),
        _ => traits.get(key.as_str()),
    };

    Ok(value.unwrap_or(Value::Null))
}

fn jump_target(instruction: &Instruction, program_len: usize) -> Result<usize, StackFault> {
    match instruction.operand(0) {
        Some(Value::Long(target)) if *target >= 0 && (*target as usize) <= program_len => {
            Ok(*target as usize)
        }
        Some(Value::Long(target)) => Err(StackFault::JumpOutOfBounds {
            target: (*target).max(0) as usize,
        }),
        _ => Err(StackFault::MalformedOperand {
            opcode: instruction.opcode(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::CachedMapAccessor;
    use crate::compiler;
    use crate::schema::Schema;

    fn schema() -> Schema {
        Schema::from_ddl(
            "long LONG, double DOUBLE, boolean BOOLEAN, strings ARRAY<STRING>, \
             longs ARRAY<LONG>, doubles ARRAY<DOUBLE>, booleans ARRAY<BOOLEAN>",
        )
        .unwrap()
    }

    fn eval(expression: &str, entries: &[(&str, &str)]) -> bool {
        let schema = schema();
        let program = compiler::compile_one(&schema, expression).unwrap();
        let mut traits = CachedMapAccessor::new(&schema, entries.iter().copied());
        let mut vm = Vm::default();
        vm.evaluate(&program, &mut traits).unwrap();
        vm.result()
    }

    #[test]
    fn long_equality() {
        assert!(eval(r#"(trait-eq "long" "1")"#, &[("long", "1")]));
        assert!(!eval(r#"(trait-eq "long" "2")"#, &[("long", "1")]));
    }

    #[test]
    fn negation() {
        assert!(!eval(r#"(not (trait-eq "long" "1"))"#, &[("long", "1")]));
        assert!(eval(r#"(not (trait-eq "long" "2"))"#, &[("long", "1")]));
    }

    #[test]
    fn short_circuit_or_and() {
        let record: &[(&str, &str)] = &[("boolean", "true"), ("long", "1")];
        assert!(eval(
            r#"(or (trait-eq "boolean" "true") (trait-eq "long" "5"))"#,
            record
        ));
        assert!(!eval(
            r#"(and (trait-eq "boolean" "true") (trait-eq "long" "5"))"#,
            record
        ));
        assert!(eval(
            r#"(and (trait-eq "boolean" "true") (trait-eq "long" "1"))"#,
            record
        ));
    }

    #[test]
    fn nary_combinators() {
        let record: &[(&str, &str)] = &[("long", "1"), ("double", "1.5"), ("boolean", "false")];
        assert!(eval(
            r#"(or (trait-eq "long" "9") (trait-eq "double" "9.9") (trait-eq "double" "1.5"))"#,
            record
        ));
        assert!(!eval(
            r#"(and (trait-eq "long" "1") (trait-eq "double" "1.5") (trait-eq "boolean" "true"))"#,
            record
        ));
    }

    #[test]
    fn string_array_containment() {
        let record: &[(&str, &str)] = &[("strings", "string1,string2")];
        assert!(eval(r#"(trait-contains "strings" "string1")"#, record));
        assert!(eval(r#"(trait-element-contains "strings" "ring")"#, record));
        assert!(!eval(r#"(trait-contains "strings" "string3")"#, record));
    }

    #[test]
    fn missing_field_is_false_not_an_error() {
        assert!(!eval(r#"(trait-eq "string" "x")"#, &[]));
        assert!(!eval(r#"(trait-lt "long" "10")"#, &[]));
    }

    #[test]
    fn exists_checks_typed_lookup() {
        assert!(eval(r#"(trait-exists "long")"#, &[("long", "1")]));
        assert!(!eval(r#"(trait-exists "long")"#, &[]));
        assert!(eval(r#"(trait-exists "boolean")"#, &[("boolean", "false")]));
        assert!(!eval(r#"(trait-exists "boolean")"#, &[]));
    }

    #[test]
    fn comparison_direction_is_field_op_literal() {
        // field=3 < literal=5, so trait-lt holds and trait-gt does not.
        assert!(eval(r#"(trait-lt "long" "5")"#, &[("long", "3")]));
        assert!(!eval(r#"(trait-gt "long" "5")"#, &[("long", "3")]));
        assert!(eval(r#"(trait-gt "long" "2")"#, &[("long", "3")]));
        assert!(eval(r#"(trait-le "long" "3")"#, &[("long", "3")]));
        assert!(eval(r#"(trait-ge "long" "3")"#, &[("long", "3")]));
        // Same direction for strings.
        assert!(eval(r#"(trait-lt "string" "banana")"#, &[("string", "apple")]));
        assert!(!eval(r#"(trait-gt "string" "banana")"#, &[("string", "apple")]));
    }

    #[test]
    fn ci_eq_and_regex_and_in() {
        assert!(eval(r#"(trait-ci-eq "string" "VaLuE")"#, &[("string", "value")]));
        assert!(eval(r#"(trait-regex "string" "^va.*e$")"#, &[("string", "value")]));
        assert!(eval(r#"(trait-in "long" ("1" "2" "3"))"#, &[("long", "2")]));
        assert!(!eval(r#"(trait-in "long" ("1" "2" "3"))"#, &[("long", "9")]));
        assert!(eval(
            r#"(trait-contains-any "strings" ("string2" "other"))"#,
            &[("strings", "string1,string2")]
        ));
    }

    #[test]
    fn determinism_across_reset() {
        let schema = schema();
        let program = compiler::compile_one(&schema, r#"(trait-eq "long" "1")"#).unwrap();
        let mut vm = Vm::default();
        for _ in 0..3 {
            let mut traits = CachedMapAccessor::new(&schema, [("long", "1")]);
            vm.evaluate(&program, &mut traits).unwrap();
            assert!(vm.result());
            vm.reset();
        }
    }

    #[test]
    fn multi_expression_results() {
        let schema = schema();
        let program = compiler::compile(
            &schema,
            &[
                r#"(trait-eq "long" "1")"#,
                r#"(trait-eq "long" "2")"#,
                r#"(trait-exists "double")"#,
            ],
        )
        .unwrap();
        let mut traits = CachedMapAccessor::new(&schema, [("long", "1"), ("double", "0.5")]);
        let mut vm = Vm::default();
        vm.evaluate(&program, &mut traits).unwrap();
        assert_eq!(vm.results(), &[true, false, true]);
    }

    #[test]
    fn underflow_is_a_fault() {
        let program = crate::program::Program::new(
            vec!["(hand-built)".into()],
            vec![Instruction::op(OpCode::Pop), Instruction::op(OpCode::Halt)],
        );
        let schema = Schema::empty();
        let mut traits = CachedMapAccessor::new(&schema, Vec::<(&str, &str)>::new());
        let mut vm = Vm::default();
        let fault = vm.evaluate(&program, &mut traits).unwrap_err();
        assert!(matches!(fault, StackFault::Underflow { opcode: OpCode::Pop }));
    }

    #[test]
    fn overflow_is_a_fault() {
        let mut instructions = vec![];
        for _ in 0..=DEFAULT_STACK_SIZE {
            instructions.push(Instruction::load(Value::Boolean(true)));
        }
        instructions.push(Instruction::op(OpCode::Halt));
        let program = crate::program::Program::new(vec!["(hand-built)".into()], instructions);
        let schema = Schema::empty();
        let mut traits = CachedMapAccessor::new(&schema, Vec::<(&str, &str)>::new());
        let mut vm = Vm::default();
        let fault = vm.evaluate(&program, &mut traits).unwrap_err();
        assert!(matches!(fault, StackFault::Overflow { .. }));
    }

    #[test]
    fn scalar_and_vectorized_vms_agree() {
        let schema = schema();
        let record: &[(&str, &str)] = &[("string", "a-reasonably-long-field-value")];
        let expressions = [
            r#"(trait-eq "string" "a-reasonably-long-field-value")"#,
            r#"(trait-eq "string" "a-reasonably-long-field-valuX")"#,
            r#"(trait-lt "string" "b")"#,
            r#"(trait-ge "string" "a")"#,
        ];
        for expression in expressions {
            let program = compiler::compile_one(&schema, expression).unwrap();
            let mut outcomes = vec![];
            for vectorized in [false, true] {
                let mut traits = CachedMapAccessor::new(&schema, record.iter().copied());
                let mut vm = Vm::new(VmOptions { vectorized });
                vm.evaluate(&program, &mut traits).unwrap();
                outcomes.push(vm.result());
            }
            assert_eq!(outcomes[0], outcomes[1], "paths disagree on {expression}");
        }
    }
}

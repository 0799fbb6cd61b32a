use std::time::Instant;

use tracing::debug;

use crate::lexer::{self, LexError, Token};
use crate::program::{Instruction, OpCode, Program};
use crate::schema::{FieldType, Schema};
use crate::value::{StrValue, Value, ValueParseError};

/// Operator keywords of the trait-expression language.
mod keywords {
    pub const NOT: &str = "not";
    pub const AND: &str = "and";
    pub const OR: &str = "or";
    pub const TRAIT_EXISTS: &str = "trait-exists";
    pub const TRAIT_EQ: &str = "trait-eq";
    pub const TRAIT_NE: &str = "trait-ne";
    pub const TRAIT_LT: &str = "trait-lt";
    pub const TRAIT_LE: &str = "trait-le";
    pub const TRAIT_GT: &str = "trait-gt";
    pub const TRAIT_GE: &str = "trait-ge";
    pub const TRAIT_CI_EQ: &str = "trait-ci-eq";
    pub const TRAIT_REGEX: &str = "trait-regex";
    pub const TRAIT_CONTAINS: &str = "trait-contains";
    pub const TRAIT_CI_CONTAINS: &str = "trait-ci-contains";
    pub const TRAIT_ELEMENT_CONTAINS: &str = "trait-element-contains";
    pub const TRAIT_CONTAINS_ANY: &str = "trait-contains-any";
    pub const TRAIT_IN: &str = "trait-in";
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("no expressions to compile")]
    EmptyBatch,
    #[error("expression {index} is empty")]
    EmptyExpression { index: usize },
    #[error("cannot compile `{expression}`: {kind}")]
    Expression {
        expression: String,
        #[source]
        kind: ExpressionError,
    },
}

/// Failure inside one expression; wrapped with the expression text at
/// the batch boundary.
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("unknown operator `{operator}`")]
    UnknownOperator { operator: String },
    #[error("bad literal for {field_type} field `{field}`: {source}")]
    BadLiteral {
        field: String,
        field_type: FieldType,
        #[source]
        source: ValueParseError,
    },
    #[error("{message}")]
    Syntax { message: String },
}

impl ExpressionError {
    fn syntax(message: impl Into<String>) -> ExpressionError {
        ExpressionError::Syntax {
            message: message.into(),
        }
    }
}

/// Compile a batch of trait expressions into one program. Each
/// expression's result lands in the result slot matching its index;
/// the batch compiles atomically — any failure rejects the whole call.
pub fn compile<S: AsRef<str>>(schema: &Schema, expressions: &[S]) -> Result<Program, CompileError> {
    if expressions.is_empty() {
        return Err(CompileError::EmptyBatch);
    }

    let started = Instant::now();
    let mut instructions: Vec<Instruction> = Vec::new();
    let mut sources: Vec<Box<str>> = Vec::with_capacity(expressions.len());

    for (index, expression) in expressions.iter().enumerate() {
        let expression = expression.as_ref();
        if expression.trim().is_empty() {
            return Err(CompileError::EmptyExpression { index });
        }

        let wrap = |kind: ExpressionError| CompileError::Expression {
            expression: expression.to_string(),
            kind,
        };

        let tokens = lexer::lex(expression).map_err(|e| wrap(e.into()))?;
        let mut cursor = TokenCursor::new(tokens);
        while !cursor.at_end() {
            parse_expression(&mut cursor, &mut instructions, schema).map_err(&wrap)?;
        }

        instructions.push(Instruction::store_result(index));
        sources.push(expression.into());
    }

    instructions.push(Instruction::op(OpCode::Halt));

    debug!(
        expressions = expressions.len(),
        instructions = instructions.len(),
        elapsed = ?started.elapsed(),
        "compile phase complete"
    );

    Ok(Program::new(sources, instructions))
}

/// Single-expression convenience over [`compile`].
pub fn compile_one(schema: &Schema, expression: &str) -> Result<Program, CompileError> {
    compile(schema, &[expression])
}

struct TokenCursor {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenCursor {
    fn new(tokens: Vec<Token>) -> TokenCursor {
        TokenCursor { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn at_rparen(&self) -> bool {
        matches!(self.peek(), Some(Token::RParen))
    }

    fn expect_lparen(&mut self) -> Result<(), ExpressionError> {
        match self.peek() {
            Some(Token::LParen) => {
                self.pos += 1;
                Ok(())
            }
            Some(other) => Err(ExpressionError::syntax(format!(
                "expected `(`, got {other:?}"
            ))),
            None => Err(ExpressionError::syntax("expected `(`, got end of input")),
        }
    }

    fn expect_rparen(&mut self) -> Result<(), ExpressionError> {
        match self.peek() {
            Some(Token::RParen) => {
                self.pos += 1;
                Ok(())
            }
            Some(other) => Err(ExpressionError::syntax(format!(
                "expected `)`, got {other:?}"
            ))),
            None => Err(ExpressionError::syntax("expected `)`, got end of input")),
        }
    }

    /// Next quoted or bare word.
    fn expect_word(&mut self) -> Result<String, ExpressionError> {
        match self.peek() {
            Some(token) => match token.word() {
                Some(word) => {
                    let word = word.to_string();
                    self.pos += 1;
                    Ok(word)
                }
                None => Err(ExpressionError::syntax(format!(
                    "expected a name or literal, got {token:?}"
                ))),
            },
            None => Err(ExpressionError::syntax(
                "expected a name or literal, got end of input",
            )),
        }
    }
}

fn parse_expression(
    cursor: &mut TokenCursor,
    instructions: &mut Vec<Instruction>,
    schema: &Schema,
) -> Result<(), ExpressionError> {
    cursor.expect_lparen()?;
    let operator = cursor.expect_word()?;

    match operator.as_str() {
        keywords::NOT => {
            parse_expression(cursor, instructions, schema)?;
            instructions.push(Instruction::op(OpCode::Not));
        }

        keywords::OR => {
            parse_combinator(cursor, instructions, schema, OpCode::JumpIfTrue)?;
        }

        keywords::AND => {
            parse_combinator(cursor, instructions, schema, OpCode::JumpIfFalse)?;
        }

        keywords::TRAIT_EXISTS => {
            parse_get_field(cursor, instructions, schema)?;
            instructions.push(Instruction::op(OpCode::IsNotNull));
        }

        _ => parse_binary_operator(&operator, cursor, instructions, schema)?,
    }

    cursor.expect_rparen()
}

/// Short-circuit chain for `and`/`or`: after each operand but the last,
/// duplicate the running value, conditionally jump past the remaining
/// operands, and pop the duplicate before evaluating the next one. All
/// jumps target the first instruction after the chain, leaving exactly
/// one boolean behind.
fn parse_combinator(
    cursor: &mut TokenCursor,
    instructions: &mut Vec<Instruction>,
    schema: &Schema,
    jump: OpCode,
) -> Result<(), ExpressionError> {
    parse_expression(cursor, instructions, schema)?;

    let mut jump_sites = Vec::new();
    while !cursor.at_rparen() && !cursor.at_end() {
        instructions.push(Instruction::op(OpCode::Dup));
        jump_sites.push(instructions.len());
        // Placeholder target, patched once the chain's end is known.
        instructions.push(match jump {
            OpCode::JumpIfTrue => Instruction::jump_if_true(0),
            _ => Instruction::jump_if_false(0),
        });
        instructions.push(Instruction::op(OpCode::Pop));
        parse_expression(cursor, instructions, schema)?;
    }

    let end = instructions.len();
    for site in jump_sites {
        instructions[site] = match jump {
            OpCode::JumpIfTrue => Instruction::jump_if_true(end),
            _ => Instruction::jump_if_false(end),
        };
    }

    Ok(())
}

/// Field access: push the schema type marker, push the field name, emit
/// `GetField`. Fields absent from the schema default to String — the
/// schema is a hint, never mandatory.
fn parse_get_field(
    cursor: &mut TokenCursor,
    instructions: &mut Vec<Instruction>,
    schema: &Schema,
) -> Result<(String, FieldType), ExpressionError> {
    let field = cursor.expect_word()?;
    let field_type = schema.field_type(&field).unwrap_or(FieldType::String);

    instructions.push(Instruction::load(Value::field_type(field_type)));
    instructions.push(Instruction::load(Value::string(&field)));
    instructions.push(Instruction::op(OpCode::GetField));

    Ok((field, field_type))
}

fn parse_binary_operator(
    operator: &str,
    cursor: &mut TokenCursor,
    instructions: &mut Vec<Instruction>,
    schema: &Schema,
) -> Result<(), ExpressionError> {
    // Reject unknown operators before consuming operands.
    let Some(select) = comparison_opcode(operator) else {
        return Err(ExpressionError::UnknownOperator {
            operator: operator.to_string(),
        });
    };

    let (field, field_type) = parse_get_field(cursor, instructions, schema)?;
    parse_argument(operator, cursor, instructions, &field, field_type)?;
    instructions.push(Instruction::op(select(field_type)));

    Ok(())
}

/// Compile-time literal parsing, typed by the field's declared type
/// (scalar fields and array fields share the element type). String
/// literals get operator-specific handling: `trait-ci-eq` folds the
/// literal once here and flags it, `trait-regex` compiles the pattern.
fn parse_argument(
    operator: &str,
    cursor: &mut TokenCursor,
    instructions: &mut Vec<Instruction>,
    field: &str,
    field_type: FieldType,
) -> Result<(), ExpressionError> {
    if operator == keywords::TRAIT_IN || operator == keywords::TRAIT_CONTAINS_ANY {
        return parse_multi_value_argument(cursor, instructions, field, field_type);
    }

    let token = cursor.expect_word()?;
    let parsed = match field_type.element() {
        FieldType::Long => Value::parse_long(&token),
        FieldType::Double => Value::parse_double(&token),
        FieldType::Boolean => Value::parse_boolean(&token),
        _ => match operator {
            keywords::TRAIT_CI_EQ => Ok(Value::Str(StrValue::new(&token).to_lowercase())),
            keywords::TRAIT_REGEX => Value::parse_regex(&token),
            _ => Ok(Value::string(&token)),
        },
    };

    let value = parsed.map_err(|source| ExpressionError::BadLiteral {
        field: field.to_string(),
        field_type,
        source,
    })?;
    instructions.push(Instruction::load(value));

    Ok(())
}

/// Parenthesized literal list for `trait-in`/`trait-contains-any`,
/// compiled into a single array value typed to match the field.
fn parse_multi_value_argument(
    cursor: &mut TokenCursor,
    instructions: &mut Vec<Instruction>,
    field: &str,
    field_type: FieldType,
) -> Result<(), ExpressionError> {
    cursor.expect_lparen()?;
    let mut elements = Vec::new();
    while !cursor.at_rparen() {
        elements.push(cursor.expect_word()?);
    }
    cursor.expect_rparen()?;

    let parsed = match field_type.element() {
        FieldType::Long => Value::long_array(&elements),
        FieldType::Double => Value::double_array(&elements),
        FieldType::Boolean => Value::boolean_array(&elements),
        _ => Ok(Value::string_array(&elements)),
    };

    let value = parsed.map_err(|source| ExpressionError::BadLiteral {
        field: field.to_string(),
        field_type,
        source,
    })?;
    instructions.push(Instruction::load(value));

    Ok(())
}

/// Opcode selection table: each source operator maps to a function from
/// the field's resolved type to a type-specialized opcode, with the
/// string family as the fallback for unknown or mismatched types.
fn comparison_opcode(operator: &str) -> Option<fn(FieldType) -> OpCode> {
    use FieldType as T;

    Some(match operator {
        keywords::TRAIT_EQ => |t| match t {
            T::Long => OpCode::LongEq,
            T::Double => OpCode::DoubleEq,
            T::Boolean => OpCode::BooleanEq,
            _ => OpCode::StringEq,
        },
        keywords::TRAIT_NE => |t| match t {
            T::Long => OpCode::LongNe,
            T::Double => OpCode::DoubleNe,
            T::Boolean => OpCode::BooleanNe,
            _ => OpCode::StringNe,
        },
        keywords::TRAIT_LT => |t| match t {
            T::Long => OpCode::LongLt,
            T::Double => OpCode::DoubleLt,
            _ => OpCode::StringLt,
        },
        keywords::TRAIT_LE => |t| match t {
            T::Long => OpCode::LongLe,
            T::Double => OpCode::DoubleLe,
            _ => OpCode::StringLe,
        },
        keywords::TRAIT_GT => |t| match t {
            T::Long => OpCode::LongGt,
            T::Double => OpCode::DoubleGt,
            _ => OpCode::StringGt,
        },
        keywords::TRAIT_GE => |t| match t {
            T::Long => OpCode::LongGe,
            T::Double => OpCode::DoubleGe,
            _ => OpCode::StringGe,
        },
        keywords::TRAIT_CI_EQ => |_| OpCode::StringCiEq,
        keywords::TRAIT_REGEX => |_| OpCode::StringRegexpMatch,
        keywords::TRAIT_CONTAINS => |t| match t {
            T::LongArray => OpCode::LongArrayContains,
            T::DoubleArray => OpCode::DoubleArrayContains,
            T::BooleanArray => OpCode::BooleanArrayContains,
            T::StringArray => OpCode::StringArrayContains,
            _ => OpCode::StringContains,
        },
        keywords::TRAIT_CI_CONTAINS => |_| OpCode::StringCiContains,
        keywords::TRAIT_ELEMENT_CONTAINS => |_| OpCode::StringArrayElementContains,
        keywords::TRAIT_IN => |t| match t {
            T::Long => OpCode::LongIn,
            T::Double => OpCode::DoubleIn,
            T::Boolean => OpCode::BooleanIn,
            _ => OpCode::StringIn,
        },
        keywords::TRAIT_CONTAINS_ANY => |t| match t {
            T::LongArray => OpCode::LongArrayIntersectsNonEmpty,
            T::DoubleArray => OpCode::DoubleArrayIntersectsNonEmpty,
            T::BooleanArray => OpCode::BooleanArrayIntersectsNonEmpty,
            _ => OpCode::StringArrayIntersectsNonEmpty,
        },
        _ => return None,
    })
}

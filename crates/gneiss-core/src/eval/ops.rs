//! Binary and unary operator semantics.
//!
//! Operators are strictly typed: there is no implicit coercion or
//! truthiness anywhere. `+`/`-` double as the list-editing operators;
//! list subtraction is hygienic (removing a value that is not present
//! is an error, not a no-op).

use crate::value::{Value, ValueKind};
use gneiss_dsl::ast::BinaryOp;
use gneiss_dsl::{Error, ErrorKind, Span};

pub fn apply_binary(op: BinaryOp, left: Value, right: Value, span: Span) -> Result<Value, Error> {
    match op {
        BinaryOp::Add => add_values(left, right, span),
        BinaryOp::Subtract => sub_values(left, right, span),
        BinaryOp::Eq => compare_eq(left, right, span).map(|b| Value::bool(b, span)),
        BinaryOp::Ne => compare_eq(left, right, span).map(|b| Value::bool(!b, span)),
        BinaryOp::Lt => compare_ints(left, right, span, |a, b| a < b),
        BinaryOp::Le => compare_ints(left, right, span, |a, b| a <= b),
        BinaryOp::Gt => compare_ints(left, right, span, |a, b| a > b),
        BinaryOp::Ge => compare_ints(left, right, span, |a, b| a >= b),
        // && and || short-circuit in the evaluator and never get here.
        BinaryOp::And | BinaryOp::Or => Err(Error::new(
            ErrorKind::Type,
            span,
            "logical operators are handled before operand evaluation",
        )),
    }
}

/// `+`: integer addition, string concatenation, list append.
/// Adding a list appends its elements; adding a scalar appends it.
pub fn add_values(left: Value, right: Value, span: Span) -> Result<Value, Error> {
    match (left.kind, right.kind) {
        (ValueKind::Int(a), ValueKind::Int(b)) => match a.checked_add(b) {
            Some(n) => Ok(Value::int(n, span)),
            None => Err(Error::new(ErrorKind::Type, span, "integer overflow in \"+\"")),
        },
        (ValueKind::String(a), ValueKind::String(b)) => {
            Ok(Value::string(format!("{}{}", a, b), span))
        }
        (ValueKind::List(mut items), ValueKind::List(more)) => {
            items.extend(more);
            Ok(Value::list(items, span))
        }
        (ValueKind::List(mut items), other) => {
            items.push(Value {
                kind: other,
                origin: right.origin,
            });
            Ok(Value::list(items, span))
        }
        (l, r) => Err(binary_type_error("+", &l, &r, span)),
    }
}

/// `-`: integer subtraction and hygienic list removal.
pub fn sub_values(left: Value, right: Value, span: Span) -> Result<Value, Error> {
    match (left.kind, right.kind) {
        (ValueKind::Int(a), ValueKind::Int(b)) => match a.checked_sub(b) {
            Some(n) => Ok(Value::int(n, span)),
            None => Err(Error::new(ErrorKind::Type, span, "integer overflow in \"-\"")),
        },
        (ValueKind::List(items), ValueKind::List(remove)) => {
            let mut items = items;
            for victim in &remove {
                remove_all(&mut items, victim, span)?;
            }
            Ok(Value::list(items, span))
        }
        (ValueKind::List(items), other) => {
            let mut items = items;
            let victim = Value {
                kind: other,
                origin: right.origin,
            };
            remove_all(&mut items, &victim, span)?;
            Ok(Value::list(items, span))
        }
        (l, r) => Err(binary_type_error("-", &l, &r, span)),
    }
}

/// Remove every element equal to `victim`; absence is an error.
fn remove_all(items: &mut Vec<Value>, victim: &Value, span: Span) -> Result<(), Error> {
    let before = items.len();
    items.retain(|item| item != victim);
    if items.len() == before {
        return Err(Error::new(
            ErrorKind::Type,
            victim.origin,
            format!(
                "value {} is not in the list",
                victim.to_display_string(true)
            ),
        )
        .with_label(span, "while evaluating this subtraction")
        .with_note("list subtraction requires every removed value to be present"));
    }
    Ok(())
}

fn compare_eq(left: Value, right: Value, span: Span) -> Result<bool, Error> {
    if left.type_name() != right.type_name() {
        return Err(Error::new(
            ErrorKind::Type,
            span,
            format!(
                "cannot compare {} to {}",
                left.type_name(),
                right.type_name()
            ),
        ));
    }
    Ok(left == right)
}

fn compare_ints(
    left: Value,
    right: Value,
    span: Span,
    cmp: impl Fn(i64, i64) -> bool,
) -> Result<Value, Error> {
    let a = left.as_int()?;
    let b = right.as_int()?;
    Ok(Value::bool(cmp(a, b), span))
}

fn binary_type_error(op: &str, left: &ValueKind, right: &ValueKind, span: Span) -> Error {
    Error::new(
        ErrorKind::Type,
        span,
        format!(
            "operator \"{}\" cannot combine {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ),
    )
}

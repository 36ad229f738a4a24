//! The tree-walking evaluator.
//!
//! Each AST node kind has one evaluation rule producing a [`Value`];
//! statements additionally side-effect a scope and yield `none`.
//! Errors are values: every rule returns `Result<Value, Error>` and
//! the first error aborts the enclosing block.
//!
//! Assignment discipline: reads walk the scope chain; plain `=`
//! writes into the nearest scope that already defines the name when
//! the intervening scopes are condition branches (shared-writes
//! scopes), otherwise into the current scope; `+=`/`-=` always write
//! through to the defining scope. Declaring a name that an enclosing
//! scope already defines with a non-`none` value is an error.

pub mod context;
pub mod ops;

pub use context::{EvalContext, FileKind, ImportedFile, Importer, OutputSink};

use crate::functions;
use crate::scope::{Scope, ScopeRef};
use crate::value::{Value, ValueKind};
use gneiss_dsl::ast::{
    Accessor, AssignOp, BinaryOp, Block, Condition, ElseBranch, Expr, ExprKind, LValue, Statement,
    StatementKind, StringPiece, UnaryOp,
};
use gneiss_dsl::{Error, ErrorKind, Span};

/// Evaluate a block's statements against an existing scope.
pub fn eval_block_in(ctx: &EvalContext, scope: &ScopeRef, block: &Block) -> Result<(), Error> {
    for statement in &block.statements {
        eval_statement(ctx, scope, statement)?;
    }
    Ok(())
}

pub fn eval_statement(
    ctx: &EvalContext,
    scope: &ScopeRef,
    statement: &Statement,
) -> Result<(), Error> {
    match &statement.kind {
        StatementKind::Assign { lvalue, op, value } => {
            eval_assign(ctx, scope, lvalue, *op, value, statement.span)
        }
        StatementKind::Call(call) => {
            functions::call_function(ctx, scope, call)?;
            Ok(())
        }
        StatementKind::Condition(condition) => eval_condition(ctx, scope, condition),
    }
}

fn eval_condition(ctx: &EvalContext, scope: &ScopeRef, cond: &Condition) -> Result<(), Error> {
    let value = eval_expr(ctx, scope, &cond.condition)?;
    let truth = value.as_bool().map_err(|e| {
        e.with_note("conditions require a boolean; there is no implicit truthiness")
    })?;

    if truth {
        let branch = Scope::shared_child_ref(scope);
        eval_block_in(ctx, &branch, &cond.then_block)?;
        branch.borrow().check_unused()?;
        return Ok(());
    }

    match &cond.else_branch {
        Some(ElseBranch::If(chained)) => eval_condition(ctx, scope, chained),
        Some(ElseBranch::Block(block)) => {
            let branch = Scope::shared_child_ref(scope);
            eval_block_in(ctx, &branch, block)?;
            branch.borrow().check_unused()?;
            Ok(())
        }
        None => Ok(()),
    }
}

fn eval_assign(
    ctx: &EvalContext,
    scope: &ScopeRef,
    lvalue: &LValue,
    op: AssignOp,
    value_expr: &Expr,
    span: Span,
) -> Result<(), Error> {
    let value = eval_expr(ctx, scope, value_expr)?;

    match &lvalue.access {
        None => assign_identifier(scope, &lvalue.base, lvalue.base_span, op, value, span),
        Some(Accessor::Member(member)) => {
            assign_member(scope, lvalue, member, op, value, span)
        }
        Some(Accessor::Index(index_expr)) => {
            let index = eval_expr(ctx, scope, index_expr)?;
            assign_index(scope, lvalue, index, op, value, span)
        }
    }
}

fn assign_identifier(
    scope: &ScopeRef,
    name: &str,
    name_span: Span,
    op: AssignOp,
    value: Value,
    span: Span,
) -> Result<(), Error> {
    match op {
        AssignOp::Assign => {
            // Walk up through shared-writes scopes: write where the
            // name is defined, or stop at the first real scope.
            let mut current = scope.clone();
            loop {
                let (defined, shared, parent) = {
                    let s = current.borrow();
                    (s.has_direct(name), s.is_shared_writes(), s.parent())
                };
                if defined {
                    current.borrow_mut().set(name, value, span);
                    return Ok(());
                }
                if !shared {
                    break;
                }
                match parent {
                    Some(p) => current = p,
                    None => break,
                }
            }

            // `current` is the home scope; shadowing a live binding
            // in an enclosing scope is an error.
            if let Some(ancestor) = Scope::ancestor_defining(&current, name) {
                let existing = ancestor.borrow().get_direct(name);
                if let Some(existing) = existing {
                    if !existing.is_none() {
                        let decl = ancestor.borrow().decl_span_direct(name);
                        let mut err = Error::new(
                            ErrorKind::Name,
                            name_span,
                            format!(
                                "declaration of \"{}\" shadows a variable in an enclosing scope",
                                name
                            ),
                        );
                        if let Some(decl) = decl {
                            err = err.with_label(decl, "first declared here");
                        }
                        return Err(err);
                    }
                }
            }
            current.borrow_mut().set(name, value, span);
            Ok(())
        }
        AssignOp::Add | AssignOp::Subtract => {
            let containing = Scope::find_containing(scope, name).ok_or_else(|| {
                Error::new(
                    ErrorKind::Name,
                    name_span,
                    format!("\"{}\" must be defined before using \"+=\" or \"-=\"", name),
                )
            })?;
            let old = containing
                .borrow()
                .get_direct(name)
                .expect("containing scope lost the binding");
            let new = match op {
                AssignOp::Add => ops::add_values(old, value, span)?,
                AssignOp::Subtract => ops::sub_values(old, value, span)?,
                AssignOp::Assign => unreachable!(),
            };
            containing.borrow_mut().set(name, new, span);
            Ok(())
        }
    }
}

/// `base.member = value`: write into a scope-typed binding in place.
fn assign_member(
    scope: &ScopeRef,
    lvalue: &LValue,
    member: &str,
    op: AssignOp,
    value: Value,
    span: Span,
) -> Result<(), Error> {
    let inner = scope_handle(scope, &lvalue.base, lvalue.base_span)?;
    match op {
        AssignOp::Assign => {
            inner.borrow_mut().set(member, value, span);
            Ok(())
        }
        AssignOp::Add | AssignOp::Subtract => {
            let old = inner.borrow().get_direct(member).ok_or_else(|| {
                Error::new(
                    ErrorKind::Name,
                    span,
                    format!(
                        "\"{}.{}\" must be defined before using \"+=\" or \"-=\"",
                        lvalue.base, member
                    ),
                )
            })?;
            let new = match op {
                AssignOp::Add => ops::add_values(old, value, span)?,
                AssignOp::Subtract => ops::sub_values(old, value, span)?,
                AssignOp::Assign => unreachable!(),
            };
            inner.borrow_mut().set(member, new, span);
            Ok(())
        }
    }
}

/// `base[index] = value`: replace one list element.
fn assign_index(
    scope: &ScopeRef,
    lvalue: &LValue,
    index: Value,
    op: AssignOp,
    value: Value,
    span: Span,
) -> Result<(), Error> {
    let idx = index.as_int()?;
    Scope::with_binding_mut(scope, &lvalue.base, |binding| {
        let items = match &mut binding.value.kind {
            ValueKind::List(items) => items,
            _ => {
                return Err(Error::new(
                    ErrorKind::Type,
                    lvalue.base_span,
                    format!(
                        "\"{}\" is a {}, not a list",
                        lvalue.base,
                        binding.value.type_name()
                    ),
                ));
            }
        };
        if idx < 0 || idx as usize >= items.len() {
            return Err(Error::new(
                ErrorKind::Type,
                index.origin,
                format!(
                    "index {} is out of range for a list of {} elements",
                    idx,
                    items.len()
                ),
            ));
        }
        let slot = &mut items[idx as usize];
        let new = match op {
            AssignOp::Assign => value,
            AssignOp::Add => ops::add_values(slot.clone(), value, span)?,
            AssignOp::Subtract => ops::sub_values(slot.clone(), value, span)?,
        };
        *slot = new;
        Ok(())
    })
    .unwrap_or_else(|| {
        Err(Error::new(
            ErrorKind::Name,
            lvalue.base_span,
            format!("undefined identifier \"{}\"", lvalue.base),
        ))
    })
}

pub fn eval_expr(ctx: &EvalContext, scope: &ScopeRef, expr: &Expr) -> Result<Value, Error> {
    match &expr.kind {
        ExprKind::Integer(n) => Ok(Value::int(*n, expr.span)),
        ExprKind::Bool(b) => Ok(Value::bool(*b, expr.span)),
        ExprKind::String(pieces) => eval_string(ctx, scope, pieces, expr.span),
        ExprKind::List(elements) => {
            let mut items = Vec::with_capacity(elements.len());
            for element in elements {
                items.push(eval_expr(ctx, scope, element)?);
            }
            Ok(Value::list(items, expr.span))
        }
        ExprKind::Identifier(name) => Scope::lookup(scope, name).ok_or_else(|| {
            Error::new(
                ErrorKind::Name,
                expr.span,
                format!("undefined identifier \"{}\"", name),
            )
        }),
        ExprKind::Access {
            base,
            base_span,
            access,
        } => eval_access(ctx, scope, base, *base_span, access, expr.span),
        ExprKind::Unary { op, operand } => {
            let value = eval_expr(ctx, scope, operand)?;
            match op {
                UnaryOp::Not => Ok(Value::bool(!value.as_bool()?, expr.span)),
            }
        }
        ExprKind::Binary { op, left, right } => match op {
            BinaryOp::And => {
                let l = eval_expr(ctx, scope, left)?.as_bool()?;
                if !l {
                    return Ok(Value::bool(false, expr.span));
                }
                Ok(Value::bool(eval_expr(ctx, scope, right)?.as_bool()?, expr.span))
            }
            BinaryOp::Or => {
                let l = eval_expr(ctx, scope, left)?.as_bool()?;
                if l {
                    return Ok(Value::bool(true, expr.span));
                }
                Ok(Value::bool(eval_expr(ctx, scope, right)?.as_bool()?, expr.span))
            }
            _ => {
                let l = eval_expr(ctx, scope, left)?;
                let r = eval_expr(ctx, scope, right)?;
                ops::apply_binary(*op, l, r, expr.span)
            }
        },
        ExprKind::Block(block) => {
            // Scope literal. Evaluated in a child scope for lexical
            // lookups, then detached so the stored scope is
            // self-contained. Members are data, not declarations, so
            // no unused check.
            let child = Scope::child_ref(scope);
            eval_block_in(ctx, &child, block)?;
            let detached = child.borrow().clone_detached();
            Ok(Value::scope(
                std::rc::Rc::new(std::cell::RefCell::new(detached)),
                expr.span,
            ))
        }
        ExprKind::Call(call) => functions::call_function(ctx, scope, call),
    }
}

fn eval_string(
    ctx: &EvalContext,
    scope: &ScopeRef,
    pieces: &[StringPiece],
    span: Span,
) -> Result<Value, Error> {
    let mut out = String::new();
    for piece in pieces {
        match piece {
            StringPiece::Literal(text) => out.push_str(text),
            StringPiece::Embedded(expr) => {
                let value = eval_expr(ctx, scope, expr)?;
                match &value.kind {
                    ValueKind::Int(_) | ValueKind::Bool(_) | ValueKind::String(_) => {
                        out.push_str(&value.to_display_string(false));
                    }
                    other => {
                        return Err(Error::new(
                            ErrorKind::Type,
                            expr.span,
                            format!("cannot interpolate a {} into a string", other.type_name()),
                        ));
                    }
                }
            }
        }
    }
    Ok(Value::string(out, span))
}

fn eval_access(
    ctx: &EvalContext,
    scope: &ScopeRef,
    base: &str,
    base_span: Span,
    access: &Accessor,
    span: Span,
) -> Result<Value, Error> {
    match access {
        Accessor::Member(member) => {
            let inner = scope_handle(scope, base, base_span)?;
            let result = {
                let mut s = inner.borrow_mut();
                if s.has_direct(member) {
                    s.mark_used_direct(member);
                    s.get_direct(member)
                } else {
                    None
                }
            };
            result.ok_or_else(|| {
                Error::new(
                    ErrorKind::Name,
                    span,
                    format!("\"{}\" has no member \"{}\"", base, member),
                )
            })
        }
        Accessor::Index(index_expr) => {
            let index = eval_expr(ctx, scope, index_expr)?.as_int()?;
            let list = Scope::lookup(scope, base).ok_or_else(|| {
                Error::new(
                    ErrorKind::Name,
                    base_span,
                    format!("undefined identifier \"{}\"", base),
                )
            })?;
            let items = list.as_list()?;
            if index < 0 || index as usize >= items.len() {
                return Err(Error::new(
                    ErrorKind::Type,
                    span,
                    format!(
                        "index {} is out of range for a list of {} elements",
                        index,
                        items.len()
                    ),
                ));
            }
            Ok(items[index as usize].clone())
        }
    }
}

/// Resolve an identifier to the live scope handle stored in its
/// binding, marking the binding used. This is how `invoker.x`,
/// `forward_variables_from(invoker, ...)` and member assignment reach
/// the original scope rather than a copy.
pub fn scope_handle(scope: &ScopeRef, name: &str, span: Span) -> Result<ScopeRef, Error> {
    let found = Scope::with_binding_mut(scope, name, |binding| {
        binding.used = true;
        match &binding.value.kind {
            ValueKind::Scope(inner) => Ok(inner.clone()),
            other => Err(Error::new(
                ErrorKind::Type,
                span,
                format!("\"{}\" is a {}, not a scope", name, other.type_name()),
            )),
        }
    });
    match found {
        Some(result) => result,
        None => Err(Error::new(
            ErrorKind::Name,
            span,
            format!("undefined identifier \"{}\"", name),
        )),
    }
}

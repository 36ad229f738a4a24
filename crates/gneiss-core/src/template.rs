//! User-defined templates.
//!
//! `template("name") { ... }` captures a closure over its defining
//! scope (flattened, so the capture holds values rather than a live
//! chain) and registers the body AST. Invoking the template runs the
//! caller's block into an `invoker` scope, then runs the body in a
//! fresh child of the capture with `target_name` and `invoker`
//! pre-bound.
//!
//! Usage checking is deferred to the instantiation site: after the
//! body runs, both the body scope and the invoker scope are checked,
//! so a caller argument the template never consumed is an error at
//! the invocation.

use crate::eval::{self, EvalContext};
use crate::scope::{Scope, ScopeRef};
use crate::value::Value;
use gneiss_dsl::ast::{Block, Call};
use gneiss_dsl::{Error, ErrorKind, Span};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug)]
pub struct Template {
    pub name: String,
    pub decl_span: Span,
    /// Flattened defining scope, shared by every instantiation.
    closure: ScopeRef,
    body: Rc<Block>,
}

impl Template {
    pub fn new(name: impl Into<String>, decl_span: Span, closure: Scope, body: Block) -> Self {
        Self {
            name: name.into(),
            decl_span,
            closure: Rc::new(RefCell::new(closure)),
            body: Rc::new(body),
        }
    }

    /// Instantiate: `name("instance") { caller bindings }`.
    pub fn invoke(
        &self,
        ctx: &EvalContext,
        caller_scope: &ScopeRef,
        call: &Call,
        args: Vec<Value>,
    ) -> Result<Value, Error> {
        if args.len() != 1 {
            return Err(Error::new(
                ErrorKind::Type,
                call.span,
                format!(
                    "template \"{}\" takes one argument, the instance name",
                    self.name
                ),
            ));
        }
        let instance = args[0].as_string()?.to_string();
        let block = call.block.as_ref().ok_or_else(|| {
            Error::new(
                ErrorKind::Generator,
                call.span,
                format!("invoking template \"{}\" requires a {{ }} block", self.name),
            )
        })?;

        // The caller's block becomes the invoker scope.
        let invoker_scope = Scope::child_ref(caller_scope);
        eval::eval_block_in(ctx, &invoker_scope, block)?;

        // The body runs against the capture, not the caller.
        let template_scope = Scope::child_ref(&self.closure);
        {
            let mut ts = template_scope.borrow_mut();
            ts.set_exempt("target_name", Value::string(instance, call.span), call.span);
            ts.set_exempt(
                "invoker",
                Value::scope(invoker_scope.clone(), call.span),
                call.span,
            );
        }
        eval::eval_block_in(ctx, &template_scope, &self.body)?;

        template_scope.borrow().check_unused().map_err(|e| {
            e.with_note(format!("in the expansion of template \"{}\"", self.name))
        })?;
        invoker_scope.borrow().check_unused().map_err(|e| {
            e.with_note(format!(
                "the template \"{}\" never used this value from its invoker",
                self.name
            ))
            .with_label(self.decl_span, "template defined here")
        })?;

        Ok(Value::none(call.span))
    }
}

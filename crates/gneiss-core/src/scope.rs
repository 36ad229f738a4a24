//! Lexical environments with unused-binding tracking.
//!
//! Every name a build file writes must be read before its scope goes
//! away; [`Scope::check_unused`] enforces that at scope teardown.
//! Reads walk the parent chain, writes land in the current scope,
//! except that `+=`/`-=` and assignments inside condition branches
//! (`shared_writes` scopes) write through to the scope that declared
//! the name.
//!
//! Parents are held strongly, but only for the duration of
//! evaluation: scopes stored into values are detached snapshots with
//! no parent link, and template capture flattens the chain, so the
//! scope graph never cycles.

use crate::template::Template;
use crate::value::Value;
use gneiss_dsl::{Error, ErrorKind, Span};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

pub type ScopeRef = Rc<RefCell<Scope>>;

/// One name → value entry.
#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub used: bool,
    /// Exempt from the unused check (imported names, installed
    /// generator variables, copied defaults).
    pub exempt: bool,
    pub decl_span: Span,
}

#[derive(Debug, Default)]
pub struct Scope {
    parent: Option<ScopeRef>,
    /// Condition branches share writes with their enclosing scope.
    shared_writes: bool,
    bindings: IndexMap<String, Binding>,
    templates: IndexMap<String, Rc<Template>>,
}

impl Scope {
    /// Root scope with no parent.
    pub fn root_ref() -> ScopeRef {
        Rc::new(RefCell::new(Scope::default()))
    }

    /// Child scope for blocks, targets and template bodies.
    pub fn child_ref(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            parent: Some(parent.clone()),
            ..Scope::default()
        }))
    }

    /// Child scope for condition branches: plain assignments to names
    /// that already exist in an enclosing scope write through.
    pub fn shared_child_ref(parent: &ScopeRef) -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            parent: Some(parent.clone()),
            shared_writes: true,
            ..Scope::default()
        }))
    }

    /// Parentless scope for snapshots and closures.
    pub fn detached() -> Scope {
        Scope::default()
    }

    pub fn detached_ref() -> ScopeRef {
        Rc::new(RefCell::new(Scope::default()))
    }

    pub fn parent(&self) -> Option<ScopeRef> {
        self.parent.clone()
    }

    pub fn is_shared_writes(&self) -> bool {
        self.shared_writes
    }

    // --- direct (single-level) operations ---

    pub fn has_direct(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Value of a direct binding, without marking it used.
    pub fn get_direct(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).map(|b| b.value.clone())
    }

    pub fn decl_span_direct(&self, name: &str) -> Option<Span> {
        self.bindings.get(name).map(|b| b.decl_span)
    }

    /// Write a binding into this scope. Re-writing an existing name
    /// keeps its used flag; a fresh name starts unused.
    pub fn set(&mut self, name: impl Into<String>, value: Value, span: Span) {
        let name = name.into();
        match self.bindings.get_mut(&name) {
            Some(binding) => {
                binding.value = value;
                binding.decl_span = span;
            }
            None => {
                self.bindings.insert(
                    name,
                    Binding {
                        value,
                        used: false,
                        exempt: false,
                        decl_span: span,
                    },
                );
            }
        }
    }

    /// Install a generator-provided binding, exempt from usage checks.
    pub fn set_exempt(&mut self, name: impl Into<String>, value: Value, span: Span) {
        self.bindings.insert(
            name.into(),
            Binding {
                value,
                used: false,
                exempt: true,
                decl_span: span,
            },
        );
    }

    pub fn mark_used_direct(&mut self, name: &str) -> bool {
        match self.bindings.get_mut(name) {
            Some(binding) => {
                binding.used = true;
                true
            }
            None => false,
        }
    }

    pub fn mark_all_used(&mut self) {
        for binding in self.bindings.values_mut() {
            binding.used = true;
        }
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.bindings.iter().map(|(k, b)| (k.as_str(), &b.value))
    }

    pub fn binding_names(&self) -> Vec<String> {
        self.bindings.keys().cloned().collect()
    }

    pub fn templates(&self) -> impl Iterator<Item = (&str, &Rc<Template>)> {
        self.templates.iter().map(|(k, t)| (k.as_str(), t))
    }

    /// Register a template in this scope.
    pub fn declare_template(&mut self, template: Rc<Template>) -> Result<(), Error> {
        if let Some(existing) = self.templates.get(&template.name) {
            return Err(Error::new(
                ErrorKind::Name,
                template.decl_span,
                format!("template \"{}\" is already defined", template.name),
            )
            .with_label(existing.decl_span, "first defined here"));
        }
        self.templates.insert(template.name.clone(), template);
        Ok(())
    }

    /// Error on the first user binding that was never consumed.
    pub fn check_unused(&self) -> Result<(), Error> {
        for (name, binding) in &self.bindings {
            if binding.used || binding.exempt || name.starts_with('_') {
                continue;
            }
            return Err(Error::new(
                ErrorKind::Usage,
                binding.decl_span,
                format!("assignment of \"{}\" was never used", name),
            )
            .with_note(
                "prefix the name with \"_\" or pass it to not_needed() if this is intentional",
            ));
        }
        Ok(())
    }

    /// Copy of this scope's own level: no parent, values deep-cloned.
    pub fn clone_detached(&self) -> Scope {
        Scope {
            parent: None,
            shared_writes: false,
            bindings: self.bindings.clone(),
            templates: self.templates.clone(),
        }
    }

    /// Structural equality of direct bindings (order-insensitive).
    pub fn same_bindings(&self, other: &Scope) -> bool {
        self.bindings.len() == other.bindings.len()
            && self.bindings.iter().all(|(name, binding)| {
                other
                    .bindings
                    .get(name)
                    .is_some_and(|o| o.value == binding.value)
            })
    }

    // --- chain operations ---

    /// Look a name up the parent chain, marking it used where found.
    pub fn lookup(scope: &ScopeRef, name: &str) -> Option<Value> {
        Scope::with_binding_mut(scope, name, |binding| {
            binding.used = true;
            binding.value.clone()
        })
    }

    /// Look a name up without touching its used flag (`defined()`).
    pub fn lookup_no_mark(scope: &ScopeRef, name: &str) -> Option<Value> {
        let mut current = scope.clone();
        loop {
            let next = {
                let s = current.borrow();
                if let Some(binding) = s.bindings.get(name) {
                    return Some(binding.value.clone());
                }
                s.parent.clone()
            };
            current = next?;
        }
    }

    /// Declaration span of a name anywhere in the chain.
    pub fn decl_span(scope: &ScopeRef, name: &str) -> Option<Span> {
        let mut current = scope.clone();
        loop {
            let next = {
                let s = current.borrow();
                if let Some(binding) = s.bindings.get(name) {
                    return Some(binding.decl_span);
                }
                s.parent.clone()
            };
            current = next?;
        }
    }

    /// Nearest scope (including `scope`) that defines `name`.
    pub fn find_containing(scope: &ScopeRef, name: &str) -> Option<ScopeRef> {
        let mut current = scope.clone();
        loop {
            let next = {
                let s = current.borrow();
                if s.bindings.contains_key(name) {
                    drop(s);
                    return Some(current);
                }
                s.parent.clone()
            };
            current = next?;
        }
    }

    /// Nearest strict ancestor that defines `name`.
    pub fn ancestor_defining(scope: &ScopeRef, name: &str) -> Option<ScopeRef> {
        let parent = scope.borrow().parent.clone()?;
        Scope::find_containing(&parent, name)
    }

    /// Mark a name used wherever it is defined in the chain.
    pub fn mark_used(scope: &ScopeRef, name: &str) -> bool {
        Scope::with_binding_mut(scope, name, |binding| {
            binding.used = true;
        })
        .is_some()
    }

    /// Run `f` on the binding for `name` wherever it lives in the chain.
    pub fn with_binding_mut<R>(
        scope: &ScopeRef,
        name: &str,
        f: impl FnOnce(&mut Binding) -> R,
    ) -> Option<R> {
        let mut current = scope.clone();
        loop {
            let next = {
                let mut s = current.borrow_mut();
                if let Some(binding) = s.bindings.get_mut(name) {
                    return Some(f(binding));
                }
                s.parent.clone()
            };
            current = next?;
        }
    }

    /// Find a template by name up the chain.
    pub fn lookup_template(scope: &ScopeRef, name: &str) -> Option<Rc<Template>> {
        let mut current = scope.clone();
        loop {
            let next = {
                let s = current.borrow();
                if let Some(template) = s.templates.get(name) {
                    return Some(template.clone());
                }
                s.parent.clone()
            };
            current = next?;
        }
    }

    /// Flatten the whole chain into one detached scope for template
    /// capture. Nearer scopes win on name collisions. Everything
    /// captured is marked used in its source scope: the template body
    /// may consume it at any later instantiation.
    pub fn make_closure(scope: &ScopeRef) -> Scope {
        let mut chain = Vec::new();
        let mut current = Some(scope.clone());
        while let Some(s) = current {
            current = s.borrow().parent.clone();
            chain.push(s);
        }

        let mut closure = Scope::detached();
        for level in chain.iter().rev() {
            let mut level = level.borrow_mut();
            for (name, binding) in level.bindings.iter_mut() {
                binding.used = true;
                closure.bindings.insert(name.clone(), binding.clone());
            }
            for (name, template) in &level.templates {
                closure.templates.insert(name.clone(), template.clone());
            }
        }
        closure
    }

    /// Copy `src`'s bindings and templates into `dest` (imports,
    /// `forward_variables_from`). Collisions with a different value
    /// are errors; identical re-imports are no-ops.
    pub fn merge_into(
        src: &Scope,
        dest: &ScopeRef,
        exempt: bool,
        span: Span,
        what: &str,
    ) -> Result<(), Error> {
        for (name, binding) in &src.bindings {
            let conflict = {
                let d = dest.borrow();
                match d.bindings.get(name) {
                    Some(existing) if existing.value != binding.value => {
                        Some(existing.decl_span)
                    }
                    Some(_) => continue,
                    None => None,
                }
            };
            if let Some(existing_span) = conflict {
                return Err(Error::new(
                    ErrorKind::Name,
                    span,
                    format!("{} would clobber existing binding \"{}\"", what, name),
                )
                .with_label(existing_span, "existing binding declared here"));
            }
            dest.borrow_mut().bindings.insert(
                name.clone(),
                Binding {
                    value: binding.value.clone(),
                    used: false,
                    exempt,
                    decl_span: span,
                },
            );
        }

        for (name, template) in &src.templates {
            let conflict = {
                let d = dest.borrow();
                match d.templates.get(name) {
                    Some(existing) if !Rc::ptr_eq(existing, template) => {
                        Some(existing.decl_span)
                    }
                    Some(_) => continue,
                    None => None,
                }
            };
            if let Some(existing_span) = conflict {
                return Err(Error::new(
                    ErrorKind::Name,
                    span,
                    format!("{} would clobber existing template \"{}\"", what, name),
                )
                .with_label(existing_span, "existing template defined here"));
            }
            dest.borrow_mut()
                .templates
                .insert(name.clone(), template.clone());
        }
        Ok(())
    }
}

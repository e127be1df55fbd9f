//! Entry-point validation.
//!
//! A script may be perfectly valid Rhai and still not be runnable as a post
//! effect. This module decides whether a compiled unit exposes a `Main` that can
//! be called once per frame, either with no arguments or with the frame context.

use rhai::{CallFnOptions, Dynamic, Engine, EvalAltResult, FnAccess, FnPtr, Scope, AST};

use crate::compiler::CompiledUnit;
use crate::script_diagnostics::Diagnostic;

/// A validated, invocable entry point. `arity` is always 0 or 1.
#[derive(Debug, Clone)]
pub enum EntryPoint {
    /// A script function declared with `fn`.
    Function { name: String, arity: usize },
    /// A top-level variable holding a function pointer or closure.
    Pointer { ptr: FnPtr, arity: usize },
}

/// Outcome of looking up the entry point in a compiled unit.
#[derive(Debug, Clone)]
pub enum EntryLookup {
    Found(EntryPoint),
    Missing,
    /// Something named like the entry point exists but cannot be invoked.
    WrongShape(String),
}

impl EntryPoint {
    pub fn arity(&self) -> usize {
        match self {
            EntryPoint::Function { arity, .. } | EntryPoint::Pointer { arity, .. } => *arity,
        }
    }

    pub(crate) fn call(
        &self,
        engine: &Engine,
        ast: &AST,
        scope: &mut Scope<'static>,
        ctx: Dynamic,
    ) -> Result<Dynamic, Box<EvalAltResult>> {
        match self {
            EntryPoint::Function { name, arity } => {
                // The top level already ran at compile time; do not re-run it per frame.
                let options = CallFnOptions::new().eval_ast(false).rewind_scope(true);
                if *arity == 0 {
                    engine.call_fn_with_options(options, scope, ast, name, ())
                } else {
                    engine.call_fn_with_options(options, scope, ast, name, (ctx,))
                }
            }
            EntryPoint::Pointer { ptr, arity } => {
                if *arity == 0 {
                    ptr.call(engine, ast, ())
                } else {
                    ptr.call(engine, ast, (ctx,))
                }
            }
        }
    }
}

/// Pick the arity to call with: prefer the one that receives the frame context.
fn callable_arity(arities: impl IntoIterator<Item = usize>) -> Option<usize> {
    arities.into_iter().filter(|a| *a <= 1).max()
}

fn describe_arities(arities: &[usize]) -> String {
    let list: Vec<String> = arities.iter().map(|a| a.to_string()).collect();
    format!(
        "it takes {} parameter(s), expected 0 (no context) or 1 (frame context)",
        list.join(" or ")
    )
}

fn lookup_function(name: &str, declared: &[(usize, FnAccess)]) -> EntryLookup {
    let public = declared
        .iter()
        .filter(|(_, access)| *access == FnAccess::Public)
        .map(|(arity, _)| *arity);
    if let Some(arity) = callable_arity(public) {
        return EntryLookup::Found(EntryPoint::Function {
            name: name.to_string(),
            arity,
        });
    }
    if callable_arity(declared.iter().map(|(arity, _)| *arity)).is_some() {
        return EntryLookup::WrongShape("it is declared private".to_string());
    }
    let arities: Vec<usize> = declared.iter().map(|(arity, _)| *arity).collect();
    EntryLookup::WrongShape(describe_arities(&arities))
}

fn lookup_pointer(unit: &CompiledUnit, value: Dynamic) -> EntryLookup {
    let type_name = value.type_name();
    let Some(ptr) = value.try_cast::<FnPtr>() else {
        return EntryLookup::WrongShape(format!("it is a value of type `{type_name}`, not a function"));
    };

    let curried = ptr.curry().len();
    let target = ptr.fn_name().to_string();
    let arities: Vec<usize> = unit
        .ast()
        .iter_functions()
        .filter(|f| f.name == target)
        .map(|f| f.params.len())
        .collect();

    if arities.is_empty() {
        return EntryLookup::WrongShape(format!(
            "it points to `{target}`, which the script does not define"
        ));
    }

    let remaining: Vec<usize> = arities
        .iter()
        .filter_map(|a| a.checked_sub(curried))
        .collect();
    match callable_arity(remaining.iter().copied()) {
        Some(arity) => EntryLookup::Found(EntryPoint::Pointer { ptr, arity }),
        None => EntryLookup::WrongShape(describe_arities(&remaining)),
    }
}

/// Find `name` among the unit's script functions, falling back to its globals.
pub fn lookup_entry_point(unit: &CompiledUnit, name: &str) -> EntryLookup {
    let declared: Vec<(usize, FnAccess)> = unit
        .ast()
        .iter_functions()
        .filter(|f| f.name == name)
        .map(|f| (f.params.len(), f.access))
        .collect();
    if !declared.is_empty() {
        return lookup_function(name, &declared);
    }

    match unit.global(name) {
        Some(value) => lookup_pointer(unit, value),
        None => EntryLookup::Missing,
    }
}

/// Attach the entry point to `unit`, or explain why it has none.
pub fn validate(mut unit: CompiledUnit, name: &str) -> Result<CompiledUnit, Diagnostic> {
    match lookup_entry_point(&unit, name) {
        EntryLookup::Found(entry_point) => {
            unit.set_entry_point(entry_point);
            Ok(unit)
        }
        EntryLookup::Missing => Err(Diagnostic::no_main_method(name)),
        EntryLookup::WrongShape(reason) => Err(Diagnostic::main_not_callable(name, &reason)),
    }
}

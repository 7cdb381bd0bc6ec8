//! The specialization driver.
//!
//! Repeats rewrite attempts over fresh clones of the source function until
//! one runs to completion. Each rollback names a constant that turned out to
//! be writable; it joins the invalidated set and is simply never folded in
//! later attempts. The invalidated set only grows and names come from a
//! finite tree, so the loop terminates.

use std::collections::HashSet;

use pe_core::ast::{Ident, StmtFunctionDef};
use pe_core::registry::Registry;
use pe_core::Result;

use crate::env::Bindings;
use crate::passes::{Optimizer, Walk};

#[derive(Debug, Clone, Copy)]
pub struct SpecializeOptions {
    /// How many nested call expansions to allow before a recursive call is
    /// left as a residual call instead.
    pub max_inline_depth: u32,
}

impl Default for SpecializeOptions {
    fn default() -> Self {
        Self {
            max_inline_depth: 64,
        }
    }
}

/// A finished specialization: the rewritten function, the environment it
/// still needs at runtime, and how many attempts it took.
#[derive(Debug, Clone)]
pub struct SpecializationOutcome {
    pub func: StmtFunctionDef,
    /// Every non-parameter constant handed in (folded or not, the residual
    /// code may still read the unfolded ones), synthesized bindings, and
    /// bound parameter constants with no literal form (the residual body
    /// reads those by name).
    pub bindings: Bindings,
    pub attempts: u32,
}

pub struct SpecializationOrchestrator<'a> {
    registry: &'a Registry,
    options: SpecializeOptions,
}

impl<'a> SpecializationOrchestrator<'a> {
    pub fn new(registry: &'a Registry) -> Self {
        Self {
            registry,
            options: SpecializeOptions::default(),
        }
    }

    pub fn with_options(registry: &'a Registry, options: SpecializeOptions) -> Self {
        Self { registry, options }
    }

    pub fn set_max_inline_depth(&mut self, depth: u32) {
        self.options.max_inline_depth = depth;
    }

    /// Specialize `func` against `constants` (parameter values and ambient
    /// names alike). Parameters with surviving constants are dropped from
    /// the signature; invalidated ones stay.
    pub fn specialize(
        &self,
        func: &StmtFunctionDef,
        constants: &Bindings,
    ) -> Result<SpecializationOutcome> {
        let mut invalidated: HashSet<Ident> = HashSet::new();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let seed: Bindings = constants
                .iter()
                .filter(|(name, _)| !invalidated.contains(*name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();
            let mut tree = func.clone();
            let mut optimizer = Optimizer::new(
                self.registry,
                seed,
                invalidated.clone(),
                self.options.max_inline_depth,
            );
            match optimizer.run(&mut tree)? {
                Walk::Rollback(name) => {
                    tracing::debug!(attempt = attempts, name = %name, "attempt rolled back");
                    invalidated.insert(name);
                }
                Walk::Continue => {
                    let (final_bindings, synthesized) = optimizer.into_state();
                    let params: HashSet<&Ident> = func.params.iter().collect();
                    let mut bindings = Bindings::new();
                    for (name, value) in constants.iter() {
                        if !params.contains(name) {
                            bindings.insert(name.clone(), value.clone());
                        }
                    }
                    for name in &synthesized {
                        if let Some(value) = final_bindings.get(name) {
                            bindings.insert(name.clone(), value.clone());
                        }
                    }
                    // Every surviving parameter constant leaves the
                    // signature. Literal-valued ones were substituted into
                    // the tree; callable-valued ones keep their Name
                    // references, so their values travel in the residual
                    // bindings instead.
                    tree.params.retain(|param| {
                        invalidated.contains(param) || constants.get(param).is_none()
                    });
                    for param in &func.params {
                        if invalidated.contains(param) {
                            continue;
                        }
                        if let Some(value) = constants.get(param) {
                            if value.as_lit().is_none() {
                                bindings.insert(param.clone(), value.clone());
                            }
                        }
                    }
                    tracing::debug!(
                        attempts,
                        invalidated = invalidated.len(),
                        "specialization complete"
                    );
                    return Ok(SpecializationOutcome {
                        func: tree,
                        bindings,
                        attempts,
                    });
                }
            }
        }
    }
}

/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the Ark Sovereign Compiler.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

//! Stub/Bridge Synthesizer.
//!
//! Turns a function import into a local function with the import's own
//! descriptor as its header, so the id, type use, params and results (and
//! therefore every reference by name or index) stay exactly as they were.

use crate::module::ModuleText;
use crate::scanner::ScanError;
use crate::signature::{self, Resolution, TypeRef};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SynthError {
    #[error("declaration {0} is not an import")]
    NotAnImport(usize),
    #[error("import {namespace}::{name} is not a function")]
    NotAFunction { namespace: String, name: String },
    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// What to put in place of an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeSpec {
    /// Leave the import untouched.
    Keep,
    /// A body-less local function. Degrades to `Synthesize` when the
    /// signature has results.
    Delete,
    /// One zero per declared result.
    Synthesize,
    /// A hand-written body, one instruction (or `(local ...)`) per line.
    Literal(Vec<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StubAction {
    Kept,
    Declared,
    Defaulted,
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Synthesis {
    pub replacement: String,
    pub action: StubAction,
    pub body: Vec<String>,
    /// A type reference that named no type entry; results were taken as empty.
    pub unresolved: Option<TypeRef>,
    /// `Delete` was requested but the signature has results.
    pub degraded: bool,
}

/// Builds the replacement for import declaration `index`. The module is not
/// modified.
pub fn synthesize(module: &ModuleText, index: usize, spec: &BridgeSpec) -> Result<Synthesis, SynthError> {
    let text = module.decl(index).ok_or(SynthError::NotAnImport(index))?.text();
    let import = signature::parse_import(text)?.ok_or(SynthError::NotAnImport(index))?;
    if !import.is_func() {
        return Err(SynthError::NotAFunction {
            namespace: import.namespace,
            name: import.name,
        });
    }

    if *spec == BridgeSpec::Keep {
        return Ok(Synthesis {
            replacement: text.to_string(),
            action: StubAction::Kept,
            body: Vec::new(),
            unresolved: None,
            degraded: false,
        });
    }

    let resolution = signature::resolve(module, import.desc)?;
    let unresolved = match &resolution {
        Resolution::Unresolved(type_ref) => Some(type_ref.clone()),
        _ => None,
    };
    let defaults = || -> Vec<String> {
        resolution
            .results()
            .iter()
            .map(|t| t.zero_instr().to_string())
            .collect()
    };

    let mut degraded = false;
    let (action, body) = match spec {
        BridgeSpec::Delete if resolution.results().is_empty() => (StubAction::Declared, Vec::new()),
        BridgeSpec::Delete => {
            degraded = true;
            (StubAction::Defaulted, defaults())
        }
        BridgeSpec::Synthesize => (StubAction::Defaulted, defaults()),
        BridgeSpec::Literal(lines) => (StubAction::Replaced, lines.clone()),
        BridgeSpec::Keep => (StubAction::Kept, Vec::new()),
    };

    Ok(Synthesis {
        replacement: function_text(import.desc, &body),
        action,
        body,
        unresolved,
        degraded,
    })
}

/// Synthesizes and writes the replacement back into the module.
pub fn apply(module: &mut ModuleText, index: usize, spec: &BridgeSpec) -> Result<Synthesis, SynthError> {
    let synthesis = synthesize(module, index, spec)?;
    if synthesis.action != StubAction::Kept {
        module.replace(index, synthesis.replacement.clone());
    }
    Ok(synthesis)
}

/// `(func ...)` descriptor reopened as a definition with `body`.
fn function_text(desc: &str, body: &[String]) -> String {
    if body.is_empty() {
        return desc.to_string();
    }
    let header = desc.strip_suffix(')').unwrap_or(desc).trim_end();
    format!("{}\n    {}\n  )", header, body.join("\n    "))
}

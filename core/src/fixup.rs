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

//! Undefined-Stub Fixup Pass.
//!
//! Linkers emit `$undefined_stub` (or `$"#funcN undefined_stub"`) bodies
//! for symbols that were referenced but never defined. Their single
//! `unreachable` becomes a default return so dead references stay inert.

use crate::module::{DeclKind, ModuleText};
use crate::scanner::ScanError;
use crate::signature;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref PLACEHOLDER: Regex =
        Regex::new(r#"^\(func\s+\$(?:undefined_stub|"[^"]*undefined_stub[^"]*")"#).unwrap();
    static ref TRAP: Regex = Regex::new(r"\bunreachable\b").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixup {
    /// First line of the placeholder, for reporting.
    pub function: String,
    pub replacement: String,
}

pub fn is_placeholder(func: &str) -> bool {
    PLACEHOLDER.is_match(func)
}

/// Replaces the first `unreachable` of every placeholder function with the
/// default return for its result types, or `nop` when it returns nothing.
pub fn fix_undefined_stubs(module: &mut ModuleText) -> Result<Vec<Fixup>, ScanError> {
    let mut fixed = Vec::new();
    for i in 0..module.len() {
        let Some(decl) = module.decl(i) else { continue };
        if decl.kind() != &DeclKind::Func || !is_placeholder(decl.text()) {
            continue;
        }
        let Some(trap) = TRAP.find(decl.text()) else { continue };

        let results = signature::resolve_result_types(module, decl.text())?;
        let replacement = if results.is_empty() {
            "nop".to_string()
        } else {
            results
                .iter()
                .map(|t| t.zero_instr())
                .collect::<Vec<_>>()
                .join("\n    ")
        };
        let text = decl.text();
        let new_text = format!("{}{}{}", &text[..trap.start()], replacement, &text[trap.end()..]);
        fixed.push(Fixup {
            function: decl.headline(),
            replacement,
        });
        module.replace(i, new_text);
    }
    Ok(fixed)
}

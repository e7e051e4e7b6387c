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

//! Allocator Call-Site Resolver.
//!
//! Bridge programs always call `$cabi_realloc`. Stripped modules may only
//! reach the allocator through an export, so those call sites are retargeted
//! once the real reference is known.

use crate::module::{DeclKind, ModuleText};
use crate::scanner::{self, Item, ScanError};
use crate::signature::{self, FuncSig};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Serialize;
use std::fmt;

/// The identifier bridge programs call.
pub const CONVENTIONAL: &str = "$cabi_realloc";
pub const EXPORT_NAME: &str = "cabi_realloc";

lazy_static! {
    static ref CALL_SITE: Regex = Regex::new(r"(\bcall\s+)\$cabi_realloc([\s)]|$)").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum AllocatorRef {
    Named(String),
    Index(u32),
}

impl AllocatorRef {
    pub fn conventional() -> Self {
        AllocatorRef::Named(CONVENTIONAL.to_string())
    }

    pub fn is_conventional(&self) -> bool {
        matches!(self, AllocatorRef::Named(id) if id == CONVENTIONAL)
    }
}

impl fmt::Display for AllocatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocatorRef::Named(id) => write!(f, "{}", id),
            AllocatorRef::Index(n) => write!(f, "{}", n),
        }
    }
}

/// Where the reference was found, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocatorSource {
    Function,
    NamedExport,
    IndexExport,
    Default,
}

pub fn resolve_allocator(module: &ModuleText) -> Result<(AllocatorRef, AllocatorSource), ScanError> {
    if has_conventional_function(module)? {
        return Ok((AllocatorRef::conventional(), AllocatorSource::Function));
    }

    let mut by_index = None;
    for decl in module.decls() {
        let found = match decl.kind() {
            DeclKind::Export => export_target(decl.text())?,
            DeclKind::Func => inline_export_target(decl.text())?,
            _ => None,
        };
        match found {
            Some(r @ AllocatorRef::Named(_)) => return Ok((r, AllocatorSource::NamedExport)),
            Some(r @ AllocatorRef::Index(_)) if by_index.is_none() => by_index = Some(r),
            _ => {}
        }
    }
    if let Some(r) = by_index {
        return Ok((r, AllocatorSource::IndexExport));
    }
    Ok((AllocatorRef::conventional(), AllocatorSource::Default))
}

/// A local function or function import declared as `$cabi_realloc`.
fn has_conventional_function(module: &ModuleText) -> Result<bool, ScanError> {
    for decl in module.decls() {
        let func = match decl.kind() {
            DeclKind::Func => Some(decl.text()),
            DeclKind::Import => signature::parse_import(decl.text())?.map(|i| i.desc),
            _ => None,
        };
        if let Some(sig) = func.map(FuncSig::parse).transpose()?.flatten() {
            if sig.id.as_deref() == Some(CONVENTIONAL) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// `(export "cabi_realloc" (func X))`
fn export_target(text: &str) -> Result<Option<AllocatorRef>, ScanError> {
    let items = scanner::list_items(text)?;
    let named = items.get(1).and_then(Item::string);
    if named.as_deref() != Some(EXPORT_NAME) {
        return Ok(None);
    }
    let desc = match items.get(2).and_then(Item::list) {
        Some(desc) if scanner::keyword(desc) == Some("func") => desc,
        _ => return Ok(None),
    };
    let target = scanner::list_items(desc)?.get(1).and_then(Item::atom);
    Ok(target.and_then(|t| {
        if t.starts_with('$') {
            Some(AllocatorRef::Named(t.to_string()))
        } else {
            t.parse().ok().map(AllocatorRef::Index)
        }
    }))
}

/// `(func $f (export "cabi_realloc") ...)`
fn inline_export_target(text: &str) -> Result<Option<AllocatorRef>, ScanError> {
    let items = scanner::list_items(text)?;
    let exported = items.iter().filter_map(Item::list).any(|list| {
        scanner::keyword(list) == Some("export")
            && scanner::list_items(list)
                .ok()
                .and_then(|inner| inner.get(1).and_then(Item::string))
                .as_deref()
                == Some(EXPORT_NAME)
    });
    if !exported {
        return Ok(None);
    }
    Ok(items
        .get(1)
        .and_then(Item::atom)
        .filter(|id| id.starts_with('$'))
        .map(|id| AllocatorRef::Named(id.to_string())))
}

/// Rewrites `call $cabi_realloc` in every function to `call <reference>`.
/// Returns the number of call sites changed.
pub fn normalize_calls(module: &mut ModuleText, reference: &AllocatorRef) -> usize {
    if reference.is_conventional() {
        return 0;
    }
    let target = reference.to_string();
    let mut rewritten = 0;
    for i in 0..module.len() {
        let Some(decl) = module.decl(i) else { continue };
        if decl.kind() != &DeclKind::Func || !CALL_SITE.is_match(decl.text()) {
            continue;
        }
        let mut count = 0;
        let text = CALL_SITE
            .replace_all(decl.text(), |caps: &Captures| {
                count += 1;
                format!("{}{}{}", &caps[1], target, &caps[2])
            })
            .into_owned();
        rewritten += count;
        module.replace(i, text);
    }
    rewritten
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(text: &str) -> (AllocatorRef, AllocatorSource) {
        resolve_allocator(&ModuleText::parse(text).unwrap()).unwrap()
    }

    #[test]
    fn test_named_function_wins_over_index_export() {
        let text = "(module\n  (func $cabi_realloc (param i32 i32 i32 i32) (result i32) i32.const 0)\n  (export \"cabi_realloc\" (func 7))\n)";
        assert_eq!(resolve(text), (AllocatorRef::conventional(), AllocatorSource::Function));
    }

    #[test]
    fn test_named_export() {
        let text = "(module\n  (func $realloc_impl (param i32 i32 i32 i32) (result i32) i32.const 0)\n  (export \"cabi_realloc\" (func $realloc_impl))\n)";
        assert_eq!(
            resolve(text),
            (AllocatorRef::Named("$realloc_impl".into()), AllocatorSource::NamedExport)
        );
    }

    #[test]
    fn test_inline_export() {
        let text = "(module\n  (func $r (export \"cabi_realloc\") (param i32 i32 i32 i32) (result i32) i32.const 0)\n)";
        assert_eq!(resolve(text), (AllocatorRef::Named("$r".into()), AllocatorSource::NamedExport));
    }

    #[test]
    fn test_index_export_and_default() {
        let text = "(module\n  (func (param i32 i32 i32 i32) (result i32) i32.const 0)\n  (export \"cabi_realloc\" (func (;0;) 0))\n)";
        assert_eq!(resolve(text), (AllocatorRef::Index(0), AllocatorSource::IndexExport));
        assert_eq!(resolve("(module)"), (AllocatorRef::conventional(), AllocatorSource::Default));
    }

    #[test]
    fn test_normalize_calls_rewrites_only_exact_name() {
        let text = "(module\n  (func $a\n    call $cabi_realloc\n    call $cabi_realloc_old\n    (call $cabi_realloc)\n  )\n)";
        let mut module = ModuleText::parse(text).unwrap();
        let n = normalize_calls(&mut module, &AllocatorRef::Index(12));
        assert_eq!(n, 2);
        assert_eq!(
            module.render(),
            "(module\n  (func $a\n    call 12\n    call $cabi_realloc_old\n    (call 12)\n  )\n)"
        );
    }

    #[test]
    fn test_normalize_is_noop_for_conventional_name() {
        let text = "(module\n  (func $a call $cabi_realloc)\n)";
        let mut module = ModuleText::parse(text).unwrap();
        assert_eq!(normalize_calls(&mut module, &AllocatorRef::conventional()), 0);
        assert_eq!(module.render(), text);
    }
}

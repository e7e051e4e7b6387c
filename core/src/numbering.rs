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

//! Function Numbering: pins every function to an identifier.
//!
//! Stubbing, legacy provisioning and import hoisting all reorder the function
//! index space. Running this first gives each unnamed function a `$#funcN`
//! identifier (the form `wasm-tools print --name-unnamed` uses) and rewrites
//! numeric function references to identifiers, so every reference keeps its
//! callee whatever moves afterwards.

use crate::module::{DeclKind, ModuleText};
use crate::scanner::{self, Item, ScanError};
use crate::signature::{self, FuncSig};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashSet;

pub const GENERATED_PREFIX: &str = "$#func";

lazy_static! {
    static ref INSTR_REF: Regex = Regex::new(r"\b((?:call|return_call|ref\.func)\s+)(\d+)\b").unwrap();
    static ref EXPORT_REF: Regex = Regex::new(r"(\(\s*func\s+(?:\(;[^;]*;\)\s*)?)(\d+)\b").unwrap();
    static ref START_REF: Regex = Regex::new(r"^(\(\s*start\s+)(\d+)\b").unwrap();
    static ref ELEM_LIST: Regex = Regex::new(r"(\bfunc)((?:\s+(?:\d+|\$[^\s()]+))+)").unwrap();
    static ref TOKEN: Regex = Regex::new(r"\S+").unwrap();
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Pinning {
    /// Functions that received a generated identifier.
    pub named: usize,
    /// Numeric references rewritten to identifiers.
    pub references: usize,
}

/// A function in index-space order.
#[derive(Debug)]
struct Slot {
    decl: usize,
    id: Option<String>,
}

pub fn pin_functions(module: &mut ModuleText) -> Result<Pinning, ScanError> {
    let slots = function_slots(module)?;
    let mut taken: HashSet<String> = slots.iter().filter_map(|s| s.id.clone()).collect();
    let mut ids = Vec::with_capacity(slots.len());
    let mut pinning = Pinning::default();

    for (index, slot) in slots.iter().enumerate() {
        let id = match &slot.id {
            Some(id) => id.clone(),
            None => {
                let id = fresh_id(index, &mut taken);
                name_function(module, slot.decl, &id)?;
                pinning.named += 1;
                id
            }
        };
        ids.push(id);
    }

    pinning.references = rewrite_references(module, &ids);
    Ok(pinning)
}

/// Imported functions (including inline `(func (import ..))` forms) come
/// first in the index space, then defined ones, each in text order.
fn function_slots(module: &ModuleText) -> Result<Vec<Slot>, ScanError> {
    let mut imported = Vec::new();
    let mut defined = Vec::new();
    for (decl, d) in module.decls().iter().enumerate() {
        match d.kind() {
            DeclKind::Import => {
                if let Some(import) = signature::parse_import(d.text())? {
                    if import.is_func() {
                        imported.push(Slot {
                            decl,
                            id: func_id(import.desc)?,
                        });
                    }
                }
            }
            DeclKind::Func => {
                let slot = Slot {
                    decl,
                    id: func_id(d.text())?,
                };
                if has_inline_import(d.text())? {
                    imported.push(slot);
                } else {
                    defined.push(slot);
                }
            }
            _ => {}
        }
    }
    imported.extend(defined);
    Ok(imported)
}

fn func_id(func: &str) -> Result<Option<String>, ScanError> {
    Ok(FuncSig::parse(func)?.and_then(|sig| sig.id))
}

fn has_inline_import(func: &str) -> Result<bool, ScanError> {
    Ok(scanner::list_items(func)?
        .iter()
        .filter_map(Item::list)
        .any(|list| scanner::keyword(list) == Some("import")))
}

fn fresh_id(index: usize, taken: &mut HashSet<String>) -> String {
    let mut id = format!("{}{}", GENERATED_PREFIX, index);
    while !taken.insert(id.clone()) {
        id.push('_');
    }
    id
}

/// `(func ...)` with `id` placed right after the keyword.
fn with_id(func: &str, id: &str) -> Result<String, ScanError> {
    let start = scanner::skip_trivia(func, 1);
    let end = scanner::atom_end(func, start)?;
    Ok(format!("{} {}{}", &func[..end], id, &func[end..]))
}

fn name_function(module: &mut ModuleText, index: usize, id: &str) -> Result<(), ScanError> {
    let Some(decl) = module.decl(index) else { return Ok(()) };
    let text = decl.text();
    let named = match decl.kind() {
        DeclKind::Import => {
            let Some(import) = signature::parse_import(text)? else { return Ok(()) };
            let Some(at) = text.rfind(import.desc) else { return Ok(()) };
            let end = at + import.desc.len();
            format!("{}{}{}", &text[..at], with_id(import.desc, id)?, &text[end..])
        }
        _ => with_id(text, id)?,
    };
    module.replace(index, named);
    Ok(())
}

fn rewrite_references(module: &mut ModuleText, ids: &[String]) -> usize {
    let mut total = 0;
    for i in 0..module.len() {
        let Some(decl) = module.decl(i) else { continue };
        let (text, count) = match decl.kind() {
            DeclKind::Func | DeclKind::Global => rewrite(&INSTR_REF, decl.text(), ids),
            DeclKind::Elem => {
                let (text, exprs) = rewrite(&INSTR_REF, decl.text(), ids);
                let (text, listed) = rewrite_elem_lists(&text, ids);
                (text, exprs + listed)
            }
            DeclKind::Export => rewrite(&EXPORT_REF, decl.text(), ids),
            DeclKind::Start => rewrite(&START_REF, decl.text(), ids),
            _ => continue,
        };
        if count > 0 {
            total += count;
            module.replace(i, text);
        }
    }
    total
}

fn id_for<'a>(ids: &'a [String], number: &str) -> Option<&'a String> {
    number.parse::<usize>().ok().and_then(|n| ids.get(n))
}

/// Replaces group 2 (a function index) of every match with its identifier.
/// Out-of-range indices are left as they are.
fn rewrite(re: &Regex, text: &str, ids: &[String]) -> (String, usize) {
    let mut count = 0;
    let out = re
        .replace_all(text, |caps: &Captures| match id_for(ids, &caps[2]) {
            Some(id) => {
                count += 1;
                format!("{}{}", &caps[1], id)
            }
            None => caps[0].to_string(),
        })
        .into_owned();
    (out, count)
}

/// `func 2 $f 7` element lists.
fn rewrite_elem_lists(text: &str, ids: &[String]) -> (String, usize) {
    let mut count = 0;
    let out = ELEM_LIST
        .replace_all(text, |caps: &Captures| {
            let list = TOKEN.replace_all(&caps[2], |token: &Captures| {
                let token = &token[0];
                match id_for(ids, token) {
                    Some(id) => {
                        count += 1;
                        id.clone()
                    }
                    None => token.to_string(),
                }
            });
            format!("{}{}", &caps[1], list)
        })
        .into_owned();
    (out, count)
}

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

//! Declaration Locator & Signature Resolver.
//!
//! Finds import declarations by `(namespace, name)` and recovers the result
//! types of a function declaration, following `(type N)` / `(type $t)`
//! references into the type section when no inline `(result ...)` exists.

use crate::module::{DeclKind, ModuleText};
use crate::scanner::{self, Item, ScanError};
use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    static ref SEMVER_SUFFIX: Regex = Regex::new(r"^@\d+\.\d+\.\d+$").unwrap();
}

// ─── Value Types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
    V128,
    /// Reference types and anything else the engine does not model.
    Other(String),
}

impl ValType {
    pub fn from_token(token: &str) -> Self {
        match token {
            "i32" => ValType::I32,
            "i64" => ValType::I64,
            "f32" => ValType::F32,
            "f64" => ValType::F64,
            "v128" => ValType::V128,
            other => ValType::Other(other.to_string()),
        }
    }

    /// The canonical zero push for this type. Non-scalar types fall back to
    /// an integer zero.
    pub fn zero_instr(&self) -> &'static str {
        match self {
            ValType::I32 => "i32.const 0",
            ValType::I64 => "i64.const 0",
            ValType::F32 => "f32.const 0",
            ValType::F64 => "f64.const 0",
            ValType::V128 => "v128.const i64x2 0 0",
            ValType::Other(_) => "i32.const 0",
        }
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValType::I32 => write!(f, "i32"),
            ValType::I64 => write!(f, "i64"),
            ValType::F32 => write!(f, "f32"),
            ValType::F64 => write!(f, "f64"),
            ValType::V128 => write!(f, "v128"),
            ValType::Other(text) => write!(f, "{}", text),
        }
    }
}

// ─── Function Signatures ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Index(u32),
    Name(String),
}

/// Header of a `(func ...)` form: everything before the first local or
/// instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuncSig {
    pub id: Option<String>,
    pub type_ref: Option<TypeRef>,
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

impl FuncSig {
    /// Parses a `(func ...)` list. Returns `None` for any other form.
    pub fn parse(func: &str) -> Result<Option<Self>, ScanError> {
        if scanner::keyword(func) != Some("func") {
            return Ok(None);
        }
        let mut sig = FuncSig::default();
        for (i, item) in scanner::list_items(func)?.into_iter().enumerate().skip(1) {
            match item {
                Item::Atom(id) if i == 1 && id.starts_with('$') => sig.id = Some(id.to_string()),
                Item::List(list) => match scanner::keyword(list) {
                    Some("type") => sig.type_ref = parse_type_use(list)?,
                    Some("param") => sig.params.extend(clause_types(list)?),
                    Some("result") => sig.results.extend(clause_types(list)?),
                    Some("export") | Some("import") => {}
                    _ => break,
                },
                _ => break,
            }
        }
        Ok(Some(sig))
    }
}

fn parse_type_use(list: &str) -> Result<Option<TypeRef>, ScanError> {
    let items = scanner::list_items(list)?;
    let target = match items.get(1).and_then(Item::atom) {
        Some(target) => target,
        None => return Ok(None),
    };
    if target.starts_with('$') {
        return Ok(Some(TypeRef::Name(target.to_string())));
    }
    Ok(target.parse::<u32>().ok().map(TypeRef::Index))
}

/// Types listed by a `(param ...)` or `(result ...)` clause. A named param
/// (`(param $x i32)`) contributes only its type.
fn clause_types(list: &str) -> Result<Vec<ValType>, ScanError> {
    let items = scanner::list_items(list)?;
    let mut types = Vec::new();
    for item in items.iter().skip(1) {
        match item {
            Item::Atom(id) if id.starts_with('$') => {}
            Item::Atom(token) => types.push(ValType::from_token(token)),
            Item::List(inner) => types.push(ValType::Other(inner.to_string())),
            Item::Str(_) => {}
        }
    }
    Ok(types)
}

// ─── Imports ─────────────────────────────────────────────────────────────────

/// `(import "namespace" "name" desc)` split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl<'a> {
    pub namespace: String,
    pub name: String,
    /// The imported item's descriptor, e.g. `(func $f (type 3))`.
    pub desc: &'a str,
}

impl ImportDecl<'_> {
    pub fn is_func(&self) -> bool {
        scanner::keyword(self.desc) == Some("func")
    }
}

pub fn parse_import(text: &str) -> Result<Option<ImportDecl<'_>>, ScanError> {
    if scanner::keyword(text) != Some("import") {
        return Ok(None);
    }
    let items = scanner::list_items(text)?;
    match (items.get(1), items.get(2), items.get(3)) {
        (Some(ns @ Item::Str(_)), Some(name @ Item::Str(_)), Some(Item::List(desc))) => {
            Ok(Some(ImportDecl {
                namespace: ns.string().unwrap_or_default(),
                name: name.string().unwrap_or_default(),
                desc,
            }))
        }
        _ => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespacePattern {
    Exact(String),
    /// `namespace@MAJOR.MINOR.PATCH`
    Versioned(String),
    Prefix(String),
}

impl NamespacePattern {
    pub fn matches(&self, namespace: &str) -> bool {
        match self {
            NamespacePattern::Exact(ns) => namespace == ns,
            NamespacePattern::Versioned(ns) => namespace
                .strip_prefix(ns.as_str())
                .map(|rest| SEMVER_SUFFIX.is_match(rest))
                .unwrap_or(false),
            NamespacePattern::Prefix(p) => namespace.starts_with(p.as_str()),
        }
    }
}

impl fmt::Display for NamespacePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespacePattern::Exact(ns) => write!(f, "{}", ns),
            NamespacePattern::Versioned(ns) => write!(f, "{}@x.y.z", ns),
            NamespacePattern::Prefix(p) => write!(f, "{}*", p),
        }
    }
}

/// Index of the first import declaration matching `pattern` and `name`.
pub fn find_import(
    module: &ModuleText,
    pattern: &NamespacePattern,
    name: &str,
) -> Result<Option<usize>, ScanError> {
    for (i, decl) in module.decls().iter().enumerate() {
        if decl.kind() != &DeclKind::Import {
            continue;
        }
        if let Some(import) = parse_import(decl.text())? {
            if import.name == name && pattern.matches(&import.namespace) {
                return Ok(Some(i));
            }
        }
    }
    Ok(None)
}

// ─── Type Resolution ─────────────────────────────────────────────────────────

/// How a declaration's result types were found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Inline(Vec<ValType>),
    Indirect(TypeRef, Vec<ValType>),
    /// A type reference that names no type entry.
    Unresolved(TypeRef),
    /// No result information at all (a void function).
    None,
}

impl Resolution {
    pub fn results(&self) -> &[ValType] {
        match self {
            Resolution::Inline(types) | Resolution::Indirect(_, types) => types,
            Resolution::Unresolved(_) | Resolution::None => &[],
        }
    }
}

/// Resolves the result types of a `(func ...)` form. Inline results win; a
/// type reference is followed otherwise.
pub fn resolve(module: &ModuleText, func: &str) -> Result<Resolution, ScanError> {
    let sig = match FuncSig::parse(func)? {
        Some(sig) => sig,
        None => return Ok(Resolution::None),
    };
    if !sig.results.is_empty() {
        return Ok(Resolution::Inline(sig.results));
    }
    let type_ref = match sig.type_ref {
        Some(type_ref) => type_ref,
        None => return Ok(Resolution::None),
    };
    match find_type(module, &type_ref)? {
        Some(entry) => {
            let results = type_entry_sig(entry)?.map(|s| s.results).unwrap_or_default();
            Ok(Resolution::Indirect(type_ref, results))
        }
        None => Ok(Resolution::Unresolved(type_ref)),
    }
}

/// Ordered result types of `func`, empty when nothing is resolvable.
pub fn resolve_result_types(module: &ModuleText, func: &str) -> Result<Vec<ValType>, ScanError> {
    Ok(resolve(module, func)?.results().to_vec())
}

/// Params and results of a `(func ...)` form, taken from the type entry when
/// the form declares neither inline.
pub fn resolve_signature(module: &ModuleText, func: &str) -> Result<(Vec<ValType>, Vec<ValType>), ScanError> {
    let sig = match FuncSig::parse(func)? {
        Some(sig) => sig,
        None => return Ok((Vec::new(), Vec::new())),
    };
    if !sig.params.is_empty() || !sig.results.is_empty() {
        return Ok((sig.params, sig.results));
    }
    let entry = match &sig.type_ref {
        Some(type_ref) => find_type(module, type_ref)?,
        None => None,
    };
    match entry.map(type_entry_sig).transpose()?.flatten() {
        Some(found) => Ok((found.params, found.results)),
        None => Ok((Vec::new(), Vec::new())),
    }
}

/// Locates a type entry by index or identifier. Entries inside `(rec ...)`
/// groups are counted in order. An entry's `(;N;)` marker takes precedence
/// over its ordinal position.
pub fn find_type<'m>(module: &'m ModuleText, type_ref: &TypeRef) -> Result<Option<&'m str>, ScanError> {
    let mut ordinal = 0u32;
    for decl in module.decls() {
        let entries: Vec<&str> = match decl.kind() {
            DeclKind::Type => vec![decl.text()],
            DeclKind::Rec => scanner::list_items(decl.text())?
                .into_iter()
                .filter_map(|item| item.list())
                .filter(|list| scanner::keyword(list) == Some("type"))
                .collect(),
            _ => continue,
        };
        for entry in entries {
            let (id, marker) = type_header(entry)?;
            let found = match type_ref {
                TypeRef::Index(n) => marker.unwrap_or(ordinal) == *n,
                TypeRef::Name(name) => id == Some(name.as_str()),
            };
            if found {
                return Ok(Some(entry));
            }
            ordinal += 1;
        }
    }
    Ok(None)
}

/// Identifier and `(;N;)` marker of a `(type ...)` entry.
fn type_header(entry: &str) -> Result<(Option<&str>, Option<u32>), ScanError> {
    let mut pos = scanner::skip_ws(entry, "(type".len());
    let mut id = None;
    if entry[pos..].starts_with('$') {
        let end = scanner::atom_end(entry, pos)?;
        id = Some(&entry[pos..end]);
        pos = scanner::skip_ws(entry, end);
    }
    let marker = entry[pos..]
        .strip_prefix("(;")
        .and_then(|rest| rest.split_once(";)"))
        .and_then(|(digits, _)| digits.parse::<u32>().ok());
    Ok((id, marker))
}

/// Signature of the `(func ...)` inside a type entry, possibly wrapped in
/// `(sub ...)`.
fn type_entry_sig(entry: &str) -> Result<Option<FuncSig>, ScanError> {
    for item in scanner::list_items(entry)? {
        let Some(list) = item.list() else { continue };
        match scanner::keyword(list) {
            Some("func") => return FuncSig::parse(list),
            Some("sub") => return type_entry_sig(list),
            _ => {}
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODULE: &str = r#"(module
  (type (;0;) (func (param i32) (result f32)))
  (type $pair (;1;) (func (result i32 i64)))
  (rec
    (type (;2;) (func (param i64)))
    (type (;3;) (sub (func (result f64))))
  )
  (import "wasi:random/random@0.2.0" "get-random-bytes" (func $rnd (;0;) (type 2)))
  (import "env" "inline" (func $inline (;1;) (param i32) (result i32 i64)))
  (import "env" "indirect" (func $indirect (;2;) (type 0)))
  (import "env" "mem" (memory (;0;) 1))
)"#;

    fn module() -> ModuleText {
        ModuleText::parse(MODULE).unwrap()
    }

    #[test]
    fn test_namespace_patterns() {
        let versioned = NamespacePattern::Versioned("wasi:io/poll".into());
        assert!(versioned.matches("wasi:io/poll@0.2.0"));
        assert!(versioned.matches("wasi:io/poll@10.20.30"));
        assert!(!versioned.matches("wasi:io/poll"));
        assert!(!versioned.matches("wasi:io/poll@0.2"));
        assert!(!versioned.matches("wasi:io/pollx@0.2.0"));
        assert!(NamespacePattern::Exact("env".into()).matches("env"));
        assert!(!NamespacePattern::Exact("env".into()).matches("envx"));
        assert!(NamespacePattern::Prefix("wasi:".into()).matches("wasi:cli/exit@0.2.0"));
    }

    #[test]
    fn test_find_import() {
        let m = module();
        let idx = find_import(
            &m,
            &NamespacePattern::Versioned("wasi:random/random".into()),
            "get-random-bytes",
        )
        .unwrap()
        .unwrap();
        let span = m.span_of(idx).unwrap();
        assert!(MODULE[span.start..span.end].starts_with("(import \"wasi:random/random@0.2.0\""));
        assert!(MODULE[span.start..span.end].ends_with("(type 2)))"));
        assert_eq!(
            find_import(&m, &NamespacePattern::Exact("env".into()), "missing").unwrap(),
            None
        );
    }

    #[test]
    fn test_parse_import_and_signature() {
        let m = module();
        let idx = find_import(&m, &NamespacePattern::Exact("env".into()), "inline")
            .unwrap()
            .unwrap();
        let import = parse_import(m.decl(idx).unwrap().text()).unwrap().unwrap();
        assert!(import.is_func());
        let sig = FuncSig::parse(import.desc).unwrap().unwrap();
        assert_eq!(sig.id.as_deref(), Some("$inline"));
        assert_eq!(sig.params, vec![ValType::I32]);
        assert_eq!(sig.results, vec![ValType::I32, ValType::I64]);
    }

    #[test]
    fn test_inline_and_indirect_results_agree() {
        let m = module();
        let inline = "(func $a (result f32))";
        let indirect = "(func $b (type 0))";
        assert_eq!(resolve_result_types(&m, inline).unwrap(), vec![ValType::F32]);
        assert_eq!(resolve_result_types(&m, indirect).unwrap(), vec![ValType::F32]);
        assert_eq!(
            resolve(&m, indirect).unwrap(),
            Resolution::Indirect(TypeRef::Index(0), vec![ValType::F32])
        );
    }

    #[test]
    fn test_named_and_rec_types() {
        let m = module();
        assert_eq!(
            resolve_result_types(&m, "(func (type $pair))").unwrap(),
            vec![ValType::I32, ValType::I64]
        );
        assert_eq!(resolve_result_types(&m, "(func (type 2))").unwrap(), vec![]);
        assert_eq!(resolve_result_types(&m, "(func (type 3))").unwrap(), vec![ValType::F64]);
    }

    #[test]
    fn test_full_signature_follows_type_use() {
        let m = module();
        assert_eq!(
            resolve_signature(&m, "(func $r (type 2))").unwrap(),
            (vec![ValType::I64], vec![])
        );
        assert_eq!(
            resolve_signature(&m, "(func $i (type 0) (param i32) (result f32))").unwrap(),
            (vec![ValType::I32], vec![ValType::F32])
        );
    }

    #[test]
    fn test_unresolvable_reference_is_empty() {
        let m = module();
        assert_eq!(
            resolve(&m, "(func $x (type 42))").unwrap(),
            Resolution::Unresolved(TypeRef::Index(42))
        );
        assert!(resolve_result_types(&m, "(func $x (type 42))").unwrap().is_empty());
    }

    #[test]
    fn test_signature_stops_at_body() {
        let sig = FuncSig::parse("(func $f (param $x i32) (param i64) (local i32) (result i32) nop)")
            .unwrap()
            .unwrap();
        assert_eq!(sig.params, vec![ValType::I32, ValType::I64]);
        assert!(sig.results.is_empty());
    }

    #[test]
    fn test_reference_results_fall_back_to_i32_zero() {
        let sig = FuncSig::parse("(func (result externref (ref null $t)))")
            .unwrap()
            .unwrap();
        assert_eq!(sig.results.len(), 2);
        assert_eq!(sig.results[0], ValType::Other("externref".to_string()));
        assert_eq!(sig.results[1].zero_instr(), "i32.const 0");
    }
}

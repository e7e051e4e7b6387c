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

//! Identifier Normalizer: kebab-case import/export names to snake_case.

use crate::module::{DeclKind, ModuleText};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Serialize;

lazy_static! {
    static ref IMPORT_HEAD: Regex = Regex::new(r#"^\(\s*import\s*"([^"]*)"\s*"([^"]*)""#).unwrap();
    static ref EXPORT_NAME: Regex = Regex::new(r#"\(\s*export\s*"([^"]*)""#).unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

pub fn kebab_to_snake(name: &str) -> String {
    name.replace('-', "_")
}

/// Converts the namespace and name of every import whose namespace is
/// listed in `namespaces`.
pub fn convert_namespaces(module: &mut ModuleText, namespaces: &[String]) -> Vec<Rename> {
    let mut renames = Vec::new();
    for i in 0..module.len() {
        let Some(decl) = module.decl(i) else { continue };
        if decl.kind() != &DeclKind::Import {
            continue;
        }
        let text = decl.text();
        let Some(caps) = IMPORT_HEAD.captures(text) else { continue };
        let (namespace, name) = (&caps[1], &caps[2]);
        if !namespaces.iter().any(|ns| ns == namespace) {
            continue;
        }
        let (new_ns, new_name) = (kebab_to_snake(namespace), kebab_to_snake(name));
        if new_ns == namespace && new_name == name {
            continue;
        }
        let head_end = caps.get(0).map(|m| m.end()).unwrap_or(0);
        let rewritten = format!("(import \"{}\" \"{}\"{}", new_ns, new_name, &text[head_end..]);
        renames.push(Rename {
            from: format!("{}::{}", namespace, name),
            to: format!("{}::{}", new_ns, new_name),
        });
        module.replace(i, rewritten);
    }
    renames
}

/// Converts every export name, standalone or inline, regardless of
/// namespace.
pub fn convert_exports(module: &mut ModuleText) -> Vec<Rename> {
    let mut renames = Vec::new();
    for i in 0..module.len() {
        let Some(decl) = module.decl(i) else { continue };
        let text = decl.text();
        if !EXPORT_NAME.captures_iter(text).any(|c| c[1].contains('-')) {
            continue;
        }
        let rewritten = EXPORT_NAME
            .replace_all(text, |caps: &Captures| {
                let name = &caps[1];
                if name.contains('-') {
                    renames.push(Rename {
                        from: name.to_string(),
                        to: kebab_to_snake(name),
                    });
                    format!("(export \"{}\"", kebab_to_snake(name))
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();
        module.replace(i, rewritten);
    }
    renames
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT: &str = "(module\n  (import \"env\" \"get-time\" (func $t))\n  (import \"wasi:cli/exit@0.2.0\" \"exit\" (func $e (param i32)))\n  (import \"debug-ns\" \"log-it\" (func $l))\n  (func $run (export \"run-plugin\"))\n  (export \"plain\" (func $run))\n  (export \"call-me\" (func $run))\n)";

    #[test]
    fn test_namespace_conversion() {
        let mut module = ModuleText::parse(TEXT).unwrap();
        let renames = convert_namespaces(&mut module, &["env".to_string(), "debug-ns".to_string()]);
        assert_eq!(renames.len(), 2);
        let out = module.render();
        assert!(out.contains("(import \"env\" \"get_time\" (func $t))"));
        assert!(out.contains("(import \"debug_ns\" \"log_it\" (func $l))"));
        assert!(out.contains("\"wasi:cli/exit@0.2.0\" \"exit\""));
    }

    #[test]
    fn test_export_conversion() {
        let mut module = ModuleText::parse(TEXT).unwrap();
        let renames = convert_exports(&mut module);
        assert_eq!(
            renames,
            vec![
                Rename { from: "run-plugin".into(), to: "run_plugin".into() },
                Rename { from: "call-me".into(), to: "call_me".into() },
            ]
        );
        let out = module.render();
        assert!(out.contains("(func $run (export \"run_plugin\"))"));
        assert!(out.contains("(export \"plain\" (func $run))"));
        assert!(out.contains("(export \"call_me\" (func $run))"));
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let namespaces = vec!["env".to_string(), "debug-ns".to_string()];
        let mut module = ModuleText::parse(TEXT).unwrap();
        convert_namespaces(&mut module, &namespaces);
        convert_exports(&mut module);
        let once = module.render();

        let mut again = ModuleText::parse(&once).unwrap();
        assert!(convert_namespaces(&mut again, &namespaces).is_empty());
        assert!(convert_exports(&mut again).is_empty());
        assert_eq!(again.render(), once);
    }
}

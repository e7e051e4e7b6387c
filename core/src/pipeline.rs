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

//! The clip pipeline: window, pin function indices, normalize names, stub
//! imports, retarget allocator calls, fix placeholders. A pure function from text and
//! configuration to text and events.

use crate::allocator::{self, AllocatorRef, AllocatorSource};
use crate::catalog::{self, Policy};
use crate::codec::CodecError;
use crate::fixup;
use crate::legacy::{self, LegacyCall, ProvisionAction};
use crate::module::{DeclKind, ModuleText};
use crate::naming;
use crate::numbering;
use crate::program::Program;
use crate::scanner::ScanError;
use crate::signature::{self, NamespacePattern, TypeRef, ValType};
use crate::synth::{self, BridgeSpec, StubAction, SynthError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, info};

pub const ENV_NAMESPACE: &str = "env";
pub const WASI_PREFIX: &str = "wasi:";

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClipConfig {
    /// Replace `wasi:*` imports (catalog, then catch-all).
    pub stub_wasi: bool,
    /// Replace every `env` import with a default stub.
    pub stub_env: bool,
    /// Live preview-1 bridges instead of inert defaults.
    pub use_p1_bridge: bool,
    /// Leave `wasi:*` imports alone. Wins over `stub_wasi` and
    /// `use_p1_bridge`.
    pub keep_wasi_imports: bool,
    /// Import namespaces whose names are converted to snake_case.
    pub namespaces: Vec<String>,
    /// Bytes of the head to transform; 0 means the whole text.
    pub processing_window: usize,
}

impl Default for ClipConfig {
    fn default() -> Self {
        ClipConfig {
            stub_wasi: true,
            stub_env: true,
            use_p1_bridge: false,
            keep_wasi_imports: false,
            namespaces: vec!["env".to_string(), "debug".to_string()],
            processing_window: 0,
        }
    }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ClipError {
    #[error("malformed input near `{context}`: {source}")]
    MalformedInput {
        context: String,
        #[source]
        source: ScanError,
    },
    #[error("cannot stub {context}: {source}")]
    Stub {
        context: String,
        #[source]
        source: SynthError,
    },
    #[error("codec failure: {0}")]
    Codec(#[from] CodecError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn malformed(context: &'static str) -> impl FnOnce(ScanError) -> ClipError {
    move |source| ClipError::MalformedInput {
        context: context.to_string(),
        source,
    }
}

/// The first line of `text` from `offset`, for error context.
fn excerpt(text: &str, offset: usize) -> String {
    let line = text.get(offset..).unwrap_or_default().lines().next().unwrap_or_default();
    line.chars().take(60).collect()
}

// ─── Diagnostics ─────────────────────────────────────────────────────────────

/// Which pass chose an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StubSource {
    Catalog,
    WasiCatchAll,
    EnvCatchAll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClipEvent {
    Window { scanned: usize, tail: usize },
    /// Unnamed functions got identifiers and numeric references now use them.
    FunctionsPinned { named: usize, references: usize },
    ImportRenamed { from: String, to: String },
    ExportRenamed { from: String, to: String },
    /// `keep_wasi_imports` switched the bridge off.
    BridgingSuppressed,
    Stubbed {
        namespace: String,
        name: String,
        source: StubSource,
        policy: Policy,
        action: StubAction,
    },
    /// The requested policy did not fit the declared signature; a default
    /// stub was used.
    PolicyFallback {
        namespace: String,
        name: String,
        policy: Policy,
    },
    DeleteDegraded { namespace: String, name: String },
    UnresolvedType {
        namespace: String,
        name: String,
        type_ref: String,
    },
    NonFunctionImport { namespace: String, name: String },
    LegacyImport {
        call: LegacyCall,
        id: String,
        action: ProvisionAction,
    },
    ImportsHoisted { count: usize },
    Allocator {
        reference: AllocatorRef,
        source: AllocatorSource,
    },
    CallSitesRewritten { target: String, count: usize },
    PlaceholderFixed { function: String, replacement: String },
}

/// Ordered event collector; every event is also traced.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<ClipEvent>,
}

impl EventLog {
    pub fn record(&mut self, event: ClipEvent) {
        debug!(?event, "clip");
        self.events.push(event);
    }

    pub fn into_events(self) -> Vec<ClipEvent> {
        self.events
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClipReport {
    pub text: String,
    pub events: Vec<ClipEvent>,
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

pub fn clip(text: &str, config: &ClipConfig) -> Result<ClipReport, ClipError> {
    let mut log = EventLog::default();

    let (head, tail) = split_window(text, config.processing_window);
    let mut module = if tail.is_empty() {
        ModuleText::parse(head).map_err(|source| ClipError::MalformedInput {
            context: excerpt(head, source.offset()),
            source,
        })?
    } else {
        log.record(ClipEvent::Window {
            scanned: head.len(),
            tail: tail.len(),
        });
        ModuleText::parse_head(head)
    };
    info!(declarations = module.len(), "module parsed");

    let pinning = numbering::pin_functions(&mut module).map_err(malformed("function numbering"))?;
    if pinning.named > 0 || pinning.references > 0 {
        log.record(ClipEvent::FunctionsPinned {
            named: pinning.named,
            references: pinning.references,
        });
    }
    normalize_names(&mut module, config, &mut log);
    stub_imports(&mut module, config, &mut log)?;
    retarget_allocator(&mut module, &mut log)?;

    let fixed = fixup::fix_undefined_stubs(&mut module).map_err(malformed("undefined-stub fixup"))?;
    info!(count = fixed.len(), "placeholders fixed");
    for f in fixed {
        log.record(ClipEvent::PlaceholderFixed {
            function: f.function,
            replacement: f.replacement,
        });
    }

    let mut out = module.render();
    out.push_str(tail);
    Ok(ClipReport {
        text: out,
        events: log.into_events(),
    })
}

/// Splits at `window` bytes (moved back to a char boundary). A window of 0,
/// or one past the end, keeps everything in the head.
fn split_window(text: &str, window: usize) -> (&str, &str) {
    if window == 0 || window >= text.len() {
        return (text, "");
    }
    let mut cut = window;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.split_at(cut)
}

fn normalize_names(module: &mut ModuleText, config: &ClipConfig, log: &mut EventLog) {
    let imports = naming::convert_namespaces(module, &config.namespaces);
    let exports = naming::convert_exports(module);
    info!(imports = imports.len(), exports = exports.len(), "identifiers normalized");
    for r in imports {
        log.record(ClipEvent::ImportRenamed { from: r.from, to: r.to });
    }
    for r in exports {
        log.record(ClipEvent::ExportRenamed { from: r.from, to: r.to });
    }
}

fn retarget_allocator(module: &mut ModuleText, log: &mut EventLog) -> Result<(), ClipError> {
    let (reference, source) = allocator::resolve_allocator(module).map_err(malformed("allocator resolution"))?;
    let count = allocator::normalize_calls(module, &reference);
    info!(allocator = %reference, ?source, rewritten = count, "allocator resolved");
    if count > 0 {
        log.record(ClipEvent::CallSitesRewritten {
            target: reference.to_string(),
            count,
        });
    }
    log.record(ClipEvent::Allocator { reference, source });
    Ok(())
}

// ─── Stubbing ────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct Planned {
    index: usize,
    namespace: String,
    name: String,
    source: StubSource,
    policy: Policy,
}

impl Planned {
    fn context(&self) -> String {
        format!("{}::{}", self.namespace, self.name)
    }
}

enum Choice {
    Ready(BridgeSpec),
    Program(Program),
}

fn stub_imports(module: &mut ModuleText, config: &ClipConfig, log: &mut EventLog) -> Result<(), ClipError> {
    let wasi = config.stub_wasi && !config.keep_wasi_imports;
    if config.keep_wasi_imports && config.use_p1_bridge {
        log.record(ClipEvent::BridgingSuppressed);
    }
    let bridging = wasi && config.use_p1_bridge;

    let mut plan = plan_stubs(module, wasi, config.stub_env, bridging, log)?;
    if plan.is_empty() {
        return Ok(());
    }

    let mut choices = Vec::with_capacity(plan.len());
    for planned in &plan {
        choices.push(choose(module, planned, log)?);
    }

    let calls: BTreeSet<LegacyCall> = choices
        .iter()
        .filter_map(|c| match c {
            Choice::Program(program) => Some(program.legacy_calls()),
            Choice::Ready(_) => None,
        })
        .flatten()
        .collect();
    let mut ids = HashMap::new();
    if !calls.is_empty() {
        let before = plan.iter().map(|p| p.index).min();
        let provisioned =
            legacy::provision(module, &calls, before).map_err(malformed("legacy import provisioning"))?;
        let inserted = provisioned
            .iter()
            .filter(|p| p.action == ProvisionAction::Inserted)
            .count();
        if let Some(before) = before {
            for planned in plan.iter_mut().filter(|p| p.index >= before) {
                planned.index += inserted;
            }
        }
        ids = legacy::id_map(&provisioned);
        for p in provisioned {
            log.record(ClipEvent::LegacyImport {
                call: p.call,
                id: p.id,
                action: p.action,
            });
        }
    }

    let mut stubbed = 0;
    for (planned, choice) in plan.iter().zip(choices) {
        let spec = match choice {
            Choice::Ready(spec) => spec,
            Choice::Program(program) => BridgeSpec::Literal(program.render(&ids)),
        };
        let synthesis = synth::apply(module, planned.index, &spec).map_err(|source| ClipError::Stub {
            context: planned.context(),
            source,
        })?;
        if synthesis.degraded {
            log.record(ClipEvent::DeleteDegraded {
                namespace: planned.namespace.clone(),
                name: planned.name.clone(),
            });
        }
        if let Some(type_ref) = synthesis.unresolved {
            log.record(ClipEvent::UnresolvedType {
                namespace: planned.namespace.clone(),
                name: planned.name.clone(),
                type_ref: match type_ref {
                    TypeRef::Index(n) => n.to_string(),
                    TypeRef::Name(id) => id,
                },
            });
        }
        if synthesis.action != StubAction::Kept {
            stubbed += 1;
        }
        log.record(ClipEvent::Stubbed {
            namespace: planned.namespace.clone(),
            name: planned.name.clone(),
            source: planned.source,
            policy: planned.policy,
            action: synthesis.action,
        });
    }

    let hoisted = hoist_imports(module);
    if hoisted > 0 {
        log.record(ClipEvent::ImportsHoisted { count: hoisted });
    }
    info!(stubbed, legacy = calls.len(), hoisted, "imports stubbed");
    Ok(())
}

/// Catalog entries first (first match each), then the `wasi:` catch-all,
/// then the `env` catch-all.
fn plan_stubs(
    module: &ModuleText,
    wasi: bool,
    env: bool,
    bridging: bool,
    log: &mut EventLog,
) -> Result<Vec<Planned>, ClipError> {
    let mut plan = Vec::new();
    let mut taken = HashSet::new();

    if wasi {
        for entry in catalog::CATALOG {
            let found = signature::find_import(module, &entry.pattern(), entry.name)
                .map_err(malformed("stub catalog"))?;
            let Some(index) = found else { continue };
            if taken.insert(index) {
                plan_one(module, index, StubSource::Catalog, entry.policy(bridging), &mut plan, log)?;
            }
        }
        let pattern = NamespacePattern::Prefix(WASI_PREFIX.to_string());
        catch_all(module, &pattern, StubSource::WasiCatchAll, &mut taken, &mut plan, log)?;
    }
    if env {
        let pattern = NamespacePattern::Exact(ENV_NAMESPACE.to_string());
        catch_all(module, &pattern, StubSource::EnvCatchAll, &mut taken, &mut plan, log)?;
    }
    Ok(plan)
}

fn catch_all(
    module: &ModuleText,
    pattern: &NamespacePattern,
    source: StubSource,
    taken: &mut HashSet<usize>,
    plan: &mut Vec<Planned>,
    log: &mut EventLog,
) -> Result<(), ClipError> {
    for (index, decl) in module.decls().iter().enumerate() {
        if decl.kind() != &DeclKind::Import || taken.contains(&index) {
            continue;
        }
        let import = signature::parse_import(decl.text()).map_err(malformed("import catch-all"))?;
        if import.map(|i| pattern.matches(&i.namespace)).unwrap_or(false) {
            taken.insert(index);
            plan_one(module, index, source, Policy::Default, plan, log)?;
        }
    }
    Ok(())
}

fn plan_one(
    module: &ModuleText,
    index: usize,
    source: StubSource,
    policy: Policy,
    plan: &mut Vec<Planned>,
    log: &mut EventLog,
) -> Result<(), ClipError> {
    let text = module.decls()[index].text();
    let Some(import) = signature::parse_import(text).map_err(malformed("import declaration"))? else {
        return Ok(());
    };
    if !import.is_func() {
        log.record(ClipEvent::NonFunctionImport {
            namespace: import.namespace,
            name: import.name,
        });
        return Ok(());
    }
    plan.push(Planned {
        index,
        namespace: import.namespace,
        name: import.name,
        source,
        policy,
    });
    Ok(())
}

/// Turns a policy into a body. `Const` and `Bridge` fall back to a default
/// stub when the import's signature is not the one they were written for.
fn choose(module: &ModuleText, planned: &Planned, log: &mut EventLog) -> Result<Choice, ClipError> {
    let choice = match planned.policy {
        Policy::Delete => Choice::Ready(BridgeSpec::Delete),
        Policy::Default => Choice::Ready(BridgeSpec::Synthesize),
        Policy::Trap => Choice::Ready(BridgeSpec::Literal(vec!["unreachable".to_string()])),
        Policy::Const(value) => {
            let (_, results) = import_signature(module, planned.index)?;
            if results == [ValType::I32] {
                Choice::Ready(BridgeSpec::Literal(vec![format!("i32.const {}", value)]))
            } else {
                fallback(planned, log)
            }
        }
        Policy::Bridge(op) => {
            let (params, results) = import_signature(module, planned.index)?;
            if op.fits(&params, &results) {
                Choice::Program(op.program())
            } else {
                fallback(planned, log)
            }
        }
    };
    Ok(choice)
}

fn import_signature(module: &ModuleText, index: usize) -> Result<(Vec<ValType>, Vec<ValType>), ClipError> {
    let text = module.decls()[index].text();
    match signature::parse_import(text).map_err(malformed("import declaration"))? {
        Some(import) => signature::resolve_signature(module, import.desc).map_err(malformed("import signature")),
        None => Ok((Vec::new(), Vec::new())),
    }
}

fn fallback(planned: &Planned, log: &mut EventLog) -> Choice {
    log.record(ClipEvent::PolicyFallback {
        namespace: planned.namespace.clone(),
        name: planned.name.clone(),
        policy: planned.policy,
    });
    Choice::Ready(BridgeSpec::Synthesize)
}

/// Moves imports that now follow a definition back in front of it, keeping
/// their relative order. Returns how many moved.
fn hoist_imports(module: &mut ModuleText) -> usize {
    let defines = |kind: &DeclKind| {
        matches!(
            kind,
            DeclKind::Func | DeclKind::Table | DeclKind::Memory | DeclKind::Global | DeclKind::Tag
        )
    };
    let Some(first) = module.position(|d| defines(d.kind())) else {
        return 0;
    };
    let mut target = first;
    for index in first + 1..module.len() {
        if module.decls()[index].kind() == &DeclKind::Import {
            module.move_decl(index, target);
            target += 1;
        }
    }
    target - first
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(text: &str) {
        let bytes = wat::parse_str(text).unwrap_or_else(|e| panic!("{}\n---\n{}", e, text));
        wasmparser::Validator::new()
            .validate_all(&bytes)
            .unwrap_or_else(|e| panic!("{}\n---\n{}", e, text));
    }

    fn bridged() -> ClipConfig {
        ClipConfig {
            use_p1_bridge: true,
            ..ClipConfig::default()
        }
    }

    const RANDOM: &str = r#"(module
  (type (;0;) (func (param i64 i32)))
  (type (;1;) (func (param i32 i32 i32 i32) (result i32)))
  (type (;2;) (func (param i32) (result i32)))
  (import "wasi:random/random@0.2.0" "get-random-bytes" (func $get_random_bytes (;0;) (type 0)))
  (memory (;0;) 17)
  (func $cabi_realloc (;1;) (type 1) (param i32 i32 i32 i32) (result i32)
    i32.const 1024
  )
  (func $fill (;2;) (type 2) (param i32) (result i32)
    i64.const 16
    local.get 0
    call $get_random_bytes
    local.get 0
  )
  (export "memory" (memory 0))
  (export "cabi_realloc" (func $cabi_realloc))
)"#;

    #[test]
    fn test_random_without_bridge_only_allocates() {
        let report = clip(RANDOM, &ClipConfig::default()).unwrap();
        let out = &report.text;
        assert!(!out.contains("wasi:random/random"));
        assert!(!out.contains("wasi_snapshot_preview1"));
        assert!(out.contains("(func $get_random_bytes (;0;) (type 0)\n    (local i32 i32)"));
        assert!(out.contains("call $cabi_realloc"));
        validate(out);
    }

    #[test]
    fn test_random_with_bridge_delegates_to_random_get() {
        let report = clip(RANDOM, &bridged()).unwrap();
        let out = &report.text;
        assert!(!out.contains("wasi:random/random"));
        assert!(out.contains(
            "(import \"wasi_snapshot_preview1\" \"random_get\" (func $__wasi_snapshot_preview1_random_get (param i32 i32) (result i32)))"
        ));
        assert!(out.contains("call $__wasi_snapshot_preview1_random_get"));
        assert!(out.contains("i32.store offset=4"));
        assert!(report.events.contains(&ClipEvent::LegacyImport {
            call: LegacyCall::RandomGet,
            id: LegacyCall::RandomGet.canonical_id(),
            action: ProvisionAction::Inserted,
        }));
        validate(out);
    }

    /// One import per catalog entry, with the signature its bridge expects,
    /// plus an `env` import and a non-function `wasi:` import.
    fn catalog_module() -> String {
        let mut text = String::from("(module\n");
        for (i, entry) in catalog::CATALOG.iter().enumerate() {
            let sig = match entry.enabled {
                Policy::Bridge(op) => {
                    let mut sig = String::new();
                    if !op.params().is_empty() {
                        sig.push_str(&format!(" (param {})", op.params()));
                    }
                    if !op.results().is_empty() {
                        sig.push_str(&format!(" (result {})", op.results()));
                    }
                    sig
                }
                Policy::Const(_) => " (result i32)".to_string(),
                _ => " (param i32)".to_string(),
            };
            text.push_str(&format!(
                "  (import \"{}@0.2.0\" \"{}\" (func $imp{}{}))\n",
                entry.namespace, entry.name, i, sig
            ));
        }
        text.push_str("  (import \"env\" \"host-log\" (func $host_log (param i32)))\n");
        text.push_str("  (import \"wasi:cli/config@0.2.0\" \"level\" (global $level i32))\n");
        text.push_str("  (memory (;0;) 1)\n");
        text.push_str(
            "  (func $cabi_realloc (param i32 i32 i32 i32) (result i32)\n    i32.const 0\n  )\n",
        );
        text.push_str("  (export \"run-it\" (func $cabi_realloc))\n)");
        text
    }

    #[test]
    fn test_every_catalog_import_validates_in_both_modes() {
        let text = catalog_module();
        for config in [ClipConfig::default(), bridged()] {
            let report = clip(&text, &config).unwrap();
            let out = &report.text;
            assert!(!out.contains("\"wasi:io/"), "{}", out);
            assert!(!out.contains("\"env\""));
            assert!(out.contains("(import \"wasi:cli/config@0.2.0\" \"level\" (global $level i32))"));
            assert!(out.contains("(export \"run_it\""));
            assert!(report
                .events
                .iter()
                .all(|e| !matches!(e, ClipEvent::PolicyFallback { .. })));
            assert!(report.events.contains(&ClipEvent::ImportsHoisted { count: 1 }));
            validate(out);
        }
    }

    #[test]
    fn test_keep_wasi_imports_still_stubs_env() {
        let text = catalog_module();
        let config = ClipConfig {
            keep_wasi_imports: true,
            use_p1_bridge: true,
            ..ClipConfig::default()
        };
        let report = clip(&text, &config).unwrap();
        assert!(report.events.contains(&ClipEvent::BridgingSuppressed));
        assert!(report.text.contains("\"wasi:cli/exit@0.2.0\" \"exit\""));
        assert!(report.text.contains("(func $host_log (param i32))"));
        assert!(!report.text.contains("wasi_snapshot_preview1"));
        validate(&report.text);
    }

    #[test]
    fn test_window_leaves_tail_untouched() {
        let text = "(module\n  (import \"env\" \"a\" (func $a (result i32)))\n  (func $f (result i32)\n    call $a\n  )\n)";
        let cut = text.find("(func $f").unwrap() + 4;
        let config = ClipConfig {
            processing_window: cut,
            ..ClipConfig::default()
        };
        let report = clip(text, &config).unwrap();
        assert!(report.text.starts_with("(module\n  (func $a (result i32)\n    i32.const 0\n  )\n  (func"));
        assert!(report.text.ends_with(&text[cut..]));
        assert_eq!(
            report.events[0],
            ClipEvent::Window {
                scanned: cut,
                tail: text.len() - cut
            }
        );
    }

    #[test]
    fn test_placeholders_fixed_after_stubbing() {
        let text = "(module\n  (func $undefined_stub (result i32)\n    unreachable\n  )\n  (func $\"#func1 undefined_stub\"\n    unreachable\n  )\n)";
        let report = clip(text, &ClipConfig::default()).unwrap();
        insta::assert_snapshot!(report.text, @r###"
        (module
          (func $undefined_stub (result i32)
            i32.const 0
          )
          (func $"#func1 undefined_stub"
            nop
          )
        )
        "###);
        let fixed = report
            .events
            .iter()
            .filter(|e| matches!(e, ClipEvent::PlaceholderFixed { .. }))
            .count();
        assert_eq!(fixed, 2);
    }

    const UNNAMED_ALLOCATOR: &str = "(module\n  (import \"wasi:random/random@0.2.0\" \"get-random-bytes\" (func $rnd (param i64 i32)))\n  (memory 1)\n  (func (param i32 i32 i32 i32) (result i32)\n    i32.const 0\n  )\n  (export \"cabi_realloc\" (func 1))\n)";

    #[test]
    fn test_allocator_reached_through_index_export() {
        let report = clip(UNNAMED_ALLOCATOR, &ClipConfig::default()).unwrap();
        assert!(report.text.contains("(func $#func1 (param i32 i32 i32 i32) (result i32)"));
        assert!(report.text.contains("(export \"cabi_realloc\" (func $#func1))"));
        assert!(!report.text.contains("call $cabi_realloc"));
        assert!(report.text.contains("call $#func1\n"));
        assert!(report.events.contains(&ClipEvent::FunctionsPinned { named: 1, references: 1 }));
        assert!(report.events.contains(&ClipEvent::Allocator {
            reference: AllocatorRef::Named("$#func1".to_string()),
            source: AllocatorSource::NamedExport,
        }));
        validate(&report.text);
    }

    #[test]
    fn test_allocator_survives_inserted_legacy_imports() {
        let report = clip(UNNAMED_ALLOCATOR, &bridged()).unwrap();
        let out = &report.text;
        let legacy = out.find("\"wasi_snapshot_preview1\" \"random_get\"").unwrap();
        assert!(legacy < out.find("(func $rnd").unwrap());
        assert!(out.contains("(export \"cabi_realloc\" (func $#func1))"));
        assert!(out.contains("call $#func1\n"));
        assert!(report.events.contains(&ClipEvent::CallSitesRewritten {
            target: "$#func1".to_string(),
            count: 1,
        }));
        validate(out);
    }

    #[test]
    fn test_numeric_calls_keep_their_callee_across_hoisting() {
        let text = r#"(module
  (type (;0;) (func (param i32)))
  (import "wasi:cli/environment@0.2.0" "get-arguments" (func (;0;) (type 0)))
  (import "host" "log" (func (;1;) (type 0)))
  (func (;2;) (type 0) (param i32)
    local.get 0
    call 1
  )
  (export "main" (func 2))
)"#;
        let report = clip(text, &ClipConfig::default()).unwrap();
        let out = &report.text;
        let log = out.find("(import \"host\" \"log\" (func $#func1 (;1;) (type 0)))").unwrap();
        let stub = out.find("(func $#func0 (;0;) (type 0))").unwrap();
        assert!(log < stub);
        assert!(out.contains("    call $#func1\n"));
        assert!(!out.contains("call 1"));
        assert!(out.contains("(export \"main\" (func $#func2))"));
        assert!(report.events.contains(&ClipEvent::ImportsHoisted { count: 1 }));
        assert!(report.events.contains(&ClipEvent::FunctionsPinned { named: 3, references: 2 }));
        validate(out);
    }

    #[test]
    fn test_unbalanced_input_is_malformed() {
        let err = clip("(module\n  (func $a\n", &ClipConfig::default()).unwrap_err();
        assert!(matches!(err, ClipError::MalformedInput { .. }));
    }

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: ClipConfig = serde_json::from_str("{\"use_p1_bridge\": true}").unwrap();
        assert_eq!(config, bridged());
    }
}

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

//! The narrow `wasi_snapshot_preview1` interface that bridge programs call
//! into, and the pass that makes sure each needed call is imported.

use crate::module::{DeclKind, ModuleText};
use crate::scanner::ScanError;
use crate::signature::{self, FuncSig, NamespacePattern};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};

pub const NAMESPACE: &str = "wasi_snapshot_preview1";

pub const CLOCK_REALTIME: i32 = 0;
pub const CLOCK_MONOTONIC: i32 = 1;
pub const WHENCE_SET: i32 = 0;
pub const WHENCE_END: i32 = 2;
/// Every rights bit from `fd_datasync` through `sock_shutdown`.
pub const RIGHTS_ALL: i64 = 0x1FFF_FFFF;
/// Size of `filestat`: dev, ino, filetype, nlink, size, atim, mtim, ctim.
pub const FILESTAT_SIZE: i32 = 64;
pub const FILESTAT_DEV: u32 = 0;
pub const FILESTAT_INO: u32 = 8;
pub const FILESTAT_FILETYPE: u32 = 16;
pub const FILESTAT_NLINK: u32 = 24;
pub const FILESTAT_SIZE_FIELD: u32 = 32;
pub const FILESTAT_MTIM: u32 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegacyCall {
    RandomGet,
    ClockTimeGet,
    ProcExit,
    FdPrestatGet,
    FdPrestatDirName,
    FdRead,
    FdWrite,
    FdPread,
    FdPwrite,
    FdSeek,
    PathOpen,
    FdFilestatGet,
    PathFilestatGet,
}

impl LegacyCall {
    pub fn name(self) -> &'static str {
        match self {
            LegacyCall::RandomGet => "random_get",
            LegacyCall::ClockTimeGet => "clock_time_get",
            LegacyCall::ProcExit => "proc_exit",
            LegacyCall::FdPrestatGet => "fd_prestat_get",
            LegacyCall::FdPrestatDirName => "fd_prestat_dir_name",
            LegacyCall::FdRead => "fd_read",
            LegacyCall::FdWrite => "fd_write",
            LegacyCall::FdPread => "fd_pread",
            LegacyCall::FdPwrite => "fd_pwrite",
            LegacyCall::FdSeek => "fd_seek",
            LegacyCall::PathOpen => "path_open",
            LegacyCall::FdFilestatGet => "fd_filestat_get",
            LegacyCall::PathFilestatGet => "path_filestat_get",
        }
    }

    /// Core-wasm signature as written in a function type use.
    pub fn signature(self) -> &'static str {
        match self {
            LegacyCall::RandomGet => "(param i32 i32) (result i32)",
            LegacyCall::ClockTimeGet => "(param i32 i64 i32) (result i32)",
            LegacyCall::ProcExit => "(param i32)",
            LegacyCall::FdPrestatGet => "(param i32 i32) (result i32)",
            LegacyCall::FdPrestatDirName => "(param i32 i32 i32) (result i32)",
            LegacyCall::FdRead | LegacyCall::FdWrite => "(param i32 i32 i32 i32) (result i32)",
            LegacyCall::FdPread | LegacyCall::FdPwrite => {
                "(param i32 i32 i32 i64 i32) (result i32)"
            }
            LegacyCall::FdSeek => "(param i32 i64 i32 i32) (result i32)",
            LegacyCall::PathOpen => "(param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)",
            LegacyCall::FdFilestatGet => "(param i32 i32) (result i32)",
            LegacyCall::PathFilestatGet => "(param i32 i32 i32 i32 i32) (result i32)",
        }
    }

    pub fn canonical_id(self) -> String {
        format!("$__{}_{}", NAMESPACE, self.name())
    }

    pub fn import_decl(self) -> String {
        format!(
            "(import \"{}\" \"{}\" (func {} {}))",
            NAMESPACE,
            self.name(),
            self.canonical_id(),
            self.signature()
        )
    }
}

// ─── Provisioning ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionAction {
    /// An existing import already had an identifier.
    Reused,
    /// An existing import had no identifier; the canonical one was added.
    Named,
    Inserted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub call: LegacyCall,
    pub id: String,
    pub action: ProvisionAction,
}

/// Identifier to call for each provisioned legacy function.
pub fn id_map(provisioned: &[Provisioned]) -> HashMap<LegacyCall, String> {
    provisioned.iter().map(|p| (p.call, p.id.clone())).collect()
}

/// Ensures every call in `calls` is available as a function import.
///
/// Missing imports are inserted before declaration `before` (the first
/// import the stub pass is about to replace), so every import still
/// precedes the local functions that stubbing produces. Without that hint
/// they go after the last import, then before the first table, memory or
/// function.
pub fn provision(
    module: &mut ModuleText,
    calls: &BTreeSet<LegacyCall>,
    before: Option<usize>,
) -> Result<Vec<Provisioned>, ScanError> {
    let namespace = NamespacePattern::Exact(NAMESPACE.to_string());
    let mut done = Vec::with_capacity(calls.len());
    let mut insert_at = None;

    for &call in calls {
        if let Some(idx) = signature::find_import(module, &namespace, call.name())? {
            let text = module.decls()[idx].text().to_string();
            if let Some(import) = signature::parse_import(&text)?.filter(|i| i.is_func()) {
                if let Some(id) = FuncSig::parse(import.desc)?.and_then(|s| s.id) {
                    done.push(Provisioned { call, id, action: ProvisionAction::Reused });
                    continue;
                }
                let id = call.canonical_id();
                let named = format!("(func {}{}", id, &import.desc["(func".len()..]);
                let at = text.rfind(import.desc).unwrap_or(0);
                let rewritten = format!("{}{}{}", &text[..at], named, &text[at + import.desc.len()..]);
                module.replace(idx, rewritten);
                done.push(Provisioned { call, id, action: ProvisionAction::Named });
                continue;
            }
        }

        let at = match insert_at {
            Some(at) => at,
            None => insertion_point(module, before),
        };
        module.insert(at, "\n  ", call.import_decl());
        insert_at = Some(at + 1);
        done.push(Provisioned { call, id: call.canonical_id(), action: ProvisionAction::Inserted });
    }
    Ok(done)
}

fn insertion_point(module: &ModuleText, before: Option<usize>) -> usize {
    if let Some(before) = before.filter(|&b| b <= module.len()) {
        return before;
    }
    if let Some(last) = module.last_position(|d| d.kind() == &DeclKind::Import) {
        return last + 1;
    }
    module
        .position(|d| matches!(d.kind(), DeclKind::Table | DeclKind::Memory | DeclKind::Func))
        .unwrap_or(module.len())
}

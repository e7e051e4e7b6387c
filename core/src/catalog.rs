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

//! The stub catalog: `(namespace, operation)` to policy, with and without
//! the preview-1 bridge.

use crate::bridges::BridgeOp;
use crate::signature::NamespacePattern;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "policy", content = "value", rename_all = "snake_case")]
pub enum Policy {
    /// Turn the import into an empty local function.
    Delete,
    /// One zero value per declared result.
    Default,
    /// `unreachable`.
    Trap,
    /// `i32.const N`
    Const(i32),
    Bridge(BridgeOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    /// Unversioned namespace, matched as `namespace@x.y.z`.
    pub namespace: &'static str,
    pub name: &'static str,
    pub disabled: Policy,
    pub enabled: Policy,
}

impl Entry {
    pub fn policy(&self, bridging: bool) -> Policy {
        if bridging {
            self.enabled
        } else {
            self.disabled
        }
    }

    pub fn pattern(&self) -> NamespacePattern {
        NamespacePattern::Versioned(self.namespace.to_string())
    }
}

const fn entry(namespace: &'static str, name: &'static str, disabled: Policy, enabled: Policy) -> Entry {
    Entry {
        namespace,
        name,
        disabled,
        enabled,
    }
}

const fn same(namespace: &'static str, name: &'static str, policy: Policy) -> Entry {
    entry(namespace, name, policy, policy)
}

const fn bridged(namespace: &'static str, name: &'static str, op: BridgeOp) -> Entry {
    entry(namespace, name, Policy::Default, Policy::Bridge(op))
}

const IO_ERROR: &str = "wasi:io/error";
const IO_POLL: &str = "wasi:io/poll";
const IO_STREAMS: &str = "wasi:io/streams";
const FS_TYPES: &str = "wasi:filesystem/types";

/// Applied in order; each entry replaces at most the first matching import.
pub static CATALOG: &[Entry] = &[
    entry(IO_ERROR, "[resource-drop]error", Policy::Trap, Policy::Bridge(BridgeOp::ErrorDrop)),
    same(IO_POLL, "[resource-drop]pollable", Policy::Delete),
    same(IO_STREAMS, "[resource-drop]input-stream", Policy::Delete),
    same(IO_STREAMS, "[resource-drop]output-stream", Policy::Delete),
    same("wasi:cli/terminal-input", "[resource-drop]terminal-input", Policy::Delete),
    same("wasi:cli/terminal-output", "[resource-drop]terminal-output", Policy::Delete),
    same(FS_TYPES, "[resource-drop]descriptor", Policy::Delete),
    entry(
        FS_TYPES,
        "[resource-drop]directory-entry-stream",
        Policy::Delete,
        Policy::Bridge(BridgeOp::DirectoryEntryStreamDrop),
    ),
    same("wasi:cli/environment", "get-environment", Policy::Default),
    entry("wasi:cli/exit", "exit", Policy::Trap, Policy::Bridge(BridgeOp::Exit)),
    same(IO_POLL, "[method]pollable.block", Policy::Default),
    same(IO_POLL, "poll", Policy::Default),
    same(IO_STREAMS, "[method]input-stream.subscribe", Policy::Trap),
    bridged(IO_STREAMS, "[method]input-stream.blocking-read", BridgeOp::BlockingRead),
    bridged(IO_STREAMS, "[method]output-stream.check-write", BridgeOp::CheckWrite),
    bridged(IO_STREAMS, "[method]output-stream.write", BridgeOp::StreamWrite),
    bridged(IO_STREAMS, "[method]output-stream.blocking-flush", BridgeOp::BlockingFlush),
    same(IO_STREAMS, "[method]output-stream.blocking-write-and-flush", Policy::Default),
    entry(IO_STREAMS, "[method]output-stream.subscribe", Policy::Trap, Policy::Const(0)),
    entry("wasi:cli/stdin", "get-stdin", Policy::Trap, Policy::Const(0)),
    entry("wasi:cli/stdout", "get-stdout", Policy::Trap, Policy::Const(1)),
    entry("wasi:cli/stderr", "get-stderr", Policy::Trap, Policy::Const(2)),
    same("wasi:cli/terminal-stdin", "get-terminal-stdin", Policy::Default),
    same("wasi:cli/terminal-stdout", "get-terminal-stdout", Policy::Default),
    same("wasi:cli/terminal-stderr", "get-terminal-stderr", Policy::Default),
    bridged("wasi:clocks/monotonic-clock", "now", BridgeOp::MonotonicNow),
    entry("wasi:clocks/monotonic-clock", "subscribe-instant", Policy::Trap, Policy::Const(0)),
    entry("wasi:clocks/monotonic-clock", "subscribe-duration", Policy::Trap, Policy::Const(0)),
    bridged("wasi:clocks/wall-clock", "now", BridgeOp::WallNow),
    bridged(FS_TYPES, "[method]descriptor.read-via-stream", BridgeOp::ReadViaStream),
    bridged(FS_TYPES, "[method]descriptor.write-via-stream", BridgeOp::WriteViaStream),
    bridged(FS_TYPES, "[method]descriptor.append-via-stream", BridgeOp::AppendViaStream),
    bridged(FS_TYPES, "[method]descriptor.read", BridgeOp::Read),
    bridged(FS_TYPES, "[method]descriptor.write", BridgeOp::Write),
    bridged(FS_TYPES, "[method]descriptor.get-flags", BridgeOp::GetFlags),
    bridged(FS_TYPES, "[method]descriptor.read-directory", BridgeOp::ReadDirectory),
    bridged(FS_TYPES, "[method]descriptor.get-type", BridgeOp::GetType),
    bridged(FS_TYPES, "[method]descriptor.stat", BridgeOp::Stat),
    bridged(FS_TYPES, "[method]descriptor.stat-at", BridgeOp::StatAt),
    bridged(FS_TYPES, "[method]descriptor.open-at", BridgeOp::OpenAt),
    bridged(FS_TYPES, "[method]descriptor.metadata-hash", BridgeOp::MetadataHash),
    bridged(FS_TYPES, "[method]descriptor.metadata-hash-at", BridgeOp::MetadataHashAt),
    bridged(
        FS_TYPES,
        "[method]directory-entry-stream.read-directory-entry",
        BridgeOp::ReadDirectoryEntry,
    ),
    bridged(FS_TYPES, "filesystem-error-code", BridgeOp::FilesystemErrorCode),
    bridged("wasi:filesystem/preopens", "get-directories", BridgeOp::GetDirectories),
    entry(
        "wasi:random/random",
        "get-random-bytes",
        Policy::Bridge(BridgeOp::RandomAllocOnly),
        Policy::Bridge(BridgeOp::RandomBytes),
    ),
];

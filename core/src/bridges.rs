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

//! Bridge Program Library.
//!
//! One program per bridgeable WASI 0.2 operation, written against
//! `wasi_snapshot_preview1` and the module's own `cabi_realloc`. Parameter
//! indices follow the canonical ABI lowering of each operation: scalars
//! first, then the out-pointer (`ret`) for compound results.
//!
//! Result layouts written through `ret` (byte offsets):
//!
//! | shape                                   | tag | payload |
//! |-----------------------------------------|-----|---------|
//! | `result<handle, error-code>`            | 0   | 4       |
//! | `result<u8-enum/flags, error-code>`     | 0   | 1       |
//! | `result<u64 or 8-aligned record, _>`    | 0   | 8       |
//! | `result<_, stream-error>`               | 0   | 4 (variant tag), 8 (error handle) |

use crate::legacy::{self, LegacyCall};
use crate::program::{Callee, Op, Operand, Program};
use crate::signature::ValType;
use serde::Serialize;

/// `error-code.unsupported` of `wasi:filesystem/types`.
pub const ERROR_CODE_UNSUPPORTED: i32 = 27;
/// `file-integrity-sync | data-integrity-sync | requested-write-sync`.
pub const SYNC_FLAGS: i32 = 0x1c;
pub const CHECK_WRITE_PERMIT: i64 = 4096;
pub const PREOPEN_FIRST_FD: i32 = 3;
pub const PREOPEN_LAST_FD: i32 = 64;
const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Legacy `filetype` to wide `descriptor-type`. Identity pairs are omitted.
pub const FILETYPE_MAP: [(i32, i32); 4] = [(4, 6), (5, 7), (6, 7), (7, 5)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BridgeOp {
    /// Allocates `len` bytes without filling them.
    RandomAllocOnly,
    RandomBytes,
    MonotonicNow,
    WallNow,
    GetDirectories,
    OpenAt,
    ReadViaStream,
    WriteViaStream,
    AppendViaStream,
    Read,
    Write,
    GetType,
    Stat,
    StatAt,
    MetadataHash,
    MetadataHashAt,
    GetFlags,
    ReadDirectory,
    ReadDirectoryEntry,
    DirectoryEntryStreamDrop,
    CheckWrite,
    StreamWrite,
    BlockingFlush,
    BlockingRead,
    FilesystemErrorCode,
    Exit,
    ErrorDrop,
}

impl BridgeOp {
    pub const ALL: [BridgeOp; 27] = [
        BridgeOp::RandomAllocOnly,
        BridgeOp::RandomBytes,
        BridgeOp::MonotonicNow,
        BridgeOp::WallNow,
        BridgeOp::GetDirectories,
        BridgeOp::OpenAt,
        BridgeOp::ReadViaStream,
        BridgeOp::WriteViaStream,
        BridgeOp::AppendViaStream,
        BridgeOp::Read,
        BridgeOp::Write,
        BridgeOp::GetType,
        BridgeOp::Stat,
        BridgeOp::StatAt,
        BridgeOp::MetadataHash,
        BridgeOp::MetadataHashAt,
        BridgeOp::GetFlags,
        BridgeOp::ReadDirectory,
        BridgeOp::ReadDirectoryEntry,
        BridgeOp::DirectoryEntryStreamDrop,
        BridgeOp::CheckWrite,
        BridgeOp::StreamWrite,
        BridgeOp::BlockingFlush,
        BridgeOp::BlockingRead,
        BridgeOp::FilesystemErrorCode,
        BridgeOp::Exit,
        BridgeOp::ErrorDrop,
    ];

    /// Flattened core parameter types the program is written for.
    pub fn params(self) -> &'static str {
        match self {
            BridgeOp::RandomAllocOnly | BridgeOp::RandomBytes => "i64 i32",
            BridgeOp::MonotonicNow => "",
            BridgeOp::WallNow
            | BridgeOp::GetDirectories
            | BridgeOp::DirectoryEntryStreamDrop
            | BridgeOp::Exit
            | BridgeOp::ErrorDrop => "i32",
            BridgeOp::OpenAt => "i32 i32 i32 i32 i32 i32 i32",
            BridgeOp::ReadViaStream | BridgeOp::WriteViaStream => "i32 i64 i32",
            BridgeOp::Read => "i32 i64 i64 i32",
            BridgeOp::Write => "i32 i32 i32 i64 i32",
            BridgeOp::StatAt | BridgeOp::MetadataHashAt => "i32 i32 i32 i32 i32",
            BridgeOp::StreamWrite => "i32 i32 i32 i32",
            BridgeOp::BlockingRead => "i32 i64 i32",
            BridgeOp::AppendViaStream
            | BridgeOp::GetType
            | BridgeOp::Stat
            | BridgeOp::MetadataHash
            | BridgeOp::GetFlags
            | BridgeOp::ReadDirectory
            | BridgeOp::ReadDirectoryEntry
            | BridgeOp::CheckWrite
            | BridgeOp::BlockingFlush
            | BridgeOp::FilesystemErrorCode => "i32 i32",
        }
    }

    pub fn results(self) -> &'static str {
        match self {
            BridgeOp::MonotonicNow => "i64",
            _ => "",
        }
    }

    /// Whether a declared signature is the one this program expects.
    pub fn fits(self, params: &[ValType], results: &[ValType]) -> bool {
        fn joined(types: &[ValType]) -> String {
            types.iter().map(ToString::to_string).collect::<Vec<_>>().join(" ")
        }
        joined(params) == self.params() && joined(results) == self.results()
    }

    pub fn program(self) -> Program {
        match self {
            BridgeOp::RandomAllocOnly => random_bytes(false),
            BridgeOp::RandomBytes => random_bytes(true),
            BridgeOp::MonotonicNow => monotonic_now(),
            BridgeOp::WallNow => wall_now(),
            BridgeOp::GetDirectories => get_directories(),
            BridgeOp::OpenAt => open_at(),
            BridgeOp::ReadViaStream => seek_stream(3, 1, legacy::WHENCE_SET),
            BridgeOp::WriteViaStream => seek_stream(3, 1, legacy::WHENCE_SET),
            BridgeOp::AppendViaStream => seek_stream(2, 0, legacy::WHENCE_END),
            BridgeOp::Read => read(),
            BridgeOp::Write => write(),
            BridgeOp::GetType => get_type(),
            BridgeOp::Stat => stat(false),
            BridgeOp::StatAt => stat(true),
            BridgeOp::MetadataHash => metadata_hash(false),
            BridgeOp::MetadataHashAt => metadata_hash(true),
            BridgeOp::GetFlags => {
                let mut p = Program::new(2);
                tag(&mut p, 1, 0, 0);
                tag(&mut p, 1, 1, 0);
                p
            }
            BridgeOp::ReadDirectory => {
                let mut p = Program::new(2);
                tag(&mut p, 1, 0, 0);
                p.store(1, 4, Op::I32Store, |p| {
                    p.emit(Op::LocalGet(0));
                });
                p
            }
            BridgeOp::ReadDirectoryEntry => {
                let mut p = Program::new(2);
                tag(&mut p, 1, 0, 0);
                tag(&mut p, 1, 4, 0);
                p
            }
            BridgeOp::DirectoryEntryStreamDrop | BridgeOp::ErrorDrop => {
                let mut p = Program::new(1);
                p.emit(Op::Nop);
                p
            }
            BridgeOp::CheckWrite => {
                let mut p = Program::new(2);
                tag(&mut p, 1, 0, 0);
                p.store(1, 8, Op::I64Store, |p| {
                    p.emit(Op::I64Const(CHECK_WRITE_PERMIT));
                });
                p
            }
            BridgeOp::StreamWrite => stream_write(),
            BridgeOp::BlockingFlush => {
                let mut p = Program::new(2);
                tag(&mut p, 1, 0, 0);
                p
            }
            BridgeOp::BlockingRead => blocking_read(),
            BridgeOp::FilesystemErrorCode => {
                let mut p = Program::new(2);
                tag(&mut p, 1, 0, 1);
                p.store(1, 1, Op::I32Store8, |p| {
                    p.emit(Op::LocalGet(0));
                });
                p
            }
            BridgeOp::Exit => {
                let mut p = Program::new(1);
                p.emit(Op::LocalGet(0))
                    .call(LegacyCall::ProcExit)
                    .emit(Op::Unreachable);
                p
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// `i32.store8` of a constant at `ret + offset`.
fn tag(p: &mut Program, ret: u32, offset: u32, value: i32) {
    p.store(ret, offset, Op::I32Store8, |p| {
        p.emit(Op::I32Const(value));
    });
}

/// `i32.store` of a local at `ret + offset`.
fn put(p: &mut Program, ret: u32, offset: u32, local: u32) {
    p.store(ret, offset, Op::I32Store, |p| {
        p.emit(Op::LocalGet(local));
    });
}

/// `i32.store8` of a local (an error code) at `ret + offset`.
fn put8(p: &mut Program, ret: u32, offset: u32, local: u32) {
    p.store(ret, offset, Op::I32Store8, |p| {
        p.emit(Op::LocalGet(local));
    });
}

/// Stores a legacy call's return value into a fresh local.
fn errno(p: &mut Program) -> u32 {
    let err = p.local(ValType::I32);
    p.emit(Op::LocalSet(err));
    err
}

/// `if (err == 0) { ok } else { fail }`
fn on_success<O, F>(p: &mut Program, err: u32, ok: O, fail: F)
where
    O: FnOnce(&mut Program),
    F: FnOnce(&mut Program),
{
    p.emit_all([Op::LocalGet(err), Op::I32Eqz, Op::If]);
    ok(p);
    p.emit(Op::Else);
    fail(p);
    p.emit(Op::End);
}

/// One-entry iovec `{buf, len}` in scratch memory.
fn iovec(p: &mut Program, buf: u32, len: u32) -> u32 {
    let iov = p.alloc_local(4, Operand::Const(8));
    put(p, iov, 0, buf);
    put(p, iov, 4, len);
    iov
}

/// Wraps an `i64` length parameter into a fresh `i32` local.
fn wrap_len(p: &mut Program, param: u32) -> u32 {
    let len = p.local(ValType::I32);
    p.emit_all([Op::LocalGet(param), Op::I32WrapI64, Op::LocalSet(len)]);
    len
}

/// Reads the legacy `filetype` byte of a `filestat` and translates it.
fn descriptor_type(p: &mut Program, filestat: u32) -> u32 {
    let raw = p.local(ValType::I32);
    let out = p.local(ValType::I32);
    p.emit_all([
        Op::LocalGet(filestat),
        Op::I32Load8U(legacy::FILESTAT_FILETYPE),
        Op::LocalSet(raw),
        Op::LocalGet(raw),
        Op::LocalSet(out),
    ]);
    for (from, to) in FILETYPE_MAP {
        p.emit_all([
            Op::LocalGet(raw),
            Op::I32Const(from),
            Op::I32Eq,
            Op::If,
            Op::I32Const(to),
            Op::LocalSet(out),
            Op::End,
        ]);
    }
    out
}

/// Splits a nanosecond count into `{seconds: u64, nanoseconds: u32}` at
/// `ret + offset`.
fn datetime(p: &mut Program, ret: u32, offset: u32, nanos: u32) {
    p.store(ret, offset, Op::I64Store, |p| {
        p.emit_all([Op::LocalGet(nanos), Op::I64Const(NANOS_PER_SEC), Op::I64DivU]);
    });
    p.store(ret, offset + 8, Op::I32Store, |p| {
        p.emit_all([
            Op::LocalGet(nanos),
            Op::I64Const(NANOS_PER_SEC),
            Op::I64RemU,
            Op::I32WrapI64,
        ]);
    });
}

/// Reads a legacy clock into a fresh `i64` local.
fn clock(p: &mut Program, id: i32) -> u32 {
    let cell = p.alloc_local(8, Operand::Const(8));
    p.emit_all([Op::I32Const(id), Op::I64Const(0), Op::LocalGet(cell)])
        .call(LegacyCall::ClockTimeGet)
        .emit(Op::Drop);
    let nanos = p.local(ValType::I64);
    p.emit_all([Op::LocalGet(cell), Op::I64Load(0), Op::LocalSet(nanos)]);
    p.free(cell, Operand::Const(8), 8);
    nanos
}

// ─── Random & Clocks ─────────────────────────────────────────────────────────

/// `get-random-bytes(len: u64) -> list<u8>`: `(param i64 i32)`.
fn random_bytes(fill: bool) -> Program {
    let mut p = Program::new(2);
    let len = wrap_len(&mut p, 0);
    let buf = p.alloc_local(1, Operand::Local(len));
    if fill {
        p.emit_all([Op::LocalGet(buf), Op::LocalGet(len)])
            .call(LegacyCall::RandomGet)
            .emit(Op::Drop);
    }
    put(&mut p, 1, 0, buf);
    put(&mut p, 1, 4, len);
    p
}

/// `monotonic-clock.now() -> instant`: `(result i64)`.
fn monotonic_now() -> Program {
    let mut p = Program::new(0);
    let nanos = clock(&mut p, legacy::CLOCK_MONOTONIC);
    p.emit(Op::LocalGet(nanos));
    p
}

/// `wall-clock.now() -> datetime`: `(param i32)`.
fn wall_now() -> Program {
    let mut p = Program::new(1);
    let nanos = clock(&mut p, legacy::CLOCK_REALTIME);
    datetime(&mut p, 0, 0, nanos);
    p
}

// ─── Filesystem ──────────────────────────────────────────────────────────────

/// `get-directories() -> list<tuple<descriptor, string>>`: `(param i32)`.
fn get_directories() -> Program {
    const ENTRY: i32 = 12;
    let mut p = Program::new(1);
    let list = p.local(ValType::I32);
    let count = p.local(ValType::I32);
    let fd = p.local(ValType::I32);
    let prestat = p.alloc_local(4, Operand::Const(8));
    let name_len = p.local(ValType::I32);
    let entry = p.local(ValType::I32);

    p.emit_all([
        Op::I32Const(PREOPEN_FIRST_FD),
        Op::LocalSet(fd),
        Op::Block,
        Op::Loop,
        Op::LocalGet(fd),
        Op::I32Const(PREOPEN_LAST_FD),
        Op::I32GtU,
        Op::BrIf(1),
        Op::LocalGet(fd),
        Op::LocalGet(prestat),
    ])
    .call(LegacyCall::FdPrestatGet)
    .emit_all([
        Op::I32Eqz,
        Op::If,
        // tag 0 is `dir`
        Op::LocalGet(prestat),
        Op::I32Load8U(0),
        Op::I32Eqz,
        Op::If,
        Op::LocalGet(prestat),
        Op::I32Load(4),
        Op::LocalSet(name_len),
        // nameless preopens are skipped
        Op::LocalGet(name_len),
        Op::If,
    ]);
    let name = p.alloc_local(1, Operand::Local(name_len));
    p.emit_all([Op::LocalGet(fd), Op::LocalGet(name), Op::LocalGet(name_len)])
        .call(LegacyCall::FdPrestatDirName)
        .emit_all([Op::I32Eqz, Op::If])
        // grow the list by one entry
        .emit_all([
            Op::LocalGet(list),
            Op::LocalGet(count),
            Op::I32Const(ENTRY),
            Op::I32Mul,
            Op::I32Const(4),
            Op::LocalGet(count),
            Op::I32Const(1),
            Op::I32Add,
            Op::I32Const(ENTRY),
            Op::I32Mul,
        ])
        .emit(Op::Call(Callee::Allocator))
        .emit_all([
            Op::LocalSet(list),
            Op::LocalGet(list),
            Op::LocalGet(count),
            Op::I32Const(ENTRY),
            Op::I32Mul,
            Op::I32Add,
            Op::LocalSet(entry),
        ]);
    put(&mut p, entry, 0, fd);
    put(&mut p, entry, 4, name);
    put(&mut p, entry, 8, name_len);
    p.emit_all([
        Op::LocalGet(count),
        Op::I32Const(1),
        Op::I32Add,
        Op::LocalSet(count),
        Op::Else,
    ]);
    p.free(name, Operand::Local(name_len), 1);
    p.emit_all([
        Op::End,
        Op::End,
        Op::End,
        Op::End,
        Op::LocalGet(fd),
        Op::I32Const(1),
        Op::I32Add,
        Op::LocalSet(fd),
        Op::Br(0),
        Op::End,
        Op::End,
    ]);
    put(&mut p, 0, 0, list);
    put(&mut p, 0, 4, count);
    p.free(prestat, Operand::Const(8), 4);
    p
}

/// `descriptor.open-at(path-flags, path, open-flags, descriptor-flags)`:
/// `(param self path-flags path-ptr path-len open-flags flags ret)`.
fn open_at() -> Program {
    const RET: u32 = 6;
    let mut p = Program::new(7);
    p.emit_all([
        Op::LocalGet(5),
        Op::I32Const(SYNC_FLAGS),
        Op::I32And,
        Op::If,
    ]);
    tag(&mut p, RET, 0, 1);
    tag(&mut p, RET, 4, ERROR_CODE_UNSUPPORTED);
    p.emit_all([Op::Return, Op::End]);

    let fd_out = p.alloc_local(4, Operand::Const(4));
    // open flags and path flags share the legacy bit layout
    p.emit_all([
        Op::LocalGet(0),
        Op::LocalGet(1),
        Op::LocalGet(2),
        Op::LocalGet(3),
        Op::LocalGet(4),
        Op::I64Const(legacy::RIGHTS_ALL),
        Op::I64Const(legacy::RIGHTS_ALL),
        Op::I32Const(0),
        Op::LocalGet(fd_out),
    ])
    .call(LegacyCall::PathOpen);
    let err = errno(&mut p);
    on_success(
        &mut p,
        err,
        |p| {
            tag(p, RET, 0, 0);
            p.store(RET, 4, Op::I32Store, |p| {
                p.emit_all([Op::LocalGet(fd_out), Op::I32Load(0)]);
            });
        },
        |p| {
            tag(p, RET, 0, 1);
            put8(p, RET, 4, err);
        },
    );
    p.free(fd_out, Operand::Const(4), 4);
    p
}

/// `read-via-stream`, `write-via-stream` and `append-via-stream`: seek,
/// then hand the descriptor back as its own stream.
fn seek_stream(params: u32, offset_param: u32, whence: i32) -> Program {
    let ret = params - 1;
    let mut p = Program::new(params);
    let cell = p.alloc_local(8, Operand::Const(8));
    p.emit(Op::LocalGet(0));
    if whence == legacy::WHENCE_END {
        p.emit(Op::I64Const(0));
    } else {
        p.emit(Op::LocalGet(offset_param));
    }
    p.emit_all([Op::I32Const(whence), Op::LocalGet(cell)])
        .call(LegacyCall::FdSeek);
    let err = errno(&mut p);
    on_success(
        &mut p,
        err,
        |p| {
            tag(p, ret, 0, 0);
            put(p, ret, 4, 0);
        },
        |p| {
            tag(p, ret, 0, 1);
            put8(p, ret, 4, err);
        },
    );
    p.free(cell, Operand::Const(8), 8);
    p
}

/// `descriptor.read(len: u64, offset: u64)`: `(param self i64 i64 ret)`.
fn read() -> Program {
    const RET: u32 = 3;
    let mut p = Program::new(4);
    let len = wrap_len(&mut p, 1);
    let buf = p.alloc_local(1, Operand::Local(len));
    let iov = iovec(&mut p, buf, len);
    let nread = p.alloc_local(4, Operand::Const(4));
    p.emit_all([
        Op::LocalGet(0),
        Op::LocalGet(iov),
        Op::I32Const(1),
        Op::LocalGet(2),
        Op::LocalGet(nread),
    ])
    .call(LegacyCall::FdPread);
    let err = errno(&mut p);
    on_success(
        &mut p,
        err,
        |p| {
            tag(p, RET, 0, 0);
            put(p, RET, 4, buf);
            p.store(RET, 8, Op::I32Store, |p| {
                p.emit_all([Op::LocalGet(nread), Op::I32Load(0)]);
            });
            // end of stream when nothing was read
            p.store(RET, 12, Op::I32Store8, |p| {
                p.emit_all([Op::LocalGet(nread), Op::I32Load(0), Op::I32Eqz]);
            });
        },
        |p| {
            tag(p, RET, 0, 1);
            put8(p, RET, 4, err);
            p.free(buf, Operand::Local(len), 1);
        },
    );
    p.free(iov, Operand::Const(8), 4);
    p.free(nread, Operand::Const(4), 4);
    p
}

/// `descriptor.write(buffer: list<u8>, offset: u64)`:
/// `(param self ptr len i64 ret)`.
fn write() -> Program {
    const RET: u32 = 4;
    let mut p = Program::new(5);
    let iov = iovec(&mut p, 1, 2);
    let written = p.alloc_local(4, Operand::Const(4));
    p.emit_all([
        Op::LocalGet(0),
        Op::LocalGet(iov),
        Op::I32Const(1),
        Op::LocalGet(3),
        Op::LocalGet(written),
    ])
    .call(LegacyCall::FdPwrite);
    let err = errno(&mut p);
    on_success(
        &mut p,
        err,
        |p| {
            tag(p, RET, 0, 0);
            p.store(RET, 8, Op::I64Store, |p| {
                p.emit_all([Op::LocalGet(written), Op::I32Load(0), Op::I64ExtendI32U]);
            });
        },
        |p| {
            tag(p, RET, 0, 1);
            put8(p, RET, 8, err);
        },
    );
    p.free(iov, Operand::Const(8), 4);
    p.free(written, Operand::Const(4), 4);
    p
}

/// Calls `fd_filestat_get(self, buf)` or, for the `-at` forms,
/// `path_filestat_get(self, path-flags, path-ptr, path-len, buf)`.
fn filestat(p: &mut Program, at: bool) -> (u32, u32) {
    let buf = p.alloc_local(8, Operand::Const(legacy::FILESTAT_SIZE));
    if at {
        p.emit_all([
            Op::LocalGet(0),
            Op::LocalGet(1),
            Op::LocalGet(2),
            Op::LocalGet(3),
            Op::LocalGet(buf),
        ])
        .call(LegacyCall::PathFilestatGet);
    } else {
        p.emit_all([Op::LocalGet(0), Op::LocalGet(buf)])
            .call(LegacyCall::FdFilestatGet);
    }
    let err = errno(p);
    (buf, err)
}

/// `descriptor.get-type() -> result<descriptor-type, error-code>`.
fn get_type() -> Program {
    const RET: u32 = 1;
    let mut p = Program::new(2);
    let (buf, err) = filestat(&mut p, false);
    on_success(
        &mut p,
        err,
        |p| {
            tag(p, RET, 0, 0);
            let ty = descriptor_type(p, buf);
            put8(p, RET, 1, ty);
        },
        |p| {
            tag(p, RET, 0, 1);
            put8(p, RET, 1, err);
        },
    );
    p.free(buf, Operand::Const(legacy::FILESTAT_SIZE), 8);
    p
}

/// `descriptor.stat()` / `stat-at()`. The `descriptor-stat` record sits at
/// `ret + 8`: type 8, link-count 16, size 24, then three
/// `option<datetime>` timestamps at 32, 56 and 80.
fn stat(at: bool) -> Program {
    let ret = if at { 4 } else { 1 };
    let mut p = Program::new(ret + 1);
    let (buf, err) = filestat(&mut p, at);
    on_success(
        &mut p,
        err,
        |p| {
            tag(p, ret, 0, 0);
            let ty = descriptor_type(p, buf);
            put8(p, ret, 8, ty);
            for (dst, src) in [(16, legacy::FILESTAT_NLINK), (24, legacy::FILESTAT_SIZE_FIELD)] {
                p.store(ret, dst, Op::I64Store, |p| {
                    p.emit_all([Op::LocalGet(buf), Op::I64Load(src)]);
                });
            }
            tag(p, ret, 32, 0);
            tag(p, ret, 56, 1);
            let mtim = p.local(ValType::I64);
            p.emit_all([
                Op::LocalGet(buf),
                Op::I64Load(legacy::FILESTAT_MTIM),
                Op::LocalSet(mtim),
            ]);
            datetime(p, ret, 64, mtim);
            tag(p, ret, 80, 0);
        },
        |p| {
            tag(p, ret, 0, 1);
            put8(p, ret, 8, err);
        },
    );
    p.free(buf, Operand::Const(legacy::FILESTAT_SIZE), 8);
    p
}

/// `metadata-hash()` / `metadata-hash-at()`: `{lower: dev, upper: ino}`.
fn metadata_hash(at: bool) -> Program {
    let ret = if at { 4 } else { 1 };
    let mut p = Program::new(ret + 1);
    let (buf, err) = filestat(&mut p, at);
    on_success(
        &mut p,
        err,
        |p| {
            tag(p, ret, 0, 0);
            for (dst, src) in [(8, legacy::FILESTAT_DEV), (16, legacy::FILESTAT_INO)] {
                p.store(ret, dst, Op::I64Store, |p| {
                    p.emit_all([Op::LocalGet(buf), Op::I64Load(src)]);
                });
            }
        },
        |p| {
            tag(p, ret, 0, 1);
            put8(p, ret, 8, err);
        },
    );
    p.free(buf, Operand::Const(legacy::FILESTAT_SIZE), 8);
    p
}

// ─── Streams ─────────────────────────────────────────────────────────────────

/// Writes `last-operation-failed(err)` as the error of a
/// `result<_, stream-error>`.
fn stream_failed(p: &mut Program, ret: u32, err: u32) {
    tag(p, ret, 0, 1);
    tag(p, ret, 4, 0);
    put(p, ret, 8, err);
}

/// `output-stream.write(contents: list<u8>)`: `(param self ptr len ret)`.
fn stream_write() -> Program {
    const RET: u32 = 3;
    let mut p = Program::new(4);
    let iov = iovec(&mut p, 1, 2);
    let written = p.alloc_local(4, Operand::Const(4));
    p.emit_all([
        Op::LocalGet(0),
        Op::LocalGet(iov),
        Op::I32Const(1),
        Op::LocalGet(written),
    ])
    .call(LegacyCall::FdWrite);
    let err = errno(&mut p);
    on_success(&mut p, err, |p| tag(p, RET, 0, 0), |p| stream_failed(p, RET, err));
    p.free(iov, Operand::Const(8), 4);
    p.free(written, Operand::Const(4), 4);
    p
}

/// `input-stream.blocking-read(len: u64) -> result<list<u8>, stream-error>`:
/// `(param self i64 ret)`.
fn blocking_read() -> Program {
    const RET: u32 = 2;
    let mut p = Program::new(3);
    let len = wrap_len(&mut p, 1);
    let buf = p.alloc_local(1, Operand::Local(len));
    let iov = iovec(&mut p, buf, len);
    let nread = p.alloc_local(4, Operand::Const(4));
    p.emit_all([
        Op::LocalGet(0),
        Op::LocalGet(iov),
        Op::I32Const(1),
        Op::LocalGet(nread),
    ])
    .call(LegacyCall::FdRead);
    let err = errno(&mut p);
    on_success(
        &mut p,
        err,
        |p| {
            p.emit_all([Op::LocalGet(nread), Op::I32Load(0), Op::I32Eqz, Op::If]);
            // closed
            tag(p, RET, 0, 1);
            tag(p, RET, 4, 1);
            p.free(buf, Operand::Local(len), 1);
            p.emit(Op::Else);
            tag(p, RET, 0, 0);
            put(p, RET, 4, buf);
            p.store(RET, 8, Op::I32Store, |p| {
                p.emit_all([Op::LocalGet(nread), Op::I32Load(0)]);
            });
            p.emit(Op::End);
        },
        |p| {
            stream_failed(p, RET, err);
            p.free(buf, Operand::Local(len), 1);
        },
    );
    p.free(iov, Operand::Const(8), 4);
    p.free(nread, Operand::Const(4), 4);
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn rendered(op: BridgeOp) -> String {
        op.program().render(&HashMap::new()).join("\n")
    }

    #[test]
    fn test_every_program_balances_blocks() {
        for op in BridgeOp::ALL {
            let program = op.program();
            let mut depth = 0i32;
            for o in program.ops() {
                match o {
                    Op::Block | Op::Loop | Op::If => depth += 1,
                    Op::End => depth -= 1,
                    _ => {}
                }
                assert!(depth >= 0, "{:?} closes a block it never opened", op);
            }
            assert_eq!(depth, 0, "{:?} leaves a block open", op);
        }
    }

    #[test]
    fn test_random_bytes_writes_pointer_then_length() {
        let text = rendered(BridgeOp::RandomBytes);
        assert!(text.starts_with("(local i32 i32)\nlocal.get 0\ni32.wrap_i64\nlocal.set 2"));
        assert!(text.contains("call $__wasi_snapshot_preview1_random_get"));
        assert!(text.ends_with("local.get 1\nlocal.get 3\ni32.store\nlocal.get 1\nlocal.get 2\ni32.store offset=4"));

        let inert = rendered(BridgeOp::RandomAllocOnly);
        assert!(!inert.contains("random_get"));
        assert!(inert.contains("call $cabi_realloc"));
    }

    #[test]
    fn test_wall_clock_splits_seconds_and_nanos() {
        let text = rendered(BridgeOp::WallNow);
        assert!(text.contains("i32.const 0\ni64.const 0\nlocal.get 1\ncall $__wasi_snapshot_preview1_clock_time_get"));
        assert!(text.contains("i64.const 1000000000\ni64.div_u\ni64.store"));
        assert!(text.contains("i64.rem_u\ni32.wrap_i64\ni32.store offset=8"));
    }

    #[test]
    fn test_open_at_rejects_sync_flags() {
        let text = rendered(BridgeOp::OpenAt);
        insta::assert_snapshot!(text.lines().take(13).collect::<Vec<_>>().join("\n"), @r###"
        (local i32 i32)
        local.get 5
        i32.const 28
        i32.and
        if
          local.get 6
          i32.const 1
          i32.store8
          local.get 6
          i32.const 27
          i32.store8 offset=4
          return
        end
        "###);
        assert!(text.contains("i64.const 536870911\ni64.const 536870911"));
    }

    #[test]
    fn test_filetype_translation_reads_original_value() {
        let text = rendered(BridgeOp::GetType);
        // socket-stream (6) must not be re-read as the output of 5 -> 7
        for (from, to) in FILETYPE_MAP {
            assert!(text.contains(&format!(
                "local.get 4\n  i32.const {}\n  i32.eq\n  if\n    i32.const {}\n    local.set 5\n  end",
                from, to
            )));
        }
    }

    #[test]
    fn test_stat_layout() {
        let text = rendered(BridgeOp::Stat);
        assert!(text.contains("i64.load offset=24\n  i64.store offset=16"));
        assert!(text.contains("i64.load offset=32\n  i64.store offset=24"));
        assert!(text.contains("i32.const 1\n  i32.store8 offset=56"));
        assert!(text.contains("i64.load offset=48"));
        assert!(text.contains("i32.store offset=72"));
    }

    /// Rendered body with indentation stripped.
    fn flat(op: BridgeOp) -> String {
        rendered(op).lines().map(str::trim).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn test_preopen_scan_layout() {
        // list 1, count 2, fd 3, prestat 4, name_len 5, entry 6, name 7
        let text = flat(BridgeOp::GetDirectories);
        assert!(text.starts_with("(local i32 i32 i32 i32 i32 i32 i32)"));
        assert!(text.contains(
            "i32.const 3\nlocal.set 3\nblock\nloop\nlocal.get 3\ni32.const 64\ni32.gt_u\nbr_if 1\nlocal.get 3\nlocal.get 4\ncall $__wasi_snapshot_preview1_fd_prestat_get"
        ));
        // failed lookups and non-directory tags fall through to the next fd
        assert!(text.contains(
            "fd_prestat_get\ni32.eqz\nif\nlocal.get 4\ni32.load8_u\ni32.eqz\nif\nlocal.get 4\ni32.load offset=4\nlocal.set 5\nlocal.get 5\nif\n"
        ));
        assert!(text.contains("local.get 3\nlocal.get 7\nlocal.get 5\ncall $__wasi_snapshot_preview1_fd_prestat_dir_name"));
        // realloc(list, count * 12, 4, (count + 1) * 12)
        assert!(text.contains(
            "local.get 1\nlocal.get 2\ni32.const 12\ni32.mul\ni32.const 4\nlocal.get 2\ni32.const 1\ni32.add\ni32.const 12\ni32.mul\ncall $cabi_realloc\nlocal.set 1"
        ));
        assert!(text.contains(
            "local.get 6\nlocal.get 3\ni32.store\nlocal.get 6\nlocal.get 7\ni32.store offset=4\nlocal.get 6\nlocal.get 5\ni32.store offset=8\nlocal.get 2\ni32.const 1\ni32.add\nlocal.set 2"
        ));
        assert!(text.contains(
            "else\nlocal.get 7\nlocal.get 5\ni32.const 1\ni32.const 0\ncall $cabi_realloc\ndrop\nend\nend\nend\nend\nlocal.get 3\ni32.const 1\ni32.add\nlocal.set 3\nbr 0\nend\nend"
        ));
        assert!(text.contains("local.get 0\nlocal.get 1\ni32.store\nlocal.get 0\nlocal.get 2\ni32.store offset=4"));
    }

    #[test]
    fn test_nameless_preopen_allocates_nothing() {
        let ops = BridgeOp::GetDirectories.program().ops().to_vec();
        let guard = ops
            .windows(3)
            .position(|w| w == [Op::LocalSet(5), Op::LocalGet(5), Op::If])
            .unwrap();
        let first_name_alloc = ops
            .windows(2)
            .position(|w| w == [Op::Call(Callee::Allocator), Op::LocalSet(7)])
            .unwrap();
        assert!(guard < first_name_alloc);
    }

    #[test]
    fn test_metadata_hash_layout() {
        // buf 2, err 3; lower = dev at ret+8, upper = ino at ret+16
        let text = flat(BridgeOp::MetadataHash);
        assert!(text.contains("local.get 0\nlocal.get 2\ncall $__wasi_snapshot_preview1_fd_filestat_get\nlocal.set 3"));
        assert!(text.contains(
            "local.get 1\nlocal.get 2\ni64.load\ni64.store offset=8\nlocal.get 1\nlocal.get 2\ni64.load offset=8\ni64.store offset=16"
        ));
        assert!(text.contains("i32.const 1\ni32.store8\nlocal.get 1\nlocal.get 3\ni32.store8 offset=8"));

        let at = flat(BridgeOp::MetadataHashAt);
        assert!(at.contains("call $__wasi_snapshot_preview1_path_filestat_get"));
        assert!(at.contains(
            "local.get 4\nlocal.get 5\ni64.load\ni64.store offset=8\nlocal.get 4\nlocal.get 5\ni64.load offset=8\ni64.store offset=16"
        ));
    }

    #[test]
    fn test_read_layout() {
        // len 4, buf 5, iov 6, nread 7, err 8
        let text = flat(BridgeOp::Read);
        assert!(text.contains(
            "local.get 0\nlocal.get 6\ni32.const 1\nlocal.get 2\nlocal.get 7\ncall $__wasi_snapshot_preview1_fd_pread\nlocal.set 8"
        ));
        assert!(text.contains("local.get 3\nlocal.get 5\ni32.store offset=4"));
        assert!(text.contains("local.get 3\nlocal.get 7\ni32.load\ni32.store offset=8"));
        // end of stream at ret+12 when zero bytes were read
        assert!(text.contains("local.get 3\nlocal.get 7\ni32.load\ni32.eqz\ni32.store8 offset=12"));
        assert!(text.contains("i32.const 1\ni32.store8\nlocal.get 3\nlocal.get 8\ni32.store8 offset=4"));
    }

    #[test]
    fn test_blocking_read_reports_closed_on_zero_bytes() {
        let text = rendered(BridgeOp::BlockingRead);
        assert!(text.contains("call $__wasi_snapshot_preview1_fd_read"));
        assert!(text.contains("i32.load\n  i32.eqz\n  if\n    local.get 2\n    i32.const 1\n    i32.store8\n    local.get 2\n    i32.const 1\n    i32.store8 offset=4"));
    }

    #[test]
    fn test_exit_never_returns() {
        assert_eq!(
            rendered(BridgeOp::Exit),
            "local.get 0\ncall $__wasi_snapshot_preview1_proc_exit\nunreachable"
        );
    }

    #[test]
    fn test_declared_params_match_program() {
        for op in BridgeOp::ALL {
            let declared = op.params().split_whitespace().count() as u32;
            assert_eq!(op.program().params(), declared, "{:?}", op);
        }
        assert!(BridgeOp::CheckWrite.fits(&[ValType::I32, ValType::I32], &[]));
        assert!(!BridgeOp::CheckWrite.fits(&[ValType::I32], &[]));
        assert!(BridgeOp::MonotonicNow.fits(&[], &[ValType::I64]));
    }
}

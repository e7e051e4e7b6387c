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

//! Bridge program builder.
//!
//! A `Program` is a flat instruction list plus the locals it declares,
//! rendered to WAT body lines only once the identifiers of the legacy
//! imports are known.

use crate::allocator;
use crate::legacy::LegacyCall;
use crate::signature::ValType;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callee {
    /// The module's `cabi_realloc`.
    Allocator,
    Legacy(LegacyCall),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    LocalGet(u32),
    LocalSet(u32),
    I32Const(i32),
    I64Const(i64),
    I32WrapI64,
    I64ExtendI32U,
    I32Add,
    I32Mul,
    I32And,
    I32Eq,
    I32Eqz,
    I32GtU,
    I64DivU,
    I64RemU,
    I32Load(u32),
    I32Load8U(u32),
    I64Load(u32),
    I32Store(u32),
    I32Store8(u32),
    I64Store(u32),
    Call(Callee),
    Drop,
    Return,
    Unreachable,
    Nop,
    Block,
    Loop,
    If,
    Else,
    End,
    Br(u32),
    BrIf(u32),
}

/// Writes `name` or `name offset=N`.
fn mem(f: &mut fmt::Formatter<'_>, name: &str, offset: u32) -> fmt::Result {
    if offset == 0 {
        write!(f, "{}", name)
    } else {
        write!(f, "{} offset={}", name, offset)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::LocalGet(i) => write!(f, "local.get {}", i),
            Op::LocalSet(i) => write!(f, "local.set {}", i),
            Op::I32Const(v) => write!(f, "i32.const {}", v),
            Op::I64Const(v) => write!(f, "i64.const {}", v),
            Op::I32WrapI64 => write!(f, "i32.wrap_i64"),
            Op::I64ExtendI32U => write!(f, "i64.extend_i32_u"),
            Op::I32Add => write!(f, "i32.add"),
            Op::I32Mul => write!(f, "i32.mul"),
            Op::I32And => write!(f, "i32.and"),
            Op::I32Eq => write!(f, "i32.eq"),
            Op::I32Eqz => write!(f, "i32.eqz"),
            Op::I32GtU => write!(f, "i32.gt_u"),
            Op::I64DivU => write!(f, "i64.div_u"),
            Op::I64RemU => write!(f, "i64.rem_u"),
            Op::I32Load(o) => mem(f, "i32.load", *o),
            Op::I32Load8U(o) => mem(f, "i32.load8_u", *o),
            Op::I64Load(o) => mem(f, "i64.load", *o),
            Op::I32Store(o) => mem(f, "i32.store", *o),
            Op::I32Store8(o) => mem(f, "i32.store8", *o),
            Op::I64Store(o) => mem(f, "i64.store", *o),
            Op::Call(Callee::Allocator) => write!(f, "call {}", allocator::CONVENTIONAL),
            Op::Call(Callee::Legacy(call)) => write!(f, "call {}", call.canonical_id()),
            Op::Drop => write!(f, "drop"),
            Op::Return => write!(f, "return"),
            Op::Unreachable => write!(f, "unreachable"),
            Op::Nop => write!(f, "nop"),
            Op::Block => write!(f, "block"),
            Op::Loop => write!(f, "loop"),
            Op::If => write!(f, "if"),
            Op::Else => write!(f, "else"),
            Op::End => write!(f, "end"),
            Op::Br(d) => write!(f, "br {}", d),
            Op::BrIf(d) => write!(f, "br_if {}", d),
        }
    }
}

/// A value pushed as an `i32` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Const(i32),
    Local(u32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    params: u32,
    locals: Vec<ValType>,
    ops: Vec<Op>,
}

impl Program {
    /// A program for a function taking `params` (flattened) parameters.
    pub fn new(params: u32) -> Self {
        Program {
            params,
            locals: Vec::new(),
            ops: Vec::new(),
        }
    }

    /// Declares a local and returns its index.
    pub fn local(&mut self, ty: ValType) -> u32 {
        self.locals.push(ty);
        self.params + self.locals.len() as u32 - 1
    }

    pub fn emit(&mut self, op: Op) -> &mut Self {
        self.ops.push(op);
        self
    }

    pub fn emit_all<I>(&mut self, ops: I) -> &mut Self
    where
        I: IntoIterator<Item = Op>,
    {
        self.ops.extend(ops);
        self
    }

    pub fn push(&mut self, operand: Operand) -> &mut Self {
        match operand {
            Operand::Const(v) => self.emit(Op::I32Const(v)),
            Operand::Local(i) => self.emit(Op::LocalGet(i)),
        }
    }

    /// `cabi_realloc(0, 0, align, size)`; leaves the new pointer on the stack.
    pub fn alloc(&mut self, align: i32, size: Operand) -> &mut Self {
        self.emit_all([Op::I32Const(0), Op::I32Const(0), Op::I32Const(align)]);
        self.push(size);
        self.emit(Op::Call(Callee::Allocator))
    }

    /// Allocates into a fresh `i32` local and returns it.
    pub fn alloc_local(&mut self, align: i32, size: Operand) -> u32 {
        let ptr = self.local(ValType::I32);
        self.alloc(align, size).emit(Op::LocalSet(ptr));
        ptr
    }

    /// `cabi_realloc(ptr, size, align, 0)`, which releases the block.
    pub fn free(&mut self, ptr: u32, size: Operand, align: i32) -> &mut Self {
        self.emit(Op::LocalGet(ptr));
        self.push(size);
        self.emit_all([
            Op::I32Const(align),
            Op::I32Const(0),
            Op::Call(Callee::Allocator),
            Op::Drop,
        ])
    }

    /// `store` of the value produced by `value` at `base + offset`.
    pub fn store<F>(&mut self, base: u32, offset: u32, store: fn(u32) -> Op, value: F) -> &mut Self
    where
        F: FnOnce(&mut Self),
    {
        self.emit(Op::LocalGet(base));
        value(self);
        self.emit(store(offset))
    }

    pub fn call(&mut self, call: LegacyCall) -> &mut Self {
        self.emit(Op::Call(Callee::Legacy(call)))
    }

    pub fn params(&self) -> u32 {
        self.params
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn locals(&self) -> &[ValType] {
        &self.locals
    }

    pub fn legacy_calls(&self) -> BTreeSet<LegacyCall> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Call(Callee::Legacy(call)) => Some(*call),
                _ => None,
            })
            .collect()
    }

    /// Body lines, nested blocks indented by two spaces. Legacy calls use
    /// the identifiers in `ids`, falling back to their canonical names.
    pub fn render(&self, ids: &HashMap<LegacyCall, String>) -> Vec<String> {
        let mut lines = Vec::with_capacity(self.ops.len() + 1);
        if !self.locals.is_empty() {
            let types: Vec<String> = self.locals.iter().map(ToString::to_string).collect();
            lines.push(format!("(local {})", types.join(" ")));
        }
        let mut depth = 0usize;
        for op in &self.ops {
            if matches!(op, Op::Else | Op::End) {
                depth = depth.saturating_sub(1);
            }
            let text = match op {
                Op::Call(Callee::Legacy(call)) => match ids.get(call) {
                    Some(id) => format!("call {}", id),
                    None => op.to_string(),
                },
                _ => op.to_string(),
            };
            lines.push(format!("{}{}", "  ".repeat(depth), text));
            if matches!(op, Op::Block | Op::Loop | Op::If | Op::Else) {
                depth += 1;
            }
        }
        lines
    }
}

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

pub mod allocator;
pub mod bridges;
pub mod catalog;
pub mod codec;
pub mod fixup;
pub mod legacy;
pub mod module;
pub mod naming;
pub mod numbering;
pub mod pipeline;
pub mod program;
pub mod scanner;
pub mod signature;
pub mod synth;
pub use pipeline::{clip, ClipConfig, ClipError, ClipEvent, ClipReport};

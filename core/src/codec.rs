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

//! Binary/text codec and component unbundling, delegated to `wasm-tools`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use thiserror::Error;
use tracing::{debug, warn};
use wasmparser::{Chunk, Encoding, Parser, Payload, Validator};

/// File name `component unbundle` gives the main core module.
pub const PRIMARY_MODULE: &str = "unbundled-module0.wasm";

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no core module found in {0}")]
    NoModule(PathBuf),
    #[error("invalid module: {0}")]
    Invalid(#[from] wasmparser::BinaryReaderError),
}

pub trait ModuleCodec {
    /// Binary module at `path` to text.
    fn decode(&self, path: &Path) -> Result<String, CodecError>;
    /// Text to binary module.
    fn encode(&self, text: &str) -> Result<Vec<u8>, CodecError>;
}

pub trait ComponentUnbundler {
    /// Extracts the core module of the component at `input` into `workdir`
    /// and returns its path.
    fn extract_core_module(&self, input: &Path, workdir: &Path) -> Result<PathBuf, CodecError>;
}

/// The `wasm-tools` executable.
#[derive(Debug, Clone)]
pub struct WasmTools {
    program: PathBuf,
}

impl Default for WasmTools {
    fn default() -> Self {
        WasmTools::new("wasm-tools")
    }
}

impl WasmTools {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        WasmTools {
            program: program.into(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.program.display(), args.join(" "))
    }

    fn check(&self, args: &[&str], output: Output) -> Result<Vec<u8>, CodecError> {
        if output.status.success() {
            return Ok(output.stdout);
        }
        Err(CodecError::Failed {
            command: self.describe(args),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>, CodecError> {
        debug!(command = %self.describe(args), "running");
        let output = self.command(args).output()?;
        self.check(args, output)
    }
}

impl ModuleCodec for WasmTools {
    fn decode(&self, path: &Path) -> Result<String, CodecError> {
        let path = path.to_string_lossy();
        let stdout = match self.run(&["print", "--name-unnamed", &path]) {
            Ok(stdout) => stdout,
            // older releases do not know the flag
            Err(CodecError::Failed { stderr, .. }) if stderr.contains("name-unnamed") => {
                warn!("wasm-tools has no --name-unnamed; printing without it");
                self.run(&["print", &path])?
            }
            Err(e) => return Err(e),
        };
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }

    fn encode(&self, text: &str) -> Result<Vec<u8>, CodecError> {
        let args = ["parse"];
        debug!(command = %self.describe(&args), bytes = text.len(), "running");
        let mut child = self
            .command(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Feed stdin from another thread so a full stdout pipe cannot stall us.
        let writer = child.stdin.take().map(|mut stdin| {
            let input = text.as_bytes().to_vec();
            thread::spawn(move || stdin.write_all(&input))
        });
        let output = child.wait_with_output()?;
        if let Some(writer) = writer {
            match writer.join() {
                Ok(result) => result?,
                Err(_) => {
                    return Err(CodecError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "stdin writer panicked",
                    )))
                }
            }
        }
        self.check(&args, output)
    }
}

impl ComponentUnbundler for WasmTools {
    fn extract_core_module(&self, input: &Path, workdir: &Path) -> Result<PathBuf, CodecError> {
        let input = input.to_string_lossy();
        let dir = workdir.to_string_lossy();
        let bundled = workdir.join("unbundled.wasm");
        let out = bundled.to_string_lossy();
        self.run(&["component", "unbundle", "--module-dir", &dir, "-o", &out, &input])?;
        select_core_module(workdir)
    }
}

// ─── Module Selection & Validation ───────────────────────────────────────────

/// Whether `bytes` start with a core module header (not a component).
pub fn is_core_module(bytes: &[u8]) -> bool {
    matches!(
        Parser::new(0).parse(bytes, true),
        Ok(Chunk::Parsed {
            payload: Payload::Version {
                encoding: Encoding::Module,
                ..
            },
            ..
        })
    )
}

/// `unbundled-module0.wasm` when present, otherwise the first `.wasm` file
/// in name order that is a core module.
pub fn select_core_module(dir: &Path) -> Result<PathBuf, CodecError> {
    let primary = dir.join(PRIMARY_MODULE);
    if primary.is_file() {
        return Ok(primary);
    }
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|e| e == "wasm").unwrap_or(false))
        .collect();
    candidates.sort();
    for path in candidates {
        if is_core_module(&fs::read(&path)?) {
            return Ok(path);
        }
    }
    Err(CodecError::NoModule(dir.to_path_buf()))
}

pub fn validate(bytes: &[u8]) -> Result<(), CodecError> {
    Validator::new().validate_all(bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPONENT: &[u8] = b"\0asm\x0d\0\x01\0";

    #[test]
    fn test_core_module_detection() {
        let core = wat::parse_str("(module)").unwrap();
        assert!(is_core_module(&core));
        assert!(!is_core_module(COMPONENT));
        assert!(!is_core_module(b"not wasm"));
    }

    #[test]
    fn test_select_prefers_primary_module() {
        let dir = tempfile::tempdir().unwrap();
        let core = wat::parse_str("(module)").unwrap();
        fs::write(dir.path().join("a.wasm"), &core).unwrap();
        fs::write(dir.path().join(PRIMARY_MODULE), &core).unwrap();
        assert_eq!(select_core_module(dir.path()).unwrap(), dir.path().join(PRIMARY_MODULE));
    }

    #[test]
    fn test_select_skips_components_and_other_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.wasm"), COMPONENT).unwrap();
        fs::write(dir.path().join("b.txt"), b"x").unwrap();
        fs::write(dir.path().join("c.wasm"), wat::parse_str("(module)").unwrap()).unwrap();
        assert_eq!(select_core_module(dir.path()).unwrap(), dir.path().join("c.wasm"));

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(select_core_module(empty.path()), Err(CodecError::NoModule(_))));
    }

    #[test]
    fn test_validate_rejects_type_errors() {
        let good = wat::parse_str("(module (func (result i32) i32.const 0))").unwrap();
        assert!(validate(&good).is_ok());
        let bad = wat::parse_str("(module (func (result i32) i64.const 0))").unwrap();
        assert!(matches!(validate(&bad), Err(CodecError::Invalid(_))));
    }

    #[test]
    fn test_missing_executable_is_io_error() {
        let tools = WasmTools::new("/nonexistent/wasm-tools-for-tests");
        assert!(matches!(tools.encode("(module)"), Err(CodecError::Io(_))));
    }
}

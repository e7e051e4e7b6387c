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

//! Module Text as an ordered list of top-level declarations.
//!
//! `ModuleText::parse(t).render() == t` holds for every accepted input:
//! each declaration keeps the trivia in front of it, and whatever follows
//! the last complete declaration is kept verbatim in the trailer.

use crate::scanner::{self, matching_close, skip_trivia, ScanError};
use std::fmt;

/// Half-open byte range `[start, end)` over rendered Module Text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclKind {
    Type,
    Rec,
    Import,
    Func,
    Table,
    Memory,
    Global,
    Export,
    Start,
    Elem,
    Data,
    Tag,
    Other(String),
}

impl DeclKind {
    fn of(text: &str) -> Self {
        match scanner::keyword(text).unwrap_or_default() {
            "type" => DeclKind::Type,
            "rec" => DeclKind::Rec,
            "import" => DeclKind::Import,
            "func" => DeclKind::Func,
            "table" => DeclKind::Table,
            "memory" => DeclKind::Memory,
            "global" => DeclKind::Global,
            "export" => DeclKind::Export,
            "start" => DeclKind::Start,
            "elem" => DeclKind::Elem,
            "data" => DeclKind::Data,
            "tag" => DeclKind::Tag,
            other => DeclKind::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DeclKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeclKind::Type => "type",
            DeclKind::Rec => "rec",
            DeclKind::Import => "import",
            DeclKind::Func => "func",
            DeclKind::Table => "table",
            DeclKind::Memory => "memory",
            DeclKind::Global => "global",
            DeclKind::Export => "export",
            DeclKind::Start => "start",
            DeclKind::Elem => "elem",
            DeclKind::Data => "data",
            DeclKind::Tag => "tag",
            DeclKind::Other(name) => name,
        };
        write!(f, "{}", name)
    }
}

/// One balanced top-level declaration.
#[derive(Debug, Clone)]
pub struct Decl {
    leading: String,
    text: String,
    kind: DeclKind,
}

impl Decl {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> &DeclKind {
        &self.kind
    }

    /// Whitespace and comments between the previous declaration and this one.
    pub fn leading(&self) -> &str {
        &self.leading
    }

    /// First line of the declaration, for diagnostics.
    pub fn headline(&self) -> String {
        let line = self.text.lines().next().unwrap_or_default();
        line.chars().take(80).collect()
    }
}

#[derive(Debug, Clone)]
pub struct ModuleText {
    prefix: String,
    decls: Vec<Decl>,
    trailer: String,
}

impl ModuleText {
    /// Parses a complete module. Unbalanced delimiters anywhere are an error.
    pub fn parse(text: &str) -> Result<Self, ScanError> {
        Self::parse_inner(text, true)
    }

    /// Parses the head of a module cut at an arbitrary byte. A declaration
    /// that does not close before the cut stays in the trailer untouched.
    pub fn parse_head(text: &str) -> Self {
        // Only the strict path can fail.
        Self::parse_inner(text, false).unwrap_or_else(|_| ModuleText {
            prefix: String::new(),
            decls: Vec::new(),
            trailer: text.to_string(),
        })
    }

    fn parse_inner(text: &str, strict: bool) -> Result<Self, ScanError> {
        let mut pos = skip_trivia(text, 0);
        let has_header = scanner::keyword(&text[pos..]) == Some("module");
        if has_header {
            if strict {
                matching_close(text, pos)?;
            }
            pos += "(module".len();
            let next = skip_trivia(text, pos);
            if text[next..].starts_with('$') {
                pos = scanner::atom_end(text, next)?;
            }
        } else {
            pos = 0;
        }
        let prefix = text[..pos].to_string();

        let mut decls = Vec::new();
        loop {
            let start = skip_trivia(text, pos);
            if !text[start..].starts_with('(') {
                break;
            }
            let end = match matching_close(text, start) {
                Ok(end) => end,
                Err(e) if strict => return Err(e),
                Err(_) => break,
            };
            let decl_text = &text[start..end];
            decls.push(Decl {
                leading: text[pos..start].to_string(),
                text: decl_text.to_string(),
                kind: DeclKind::of(decl_text),
            });
            pos = end;
        }

        if strict {
            let mut rest = skip_trivia(text, pos);
            if has_header && text[rest..].starts_with(')') {
                rest = skip_trivia(text, rest + 1);
            }
            if rest < text.len() {
                return Err(ScanError::UnexpectedInput(rest));
            }
        }

        Ok(ModuleText {
            prefix,
            decls,
            trailer: text[pos..].to_string(),
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(
            self.prefix.len()
                + self.trailer.len()
                + self
                    .decls
                    .iter()
                    .map(|d| d.leading.len() + d.text.len())
                    .sum::<usize>(),
        );
        out.push_str(&self.prefix);
        for decl in &self.decls {
            out.push_str(&decl.leading);
            out.push_str(&decl.text);
        }
        out.push_str(&self.trailer);
        out
    }

    pub fn decls(&self) -> &[Decl] {
        &self.decls
    }

    pub fn decl(&self, index: usize) -> Option<&Decl> {
        self.decls.get(index)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Unparsed remainder after the last complete declaration.
    pub fn trailer(&self) -> &str {
        &self.trailer
    }

    /// Replaces the text of one declaration, keeping its leading trivia.
    pub fn replace(&mut self, index: usize, text: String) {
        if let Some(decl) = self.decls.get_mut(index) {
            decl.kind = DeclKind::of(&text);
            decl.text = text;
        }
    }

    /// Inserts a declaration before `index` (or at the end).
    pub fn insert(&mut self, index: usize, leading: &str, text: String) {
        let index = index.min(self.decls.len());
        let decl = Decl {
            leading: leading.to_string(),
            kind: DeclKind::of(&text),
            text,
        };
        self.decls.insert(index, decl);
    }

    /// Moves a declaration, with its leading trivia, so it ends up at `to`.
    pub fn move_decl(&mut self, from: usize, to: usize) {
        if from >= self.decls.len() || from == to {
            return;
        }
        let decl = self.decls.remove(from);
        let to = to.min(self.decls.len());
        self.decls.insert(to, decl);
    }

    /// Position of declaration `index` in the rendered text.
    pub fn span_of(&self, index: usize) -> Option<Span> {
        let decl = self.decls.get(index)?;
        let before: usize = self.decls[..index]
            .iter()
            .map(|d| d.leading.len() + d.text.len())
            .sum();
        let start = self.prefix.len() + before + decl.leading.len();
        Some(Span {
            start,
            end: start + decl.text.len(),
        })
    }

    pub fn position<P>(&self, mut predicate: P) -> Option<usize>
    where
        P: FnMut(&Decl) -> bool,
    {
        self.decls.iter().position(|d| predicate(d))
    }

    pub fn last_position<P>(&self, mut predicate: P) -> Option<usize>
    where
        P: FnMut(&Decl) -> bool,
    {
        self.decls.iter().rposition(|d| predicate(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "(module $m\n  (type (;0;) (func (result i32)))\n  (import \"env\" \"f\" (func $f (;0;) (type 0)))\n  (memory (;0;) 1)\n  ;; trailing note\n)\n";

    #[test]
    fn test_parse_render_roundtrip() {
        let module = ModuleText::parse(SAMPLE).unwrap();
        assert_eq!(module.len(), 3);
        assert_eq!(module.render(), SAMPLE);
        let kinds: Vec<&DeclKind> = module.decls().iter().map(|d| d.kind()).collect();
        assert_eq!(kinds, vec![&DeclKind::Type, &DeclKind::Import, &DeclKind::Memory]);
    }

    #[test]
    fn test_span_of_matches_rendered_text() {
        let module = ModuleText::parse(SAMPLE).unwrap();
        let span = module.span_of(1).unwrap();
        assert_eq!(
            &SAMPLE[span.start..span.end],
            "(import \"env\" \"f\" (func $f (;0;) (type 0)))"
        );
    }

    #[test]
    fn test_parse_rejects_unbalanced_module() {
        let err = ModuleText::parse("(module\n  (func $a\n").unwrap_err();
        assert_eq!(err, ScanError::Unbalanced { open: 0 });
    }

    #[test]
    fn test_parse_head_keeps_partial_declaration_in_trailer() {
        let cut = &SAMPLE[..SAMPLE.find("(memory").unwrap() + 5];
        let module = ModuleText::parse_head(cut);
        assert_eq!(module.len(), 2);
        assert!(module.trailer().ends_with("(memo"));
        assert_eq!(module.render(), cut);
    }

    #[test]
    fn test_replace_updates_kind() {
        let mut module = ModuleText::parse(SAMPLE).unwrap();
        module.replace(1, "(func $f (;0;) (type 0)\n    i32.const 0\n  )".to_string());
        assert_eq!(module.decl(1).unwrap().kind(), &DeclKind::Func);
        assert!(module.render().contains("  (func $f (;0;) (type 0)\n    i32.const 0\n  )\n  (memory"));
    }

    #[test]
    fn test_move_decl_carries_leading_trivia() {
        let mut module = ModuleText::parse(SAMPLE).unwrap();
        module.move_decl(2, 0);
        assert_eq!(
            module.render(),
            "(module $m\n  (memory (;0;) 1)\n  (type (;0;) (func (result i32)))\n  (import \"env\" \"f\" (func $f (;0;) (type 0)))\n  ;; trailing note\n)\n"
        );
    }

    #[test]
    fn test_bare_declarations_without_header() {
        let text = "(type (func))\n(func $x (type 0))\n";
        let module = ModuleText::parse(text).unwrap();
        assert_eq!(module.len(), 2);
        assert_eq!(module.render(), text);
    }
}

//! the line grammar
//!
//! One declaration per physical line:
//!
//! ```text
//! [section NAME]
//! [section NAME when COND]
//! [when COND]            # COND == "*" clears
//! [option parse/lax]
//! [option parse/strict]
//! [collect PATH]
//! [collect PATH when COND]
//! key: value words...                 # comment stripped at a '#' word
//! key: [
//! raw line 1
//! raw line 2
//! ]
//! ```
//!
//! Comments start at a word beginning with `#`. Multi-line block bodies are
//! taken verbatim (no comment stripping) until a line containing exactly
//! `]`. An empty `key:` refers to the current section's own key.
//!
//! Parser state that only lives for one file (current section, active
//! condition) is threaded through an explicit [ParserContext] instead of
//! being held on the store, so parsing stays reentrant and testable.
use crate::collect::CollectorEntry;
use crate::collection::{Collection, Slot};
use crate::error::{Error, Result};
use crate::value::Value;
use std::path::{Path, PathBuf};

/// Per-file parser state; a fresh context is created for every source
#[derive(Debug, Default, Clone)]
pub struct ParserContext {
    /// Active `[section ...]` prefix, empty outside any section
    pub section: String,

    /// Active `[when ...]` / `[section ... when ...]` condition
    pub condition: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ParseOptions {
    /// Accept duplicate unconditional definitions, last one wins. Used by
    /// callers that deliberately layer files on top of each other.
    pub allow_duplicates: bool,
}

impl Collection {
    /// Parse a file, remembering its canonical path so later `[collect]`
    /// requests for the same file become no-ops
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.load_file_with(path, &ParseOptions::default())
    }

    pub fn load_file_with(&mut self, path: impl AsRef<Path>, opts: &ParseOptions) -> Result<()> {
        let path = path.as_ref();
        let canonical = path.canonicalize().map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        if self.collected.contains(&canonical) {
            tracing::debug!(path = %canonical.display(), "already collected, skipping");
            return Ok(());
        }

        tracing::info!(path = %canonical.display(), "loading file");
        let text = std::fs::read_to_string(&canonical).map_err(|source| Error::Io {
            path: canonical.display().to_string(),
            source,
        })?;
        self.parse_source(&canonical.display().to_string(), &text, opts)?;
        self.collected.insert(canonical);
        Ok(())
    }

    /// Parse an in-memory source under a pseudo-filename
    pub fn load_str(&mut self, origin: &str, text: &str) -> Result<()> {
        self.parse_source(origin, text, &ParseOptions::default())
    }

    /// Parse a whole source with a fresh [ParserContext]
    pub fn parse_source(&mut self, origin: &str, text: &str, opts: &ParseOptions) -> Result<()> {
        let mut ctx = ParserContext::default();
        let lines: Vec<&str> = text.lines().collect();
        let mut pos = 0;
        while pos < lines.len() {
            self.parse_line(&mut ctx, origin, &lines, &mut pos, opts)?;
            pos += 1;
        }
        Ok(())
    }

    /// Parse the line at `lines[*pos]`, consuming further lines for
    /// multi-line block bodies
    fn parse_line(
        &mut self,
        ctx: &mut ParserContext,
        origin: &str,
        lines: &[&str],
        pos: &mut usize,
        opts: &ParseOptions,
    ) -> Result<()> {
        let raw_line = lines[*pos];
        let line_no = *pos + 1;

        let mut tokens: Vec<&str> = raw_line.split_whitespace().collect();
        if let Some(comment) = tokens.iter().position(|token| token.starts_with('#')) {
            tokens.truncate(comment);
        }
        if tokens.is_empty() {
            return Ok(());
        }

        if tokens.len() == 2 && tokens[0].ends_with(':') && tokens[1] == "[" {
            let name = &tokens[0][..tokens[0].len() - 1];
            let mut body = vec![];
            loop {
                *pos += 1;
                let Some(line) = lines.get(*pos) else {
                    return Err(Error::Syntax {
                        file: origin.to_string(),
                        line: line_no,
                        message: format!("unterminated multi-line block for {name:?}"),
                    });
                };
                if line.trim() == "]" {
                    break;
                }
                body.push(line.to_string());
            }
            self.define(ctx, origin, line_no, name, Value::Block(body), opts)
        } else if tokens[0].starts_with('[') && tokens.last().is_some_and(|t| t.ends_with(']')) {
            self.parse_annotation(ctx, origin, line_no, raw_line, &tokens)
        } else if tokens[0].ends_with(':') {
            let name = &tokens[0][..tokens[0].len() - 1];
            let value = tokens[1..].join(" ");
            self.define(ctx, origin, line_no, name, Value::Scalar(value), opts)
        } else {
            Err(Error::Syntax {
                file: origin.to_string(),
                line: line_no,
                message: format!("unrecognized line: {:?}", raw_line.trim()),
            })
        }
    }

    fn define(
        &mut self,
        ctx: &ParserContext,
        origin: &str,
        line_no: usize,
        name: &str,
        value: Value,
        opts: &ParseOptions,
    ) -> Result<()> {
        let (key, section) = if name.is_empty() {
            // bare ":" declares the section's own key
            let section = (!ctx.section.is_empty()).then(|| ctx.section.clone());
            (ctx.section.clone(), section)
        } else if ctx.section.is_empty() {
            (name.to_string(), None)
        } else {
            (
                format!("{}/{}", ctx.section, name),
                Some(ctx.section.clone()),
            )
        };

        tracing::trace!(%key, conditional = ctx.condition.is_some(), "define");

        let lax = self.lax;
        let slot = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Slot::new(lax, section.clone(), origin.to_string()));
        slot.lax = lax;
        if section.is_some() {
            slot.section = section;
        }

        if let Some(condition) = &ctx.condition {
            if slot.variants.contains_key(condition) {
                return Err(Error::Redefinition {
                    key: format!("{key} when {condition}"),
                    existing: slot.origin.clone(),
                    new: format!("{origin}:{line_no}"),
                });
            }
            slot.variants.insert(condition.clone(), value);
        } else {
            if slot.value.is_some() && !opts.allow_duplicates {
                return Err(Error::Redefinition {
                    key,
                    existing: slot.origin.clone(),
                    new: format!("{origin}:{line_no}"),
                });
            }
            slot.value = Some(value);
            slot.origin = origin.to_string();
        }
        Ok(())
    }

    fn parse_annotation(
        &mut self,
        ctx: &mut ParserContext,
        origin: &str,
        line_no: usize,
        raw_line: &str,
        tokens: &[&str],
    ) -> Result<()> {
        let syntax = |message: String| Error::Syntax {
            file: origin.to_string(),
            line: line_no,
            message,
        };

        // the brackets may hug the words, so strip them and retokenize
        let mut words: Vec<String> = tokens.iter().map(|token| token.to_string()).collect();
        words[0].remove(0);
        let last = words.len() - 1;
        words[last].pop();
        let joined = words.join(" ");
        let parts: Vec<&str> = joined.split_whitespace().collect();

        match parts.split_first() {
            Some((&"section", rest)) => match rest {
                [name] => {
                    ctx.section = name.to_string();
                    ctx.condition = None;
                }
                [name, "when", condition @ ..] if !condition.is_empty() => {
                    ctx.section = name.to_string();
                    ctx.condition = parse_condition(condition);
                }
                _ => {
                    return Err(syntax(format!(
                        "invalid [section] annotation: {}",
                        raw_line.trim()
                    )))
                }
            },
            Some((&"when", rest)) if !rest.is_empty() => {
                ctx.condition = parse_condition(rest);
            }
            Some((&"option", rest)) => match rest {
                ["parse/lax"] => self.lax = true,
                ["parse/strict"] => self.lax = false,
                _ => {
                    return Err(syntax(format!(
                        "unexpected [option] annotation: {}",
                        raw_line.trim()
                    )))
                }
            },
            Some((&"collect", rest)) => {
                if let Some(active) = ctx.condition.clone() {
                    // inside a [when] block the block's condition applies
                    let [path] = rest else {
                        return Err(syntax(format!(
                            "conditional [collect] not allowed inside [when] blocks: {}",
                            raw_line.trim()
                        )));
                    };
                    self.push_collect(path, origin, Some(active));
                } else {
                    match rest {
                        [path] => self.push_collect(path, origin, None),
                        [path, "when", condition @ ..] if !condition.is_empty() => {
                            let condition = condition.join(" ");
                            self.push_collect(path, origin, Some(condition));
                        }
                        _ => {
                            return Err(syntax(format!(
                                "invalid [collect] annotation: {}",
                                raw_line.trim()
                            )))
                        }
                    }
                }
            }
            _ => {
                return Err(syntax(format!(
                    "unknown annotation: {}",
                    raw_line.trim()
                )))
            }
        }
        Ok(())
    }

    fn push_collect(&mut self, path: &str, origin: &str, condition: Option<String>) {
        tracing::trace!(path, ?condition, "queueing collect entry");
        self.collector.push_back(CollectorEntry::new(
            path.to_string(),
            PathBuf::from(origin),
            condition,
        ));
    }
}

/// `*` clears the active condition
fn parse_condition(tokens: &[&str]) -> Option<String> {
    let condition = tokens.join(" ");
    (condition != "*").then_some(condition)
}

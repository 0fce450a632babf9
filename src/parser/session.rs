//! One compilation: a depth-first walk over the root file and its imports.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::discovery::{resolve, ImportStack, SourceLoader};
use crate::error::{Result, ScanError, WtError};
use crate::sprite::Expander;

use super::compilation::{Compilation, SourceFile};
use super::custom::render_call;
use super::linemap::{FileId, LineMap};
use super::scanner::{scan, AssignFlags, DirectiveKind, Scanner};
use super::variables::{Value, VariableTable};
use super::ParserOptions;

pub(crate) struct Session<'p> {
    options: &'p ParserOptions,
    loader: SourceLoader,
    expander: Expander<'p>,
    files: Vec<SourceFile>,
    stack: ImportStack,
    vars: VariableTable,
}

impl<'p> Session<'p> {
    pub(crate) fn new(options: &'p ParserOptions, loader: SourceLoader, expander: Expander<'p>) -> Self {
        Self {
            options,
            loader,
            expander,
            files: Vec::new(),
            stack: ImportStack::new(),
            vars: VariableTable::new(),
        }
    }

    /// Preprocess `text`, read from `path`, with imports relative to `dir`.
    pub(crate) fn run(mut self, path: PathBuf, text: String, dir: &Path) -> Result<Compilation> {
        let _span = tracing::debug_span!("compile", root = %path.display()).entered();

        self.stack.push(path.clone())?;
        let root = self.add_file(path, text, None);
        let map = self.parse_unit(root, dir)?;
        self.stack.pop();

        tracing::debug!(files = self.files.len(), lines = map.line_count(), "preprocessed");
        Ok(Compilation::new(map, self.files))
    }

    fn add_file(&mut self, path: PathBuf, text: String, parent: Option<FileId>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile {
            id,
            path,
            text: Arc::from(text),
            parent,
        });
        id
    }

    fn location(&self, file: FileId, line: u32) -> String {
        format!("{}:{}", self.files[file.0 as usize].path.display(), line)
    }

    /// Assemble one file, splicing in its imports.
    fn parse_unit(&mut self, file: FileId, dir: &Path) -> Result<LineMap> {
        let options = self.options;
        let text = Arc::clone(&self.files[file.0 as usize].text);
        let base = self.vars.innermost();
        let mut map = LineMap::new();

        for item in scan(&text, &options.custom_functions) {
            let directive = item.map_err(|e| {
                let ScanError::MalformedDirective { line, .. } = &e;
                let location = self.location(file, *line);
                WtError::from(e).at(location)
            })?;
            let line = directive.line();
            self.vars.sync(base, file, &directive.scope);

            match directive.kind {
                DirectiveKind::PlainRun { text } => map.append(text, file, line),

                DirectiveKind::Import { targets } => {
                    for target in &targets {
                        let child = self
                            .import(target, file, dir)
                            .map_err(|e| e.at(self.location(file, line)))?;
                        map.splice(child);
                    }
                }

                DirectiveKind::Variable {
                    name,
                    value,
                    value_at,
                    flags,
                } => {
                    let expanded = self
                        .expand_expression(value, line)
                        .map_err(|e| e.at(self.location(file, line)))?;
                    match expanded {
                        None => {
                            map.append(directive.raw, file, line);
                            self.vars.assign(name, Value::Raw(value.to_string()), flags);
                        }
                        Some(rewritten) => {
                            let raw = directive.raw;
                            let value_end = value_at + value.len();
                            map.append(&raw[..value_at], file, line);
                            map.append_generated(&rewritten, file, line);
                            let after_line = line + count_newlines(&raw[..value_end]);
                            map.append(&raw[value_end..], file, after_line);
                            self.vars.assign(name, Value::Raw(rewritten), flags);
                        }
                    }
                }

                DirectiveKind::SpriteRule { name, args, binding } => {
                    let indent = line_indent(&text, directive.span.start.offset);
                    let expansion = self
                        .expander
                        .expand(name, &args, &self.vars, indent, line)
                        .map_err(|e| e.at(self.location(file, line)))?;

                    match binding {
                        Some(binding) => {
                            if let Some(sheet) = expansion.sheet {
                                self.vars.assign(binding.name, Value::SpriteMap(sheet), binding.flags);
                            }
                            let terminated = directive.raw.trim_end().ends_with(';');
                            let statement = assignment(binding.name, &expansion.text, binding.flags, terminated);
                            map.append_generated(&statement, file, line);
                        }
                        None => map.append_generated(&expansion.text, file, line),
                    }
                }

                DirectiveKind::CustomFunctionCall { name, args } => {
                    let rendered = self
                        .normalize_call(name, &args, line)
                        .map_err(|e| e.at(self.location(file, line)))?;
                    map.append_generated(&rendered, file, line);
                }
            }
        }

        Ok(map)
    }

    /// Resolve, load and assemble one import target.
    fn import(&mut self, target: &str, parent: FileId, dir: &Path) -> Result<LineMap> {
        let path = resolve(target, dir, &self.options.include_paths)?;
        self.stack.push(path.clone())?;

        let result = self.load_and_parse(target, path, parent);
        self.stack.pop();
        result
    }

    fn load_and_parse(&mut self, target: &str, path: PathBuf, parent: FileId) -> Result<LineMap> {
        let (path, text) = self.loader.load(&path)?;
        tracing::debug!(target, path = %path.display(), depth = self.stack.len(), "importing");

        let child_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let id = self.add_file(path, text, Some(parent));
        self.parse_unit(id, &child_dir)
    }

    /// Expand directives inside a variable's value.
    ///
    /// Returns `None` when the value contains none.
    fn expand_expression(&self, value: &str, line: u32) -> Result<Option<String>> {
        let customs = &self.options.custom_functions;
        let scanner = Scanner::new(value, customs).in_expression().starting_at_line(line);

        let mut rewritten = String::with_capacity(value.len());
        let mut changed = false;
        for item in scanner {
            let directive = item?;
            let line = directive.line();
            match directive.kind {
                DirectiveKind::PlainRun { text } => rewritten.push_str(text),
                DirectiveKind::SpriteRule { name, args, .. } => {
                    let expansion = self.expander.expand(name, &args, &self.vars, "", line)?;
                    rewritten.push_str(&expansion.text);
                    changed = true;
                }
                DirectiveKind::CustomFunctionCall { name, args } => {
                    rewritten.push_str(&self.normalize_call(name, &args, line)?);
                    changed = true;
                }
                // Not recognized in expressions.
                DirectiveKind::Import { .. } | DirectiveKind::Variable { .. } => {
                    rewritten.push_str(directive.raw)
                }
            }
        }

        Ok(changed.then_some(rewritten))
    }

    fn normalize_call(&self, name: &str, args: &[String], line: u32) -> Result<String> {
        let signature = self
            .options
            .custom_functions
            .get(name)
            .ok_or_else(|| ScanError::malformed(line, format!("{}() is not registered", name)))?;
        let normalized = signature.normalize(args, line)?;
        Ok(render_call(name, &normalized))
    }
}

/// Render a `sprite-map` binding: `$name: value [flags];`.
fn assignment(name: &str, value: &str, flags: AssignFlags, terminated: bool) -> String {
    let mut out = format!("${}: {}", name, value);
    if flags.default {
        out.push_str(" !default");
    }
    if flags.global {
        out.push_str(" !global");
    }
    if terminated {
        out.push(';');
    }
    out
}

/// Leading whitespace of the line containing `offset`, up to `offset`.
fn line_indent(text: &str, offset: usize) -> &str {
    let start = text[..offset].rfind('\n').map_or(0, |i| i + 1);
    let line = &text[start..offset];
    let end = line
        .find(|c: char| c != ' ' && c != '\t')
        .unwrap_or(line.len());
    &line[..end]
}

fn count_newlines(text: &str) -> u32 {
    text.bytes().filter(|&b| b == b'\n').count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_indent() {
        let text = "a {\n    b: sprite($m, x);\n}";
        let offset = text.find("sprite").unwrap();
        assert_eq!(line_indent(text, offset), "    ");
        assert_eq!(line_indent(text, 0), "");
    }

    #[test]
    fn test_assignment_keeps_flags() {
        let flags = AssignFlags {
            default: true,
            global: false,
        };
        assert_eq!(
            assignment("icons", "\"x.png\"", flags, true),
            "$icons: \"x.png\" !default;"
        );
        assert_eq!(assignment("m", "\"y\"", AssignFlags::default(), false), "$m: \"y\"");
    }
}

//! Directive scanner.
//!
//! Walks one file's text linearly and yields the constructs the parser acts
//! on: `@import` directives, sprite/image function calls, registered custom
//! function calls and variable assignments. Everything in between comes out
//! as maximally coalesced plain runs. Strings, comments, `url(...)` and
//! `#{...}` interpolation are skipped as opaque text, so directives are never
//! recognized inside them.
//!
//! The scanner keeps no state between calls; scanning the same text twice
//! yields the same directives.

use crate::error::ScanError;

use super::custom::CustomFunctions;
use super::span::{Location, Span};

/// Function names handled by the sprite expander.
pub const SPRITE_FUNCTIONS: &[&str] = &[
    "sprite-map",
    "sprite",
    "sprite-file",
    "sprite-url",
    "sprite-position",
    "sprite-height",
    "sprite-width",
    "sprite-dimensions",
    "image-url",
    "image-height",
    "image-width",
    "inline-image",
];

/// Trailing `!default` / `!global` flags of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AssignFlags {
    pub default: bool,
    pub global: bool,
}

/// The variable a `sprite-map(...)` result is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding<'a> {
    pub name: &'a str,
    pub flags: AssignFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveKind<'a> {
    /// `@import "a", "b";`, one target per quoted name, left to right.
    Import { targets: Vec<String> },
    /// A call from [`SPRITE_FUNCTIONS`].
    SpriteRule {
        name: &'a str,
        args: Vec<String>,
        binding: Option<Binding<'a>>,
    },
    /// A call matching a registered custom function.
    CustomFunctionCall { name: &'a str, args: Vec<String> },
    /// `$name: value;` at statement position.
    Variable {
        name: &'a str,
        value: &'a str,
        /// Byte offset of `value` within the directive's raw text.
        value_at: usize,
        flags: AssignFlags,
    },
    PlainRun { text: &'a str },
}

/// A recognized construct together with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive<'a> {
    pub kind: DirectiveKind<'a>,
    pub span: Span,
    /// The exact source text covered by `span`.
    pub raw: &'a str,
    /// Ordinals of the blocks open at the start of the directive, outermost first.
    pub scope: Vec<u32>,
}

impl Directive<'_> {
    /// First source line of the directive.
    pub fn line(&self) -> u32 {
        self.span.start.line
    }
}

/// Scan `text`, recognizing calls of the functions registered in `customs`.
pub fn scan<'a>(text: &'a str, customs: &'a CustomFunctions) -> Scanner<'a> {
    Scanner::new(text, customs)
}

/// Lazy directive iterator over one piece of text.
pub struct Scanner<'a> {
    src: &'a str,
    customs: &'a CustomFunctions,
    pos: usize,
    line: u32,
    line_start: usize,
    scope: Vec<u32>,
    next_block: u32,
    at_statement: bool,
    pending: Option<Directive<'a>>,
    failed: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str, customs: &'a CustomFunctions) -> Self {
        Self {
            src,
            customs,
            pos: 0,
            line: 1,
            line_start: 0,
            scope: Vec::new(),
            next_block: 0,
            at_statement: true,
            pending: None,
            failed: false,
        }
    }

    /// Number lines from `line` instead of 1.
    pub fn starting_at_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Scan an expression (such as a variable's value) rather than a
    /// stylesheet: imports and assignments are not recognized.
    pub fn in_expression(mut self) -> Self {
        self.at_statement = false;
        self
    }

    fn bytes(&self) -> &'a [u8] {
        self.src.as_bytes()
    }

    fn byte_at(&self, i: usize) -> Option<u8> {
        self.bytes().get(i).copied()
    }

    fn here(&self) -> Location {
        let column = self.src[self.line_start..self.pos].chars().count() as u32 + 1;
        Location::new(self.pos, self.line, column)
    }

    /// Line number of an offset at or after the cursor.
    fn line_at(&self, offset: usize) -> u32 {
        let end = offset.min(self.src.len());
        self.line + self.src[self.pos..end].bytes().filter(|&b| b == b'\n').count() as u32
    }

    fn advance_to(&mut self, to: usize) {
        for (i, b) in self.src[self.pos..to].bytes().enumerate() {
            if b == b'\n' {
                self.line += 1;
                self.line_start = self.pos + i + 1;
            }
        }
        self.pos = to;
    }

    fn directive(&mut self, kind: DirectiveKind<'a>, start: Location, end: usize) -> Directive<'a> {
        let scope = self.scope.clone();
        self.advance_to(end);
        let span = Span::new(start, self.here());
        Directive {
            kind,
            span,
            raw: &self.src[start.offset..end],
            scope,
        }
    }

    fn plain(&self, start: Location, end: Location, scope: Vec<u32>) -> Directive<'a> {
        let text = &self.src[start.offset..end.offset];
        Directive {
            kind: DirectiveKind::PlainRun { text },
            span: Span::new(start, end),
            raw: text,
            scope,
        }
    }

    fn next_item(&mut self) -> Option<Result<Directive<'a>, ScanError>> {
        if let Some(directive) = self.pending.take() {
            return Some(Ok(directive));
        }
        if self.failed || self.pos >= self.src.len() {
            return None;
        }

        let run_start = self.here();
        let run_scope = self.scope.clone();

        while self.pos < self.src.len() {
            match self.try_directive(run_start.offset) {
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                Ok(Some(directive)) => {
                    if directive.span.start.offset > run_start.offset {
                        let plain = self.plain(run_start, directive.span.start, run_scope);
                        self.pending = Some(directive);
                        return Some(Ok(plain));
                    }
                    return Some(Ok(directive));
                }
                Ok(None) => {}
            }

            if let Err(e) = self.skip_token() {
                self.failed = true;
                return Some(Err(e));
            }
        }

        Some(Ok(self.plain(run_start, self.here(), run_scope)))
    }

    fn try_directive(&mut self, run_start: usize) -> Result<Option<Directive<'a>>, ScanError> {
        let Some(b) = self.byte_at(self.pos) else {
            return Ok(None);
        };

        if b == b'@' && self.at_statement && self.src[self.pos..].starts_with("@import") {
            return self.scan_import(run_start);
        }
        if b == b'$' && self.at_statement {
            return self.scan_assignment();
        }
        if is_ident_start(b) && !self.follows_word() {
            return self.scan_call();
        }
        Ok(None)
    }

    /// Whether the byte before the cursor continues a word, selector or variable.
    fn follows_word(&self) -> bool {
        match self.pos.checked_sub(1).and_then(|i| self.byte_at(i)) {
            Some(b) => is_ident_byte(b) || matches!(b, b'$' | b'@' | b'.' | b'#' | b'%' | b'&'),
            None => false,
        }
    }

    fn scan_import(&mut self, run_start: usize) -> Result<Option<Directive<'a>>, ScanError> {
        let start = self.pos;
        let mut i = start + "@import".len();
        match self.byte_at(i) {
            Some(b) if b.is_ascii_whitespace() || b == b'"' || b == b'\'' => {}
            _ => return Ok(None),
        }

        let mut targets = Vec::new();
        let mut plain_css = false;

        loop {
            i = skip_whitespace(self.bytes(), i);
            match self.byte_at(i) {
                Some(b'"') | Some(b'\'') => {
                    let end = string_end(self.bytes(), i).ok_or_else(|| {
                        ScanError::malformed(self.line_at(i), "unterminated string in @import")
                    })?;
                    let target = &self.src[i + 1..end - 1];
                    if is_css_import(target) {
                        plain_css = true;
                    }
                    targets.push(target.to_string());
                    i = end;
                }
                Some(b'u') if self.src[i..].starts_with("url(") => {
                    plain_css = true;
                    i = find_close(self.bytes(), i + 3).map(|c| c + 1).ok_or_else(|| {
                        ScanError::malformed(self.line_at(i), "unterminated url() in @import")
                    })?;
                }
                _ => {
                    return Err(ScanError::malformed(
                        self.line_at(start),
                        "@import expects a quoted file name",
                    ))
                }
            }

            // A media query has to start on the import's own line.
            i = skip_blanks(self.bytes(), i);
            match self.byte_at(i) {
                Some(b',') => i += 1,
                Some(b';') => {
                    i += 1;
                    break;
                }
                None | Some(b'}') | Some(b'\n') | Some(b'\r') => break,
                Some(_) => {
                    // Media query: a plain CSS import.
                    plain_css = true;
                    break;
                }
            }
        }

        if plain_css {
            return Ok(None);
        }

        // The directive owns its indentation and line ending, so the
        // imported content replaces the whole line.
        let indent_only = self.line_start >= run_start
            && self.src[self.line_start..start].bytes().all(|b| b == b' ' || b == b'\t');
        let start_loc = if indent_only {
            Location::new(self.line_start, self.line, 1)
        } else {
            self.here()
        };

        while matches!(self.byte_at(i), Some(b' ') | Some(b'\t') | Some(b'\r')) {
            i += 1;
        }
        if self.byte_at(i) == Some(b'\n') {
            i += 1;
        }

        let directive = self.directive(DirectiveKind::Import { targets }, start_loc, i);
        self.at_statement = true;
        Ok(Some(directive))
    }

    fn scan_assignment(&mut self) -> Result<Option<Directive<'a>>, ScanError> {
        let start = self.pos;
        let name_end = ident_end(self.bytes(), start + 1);
        if name_end == start + 1 {
            return Ok(None);
        }
        let colon = skip_whitespace(self.bytes(), name_end);
        if self.byte_at(colon) != Some(b':') {
            return Ok(None);
        }

        let value_start = skip_whitespace(self.bytes(), colon + 1);
        let (value_end, end) = self.statement_end(value_start)?;

        let mut flags = AssignFlags::default();
        let mut value = &self.src[value_start..value_end];
        loop {
            let trimmed = value.trim_end();
            if let Some(rest) = trimmed.strip_suffix("!default") {
                flags.default = true;
                value = rest;
            } else if let Some(rest) = trimmed.strip_suffix("!global") {
                flags.global = true;
                value = rest;
            } else {
                value = trimmed;
                break;
            }
        }
        if value.is_empty() {
            return Err(ScanError::malformed(self.line, "assignment without a value"));
        }

        let name = &self.src[start + 1..name_end];
        let kind = match parse_call(value) {
            Some(("sprite-map", args)) => DirectiveKind::SpriteRule {
                name: "sprite-map",
                args,
                binding: Some(Binding { name, flags }),
            },
            _ => DirectiveKind::Variable {
                name,
                value,
                value_at: value_start - start,
                flags,
            },
        };

        let start_loc = self.here();
        let directive = self.directive(kind, start_loc, end);
        self.at_statement = true;
        Ok(Some(directive))
    }

    fn scan_call(&mut self) -> Result<Option<Directive<'a>>, ScanError> {
        let start = self.pos;
        let name_end = ident_end(self.bytes(), start);
        if self.byte_at(name_end) != Some(b'(') {
            return Ok(None);
        }
        let name = &self.src[start..name_end];

        let is_sprite = SPRITE_FUNCTIONS.contains(&name);
        if !is_sprite && !self.customs.contains(name) {
            return Ok(None);
        }

        let close = find_close(self.bytes(), name_end).ok_or_else(|| {
            ScanError::malformed(self.line, format!("unterminated call to {}()", name))
        })?;
        let args = split_args(&self.src[name_end + 1..close]);

        let kind = if is_sprite {
            if name == "sprite-map" {
                return Err(ScanError::malformed(
                    self.line,
                    "sprite-map() must be assigned to a variable",
                ));
            }
            DirectiveKind::SpriteRule {
                name,
                args,
                binding: None,
            }
        } else {
            DirectiveKind::CustomFunctionCall { name, args }
        };

        let start_loc = self.here();
        let directive = self.directive(kind, start_loc, close + 1);
        self.at_statement = false;
        Ok(Some(directive))
    }

    /// Find the end of the statement whose value starts at `from`.
    ///
    /// Returns (end of value, end of statement). The statement end includes a
    /// terminating `;` but not a closing or opening brace.
    fn statement_end(&self, from: usize) -> Result<(usize, usize), ScanError> {
        let bytes = self.bytes();
        let mut depth = 0usize;
        let mut i = from;
        while i < bytes.len() {
            match bytes[i] {
                b'"' | b'\'' => {
                    i = string_end(bytes, i).ok_or_else(|| {
                        ScanError::malformed(self.line_at(i), "unterminated string")
                    })?;
                    continue;
                }
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i = comment_end(bytes, i).ok_or_else(|| {
                        ScanError::malformed(self.line_at(i), "unterminated comment")
                    })?;
                    continue;
                }
                b'#' if bytes.get(i + 1) == Some(&b'{') => {
                    i = find_close(bytes, i + 1).map(|c| c + 1).ok_or_else(|| {
                        ScanError::malformed(self.line_at(i), "unterminated interpolation")
                    })?;
                    continue;
                }
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth = depth.saturating_sub(1),
                b';' if depth == 0 => return Ok((i, i + 1)),
                b'{' | b'}' if depth == 0 => return Ok((i, i)),
                _ => {}
            }
            i += 1;
        }
        Ok((bytes.len(), bytes.len()))
    }

    /// Step over one unit of plain text, tracking blocks and statement starts.
    fn skip_token(&mut self) -> Result<(), ScanError> {
        let bytes = self.bytes();
        let b = bytes[self.pos];
        let next = bytes.get(self.pos + 1).copied();

        let to = match b {
            b'/' if next == Some(b'/') => self.src[self.pos..]
                .find('\n')
                .map_or(self.src.len(), |n| self.pos + n),
            b'/' if next == Some(b'*') => comment_end(bytes, self.pos)
                .ok_or_else(|| ScanError::malformed(self.line, "unterminated comment"))?,
            b'"' | b'\'' => {
                self.at_statement = false;
                string_end(bytes, self.pos)
                    .ok_or_else(|| ScanError::malformed(self.line, "unterminated string"))?
            }
            b'#' if next == Some(b'{') => {
                self.at_statement = false;
                find_close(bytes, self.pos + 1)
                    .map(|c| c + 1)
                    .ok_or_else(|| ScanError::malformed(self.line, "unterminated interpolation"))?
            }
            b'u' if self.src[self.pos..].starts_with("url(") && !self.follows_word() => {
                self.at_statement = false;
                find_close(bytes, self.pos + 3)
                    .map(|c| c + 1)
                    .ok_or_else(|| ScanError::malformed(self.line, "unterminated url()"))?
            }
            b'{' => {
                self.scope.push(self.next_block);
                self.next_block += 1;
                self.at_statement = true;
                self.pos + 1
            }
            b'}' => {
                if self.scope.pop().is_none() {
                    return Err(ScanError::malformed(self.line, "unmatched '}'"));
                }
                self.at_statement = true;
                self.pos + 1
            }
            b';' => {
                self.at_statement = true;
                self.pos + 1
            }
            b if b.is_ascii_whitespace() => self.pos + 1,
            _ => {
                self.at_statement = false;
                let width = self.src[self.pos..].chars().next().map_or(1, char::len_utf8);
                self.pos + width
            }
        };

        self.advance_to(to);
        Ok(())
    }
}

impl<'a> Iterator for Scanner<'a> {
    type Item = Result<Directive<'a>, ScanError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_item()
    }
}

/// Parse text that is exactly one call, `name(arg, ...)`.
pub fn parse_call(text: &str) -> Option<(&str, Vec<String>)> {
    let text = text.trim();
    let bytes = text.as_bytes();
    if !bytes.first().copied().is_some_and(is_ident_start) {
        return None;
    }
    let name_end = ident_end(bytes, 0);
    if bytes.get(name_end) != Some(&b'(') {
        return None;
    }
    let close = find_close(bytes, name_end)?;
    if close != bytes.len() - 1 {
        return None;
    }
    Some((&text[..name_end], split_args(&text[name_end + 1..close])))
}

/// Split an argument list on top-level commas. Arguments are trimmed; a
/// trailing comma is ignored.
pub fn split_args(text: &str) -> Vec<String> {
    let bytes = text.as_bytes();
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = string_end(bytes, i).unwrap_or(bytes.len());
                continue;
            }
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                args.push(text[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    let last = text[start..].trim();
    if !last.is_empty() {
        args.push(last.to_string());
    }
    args
}

/// Remove one layer of matching quotes.
pub fn unquote(text: &str) -> &str {
    let text = text.trim();
    for q in ['"', '\''] {
        if let Some(inner) = text.strip_prefix(q).and_then(|t| t.strip_suffix(q)) {
            return inner;
        }
    }
    text
}

fn is_css_import(target: &str) -> bool {
    target.ends_with(".css")
        || target.starts_with("http://")
        || target.starts_with("https://")
        || target.starts_with("//")
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b'-'
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

fn ident_end(bytes: &[u8], from: usize) -> usize {
    let mut i = from;
    while i < bytes.len() && is_ident_byte(bytes[i]) {
        i += 1;
    }
    i
}

fn skip_whitespace(bytes: &[u8], from: usize) -> usize {
    let mut i = from;
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Skip spaces and tabs, stopping at a line break.
fn skip_blanks(bytes: &[u8], from: usize) -> usize {
    let mut i = from;
    while i < bytes.len() && matches!(bytes[i], b' ' | b'\t') {
        i += 1;
    }
    i
}

/// Offset just past the string literal opening at `open`, if it terminates
/// on the same line.
fn string_end(bytes: &[u8], open: usize) -> Option<usize> {
    let quote = bytes[open];
    let mut i = open + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Offset just past the `*/` closing the comment opening at `open`.
fn comment_end(bytes: &[u8], open: usize) -> Option<usize> {
    let mut i = open + 2;
    while i + 1 < bytes.len() {
        if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            return Some(i + 2);
        }
        i += 1;
    }
    None
}

/// Index of the bracket closing the `(` or `{` at `open`.
fn find_close(bytes: &[u8], open: usize) -> Option<usize> {
    let (opening, closing) = match bytes.get(open)? {
        b'(' => (b'(', b')'),
        b'{' => (b'{', b'}'),
        _ => return None,
    };
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = string_end(bytes, i)?;
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = comment_end(bytes, i)?;
                continue;
            }
            b if b == opening => depth += 1,
            b if b == closing => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

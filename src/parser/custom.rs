//! Caller-registered custom function signatures.
//!
//! A signature such as `foo($bar, $baz: 10px)` enables recognition of
//! `foo(...)` calls. Recognized calls are normalized against the signature
//! (keyword arguments placed, defaults filled in) but never evaluated.

use std::collections::HashMap;

use crate::error::{Result, ScanError, WtError};

use super::scanner::parse_call;

/// One declared parameter of a custom function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Name without the leading `$`.
    pub name: String,
    pub default: Option<String>,
}

/// A parsed custom function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub params: Vec<Param>,
}

impl Signature {
    /// Parse a signature of the form `name($a, $b: default)`.
    pub fn parse(source: &str) -> Result<Self> {
        let invalid = |message: &str| WtError::Config {
            message: format!("invalid custom function signature `{}`: {}", source, message),
            help: Some("Use the form name($arg1, $arg2: default)".to_string()),
        };

        let (name, args) = parse_call(source.trim()).ok_or_else(|| invalid("expected name(...)"))?;

        let mut params = Vec::with_capacity(args.len());
        for arg in args {
            let arg = arg.strip_prefix('$').ok_or_else(|| invalid("parameters must start with $"))?;
            let (name, default) = match arg.split_once(':') {
                Some((name, default)) => (name.trim(), Some(default.trim().to_string())),
                None => (arg.trim(), None),
            };
            if name.is_empty() {
                return Err(invalid("empty parameter name"));
            }
            if params.iter().any(|p: &Param| p.name == name) {
                return Err(invalid("duplicate parameter"));
            }
            params.push(Param {
                name: name.to_string(),
                default,
            });
        }

        Ok(Signature {
            name: name.to_string(),
            params,
        })
    }

    /// Map call arguments onto this signature, returning them in parameter order.
    pub fn normalize(&self, args: &[String], line: u32) -> std::result::Result<Vec<String>, ScanError> {
        let mut slots: Vec<Option<String>> = vec![None; self.params.len()];
        let mut positional = 0;
        let mut seen_keyword = false;

        for arg in args {
            if let Some((keyword, value)) = keyword_arg(arg) {
                let index = self
                    .params
                    .iter()
                    .position(|p| p.name == keyword)
                    .ok_or_else(|| {
                        ScanError::malformed(line, format!("{}() has no parameter ${}", self.name, keyword))
                    })?;
                if slots[index].is_some() {
                    return Err(ScanError::malformed(
                        line,
                        format!("{}() got ${} more than once", self.name, keyword),
                    ));
                }
                slots[index] = Some(value.to_string());
                seen_keyword = true;
            } else {
                if seen_keyword {
                    return Err(ScanError::malformed(
                        line,
                        format!("{}(): positional argument after keyword argument", self.name),
                    ));
                }
                if positional >= self.params.len() {
                    return Err(ScanError::malformed(
                        line,
                        format!(
                            "{}() takes {} argument(s) but {} were given",
                            self.name,
                            self.params.len(),
                            args.len()
                        ),
                    ));
                }
                slots[positional] = Some(arg.clone());
                positional += 1;
            }
        }

        slots
            .into_iter()
            .zip(&self.params)
            .map(|(slot, param)| {
                slot.or_else(|| param.default.clone()).ok_or_else(|| {
                    ScanError::malformed(line, format!("{}() missing argument ${}", self.name, param.name))
                })
            })
            .collect()
    }
}

/// The set of registered custom functions, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct CustomFunctions {
    signatures: HashMap<String, Signature>,
}

impl CustomFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and register every signature.
    pub fn from_signatures<S: AsRef<str>>(sources: &[S]) -> Result<Self> {
        let mut customs = Self::new();
        for source in sources {
            customs.register(Signature::parse(source.as_ref())?);
        }
        Ok(customs)
    }

    /// Register a signature, replacing any earlier one with the same name.
    pub fn register(&mut self, signature: Signature) {
        self.signatures.insert(signature.name.clone(), signature);
    }

    pub fn get(&self, name: &str) -> Option<&Signature> {
        self.signatures.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.signatures.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }
}

/// Split `$name: value` into (`name`, `value`).
fn keyword_arg(arg: &str) -> Option<(&str, &str)> {
    let rest = arg.strip_prefix('$')?;
    let (name, value) = rest.split_once(':')?;
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
        return None;
    }
    Some((name, value.trim()))
}

/// Render a normalized call back to source text.
pub fn render_call(name: &str, args: &[String]) -> String {
    format!("{}({})", name, args.join(", "))
}

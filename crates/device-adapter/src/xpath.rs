//! The single-step XPath subset produced by the selector transformer and
//! accepted in locator files: `//node[pred][pred]...`.
//!
//! Predicates are attribute tests (`@a='v'`, `contains(@a,'v')`,
//! `starts-with(@a,'v')`) joined by `and` / `or`, or a 1-based position.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static EQUALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^@([\w:-]+)\s*=\s*(?:'([^']*)'|"([^"]*)")$"#).unwrap());
static FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(contains|starts-with)\(\s*@([\w:-]+)\s*,\s*(?:'([^']*)'|"([^"]*)")\s*\)$"#)
        .unwrap()
});
static NODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\*|[\w.$:-]+)").unwrap());

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum XPathError {
    #[error("malformed xpath '{expr}': {reason}")]
    Malformed { expr: String, reason: String },

    #[error("unsupported xpath construct '{0}'")]
    Unsupported(String),
}

/// Parsed `//node[...]` expression with its raw predicate bodies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XPath {
    pub node: String,
    pub predicates: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Atom {
    Equals { attr: String, value: String },
    Contains { attr: String, value: String },
    StartsWith { attr: String, value: String },
}

impl Atom {
    fn eval(&self, lookup: &dyn Fn(&str) -> Option<String>) -> bool {
        match self {
            Atom::Equals { attr, value } => lookup(attr.as_str()).is_some_and(|v| &v == value),
            Atom::Contains { attr, value } => {
                lookup(attr.as_str()).is_some_and(|v| v.contains(value.as_str()))
            }
            Atom::StartsWith { attr, value } => {
                lookup(attr.as_str()).is_some_and(|v| v.starts_with(value.as_str()))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    /// 1-based position among the matches.
    Position(usize),
    /// Disjunction of conjunctions.
    AnyOf(Vec<Vec<Atom>>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledXPath {
    pub node: String,
    pub conditions: Vec<Condition>,
}

pub fn parse(expr: &str) -> Result<XPath, XPathError> {
    let malformed = |reason: &str| XPathError::Malformed {
        expr: expr.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = expr.trim();
    let rest = trimmed
        .strip_prefix("//")
        .ok_or_else(|| XPathError::Unsupported(trimmed.to_string()))?;
    let node = NODE
        .find(rest)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| malformed("missing node test"))?;

    let mut predicates = Vec::new();
    let mut chars = rest[node.len()..].chars();
    while let Some(c) = chars.next() {
        if c != '[' {
            return Err(XPathError::Unsupported(trimmed.to_string()));
        }
        let mut body = String::new();
        let mut quote: Option<char> = None;
        let mut depth = 0usize;
        let mut closed = false;
        for c in chars.by_ref() {
            match (quote, c) {
                (Some(q), c) if c == q => quote = None,
                (Some(_), _) => {}
                (None, '\'' | '"') => quote = Some(c),
                (None, '[') => depth += 1,
                (None, ']') if depth == 0 => {
                    closed = true;
                    break;
                }
                (None, ']') => depth -= 1,
                _ => {}
            }
            body.push(c);
        }
        if !closed {
            return Err(malformed("unterminated predicate"));
        }
        predicates.push(body.trim().to_string());
    }

    Ok(XPath { node, predicates })
}

impl XPath {
    pub fn render(&self) -> String {
        let mut out = format!("//{}", self.node);
        for p in &self.predicates {
            out.push('[');
            out.push_str(p);
            out.push(']');
        }
        out
    }

    /// The same expression with its last `n` predicates removed.
    pub fn relaxed(&self, n: usize) -> Option<XPath> {
        if n == 0 || n > self.predicates.len() {
            return None;
        }
        Some(XPath {
            node: self.node.clone(),
            predicates: self.predicates[..self.predicates.len() - n].to_vec(),
        })
    }

    /// First `@attr='literal'` whose attribute is one of `attrs`, in `attrs` order.
    pub fn literal(&self, attrs: &[&str]) -> Option<String> {
        let compiled = self.compile().ok()?;
        let atoms: Vec<&Atom> = compiled
            .conditions
            .iter()
            .filter_map(|c| match c {
                Condition::AnyOf(groups) => Some(groups.iter().flatten()),
                Condition::Position(_) => None,
            })
            .flatten()
            .collect();
        attrs.iter().find_map(|wanted| {
            atoms.iter().find_map(|atom| match atom {
                Atom::Equals { attr, value } if attr.as_str() == *wanted => Some(value.clone()),
                _ => None,
            })
        })
    }

    pub fn compile(&self) -> Result<CompiledXPath, XPathError> {
        let conditions = self
            .predicates
            .iter()
            .map(|p| compile_predicate(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CompiledXPath {
            node: self.node.clone(),
            conditions,
        })
    }
}

impl CompiledXPath {
    pub fn node_matches(&self, class_name: &str) -> bool {
        self.node == "*"
            || self.node == class_name
            || class_name
                .rsplit('.')
                .next()
                .is_some_and(|short| short == self.node)
    }

    pub fn attrs_match(&self, lookup: &dyn Fn(&str) -> Option<String>) -> bool {
        self.conditions.iter().all(|c| match c {
            Condition::Position(_) => true,
            Condition::AnyOf(groups) => groups
                .iter()
                .any(|group| group.iter().all(|atom| atom.eval(lookup))),
        })
    }

    /// Position filter applied to the ordered match list, if any.
    pub fn position(&self) -> Option<usize> {
        self.conditions.iter().rev().find_map(|c| match c {
            Condition::Position(n) => Some(*n),
            _ => None,
        })
    }
}

fn compile_predicate(body: &str) -> Result<Condition, XPathError> {
    if let Ok(n) = body.parse::<usize>() {
        if n == 0 {
            return Err(XPathError::Malformed {
                expr: body.to_string(),
                reason: "positions are 1-based".to_string(),
            });
        }
        return Ok(Condition::Position(n));
    }

    let groups = split_outside_quotes(body, " or ")
        .into_iter()
        .map(|alt| {
            split_outside_quotes(alt, " and ")
                .into_iter()
                .map(compile_atom)
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Condition::AnyOf(groups))
}

fn compile_atom(raw: &str) -> Result<Atom, XPathError> {
    let raw = raw.trim();
    if let Some(caps) = EQUALS.captures(raw) {
        let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
        return Ok(Atom::Equals {
            attr: caps[1].to_string(),
            value: value.to_string(),
        });
    }
    if let Some(caps) = FUNCTION.captures(raw) {
        let attr = caps[2].to_string();
        let value = caps
            .get(3)
            .or_else(|| caps.get(4))
            .map_or("", |m| m.as_str())
            .to_string();
        return Ok(match &caps[1] {
            "contains" => Atom::Contains { attr, value },
            _ => Atom::StartsWith { attr, value },
        });
    }
    Err(XPathError::Unsupported(raw.to_string()))
}

fn split_outside_quotes<'a>(s: &'a str, sep: &str) -> Vec<&'a str> {
    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut i = 0;
    while i < s.len() {
        let c = s[i..].chars().next().unwrap_or_default();
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if s[i..].starts_with(sep) => {
                parts.push(&s[start..i]);
                i += sep.len();
                start = i;
                continue;
            }
            None => {}
        }
        i += c.len_utf8();
    }
    parts.push(&s[start..]);
    parts
}

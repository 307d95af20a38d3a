//! Path addressing for decode handlers
//!
//! A [`DerPath`] names a position inside a PDU's element tree, e.g.
//! `/SEQ/APP(5)/ENUM[0]` for the result code of a SearchResultDone.
//! Paths are parsed once at handler registration and never mutate
//! afterwards.

use crate::ber::types::{Tag, TagClass};
use ldap_core::{LdapError, LdapResult};
use std::fmt;
use std::str::FromStr;

/// Tag kind named by one path step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Seq,
    Set,
    Int,
    Enum,
    OctStr,
    Bool,
    Null,
    App(u32),
    Ctx(u32),
    Prv(u32),
}

impl StepKind {
    /// Whether a decoded tag matches this step
    ///
    /// Matching is by class and number; the constructed flag is left to
    /// the element itself so primitive and constructed context tags
    /// both address cleanly.
    pub fn matches(&self, tag: Tag) -> bool {
        match *self {
            StepKind::Seq => tag.class() == TagClass::Universal && tag.number() == 16,
            StepKind::Set => tag.class() == TagClass::Universal && tag.number() == 17,
            StepKind::Int => tag.class() == TagClass::Universal && tag.number() == 2,
            StepKind::Enum => tag.class() == TagClass::Universal && tag.number() == 10,
            StepKind::OctStr => tag.class() == TagClass::Universal && tag.number() == 4,
            StepKind::Bool => tag.class() == TagClass::Universal && tag.number() == 1,
            StepKind::Null => tag.class() == TagClass::Universal && tag.number() == 5,
            StepKind::App(n) => tag.class() == TagClass::Application && tag.number() == n,
            StepKind::Ctx(n) => tag.class() == TagClass::ContextSpecific && tag.number() == n,
            StepKind::Prv(n) => tag.class() == TagClass::Private && tag.number() == n,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            StepKind::Seq => write!(f, "SEQ"),
            StepKind::Set => write!(f, "SET"),
            StepKind::Int => write!(f, "INT"),
            StepKind::Enum => write!(f, "ENUM"),
            StepKind::OctStr => write!(f, "OCTSTR"),
            StepKind::Bool => write!(f, "BOOL"),
            StepKind::Null => write!(f, "NULL"),
            StepKind::App(n) => write!(f, "APP({})", n),
            StepKind::Ctx(n) => write!(f, "CTX({})", n),
            StepKind::Prv(n) => write!(f, "PRV({})", n),
        }
    }
}

/// One step of a path: a tag kind plus an optional child index
///
/// A step without an index matches the tag at any position among its
/// siblings; `[i]` pins the match to child position `i` of the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathStep {
    kind: StepKind,
    index: Option<usize>,
}

impl PathStep {
    pub fn new(kind: StepKind, index: Option<usize>) -> Self {
        Self { kind, index }
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    /// Whether an element with `tag` at child position `position`
    /// satisfies this step
    pub fn matches(&self, tag: Tag, position: usize) -> bool {
        self.kind.matches(tag) && self.index.is_none_or(|i| i == position)
    }
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{}]", self.kind, i),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// A slash-separated address into a PDU's element tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerPath {
    steps: Vec<PathStep>,
}

impl DerPath {
    pub fn new(steps: Vec<PathStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Whether an accumulated cursor of `(tag, child position)` pairs
    /// matches this path exactly
    pub fn matches(&self, cursor: &[(Tag, usize)]) -> bool {
        self.steps.len() == cursor.len()
            && self
                .steps
                .iter()
                .zip(cursor)
                .all(|(step, &(tag, position))| step.matches(tag, position))
    }
}

impl FromStr for DerPath {
    type Err = LdapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.starts_with('/') {
            return Err(LdapError::Decode(format!(
                "Path must start with '/': {}",
                s
            )));
        }
        let mut steps = Vec::new();
        for part in s.split('/').filter(|p| !p.is_empty()) {
            steps.push(parse_step(part)?);
        }
        if steps.is_empty() {
            return Err(LdapError::Decode(format!("Empty path: {}", s)));
        }
        Ok(Self { steps })
    }
}

fn parse_step(part: &str) -> LdapResult<PathStep> {
    let (name, index) = match part.split_once('[') {
        Some((name, rest)) => {
            let digits = rest.strip_suffix(']').ok_or_else(|| {
                LdapError::Decode(format!("Unterminated index in path step: {}", part))
            })?;
            let index: usize = digits
                .parse()
                .map_err(|_| LdapError::Decode(format!("Invalid index in path step: {}", part)))?;
            (name, Some(index))
        }
        None => (part, None),
    };

    let kind = match name {
        "SEQ" => StepKind::Seq,
        "SET" => StepKind::Set,
        "INT" => StepKind::Int,
        "ENUM" => StepKind::Enum,
        "OCTSTR" => StepKind::OctStr,
        "BOOL" => StepKind::Bool,
        "NULL" => StepKind::Null,
        _ => {
            let (prefix, number) = parse_numbered(name)
                .ok_or_else(|| LdapError::Decode(format!("Unknown path step: {}", name)))?;
            match prefix {
                "APP" => StepKind::App(number),
                "CTX" => StepKind::Ctx(number),
                "PRV" => StepKind::Prv(number),
                _ => return Err(LdapError::Decode(format!("Unknown path step: {}", name))),
            }
        }
    };
    Ok(PathStep::new(kind, index))
}

fn parse_numbered(name: &str) -> Option<(&str, u32)> {
    let (prefix, rest) = name.split_once('(')?;
    let digits = rest.strip_suffix(')')?;
    let number = digits.parse().ok()?;
    Some((prefix, number))
}

impl fmt::Display for DerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.steps {
            write!(f, "/{}", step)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_result_code_path() {
        let path: DerPath = "/SEQ/APP(5)/ENUM[0]".parse().unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.steps()[0], PathStep::new(StepKind::Seq, None));
        assert_eq!(path.steps()[1], PathStep::new(StepKind::App(5), None));
        assert_eq!(path.steps()[2], PathStep::new(StepKind::Enum, Some(0)));
    }

    #[test]
    fn test_display_round_trip() {
        for s in [
            "/SEQ/APP(5)/ENUM[0]",
            "/SEQ/APP(5)/OCTSTR[1]",
            "/SEQ/APP(5)/CTX(3)/OCTSTR",
            "/SEQ/CTX(0)/SEQ/OCTSTR[0]",
        ] {
            let path: DerPath = s.parse().unwrap();
            assert_eq!(path.to_string(), s);
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!("SEQ/ENUM".parse::<DerPath>().is_err());
        assert!("/".parse::<DerPath>().is_err());
        assert!("/BOGUS".parse::<DerPath>().is_err());
        assert!("/APP(x)".parse::<DerPath>().is_err());
        assert!("/SEQ/ENUM[".parse::<DerPath>().is_err());
    }

    #[test]
    fn test_cursor_matching() {
        let path: DerPath = "/SEQ/APP(5)/OCTSTR[1]".parse().unwrap();
        let seq = Tag::SEQUENCE;
        let app5 = Tag::application(true, 5);
        let octstr = Tag::OCTET_STRING;

        assert!(path.matches(&[(seq, 0), (app5, 1), (octstr, 1)]));
        // Wrong child position
        assert!(!path.matches(&[(seq, 0), (app5, 1), (octstr, 2)]));
        // Prefix alone does not match
        assert!(!path.matches(&[(seq, 0), (app5, 1)]));
    }

    #[test]
    fn test_unindexed_step_matches_any_position() {
        let path: DerPath = "/SEQ/APP(5)/CTX(3)/OCTSTR".parse().unwrap();
        let cursor = |i| {
            [
                (Tag::SEQUENCE, 0),
                (Tag::application(true, 5), 1),
                (Tag::context(true, 3), 3),
                (Tag::OCTET_STRING, i),
            ]
        };
        assert!(path.matches(&cursor(0)));
        assert!(path.matches(&cursor(5)));
    }
}

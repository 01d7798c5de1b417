//! Parses the constraint surface syntax

use std::collections::BTreeSet;
use std::fmt;

use crate::requirement::Requirement;
use crate::version::{Component, InvalidVersion, Version, VersionSet};

/// A malformed version, version set or requirement string.
#[derive(Debug, thiserror::Error)]
#[error("failed to parse `{input}`")]
#[non_exhaustive]
pub struct ParseError {
    /// The offending input.
    pub input: String,
    /// What went wrong.
    pub source: ParseErrorKind,
}

/// The ways parsing can fail.
#[derive(Debug, thiserror::Error)]
pub enum ParseErrorKind {
    #[error(transparent)]
    /// A version embedded in the input did not parse.
    InvalidVersion(#[from] InvalidVersion),
    /// A character outside the grammar.
    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),
    /// Input ended where more was required.
    #[error("unexpected end of input")]
    UnexpectedEnd,
    /// A token that cannot appear at this position.
    #[error("unexpected `{0}`")]
    UnexpectedToken(String),
    /// Leftover tokens after a complete expression.
    #[error("trailing `{0}`")]
    TrailingInput(String),
}

impl From<InvalidVersion> for ParseError {
    fn from(source: InvalidVersion) -> Self {
        Self {
            input: source.input.clone(),
            source: ParseErrorKind::InvalidVersion(source),
        }
    }
}

//
// Version parsing
//
// `-` and transitions between digits and letters are component boundaries,
// `.` separates items within a component.

/// Parses a version string, accepting an optional `v`/`ver`/`version`
/// prefix in any case.
pub fn parse_version(input: &str) -> Result<Version, InvalidVersion> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(InvalidVersion {
            input: input.to_string(),
        });
    }

    let stripped = strip_version_prefix(trimmed);
    if let Some(components) = scan_components(stripped) {
        return Ok(Version::new(components, trimmed.to_string()));
    }
    // The prefix may turn out to be the version itself, e.g. `v` or `ver-`
    if stripped != trimmed {
        if let Some(components) = scan_components(trimmed) {
            return Ok(Version::new(components, trimmed.to_string()));
        }
    }

    Err(InvalidVersion {
        input: input.to_string(),
    })
}

fn strip_version_prefix(input: &str) -> &str {
    for prefix in ["version", "ver", "v"] {
        let n = prefix.len();
        if input.len() > n && input.as_bytes()[..n].eq_ignore_ascii_case(prefix.as_bytes()) {
            return &input[n..];
        }
    }
    input
}

fn scan_components(input: &str) -> Option<Vec<Component>> {
    let mut components = Vec::new();
    let mut run = String::new();
    let mut run_is_numeric = false;

    for c in input.chars() {
        match c {
            '-' => flush_run(&mut components, &mut run, run_is_numeric)?,
            // Leading separators carry no information
            '.' if run.is_empty() => {}
            '.' => run.push('.'),
            c if c.is_ascii_digit() => {
                if !run.is_empty() && !run_is_numeric {
                    flush_run(&mut components, &mut run, run_is_numeric)?;
                }
                run_is_numeric = true;
                run.push(c);
            }
            c if c.is_ascii_alphabetic() => {
                if !run.is_empty() && run_is_numeric {
                    flush_run(&mut components, &mut run, run_is_numeric)?;
                }
                run_is_numeric = false;
                run.push(c);
            }
            _ => return None,
        }
    }
    flush_run(&mut components, &mut run, run_is_numeric)?;

    if components.is_empty() {
        return None;
    }
    Some(components)
}

fn flush_run(components: &mut Vec<Component>, run: &mut String, numeric: bool) -> Option<()> {
    if run.is_empty() {
        return Some(());
    }
    if numeric {
        let mut items = Vec::new();
        for part in run.split('.') {
            if part.is_empty() {
                continue;
            }
            items.push(part.parse::<u64>().ok()?);
        }
        components.push(Component::Numeric(items));
    } else {
        let token = run.trim_matches('.');
        if !token.is_empty() {
            components.push(Component::Alpha(token.to_string()));
        }
    }
    run.clear();
    Some(())
}

//
// Version set parsing
//

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Eq,
    NotEq,
    Gt,
    Lt,
    GtEq,
    LtEq,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Not,
    And,
    Or,
    Op(Op),
    Word(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Not => write!(f, "!"),
            Token::And => write!(f, "&"),
            Token::Or => write!(f, "|"),
            Token::Op(Op::Eq) => write!(f, "=="),
            Token::Op(Op::NotEq) => write!(f, "!="),
            Token::Op(Op::Gt) => write!(f, ">"),
            Token::Op(Op::Lt) => write!(f, "<"),
            Token::Op(Op::GtEq) => write!(f, ">="),
            Token::Op(Op::LtEq) => write!(f, "<="),
            Token::Word(word) => write!(f, "{word}"),
        }
    }
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+' | '_')
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseErrorKind> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '&' | ',' => {
                chars.next();
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                tokens.push(Token::Or);
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(Op::NotEq));
                } else {
                    tokens.push(Token::Not);
                }
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(Op::Eq));
                } else {
                    return Err(ParseErrorKind::UnexpectedChar('='));
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(Op::GtEq));
                } else {
                    tokens.push(Token::Op(Op::Gt));
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Op(Op::LtEq));
                } else {
                    tokens.push(Token::Op(Op::Lt));
                }
            }
            c if is_word_char(c) => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(match word.as_str() {
                    "and" => Token::And,
                    "or" => Token::Or,
                    _ => Token::Word(word),
                });
            }
            c => return Err(ParseErrorKind::UnexpectedChar(c)),
        }
    }

    Ok(tokens)
}

struct Tokens {
    items: Vec<Token>,
    pos: usize,
}

impl Tokens {
    fn new(items: Vec<Token>) -> Self {
        Self { items, pos: 0 }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.items.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.items.get(self.pos) == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

// Precedence: `!` binds tighter than `&`, which binds tighter than `|`
fn parse_or_expr(tokens: &mut Tokens) -> Result<VersionSet, ParseErrorKind> {
    let mut sets = vec![parse_and_expr(tokens)?];
    while tokens.eat(&Token::Or) {
        sets.push(parse_and_expr(tokens)?);
    }
    Ok(VersionSet::any_of(sets))
}

fn parse_and_expr(tokens: &mut Tokens) -> Result<VersionSet, ParseErrorKind> {
    let mut sets = vec![parse_not_expr(tokens)?];
    while tokens.eat(&Token::And) {
        sets.push(parse_not_expr(tokens)?);
    }
    Ok(VersionSet::all(sets))
}

fn parse_not_expr(tokens: &mut Tokens) -> Result<VersionSet, ParseErrorKind> {
    if tokens.eat(&Token::Not) {
        Ok(parse_not_expr(tokens)?.complement())
    } else {
        parse_primary(tokens)
    }
}

fn parse_primary(tokens: &mut Tokens) -> Result<VersionSet, ParseErrorKind> {
    match tokens.next() {
        Some(Token::LParen) => {
            let set = parse_or_expr(tokens)?;
            match tokens.next() {
                Some(Token::RParen) => Ok(set),
                Some(token) => Err(ParseErrorKind::UnexpectedToken(token.to_string())),
                None => Err(ParseErrorKind::UnexpectedEnd),
            }
        }
        Some(Token::Op(op)) => {
            let version = match tokens.next() {
                Some(Token::Word(word)) => parse_version(&word)?,
                Some(token) => return Err(ParseErrorKind::UnexpectedToken(token.to_string())),
                None => return Err(ParseErrorKind::UnexpectedEnd),
            };
            Ok(match op {
                Op::Eq => VersionSet::Eq(version),
                Op::NotEq => VersionSet::NotEq(version),
                Op::Gt => VersionSet::Gt(version),
                Op::Lt => VersionSet::Lt(version),
                Op::GtEq => VersionSet::GtEq(version),
                Op::LtEq => VersionSet::LtEq(version),
            })
        }
        // A bare version means equality
        Some(Token::Word(word)) => Ok(VersionSet::Eq(parse_version(&word)?)),
        Some(token) => Err(ParseErrorKind::UnexpectedToken(token.to_string())),
        None => Err(ParseErrorKind::UnexpectedEnd),
    }
}

/// Parses a version set expression, e.g. `>=1.0 & <2.0 | ==3.0`.
pub fn parse_version_set(input: &str) -> Result<VersionSet, ParseError> {
    parse_version_set_inner(input).map_err(|source| ParseError {
        input: input.to_string(),
        source,
    })
}

fn parse_version_set_inner(input: &str) -> Result<VersionSet, ParseErrorKind> {
    let mut tokens = Tokens::new(tokenize(input)?);
    let set = parse_or_expr(&mut tokens)?;
    match tokens.next() {
        None => Ok(set),
        Some(token) => Err(ParseErrorKind::TrailingInput(token.to_string())),
    }
}

//
// Requirement parsing
//

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')
}

/// Parses a requirement: `name`, `name <spec>` or `name[flag,...] <spec>`.
/// A missing spec means any version is allowed.
pub fn parse_requirement(input: &str) -> Result<Requirement, ParseError> {
    parse_requirement_inner(input).map_err(|source| ParseError {
        input: input.to_string(),
        source,
    })
}

fn parse_requirement_inner(input: &str) -> Result<Requirement, ParseErrorKind> {
    let trimmed = input.trim();
    let name_end = trimmed
        .char_indices()
        .find(|(_, c)| !is_name_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    if name_end == 0 {
        return Err(match trimmed.chars().next() {
            Some(c) => ParseErrorKind::UnexpectedChar(c),
            None => ParseErrorKind::UnexpectedEnd,
        });
    }
    let package_name = &trimmed[..name_end];

    let mut flags = BTreeSet::new();
    let mut rest = trimmed[name_end..].trim_start();
    if let Some(inner) = rest.strip_prefix('[') {
        let Some(end) = inner.find(']') else {
            return Err(ParseErrorKind::UnexpectedEnd);
        };
        for flag in inner[..end].split(',') {
            let flag = flag.trim();
            if flag.is_empty() {
                return Err(ParseErrorKind::UnexpectedChar(']'));
            }
            flags.insert(flag.to_string());
        }
        rest = &inner[end + 1..];
    }

    let spec = rest.trim();
    let version_set = if spec.is_empty() {
        VersionSet::Any
    } else {
        parse_version_set_inner(spec)?
    };

    Ok(Requirement::with_flags(package_name, version_set, flags))
}

//
// Maven range parsing
//

/// Parses a Maven-style range list: bare versions and
/// `[lo,hi]`/`(lo,hi]`-style ranges separated by commas, combined with
/// `or`. An empty range endpoint means unbounded on that side.
pub fn parse_maven_version_set(input: &str) -> Result<VersionSet, ParseError> {
    parse_maven_inner(input).map_err(|source| ParseError {
        input: input.to_string(),
        source,
    })
}

fn parse_maven_inner(input: &str) -> Result<VersionSet, ParseErrorKind> {
    let mut sets = Vec::new();
    let mut rest = input.trim();
    if rest.is_empty() {
        return Err(ParseErrorKind::UnexpectedEnd);
    }

    loop {
        rest = rest.trim_start();
        let remainder = if let Some(body) = rest.strip_prefix(['[', '(']) {
            let inclusive_min = rest.starts_with('[');
            let Some(end) = body.find([']', ')']) else {
                return Err(ParseErrorKind::UnexpectedEnd);
            };
            let inclusive_max = body[end..].starts_with(']');
            let Some((min, max)) = body[..end].split_once(',') else {
                return Err(ParseErrorKind::UnexpectedToken(body[..end].to_string()));
            };

            let mut bounds = Vec::new();
            let min = min.trim();
            if !min.is_empty() {
                let version = parse_version(min)?;
                bounds.push(if inclusive_min {
                    VersionSet::GtEq(version)
                } else {
                    VersionSet::Gt(version)
                });
            }
            let max = max.trim();
            if !max.is_empty() {
                let version = parse_version(max)?;
                bounds.push(if inclusive_max {
                    VersionSet::LtEq(version)
                } else {
                    VersionSet::Lt(version)
                });
            }
            sets.push(VersionSet::all(bounds));
            &body[end + 1..]
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            sets.push(VersionSet::Eq(parse_version(rest[..end].trim())?));
            &rest[end..]
        };

        rest = remainder.trim_start();
        if rest.is_empty() {
            break;
        }
        let Some(after_comma) = rest.strip_prefix(',') else {
            return Err(ParseErrorKind::UnexpectedChar(
                rest.chars().next().expect("non-empty input"),
            ));
        };
        rest = after_comma;
        if rest.trim().is_empty() {
            return Err(ParseErrorKind::UnexpectedEnd);
        }
    }

    Ok(VersionSet::any_of(sets))
}

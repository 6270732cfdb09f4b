//! Minimal BibTeX reader.
//!
//! Reads Google Scholar exports and existing `.bib` files for the append
//! audit. Handles braced, quoted and bare values, `#` concatenation and
//! nested braces. `@string`, `@preamble` and `@comment` blocks are skipped.
//! A malformed entry is counted and skipped; parsing resumes at the next `@`.

use nom::{
    branch::alt,
    bytes::complete::take_while1,
    character::complete::{char, multispace0},
    combinator::map,
    IResult,
};
use once_cell::sync::Lazy;
use regex::Regex;

static KEY_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*@\w+\s*\{\s*([^,\s]+)\s*,").expect("valid regex"));

/// One entry as it appears in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEntry {
    /// Lowercased entry type, e.g. `article`
    pub entry_type: String,
    pub key: String,
    /// Field names are lowercased; values keep their inner braces.
    pub fields: Vec<(String, String)>,
}

impl ParsedEntry {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedBibliography {
    pub entries: Vec<ParsedEntry>,
    /// Entries that could not be parsed
    pub skipped: usize,
}

/// Parse every entry in `input`.
pub fn parse_bibliography(input: &str) -> ParsedBibliography {
    let mut result = ParsedBibliography::default();
    let mut remaining = input;

    while let Some(at) = remaining.find('@') {
        remaining = &remaining[at..];
        match entry(remaining) {
            Ok((rest, Some(parsed))) => {
                result.entries.push(parsed);
                remaining = rest;
            }
            Ok((rest, None)) => remaining = rest,
            Err(_) => {
                result.skipped += 1;
                remaining = &remaining[1..];
            }
        }
    }

    result
}

/// Citation keys declared in a `.bib` file, in file order.
pub fn existing_keys(input: &str) -> Vec<String> {
    KEY_LINE_RE
        .captures_iter(input)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// `@type{key, fields}`; `None` for blocks that carry no entry.
fn entry(input: &str) -> IResult<&str, Option<ParsedEntry>> {
    let (rest, _) = char('@')(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, entry_type) = take_while1(|c: char| c.is_ascii_alphanumeric())(rest)?;
    let entry_type = entry_type.to_lowercase();
    let (rest, _) = multispace0(rest)?;

    if matches!(entry_type.as_str(), "string" | "preamble" | "comment") {
        let (rest, _) = braced(rest)?;
        return Ok((rest, None));
    }

    let (rest, _) = char('{')(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, key) =
        take_while1(|c: char| c.is_ascii_alphanumeric() || "_-:./+".contains(c))(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char(',')(rest)?;
    let (rest, fields) = fields(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char('}')(rest)?;

    Ok((
        rest,
        Some(ParsedEntry {
            entry_type,
            key: key.to_string(),
            fields,
        }),
    ))
}

fn fields(input: &str) -> IResult<&str, Vec<(String, String)>> {
    let mut fields = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, _) = multispace0(remaining)?;
        if rest.starts_with('}') {
            return Ok((rest, fields));
        }
        let (rest, pair) = field(rest)?;
        fields.push(pair);
        let (rest, _) = multispace0(rest)?;
        remaining = rest.strip_prefix(',').unwrap_or(rest);
    }
}

fn field(input: &str) -> IResult<&str, (String, String)> {
    let (rest, name) =
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-')(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char('=')(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, value) = value(rest)?;
    Ok((rest, (name.to_lowercase(), value)))
}

/// A value, possibly several parts joined by `#`.
fn value(input: &str) -> IResult<&str, String> {
    let mut joined = String::new();
    let mut remaining = input;

    loop {
        let (rest, part) = alt((
            map(braced, |s: &str| s[1..s.len() - 1].to_string()),
            quoted,
            map(
                take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-'),
                str::to_string,
            ),
        ))(remaining)?;
        joined.push_str(&part);

        let (rest, _) = multispace0(rest)?;
        match rest.strip_prefix('#') {
            Some(after) => {
                let (after, _) = multispace0(after)?;
                remaining = after;
            }
            None => return Ok((rest, joined)),
        }
    }
}

/// `"..."`, allowing braces (and quotes inside braces) in the body.
fn quoted(input: &str) -> IResult<&str, String> {
    let (body, _) = char('"')(input)?;
    let mut depth = 0usize;
    for (idx, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '"' if depth == 0 => return Ok((&body[idx + 1..], body[..idx].to_string())),
            _ => {}
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Char,
    )))
}

/// `{...}` with nesting; returns the slice including the outer braces.
fn braced(input: &str) -> IResult<&str, &str> {
    if !input.starts_with('{') {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )));
    }
    let mut depth = 0usize;
    for (idx, c) in input.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok((&input[idx + 1..], &input[..=idx]));
                }
            }
            _ => {}
        }
    }
    Err(nom::Err::Error(nom::error::Error::new(
        input,
        nom::error::ErrorKind::TakeUntil,
    )))
}

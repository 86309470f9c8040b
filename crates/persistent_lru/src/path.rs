//! `records_path` lookup: `data.ops`, `batches[1].ops`, `["odd.key"].ops`.

use std::iter::Peekable;
use std::str::Chars;

use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathError {
    Empty,
    EmptySegment,
    UnclosedBracket,
    BadIndex,
    BadEscape,
    Trailing,
}

impl PathError {
    pub fn message(&self) -> &'static str {
        match self {
            PathError::Empty => "path is empty",
            PathError::EmptySegment => "path segment is empty",
            PathError::UnclosedBracket => "path bracket is not closed",
            PathError::BadIndex => "path index is invalid",
            PathError::BadEscape => "path escape is invalid",
            PathError::Trailing => "path has trailing characters",
        }
    }
}

pub fn parse_path(path: &str) -> Result<Vec<Segment>, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }

    let mut chars = path.chars().peekable();
    let mut segments = Vec::new();
    let mut expect_field = true;

    while let Some(&ch) = chars.peek() {
        match ch {
            '[' => {
                chars.next();
                segments.push(bracket_segment(&mut chars)?);
                expect_field = false;
            }
            '.' => {
                chars.next();
                if expect_field || chars.peek().is_none() {
                    return Err(PathError::EmptySegment);
                }
                expect_field = true;
            }
            _ => {
                if !expect_field {
                    return Err(PathError::Trailing);
                }
                let mut field = String::new();
                while let Some(&next) = chars.peek() {
                    if next == '.' || next == '[' {
                        break;
                    }
                    field.push(next);
                    chars.next();
                }
                segments.push(Segment::Field(field));
                expect_field = false;
            }
        }
    }

    if expect_field && segments.is_empty() {
        return Err(PathError::EmptySegment);
    }
    Ok(segments)
}

fn bracket_segment(chars: &mut Peekable<Chars<'_>>) -> Result<Segment, PathError> {
    let segment = match chars.peek().copied() {
        Some(quote @ ('"' | '\'')) => {
            chars.next();
            let mut field = String::new();
            loop {
                match chars.next() {
                    Some('\\') => match chars.next() {
                        Some(escaped) if escaped == '\\' || escaped == quote => field.push(escaped),
                        _ => return Err(PathError::BadEscape),
                    },
                    Some(ch) if ch == quote => break,
                    Some(ch) => field.push(ch),
                    None => return Err(PathError::UnclosedBracket),
                }
            }
            if field.is_empty() {
                return Err(PathError::EmptySegment);
            }
            Segment::Field(field)
        }
        Some(ch) if ch.is_ascii_digit() => {
            let mut digits = String::new();
            while let Some(&next) = chars.peek() {
                if !next.is_ascii_digit() {
                    break;
                }
                digits.push(next);
                chars.next();
            }
            let index = digits.parse::<usize>().map_err(|_| PathError::BadIndex)?;
            Segment::Index(index)
        }
        Some(_) => return Err(PathError::BadIndex),
        None => return Err(PathError::UnclosedBracket),
    };

    match chars.next() {
        Some(']') => Ok(segment),
        _ => Err(PathError::UnclosedBracket),
    }
}

pub fn resolve<'a>(value: &'a JsonValue, segments: &[Segment]) -> Option<&'a JsonValue> {
    segments
        .iter()
        .try_fold(value, |current, segment| match (segment, current) {
            (Segment::Field(name), JsonValue::Object(map)) => map.get(name),
            (Segment::Index(index), JsonValue::Array(items)) => items.get(*index),
            _ => None,
        })
}

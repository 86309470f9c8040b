//! Maps dotted script paths (`ops[3].value`) to YAML line/column positions.
//!
//! This is a line scanner, not a YAML parser. It understands block mappings,
//! block sequences and single-line flow mappings such as
//! `- { op: put, key: a }`, which covers the shapes replay scripts use.

use std::collections::HashMap;

use crate::error::YamlLocation;

#[derive(Debug, Default)]
pub struct YamlLocator {
    positions: HashMap<String, YamlLocation>,
}

struct Frame {
    indent: usize,
    path: String,
    /// Key with no inline value; a `-` at the same indent still belongs to it.
    open: bool,
}

impl YamlLocator {
    pub fn from_source(source: &str) -> Self {
        let mut locator = YamlLocator::default();
        let mut frames: Vec<Frame> = Vec::new();
        let mut next_index: HashMap<String, usize> = HashMap::new();

        for (line_index, raw) in source.lines().enumerate() {
            let line = line_index + 1;
            let body = raw.trim_start_matches(' ');
            if body.trim().is_empty() || body.starts_with('#') {
                continue;
            }
            let indent = raw.len() - body.len();
            let is_item = body.starts_with('-');
            while frames.last().is_some_and(|frame| {
                frame.indent > indent || (frame.indent == indent && !(is_item && frame.open))
            }) {
                frames.pop();
            }
            let parent = frames
                .last()
                .map(|frame| frame.path.clone())
                .unwrap_or_default();

            if let Some(after_dash) = body.strip_prefix('-') {
                if parent.is_empty() {
                    continue;
                }
                let counter = next_index.entry(parent.clone()).or_insert(0);
                let item = format!("{}[{}]", parent, counter);
                *counter += 1;
                locator.record(&item, line, indent + 1);
                frames.push(Frame {
                    indent,
                    path: item.clone(),
                    open: false,
                });

                let rest = after_dash.trim_start();
                let column = indent + 1 + (after_dash.len() - rest.len()) + 1;
                locator.scan_entry(rest, column, line, &item, indent + 1, &mut frames);
                continue;
            }

            locator.scan_entry(body, indent + 1, line, &parent, indent, &mut frames);
        }

        locator
    }

    pub fn location_for(&self, path: &str) -> Option<YamlLocation> {
        self.positions.get(path).cloned()
    }

    /// Location of `path`, or of its closest located ancestor.
    pub fn nearest(&self, path: &str) -> Option<YamlLocation> {
        let mut current = path;
        loop {
            if let Some(location) = self.location_for(current) {
                return Some(location);
            }
            let cut = current.rfind(['.', '['])?;
            current = &current[..cut];
        }
    }

    fn scan_entry(
        &mut self,
        text: &str,
        column: usize,
        line: usize,
        parent: &str,
        frame_indent: usize,
        frames: &mut Vec<Frame>,
    ) {
        if text.starts_with('{') {
            self.scan_flow(text, column, line, parent);
            return;
        }
        let Some((key, value)) = split_key(text) else {
            return;
        };
        let path = join(parent, key);
        self.record(&path, line, column);
        let value = value.trim_start();
        if value.starts_with('{') {
            let offset = text.len() - value.len();
            self.scan_flow(value, column + offset, line, &path);
        } else if value.trim_end().is_empty() {
            frames.push(Frame {
                indent: frame_indent,
                path,
                open: true,
            });
        } else if value.starts_with('|') || value.starts_with('>') {
            frames.push(Frame {
                indent: frame_indent,
                path,
                open: false,
            });
        }
    }

    fn scan_flow(&mut self, text: &str, column: usize, line: usize, parent: &str) {
        let mut depth = 0usize;
        let mut quote: Option<char> = None;
        let mut key_start: Option<usize> = None;

        for (offset, ch) in text.char_indices() {
            if let Some(open) = quote {
                if ch == open {
                    quote = None;
                }
                continue;
            }
            match ch {
                '"' | '\'' => quote = Some(ch),
                '{' | '[' => {
                    depth += 1;
                    if depth == 1 {
                        key_start = Some(offset + 1);
                    }
                }
                '}' | ']' => depth = depth.saturating_sub(1),
                ',' if depth == 1 => key_start = Some(offset + 1),
                ':' if depth == 1 => {
                    if let Some(start) = key_start.take() {
                        let raw_key = &text[start..offset];
                        let key = raw_key.trim();
                        if !key.is_empty() {
                            let lead = raw_key.len() - raw_key.trim_start().len();
                            self.record(&join(parent, key), line, column + start + lead);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    fn record(&mut self, path: &str, line: usize, column: usize) {
        self.positions
            .entry(path.to_string())
            .or_insert(YamlLocation { line, column });
    }
}

fn join(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

/// Splits `key: value` at the first colon outside quotes.
fn split_key(text: &str) -> Option<(&str, &str)> {
    let mut quote: Option<char> = None;
    for (index, ch) in text.char_indices() {
        match (quote, ch) {
            (Some(open), _) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, ':') => {
                let key = text[..index].trim();
                if key.is_empty() {
                    return None;
                }
                let key = key.trim_matches(|c| c == '"' || c == '\'');
                return Some((key, &text[index + 1..]));
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = "version: 1
cache:
  capacity: 2
ops:
  - op: put
    key: a
    value: 1
  - { op: get, key: a, expect: 1 }
";

    #[test]
    fn locates_block_keys() {
        let locator = YamlLocator::from_source(SCRIPT);
        assert_eq!(
            locator.location_for("cache.capacity"),
            Some(YamlLocation { line: 3, column: 3 })
        );
        assert_eq!(
            locator.location_for("ops[0].op"),
            Some(YamlLocation { line: 5, column: 5 })
        );
        assert_eq!(
            locator.location_for("ops[0].value"),
            Some(YamlLocation { line: 7, column: 5 })
        );
    }

    #[test]
    fn locates_flow_mapping_keys() {
        let locator = YamlLocator::from_source(SCRIPT);
        assert_eq!(
            locator.location_for("ops[1]"),
            Some(YamlLocation { line: 8, column: 3 })
        );
        assert_eq!(
            locator.location_for("ops[1].expect"),
            Some(YamlLocation { line: 8, column: 24 })
        );
    }

    #[test]
    fn nearest_falls_back_to_parent() {
        let locator = YamlLocator::from_source(SCRIPT);
        assert_eq!(
            locator.nearest("ops[1].value"),
            Some(YamlLocation { line: 8, column: 3 })
        );
        assert_eq!(locator.nearest("nothing.here"), None);
    }

    #[test]
    fn locates_items_at_parent_indent() {
        let source = "version: 1
ops:
- op: put
  key: [1]
  value: 1
- { op: get, key: a }
cache:
  capacity: 2
";
        let locator = YamlLocator::from_source(source);
        assert_eq!(
            locator.location_for("ops[0]"),
            Some(YamlLocation { line: 3, column: 1 })
        );
        assert_eq!(
            locator.location_for("ops[0].key"),
            Some(YamlLocation { line: 4, column: 3 })
        );
        assert_eq!(
            locator.location_for("ops[1].key"),
            Some(YamlLocation { line: 6, column: 14 })
        );
        assert_eq!(
            locator.location_for("cache.capacity"),
            Some(YamlLocation { line: 8, column: 3 })
        );
        assert_eq!(locator.location_for("key"), None);
    }
}

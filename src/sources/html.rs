//! Tolerant HTML table scanning.
//!
//! Reads `<tr>`/`<td>` blocks out of a page without a full DOM. Tag
//! detection is case-insensitive. Tables and cells are located by attribute
//! value (cells also by column position). Cell text is tag-stripped,
//! entity-decoded and whitespace-collapsed. Header rows made only of `<th>`
//! cells are ignored.

use crate::types::{CellSelector, ExtractionError, RawRow, RowResult, SourceDescriptor};

/// One `<td>` as found in the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Raw attribute text between `<td` and `>`.
    pub attrs: String,
    /// Normalised visible text.
    pub text: String,
}

impl Cell {
    /// Whether any attribute value (or any class token) equals `value`.
    pub fn has_attribute_value(&self, value: &str) -> bool {
        attrs_match(&self.attrs, value)
    }
}

/// Turn every data row of the source's table into a `RawRow` or an
/// extraction error.
pub fn extract_rows(html: &str, source: &SourceDescriptor) -> Vec<RowResult> {
    table_rows(html, source.table_attribute.as_deref())
        .into_iter()
        .enumerate()
        .map(|(i, cells)| read_row(i, &cells, source))
        .collect()
}

fn read_row(index: usize, cells: &[Cell], source: &SourceDescriptor) -> RowResult {
    let pick = |selector: &CellSelector, what: &str| -> Result<String, ExtractionError> {
        select(cells, selector)
            .map(|c| c.text.clone())
            .ok_or_else(|| ExtractionError {
                row: index,
                reason: format!("missing {what} cell ({selector})"),
            })
    };

    Ok(RawRow {
        symbol: pick(&source.symbol_attribute, "symbol")?,
        long_rate: pick(&source.long_attribute, "long")?,
        short_rate: pick(&source.short_attribute, "short")?,
    })
}

fn select<'c>(cells: &'c [Cell], selector: &CellSelector) -> Option<&'c Cell> {
    match selector {
        CellSelector::Column(i) => cells.get(*i),
        CellSelector::Attribute(value) => cells.iter().find(|c| c.has_attribute_value(value)),
    }
}

// ---------------------------------------------------------------------------
// Scanning
// ---------------------------------------------------------------------------

/// All rows with at least one `<td>`, in document order.
///
/// With `table` set only `<table>` elements whose attributes carry that
/// value or class token are read, otherwise the whole page is. Inside each
/// table, rows in `<tbody>` blocks are preferred.
pub fn table_rows(html: &str, table: Option<&str>) -> Vec<Vec<Cell>> {
    let lower = html.to_ascii_lowercase();

    let tables = match table {
        Some(value) => table_regions(&lower, html, value),
        None => vec![(0, lower.len())],
    };
    let regions = tables
        .into_iter()
        .flat_map(|(start, end)| body_regions(&lower, start, end));

    let mut rows = Vec::new();
    for (start, end) in regions {
        for (row_start, row_end) in blocks(&lower, "tr", start, end) {
            let cells: Vec<Cell> = blocks(&lower, "td", row_start, row_end)
                .into_iter()
                .filter_map(|(cs, ce)| {
                    let open_end = cs + lower[cs..ce].find('>')?;
                    Some(Cell {
                        attrs: html[cs + 3..open_end].trim().to_string(),
                        text: clean_text(&html[open_end + 1..ce]),
                    })
                })
                .collect();
            if !cells.is_empty() {
                rows.push(cells);
            }
        }
    }
    rows
}

/// Content spans of every `<table>` whose attributes match `value`.
/// Attribute text is read from `html` so values keep their case.
fn table_regions(lower: &str, html: &str, value: &str) -> Vec<(usize, usize)> {
    let mut regions = Vec::new();
    let mut pos = 0;

    while let Some(open) = find_tag(lower, "table", pos) {
        let Some(open_end) = lower[open..].find('>').map(|off| open + off) else {
            break;
        };
        let end = lower[open_end..]
            .find("</table")
            .map(|off| open_end + off)
            .unwrap_or(lower.len());
        if attrs_match(&html[open + "<table".len()..open_end], value) {
            regions.push((open_end + 1, end));
            pos = end;
        } else {
            pos = open_end + 1;
        }
    }
    regions
}

/// `<tbody>` spans between `start` and `end`, or the whole span when there
/// are none.
fn body_regions(lower: &str, start: usize, end: usize) -> Vec<(usize, usize)> {
    let mut regions = Vec::new();
    let mut pos = start;

    while let Some(open) = find_tag(lower, "tbody", pos).filter(|&o| o < end) {
        let close = lower[open..end]
            .find("</tbody")
            .map(|off| open + off)
            .unwrap_or(end);
        regions.push((open, close));
        pos = close;
    }
    if regions.is_empty() {
        regions.push((start, end));
    }
    regions
}

/// Spans `[open, content_end)` of every `<tag …>` block between `from` and
/// `to`. A block ends at its closing tag, the next opening tag of the same
/// name, or `to`, whichever comes first (browsers tolerate unclosed cells).
fn blocks(lower: &str, tag: &str, from: usize, to: usize) -> Vec<(usize, usize)> {
    let close = format!("</{tag}");
    let mut spans = Vec::new();
    let mut pos = from;

    while let Some(open) = find_tag(lower, tag, pos).filter(|&o| o < to) {
        let body = open + tag.len() + 1;
        let next_open = find_tag(lower, tag, body).filter(|&o| o < to).unwrap_or(to);
        let closing = lower[body..to].find(&close).map(|off| body + off).unwrap_or(to);
        let end = closing.min(next_open);
        spans.push((open, end));
        pos = end.max(body);
    }
    spans
}

/// Position of the next `<tag` that is a whole tag name (`<tr` but not
/// `<track`).
fn find_tag(lower: &str, tag: &str, from: usize) -> Option<usize> {
    let needle = format!("<{tag}");
    let mut pos = from;
    while let Some(off) = lower.get(pos..)?.find(&needle) {
        let at = pos + off;
        match lower.as_bytes().get(at + needle.len()) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => return Some(at),
            None => return None,
            _ => pos = at + needle.len(),
        }
    }
    None
}

/// Whether any attribute value (or any class token) equals `value`.
fn attrs_match(attrs: &str, value: &str) -> bool {
    attribute_values(attrs).any(|v| v == value || v.split_whitespace().any(|token| token == value))
}

/// Quoted attribute values in an attribute string.
fn attribute_values(attrs: &str) -> impl Iterator<Item = &str> {
    let mut rest = attrs;
    std::iter::from_fn(move || loop {
        let eq = rest.find('=')?;
        let after = rest[eq + 1..].trim_start();
        let quote = after.chars().next()?;
        if quote != '"' && quote != '\'' {
            rest = after;
            continue;
        }
        let value_start = &after[1..];
        let close = value_start.find(quote)?;
        let value = &value_start[..close];
        rest = &value_start[close + 1..];
        return Some(value);
    })
}

// ---------------------------------------------------------------------------
// Text normalisation
// ---------------------------------------------------------------------------

/// Strip tags, decode entities, collapse whitespace.
pub fn clean_text(fragment: &str) -> String {
    let mut stripped = String::with_capacity(fragment.len());
    let mut in_tag = false;
    for c in fragment.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                stripped.push(' ');
            }
            _ if !in_tag => stripped.push(c),
            _ => {}
        }
    }

    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|c| (c, semi)));
        match decoded {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        "minus" => Some('−'),
        _ => {
            let num = name.strip_prefix('#')?;
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => num.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

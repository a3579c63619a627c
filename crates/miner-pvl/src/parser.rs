use miner_types::{Keyword, MinerError};
use winnow::ascii::multispace0;
use winnow::combinator::{alt, opt};
use winnow::error::{ContextError, ErrMode, StrContext, StrContextValue};
use winnow::token::{take_till, take_while};
use winnow::{ModalResult, Parser};

use crate::ast::{PvlGroup, PvlObject};

fn make_cut_error(desc: &'static str) -> ErrMode<ContextError<StrContext>> {
    let mut e = ContextError::new();
    e.push(StrContext::Expected(StrContextValue::Description(desc)));
    ErrMode::Cut(e)
}

/// Blank out `#` line comments and `/* */` block comments.
///
/// Comment characters are replaced by spaces (newlines are kept) so byte
/// offsets in the stripped text match the original.
pub(crate) fn strip_comments(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                out.push(' ');
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    out.extend(std::iter::repeat(' ').take(next.len_utf8()));
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str("  ");
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if next == '\n' {
                        out.push('\n');
                    } else {
                        out.extend(std::iter::repeat(' ').take(next.len_utf8()));
                    }
                    if prev == '*' && next == '/' {
                        break;
                    }
                    prev = next;
                }
            }
            '"' | '\'' => {
                // quoted text is copied verbatim
                out.push(c);
                for next in chars.by_ref() {
                    out.push(next);
                    if next == c {
                        break;
                    }
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Whitespace consumer (including newlines).
fn ws<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    multispace0.parse_next(input)
}

/// Spaces and tabs only.
fn hspace<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    take_while(0.., |c: char| c == ' ' || c == '\t').parse_next(input)
}

/// Keyword or container name: [A-Za-z_^][A-Za-z0-9_:.^]*
fn keyword_name<'i>(input: &mut &'i str) -> ModalResult<&'i str> {
    (
        take_while(1, |c: char| c.is_ascii_alphabetic() || c == '_' || c == '^'),
        take_while(0.., |c: char| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | ':' | '.' | '^')
        }),
    )
        .take()
        .parse_next(input)
}

/// Lowercased name at the head of `input` without consuming it.
fn peek_name(input: &str) -> Option<String> {
    let mut ahead = input;
    keyword_name
        .parse_next(&mut ahead)
        .ok()
        .map(str::to_ascii_lowercase)
}

/// Join the lines of a multi-line quoted value with single spaces.
fn collapse_lines(body: &str) -> String {
    if !body.contains('\n') {
        return body.to_string();
    }
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a `"..."` or `'...'` string.
fn quoted_string(input: &mut &str) -> ModalResult<String> {
    let mut quote: char = alt(('"', '\'')).parse_next(input)?;
    let body: &str = take_till(0.., quote).parse_next(input)?;
    if input.is_empty() {
        return Err(make_cut_error("closing quote"));
    }
    let _ = quote.parse_next(input)?;
    Ok(collapse_lines(body))
}

/// Parse an unquoted value token.
fn bare_value(input: &mut &str) -> ModalResult<String> {
    take_while(1.., |c: char| {
        !c.is_whitespace() && !matches!(c, ',' | '(' | ')' | '{' | '}' | '"' | '\'')
    })
    .map(str::to_string)
    .parse_next(input)
}

fn scalar(input: &mut &str) -> ModalResult<String> {
    alt((quoted_string, bare_value)).parse_next(input)
}

/// Skip an optional `<units>` annotation after a value.
fn units(input: &mut &str) -> ModalResult<()> {
    let _ = opt((hspace, '<', take_till(0.., '>'), '>')).parse_next(input)?;
    Ok(())
}

/// Parse `( v1, v2, ... )` or `{ v1, v2, ... }`.
fn value_list(input: &mut &str) -> ModalResult<Vec<String>> {
    let open = alt(('(', '{')).parse_next(input)?;
    let close = if open == '(' { ')' } else { '}' };
    let mut values = Vec::new();
    loop {
        let _ = ws.parse_next(input)?;
        if opt(close).parse_next(input)?.is_some() {
            break;
        }
        if !values.is_empty() {
            if opt(',').parse_next(input)?.is_none() {
                return Err(make_cut_error("',' or closing parenthesis in value list"));
            }
            let _ = ws.parse_next(input)?;
        }
        let Some(value) = opt(scalar).parse_next(input)? else {
            return Err(make_cut_error("value in list"));
        };
        units.parse_next(input)?;
        values.push(value);
    }
    Ok(values)
}

/// Parse `Name = value` or `Name = (list)`.
fn keyword_stmt(input: &mut &str) -> ModalResult<Keyword> {
    let name = keyword_name.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    if opt('=').parse_next(input)?.is_none() {
        return Err(make_cut_error("'=' after keyword name"));
    }
    let _ = ws.parse_next(input)?;
    let values = if input.starts_with('(') || input.starts_with('{') {
        value_list.parse_next(input)?
    } else {
        let Some(value) = opt(scalar).parse_next(input)? else {
            return Err(make_cut_error("keyword value"));
        };
        units.parse_next(input)?;
        vec![value]
    };
    Ok(Keyword::with_values(name, values))
}

/// Parse `= Name` after `Object` or `Group`.
fn container_name(input: &mut &str) -> ModalResult<String> {
    let _ = ws.parse_next(input)?;
    if opt('=').parse_next(input)?.is_none() {
        return Err(make_cut_error("'=' after Object or Group"));
    }
    let _ = ws.parse_next(input)?;
    match opt(scalar).parse_next(input)? {
        Some(name) => Ok(name),
        None => Err(make_cut_error("container name")),
    }
}

/// Consume a closing marker, with an optional `= Name` suffix.
fn expect_end(input: &mut &str, marker: &str, desc: &'static str) -> ModalResult<()> {
    let _ = ws.parse_next(input)?;
    if peek_name(input).as_deref() != Some(marker) {
        return Err(make_cut_error(desc));
    }
    let _ = keyword_name.parse_next(input)?;
    let mut ahead: &str = input;
    let _ = hspace.parse_next(&mut ahead)?;
    if ahead.starts_with('=') {
        *input = ahead;
        let _ = container_name.parse_next(input)?;
    }
    Ok(())
}

enum Item {
    Keyword(Keyword),
    Group(PvlGroup),
    Object(PvlObject),
}

/// Parse statements until end of input or an `End*` marker (left unconsumed).
fn items(input: &mut &str) -> ModalResult<Vec<Item>> {
    let mut items = Vec::new();
    loop {
        let _ = ws.parse_next(input)?;
        if input.is_empty() {
            break;
        }
        let Some(name) = peek_name(input) else {
            return Err(make_cut_error("keyword, Object, Group or End statement"));
        };
        match name.as_str() {
            "end" | "end_object" | "end_group" => break,
            "object" | "begin_object" => items.push(Item::Object(object_block.parse_next(input)?)),
            "group" | "begin_group" => items.push(Item::Group(group_block.parse_next(input)?)),
            _ => items.push(Item::Keyword(keyword_stmt.parse_next(input)?)),
        }
    }
    Ok(items)
}

fn assemble(name: String, items: Vec<Item>) -> PvlObject {
    let mut object = PvlObject::new(name);
    for item in items {
        match item {
            Item::Keyword(k) => object.keywords.push(k),
            Item::Group(g) => object.groups.push(g),
            Item::Object(o) => object.objects.push(o),
        }
    }
    object
}

fn object_block(input: &mut &str) -> ModalResult<PvlObject> {
    let _ = keyword_name.parse_next(input)?;
    let name = container_name.parse_next(input)?;
    let body = items.parse_next(input)?;
    expect_end(input, "end_object", "End_Object")?;
    Ok(assemble(name, body))
}

fn group_block(input: &mut &str) -> ModalResult<PvlGroup> {
    let _ = keyword_name.parse_next(input)?;
    let name = container_name.parse_next(input)?;
    let body = items.parse_next(input)?;
    let mut group = PvlGroup::new(name);
    for item in body {
        match item {
            Item::Keyword(k) => group.keywords.push(k),
            Item::Group(_) | Item::Object(_) => {
                return Err(make_cut_error("only keywords inside a Group"));
            }
        }
    }
    expect_end(input, "end_group", "End_Group")?;
    Ok(group)
}

/// Top-level parser: statements followed by an optional `End`.
fn document(input: &mut &str) -> ModalResult<PvlObject> {
    let body = items.parse_next(input)?;
    let _ = ws.parse_next(input)?;
    if peek_name(input).as_deref() == Some("end") {
        let _ = keyword_name.parse_next(input)?;
        let _ = ws.parse_next(input)?;
    }
    if !input.is_empty() {
        return Err(make_cut_error("end of input"));
    }
    Ok(assemble("Root".to_string(), body))
}

/// Compute (line, col) from the number of bytes consumed.
fn offset_to_line_col(text: &str, consumed: usize) -> (usize, usize) {
    let prefix = &text[..consumed.min(text.len())];
    let line = prefix.matches('\n').count() + 1;
    let col = match prefix.rfind('\n') {
        Some(pos) => consumed - pos,
        None => consumed + 1,
    };
    (line, col)
}

/// Public entry point.
pub fn parse(input: &str) -> std::result::Result<PvlObject, MinerError> {
    let stripped = strip_comments(input);
    let mut remaining = stripped.as_str();

    document.parse_next(&mut remaining).map_err(|e| {
        let consumed = stripped.len() - remaining.len();
        let (line, col) = offset_to_line_col(&stripped, consumed);
        let message = format!("{}", e);

        let snippet = remaining.chars().take(40).collect::<String>();
        let source_snippet = if snippet.trim().is_empty() {
            None
        } else {
            Some(snippet)
        };

        MinerError::ParseError {
            line,
            col,
            message,
            source_snippet,
        }
    })
}

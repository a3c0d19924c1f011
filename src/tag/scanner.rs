//! Tag grammar scanner (spec component D).
//!
//! Tokenizes one EBNF-variant tag string (a record field's grammar
//! fragment, or an EBNF-lexer production) into the small fixed vocabulary
//! the tag grammar parser consumes. Shared between [`super::parser`] (field
//! grammars) and the EBNF-driven lexer, which is why range syntax (`..`) is
//! recognized here but only accepted by the lexer's consumer — see
//! [`crate::error::CompileError::RangeInParserGrammar`].

use crate::error::CompileError;
use crate::position::Position;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagKind {
    Ident,
    String,
    Symbol,
    Eof,
}

#[derive(Debug, Clone)]
pub struct TagToken {
    pub kind: TagKind,
    pub text: String,
    pub position: Position,
}

impl TagToken {
    fn eof(position: Position) -> Self {
        Self { kind: TagKind::Eof, text: String::new(), position }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TagKind::Eof
    }
}

fn tag_position(field: &str, offset: usize) -> Position {
    Position { file: format!("tag:{field}").into(), offset, line: 1, column: offset as u32 + 1 }
}

/// Scans one field's tag string. `field` is used only to annotate
/// positions in diagnostics, not to influence tokenization.
pub fn scan(tag: &str, field: &str) -> Result<Vec<TagToken>, CompileError> {
    let bytes = tag.as_bytes();
    let mut i = 0usize;
    let mut out = Vec::new();

    while i < bytes.len() {
        let c = bytes[i] as char;
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if tag[i..].starts_with('…') {
            out.push(TagToken { kind: TagKind::Symbol, text: "..".to_string(), position: tag_position(field, i) });
            i += '…'.len_utf8();
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            let start = i;
            i += 1;
            let mut text = String::new();
            loop {
                if i >= bytes.len() {
                    return Err(CompileError::UnclosedGroup { position: tag_position(field, start) });
                }
                let ch = bytes[i] as char;
                if ch == '\\' && i + 1 < bytes.len() {
                    text.push(bytes[i + 1] as char);
                    i += 2;
                    continue;
                }
                if ch == quote {
                    i += 1;
                    break;
                }
                text.push(ch);
                i += 1;
            }
            out.push(TagToken { kind: TagKind::String, text, position: tag_position(field, start) });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() && ((bytes[i] as char).is_alphanumeric() || bytes[i] as char == '_') {
                i += 1;
            }
            out.push(TagToken { kind: TagKind::Ident, text: tag[start..i].to_string(), position: tag_position(field, start) });
            continue;
        }

        if c == '@' && i + 1 < bytes.len() && bytes[i + 1] as char == '@' {
            out.push(TagToken { kind: TagKind::Symbol, text: "@@".to_string(), position: tag_position(field, i) });
            i += 2;
            continue;
        }

        if c == '.' && i + 1 < bytes.len() && bytes[i + 1] as char == '.' {
            out.push(TagToken { kind: TagKind::Symbol, text: "..".to_string(), position: tag_position(field, i) });
            i += 2;
            continue;
        }

        if "()[]{}|!?*+,=~@<>:".contains(c) {
            out.push(TagToken { kind: TagKind::Symbol, text: c.to_string(), position: tag_position(field, i) });
            i += 1;
            continue;
        }

        return Err(CompileError::UnexpectedTagToken {
            found: c.to_string(),
            expected: "identifier, quoted literal, or grammar symbol".to_string(),
            position: tag_position(field, i),
        });
    }

    out.push(TagToken::eof(tag_position(field, bytes.len())));
    Ok(out)
}

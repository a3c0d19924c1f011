//! Token model, source positions, and the symbol table (spec component A).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

/// A token type tag. Negative values below [`BUILTIN_FLOOR`] are reserved for
/// built-in lexical categories; lexer-defined categories receive unique tags
/// assigned deterministically at compile time (decreasing from `EOF - 1`).
pub type Symbol = i32;

/// End-of-stream sentinel. Every token stream is terminated by a token of
/// this type.
pub const EOF: Symbol = -1;
/// Terminal lexer-error sentinel.
pub const ERROR: Symbol = -2;
pub const IDENT: Symbol = -3;
pub const INT: Symbol = -4;
pub const FLOAT: Symbol = -5;
pub const STRING: Symbol = -6;
pub const CHAR: Symbol = -7;
pub const RAW_STRING: Symbol = -8;
pub const COMMENT: Symbol = -9;

/// One below the lowest built-in tag; user-defined symbols are assigned
/// starting here and decreasing.
pub const BUILTIN_FLOOR: Symbol = COMMENT - 1;

/// A source position: filename, byte offset, 1-based line and column.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub file: Arc<str>,
    pub offset: usize,
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn start_of(file: impl Into<Arc<str>>) -> Self {
        Self { file: file.into(), offset: 0, line: 1, column: 1 }
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// One token produced by a lexer: a type tag, the literal text matched, and
/// the position of its first byte.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: Symbol,
    pub text: Arc<str>,
    pub position: Position,
}

impl Token {
    pub fn new(kind: Symbol, text: impl Into<Arc<str>>, position: Position) -> Self {
        Self { kind, text: text.into(), position }
    }

    pub fn eof(position: Position) -> Self {
        Self { kind: EOF, text: Arc::from(""), position }
    }

    pub fn is_eof(&self) -> bool {
        self.kind == EOF
    }
}

/// Unescapes one token's matched text for the `unquoteStringTokens` build
/// option (§6): strips a single matching pair of surrounding quote
/// characters (`"`, `'`, `` ` ``), then resolves `\n \t \r \\ \0 \" \'`,
/// `\xHH`, and `\u{HHHH}` escapes in what remains. Text with no recognized
/// surrounding quotes is returned unescaped but otherwise unchanged.
pub fn unquote(text: &str) -> String {
    let inner = {
        let mut chars = text.chars();
        match (chars.next(), chars.next_back()) {
            (Some(a), Some(b)) if a == b && matches!(a, '"' | '\'' | '`') && text.len() > 1 => chars.as_str(),
            _ => return text.to_string(),
        }
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('x') => {
                let hex: String = (0..2).filter_map(|_| chars.next()).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) => out.push(byte as char),
                    Err(_) => {
                        out.push_str("\\x");
                        out.push_str(&hex);
                    }
                }
            }
            Some('u') if chars.peek() == Some(&'{') => {
                chars.next();
                let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(ch) => out.push(ch),
                    None => {
                        out.push_str("\\u{");
                        out.push_str(&hex);
                        out.push('}');
                    }
                }
            }
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({:?} {:?} @ {:?})", self.kind, self.text, self.position)
    }
}

/// Maps human-readable symbol names ("Ident", "String", ...) to their type
/// tag, and back. Lowercase names are conventionally elided categories.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    by_name: IndexMap<String, Symbol>,
    by_symbol: HashMap<Symbol, String>,
    next: Symbol,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = Self { by_name: IndexMap::new(), by_symbol: HashMap::new(), next: BUILTIN_FLOOR };
        for (name, sym) in [
            ("EOF", EOF),
            ("Error", ERROR),
            ("Ident", IDENT),
            ("Int", INT),
            ("Float", FLOAT),
            ("String", STRING),
            ("Char", CHAR),
            ("RawString", RAW_STRING),
            ("Comment", COMMENT),
        ] {
            table.by_name.insert(name.to_string(), sym);
            table.by_symbol.insert(sym, name.to_string());
        }
        table
    }

    /// Looks up an existing symbol by name.
    pub fn get(&self, name: &str) -> Option<Symbol> {
        self.by_name.get(name).copied()
    }

    pub fn name_of(&self, symbol: Symbol) -> Option<&str> {
        self.by_symbol.get(&symbol).map(|s| s.as_str())
    }

    /// Returns the symbol for `name`, assigning a fresh, stable negative tag
    /// the first time the name is seen.
    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&sym) = self.by_name.get(name) {
            return sym;
        }
        let sym = self.next;
        self.next -= 1;
        self.by_name.insert(name.to_string(), sym);
        self.by_symbol.insert(sym, name.to_string());
        sym
    }

    pub fn names(&self) -> impl Iterator<Item = (&str, Symbol)> {
        self.by_name.iter().map(|(n, s)| (n.as_str(), *s))
    }
}

#[cfg(test)]
mod position_tests {
    use super::*;

    #[test]
    fn unquote_strips_delimiters_and_escapes() {
        assert_eq!(unquote(r#""hello\nworld""#), "hello\nworld");
        assert_eq!(unquote(r"'a\'b'"), "a'b");
        assert_eq!(unquote(r#""\x41""#), "A");
        assert_eq!(unquote(r#""\u{1F600}""#), "\u{1F600}");
    }

    #[test]
    fn unquote_leaves_unquoted_text_alone() {
        assert_eq!(unquote("bareword"), "bareword");
    }

    #[test]
    fn interning_is_stable_and_decreasing() {
        let mut t = SymbolTable::new();
        let a = t.intern("Plus");
        let b = t.intern("Minus");
        let a_again = t.intern("Plus");
        assert_eq!(a, a_again);
        assert!(b < a);
        assert!(a < BUILTIN_FLOOR || a == BUILTIN_FLOOR);
    }

    #[test]
    fn builtins_preregistered() {
        let t = SymbolTable::new();
        assert_eq!(t.get("EOF"), Some(EOF));
        assert_eq!(t.get("Ident"), Some(IDENT));
        assert_eq!(t.name_of(STRING), Some("String"));
    }
}

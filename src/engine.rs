//! Top-level build/parse driver (spec §6): compiles a [`Grammar`] type once
//! against a chosen lexer and option set into an immutable node graph
//! (`build`), then runs repeated, independent parses against it (`parse`
//! and friends). Mirrors the grounding crate's `QueryBuilder`/`Query` split
//! — assemble configuration with a builder, compile once, reuse many times.

use std::collections::HashSet;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use crate::bind::{new_any_cell, unwrap_cell, AnyCell, Grammar};
use crate::context::ParseContext;
use crate::error::{CompileError, Error, MultiError, ParseError};
use crate::grammar::{GrammarCompiler, Outcome, RecordNode};
use crate::lexer::{LexerDefinition, PeekingLexer};
use crate::position::{Position, Symbol, SymbolTable, Token};

/// Build-time configuration for [`Parser::build`] (spec §6's enumerated
/// `build(targetType, options…)` option set).
pub struct BuildOptions {
    lexer: Option<Box<dyn LexerDefinition>>,
    use_lookahead: usize,
    case_insensitive: HashSet<String>,
    elide: HashSet<String>,
    unquote_string_tokens: HashSet<String>,
    mapper: Option<Rc<dyn Fn(Token) -> Token>>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            lexer: None,
            use_lookahead: usize::MAX,
            case_insensitive: HashSet::new(),
            elide: HashSet::new(),
            unquote_string_tokens: ["String".to_string()].into_iter().collect(),
            mapper: None,
        }
    }
}

impl BuildOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lexer(mut self, lexer: impl LexerDefinition + 'static) -> Self {
        self.lexer = Some(Box::new(lexer));
        self
    }

    /// The `useLookahead` budget: how many tokens a disjunction's failed
    /// alternative may consume before the disjunction commits to it (§4.F).
    /// Defaults to unbounded.
    pub fn use_lookahead(mut self, n: usize) -> Self {
        self.use_lookahead = n;
        self
    }

    pub fn case_insensitive<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.case_insensitive = names.into_iter().map(Into::into).collect();
        self
    }

    /// Additional token names to drop from the stream regardless of the
    /// lexer's own lowercase-elision convention.
    pub fn elide<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.elide = names.into_iter().map(Into::into).collect();
        self
    }

    /// Token names whose matched text is unescaped via [`crate::position::unquote`]
    /// before field binding sees it. Defaults to `{"String"}`.
    pub fn unquote_string_tokens<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.unquote_string_tokens = names.into_iter().map(Into::into).collect();
        self
    }

    /// Rewrites every token as it leaves the peeking lexer, before any
    /// grammar node observes it (e.g. to recognize contextual keywords).
    pub fn mapper(mut self, mapper: impl Fn(Token) -> Token + 'static) -> Self {
        self.mapper = Some(Rc::new(mapper));
        self
    }
}

fn resolve_names(symbols: &SymbolTable, names: &HashSet<String>) -> Result<HashSet<Symbol>, CompileError> {
    names.iter().map(|name| symbols.get(name).ok_or_else(|| CompileError::UnknownOptionTokenName { name: name.clone() })).collect()
}

/// A compiled parser for one target [`Grammar`] type: immutable, reusable,
/// and (since the node graph and lexer are read-only after compilation)
/// safe to share across independent parses (§5).
pub struct Parser<T: Grammar> {
    lexer: Box<dyn LexerDefinition>,
    symbols: SymbolTable,
    record: Rc<RecordNode>,
    lookahead: usize,
    case_insensitive: Rc<HashSet<Symbol>>,
    unquote: Rc<HashSet<Symbol>>,
    elide: Rc<HashSet<Symbol>>,
    mapper: Option<Rc<dyn Fn(Token) -> Token>>,
    _marker: PhantomData<T>,
}

impl<T: Grammar> Parser<T> {
    /// Compiles `T`'s grammar against `options`. A missing lexer is a
    /// compile error ([`CompileError::NoLexerProvided`]), since every other
    /// option resolves token *names* through the lexer's symbol table.
    pub fn build(options: BuildOptions) -> Result<Self, Error> {
        let lexer = options.lexer.ok_or(CompileError::NoLexerProvided)?;
        let symbols = lexer.symbols().clone();
        let case_insensitive = resolve_names(&symbols, &options.case_insensitive)?;
        let unquote = resolve_names(&symbols, &options.unquote_string_tokens)?;
        let elide = resolve_names(&symbols, &options.elide)?;

        let compiler = GrammarCompiler::new(symbols);
        let record = compiler.compile::<T>()?;
        let symbols = compiler.symbols().clone();

        Ok(Self {
            lexer,
            symbols,
            record,
            lookahead: options.use_lookahead,
            case_insensitive: Rc::new(case_insensitive),
            unquote: Rc::new(unquote),
            elide: Rc::new(elide),
            mapper: options.mapper,
            _marker: PhantomData,
        })
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    /// Renders the compiled grammar as canonical EBNF (§4.J).
    pub fn to_ebnf(&self) -> String {
        let body = self.record.body.borrow();
        crate::grammar::ebnf::render(&body, &self.symbols)
    }

    fn tokens_for(&self, source: &str, filename: Arc<str>) -> Vec<Token> {
        let mut tokens = self.lexer.tokenize(source, filename);
        if let Some(mapper) = &self.mapper {
            tokens = tokens.into_iter().map(|t| mapper(t)).collect();
        }
        if !self.elide.is_empty() {
            tokens.retain(|t| t.is_eof() || !self.elide.contains(&t.kind));
        }
        tokens
    }

    /// Runs one parse of `source` into `cell`, returning the recovered
    /// errors (empty unless a field opted into §7's recovery layer) on a
    /// structural success, or a hard [`Error`] if the grammar never matched
    /// or left trailing input.
    fn run(&self, source: &str, filename: &str, cell: AnyCell) -> Result<Vec<ParseError>, Error> {
        let tokens = self.tokens_for(source, Arc::from(filename));
        let cursor = PeekingLexer::new(tokens.into_iter());
        let mut ctx = ParseContext::with_options(cursor, self.lookahead, Rc::clone(&self.case_insensitive), Rc::clone(&self.unquote));
        if let Some(setter) = &self.record.position_setter {
            setter(&cell, ctx.cursor().peek(0).position.clone());
        }
        let outcome = self.record.body.borrow().parse(&mut ctx, &cell);
        match outcome {
            Outcome::Matched(_) => {
                let trailing = ctx.cursor().peek(0);
                if !trailing.is_eof() {
                    return Err(Error::Parse(ParseError::TrailingInput { found: trailing.text.to_string(), position: trailing.position.clone() }));
                }
                let recovered = ctx.take_recovered();
                ctx.commit_all();
                Ok(recovered)
            }
            Outcome::NoMatch => {
                let err = ctx.furthest_error().unwrap_or(ParseError::TrailingInput { found: String::new(), position: Position::start_of(filename) });
                Err(Error::Parse(err))
            }
        }
    }

    /// Parses `source` into a fresh `T`. Fails (without exposing a partial
    /// value) if the grammar does not match, if trailing input remains, or
    /// if the recovery layer recovered any errors — use
    /// [`Self::parse_with_recovery`] to keep a partial result in that case.
    pub fn parse_string(&self, source: &str) -> Result<T, Error> {
        let cell = new_any_cell(T::default());
        let recovered = self.run(source, "input", Rc::clone(&cell))?;
        if !recovered.is_empty() {
            return Err(Error::Multi(MultiError::new(recovered)));
        }
        Ok(unwrap_cell::<T>(cell))
    }

    /// Alias for [`Self::parse_string`]; named to match §6's
    /// `parseString(str, target)` entry point.
    pub fn parse(&self, source: &str) -> Result<T, Error> {
        self.parse_string(source)
    }

    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<T, Error> {
        let text = std::str::from_utf8(bytes).map_err(|_| Error::Parse(ParseError::InvalidEncoding { position: Position::start_of("input") }))?;
        self.parse_string(text)
    }

    /// Reads the stream to completion and parses it; read failures surface
    /// as a lexer error, per §5's "read errors become lexer errors at the
    /// position of the failed read".
    pub fn parse_reader<R: std::io::Read>(&self, mut reader: R, target: &mut T) -> Result<(), Error> {
        let mut buf = String::new();
        reader
            .read_to_string(&mut buf)
            .map_err(|_| Error::Parse(ParseError::LexError { position: Position::start_of("input") }))?;
        self.parse_into(&buf, target)
    }

    /// Parses `source`, mutating `target` in place (§6: "on success mutates
    /// `target` in place"). The parse runs against a fresh `T::default()`
    /// cell, not `target` itself, so `target`'s prior contents are left
    /// completely untouched on a hard failure (§8 testable property 3: "for
    /// every failed top-level parse, the target record equals its pre-parse
    /// state"). Only once the grammar has matched structurally — including a
    /// partial result when the recovery layer recovered errors — is `target`
    /// overwritten with the parsed value.
    pub fn parse_into(&self, source: &str, target: &mut T) -> Result<(), Error> {
        let cell = new_any_cell(T::default());
        let recovered = self.run(source, "input", Rc::clone(&cell))?;
        *target = unwrap_cell::<T>(cell);
        if !recovered.is_empty() {
            return Err(Error::Multi(MultiError::new(recovered)));
        }
        Ok(())
    }

    /// Parses `source`, returning the (possibly partial, if recovery
    /// triggered) result alongside every error the recovery layer recovered
    /// along the way, rather than treating a non-empty recovery list as
    /// failure.
    pub fn parse_with_recovery(&self, source: &str) -> Result<(T, MultiError), Error> {
        let cell = new_any_cell(T::default());
        let recovered = self.run(source, "input", Rc::clone(&cell))?;
        Ok((unwrap_cell::<T>(cell), MultiError::new(recovered)))
    }
}

#[cfg(test)]
mod engine_tests {
    use super::*;
    use crate::bind::{FieldSlot, FieldSpec, RecordSpec};
    use crate::lexer::{LexerRules, RuleEntry, RuleDef, ROOT_STATE};
    use crate::recovery::RecoveryStrategy;

    #[derive(Default)]
    struct Word {
        text: String,
    }

    impl Grammar for Word {
        fn spec() -> RecordSpec<Self> {
            RecordSpec::new().field(FieldSpec::new("Text", "@Ident", FieldSlot::string(|w| &mut w.text)))
        }
    }

    fn word_lexer() -> LexerRules {
        LexerRules::new().state(
            ROOT_STATE,
            vec![
                RuleEntry::Rule(RuleDef::new("ws", r"[ \t\n]+")),
                RuleEntry::Rule(RuleDef::new("Ident", r"[A-Za-z]+")),
            ],
        )
    }

    #[test]
    fn builds_and_parses_a_simple_record() {
        let lexer = word_lexer().compile().unwrap();
        let parser = Parser::<Word>::build(BuildOptions::new().with_lexer(lexer)).unwrap();
        let word = parser.parse_string("hello").unwrap();
        assert_eq!(word.text, "hello");
    }

    #[test]
    fn trailing_input_is_a_hard_error() {
        let lexer = word_lexer().compile().unwrap();
        let parser = Parser::<Word>::build(BuildOptions::new().with_lexer(lexer)).unwrap();
        assert!(parser.parse_string("hello world").is_err());
    }

    #[test]
    fn parse_into_replaces_target_in_place() {
        let lexer = word_lexer().compile().unwrap();
        let parser = Parser::<Word>::build(BuildOptions::new().with_lexer(lexer)).unwrap();
        let mut target = Word { text: "stale".into() };
        parser.parse_into("hello", &mut target).unwrap();
        assert_eq!(target.text, "hello");
    }

    #[derive(Default)]
    struct Two {
        first: String,
        second: String,
    }

    impl Grammar for Two {
        fn spec() -> RecordSpec<Self> {
            RecordSpec::new()
                .field(FieldSpec::new("First", "@Ident", FieldSlot::string(|t| &mut t.first)))
                .field(
                    FieldSpec::new("Second", "@Ident", FieldSlot::string(|t| &mut t.second))
                        .recover(RecoveryStrategy::skip_until(crate::position::EOF)),
                )
        }
    }

    #[test]
    fn recovery_strategy_survives_an_unmatched_field() {
        let lexer = word_lexer().compile().unwrap();
        let parser = Parser::<Two>::build(BuildOptions::new().with_lexer(lexer)).unwrap();
        // ';' matches no rule in `word_lexer`, so the second field's `@Ident`
        // never matches and its recovery strategy skips to EOF instead.
        let (value, recovered) = parser.parse_with_recovery("hello ;").unwrap();
        assert_eq!(value.first, "hello");
        assert_eq!(value.second, "");
        assert!(!recovered.is_empty());
        assert!(parser.parse_string("hello ;").is_err());
    }

    #[test]
    fn build_rejects_missing_lexer() {
        let err = Parser::<Word>::build(BuildOptions::new());
        assert!(matches!(err, Err(Error::Compile(CompileError::NoLexerProvided))));
    }

    #[test]
    fn unknown_option_token_name_is_a_build_error() {
        let lexer = word_lexer().compile().unwrap();
        let err = Parser::<Word>::build(BuildOptions::new().with_lexer(lexer).case_insensitive(["Nope"]));
        assert!(matches!(err, Err(Error::Compile(CompileError::UnknownOptionTokenName { .. }))));
    }

    // §8 end-to-end scenarios: whole grammars run through `Parser::build` /
    // `Parser::parse`, not just one node or field in isolation.

    mod arithmetic_precedence {
        use super::*;
        use crate::bind::{UnionCase, FieldSlot as FS};

        fn arith_lexer() -> LexerRules {
            LexerRules::new().state(
                ROOT_STATE,
                vec![
                    RuleEntry::Rule(RuleDef::new("ws", r"[ \t\n]+")),
                    RuleEntry::Rule(RuleDef::new("Int", r"[0-9]+")),
                    RuleEntry::Rule(RuleDef::new("Plus", r"\+")),
                    RuleEntry::Rule(RuleDef::new("Minus", r"-")),
                    RuleEntry::Rule(RuleDef::new("Star", r"\*")),
                    RuleEntry::Rule(RuleDef::new("Slash", r"/")),
                    RuleEntry::Rule(RuleDef::new("LParen", r"\(")),
                    RuleEntry::Rule(RuleDef::new("RParen", r"\)")),
                ],
            )
        }

        #[derive(Default)]
        struct NumberLit {
            value: i64,
        }
        impl Grammar for NumberLit {
            fn spec() -> RecordSpec<Self> {
                RecordSpec::new().field(FieldSpec::new("Value", "@Int", FS::int(|n| &mut n.value)))
            }
        }

        #[derive(Default)]
        struct Paren {
            inner: Expr,
        }
        impl Grammar for Paren {
            fn spec() -> RecordSpec<Self> {
                RecordSpec::new().field(FieldSpec::new("Inner", r#""(" @@ ")""#, FS::record(|p| &mut p.inner)))
            }
        }

        enum FactorValue {
            Number(NumberLit),
            Paren(Paren),
        }
        impl Default for FactorValue {
            fn default() -> Self {
                FactorValue::Number(NumberLit::default())
            }
        }

        #[derive(Default)]
        struct Factor {
            value: FactorValue,
        }
        impl Grammar for Factor {
            fn spec() -> RecordSpec<Self> {
                RecordSpec::new().field(FieldSpec::new(
                    "Value",
                    "@@",
                    FS::union(|f| &mut f.value, vec![UnionCase::new(FactorValue::Number), UnionCase::new(FactorValue::Paren)]),
                ))
            }
        }

        #[derive(Default)]
        struct MulOp {
            op: String,
            rhs: Factor,
        }
        impl Grammar for MulOp {
            fn spec() -> RecordSpec<Self> {
                RecordSpec::new()
                    .field(FieldSpec::new("Op", r#"@("*" | "/")"#, FS::string(|m| &mut m.op)))
                    .field(FieldSpec::new("Rhs", "@@", FS::record(|m| &mut m.rhs)))
            }
        }

        #[derive(Default)]
        struct Term {
            left: Factor,
            rest: Vec<MulOp>,
        }
        impl Grammar for Term {
            fn spec() -> RecordSpec<Self> {
                RecordSpec::new()
                    .field(FieldSpec::new("Left", "@@", FS::record(|t| &mut t.left)))
                    .field(FieldSpec::new("Rest", "@@*", FS::record_vec(|t| &mut t.rest)))
            }
        }

        #[derive(Default)]
        struct AddOp {
            op: String,
            rhs: Term,
        }
        impl Grammar for AddOp {
            fn spec() -> RecordSpec<Self> {
                RecordSpec::new()
                    .field(FieldSpec::new("Op", r#"@("+" | "-")"#, FS::string(|a| &mut a.op)))
                    .field(FieldSpec::new("Rhs", "@@", FS::record(|a| &mut a.rhs)))
            }
        }

        #[derive(Default)]
        struct Expr {
            left: Term,
            rest: Vec<AddOp>,
        }
        impl Grammar for Expr {
            fn spec() -> RecordSpec<Self> {
                RecordSpec::new()
                    .field(FieldSpec::new("Left", "@@", FS::record(|e| &mut e.left)))
                    .field(FieldSpec::new("Rest", "@@*", FS::record_vec(|e| &mut e.rest)))
            }
        }

        fn factor_number(f: &Factor) -> i64 {
            match &f.value {
                FactorValue::Number(n) => n.value,
                FactorValue::Paren(_) => panic!("expected a number factor"),
            }
        }

        #[test]
        fn left_associative_precedence_climbs_correctly() {
            let lexer = arith_lexer().compile().unwrap();
            let parser = Parser::<Expr>::build(BuildOptions::new().with_lexer(lexer)).unwrap();
            let expr = parser.parse_string("1 + 2 * 3").unwrap();

            assert_eq!(factor_number(&expr.left.left), 1);
            assert!(expr.left.rest.is_empty());
            assert_eq!(expr.rest.len(), 1);
            assert_eq!(expr.rest[0].op, "+");
            let rhs = &expr.rest[0].rhs;
            assert_eq!(factor_number(&rhs.left), 2);
            assert_eq!(rhs.rest.len(), 1);
            assert_eq!(rhs.rest[0].op, "*");
            assert_eq!(factor_number(&rhs.rest[0].rhs), 3);
        }

        #[test]
        fn parenthesized_subexpression_overrides_precedence() {
            let lexer = arith_lexer().compile().unwrap();
            let parser = Parser::<Expr>::build(BuildOptions::new().with_lexer(lexer)).unwrap();
            let expr = parser.parse_string("(1+2)*3").unwrap();

            assert_eq!(expr.rest.len(), 0);
            let inner = match &expr.left.left.value {
                FactorValue::Paren(p) => &p.inner,
                FactorValue::Number(_) => panic!("expected a parenthesized factor"),
            };
            assert_eq!(factor_number(&inner.left.left), 1);
            assert_eq!(inner.rest.len(), 1);
            assert_eq!(inner.rest[0].op, "+");
            assert_eq!(factor_number(&inner.rest[0].rhs.left), 2);

            assert_eq!(expr.left.rest.len(), 1);
            assert_eq!(expr.left.rest[0].op, "*");
            assert_eq!(factor_number(&expr.left.rest[0].rhs), 3);
        }
    }

    mod ini_format {
        use super::*;
        use indoc::indoc;

        fn ini_lexer() -> LexerRules {
            LexerRules::new().state(
                ROOT_STATE,
                vec![
                    RuleEntry::Rule(RuleDef::new("ws", r"[ \t]+")),
                    RuleEntry::Rule(RuleDef::new("Newline", r"\n")),
                    RuleEntry::Rule(RuleDef::new("String", r#""[^"]*""#)),
                    RuleEntry::Rule(RuleDef::new("Int", r"[0-9]+")),
                    RuleEntry::Rule(RuleDef::new("Ident", r"[A-Za-z_][A-Za-z0-9_]*")),
                    RuleEntry::Rule(RuleDef::new("Equals", r"=")),
                    RuleEntry::Rule(RuleDef::new("LBracket", r"\[")),
                    RuleEntry::Rule(RuleDef::new("RBracket", r"\]")),
                ],
            )
        }

        #[derive(Default)]
        struct Entry {
            key: String,
            value: String,
        }
        impl Grammar for Entry {
            fn spec() -> RecordSpec<Self> {
                RecordSpec::new()
                    .field(FieldSpec::new("Key", "@Ident", FieldSlot::string(|e| &mut e.key)))
                    .field(FieldSpec::new("Value", r#""=" @(Int | String) Newline?"#, FieldSlot::string(|e| &mut e.value)))
            }
        }

        #[derive(Default)]
        struct Section {
            name: String,
            entries: Vec<Entry>,
        }
        impl Grammar for Section {
            fn spec() -> RecordSpec<Self> {
                RecordSpec::new()
                    .field(FieldSpec::new("Name", r#""[" @Ident "]" Newline?"#, FieldSlot::string(|s| &mut s.name)))
                    .field(FieldSpec::new("Entries", "@@*", FieldSlot::record_vec(|s| &mut s.entries)))
            }
        }

        #[derive(Default)]
        struct Document {
            entries: Vec<Entry>,
            sections: Vec<Section>,
        }
        impl Grammar for Document {
            fn spec() -> RecordSpec<Self> {
                RecordSpec::new()
                    .field(FieldSpec::new("Entries", "@@*", FieldSlot::record_vec(|d| &mut d.entries)))
                    .field(FieldSpec::new("Sections", "@@*", FieldSlot::record_vec(|d| &mut d.sections)))
            }
        }

        #[test]
        fn top_level_entries_and_sections_parse() {
            let lexer = ini_lexer().compile().unwrap();
            let parser = Parser::<Document>::build(BuildOptions::new().with_lexer(lexer).unquote_string_tokens(["String"])).unwrap();
            let doc = parser
                .parse_string(indoc! {r#"
                    a=1
                    [s]
                    b="x"
                "#})
                .unwrap();

            assert_eq!(doc.entries.len(), 1);
            assert_eq!(doc.entries[0].key, "a");
            assert_eq!(doc.entries[0].value, "1");

            assert_eq!(doc.sections.len(), 1);
            assert_eq!(doc.sections[0].name, "s");
            assert_eq!(doc.sections[0].entries.len(), 1);
            assert_eq!(doc.sections[0].entries[0].key, "b");
            assert_eq!(doc.sections[0].entries[0].value, "x");
        }
    }

    mod lookahead_disambiguation {
        use super::*;

        fn keyword_lexer() -> LexerRules {
            LexerRules::new().state(
                ROOT_STATE,
                vec![
                    RuleEntry::Rule(RuleDef::new("ws", r"[ \t\n]+")),
                    RuleEntry::Rule(RuleDef::new("Ident", r"[A-Za-z]+")),
                    RuleEntry::Rule(RuleDef::new("Semi", r";")),
                ],
            )
        }

        #[derive(Default)]
        struct Decl {
            is_public: bool,
            kind: String,
            name: String,
        }
        impl Grammar for Decl {
            fn spec() -> RecordSpec<Self> {
                RecordSpec::new()
                    .field(FieldSpec::new("Public", r#"@"public"?"#, FieldSlot::bool_flag(|d| &mut d.is_public)))
                    .field(FieldSpec::new("Kind", r#"@("class" | "union")"#, FieldSlot::string(|d| &mut d.kind)))
                    .field(FieldSpec::new("Name", r#"@Ident ";""#, FieldSlot::string(|d| &mut d.name)))
            }
        }

        #[test]
        fn furthest_error_reports_the_later_same_position_alternative() {
            let lexer = keyword_lexer().compile().unwrap();
            let parser = Parser::<Decl>::build(BuildOptions::new().with_lexer(lexer)).unwrap();
            let err = parser.parse_string("public struct Foo;").unwrap_err();
            let message = err.to_string();
            assert!(message.contains("expected \"union\""), "unexpected message: {message}");
            assert!(message.contains(":1:8"), "expected position at `struct` (column 8), got: {message}");
        }

        #[test]
        fn well_formed_declaration_parses() {
            let lexer = keyword_lexer().compile().unwrap();
            let parser = Parser::<Decl>::build(BuildOptions::new().with_lexer(lexer)).unwrap();
            let decl = parser.parse_string("public class Foo;").unwrap();
            assert!(decl.is_public);
            assert_eq!(decl.kind, "class");
            assert_eq!(decl.name, "Foo");
        }
    }

    mod left_recursion_rejection {
        use super::*;

        #[derive(Default)]
        struct SelfRefExpr {
            inner: Vec<SelfRefExpr>,
        }

        impl Grammar for SelfRefExpr {
            fn spec() -> RecordSpec<Self> {
                // The body re-enters itself with nothing consumed first: a
                // direct left-recursive cycle the recursive-descent engine
                // can never terminate.
                RecordSpec::new().field(FieldSpec::new("Inner", "@@", FieldSlot::record_vec(|e| &mut e.inner)))
            }
        }

        #[test]
        fn left_recursive_grammar_is_rejected_at_build_time() {
            let lexer = LexerRules::new()
                .state(ROOT_STATE, vec![RuleEntry::Rule(RuleDef::new("Ident", r"[A-Za-z]+"))])
                .compile()
                .unwrap();
            let err = Parser::<SelfRefExpr>::build(BuildOptions::new().with_lexer(lexer));
            assert!(matches!(err, Err(Error::Compile(CompileError::LeftRecursion { .. }))));
        }
    }

    mod recovery_scenario {
        use super::*;
        use crate::position::CHAR;

        // The "Char" rule name is the builtin `Char` category pre-registered
        // in every `SymbolTable` (`crate::position::CHAR`), so the recovery
        // strategy below can reference a stable symbol without depending on
        // this lexer's own interning order (DESIGN.md's resolution of the
        // "recovery strategies need a known-ahead-of-`build()` symbol" note).
        fn statement_lexer() -> LexerRules {
            LexerRules::new().state(
                ROOT_STATE,
                vec![
                    RuleEntry::Rule(RuleDef::new("ws", r"[ \t\n]+")),
                    RuleEntry::Rule(RuleDef::new("Let", r"let")),
                    RuleEntry::Rule(RuleDef::new("Ident", r"[A-Za-z_][A-Za-z0-9_]*")),
                    RuleEntry::Rule(RuleDef::new("Equals", r"=")),
                    RuleEntry::Rule(RuleDef::new("Int", r"[0-9]+")),
                    RuleEntry::Rule(RuleDef::new("Char", r";")),
                ],
            )
        }

        #[derive(Default)]
        struct Statement {
            name: String,
            value: i64,
        }
        impl Grammar for Statement {
            fn spec() -> RecordSpec<Self> {
                RecordSpec::new()
                    // A leading stray ";" is the previous statement's own
                    // terminator, left uneaten by a recovered `Value` field
                    // (see below); swallow it here rather than require every
                    // statement to look behind itself.
                    .field(FieldSpec::new("Name", r#"[";":Char] "let" @Ident "=""#, FieldSlot::string(|s| &mut s.name)))
                    .field(
                        FieldSpec::new("Value", "@Int", FieldSlot::int(|s| &mut s.value))
                            .recover(RecoveryStrategy::skip_past(CHAR)),
                    )
            }
        }

        #[derive(Default)]
        struct Program {
            statements: Vec<Statement>,
            trailing_semicolon: bool,
        }
        impl Grammar for Program {
            fn spec() -> RecordSpec<Self> {
                RecordSpec::new()
                    .field(FieldSpec::new("Statements", "@@*", FieldSlot::record_vec(|p| &mut p.statements)))
                    // Consumes the final statement's trailing ";", which has
                    // no following statement to eat it as a leading token.
                    // The leading "@" is required for the match to actually
                    // reach `FieldSlot::apply` at all — an uncaptured term
                    // never invokes the field's binding, captured or not.
                    .field(FieldSpec::new("Trailing", r#"@[";":Char]"#, FieldSlot::bool_flag(|p| &mut p.trailing_semicolon)))
            }
        }

        #[test]
        fn skip_past_recovers_one_broken_statement_and_resumes_the_next() {
            let lexer = statement_lexer().compile().unwrap();
            let parser = Parser::<Program>::build(BuildOptions::new().with_lexer(lexer)).unwrap();

            let (program, multi) = parser.parse_with_recovery("let x = 42; let y = ; let z = 100;").unwrap();

            assert_eq!(program.statements.len(), 3);
            assert_eq!(program.statements[0].name, "x");
            assert_eq!(program.statements[0].value, 42);
            assert_eq!(program.statements[1].name, "y");
            assert_eq!(program.statements[1].value, 0, "unmatched value is left at its default");
            assert_eq!(program.statements[2].name, "z");
            assert_eq!(program.statements[2].value, 100);
            assert!(program.trailing_semicolon);

            assert_eq!(multi.recovered.len(), 1, "exactly one error should have been recovered");
            let message = multi.to_string();
            assert!(message.contains(";"), "recovered error should mention the stray ';': {message}");

            // Without opting into recovery, the same input is a hard failure.
            assert!(parser.parse_string("let x = 42; let y = ; let z = 100;").is_err());
        }
    }
}

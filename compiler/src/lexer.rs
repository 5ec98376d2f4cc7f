// Lexer for hlsopt .hls source files.
//
// Uses the `logos` crate for DFA-based lexing. Newlines are significant
// (statement terminators); spaces, tabs and `#` comments are skipped.
//
// Preconditions: input is valid UTF-8.
// Postconditions: returns all tokens with byte-offset spans, plus any lex errors.
// Failure modes: unrecognized characters produce `LexError`; lexing continues.
// Side effects: none.

use logos::Logos;
use std::fmt;

/// Byte-offset span in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

/// A lexer error with location.
#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub span: Span,
    pub message: String,
}

/// Result of lexing: tokens plus any errors (non-fatal).
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<(Token, Span)>,
    pub errors: Vec<LexError>,
}

/// Token types.
///
/// Identifiers carry no value; use the span to retrieve the text.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r]+|#[^\n]*")]
pub enum Token {
    // ── Keywords ──
    #[token("set")]
    Set,
    #[token("array")]
    Array,
    #[token("loop")]
    Loop,
    #[token("to")]
    To,
    #[token("step")]
    Step,
    #[token("pipeline")]
    Pipeline,
    #[token("read")]
    Read,
    #[token("write")]
    Write,
    #[token("region")]
    Region,
    #[token("node")]
    Node,
    #[token("mod")]
    Mod,
    #[token("floordiv")]
    FloorDiv,
    #[token("ceildiv")]
    CeilDiv,

    // ── Symbols ──
    #[token("->")]
    Arrow,
    #[token("@")]
    At,
    #[token(":")]
    Colon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token(",")]
    Comma,
    #[token("=")]
    Equals,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,

    // ── Literals ──
    /// Unsigned integer literal; negation is handled by the parser.
    #[regex(r"[0-9]+", parse_int)]
    Int(i64),

    // ── Identifier ──
    /// Identifier: `[a-zA-Z_][a-zA-Z0-9_]*`
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    // ── Structure ──
    /// One or more newlines (statement terminator).
    #[regex(r"\n+")]
    Newline,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Set => write!(f, "set"),
            Token::Array => write!(f, "array"),
            Token::Loop => write!(f, "loop"),
            Token::To => write!(f, "to"),
            Token::Step => write!(f, "step"),
            Token::Pipeline => write!(f, "pipeline"),
            Token::Read => write!(f, "read"),
            Token::Write => write!(f, "write"),
            Token::Region => write!(f, "region"),
            Token::Node => write!(f, "node"),
            Token::Mod => write!(f, "mod"),
            Token::FloorDiv => write!(f, "floordiv"),
            Token::CeilDiv => write!(f, "ceildiv"),
            Token::Arrow => write!(f, "->"),
            Token::At => write!(f, "@"),
            Token::Colon => write!(f, ":"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Equals => write!(f, "="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Int(v) => write!(f, "{v}"),
            Token::Ident => write!(f, "<ident>"),
            Token::Newline => write!(f, "<newline>"),
        }
    }
}

// ── Callbacks ──

fn parse_int(lex: &mut logos::Lexer<'_, Token>) -> Option<i64> {
    lex.slice().parse().ok()
}

// ── Public API ──

/// Lex a source string into tokens.
///
/// Lexing is non-fatal: errors are collected and the lexer continues past
/// bad characters.
pub fn lex(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    for (result, range) in lexer.spanned() {
        let span = Span {
            start: range.start,
            end: range.end,
        };
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(LexError {
                span,
                message: format!("unexpected character: {:?}", &source[span.start..span.end]),
            }),
        }
    }

    LexResult { tokens, errors }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn lex_ok(source: &str) -> Vec<Token> {
        let result = lex(source);
        assert!(
            result.errors.is_empty(),
            "unexpected lex errors: {:?}",
            result.errors
        );
        result.tokens.into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn keywords() {
        let src = "set array loop to step pipeline read write region node mod floordiv ceildiv";
        let tokens = lex_ok(src);
        assert_eq!(
            tokens,
            vec![
                Token::Set,
                Token::Array,
                Token::Loop,
                Token::To,
                Token::Step,
                Token::Pipeline,
                Token::Read,
                Token::Write,
                Token::Region,
                Token::Node,
                Token::Mod,
                Token::FloorDiv,
                Token::CeilDiv,
            ]
        );
    }

    #[test]
    fn arrow_wins_over_minus() {
        assert_eq!(lex_ok("- ->"), vec![Token::Minus, Token::Arrow]);
    }

    #[test]
    fn keyword_prefix_is_identifier() {
        assert_eq!(lex_ok("reader node_1"), vec![Token::Ident, Token::Ident]);
    }

    #[test]
    fn index_expression() {
        assert_eq!(
            lex_ok("A[i-1, 2*j]"),
            vec![
                Token::Ident,
                Token::LBracket,
                Token::Ident,
                Token::Minus,
                Token::Int(1),
                Token::Comma,
                Token::Int(2),
                Token::Star,
                Token::Ident,
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn comments_and_newlines() {
        assert_eq!(
            lex_ok("read A[i] # load\n\nwrite B[i]"),
            vec![
                Token::Read,
                Token::Ident,
                Token::LBracket,
                Token::Ident,
                Token::RBracket,
                Token::Newline,
                Token::Write,
                Token::Ident,
                Token::LBracket,
                Token::Ident,
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn bad_character_is_reported_and_skipped() {
        let result = lex("read ! A");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].span, Span { start: 5, end: 6 });
        assert_eq!(result.tokens.len(), 2);
    }

    #[test]
    fn oversized_integer_is_an_error() {
        let result = lex("99999999999999999999");
        assert_eq!(result.errors.len(), 1);
    }
}

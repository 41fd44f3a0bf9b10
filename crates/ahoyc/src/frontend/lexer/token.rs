//! Ahoy token definitions using logos

use crate::common::Span;
use logos::Logos;
use std::fmt;

/// An Ahoy token with its kind, raw lexeme, and source location
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: String, span: Span) -> Self {
        Self { kind, lexeme, span }
    }
}

fn strip_delimiters(slice: &str) -> String {
    slice[1..slice.len() - 1].to_string()
}

/// Ahoy token kinds
///
/// Newlines are statement terminators, so `\n` (and its explicit spelling
/// `;`) is a token rather than skipped trivia. Spaces, tabs, and `//` line
/// comments never reach the parser.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum TokenKind {
    // Keywords - Control Flow
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("elseif")]
    Elseif,
    #[token("while")]
    While,
    #[token("for")]
    For,
    #[token("in")]
    In,
    #[token("range")]
    Range,
    #[token("count")]
    Count,
    #[token("switch")]
    Switch,
    #[token("case")]
    Case,
    #[token("when")]
    When,
    #[token("return")]
    Return,
    #[token("break")]
    Break,
    #[token("skip")]
    Skip,

    // Keywords - Declarations
    #[token("fn")]
    Fn,
    #[token("struct")]
    Struct,
    #[token("enum")]
    Enum,
    #[token("const")]
    Const,
    #[token("import")]
    Import,
    #[token("as")]
    As,
    #[token("program")]
    Program,

    // Word operators; the symbolic forms alias the canonical words
    #[token("plus")]
    #[token("+")]
    Plus,
    #[token("minus")]
    #[token("-")]
    Minus,
    #[token("times")]
    #[token("*")]
    Times,
    #[token("div")]
    #[token("/")]
    Div,
    #[token("mod")]
    #[token("%")]
    Mod,
    #[token("is")]
    Is,
    #[token("and")]
    And,
    #[token("or")]
    Or,
    #[token("not")]
    Not,
    #[token("greater_than")]
    #[token(">")]
    GreaterThan,
    #[token("less_than")]
    #[token("<")]
    LessThan,
    // Archaic spelling; parsed as `less_than` with a diagnostic
    #[token("lesser_than")]
    LesserThan,

    // Literals
    #[token("true", |_| true)]
    #[token("false", |_| false)]
    Boolean(bool),
    #[regex(r"[0-9]+(\.[0-9]+)?", callback = |lex| lex.slice().to_string())]
    Number(String),
    // Escapes are preserved so the code generator re-emits them verbatim
    #[regex(r#""([^"\\\n]|\\.)*""#, callback = |lex| strip_delimiters(lex.slice()))]
    Str(String),
    #[regex(r"'([^'\\\n]|\\.)'", callback = |lex| strip_delimiters(lex.slice()))]
    CharLit(String),

    // Identifiers
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", priority = 1, callback = |lex| lex.slice().to_string())]
    Ident(String),

    // Punctuation
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
    #[token(":")]
    Colon,
    #[token(".")]
    Dot,
    #[token("=")]
    Equals,
    #[token("=>")]
    Arrow,
    #[token("..")]
    RangeDots,

    // Statement terminators: a line break or an explicit semicolon
    #[token("\n")]
    #[token(";")]
    Newline,

    // Special
    Eof,
    Unknown(String),
}

impl TokenKind {
    /// Keyword category (word operators excluded)
    pub fn is_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::If
                | TokenKind::Else
                | TokenKind::Elseif
                | TokenKind::While
                | TokenKind::For
                | TokenKind::In
                | TokenKind::Range
                | TokenKind::Count
                | TokenKind::Switch
                | TokenKind::Case
                | TokenKind::When
                | TokenKind::Return
                | TokenKind::Break
                | TokenKind::Skip
                | TokenKind::Fn
                | TokenKind::Struct
                | TokenKind::Enum
                | TokenKind::Const
                | TokenKind::Import
                | TokenKind::As
                | TokenKind::Program
        )
    }

    /// Word-operator category
    pub fn is_op_word(&self) -> bool {
        matches!(
            self,
            TokenKind::Plus
                | TokenKind::Minus
                | TokenKind::Times
                | TokenKind::Div
                | TokenKind::Mod
                | TokenKind::Is
                | TokenKind::And
                | TokenKind::Or
                | TokenKind::Not
                | TokenKind::GreaterThan
                | TokenKind::LessThan
                | TokenKind::LesserThan
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::If => write!(f, "if"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::Elseif => write!(f, "elseif"),
            TokenKind::While => write!(f, "while"),
            TokenKind::For => write!(f, "for"),
            TokenKind::In => write!(f, "in"),
            TokenKind::Range => write!(f, "range"),
            TokenKind::Count => write!(f, "count"),
            TokenKind::Switch => write!(f, "switch"),
            TokenKind::Case => write!(f, "case"),
            TokenKind::When => write!(f, "when"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::Break => write!(f, "break"),
            TokenKind::Skip => write!(f, "skip"),
            TokenKind::Fn => write!(f, "fn"),
            TokenKind::Struct => write!(f, "struct"),
            TokenKind::Enum => write!(f, "enum"),
            TokenKind::Const => write!(f, "const"),
            TokenKind::Import => write!(f, "import"),
            TokenKind::As => write!(f, "as"),
            TokenKind::Program => write!(f, "program"),
            TokenKind::Plus => write!(f, "plus"),
            TokenKind::Minus => write!(f, "minus"),
            TokenKind::Times => write!(f, "times"),
            TokenKind::Div => write!(f, "div"),
            TokenKind::Mod => write!(f, "mod"),
            TokenKind::Is => write!(f, "is"),
            TokenKind::And => write!(f, "and"),
            TokenKind::Or => write!(f, "or"),
            TokenKind::Not => write!(f, "not"),
            TokenKind::GreaterThan => write!(f, "greater_than"),
            TokenKind::LessThan => write!(f, "less_than"),
            TokenKind::LesserThan => write!(f, "lesser_than"),
            TokenKind::Boolean(b) => write!(f, "{}", b),
            TokenKind::Number(s) => write!(f, "{}", s),
            TokenKind::Str(s) => write!(f, "\"{}\"", s),
            TokenKind::CharLit(s) => write!(f, "'{}'", s),
            TokenKind::Ident(s) => write!(f, "{}", s),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Equals => write!(f, "="),
            TokenKind::Arrow => write!(f, "=>"),
            TokenKind::RangeDots => write!(f, ".."),
            TokenKind::Newline => write!(f, "newline"),
            TokenKind::Eof => write!(f, "EOF"),
            TokenKind::Unknown(s) => write!(f, "{}", s),
        }
    }
}

//! Ahoy lexer implementation using logos

use super::token::{Token, TokenKind};
use crate::common::{LineMap, Span};
use logos::Logos;

/// Lexer for Ahoy source code
///
/// Tokenization never fails: characters the grammar does not know become
/// `Unknown` tokens and are reported by the parser with their position.
pub struct Lexer<'a> {
    inner: logos::Lexer<'a, TokenKind>,
    line_map: LineMap<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            inner: TokenKind::lexer(source),
            line_map: LineMap::new(source),
        }
    }

    fn span_at(&self, start: usize, end: usize) -> Span {
        let (line, column) = self.line_map.location(start);
        Span::new(start, end, line, column)
    }

    /// Tokenize the entire source, ending with an `Eof` token
    pub fn tokenize_all(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            match self.inner.next() {
                Some(Ok(kind)) => {
                    let range = self.inner.span();
                    let span = self.span_at(range.start, range.end);
                    tokens.push(Token::new(kind, self.inner.slice().to_string(), span));
                }
                Some(Err(())) => {
                    let range = self.inner.span();
                    let span = self.span_at(range.start, range.end);
                    let slice = self.inner.slice().to_string();
                    tokens.push(Token::new(TokenKind::Unknown(slice.clone()), slice, span));
                }
                None => {
                    let len = self.inner.source().len();
                    let span = self.span_at(len, len);
                    tokens.push(Token::new(TokenKind::Eof, String::new(), span));
                    break;
                }
            }
        }
        tokens
    }
}

/// Tokenize Ahoy source text
pub fn tokenize(source: &str) -> Vec<Token> {
    Lexer::new(source).tokenize_all()
}

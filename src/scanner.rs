//! Token sources for the parsers, and a default tokenizer.
//!
//! The parsers only rely on the [`TokenSource`] contract; clients are free
//! (and encouraged) to provide their own scanner. A [`DefaultTokenizer`]
//! backed by a generated lexer is bundled for identifier-style inputs: it
//! recognizes identifiers, integers, floats and strings, and yields any
//! other printable character as a token of its own code point.

use crate::token::{Span, TokType, Token};
use logos::Logos;
use std::any::Any;
use std::fmt;

/// Token category codes of the default tokenizer. Applications may define
/// their own; these mirror the classic text-scanner categories and are all
/// negative so they never collide with character code points.
pub const EOF: TokType = -1;
pub const IDENT: TokType = -2;
pub const INT: TokType = -3;
pub const FLOAT: TokType = -4;
pub const CHAR: TokType = -5;
pub const STRING: TokType = -6;
pub const COMMENT: TokType = -8;

/// Scanner errors. The recognizer treats them as fatal for the current
/// parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("malformed input {lexeme:?} at byte {pos}")]
    Malformed { pos: usize, lexeme: String },
}

/// A source of tokens driving a parse.
///
/// After end of input, every further call must return a token whose type
/// equals [`EOF`] (more precisely: the EOF value the grammar was built
/// against). Spans must be monotonically non-decreasing.
pub trait TokenSource {
    type Tok: Token;

    fn next_token(&mut self) -> Result<Self::Tok, ScanError>;
}

impl<S: TokenSource + ?Sized> TokenSource for &mut S {
    type Tok = S::Tok;

    fn next_token(&mut self) -> Result<Self::Tok, ScanError> {
        (**self).next_token()
    }
}

/// How the default tokenizer reacts to a malformed character.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Recovery {
    /// Surface a [`ScanError`]; the parse aborts.
    #[default]
    Fail,
    /// Skip the offending character and continue scanning.
    Skip,
    /// Yield a synthetic [`CHAR`] token carrying the offending character.
    Synthesize,
}

/// A simple token type, produced by the default tokenizer.
///
/// Clients may provide their own token data type; anything implementing
/// [`Token`] will do.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultToken {
    kind: TokType,
    lexeme: String,
    span: Span,
}

impl DefaultToken {
    pub fn new(kind: TokType, lexeme: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            span,
        }
    }
}

impl Token for DefaultToken {
    fn tok_type(&self) -> TokType {
        self.kind
    }

    fn lexeme(&self) -> &str {
        &self.lexeme
    }

    fn span(&self) -> Span {
        self.span
    }

    fn value(&self) -> Option<&dyn Any> {
        None
    }
}

impl fmt::Display for DefaultToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}|{}", self.lexeme, self.kind)
    }
}

#[derive(Logos, Debug, Copy, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum RawTok {
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    #[regex(r"[0-9]+", priority = 3)]
    Int,

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?")]
    Float,

    #[regex(r#""([^"\\]|\\.)*""#)]
    Str,

    #[regex(r"//[^\n]*")]
    Comment,

    // any other printable ASCII character is a token of its own
    #[regex(r"[!-~]", priority = 1)]
    Punct,
}

/// The bundled tokenizer for identifier-style inputs.
///
/// ```
/// use sylva::scanner::{DefaultTokenizer, TokenSource, INT, EOF};
/// use sylva::token::Token;
///
/// let mut scan = DefaultTokenizer::new("1+2");
/// assert_eq!(scan.next_token().unwrap().tok_type(), INT);
/// assert_eq!(scan.next_token().unwrap().tok_type(), '+' as i32);
/// assert_eq!(scan.next_token().unwrap().tok_type(), INT);
/// assert_eq!(scan.next_token().unwrap().tok_type(), EOF);
/// assert_eq!(scan.next_token().unwrap().tok_type(), EOF); // and ever after
/// ```
pub struct DefaultTokenizer<'s> {
    lexer: logos::Lexer<'s, RawTok>,
    skip_comments: bool,
    recovery: Recovery,
    len: usize,
}

impl<'s> DefaultTokenizer<'s> {
    pub fn new(input: &'s str) -> Self {
        Self {
            lexer: RawTok::lexer(input),
            skip_comments: true,
            recovery: Recovery::default(),
            len: input.len(),
        }
    }

    /// Pass comment tokens through instead of skipping them.
    pub fn keep_comments(mut self) -> Self {
        self.skip_comments = false;
        self
    }

    /// Set the recovery policy for malformed characters.
    pub fn on_error(mut self, recovery: Recovery) -> Self {
        self.recovery = recovery;
        self
    }

    fn eof_token(&self) -> DefaultToken {
        DefaultToken::new(EOF, "", Span(self.len, self.len))
    }
}

impl TokenSource for DefaultTokenizer<'_> {
    type Tok = DefaultToken;

    fn next_token(&mut self) -> Result<DefaultToken, ScanError> {
        loop {
            let raw = match self.lexer.next() {
                Some(raw) => raw,
                None => {
                    tracing::trace!("default tokenizer reached end of input");
                    return Ok(self.eof_token());
                }
            };
            let lexeme = self.lexer.slice();
            let span = Span(self.lexer.span().start, self.lexer.span().end);
            let kind = match raw {
                Ok(RawTok::Ident) => IDENT,
                Ok(RawTok::Int) => INT,
                Ok(RawTok::Float) => FLOAT,
                Ok(RawTok::Str) => STRING,
                Ok(RawTok::Comment) => {
                    if self.skip_comments {
                        continue;
                    }
                    COMMENT
                }
                Ok(RawTok::Punct) => {
                    let ch = lexeme.chars().next().unwrap_or('\0');
                    ch as TokType
                }
                Err(()) => match self.recovery {
                    Recovery::Fail => {
                        return Err(ScanError::Malformed {
                            pos: span.from(),
                            lexeme: lexeme.to_string(),
                        })
                    }
                    Recovery::Skip => continue,
                    Recovery::Synthesize => CHAR,
                },
            };
            return Ok(DefaultToken::new(kind, lexeme, span));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokType> {
        let mut scan = DefaultTokenizer::new(input);
        let mut out = Vec::new();
        loop {
            let tok = scan.next_token().unwrap();
            if tok.tok_type() == EOF {
                return out;
            }
            out.push(tok.tok_type());
        }
    }

    #[test]
    fn categories() {
        assert_eq!(
            kinds("1+2*3"),
            vec![INT, '+' as i32, INT, '*' as i32, INT]
        );
        assert_eq!(kinds("foo 1.5 \"s\""), vec![IDENT, FLOAT, STRING]);
        assert_eq!(kinds("(x)"), vec!['(' as i32, IDENT, ')' as i32]);
    }

    #[test]
    fn spans_are_byte_offsets() {
        let mut scan = DefaultTokenizer::new("ab  cd");
        assert_eq!(scan.next_token().unwrap().span(), Span(0, 2));
        assert_eq!(scan.next_token().unwrap().span(), Span(4, 6));
        assert_eq!(scan.next_token().unwrap().span(), Span(6, 6));
    }

    #[test]
    fn eof_repeats_forever() {
        let mut scan = DefaultTokenizer::new("");
        for _ in 0..3 {
            assert_eq!(scan.next_token().unwrap().tok_type(), EOF);
        }
    }

    #[test]
    fn comments_are_skipped_by_default() {
        assert_eq!(kinds("a // rest\nb"), vec![IDENT, IDENT]);
        let mut scan = DefaultTokenizer::new("// c").keep_comments();
        assert_eq!(scan.next_token().unwrap().tok_type(), COMMENT);
    }

    #[test]
    fn malformed_input_recovery() {
        let mut scan = DefaultTokenizer::new("a § b");
        assert_eq!(scan.next_token().unwrap().tok_type(), IDENT);
        assert!(matches!(
            scan.next_token(),
            Err(ScanError::Malformed { .. })
        ));

        let mut scan = DefaultTokenizer::new("a § b").on_error(Recovery::Skip);
        assert_eq!(scan.next_token().unwrap().tok_type(), IDENT);
        assert_eq!(scan.next_token().unwrap().tok_type(), IDENT);

        let mut scan = DefaultTokenizer::new("§").on_error(Recovery::Synthesize);
        assert_eq!(scan.next_token().unwrap().tok_type(), CHAR);
    }
}

//! Token and span primitives shared by scanners and parsers.

use std::any::Any;
use std::fmt;

/// Category code of a token.
///
/// Applications define their own token types; this crate does not reserve any
/// constants here except `EPSILON`. Scanner-style category codes are negative
/// (see the `scanner` module), single-character tokens conventionally use the
/// character's code point.
pub type TokType = i32;

/// Token type reserved for the ε pseudo-terminal. FIRST sets contain this
/// value for nullable non-terminals, and parse forests use it to label
/// ε-reductions. Applications must not assign it to a real terminal.
pub const EPSILON: TokType = 0;

/// A half-open interval `[from, to)` of input positions covered by a symbol.
///
/// Depending on the layer, positions are byte offsets (scanners) or token
/// indices (parse trees). The zero value is the *null span*.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Span(pub usize, pub usize);

impl Span {
    /// Start position of the span.
    pub fn from(self) -> usize {
        self.0
    }

    /// Position just behind the end of the span.
    pub fn to(self) -> usize {
        self.1
    }

    /// Number of positions covered.
    pub fn len(self) -> usize {
        self.1 - self.0
    }

    pub fn is_empty(self) -> bool {
        self.1 == self.0
    }

    /// Is this the null span, i.e. the zero value?
    pub fn is_null(self) -> bool {
        self == Span::default()
    }

    /// The smallest span covering both `self` and `other`.
    pub fn extend(self, other: Span) -> Span {
        Span(self.0.min(other.0), self.1.max(other.1))
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}…{})", self.0, self.1)
    }
}

/// Input tokens, as produced by a scanner. They reflect terminals in a
/// language.
///
/// An example would be a token for a floating point number:
///
/// ```text
/// tok_type = FLOAT      // category of this kind of token
/// lexeme   = "3.1416"   // how it appeared in the input stream
/// span     = 67…73      // byte positions in the input stream
/// ```
pub trait Token {
    /// The category code of this token.
    fn tok_type(&self) -> TokType;

    /// The token text as it appeared in the input.
    fn lexeme(&self) -> &str;

    /// Byte positions this token covers in the input.
    fn span(&self) -> Span;

    /// Optional semantic value, set by the scanner or by a tree listener.
    fn value(&self) -> Option<&dyn Any> {
        None
    }
}

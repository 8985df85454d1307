//! A table-driven SLR(1) parser.
//!
//! Clients construct a grammar, subject it to analysis and table
//! generation, and drive this parser with the resulting tables. It creates
//! a right derivation for the input, provided through a token source.
//!
//! The parser is intended for small to moderate grammars, e.g. for
//! configuration input or small domain-specific languages; the main focus
//! is adaptability and on-the-fly usage, without a code-generation or
//! compile step. It can only handle SLR(1) grammars: construction fails on
//! tables flagged with conflicts. For ambiguous grammars, use the Earley
//! parser instead.
//!
//! ```
//! use sylva::analysis::Analysis;
//! use sylva::grammar::GrammarBuilder;
//! use sylva::scanner::DefaultTokenizer;
//! use sylva::slr::SlrParser;
//! use sylva::table::TableGenerator;
//!
//! let mut b = GrammarBuilder::new("signed variables");
//! b.lhs("Var").n("Sign").t("id", sylva::scanner::IDENT).end();
//! b.lhs("Sign").t("+", '+' as i32).end();
//! b.lhs("Sign").t("-", '-' as i32).end();
//! b.lhs("Sign").epsilon();
//! let g = b.grammar().unwrap();
//! let ga = Analysis::new(&g);
//! let mut gen = TableGenerator::new(&ga);
//! gen.create_tables();
//! let mut parser = SlrParser::new(&gen).unwrap();
//! let accepted = parser.parse(&mut DefaultTokenizer::new("+a")).unwrap();
//! assert!(accepted);
//! ```

use crate::cfsm::StateID;
use crate::grammar::{Grammar, Rule, RuleID};
use crate::scanner::{ScanError, TokenSource};
use crate::table::{Table, TableGenerator, ACCEPT_ACTION, SHIFT_ACTION};
use crate::token::{Span, TokType, Token};

/// Errors raised by the SLR parser.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SlrError {
    #[error("parse tables contain conflicts; the grammar is not SLR(1)")]
    Conflicts,
    #[error("parser tables have not been created; call create_tables() first")]
    NotInitialized,
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("syntax error at {span}: unexpected token {token:?}")]
    Syntax { span: Span, token: String },
}

// We store triples of CFSM state, grammar symbol value and input span on
// the parse stack.
#[derive(Debug, Copy, Clone)]
struct StackItem {
    state: StateID,
    symbol: TokType,
    span: Span,
}

/// An SLR(1) parser over previously generated GOTO/ACTION tables.
#[derive(Debug)]
pub struct SlrParser<'a, 'g> {
    grammar: &'g Grammar,
    goto_table: &'a Table,
    action_table: &'a Table,
    stack: Vec<StackItem>,
}

impl<'a, 'g> SlrParser<'a, 'g> {
    /// Create an SLR(1) parser from a table generator. Fails when the
    /// tables have not been created yet, or when they carry conflicts.
    pub fn new(gen: &'a TableGenerator<'_, 'g>) -> Result<Self, SlrError> {
        if gen.has_conflicts {
            return Err(SlrError::Conflicts);
        }
        let goto_table = gen.goto_table().ok_or(SlrError::NotInitialized)?;
        let action_table = gen.action_table().ok_or(SlrError::NotInitialized)?;
        Ok(Self {
            grammar: gen.grammar(),
            goto_table,
            action_table,
            stack: Vec::with_capacity(512),
        })
    }

    /// Start a new parse, tokenizing the input through `source`. Returns
    /// whether the input has been accepted.
    pub fn parse<S: TokenSource>(&mut self, source: &mut S) -> Result<bool, SlrError> {
        self.stack.clear();
        self.stack.push(StackItem {
            state: StateID::new(0),
            symbol: 0,
            span: Span::default(),
        });
        let mut token = source.next_token()?;
        loop {
            let tokval = token.tok_type();
            tracing::debug!("got token {:?}/{} from scanner", token.lexeme(), tokval);
            let state = self.tos().state;
            let action = self.action_table.value(state, tokval);
            if action == self.action_table.null_value() {
                return Err(SlrError::Syntax {
                    span: token.span(),
                    token: token.lexeme().to_string(),
                });
            }
            if action == ACCEPT_ACTION {
                return Ok(true);
            } else if action == SHIFT_ACTION {
                let next = self.goto_table.value(state, tokval);
                if next == self.goto_table.null_value() {
                    return Err(SlrError::Syntax {
                        span: token.span(),
                        token: token.lexeme().to_string(),
                    });
                }
                tracing::debug!("shifting, next state = {}", next);
                self.stack.push(StackItem {
                    state: StateID::new(next as u32),
                    symbol: tokval,
                    span: token.span(),
                });
                token = source.next_token()?;
            } else if action > 0 {
                let grammar = self.grammar;
                let rule = grammar.rule(RuleID::from_raw(action as u32));
                let (next, mut span) = self.reduce(rule, token.span(), token.lexeme())?;
                if span.is_null() {
                    // resulted from an ε-production, just before the lookahead
                    let pos = token.span().from().saturating_sub(1);
                    span = Span(pos, pos);
                }
                tracing::debug!("reduced to next state = {}", next);
                self.stack.push(StackItem {
                    state: next,
                    symbol: self.grammar.symbol(rule.lhs()).value(),
                    span,
                });
            } else {
                return Ok(false);
            }
        }
    }

    // Perform a reduce action for a rule LHS → X1 … Xn: pop the states for
    // Xn … X1, extend the handle span, and consult GOTO for the next state.
    fn reduce(
        &mut self,
        rule: &Rule,
        err_span: Span,
        err_token: &str,
    ) -> Result<(StateID, Span), SlrError> {
        tracing::debug!("reduce {}", rule.display(self.grammar));
        let mut span = Span::default();
        for &sym in rule.rhs().iter().rev() {
            let tos = match self.stack.pop() {
                Some(tos) => tos,
                None => {
                    return Err(SlrError::Syntax {
                        span: err_span,
                        token: err_token.to_string(),
                    })
                }
            };
            let expected = self.grammar.symbol(sym).value();
            if tos.symbol != expected {
                tracing::error!("expected {} on top of stack, got {}", expected, tos.symbol);
            }
            span = if span.is_null() {
                tos.span
            } else {
                span.extend(tos.span)
            };
        }
        let state = self.tos().state;
        let lhs = self.grammar.symbol(rule.lhs()).value();
        let next = self.goto_table.value(state, lhs);
        if next == self.goto_table.null_value() {
            return Err(SlrError::Syntax {
                span: err_span,
                token: err_token.to_string(),
            });
        }
        Ok((StateID::new(next as u32), span))
    }

    fn tos(&self) -> StackItem {
        *self.stack.last().expect("parse stack is never empty")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analysis;
    use crate::grammar::GrammarBuilder;
    use crate::scanner::DefaultTokenizer;

    fn signed_var() -> crate::grammar::Grammar {
        let mut b = GrammarBuilder::new("signed");
        b.lhs("Var").n("Sign").t("id", crate::scanner::IDENT).end();
        b.lhs("Sign").t("+", '+' as i32).end();
        b.lhs("Sign").t("-", '-' as i32).end();
        b.lhs("Sign").epsilon();
        b.grammar().unwrap()
    }

    #[test]
    fn accepts_signed_variables() {
        let g = signed_var();
        let ga = Analysis::new(&g);
        let mut gen = TableGenerator::new(&ga);
        gen.create_tables();
        assert!(!gen.has_conflicts);
        for input in ["+a", "-a", "a"] {
            let mut parser = SlrParser::new(&gen).unwrap();
            let mut scan = DefaultTokenizer::new(input);
            assert!(parser.parse(&mut scan).unwrap(), "rejected {:?}", input);
        }
    }

    #[test]
    fn rejects_bad_input() {
        let g = signed_var();
        let ga = Analysis::new(&g);
        let mut gen = TableGenerator::new(&ga);
        gen.create_tables();
        let mut parser = SlrParser::new(&gen).unwrap();
        let mut scan = DefaultTokenizer::new("+1");
        assert!(matches!(
            parser.parse(&mut scan),
            Err(SlrError::Syntax { .. })
        ));
    }

    #[test]
    fn conflicting_tables_are_fatal() {
        let mut b = GrammarBuilder::new("amb");
        b.lhs("X").n("X").t("*", '*' as i32).n("X").end();
        b.lhs("X").t("x", 1).end();
        let g = b.grammar().unwrap();
        let ga = Analysis::new(&g);
        let mut gen = TableGenerator::new(&ga);
        gen.create_tables();
        assert!(matches!(SlrParser::new(&gen), Err(SlrError::Conflicts)));
    }

    #[test]
    fn missing_tables_are_fatal() {
        let g = signed_var();
        let ga = Analysis::new(&g);
        let gen = TableGenerator::new(&ga);
        assert!(matches!(
            SlrParser::new(&gen),
            Err(SlrError::NotInitialized)
        ));
    }
}

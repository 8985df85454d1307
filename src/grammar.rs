//! Grammar types and the grammar builder.
//!
//! Grammars are specified programmatically through a [`GrammarBuilder`].
//! Clients add rules consisting of non-terminal symbols and terminals;
//! terminals carry an application-defined token type. Grammars may contain
//! ε-productions.
//!
//! ```
//! use sylva::grammar::GrammarBuilder;
//!
//! let mut b = GrammarBuilder::new("G");
//! b.lhs("S").n("A").t("a", 1).end(); // S → A a
//! b.lhs("A").t("b", 2).end();        // A → b
//! b.lhs("A").epsilon();              // A →
//! let grammar = b.grammar().unwrap();
//! assert_eq!(grammar.rule_count(), 4); // rule 0 is S' → S
//! ```

use crate::scanner;
use crate::token::{TokType, EPSILON};
use crate::Map;
use std::fmt;

const SYMBOL_ID_OFFSET: u32 = 0x4;

/// Values of non-terminal symbols are assigned monotonically from this base,
/// so they cannot collide with terminal token types (negative category codes
/// or character code points below the base) in the shared GOTO column space.
pub const NONTERMINAL_VALUE_BASE: TokType = 0x400;

/// Handle identifying a [`Symbol`] within its [`Grammar`].
///
/// Symbol identity is by handle: the builder guarantees that equal names
/// never produce two symbols.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SymbolID {
    raw: u32,
}

impl SymbolID {
    /// Reserved symbol for the ε pseudo-terminal.
    pub const EPSILON: Self = Self::new(0);
    /// Reserved terminal symbol meaning end of input.
    pub const EOF: Self = Self::new(1);
    /// Reserved non-terminal `S'`, wrapped around the user start symbol
    /// during finalization.
    pub const ACCEPT: Self = Self::new(2);

    #[inline]
    const fn new(raw: u32) -> Self {
        Self { raw }
    }
}

impl fmt::Debug for SymbolID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::EPSILON => write!(f, "ε"),
            Self::EOF => write!(f, "#eof"),
            Self::ACCEPT => write!(f, "S'"),
            Self { raw } => write!(f, "SymbolID({})", raw),
        }
    }
}

/// A grammar symbol: either a terminal or a non-terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    name: String,
    kind: SymbolKind,
    value: TokType,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SymbolKind {
    Terminal,
    Nonterminal,
}

impl Symbol {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, SymbolKind::Terminal)
    }

    pub fn is_eof(&self) -> bool {
        self.kind == SymbolKind::Terminal && self.value == scanner::EOF
    }

    pub fn is_epsilon(&self) -> bool {
        self.value == EPSILON
    }

    /// The integer value of this symbol: for terminals the token type, for
    /// non-terminals a serial assigned by the builder (always positive, at
    /// least [`NONTERMINAL_VALUE_BASE`]).
    pub fn value(&self) -> TokType {
        self.value
    }

    /// For terminals, the token type this symbol matches.
    pub fn token_type(&self) -> TokType {
        self.value
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Handle identifying a [`Rule`] within its [`Grammar`].
///
/// Rules are numbered by insertion order; rule 0 is the synthetic `S' → S`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct RuleID {
    raw: u32,
}

impl RuleID {
    /// The top-level rule `S' → S`, prepended during finalization.
    pub const ACCEPT: Self = Self::new(0);

    #[inline]
    const fn new(raw: u32) -> Self {
        Self { raw }
    }

    #[inline]
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self { raw }
    }

    /// The ordinal number of this rule.
    #[inline]
    pub fn index(self) -> usize {
        self.raw as usize
    }
}

impl fmt::Debug for RuleID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.raw)
    }
}

impl fmt::Display for RuleID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.raw, f)
    }
}

/// A production rule `LHS → RHS`. An empty RHS denotes an ε-production.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    lhs: SymbolID,
    rhs: Vec<SymbolID>,
}

impl Rule {
    pub fn lhs(&self) -> SymbolID {
        self.lhs
    }

    pub fn rhs(&self) -> &[SymbolID] {
        &self.rhs
    }

    pub fn is_epsilon(&self) -> bool {
        self.rhs.is_empty()
    }

    pub fn display<'g>(&'g self, grammar: &'g Grammar) -> impl fmt::Display + 'g {
        RuleDisplay {
            grammar,
            rule: self,
        }
    }
}

struct RuleDisplay<'g> {
    grammar: &'g Grammar,
    rule: &'g Rule,
}

impl fmt::Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self { grammar, rule } = self;
        write!(f, "{} ::=", grammar.symbol(rule.lhs).name())?;
        for symbol in &rule.rhs {
            write!(f, " {}", grammar.symbol(*symbol).name())?;
        }
        if rule.rhs.is_empty() {
            f.write_str(" ε")?;
        }
        Ok(())
    }
}

/// The grammar definition used by the analyzer and the parsers.
///
/// Immutable after the builder is closed. Keeps rules in insertion order,
/// indexes rules by LHS for the prediction step and symbols by name.
#[derive(Debug, PartialEq)]
pub struct Grammar {
    name: String,
    symbols: Map<SymbolID, Symbol>,
    by_name: Map<String, SymbolID>,
    rules: Vec<Rule>,
    by_lhs: Map<SymbolID, Vec<RuleID>>,
    start: SymbolID,
}

impl Grammar {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol(&self, id: SymbolID) -> &Symbol {
        &self.symbols[&id]
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolID, &Symbol)> + '_ {
        self.symbols.iter().map(|(id, sym)| (*id, sym))
    }

    pub fn terminals(&self) -> impl Iterator<Item = (SymbolID, &Symbol)> + '_ {
        self.symbols().filter(|(_, sym)| sym.is_terminal())
    }

    pub fn nonterminals(&self) -> impl Iterator<Item = (SymbolID, &Symbol)> + '_ {
        self.symbols().filter(|(_, sym)| !sym.is_terminal())
    }

    pub fn symbol_by_name(&self, name: &str) -> Option<SymbolID> {
        self.by_name.get(name).copied()
    }

    /// Find the terminal symbol carrying the given token type.
    pub fn terminal_by_type(&self, tok: TokType) -> Option<SymbolID> {
        self.symbols
            .iter()
            .find_map(|(id, sym)| (sym.is_terminal() && sym.value == tok).then_some(*id))
    }

    pub fn rule(&self, id: RuleID) -> &Rule {
        &self.rules[id.index()]
    }

    pub fn rules(&self) -> impl Iterator<Item = (RuleID, &Rule)> + '_ {
        self.rules
            .iter()
            .enumerate()
            .map(|(i, rule)| (RuleID::new(i as u32), rule))
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// All rules with the given non-terminal on the left-hand side.
    pub fn rules_for(&self, lhs: SymbolID) -> &[RuleID] {
        self.by_lhs.get(&lhs).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The user start symbol `S` (not the wrapping `S'`).
    pub fn start_symbol(&self) -> SymbolID {
        self.start
    }

    pub fn epsilon(&self) -> SymbolID {
        SymbolID::EPSILON
    }

    pub fn eof(&self) -> SymbolID {
        SymbolID::EOF
    }

    pub fn accept_symbol(&self) -> SymbolID {
        SymbolID::ACCEPT
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "grammar {}:", self.name)?;
        write!(f, "  terminals:")?;
        for (_, sym) in self.terminals() {
            write!(f, " {}", sym.name())?;
        }
        write!(f, "\n  nonterminals:")?;
        for (_, sym) in self.nonterminals() {
            write!(f, " {}", sym.name())?;
        }
        writeln!(f, "\n  start: {}", self.symbol(self.start).name())?;
        for (id, rule) in self.rules() {
            writeln!(f, "  [{:02}] {}", id, rule.display(self))?;
        }
        Ok(())
    }
}

/// Errors raised while building a grammar, surfaced from
/// [`GrammarBuilder::grammar`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    #[error("no grammar rules have been added")]
    NoRules,
    #[error("no rule has been started; call lhs() first")]
    LhsNotStarted,
    #[error("rule for {0:?} has not been finished")]
    UnfinishedRule(String),
    #[error("terminal {name:?} re-declared with token type {new} (was {old})")]
    TerminalConflict {
        name: String,
        old: TokType,
        new: TokType,
    },
    #[error("symbol {0:?} is used both as a terminal and a non-terminal")]
    KindConflict(String),
    #[error("token type {0} is reserved")]
    ReservedTokenType(TokType),
    #[error("epsilon() called on a non-empty right-hand side for {0:?}")]
    NonEmptyEpsilon(String),
}

/// Builder for [`Grammar`] values.
///
/// `lhs(name)` begins a rule, `n(name)` and `t(name, tok)` append symbols,
/// `end()` finalizes the rule and `epsilon()` finalizes an empty rule.
/// On finalization a synthetic rule `S' → S` is prepended at index 0, where
/// `S` is the LHS of the first rule added. End of input is supplied by the
/// token source; grammars that want an explicit EOF terminal can append one
/// with `eof()`.
#[derive(Debug)]
pub struct GrammarBuilder {
    name: String,
    symbols: Map<SymbolID, Symbol>,
    by_name: Map<String, SymbolID>,
    rules: Vec<Rule>,
    current: Option<Rule>,
    next_symbol_id: u32,
    next_nonterm_value: TokType,
    error: Option<GrammarError>,
}

impl GrammarBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let mut symbols = Map::default();
        let mut by_name = Map::default();
        for (id, name, kind, value) in [
            (SymbolID::EPSILON, "ε", SymbolKind::Terminal, EPSILON),
            (SymbolID::EOF, "#eof", SymbolKind::Terminal, scanner::EOF),
            (
                SymbolID::ACCEPT,
                "S'",
                SymbolKind::Nonterminal,
                NONTERMINAL_VALUE_BASE,
            ),
        ] {
            symbols.insert(
                id,
                Symbol {
                    name: name.to_string(),
                    kind,
                    value,
                },
            );
            by_name.insert(name.to_string(), id);
        }
        Self {
            name: name.into(),
            symbols,
            by_name,
            rules: Vec::new(),
            current: None,
            next_symbol_id: SYMBOL_ID_OFFSET,
            next_nonterm_value: NONTERMINAL_VALUE_BASE + 1,
            error: None,
        }
    }

    fn fail(&mut self, err: GrammarError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn intern(&mut self, name: &str, kind: SymbolKind, value: Option<TokType>) -> SymbolID {
        if let Some(&id) = self.by_name.get(name) {
            let sym = &self.symbols[&id];
            if sym.kind != kind {
                self.fail(GrammarError::KindConflict(name.to_string()));
            } else if let Some(value) = value {
                if sym.value != value {
                    self.fail(GrammarError::TerminalConflict {
                        name: name.to_string(),
                        old: sym.value,
                        new: value,
                    });
                }
            }
            return id;
        }
        let id = SymbolID::new(self.next_symbol_id);
        self.next_symbol_id += 1;
        let value = value.unwrap_or_else(|| {
            let v = self.next_nonterm_value;
            self.next_nonterm_value += 1;
            v
        });
        self.symbols.insert(
            id,
            Symbol {
                name: name.to_string(),
                kind,
                value,
            },
        );
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Begin a new rule with the given non-terminal on the left-hand side.
    pub fn lhs(&mut self, name: &str) -> &mut Self {
        if let Some(unfinished) = self.current.take() {
            let name = self.symbols[&unfinished.lhs].name.clone();
            self.fail(GrammarError::UnfinishedRule(name));
        }
        let lhs = self.intern(name, SymbolKind::Nonterminal, None);
        self.current = Some(Rule {
            lhs,
            rhs: Vec::new(),
        });
        self
    }

    /// Append a non-terminal to the right-hand side of the current rule.
    pub fn n(&mut self, name: &str) -> &mut Self {
        let id = self.intern(name, SymbolKind::Nonterminal, None);
        self.append(id)
    }

    /// Append a terminal with the given token type to the current rule.
    pub fn t(&mut self, name: &str, tok: TokType) -> &mut Self {
        if tok == EPSILON {
            self.fail(GrammarError::ReservedTokenType(tok));
            return self;
        }
        let id = self.intern(name, SymbolKind::Terminal, Some(tok));
        self.append(id)
    }

    /// Append the reserved EOF terminal to the current rule.
    pub fn eof(&mut self) -> &mut Self {
        self.append(SymbolID::EOF)
    }

    fn append(&mut self, id: SymbolID) -> &mut Self {
        match self.current.as_mut() {
            Some(rule) => rule.rhs.push(id),
            None => self.fail(GrammarError::LhsNotStarted),
        }
        self
    }

    /// Finalize the current rule.
    pub fn end(&mut self) -> &mut Self {
        match self.current.take() {
            Some(rule) => self.rules.push(rule),
            None => self.fail(GrammarError::LhsNotStarted),
        }
        self
    }

    /// Finalize the current rule as an ε-production.
    pub fn epsilon(&mut self) -> &mut Self {
        match self.current.take() {
            Some(rule) if rule.rhs.is_empty() => self.rules.push(rule),
            Some(rule) => {
                let name = self.symbols[&rule.lhs].name.clone();
                self.fail(GrammarError::NonEmptyEpsilon(name));
            }
            None => self.fail(GrammarError::LhsNotStarted),
        }
        self
    }

    /// Close the builder and produce the grammar.
    pub fn grammar(mut self) -> Result<Grammar, GrammarError> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        if let Some(unfinished) = self.current.take() {
            let name = self.symbols[&unfinished.lhs].name.clone();
            return Err(GrammarError::UnfinishedRule(name));
        }
        if self.rules.is_empty() {
            return Err(GrammarError::NoRules);
        }

        let start = self.rules[0].lhs;
        let mut rules = Vec::with_capacity(self.rules.len() + 1);
        rules.push(Rule {
            lhs: SymbolID::ACCEPT,
            rhs: vec![start],
        });
        rules.extend(self.rules);

        let mut by_lhs: Map<SymbolID, Vec<RuleID>> = Map::default();
        for (i, rule) in rules.iter().enumerate() {
            by_lhs
                .entry(rule.lhs)
                .or_default()
                .push(RuleID::new(i as u32));
        }

        Ok(Grammar {
            name: self.name,
            symbols: self.symbols,
            by_name: self.by_name,
            rules,
            by_lhs,
            start,
        })
    }
}

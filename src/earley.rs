//! An Earley parser.
//!
//! The recognizer operates over an analyzed grammar and tolerates ambiguity,
//! left-recursion, ε-productions and arbitrary context-free structure. It
//! constructs a sequence of state sets `S0 … Sn`, one per input position,
//! each holding Earley items `[A → α•β, j]`. The sets are built in
//! increasing order as the input is read; each set acts as a work queue:
//! items are examined in arrival order, applying scan, predict and complete,
//! and items added to a set are appended onto its end (see
//! "Practical Earley Parsing" by Aycock & Horspool, 2002).
//!
//! After an accepting parse the state sets remain inspectable; a listener
//! can be driven over the derivation with [`EarleyParser::walk_derivation`],
//! and a [`TreeBuilder`] listener produces a shared packed parse forest.

use crate::analysis::Analysis;
use crate::grammar::{RuleID, SymbolID};
use crate::item::{Item, ItemSet};
use crate::scanner::{ScanError, TokenSource};
use crate::sppf::{Forest, SymNodeID};
use crate::token::{Span, Token};
use crate::{Map, Set};
use std::fmt;

/// Options controlling an [`EarleyParser`].
pub struct EarleyOptions {
    /// Create a parse forest for a successful parse. Defaults to `false`.
    pub generate_tree: bool,
    /// Remember all input tokens. This is necessary for listeners during
    /// tree walks to have access to the tokens of terminals. Defaults to
    /// `true`.
    pub store_tokens: bool,
    /// Ambiguity-resolution override for the derivation walk. When several
    /// completed items are viable for a child position, the default picks
    /// the longest rule first, then the lowest rule index, then the
    /// smallest origin; a custom chooser replaces that policy.
    pub choose: Option<Box<dyn Fn(&[Item]) -> Item>>,
}

impl Default for EarleyOptions {
    fn default() -> Self {
        Self {
            generate_tree: false,
            store_tokens: true,
            choose: None,
        }
    }
}

impl fmt::Debug for EarleyOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EarleyOptions")
            .field("generate_tree", &self.generate_tree)
            .field("store_tokens", &self.store_tokens)
            .field("choose", &self.choose.as_ref().map(|_| "custom"))
            .finish()
    }
}

/// Errors surfaced by [`EarleyParser::parse`]. Every error aborts the
/// current parse; nothing is recovered locally.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("syntax error at position {position}: unexpected token {token:?}, expected one of {expected:?}")]
    Syntax {
        position: usize,
        token: String,
        expected: Vec<String>,
    },
}

/// Errors raised while reconstructing a derivation from the state sets.
/// Tree building is best-effort: the parser logs the error and yields no
/// forest, the acceptance bit is retained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeBuildError {
    #[error("input was not accepted; there is no derivation to walk")]
    NotAccepted,
    #[error("token buffer unavailable; parser was configured without store_tokens")]
    TokensNotStored,
    #[error("derivation walk is stuck: {0}")]
    Stuck(String),
    #[error("expected root of the forest to be the start symbol, is {0}")]
    BadRoot(String),
}

/// Completed items already being expanded on the current walk path, keyed
/// by their end position; breaks direct and indirect ambiguity cycles. A
/// finite derivation never contains the same completed item twice at the
/// same end position on one root-to-leaf path.
#[derive(Debug, Clone, Default)]
struct Trys(Set<(Item, usize)>);

impl Trys {
    fn with(mut self, item: Item, pos: usize) -> Self {
        self.0.insert((item, pos));
        self
    }

    fn contains(&self, item: Item, pos: usize) -> bool {
        self.0.contains(&(item, pos))
    }
}

/// A node occurring during a derivation walk: the reduced symbol, the input
/// span it covers (in token positions) and the listener-defined value.
#[derive(Debug, Clone)]
pub struct DerivationNode<V> {
    pub symbol: SymbolID,
    pub span: Span,
    pub value: V,
}

/// A listener for walking the derivation produced by a parse. It is called
/// for every terminal and for every non-terminal reduction, bottom-up.
pub trait DerivationListener<T: Token> {
    type Val: Clone;

    /// Called for each completed rule. `children` covers the right-hand
    /// side in order; it is empty for ε-reductions.
    fn reduce(
        &mut self,
        lhs: SymbolID,
        rule: RuleID,
        children: &[DerivationNode<Self::Val>],
        span: Span,
        level: usize,
    ) -> Self::Val;

    /// Called for each matched input token. The span is the token-position
    /// interval `[pos-1, pos)`.
    fn terminal(&mut self, token: &T, span: Span, level: usize) -> Self::Val;
}

/// The Earley parser. Create one with [`EarleyParser::new`] from an
/// analyzed grammar, then call [`EarleyParser::parse`] with a token source.
pub struct EarleyParser<'g, T: Token> {
    ga: &'g Analysis<'g>,
    states: Vec<ItemSet>,
    tokens: Vec<T>,
    backlinks: Map<(Item, usize), Item>,
    options: EarleyOptions,
    forest: Option<Forest<'g>>,
    sc: usize,
}

impl<'g, T: Token> EarleyParser<'g, T> {
    pub fn new(ga: &'g Analysis<'g>, options: EarleyOptions) -> Self {
        Self {
            ga,
            states: Vec::with_capacity(512),
            tokens: Vec::with_capacity(512),
            backlinks: Map::default(),
            options,
            forest: None,
            sc: 0,
        }
    }

    pub fn analysis(&self) -> &'g Analysis<'g> {
        self.ga
    }

    /// Start a new parse, consuming tokens from `source` until it yields
    /// EOF. Returns whether the input has been accepted.
    ///
    /// When the parser was created with `generate_tree`, an accepting parse
    /// additionally builds the parse forest, available from
    /// [`EarleyParser::forest`].
    pub fn parse<S>(&mut self, source: &mut S) -> Result<bool, ParseError>
    where
        S: TokenSource<Tok = T>,
    {
        let grammar = self.ga.grammar();
        let eof = grammar.symbol(grammar.eof()).token_type();

        self.states.clear();
        self.tokens.clear();
        self.backlinks.clear();
        self.forest = None;
        self.sc = 0;

        let mut s0 = ItemSet::new();
        s0.add(Item::start(RuleID::ACCEPT)); // S0 = { [S'→•S, 0] }
        self.states.push(s0);

        let mut token = source.next_token()?;
        loop {
            let tokval = token.tok_type();
            tracing::debug!(
                "scanner read {:?}|{} @ {}",
                token.lexeme(),
                tokval,
                token.span()
            );
            let lexeme = token.lexeme().to_string();
            let i = self.setup_next_state(token);
            self.inner_loop(i, tokval);
            if tokval == eof {
                break;
            }
            if self.states[i + 1].is_empty() {
                return Err(self.syntax_error(i, lexeme));
            }
            token = source.next_token()?;
        }

        // A grammar carrying an explicit EOF terminal scans EOF into a
        // fresh state; run the completer over it so the start rule reduces.
        if !self.states[self.sc].is_empty() {
            self.states.push(ItemSet::new());
            let i = self.sc;
            self.sc += 1;
            self.inner_loop(i, eof);
        }

        let accept = self.check_accept();
        if accept && self.options.generate_tree {
            if let Err(err) = self.build_tree() {
                tracing::error!("parse forest construction failed: {}", err);
                self.forest = None;
            }
        }
        Ok(accept)
    }

    // Invariant: we are in set S_i and prepare S_{i+1}.
    fn setup_next_state(&mut self, token: T) -> usize {
        self.states.push(ItemSet::new());
        if self.options.store_tokens {
            self.tokens.push(token);
        }
        let i = self.sc;
        self.sc += 1;
        i
    }

    // The inner loop iterates over S_i in arrival order, applying scan,
    // predict and complete to each item exactly once.
    fn inner_loop(&mut self, i: usize, tokval: i32) {
        self.states[i].iterate_once();
        while let Some(item) = self.states[i].next_item() {
            self.scan(i, item, tokval);
            self.predict(i, item);
            self.complete(i, item);
        }
        tracing::trace!("S{} has {} items", i, self.states[i].len());
    }

    // Scan: if [A→…•a…, j] is in S_i and a matches the current token,
    // add [A→…a•…, j] to S_{i+1}.
    fn scan(&mut self, i: usize, item: Item, tokval: i32) {
        let grammar = self.ga.grammar();
        if let Some(a) = item.peek(grammar) {
            let sym = grammar.symbol(a);
            if sym.is_terminal() && sym.token_type() == tokval {
                if let Some(advanced) = item.advance(grammar) {
                    self.states[i + 1].add(advanced);
                }
            }
        }
    }

    // Predict: if [A→…•B…, j] is in S_i, add [B→•γ, i] to S_i for all rules
    // B→γ. If B is nullable, also add [A→…B•…, j] to S_i (Aycock–Horspool).
    fn predict(&mut self, i: usize, item: Item) {
        let grammar = self.ga.grammar();
        let Some(b) = item.peek(grammar) else { return };
        if grammar.symbol(b).is_terminal() {
            return;
        }
        for &rule in grammar.rules_for(b) {
            self.states[i].add(Item::start(rule).originating(i));
        }
        if self.ga.derives_epsilon(b) {
            if let Some(advanced) = item.advance(grammar) {
                self.states[i].add(advanced);
            }
        }
    }

    // Complete: if [A→…•, j] is in S_i, add [B→…A•…, k] to S_i for all
    // items [B→…•A…, k] in S_j. When the advanced item becomes reducible,
    // a backlink is recorded for tree construction.
    fn complete(&mut self, i: usize, item: Item) {
        let grammar = self.ga.grammar();
        if !item.is_reducible(grammar) {
            return;
        }
        let a = grammar.rule(item.rule).lhs();
        let j = item.origin;
        let waiting: Vec<Item> = self.states[j]
            .iter()
            .filter(|jtem| jtem.peek(grammar) == Some(a))
            .copied()
            .collect();
        for jtem in waiting {
            if let Some(advanced) = jtem.advance(grammar) {
                if advanced.is_reducible(grammar) {
                    self.backlinks.insert((advanced, i), item);
                }
                self.states[i].add(advanced);
            }
        }
    }

    // Search the final state for a reducible item of the start rule: the
    // state the last token landed in, after its completion pass.
    fn accepting_item(&self) -> Option<(Item, usize)> {
        let grammar = self.ga.grammar();
        let idx = self.sc.checked_sub(1)?;
        self.states
            .get(idx)?
            .iter()
            .copied()
            .find(|item| {
                item.rule == RuleID::ACCEPT && item.is_reducible(grammar) && item.origin == 0
            })
            .map(|item| (item, idx))
    }

    fn check_accept(&self) -> bool {
        self.accepting_item().is_some()
    }

    fn syntax_error(&self, i: usize, lexeme: String) -> ParseError {
        let grammar = self.ga.grammar();
        let mut expected: Vec<String> = Vec::new();
        for item in self.states[i].iter() {
            if let Some(a) = item.peek(grammar) {
                let sym = grammar.symbol(a);
                if sym.is_terminal() && !sym.is_eof() {
                    let name = sym.name().to_string();
                    if !expected.contains(&name) {
                        expected.push(name);
                    }
                }
            }
        }
        ParseError::Syntax {
            position: i + 1,
            token: lexeme,
            expected,
        }
    }

    /// The input token at (1-based) position `pos`. Only available when the
    /// parser stores tokens.
    pub fn token_at(&self, pos: usize) -> Option<&T> {
        pos.checked_sub(1).and_then(|i| self.tokens.get(i))
    }

    /// All stored input tokens, in input order.
    pub fn tokens(&self) -> &[T] {
        &self.tokens
    }

    /// The parse forest of the last accepting parse, if `generate_tree`
    /// was set and forest construction succeeded.
    pub fn forest(&self) -> Option<&Forest<'g>> {
        self.forest.as_ref()
    }

    /// Detach the parse forest from the parser.
    pub fn take_forest(&mut self) -> Option<Forest<'g>> {
        self.forest.take()
    }

    /// Walk the derivation produced by the last accepting parse, calling
    /// the listener for every terminal and every reduction.
    pub fn walk_derivation<L>(
        &self,
        listener: &mut L,
    ) -> Result<DerivationNode<L::Val>, TreeBuildError>
    where
        L: DerivationListener<T>,
    {
        let (accepting, pos) = self.accepting_item().ok_or(TreeBuildError::NotAccepted)?;
        let trys = Trys::default().with(accepting, pos);
        self.walk(accepting, pos, &trys, listener, 0)
    }

    // The fewest input positions a sequence of grammar symbols can cover:
    // terminals take one position, nullable non-terminals may take none.
    fn min_width(&self, symbols: &[SymbolID]) -> usize {
        let grammar = self.ga.grammar();
        symbols
            .iter()
            .filter(|&&sym| grammar.symbol(sym).is_terminal() || !self.ga.derives_epsilon(sym))
            .count()
    }

    // Walk backwards over the items of the Earley states. For a reducible
    // item [A → X1…Xm •, j] ending at `pos`, resolve each Xk right-to-left:
    // terminals consume one position, non-terminals are resolved by a
    // completed item [Xk → …•, p] found in the state set at the current
    // position. A candidate is viable when its origin is reachable by the
    // unresolved RHS prefix and it is not already being expanded on this
    // walk path (`trys`). Ambiguity among viable completers is resolved by
    // the recorded backlink (rightmost child) or the configured policy;
    // losing same-span candidates are walked as well, so their reductions
    // materialize as or-edges in a forest-building listener.
    fn walk<L>(
        &self,
        item: Item,
        pos: usize,
        trys: &Trys,
        listener: &mut L,
        level: usize,
    ) -> Result<DerivationNode<L::Val>, TreeBuildError>
    where
        L: DerivationListener<T>,
    {
        let grammar = self.ga.grammar();
        let rule = grammar.rule(item.rule);
        let extent = Span(item.origin, pos);
        tracing::debug!("walk from item {} {}", item.display(grammar), extent);

        let rhs = rule.rhs();
        let l = rhs.len();
        let mut children_rev: Vec<DerivationNode<L::Val>> = Vec::with_capacity(l);
        let end = pos;
        let mut pos = pos;

        for (n, &b) in rhs.iter().rev().enumerate() {
            let k = l - 1 - n; // index of this symbol within the RHS
            let leftmost = k == 0;
            let bsym = grammar.symbol(b);
            if bsym.is_terminal() {
                let token = self.token_at(pos).ok_or(TreeBuildError::TokensNotStored)?;
                let span = Span(pos - 1, pos);
                let value = listener.terminal(token, span, level + 1);
                children_rev.push(DerivationNode {
                    symbol: b,
                    span,
                    value,
                });
                pos -= 1;
                continue;
            }

            let min_origin = item.origin + self.min_width(&rhs[..k]);
            let viable: Vec<Item> = self.states[pos]
                .iter()
                .filter(|it| it.is_reducible(grammar) && grammar.rule(it.rule).lhs() == b)
                .filter(|it| it.origin >= min_origin)
                .filter(|it| !leftmost || it.origin == item.origin)
                .filter(|it| !trys.contains(**it, pos))
                .copied()
                .collect();

            let chosen = match viable.len() {
                0 => {
                    return Err(TreeBuildError::Stuck(format!(
                        "no completed item for {} at position {} satisfies {}",
                        bsym.name(),
                        pos,
                        item.display(grammar)
                    )))
                }
                1 => viable[0],
                _ => {
                    let backlink = if n == 0 {
                        self.backlinks
                            .get(&(item, end))
                            .copied()
                            .filter(|bl| viable.contains(bl))
                    } else {
                        None
                    };
                    let chosen = backlink
                        .or_else(|| self.choose_completer(&viable))
                        .ok_or_else(|| {
                            TreeBuildError::Stuck(format!(
                                "no completed item available to satisfy {}",
                                item.display(grammar)
                            ))
                        })?;
                    // losing same-span candidates still materialize as
                    // or-edges in the forest
                    for alt in viable.iter().copied() {
                        if alt != chosen && alt.origin == chosen.origin {
                            let alt_trys = trys.clone().with(alt, pos);
                            if let Err(err) = self.walk(alt, pos, &alt_trys, listener, level + 1)
                            {
                                tracing::debug!("ambiguous alternative abandoned: {}", err);
                            }
                        }
                    }
                    tracing::debug!("selected {}", chosen.display(grammar));
                    chosen
                }
            };

            let child_trys = trys.clone().with(chosen, pos);
            let node = self.walk(chosen, pos, &child_trys, listener, level + 1)?;
            children_rev.push(node);
            pos = chosen.origin;
        }

        if pos != item.origin {
            return Err(TreeBuildError::Stuck(
                "did not reach start of rule derivation".to_string(),
            ));
        }

        children_rev.reverse();
        let value = listener.reduce(rule.lhs(), item.rule, &children_rev, extent, level);
        tracing::trace!(
            "tree node {}|--{}--|{}",
            extent.from(),
            grammar.symbol(rule.lhs()).name(),
            extent.to()
        );
        Ok(DerivationNode {
            symbol: rule.lhs(),
            span: extent,
            value,
        })
    }

    // Resolve an ambiguous child position: longest rule first, then lowest
    // rule index, then smallest origin, unless the client installed its own
    // chooser.
    fn choose_completer(&self, viable: &[Item]) -> Option<Item> {
        if viable.is_empty() {
            return None;
        }
        if let Some(choose) = &self.options.choose {
            return Some(choose(viable));
        }
        let grammar = self.ga.grammar();
        viable.iter().copied().max_by(|a, b| {
            let len_a = grammar.rule(a.rule).rhs().len();
            let len_b = grammar.rule(b.rule).rhs().len();
            len_a
                .cmp(&len_b)
                .then_with(|| b.rule.cmp(&a.rule))
                .then_with(|| b.origin.cmp(&a.origin))
        })
    }

    // Build a parse forest from the derivation, using the TreeBuilder
    // listener.
    fn build_tree(&mut self) -> Result<(), TreeBuildError> {
        let grammar = self.ga.grammar();
        let mut builder = TreeBuilder::new(grammar);
        let root = self.walk_derivation(&mut builder)?;
        if root.symbol != SymbolID::ACCEPT || root.value.is_none() {
            return Err(TreeBuildError::BadRoot(
                grammar.symbol(root.symbol).name().to_string(),
            ));
        }
        self.forest = Some(builder.into_forest());
        Ok(())
    }
}

/// A derivation listener creating a shared packed parse forest from the
/// Earley states. Users may drive it themselves through
/// [`EarleyParser::walk_derivation`], but the more common pattern is the
/// parser option `generate_tree` combined with [`EarleyParser::forest`].
pub struct TreeBuilder<'g> {
    grammar: &'g crate::grammar::Grammar,
    forest: Forest<'g>,
}

impl<'g> TreeBuilder<'g> {
    pub fn new(grammar: &'g crate::grammar::Grammar) -> Self {
        Self {
            grammar,
            forest: Forest::new(grammar),
        }
    }

    pub fn forest(&self) -> &Forest<'g> {
        &self.forest
    }

    pub fn into_forest(self) -> Forest<'g> {
        self.forest
    }
}

impl<'g, T: Token> DerivationListener<T> for TreeBuilder<'g> {
    type Val = Option<SymNodeID>;

    fn reduce(
        &mut self,
        lhs: SymbolID,
        rule: RuleID,
        children: &[DerivationNode<Self::Val>],
        span: Span,
        _level: usize,
    ) -> Self::Val {
        if children.is_empty() {
            return Some(self.forest.add_epsilon_reduction(lhs, rule, span.from()));
        }
        let nodes: Option<Vec<SymNodeID>> = children.iter().map(|c| c.value).collect();
        self.forest.add_reduction(lhs, rule, &nodes?)
    }

    fn terminal(&mut self, token: &T, span: Span, _level: usize) -> Self::Val {
        let sym = self.grammar.terminal_by_type(token.tok_type())?;
        Some(self.forest.add_terminal(sym, span.from()))
    }
}

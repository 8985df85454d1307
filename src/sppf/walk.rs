//! Traversing a parse forest.
//!
//! A [`Cursor`] is a movable mark within a parse forest, intended for
//! navigating over symbol nodes. It abstracts away the and/or-tree:
//! clients view the forest as a tree of symbol nodes, with a [`Pruner`]
//! deciding between ambiguous derivation variants. [`Cursor::top_down`]
//! drives a [`Listener`] over a subtree and propagates listener-computed
//! values upwards.
//!
//! The focus is on enabling the user to prune ambiguous parse trees without
//! silent decisions: sensible defaults, with hooks for the advanced user.
//! After pruning, what is left is an unambiguous parse tree; the usual
//! strategy is to derive an AST from it and go from there.

use crate::grammar::{RuleID, Symbol};
use crate::sppf::{Forest, RhsNodeID, SymNodeID, SymbolNode};
use crate::token::{Span, TokType};

/// Children may be traversed left-to-right (default) or right-to-left.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    LtoR,
    RtoL,
}

impl Direction {
    fn step(self) -> isize {
        match self {
            Direction::LtoR => 1,
            Direction::RtoL => -1,
        }
    }
}

/// Whether to stop traversing a subtree when [`Listener::enter_rule`]
/// signals a break. `Continue` always traverses complete subtrees.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Breakmode {
    Continue,
    Break,
}

/// An entity to help prune ambiguous or-edges. When a symbol node has more
/// than one derivation variant, the walker queries the pruner in or-edge
/// order and selects the first un-pruned RHS.
pub trait Pruner {
    fn prune(&mut self, sym: &SymbolNode, rule: RuleID) -> bool;
}

/// The default pruner: never prunes, thus always selecting the first
/// alternative considered.
#[derive(Debug, Default, Copy, Clone)]
pub struct DontCarePruner;

impl Pruner for DontCarePruner {
    fn prune(&mut self, _sym: &SymbolNode, _rule: RuleID) -> bool {
        false
    }
}

/// A node occurring during a forest walk: the grammar symbol of a child,
/// the input span it covers and the value computed by the listener for it.
#[derive(Debug, Clone)]
pub struct RuleNode<V> {
    pub symbol: crate::grammar::SymbolID,
    pub span: Span,
    pub value: Option<V>,
}

/// Contextual information passed to listener callbacks.
#[derive(Debug)]
pub struct RuleCtxt<A> {
    /// Span of input positions covered by this node.
    pub span: Span,
    /// Nesting level within the traversal.
    pub level: usize,
    /// The rule reduced at this node; `None` for terminals.
    pub rule: Option<RuleID>,
    /// Client-defined attribute storage local to the node, allocated via
    /// [`Listener::make_attrs`]; `None` for terminals.
    pub attrs: Option<A>,
}

/// A listener for walking a parse forest.
///
/// `enter_rule` indicates whether the traversal should continue into the
/// children of the node. `exit_rule` and `terminal` return user-defined
/// values to be propagated upwards: before `exit_rule` is called, each
/// child's value has been assigned into the corresponding slot of the
/// `rhs` nodes.
pub trait Listener {
    type Val: Clone;
    type Attrs;

    /// Allocate per-node attribute storage.
    fn make_attrs(&mut self, sym: &Symbol) -> Self::Attrs;

    fn enter_rule(
        &mut self,
        sym: &Symbol,
        rhs: &[RuleNode<Self::Val>],
        ctxt: &mut RuleCtxt<Self::Attrs>,
    ) -> bool;

    fn exit_rule(
        &mut self,
        sym: &Symbol,
        rhs: &[RuleNode<Self::Val>],
        ctxt: &mut RuleCtxt<Self::Attrs>,
    ) -> Self::Val;

    fn terminal(
        &mut self,
        tok_type: TokType,
        span: Span,
        ctxt: &RuleCtxt<Self::Attrs>,
    ) -> Self::Val;
}

struct Frame {
    owner: SymNodeID,
    rhs: RhsNodeID,
    pos: usize,
    dir: Direction,
}

/// A movable mark within a parse forest. Create one with
/// [`Forest::set_cursor`].
pub struct Cursor<'f, 'g> {
    forest: &'f Forest<'g>,
    current: SymNodeID,
    pruner: Box<dyn Pruner + 'f>,
    stack: Vec<Frame>,
}

impl<'g> Forest<'g> {
    /// Set up a cursor at a node of the forest. If `node` is `None`, the
    /// cursor starts at the root; returns `None` for an empty forest.
    ///
    /// A pruner may be given for solving ambiguities; without one, variants
    /// are selected by or-edge insertion order, which is deterministic per
    /// forest.
    pub fn set_cursor<'f>(
        &'f self,
        node: Option<SymNodeID>,
        pruner: Option<Box<dyn Pruner + 'f>>,
    ) -> Option<Cursor<'f, 'g>> {
        let start = node.or_else(|| self.root())?;
        Some(Cursor {
            forest: self,
            current: start,
            pruner: pruner.unwrap_or_else(|| Box::new(DontCarePruner)),
            stack: Vec::with_capacity(32),
        })
    }
}

impl<'f, 'g> Cursor<'f, 'g> {
    pub fn current(&self) -> &'f SymbolNode {
        self.forest.symbol_node(self.current)
    }

    pub fn current_id(&self) -> SymNodeID {
        self.current
    }

    // Select the RHS variant of a symbol node, querying the pruner when the
    // node is ambiguous.
    fn disambiguate(&mut self, sym: SymNodeID) -> Option<RhsNodeID> {
        let forest = self.forest;
        let choices = forest.alternatives(sym);
        if choices.len() == 1 {
            return Some(choices[0]);
        }
        if choices.len() > 1 {
            tracing::debug!(
                "ambiguous symbol node {} {} detected",
                forest.grammar().symbol(forest.symbol_node(sym).symbol).name(),
                forest.symbol_node(sym).span
            );
        }
        let node = forest.symbol_node(sym);
        let pruner = &mut self.pruner;
        choices
            .iter()
            .copied()
            .find(|&rhs| !pruner.prune(node, forest.rule_of(rhs)))
    }

    /// Move the cursor up to the parent of the current node, if any. While
    /// a descent is in progress the owning node is taken from the cursor
    /// stack; a bare `up()` falls back to the forest's parent map, which
    /// records the single parent chosen at build time.
    pub fn up(&mut self) -> Option<SymNodeID> {
        let parent = match self.stack.pop() {
            Some(frame) => frame.owner,
            None => self.forest.parent(self.current)?,
        };
        self.current = parent;
        tracing::trace!("UP cursor @ {:?}", self.current);
        Some(parent)
    }

    /// Move the cursor down to the first child of the current node, if any.
    /// `dir` selects the leftmost (default) or rightmost child.
    pub fn down(&mut self, dir: Direction) -> Option<SymNodeID> {
        let rhs = self.disambiguate(self.current)?;
        let children = self.forest.children(rhs);
        if children.is_empty() {
            return None;
        }
        let pos = match dir {
            Direction::LtoR => 0,
            Direction::RtoL => children.len() - 1,
        };
        let child = children[pos];
        self.stack.push(Frame {
            owner: self.current,
            rhs,
            pos,
            dir,
        });
        self.current = child;
        tracing::trace!("DOWN cursor @ {:?}", self.current);
        Some(child)
    }

    /// Move the cursor to the next sibling of the current node, if any.
    pub fn sibling(&mut self) -> Option<SymNodeID> {
        let forest = self.forest;
        let frame = self.stack.last_mut()?;
        let children = forest.children(frame.rhs);
        let next = match frame.dir {
            Direction::LtoR => frame.pos.checked_add(1).filter(|&n| n < children.len()),
            Direction::RtoL => frame.pos.checked_sub(1),
        }?;
        frame.pos = next;
        self.current = children[next];
        tracing::trace!("SIBLING cursor @ {:?}", self.current);
        Some(self.current)
    }

    /// Traverse the subtree under the current node top-down, applying the
    /// listener to every node encountered. Returns the listener-computed
    /// value of the subtree.
    pub fn top_down<L: Listener>(
        &mut self,
        listener: &mut L,
        dir: Direction,
        breakmode: Breakmode,
    ) -> L::Val {
        tracing::debug!("top-down traversal starting at {:?}", self.current);
        self.traverse(listener, dir, breakmode, 0)
    }

    fn traverse<L: Listener>(
        &mut self,
        listener: &mut L,
        dir: Direction,
        breakmode: Breakmode,
        level: usize,
    ) -> L::Val {
        let forest = self.forest;
        let node = *forest.symbol_node(self.current);
        let sym = forest.grammar().symbol(node.symbol);
        if sym.is_terminal() {
            let ctxt = RuleCtxt {
                span: node.span,
                level: level + 1,
                rule: None,
                attrs: None,
            };
            return listener.terminal(sym.token_type(), node.span, &ctxt);
        }

        let rhs_id = self.disambiguate(self.current);
        let mut rhs_nodes: Vec<RuleNode<L::Val>> = match rhs_id {
            Some(rhs) => forest
                .children(rhs)
                .iter()
                .map(|&child| {
                    let cn = forest.symbol_node(child);
                    RuleNode {
                        symbol: cn.symbol,
                        span: cn.span,
                        value: None,
                    }
                })
                .collect(),
            None => Vec::new(),
        };
        let attrs = listener.make_attrs(sym);
        let mut ctxt = RuleCtxt {
            span: node.span,
            level,
            rule: rhs_id.map(|rhs| forest.rule_of(rhs)),
            attrs: Some(attrs),
        };

        let descend = listener.enter_rule(sym, &rhs_nodes, &mut ctxt);
        if descend || breakmode == Breakmode::Continue {
            let mut i: isize = match dir {
                Direction::LtoR => 0,
                Direction::RtoL => rhs_nodes.len() as isize - 1,
            };
            if self.down(dir).is_some() {
                loop {
                    let child_value = self.traverse(listener, dir, breakmode, level + 1);
                    if i >= 0 && (i as usize) < rhs_nodes.len() {
                        rhs_nodes[i as usize].value = Some(child_value);
                    }
                    i += dir.step();
                    if self.sibling().is_none() {
                        break;
                    }
                }
                self.up();
            }
        }
        listener.exit_rule(sym, &rhs_nodes, &mut ctxt)
    }
}

//! A shared packed parse forest (SPPF).
//!
//! A packed parse forest re-uses existing parse tree nodes between different
//! parse trees. For a conventional non-ambiguous parse, a parse forest
//! consists of a single tree. Ambiguous grammars, on the other hand, may
//! result in parse runs where more than one parse tree is created; to save
//! space these trees share common nodes.
//!
//! A node `[A→δ, (x…y)]`, recognition of symbol `A` over the input span
//! `(x…y)` through right-hand side `δ`, is split in two parts: a *symbol
//! node* for `A` and an *RHS node* for `δ`. Symbol nodes fan out via
//! or-edges to RHS nodes (one per derivation variant); RHS nodes fan out via
//! numbered and-edges to the symbol nodes of their children. An unambiguous
//! tree segment has an or fan-out of 1; for ambiguous parses subtrees are
//! shared whenever `[δ (x…y)]` is already present.
//!
//! Identity of an RHS node is *not* just `[δ (x…y)]`: every child symbol
//! (with its span) has to coincide as well. To avoid iterating repeatedly
//! over the children, a signature function Σ encodes the children's
//! `(symbol, from)` pairs; ε-productions are signed by their start position
//! alone. RHS nodes are thus stored as `[δ (x) Σ]`, with full child
//! equality re-checked on lookup so that accidental signature collisions
//! cannot merge distinct derivations.

pub mod walk;

pub use walk::{Breakmode, Cursor, Direction, DontCarePruner, Listener, Pruner, RuleCtxt, RuleNode};

use crate::grammar::{Grammar, RuleID, SymbolID};
use crate::token::{Span, TokType};
use crate::Map;
use std::fmt;
use std::io;

/// Handle of a symbol node within its [`Forest`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SymNodeID {
    raw: u32,
}

impl SymNodeID {
    const fn new(raw: u32) -> Self {
        Self { raw }
    }

    fn index(self) -> usize {
        self.raw as usize
    }
}

impl fmt::Debug for SymNodeID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sn{}", self.raw)
    }
}

/// Handle of an RHS node within its [`Forest`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct RhsNodeID {
    raw: u32,
}

impl RhsNodeID {
    const fn new(raw: u32) -> Self {
        Self { raw }
    }

    fn index(self) -> usize {
        self.raw as usize
    }
}

impl fmt::Debug for RhsNodeID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rn{}", self.raw)
    }
}

/// A node in the parse forest referencing a grammar symbol which has been
/// reduced (Earley: completed), together with the input span it covers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SymbolNode {
    pub symbol: SymbolID,
    pub span: Span,
}

// An RHS node [δ (x) Σ]: rule, start position and signature over the
// children. The children key is kept for collision-safe sharing.
#[derive(Debug, Clone)]
struct RhsNode {
    rule: RuleID,
    start: usize,
    sigma: i32,
    children_key: Vec<(TokType, usize)>,
}

// Offsets used to randomize input positions in signatures.
const OFFSETS: [i64; 20] = [
    107, 401, 353, 223, 811, 569, 619, 173, 433, 757, 811, 823, 857, 863, 883, 907, 929, 947, 971,
    983,
];
const LARGE_PRIME: i64 = 143_743;

/// Signature Σ over the `(symbol value, from)` pairs of an RHS, or over the
/// start position alone for ε.
fn rhs_signature(children: &[(TokType, usize)], start: usize) -> i32 {
    if children.is_empty() {
        return OFFSETS[start % OFFSETS.len()] as i32;
    }
    let mut h: i64 = 817;
    for &(value, from) in children {
        let v = (value as i64).abs();
        if v != 0 {
            h *= v;
        }
        h %= LARGE_PRIME;
        h *= OFFSETS[(from * from) % OFFSETS.len()] + from as i64;
        h %= LARGE_PRIME;
    }
    h as i32
}

/// A shared packed parse forest.
///
/// The forest owns its nodes and edges; nodes are addressed through
/// [`SymNodeID`]/[`RhsNodeID`] handles. It is constructed at the end of a
/// successful recognition (usually through
/// [`TreeBuilder`](crate::earley::TreeBuilder)) and is independent of the
/// recognizer afterwards.
pub struct Forest<'g> {
    grammar: &'g Grammar,
    sym_nodes: Vec<SymbolNode>,
    sym_index: Map<(usize, usize, SymbolID), SymNodeID>,
    rhs_nodes: Vec<RhsNode>,
    rhs_index: Map<(usize, RuleID, i32), Vec<RhsNodeID>>,
    or_edges: Map<SymNodeID, Vec<RhsNodeID>>,
    and_edges: Map<RhsNodeID, Vec<SymNodeID>>,
    parent: Map<SymNodeID, SymNodeID>,
    root: Option<SymNodeID>,
}

impl<'g> Forest<'g> {
    /// An empty forest over a grammar.
    pub fn new(grammar: &'g Grammar) -> Self {
        Self {
            grammar,
            sym_nodes: Vec::new(),
            sym_index: Map::default(),
            rhs_nodes: Vec::new(),
            rhs_index: Map::default(),
            or_edges: Map::default(),
            and_edges: Map::default(),
            parent: Map::default(),
            root: None,
        }
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    fn find_or_add_sym(&mut self, symbol: SymbolID, start: usize, end: usize) -> SymNodeID {
        if let Some(&id) = self.sym_index.get(&(start, end, symbol)) {
            return id;
        }
        let id = SymNodeID::new(self.sym_nodes.len() as u32);
        self.sym_nodes.push(SymbolNode {
            symbol,
            span: Span(start, end),
        });
        self.sym_index.insert((start, end, symbol), id);
        id
    }

    fn find_or_add_rhs(
        &mut self,
        rule: RuleID,
        start: usize,
        children_key: Vec<(TokType, usize)>,
    ) -> RhsNodeID {
        let sigma = rhs_signature(&children_key, start);
        if let Some(candidates) = self.rhs_index.get(&(start, rule, sigma)) {
            for &id in candidates {
                // a signature collision is disambiguated by child equality
                if self.rhs_nodes[id.index()].children_key == children_key {
                    return id;
                }
            }
        }
        let id = RhsNodeID::new(self.rhs_nodes.len() as u32);
        self.rhs_nodes.push(RhsNode {
            rule,
            start,
            sigma,
            children_key,
        });
        self.rhs_index.entry((start, rule, sigma)).or_default().push(id);
        id
    }

    fn add_or_edge(
        &mut self,
        symbol: SymbolID,
        rhs: RhsNodeID,
        start: usize,
        end: usize,
    ) -> SymNodeID {
        let sn = self.find_or_add_sym(symbol, start, end);
        let edges = self.or_edges.entry(sn).or_default();
        if !edges.contains(&rhs) {
            tracing::trace!("add or-edge {:?} ----> {:?}", sn, rhs);
            edges.push(rhs);
        }
        sn
    }

    // And-edges carry their sequence number implicitly: children arrive in
    // sequence order, so the edge list position is the sequence number.
    fn add_and_edge(
        &mut self,
        rhs: RhsNodeID,
        seq: usize,
        symbol: SymbolID,
        start: usize,
        end: usize,
    ) -> SymNodeID {
        let sn = self.find_or_add_sym(symbol, start, end);
        let children = self.and_edges.entry(rhs).or_default();
        match children.get(seq) {
            Some(&existing) => {
                debug_assert_eq!(existing, sn, "and-edge sequence {} re-targeted", seq);
            }
            None => {
                debug_assert_eq!(children.len(), seq, "and-edge sequence gap");
                children.push(sn);
            }
        }
        sn
    }

    /// Add a node for a reduced grammar rule. The extent of the reduction is
    /// derived from the RHS nodes.
    ///
    /// Returns `None` if `rhs` is void; use
    /// [`Forest::add_epsilon_reduction`] for ε-productions.
    pub fn add_reduction(
        &mut self,
        symbol: SymbolID,
        rule: RuleID,
        rhs: &[SymNodeID],
    ) -> Option<SymNodeID> {
        if rhs.is_empty() {
            return None;
        }
        tracing::debug!(
            "reduction: {} → {} children",
            self.grammar.symbol(symbol).name(),
            rhs.len()
        );
        let start = self.sym_nodes[rhs[0].index()].span.from();
        let end = self.sym_nodes[rhs[rhs.len() - 1].index()].span.to();
        let children_key: Vec<(TokType, usize)> = rhs
            .iter()
            .map(|&id| {
                let node = &self.sym_nodes[id.index()];
                (self.grammar.symbol(node.symbol).value(), node.span.from())
            })
            .collect();
        let rhsnode = self.find_or_add_rhs(rule, start, children_key);
        let symnode = self.add_or_edge(symbol, rhsnode, start, end);
        for (seq, &child) in rhs.iter().enumerate() {
            let data = self.sym_nodes[child.index()];
            self.add_and_edge(rhsnode, seq, data.symbol, data.span.from(), data.span.to());
            self.parent.insert(child, symnode);
        }
        if symbol == SymbolID::ACCEPT {
            self.root = Some(symnode);
        }
        Some(symnode)
    }

    /// Add a node for a reduced ε-production at an input position. The
    /// RHS node receives a single and-edge to the synthetic ε terminal.
    pub fn add_epsilon_reduction(
        &mut self,
        symbol: SymbolID,
        rule: RuleID,
        pos: usize,
    ) -> SymNodeID {
        let rhsnode = self.find_or_add_rhs(rule, pos, Vec::new());
        let symnode = self.add_or_edge(symbol, rhsnode, pos, pos);
        let eps = self.add_and_edge(rhsnode, 0, SymbolID::EPSILON, pos, pos);
        self.parent.insert(eps, symnode);
        if symbol == SymbolID::ACCEPT {
            self.root = Some(symnode);
        }
        symnode
    }

    /// Add a node for a recognized terminal at an input position.
    pub fn add_terminal(&mut self, terminal: SymbolID, pos: usize) -> SymNodeID {
        self.find_or_add_sym(terminal, pos, pos + 1)
    }

    /// The root node of the forest, if any. Reducing `S'` sets the root
    /// automatically; [`Forest::set_root`] overrides it.
    pub fn root(&self) -> Option<SymNodeID> {
        self.root
    }

    /// Designate a node as the root. Intended for forests without the
    /// wrapping top-level `S'`.
    pub fn set_root(&mut self, node: SymNodeID) {
        self.root = Some(node);
    }

    pub fn symbol_node(&self, id: SymNodeID) -> &SymbolNode {
        &self.sym_nodes[id.index()]
    }

    pub fn sym_nodes(&self) -> impl Iterator<Item = (SymNodeID, &SymbolNode)> + '_ {
        self.sym_nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (SymNodeID::new(i as u32), node))
    }

    pub fn sym_node_count(&self) -> usize {
        self.sym_nodes.len()
    }

    pub fn rhs_node_count(&self) -> usize {
        self.rhs_nodes.len()
    }

    /// The or-edge targets of a symbol node, in insertion order. More than
    /// one entry means the node is ambiguous.
    pub fn alternatives(&self, id: SymNodeID) -> &[RhsNodeID] {
        self.or_edges.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_ambiguous(&self, id: SymNodeID) -> bool {
        self.alternatives(id).len() > 1
    }

    /// The children of an RHS node, ordered by sequence number.
    pub fn children(&self, id: RhsNodeID) -> &[SymNodeID] {
        self.and_edges.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The grammar rule an RHS node was reduced with.
    pub fn rule_of(&self, id: RhsNodeID) -> RuleID {
        self.rhs_nodes[id.index()].rule
    }

    /// The parent chosen for a symbol node at build time. May have been
    /// overwritten by a later reduction.
    pub fn parent(&self, id: SymNodeID) -> Option<SymNodeID> {
        self.parent.get(&id).copied()
    }

    fn sym_label(&self, node: &SymbolNode) -> String {
        format!("{} {}", self.grammar.symbol(node.symbol).name(), node.span)
    }

    fn rhs_label(&self, node: &RhsNode) -> String {
        format!("rule {} ({})", node.rule, node.sigma)
    }

    /// Export the forest in GraphViz DOT format: symbol nodes as boxes, RHS
    /// nodes as rounded boxes labelled `rule k (Σ)`, or-edges dashed,
    /// and-edges labelled by sequence number, terminals in the bottom rank.
    pub fn to_graphviz(&self, w: &mut impl io::Write) -> io::Result<()> {
        writeln!(w, "digraph G {{")?;
        writeln!(w, "{{ graph [fontname=\"Helvetica\"];")?;
        writeln!(
            w,
            "  node [fontname=\"Helvetica\",shape=box,fontsize=10];"
        )?;
        writeln!(w, "  edge [fontname=\"Helvetica\",fontsize=9];")?;
        let mut rhs_sorted: Vec<&RhsNode> = self.rhs_nodes.iter().collect();
        rhs_sorted.sort_by_key(|n| n.rule);
        for node in rhs_sorted {
            writeln!(
                w,
                "\"{}\" [style=rounded,color=\"#404040\"]",
                self.rhs_label(node)
            )?;
        }
        let mut sym_sorted: Vec<&SymbolNode> = self.sym_nodes.iter().collect();
        sym_sorted.sort_by_key(|n| n.span.from());
        for &node in &sym_sorted {
            if self.grammar.symbol(node.symbol).is_terminal() {
                writeln!(
                    w,
                    "\"{}\" [fillcolor=grey90,style=filled]",
                    self.sym_label(node)
                )?;
            } else {
                writeln!(w, "\"{}\" []", self.sym_label(node))?;
            }
        }
        writeln!(w, "}}")?;
        for (from, targets) in &self.or_edges {
            let from = &self.sym_nodes[from.index()];
            for rhs in targets {
                writeln!(
                    w,
                    "\"{}\" -> \"{}\" [style=dashed]",
                    self.sym_label(from),
                    self.rhs_label(&self.rhs_nodes[rhs.index()])
                )?;
            }
        }
        for (from, children) in &self.and_edges {
            let from = &self.rhs_nodes[from.index()];
            for (seq, child) in children.iter().enumerate() {
                writeln!(
                    w,
                    "\"{}\" -> \"{}\" [label={}]",
                    self.rhs_label(from),
                    self.sym_label(&self.sym_nodes[child.index()]),
                    seq
                )?;
            }
        }
        // all terminals at the bottom row
        write!(w, "{{ rank=max;")?;
        for &node in &sym_sorted {
            if self.grammar.symbol(node.symbol).is_terminal() {
                write!(w, " \"{}\";", self.sym_label(node))?;
            }
        }
        writeln!(w, "\n}}\n}}")
    }
}

impl fmt::Debug for Forest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Forest")
            .field("sym_nodes", &self.sym_nodes.len())
            .field("rhs_nodes", &self.rhs_nodes.len())
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

//! The characteristic finite state machine (CFSM) of a grammar, i.e. the
//! LR(0) state diagram.
//!
//! The CFSM is constructed by a [`TableGenerator`](crate::table::TableGenerator);
//! clients normally do not use it directly. Nevertheless there are methods
//! defined on it, e.g. for debugging, or to compute custom tables from it.
//! It can be exported to GraphViz' DOT format.

use crate::grammar::{Grammar, RuleID, SymbolID};
use crate::item::{Item, ItemSet};
use crate::Map;
use std::collections::VecDeque;
use std::fmt;
use std::io;

/// Numeric id of a [`CfsmState`]. The start state is always `StateID(0)`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StateID {
    raw: u32,
}

impl StateID {
    pub(crate) const fn new(raw: u32) -> Self {
        Self { raw }
    }

    pub fn raw(self) -> u32 {
        self.raw
    }
}

impl fmt::Debug for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{:03}", self.raw)
    }
}

impl fmt::Display for StateID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.raw, f)
    }
}

/// A state within the CFSM: a closed item set, its outgoing edges and an
/// accepting flag. Uniqueness of states is by item-set equality.
#[derive(Debug)]
pub struct CfsmState {
    items: ItemSet,
    edges: Map<SymbolID, StateID>,
    accept: bool,
}

impl CfsmState {
    pub fn items(&self) -> &ItemSet {
        &self.items
    }

    pub fn edges(&self) -> impl Iterator<Item = (SymbolID, StateID)> + '_ {
        self.edges.iter().map(|(sym, to)| (*sym, *to))
    }

    pub fn edge(&self, sym: SymbolID) -> Option<StateID> {
        self.edges.get(&sym).copied()
    }

    /// Does this state contain a reducible item for the start rule?
    pub fn is_accepting(&self) -> bool {
        self.accept
    }

    /// Render the item set of this state, one item per line.
    pub fn display<'g>(&'g self, grammar: &'g Grammar) -> impl fmt::Display + 'g {
        StateDisplay {
            grammar,
            state: self,
        }
    }
}

struct StateDisplay<'g> {
    grammar: &'g Grammar,
    state: &'g CfsmState,
}

impl fmt::Display for StateDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for item in self.state.items.iter() {
            writeln!(f, "{}", item.display(self.grammar))?;
        }
        Ok(())
    }
}

/// Compute the closure of an item set: while some `[A → α•Bβ]` with
/// non-terminal `B` is in the set, add `[B → •γ]` for every rule `B → γ`.
/// The fixed point falls out of the set's iterate-once discipline.
pub fn closure(grammar: &Grammar, seed: ItemSet) -> ItemSet {
    let mut c = seed;
    c.iterate_once();
    while let Some(item) = c.next_item() {
        if let Some(b) = item.peek(grammar) {
            if !grammar.symbol(b).is_terminal() {
                for &rule in grammar.rules_for(b) {
                    c.add(Item::start(rule));
                }
            }
        }
    }
    c
}

/// `goto(I, X)`: advance every item of `I` with `X` right of the dot.
pub fn goto_set(grammar: &Grammar, items: &ItemSet, x: SymbolID) -> ItemSet {
    let mut gotoset = ItemSet::new();
    for &item in items.iter() {
        if item.peek(grammar) == Some(x) {
            if let Some(advanced) = item.advance(grammar) {
                tracing::trace!(
                    "goto({}) -{}-> {}",
                    item.display(grammar),
                    grammar.symbol(x).name(),
                    advanced.display(grammar)
                );
                gotoset.add(advanced);
            }
        }
    }
    gotoset
}

/// `goto(I, X)` followed by closure.
pub fn goto_closure(grammar: &Grammar, items: &ItemSet, x: SymbolID) -> ItemSet {
    closure(grammar, goto_set(grammar, items, x))
}

/// The characteristic finite state machine for a grammar.
#[derive(Debug)]
pub struct Cfsm<'g> {
    grammar: &'g Grammar,
    states: Map<StateID, CfsmState>,
    start: StateID,
}

impl<'g> Cfsm<'g> {
    /// Construct the CFSM for a grammar: start from `closure({[S' → •S]})`
    /// and run a worklist, computing the goto set for every grammar symbol.
    pub fn generate(grammar: &'g Grammar) -> Self {
        tracing::debug!("=== build CFSM for {} ===", grammar.name());
        let mut states: Map<StateID, CfsmState> = Map::default();
        let mut isocores: Map<Vec<Item>, StateID> = Map::default();
        let mut next_id = 0u32;
        let mut state_id = move || {
            let id = StateID::new(next_id);
            next_id += 1;
            id
        };

        let seed: ItemSet = Some(Item::start(RuleID::ACCEPT)).into_iter().collect();
        let closure0 = closure(grammar, seed);

        let start = state_id();
        isocores.insert(closure0.canonical(), start);
        let mut pending = VecDeque::new();
        pending.push_back((start, closure0));

        while let Some((id, items)) = pending.pop_front() {
            let mut edges = Map::default();
            for (x, sym) in grammar.symbols() {
                if sym.is_epsilon() {
                    continue;
                }
                let gotoset = goto_closure(grammar, &items, x);
                if gotoset.is_empty() {
                    // the error state; no edge
                    continue;
                }
                let key = gotoset.canonical();
                let to = match isocores.get(&key) {
                    Some(&to) => to,
                    None => {
                        let to = state_id();
                        isocores.insert(key, to);
                        pending.push_back((to, gotoset));
                        to
                    }
                };
                edges.insert(x, to);
            }
            let accept = contains_completed_start_rule(grammar, &items);
            states.insert(
                id,
                CfsmState {
                    items,
                    edges,
                    accept,
                },
            );
        }

        tracing::debug!("CFSM has {} states", states.len());
        Cfsm {
            grammar,
            states,
            start,
        }
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    pub fn states(&self) -> impl Iterator<Item = (StateID, &CfsmState)> + '_ {
        self.states.iter().map(|(id, state)| (*id, state))
    }

    pub fn state(&self, id: StateID) -> &CfsmState {
        &self.states[&id]
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn start_state(&self) -> StateID {
        self.start
    }

    /// Export the CFSM to the GraphViz DOT format: states as boxes labeled
    /// with their item sets, edges labeled by the transition symbol,
    /// accepting states colored distinctly.
    pub fn to_graphviz(&self, w: &mut impl io::Write) -> io::Result<()> {
        writeln!(w, "digraph {{")?;
        writeln!(
            w,
            "graph [splines=true, fontname=Helvetica, fontsize=10];"
        )?;
        writeln!(
            w,
            "node [shape=Mrecord, style=filled, fontname=Helvetica, fontsize=10];"
        )?;
        writeln!(w, "edge [fontname=Helvetica, fontsize=10];")?;
        writeln!(w)?;
        for (id, state) in self.states() {
            let color = if state.is_accepting() {
                "lightgray"
            } else {
                "white"
            };
            let mut label = String::new();
            for item in state.items().iter() {
                if !label.is_empty() {
                    label.push_str("\\n");
                }
                label.push_str(&dot_escape(&item.display(self.grammar).to_string()));
            }
            writeln!(
                w,
                "s{:03} [fillcolor={} label=\"{{{:03} | {}}}\"]",
                id.raw(),
                color,
                id.raw(),
                label
            )?;
        }
        for (id, state) in self.states() {
            for (sym, to) in state.edges() {
                writeln!(
                    w,
                    "s{:03} -> s{:03} [label=\"{}\"]",
                    id.raw(),
                    to.raw(),
                    dot_escape(self.grammar.symbol(sym).name())
                )?;
            }
        }
        writeln!(w, "}}")
    }
}

fn contains_completed_start_rule(grammar: &Grammar, items: &ItemSet) -> bool {
    items
        .iter()
        .any(|item| item.rule == RuleID::ACCEPT && item.is_reducible(grammar))
}

fn dot_escape(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace('<', "\\<")
        .replace('>', "\\>")
        .replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarBuilder;

    // Sign ::= + | - | ε ; Var ::= Sign Id
    fn signed_var() -> Grammar {
        let mut b = GrammarBuilder::new("signed");
        b.lhs("Var").n("Sign").t("id", crate::scanner::IDENT).end();
        b.lhs("Sign").t("+", '+' as i32).end();
        b.lhs("Sign").t("-", '-' as i32).end();
        b.lhs("Sign").epsilon();
        b.grammar().unwrap()
    }

    #[test]
    fn closure_of_the_start_item() {
        let g = signed_var();
        let seed: ItemSet = Some(Item::start(RuleID::ACCEPT)).into_iter().collect();
        let c = closure(&g, seed);
        // [S'→•Var], [Var→•Sign id], [Sign→•+], [Sign→•-], [Sign→•]
        assert_eq!(c.len(), 5);
        assert!(c.iter().any(|i| i.is_reducible(&g))); // the ε-item
    }

    #[test]
    fn goto_advances_the_dot() {
        let g = signed_var();
        let seed: ItemSet = Some(Item::start(RuleID::ACCEPT)).into_iter().collect();
        let c = closure(&g, seed);
        let sign = g.symbol_by_name("Sign").unwrap();
        let after = goto_closure(&g, &c, sign);
        assert_eq!(after.len(), 1); // [Var→Sign •id]
        let item = *after.iter().next().unwrap();
        assert_eq!(item.peek(&g), g.symbol_by_name("id"));
    }

    #[test]
    fn cfsm_has_an_accepting_state() {
        let g = signed_var();
        let cfsm = Cfsm::generate(&g);
        assert!(cfsm.state_count() >= 4);
        assert_eq!(cfsm.start_state(), StateID::new(0));
        let accepting: Vec<_> = cfsm
            .states()
            .filter(|(_, s)| s.is_accepting())
            .collect();
        assert_eq!(accepting.len(), 1);
    }

    #[test]
    fn states_are_deduplicated_by_item_set() {
        let g = signed_var();
        let cfsm = Cfsm::generate(&g);
        for (id_a, a) in cfsm.states() {
            for (id_b, b) in cfsm.states() {
                if id_a != id_b {
                    assert!(!a.items().set_eq(b.items()));
                }
            }
        }
    }

    #[test]
    fn state_display_lists_items() {
        let g = signed_var();
        let cfsm = Cfsm::generate(&g);
        let dump = cfsm.state(cfsm.start_state()).display(&g).to_string();
        assert!(dump.contains("[S' ::= • Var, 0]"));
        assert!(dump.contains("[Sign ::= • +, 0]"));
    }

    #[test]
    fn graphviz_export() {
        let g = signed_var();
        let cfsm = Cfsm::generate(&g);
        let mut out = Vec::new();
        cfsm.to_graphviz(&mut out).unwrap();
        let dot = String::from_utf8(out).unwrap();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("fillcolor=lightgray"));
        assert!(dot.contains("->"));
    }
}

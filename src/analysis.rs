//! Static grammar analysis: nullable closure, FIRST and FOLLOW sets.
//!
//! After a grammar is complete it is subjected to an [`Analysis`], which
//! determines all ε-derivable non-terminals and computes FIRST and FOLLOW
//! sets. The sets are cached on the analysis and read-only thereafter.
//! FIRST and FOLLOW contain terminal *token types*; FIRST additionally
//! contains [`EPSILON`] for nullable non-terminals.

use crate::grammar::{Grammar, RuleID, SymbolID};
use crate::scanner;
use crate::token::{TokType, EPSILON};
use crate::{Map, Set};

/// The analyzed grammar: nullable/FIRST/FOLLOW fixed points, computed once.
#[derive(Debug)]
pub struct Analysis<'g> {
    grammar: &'g Grammar,
    nullable: Set<SymbolID>,
    first: Map<SymbolID, Set<TokType>>,
    follow: Map<SymbolID, Set<TokType>>,
}

impl<'g> Analysis<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        let nullable = nullable_set(grammar);
        let first = first_sets(grammar, &nullable);
        let follow = follow_sets(grammar, &nullable, &first);
        for (id, sym) in grammar.nonterminals() {
            tracing::debug!(
                "FIRST({}) = {:?}, FOLLOW({}) = {:?}",
                sym.name(),
                first[&id],
                sym.name(),
                follow[&id],
            );
        }
        Self {
            grammar,
            nullable,
            first,
            follow,
        }
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    /// Does `sym ⇒* ε` hold?
    pub fn derives_epsilon(&self, sym: SymbolID) -> bool {
        self.nullable.contains(&sym)
    }

    /// FIRST set of a symbol. Terminals map to their singleton set.
    pub fn first(&self, sym: SymbolID) -> &Set<TokType> {
        &self.first[&sym]
    }

    /// FOLLOW set of a non-terminal. Always contains EOF for the start
    /// symbol.
    pub fn follow(&self, sym: SymbolID) -> &Set<TokType> {
        &self.follow[&sym]
    }
}

/// The set of nullable symbols of the grammar, as a fixed point.
fn nullable_set(grammar: &Grammar) -> Set<SymbolID> {
    let mut nullable: Set<SymbolID> = grammar
        .rules()
        .filter_map(|(_, rule)| rule.is_epsilon().then_some(rule.lhs()))
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for (_, rule) in grammar.rules() {
            if nullable.contains(&rule.lhs()) {
                continue;
            }
            if rule.rhs().iter().all(|sym| nullable.contains(sym)) {
                nullable.insert(rule.lhs());
                changed = true;
            }
        }
    }

    nullable
}

/// FIRST sets for all symbols.
///
/// Constraints are extracted per rule `X → Y1 … Yn`: for the nullable prefix
/// `Y1 … Y(k-1)` and the first non-nullable `Yk`, each `Yi` (i ≤ k)
/// contributes `FIRST(X) ⊇ FIRST(Yi)`. The constraints are then relaxed
/// until nothing changes. ε membership is added afterwards from the nullable
/// set.
fn first_sets(grammar: &Grammar, nullable: &Set<SymbolID>) -> Map<SymbolID, Set<TokType>> {
    let mut map: Map<SymbolID, Set<TokType>> = Map::default();

    for (id, sym) in grammar.terminals() {
        map.insert(id, Some(sym.token_type()).into_iter().collect());
    }
    for (id, _) in grammar.nonterminals() {
        map.insert(id, Set::default());
    }

    struct Constraint {
        sup: SymbolID,
        sub: SymbolID,
    }
    let mut constraints = Vec::new();
    for (_, rule) in grammar.rules() {
        for &symbol in rule.rhs() {
            if rule.lhs() != symbol {
                constraints.push(Constraint {
                    sup: rule.lhs(),
                    sub: symbol,
                });
            }
            if !nullable.contains(&symbol) {
                break;
            }
        }
    }

    let mut changed = true;
    while changed {
        changed = false;
        for Constraint { sup, sub } in &constraints {
            let subset: Vec<TokType> = map[sub].iter().copied().collect();
            let superset = map.get_mut(sup).expect("all symbols have a FIRST slot");
            for tok in subset {
                if tok != EPSILON {
                    changed |= superset.insert(tok);
                }
            }
        }
    }

    for sym in nullable {
        map.get_mut(sym)
            .expect("nullable symbols have a FIRST slot")
            .insert(EPSILON);
    }

    map
}

/// FOLLOW sets for all non-terminals, again as a textbook fixed point over
/// `A → α B β`: FOLLOW(B) ⊇ FIRST(β) \ {ε}, and FOLLOW(B) ⊇ FOLLOW(A) when
/// β is nullable.
fn follow_sets(
    grammar: &Grammar,
    nullable: &Set<SymbolID>,
    first: &Map<SymbolID, Set<TokType>>,
) -> Map<SymbolID, Set<TokType>> {
    let mut map: Map<SymbolID, Set<TokType>> = Map::default();
    for (id, _) in grammar.nonterminals() {
        map.insert(id, Set::default());
    }
    map.get_mut(&SymbolID::ACCEPT)
        .expect("S' is always present")
        .insert(scanner::EOF);

    let mut changed = true;
    while changed {
        changed = false;
        for (_, rule) in grammar.rules() {
            let rhs = rule.rhs();
            for (i, &b) in rhs.iter().enumerate() {
                if grammar.symbol(b).is_terminal() {
                    continue;
                }
                let mut rest_nullable = true;
                for &beta in &rhs[i + 1..] {
                    for &tok in &first[&beta] {
                        if tok != EPSILON {
                            changed |= map
                                .get_mut(&b)
                                .expect("non-terminals have a FOLLOW slot")
                                .insert(tok);
                        }
                    }
                    if !nullable.contains(&beta) {
                        rest_nullable = false;
                        break;
                    }
                }
                if rest_nullable {
                    let from_lhs: Vec<TokType> = map[&rule.lhs()].iter().copied().collect();
                    let target = map.get_mut(&b).expect("non-terminals have a FOLLOW slot");
                    for tok in from_lhs {
                        changed |= target.insert(tok);
                    }
                }
            }
        }
    }

    map
}

/// Sanity check used by table generation: every non-terminal should be
/// reachable from the start symbol. Unreachable symbols are reported, not
/// fatal.
pub fn unreachable_symbols(grammar: &Grammar) -> Vec<SymbolID> {
    let mut reachable: Set<SymbolID> = Set::default();
    reachable.insert(SymbolID::ACCEPT);
    let mut worklist = vec![RuleID::ACCEPT];
    while let Some(rule) = worklist.pop() {
        for &sym in grammar.rule(rule).rhs() {
            if grammar.symbol(sym).is_terminal() {
                continue;
            }
            if reachable.insert(sym) {
                worklist.extend(grammar.rules_for(sym).iter().copied());
            }
        }
    }
    grammar
        .nonterminals()
        .filter(|(id, _)| !reachable.contains(id))
        .map(|(id, _)| id)
        .collect()
}

//! Structural invariants of parse forests built from real parses.

use sylva::analysis::Analysis;
use sylva::earley::{EarleyOptions, EarleyParser};
use sylva::grammar::{Grammar, GrammarBuilder};
use sylva::scanner::{self, DefaultTokenizer};
use sylva::sppf::Forest;
use sylva::token::Span;

fn parse_to_forest<'g>(ga: &'g Analysis<'g>, input: &str) -> Forest<'g> {
    let mut parser = EarleyParser::new(
        ga,
        EarleyOptions {
            generate_tree: true,
            ..Default::default()
        },
    );
    let mut scan = DefaultTokenizer::new(input);
    assert!(parser.parse(&mut scan).unwrap(), "rejected {:?}", input);
    parser.take_forest().expect("forest was requested")
}

// The invariants every well-formed forest obeys:
//  - every non-terminal symbol node has at least one or-edge;
//  - every RHS node's and-edges are numbered 0..n without gaps (an
//    ε-reduction has exactly the synthetic ε child);
//  - each child's span is contained in the span of the owning symbol node,
//    and sibling spans are contiguous and non-overlapping.
fn check_invariants(forest: &Forest<'_>) {
    let grammar = forest.grammar();
    for (id, node) in forest.sym_nodes() {
        let sym = grammar.symbol(node.symbol);
        if sym.is_terminal() {
            continue;
        }
        let alternatives = forest.alternatives(id);
        assert!(
            !alternatives.is_empty(),
            "symbol node {:?} has no or-edge",
            node
        );
        for &rhs in alternatives {
            let rule = grammar.rule(forest.rule_of(rhs));
            let children = forest.children(rhs);
            let expected = rule.rhs().len().max(1); // ε-reductions get the ε child
            assert_eq!(
                children.len(),
                expected,
                "and-edges of {:?} are incomplete",
                node
            );
            let mut cursor = node.span.from();
            for &child in children {
                let child_node = forest.symbol_node(child);
                assert_eq!(
                    child_node.span.from(),
                    cursor,
                    "child spans of {:?} are not contiguous",
                    node
                );
                assert!(
                    child_node.span.to() <= node.span.to(),
                    "child {:?} leaks out of {:?}",
                    child_node,
                    node
                );
                cursor = child_node.span.to();
            }
            assert_eq!(
                cursor,
                node.span.to(),
                "children of {:?} do not cover its span",
                node
            );
        }
    }
}

fn expr_grammar() -> Grammar {
    let mut b = GrammarBuilder::new("expressions");
    b.lhs("Sum").n("Sum").t("+", '+' as i32).n("Prod").end();
    b.lhs("Sum").n("Prod").end();
    b.lhs("Prod").n("Prod").t("*", '*' as i32).n("Fact").end();
    b.lhs("Prod").n("Fact").end();
    b.lhs("Fact")
        .t("(", '(' as i32)
        .n("Sum")
        .t(")", ')' as i32)
        .end();
    b.lhs("Fact").t("number", scanner::INT).end();
    b.grammar().unwrap()
}

fn ambiguous_grammar() -> Grammar {
    let mut b = GrammarBuilder::new("amb");
    b.lhs("X").t("+", '+' as i32).n("X").end();
    b.lhs("X").n("X").t("*", '*' as i32).n("X").end();
    b.lhs("X").t("x", scanner::IDENT).end();
    b.grammar().unwrap()
}

#[test]
fn unambiguous_forest_invariants() {
    let g = expr_grammar();
    let ga = Analysis::new(&g);
    for input in ["1", "1+2*3", "(1+2)*3", "1*2+3*4"] {
        let forest = parse_to_forest(&ga, input);
        check_invariants(&forest);
        // a deterministic parse yields exactly one alternative everywhere
        for (id, node) in forest.sym_nodes() {
            if !g.symbol(node.symbol).is_terminal() {
                assert_eq!(forest.alternatives(id).len(), 1);
            }
        }
    }
}

#[test]
fn ambiguous_forest_invariants() {
    let g = ambiguous_grammar();
    let ga = Analysis::new(&g);
    for input in ["+x*x", "x*x*x", "+x*x*x"] {
        let forest = parse_to_forest(&ga, input);
        check_invariants(&forest);
    }
}

#[test]
fn shared_nodes_are_not_duplicated() {
    let g = ambiguous_grammar();
    let ga = Analysis::new(&g);
    let forest = parse_to_forest(&ga, "+x*x");
    // node identity is (symbol, span): no two symbol nodes may coincide
    let mut seen = std::collections::HashSet::new();
    for (_, node) in forest.sym_nodes() {
        assert!(
            seen.insert((node.symbol, node.span)),
            "duplicate symbol node {:?}",
            node
        );
    }
}

#[test]
fn nested_ambiguity_keeps_the_forest_walkable() {
    use sylva::grammar::Symbol;
    use sylva::sppf::{Breakmode, Direction, Listener, RuleCtxt, RuleNode};
    use sylva::token::TokType;

    struct CountNodes {
        visited: usize,
    }
    impl Listener for CountNodes {
        type Val = ();
        type Attrs = ();
        fn make_attrs(&mut self, _sym: &Symbol) {}
        fn enter_rule(&mut self, _s: &Symbol, _r: &[RuleNode<()>], _c: &mut RuleCtxt<()>) -> bool {
            self.visited += 1;
            true
        }
        fn exit_rule(&mut self, _s: &Symbol, _r: &[RuleNode<()>], _c: &mut RuleCtxt<()>) {}
        fn terminal(&mut self, _t: TokType, _s: Span, _c: &RuleCtxt<()>) {
            self.visited += 1;
        }
    }

    let g = ambiguous_grammar();
    let ga = Analysis::new(&g);
    let forest = parse_to_forest(&ga, "+x*x*x");
    check_invariants(&forest);
    let mut cursor = forest.set_cursor(None, None).unwrap();
    let mut listener = CountNodes { visited: 0 };
    cursor.top_down(&mut listener, Direction::LtoR, Breakmode::Continue);
    // S' plus at least one node per input token
    assert!(listener.visited >= 6);
}

#[test]
fn forest_export_to_dot() {
    let g = ambiguous_grammar();
    let ga = Analysis::new(&g);
    let forest = parse_to_forest(&ga, "+x*x");
    let mut out = Vec::new();
    forest.to_graphviz(&mut out).unwrap();
    let dot = String::from_utf8(out).unwrap();
    assert!(dot.starts_with("digraph G {"));
    assert!(dot.contains("style=dashed"), "or-edges are dashed");
    assert!(dot.contains("style=rounded"), "rhs nodes are rounded");
    assert!(dot.contains("rank=max"), "terminals sit in the bottom rank");
    assert!(dot.contains("rule "));
}

#[test]
fn detached_forest_outlives_the_parser() {
    let g = expr_grammar();
    let ga = Analysis::new(&g);
    let forest = parse_to_forest(&ga, "1+2");
    // the parser is gone; the forest still navigates
    let root = forest.root().unwrap();
    assert_eq!(forest.symbol_node(root).span, Span(0, 3));
    assert!(forest.alternatives(root).len() == 1);
}

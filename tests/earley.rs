//! End-to-end recognizer scenarios: grammars built at runtime, tokenized
//! with the default scanner, recognized with the Earley parser.

use sylva::analysis::Analysis;
use sylva::earley::{
    DerivationListener, DerivationNode, EarleyOptions, EarleyParser, ParseError,
};
use sylva::grammar::{Grammar, GrammarBuilder, RuleID, Symbol, SymbolID};
use sylva::scanner::{self, DefaultTokenizer};
use sylva::sppf::{Breakmode, Direction, Listener, RuleCtxt, RuleNode};
use sylva::token::{Span, TokType, Token};

fn tree_options() -> EarleyOptions {
    EarleyOptions {
        generate_tree: true,
        ..Default::default()
    }
}

// E ::= E + a | a: left recursion with a shared tail.
#[test]
fn left_recursion_builds_a_compact_forest() {
    let mut b = GrammarBuilder::new("S1");
    b.lhs("E")
        .n("E")
        .t("+", '+' as i32)
        .t("a", scanner::IDENT)
        .end();
    b.lhs("E").t("a", scanner::IDENT).end();
    let g = b.grammar().unwrap();
    let ga = Analysis::new(&g);
    let mut parser = EarleyParser::new(&ga, tree_options());
    let mut scan = DefaultTokenizer::new("a+a");
    assert!(parser.parse(&mut scan).unwrap());

    let forest = parser.forest().expect("forest was requested");
    let root = forest.root().expect("forest has a root");
    let root_node = forest.symbol_node(root);
    assert_eq!(root_node.symbol, SymbolID::ACCEPT);
    assert_eq!(root_node.span, Span(0, 3));
    assert!(forest.sym_node_count() <= 7);

    let e = g.symbol_by_name("E").unwrap();
    let e_nodes: Vec<_> = forest
        .sym_nodes()
        .filter(|(_, node)| node.symbol == e)
        .collect();
    assert_eq!(e_nodes.len(), 2);
    // the left-associative tree: E(0,3) over E(0,1)
    assert!(e_nodes.iter().any(|(_, n)| n.span == Span(0, 3)));
    assert!(e_nodes.iter().any(|(_, n)| n.span == Span(0, 1)));
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

// A forest listener evaluating the expression from the terminal lexemes.
struct EvalListener<'t> {
    tokens: &'t [scanner::DefaultToken],
}

impl Listener for EvalListener<'_> {
    type Val = i64;
    type Attrs = ();

    fn make_attrs(&mut self, _sym: &Symbol) {}

    fn enter_rule(
        &mut self,
        _sym: &Symbol,
        _rhs: &[RuleNode<i64>],
        _ctxt: &mut RuleCtxt<()>,
    ) -> bool {
        true
    }

    fn exit_rule(&mut self, sym: &Symbol, rhs: &[RuleNode<i64>], _ctxt: &mut RuleCtxt<()>) -> i64 {
        let vals: Vec<i64> = rhs.iter().map(|r| r.value.unwrap_or(0)).collect();
        match sym.name() {
            "Sum" if vals.len() == 3 => vals[0] + vals[2],
            "Prod" if vals.len() == 3 => vals[0] * vals[2],
            "Fact" if vals.len() == 3 => vals[1],
            _ => vals.first().copied().unwrap_or(0),
        }
    }

    fn terminal(&mut self, tok_type: TokType, span: Span, _ctxt: &RuleCtxt<()>) -> i64 {
        if tok_type == scanner::INT {
            self.tokens[span.from()].lexeme().parse().unwrap_or(0)
        } else {
            0
        }
    }
}

// A derivation listener summing fully evaluated products.
struct SumOfProducts;

impl<T: Token> DerivationListener<T> for SumOfProducts {
    type Val = i64;

    fn reduce(
        &mut self,
        _lhs: SymbolID,
        rule: RuleID,
        children: &[DerivationNode<i64>],
        _span: Span,
        _level: usize,
    ) -> i64 {
        match (rule.index(), children.len()) {
            (1, 3) => children[0].value + children[2].value, // Sum + Prod
            (3, 3) => children[0].value * children[2].value, // Prod * Fact
            (5, 3) => children[1].value,                     // ( Sum )
            _ => children.first().map(|c| c.value).unwrap_or(0),
        }
    }

    fn terminal(&mut self, token: &T, _span: Span, _level: usize) -> i64 {
        token.lexeme().parse().unwrap_or(0)
    }
}

#[test]
fn expression_value_is_seven_for_both_listeners() {
    let g = expr_grammar();
    let ga = Analysis::new(&g);

    // no conflicts in the SLR tables for this grammar
    let mut gen = sylva::table::TableGenerator::new(&ga);
    gen.create_tables();
    assert!(!gen.has_conflicts);

    let mut parser = EarleyParser::new(&ga, tree_options());
    let mut scan = DefaultTokenizer::new("1+2*3");
    assert!(parser.parse(&mut scan).unwrap());

    let root = parser.walk_derivation(&mut SumOfProducts).unwrap();
    assert_eq!(root.value, 7);

    let forest = parser.forest().expect("forest was requested");
    let mut cursor = forest.set_cursor(None, None).unwrap();
    let mut eval = EvalListener {
        tokens: parser.tokens(),
    };
    let value = cursor.top_down(&mut eval, Direction::LtoR, Breakmode::Continue);
    assert_eq!(value, 7);
}

// S ::= A ; A ::= ε | a: accepting the empty input.
#[test]
fn empty_input_reduces_through_epsilon() {
    let mut b = GrammarBuilder::new("S3");
    b.lhs("S").n("A").end();
    b.lhs("A").epsilon();
    b.lhs("A").t("a", scanner::IDENT).end();
    let g = b.grammar().unwrap();
    let ga = Analysis::new(&g);
    let mut parser = EarleyParser::new(&ga, tree_options());
    let mut scan = DefaultTokenizer::new("");
    assert!(parser.parse(&mut scan).unwrap());

    let forest = parser.forest().expect("forest was requested");
    let a = g.symbol_by_name("A").unwrap();
    let (a_id, a_node) = forest
        .sym_nodes()
        .find(|(_, node)| node.symbol == a)
        .expect("A was reduced");
    assert_eq!(a_node.span, Span(0, 0));
    let alts = forest.alternatives(a_id);
    assert_eq!(alts.len(), 1);
    let children = forest.children(alts[0]);
    assert_eq!(children.len(), 1);
    assert_eq!(forest.symbol_node(children[0]).symbol, g.epsilon());
}

// X ::= + X | X * X | x: genuinely ambiguous.
#[test]
fn ambiguity_is_encoded_as_or_edges() {
    let mut b = GrammarBuilder::new("S4");
    b.lhs("X").t("+", '+' as i32).n("X").end();
    b.lhs("X").n("X").t("*", '*' as i32).n("X").end();
    b.lhs("X").t("x", scanner::IDENT).end();
    let g = b.grammar().unwrap();
    let ga = Analysis::new(&g);
    let mut parser = EarleyParser::new(&ga, tree_options());
    let mut scan = DefaultTokenizer::new("+x*x");
    assert!(parser.parse(&mut scan).unwrap());

    let forest = parser.forest().expect("forest was requested");
    let accepts: Vec<_> = forest
        .sym_nodes()
        .filter(|(_, node)| node.symbol == SymbolID::ACCEPT)
        .collect();
    assert_eq!(accepts.len(), 1, "exactly one S' node");

    let x = g.symbol_by_name("X").unwrap();
    let (whole, _) = forest
        .sym_nodes()
        .find(|(_, node)| node.symbol == x && node.span == Span(0, 4))
        .expect("X spans the whole input");
    assert!(
        forest.alternatives(whole).len() >= 2,
        "X(0,4) has {} or-edges",
        forest.alternatives(whole).len()
    );
    assert!(forest.is_ambiguous(whole));
}

// S ::= a, fed an unexpected token.
#[test]
fn unexpected_token_reports_position_and_expectation() {
    let mut b = GrammarBuilder::new("S5");
    b.lhs("S").t("a", 'a' as i32).end();
    let g = b.grammar().unwrap();
    let ga = Analysis::new(&g);
    let mut parser = EarleyParser::new(&ga, EarleyOptions::default());

    // feed a single 'b' token: the default tokenizer maps single letters to
    // identifiers, so use punctuation-style character tokens instead
    struct OneToken {
        sent: bool,
    }
    impl scanner::TokenSource for OneToken {
        type Tok = scanner::DefaultToken;
        fn next_token(&mut self) -> Result<Self::Tok, scanner::ScanError> {
            if self.sent {
                return Ok(scanner::DefaultToken::new(scanner::EOF, "", Span(1, 1)));
            }
            self.sent = true;
            Ok(scanner::DefaultToken::new('b' as i32, "b", Span(0, 1)))
        }
    }

    let err = parser.parse(&mut OneToken { sent: false }).unwrap_err();
    assert_eq!(
        err,
        ParseError::Syntax {
            position: 1,
            token: "b".to_string(),
            expected: vec!["a".to_string()],
        }
    );
}

// A lispy grammar with nesting and an ε-terminated sequence.
#[test]
fn nested_lists_parse_to_depth_two() {
    let mut b = GrammarBuilder::new("S6");
    b.lhs("QuoteOrAtom").n("Quote").end();
    b.lhs("QuoteOrAtom").n("Atom").end();
    b.lhs("Quote").t("'", '\'' as i32).n("Atom").end();
    b.lhs("Atom").t("number", scanner::INT).end();
    b.lhs("Atom").n("List").end();
    b.lhs("List")
        .t("(", '(' as i32)
        .n("Sequence")
        .t(")", ')' as i32)
        .end();
    b.lhs("Sequence").n("QuoteOrAtom").n("Sequence").end();
    b.lhs("Sequence").epsilon();
    let g = b.grammar().unwrap();
    let ga = Analysis::new(&g);
    let mut parser = EarleyParser::new(&ga, tree_options());
    let mut scan = DefaultTokenizer::new("((1 2))");
    assert!(parser.parse(&mut scan).unwrap());

    let forest = parser.forest().expect("forest was requested");
    let root = forest.root().unwrap();
    assert_eq!(forest.symbol_node(root).span, Span(0, 6));

    let list = g.symbol_by_name("List").unwrap();
    let mut list_spans: Vec<Span> = forest
        .sym_nodes()
        .filter(|(_, node)| node.symbol == list)
        .map(|(_, node)| node.span)
        .collect();
    list_spans.sort_by_key(|s| s.from());
    assert_eq!(list_spans, vec![Span(0, 6), Span(1, 5)]);
}

#[test]
fn quoted_atoms_parse() {
    let mut b = GrammarBuilder::new("quote");
    b.lhs("QuoteOrAtom").n("Quote").end();
    b.lhs("QuoteOrAtom").n("Atom").end();
    b.lhs("Quote").t("'", '\'' as i32).n("Atom").end();
    b.lhs("Atom").t("number", scanner::INT).end();
    let g = b.grammar().unwrap();
    let ga = Analysis::new(&g);
    let mut parser = EarleyParser::new(&ga, EarleyOptions::default());
    let mut scan = DefaultTokenizer::new("'42");
    assert!(parser.parse(&mut scan).unwrap());
}

// Earley completeness: every string of the language is accepted.
#[test]
fn balanced_parentheses_language() {
    // P ::= ( P ) P | ε
    let mut b = GrammarBuilder::new("dyck");
    b.lhs("P")
        .t("(", '(' as i32)
        .n("P")
        .t(")", ')' as i32)
        .n("P")
        .end();
    b.lhs("P").epsilon();
    let g = b.grammar().unwrap();
    let ga = Analysis::new(&g);
    for input in ["", "()", "()()", "(())", "(()())()", "((()))"] {
        let mut parser = EarleyParser::new(&ga, EarleyOptions::default());
        let mut scan = DefaultTokenizer::new(input);
        assert!(parser.parse(&mut scan).unwrap(), "rejected {:?}", input);
    }
    for input in ["(", ")", "())", "(()"] {
        let mut parser = EarleyParser::new(&ga, EarleyOptions::default());
        let mut scan = DefaultTokenizer::new(input);
        let accepted = parser.parse(&mut scan).unwrap_or(false);
        assert!(!accepted, "accepted {:?}", input);
    }
}

#[test]
fn custom_chooser_overrides_the_default_policy() {
    // X ::= X * X | x over x*x*x: the default policy prefers the right
    // derivation; a chooser preferring the largest origin flips it.
    let mut b = GrammarBuilder::new("assoc");
    b.lhs("X").n("X").t("*", '*' as i32).n("X").end();
    b.lhs("X").t("x", scanner::IDENT).end();
    let g = b.grammar().unwrap();
    let ga = Analysis::new(&g);

    let options = EarleyOptions {
        generate_tree: true,
        store_tokens: true,
        choose: Some(Box::new(|viable: &[sylva::item::Item]| {
            viable
                .iter()
                .copied()
                .max_by_key(|item| item.origin)
                .expect("chooser is called with at least one candidate")
        })),
    };
    let mut parser = EarleyParser::new(&ga, options);
    let mut scan = DefaultTokenizer::new("x*x*x");
    assert!(parser.parse(&mut scan).unwrap());
    assert!(parser.forest().is_some());
}

//! A parsing toolbox for small-to-moderate domain-specific languages.
//!
//! The toolbox accepts a context-free grammar supplied at runtime, analyses
//! it, constructs parse tables, and recognizes input strings against it,
//! producing a shared packed parse forest (SPPF) even when the grammar is
//! ambiguous. There is no code-generation or compile step: build a grammar
//! from user input and parse with it in a couple of lines.
//!
//! # Building a grammar
//!
//! Grammars are specified with a builder. Clients add rules, consisting of
//! non-terminal symbols and terminals; terminals carry a token type.
//! Grammars may contain ε-productions.
//!
//! ```
//! use sylva::analysis::Analysis;
//! use sylva::grammar::GrammarBuilder;
//!
//! let mut b = GrammarBuilder::new("G");
//! b.lhs("S").n("A").t("a", 1).end(); // S ::= A a
//! b.lhs("A").t("b", 2).end();        // A ::= b
//! b.lhs("A").epsilon();              // A ::=
//! let grammar = b.grammar().unwrap();
//! let analysis = Analysis::new(&grammar); // FIRST, FOLLOW, nullable
//! # let _ = analysis;
//! ```
//!
//! # Parsing
//!
//! The [`earley::EarleyParser`] recognizes arbitrary context-free grammars,
//! including ambiguous and left-recursive ones, and can build a parse
//! forest ([`sppf::Forest`]) which is then traversed with a cursor and
//! listeners. For deterministic SLR(1) grammars, [`table::TableGenerator`]
//! derives the CFSM and GOTO/ACTION tables driving the [`slr::SlrParser`].

pub mod analysis;
pub mod cfsm;
pub mod earley;
pub mod grammar;
pub mod item;
pub mod scanner;
pub mod slr;
pub mod sppf;
pub mod table;
pub mod token;

pub use analysis::Analysis;
pub use earley::{EarleyOptions, EarleyParser, TreeBuilder};
pub use grammar::{Grammar, GrammarBuilder, GrammarError};
pub use sppf::Forest;
pub use table::TableGenerator;
pub use token::{Span, TokType, Token};

type BuildHasher = std::hash::BuildHasherDefault<rustc_hash::FxHasher>;

/// Insertion-ordered hash map used throughout the crate; iteration order is
/// load-bearing (worklists, or-edge order).
pub type Map<K, V> = indexmap::IndexMap<K, V, BuildHasher>;

/// Insertion-ordered hash set used throughout the crate.
pub type Set<T> = indexmap::IndexSet<T, BuildHasher>;

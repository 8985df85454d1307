//! LR parser tables: a sparse integer matrix, the GOTO/ACTION tables and
//! their generator.
//!
//! Tables are stored as sparse matrices in triplet encoding (COO). Every
//! entry is either a single `i32` or a pair `(i32, i32)`; the second slot
//! holds a conflicting action encountered during construction. Shift is
//! encoded as the sentinel `-1`, accept as `-2` and reduce *k* as the
//! positive rule number *k*.

use crate::analysis::Analysis;
use crate::cfsm::{Cfsm, StateID};
use crate::grammar::Grammar;
use crate::token::TokType;
use std::io;

/// ACTION-table sentinel for a shift action.
pub const SHIFT_ACTION: i32 = -1;
/// ACTION-table sentinel for the accept action.
pub const ACCEPT_ACTION: i32 = -2;

/// Default null value for sparse matrices (minimum `i32`).
pub const DEFAULT_NULL_VALUE: i32 = i32::MIN;

/// A sparse matrix of `i32` values in triplet encoding, sorted by
/// `(row, column)` for binary-search lookup. Values cannot be deleted, but
/// may be overwritten with the null value.
#[derive(Debug, Clone)]
pub struct SparseIntMatrix {
    values: Vec<Triplet>,
    rows: usize,
    cols: usize,
    nullval: i32,
}

#[derive(Debug, Copy, Clone)]
struct Triplet {
    row: usize,
    col: usize,
    value: (i32, i32),
}

impl SparseIntMatrix {
    pub fn new(rows: usize, cols: usize, null_value: i32) -> Self {
        Self {
            values: Vec::new(),
            rows,
            cols,
            nullval: null_value,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn null_value(&self) -> i32 {
        self.nullval
    }

    /// Number of positions holding at least one value.
    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    fn position(&self, row: usize, col: usize) -> Result<usize, usize> {
        self.values
            .binary_search_by(|t| (t.row, t.col).cmp(&(row, col)))
    }

    /// The primary value at `(row, col)`, or the null value.
    pub fn value(&self, row: usize, col: usize) -> i32 {
        match self.position(row, col) {
            Ok(at) => self.values[at].value.0,
            Err(_) => self.nullval,
        }
    }

    /// The pair of values at `(row, col)`, or `(null, null)`.
    pub fn values(&self, row: usize, col: usize) -> (i32, i32) {
        match self.position(row, col) {
            Ok(at) => self.values[at].value,
            Err(_) => (self.nullval, self.nullval),
        }
    }

    /// Overwrite the entry at `(row, col)` with a single value.
    pub fn set(&mut self, row: usize, col: usize, value: i32) {
        match self.position(row, col) {
            Ok(at) => self.values[at].value = (value, self.nullval),
            Err(at) => self.values.insert(
                at,
                Triplet {
                    row,
                    col,
                    value: (value, self.nullval),
                },
            ),
        }
    }

    /// Add a value at `(row, col)`: fill the first empty slot, or overwrite
    /// the second slot if the entry is full.
    pub fn add(&mut self, row: usize, col: usize, value: i32) {
        match self.position(row, col) {
            Ok(at) => {
                let pair = &mut self.values[at].value;
                if pair.0 == self.nullval {
                    pair.0 = value;
                } else if pair.1 == self.nullval {
                    pair.1 = value;
                } else {
                    pair.1 = value;
                }
            }
            Err(at) => self.values.insert(
                at,
                Triplet {
                    row,
                    col,
                    value: (value, self.nullval),
                },
            ),
        }
    }
}

/// A parser table: a sparse matrix indexed by `(state, token type)`.
///
/// Token types may be negative (EOF is scanner-defined), so the table keeps
/// the lowest column value as an offset, making all stored column indices
/// non-negative.
#[derive(Debug, Clone)]
pub struct Table {
    matrix: SparseIntMatrix,
    mincol: TokType,
}

impl Table {
    fn new(states: usize, extent: usize, mincol: TokType) -> Self {
        Self {
            matrix: SparseIntMatrix::new(states, extent, DEFAULT_NULL_VALUE),
            mincol,
        }
    }

    fn col(&self, tok: TokType) -> Option<usize> {
        let j = tok - self.mincol;
        (j >= 0).then_some(j as usize)
    }

    pub fn null_value(&self) -> i32 {
        self.matrix.null_value()
    }

    pub fn state_count(&self) -> usize {
        self.matrix.rows()
    }

    pub fn value_count(&self) -> usize {
        self.matrix.value_count()
    }

    /// The primary entry at `(state, token type)`. Token types outside the
    /// table's column range read as the null value.
    pub fn value(&self, state: StateID, tok: TokType) -> i32 {
        match self.col(tok) {
            Some(col) => self.matrix.value(state.raw() as usize, col),
            None => self.null_value(),
        }
    }

    /// Both entries at `(state, token type)`; the second slot holds a
    /// conflicting action, if any.
    pub fn values(&self, state: StateID, tok: TokType) -> (i32, i32) {
        match self.col(tok) {
            Some(col) => self.matrix.values(state.raw() as usize, col),
            None => (self.null_value(), self.null_value()),
        }
    }

    // Writes happen only during construction, with grammar symbols; a
    // column below the offset is a generator bug.
    fn set(&mut self, state: StateID, tok: TokType, value: i32) {
        let col = self
            .col(tok)
            .unwrap_or_else(|| panic!("table write with column index < 0: {}", tok));
        self.matrix.set(state.raw() as usize, col, value);
    }

    fn add(&mut self, state: StateID, tok: TokType, value: i32) {
        let col = self
            .col(tok)
            .unwrap_or_else(|| panic!("table write with column index < 0: {}", tok));
        self.matrix.add(state.raw() as usize, col, value);
    }
}

/// Stringify an ACTION-table entry for diagnostics and HTML export.
fn action_string(v: i32, null: i32) -> String {
    if v == null {
        "&nbsp;".to_string()
    } else if v == ACCEPT_ACTION {
        "A".to_string()
    } else if v == SHIFT_ACTION {
        "S".to_string()
    } else {
        format!("R {}", v)
    }
}

fn goto_string(v: i32, null: i32) -> String {
    if v == null {
        "&nbsp;".to_string()
    } else {
        format!("{}", v)
    }
}

/// Generator for LR parser tables.
///
/// Clients create a `Grammar`, an [`Analysis`] for it, and then a table
/// generator. [`TableGenerator::create_tables`] constructs the CFSM and the
/// GOTO/ACTION tables for an SLR(1) parser recognizing the grammar.
pub struct TableGenerator<'a, 'g> {
    ga: &'a Analysis<'g>,
    dfa: Option<Cfsm<'g>>,
    goto_table: Option<Table>,
    action_table: Option<Table>,
    /// Set during ACTION-table construction when a cell received a second
    /// entry (shift/reduce or reduce/reduce). An SLR-only client treats this
    /// as fatal; an Earley client ignores it.
    pub has_conflicts: bool,
}

impl<'a, 'g> TableGenerator<'a, 'g> {
    pub fn new(ga: &'a Analysis<'g>) -> Self {
        Self {
            ga,
            dfa: None,
            goto_table: None,
            action_table: None,
            has_conflicts: false,
        }
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.ga.grammar()
    }

    /// Create the CFSM and both parser tables.
    pub fn create_tables(&mut self) {
        self.ensure_cfsm();
        self.goto_table = Some(self.build_goto_table());
        let (actions, conflicts) = self.build_slr1_action_table();
        self.action_table = Some(actions);
        self.has_conflicts = conflicts;
    }

    fn ensure_cfsm(&mut self) -> &Cfsm<'g> {
        if self.dfa.is_none() {
            self.dfa = Some(Cfsm::generate(self.ga.grammar()));
        }
        self.dfa.as_ref().expect("just constructed")
    }

    /// The CFSM of the grammar, constructing it if necessary.
    pub fn cfsm(&mut self) -> &Cfsm<'g> {
        self.ensure_cfsm()
    }

    /// The GOTO table; `None` until [`TableGenerator::create_tables`] ran.
    pub fn goto_table(&self) -> Option<&Table> {
        self.goto_table.as_ref()
    }

    /// The ACTION table; `None` until [`TableGenerator::create_tables`] ran.
    pub fn action_table(&self) -> Option<&Table> {
        self.action_table.as_ref()
    }

    /// All accepting states of the CFSM.
    pub fn accepting_states(&self) -> Vec<StateID> {
        match &self.dfa {
            Some(dfa) => dfa
                .states()
                .filter(|(_, s)| s.is_accepting())
                .map(|(id, _)| id)
                .collect(),
            None => {
                tracing::error!("tables not yet generated; call create_tables() first");
                Vec::new()
            }
        }
    }

    fn value_extent(&self) -> (TokType, TokType) {
        let mut min = 0;
        let mut max = 0;
        for (_, sym) in self.ga.grammar().symbols() {
            min = min.min(sym.value());
            max = max.max(sym.value());
        }
        (min, max)
    }

    /// Build the GOTO table: for each CFSM edge `(s, X, s')` set
    /// `GOTO[s, value(X)] = s'`.
    pub fn build_goto_table(&mut self) -> Table {
        let (mintok, maxtok) = self.value_extent();
        let dfa = self.ensure_cfsm();
        let extent = (maxtok - mintok + 1) as usize;
        tracing::debug!(
            "GOTO table of size {} x ({}-{}={})",
            dfa.state_count(),
            maxtok,
            mintok,
            extent
        );
        let mut table = Table::new(dfa.state_count(), extent, mintok);
        for (id, state) in dfa.states() {
            for (sym, to) in state.edges() {
                let value = dfa.grammar().symbol(sym).value();
                table.set(id, value, to.raw() as i32);
            }
        }
        table
    }

    /// Build the SLR(1) ACTION table, including lookahead from the FOLLOW
    /// sets computed by the grammar analyzer. Returns the table and a flag
    /// indicating conflicts.
    pub fn build_slr1_action_table(&mut self) -> (Table, bool) {
        let (mintok, maxtok) = self.value_extent();
        let states = {
            let dfa = self.ensure_cfsm();
            dfa.state_count()
        };
        let extent = (maxtok - mintok + 1) as usize;
        tracing::debug!(
            "ACTION.1 table of size {} x ({}-{}={})",
            states,
            maxtok,
            mintok,
            extent
        );
        let table = Table::new(states, extent, mintok);
        self.build_action_table(table, true)
    }

    /// Build the LR(0) ACTION table (no lookahead, one column). Not used by
    /// [`TableGenerator::create_tables`]; provided as an add-on.
    pub fn build_lr0_action_table(&mut self) -> (Table, bool) {
        let states = {
            let dfa = self.ensure_cfsm();
            dfa.state_count()
        };
        tracing::debug!("ACTION.0 table of size {} x 1", states);
        let table = Table::new(states, 1, 0);
        self.build_action_table(table, false)
    }

    // For building an ACTION table we iterate over all states of the CFSM,
    // and within each state over its items. An item with a terminal after
    // the dot produces a shift entry (accept when the terminal is EOF). An
    // item with the dot behind the complete RHS produces a reduce entry:
    // for the LR(0) case once, for the SLR case per terminal of
    // FOLLOW(LHS). Reducing the start rule is the accept action.
    fn build_action_table(&mut self, mut actions: Table, slr1: bool) -> (Table, bool) {
        let ga = self.ga;
        let dfa = self.ensure_cfsm();
        let grammar = dfa.grammar();
        let mut has_conflicts = false;
        for (id, state) in dfa.states() {
            for &item in state.items().iter() {
                if let Some(a) = item.peek(grammar) {
                    let sym = grammar.symbol(a);
                    if !sym.is_terminal() {
                        continue;
                    }
                    let entry = if sym.is_eof() {
                        ACCEPT_ACTION
                    } else {
                        SHIFT_ACTION
                    };
                    if slr1 {
                        let existing = actions.value(id, sym.token_type());
                        if existing != actions.null_value() {
                            if existing == entry {
                                // relax, double shift
                            } else {
                                has_conflicts = true;
                                actions.add(id, sym.token_type(), entry);
                            }
                        } else {
                            actions.add(id, sym.token_type(), entry);
                        }
                    } else {
                        let existing = actions.value(id, 0);
                        if existing != actions.null_value() && existing != entry {
                            has_conflicts = true;
                        }
                        actions.add(id, 0, entry);
                    }
                } else {
                    // dot is behind the RHS: reduce, or accept for rule 0
                    let entry = if item.rule == crate::grammar::RuleID::ACCEPT {
                        ACCEPT_ACTION
                    } else {
                        item.rule.index() as i32
                    };
                    let lhs = grammar.rule(item.rule).lhs();
                    if slr1 {
                        for &la in ga.follow(lhs).iter() {
                            let (a1, a2) = actions.values(id, la);
                            if a1 != actions.null_value() || a2 != actions.null_value() {
                                has_conflicts = true;
                            }
                            actions.add(id, la, entry);
                            tracing::trace!(
                                "reduce entry ACTION({}, {}) = {}",
                                id,
                                la,
                                entry
                            );
                        }
                    } else {
                        let (a1, a2) = actions.values(id, 0);
                        if a1 != actions.null_value() || a2 != actions.null_value() {
                            has_conflicts = true;
                        }
                        actions.add(id, 0, entry);
                    }
                }
            }
        }
        (actions, has_conflicts)
    }

    /// Export the GOTO table in HTML format.
    pub fn goto_table_as_html(&self, w: &mut impl io::Write) -> io::Result<()> {
        match &self.goto_table {
            Some(table) => self.table_as_html("GOTO", table, goto_string, w),
            None => {
                tracing::error!("GOTO table not yet created, cannot export to HTML");
                Ok(())
            }
        }
    }

    /// Export the SLR(1) ACTION table in HTML format. Shift is rendered as
    /// `S`, reduce *k* as `R k`, accept as `A`, a conflicting pair as
    /// `v1 / v2`.
    pub fn action_table_as_html(&self, w: &mut impl io::Write) -> io::Result<()> {
        match &self.action_table {
            Some(table) => self.table_as_html("ACTION", table, action_string, w),
            None => {
                tracing::error!("ACTION table not yet created, cannot export to HTML");
                Ok(())
            }
        }
    }

    fn table_as_html(
        &self,
        name: &str,
        table: &Table,
        render: fn(i32, i32) -> String,
        w: &mut impl io::Write,
    ) -> io::Result<()> {
        let grammar = self.ga.grammar();
        writeln!(w, "<html><body>")?;
        writeln!(w, "{} table of size = {}<p>", name, table.value_count())?;
        writeln!(w, "<table border=1 cellspacing=0 cellpadding=5>")?;
        write!(w, "<tr bgcolor=#cccccc><td></td>")?;
        let symbols: Vec<_> = grammar
            .symbols()
            .filter(|(_, sym)| !sym.is_epsilon())
            .collect();
        for (_, sym) in &symbols {
            write!(w, "<td>{}</td>", sym.name())?;
        }
        writeln!(w, "</tr>")?;
        for row in 0..table.state_count() {
            let state = StateID::new(row as u32);
            write!(w, "<tr><td>state {}</td>", row)?;
            for (_, sym) in &symbols {
                let (v1, v2) = table.values(state, sym.value());
                let cell = if v1 == table.null_value() {
                    "&nbsp;".to_string()
                } else if v2 == table.null_value() {
                    render(v1, table.null_value())
                } else {
                    format!(
                        "{} / {}",
                        render(v1, table.null_value()),
                        render(v2, table.null_value())
                    )
                };
                write!(w, "<td>{}</td>", cell)?;
            }
            writeln!(w, "</tr>")?;
        }
        writeln!(w, "</table></body></html>")
    }
}

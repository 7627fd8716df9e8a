//! The boolean term tree making up a WHERE clause, and the disjunctive-normal-form rewrite the
//! DNF plugin pass applies to it.

use crate::value_expr::{ColumnRef, ValueExpr};
use std::fmt;

/// A leaf of a [`BoolFactor`]: something that can stand on its own between `AND`/`OR`.
#[derive(Debug, Clone, PartialEq)]
pub enum BoolFactorTerm {
    /// A predicate comparing a value expression against something, kept as rendered SQL text
    /// since its internal shape never needs to be inspected past this point.
    ValueExprPredicate {
        left: ValueExpr,
        op: String,
        right: ValueExpr,
    },
    /// Catch-all for anything the parser produced that can be passed through untouched, e.g. a
    /// `BETWEEN`, `IN (...)`, or a parenthesized sub-term the planner doesn't need to analyze.
    Pass(String),
}

impl BoolFactorTerm {
    pub fn find_column_refs(&self, out: &mut Vec<ColumnRef>) {
        if let BoolFactorTerm::ValueExprPredicate { left, right, .. } = self {
            left.find_column_refs(out);
            right.find_column_refs(out);
        }
    }
}

impl fmt::Display for BoolFactorTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoolFactorTerm::ValueExprPredicate { left, op, right } => {
                write!(f, "{left} {op} {right}")
            }
            BoolFactorTerm::Pass(text) => write!(f, "{text}"),
        }
    }
}

/// A conjunction of [`BoolFactorTerm`]s, i.e. `term1 AND term2 AND ...` collapsed one level:
/// Qserv calls this a "bool factor" because a single untouched term (no internal `AND`) is also
/// a valid (length-1) factor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoolFactor {
    pub terms: Vec<BoolFactorTerm>,
}

impl BoolFactor {
    pub fn single(term: BoolFactorTerm) -> Self {
        Self { terms: vec![term] }
    }

    pub fn find_column_refs(&self, out: &mut Vec<ColumnRef>) {
        for t in &self.terms {
            t.find_column_refs(out);
        }
    }
}

impl fmt::Display for BoolFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, t) in self.terms.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "{t}")?;
        }
        Ok(())
    }
}

/// A general (not-yet-normalized) boolean term, mirroring the `AndTerm`/`OrTerm`/`BoolFactor`
/// class hierarchy of the original planner as a single recursive enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    And(Vec<Term>),
    Or(Vec<Term>),
    Factor(BoolFactor),
}

impl Term {
    pub fn find_column_refs(&self, out: &mut Vec<ColumnRef>) {
        match self {
            Term::And(terms) | Term::Or(terms) => {
                for t in terms {
                    t.find_column_refs(out);
                }
            }
            Term::Factor(f) => f.find_column_refs(out),
        }
    }

    /// Rewrite this term into disjunctive normal form: a disjunction of conjunctions of factors.
    ///
    /// `AND` distributes over nested `OR`s; a bare term with no boolean connective becomes a
    /// single-factor, single-conjunct disjunction. Mirrors
    /// `DisjunctiveNormalFormPlugin::applyLogical`, which always leaves the WHERE clause's root
    /// term as an `OrTerm` of `AndTerm`s even when the original predicate had no `OR` at all.
    pub fn to_disjunctive_normal_form(&self) -> OrTerm {
        OrTerm {
            and_terms: dnf_disjuncts(self).into_iter().map(AndTerm::new).collect(),
        }
    }
}

fn dnf_disjuncts(term: &Term) -> Vec<Vec<BoolFactor>> {
    match term {
        Term::Factor(f) => vec![vec![f.clone()]],
        Term::Or(terms) => terms.iter().flat_map(dnf_disjuncts).collect(),
        Term::And(terms) => terms
            .iter()
            .map(dnf_disjuncts)
            .fold(vec![Vec::new()], |acc, disjuncts| {
                let mut out = Vec::with_capacity(acc.len() * disjuncts.len());
                for conjunct in &acc {
                    for disjunct in &disjuncts {
                        let mut merged = conjunct.clone();
                        merged.extend(disjunct.iter().cloned());
                        out.push(merged);
                    }
                }
                out
            }),
    }
}

/// A conjunction of [`BoolFactor`]s: one disjunct of a normalized WHERE clause.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AndTerm {
    pub factors: Vec<BoolFactor>,
}

impl AndTerm {
    pub fn new(factors: Vec<BoolFactor>) -> Self {
        Self { factors }
    }
}

impl fmt::Display for AndTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, factor) in self.factors.iter().enumerate() {
            if i > 0 {
                write!(f, " AND ")?;
            }
            write!(f, "{factor}")?;
        }
        Ok(())
    }
}

/// The root of a normalized WHERE clause: a disjunction of [`AndTerm`]s.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrTerm {
    pub and_terms: Vec<AndTerm>,
}

impl fmt::Display for OrTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, and_term) in self.and_terms.iter().enumerate() {
            if i > 0 {
                write!(f, " OR ")?;
            }
            if self.and_terms.len() > 1 && and_term.factors.len() > 1 {
                write!(f, "({and_term})")?;
            } else {
                write!(f, "{and_term}")?;
            }
        }
        Ok(())
    }
}

/// A WHERE clause: the un-normalized root term as parsed, plus (after the DNF pass runs) its
/// normal form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WhereClause {
    pub root: Option<Term>,
    pub normalized: Option<OrTerm>,
}

impl WhereClause {
    pub fn new(root: Term) -> Self {
        Self {
            root: Some(root),
            normalized: None,
        }
    }

    pub fn find_column_refs(&self, out: &mut Vec<ColumnRef>) {
        if let Some(root) = &self.root {
            root.find_column_refs(out);
        }
    }

    /// Run the DNF rewrite, caching the result. Idempotent.
    pub fn apply_disjunctive_normal_form(&mut self) {
        if let Some(root) = &self.root {
            self.normalized = Some(root.to_disjunctive_normal_form());
        }
    }
}

impl fmt::Display for WhereClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(normalized) = &self.normalized {
            write!(f, "{normalized}")
        } else if let Some(root) = &self.root {
            write!(f, "{}", DisplayRoot(root))
        } else {
            Ok(())
        }
    }
}

struct DisplayRoot<'a>(&'a Term);

impl fmt::Display for DisplayRoot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Term::Factor(factor) => write!(f, "{factor}"),
            Term::And(terms) => {
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " AND ")?;
                    }
                    write!(f, "{}", DisplayRoot(t))?;
                }
                Ok(())
            }
            Term::Or(terms) => {
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, " OR ")?;
                    }
                    write!(f, "{}", DisplayRoot(t))?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass(text: &str) -> Term {
        Term::Factor(BoolFactor::single(BoolFactorTerm::Pass(text.to_string())))
    }

    #[test]
    fn bare_term_normalizes_to_single_disjunct_single_conjunct() {
        let root = pass("a = 1");
        let dnf = root.to_disjunctive_normal_form();
        assert_eq!(dnf.and_terms.len(), 1);
        assert_eq!(dnf.and_terms[0].factors.len(), 1);
    }

    #[test]
    fn and_of_or_distributes_into_or_of_and() {
        // (a OR b) AND c  ->  (a AND c) OR (b AND c)
        let root = Term::And(vec![Term::Or(vec![pass("a"), pass("b")]), pass("c")]);
        let dnf = root.to_disjunctive_normal_form();
        assert_eq!(dnf.and_terms.len(), 2);
        for and_term in &dnf.and_terms {
            assert_eq!(and_term.factors.len(), 2);
        }
    }

    #[test]
    fn plain_or_normalizes_without_changing_disjunct_count() {
        let root = Term::Or(vec![pass("a"), pass("b"), pass("c")]);
        let dnf = root.to_disjunctive_normal_form();
        assert_eq!(dnf.and_terms.len(), 3);
    }
}

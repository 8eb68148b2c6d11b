//! # Term language - parsed form
//!
//! A term composes independently defined leaf queries:
//!
//! ```text
//! user(orders,addresses)      nest orders and addresses under each user
//! active|inactive             union of two queries over the same entity
//! user+profile                left-join profile fields onto user rows
//! vip:user                    keep only users also returned by vip
//! shop.(open|closed)          prefix distribution: shop.open|shop.closed
//! ```
//!
//! Operators bind from loosest to tightest: `|`, `+`, `:`, then `id(...)`.
//! Parentheses without an id group a sub-term.

use std::fmt;

/// A parsed term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// A single leaf query, by id
    Leaf(String),

    /// `a|b|c` - union over the same entity
    Merge(Vec<Term>),

    /// `a+b+c` - left-join of `b`, `c` onto the base `a`
    Attach(Vec<Term>),

    /// `a:b:c` - intersection chain, `c` is the base
    Filter(Vec<Term>),

    /// `id(c1,c2)` - nest each child under the rows of `id`
    Tree(String, Vec<Term>),
}

impl Term {
    /// Binding strength of the term's top-level operator, loosest first.
    fn precedence(&self) -> u8 {
        match self {
            Term::Merge(_) => 0,
            Term::Attach(_) => 1,
            Term::Filter(_) => 2,
            Term::Leaf(_) | Term::Tree(..) => 3,
        }
    }

    /// The name a term is known by when nested as a Tree child.
    ///
    /// Leaves and trees use their id; composite terms use their first operand.
    pub fn label(&self) -> &str {
        match self {
            Term::Leaf(id) | Term::Tree(id, _) => id,
            Term::Merge(terms) | Term::Attach(terms) | Term::Filter(terms) => {
                terms.first().map(Term::label).unwrap_or_default()
            }
        }
    }

    /// All leaf ids referenced by the term, in order of appearance.
    pub fn leaf_ids(&self) -> Vec<&str> {
        let mut ids = Vec::new();
        self.collect_ids(&mut ids);
        ids
    }

    fn collect_ids<'a>(&'a self, ids: &mut Vec<&'a str>) {
        match self {
            Term::Leaf(id) => ids.push(id),
            Term::Tree(id, children) => {
                ids.push(id);
                children.iter().for_each(|c| c.collect_ids(ids));
            }
            Term::Merge(terms) | Term::Attach(terms) | Term::Filter(terms) => {
                terms.iter().for_each(|t| t.collect_ids(ids));
            }
        }
    }

    fn fmt_operands(f: &mut fmt::Formatter<'_>, terms: &[Term], op: &str, level: u8) -> fmt::Result {
        for (i, term) in terms.iter().enumerate() {
            if i > 0 {
                f.write_str(op)?;
            }
            if term.precedence() <= level {
                write!(f, "({})", term)?;
            } else {
                write!(f, "{}", term)?;
            }
        }
        Ok(())
    }
}

/// Canonical serialization. Parsing the output yields a structurally equal term.
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Leaf(id) => f.write_str(id),
            Term::Merge(terms) => Term::fmt_operands(f, terms, "|", 0),
            Term::Attach(terms) => Term::fmt_operands(f, terms, "+", 1),
            Term::Filter(terms) => Term::fmt_operands(f, terms, ":", 2),
            Term::Tree(id, children) => {
                write!(f, "{}(", id)?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", child)?;
                }
                f.write_str(")")
            }
        }
    }
}

use crate::term::Term;

/// Errors produced while parsing a term.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// A `(` without its `)` or vice versa
    #[error("unbalanced parentheses at position {position} in '{input}'")]
    UnbalancedParens { input: String, position: usize },

    /// An operator or parenthesis with nothing on one side
    #[error("empty operand in '{input}'")]
    EmptyOperand { input: String },

    /// An id containing characters outside `[A-Za-z0-9_./-]`
    #[error("invalid identifier '{id}'")]
    InvalidIdentifier { id: String },

    /// Text that is neither a bare id nor `id(children)`
    #[error("malformed term '{input}'")]
    MalformedTree { input: String },
}

/// Resolves a Tree child's id to its declared target.
///
/// Implemented by the artifact catalog, which knows the aliases each parent
/// leaf declares.
pub trait AliasLookup {
    fn alias(&self, parent: &str, child: &str) -> Option<String>;
}

/// Alias lookup that never rewrites.
pub struct NoAliases;

impl AliasLookup for NoAliases {
    fn alias(&self, _parent: &str, _child: &str) -> Option<String> {
        None
    }
}

/// Parse a term without alias substitution.
///
/// # Examples
///
/// ```
/// use termql::{parse, Term};
///
/// let term = parse("user(orders,addresses)").unwrap();
/// assert_eq!(
///     term,
///     Term::Tree(
///         "user".to_string(),
///         vec![Term::Leaf("orders".to_string()), Term::Leaf("addresses".to_string())]
///     )
/// );
/// ```
pub fn parse(raw: &str) -> Result<Term, ParseError> {
    parse_with(raw, &NoAliases)
}

/// Parse a term, rewriting Tree child ids through `aliases`.
pub fn parse_with(raw: &str, aliases: &dyn AliasLookup) -> Result<Term, ParseError> {
    check_balance(raw)?;
    let text = distribute_prefixes(raw)?;
    Parser { aliases }.parse_merge(&text)
}

/// Term parser.
///
/// Precedence is realised by cascading paren-aware splits, loosest first:
/// `|`, then `+`, then `:`, then `id? '(' children ')'` or a bare id. A
/// separator only splits while the paren depth is zero.
struct Parser<'a> {
    aliases: &'a dyn AliasLookup,
}

impl Parser<'_> {
    /// Parse `a|b|...`
    fn parse_merge(&self, input: &str) -> Result<Term, ParseError> {
        let parts = split_top(input, '|');
        if parts.len() == 1 {
            return self.parse_attach(input);
        }
        let terms = operands(input, parts)?
            .into_iter()
            .map(|part| self.parse_attach(part))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Term::Merge(terms))
    }

    /// Parse `a+b+...`
    fn parse_attach(&self, input: &str) -> Result<Term, ParseError> {
        let parts = split_top(input, '+');
        if parts.len() == 1 {
            return self.parse_filter(input);
        }
        let terms = operands(input, parts)?
            .into_iter()
            .map(|part| self.parse_filter(part))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Term::Attach(terms))
    }

    /// Parse `a:b:...`
    fn parse_filter(&self, input: &str) -> Result<Term, ParseError> {
        let parts = split_top(input, ':');
        if parts.len() == 1 {
            return self.parse_atom(input);
        }
        let terms = operands(input, parts)?
            .into_iter()
            .map(|part| self.parse_atom(part))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Term::Filter(terms))
    }

    /// Parse `id`, `id(c1,c2,...)` or a grouping `(term)`
    fn parse_atom(&self, input: &str) -> Result<Term, ParseError> {
        let text = input.trim();
        if text.is_empty() {
            return Err(ParseError::EmptyOperand {
                input: input.to_string(),
            });
        }

        if !text.ends_with(')') {
            if text.contains(['(', ')']) {
                return Err(malformed(text));
            }
            validate_id(text)?;
            return Ok(Term::Leaf(text.to_string()));
        }

        // The first '(' must close at the very end: "a(b)c" and "(a)(b)" are rejected.
        let open = text.find('(').ok_or_else(|| malformed(text))?;
        if matching_close(text, open) != Some(text.len() - 1) {
            return Err(malformed(text));
        }

        let id = text[..open].trim();
        let inner = &text[open + 1..text.len() - 1];
        if inner.trim().is_empty() {
            return Err(ParseError::EmptyOperand {
                input: text.to_string(),
            });
        }
        let parts = operands(inner, split_top(inner, ','))?;

        if id.is_empty() {
            return match parts.as_slice() {
                [single] => self.parse_merge(single),
                _ => Err(malformed(text)),
            };
        }

        validate_id(id)?;
        let children = parts
            .into_iter()
            .map(|child| self.parse_merge(&self.substitute_alias(id, child)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Term::Tree(id.to_string(), children))
    }

    /// Rewrite the leading id of a Tree child to its declared target,
    /// keeping whatever follows it (e.g. its own children).
    fn substitute_alias(&self, parent: &str, child: &str) -> String {
        let child = child.trim();
        let end = child.find(|c: char| !is_id_char(c)).unwrap_or(child.len());
        let (id, rest) = child.split_at(end);
        if id.is_empty() || !(rest.is_empty() || rest.starts_with('(')) {
            return child.to_string();
        }
        match self.aliases.alias(parent, id) {
            Some(target) => format!("{}{}", target, rest),
            None => child.to_string(),
        }
    }
}

fn malformed(text: &str) -> ParseError {
    ParseError::MalformedTree {
        input: text.to_string(),
    }
}

fn operands<'s>(input: &str, parts: Vec<&'s str>) -> Result<Vec<&'s str>, ParseError> {
    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(ParseError::EmptyOperand {
            input: input.trim().to_string(),
        });
    }
    Ok(parts)
}

pub(crate) fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '-')
}

/// Ids name artifact paths, so every `/` segment must be a plain name:
/// never empty and never starting or ending with `.` (which also rules out
/// `.` and `..`).
fn validate_id(id: &str) -> Result<(), ParseError> {
    let valid = !id.is_empty()
        && id.chars().all(is_id_char)
        && id
            .split('/')
            .all(|segment| !segment.is_empty() && !segment.starts_with('.') && !segment.ends_with('.'));
    if valid {
        Ok(())
    } else {
        Err(ParseError::InvalidIdentifier { id: id.to_string() })
    }
}

/// Split on `sep` wherever the paren depth is zero.
pub fn split_top(input: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&input[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

fn matching_close(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn check_balance(input: &str) -> Result<(), ParseError> {
    let mut depth = 0usize;
    for (i, c) in input.char_indices() {
        match c {
            '(' => depth += 1,
            ')' if depth == 0 => {
                return Err(ParseError::UnbalancedParens {
                    input: input.to_string(),
                    position: i,
                });
            }
            ')' => depth -= 1,
            _ => {}
        }
    }
    if depth > 0 {
        return Err(ParseError::UnbalancedParens {
            input: input.to_string(),
            position: input.len(),
        });
    }
    Ok(())
}

/// Rewrite every `prefix.(a|b)` into `(prefix.a|prefix.b)`.
///
/// The rewritten list stays parenthesized so the surrounding operators keep
/// their precedence. Input must already be balanced.
pub fn distribute_prefixes(input: &str) -> Result<String, ParseError> {
    let mut text = input.to_string();
    while let Some(dot) = text.find(".(") {
        let start = text[..dot]
            .rfind(|c: char| !is_id_char(c))
            .map(|i| i + 1)
            .unwrap_or(0);
        if start == dot {
            return Err(malformed(input));
        }
        let prefix = &text[start..=dot];
        let open = dot + 1;
        let close = matching_close(&text, open).ok_or_else(|| ParseError::UnbalancedParens {
            input: input.to_string(),
            position: open,
        })?;
        let inner = &text[open + 1..close];
        let parts = operands(inner, split_top(inner, '|'))?;
        let distributed = parts
            .iter()
            .map(|part| format!("{}{}", prefix, part.trim()))
            .collect::<Vec<_>>()
            .join("|");
        text = format!("{}({}){}", &text[..start], distributed, &text[close + 1..]);
    }
    Ok(text)
}

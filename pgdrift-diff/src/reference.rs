//! Textual reference detection.
//!
//! Objects are ordered by scanning each one's DDL for the names of the other
//! objects in the same batch. The scan works on raw lines and is a heuristic:
//! a name inside a comment or a string literal still counts, and a reference
//! split across lines is missed. It never fails; it only affects ordering.
//!
//! A name matches when it stands as a whole token:
//!
//! - the next character is the end of the line, whitespace, `;` or `"`;
//! - for routines the name is instead followed by `(`, and the number of
//!   top-level arguments in the call equals the routine's parameter count;
//! - when the name is schema-qualified, the qualifier equals the
//!   candidate's schema;
//! - it is not the tail of a longer identifier (`orders` in `customer_orders`).

use std::hash::Hash;

use indexmap::IndexSet;

use crate::key::TableKey;
use crate::snapshot::RoutineDescriptor;

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Check whether `line` references `schema.name`.
///
/// `arity` is `None` for tables and views and the parameter count for routines.
pub fn line_references(line: &str, schema: &str, name: &str, arity: Option<usize>) -> bool {
    if name.is_empty() {
        return false;
    }
    line.match_indices(name).any(|(pos, _)| {
        let after = &line[pos + name.len()..];
        let follows = match arity {
            None => is_boundary(after),
            Some(arity) => call_arity(after) == Some(arity),
        };
        follows && qualifier_matches(&line[..pos], schema)
    })
}

fn is_boundary(after: &str) -> bool {
    match after.chars().next() {
        None => true,
        Some(c) => matches!(c, '\n' | '\r' | ' ' | '\t' | ';' | '"'),
    }
}

/// Number of top-level arguments of a call starting right after a routine
/// name, or `None` if there is no complete call on this line.
fn call_arity(after: &str) -> Option<usize> {
    let after = after.strip_prefix('"').unwrap_or(after);
    let arguments = after.strip_prefix('(')?;

    let mut depth = 1usize;
    let mut commas = 0;
    let mut empty = true;
    for c in arguments.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(if empty { 0 } else { commas + 1 });
                }
            }
            ',' if depth == 1 => commas += 1,
            _ => {}
        }
        if !c.is_whitespace() {
            empty = false;
        }
    }
    None
}

fn qualifier_matches(before: &str, schema: &str) -> bool {
    let Some(last) = before.chars().last() else {
        return true;
    };
    let rest = &before[..before.len() - last.len_utf8()];
    match last {
        '.' => preceding_segment(rest) == schema,
        '"' => match rest.chars().last() {
            Some('.') => preceding_segment(&rest[..rest.len() - 1]) == schema,
            Some(c) if is_ident_char(c) => false,
            _ => true,
        },
        c if is_ident_char(c) => false,
        _ => true,
    }
}

/// The identifier immediately before a qualifying `.`, unquoted.
fn preceding_segment(text: &str) -> String {
    if let Some(inner) = text.strip_suffix('"') {
        // Walk back to the opening quote, stepping over doubled quotes.
        let bytes = inner.as_bytes();
        let mut i = bytes.len();
        while i > 0 {
            if bytes[i - 1] == b'"' {
                if i >= 2 && bytes[i - 2] == b'"' {
                    i -= 2;
                    continue;
                }
                return inner[i..].replace("\"\"", "\"");
            }
            i -= 1;
        }
        return inner.replace("\"\"", "\"");
    }
    let start = text
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_ident_char(*c))
        .last()
        .map_or(text.len(), |(i, _)| i);
    text[start..].to_string()
}

/// An object that other objects' DDL may reference.
#[derive(Debug, Clone)]
pub struct Candidate<K> {
    /// Key the candidate is reported under.
    pub key: K,
    /// Schema name.
    pub schema: String,
    /// Object name.
    pub name: String,
    /// Parameter count for routines, `None` for relations.
    pub arity: Option<usize>,
}

impl Candidate<TableKey> {
    /// A table or view candidate.
    pub fn relation(key: &TableKey) -> Self {
        Self {
            key: key.clone(),
            schema: key.schema.clone(),
            name: key.name.clone(),
            arity: None,
        }
    }
}

impl<K> Candidate<K> {
    /// A routine candidate reported under `key`.
    pub fn routine(key: K, routine: &RoutineDescriptor) -> Self {
        Self {
            key,
            schema: routine.schema.clone(),
            name: routine.name.clone(),
            arity: Some(routine.arity()),
        }
    }

    /// Check whether `line` references this candidate.
    pub fn is_referenced_by(&self, line: &str) -> bool {
        line_references(line, &self.schema, &self.name, self.arity)
    }
}

/// Collects the candidates referenced by one object's DDL.
#[derive(Debug)]
pub struct ReferenceScanner<'a, K> {
    candidates: &'a [Candidate<K>],
    own: &'a K,
    found: IndexSet<K>,
}

impl<'a, K> ReferenceScanner<'a, K>
where
    K: Clone + Eq + Hash,
{
    /// Create a scanner for the object keyed `own`, which never references itself.
    pub fn new(candidates: &'a [Candidate<K>], own: &'a K) -> Self {
        Self {
            candidates,
            own,
            found: IndexSet::new(),
        }
    }

    /// Scan one line.
    pub fn scan_line(&mut self, line: &str) {
        for candidate in self.candidates {
            if &candidate.key != self.own
                && !self.found.contains(&candidate.key)
                && candidate.is_referenced_by(line)
            {
                self.found.insert(candidate.key.clone());
            }
        }
    }

    /// The reference set, in discovery order.
    pub fn finish(self) -> IndexSet<K> {
        self.found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_token_match() {
        assert!(line_references("   FROM public.orders o", "public", "orders", None));
        assert!(line_references("   FROM orders;", "public", "orders", None));
        assert!(line_references("FROM public.orders", "public", "orders", None));
    }

    #[test]
    fn test_rejects_substring_collisions() {
        assert!(!line_references("FROM public.customer_orders c", "public", "orders", None));
        assert!(!line_references("FROM public.customer_orders c", "public", "order", None));
        assert!(!line_references("FROM public.orders_archive a", "public", "orders", None));
    }

    #[test]
    fn test_schema_qualifier_must_match() {
        assert!(!line_references("FROM billing.orders o", "public", "orders", None));
        assert!(line_references("FROM billing.orders o", "billing", "orders", None));
        assert!(line_references("FROM \"Sales\".\"Orders\" o", "Sales", "Orders", None));
        assert!(!line_references("FROM \"Sales\".\"Orders\" o", "sales", "Orders", None));
        assert!(line_references("FROM public.\"Orders\" o", "public", "Orders", None));
    }

    #[test]
    fn test_boundary_characters() {
        assert!(line_references("JOIN public.orders\"", "public", "orders", None));
        assert!(!line_references("(SELECT * FROM public.orders)", "public", "orders", None));
    }

    #[test]
    fn test_routine_arity() {
        let line = "    SELECT public.f(a, g(b, c)) + f(1);";
        assert!(line_references(line, "public", "f", Some(2)));
        assert!(line_references(line, "public", "f", Some(1)));
        assert!(!line_references(line, "public", "f", Some(3)));
        assert!(line_references("SELECT now_utc();", "public", "now_utc", Some(0)));
        assert!(!line_references("SELECT f(1,", "public", "f", Some(2)));
    }

    #[test]
    fn test_routine_requires_call() {
        assert!(!line_references("-- uses calc here", "public", "calc", Some(1)));
        assert!(line_references("SELECT public.\"calc\"(x)", "public", "calc", Some(1)));
    }

    #[test]
    fn test_overloads_disambiguated_by_arity() {
        let one = RoutineDescriptor::function("public", "f").param("a", "int");
        let two = RoutineDescriptor::function("public", "f")
            .param("a", "int")
            .param("b", "int");
        let candidates = vec![
            Candidate::routine(one.key(), &one),
            Candidate::routine(two.key(), &two),
        ];
        let caller = RoutineDescriptor::function("public", "caller");
        let own = caller.key();

        let mut scanner = ReferenceScanner::new(&candidates, &own);
        scanner.scan_line("    SELECT f(x, y);");
        let found = scanner.finish();

        assert_eq!(found.len(), 1);
        assert!(found.contains(&two.key()));
    }

    #[test]
    fn test_scanner_skips_own_key() {
        let orders = TableKey::new("public", "orders");
        let totals = TableKey::new("public", "order_totals");
        let candidates = vec![Candidate::relation(&orders), Candidate::relation(&totals)];

        let mut scanner = ReferenceScanner::new(&candidates, &totals);
        scanner.scan_line("CREATE VIEW public.order_totals AS");
        scanner.scan_line("   FROM public.orders o");
        scanner.scan_line("   JOIN public.orders p USING (id);");

        let found = scanner.finish();
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![orders]);
    }
}

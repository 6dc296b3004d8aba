//! Quote-aware text scanning over raw DDL.
//!
//! None of this is a SQL parser. It only knows enough about quoting,
//! dollar-quoted bodies and parentheses to split statements and to find
//! keywords at the top level of a statement.

use crate::error::{DiffError, DiffResult};

/// Check if a byte can be part of an unquoted identifier.
pub(crate) fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

/// Return the dollar-quote tag (`$$` or `$name$`) starting at `text`, if any.
pub(crate) fn dollar_tag(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.first() != Some(&b'$') {
        return None;
    }
    let mut end = 1;
    while end < bytes.len() && bytes[end] != b'$' {
        let b = bytes[end];
        let valid = b.is_ascii_alphabetic() || b == b'_' || (end > 1 && b.is_ascii_digit());
        if !valid {
            return None;
        }
        end += 1;
    }
    if end < bytes.len() {
        Some(&text[..=end])
    } else {
        None
    }
}

/// Parenthesis depth of every byte of `text`, or `None` inside quotes,
/// dollar-quoted bodies and `--` comments.
///
/// An opening parenthesis carries the depth outside it and so does its
/// matching closing parenthesis.
pub(crate) fn depth_map(text: &str) -> Vec<Option<usize>> {
    let bytes = text.as_bytes();
    let mut map = vec![None; bytes.len()];
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == quote {
                        if bytes.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                continue;
            }
            b'$' => match dollar_tag(&text[i..]) {
                Some(tag) => {
                    let body = i + tag.len();
                    i = match text[body..].find(tag) {
                        Some(pos) => body + pos + tag.len(),
                        None => bytes.len(),
                    };
                    continue;
                }
                None => map[i] = Some(depth),
            },
            b'(' => {
                map[i] = Some(depth);
                depth += 1;
            }
            b')' => {
                depth = depth.saturating_sub(1);
                map[i] = Some(depth);
            }
            _ => map[i] = Some(depth),
        }
        i += 1;
    }

    map
}

/// `text` without its `--` comments. Quoted text and dollar-quoted bodies
/// are kept as they are.
pub(crate) fn strip_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() {
                    if bytes[i] == quote {
                        if bytes.get(i + 1) == Some(&quote) {
                            i += 2;
                            continue;
                        }
                        break;
                    }
                    i += 1;
                }
            }
            b'-' if bytes.get(i + 1) == Some(&b'-') => {
                out.push_str(text[start..i].trim_end());
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
                start = i;
                continue;
            }
            b'$' => {
                if let Some(tag) = dollar_tag(&text[i..]) {
                    let body = i + tag.len();
                    i = match text[body..].find(tag) {
                        Some(pos) => body + pos + tag.len(),
                        None => bytes.len(),
                    };
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    out.push_str(&text[start.min(bytes.len())..]);
    out
}

/// Find `keyword` (uppercase, single-spaced) as a whole word at parenthesis
/// depth zero, starting the search at byte `from`.
pub(crate) fn find_keyword(text: &str, keyword: &str, from: usize) -> Option<usize> {
    let map = depth_map(text);
    find_keyword_in(text, &map, keyword, from)
}

/// [`find_keyword`] with a precomputed depth map.
pub(crate) fn find_keyword_in(
    text: &str,
    map: &[Option<usize>],
    keyword: &str,
    from: usize,
) -> Option<usize> {
    if from > text.len() {
        return None;
    }
    let upper = text.to_ascii_uppercase();
    let bytes = upper.as_bytes();
    upper[from..]
        .match_indices(keyword)
        .map(|(pos, _)| pos + from)
        .find(|&pos| {
            let end = pos + keyword.len();
            map[pos] == Some(0)
                && (pos == 0 || !is_ident_byte(bytes[pos - 1]))
                && (end >= bytes.len() || !is_ident_byte(bytes[end]))
        })
}

/// Split `text` at top-level occurrences of `separator`.
pub(crate) fn split_top_level(text: &str, separator: u8) -> Vec<&str> {
    let map = depth_map(text);
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, b) in text.bytes().enumerate() {
        if b == separator && map[i] == Some(0) {
            parts.push(&text[start..i]);
            start = i + 1;
        }
    }
    parts.push(&text[start..]);
    parts
}

/// The first `n` whitespace-separated words, uppercased.
pub(crate) fn leading_words(text: &str, n: usize) -> Vec<String> {
    text.split_whitespace()
        .take(n)
        .map(|word| word.to_ascii_uppercase())
        .collect()
}

/// Read one identifier token, quoted or not, from the start of `text`.
///
/// Returns the token as written and the remaining text.
pub(crate) fn read_identifier(text: &str) -> (&str, &str) {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    if bytes.first() == Some(&b'"') {
        let mut i = 1;
        while i < bytes.len() {
            if bytes[i] == b'"' {
                if bytes.get(i + 1) == Some(&b'"') {
                    i += 2;
                    continue;
                }
                return text.split_at(i + 1);
            }
            i += 1;
        }
        return (text, "");
    }
    let end = text
        .find(|c: char| c.is_whitespace() || c == '(' || c == ',' || c == ';')
        .unwrap_or(text.len());
    text.split_at(end)
}

/// Check if a line belongs to the dump preamble rather than to a statement.
pub(crate) fn is_preamble_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    let upper = trimmed.to_ascii_uppercase();
    trimmed.starts_with("--")
        || trimmed.starts_with('\\')
        || upper.starts_with("SET ")
        || upper.starts_with("SELECT PG_CATALOG.SET_CONFIG")
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
    Dollar(String),
}

/// Groups DDL lines into `;`-terminated statements.
#[derive(Debug)]
pub(crate) struct StatementSplitter {
    strip_preamble: bool,
    quote: Quote,
    buffer: String,
    /// The buffer ends in a `--` comment.
    open_comment: bool,
    statements: Vec<String>,
}

impl StatementSplitter {
    pub(crate) fn new(strip_preamble: bool) -> Self {
        Self {
            strip_preamble,
            quote: Quote::None,
            buffer: String::new(),
            open_comment: false,
            statements: Vec::new(),
        }
    }

    fn at_boundary(&self) -> bool {
        self.buffer.is_empty() && self.quote == Quote::None
    }

    fn append(&mut self, segment: &str) {
        if self.buffer.is_empty() {
            self.buffer.push_str(segment.trim_start());
        } else {
            self.buffer.push('\n');
            self.buffer.push_str(segment);
        }
    }

    fn flush(&mut self) {
        let statement = self.buffer.trim().to_string();
        self.buffer.clear();
        self.open_comment = false;
        if !statement.is_empty() && statement != ";" {
            self.statements.push(statement);
        }
    }

    /// Feed one line.
    pub(crate) fn push_line(&mut self, line: &str) {
        if self.at_boundary()
            && (line.trim().is_empty() || (self.strip_preamble && is_preamble_line(line)))
        {
            return;
        }

        let bytes = line.as_bytes();
        let mut start = 0;
        let mut comment = None;
        let mut i = 0;

        while i < bytes.len() {
            match &self.quote {
                Quote::None => match bytes[i] {
                    b'\'' => self.quote = Quote::Single,
                    b'"' => self.quote = Quote::Double,
                    b'-' if bytes.get(i + 1) == Some(&b'-') => {
                        comment = Some(i);
                        break;
                    }
                    b'$' => {
                        if let Some(tag) = dollar_tag(&line[i..]) {
                            i += tag.len();
                            self.quote = Quote::Dollar(tag.to_string());
                            continue;
                        }
                    }
                    b';' => {
                        let segment = &line[start..=i];
                        self.append(segment);
                        self.flush();
                        start = i + 1;
                    }
                    _ => {}
                },
                Quote::Single if bytes[i] == b'\'' => self.quote = Quote::None,
                Quote::Double if bytes[i] == b'"' => self.quote = Quote::None,
                Quote::Dollar(tag) if line[i..].starts_with(tag.as_str()) => {
                    i += tag.len();
                    self.quote = Quote::None;
                    continue;
                }
                _ => {}
            }
            i += 1;
        }

        // A comment stays with the statement it sits in; one that follows a
        // terminator or stands alone between statements is dropped.
        let rest = match comment {
            Some(at) if self.buffer.is_empty() && line[start..at].trim().is_empty() => "",
            Some(_) => line[start..].trim_end(),
            None => &line[start..],
        };
        if !self.buffer.is_empty() || !rest.trim().is_empty() {
            self.append(rest);
            self.open_comment = comment.is_some();
        }
    }

    /// Finish and return the statements, closing an unterminated trailing one.
    pub(crate) fn finish(mut self, object: &str) -> DiffResult<Vec<String>> {
        match &self.quote {
            Quote::None => {}
            Quote::Dollar(tag) => {
                return Err(DiffError::malformed_ddl(
                    object,
                    format!("unterminated dollar-quoted body {}", tag),
                ));
            }
            _ => {
                return Err(DiffError::malformed_ddl(object, "unterminated quoted text"));
            }
        }
        if !self.buffer.trim().is_empty() {
            if self.open_comment {
                self.buffer.push('\n');
            }
            self.buffer.push(';');
            self.flush();
        }
        Ok(self.statements)
    }
}

/// Split raw DDL lines into statements.
pub(crate) fn split_statements(
    object: &str,
    lines: &[String],
    strip_preamble: bool,
) -> DiffResult<Vec<String>> {
    let mut splitter = StatementSplitter::new(strip_preamble);
    for line in lines {
        splitter.push_line(line);
    }
    splitter.finish(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn test_dollar_tag() {
        assert_eq!(dollar_tag("$$ select"), Some("$$"));
        assert_eq!(dollar_tag("$body$ select"), Some("$body$"));
        assert_eq!(dollar_tag("$1, $2"), None);
        assert_eq!(dollar_tag("$"), None);
    }

    #[test]
    fn test_depth_map_ignores_quoted_parens() {
        let text = "a ('(' , b)";
        let map = depth_map(text);
        assert_eq!(map[2], Some(0));
        assert_eq!(map[4], None);
        assert_eq!(map[10], Some(0));
    }

    #[test]
    fn test_find_keyword_top_level_whole_word() {
        let text = "numeric(10,2) DEFAULT 'NOT NULL' NOT NULL";
        let pos = find_keyword(text, "NOT NULL", 0).unwrap();
        assert_eq!(&text[pos..], "NOT NULL");
        assert!(find_keyword("nullable integer", "NULL", 0).is_none());
        assert!(find_keyword("check (x is not null)", "NOT NULL", 0).is_none());
    }

    #[test]
    fn test_split_top_level() {
        let parts = split_top_level("id integer, total numeric(10,2), note text", b',');
        assert_eq!(parts, vec!["id integer", " total numeric(10,2)", " note text"]);
    }

    #[test]
    fn test_read_identifier() {
        assert_eq!(read_identifier("  orders_pkey PRIMARY KEY"), ("orders_pkey", " PRIMARY KEY"));
        assert_eq!(read_identifier("\"a \"\"b\" rest"), ("\"a \"\"b\"", " rest"));
    }

    #[test]
    fn test_split_statements_strips_preamble() {
        let ddl = lines(
            "--\n-- PostgreSQL database dump\n--\n\nSET statement_timeout = 0;\n\
             SELECT pg_catalog.set_config('search_path', '', false);\n\\restrict abc\n\n\
             CREATE TABLE public.orders (\n    id integer\n);\n\n\
             -- Name: orders; Type: ACL\nGRANT SELECT ON TABLE public.orders TO reporting;\n",
        );
        let statements = split_statements("public.orders", &ddl, true).unwrap();
        assert_eq!(
            statements,
            vec![
                "CREATE TABLE public.orders (\n    id integer\n);".to_string(),
                "GRANT SELECT ON TABLE public.orders TO reporting;".to_string(),
            ]
        );
    }

    #[test]
    fn test_split_statements_respects_dollar_quotes() {
        let ddl = lines(
            "CREATE FUNCTION public.f() RETURNS integer\n    LANGUAGE plpgsql\n    AS $fn$\n\
             BEGIN\n    -- comment; still body\n    RETURN 1;\nEND;\n$fn$;",
        );
        let statements = split_statements("public.f()", &ddl, true).unwrap();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("RETURN 1;"));
        assert!(statements[0].ends_with("$fn$;"));
    }

    #[test]
    fn test_split_statements_drops_trailing_comment() {
        let ddl = lines(
            "GRANT SELECT ON TABLE public.t TO app; -- read only\nCOMMENT ON TABLE public.t IS 'x';",
        );
        let statements = split_statements("public.t", &ddl, true).unwrap();
        assert_eq!(
            statements,
            vec![
                "GRANT SELECT ON TABLE public.t TO app;".to_string(),
                "COMMENT ON TABLE public.t IS 'x';".to_string(),
            ]
        );
    }

    #[test]
    fn test_strip_comments() {
        assert_eq!(
            strip_comments("CHECK (a > 0) -- positive\n;"),
            "CHECK (a > 0)\n;"
        );
        assert_eq!(strip_comments("CHECK (b <> '--') -- x"), "CHECK (b <> '--')");
        assert_eq!(strip_comments("AS $$ -- kept $$"), "AS $$ -- kept $$");
    }

    #[test]
    fn test_split_statements_keeps_inline_comment() {
        let ddl = lines("CREATE VIEW public.a AS\n SELECT 1 AS one -- built on public.b\n;");
        let statements = split_statements("public.a", &ddl, true).unwrap();
        assert_eq!(
            statements,
            vec!["CREATE VIEW public.a AS\n SELECT 1 AS one -- built on public.b\n;".to_string()]
        );

        let ddl = lines("CREATE VIEW public.a AS\n SELECT 1 -- note; not a terminator");
        let statements = split_statements("public.a", &ddl, true).unwrap();
        assert_eq!(
            statements,
            vec!["CREATE VIEW public.a AS\n SELECT 1 -- note; not a terminator\n;".to_string()]
        );
    }

    #[test]
    fn test_split_statements_terminates_trailing_statement() {
        let ddl = lines("CREATE VIEW public.v AS\n SELECT 1");
        let statements = split_statements("public.v", &ddl, true).unwrap();
        assert_eq!(statements, vec!["CREATE VIEW public.v AS\n SELECT 1;".to_string()]);
    }

    #[test]
    fn test_split_statements_multiple_per_line() {
        let ddl = lines("GRANT ALL ON TABLE t TO a; GRANT SELECT ON TABLE t TO b;");
        let statements = split_statements("t", &ddl, true).unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1], "GRANT SELECT ON TABLE t TO b;");
    }

    #[test]
    fn test_split_statements_rejects_unterminated_body() {
        let ddl = lines("CREATE FUNCTION f() AS $$ SELECT 1;");
        let err = split_statements("public.f()", &ddl, true).unwrap_err();
        assert!(matches!(err, DiffError::MalformedDdl { .. }));
    }
}

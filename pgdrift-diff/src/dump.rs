//! Canonical structured form of one object's DDL.
//!
//! A [`DumpRepresentation`] splits dumped DDL into *create* statements (the
//! base `CREATE TABLE`, `CREATE VIEW`, `CREATE FUNCTION`, ...) and *append*
//! statements issued after it (constraints, indexes, grants, comments).
//! Table constraints written inline in `CREATE TABLE` are lifted into
//! `ALTER TABLE ONLY ... ADD CONSTRAINT` append statements so that columns
//! and constraints can be compared independently.
//!
//! ```rust
//! use pgdrift_diff::config::DumpOptions;
//! use pgdrift_diff::dump::DumpBuilder;
//! use pgdrift_diff::key::ObjectKind;
//!
//! let ddl = vec![
//!     "CREATE TABLE public.orders (".to_string(),
//!     "    id integer NOT NULL,".to_string(),
//!     "    CONSTRAINT orders_id_check CHECK ((id > 0))".to_string(),
//!     ");".to_string(),
//! ];
//! let options = DumpOptions::default();
//! let rep = DumpBuilder::new(ObjectKind::Table, &options)
//!     .build("public.orders", &ddl)
//!     .unwrap();
//!
//! assert_eq!(rep.columns.len(), 1);
//! assert_eq!(rep.constraints["orders_id_check"], "CHECK ((id > 0))");
//! ```

use indexmap::IndexMap;

use crate::config::DumpOptions;
use crate::error::{DiffError, DiffResult};
use crate::key::ObjectKind;
use crate::lexer::{
    depth_map, find_keyword, find_keyword_in, leading_words, read_identifier, split_statements,
    split_top_level, strip_comments,
};

/// A column as declared in `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name as written (quoted when the dump quoted it).
    pub name: String,
    /// Declared type, including any modifiers.
    pub data_type: String,
    /// Default expression.
    pub default: Option<String>,
    /// Whether the column carries `NOT NULL`.
    pub not_null: bool,
    /// The full column element.
    pub raw: String,
}

/// Classification of an append statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppendKind {
    /// `GRANT` or `REVOKE`.
    Grant,
    /// `COMMENT ON`.
    Comment,
    /// Anything mentioning `PRIMARY KEY` or `UNIQUE`.
    Unique,
    /// `CREATE INDEX`.
    Index,
    /// Everything else: foreign keys, checks, defaults, triggers.
    Other,
}

impl AppendKind {
    /// Classify a statement.
    pub fn of(statement: &str) -> Self {
        let words = leading_words(statement, 3);
        let word = |i: usize| words.get(i).map(String::as_str).unwrap_or("");

        match word(0) {
            "GRANT" | "REVOKE" => return Self::Grant,
            "COMMENT" if word(1) == "ON" => return Self::Comment,
            _ => {}
        }

        let upper = statement.to_ascii_uppercase();
        if upper.contains("PRIMARY KEY") || upper.contains("UNIQUE") {
            Self::Unique
        } else if word(0) == "CREATE" && word(1) == "INDEX" {
            Self::Index
        } else {
            Self::Other
        }
    }
}

/// Canonical form of one object's DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRepresentation {
    /// Kind of the object.
    pub kind: ObjectKind,
    /// Base creation statements.
    pub create: Vec<String>,
    /// Statements issued after the base creation.
    pub append: Vec<String>,
    /// Table columns by name (empty for views and routines).
    pub columns: IndexMap<String, ColumnDef>,
    /// Constraints by name, read from `ADD CONSTRAINT` statements.
    pub constraints: IndexMap<String, String>,
}

impl DumpRepresentation {
    /// Parse with default builder settings.
    pub fn parse(
        kind: ObjectKind,
        object: &str,
        lines: &[String],
        options: &DumpOptions,
    ) -> DiffResult<Self> {
        DumpBuilder::new(kind, options).build(object, lines)
    }

    /// All statements, create first.
    pub fn statements(&self) -> impl Iterator<Item = &String> {
        self.create.iter().chain(self.append.iter())
    }

    /// Full text, one statement per line group.
    pub fn text(&self) -> String {
        self.statements()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Append statements of one kind.
    pub fn append_of(&self, kind: AppendKind) -> impl Iterator<Item = &String> {
        self.append
            .iter()
            .filter(move |statement| AppendKind::of(statement) == kind)
    }

    /// `CREATE [UNIQUE] INDEX` statements.
    pub fn indexes(&self) -> impl Iterator<Item = &String> {
        self.append
            .iter()
            .filter(|statement| index_name(statement).is_some())
    }

    /// Constraints to drop and add to turn `target` into `self`.
    pub fn constraint_delta(&self, target: &DumpRepresentation) -> ConstraintDelta {
        let missing = |from: &IndexMap<String, String>, other: &IndexMap<String, String>| {
            from.iter()
                .filter(|(name, def)| other.get(*name) != Some(*def))
                .map(|(name, def)| (name.clone(), def.clone()))
                .collect::<IndexMap<_, _>>()
        };
        ConstraintDelta {
            drop: missing(&target.constraints, &self.constraints),
            add: missing(&self.constraints, &target.constraints),
        }
    }

    /// Column alterations to turn `target` into `self`.
    pub fn field_delta(&self, target: &DumpRepresentation) -> FieldDelta {
        let mut clauses = IndexMap::new();

        for (name, column) in &self.columns {
            match target.columns.get(name) {
                None => {
                    clauses.insert(name.clone(), format!("ADD COLUMN {}", column.raw));
                }
                Some(existing) => {
                    let changes = column_changes(column, existing);
                    if !changes.is_empty() {
                        clauses.insert(name.clone(), changes.join(", "));
                    }
                }
            }
        }
        for name in target.columns.keys() {
            if !self.columns.contains_key(name) {
                clauses.insert(name.clone(), format!("DROP COLUMN {}", name));
            }
        }

        FieldDelta { clauses }
    }
}

fn column_changes(source: &ColumnDef, target: &ColumnDef) -> Vec<String> {
    let name = &source.name;
    let mut changes = Vec::new();
    if source.data_type != target.data_type {
        changes.push(format!("ALTER COLUMN {} TYPE {}", name, source.data_type));
    }
    if source.default != target.default {
        changes.push(match &source.default {
            Some(default) => format!("ALTER COLUMN {} SET DEFAULT {}", name, default),
            None => format!("ALTER COLUMN {} DROP DEFAULT", name),
        });
    }
    if source.not_null != target.not_null {
        let action = if source.not_null { "SET" } else { "DROP" };
        changes.push(format!("ALTER COLUMN {} {} NOT NULL", name, action));
    }
    changes
}

/// Constraints dropped from and added to one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConstraintDelta {
    /// Target-only constraints, by name.
    pub drop: IndexMap<String, String>,
    /// Source-only constraints, by name.
    pub add: IndexMap<String, String>,
}

impl ConstraintDelta {
    /// Check if there is nothing to change.
    pub fn is_empty(&self) -> bool {
        self.drop.is_empty() && self.add.is_empty()
    }

    /// Added constraints ordered primary key, unique, check/exclude, foreign key.
    pub fn ordered_adds(&self) -> Vec<(&String, &String)> {
        let mut adds: Vec<_> = self.add.iter().collect();
        adds.sort_by_key(|(_, def)| constraint_rank(def));
        adds
    }
}

/// Sort rank of a constraint definition.
pub fn constraint_rank(definition: &str) -> u8 {
    match leading_words(definition, 1).first().map(String::as_str) {
        Some("PRIMARY") => 0,
        Some("UNIQUE") => 1,
        Some("FOREIGN") => 3,
        _ => 2,
    }
}

/// Column-level `ALTER TABLE` clauses for one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldDelta {
    /// Clause text by column name.
    pub clauses: IndexMap<String, String>,
}

impl FieldDelta {
    /// Check if no column changed.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

/// Builds a [`DumpRepresentation`] from raw DDL lines.
pub struct DumpBuilder<'a> {
    kind: ObjectKind,
    options: &'a DumpOptions,
    force_or_replace: bool,
    strip_preamble: bool,
    on_line: Option<&'a mut dyn FnMut(&str)>,
}

impl<'a> DumpBuilder<'a> {
    /// Create a builder. The preamble is stripped by default.
    pub fn new(kind: ObjectKind, options: &'a DumpOptions) -> Self {
        Self {
            kind,
            options,
            force_or_replace: false,
            strip_preamble: true,
            on_line: None,
        }
    }

    /// Rewrite `CREATE VIEW|FUNCTION|PROCEDURE` as `CREATE OR REPLACE ...`.
    pub fn force_or_replace(mut self, force: bool) -> Self {
        self.force_or_replace = force;
        self
    }

    /// Drop comment, `SET` and meta-command lines between statements.
    pub fn strip_preamble(mut self, strip: bool) -> Self {
        self.strip_preamble = strip;
        self
    }

    /// Observe every kept line. The callback cannot alter the result.
    pub fn on_line(mut self, callback: &'a mut dyn FnMut(&str)) -> Self {
        self.on_line = Some(callback);
        self
    }

    /// Build the representation of `object` from its DDL lines.
    pub fn build(self, object: &str, lines: &[String]) -> DiffResult<DumpRepresentation> {
        let statements = split_statements(object, lines, self.strip_preamble)?;

        let mut rep = DumpRepresentation {
            kind: self.kind,
            create: Vec::new(),
            append: Vec::new(),
            columns: IndexMap::new(),
            constraints: IndexMap::new(),
        };
        let mut lifted = Vec::new();

        for statement in statements {
            if !self.keeps(&statement) {
                continue;
            }
            match create_target(&statement) {
                Some(CreateTarget::Table) => {
                    let table = lift_table(object, &statement)?;
                    rep.create.push(table.statement);
                    rep.columns.extend(table.columns);
                    lifted.extend(table.constraints);
                }
                Some(target) => {
                    let statement = if self.force_or_replace && target.replaceable() {
                        or_replace(&statement)
                    } else {
                        statement
                    };
                    rep.create.push(statement);
                }
                None => rep.append.push(statement),
            }
        }

        if rep.create.is_empty() {
            return Err(DiffError::malformed_ddl(object, "no CREATE statement found"));
        }

        lifted.append(&mut rep.append);
        rep.append = lifted;
        for statement in &rep.append {
            if let Some((name, definition)) = parse_add_constraint(statement) {
                rep.constraints.insert(name, definition);
            }
        }

        if let Some(callback) = self.on_line {
            for line in rep.statements().flat_map(|statement| statement.lines()) {
                callback(line);
            }
        }

        Ok(rep)
    }

    fn keeps(&self, statement: &str) -> bool {
        match AppendKind::of(statement) {
            AppendKind::Grant => return self.options.include_privileges,
            AppendKind::Comment => return self.options.include_comments,
            _ => {}
        }
        let is_owner = leading_words(statement, 1).first().map(String::as_str) == Some("ALTER")
            && find_keyword(statement, "OWNER TO", 0).is_some();
        !is_owner || self.options.include_owner
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CreateTarget {
    Table,
    View,
    MaterializedView,
    Routine,
    Replaced,
}

impl CreateTarget {
    fn replaceable(self) -> bool {
        matches!(self, Self::View | Self::Routine)
    }
}

fn create_target(statement: &str) -> Option<CreateTarget> {
    let words = leading_words(statement, 5);
    let mut words = words.iter().map(String::as_str);
    if words.next() != Some("CREATE") {
        return None;
    }
    let mut replaced = false;
    let mut materialized = false;
    for word in words {
        match word {
            "OR" | "UNLOGGED" | "TEMP" | "TEMPORARY" | "RECURSIVE" => {}
            "REPLACE" => replaced = true,
            "MATERIALIZED" => materialized = true,
            "TABLE" => return Some(CreateTarget::Table),
            "VIEW" if materialized => return Some(CreateTarget::MaterializedView),
            "VIEW" | "FUNCTION" | "PROCEDURE" if replaced => return Some(CreateTarget::Replaced),
            "VIEW" => return Some(CreateTarget::View),
            "FUNCTION" | "PROCEDURE" => return Some(CreateTarget::Routine),
            _ => return None,
        }
    }
    None
}

fn or_replace(statement: &str) -> String {
    let trimmed = statement.trim_start();
    format!("CREATE OR REPLACE{}", &trimmed["CREATE".len()..])
}

struct LiftedTable {
    statement: String,
    columns: IndexMap<String, ColumnDef>,
    constraints: Vec<String>,
}

fn lift_table(object: &str, statement: &str) -> DiffResult<LiftedTable> {
    let statement = strip_comments(statement);
    let statement = statement.as_str();
    let map = depth_map(statement);
    let open = statement
        .bytes()
        .enumerate()
        .position(|(i, b)| b == b'(' && map[i] == Some(0));

    // `PARTITION OF parent FOR VALUES (...)` has no column list of its own.
    let partition_child = find_keyword_in(statement, &map, "PARTITION OF", 0)
        .is_some_and(|partition| open.is_none_or(|open| partition < open));
    if partition_child {
        return Ok(LiftedTable {
            statement: statement.to_string(),
            columns: IndexMap::new(),
            constraints: Vec::new(),
        });
    }

    let open = open.ok_or_else(|| DiffError::malformed_ddl(object, "missing column list"))?;
    let close = statement
        .bytes()
        .enumerate()
        .skip(open + 1)
        .position(|(i, b)| b == b')' && map[i] == Some(0))
        .map(|pos| pos + open + 1)
        .ok_or_else(|| DiffError::malformed_ddl(object, "unbalanced column list"))?;

    let header = statement[..open].trim_end();
    let table = table_name(header)
        .ok_or_else(|| DiffError::malformed_ddl(object, "missing table name"))?;
    let tail = &statement[close..];

    let mut kept = Vec::new();
    let mut columns = IndexMap::new();
    let mut constraints = Vec::new();

    for element in split_top_level(&statement[open + 1..close], b',') {
        let element = element.trim();
        if element.is_empty() {
            continue;
        }
        if leading_words(element, 1).first().map(String::as_str) == Some("CONSTRAINT") {
            let (name, definition) = read_identifier(&element["CONSTRAINT".len()..]);
            constraints.push(format!(
                "ALTER TABLE ONLY {}\n    ADD CONSTRAINT {} {};",
                table,
                name,
                definition.trim()
            ));
            continue;
        }
        let column = parse_column(element);
        columns.insert(column.name.clone(), column);
        kept.push(element);
    }

    let statement = if kept.is_empty() {
        format!("{} (\n{}", header, tail)
    } else {
        format!("{} (\n    {}\n{}", header, kept.join(",\n    "), tail)
    };

    Ok(LiftedTable {
        statement,
        columns,
        constraints,
    })
}

fn table_name(header: &str) -> Option<&str> {
    let pos = find_keyword(header, "TABLE", 0)?;
    let mut rest = header[pos + "TABLE".len()..].trim_start();
    if rest.to_ascii_uppercase().starts_with("IF NOT EXISTS") {
        rest = rest["IF NOT EXISTS".len()..].trim_start();
    }
    let rest = rest.trim_end();
    (!rest.is_empty()).then_some(rest)
}

const TYPE_TERMINATORS: &[&str] = &[
    "COLLATE",
    "DEFAULT",
    "NOT NULL",
    "NULL",
    "GENERATED",
    "CONSTRAINT",
    "CHECK",
    "REFERENCES",
    "PRIMARY KEY",
    "UNIQUE",
];

fn first_keyword(text: &str, keywords: &[&str], from: usize) -> Option<usize> {
    let map = depth_map(text);
    keywords
        .iter()
        .filter_map(|keyword| find_keyword_in(text, &map, keyword, from))
        .min()
}

fn parse_column(element: &str) -> ColumnDef {
    let (name, rest) = read_identifier(element);
    let rest = rest.trim();

    let type_end = first_keyword(rest, TYPE_TERMINATORS, 0).unwrap_or(rest.len());
    let data_type = rest[..type_end].trim().to_string();

    let default = find_keyword(rest, "DEFAULT", 0).map(|pos| {
        let start = pos + "DEFAULT".len();
        let expression = start + (rest[start..].len() - rest[start..].trim_start().len());
        // The expression's first token never terminates it, so `DEFAULT NULL` keeps its NULL.
        let end = first_keyword(rest, TYPE_TERMINATORS, expression + 1).unwrap_or(rest.len());
        rest[start..end].trim().to_string()
    });

    ColumnDef {
        name: name.to_string(),
        data_type,
        default,
        not_null: find_keyword(rest, "NOT NULL", 0).is_some(),
        raw: element.to_string(),
    }
}

/// Read `(name, definition)` from an `ADD CONSTRAINT` statement.
pub fn parse_add_constraint(statement: &str) -> Option<(String, String)> {
    let pos = find_keyword(statement, "ADD CONSTRAINT", 0)?;
    let (name, definition) = read_identifier(&statement[pos + "ADD CONSTRAINT".len()..]);
    let definition = strip_comments(definition);
    let definition = definition.trim().trim_end_matches(';').trim_end();
    if name.is_empty() || definition.is_empty() {
        return None;
    }
    Some((name.to_string(), definition.to_string()))
}

/// Name of the index created by a `CREATE [UNIQUE] INDEX` statement.
pub fn index_name(statement: &str) -> Option<String> {
    let words: Vec<&str> = statement.split_whitespace().take(8).collect();
    let upper: Vec<String> = words.iter().map(|w| w.to_ascii_uppercase()).collect();
    if upper.first().map(String::as_str) != Some("CREATE") {
        return None;
    }
    let mut i = 1;
    if upper.get(i).map(String::as_str) == Some("UNIQUE") {
        i += 1;
    }
    if upper.get(i).map(String::as_str) != Some("INDEX") {
        return None;
    }
    i += 1;
    if upper.get(i).map(String::as_str) == Some("CONCURRENTLY") {
        i += 1;
    }
    if upper.get(i).map(String::as_str) == Some("IF") {
        i += 3;
    }
    match upper.get(i).map(String::as_str) {
        None | Some("ON") => None,
        Some(_) => words.get(i).map(|name| name.to_string()),
    }
}

/// Object named by a `COMMENT ON ... IS ...` statement.
pub fn comment_target(statement: &str) -> Option<&str> {
    let start = find_keyword(statement, "ON", 0)? + "ON".len();
    let end = find_keyword(statement, "IS", start)?;
    Some(statement[start..end].trim())
}

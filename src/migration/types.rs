// ABOUTME: SQLite declared type to PostgreSQL type translation
// ABOUTME: Ordered substring rules, first match wins, TEXT fallback

/// What a matching rule produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// A fixed type name; any length or precision modifier is dropped
    Plain(&'static str),
    /// The type name followed by the declared modifier, e.g. `(10,2)`
    WithModifier(&'static str),
}

struct TypeRule {
    pattern: &'static str,
    target: Target,
}

/// Translation rules evaluated in order against the uppercased declared type
///
/// Order matters: `VARCHAR` before `CHAR`, the sized integer types before
/// `INT`, `DOUB` before `REAL`-ish matches, and `DATETIME` before `DATE`
/// and `TIME`.
#[rustfmt::skip]
const TYPE_RULES: &[TypeRule] = &[
    TypeRule { pattern: "VARCHAR", target: Target::WithModifier("VARCHAR") },
    TypeRule { pattern: "CHAR", target: Target::Plain("TEXT") },
    TypeRule { pattern: "CLOB", target: Target::Plain("TEXT") },
    TypeRule { pattern: "BIGINT", target: Target::Plain("BIGINT") },
    TypeRule { pattern: "SMALLINT", target: Target::Plain("SMALLINT") },
    TypeRule { pattern: "INT", target: Target::Plain("INTEGER") },
    TypeRule { pattern: "BOOL", target: Target::Plain("BOOLEAN") },
    TypeRule { pattern: "TEXT", target: Target::Plain("TEXT") },
    TypeRule { pattern: "BLOB", target: Target::Plain("BYTEA") },
    TypeRule { pattern: "DOUB", target: Target::Plain("DOUBLE PRECISION") },
    TypeRule { pattern: "REAL", target: Target::Plain("REAL") },
    TypeRule { pattern: "FLOA", target: Target::Plain("REAL") },
    TypeRule { pattern: "DECIMAL", target: Target::WithModifier("NUMERIC") },
    TypeRule { pattern: "NUMERIC", target: Target::WithModifier("NUMERIC") },
    TypeRule { pattern: "DATETIME", target: Target::Plain("TIMESTAMP") },
    TypeRule { pattern: "TIMESTAMP", target: Target::Plain("TIMESTAMP") },
    TypeRule { pattern: "DATE", target: Target::Plain("DATE") },
    TypeRule { pattern: "TIME", target: Target::Plain("TIME") },
];

pub const FALLBACK_TYPE: &str = "TEXT";

/// Type used for the column that aliases SQLite's rowid
pub const ROWID_ALIAS_TYPE: &str = "SERIAL";

/// Translate a declared SQLite type into a PostgreSQL column type
///
/// ```
/// # use sqlite_neon_migrator::migration::types::translate_type;
/// assert_eq!(translate_type("varchar(150)"), "VARCHAR(150)");
/// assert_eq!(translate_type("CHAR(10)"), "TEXT");
/// assert_eq!(translate_type("decimal(10, 2)"), "NUMERIC(10,2)");
/// assert_eq!(translate_type("something odd"), "TEXT");
/// ```
pub fn translate_type(declared: &str) -> String {
    let upper = declared.trim().to_uppercase();

    TYPE_RULES
        .iter()
        .find(|rule| upper.contains(rule.pattern))
        .map(|rule| match rule.target {
            Target::Plain(name) => name.to_string(),
            Target::WithModifier(name) => match modifier(&upper) {
                Some(m) => format!("{}{}", name, m),
                None => name.to_string(),
            },
        })
        .unwrap_or_else(|| FALLBACK_TYPE.to_string())
}

/// The parenthesized modifier of a declared type, normalized to `(a,b)`
fn modifier(declared: &str) -> Option<String> {
    let open = declared.find('(')?;
    let close = declared[open..].find(')')? + open;
    let args: Vec<&str> = declared[open + 1..close]
        .split(',')
        .map(str::trim)
        .collect();

    let numeric = |a: &&str| !a.is_empty() && a.chars().all(|c| c.is_ascii_digit());
    if !args.iter().all(numeric) {
        return None;
    }

    Some(format!("({})", args.join(",")))
}

/// Strip modifiers from a PostgreSQL type: `VARCHAR(255)` becomes `VARCHAR`
pub fn base_type(pg_type: &str) -> &str {
    match pg_type.find('(') {
        Some(idx) => pg_type[..idx].trim_end(),
        None => pg_type,
    }
}

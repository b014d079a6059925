//! Quoting for DDL/DCL statements, which cannot take bind parameters for
//! identifiers and, on several engines, not for passwords either.

/// `"name"` with embedded double quotes doubled.
pub fn pg_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `'value'` for a server running with `standard_conforming_strings = on`.
pub fn pg_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `` `name` `` with embedded backticks doubled.
pub fn mysql_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// `'value'` escaped for MySQL's default `sql_mode`, where backslash is an
/// escape character inside string literals.
pub fn mysql_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("''"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// `'user'@'host'` account name.
pub fn mysql_account(user: &str, host: &str) -> String {
    format!("{}@{}", mysql_literal(user), mysql_literal(host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postgres_quoting() {
        assert_eq!(pg_ident("db_bob"), "\"db_bob\"");
        assert_eq!(pg_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(pg_literal("it's"), "'it''s'");
        assert_eq!(pg_literal(r"a\b"), r"'a\b'");
    }

    #[test]
    fn mysql_quoting() {
        assert_eq!(mysql_ident("db_bob"), "`db_bob`");
        assert_eq!(mysql_ident("a`b"), "`a``b`");
        assert_eq!(mysql_literal("it's"), "'it''s'");
        assert_eq!(mysql_literal(r"a\b"), r"'a\\b'");
        assert_eq!(mysql_account("bob", "%"), "'bob'@'%'");
    }
}

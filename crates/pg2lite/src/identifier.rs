//! Identifier quoting shared by the PostgreSQL reader and the SQLite writer.
//!
//! Identifiers cannot be bound as statement parameters, so table and column
//! names are spliced into SQL text. Both databases use ANSI double quotes and
//! escape an embedded quote by doubling it.

/// Quote an identifier with double quotes, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote and comma-join a list of identifiers.
pub fn quote_list<S: AsRef<str>>(names: &[S]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident("Order Items"), "\"Order Items\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_quote_list() {
        assert_eq!(quote_list(&["id", "name"]), "\"id\", \"name\"");
        assert_eq!(quote_list::<&str>(&[]), "");
    }
}

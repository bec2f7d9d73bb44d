/// Build the SELECT for a database source
///
/// Several tables are chained with ` JOIN ` followed by a single
/// `ON <join_condition>`; the condition is used verbatim. `limit` is only
/// set for previews.
pub fn build_select(
    tables: &[String],
    columns: &[String],
    join_condition: Option<&str>,
    limit: Option<usize>,
) -> String {
    let mut query = format!("SELECT {} FROM {}", columns.join(", "), tables.join(" JOIN "));

    if tables.len() > 1 {
        query.push_str(" ON ");
        query.push_str(join_condition.unwrap_or_default());
    }

    if let Some(limit) = limit {
        query.push_str(&format!(" LIMIT {}", limit));
    }

    query
}

/// Quote an identifier for use in an INSERT column list
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_select() {
        let test_cases = [
            (
                strings(&["a", "b"]),
                strings(&["a.id", "b.name"]),
                Some("a.id = b.ref"),
                None,
                "SELECT a.id, b.name FROM a JOIN b ON a.id = b.ref",
                "two table join",
            ),
            (
                strings(&["events"]),
                strings(&["id", "ts"]),
                None,
                None,
                "SELECT id, ts FROM events",
                "single table",
            ),
            (
                strings(&["events"]),
                strings(&["id"]),
                Some("ignored = 1"),
                Some(100),
                "SELECT id FROM events LIMIT 100",
                "condition ignored for one table",
            ),
            (
                strings(&["a", "b", "c"]),
                strings(&["a.id"]),
                Some("a.id = b.id AND b.id = c.id"),
                Some(100),
                "SELECT a.id FROM a JOIN b JOIN c ON a.id = b.id AND b.id = c.id LIMIT 100",
                "three tables share one condition",
            ),
        ];

        for (tables, columns, condition, limit, expected, description) in test_cases {
            assert_eq!(
                build_select(&tables, &columns, condition, limit),
                expected,
                "{}",
                description
            );
        }
    }

    #[test]
    fn test_preview_select_appends_limit() {
        let query = build_select(&strings(&["t"]), &strings(&["x"]), None, Some(100));
        assert_eq!(query, "SELECT x FROM t LIMIT 100");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("id"), "`id`");
        assert_eq!(quote_identifier("odd`name"), "`odd\\`name`");
    }
}

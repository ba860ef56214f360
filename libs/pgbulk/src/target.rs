use crate::compiler::TARGET_PLACEHOLDER;
use crate::error::BulkError;

/// Validated destination name. Qualified names (`schema.table`) address a
/// permanent table; bare names address a session-scoped temporary table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetName {
    raw: String,
    schema: Option<String>,
}

impl TargetName {
    /// Validate a runtime-supplied destination name.
    ///
    /// The name is interpolated into SQL text, so anything beyond ASCII
    /// alphanumerics and a single qualifying `.` is rejected outright,
    /// before any statement is issued.
    pub fn parse(raw: &str) -> Result<TargetName, BulkError> {
        let invalid = || BulkError::InvalidTarget(raw.to_string());

        let mut parts = raw.split('.');
        let (first, second) = (parts.next(), parts.next());
        if parts.next().is_some() {
            return Err(invalid());
        }

        let valid_ident =
            |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric());

        match (first, second) {
            (Some(name), None) if valid_ident(name) => Ok(TargetName {
                raw: name.to_string(),
                schema: None,
            }),
            (Some(schema), Some(name)) if valid_ident(schema) && valid_ident(name) => {
                Ok(TargetName {
                    raw: name.to_string(),
                    schema: Some(schema.to_string()),
                })
            }
            _ => Err(invalid()),
        }
    }

    pub fn is_qualified(&self) -> bool {
        self.schema.is_some()
    }

    /// Quoted name for COPY statements.
    fn quoted(&self) -> String {
        match &self.schema {
            Some(schema) => format!("\"{}\".\"{}\"", schema, self.raw),
            None => format!("\"{}\"", self.raw),
        }
    }

    /// `TABLE IF NOT EXISTS ..` / `TEMP TABLE IF NOT EXISTS ..` for DDL.
    fn table_clause(&self) -> String {
        match &self.schema {
            Some(_) => format!("TABLE IF NOT EXISTS {}", self.quoted()),
            None => format!("TEMP TABLE IF NOT EXISTS {}", self.quoted()),
        }
    }

    /// Materialize the cached templates into concrete statements.
    pub fn materialize(&self, ddl_template: &str, copy_template: &str) -> (String, String) {
        let create = ddl_template.replace(TARGET_PLACEHOLDER, &self.table_clause());
        let copy = copy_template.replace(TARGET_PLACEHOLDER, &self.quoted());
        (create, copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_is_temp_table() {
        let t = TargetName::parse("staging").unwrap();
        assert!(!t.is_qualified());
        let (create, copy) = t.materialize("CREATE {target} (x)", "COPY {target} (x)");
        assert_eq!(create, "CREATE TEMP TABLE IF NOT EXISTS \"staging\" (x)");
        assert_eq!(copy, "COPY \"staging\" (x)");
    }

    #[test]
    fn qualified_name_is_permanent_table() {
        let t = TargetName::parse("ingest.quotes").unwrap();
        assert!(t.is_qualified());
        let (create, copy) = t.materialize("CREATE {target} (x)", "COPY {target} (x)");
        assert_eq!(
            create,
            "CREATE TABLE IF NOT EXISTS \"ingest\".\"quotes\" (x)"
        );
        assert_eq!(copy, "COPY \"ingest\".\"quotes\" (x)");
    }

    #[test]
    fn rejects_injection_characters() {
        for raw in [
            "",
            "a;drop",
            "a b",
            "a\"b",
            "a.b.c",
            ".a",
            "a.",
            "таблица",
            "a-b",
        ] {
            assert!(
                matches!(TargetName::parse(raw), Err(BulkError::InvalidTarget(_))),
                "accepted {raw:?}"
            );
        }
    }

    #[test]
    fn accepts_plain_alphanumerics() {
        assert!(TargetName::parse("t1").is_ok());
        assert!(TargetName::parse("s2.t1").is_ok());
    }
}

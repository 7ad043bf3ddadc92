use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;

/// Parsed `index.yaml` of a chart repository
///
/// Only the `entries` table is read; `apiVersion`, `generated` and any other
/// top-level keys are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexDocument {
    #[serde(default)]
    pub entries: HashMap<String, Vec<ChartVersion>>,
}

/// One published version of a chart, in the order the index lists it
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ChartVersion {
    #[serde(default, deserialize_with = "string_or_number")]
    pub version: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

impl IndexDocument {
    pub fn parse(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    /// Version records for `name`, in listed order
    pub fn versions(&self, name: &str) -> Option<&[ChartVersion]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn chart_count(&self) -> usize {
        self.entries.len()
    }
}

/// Accepts `1.0`, `2` and `"1.0.0"` alike; YAML turns unquoted `1.0` into a float.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct VersionVisitor;

    impl serde::de::Visitor<'_> for VersionVisitor {
        type Value = String;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a version as string (e.g., \"1.2.3\") or number")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(v.trim().to_string())
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(v.to_string())
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(v.to_string())
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            // Debug keeps the trailing `.0` that Display drops
            Ok(format!("{v:?}"))
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(String::new())
        }
    }

    deserializer.deserialize_any(VersionVisitor)
}

pub(crate) fn optional_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let version = string_or_number(deserializer)?;
    Ok(Some(version).filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"
apiVersion: v1
entries:
  app:
    - version: 1.0.0
      urls:
        - https://charts.example.com/app-1.0.0.tgz
      digest: abc
    - version: 1.1.0
      urls:
        - https://charts.example.com/app-1.1.0.tgz
  legacy:
    - version: 2.0
      urls: []
generated: "2024-01-01T00:00:00Z"
"#;

    #[test]
    fn test_parse_keeps_listed_order() {
        let doc = IndexDocument::parse(INDEX).unwrap();
        let versions = doc.versions("app").unwrap();

        assert_eq!(doc.chart_count(), 2);
        assert_eq!(versions[0].version, "1.0.0");
        assert_eq!(versions[1].version, "1.1.0");
        assert_eq!(versions[1].urls, vec!["https://charts.example.com/app-1.1.0.tgz"]);
    }

    #[test]
    fn test_numeric_version_becomes_string() {
        let doc = IndexDocument::parse(INDEX).unwrap();
        let legacy = &doc.versions("legacy").unwrap()[0];

        assert_eq!(legacy.version, "2.0");
        assert!(legacy.urls.is_empty());
    }

    #[test]
    fn test_missing_entries_is_empty_index() {
        let doc = IndexDocument::parse("apiVersion: v1\n").unwrap();
        assert_eq!(doc.chart_count(), 0);
        assert!(doc.versions("app").is_none());
    }

    #[test]
    fn test_malformed_document_fails() {
        assert!(IndexDocument::parse("entries: [unterminated").is_err());
    }
}

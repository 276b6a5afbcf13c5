//! Projection rewriting for object storage imports.
//!
//! Renames and conversions are plain data and can be loaded from JSON.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::errors::StatementError;
use crate::executor::quote_string;
use crate::ident::quote_ident;

/// Placeholder substituted with the source column reference.
pub const COLUMN_PLACEHOLDER: &str = "{column}";

/// Maps a target column name to the name of the column in the source file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RenameRule {
    #[default]
    Identity,
    /// Explicit target to source mapping. Unmapped columns keep their name.
    Mapping(BTreeMap<String, String>),
    /// Pattern such as `src_{column}` applied to every column.
    Pattern(String),
}

impl RenameRule {
    pub fn source_name<'a>(&'a self, column: &'a str) -> Cow<'a, str> {
        match self {
            RenameRule::Identity => Cow::Borrowed(column),
            RenameRule::Mapping(map) => match map.get(column) {
                Some(source) => Cow::Borrowed(source.as_str()),
                None => Cow::Borrowed(column),
            },
            RenameRule::Pattern(pattern) => Cow::Owned(pattern.replace(COLUMN_PLACEHOLDER, column)),
        }
    }
}

/// Rewrites a group of columns through one expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertRule {
    pub columns: Vec<String>,
    pub target_type: String,
    /// Expression with `{column}` placeholders. When absent the column is
    /// cast to `target_type`.
    #[serde(default)]
    pub template: Option<String>,
}

impl ConvertRule {
    /// `CAST(<column> AS <target_type>)` for every listed column.
    pub fn cast<I, S>(columns: I, target_type: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConvertRule {
            columns: columns.into_iter().map(Into::into).collect(),
            target_type: target_type.into(),
            template: None,
        }
    }

    /// Apply `template` to every listed column.
    pub fn expr<I, S>(columns: I, target_type: impl Into<String>, template: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConvertRule {
            columns: columns.into_iter().map(Into::into).collect(),
            target_type: target_type.into(),
            template: Some(template.into()),
        }
    }

    fn render(&self, source_ref: &str) -> String {
        match &self.template {
            Some(template) => template.replace(COLUMN_PLACEHOLDER, source_ref),
            None => format!("CAST({source_ref} AS {})", self.target_type),
        }
    }
}

/// Where the synthetic source file column takes its value from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileNameSource {
    /// `_path` virtual column, `bucket/key`.
    #[default]
    Path,
    /// `_file` virtual column, the object name only.
    File,
    /// The URL the import was started with, as a literal.
    Url,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileColumn {
    pub alias: String,
    #[serde(default)]
    pub source: FileNameSource,
}

impl SourceFileColumn {
    fn projection_item(&self, url: &str) -> Result<String, StatementError> {
        let expr = match self.source {
            FileNameSource::Path => Cow::Borrowed("_path"),
            FileNameSource::File => Cow::Borrowed("_file"),
            FileNameSource::Url => Cow::Owned(quote_string(url)),
        };
        Ok(format!(
            "{expr} AS {}",
            quote_ident(&self.alias, "source file column alias")?
        ))
    }
}

/// Describes how the columns of a source file map onto a target table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnTransformSpec {
    #[serde(default)]
    pub rename: RenameRule,
    #[serde(default)]
    pub rules: Vec<ConvertRule>,
    #[serde(default)]
    pub source_file: Option<SourceFileColumn>,
}

impl ColumnTransformSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rename(mut self, rename: RenameRule) -> Self {
        self.rename = rename;
        self
    }

    pub fn with_rule(mut self, rule: ConvertRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_source_file(mut self, alias: impl Into<String>, source: FileNameSource) -> Self {
        self.source_file = Some(SourceFileColumn {
            alias: alias.into(),
            source,
        });
        self
    }

    /// Index every rule column to the rule that claims it.
    fn rule_index(&self) -> Result<HashMap<&str, &ConvertRule>, StatementError> {
        let mut index = HashMap::new();
        for rule in &self.rules {
            for column in &rule.columns {
                if index.insert(column.as_str(), rule).is_some() {
                    return Err(StatementError::OverlappingRules {
                        column: column.clone(),
                    });
                }
                if let Some(template) = &rule.template {
                    if !template.contains(COLUMN_PLACEHOLDER) {
                        return Err(StatementError::TemplateWithoutColumn {
                            column: column.clone(),
                        });
                    }
                }
            }
        }
        Ok(index)
    }

    /// Build the projection list of the import `SELECT`.
    ///
    /// `columns` is the target table's column list in declared order, and
    /// `url` is the object URL used for [`FileNameSource::Url`]. Items are
    /// emitted in target column order.
    pub fn projection<S: AsRef<str>>(
        &self,
        columns: &[S],
        url: &str,
    ) -> Result<String, StatementError> {
        let rules = self.rule_index()?;
        let file = self.source_file.as_ref();
        let alias = file.map(|f| f.alias.as_str());

        if let Some(alias) = alias {
            quote_ident(alias, "source file column alias")?;
            if rules.contains_key(alias) {
                return Err(StatementError::AliasCollision {
                    alias: alias.to_string(),
                });
            }
        }

        let targets: HashSet<&str> = columns.iter().map(AsRef::as_ref).collect();
        // Rules are checked in declaration order for a stable error.
        for rule in &self.rules {
            for column in &rule.columns {
                if !targets.contains(column.as_str()) {
                    return Err(StatementError::UnknownColumn {
                        column: column.clone(),
                    });
                }
            }
        }

        let mut items = Vec::with_capacity(columns.len() + 1);
        let mut file_column_placed = false;

        for column in columns.iter().map(AsRef::as_ref) {
            if let Some(file) = file.filter(|f| f.alias == column) {
                items.push(file.projection_item(url)?);
                file_column_placed = true;
                continue;
            }

            let source = self.rename.source_name(column);
            // A source name owned by a rule column would be read twice.
            if source != column && rules.contains_key(&*source) {
                return Err(StatementError::RenameCollision {
                    column: column.to_string(),
                    source_name: source.into_owned(),
                });
            }
            let source_ref = quote_ident(&source, "source column")?;
            match rules.get(column) {
                Some(rule) => items.push(rule.render(&source_ref)),
                None => items.push(source_ref.into_owned()),
            }
        }

        if let Some(file) = file.filter(|_| !file_column_placed) {
            items.push(file.projection_item(url)?);
        }

        if items.is_empty() {
            return Err(StatementError::NoColumns(url.to_string()));
        }

        Ok(items.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://localhost:9001/bucket/movies.csv";

    fn movies_spec() -> ColumnTransformSpec {
        let mut rename = BTreeMap::new();
        rename.insert("name".to_string(), "name".to_string());
        ColumnTransformSpec::new()
            .with_rename(RenameRule::Mapping(rename))
            .with_rule(ConvertRule::expr(["a", "b"], "String", "toYear(toDate({column}))"))
            .with_source_file("s3_url", FileNameSource::Path)
    }

    #[test]
    fn projection_keeps_target_order() {
        let projection = movies_spec()
            .projection(&["a", "b", "s3_url", "name"], URL)
            .unwrap();
        assert_eq!(
            "toYear(toDate(a)), toYear(toDate(b)), _path AS s3_url, name",
            projection
        );
    }

    #[test]
    fn file_column_appended_when_not_a_target_column() {
        let spec = ColumnTransformSpec::new().with_source_file("source_url", FileNameSource::Url);
        let projection = spec.projection(&["region", "director"], URL).unwrap();
        assert_eq!(
            "region, director, 'http://localhost:9001/bucket/movies.csv' AS source_url",
            projection
        );
    }

    #[test]
    fn rename_feeds_conversion() {
        let mut rename = BTreeMap::new();
        rename.insert("released".to_string(), "Release Date".to_string());
        rename.insert("title".to_string(), "Title".to_string());
        let spec = ColumnTransformSpec::new()
            .with_rename(RenameRule::Mapping(rename))
            .with_rule(ConvertRule::cast(["released"], "Date"));

        let projection = spec.projection(&["title", "released"], URL).unwrap();
        assert_eq!("Title, CAST(`Release Date` AS Date)", projection);
    }

    #[test]
    fn pattern_rename() {
        let spec = ColumnTransformSpec::new()
            .with_rename(RenameRule::Pattern("src_{column}".to_string()))
            .with_rule(ConvertRule::expr(["amount"], "Decimal(18, 2)", "toDecimal64({column}, 2)"));
        let projection = spec.projection(&["id", "amount"], URL).unwrap();
        assert_eq!("src_id, toDecimal64(src_amount, 2)", projection);
    }

    #[test]
    fn identity_is_bare_passthrough() {
        let spec = ColumnTransformSpec::new();
        assert_eq!("a, b", spec.projection(&["a", "b"], URL).unwrap());
    }

    #[test]
    fn overlapping_rules_rejected() {
        let spec = ColumnTransformSpec::new()
            .with_rule(ConvertRule::cast(["a", "b"], "String"))
            .with_rule(ConvertRule::cast(["b"], "UInt32"));
        let err = spec.projection(&["a", "b"], URL).unwrap_err();
        assert!(matches!(err, StatementError::OverlappingRules { column } if column == "b"));
    }

    #[test]
    fn rename_onto_rule_column_rejected() {
        let mut rename = BTreeMap::new();
        rename.insert("c".to_string(), "a".to_string());
        let spec = ColumnTransformSpec::new()
            .with_rename(RenameRule::Mapping(rename))
            .with_rule(ConvertRule::cast(["a"], "String"));
        let err = spec.projection(&["a", "c"], URL).unwrap_err();
        assert!(matches!(err, StatementError::RenameCollision { column, .. } if column == "c"));
    }

    #[test]
    fn rename_between_rule_columns_rejected() {
        let mut rename = BTreeMap::new();
        rename.insert("a".to_string(), "b".to_string());
        let spec = ColumnTransformSpec::new()
            .with_rename(RenameRule::Mapping(rename))
            .with_rule(ConvertRule::cast(["a"], "String"))
            .with_rule(ConvertRule::cast(["b"], "UInt32"));
        let err = spec.projection(&["a", "b"], URL).unwrap_err();
        assert!(matches!(
            err,
            StatementError::RenameCollision { column, source_name } if column == "a" && source_name == "b"
        ));
    }

    #[test]
    fn unknown_rule_column_rejected() {
        let spec = ColumnTransformSpec::new().with_rule(ConvertRule::cast(["missing"], "String"));
        let err = spec.projection(&["a"], URL).unwrap_err();
        assert!(matches!(err, StatementError::UnknownColumn { column } if column == "missing"));
    }

    #[test]
    fn alias_on_rule_column_rejected() {
        let spec = ColumnTransformSpec::new()
            .with_rule(ConvertRule::cast(["a"], "String"))
            .with_source_file("a", FileNameSource::File);
        let err = spec.projection(&["a"], URL).unwrap_err();
        assert!(matches!(err, StatementError::AliasCollision { .. }));
    }

    #[test]
    fn template_without_placeholder_rejected() {
        let spec = ColumnTransformSpec::new().with_rule(ConvertRule::expr(["a"], "UInt8", "1"));
        let err = spec.projection(&["a"], URL).unwrap_err();
        assert!(matches!(err, StatementError::TemplateWithoutColumn { .. }));
    }

    #[test]
    fn spec_from_json() {
        let spec: ColumnTransformSpec = serde_json::from_str(
            r#"{
                "rename": {"kind": "mapping", "value": {"name": "name"}},
                "rules": [{"columns": ["a", "b"], "target_type": "String", "template": "toYear(toDate({column}))"}],
                "source_file": {"alias": "s3_url"}
            }"#,
        )
        .unwrap();
        assert_eq!(movies_spec(), spec);
    }
}

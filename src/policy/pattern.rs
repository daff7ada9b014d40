//! Name matchers used by policies.
//!
//! Two pattern dialects exist. [`TypePattern`] matches type names and only understands an exact
//! name, `prefix*`, `*suffix` or a lone `*`. [`Glob`] matches field names and free strings and
//! accepts `*` anywhere in the pattern.

use convert_case::{Case, Casing};
use regex::{escape as re_escape, Regex};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{
    fmt,
    hash::{Hash, Hasher},
};

/// Pattern over type names. Matching is case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypePattern {
    Any,
    Exact(String),
    Prefix(String),
    Suffix(String),
}

impl TypePattern {
    pub fn parse(pattern: &str) -> TypePattern {
        if pattern == "*" {
            TypePattern::Any
        } else if let Some(suffix) = pattern.strip_prefix('*') {
            // `*Foo*` is read as the literal suffix `Foo*`; there is no contains form here.
            TypePattern::Suffix(suffix.to_string())
        } else if let Some(prefix) = pattern.strip_suffix('*') {
            TypePattern::Prefix(prefix.to_string())
        } else {
            TypePattern::Exact(pattern.to_string())
        }
    }

    pub fn matches(&self, type_name: &str) -> bool {
        match self {
            TypePattern::Any => true,
            TypePattern::Exact(name) => type_name == name,
            TypePattern::Prefix(prefix) => type_name.starts_with(prefix.as_str()),
            TypePattern::Suffix(suffix) => type_name.ends_with(suffix.as_str()),
        }
    }

    pub fn as_pattern(&self) -> String {
        match self {
            TypePattern::Any => "*".to_string(),
            TypePattern::Exact(name) => name.clone(),
            TypePattern::Prefix(prefix) => format!("{prefix}*"),
            TypePattern::Suffix(suffix) => format!("*{suffix}"),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, TypePattern::Exact(name) if name.is_empty())
    }
}

impl From<&str> for TypePattern {
    fn from(pattern: &str) -> Self {
        TypePattern::parse(pattern)
    }
}

impl Serialize for TypePattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_pattern())
    }
}

impl<'de> Deserialize<'de> for TypePattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Ok(TypePattern::parse(&pattern))
    }
}

/// Glob pattern with `*` wildcards, compiled once into an anchored regex.
#[derive(Clone)]
pub struct Glob {
    source: String,
    regex: Regex,
}

impl Glob {
    pub fn new(pattern: &str) -> Result<Glob, regex::Error> {
        let body = pattern
            .split('*')
            .map(re_escape)
            .collect::<Vec<String>>()
            .join(".*");
        Ok(Glob {
            source: pattern.to_string(),
            regex: Regex::new(&format!("^{body}$"))?,
        })
    }

    pub fn matches(&self, candidate: &str) -> bool {
        self.regex.is_match(candidate)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }
}

impl fmt::Debug for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Glob({:?})", self.source)
    }
}

impl fmt::Display for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl PartialEq for Glob {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Glob {}

impl Hash for Glob {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl Serialize for Glob {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

struct GlobVisitor;

impl<'de> de::Visitor<'de> for GlobVisitor {
    type Value = Glob;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(formatter, "a glob pattern string using '*' as the wildcard")
    }

    fn visit_str<E>(self, s: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Glob::new(s).map_err(|_e| E::invalid_value(de::Unexpected::Str(s), &self))
    }
}

impl<'de> Deserialize<'de> for Glob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(GlobVisitor)
    }
}

/// String predicate used inside rule conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringMatch {
    Exact(String),
    Glob(Glob),
    /// Case-insensitive substring test.
    Contains(String),
    OneOf(Vec<String>),
}

impl StringMatch {
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            StringMatch::Exact(expected) => candidate == expected,
            StringMatch::Glob(glob) => glob.matches(candidate),
            StringMatch::Contains(needle) => candidate
                .to_lowercase()
                .contains(needle.to_lowercase().as_str()),
            StringMatch::OneOf(options) => options.iter().any(|o| o == candidate),
        }
    }
}

/// Wildcard value in `require` maps: the tag must be present, any value accepted.
pub const ANY_VALUE: &str = "{any}";

pub fn accepts_any(expected: &str) -> bool {
    expected.is_empty() || expected == ANY_VALUE
}

/// Expands `{snake}`, `{lower}` and `{upper}` against a field name.
pub fn expand_template(template: &str, field_name: &str) -> String {
    if !template.contains('{') {
        return template.to_string();
    }
    template
        .replace("{snake}", &field_name.to_case(Case::Snake))
        .replace("{lower}", &field_name.to_lowercase())
        .replace("{upper}", &field_name.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_pattern_forms() {
        assert!(TypePattern::parse("*").matches("Anything"));
        assert!(TypePattern::parse("User").matches("User"));
        assert!(!TypePattern::parse("User").matches("user"));
        assert!(TypePattern::parse("*Request").matches("CreateUserRequest"));
        assert!(!TypePattern::parse("*Request").matches("RequestLog"));
        assert!(TypePattern::parse("Order*").matches("OrderItem"));
        assert!(!TypePattern::parse("Order*").matches("BigOrder"));
        // No contains form at the type level.
        assert!(!TypePattern::parse("*Order*").matches("BigOrderItem"));
    }

    #[test]
    fn test_type_pattern_round_trips_through_text() {
        for raw in ["*", "User", "Order*", "*Request"] {
            assert_eq!(TypePattern::parse(raw).as_pattern(), raw);
        }
    }

    #[test]
    fn test_glob_wildcards_anywhere() {
        let glob = Glob::new("*ID").unwrap();
        assert!(glob.matches("UserID"));
        assert!(!glob.matches("UserId"));

        let glob = Glob::new("created*At").unwrap();
        assert!(glob.matches("createdAt"));
        assert!(glob.matches("created_on_At"));

        let glob = Glob::new("a.b").unwrap();
        assert!(glob.matches("a.b"));
        assert!(!glob.matches("axb"));
    }

    #[test]
    fn test_string_match_variants() {
        assert!(StringMatch::Exact("ID".into()).matches("ID"));
        assert!(StringMatch::Contains("mail".into()).matches("EmailAddress"));
        assert!(StringMatch::Contains("MAIL".into()).matches("email"));
        assert!(StringMatch::OneOf(vec!["a".into(), "b".into()]).matches("b"));
        assert!(!StringMatch::OneOf(vec!["a".into()]).matches("c"));
        assert!(StringMatch::Glob(Glob::new("Vec<*>").unwrap()).matches("Vec<Order>"));
    }

    #[test]
    fn test_expand_template() {
        assert_eq!(expand_template("{snake}", "CreatedAt"), "created_at");
        assert_eq!(expand_template("{snake},omitempty", "UserName"), "user_name,omitempty");
        assert_eq!(expand_template("{lower}", "UserName"), "username");
        assert_eq!(expand_template("{upper}", "UserName"), "USERNAME");
        assert_eq!(expand_template("literal", "UserName"), "literal");
    }
}

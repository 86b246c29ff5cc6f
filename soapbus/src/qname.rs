//! Noms qualifiés XML (`{namespace}local`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// An XML qualified name.
///
/// Printed and parsed in James Clark notation: `{http://example.org}Local`. A name
/// without a namespace prints as its bare local part.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct QName {
    pub namespace: String,
    pub local: String,
}

impl QName {
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// Name without namespace.
    pub fn local(local: impl Into<String>) -> Self {
        Self::new("", local)
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

impl FromStr for QName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix('{') {
            Some(rest) => match rest.split_once('}') {
                Some((ns, local)) if !local.is_empty() => Ok(QName::new(ns, local)),
                _ => Err(format!("invalid qualified name '{}'", s)),
            },
            None if s.is_empty() => Err("empty qualified name".to_string()),
            None => Ok(QName::local(s)),
        }
    }
}

impl Serialize for QName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let q: QName = "{http://example.org/hello}GreetMe".parse().unwrap();
        assert_eq!(q.namespace, "http://example.org/hello");
        assert_eq!(q.local, "GreetMe");
        assert_eq!(q.to_string(), "{http://example.org/hello}GreetMe");

        let bare: QName = "GreetMe".parse().unwrap();
        assert_eq!(bare, QName::local("GreetMe"));
        assert_eq!(bare.to_string(), "GreetMe");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("{unterminated".parse::<QName>().is_err());
        assert!("{ns}".parse::<QName>().is_err());
        assert!("".parse::<QName>().is_err());
    }
}

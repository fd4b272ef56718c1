//! Structured document parsing for cached content.
//!
//! The cache does not know any document schema. It picks a serialization
//! format from the file extension and lets serde deserialize into the type the
//! caller asks for; a type mismatch surfaces as a validation error.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::DocumentError;

/// Serialization format of a structured document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Pick the format from a file extension (`.json`, `.yaml`, `.yml`).
    pub fn from_path(path: &Path) -> Result<Self, DocumentError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => Ok(DocumentFormat::Json),
            Some("yaml" | "yml") => Ok(DocumentFormat::Yaml),
            _ => Err(DocumentError::UnknownFormat(
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            )),
        }
    }

    /// Parse raw bytes into `T`.
    pub fn parse<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, DocumentError> {
        match self {
            DocumentFormat::Json => Ok(serde_json::from_slice(bytes)?),
            DocumentFormat::Yaml => Ok(serde_yaml::from_slice(bytes)?),
        }
    }

    /// Serialize `value` in this format.
    pub fn to_bytes<T: Serialize>(self, value: &T) -> Result<Vec<u8>, DocumentError> {
        match self {
            DocumentFormat::Json => Ok(serde_json::to_vec_pretty(value)?),
            DocumentFormat::Yaml => Ok(serde_yaml::to_string(value)?.into_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Catalog {
        title: String,
        controls: Vec<String>,
    }

    fn sample() -> Catalog {
        Catalog {
            title: "Sample".to_string(),
            controls: vec!["ac-1".to_string(), "ac-2".to_string()],
        }
    }

    #[test]
    fn test_from_path() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/b.JSON")).unwrap(),
            DocumentFormat::Json
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("b.yml")).unwrap(),
            DocumentFormat::Yaml
        );
        assert!(matches!(
            DocumentFormat::from_path(Path::new("b.txt")),
            Err(DocumentError::UnknownFormat(name)) if name == "b.txt"
        ));
    }

    #[test]
    fn test_yaml_parse() {
        let parsed: Catalog = DocumentFormat::Yaml
            .parse(b"title: Sample\ncontrols: [ac-1, ac-2]\n")
            .unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_json_serialize_then_parse() {
        let bytes = DocumentFormat::Json.to_bytes(&sample()).unwrap();
        let parsed: Catalog = DocumentFormat::Json.parse(&bytes).unwrap();
        assert_eq!(parsed, sample());
    }

    #[test]
    fn test_type_mismatch_is_error() {
        let result: Result<Catalog, _> = DocumentFormat::Json.parse(br#"{"title": 3}"#);
        assert!(matches!(result, Err(DocumentError::Json(_))));

        let result: Result<Catalog, _> = DocumentFormat::Yaml.parse(b"title: [unclosed");
        assert!(matches!(result, Err(DocumentError::Yaml(_))));
    }
}

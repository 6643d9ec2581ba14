// file: src/parser/frontmatter.rs
// description: YAML frontmatter extraction from markdown notes
// reference: https://docs.rs/yaml-rust

use crate::error::{PipelineError, Result};
use std::collections::BTreeMap;
use yaml_rust::{Yaml, YamlLoader};

pub struct FrontmatterParser;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frontmatter {
    pub fields: BTreeMap<String, String>,
}

impl FrontmatterParser {
    pub fn new() -> Self {
        Self
    }

    /// Splits a leading `---` block off `content`. Returns the fields and the body.
    pub fn extract<'a>(
        &self,
        file: &str,
        content: &'a str,
    ) -> Result<Option<(Frontmatter, &'a str)>> {
        let Some(rest) = content
            .strip_prefix("---\n")
            .or_else(|| content.strip_prefix("---\r\n"))
        else {
            return Ok(None);
        };

        let mut offset = 0;
        let mut closing = None;
        for line in rest.split_inclusive('\n') {
            if line.trim_end() == "---" {
                closing = Some((offset, offset + line.len()));
                break;
            }
            offset += line.len();
        }

        let Some((yaml_end, body_start)) = closing else {
            return Ok(None);
        };

        let docs = YamlLoader::load_from_str(&rest[..yaml_end]).map_err(|e| {
            PipelineError::MarkdownParse {
                file: file.to_string(),
                message: format!("YAML frontmatter error: {}", e),
            }
        })?;

        let mut fields = BTreeMap::new();
        if let Some(Yaml::Hash(hash)) = docs.first() {
            for (key, value) in hash {
                if let (Some(key), Some(value)) = (key.as_str(), scalar_to_string(value)) {
                    fields.insert(key.to_string(), value);
                }
            }
        }

        Ok(Some((Frontmatter { fields }, &rest[body_start..])))
    }
}

fn scalar_to_string(value: &Yaml) -> Option<String> {
    match value {
        Yaml::String(s) | Yaml::Real(s) => Some(s.clone()),
        Yaml::Integer(i) => Some(i.to_string()),
        Yaml::Boolean(b) => Some(b.to_string()),
        Yaml::Array(items) => {
            let items: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            Some(items.join(", "))
        }
        _ => None,
    }
}

impl Default for FrontmatterParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frontmatter_extraction() {
        let parser = FrontmatterParser::new();
        let content = "---\ntitle: Test\ndate: 2024-01-01\nmood: 7\ntags: [hike, family]\n---\n# Content\n\n---\nrule above";

        let (frontmatter, body) = parser.extract("note.md", content).unwrap().unwrap();
        assert_eq!(frontmatter.fields.get("title"), Some(&"Test".to_string()));
        assert_eq!(frontmatter.fields.get("date"), Some(&"2024-01-01".to_string()));
        assert_eq!(frontmatter.fields.get("mood"), Some(&"7".to_string()));
        assert_eq!(frontmatter.fields.get("tags"), Some(&"hike, family".to_string()));
        assert_eq!(body, "# Content\n\n---\nrule above");
    }

    #[test]
    fn test_no_frontmatter() {
        let parser = FrontmatterParser::new();
        assert!(parser.extract("a.md", "# Just a heading").unwrap().is_none());
        assert!(parser.extract("a.md", "---\nnever closed").unwrap().is_none());
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let parser = FrontmatterParser::new();
        let err = parser
            .extract("bad.md", "---\ntitle: [unclosed\n---\nbody")
            .unwrap_err();
        assert!(matches!(err, PipelineError::MarkdownParse { file, .. } if file == "bad.md"));
    }
}

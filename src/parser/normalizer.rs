// file: src/parser/normalizer.rs
// description: Markdown cleanup applied to notes before chunking
// reference: https://commonmark.org

pub struct MarkdownNormalizer;

impl MarkdownNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalizes headings, bullets and trailing whitespace and collapses runs
    /// of blank lines. Fenced code is copied through untouched.
    pub fn normalize(&self, content: &str) -> String {
        let mut result: Vec<String> = Vec::new();
        let mut in_code_block = false;
        let mut blank_run = 0;

        for line in content.lines() {
            if line.trim_start().starts_with("```") {
                in_code_block = !in_code_block;
                blank_run = 0;
                result.push(line.trim_end().to_string());
                continue;
            }

            if in_code_block {
                result.push(line.to_string());
                continue;
            }

            let line = line.trim_end();
            if line.is_empty() {
                blank_run += 1;
                if blank_run > 1 {
                    continue;
                }
                result.push(String::new());
                continue;
            }
            blank_run = 0;

            result.push(self.normalize_line(line));
        }

        result.join("\n")
    }

    fn normalize_line(&self, line: &str) -> String {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if trimmed.starts_with('#') {
            let level = trimmed.chars().take_while(|&c| c == '#').count();
            let rest = &trimmed[level..];
            // only ATX headings; `#tag` lines are content
            let is_heading = rest.is_empty() || rest.starts_with([' ', '\t']);
            let text = rest.trim();
            if is_heading && !text.is_empty() && level <= 6 && indent == 0 {
                return format!("{} {}", "#".repeat(level), text);
            }
            return line.to_string();
        }

        if let Some(stripped) = trimmed
            .strip_prefix("* ")
            .or_else(|| trimmed.strip_prefix("+ "))
            .or_else(|| trimmed.strip_prefix("- "))
        {
            return format!("{}- {}", " ".repeat(indent), stripped.trim());
        }

        line.to_string()
    }
}

impl Default for MarkdownNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_normalization() {
        let normalizer = MarkdownNormalizer::new();
        let normalized = normalizer.normalize("# Title\n##  Subtitle  ");

        assert_eq!(normalized, "# Title\n## Subtitle");
    }

    #[test]
    fn test_hashtag_lines_preserved() {
        let normalizer = MarkdownNormalizer::new();
        let content = "#gratitude #family\nDinner with Mom.\n#7 on the list";

        assert_eq!(normalizer.normalize(content), content);
    }

    #[test]
    fn test_list_normalization() {
        let normalizer = MarkdownNormalizer::new();
        let normalized = normalizer.normalize("* Item 1\n+ Item 2\n  - Item 3");

        assert_eq!(normalized, "- Item 1\n- Item 2\n  - Item 3");
    }

    #[test]
    fn test_blank_lines_collapsed() {
        let normalizer = MarkdownNormalizer::new();
        let normalized = normalizer.normalize("Line 1\n\n\n\nLine 2");

        assert_eq!(normalized, "Line 1\n\nLine 2");
    }

    #[test]
    fn test_code_blocks_untouched() {
        let normalizer = MarkdownNormalizer::new();
        let content = "```python\n#comment\n* not a list   \n\n\n```";
        assert_eq!(normalizer.normalize(content), content);
    }
}

// file: src/parser/markdown.rs
// description: markdown to plain text rendering for previews and titles
// reference: https://docs.rs/pulldown-cmark

use pulldown_cmark::{Event, Parser, Tag, TagEnd};

pub struct MarkdownParser;

#[derive(Debug, Clone, Default)]
pub struct ParsedMarkdown {
    pub plain_text: String,
    pub headings: Vec<Heading>,
}

#[derive(Debug, Clone)]
pub struct Heading {
    pub level: u32,
    pub text: String,
}

impl ParsedMarkdown {
    /// The first top-most heading, used as the note title.
    pub fn title(&self) -> Option<String> {
        let top = self.headings.iter().map(|h| h.level).min()?;
        self.headings
            .iter()
            .find(|h| h.level == top)
            .map(|h| h.text.clone())
    }
}

impl MarkdownParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, content: &str) -> ParsedMarkdown {
        let mut plain_text = String::new();
        let mut headings = Vec::new();
        let mut current_heading: Option<(u32, String)> = None;
        let mut in_code_block = false;

        for event in Parser::new(content) {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    current_heading = Some((level as u32, String::new()));
                }
                Event::End(TagEnd::Heading(_)) => {
                    if let Some((level, text)) = current_heading.take() {
                        let text = text.trim().to_string();
                        if !text.is_empty() {
                            headings.push(Heading { level, text });
                        }
                    }
                    plain_text.push('\n');
                }
                Event::Start(Tag::CodeBlock(_)) => in_code_block = true,
                Event::End(TagEnd::CodeBlock) => in_code_block = false,
                Event::End(TagEnd::Paragraph) | Event::End(TagEnd::Item) => {
                    plain_text.push('\n');
                }
                Event::Text(text) | Event::Code(text) => {
                    if let Some((_, ref mut heading_text)) = current_heading {
                        heading_text.push_str(&text);
                    }
                    if !in_code_block {
                        plain_text.push_str(&text);
                    }
                }
                Event::SoftBreak | Event::HardBreak => plain_text.push(' '),
                _ => {}
            }
        }

        ParsedMarkdown {
            plain_text: plain_text.trim().to_string(),
            headings,
        }
    }
}

impl Default for MarkdownParser {
    fn default() -> Self {
        Self::new()
    }
}

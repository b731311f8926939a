//! Markdown rendering for assistant replies.
//!
//! Replies are parsed with pulldown-cmark and flattened into terminal
//! lines. With color on, emphasis, headings and code are styled through
//! crossterm; with color off the markup is dropped and only the text and
//! the block structure (paragraph gaps, bullets, indented code) remain.

use crossterm::style::{Attribute, Color, ContentStyle};
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

/// Render `text` into terminal lines.
pub fn render_markdown(text: &str, color: bool) -> Vec<String> {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS;
    let mut renderer = Renderer::new(color);
    for event in Parser::new_ext(text, options) {
        renderer.process_event(event);
    }
    renderer.finish()
}

struct Renderer {
    color: bool,
    lines: Vec<String>,
    line: String,
    /// A block ended; the next block starts after an empty line.
    gap: bool,
    bold: usize,
    italic: usize,
    strike: usize,
    heading: bool,
    code_block: bool,
    quote: usize,
    /// One entry per open list: the next number, or `None` for bullets.
    lists: Vec<Option<u64>>,
    link: Option<String>,
}

impl Renderer {
    fn new(color: bool) -> Self {
        Self {
            color,
            lines: Vec::new(),
            line: String::new(),
            gap: false,
            bold: 0,
            italic: 0,
            strike: 0,
            heading: false,
            code_block: false,
            quote: 0,
            lists: Vec::new(),
            link: None,
        }
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.start_tag(tag),
            Event::End(tag) => self.end_tag(tag),
            Event::Text(text) if self.code_block => {
                for line in text.lines() {
                    self.push("    ", None);
                    self.push(line, Some(Color::Yellow));
                    self.flush();
                }
            }
            Event::Text(text) => self.push(&text, None),
            Event::Code(code) => {
                if self.color {
                    self.push(&code, Some(Color::Yellow));
                } else {
                    self.push(&format!("`{code}`"), None);
                }
            }
            Event::SoftBreak | Event::HardBreak => self.flush(),
            Event::TaskListMarker(checked) => {
                self.push(if checked { "[x] " } else { "[ ] " }, None);
            }
            Event::Rule => {
                self.open_block();
                self.push("---", Some(Color::DarkGrey));
                self.close_block();
            }
            // Raw HTML is never echoed to the terminal.
            _ => {}
        }
    }

    fn start_tag(&mut self, tag: Tag) {
        match tag {
            Tag::Paragraph if self.lists.is_empty() => self.open_block(),
            Tag::Heading { .. } => {
                self.open_block();
                self.heading = true;
            }
            Tag::CodeBlock(_) => {
                self.open_block();
                self.code_block = true;
            }
            Tag::BlockQuote(_) => {
                self.open_block();
                self.quote += 1;
            }
            Tag::List(start) => {
                if self.lists.is_empty() {
                    self.open_block();
                }
                self.lists.push(start);
            }
            Tag::Item => {
                self.flush_partial();
                let depth = self.lists.len().saturating_sub(1);
                let bullet = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let bullet = format!("{n}. ");
                        *n += 1;
                        bullet
                    }
                    _ => "- ".to_string(),
                };
                self.push(&format!("{}{bullet}", "  ".repeat(depth)), None);
            }
            Tag::Emphasis => self.italic += 1,
            Tag::Strong => self.bold += 1,
            Tag::Strikethrough => self.strike += 1,
            Tag::Link { dest_url, .. } => self.link = Some(dest_url.to_string()),
            _ => {}
        }
    }

    fn end_tag(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph if self.lists.is_empty() => self.close_block(),
            TagEnd::Paragraph => self.flush_partial(),
            TagEnd::Heading(_) => {
                self.close_block();
                self.heading = false;
            }
            TagEnd::CodeBlock => {
                self.code_block = false;
                self.close_block();
            }
            TagEnd::BlockQuote(_) => {
                self.close_block();
                self.quote = self.quote.saturating_sub(1);
            }
            TagEnd::List(_) => {
                self.lists.pop();
                if self.lists.is_empty() {
                    self.close_block();
                }
            }
            TagEnd::Item => self.flush_partial(),
            TagEnd::Emphasis => self.italic = self.italic.saturating_sub(1),
            TagEnd::Strong => self.bold = self.bold.saturating_sub(1),
            TagEnd::Strikethrough => self.strike = self.strike.saturating_sub(1),
            TagEnd::Link => {
                if let Some(url) = self.link.take() {
                    self.push(&format!(" ({url})"), Some(Color::DarkGrey));
                }
            }
            _ => {}
        }
    }

    fn style(&self, color: Option<Color>) -> ContentStyle {
        let mut style = ContentStyle::new();
        if self.bold > 0 || self.heading {
            style.attributes.set(Attribute::Bold);
        }
        if self.italic > 0 {
            style.attributes.set(Attribute::Italic);
        }
        if self.strike > 0 {
            style.attributes.set(Attribute::CrossedOut);
        }
        style.foreground_color = color.or(self.heading.then_some(Color::Cyan));
        style
    }

    fn push(&mut self, text: &str, color: Option<Color>) {
        if self.line.is_empty() && self.quote > 0 {
            self.line.push_str(&"> ".repeat(self.quote));
        }
        if self.color {
            self.line.push_str(&self.style(color).apply(text).to_string());
        } else {
            self.line.push_str(text);
        }
    }

    fn flush(&mut self) {
        self.lines.push(std::mem::take(&mut self.line));
    }

    fn flush_partial(&mut self) {
        if !self.line.is_empty() {
            self.flush();
        }
    }

    fn open_block(&mut self) {
        self.flush_partial();
        if self.gap && !self.lines.is_empty() {
            self.lines.push(String::new());
        }
        self.gap = false;
    }

    fn close_block(&mut self) {
        self.flush_partial();
        self.gap = true;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush_partial();
        while self.lines.last().is_some_and(|l| l.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }
}

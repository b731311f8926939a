//! Terminal input and output for interactive chat.

use std::fmt::Display;
use std::io::Write;

use backchannel_core::output::{OutputKind, OutputSink};
use crossterm::cursor::MoveToColumn;
use crossterm::style::{PrintStyledContent, StyledContent, Stylize};
use crossterm::terminal::{Clear, ClearType};
use crossterm::tty::IsTty;
use crossterm::{execute, queue};

use crate::markdown::render_markdown;

const PROMPT: &str = "You > ";
const RULE: &str = "-----------------------------------";

/// What a line of user input means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    Skip,
    Exit,
    Message(String),
}

pub fn parse_line(line: &str) -> InputLine {
    let line = line.trim();
    if line.is_empty() {
        return InputLine::Skip;
    }
    match line.to_ascii_lowercase().as_str() {
        "exit" | "quit" | "/exit" | "/quit" | ":q" => InputLine::Exit,
        _ => InputLine::Message(line.to_string()),
    }
}

/// Presents orchestrator output on stdout, errors on stderr.
///
/// Each message is printed above a fresh `You > ` prompt so output that
/// arrives while the user is typing stays readable.
pub struct TerminalSink {
    color: bool,
}

impl TerminalSink {
    pub fn new() -> Self {
        Self {
            color: std::io::stdout().is_tty(),
        }
    }

    pub fn prompt(&self) {
        let mut out = std::io::stdout().lock();
        let _ = if self.color {
            execute!(out, PrintStyledContent(PROMPT.green()))
        } else {
            write!(out, "{PROMPT}").and_then(|()| out.flush())
        };
    }

    /// Drop the prompt line the user may be typing on.
    fn clear_line(&self, out: &mut impl Write) -> std::io::Result<()> {
        if self.color {
            queue!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))
        } else {
            writeln!(out)
        }
    }
}

impl Default for TerminalSink {
    fn default() -> Self {
        Self::new()
    }
}

fn paint<D: Display>(color: bool, styled: StyledContent<D>) -> String {
    if color {
        styled.to_string()
    } else {
        styled.content().to_string()
    }
}

/// Format one message for the terminal, without the trailing prompt.
/// Replies are rendered as markdown.
pub fn render(kind: OutputKind, content: &str, color: bool) -> String {
    match kind {
        OutputKind::Reply => {
            let prefix = paint(color, "Assistant >".blue().bold());
            render_markdown(content, color)
                .into_iter()
                .map(|line| {
                    if line.is_empty() {
                        prefix.clone()
                    } else {
                        format!("{prefix} {line}")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        OutputKind::Status => paint(color, format!("[System] {content}").dim()),
        OutputKind::Notification => format!(
            "{}\n{}\n{}",
            paint(color, "Notification:".yellow()),
            paint(color, content.yellow()),
            paint(color, RULE.dim()),
        ),
        OutputKind::Error => paint(color, format!("[Error] {content}").red()),
    }
}

impl OutputSink for TerminalSink {
    fn present(&self, kind: OutputKind, content: &str) {
        let text = render(kind, content, self.color);

        {
            let mut out = std::io::stdout().lock();
            let _ = self.clear_line(&mut out);
            if kind == OutputKind::Error {
                let _ = out.flush();
                let _ = writeln!(std::io::stderr().lock(), "{text}");
            } else {
                let _ = writeln!(out, "{text}");
            }
        }
        self.prompt();
    }
}

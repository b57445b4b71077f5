//! Terminal markdown rendering for replies.

use termimad::MadSkin;
use termimad::crossterm::style::Color;

use confidant_types::llm::Usage;

/// Renders complete replies as terminal markdown.
pub struct ChatRenderer {
    skin: MadSkin,
}

impl ChatRenderer {
    pub fn new() -> Self {
        let mut skin = MadSkin::default_dark();
        skin.bold.set_fg(Color::Cyan);
        skin.headers[0].set_fg(Color::Cyan);
        skin.headers[1].set_fg(Color::Cyan);
        skin.inline_code.set_fg(Color::Yellow);
        skin.code_block.set_fg(Color::Yellow);
        Self { skin }
    }

    pub fn render(&self, markdown: &str) -> String {
        self.skin.term_text(markdown).to_string()
    }

    /// Print the stats footer after a reply.
    ///
    /// Format: "| {provider}/{model} . {tokens} tokens ({cached} cached) . {time}s"
    pub fn print_stats_footer(&self, footer: &ReplyFooter<'_>) {
        println!("\n  {}", console::style(footer.to_string()).dim());
    }
}

impl Default for ChatRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Attribution and cost line shown under a reply.
pub struct ReplyFooter<'a> {
    pub provider: &'a str,
    pub model: &'a str,
    pub usage: Option<&'a Usage>,
    pub fallback_count: u32,
    pub response_ms: u64,
}

impl std::fmt::Display for ReplyFooter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "| {}/{}", self.provider, self.model)?;
        if let Some(usage) = self.usage {
            write!(f, " \u{00b7} {} tokens", usage.total_tokens)?;
            if let Some(cached) = usage.cached_tokens.filter(|c| *c > 0) {
                write!(f, " ({cached} cached)")?;
            }
        }
        if self.fallback_count > 0 {
            write!(f, " \u{00b7} after {} failover", self.fallback_count)?;
            if self.fallback_count > 1 {
                write!(f, "s")?;
            }
        }
        write!(f, " \u{00b7} {:.1}s", self.response_ms as f64 / 1000.0)
    }
}

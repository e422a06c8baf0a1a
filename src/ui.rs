use colored::{ColoredString, Colorize};

/// Message tone, with the symbol used for it everywhere in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Info,
    Success,
    Warn,
    Error,
}

impl Tone {
    pub fn symbol(self) -> ColoredString {
        match self {
            Self::Info => "ℹ".blue(),
            Self::Success => "✓".green(),
            Self::Warn => "⚠".yellow(),
            Self::Error => "✗".red(),
        }
    }

    /// Symbol followed by `msg`
    pub fn line(self, msg: &str) -> String {
        format!("{} {}", self.symbol(), msg)
    }
}

pub fn info(msg: &str) {
    println!("{}", Tone::Info.line(msg));
}

pub fn success(msg: &str) {
    println!("{}", Tone::Success.line(msg));
}

pub fn warn(msg: &str) {
    println!("{}", Tone::Warn.line(msg));
}

/// Errors go to stderr
pub fn error(msg: &str) {
    eprintln!("{}", Tone::Error.line(msg));
}

/// Indented, muted detail line
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Bold title with a rule under it
pub fn header(title: &str) {
    let rule = "─".repeat(title.chars().count());
    println!("\n{}\n{}", title.bold(), rule.dimmed());
}

pub fn section(title: &str) {
    println!("\n{}", title.cyan().bold());
}

pub fn kv(key: &str, value: &str) {
    println!("  {}: {value}", key.dimmed());
}

use owo_colors::OwoColorize;

pub struct Output;

impl Output {
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message.red());
    }

    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message.bright_blue());
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message.yellow());
    }
}

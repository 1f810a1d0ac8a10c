use owo_colors::OwoColorize;

use crate::VERSION;

/// Print a styled banner for verbose mode
pub fn print_banner() {
    eprintln!(
        "\n{} {} {}",
        "Clipmark".bold().bright_blue(),
        "v".dimmed(),
        VERSION.dimmed()
    );
    eprintln!("{}", "Clip web articles into clean, readable content\n".dimmed());
}

/// Print a styled step message
pub fn print_step(step: usize, total: usize, message: &str) {
    eprintln!("{} {}", format!("[{}/{}]", step, total).dimmed(), message.bright_cyan());
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message.bright_green());
}

/// Print an info message
#[allow(dead_code)]
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue(), message.bright_blue());
}

/// Print a warning message
#[allow(dead_code)]
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message.bright_yellow());
}

/// Print an error message
#[allow(dead_code)]
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message.bright_red());
}

/// Print a clip summary: fetch mode, text size, image counts
pub fn print_clip_details(result: &clipmark_core::ClipResult) {
    eprintln!("\n{}", "═".repeat(60).dimmed());
    eprintln!("{}", "Clip Details".bold().cyan());
    eprintln!("{}", "═".repeat(60).dimmed());
    eprintln!(
        "  {} {}",
        "Fetch mode:".dimmed(),
        result.fetch_mode.to_string().bright_white()
    );
    eprintln!(
        "  {} {}",
        "Text:".dimmed(),
        format_size(result.extracted.plain_text.len()).bright_white()
    );
    eprintln!(
        "  {} {} ({} downloaded)\n",
        "Images:".dimmed(),
        result.image_count.to_string().bright_white(),
        result.downloaded_image_count.to_string().bright_white()
    );
}

/// Format file size for display
pub fn format_size(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;

    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

//! Terminal output helpers for `interpay` subcommands.

use colored::Colorize;

/// Brand banner.
pub fn banner() {
    println!("  {} {}", ">>".bright_cyan().bold(), "Interpay".bold());
    println!("     {}", "Payment requests between nearby devices".dimmed());
}

/// Section header: ">> Title" in cyan.
pub fn section(title: &str) {
    println!("  {} {}", ">>".bright_cyan().bold(), title.bold());
}

/// Key-value display: "  Label:       value".
pub fn kv(label: &str, value: &str) {
    println!("  {:<13}{}", format!("{label}:"), value);
}

pub fn success(msg: &str) {
    println!("  {} {}", "\u{2714}".bright_green(), msg);
}

/// A peer-side event, indented under the current section.
pub fn peer_event(peer: &str, msg: &str) {
    println!("    {} {} {}", "\u{2192}".bright_cyan(), peer.bold(), msg);
}

pub fn warn(msg: &str) {
    println!("  {} {}", "-".bright_yellow(), msg.yellow());
}

/// Red error on stderr.
pub fn error(msg: &str) {
    eprintln!("  {} {}", "\u{2718}".bright_red(), msg.bright_red());
}

pub fn hint(msg: &str) {
    println!("  {} {}", "hint:".dimmed(), msg.dimmed());
}

pub fn blank() {
    println!();
}

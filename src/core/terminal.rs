use console::{Emoji, style};

use crate::core::store::Server;

pub static SUCCESS_ICON: Emoji<'_, '_> = Emoji("✅ ", "");
pub static INFO_ICON: Emoji<'_, '_> = Emoji("ℹ️  ", "");
pub static WARN_ICON: Emoji<'_, '_> = Emoji("⚠️  ", "");
pub static ERROR_ICON: Emoji<'_, '_> = Emoji("❌ ", "");
pub static PLUG: Emoji<'_, '_> = Emoji("🔌 ", "");
pub static GLOBE: Emoji<'_, '_> = Emoji("🌐 ", "");
pub static GEAR: Emoji<'_, '_> = Emoji("⚙️  ", "");

pub fn print_success(msg: &str) {
    println!("{} {}", SUCCESS_ICON, style(msg).green());
}

pub fn print_info(msg: &str) {
    println!("{} {}", INFO_ICON, style(msg).blue());
}

pub fn print_warn(msg: &str) {
    println!("{} {}", WARN_ICON, style(msg).yellow());
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", ERROR_ICON, style(msg).red().bold());
}

pub fn print_status(label: &str, msg: &str) {
    println!("  {} {}: {}", GEAR, style(label).bold().cyan(), msg);
}

pub fn print_link(label: &str, url: &str) {
    println!(
        "  {} {}: {}",
        GLOBE,
        style(label).bold(),
        style(url).underlined().cyan()
    );
}

/// One line per server: id, name, target, type tag and live status.
pub fn print_server_row(server: &Server) {
    let status = if server.connected {
        style("connected").green()
    } else {
        style("idle").dim()
    };
    println!(
        "  {} {:>4}  {:<20} {:<24} {:<12} {}",
        PLUG,
        server.id,
        style(&server.name).bold(),
        format!("{}:{}", server.host, server.port),
        server.server_type,
        status
    );
}

pub fn print_banner() {
    println!();
    println!(
        "{}",
        style("  ┌─┐┬ ┬┬┌┬┐┌─┐┬ ┬┌┐ ┌─┐┌─┐┬─┐┌┬┐").cyan().bold()
    );
    println!(
        "{}",
        style("  └─┐││││ │ │  ├─┤├┴┐│ │├─┤├┬┘ ││").cyan().bold()
    );
    println!(
        "{}",
        style("  └─┘└┴┘┴ ┴ └─┘┴ ┴└─┘└─┘┴ ┴┴└──┴┘").cyan().bold()
    );
    println!("{}\n", style("  Fleet control for MCP servers.").dim());
}

pub fn print_goodbye() {
    println!("\n{}", style("switchboard stopped.").bold().cyan());
}

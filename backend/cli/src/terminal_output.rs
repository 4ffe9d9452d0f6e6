//! Terminal output: colored chat lines, notes and the `check` summary table.

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";

pub fn supports_color() -> bool {
    std::env::var("NO_COLOR").is_err()
        && (std::env::var("COLORTERM").is_ok()
            || std::env::var("TERM").map(|t| t != "dumb").unwrap_or(false))
}

fn paint(text: &str, style: &str) -> String {
    if supports_color() { format!("{style}{text}{RESET}") } else { text.to_string() }
}

/// A bot reply. Multi-line replies are indented under the prefix.
pub fn format_reply(text: &str) -> String {
    let prefix = paint("bot>", &format!("{CYAN}{BOLD}"));
    let body = text.lines().collect::<Vec<_>>().join("\n     ");
    format!("{prefix} {body}")
}

pub fn prompt(user: &str) -> String {
    paint(&format!("{user}> "), DIM)
}

pub fn note_warn(msg: &str) {
    println!("{} {msg}", paint("WARN:", &format!("{YELLOW}{BOLD}")));
}

pub fn note_error(msg: &str) {
    eprintln!("{} {msg}", paint("ERROR:", &format!("{RED}{BOLD}")));
}

pub fn note_success(msg: &str) {
    println!("{} {msg}", paint("OK:", &format!("{GREEN}{BOLD}")));
}

/// Left-aligned table with a header row and a dashed separator.
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(table_line(headers, &widths));
    let dashes: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push(table_line(&dashes, &widths));
    for row in rows {
        out.push(table_line(row, &widths));
    }
    out.join("\n")
}

fn table_line<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{:<width$}", cell.as_ref()))
        .collect();
    format!("  {}", padded.join("  ").trim_end())
}

//! Output formatting for the CLI
//!
//! Colored human output, plus JSON and YAML renderings for scripting.

use colored::Colorize;
use serde::Serialize;
use std::io::{self, Write};
use std::time::{Duration, Instant};

use super::OutputFormat;
use elk_infra::state::ChangeType;

/// Output formatter for different output modes
pub struct OutputFormatter {
    /// Use colored output
    use_color: bool,
    /// Requested document format
    format: OutputFormat,
    /// Verbosity level
    verbosity: u8,
    /// Start time for duration calculations
    start_time: Instant,
}

impl OutputFormatter {
    /// Create a new output formatter
    pub fn new(use_color: bool, format: OutputFormat, verbosity: u8) -> Self {
        // Respect NO_COLOR environment variable
        let use_color = use_color && std::env::var("NO_COLOR").is_err();

        Self {
            use_color,
            format,
            verbosity,
            start_time: Instant::now(),
        }
    }

    /// Whether output is meant for another program
    pub fn is_machine(&self) -> bool {
        !matches!(self.format, OutputFormat::Human)
    }

    /// Print a serializable document in the requested format.
    ///
    /// Human mode falls back to pretty JSON.
    pub fn document<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        let rendered = match self.format {
            OutputFormat::Yaml => serde_yaml::to_string(value)?,
            OutputFormat::Json | OutputFormat::Human => {
                let mut json = serde_json::to_string_pretty(value)?;
                json.push('\n');
                json
            }
        };
        print!("{}", rendered);
        self.flush();
        Ok(())
    }

    /// Print a banner/header
    pub fn banner(&self, title: &str) {
        if self.is_machine() {
            return;
        }

        let line = "=".repeat(title.len() + 4);
        if self.use_color {
            println!("\n{}", line.bright_blue());
            println!("{}", format!("  {}  ", title).bright_blue().bold());
            println!("{}\n", line.bright_blue());
        } else {
            println!("\n{}", line);
            println!("  {}  ", title);
            println!("{}\n", line);
        }
    }

    /// Print a section header
    pub fn section(&self, title: &str) {
        if self.is_machine() {
            return;
        }

        if self.use_color {
            println!("\n{}", title.cyan().bold());
            println!("{}", "-".repeat(title.len()).cyan());
        } else {
            println!("\n{}", title);
            println!("{}", "-".repeat(title.len()));
        }
    }

    /// Print an error message
    pub fn error(&self, message: &str) {
        if self.is_machine() {
            self.message_event("error", message);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "ERROR:".red().bold(), message);
        } else {
            eprintln!("ERROR: {}", message);
        }
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.is_machine() {
            self.message_event("warning", message);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "WARNING:".yellow().bold(), message);
        } else {
            eprintln!("WARNING: {}", message);
        }
    }

    /// Print a hint message
    pub fn hint(&self, message: &str) {
        if self.is_machine() {
            self.message_event("hint", message);
            return;
        }

        if self.use_color {
            eprintln!("{} {}", "HINT:".cyan().bold(), message);
        } else {
            eprintln!("HINT: {}", message);
        }
    }

    /// Print an info message (respects verbosity)
    pub fn info(&self, message: &str) {
        if self.verbosity < 1 {
            return;
        }

        if self.is_machine() {
            self.message_event("info", message);
            return;
        }

        if self.use_color {
            println!("{} {}", "INFO:".blue(), message);
        } else {
            println!("INFO: {}", message);
        }
    }

    /// Print a debug message (requires higher verbosity)
    pub fn debug(&self, message: &str) {
        if self.verbosity < 2 {
            return;
        }

        if self.is_machine() {
            self.message_event("debug", message);
            return;
        }

        if self.use_color {
            println!("{} {}", "DEBUG:".magenta(), message);
        } else {
            println!("DEBUG: {}", message);
        }
    }

    /// Print a line that always shows in human mode
    pub fn line(&self, message: &str) {
        if !self.is_machine() {
            println!("{}", message);
        }
    }

    /// Print a success line
    pub fn success(&self, message: &str) {
        if self.is_machine() {
            return;
        }

        if self.use_color {
            println!("{}", message.green().bold());
        } else {
            println!("{}", message);
        }
    }

    /// Print one planned change, prefixed by its change symbol
    pub fn change(&self, change_type: ChangeType, text: &str) {
        if self.is_machine() {
            return;
        }

        let line = format!("  {} {}", change_type, text);
        if !self.use_color {
            println!("{}", line);
            return;
        }

        match change_type {
            ChangeType::Added => println!("{}", line.green()),
            ChangeType::Removed => println!("{}", line.red()),
            ChangeType::Modified => println!("{}", line.yellow()),
            ChangeType::Unchanged => println!("{}", line.dimmed()),
        }
    }

    /// Print a unified diff body, indented under its change
    pub fn diff(&self, unified: &str) {
        if self.is_machine() {
            return;
        }

        for line in unified.lines() {
            let indented = format!("      {}", line);
            if !self.use_color {
                println!("{}", indented);
            } else if line.starts_with("@@") {
                println!("{}", indented.cyan());
            } else if line.starts_with('+') {
                println!("{}", indented.green());
            } else if line.starts_with('-') {
                println!("{}", indented.red());
            } else {
                println!("{}", indented.dimmed());
            }
        }
    }

    /// Print a list of items
    pub fn list(&self, title: &str, items: &[String]) {
        if self.is_machine() {
            return;
        }

        if self.use_color {
            println!("\n{}:", title.bright_white().bold());
        } else {
            println!("\n{}:", title);
        }

        for item in items {
            if self.use_color {
                println!("  {} {}", "-".bright_black(), item);
            } else {
                println!("  - {}", item);
            }
        }
    }

    /// Print a table
    pub fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        if self.is_machine() {
            return;
        }

        for line in render_table(headers, rows, self.use_color) {
            println!("{}", line);
        }
    }

    /// Time since the formatter was created
    pub fn elapsed(&self) -> String {
        format_duration(self.start_time.elapsed())
    }

    /// Flush stdout
    pub fn flush(&self) {
        let _ = io::stdout().flush();
    }

    fn message_event(&self, kind: &str, message: &str) {
        let event = serde_json::json!({
            "type": kind,
            "message": message
        });
        eprintln!("{}", event);
    }
}

fn render_table(headers: &[&str], rows: &[Vec<String>], use_color: bool) -> Vec<String> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let join = |cells: Vec<String>| cells.join(" | ").trim_end().to_string();
    let mut lines = Vec::with_capacity(rows.len() + 2);

    let header_line = join(
        headers
            .iter()
            .zip(&widths)
            .map(|(h, w)| format!("{:width$}", h, width = *w))
            .collect(),
    );
    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    if use_color {
        lines.push(header_line.bright_white().bold().to_string());
        lines.push(sep.join("-+-").bright_black().to_string());
    } else {
        lines.push(header_line);
        lines.push(sep.join("-+-"));
    }

    for row in rows {
        lines.push(join(
            row.iter()
                .zip(&widths)
                .map(|(cell, w)| format!("{:width$}", cell, width = *w))
                .collect(),
        ));
    }

    lines
}

/// Format a duration as a human-readable string
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}.{:03}s", secs, millis)
    } else {
        format!("{}ms", millis)
    }
}

use clap::ValueEnum;
use overlay_core::ReconcileReport;
use owo_colors::OwoColorize;
use serde_json::json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    #[value(name = "json-pretty")]
    JsonPretty,
}

pub struct Output {
    format: OutputFormat,
    quiet: bool,
}

impl Output {
    pub fn new(format: OutputFormat, quiet: bool) -> Self {
        Self { format, quiet }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn success(&self, msg: impl AsRef<str>) {
        if self.quiet {
            return;
        }
        match self.format {
            OutputFormat::Human => println!("{} {}", "✓".green(), msg.as_ref()),
            _ => self.print_json(&json!({"type": "success", "message": msg.as_ref()})),
        }
    }

    pub fn error(&self, msg: impl AsRef<str>) {
        // Errors are shown even in quiet mode
        match self.format {
            OutputFormat::Human => eprintln!("{} {}", "✗".red(), msg.as_ref()),
            _ => self.print_json(&json!({"type": "error", "message": msg.as_ref()})),
        }
    }

    pub fn info(&self, msg: impl AsRef<str>) {
        if self.quiet {
            return;
        }
        match self.format {
            OutputFormat::Human => println!("{}", msg.as_ref()),
            _ => self.print_json(&json!({"type": "info", "message": msg.as_ref()})),
        }
    }

    pub fn warn(&self, msg: impl AsRef<str>) {
        if self.quiet {
            return;
        }
        match self.format {
            OutputFormat::Human => println!("{} {}", "⚠".yellow(), msg.as_ref()),
            _ => self.print_json(&json!({"type": "warning", "message": msg.as_ref()})),
        }
    }

    pub fn json(&self, data: &serde_json::Value) {
        if self.quiet && self.format != OutputFormat::Human {
            return;
        }
        self.print_json(data);
    }

    /// Summary of a reconcile or revert pass.
    pub fn report(&self, heading: &str, report: &ReconcileReport) {
        if self.format != OutputFormat::Human {
            let data = serde_json::to_value(report).unwrap_or_default();
            self.json(&json!({"type": "report", "operation": heading, "report": data}));
            return;
        }
        if self.quiet {
            return;
        }

        println!("{}", heading.bright_cyan().bold());
        println!("  Shows scanned:   {}", report.shows_scanned);
        println!("  Eligible:        {}", report.eligible);
        println!("  Overlaid:        {}", report.applied.green());
        println!("  Previewed:       {}", report.previewed);
        println!("  Reverted:        {}", report.reverted);
        println!("  Purged:          {}", report.purged);
        println!("  Unchanged:       {}", report.unchanged);
        println!("  Took:            {} ms", report.duration_ms);
        if !report.errors.is_empty() {
            println!("  {} {}", "Errors:".red(), report.errors.len());
            for error in &report.errors {
                println!("    - {}", error);
            }
        }
    }

    fn print_json(&self, data: &serde_json::Value) {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string(data).unwrap_or_default()),
            OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(data).unwrap_or_default()),
            OutputFormat::Human => println!("{}", data),
        }
    }
}

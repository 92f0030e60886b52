use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// Command output that renders as JSON or as rows of a table.
pub trait Report: Serialize {
    fn header(&self) -> Vec<&'static str>;
    fn rows(&self) -> Vec<Vec<String>>;
}

pub fn print_report<R: Report>(report: &R, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(report.header());
            for row in report.rows() {
                table.add_row(row);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let header = report.header();
            for row in report.rows() {
                let line: Vec<String> = header
                    .iter()
                    .zip(row)
                    .map(|(name, value)| format!("{}={value}", name.to_lowercase()))
                    .collect();
                println!("{}", line.join(" "));
            }
        }
    }
}

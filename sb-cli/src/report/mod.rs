//! Report rendering. The engine hands over result records; everything here
//! is presentation.

pub mod console;
pub mod csv;
pub mod html;
pub mod json;

use clap::ValueEnum;

use sb_common::BenchReport;

/// Selected reporter. Tokens are the lowercase variant names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Console,
    Json,
    Html,
    Csv,
}

/// Renders one or more result records in the selected format.
///
/// A single record renders as one document; compare runs pass several and
/// each format lays them out side by side in its own way.
pub fn render(reports: &[BenchReport], format: OutputFormat) -> String {
    match format {
        OutputFormat::Console => console::render(reports),
        OutputFormat::Json => json::render(reports),
        OutputFormat::Html => html::render(reports),
        OutputFormat::Csv => csv::render(reports),
    }
}

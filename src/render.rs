//! Display-only projections of statement tables and analyses.
//!
//! Everything here is one-way: nothing in the crate reads rendered text back.

use crate::error::Result;
use crate::metrics::{DocumentAnalysis, MetricSeries, PeriodChange, TableAnalysis};
use crate::schema::{ExtractedRow, StatementTable, StatementType};
use crate::utils::format_thousands;

const CRORE: f64 = 10_000_000.0;
const LAKH: f64 = 100_000.0;

fn cell(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_default()
}

/// Bordered text grid: one header row, then one row per table row.
/// Values are printed with two decimals; absent values are left blank.
pub fn render_grid(table: &StatementTable) -> String {
    let width = table.header.column_labels.len();
    let body: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| {
            let mut cells = vec![row.display_name.clone()];
            cells.extend((0..width.saturating_sub(1)).map(|col| cell(row.value(col))));
            cells
        })
        .collect();

    let mut widths: Vec<usize> = table
        .header
        .column_labels
        .iter()
        .map(|l| l.chars().count())
        .collect();
    for cells in &body {
        for (i, c) in cells.iter().enumerate() {
            widths[i] = widths[i].max(c.chars().count());
        }
    }

    let rule = |fill: char| {
        let mut line = String::from("+");
        for w in &widths {
            line.extend(std::iter::repeat(fill).take(w + 2));
            line.push('+');
        }
        line.push('\n');
        line
    };

    let render_row = |cells: &[String], align_numbers: bool| {
        let mut line = String::from("|");
        for (i, c) in cells.iter().enumerate() {
            if align_numbers && i > 0 {
                line.push_str(&format!(" {:>w$} |", c, w = widths[i]));
            } else {
                line.push_str(&format!(" {:<w$} |", c, w = widths[i]));
            }
        }
        line.push('\n');
        line
    };

    let mut output = rule('-');
    output.push_str(&render_row(&table.header.column_labels, false));
    output.push_str(&rule('='));
    for cells in &body {
        output.push_str(&render_row(cells, true));
        output.push_str(&rule('-'));
    }
    output
}

/// Rupee amount in crore (≥ 1 Cr), lakh (≥ 1 L) or plain grouped form.
pub fn format_currency(value: f64) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let magnitude = value.abs();

    if magnitude >= CRORE {
        format!("{}₹{:.2} Cr", sign, magnitude / CRORE)
    } else if magnitude >= LAKH {
        format!("{}₹{:.2} L", sign, magnitude / LAKH)
    } else {
        format!("{}₹{}", sign, format_thousands(magnitude))
    }
}

impl StatementTable {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        let header: Vec<String> = self.header.column_labels.iter().map(|l| csv_field(l)).collect();
        output.push_str(&header.join(","));
        output.push('\n');

        let periods = self.header.period_count();
        for row in &self.rows {
            output.push_str(&csv_field(&row.display_name));
            for col in 0..periods {
                output.push(',');
                if let Some(v) = row.value(col) {
                    output.push_str(&v.to_string());
                }
            }
            output.push('\n');
        }
        output
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("## {}\n\n", self.statement_type.display_name()));

        output.push_str(&format!("| {} |\n", self.header.column_labels.join(" | ")));
        output.push('|');
        for i in 0..self.header.column_labels.len() {
            output.push_str(if i == 0 { " --- |" } else { " ---: |" });
        }
        output.push('\n');

        let periods = self.header.period_count();
        for row in &self.rows {
            output.push_str(&format!("| {}", markdown_label(row)));
            for col in 0..periods {
                output.push_str(&format!(" | {}", cell(row.value(col))));
            }
            output.push_str(" |\n");
        }

        if !self.notes.is_empty() {
            output.push_str(&format!("\n_{} data-quality notes_\n", self.notes.len()));
        }
        output
    }
}

fn markdown_label(row: &ExtractedRow) -> String {
    if row.is_derived() {
        format!("*{}*", row.display_name)
    } else {
        row.display_name.clone()
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn render_change(output: &mut String, change: &PeriodChange, format_value: fn(f64) -> String) {
    output.push_str(&format!(
        "Period: {} vs {}\n",
        change.period_pair.0, change.period_pair.1
    ));
    output.push_str(&format!("Current Value: {}\n", format_value(change.current)));
    output.push_str(&format!("Previous Value: {}\n", format_value(change.previous)));
    if change.zero_base {
        output.push_str("Change: n/a (previous value is zero)\n");
    } else if change.pct_change == 0.0 {
        output.push_str("No change\n");
    } else if change.pct_change > 0.0 {
        output.push_str(&format!("Increase: {:.2}%\n", change.pct_change.abs()));
    } else {
        output.push_str(&format!("Decrease: {:.2}%\n", change.pct_change.abs()));
    }
    output.push('\n');
}

fn render_series(
    output: &mut String,
    series: &MetricSeries,
    changes: &[PeriodChange],
    format_value: fn(f64) -> String,
) {
    let title = format!("{} ANALYSIS:", series.display_name.to_uppercase());
    output.push_str(&format!("\n{}\n{}\n\n", title, "=".repeat(title.chars().count())));
    for change in changes {
        render_change(output, change, format_value);
    }
    if let Some(latest) = series.latest() {
        output.push_str(&format!("Latest Value: {}\n", format_value(latest)));
    }
}

fn format_ratio(value: f64) -> String {
    format!("{:.2}", value)
}

/// Text report for one statement: each metric's period-over-period
/// movement, then the ratios.
pub fn render_analysis(analysis: &TableAnalysis) -> String {
    let title = format!("{} METRICS", analysis.statement_type.display_name().to_uppercase());
    let mut output = format!("{}\n{}\n", title, "-".repeat(title.len()));

    for metric in &analysis.metrics {
        render_series(&mut output, &metric.series, &metric.changes, format_currency);
    }

    if !analysis.ratios.is_empty() {
        output.push_str("\nKEY RATIOS\n----------\n");
        for ratio in &analysis.ratios {
            let r = &ratio.ratio;
            for (i, value) in r.values.iter().enumerate() {
                let period = r.periods.get(i).map(String::as_str).unwrap_or("?");
                match value {
                    Some(v) => output.push_str(&format!("{} ({}): {:.2}\n", r.display_name, period, v)),
                    None => output.push_str(&format!("{} ({}): n/a\n", r.display_name, period)),
                }
            }
            if let Some(series) = r.as_series() {
                render_series(&mut output, &series, &ratio.changes, format_ratio);
            }
        }
    }

    output
}

pub fn render_document_analysis(analysis: &DocumentAnalysis) -> String {
    let mut output = String::from("COMPREHENSIVE FINANCIAL ANALYSIS\n");
    output.push_str(&format!("{}\n\n", "=".repeat(32)));

    if analysis.is_empty() {
        output.push_str("No financial data could be extracted from the document.\n");
    }

    // Income statement first, as in the printed report.
    for statement_type in [StatementType::IncomeStatement, StatementType::BalanceSheet] {
        if let Some(table) = analysis.statement(statement_type) {
            output.push_str(&render_analysis(table));
            output.push('\n');
        } else if let Some(message) = analysis.unavailable.get(&statement_type) {
            output.push_str(&format!("{}\n\n", message));
        }
    }

    output
}

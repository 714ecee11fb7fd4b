use std::fmt::Write as _;
use std::io::Write;

use crate::Result;
use crate::format::format_millis;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display, strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
pub enum ReportFormat {
    /// Aligned fixed-width table with human-readable durations.
    #[default]
    Table,
    /// CSV with raw numbers (milliseconds, rates).
    Csv,
    /// CSV with human-readable durations.
    PrettyCsv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpOptions {
    pub format: ReportFormat,
    /// Emit the column header row.
    pub header: bool,
}

impl Default for DumpOptions {
    fn default() -> Self {
        Self {
            format: ReportFormat::Table,
            header: true,
        }
    }
}

/// Aggregate attempt counts used to decide the run's exit status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub attempts: u64,
    pub failures: u64,
}

pub trait Report {
    fn totals(&self) -> Totals;

    fn write_report(
        &self,
        out: &mut dyn Write,
        label: &str,
        opts: &DumpOptions,
        show_detail: bool,
    ) -> Result<()>;

    /// Writes the report to stdout.
    fn dump(&self, label: &str, opts: &DumpOptions, show_detail: bool) -> Result<()> {
        let mut out = std::io::stdout().lock();
        self.write_report(&mut out, label, opts, show_detail)?;
        out.flush()?;
        Ok(())
    }
}

/// Renders a millisecond cell for the given output mode.
pub(crate) fn ms_cell(ms: f64, format: ReportFormat) -> String {
    match format {
        ReportFormat::Csv => ms.to_string(),
        ReportFormat::Table | ReportFormat::PrettyCsv => format_millis(ms),
    }
}

pub(crate) struct Table {
    headers: &'static [&'static str],
    rows: Vec<Vec<String>>,
}

impl Table {
    pub(crate) fn new(headers: &'static [&'static str]) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub(crate) fn write(&self, out: &mut dyn Write, opts: &DumpOptions) -> Result<()> {
        match opts.format {
            ReportFormat::Table => self.write_aligned(out, opts.header),
            ReportFormat::Csv | ReportFormat::PrettyCsv => self.write_csv(out, opts.header),
        }
    }

    fn write_aligned(&self, out: &mut dyn Write, header: bool) -> Result<()> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.len()).collect();
        for row in &self.rows {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }

        let mut text = String::new();
        if header {
            let cells: Vec<&str> = self.headers.to_vec();
            push_aligned_line(&mut text, &widths, &cells);
        }
        for row in &self.rows {
            let cells: Vec<&str> = row.iter().map(String::as_str).collect();
            push_aligned_line(&mut text, &widths, &cells);
        }

        out.write_all(text.as_bytes())?;
        Ok(())
    }

    fn write_csv(&self, out: &mut dyn Write, header: bool) -> Result<()> {
        let mut wtr = csv::WriterBuilder::new().flexible(true).from_writer(out);
        if header {
            wtr.write_record(self.headers)?;
        }
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

fn push_aligned_line(text: &mut String, widths: &[usize], cells: &[&str]) {
    let mut line = String::new();
    for (i, (cell, &width)) in cells.iter().zip(widths).enumerate() {
        if i > 0 {
            line.push_str("  ");
        }
        write!(&mut line, "{cell:<width$}").ok();
    }
    text.push_str(line.trim_end());
    text.push('\n');
}

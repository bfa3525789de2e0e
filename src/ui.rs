//! Terminal UI utilities.
//!
//! A responsive table drawn with Unicode box characters. Columns shrink to
//! fit the terminal, widest first, but never below [`MIN_COLUMN`].
//!
//! ```rust
//! use lockvendor::ui::Table;
//!
//! let mut table = Table::new(&["Package", "Kind"]);
//! table.add_row(vec!["serde 1.0.0".to_string(), "registry".to_string()]);
//! table.print();
//! ```

use colored::*;

const MIN_COLUMN: usize = 8;
const INDENT: &str = "  ";

pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Rows with the wrong number of cells are dropped.
    pub fn add_row(&mut self, row: Vec<String>) {
        if row.len() == self.headers.len() {
            self.rows.push(row);
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn print(&self) {
        let (_, width) = console::Term::stdout().size();
        for line in self.render(width as usize) {
            println!("{line}");
        }
    }

    /// Lay the table out for a terminal `max_width` columns wide.
    pub fn render(&self, max_width: usize) -> Vec<String> {
        if self.headers.is_empty() {
            return Vec::new();
        }
        let widths = self.column_widths(max_width);

        let border = |left: &str, mid: &str, right: &str| {
            let cells: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("{INDENT}{left}{}{right}", cells.join(mid))
        };
        let line = |cells: &[String], header: bool| {
            let mut out = format!("{INDENT}│");
            for (cell, &width) in cells.iter().zip(&widths) {
                let text = console::truncate_str(&flatten(cell), width, "...").to_string();
                let padding = width.saturating_sub(console::measure_text_width(&text));
                let text = if header { text.bold().to_string() } else { text };
                out.push_str(&format!(" {text}{} │", " ".repeat(padding)));
            }
            out
        };

        let mut lines = vec![border("┌", "┬", "┐"), line(&self.headers, true)];
        lines.push(border("├", "┼", "┤"));
        lines.extend(self.rows.iter().map(|row| line(row, false)));
        lines.push(border("└", "┴", "┘"));
        lines
    }

    fn column_widths(&self, max_width: usize) -> Vec<usize> {
        let mut widths: Vec<usize> = self
            .headers
            .iter()
            .map(|h| console::measure_text_width(h))
            .collect();
        for row in &self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(console::measure_text_width(&flatten(cell)));
            }
        }

        // indent, outer borders and one padded separator per column
        let overhead = INDENT.len() + 1 + 3 * widths.len();
        let budget = max_width.saturating_sub(overhead);
        while widths.iter().sum::<usize>() > budget {
            let Some(widest) = widths.iter_mut().filter(|w| **w > MIN_COLUMN).max() else {
                break;
            };
            *widest -= 1;
        }
        widths
    }
}

fn flatten(s: &str) -> String {
    s.chars()
        .map(|c| if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c })
        .collect()
}

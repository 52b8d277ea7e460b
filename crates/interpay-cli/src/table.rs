//! Box-drawing table renderer for CLI listings.

use colored::Colorize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

/// Collects rows under fixed headers and renders them with Unicode borders.
pub struct Table {
    headers: Vec<String>,
    alignments: Vec<Align>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            alignments: vec![Align::Left; headers.len()],
            rows: Vec::new(),
        }
    }

    /// Set the alignment of column `col`; out-of-range columns are ignored.
    pub fn align(mut self, col: usize, alignment: Align) -> Self {
        if let Some(a) = self.alignments.get_mut(col) {
            *a = alignment;
        }
        self
    }

    /// Add a row, padding or truncating it to the header count.
    pub fn add_row<S: AsRef<str>>(&mut self, cells: &[S]) {
        let row = (0..self.headers.len())
            .map(|i| cells.get(i).map(|c| c.as_ref().to_string()).unwrap_or_default())
            .collect();
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                self.rows
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(h.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }

    fn pad(text: &str, width: usize, alignment: Align) -> String {
        match alignment {
            Align::Left => format!("{text:<width$}"),
            Align::Right => format!("{text:>width$}"),
        }
    }

    fn border(widths: &[usize], left: char, mid: char, right: char) -> String {
        let segments: Vec<String> = widths.iter().map(|w| "\u{2500}".repeat(w + 2)).collect();
        format!("{left}{}{right}", segments.join(&mid.to_string()))
    }

    pub fn render(&self) -> String {
        let widths = self.widths();
        let line = |cells: Vec<String>| format!("\u{2502}{}\u{2502}", cells.join("\u{2502}"));

        let mut lines = vec![Self::border(&widths, '\u{250c}', '\u{252c}', '\u{2510}')];
        lines.push(line(
            self.headers
                .iter()
                .enumerate()
                .map(|(i, h)| format!(" {} ", Self::pad(h, widths[i], self.alignments[i]).bold()))
                .collect(),
        ));
        lines.push(Self::border(&widths, '\u{251c}', '\u{253c}', '\u{2524}'));
        for row in &self.rows {
            lines.push(line(
                row.iter()
                    .enumerate()
                    .map(|(i, c)| format!(" {} ", Self::pad(c, widths[i], self.alignments[i])))
                    .collect(),
            ));
        }
        lines.push(Self::border(&widths, '\u{2514}', '\u{2534}', '\u{2518}'));
        lines.join("\n")
    }

    pub fn print(&self) {
        println!("{}", self.render());
    }
}

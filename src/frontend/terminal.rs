//! Virtual key grid on the terminal, useful for development.
//!
//! `draw` prints the grid to stdout; keys are pressed by typing their index
//! followed by Enter.

use super::Frontend;
use crate::menu::KeypressSender;
use crate::render::KeyImage;
use anyhow::{Context, Result};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

const CELL_WIDTH: usize = 18;

pub struct TerminalFrontend {
    rows: usize,
    columns: usize,
    images: Vec<Option<KeyImage>>,
    enabled: bool,
    keypresses: KeypressSender,
}

impl TerminalFrontend {
    pub fn new(rows: usize, columns: usize, keypresses: KeypressSender) -> Self {
        Self {
            rows,
            columns,
            images: vec![None; rows.saturating_mul(columns)],
            enabled: true,
            keypresses,
        }
    }

    pub fn image(&self, index: usize) -> Option<&KeyImage> {
        self.images.get(index).and_then(Option::as_ref)
    }

    /// Text rendering of the grid: per row one line of icons and one of titles
    pub fn format_grid(&self) -> String {
        let separator = format!("+{}\n", format!("{}+", "-".repeat(CELL_WIDTH)).repeat(self.columns));
        let mut out = separator.clone();

        for row in 0..self.rows {
            let cells = (0..self.columns).map(|col| {
                let index = row * self.columns + col;
                (index, self.image(index))
            });

            let mut icons = String::from("|");
            let mut titles = String::from("|");
            for (index, image) in cells {
                let (icon, title) = match image {
                    Some(image) => (format!("{index:>2} [{}]", image.icon), image.title.clone()),
                    None => (format!("{index:>2}"), String::new()),
                };
                icons.push_str(&fit(&icon));
                icons.push('|');
                titles.push_str(&fit(&title));
                titles.push('|');
            }

            out.push_str(&icons);
            out.push('\n');
            out.push_str(&titles);
            out.push('\n');
            out.push_str(&separator);
        }
        out
    }
}

/// Pad or cut `text` to exactly one cell
fn fit(text: &str) -> String {
    let cut: String = text.chars().take(CELL_WIDTH - 1).collect();
    format!(" {cut:<width$}", width = CELL_WIDTH - 1)
}

impl Frontend for TerminalFrontend {
    fn image_size(&self) -> (u32, u32) {
        (80, 80)
    }

    fn clear(&mut self) {
        self.images.iter_mut().for_each(|image| *image = None);
    }

    fn set_key(&mut self, index: usize, image: KeyImage) {
        match self.images.get_mut(index) {
            Some(slot) => *slot = Some(image),
            None => warn!(index = index, "Key index outside the grid"),
        }
    }

    fn draw(&mut self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut stdout = std::io::stdout().lock();
        stdout
            .write_all(self.format_grid().as_bytes())
            .and_then(|_| stdout.flush())
            .context("Failed to write grid to stdout")
    }

    fn run(&mut self) -> Result<()> {
        let keypresses = self.keypresses.clone();
        let cells = self.images.len();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match line.trim().parse::<usize>() {
                        Ok(index) if index < cells => keypresses.pressed(index),
                        _ => warn!(input = %line.trim(), cells = cells, "Expected a key index"),
                    },
                    Ok(None) => {
                        info!("Terminal input closed");
                        break;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read terminal input");
                        break;
                    }
                }
            }
        });

        info!("Type a key index and press Enter to press a key");
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.clear();
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

//! Delimited text file source
//!
//! Each non-empty line is one numeric observation. With `target_columns`
//! set, every row becomes a labeled instance; otherwise rows are emitted as
//! unlabeled inputs, typically wrapped by a [`super::MovingWindowGenerator`].

use super::StreamSource;
use crate::types::{Instance, Sample};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

/// Configuration for a delimited file source
#[derive(Debug, Clone)]
pub struct CsvConfig {
    pub path: PathBuf,
    pub delimiter: char,
    pub has_header: bool,
    /// Columns split off as the label; `None` emits whole rows as inputs
    pub target_columns: Option<Vec<usize>>,
}

impl CsvConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            delimiter: ',',
            has_header: false,
            target_columns: None,
        }
    }
}

/// Source reading numeric rows from a delimited file
pub struct CsvSource {
    config: CsvConfig,
    lines: Lines<BufReader<File>>,
    line_number: usize,
}

impl CsvSource {
    pub fn open(config: CsvConfig) -> Result<Self> {
        let file = File::open(&config.path)
            .with_context(|| format!("Failed to open stream file {:?}", config.path))?;
        let mut source = Self {
            lines: BufReader::new(file).lines(),
            config,
            line_number: 0,
        };

        if source.config.has_header {
            source.read_line()?;
        }

        Ok(source)
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        match self.lines.next() {
            Some(line) => {
                self.line_number += 1;
                let line = line.with_context(|| {
                    format!("Failed to read line {} of {:?}", self.line_number, self.config.path)
                })?;
                Ok(Some(line))
            }
            None => Ok(None),
        }
    }

    fn parse_row(&self, line: &str) -> Result<Sample> {
        line.split(self.config.delimiter)
            .map(|field| {
                field.trim().parse::<f32>().with_context(|| {
                    format!(
                        "Invalid number {:?} on line {} of {:?}",
                        field, self.line_number, self.config.path
                    )
                })
            })
            .collect()
    }

    fn split_row(&self, row: Sample) -> Result<Instance> {
        let Some(targets) = &self.config.target_columns else {
            return Ok(Instance::unlabeled(row));
        };

        if let Some(&bad) = targets.iter().find(|&&c| c >= row.len()) {
            anyhow::bail!(
                "Target column {} out of range on line {} ({} columns)",
                bad,
                self.line_number,
                row.len()
            );
        }

        let y = targets.iter().map(|&c| row[c]).collect();
        let x = row
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !targets.contains(i))
            .map(|(_, v)| v)
            .collect();
        Ok(Instance::new(x, y))
    }
}

impl StreamSource for CsvSource {
    fn next(&mut self) -> Result<Option<Instance>> {
        while let Some(line) = self.read_line()? {
            if line.trim().is_empty() {
                continue;
            }
            let row = self.parse_row(&line)?;
            return self.split_row(row).map(Some);
        }
        Ok(None)
    }
}

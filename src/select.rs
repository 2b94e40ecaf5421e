//! Chapter selection: explicit index list, inclusive start/stop range, or an interactive prompt.
//!
//! Indices are 0-based chronological positions everywhere. Anything outside the listed
//! range is rejected, never clamped.

use crate::model::{Chapter, ChapterList};
use std::io::{self, BufRead, Write};
use thiserror::Error;

/// Operator-supplied selection, as parsed from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionCriteria {
    pub start: Option<usize>,
    pub stop: Option<usize>,
    pub list: Option<Vec<usize>>,
}

impl SelectionCriteria {
    pub fn range(start: usize, stop: usize) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
            list: None,
        }
    }

    pub fn list(indices: Vec<usize>) -> Self {
        Self {
            list: Some(indices),
            ..Self::default()
        }
    }

    /// Nothing supplied: the operator will be asked.
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.stop.is_none() && self.list.is_none()
    }
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("Chapter index {index} is out of range: the work has {len} chapters (valid: 0..={max})", max = .len.saturating_sub(1))]
    OutOfRange { index: usize, len: usize },

    #[error("Start index {start} is after stop index {stop}")]
    Inverted { start: usize, stop: usize },

    #[error("Invalid chapter index '{input}': expected a non-negative integer")]
    InvalidInput { input: String },

    #[error("Failed to read selection from the terminal: {source}")]
    Io {
        #[from]
        source: io::Error,
    },
}

/// Source of a start/stop pair when nothing was given on the command line.
pub trait SelectionProvider {
    fn prompt(&mut self, chapters: &ChapterList) -> Result<(usize, usize), SelectionError>;
}

/// Prints every chapter as `"{index}\t:{title}"` and reads two lines.
pub struct StdinPrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> StdinPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn ask(&mut self, label: &str) -> Result<usize, SelectionError> {
        write!(self.output, "{label}")?;
        self.output.flush()?;
        let mut line = String::new();
        self.input.read_line(&mut line)?;
        parse_index(line.trim())
    }
}

impl StdinPrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> SelectionProvider for StdinPrompt<R, W> {
    fn prompt(&mut self, chapters: &ChapterList) -> Result<(usize, usize), SelectionError> {
        writeln!(self.output, "Chapters: ")?;
        for chapter in chapters {
            writeln!(self.output, "{}\t:{}", chapter.index, chapter.title)?;
        }
        let start = self.ask("Start Index: ")?;
        let stop = self.ask("Stop Index: ")?;
        Ok((start, stop))
    }
}

/// Parse one index as typed by the operator.
pub fn parse_index(input: &str) -> Result<usize, SelectionError> {
    input
        .trim()
        .parse::<usize>()
        .map_err(|_| SelectionError::InvalidInput {
            input: input.to_string(),
        })
}

/// Resolve criteria against the listed chapters.
///
/// Precedence: explicit list, then start/stop, then the provider (only consulted when
/// nothing was supplied). A list keeps its order and repeats. Only a start means "to
/// the last chapter"; only a stop means "from the first".
pub fn resolve(
    criteria: &SelectionCriteria,
    chapters: &ChapterList,
    provider: &mut dyn SelectionProvider,
) -> Result<Vec<Chapter>, SelectionError> {
    let len = chapters.len();
    let pick = |index: usize| {
        chapters
            .get(index)
            .cloned()
            .ok_or(SelectionError::OutOfRange { index, len })
    };

    if let Some(list) = &criteria.list {
        return list.iter().map(|&i| pick(i)).collect();
    }

    let (start, stop) = if criteria.start.is_some() || criteria.stop.is_some() {
        (
            criteria.start.unwrap_or(0),
            criteria.stop.unwrap_or_else(|| len.saturating_sub(1)),
        )
    } else {
        provider.prompt(chapters)?
    };

    for index in [start, stop] {
        if index >= len {
            return Err(SelectionError::OutOfRange { index, len });
        }
    }
    if start > stop {
        return Err(SelectionError::Inverted { start, stop });
    }
    (start..=stop).map(pick).collect()
}

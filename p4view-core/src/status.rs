use std::io::{self, BufRead};
use std::path::PathBuf;

use thiserror::Error;

// Tagged fstat fields. Each value follows its prefix up to the line terminator.
const CLIENT_FILE: &str = "... clientFile ";
const HAVE_REV: &str = "... haveRev ";
const HEAD_REV: &str = "... headRev ";
const MOVED_REV: &str = "... movedRev ";
const ACTION: &str = "... action ";
const UNRESOLVED: &str = "... unresolved";

/// Fields requested from `fstat -T`; the order is the one the server emits.
pub const STATUS_FIELDS: &str = "clientFile,headRev,movedRev,haveRev,action,unresolved";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty status block")]
    EmptyBlock,
    #[error("status block does not start with a clientFile field: {line:?}")]
    MissingPath { line: String },
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read status output: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// One blank-line-delimited block of status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub path: PathBuf,
    pub local_revision: Option<String>,
    pub server_revision: Option<String>,
    pub action: Option<String>,
    pub unresolved: bool,
}

impl StatusRecord {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            local_revision: None,
            server_revision: None,
            action: None,
            unresolved: false,
        }
    }
}

fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

fn is_blank(line: &str) -> bool {
    strip_terminator(line).is_empty()
}

fn field_value<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    strip_terminator(line).strip_prefix(prefix)
}

/// Reduces the lines of one block to a record.
///
/// The first line must carry the path. Remaining lines are matched by
/// prefix, last line first, so absent optional fields are harmless.
pub fn parse_block<S: AsRef<str>>(lines: &[S]) -> Result<StatusRecord, ParseError> {
    let (first, rest) = lines.split_first().ok_or(ParseError::EmptyBlock)?;
    let first = first.as_ref();
    let path = field_value(first, CLIENT_FILE).ok_or_else(|| ParseError::MissingPath {
        line: strip_terminator(first).to_string(),
    })?;
    let mut record = StatusRecord::new(PathBuf::from(path));

    let last: Option<&str> = rest.last().map(|line| line.as_ref());
    if last.is_some_and(|line| strip_terminator(line).starts_with(UNRESOLVED)) {
        record.unresolved = true;
        return Ok(record);
    }

    let mut moved_revision = None;
    for line in rest.iter().rev() {
        let line: &str = line.as_ref();
        if let Some(value) = field_value(line, ACTION) {
            record.action = Some(value.to_string());
        } else if let Some(value) = field_value(line, HAVE_REV) {
            record.local_revision = Some(value.to_string());
        } else if let Some(value) = field_value(line, HEAD_REV) {
            record.server_revision = Some(value.to_string());
        } else if let Some(value) = field_value(line, MOVED_REV) {
            moved_revision = Some(value.to_string());
        } else if strip_terminator(line).starts_with(UNRESOLVED) {
            record.unresolved = true;
        } else {
            log::trace!("ignoring status field {:?}", strip_terminator(line));
        }
    }
    if record.server_revision.is_none() {
        record.server_revision = moved_revision;
    }

    Ok(record)
}

/// Push-based accumulator turning status lines into records.
///
/// Lines may be fed with or without their terminator.
#[derive(Debug, Default)]
pub struct BlockParser {
    pending: Vec<String>,
}

impl BlockParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a record when `line` closes a block.
    pub fn push_line(&mut self, line: &str) -> Result<Option<StatusRecord>, ParseError> {
        if is_blank(line) {
            let block = std::mem::take(&mut self.pending);
            return parse_block(block.as_slice()).map(Some);
        }
        self.pending.push(strip_terminator(line).to_string());
        Ok(None)
    }

    /// Flushes a trailing block that was not followed by a blank line.
    pub fn finish(&mut self) -> Result<Option<StatusRecord>, ParseError> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        let block = std::mem::take(&mut self.pending);
        parse_block(block.as_slice()).map(Some)
    }

    #[cfg(test)]
    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Lazy iterator over the records of a synchronous reader.
///
/// Iteration stops after the first error.
pub struct StatusRecords<R> {
    reader: R,
    parser: BlockParser,
    line: String,
    done: bool,
}

impl<R: BufRead> StatusRecords<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: BlockParser::new(),
            line: String::new(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for StatusRecords<R> {
    type Item = Result<StatusRecord, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    self.done = true;
                    return self.parser.finish().map_err(ReadError::from).transpose();
                }
                Ok(_) => match self.parser.push_line(&self.line) {
                    Ok(Some(record)) => return Some(Ok(record)),
                    Ok(None) => {}
                    Err(err) => {
                        self.done = true;
                        return Some(Err(err.into()));
                    }
                },
                Err(err) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_block() {
        let record = parse_block(&[
            "... clientFile /ws/a.txt\n",
            "... headRev 3\n",
            "... haveRev 3\n",
            "... action edit\n",
        ])
        .unwrap();
        assert_eq!(record.path, PathBuf::from("/ws/a.txt"));
        assert_eq!(record.server_revision.as_deref(), Some("3"));
        assert_eq!(record.local_revision.as_deref(), Some("3"));
        assert_eq!(record.action.as_deref(), Some("edit"));
        assert!(!record.unresolved);
    }

    #[test]
    fn optional_fields_may_be_missing() {
        let record = parse_block(&["... clientFile /ws/b.txt", "... action add"]).unwrap();
        assert_eq!(record.action.as_deref(), Some("add"));
        assert_eq!(record.local_revision, None);
        assert_eq!(record.server_revision, None);

        let record = parse_block(&["... clientFile /ws/b.txt"]).unwrap();
        assert_eq!(record, StatusRecord::new(PathBuf::from("/ws/b.txt")));
    }

    #[test]
    fn moved_revision_stands_in_for_head() {
        let record = parse_block(&[
            "... clientFile /ws/moved.txt",
            "... movedRev 7",
            "... haveRev 6",
        ])
        .unwrap();
        assert_eq!(record.server_revision.as_deref(), Some("7"));

        let record = parse_block(&[
            "... clientFile /ws/moved.txt",
            "... headRev 8",
            "... movedRev 7",
        ])
        .unwrap();
        assert_eq!(record.server_revision.as_deref(), Some("8"));
    }

    #[test]
    fn trailing_unresolved_short_circuits() {
        let record = parse_block(&[
            "... clientFile /ws/c.txt",
            "... headRev 2",
            "... haveRev 1",
            "... action edit",
            "... unresolved",
        ])
        .unwrap();
        assert!(record.unresolved);
        assert_eq!(record.action, None);
    }

    #[test]
    fn rejects_empty_and_pathless_blocks() {
        let empty: [&str; 0] = [];
        assert_eq!(parse_block(&empty), Err(ParseError::EmptyBlock));
        assert_eq!(
            parse_block(&["... headRev 1\n"]),
            Err(ParseError::MissingPath {
                line: "... headRev 1".into()
            })
        );
    }

    #[test]
    fn block_parser_emits_on_blank_line() {
        let mut parser = BlockParser::new();
        assert_eq!(parser.push_line("... clientFile /ws/a.txt\n").unwrap(), None);
        assert!(parser.has_pending());
        let record = parser.push_line("\n").unwrap().unwrap();
        assert_eq!(record.path, PathBuf::from("/ws/a.txt"));
        assert!(!parser.has_pending());
        assert_eq!(parser.finish().unwrap(), None);
    }

    #[test]
    fn block_parser_accepts_stripped_lines() {
        let mut parser = BlockParser::new();
        parser.push_line("... clientFile /ws/a.txt").unwrap();
        parser.push_line("... action delete").unwrap();
        let record = parser.push_line("").unwrap().unwrap();
        assert_eq!(record.action.as_deref(), Some("delete"));
    }

    #[test]
    fn block_parser_reports_empty_block() {
        let mut parser = BlockParser::new();
        assert_eq!(parser.push_line("\n"), Err(ParseError::EmptyBlock));
    }

    #[test]
    fn iterator_flushes_unterminated_tail() {
        let input = "... clientFile /ws/a.txt\n\n... clientFile /ws/b.txt\n";
        let paths: Vec<_> = StatusRecords::new(input.as_bytes())
            .map(|record| record.unwrap().path)
            .collect();
        assert_eq!(
            paths,
            vec![PathBuf::from("/ws/a.txt"), PathBuf::from("/ws/b.txt")]
        );
    }

    #[test]
    fn iterator_stops_after_error() {
        let input = "... clientFile /ws/a.txt\n\n... headRev 1\n\n... clientFile /ws/b.txt\n\n";
        let mut records = StatusRecords::new(input.as_bytes());
        assert!(records.next().unwrap().is_ok());
        assert!(matches!(
            records.next(),
            Some(Err(ReadError::Parse(ParseError::MissingPath { .. })))
        ));
        assert!(records.next().is_none());
    }
}

//! Job description domain type and parser
//!
//! A job description is a line-oriented declarative text block:
//!
//! ```text
//! # comments and blank lines are ignored
//! Executable = /bin/bash
//! Arguments  = "-c 'sleep 1; echo done'"
//! Output     = job.$(Cluster).$(Process).out
//! Queue 3
//! ```
//!
//! Attribute names are case-insensitive. The `Queue [count]` directive
//! terminates the description; nothing but comments may follow it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::domain::status::JobId;

/// Errors produced while parsing a job description
#[derive(Debug, Error)]
pub enum ParseError {
    /// The text does not follow the `Key = Value` / `Queue [count]` syntax
    #[error("job description is malformed at line {line}: {reason}; fix that line and try again")]
    Malformed { line: usize, reason: String },

    /// No `Executable` attribute, or an empty one
    #[error(
        "job description does not set an executable; add a line such as 'Executable = /bin/bash' before 'Queue'"
    )]
    MissingExecutable,

    /// The description file could not be read
    #[error("cannot read job description {}: {source}; check the path and its permissions", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn malformed(line: usize, reason: impl Into<String>) -> ParseError {
    ParseError::Malformed {
        line,
        reason: reason.into(),
    }
}

/// Where a job description comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    /// Declarative text given directly
    Inline(String),
    /// Path to a file containing the declarative text
    File(PathBuf),
}

/// File-transfer mode requested by `Should_Transfer_Files`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFiles {
    Yes,
    No,
    IfNeeded,
}

impl FromStr for TransferFiles {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "YES" | "TRUE" => Ok(Self::Yes),
            "NO" | "FALSE" => Ok(Self::No),
            "IF_NEEDED" => Ok(Self::IfNeeded),
            other => Err(format!(
                "Should_Transfer_Files must be YES, NO or IF_NEEDED, got '{}'",
                other
            )),
        }
    }
}

/// A single `Key = Value` pair, keeping the spelling it was written with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Immutable, validated job description
///
/// Serialized as its submit text so that any deserialized value has passed
/// the same validation as a parsed one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobDescription {
    attributes: Vec<Attribute>,
    queue: u32,
}

impl JobDescription {
    /// Parse a description from declarative text
    ///
    /// # Errors
    /// - [`ParseError::Malformed`] for syntax errors, including a missing or
    ///   invalid `Queue` directive
    /// - [`ParseError::MissingExecutable`] when the text is well formed but
    ///   `Executable` is absent or empty
    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let mut attributes: Vec<Attribute> = Vec::new();
        let mut queue: Option<(usize, u32)> = None;
        let mut last_line = 0;

        for (index, raw) in source.lines().enumerate() {
            let line_no = index + 1;
            last_line = line_no;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((queue_line, _)) = queue {
                return Err(malformed(
                    line_no,
                    format!("unexpected content after the Queue directive on line {}", queue_line),
                ));
            }

            if let Some(count) = parse_queue(line, line_no)? {
                queue = Some((line_no, count));
                continue;
            }

            let (name, value) = line
                .split_once('=')
                .ok_or_else(|| malformed(line_no, "expected 'Key = Value' or 'Queue [count]'"))?;
            let name = name.trim();
            let value = value.trim();

            validate_attribute(name, value, line_no)?;

            match attributes
                .iter_mut()
                .find(|attr| attr.name.eq_ignore_ascii_case(name))
            {
                Some(existing) => existing.value = value.to_string(),
                None => attributes.push(Attribute {
                    name: name.to_string(),
                    value: value.to_string(),
                }),
            }
        }

        let (_, queue) = queue.ok_or_else(|| {
            malformed(
                last_line.max(1),
                "missing the terminating 'Queue [count]' directive",
            )
        })?;

        let description = Self { attributes, queue };
        if description.executable().is_none() {
            return Err(ParseError::MissingExecutable);
        }

        Ok(description)
    }

    /// Read and parse a description file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ParseError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parse from either inline text or a file
    pub fn parse_source(source: &JobSource) -> Result<Self, ParseError> {
        match source {
            JobSource::Inline(text) => Self::parse(text),
            JobSource::File(path) => Self::from_file(path),
        }
    }

    /// Look up an attribute value (case-insensitive)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
            .map(|attr| attr.value.as_str())
    }

    /// All attributes in the order they were first written
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Number of units queued by this description (always >= 1)
    pub fn queue_count(&self) -> u32 {
        self.queue
    }

    pub fn executable(&self) -> Option<&str> {
        self.get("executable").filter(|value| !value.is_empty())
    }

    pub fn arguments(&self) -> Option<&str> {
        self.get("arguments")
    }

    /// Arguments split into individual words
    pub fn argv(&self) -> Vec<String> {
        self.arguments()
            .map(|args| split_arguments(args).unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn output(&self) -> Option<&str> {
        self.get("output").filter(|value| !value.is_empty())
    }

    pub fn error(&self) -> Option<&str> {
        self.get("error").filter(|value| !value.is_empty())
    }

    pub fn log(&self) -> Option<&str> {
        self.get("log").filter(|value| !value.is_empty())
    }

    /// Whether the executable is shipped with the job (defaults to true)
    pub fn transfer_executable(&self) -> bool {
        self.get("transfer_executable")
            .and_then(parse_bool)
            .unwrap_or(true)
    }

    pub fn should_transfer_files(&self) -> Option<TransferFiles> {
        self.get("should_transfer_files")
            .and_then(|value| value.parse().ok())
    }

    /// Substitute `$(Cluster)` / `$(Process)` style macros for one unit
    pub fn expand(value: &str, id: JobId) -> String {
        let mut expanded = String::with_capacity(value.len());
        let mut rest = value;

        while let Some(start) = rest.find("$(") {
            expanded.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find(')') else {
                expanded.push_str(&rest[start..]);
                return expanded;
            };

            match after[..end].to_ascii_lowercase().as_str() {
                "cluster" | "clusterid" => expanded.push_str(&id.cluster.to_string()),
                "process" | "procid" => expanded.push_str(&id.proc.to_string()),
                _ => expanded.push_str(&rest[start..start + 2 + end + 1]),
            }
            rest = &after[end + 1..];
        }

        expanded.push_str(rest);
        expanded
    }

    /// Output, error and log file names of one unit, macros expanded
    pub fn output_files(&self, id: JobId) -> Vec<String> {
        [self.output(), self.error(), self.log()]
            .into_iter()
            .flatten()
            .map(|name| Self::expand(name, id))
            .collect()
    }
}

impl fmt::Display for JobDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for attr in &self.attributes {
            writeln!(f, "{} = {}", attr.name, attr.value)?;
        }
        write!(f, "Queue {}", self.queue)
    }
}

impl FromStr for JobDescription {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JobDescription {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JobDescription> for String {
    fn from(description: JobDescription) -> Self {
        description.to_string()
    }
}

/// Recognize a `Queue [count]` directive
///
/// Returns `Ok(None)` when the line is not a directive at all.
fn parse_queue(line: &str, line_no: usize) -> Result<Option<u32>, ParseError> {
    if line.contains('=') {
        return Ok(None);
    }

    let mut words = line.split_whitespace();
    match words.next() {
        Some(word) if word.eq_ignore_ascii_case("queue") => {}
        _ => return Ok(None),
    }

    let count = match words.next() {
        None => 1,
        Some(word) => match word.parse::<u32>() {
            Ok(count) if count >= 1 => count,
            _ => {
                return Err(malformed(
                    line_no,
                    format!("Queue count must be a positive integer, got '{}'", word),
                ));
            }
        },
    };

    if let Some(extra) = words.next() {
        return Err(malformed(
            line_no,
            format!("unsupported Queue argument '{}'", extra),
        ));
    }

    Ok(Some(count))
}

fn validate_attribute(name: &str, value: &str, line_no: usize) -> Result<(), ParseError> {
    let mut chars = name.chars();
    let valid_name = match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '+'))
        }
        _ => false,
    };
    if !valid_name {
        return Err(malformed(
            line_no,
            format!("invalid attribute name '{}'", name),
        ));
    }

    match name.to_ascii_lowercase().as_str() {
        "queue" => Err(malformed(
            line_no,
            "Queue is a directive and cannot be assigned",
        )),
        "arguments" => split_arguments(value)
            .map(|_| ())
            .map_err(|reason| malformed(line_no, reason)),
        "transfer_executable" => parse_bool(value).map(|_| ()).ok_or_else(|| {
            malformed(
                line_no,
                format!("Transfer_Executable must be true or false, got '{}'", value),
            )
        }),
        "should_transfer_files" => value
            .parse::<TransferFiles>()
            .map(|_| ())
            .map_err(|reason| malformed(line_no, reason)),
        _ => Ok(()),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// Split an `Arguments` value into words
///
/// A value wrapped in double quotes uses the quoted syntax: single quotes
/// group words, `''` inside a quoted group is a literal single quote and
/// `""` is a literal double quote. Anything else is split on whitespace.
pub fn split_arguments(value: &str) -> Result<Vec<String>, String> {
    let value = value.trim();
    if !(value.len() >= 2 && value.starts_with('"') && value.ends_with('"')) {
        return Ok(value.split_whitespace().map(str::to_string).collect());
    }

    let inner = &value[1..value.len() - 1];
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = inner.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                    in_word = true;
                } else {
                    return Err("unescaped double quote in Arguments (write it as \"\")".to_string());
                }
            }
            '\'' if quoted => {
                if chars.peek() == Some(&'\'') {
                    chars.next();
                    current.push('\'');
                } else {
                    quoted = false;
                }
            }
            '\'' => {
                quoted = true;
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    args.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }

    if quoted {
        return Err("unterminated single quote in Arguments".to_string());
    }
    if in_word {
        args.push(current);
    }

    Ok(args)
}

//! git remote-helper wire protocol.
//!
//! git writes one command per line on the helper's stdin. `push` and `fetch`
//! arrive in batches closed by a blank line; a blank line on its own ends the
//! session. Replies go to stdout and must be flushed before git reads them.

use std::io::{self, BufRead, Write};

use gre_core::PushRef;
use gre_sync::{PushReport, RefListing, RefOutcome};

/// Advertised in reply to `capabilities`.
pub const CAPABILITIES: [&str; 3] = ["option", "push", "fetch"];

/// Reason given for refs that were fine but belonged to an aborted push.
pub const ABORTED_REASON: &str = "push aborted: another ref failed";

/// One `fetch <object-id> <name>` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub object_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Capabilities,
    Option { name: String, value: String },
    List { for_push: bool },
    Push(Vec<PushRef>),
    Fetch(Vec<FetchRequest>),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),

    #[error("malformed {command} line: {line:?}")]
    Malformed { command: &'static str, line: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub struct CommandReader<R> {
    input: R,
}

impl<R: BufRead> CommandReader<R> {
    pub fn new(input: R) -> Self {
        Self { input }
    }

    /// Next line without its terminator, or `None` at end of input.
    fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    /// Lines of a batch after its first, up to the closing blank line.
    fn read_batch(&mut self) -> io::Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.read_line()? {
            if line.is_empty() {
                break;
            }
            lines.push(line);
        }
        Ok(lines)
    }

    /// Read the next command. `None` when git closed the session.
    pub fn next_command(&mut self) -> Result<Option<Command>, ProtocolError> {
        let Some(first) = self.read_line()? else {
            return Ok(None);
        };
        if first.is_empty() {
            return Ok(None);
        }

        let (verb, rest) = first.split_once(' ').unwrap_or((first.as_str(), ""));
        let command = match verb {
            "capabilities" => Command::Capabilities,
            "list" => Command::List {
                for_push: rest == "for-push",
            },
            "option" => {
                let (name, value) = rest.split_once(' ').unwrap_or((rest, ""));
                Command::Option {
                    name: name.to_string(),
                    value: value.to_string(),
                }
            }
            "push" => {
                let mut lines = vec![first.clone()];
                lines.extend(self.read_batch()?);
                Command::Push(
                    lines
                        .iter()
                        .map(|line| parse_push_line(line))
                        .collect::<Result<_, _>>()?,
                )
            }
            "fetch" => {
                let mut lines = vec![first.clone()];
                lines.extend(self.read_batch()?);
                Command::Fetch(
                    lines
                        .iter()
                        .map(|line| parse_fetch_line(line))
                        .collect::<Result<_, _>>()?,
                )
            }
            _ => return Err(ProtocolError::UnknownCommand(first.clone())),
        };
        Ok(Some(command))
    }
}

fn parse_push_line(line: &str) -> Result<PushRef, ProtocolError> {
    let malformed = || ProtocolError::Malformed {
        command: "push",
        line: line.to_string(),
    };
    line.strip_prefix("push ")
        .ok_or_else(malformed)?
        .parse()
        .map_err(|_| malformed())
}

fn parse_fetch_line(line: &str) -> Result<FetchRequest, ProtocolError> {
    line.strip_prefix("fetch ")
        .and_then(|rest| rest.split_once(' '))
        .filter(|(id, name)| !id.is_empty() && !name.is_empty())
        .map(|(id, name)| FetchRequest {
            object_id: id.to_string(),
            name: name.to_string(),
        })
        .ok_or_else(|| ProtocolError::Malformed {
            command: "fetch",
            line: line.to_string(),
        })
}

pub fn write_capabilities(out: &mut impl Write) -> io::Result<()> {
    for capability in CAPABILITIES {
        writeln!(out, "{capability}")?;
    }
    writeln!(out)?;
    out.flush()
}

/// No options are supported.
pub fn write_option_reply(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "unsupported")?;
    out.flush()
}

/// `<id> <ref>` per ref (`? <ref>` when the target is unknown), then the
/// HEAD symref if any.
pub fn write_listing(out: &mut impl Write, listing: &RefListing) -> io::Result<()> {
    for listed in &listing.refs {
        match &listed.object_id {
            Some(id) => writeln!(out, "{id} {}", listed.name)?,
            None => writeln!(out, "? {}", listed.name)?,
        }
    }
    if let Some(head) = &listing.head {
        writeln!(out, "@{head} HEAD")?;
    }
    writeln!(out)?;
    out.flush()
}

pub fn write_push_report(out: &mut impl Write, report: &PushReport) -> io::Result<()> {
    for result in &report.results {
        let dst = &result.push.dst;
        match &result.outcome {
            RefOutcome::Error(reason) => writeln!(out, "error {dst} {reason}")?,
            _ if report.aborted => writeln!(out, "error {dst} {ABORTED_REASON}")?,
            RefOutcome::NoChange(_) | RefOutcome::Success(_) => writeln!(out, "ok {dst}")?,
        }
    }
    writeln!(out)?;
    out.flush()
}

/// Every ref of a push that failed as a whole.
pub fn write_push_failure(out: &mut impl Write, refs: &[PushRef], reason: &str) -> io::Result<()> {
    let reason = reason.replace('\n', " ");
    for push in refs {
        writeln!(out, "error {} {reason}", push.dst)?;
    }
    writeln!(out)?;
    out.flush()
}

pub fn write_fetch_done(out: &mut impl Write) -> io::Result<()> {
    writeln!(out)?;
    out.flush()
}

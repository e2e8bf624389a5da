//! Command/response framing over a debugger's byte streams.
//!
//! Interactive debuggers have no structured response protocol, so a
//! response is considered complete when a line contains one of the
//! prompt markers. This is a heuristic: command output that happens to
//! contain a marker (for example the `=>` cursor in a source listing when
//! `>` is a marker) ends the response early. The remainder of that output
//! then shows up in front of the next response.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::output::OutputSanitizer;
use crate::Result;

/// Prompt substrings printed by `dlv` when it is ready for input.
pub const DEFAULT_PROMPT_MARKERS: [&str; 2] = ["(dlv)", ">"];

const READ_CHUNK: usize = 4096;

/// How a response ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEnd {
    /// A prompt marker was seen.
    Prompt,
    /// The wait elapsed first; the output is partial.
    TimedOut,
    /// The debugger closed its output stream.
    Closed,
}

/// One framed response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Lines collected for this response, ANSI sequences removed.
    pub lines: Vec<String>,
    /// Why collection stopped.
    pub end: FrameEnd,
}

impl Frame {
    fn new(lines: Vec<String>, end: FrameEnd) -> Self {
        Self { lines, end }
    }

    /// Output text, one line per collected line.
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Whether the wait elapsed before a prompt appeared.
    pub fn timed_out(&self) -> bool {
        self.end == FrameEnd::TimedOut
    }
}

/// Splits a byte stream into prompt-terminated responses.
///
/// Bytes read past the end of a response are kept for the next one.
#[derive(Debug, Clone)]
pub struct Framer {
    markers: Vec<String>,
    pending: Vec<u8>,
}

impl Framer {
    /// Create a framer recognising the given prompt markers.
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(Into::into)
                .filter(|m: &String| !m.is_empty())
                .collect(),
            pending: Vec::new(),
        }
    }

    /// Whether `line` contains a prompt marker.
    pub fn is_prompt(&self, line: &str) -> bool {
        self.markers.iter().any(|m| line.contains(m.as_str()))
    }

    /// Write `command` plus a line terminator, then collect the response.
    pub async fn send_and_wait<W, R>(
        &mut self,
        writer: &mut W,
        reader: &mut R,
        command: &str,
        timeout: Duration,
    ) -> Result<Frame>
    where
        W: AsyncWrite + Unpin + ?Sized,
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut line = String::with_capacity(command.len() + 1);
        line.push_str(command);
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        trace!(command, "command written");

        self.read_response(reader, timeout).await
    }

    /// Collect lines until a prompt marker appears or `timeout` elapses.
    pub async fn read_response<R>(&mut self, reader: &mut R, timeout: Duration) -> Result<Frame>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let deadline = Instant::now() + timeout;
        let mut lines = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = self.pending.drain(..=pos).collect();
                let line = clean_line(&raw);
                let done = self.is_prompt(&line);
                lines.push(line);
                if done {
                    return Ok(Frame::new(lines, FrameEnd::Prompt));
                }
            }

            // The real prompt is printed without a trailing newline.
            if !self.pending.is_empty() {
                let partial = clean_line(&self.pending);
                if self.is_prompt(&partial) {
                    self.pending.clear();
                    lines.push(partial);
                    return Ok(Frame::new(lines, FrameEnd::Prompt));
                }
            }

            match tokio::time::timeout_at(deadline, reader.read(&mut chunk)).await {
                Err(_) => {
                    debug!(lines = lines.len(), "no prompt before deadline");
                    self.take_partial(&mut lines);
                    return Ok(Frame::new(lines, FrameEnd::TimedOut));
                }
                Ok(Ok(0)) => {
                    debug!("debugger output closed");
                    self.take_partial(&mut lines);
                    return Ok(Frame::new(lines, FrameEnd::Closed));
                }
                Ok(Ok(n)) => self.pending.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Read whatever the debugger prints until it stays quiet for `quiet`,
    /// `limit` elapses, or the stream ends. Used to consume a startup banner.
    pub async fn drain<R>(&mut self, reader: &mut R, quiet: Duration, limit: Duration) -> String
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let deadline = Instant::now() + limit;
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            let wait_until = (Instant::now() + quiet).min(deadline);
            match tokio::time::timeout_at(wait_until, reader.read(&mut chunk)).await {
                Ok(Ok(n)) if n > 0 => self.pending.extend_from_slice(&chunk[..n]),
                Ok(Ok(_)) | Err(_) => break,
                Ok(Err(e)) => {
                    debug!(error = %e, "read error while draining banner");
                    break;
                }
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        let text = OutputSanitizer::strip_ansi(&self.pending);
        self.pending.clear();
        text.trim_end().to_string()
    }

    fn take_partial(&mut self, lines: &mut Vec<String>) {
        if !self.pending.is_empty() {
            lines.push(clean_line(&self.pending));
            self.pending.clear();
        }
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_MARKERS)
    }
}

fn clean_line(raw: &[u8]) -> String {
    OutputSanitizer::strip_ansi(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright © 2024 RemasteredArch
//
// This file is part of mail_gateway.
//
// mail_gateway is free software: you can redistribute it and/or modify it under the terms of the
// GNU Affero General Public License as published by the Free Software Foundation, either version
// 3 of the License, or (at your option) any later version.
//
// mail_gateway is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See
// the GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License along with
// mail_gateway. If not, see <https://www.gnu.org/licenses/>.

//! Reading lines from a client, and deciding when a session ends.
//!
//! See [`LineReader`].


use std::{io::ErrorKind, time::Duration};

use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt},
    time::error::Elapsed,
};

/// Yields one line at a time from a client, never buffering more than `max_len` bytes of it.
pub struct LineReader<R> {
    reader: R,
    max_len: usize,
}

impl<R: AsyncBufRead + Unpin> LineReader<R> {
    /// `max_len` counts the line ending.
    #[must_use]
    pub const fn new(reader: R, max_len: usize) -> Self {
        Self { reader, max_len }
    }

    /// Read the next line, giving up after `timeout`.
    ///
    /// A line longer than `max_len` is read to its end and discarded, so that the next call
    /// starts on a fresh line.
    ///
    /// A reset or aborted connection counts as [`Line::Closed`], the same as the end of the
    /// stream.
    ///
    /// # Errors
    ///
    /// Any other errors that could come out of the supplied reader.
    pub async fn next_line(&mut self, timeout: Duration) -> std::io::Result<Line> {
        match tokio::time::timeout(timeout, self.read_line()).await {
            Ok(Err(err)) if is_disconnect(&err) => Ok(Line::Closed),
            Ok(line) => line,
            Err(elapsed) => Ok(Line::TimedOut(elapsed)),
        }
    }

    async fn read_line(&mut self) -> std::io::Result<Line> {
        let mut buffer = Vec::new();
        self.read_bounded(&mut buffer).await?;

        if buffer.is_empty() {
            return Ok(Line::Closed);
        }

        if buffer.ends_with(b"\n") {
            return Ok(Line::Complete(buffer));
        }

        // Ran out of input partway through a line.
        if buffer.len() < self.max_len {
            return Ok(Line::Closed);
        }

        // Skip the rest of the line.
        while !buffer.is_empty() && !buffer.ends_with(b"\n") {
            buffer.clear();
            self.read_bounded(&mut buffer).await?;
        }

        if buffer.is_empty() {
            Ok(Line::Closed)
        } else {
            Ok(Line::Oversized)
        }
    }

    async fn read_bounded(&mut self, buffer: &mut Vec<u8>) -> std::io::Result<usize> {
        let limit = u64::try_from(self.max_len).unwrap_or(u64::MAX);

        (&mut self.reader).take(limit).read_until(b'\n', buffer).await
    }
}

/// Whether a read failed because the client went away.
fn is_disconnect(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
    )
}

/// The outcome of waiting for a line from a client.
#[derive(PartialEq, Eq, Debug)]
pub enum Line {
    /// A full line, including its line ending.
    Complete(Vec<u8>),
    /// A line longer than the limit, which was discarded.
    Oversized,
    /// The client closed the connection.
    Closed,
    /// More time [`Elapsed`] than the timeout allowed.
    TimedOut(Elapsed),
}

/// Indicates if and why a connection should be closed.
#[derive(PartialEq, Eq, Debug)]
pub enum ShouldClose {
    /// The connection should be kept open.
    Keep,
    /// The connection should be closed because [`CloseReason`].
    Close(CloseReason),
}

/// Indicates why a connection was closed.
#[derive(PartialEq, Eq, Debug)]
pub enum CloseReason {
    /// The client requested to quit the session.
    Quit,
    /// More time [`Elapsed`] than the session's timeout passed without a line from the client.
    TimedOut(Elapsed),
    /// The connection was ended by the client.
    ClosedByClient,
}

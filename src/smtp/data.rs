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

//! Reading the content of a message after `DATA`.
//!
//! [RFC 5321 section 4.1.1.4](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.1.1.4).

use thiserror::Error;
use tokio::{io::AsyncBufRead, time::error::Elapsed};

use crate::{
    config::Config,
    connection::{Line, LineReader},
    str::is_terminator,
};

/// How reading a message ended.
#[derive(PartialEq, Eq, Debug)]
pub enum DataOutcome {
    /// Every line before the terminator, line endings included.
    Message(Vec<u8>),
    /// The message was read up to the terminator, but broke a limit and was thrown away.
    Discarded(Discarded),
    /// The client closed the connection before the terminator.
    Closed,
    TimedOut(Elapsed),
}

/// Why a message was thrown away.
#[derive(Error, PartialEq, Eq, Debug, Copy, Clone)]
pub enum Discarded {
    #[error("Line exceeded max size")]
    LineTooLong,
    #[error("Message exceeded max size")]
    MessageTooLarge,
}

/// Read lines until one holding only `.`, keeping the rest verbatim.
///
/// Once a limit from `config` is broken, the remaining lines are still read (so that the client
/// and server agree on where the message ends) but not kept.
///
/// # Errors
///
/// Any errors that could come out of the supplied reader, other than the end of the stream.
pub async fn collect<R: AsyncBufRead + Unpin>(
    reader: &mut LineReader<R>,
    config: &Config,
) -> std::io::Result<DataOutcome> {
    let mut message = Vec::new();
    let mut discarded = None;

    loop {
        let line = match reader.next_line(config.smtp_timeout).await? {
            Line::Complete(line) => line,
            Line::Oversized => {
                discarded.get_or_insert(Discarded::LineTooLong);
                message = Vec::new();
                continue;
            }
            Line::Closed => return Ok(DataOutcome::Closed),
            Line::TimedOut(elapsed) => return Ok(DataOutcome::TimedOut(elapsed)),
        };

        if is_terminator(&line) {
            break;
        }

        if discarded.is_some() {
            continue;
        }

        if message.len().saturating_add(line.len()) > config.max_message_size {
            discarded = Some(Discarded::MessageTooLarge);
            message = Vec::new();
            continue;
        }

        message.extend_from_slice(&line);
    }

    if let Some(reason) = discarded {
        return Ok(DataOutcome::Discarded(reason));
    }

    Ok(DataOutcome::Message(message))
}

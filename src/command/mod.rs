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

//! Splits a line from a client into a command verb and its argument.
//!
//! See [`parse`].

use std::{fmt::Debug, ops::Range};

use ascii::{AsAsciiStr, AsciiString};
use thiserror::Error;

use crate::str::CRLF;


/// The shortest line that can hold a command: a four letter verb followed by [`CRLF`].
pub const MIN_LEN: usize = 4 + CRLF.len();

/// Parse a line, including its line ending, as a command.
///
/// The verb runs up to the first space (or the line ending) and is set to uppercase. The
/// argument is everything after the run of spaces that follows the verb, minus the line ending.
/// A line with nothing but spaces after the verb has no argument.
///
/// # Errors
///
/// Returns a [`CommandError`] if the line does not end with [`CRLF`], contains anything but
/// US-ASCII, is shorter than [`MIN_LEN`], or starts with a space.
pub fn parse(line: &[u8]) -> Result<Command, CommandError> {
    // RFC 5321 section 2.3.8 and RFC 1939 section 3 specify that lines ending with anything other
    // than `CRLF` must not be recognized.
    //
    // https://www.rfc-editor.org/rfc/rfc5321.html#section-2.3.8
    let Some(body) = line.strip_suffix(CRLF.as_bytes()) else {
        return Err(CommandError::NoTrailingCrlf);
    };

    // Both protocols are spoken in US-ASCII. Message content is only ever read by the `DATA`
    // collector, never through here.
    let Ok(body) = body.as_ascii_str() else {
        return Err(CommandError::InvalidCharacter);
    };

    if line.len() < MIN_LEN {
        return Err(CommandError::TooShort);
    }

    let mut line = body.to_ascii_string();
    let text = line.as_str();

    let verb_end = text.find(' ').unwrap_or(text.len());
    if verb_end == 0 {
        return Err(CommandError::MissingVerb);
    }
    let verb = 0..verb_end;

    // `None` if there is nothing but spaces after the verb.
    let argument = text[verb_end..]
        .find(|c: char| c != ' ')
        .map(|offset| verb_end + offset..text.len());

    // Make the command verb uppercase for standardized comparison.
    //
    // Note that arguments (usernames, passwords, the local part of an address) may be case
    // sensitive, so they are not touched.
    line[verb.clone()].make_ascii_uppercase();

    Ok(Command {
        line,
        verb,
        argument,
    })
}

/// One line of a command from a client, without its line ending.
#[derive(PartialEq, Eq, Clone)]
pub struct Command {
    /// The entire line, unmodified except for the [`Self::verb`] range being set to uppercase.
    line: AsciiString,
    /// The range over [`Self::line`] containing the verb of the command.
    verb: Range<usize>,
    /// The range over [`Self::line`] containing the argument of the command, if there is one.
    argument: Option<Range<usize>>,
}

impl Command {
    /// Get the verb of the command as an uppercase string slice.
    #[must_use]
    pub fn verb(&self) -> &str {
        self.get(&self.verb)
    }

    /// Get the argument of the command, with the spaces before it trimmed.
    #[must_use]
    pub fn argument(&self) -> Option<&str> {
        let range = self.argument.as_ref()?;

        Some(self.get(range))
    }

    /// Get a range of the internal [`AsciiString`] as a string slice.
    fn get(&self, range: &Range<usize>) -> &str {
        self.line[range.clone()].as_str()
    }
}

impl Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("line", &self.line)
            .field("verb", &self.verb)
            .field("verb()", &self.verb())
            .field("argument", &self.argument)
            .field("argument()", &self.argument())
            .finish()
    }
}

/// Possible error states encountered when trying to convert a line into a [`Command`].
#[derive(Error, PartialEq, Eq, Debug, Copy, Clone)]
pub enum CommandError {
    #[error("no trailing CRLF")]
    NoTrailingCrlf,
    #[error("invalid character")]
    InvalidCharacter,
    #[error("command too short")]
    TooShort,
    #[error("line starts with whitespace")]
    MissingVerb,
}

/// A verb that isn't part of the protocol being spoken.
#[derive(Error, PartialEq, Eq, Debug, Copy, Clone)]
#[error("command not recognized")]
pub struct UnknownVerb;

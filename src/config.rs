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

//! Settings shared by every session a server runs.

use std::time::Duration;

use crate::timeouts;

/// The host name used when the embedder doesn't supply one.
pub const DEFAULT_HOSTNAME: &str = "localhost";

/// The longest line accepted from a client, in bytes, including its line ending.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// The largest message accepted through SMTP `DATA`, in bytes.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Settings for POP3 and SMTP sessions.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Config {
    /// The name the server greets clients with, and which prefixes SMTP replies.
    pub hostname: String,
    /// Lines longer than this, in bytes and including the line ending, are rejected.
    pub max_line_length: usize,
    /// Messages longer than this, in bytes, are rejected at the end of `DATA`.
    pub max_message_size: usize,
    /// How long an SMTP session waits for the next line.
    pub smtp_timeout: Duration,
    /// How long a POP3 session waits for the next command.
    pub pop3_timeout: Duration,
}

impl Config {
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hostname: DEFAULT_HOSTNAME.to_owned(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            smtp_timeout: timeouts::SERVER_TIMEOUT,
            pop3_timeout: timeouts::POP3_AUTOLOGOUT,
        }
    }
}

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

//! Reply lines for both protocols.
//!
//! Replies implement [`Display`] without a trailing line ending; writers append [`CRLF`].
//!
//! [`CRLF`]: crate::str::CRLF

use std::{borrow::Cow, fmt::Display};

/// The status indicator a POP3 reply starts with.
///
/// [RFC 1939 section 3](https://www.rfc-editor.org/rfc/rfc1939.html#section-3).
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Status {
    Ok,
    Err,
}

impl Status {
    #[must_use]
    pub const fn indicator(self) -> &'static str {
        match self {
            Self::Ok => "+OK",
            Self::Err => "-ERR",
        }
    }
}

/// A single-line POP3 reply, such as `+OK 2 320`.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct Pop3Reply {
    status: Status,
    text: Cow<'static, str>,
}

impl Pop3Reply {
    #[must_use]
    pub fn ok(text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status: Status::Ok,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn err(text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            status: Status::Err,
            text: text.into(),
        }
    }
}

impl Display for Pop3Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.status.indicator())?;

        if self.text.is_empty() {
            Ok(())
        } else {
            write!(f, " {}", self.text)
        }
    }
}

/// Reply codes from [RFC 5321 section 4.2](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.2)
/// that the SMTP engine sends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u16)]
pub enum Code {
    ServiceReady = 220,
    ServiceClosing = 221,
    Ok = 250,
    StartMailInput = 354,
    ActionAborted = 451,
    CommandSyntaxError = 500,
    ParameterSyntaxError = 501,
    CommandNotImplemented = 502,
    BadSequenceOfCommands = 503,
    ActionNotTakenPermanent = 550,
    ExceededStorageAllocation = 552,
    MailOrRecipientParametersNotKnown = 555,
}

impl Code {
    #[must_use]
    pub const fn value(self) -> u16 {
        self as u16
    }
}

/// A single-line SMTP reply, such as `250 example.com Sender OK`.
///
/// Replies made with [`Self::with_host`] name the server between the code and the text.
#[derive(PartialEq, Eq, Debug, Clone)]
pub struct SmtpReply {
    code: Code,
    host: Option<String>,
    text: Cow<'static, str>,
}

impl SmtpReply {
    #[must_use]
    pub fn new(code: Code, text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            host: None,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn with_host(code: Code, host: &str, text: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            host: Some(host.to_owned()),
            text: text.into(),
        }
    }

    /// A `500 Syntax error - {detail}` reply.
    #[must_use]
    pub fn syntax_error(detail: impl Display) -> Self {
        Self::new(Code::CommandSyntaxError, format!("Syntax error - {detail}"))
    }
}

impl Display for SmtpReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code.value())?;

        if let Some(host) = &self.host {
            write!(f, " {host}")?;
        }

        write!(f, " {}", self.text)
    }
}

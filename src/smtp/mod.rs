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

//! SMTP sessions, per [RFC 5321](https://www.rfc-editor.org/rfc/rfc5321.html), limited to plain
//! `HELO` and no extensions.
//!
//! [`Session`] is the command state machine. [`handle`] runs one over a connection and hands the
//! `DATA` phase to [`data::collect`].

mod commands;
pub mod data;
#[cfg(test)]
mod test;

use std::{fmt::Display, str::FromStr, sync::Arc};

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

use self::data::DataOutcome;
use crate::{
    command::{self, UnknownVerb},
    config::Config,
    connection::{CloseReason, Line, LineReader},
    error::Error,
    log_prefix::LogPrefix,
    reply::{Code, SmtpReply},
    store::MailStore,
    write_fmt_line,
};

/// Run an SMTP session over `stream` until the client quits, disconnects or times out.
///
/// # Errors
///
/// [`Error::Io`] if reading from or writing to `stream` fails.
pub async fn handle<T, S>(
    stream: T,
    store: Arc<S>,
    config: &Config,
    log_prefix: LogPrefix,
) -> Result<CloseReason, Error>
where
    T: AsyncRead + AsyncWrite,
    S: MailStore,
{
    let (read_stream, mut write_stream) = tokio::io::split(stream);
    let mut reader = LineReader::new(BufReader::new(read_stream), config.max_line_length);
    let mut session = Session::new(store, &config.hostname, log_prefix);

    write_fmt_line!(write_stream, "{}", greeting(&config.hostname))?;

    let close_reason = loop {
        let line = match reader.next_line(config.smtp_timeout).await? {
            Line::Complete(line) => line,
            Line::Oversized => {
                warn!("{} Command line too long", session.log_prefix);
                write_fmt_line!(write_stream, "{}", SmtpReply::syntax_error("line too long"))?;
                continue;
            }
            Line::Closed => break CloseReason::ClosedByClient,
            Line::TimedOut(elapsed) => break CloseReason::TimedOut(elapsed),
        };

        let response = session.execute(&line);
        write_fmt_line!(write_stream, "{}", response.reply)?;

        match response.next {
            Next::Command => (),
            Next::Close(reason) => break reason,
            Next::Data => {
                let reply = match data::collect(&mut reader, config).await? {
                    DataOutcome::Message(message) => session.deliver(&message),
                    DataOutcome::Discarded(reason) => session.discard(reason),
                    DataOutcome::Closed => break CloseReason::ClosedByClient,
                    DataOutcome::TimedOut(elapsed) => break CloseReason::TimedOut(elapsed),
                };

                write_fmt_line!(write_stream, "{}", reply)?;
            }
        }
    };

    info!("{} Session closed ({close_reason:?})", session.log_prefix);
    Ok(close_reason)
}

/// The reply sent when a client connects.
#[must_use]
pub fn greeting(hostname: &str) -> SmtpReply {
    SmtpReply::with_host(Code::ServiceReady, hostname, "service ready")
}

/// The commands an SMTP session recognizes, implemented or not.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Verb {
    Helo,
    Ehlo,
    Mail,
    Rcpt,
    Data,
    Rset,
    Noop,
    Quit,
    Vrfy,
    Expn,
    Help,
}

impl Verb {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Helo => "HELO",
            Self::Ehlo => "EHLO",
            Self::Mail => "MAIL",
            Self::Rcpt => "RCPT",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
            Self::Vrfy => "VRFY",
            Self::Expn => "EXPN",
            Self::Help => "HELP",
        }
    }

    /// Whether the session does anything with the command besides a `502` reply.
    #[must_use]
    pub const fn is_implemented(self) -> bool {
        !matches!(
            self,
            Self::Ehlo | Self::Rset | Self::Vrfy | Self::Expn | Self::Help
        )
    }

    /// Whether the command may be issued in `phase`. Never true for unimplemented commands.
    #[must_use]
    pub const fn is_legal_in(self, phase: Phase) -> bool {
        match self {
            Self::Noop | Self::Quit => true,
            Self::Helo => matches!(phase, Phase::AwaitingHelo),
            Self::Mail => matches!(phase, Phase::AwaitingMail),
            Self::Rcpt => matches!(phase, Phase::AwaitingRecipients | Phase::ReadyForData),
            Self::Data => matches!(phase, Phase::ReadyForData),
            Self::Ehlo | Self::Rset | Self::Vrfy | Self::Expn | Self::Help => false,
        }
    }
}

impl FromStr for Verb {
    type Err = UnknownVerb;

    /// Expects an uppercase verb, as produced by [`command::parse`].
    fn from_str(verb: &str) -> Result<Self, Self::Err> {
        Ok(match verb {
            "HELO" => Self::Helo,
            "EHLO" => Self::Ehlo,
            "MAIL" => Self::Mail,
            "RCPT" => Self::Rcpt,
            "DATA" => Self::Data,
            "RSET" => Self::Rset,
            "NOOP" => Self::Noop,
            "QUIT" => Self::Quit,
            "VRFY" => Self::Vrfy,
            "EXPN" => Self::Expn,
            "HELP" => Self::Help,
            _ => return Err(UnknownVerb),
        })
    }
}

impl Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a session is up to, as far as which commands it accepts.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Phase {
    /// The client has yet to send `HELO`.
    AwaitingHelo,
    /// Greeted, with no transaction underway.
    AwaitingMail,
    /// A sender was given, but no recipient yet.
    AwaitingRecipients,
    /// At least one recipient was given, so `DATA` may follow.
    ReadyForData,
}

/// Where a mail transaction is up to.
#[derive(PartialEq, Eq, Debug, Default, Copy, Clone)]
pub enum MailState {
    /// Waiting for `MAIL FROM`.
    #[default]
    AwaitingMail,
    /// A sender was given; waiting for `RCPT TO` or, once there is a recipient, `DATA`.
    AwaitingRecipients,
}

/// One `MAIL`, `RCPT`..., `DATA` sequence.
#[derive(PartialEq, Eq, Debug, Default, Clone)]
pub struct Transaction {
    pub state: MailState,
    pub sender: Option<String>,
    /// In the order given, duplicates included.
    pub recipients: Vec<String>,
}

/// What the connection does after a reply.
#[derive(PartialEq, Eq, Debug)]
pub enum Next {
    /// Read the next command.
    Command,
    /// Read the message content, see [`data::collect`].
    Data,
    Close(CloseReason),
}

#[derive(Debug)]
pub struct Response {
    pub reply: SmtpReply,
    pub next: Next,
}

impl Response {
    const fn command(reply: SmtpReply) -> Self {
        Self {
            reply,
            next: Next::Command,
        }
    }
}

/// The state of one SMTP session.
pub struct Session<S: MailStore> {
    store: Arc<S>,
    hostname: String,
    /// The name given by `HELO`. Mail commands are refused until it is set.
    helo: Option<String>,
    transaction: Transaction,
    log_prefix: LogPrefix,
}

impl<S: MailStore> Session<S> {
    #[must_use]
    pub fn new(store: Arc<S>, hostname: &str, log_prefix: LogPrefix) -> Self {
        Self {
            store,
            hostname: hostname.to_owned(),
            helo: None,
            transaction: Transaction::default(),
            log_prefix,
        }
    }

    #[must_use]
    pub fn helo(&self) -> Option<&str> {
        self.helo.as_deref()
    }

    #[must_use]
    pub const fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Derived from the `HELO` name and the current transaction.
    #[must_use]
    pub fn phase(&self) -> Phase {
        if self.helo.is_none() {
            return Phase::AwaitingHelo;
        }

        match self.transaction.state {
            MailState::AwaitingMail => Phase::AwaitingMail,
            MailState::AwaitingRecipients if self.transaction.recipients.is_empty() => {
                Phase::AwaitingRecipients
            }
            MailState::AwaitingRecipients => Phase::ReadyForData,
        }
    }

    /// Respond to one command line from the client, including its line ending.
    pub fn execute(&mut self, line: &[u8]) -> Response {
        let command = match command::parse(line) {
            Ok(command) => command,
            Err(err) => {
                warn!("{} Malformed command: {err}", self.log_prefix);
                return Response::command(SmtpReply::syntax_error(err));
            }
        };

        let Ok(verb) = command.verb().parse::<Verb>() else {
            warn!(
                "{} Unrecognized command {:?}",
                self.log_prefix,
                command.verb()
            );
            return Response::command(SmtpReply::new(
                Code::CommandSyntaxError,
                "Command not recognized",
            ));
        };
        debug!("{} Received {verb}", self.log_prefix);

        if !verb.is_implemented() {
            return Response::command(SmtpReply::new(
                Code::CommandNotImplemented,
                "Command not implemented",
            ));
        }

        let phase = self.phase();
        if !verb.is_legal_in(phase) {
            let text = if phase == Phase::AwaitingHelo {
                "Bad sequence of commands - send HELO first"
            } else {
                "Bad sequence of commands"
            };

            return Response::command(SmtpReply::new(Code::BadSequenceOfCommands, text));
        }

        let argument = command.argument();
        match verb {
            Verb::Helo => Response::command(self.hello(argument)),
            Verb::Mail => Response::command(self.mail(argument)),
            Verb::Rcpt => Response::command(self.rcpt(argument)),
            Verb::Data => Self::data(argument),
            Verb::Noop => Response::command(self.reply(Code::Ok, "OK")),
            Verb::Quit => self.quit(argument),
            Verb::Ehlo | Verb::Rset | Verb::Vrfy | Verb::Expn | Verb::Help => {
                unreachable!("unimplemented commands are never legal")
            }
        }
    }

    /// A reply naming this server.
    fn reply(&self, code: Code, text: impl Into<std::borrow::Cow<'static, str>>) -> SmtpReply {
        SmtpReply::with_host(code, &self.hostname, text)
    }
}

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

//! POP3 sessions, per [RFC 1939](https://www.rfc-editor.org/rfc/rfc1939.html).
//!
//! [`Session`] is the state machine, fed one line at a time. [`handle`] runs one over a
//! connection.

mod commands;

use std::{fmt::Display, str::FromStr, sync::Arc};

use log::{debug, info, warn};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{
    command::{self, UnknownVerb},
    config::Config,
    connection::{CloseReason, Line, LineReader, ShouldClose},
    error::Error,
    log_prefix::LogPrefix,
    reply::Pop3Reply,
    store::{MailStore, MailboxHandle},
    write_fmt_line,
};

/// Run a POP3 session over `stream` until the client quits, disconnects or times out.
///
/// Deletions are only applied when the client quits from the TRANSACTION state. On every other
/// way out the mailbox is released untouched.
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
    let mut session = Session::new(store, log_prefix);

    write_fmt_line!(write_stream, "{}", greeting(&config.hostname))?;

    let close_reason = loop {
        let line = match reader.next_line(config.pop3_timeout).await? {
            Line::Complete(line) => line,
            Line::Oversized => {
                warn!("{} Command line too long", session.log_prefix);
                write_fmt_line!(write_stream, "{}", Pop3Reply::err("Command is too long"))?;
                continue;
            }
            Line::Closed => break CloseReason::ClosedByClient,
            Line::TimedOut(elapsed) => break CloseReason::TimedOut(elapsed),
        };

        let response = session.execute(&line);
        response.write_to(&mut write_stream).await?;

        if let ShouldClose::Close(reason) = response.close {
            break reason;
        }
    };

    info!("{} Session closed ({close_reason:?})", session.log_prefix);
    Ok(close_reason)
}

/// The reply sent when a client connects.
#[must_use]
pub fn greeting(hostname: &str) -> Pop3Reply {
    Pop3Reply::ok(format!("POP3 server ready for {hostname}"))
}

/// The states of a POP3 session.
///
/// [RFC 1939 section 3](https://www.rfc-editor.org/rfc/rfc1939.html#section-3).
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Phase {
    /// The client has yet to log in.
    Authorization,
    /// The client is logged in and holds its mailbox.
    Transaction,
    /// The client quit from [`Self::Transaction`] and its deletions were applied. Nothing follows.
    Update,
}

/// The commands a POP3 session understands.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Verb {
    User,
    Pass,
    Stat,
    List,
    Retr,
    Dele,
    Rset,
    Noop,
    Quit,
}

/// Whether a [`Verb`] takes an argument.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Arity {
    None,
    Optional,
    Required,
}

impl Verb {
    /// Whether the command may be issued in `phase`.
    #[must_use]
    pub const fn is_legal_in(self, phase: Phase) -> bool {
        match phase {
            Phase::Authorization => matches!(self, Self::User | Self::Pass | Self::Quit),
            Phase::Transaction => !matches!(self, Self::User | Self::Pass),
            Phase::Update => false,
        }
    }

    #[must_use]
    pub const fn arity(self) -> Arity {
        match self {
            Self::User | Self::Pass | Self::Retr | Self::Dele => Arity::Required,
            Self::List => Arity::Optional,
            Self::Stat | Self::Rset | Self::Noop | Self::Quit => Arity::None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Pass => "PASS",
            Self::Stat => "STAT",
            Self::List => "LIST",
            Self::Retr => "RETR",
            Self::Dele => "DELE",
            Self::Rset => "RSET",
            Self::Noop => "NOOP",
            Self::Quit => "QUIT",
        }
    }
}

impl FromStr for Verb {
    type Err = UnknownVerb;

    /// Expects an uppercase verb, as produced by [`command::parse`].
    fn from_str(verb: &str) -> Result<Self, Self::Err> {
        Ok(match verb {
            "USER" => Self::User,
            "PASS" => Self::Pass,
            "STAT" => Self::Stat,
            "LIST" => Self::List,
            "RETR" => Self::Retr,
            "DELE" => Self::Dele,
            "RSET" => Self::Rset,
            "NOOP" => Self::Noop,
            "QUIT" => Self::Quit,
            _ => return Err(UnknownVerb),
        })
    }
}

impl Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to send back for one command, and whether the session ends with it.
#[derive(Debug)]
pub struct Response {
    pub reply: Pop3Reply,
    /// The rest of a multi-line reply, already framed and terminated.
    pub body: Option<Vec<u8>>,
    pub close: ShouldClose,
}

impl Response {
    const fn keep(reply: Pop3Reply) -> Self {
        Self {
            reply,
            body: None,
            close: ShouldClose::Keep,
        }
    }

    const fn multiline(reply: Pop3Reply, body: Vec<u8>) -> Self {
        Self {
            reply,
            body: Some(body),
            close: ShouldClose::Keep,
        }
    }

    const fn quit(reply: Pop3Reply) -> Self {
        Self {
            reply,
            body: None,
            close: ShouldClose::Close(CloseReason::Quit),
        }
    }

    /// Write the reply line, then the body of a multi-line reply.
    ///
    /// # Errors
    ///
    /// [`std::io::Error`] from [`AsyncWriteExt::write_all`] on `write_stream`.
    pub async fn write_to<W: AsyncWrite + Unpin>(
        &self,
        write_stream: &mut W,
    ) -> std::io::Result<()> {
        write_fmt_line!(*write_stream, "{}", self.reply)?;

        if let Some(body) = &self.body {
            write_stream.write_all(body).await?;
        }

        Ok(())
    }
}

/// The state of one POP3 session.
///
/// The mailbox is held from a successful `PASS` until the session ends. It is committed on the
/// way into [`Phase::Update`], which is terminal, so only [`Phase::Transaction`] holds one.
pub struct Session<S: MailStore> {
    store: Arc<S>,
    phase: Phase,
    /// The name accepted by `USER`, kept once logged in.
    username: Option<String>,
    mailbox: Option<MailboxHandle<S>>,
    log_prefix: LogPrefix,
}

impl<S: MailStore> Session<S> {
    #[must_use]
    pub const fn new(store: Arc<S>, log_prefix: LogPrefix) -> Self {
        Self {
            store,
            phase: Phase::Authorization,
            username: None,
            mailbox: None,
            log_prefix,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    #[must_use]
    pub const fn has_mailbox(&self) -> bool {
        self.mailbox.is_some()
    }

    /// Respond to one line from the client, including its line ending.
    pub fn execute(&mut self, line: &[u8]) -> Response {
        let command = match command::parse(line) {
            Ok(command) => command,
            Err(err) => {
                warn!("{} Malformed command: {err}", self.log_prefix);
                return Response::keep(Pop3Reply::err(format!("Syntax error - {err}")));
            }
        };

        let Ok(verb) = command.verb().parse::<Verb>() else {
            warn!(
                "{} Unrecognized command {:?}",
                self.log_prefix,
                command.verb()
            );
            return Response::keep(Pop3Reply::err("Command not recognized"));
        };
        debug!("{} Received {verb}", self.log_prefix);

        if !verb.is_legal_in(self.phase) {
            return Response::keep(Pop3Reply::err(format!("{verb} not valid in this state")));
        }

        // Trailing spaces would otherwise end up in message numbers and usernames.
        let argument = command.argument().map(str::trim_end);
        match (verb.arity(), argument) {
            (Arity::None, Some(_)) => {
                return Response::keep(Pop3Reply::err(format!(
                    "Syntax error - {verb} takes no arguments"
                )));
            }
            (Arity::Required, None) => {
                return Response::keep(Pop3Reply::err(format!(
                    "Syntax error - {verb} requires an argument"
                )));
            }
            _ => (),
        }

        match (verb, argument) {
            (Verb::User, Some(name)) => self.user(name),
            (Verb::Pass, Some(secret)) => self.pass(secret),
            (Verb::Quit, _) => self.quit(),
            (verb, argument) => {
                let Some(mailbox) = self.mailbox.as_mut() else {
                    return Response::keep(Pop3Reply::err(format!(
                        "{verb} not valid in this state"
                    )));
                };

                commands::transaction(&mut **mailbox, verb, argument)
            }
        }
    }
}

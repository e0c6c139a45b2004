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

use std::fmt::Write;

use log::{debug, error, info, warn};

use super::{Phase, Response, Session, Verb};
use crate::{
    reply::Pop3Reply,
    store::{MailItem, MailStore, Mailbox, MailboxHandle},
    str::{frame_multiline, CRLF, TERMINATOR},
};

impl<S: MailStore> Session<S> {
    /// `USER name`: remember a known username for the following `PASS`.
    pub(super) fn user(&mut self, name: &str) -> Response {
        if self.username.is_some() {
            return Response::keep(Pop3Reply::err("User already specified, send PASS"));
        }

        if !self.store.validate_credentials(name, None) {
            warn!("{} Unknown user {name:?}", self.log_prefix);
            return Response::keep(Pop3Reply::err("No such user"));
        }

        self.username = Some(name.to_owned());
        Response::keep(Pop3Reply::ok("User accepted, send PASS"))
    }

    /// `PASS secret`: log in as the user named by `USER` and open their mailbox.
    ///
    /// Any failure forgets the username, so the client has to start over with `USER`.
    pub(super) fn pass(&mut self, secret: &str) -> Response {
        let Some(username) = self.username.take() else {
            return Response::keep(Pop3Reply::err("Send USER first"));
        };

        if !self.store.validate_credentials(&username, Some(secret)) {
            warn!("{} Failed login as {username:?}", self.log_prefix);
            return Response::keep(Pop3Reply::err("Invalid password"));
        }

        let mailbox = match MailboxHandle::open(&self.store, &username) {
            Ok(mailbox) => mailbox,
            Err(err) => {
                error!(
                    "{} Unable to open mailbox of {username:?}: {err}",
                    self.log_prefix
                );
                return Response::keep(Pop3Reply::err("Unable to open mailbox"));
            }
        };

        let reply = Pop3Reply::ok(format!("Mailbox ready, {}", summary(&*mailbox)));

        self.log_prefix.set_user(&username);
        info!("{} Logged in", self.log_prefix);

        self.username = Some(username);
        self.mailbox = Some(mailbox);
        self.phase = Phase::Transaction;

        Response::keep(reply)
    }

    /// `QUIT`: end the session, applying deletions if logged in.
    pub(super) fn quit(&mut self) -> Response {
        let signing_off = Pop3Reply::ok("POP3 server signing off");

        if self.phase != Phase::Transaction {
            return Response::quit(signing_off);
        }

        self.phase = Phase::Update;

        let Some(mailbox) = self.mailbox.take() else {
            return Response::quit(signing_off);
        };

        if let Err(err) = mailbox.commit() {
            error!("{} Failed to apply deletions: {err}", self.log_prefix);
            return Response::quit(Pop3Reply::err("Some deleted messages not removed"));
        }

        Response::quit(signing_off)
    }
}

/// Run a command that works on an open mailbox.
///
/// `argument` has already been checked against [`Verb::arity`].
pub(super) fn transaction<M: Mailbox + ?Sized>(
    mailbox: &mut M,
    verb: Verb,
    argument: Option<&str>,
) -> Response {
    let reply = match (verb, argument) {
        (Verb::Stat, _) => Ok(stat(mailbox)),
        (Verb::List, None) => return list_all(mailbox),
        (Verb::List, Some(number)) => list_one(mailbox, number),
        (Verb::Retr, Some(number)) => return retr(mailbox, number),
        (Verb::Dele, Some(number)) => dele(mailbox, number),
        (Verb::Rset, _) => Ok(rset(mailbox)),
        (Verb::Noop, _) => Ok(Pop3Reply::ok("")),
        (verb, _) => Err(Pop3Reply::err(format!("{verb} not valid in this state"))),
    };

    Response::keep(match reply {
        Ok(reply) | Err(reply) => reply,
    })
}

fn stat<M: Mailbox + ?Sized>(mailbox: &M) -> Pop3Reply {
    Pop3Reply::ok(format!("{} {}", mailbox.message_count(), mailbox.total_octets()))
}

fn list_all<M: Mailbox + ?Sized>(mailbox: &M) -> Response {
    let mut listing = String::new();

    for item in mailbox.live_messages() {
        // Writing into a `String` cannot fail.
        let _ = write!(listing, "{} {}{CRLF}", item.index, item.size);
    }

    let mut body = listing.into_bytes();
    body.extend_from_slice(TERMINATOR);

    Response::multiline(Pop3Reply::ok(summary(mailbox)), body)
}

fn list_one<M: Mailbox + ?Sized>(mailbox: &M, number: &str) -> Result<Pop3Reply, Pop3Reply> {
    let item = live_message(mailbox, number)?;

    Ok(Pop3Reply::ok(format!("{} {}", item.index, item.size)))
}

fn retr<M: Mailbox + ?Sized>(mailbox: &M, number: &str) -> Response {
    let item = match live_message(mailbox, number) {
        Ok(item) => item,
        Err(reply) => return Response::keep(reply),
    };

    let body = match mailbox.body(item.index - 1) {
        Ok(body) => body,
        Err(err) => {
            error!("Failed to read message {}: {err}", item.index);
            return Response::keep(Pop3Reply::err("Unable to read message"));
        }
    };

    Response::multiline(
        Pop3Reply::ok(format!("{} octets", item.size)),
        frame_multiline(&body),
    )
}

fn dele<M: Mailbox + ?Sized>(mailbox: &mut M, number: &str) -> Result<Pop3Reply, Pop3Reply> {
    let item = live_message(mailbox, number)?;

    if !mailbox.mark_deleted(item.index - 1) {
        return Err(no_such_message());
    }
    debug!("Marked message {} as deleted", item.index);

    Ok(Pop3Reply::ok(format!("Message {} marked as deleted", item.index)))
}

fn rset<M: Mailbox + ?Sized>(mailbox: &mut M) -> Pop3Reply {
    mailbox.reset_deletions();

    Pop3Reply::ok(format!("Deletion marks cleared, {}", summary(mailbox)))
}

/// `N messages (M octets)`, counting only messages not marked as deleted.
fn summary<M: Mailbox + ?Sized>(mailbox: &M) -> String {
    format!(
        "{} messages ({} octets)",
        mailbox.message_count(),
        mailbox.total_octets()
    )
}

/// Look up a message by the 1-based number a client sent, refusing deleted messages.
fn live_message<M: Mailbox + ?Sized>(mailbox: &M, number: &str) -> Result<MailItem, Pop3Reply> {
    let number = number
        .parse::<u32>()
        .ok()
        .filter(|number| *number > 0)
        .ok_or_else(|| Pop3Reply::err("Invalid message number"))?;

    match mailbox.message(number - 1) {
        None => Err(no_such_message()),
        Some(item) if item.deleted => {
            Err(Pop3Reply::err(format!("message {number} already deleted")))
        }
        Some(item) => Ok(item),
    }
}

fn no_such_message() -> Pop3Reply {
    Pop3Reply::err("No such message")
}

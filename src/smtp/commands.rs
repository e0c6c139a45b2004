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

use log::{error, info, warn};

use super::{data::Discarded, MailState, Next, Response, Session, Transaction};
use crate::{
    address::{self, AddressError},
    connection::CloseReason,
    reply::{Code, SmtpReply},
    store::MailStore,
};

fn syntax_error() -> SmtpReply {
    SmtpReply::new(Code::ParameterSyntaxError, "Syntax error")
}

/// Strip a case-insensitive `prefix` such as `FROM:`, and any spaces after it.
fn strip_keyword<'a>(argument: &'a str, prefix: &str) -> Option<&'a str> {
    let head = argument.get(..prefix.len())?;

    head.eq_ignore_ascii_case(prefix)
        .then(|| argument[prefix.len()..].trim_start_matches(' '))
}

/// The reply for a path that failed to parse.
fn address_error(err: AddressError) -> SmtpReply {
    let code = match err {
        AddressError::ParametersNotImplemented => Code::MailOrRecipientParametersNotKnown,
        AddressError::TooShort
        | AddressError::TooLong
        | AddressError::MissingBrackets
        | AddressError::Malformed => Code::ParameterSyntaxError,
    };

    SmtpReply::new(code, err.to_string())
}

impl<S: MailStore> Session<S> {
    /// `HELO domain`: takes exactly one word.
    pub(super) fn hello(&mut self, argument: Option<&str>) -> SmtpReply {
        let domain = argument.map(str::trim).unwrap_or_default();
        if domain.is_empty() || domain.contains(' ') {
            return SmtpReply::new(Code::ParameterSyntaxError, "HELO requires a single name");
        }

        self.log_prefix.set_helo(domain);
        self.helo = Some(domain.to_owned());
        info!("{} Greeted", self.log_prefix);

        self.reply(Code::Ok, format!("Hello {domain}"))
    }

    pub(super) fn quit(&self, argument: Option<&str>) -> Response {
        if argument.is_some() {
            return Response::command(SmtpReply::new(
                Code::ParameterSyntaxError,
                "No parameters accepted for QUIT",
            ));
        }

        Response {
            reply: self.reply(Code::ServiceClosing, "closing connection"),
            next: Next::Close(CloseReason::Quit),
        }
    }

    /// `MAIL FROM:<reverse-path>`: start a transaction.
    pub(super) fn mail(&mut self, argument: Option<&str>) -> SmtpReply {
        let Some(path) = argument.and_then(|arg| strip_keyword(arg, "FROM:")) else {
            return syntax_error();
        };

        let sender = match address::parse_path(path) {
            Ok(sender) => sender,
            Err(err) => {
                warn!("{} Rejected sender: {err}", self.log_prefix);
                return address_error(err);
            }
        };

        self.transaction.sender = Some(sender);
        self.transaction.state = MailState::AwaitingRecipients;

        self.reply(Code::Ok, "Sender OK")
    }

    /// `RCPT TO:<forward-path>`: add a recipient the store knows of.
    pub(super) fn rcpt(&mut self, argument: Option<&str>) -> SmtpReply {
        let Some(path) = argument.and_then(|arg| strip_keyword(arg, "TO:")) else {
            return syntax_error();
        };

        let recipient = match address::parse_path(path) {
            Ok(recipient) => recipient,
            Err(err) => {
                warn!("{} Rejected recipient: {err}", self.log_prefix);
                return address_error(err);
            }
        };

        if !self.store.is_known_recipient(&recipient) {
            warn!("{} Unknown recipient {recipient:?}", self.log_prefix);
            return SmtpReply::new(Code::ActionNotTakenPermanent, "Mailbox not accepted");
        }

        self.transaction.recipients.push(recipient);

        self.reply(Code::Ok, "RCPT OK")
    }

    /// `DATA`: switch to reading the message.
    pub(super) fn data(argument: Option<&str>) -> Response {
        if argument.is_some() {
            return Response::command(SmtpReply::new(
                Code::ParameterSyntaxError,
                "No parameters accepted for DATA",
            ));
        }

        Response {
            reply: SmtpReply::new(
                Code::StartMailInput,
                "accepting data, end with <CRLF>.<CRLF>",
            ),
            next: Next::Data,
        }
    }

    /// Deliver a received message to every recipient, then start over with a new transaction.
    pub fn deliver(&mut self, message: &[u8]) -> SmtpReply {
        let transaction = std::mem::take(&mut self.transaction);

        if let Err(err) = self.store.deliver_message(message, &transaction.recipients) {
            error!("{} Failed to deliver message: {err}", self.log_prefix);

            return SmtpReply::new(
                Code::ActionAborted,
                "Requested action aborted: error in processing",
            );
        }

        info!(
            "{} Delivered {} octets from {:?} to {} recipients",
            self.log_prefix,
            message.len(),
            transaction.sender.as_deref().unwrap_or_default(),
            transaction.recipients.len()
        );

        self.reply(Code::Ok, "message successfully sent")
    }

    /// Give up on a message that broke a limit, then start over with a new transaction.
    pub fn discard(&mut self, reason: Discarded) -> SmtpReply {
        warn!("{} Discarded message: {reason}", self.log_prefix);
        self.transaction = Transaction::default();

        SmtpReply::new(
            Code::ExceededStorageAllocation,
            format!("{reason}, message discarded"),
        )
    }
}

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

//! Tests for [`super`].

use std::{error::Error, sync::Arc, time::Duration};

use tokio::io::BufReader;
use tokio_test::io::Builder;

use super::{data::Discarded, *};
use crate::test::counting_store::CountingStore;

type Result = std::result::Result<(), Box<dyn Error>>;

const HOST: &str = "mx.example.com";

fn session(store: &Arc<CountingStore>) -> Session<CountingStore> {
    Session::new(Arc::clone(store), HOST, LogPrefix::new("smtp"))
}

/// Run a line and render the reply.
fn reply(session: &mut Session<CountingStore>, line: &str) -> String {
    session.execute(line.as_bytes()).reply.to_string()
}

/// A session that has been through `HELO`, `MAIL` and one `RCPT`.
fn with_recipient(store: &Arc<CountingStore>) -> Session<CountingStore> {
    let mut session = session(store);
    reply(&mut session, "HELO client.example.org\r\n");
    reply(&mut session, "MAIL FROM:<sender@example.org>\r\n");
    reply(&mut session, "RCPT TO:<bob>\r\n");
    assert_eq!(session.transaction().recipients, ["bob"]);

    session
}

#[test]
fn test_verb_table() {
    assert_eq!("RCPT".parse::<Verb>(), Ok(Verb::Rcpt));
    assert_eq!("SEND".parse::<Verb>(), Err(UnknownVerb));

    assert!(Verb::Helo.is_legal_in(Phase::AwaitingHelo));
    assert!(!Verb::Helo.is_legal_in(Phase::AwaitingMail));
    assert!(!Verb::Mail.is_legal_in(Phase::AwaitingHelo));
    assert!(Verb::Mail.is_legal_in(Phase::AwaitingMail));
    assert!(!Verb::Mail.is_legal_in(Phase::ReadyForData));
    assert!(Verb::Rcpt.is_legal_in(Phase::AwaitingRecipients));
    assert!(Verb::Rcpt.is_legal_in(Phase::ReadyForData));
    assert!(!Verb::Data.is_legal_in(Phase::AwaitingRecipients));
    assert!(Verb::Data.is_legal_in(Phase::ReadyForData));
    assert!(Verb::Noop.is_legal_in(Phase::AwaitingHelo));
    assert!(Verb::Quit.is_legal_in(Phase::ReadyForData));

    for verb in [Verb::Ehlo, Verb::Rset, Verb::Vrfy, Verb::Expn, Verb::Help] {
        assert!(!verb.is_implemented());
        assert!(!verb.is_legal_in(Phase::AwaitingMail));
    }
}

#[test]
fn test_phases() -> Result {
    let store = Arc::new(CountingStore::with_mail()?);
    let mut session = session(&store);
    assert_eq!(session.phase(), Phase::AwaitingHelo);

    reply(&mut session, "HELO a\r\n");
    assert_eq!(session.phase(), Phase::AwaitingMail);
    reply(&mut session, "MAIL FROM:<a@x>\r\n");
    assert_eq!(session.phase(), Phase::AwaitingRecipients);
    reply(&mut session, "RCPT TO:<bob>\r\n");
    assert_eq!(session.phase(), Phase::ReadyForData);

    session.execute(b"DATA\r\n");
    session.deliver(b"Test\r\n");
    assert_eq!(session.phase(), Phase::AwaitingMail);

    Ok(())
}

#[test]
fn test_before_helo() -> Result {
    let store = Arc::new(CountingStore::with_mail()?);
    let mut session = session(&store);

    for line in ["MAIL FROM:<a@b>\r\n", "RCPT TO:<bob>\r\n", "DATA\r\n"] {
        assert_eq!(
            reply(&mut session, line),
            "503 Bad sequence of commands - send HELO first"
        );
    }
    assert_eq!(session.transaction(), &Transaction::default());

    for command in ["EHLO a", "RSET", "VRFY bob", "EXPN list", "HELP"] {
        let line = format!("{command}\r\n");
        assert_eq!(reply(&mut session, &line), "502 Command not implemented");
    }

    assert_eq!(reply(&mut session, "NOOP\r\n"), "250 mx.example.com OK");
    assert_eq!(
        reply(&mut session, "SEND x\r\n"),
        "500 Command not recognized"
    );
    assert_eq!(
        reply(&mut session, "HI\r\n"),
        "500 Syntax error - command too short"
    );
    assert_eq!(
        reply(&mut session, "HELO\r\n"),
        "501 HELO requires a single name"
    );
    assert_eq!(
        reply(&mut session, "HELO   \r\n"),
        "501 HELO requires a single name"
    );
    assert_eq!(
        reply(&mut session, "HELO a b\r\n"),
        "501 HELO requires a single name"
    );
    assert_eq!(session.helo(), None);

    assert_eq!(
        reply(&mut session, "helo a\r\n"),
        "250 mx.example.com Hello a"
    );
    assert_eq!(session.helo(), Some("a"));
    assert_eq!(
        reply(&mut session, "HELO a\r\n"),
        "503 Bad sequence of commands"
    );

    Ok(())
}

#[test]
fn test_mail_and_rcpt() -> Result {
    let store = Arc::new(CountingStore::with_mail()?);
    let mut session = session(&store);
    reply(&mut session, "HELO a\r\n");

    assert_eq!(
        reply(&mut session, "RCPT TO:<bob>\r\n"),
        "503 Bad sequence of commands"
    );
    assert_eq!(
        reply(&mut session, "DATA\r\n"),
        "503 Bad sequence of commands"
    );
    // The sequence is checked before the argument.
    assert_eq!(
        reply(&mut session, "DATA x\r\n"),
        "503 Bad sequence of commands"
    );

    assert_eq!(reply(&mut session, "MAIL\r\n"), "501 Syntax error");
    assert_eq!(reply(&mut session, "MAIL TO:<a@x>\r\n"), "501 Syntax error");
    assert_eq!(
        reply(&mut session, "MAIL FROM:a@x\r\n"),
        "501 Syntax error in address"
    );
    assert_eq!(
        reply(&mut session, "MAIL FROM:<a@x> SIZE=10\r\n"),
        "555 Mail parameters not implemented"
    );
    let long_sender = format!("MAIL FROM:<{}@x>\r\n", "a".repeat(65));
    assert_eq!(
        reply(&mut session, &long_sender),
        "501 Syntax error - address too long"
    );
    assert_eq!(session.transaction().state, MailState::AwaitingMail);

    assert_eq!(
        reply(&mut session, "mail from: <a@x>\r\n"),
        "250 mx.example.com Sender OK"
    );
    assert_eq!(session.transaction().sender.as_deref(), Some("a@x"));
    assert_eq!(
        reply(&mut session, "MAIL FROM:<a@x>\r\n"),
        "503 Bad sequence of commands"
    );

    assert_eq!(
        reply(&mut session, "DATA\r\n"),
        "503 Bad sequence of commands"
    );
    assert_eq!(
        reply(&mut session, "RCPT FROM:<bob>\r\n"),
        "501 Syntax error"
    );
    assert_eq!(
        reply(&mut session, "RCPT TO:<carol>\r\n"),
        "550 Mailbox not accepted"
    );
    assert!(session.transaction().recipients.is_empty());

    assert_eq!(
        reply(&mut session, "RCPT TO:<bob>\r\n"),
        "250 mx.example.com RCPT OK"
    );
    assert_eq!(
        reply(&mut session, "Rcpt To:<alice>\r\n"),
        "250 mx.example.com RCPT OK"
    );
    assert_eq!(
        reply(&mut session, "RCPT TO:<bob>\r\n"),
        "250 mx.example.com RCPT OK"
    );
    assert_eq!(session.transaction().recipients, ["bob", "alice", "bob"]);

    Ok(())
}

#[test]
fn test_data_and_delivery() -> Result {
    let store = Arc::new(CountingStore::with_mail()?);
    let mut session = with_recipient(&store);

    let response = session.execute(b"DATA x\r\n");
    assert_eq!(
        response.reply.to_string(),
        "501 No parameters accepted for DATA"
    );
    assert_eq!(response.next, Next::Command);

    let response = session.execute(b"DATA\r\n");
    assert_eq!(
        response.reply.to_string(),
        "354 accepting data, end with <CRLF>.<CRLF>"
    );
    assert_eq!(response.next, Next::Data);

    assert_eq!(
        session.deliver(b"Test\r\n").to_string(),
        "250 mx.example.com message successfully sent"
    );
    assert_eq!(store.deliveries(), 1);
    assert_eq!(store.inner.messages("bob")?.len(), 3);
    assert_eq!(session.transaction(), &Transaction::default());

    // The session is ready for another transaction.
    assert_eq!(
        reply(&mut session, "DATA\r\n"),
        "503 Bad sequence of commands"
    );
    assert_eq!(
        reply(&mut session, "MAIL FROM:<again@example.org>\r\n"),
        "250 mx.example.com Sender OK"
    );

    Ok(())
}

#[test]
fn test_delivery_once_per_recipient() -> Result {
    let store = Arc::new(CountingStore::with_mail()?);
    let mut session = with_recipient(&store);
    reply(&mut session, "RCPT TO:<alice>\r\n");
    reply(&mut session, "RCPT TO:<bob>\r\n");
    session.execute(b"DATA\r\n");

    session.deliver(b"Subject: hi\r\n\r\nhello\r\n");

    assert_eq!(store.deliveries(), 3);
    assert_eq!(
        store.inner.messages("alice")?,
        vec![b"Subject: hi\r\n\r\nhello\r\n".to_vec()]
    );
    assert_eq!(store.inner.messages("bob")?.len(), 4);

    Ok(())
}

#[test]
fn test_failed_delivery() -> Result {
    let store = Arc::new(CountingStore::with_mail()?);
    store.fail_deliveries();
    let mut session = with_recipient(&store);
    session.execute(b"DATA\r\n");

    assert_eq!(
        session.deliver(b"Test\r\n").to_string(),
        "451 Requested action aborted: error in processing"
    );
    assert_eq!(session.transaction(), &Transaction::default());

    Ok(())
}

#[test]
fn test_discard() -> Result {
    let store = Arc::new(CountingStore::with_mail()?);
    let mut session = with_recipient(&store);
    session.execute(b"DATA\r\n");

    assert_eq!(
        session.discard(Discarded::LineTooLong).to_string(),
        "552 Line exceeded max size, message discarded"
    );
    assert_eq!(session.transaction(), &Transaction::default());
    assert_eq!(store.deliveries(), 0);

    Ok(())
}

#[test]
fn test_quit() -> Result {
    let store = Arc::new(CountingStore::with_mail()?);
    let mut session = session(&store);

    let response = session.execute(b"QUIT now\r\n");
    assert_eq!(
        response.reply.to_string(),
        "501 No parameters accepted for QUIT"
    );
    assert_eq!(response.next, Next::Command);

    let response = session.execute(b"QUIT\r\n");
    assert_eq!(
        response.reply.to_string(),
        "221 mx.example.com closing connection"
    );
    assert_eq!(response.next, Next::Close(CloseReason::Quit));

    Ok(())
}

#[tokio::test]
async fn test_collect() -> Result {
    let input: &[u8] = b"Subject: x\r\n\r\n..not the end\r\n.\r\nNOOP\r\n";
    let mut reader = LineReader::new(BufReader::new(input), 64);

    assert_eq!(
        data::collect(&mut reader, &Config::default()).await?,
        DataOutcome::Message(b"Subject: x\r\n\r\n..not the end\r\n".to_vec())
    );
    // The line after the terminator is left for the command loop.
    assert_eq!(
        reader.next_line(crate::timeouts::EXPECTED).await?,
        Line::Complete(b"NOOP\r\n".to_vec())
    );

    Ok(())
}

#[tokio::test]
async fn test_collect_limits() -> Result {
    let config = Config {
        max_message_size: 10,
        ..Config::default()
    };

    let input: &[u8] = b"0123456\r\n0123456\r\nmore\r\n.\r\n";
    let mut reader = LineReader::new(BufReader::new(input), 64);
    assert_eq!(
        data::collect(&mut reader, &config).await?,
        DataOutcome::Discarded(Discarded::MessageTooLarge)
    );

    let input = format!("short\r\n{}\r\nshort\r\n.\r\n", "x".repeat(100));
    let mut reader = LineReader::new(BufReader::new(input.as_bytes()), 64);
    assert_eq!(
        data::collect(&mut reader, &Config::default()).await?,
        DataOutcome::Discarded(Discarded::LineTooLong)
    );

    let input: &[u8] = b"no terminator\r\n";
    let mut reader = LineReader::new(BufReader::new(input), 64);
    assert_eq!(
        data::collect(&mut reader, &Config::default()).await?,
        DataOutcome::Closed
    );

    Ok(())
}

#[tokio::test]
async fn test_handle() -> Result {
    let store = Arc::new(CountingStore::with_mail()?);
    let mock = Builder::new()
        .write(b"220 mx.example.com service ready\r\n")
        .read(b"HELO a\r\n")
        .write(b"250 mx.example.com Hello a\r\n")
        .read(b"MAIL FROM:<a@x>\r\n")
        .write(b"250 mx.example.com Sender OK\r\n")
        .read(b"RCPT TO:<alice>\r\n")
        .write(b"250 mx.example.com RCPT OK\r\n")
        .read(b"DATA\r\n")
        .write(b"354 accepting data, end with <CRLF>.<CRLF>\r\n")
        .read(b"Test\r\n.\r\n")
        .write(b"250 mx.example.com message successfully sent\r\n")
        .read(b"QUIT\r\n")
        .write(b"221 mx.example.com closing connection\r\n")
        .build();
    let config = Config::default().with_hostname(HOST);

    let reason = handle(mock, Arc::clone(&store), &config, LogPrefix::new("smtp"))
        .await?;

    assert_eq!(reason, CloseReason::Quit);
    assert_eq!(store.inner.messages("alice")?, vec![b"Test\r\n".to_vec()]);

    Ok(())
}

#[tokio::test]
async fn test_handle_oversized_lines() -> Result {
    let store = Arc::new(CountingStore::with_mail()?);
    let long_line = format!("{}\r\n", "x".repeat(40));
    let mock = Builder::new()
        .write(b"220 localhost service ready\r\n")
        .read(long_line.as_bytes())
        .write(b"500 Syntax error - line too long\r\n")
        .read(b"HELO a\r\nMAIL FROM:<a@x>\r\nRCPT TO:<bob>\r\nDATA\r\n")
        .write(b"250 localhost Hello a\r\n")
        .write(b"250 localhost Sender OK\r\n")
        .write(b"250 localhost RCPT OK\r\n")
        .write(b"354 accepting data, end with <CRLF>.<CRLF>\r\n")
        .read(b"fine\r\n")
        .read(long_line.as_bytes())
        .read(b".\r\n")
        .write(b"552 Line exceeded max size, message discarded\r\n")
        .read(b"DATA\r\n")
        .write(b"503 Bad sequence of commands\r\n")
        .build();
    let config = Config {
        max_line_length: 32,
        ..Config::default()
    };

    let reason = handle(mock, Arc::clone(&store), &config, LogPrefix::new("smtp"))
        .await?;

    assert_eq!(reason, CloseReason::ClosedByClient);
    assert_eq!(store.deliveries(), 0);

    Ok(())
}

#[tokio::test]
async fn test_handle_disconnect_during_data() -> Result {
    let store = Arc::new(CountingStore::with_mail()?);
    let mock = Builder::new()
        .write(b"220 localhost service ready\r\n")
        .read(b"HELO a\r\nMAIL FROM:<a@x>\r\nRCPT TO:<bob>\r\nDATA\r\npartial\r\n")
        .write(b"250 localhost Hello a\r\n")
        .write(b"250 localhost Sender OK\r\n")
        .write(b"250 localhost RCPT OK\r\n")
        .write(b"354 accepting data, end with <CRLF>.<CRLF>\r\n")
        .build();
    let config = Config::default();

    let reason = handle(mock, Arc::clone(&store), &config, LogPrefix::new("smtp"))
        .await?;

    assert_eq!(reason, CloseReason::ClosedByClient);
    assert_eq!(store.deliveries(), 0);

    Ok(())
}

#[tokio::test]
async fn test_handle_timeout() -> Result {
    let store = Arc::new(CountingStore::with_mail()?);
    let mock = Builder::new()
        .write(b"220 localhost service ready\r\n")
        .wait(Duration::from_secs(1))
        .build();
    let config = Config {
        smtp_timeout: Duration::from_millis(50),
        ..Config::default()
    };

    let reason = handle(mock, store, &config, LogPrefix::new("smtp")).await?;
    assert!(matches!(reason, CloseReason::TimedOut(_)));

    Ok(())
}

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

use std::{error::Error, net::SocketAddr, sync::Arc};

use futures_util::{pin_mut, StreamExt};
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
};

use crate::{read_line, write_line, CloseReason, Config, MailStore, MemoryStore, Protocol};


type Result = std::result::Result<(), Box<dyn Error>>;

/// Bind a local port and serve `protocol` sessions on it, one at a time.
async fn serve(
    protocol: Protocol,
    store: &Arc<MemoryStore>,
    config: &Arc<Config>,
) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let sessions = crate::listen(listener, protocol, Arc::clone(store), Arc::clone(config));

    // Can be bound to a variable which exposes `.abort()`
    tokio::spawn(async move {
        pin_mut!(sessions);

        while let Some(session) = sessions.next().await {
            let close_reason = session
                // Unwrap the [`TcpListener::accept`]
                .unwrap()
                // Await and unwrap the [`JoinHandle`]
                .await
                .unwrap()
                // Unwrap the session itself
                .unwrap();

            assert_eq!(close_reason, CloseReason::Quit);
        }
    });

    Ok(addr)
}

/// Deliver a message over SMTP, then read and delete it over POP3.
#[tokio::test]
async fn test_listen() -> Result {
    let store = Arc::new(MemoryStore::new());
    store.add_user("bob", "hunter2")?;
    let config = Arc::new(Config::default().with_hostname("mail.test"));

    let smtp_addr = serve(Protocol::Smtp, &store, &config).await?;
    let pop3_addr = serve(Protocol::Pop3, &store, &config).await?;

    let mut stream = TcpStream::connect(smtp_addr).await?;
    let (read_stream, mut write_stream) = stream.split();
    let mut reader = BufReader::new(read_stream);

    assert!(is_valid_response::smtp_greeting(&read_line!(reader).await?));

    write_line!(write_stream, "HELO client.test")?;
    assert_eq!(
        read_line!(reader).await?,
        "250 mail.test Hello client.test\r\n"
    );

    write_line!(write_stream, "MAIL FROM:<alice@client.test>")?;
    assert!(is_valid_response::smtp_code(&read_line!(reader).await?, 250));

    write_line!(write_stream, "RCPT TO:<nobody>")?;
    assert!(is_valid_response::smtp_code(&read_line!(reader).await?, 550));

    write_line!(write_stream, "RCPT TO:<bob>")?;
    assert!(is_valid_response::smtp_code(&read_line!(reader).await?, 250));

    write_line!(write_stream, "DATA")?;
    assert!(is_valid_response::smtp_code(&read_line!(reader).await?, 354));

    write_line!(write_stream, "Subject: hello")?;
    write_line!(write_stream, "")?;
    write_line!(write_stream, "Hi Bob")?;
    write_line!(write_stream, ".")?;
    assert!(is_valid_response::smtp_code(&read_line!(reader).await?, 250));

    write_line!(write_stream, "QUIT")?;
    assert!(is_valid_response::smtp_quit(&read_line!(reader).await?));

    assert_eq!(
        store.messages("bob")?,
        vec![b"Subject: hello\r\n\r\nHi Bob\r\n".to_vec()]
    );

    let mut stream = TcpStream::connect(pop3_addr).await?;
    let (read_stream, mut write_stream) = stream.split();
    let mut reader = BufReader::new(read_stream);

    assert_eq!(
        read_line!(reader).await?,
        "+OK POP3 server ready for mail.test\r\n"
    );

    write_line!(write_stream, "USER bob")?;
    assert!(is_valid_response::pop3_ok(&read_line!(reader).await?));

    write_line!(write_stream, "PASS hunter2")?;
    assert_eq!(
        read_line!(reader).await?,
        "+OK Mailbox ready, 1 messages (26 octets)\r\n"
    );

    write_line!(write_stream, "STAT")?;
    assert_eq!(read_line!(reader).await?, "+OK 1 26\r\n");

    write_line!(write_stream, "RETR 1")?;
    assert_eq!(read_line!(reader).await?, "+OK 26 octets\r\n");
    for expected in ["Subject: hello\r\n", "\r\n", "Hi Bob\r\n", ".\r\n"] {
        assert_eq!(read_line!(reader).await?, expected);
    }

    write_line!(write_stream, "DELE 1")?;
    assert!(is_valid_response::pop3_ok(&read_line!(reader).await?));

    write_line!(write_stream, "QUIT")?;
    assert!(is_valid_response::pop3_ok(&read_line!(reader).await?));

    assert!(store.messages("bob")?.is_empty());
    assert!(!store.is_known_recipient("nobody"));

    Ok(())
}

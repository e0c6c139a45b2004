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

//! POP3 and SMTP server sessions over any async byte stream, backed by a pluggable
//! [`MailStore`].
//!
//! [`listen`] accepts TCP connections and runs one session per connection. The engines in
//! [`pop3`] and [`smtp`] can also be driven directly on any [`tokio::io::AsyncRead`] +
//! [`tokio::io::AsyncWrite`] stream.

#![warn(clippy::nursery, clippy::pedantic)]
#![cfg_attr(debug_assertions, allow(clippy::missing_errors_doc))]

use std::{io, net::SocketAddr, sync::Arc};

use async_stream::stream;
use futures_core::Stream;
use log::info;
use tokio::{
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

pub mod address;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod log_prefix;
pub mod pop3;
pub mod reply;
pub mod smtp;
pub mod store;
pub mod str;
#[cfg(test)]
mod test;
pub mod timeouts;

pub use config::Config;
pub use connection::CloseReason;
pub use error::Error;
use log_prefix::LogPrefix;
pub use store::{MailStore, Mailbox, MemoryStore};

/// Write `$line` and a `CRLF` into `$write_stream`.
///
/// Implicitly calls `.await`.
///
/// # Errors
///
/// - Any errors that could come out of [`tokio::io::AsyncWriteExt::write_all`].
#[macro_export]
macro_rules! write_line {
    ($write_stream:expr, $line:expr) => {
        ::tokio::io::AsyncWriteExt::write_all(
            &mut $write_stream,
            ::std::format!("{}{}", $line, $crate::str::CRLF).as_bytes(),
        )
        .await
    };
}

/// Format the arguments like [`format!`], then write them and a `CRLF` into `$write_stream`.
///
/// Implicitly calls `.await`.
///
/// # Errors
///
/// - Any errors that could come out of [`tokio::io::AsyncWriteExt::write_all`].
#[macro_export]
macro_rules! write_fmt_line {
    ($write_stream:expr, $($arg:tt)*) => {
        $crate::write_line!($write_stream, ::std::format_args!($($arg)*))
    };
}

/// Read a line, line ending included, out of `$reader` into a new [`String`].
///
/// Evaluates to a future, so it needs to be awaited.
#[cfg(test)]
#[macro_export]
macro_rules! read_line {
    ($reader:expr) => {
        async {
            let mut line = ::std::string::String::new();
            ::tokio::io::AsyncBufReadExt::read_line(&mut $reader, &mut line)
                .await
                .map(|_| line)
        }
    };
}

/// Which protocol a listener speaks.
#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Protocol {
    Pop3,
    Smtp,
}

impl Protocol {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pop3 => "pop3",
            Self::Smtp => "smtp",
        }
    }
}

/// Accept connections on `listener` forever, spawning a `protocol` session for each.
///
/// Yields the [`JoinHandle`] of every spawned session, or the error from a failed
/// [`TcpListener::accept`]. A failed accept does not stop the stream.
pub fn listen<S: MailStore>(
    listener: TcpListener,
    protocol: Protocol,
    store: Arc<S>,
    config: Arc<Config>,
) -> impl Stream<Item = io::Result<JoinHandle<Result<CloseReason, Error>>>> {
    stream! {
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => yield Ok(tokio::spawn(handle_connection(
                    stream,
                    peer,
                    protocol,
                    Arc::clone(&store),
                    Arc::clone(&config),
                ))),
                Err(err) => yield Err(err),
            }
        }
    }
}

/// Run one `protocol` session over a TCP connection.
///
/// # Errors
///
/// [`Error::Io`] if the connection fails mid-session.
pub async fn handle_connection<S: MailStore>(
    stream: TcpStream,
    peer: SocketAddr,
    protocol: Protocol,
    store: Arc<S>,
    config: Arc<Config>,
) -> Result<CloseReason, Error> {
    let log_prefix = LogPrefix::new(protocol.name()).with_peer(peer);
    info!("{log_prefix} Connection opened");

    match protocol {
        Protocol::Pop3 => pop3::handle(stream, store, &config, log_prefix).await,
        Protocol::Smtp => smtp::handle(stream, store, &config, log_prefix).await,
    }
}

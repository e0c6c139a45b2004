// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright © 2024 RemasteredArch
// Copyright © 2024 Jaxydog
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

//! Helpers for the line-oriented text that both POP3 and SMTP are spoken in.

pub(crate) mod max_lengths;

pub const CRLF: &str = "\r\n";

/// The line that ends a multi-line reply or an SMTP `DATA` transfer.
pub const TERMINATOR: &[u8] = b".\r\n";

/// Frame `body` as the payload of a multi-line reply, including the closing [`TERMINATOR`] line.
///
/// [RFC 1939 section 3](https://www.rfc-editor.org/rfc/rfc1939.html#section-3) requires every
/// line of a multi-line response to end in `CRLF`, and every line starting with the termination
/// octet (`.`) to be byte-stuffed with another one.
///
/// This will preserve pre-existing `"\r\n"` sequences while replacing the following cases:
/// - `'\r'` -> `"\r\n"`
/// - `'\n'` -> `"\r\n"`
/// - `"\n\r"` -> `"\r\n\r\n"`
///
/// A body that does not end with a line ending has one appended before the terminator.
#[must_use]
pub fn frame_multiline(body: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(body.len() + TERMINATOR.len() + CRLF.len());
    let mut at_line_start = true;
    let mut bytes = body.iter().copied().peekable();

    while let Some(byte) = bytes.next() {
        if at_line_start && byte == b'.' {
            framed.push(b'.');
        }

        match byte {
            b'\r' => {
                // Swallow the line feed of a proper `CRLF` so it isn't doubled.
                if bytes.peek() == Some(&b'\n') {
                    bytes.next();
                }

                framed.extend_from_slice(CRLF.as_bytes());
                at_line_start = true;
            }
            b'\n' => {
                framed.extend_from_slice(CRLF.as_bytes());
                at_line_start = true;
            }
            _ => {
                framed.push(byte);
                at_line_start = false;
            }
        }
    }

    if !at_line_start {
        framed.extend_from_slice(CRLF.as_bytes());
    }

    framed.extend_from_slice(TERMINATOR);
    framed
}

/// Checks whether a line is exactly the [`TERMINATOR`], with nothing before the `.`.
#[must_use]
pub fn is_terminator(line: &[u8]) -> bool {
    line == TERMINATOR
}

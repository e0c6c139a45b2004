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

//! How long a server waits for a client before giving up on the session.
//!
//! Some amount of delays from transmission and processing are expected in a session. To
//! differentiate between these and a genuinely abandoned session, [RFC 5321
//! 4.5.3.2](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.5.3.2) defines SMTP timeouts in
//! minutes, and [RFC 1939 section 3](https://www.rfc-editor.org/rfc/rfc1939.html#section-3) defines
//! the POP3 autologout timer.
//!
//! Note that, when testing, all timeouts are overridden to [`EXPECTED`]; because a testing
//! environment can be expected to have better performance than the real world.

/// A very strict timeout for how long participants should wait for anything.
///
/// Not specified by either RFC. This is for identifying unusual performance for testing.
pub const EXPECTED: std::time::Duration = std::time::Duration::from_secs(3);

/// Generate `const` items with [`std::time::Duration`] values in minutes, optionally including
/// documentation comments.
///
/// Does not account for leap seconds or similar shenanigans. A "minute" is 60 of whatever
/// [`std::time::Duration`] considers to be a "second."
macro_rules! minute_durations {
        [$(
            $( #[$attr:meta] )*
            $label:ident = $minutes:expr
        ),+ ,] => {
            $(
                $( #[$attr] )*
                #[cfg(not(test))]
                pub const $label: ::std::time::Duration =
                    ::std::time::Duration::from_secs($minutes * 60);

                // For stricter performance checks during testing.
                $( #[$attr] )*
                #[cfg(test)]
                pub const $label: ::std::time::Duration =
                    $crate::timeouts::EXPECTED;
            )+
        };
    }

minute_durations![
    /// The minimum length in minutes an SMTP server should wait for the next command, or the next
    /// line of a `DATA` transfer, from a client.
    ///
    /// [RFC 5321 § 4.5.3.2.7](https://www.rfc-editor.org/rfc/rfc5321.html#section-4.5.3.2.7).
    SERVER_TIMEOUT = 5,
    /// The minimum length in minutes a POP3 server should let a session sit idle before closing
    /// it. Closing on this timer never enters the UPDATE state, so no messages are removed.
    ///
    /// [RFC 1939 section 3](https://www.rfc-editor.org/rfc/rfc1939.html#section-3).
    POP3_AUTOLOGOUT = 10,
];

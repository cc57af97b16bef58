// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Span macros for upload sessions
//!
//! Every session runs inside an `upload` span and every block inside a
//! `block` span, so log lines from concurrent blocks can be told apart in
//! all three output formats.
//!
//! ```ignore
//! let span = upload_span!(session.id, "media/clip.mov", kind = "block");
//! async { /* ... */ }.instrument(span).await;
//! ```

/// Open an info-level span covering one upload session
#[macro_export]
macro_rules! upload_span {
    ($session:expr, $key:expr) => {
        $crate::tracing::info_span!("upload", session = %$session, key = %$key)
    };
    ($session:expr, $key:expr, $($field:tt)*) => {
        $crate::tracing::info_span!("upload", session = %$session, key = %$key, $($field)*)
    };
}

/// Open a debug-level span covering every attempt of one block
#[macro_export]
macro_rules! block_span {
    ($index:expr, $offset:expr, $len:expr) => {
        $crate::tracing::debug_span!("block", index = $index, offset = $offset, len = $len)
    };
}

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
//! Structured logging for blobstage
//!
//! Built on `tracing` and `tracing-subscriber` with pretty, compact and
//! JSON output. `RUST_LOG` is honoured when no explicit level is given.
//!
//! ```no_run
//! use blobstage_observability::{init_tracing_with_config, LogConfig, LogFormat};
//!
//! let config = LogConfig::new().with_format(LogFormat::Json).with_level("debug");
//! init_tracing_with_config(config).ok();
//! ```

pub mod config;
pub mod initialization;
#[macro_use]
pub mod macros;

pub use config::{LogConfig, LogError, LogFormat, LogOutput};
pub use initialization::{init_tracing, init_tracing_with_config};

#[doc(hidden)]
pub use tracing;

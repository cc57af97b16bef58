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

//! Terminal progress for transfers

use blobstage_transfer::{ProgressListener, TransferProgress};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

const BAR_TEMPLATE: &str =
    "{spinner:.green} {msg} [{bar:40.green/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg} {bytes} ({bytes_per_sec})";

/// Progress bar driven by upload acknowledgements
///
/// Drawn on stderr so stdout stays clean for piping.
pub struct TransferBar {
    bar: ProgressBar,
}

impl TransferBar {
    /// Bar for `total` bytes, or a spinner when the total is unknown
    pub fn new(msg: &str, total: Option<u64>, quiet: bool) -> Self {
        if quiet {
            return TransferBar {
                bar: ProgressBar::hidden(),
            };
        }

        let (bar, template) = match total {
            Some(total) => (ProgressBar::new(total), BAR_TEMPLATE),
            None => (ProgressBar::new_spinner(), SPINNER_TEMPLATE),
        };
        bar.set_draw_target(ProgressDrawTarget::stderr());
        if let Ok(style) = ProgressStyle::default_bar().template(template) {
            bar.set_style(style.progress_chars("█▓░"));
        }
        bar.set_message(msg.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        TransferBar { bar }
    }

    /// Listener that moves the bar to the acknowledged byte count
    pub fn listener(&self) -> ProgressListener {
        let bar = self.bar.clone();
        Arc::new(move |progress: TransferProgress| {
            bar.set_position(progress.bytes_transferred);
        })
    }

    pub fn finish(&self, msg: &str) {
        self.bar.finish_with_message(msg.to_string());
    }

    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

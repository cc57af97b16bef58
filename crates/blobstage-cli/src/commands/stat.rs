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
use crate::output;
use crate::store::open_store;
use crate::CliContext;
use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use indicatif::HumanBytes;

/// Show metadata of a committed object
#[derive(Parser, Debug)]
pub struct StatCmd {
    /// Object key
    #[arg(value_name = "KEY")]
    pub key: String,

    /// Format as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatCmd {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let store = open_store(&ctx.config.storage).await?;
        let meta = store
            .object_metadata(&self.key)
            .await
            .with_context(|| format!("Failed to stat {}", self.key))?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&meta)?);
            return Ok(());
        }

        println!("{}", style(&meta.key).bold());
        output::detail("Kind", meta.kind.as_str());
        output::detail(
            "Size",
            &format!("{} ({} bytes)", HumanBytes(meta.size), meta.size),
        );
        output::detail("Blocks", &meta.block_count.to_string());
        output::detail("ETag", &meta.etag);
        output::detail(
            "Content-MD5",
            meta.content_md5.as_deref().unwrap_or("-"),
        );
        output::detail("Last modified", &meta.last_modified.to_rfc3339());
        Ok(())
    }
}

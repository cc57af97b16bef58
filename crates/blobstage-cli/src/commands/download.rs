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
use indicatif::HumanBytes;
use std::path::PathBuf;

/// Download a committed object to a local file
#[derive(Parser, Debug)]
pub struct DownloadCmd {
    /// Object key
    #[arg(value_name = "KEY")]
    pub key: String,

    /// Destination file
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(short, long)]
    pub force: bool,
}

impl DownloadCmd {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        if !self.force && tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            anyhow::bail!(
                "{} already exists (use --force to overwrite)",
                self.path.display()
            );
        }

        let store = open_store(&ctx.config.storage).await?;
        let data = store
            .get_object(&self.key)
            .await
            .with_context(|| format!("Failed to read {}", self.key))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, &data)
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;

        if !ctx.quiet {
            output::success(&format!(
                "Downloaded {} ({}) to {}",
                self.key,
                HumanBytes(data.len() as u64),
                self.path.display()
            ));
        }
        Ok(())
    }
}

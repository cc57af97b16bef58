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
use crate::progress::TransferBar;
use crate::store::open_store;
use crate::CliContext;
use anyhow::{Context, Result};
use blobstage_store::BlobKind;
use blobstage_transfer::{ParallelUploadCoordinator, UploadOptions, UploadPath, UploadSource};
use clap::Parser;
use indicatif::HumanBytes;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// Upload a file as a block, append or page object
#[derive(Parser, Debug)]
pub struct UploadCmd {
    /// File to upload
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Destination key
    #[arg(value_name = "KEY")]
    pub key: String,

    /// Object kind (block, append, page)
    #[arg(long, default_value = "block", value_parser = parse_kind)]
    pub kind: BlobKind,

    /// Block size in bytes
    #[arg(long, value_name = "BYTES")]
    pub block_size: Option<u64>,

    /// Maximum blocks in flight
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Files up to this size are sent in one request
    #[arg(long, value_name = "BYTES")]
    pub single_shot_threshold: Option<u64>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

fn parse_kind(s: &str) -> Result<BlobKind, String> {
    BlobKind::parse(s).ok_or_else(|| format!("unknown object kind '{}' (block, append, page)", s))
}

impl UploadCmd {
    pub async fn execute(&self, ctx: &CliContext) -> Result<()> {
        let mut config = ctx.config.clone();
        if let Some(block_size) = self.block_size {
            config.transfer.block_size = block_size;
        }
        if let Some(concurrency) = self.concurrency {
            config.transfer.max_concurrency = concurrency;
        }
        if let Some(threshold) = self.single_shot_threshold {
            config.transfer.single_shot_threshold = threshold;
        }

        let store = open_store(&config.storage).await?;
        let coordinator = ParallelUploadCoordinator::from_config(store, &config)?;

        let source = UploadSource::from_file(&self.path)
            .await
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let bar = TransferBar::new(
            &format!("Uploading {}", self.key),
            source.declared_len(),
            ctx.quiet || self.json,
        );

        let cancel = CancellationToken::new();
        let interrupt = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let options = UploadOptions::new()
            .with_kind(self.kind)
            .with_cancellation(cancel)
            .with_progress(bar.listener());
        let result = coordinator.upload(&self.key, source, options).await;
        interrupt.abort();

        let outcome = match result {
            Ok(outcome) => {
                bar.finish("done");
                outcome
            }
            Err(err) => {
                bar.abandon();
                return Err(err)
                    .with_context(|| format!("Upload of {} failed", self.path.display()));
            }
        };

        if self.json {
            let summary = serde_json::json!({
                "session_id": outcome.session_id,
                "path": match outcome.path {
                    UploadPath::SingleShot => "single-shot",
                    UploadPath::Chunked => "chunked",
                },
                "blocks": outcome.block_ids.len(),
                "bytes_uploaded": outcome.bytes_uploaded,
                "retries": outcome.retries,
                "object": outcome.metadata,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Ok(());
        }

        if !ctx.quiet {
            output::success(&format!(
                "Uploaded {} to {}",
                HumanBytes(outcome.bytes_uploaded),
                outcome.metadata.key
            ));
            output::detail("Kind", outcome.metadata.kind.as_str());
            match outcome.path {
                UploadPath::SingleShot => output::detail("Path", "single request"),
                UploadPath::Chunked => {
                    output::detail("Path", &format!("{} blocks", outcome.block_ids.len()))
                }
            }
            output::detail("Retries", &outcome.retries.to_string());
            output::detail("ETag", &outcome.metadata.etag);
            if let Some(md5) = &outcome.metadata.content_md5 {
                output::detail("Content-MD5", md5);
            }
        }
        Ok(())
    }
}

//! cli::commands::diff_cmd
//!
//! Show keys that differ between two references.
//!
//! # Example
//!
//! ```bash
//! lakeref diff main etl
//! lakeref diff @2e1cfa82b035c26c main --json
//! ```

use anyhow::Result;
use futures::TryStreamExt;

use super::parse_ref;
use crate::cli::Context;
use crate::core::model::DiffEntry;
use crate::engine::Client;
use crate::ui::output;

pub async fn diff(client: &Client, ctx: &Context, from: &str, to: &str) -> Result<()> {
    let from = parse_ref(from)?;
    let to = parse_ref(to)?;
    let entries: Vec<DiffEntry> = client
        .diff(&from, &to)
        .await?
        .into_stream()
        .try_collect()
        .await?;

    if ctx.json {
        return output::json(&entries);
    }
    for entry in &entries {
        println!("{}", output::format_diff(entry));
    }
    Ok(())
}

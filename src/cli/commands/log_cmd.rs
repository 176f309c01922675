//! cli::commands::log_cmd
//!
//! Show commit history.
//!
//! # Example
//!
//! ```bash
//! lakeref log
//! lakeref log etl -n 10
//! lakeref log main --until 8f2a91cc
//! ```

use anyhow::Result;
use futures::{StreamExt, TryStreamExt};

use super::{parse_hash, ref_or_default};
use crate::cli::Context;
use crate::core::model::Commit;
use crate::engine::{Client, LogOptions};
use crate::ui::output;

pub async fn log(
    client: &Client,
    ctx: &Context,
    reference: Option<&str>,
    max_count: Option<usize>,
    until: Option<String>,
    filter: Option<String>,
) -> Result<()> {
    let reference = ref_or_default(client, reference)?;
    let options = LogOptions {
        limit: until.as_deref().map(parse_hash).transpose()?,
        filter,
        ..Default::default()
    };

    let commits = client.log(&reference, options).await?.into_stream();
    let commits: Vec<Commit> = match max_count {
        Some(n) => commits.take(n).try_collect().await?,
        None => commits.try_collect().await?,
    };

    if ctx.json {
        return output::json(&commits);
    }
    for commit in &commits {
        println!("{}", output::format_commit(commit));
    }
    Ok(())
}

//! cli::commands::mutation
//!
//! Commit, merge and transplant.
//!
//! All three require `--expected`: the hash the target branch must still be
//! at. The command fails without changing anything if it has moved.
//!
//! # Example
//!
//! ```bash
//! lakeref commit main --expected 2e1cfa82 -m 'add orders' \
//!     --put 'db.orders={"type":"ICEBERG_TABLE","metadataLocation":"s3://o","snapshotId":1}'
//! lakeref merge etl --into main --expected 8f2a91cc
//! lakeref transplant 3d77e0aa --from etl --into main --expected 8f2a91cc
//! ```

use anyhow::{anyhow, Context as _, Result};

use super::{parse_hash, parse_key, parse_name, parse_ref, report_failure};
use crate::cli::Context;
use crate::core::model::Content;
use crate::core::types::{CommitHash, ContentKey};
use crate::engine::Client;
use crate::ui::output;

/// Arguments of `lakeref commit`.
#[derive(Debug, Clone)]
pub struct CommitArgs {
    pub branch: String,
    pub expected: String,
    pub message: String,
    pub author: Option<String>,
    /// `KEY=JSON` pairs
    pub puts: Vec<String>,
    pub deletes: Vec<String>,
}

/// Arguments of `lakeref transplant`.
#[derive(Debug, Clone)]
pub struct TransplantArgs {
    pub hashes: Vec<String>,
    pub from: String,
    pub into: String,
    pub expected: String,
    pub message: Option<String>,
    pub dry_run: bool,
}

/// Split `KEY=JSON` into a key and its content.
fn parse_put(arg: &str) -> Result<(ContentKey, Content)> {
    let (key, body) = arg
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=JSON, got '{}'", arg))?;
    let content: Content = serde_json::from_str(body)
        .with_context(|| format!("invalid content JSON for '{}'", key))?;
    Ok((parse_key(key)?, content))
}

pub async fn commit(client: &Client, ctx: &Context, args: CommitArgs) -> Result<()> {
    let branch = parse_name(&args.branch)?;
    let mut builder = client
        .commit(branch.clone(), parse_hash(&args.expected)?)
        .message(args.message);
    if let Some(author) = args.author {
        builder = builder.author(author);
    }
    for put in &args.puts {
        let (key, content) = parse_put(put)?;
        builder = builder.put(key, content);
    }
    for delete in &args.deletes {
        builder = builder.delete(parse_key(delete)?);
    }

    let result = builder
        .submit()
        .await
        .map_err(|e| report_failure(ctx, e))?;
    if ctx.json {
        return output::json(&result);
    }
    output::print(
        format!("Committed {} to {}", result.hash(), branch),
        ctx.verbosity,
    );
    for added in &result.added_contents {
        output::print(
            format!("  {} -> {}", added.key, added.content_id),
            ctx.verbosity,
        );
    }
    Ok(())
}

pub async fn merge(
    client: &Client,
    ctx: &Context,
    from: &str,
    into: &str,
    expected: &str,
    message: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let mut builder = client
        .merge(parse_name(into)?, parse_hash(expected)?, parse_ref(from)?)
        .dry_run(dry_run);
    if let Some(message) = message {
        builder = builder.message(message);
    }

    let result = builder
        .submit()
        .await
        .map_err(|e| report_failure(ctx, e))?;
    if ctx.json {
        return output::json(&result);
    }
    let summary = if result.dry_run {
        format!("{} merges cleanly into {}", from, result.target)
    } else if !result.applied {
        format!("{} is already up to date with {}", result.target, from)
    } else if result.fast_forward {
        format!("Fast-forwarded {} to {}", result.target, result.hash)
    } else {
        format!("Merged {} into {} at {}", from, result.target, result.hash)
    };
    output::print(summary, ctx.verbosity);
    Ok(())
}

pub async fn transplant(client: &Client, ctx: &Context, args: TransplantArgs) -> Result<()> {
    let hashes = args
        .hashes
        .iter()
        .map(|h| parse_hash(h))
        .collect::<Result<Vec<CommitHash>>>()?;
    let mut builder = client
        .transplant(
            parse_name(&args.into)?,
            parse_hash(&args.expected)?,
            parse_name(&args.from)?,
            hashes,
        )
        .dry_run(args.dry_run);
    if let Some(message) = args.message {
        builder = builder.message(message);
    }

    let result = builder
        .submit()
        .await
        .map_err(|e| report_failure(ctx, e))?;
    if ctx.json {
        return output::json(&result);
    }
    if result.dry_run {
        output::print(
            format!("{} commit(s) apply cleanly to {}", args.hashes.len(), result.target),
            ctx.verbosity,
        );
    } else {
        output::print(
            format!(
                "Transplanted [{}] onto {} at {}",
                output::format_hashes(&result.applied),
                result.target,
                result.hash
            ),
            ctx.verbosity,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_splits_on_first_equals() {
        let (key, content) = parse_put(
            r#"db.t={"type":"ICEBERG_TABLE","metadataLocation":"s3://a=b","snapshotId":1}"#,
        )
        .unwrap();
        assert_eq!(key.to_string(), "db.t");
        assert_eq!(content.payload["metadataLocation"], "s3://a=b");
    }

    #[test]
    fn put_without_equals_fails() {
        assert!(parse_put("db.t").is_err());
    }

    #[test]
    fn put_with_bad_json_fails() {
        assert!(parse_put("db.t={nope").is_err());
    }
}

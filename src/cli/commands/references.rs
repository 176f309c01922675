//! cli::commands::references
//!
//! List, show, create, assign and delete references.
//!
//! # Example
//!
//! ```bash
//! lakeref refs
//! lakeref create branch etl --from main
//! lakeref assign branch etl --expected 8f2a91cc --to main
//! lakeref delete branch etl --expected 2e1cfa82
//! ```

use anyhow::{anyhow, Result};

use super::{parse_hash, parse_name, parse_ref, report_failure};
use crate::cli::Context;
use crate::core::model::ReferenceKind;
use crate::core::types::RefSpec;
use crate::engine::Client;
use crate::ui::output;

pub async fn refs(client: &Client, ctx: &Context, filter: Option<String>) -> Result<()> {
    let references = client.list_references(filter).collect_all().await?;
    if ctx.json {
        return output::json(&references);
    }
    for reference in &references {
        println!("{}", output::format_reference(reference));
    }
    Ok(())
}

pub async fn show(client: &Client, ctx: &Context, name: &str) -> Result<()> {
    let reference = client.get_reference(&parse_name(name)?).await?;
    if ctx.json {
        return output::json(&reference);
    }
    println!("{}", output::format_reference(&reference));
    println!("{}", reference.hash());
    Ok(())
}

pub async fn create(
    client: &Client,
    ctx: &Context,
    kind: ReferenceKind,
    name: &str,
    from: Option<&str>,
) -> Result<()> {
    let name = parse_name(name)?;
    let from = match from {
        Some(s) => parse_ref(s)?,
        None => RefSpec::named(client.config().default_branch().clone()),
    };
    let reference = client
        .create(&name, kind, &from)
        .await
        .map_err(|e| report_failure(ctx, e))?;
    if ctx.json {
        return output::json(&reference);
    }
    output::print(
        format!("Created {}", output::format_reference(&reference)),
        ctx.verbosity,
    );
    Ok(())
}

pub async fn assign(
    client: &Client,
    ctx: &Context,
    kind: ReferenceKind,
    name: &str,
    expected: &str,
    to: &str,
) -> Result<()> {
    let name = parse_name(name)?;
    let expected = parse_hash(expected)?;
    let to = client
        .pin(&parse_ref(to)?)
        .await?
        .hash()
        .cloned()
        .ok_or_else(|| anyhow!("'{}' does not resolve to a commit", to))?;

    let reference = client
        .assign(&name, kind, &expected, &to)
        .await
        .map_err(|e| report_failure(ctx, e))?;
    if ctx.json {
        return output::json(&reference);
    }
    output::print(
        format!("Assigned {}", output::format_reference(&reference)),
        ctx.verbosity,
    );
    Ok(())
}

pub async fn delete(
    client: &Client,
    ctx: &Context,
    kind: ReferenceKind,
    name: &str,
    expected: &str,
) -> Result<()> {
    let name = parse_name(name)?;
    let expected = parse_hash(expected)?;
    client
        .delete(&name, kind, &expected)
        .await
        .map_err(|e| report_failure(ctx, e))?;
    if ctx.json {
        return output::json(&serde_json::json!({ "deleted": name }));
    }
    output::print(format!("Deleted {} {}", kind.as_wire().to_lowercase(), name), ctx.verbosity);
    Ok(())
}

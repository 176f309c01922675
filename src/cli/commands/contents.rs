//! cli::commands::contents
//!
//! List content keys and print content objects.
//!
//! # Example
//!
//! ```bash
//! lakeref contents main --prefix db
//! lakeref get main db.orders db.users
//! ```

use anyhow::{bail, Result};

use super::{parse_key, parse_ref, ref_or_default};
use crate::cli::Context;
use crate::core::types::ContentKey;
use crate::engine::Client;
use crate::ui::output;

pub async fn contents(
    client: &Client,
    ctx: &Context,
    reference: Option<&str>,
    prefix: Option<&str>,
) -> Result<()> {
    let reference = ref_or_default(client, reference)?;
    let prefix = prefix.map(parse_key).transpose()?;
    let entries = client
        .list_contents(&reference, prefix)
        .await?
        .collect_all()
        .await?;

    if ctx.json {
        return output::json(&entries);
    }
    for entry in &entries {
        println!("{}", output::format_entry(entry));
    }
    Ok(())
}

pub async fn get(client: &Client, ctx: &Context, reference: &str, keys: &[String]) -> Result<()> {
    let reference = parse_ref(reference)?;
    let keys = keys
        .iter()
        .map(|k| parse_key(k))
        .collect::<Result<Vec<ContentKey>>>()?;

    let found = client.get_contents(&keys, &reference).await?;
    let missing: Vec<&ContentKey> = keys.iter().filter(|k| !found.contains_key(*k)).collect();

    if ctx.json {
        let entries: Vec<serde_json::Value> = found
            .iter()
            .map(|(key, content)| serde_json::json!({ "key": key, "content": content }))
            .collect();
        output::json(&entries)?;
    } else {
        for (key, content) in &found {
            println!("{}", output::format_content(key, content));
        }
    }

    if !missing.is_empty() {
        let names: Vec<String> = missing.iter().map(|k| k.to_string()).collect();
        bail!("not found at {}: {}", reference, names.join(", "));
    }
    Ok(())
}

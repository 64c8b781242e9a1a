//! `eventgate validate`: check a raw source config without starting it.

use std::path::Path;

use anyhow::Context;

use eventgate_sources::{SOURCE_TYPES, executor_for};

pub async fn cmd_validate(source_type: &str, file: &Path) -> anyhow::Result<()> {
    let Some(executor) = executor_for(source_type) else {
        anyhow::bail!(
            "unknown source type {source_type:?}, expected one of: {}",
            SOURCE_TYPES.join(", ")
        );
    };
    let raw = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    executor
        .validate(&raw)
        .await
        .with_context(|| format!("{} is not a valid {source_type} source", file.display()))?;
    println!("{}: valid {source_type} source", file.display());
    Ok(())
}

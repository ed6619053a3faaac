//! Rendering of extraction results

use crate::config::OutputFormat;
use anyhow::Result;
use colored::Colorize;
use docwalk_core::document::keys;
use docwalk_core::{Document, ResultSet};
use std::io::Write;

/// Write `result` to `out` in the requested format
///
/// # Errors
///
/// Fails if writing to `out` fails.
pub fn write_result(out: &mut impl Write, result: &ResultSet, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, result)?;
            writeln!(out)?;
        }
        OutputFormat::Text => {
            for (index, doc) in result.documents().iter().enumerate() {
                write_document(out, index, doc)?;
            }
        }
    }
    Ok(())
}

fn write_document(out: &mut impl Write, index: usize, doc: &Document) -> Result<()> {
    let path = doc
        .metadata_value(keys::EMBEDDED_RESOURCE_PATH)
        .unwrap_or("/");
    let parser = doc.metadata_value(keys::PARSED_BY).unwrap_or("unknown");
    let depth = doc.metadata_value(keys::EMBEDDED_DEPTH).unwrap_or("0");
    writeln!(
        out,
        "{} {} ({}, depth {})",
        format!("=== [{index}]").bold(),
        path.cyan(),
        parser,
        depth
    )?;

    for (key, values) in &doc.metadata {
        writeln!(out, "{}: {}", key.dimmed(), values.join(", "))?;
    }
    writeln!(out)?;
    if !doc.content.is_empty() {
        writeln!(out, "{}", doc.content)?;
        writeln!(out)?;
    }
    Ok(())
}

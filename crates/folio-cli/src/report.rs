//! Folio Report
//!
//! Summary of the connected database for the `--show` flag, plus the
//! document rendering shared by every printed section.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use folio_common::utils::{abbreviate, format_size};
use folio_common::Result;
use folio_document::{Client, Document, Query};
use serde_json::Value as JsonValue;
use std::io::Write;

/// Longest string printed in full; data URIs are shortened around an ellipsis.
const MAX_STRING_CHARS: usize = 72;

// =============================================================================
// Rendering
// =============================================================================

/// Pretty JSON with file references in their plain form.
pub fn render_document(doc: &Document) -> String {
    let json = shorten_strings(doc.to_json());
    serde_json::to_string_pretty(&json).unwrap_or_else(|_| doc.to_string())
}

fn shorten_strings(value: JsonValue) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(abbreviate(&s, MAX_STRING_CHARS)),
        JsonValue::Array(items) => JsonValue::Array(items.into_iter().map(shorten_strings).collect()),
        JsonValue::Object(map) => JsonValue::Object(
            map.into_iter()
                .map(|(k, v)| (k, shorten_strings(v)))
                .collect(),
        ),
        other => other,
    }
}

// =============================================================================
// Database Report
// =============================================================================

/// Print database, collections, document count, blobs and sample documents.
///
/// Failures are printed rather than returned; only output errors propagate.
pub fn print_db_info<W: Write>(
    client: &Client,
    collection: &str,
    sample: usize,
    out: &mut W,
) -> Result<()> {
    writeln!(out, "\n--- Database / collection information ---")?;
    if let Err(e) = write_db_info(client, collection, sample, out) {
        writeln!(out, "Error while reading database information: {}", e)?;
    }
    Ok(())
}

fn write_db_info<W: Write>(
    client: &Client,
    collection: &str,
    sample: usize,
    out: &mut W,
) -> Result<()> {
    writeln!(out, "Database: {} ({} storage)", client.database(), client.backend_name())?;
    writeln!(out, "Collections: [{}]", client.list_collection_names().join(", "))?;

    let handle = client.collection(collection)?;
    let all = Query::new();
    writeln!(
        out,
        "Document count in collection '{}': {}",
        collection,
        handle.count(&all)
    )?;

    let blobs = client.blobs();
    let listed = blobs.list()?;
    writeln!(
        out,
        "Blobs: {} ({})",
        listed.len(),
        format_size(blobs.total_size()?)
    )?;

    writeln!(out, "Showing up to {} sample documents:", sample)?;
    for (i, doc) in handle.find(&all.with_limit(sample)).enumerate() {
        writeln!(out, "\n--- Document {} ---", i + 1)?;
        writeln!(out, "{}", render_document(&doc))?;
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

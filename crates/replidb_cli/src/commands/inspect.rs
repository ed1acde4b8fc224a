//! Inspect command implementation.

use replidb_core::Database;
use serde::Serialize;
use std::path::Path;

/// Database inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Database path.
    pub path: String,
    /// Number of collections.
    pub collection_count: usize,
    /// Number of documents across collections.
    pub document_count: usize,
    /// Collection statistics (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<CollectionStats>>,
}

/// Statistics for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionStats {
    /// Collection name.
    pub name: String,
    /// Number of documents.
    pub document_count: usize,
    /// Documents received from a remote.
    pub replicated_count: usize,
    /// Local removals not yet pushed.
    pub pending_removals: usize,
    /// Replica id, if the collection was ever synced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_id: Option<String>,
    /// Sync cursor.
    pub last_synced: i64,
}

/// Collects statistics for the database at `path`.
pub fn inspect(path: &Path, show_collections: bool) -> Result<InspectResult, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No database found at {}", path.display()).into());
    }
    let db = Database::open(path)?;

    let mut collections = Vec::new();
    for name in db.collection_names() {
        let Some(collection) = db.get_collection(&name) else {
            continue;
        };
        let documents = collection.find_all();
        let attributes = collection.attributes();
        collections.push(CollectionStats {
            name,
            document_count: documents.len(),
            replicated_count: documents.iter().filter(|d| d.is_replicated()).count(),
            pending_removals: collection.removal_count(),
            replica_id: attributes.as_ref().map(|a| a.uuid.clone()),
            last_synced: attributes.map(|a| a.last_synced).unwrap_or_default(),
        });
    }

    Ok(InspectResult {
        path: path.display().to_string(),
        collection_count: collections.len(),
        document_count: collections.iter().map(|c| c.document_count).sum(),
        collections: show_collections.then_some(collections),
    })
}

/// Runs the inspect command.
pub fn run(path: &Path, show_collections: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = inspect(path, show_collections)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Database: {}", result.path);
    println!("Collections: {}", result.collection_count);
    println!("Documents: {}", result.document_count);

    if let Some(collections) = &result.collections {
        println!();
        for c in collections {
            println!("  {}", c.name);
            println!("    documents:        {} ({} replicated)", c.document_count, c.replicated_count);
            println!("    pending removals: {}", c.pending_removals);
            match &c.replica_id {
                Some(id) => println!("    replica:          {id} (last synced {})", c.last_synced),
                None => println!("    replica:          never synced"),
            }
        }
    }
}

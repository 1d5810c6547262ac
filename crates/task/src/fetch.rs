//! Bounded fan-out input fetching.
//!
//! The only concurrent part of a run: input resources are fetched in
//! parallel up to a fixed cap before sequential stage execution begins.
//! HTTP(S) references go through the shared client; anything else is
//! handed to the storage collaborator.

use std::path::Path;

use futures::stream::{self, StreamExt, TryStreamExt};

use terranode_core::error::{TaskError, TaskResult};

use crate::context::TaskContext;

/// Concurrency cap for input fetching.
const MAX_CONCURRENT_FETCHES: usize = 4;

/// Fetch every input resource into `dest`.
///
/// The first failure aborts the stage; in-flight fetches are dropped.
pub(crate) async fn fetch_inputs(
    resources: &[String],
    dest: &Path,
    ctx: &TaskContext,
) -> TaskResult<()> {
    tokio::fs::create_dir_all(dest).await?;

    tracing::info!(count = resources.len(), "Fetching input resources");
    let fetches: Vec<_> = resources
        .iter()
        .map(|resource| fetch_one(resource, dest, ctx))
        .collect();
    stream::iter(fetches)
        .buffer_unordered(MAX_CONCURRENT_FETCHES)
        .try_collect::<Vec<()>>()
        .await?;

    Ok(())
}

async fn fetch_one(resource: &str, dest: &Path, ctx: &TaskContext) -> TaskResult<()> {
    let target = dest.join(filename_from_ref(resource));

    if resource.starts_with("http://") || resource.starts_with("https://") {
        let response = ctx
            .http
            .get(resource)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| TaskError::Network(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TaskError::Network(e.to_string()))?;
        tokio::fs::write(&target, &bytes).await?;
    } else if let Some(storage) = &ctx.storage {
        storage
            .download_path(resource, &target)
            .await
            .map_err(|e| TaskError::Network(e.to_string()))?;
    } else {
        return Err(TaskError::Network(format!(
            "No storage configured to fetch '{resource}'"
        )));
    }

    tracing::debug!(resource, dest = %target.display(), "Fetched input");
    Ok(())
}

/// Last path segment of a reference, without query or fragment.
fn filename_from_ref(resource: &str) -> String {
    let clean = resource.split(['?', '#']).next().unwrap_or(resource);
    // Strip scheme and host so a bare-host URL cannot yield the hostname.
    let path = match clean.find("://") {
        Some(idx) => {
            let rest = &clean[idx + 3..];
            rest.find('/').map(|i| &rest[i + 1..]).unwrap_or("")
        }
        None => clean,
    };
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .unwrap_or("resource")
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

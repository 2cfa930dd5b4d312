// ABOUTME: One-shot publish: pull a single post from a source and push it to each destination
// ABOUTME: Destinations are attempted in order and the first failure stops the run

use crate::model::{Post, TransferOptions};
use crate::platforms::{DestinationAdapter, SourceAdapter};
use crate::Result;
use tracing::info;

/// Pull `specifier` from `source` and push it to every destination.
///
/// `base` carries the credentials and LLM settings; each adapter adds what it
/// needs. With `dry_run` the post is pulled but nothing is pushed.
pub async fn publish(
    source: &SourceAdapter,
    specifier: &str,
    destinations: &[DestinationAdapter],
    base: &TransferOptions,
    dry_run: bool,
) -> Result<Post> {
    let options = source.prepare(base, specifier).await?;
    let post = source.as_source().pull(&options).await?;
    info!(title = %post.title, source = %source.name(), "Pulled post");

    for destination in destinations {
        if dry_run {
            info!(
                title = %post.title,
                destination = %destination.name(),
                "Dry run, not pushing"
            );
            continue;
        }
        let options = destination.prepare(base).await?;
        destination.as_destination().push(&post, &options).await?;
        info!(
            title = %post.title,
            destination = %destination.name(),
            kind = %destination.kind(),
            "Published"
        );
    }

    Ok(post)
}

// ABOUTME: Builds source and destination adapters from configuration records
// ABOUTME: An empty selection means every configured entry; unknown names are an error

use super::{Blogger, DestinationAdapter, Markdown, SourceAdapter};
use crate::api::BloggerApi;
use crate::auth::Authorizer;
use crate::config::{Config, PlatformConfig};
use crate::watch::RetryPolicy;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Shared collaborators handed to every remote adapter.
#[derive(Clone)]
pub struct Services {
    pub api: BloggerApi,
    pub authorizer: Arc<dyn Authorizer>,
    pub retry: RetryPolicy,
}

fn build_blogger(config: &crate::config::BloggerConfig, services: &Services) -> Arc<Blogger> {
    Arc::new(
        Blogger::new(config, services.api.clone(), services.authorizer.clone())
            .with_retry(services.retry.clone()),
    )
}

pub fn build_source(config: &PlatformConfig, services: &Services) -> SourceAdapter {
    match config {
        PlatformConfig::Blogger(c) => SourceAdapter::Blogger(build_blogger(c, services)),
        PlatformConfig::Markdown(c) => SourceAdapter::Markdown(Arc::new(Markdown::new(c))),
    }
}

pub fn build_destination(config: &PlatformConfig, services: &Services) -> DestinationAdapter {
    match config {
        PlatformConfig::Blogger(c) => DestinationAdapter::Blogger(build_blogger(c, services)),
        PlatformConfig::Markdown(c) => DestinationAdapter::Markdown(Arc::new(Markdown::new(c))),
    }
}

fn select<'a>(
    kind: &str,
    entries: &'a [PlatformConfig],
    selected: &[String],
) -> Result<Vec<&'a PlatformConfig>> {
    if let Some(missing) = selected
        .iter()
        .find(|name| !entries.iter().any(|e| e.name() == name.as_str()))
    {
        return Err(Error::Config(format!(
            "selected {} `{}` not found in config",
            kind, missing
        )));
    }
    Ok(entries
        .iter()
        .filter(|e| selected.is_empty() || selected.iter().any(|name| name == e.name()))
        .collect())
}

/// Build the selected adapters, in configuration order.
pub fn load(
    config: &Config,
    services: &Services,
    selected_sources: &[String],
    selected_destinations: &[String],
) -> Result<(Vec<SourceAdapter>, Vec<DestinationAdapter>)> {
    let sources: Vec<SourceAdapter> = select("source", &config.sources, selected_sources)?
        .into_iter()
        .map(|c| build_source(c, services))
        .collect();
    let destinations: Vec<DestinationAdapter> =
        select("destination", &config.destinations, selected_destinations)?
            .into_iter()
            .map(|c| build_destination(c, services))
            .collect();

    debug!(
        sources = sources.len(),
        destinations = destinations.len(),
        "Loaded platforms"
    );
    Ok((sources, destinations))
}

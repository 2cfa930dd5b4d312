// ABOUTME: CLI entrypoint for the crossblog command
// ABOUTME: Sets up logging, wires configuration into adapters, maps errors to exit codes

use clap::Parser;
use crossblog::{
    api::BloggerApi,
    auth::{Authorizer, BrowserConsent, OAuthClient},
    cli::{Cli, Commands},
    config::{load_config, load_credentials, Credentials},
    platforms::{load, PlatformKind, Services},
    publish::publish,
    storage::persist_refresh_token,
    watch::{spawn_watch, WatchSettings},
    Error, Result, TransferOptions,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    if let Err(e) = run(cli).await {
        eprintln!("crossblog: [E{}] {}", e.exit_code(), e);
        std::process::exit(e.exit_code());
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Mint and store a refresh token first if none is configured yet.
async fn base_options(
    credentials: &Credentials,
    credentials_file: &Path,
    authorizer: &dyn Authorizer,
    needs_google: bool,
) -> Result<TransferOptions> {
    let oauth = if needs_google {
        let mut oauth = credentials.oauth()?;
        if oauth.refresh_token.is_empty() {
            let pair = authorizer
                .authorize(&oauth.client_id, &oauth.client_secret, "")
                .await?;
            persist_refresh_token(credentials_file, &pair.refresh_token)?;
            oauth.refresh_token = pair.refresh_token;
        }
        Some(oauth)
    } else {
        None
    };

    Ok(TransferOptions {
        credentials: oauth,
        llm: credentials.llm()?,
        ..Default::default()
    })
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli.config)?;
    let credentials = load_credentials(&cli.credentials_file)?.merge(cli.secrets.into_credentials());

    let token_url = config.api.token_url.clone();
    let consent = Arc::new(BrowserConsent::new(token_url.clone(), None)?);
    let authorizer = Arc::new(OAuthClient::new(token_url, consent)?);
    let services = Services {
        api: BloggerApi::new(config.api.blogger_base_url.clone())?,
        authorizer: authorizer.clone(),
        retry: config.watch.retry.clone().into(),
    };

    match cli.command {
        Commands::Auth => {
            let oauth = credentials.oauth()?;
            let pair = authorizer
                .authorize(&oauth.client_id, &oauth.client_secret, "")
                .await?;
            persist_refresh_token(&cli.credentials_file, &pair.refresh_token)?;
            println!(
                "Refresh token stored in {}",
                cli.credentials_file.display()
            );
        }
        Commands::Publish {
            source,
            specifier,
            destinations,
        } => {
            let (sources, destinations) = load(&config, &services, &[source], &destinations)?;
            let source = sources
                .into_iter()
                .next()
                .ok_or_else(|| Error::Config("no source selected".into()))?;
            let needs_google = source.kind() == PlatformKind::Blogger
                || destinations.iter().any(|d| d.kind() == PlatformKind::Blogger);
            let base = base_options(
                &credentials,
                &cli.credentials_file,
                authorizer.as_ref(),
                needs_google,
            )
            .await?;

            let post = publish(&source, &specifier, &destinations, &base, cli.dry_run).await?;
            println!("Published \"{}\" to {} destination(s)", post.title, destinations.len());
        }
        Commands::Watch {
            source,
            destinations,
        } => {
            if cli.dry_run {
                warn!("--dry-run only applies to publish; watch will push");
            }
            let (sources, destinations) = load(&config, &services, &[source], &destinations)?;
            let source = sources
                .into_iter()
                .next()
                .ok_or_else(|| Error::Config("no source selected".into()))?;
            let base = base_options(
                &credentials,
                &cli.credentials_file,
                authorizer.as_ref(),
                true,
            )
            .await?;

            let settings = WatchSettings {
                interval: config.watch.interval(),
                cleanup_interval: config.watch.cleanup_interval(),
                retry: services.retry.clone(),
            };
            let handle = spawn_watch(&source, destinations, base, &settings)?;

            let cancel = handle.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Interrupted, stopping");
                    cancel.cancel();
                }
            });

            handle.wait().await?;
        }
    }

    Ok(())
}

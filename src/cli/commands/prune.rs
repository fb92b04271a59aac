//! Prune command - compute keepers, then prune the selected cache

use crate::cache::{
    format_bytes, gb_to_bytes, ImageCache, LocalDirectory, ObjectStoreBucket, S3Location, S3Store,
};
use crate::cli::args::{BackendArgs, Cli};
use crate::config::Config;
use crate::error::{PruneError, PruneResult};
use crate::forge::{parse_repository_slug, GithubPulls};
use crate::git::Git;
use crate::keepers::{KeeperScanner, KeeperSet, RemoteScan, RemoteTarget};
use crate::prune::{PruneOptions, PrunePolicy, PruneReport, Pruner, RetainReason};
use chrono::Utc;
use console::style;
use tracing::{debug, info};

/// Execute a prune run
pub async fn execute(cli: &Cli, config: &Config) -> PruneResult<()> {
    let cache = open_cache(&cli.backend, config).await?;
    let keepers = compute_keepers(cli, config).await?;
    debug!(keepers = ?keepers.sorted(), "protected images");

    let options = PruneOptions {
        force: cli.force,
        dry_run: cli.dry_run,
    };
    let report = Pruner::new(PrunePolicy::from_days(config.cache.max_age_days))
        .prune(&*cache, &keepers, options)
        .await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, keepers.len());
    }

    if report.pressure_remains {
        return Err(PruneError::InsufficientSpaceAfterPrune {
            cache: report.cache,
        });
    }
    Ok(())
}

/// Build the backend selected on the command line
async fn open_cache(backend: &BackendArgs, config: &Config) -> PruneResult<Box<dyn ImageCache>> {
    if let Some(url) = &backend.s3 {
        let location = S3Location::parse(url)?;
        let store = S3Store::connect(&location, &config.s3).await;
        return Ok(Box::new(ObjectStoreBucket::new(
            store,
            location.prefix,
            config.s3.quota_bytes,
        )));
    }

    let directory = backend
        .directory
        .clone()
        .unwrap_or_else(|| config.cache.directory_or_default());
    Ok(Box::new(LocalDirectory::new(
        directory,
        gb_to_bytes(config.cache.min_free_gb),
    )))
}

async fn compute_keepers(cli: &Cli, config: &Config) -> PruneResult<KeeperSet> {
    let git = Git::new(cli.repo.clone().unwrap_or_else(|| config.repo.path.clone()));
    let scanner = KeeperScanner::new(&config.repo.images_dir, config.repo.branch_patterns.clone());
    let include_branches = !cli.checkout_only;

    if !cli.scan_remote() {
        info!("remote keeper scan skipped");
        return scanner
            .compute_keepers(&git, "HEAD", include_branches, None)
            .await;
    }

    let target = remote_target(cli, config, &git).await?;
    let pulls = GithubPulls::new(&config.remote.github_api_url);
    let remote = RemoteScan {
        target: &target,
        pulls: &pulls,
    };
    scanner
        .compute_keepers(&git, "HEAD", include_branches, Some(remote))
        .await
}

/// Resolve the hosted repository: flag, then config, then `origin`
async fn remote_target(cli: &Cli, config: &Config, git: &Git) -> PruneResult<RemoteTarget> {
    let repository = match cli
        .remote_repo
        .clone()
        .or_else(|| config.remote.repository.clone())
    {
        Some(repository) => repository,
        None => {
            let url = git.remote_url("origin").await.map_err(|_| {
                PruneError::RemoteUnknown(format!(
                    "no origin remote in {}",
                    git.path().display()
                ))
            })?;
            parse_repository_slug(&url).ok_or_else(|| {
                PruneError::RemoteUnknown(format!("cannot derive OWNER/NAME from '{url}'"))
            })?
        }
    };

    let fetch_url = config.remote.fetch_url.clone().unwrap_or_else(|| {
        format!(
            "{}/{}",
            config.remote.github_web_url.trim_end_matches('/'),
            repository
        )
    });

    Ok(RemoteTarget {
        fetch_url,
        repository,
    })
}

fn print_report(report: &PruneReport, keeper_count: usize) {
    let deleted: Vec<_> = report.deleted().collect();
    let verb = if report.dry_run { "Would delete" } else { "Deleted" };

    println!("Cache: {}", report.cache);
    println!("Keepers: {}", keeper_count);
    println!();

    if deleted.is_empty() {
        println!("Nothing to prune.");
    } else {
        println!("{} {} image(s):", verb, deleted.len());
        let now = Utc::now();
        for entry in &deleted {
            let age_days = (now - entry.mtime).num_days();
            match entry.size {
                Some(size) => println!(
                    "  {} {} ({} days old, {})",
                    style("•").red(),
                    entry.name,
                    age_days,
                    format_bytes(size)
                ),
                None => println!(
                    "  {} {} ({} days old)",
                    style("•").red(),
                    entry.name,
                    age_days
                ),
            }
        }
        let freed = report.freed_bytes();
        if freed > 0 {
            println!("  {} {}", style("freed").dim(), format_bytes(freed));
        }
    }

    let count = |reason: RetainReason| report.retained().filter(|(_, r)| *r == reason).count();
    println!();
    println!(
        "Retained: {} keeper(s), {} fresh, {} other file(s)",
        count(RetainReason::Keeper),
        count(RetainReason::Fresh),
        count(RetainReason::UnrecognizedExtension)
    );

    if report.dry_run {
        println!();
        println!("Dry run - no images removed.");
    } else if !deleted.is_empty() {
        println!("{} removed {} image(s)", style("✓").green(), deleted.len());
    }
}

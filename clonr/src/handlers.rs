use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use clonr_core::report::{ReportData, ReportFormat, generate_report, save_report};
use clonr_core::{
    DelayRange, MirrorConfig, MirrorEvent, ProgressCallback, RunSummary, SessionScope,
    TraversalOrder, execute_http_clone, load_state,
};
use clonr_scanner::QueryPolicy;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Parse a seed, adding `https://` when no scheme was given.
pub fn parse_seed(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if let Ok(url) = Url::parse(line)
        && matches!(url.scheme(), "http" | "https")
        && url.host_str().is_some()
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("https://{}", line);
    match Url::parse(&with_scheme) {
        Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) => Some(with_scheme),
        _ => None,
    }
}

pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

/// Stderr logging; `RUST_LOG` wins over the default level.
pub fn init_tracing(quiet: bool) {
    let default_level = if quiet { "warn" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn seed_config(args: &ArgMatches) -> Result<MirrorConfig> {
    let raw = args
        .get_one::<String>("URL")
        .ok_or_else(|| anyhow!("a seed URL is required"))?;
    let seed = parse_seed(raw).ok_or_else(|| anyhow!("invalid seed URL '{}'", raw))?;
    let mut config = MirrorConfig::new(&seed)?;
    if let Some(output) = args.get_one::<String>("output") {
        config = config.with_output_root(expand_path(output));
    }
    Ok(config)
}

/// Translate `clone` arguments into a run configuration.
pub fn build_config(args: &ArgMatches) -> Result<MirrorConfig> {
    let mut config = seed_config(args)?
        .with_max_pages(*args.get_one::<usize>("max-pages").unwrap_or(&50))
        .with_max_depth(*args.get_one::<usize>("max-depth").unwrap_or(&3))
        .with_collect_only(args.get_flag("collect-only"))
        .with_max_attempts(*args.get_one::<u32>("retries").unwrap_or(&3))
        .with_discovery_timeout(Duration::from_secs(
            *args.get_one::<u64>("discovery-timeout").unwrap_or(&15),
        ))
        .with_render_timeout(Duration::from_secs(
            *args.get_one::<u64>("render-timeout").unwrap_or(&60),
        ))
        .with_delay(DelayRange::from_millis(
            *args.get_one::<u64>("min-delay-ms").unwrap_or(&2000),
            *args.get_one::<u64>("max-delay-ms").unwrap_or(&5000),
        ))
        .with_proxy_file(args.get_one::<String>("proxy-file").map(|p| expand_path(p)));

    if args.get_flag("keep-query") {
        config = config.with_query_policy(QueryPolicy::Keep);
    }
    if args.get_flag("depth-first") {
        config = config.with_traversal(TraversalOrder::DepthFirst);
    }
    if args.get_flag("session-per-page") {
        config = config.with_session_scope(SessionScope::PerPage);
    }
    if let Some(ua) = args.get_one::<String>("user-agent") {
        config = config.with_user_agent(ua.clone());
    }

    config.validate()?;
    Ok(config)
}

fn report_format(args: &ArgMatches) -> ReportFormat {
    args.get_one::<String>("format")
        .and_then(|f| ReportFormat::from_str(f))
        .unwrap_or(ReportFormat::Text)
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    bar.set_message("Discovering pages...");
    bar
}

/// Drive the progress bar from run events.
pub fn progress_reporter(bar: ProgressBar) -> ProgressCallback {
    Arc::new(move |event: MirrorEvent| match event {
        MirrorEvent::Discovered {
            url, new_children, ..
        } => {
            bar.inc(1);
            bar.set_message(format!("discovered {} (+{})", url, new_children));
        }
        MirrorEvent::DiscoverySkipped { url, depth } => {
            bar.set_message(format!("too deep ({}): {}", depth, url));
        }
        MirrorEvent::PageStarted { url, index, total } => {
            if index == 0 {
                bar.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=> "),
                );
                bar.set_length(total as u64);
            }
            bar.set_position(index as u64);
            bar.set_message(format!("cloning {}", url));
        }
        MirrorEvent::PageCloned { url, .. } => {
            bar.inc(1);
            bar.println(format!("{} {}", "✓".green(), url));
        }
        MirrorEvent::PageRetry {
            url,
            attempt,
            max_attempts,
            error,
        } => {
            bar.println(format!(
                "{} {} attempt {}/{} failed: {}",
                "↻".yellow(),
                url,
                attempt,
                max_attempts,
                error
            ));
        }
        MirrorEvent::PageSkipped { url, attempts } => {
            bar.inc(1);
            bar.println(format!(
                "{} {} skipped after {} attempt(s)",
                "✗".red(),
                url,
                attempts
            ));
        }
        MirrorEvent::Delay(delay) => {
            bar.set_message(format!("waiting {:.1}s", delay.as_secs_f64()));
        }
    })
}

fn emit_report(data: &ReportData, format: ReportFormat, output: Option<&Path>) -> Result<()> {
    let content = generate_report(data, format).context("failed to render report")?;
    match output {
        Some(path) => {
            save_report(&content, path)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            println!("{} Report saved to {}", "✓".green().bold(), path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, config: &MirrorConfig) {
    let headline = if summary.collect_only {
        format!("Collected {} URL(s)", summary.pages_discovered)
    } else {
        format!(
            "Mirrored {} of {} page(s)",
            summary.total_done, summary.pages_discovered
        )
    };
    eprintln!("\n{} {}", "✓".green().bold(), headline.bold());
    eprintln!("  Output:  {}", config.output_root.display());
    if !summary.skipped.is_empty() {
        eprintln!(
            "  {} {} page(s) skipped; run again to retry them",
            "⚠".yellow(),
            summary.skipped.len()
        );
    }
}

pub async fn handle_clone(args: &ArgMatches, quiet: bool) -> Result<()> {
    let config = build_config(args)?;
    let format = report_format(args);
    debug!(?config, "Starting clone");

    let bar = if quiet { ProgressBar::hidden() } else { progress_bar() };
    let progress = progress_reporter(bar.clone());

    let summary = execute_http_clone(&config, Some(progress)).await;
    bar.finish_and_clear();
    let summary = summary
        .with_context(|| format!("clone of {} failed", config.seed))?;

    if !quiet {
        print_summary(&summary, &config);
    }

    let state = load_state(&config)?.unwrap_or_default();
    let data = ReportData::from_state(config.seed.as_str(), &state, Some(&summary));
    let output = args.get_one::<PathBuf>("report").map(|p| expand_path(&p.to_string_lossy()));
    emit_report(&data, format, output.as_deref())
}

pub fn handle_status(args: &ArgMatches) -> Result<()> {
    let config = seed_config(args)?;
    let format = report_format(args);

    match load_state(&config)? {
        Some(state) => {
            let data = ReportData::from_state(config.seed.as_str(), &state, None);
            emit_report(&data, format, None)
        }
        None => {
            println!(
                "{} No saved state for {} under {}",
                "⚠".yellow(),
                config.seed_host(),
                config.output_root.display()
            );
            Ok(())
        }
    }
}

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use proxy_geotz::{
    batch::{BatchOrchestrator, RunEvent, RunReport},
    proxy::{
        parser::save_lines,
        probe::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_SECS},
        CandidateList, GeoProbe, IpInfoProbe, ProbeOutcome, ProviderClient, ProxyParser,
    },
    timezone::{format_offset, parse_offset, TimezoneAlignment, TimezoneCatalog, TimezoneMatcher},
    tui::BatchApp,
    Config,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Timeout for a one-off detect probe in seconds
const DETECT_TIMEOUT_SECS: u64 = 15;

/// Test HTTP proxies for geolocation and match their timezone to this host
#[derive(Parser)]
#[command(name = "proxy-geotz")]
#[command(about = "Test HTTP proxies for geolocation and match their timezone to this host")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse proxies from a file
    Parse {
        /// Input file containing proxies
        input: PathBuf,
        /// Output file for parsed proxies
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test proxies one by one and match each working proxy's timezone
    Check {
        /// Input file containing proxies
        input: Option<PathBuf>,
        /// Pull the list from the provider instead of a file
        #[arg(long, conflicts_with = "input")]
        fetch: bool,
        /// Timeout per proxy in seconds
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, value_parser = clap::value_parser!(u64).range(5..=60))]
        timeout: u64,
        /// Test every proxy instead of stopping at the first working one
        #[arg(long)]
        all: bool,
        /// IP-info endpoint to probe
        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,
        /// Output file for working proxies
        #[arg(short, long)]
        good: Option<PathBuf>,
        /// File rewritten with the untested lines as the run progresses
        #[arg(long)]
        remaining: Option<PathBuf>,
        /// Output file for all results as JSON
        #[arg(long)]
        json: Option<PathBuf>,
        /// Show the interactive TUI
        #[arg(long)]
        tui: bool,
    },
    /// Fetch a proxy list from the provider
    Fetch {
        /// Output file for the fetched list
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Probe once and compare the detected timezone with this host's
    Detect {
        /// Proxy line (HOST:PORT or HOST:PORT:USER:PASS); direct when omitted
        #[arg(long)]
        proxy: Option<String>,
        /// Timeout in seconds
        #[arg(long, default_value_t = DETECT_TIMEOUT_SECS)]
        timeout: u64,
        /// IP-info endpoint to probe
        #[arg(long, default_value = DEFAULT_ENDPOINT)]
        endpoint: String,
    },
    /// List platform timezones, or pick one for a UTC offset
    Timezones {
        /// Manual offset such as UTC+05:30
        #[arg(long)]
        offset: Option<String>,
    },
    /// Switch the system timezone to a platform id
    SetTimezone {
        /// Platform timezone id, as listed by `timezones`
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The TUI owns the terminal, so diagnostics stay off there.
    let tui_mode = matches!(cli.command, Commands::Check { tui: true, .. });
    if !tui_mode {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Parse { input, output } => {
            let list = ProxyParser::parse_file(&input)?;

            println!(
                "Parsed {} proxies from {:?} ({} lines skipped)",
                list.len(),
                input,
                list.skipped()
            );

            if let Some(output_path) = output {
                ProxyParser::save_to_file(list.candidates(), &output_path, true)?;
                println!("Saved parsed proxies to {:?}", output_path);
            } else {
                for proxy in list.candidates() {
                    println!("{}", proxy.display());
                }
            }
        }
        Commands::Check {
            input,
            fetch,
            timeout,
            all,
            endpoint,
            good,
            remaining,
            json,
            tui,
        } => {
            let config = Config::new()
                .with_endpoint(endpoint)
                .with_timeout(Duration::from_secs(timeout))
                .with_stop_on_first_success(!all);

            let list = match (input, fetch) {
                (Some(path), _) => ProxyParser::parse_file(&path)?,
                (None, true) => {
                    let client = ProviderClient::with_config(config.provider.clone())?;
                    CandidateList::from_lines(client.fetch_list().await?)
                }
                (None, false) => bail!("Provide an input file or use --fetch"),
            };

            let total = list.len();
            let line_count = list.lines().len();
            if !tui {
                println!(
                    "Loaded {} proxies ({} lines skipped)",
                    total,
                    list.skipped()
                );
                println!(
                    "Timeout: {}s, endpoint: {}, stop on first success: {}",
                    timeout, config.probe.endpoint, config.run.stop_on_first_success
                );
                println!();
            }

            let probe: Arc<dyn GeoProbe> = Arc::new(IpInfoProbe::with_config(config.probe.clone()));
            let matcher = Arc::new(TimezoneMatcher::global());
            let orchestrator = BatchOrchestrator::new(probe, matcher);
            let mut handle = orchestrator.start(list, config.run.clone())?;

            let report = if tui {
                let mut app = BatchApp::new(handle, total, line_count)
                    .with_good_output(good)
                    .with_remaining_output(remaining);
                app.run().await?
            } else {
                let token = handle.cancel_token();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupt received, stopping after the current proxy");
                        token.cancel();
                    }
                });

                while let Some(event) = handle.recv().await {
                    match event {
                        RunEvent::Log(line) => println!("{}", line),
                        RunEvent::Remaining(lines) => {
                            if let Some(path) = &remaining {
                                save_lines(&lines, path)?;
                            }
                        }
                        RunEvent::Row(_) | RunEvent::Progress { .. } | RunEvent::Finished(_) => {}
                    }
                }
                let report = handle.join().await?;

                if let Some(good_path) = good {
                    let working: Vec<_> = report.working().map(|r| r.candidate.clone()).collect();
                    ProxyParser::save_to_file(&working, &good_path, true)?;
                    println!("Saved {} working proxies to {:?}", working.len(), good_path);
                }
                report
            };

            if let Some(json_path) = json {
                write_report(&report, &json_path)?;
                println!("Saved {} results to {:?}", report.records.len(), json_path);
            }

            print_summary(&report);
        }
        Commands::Fetch { output } => {
            let config = Config::default();
            let client = ProviderClient::with_config(config.provider)?;
            let lines = client.fetch_list().await?;

            println!("Fetched {} proxies", lines.len());
            if let Some(output_path) = output {
                save_lines(&lines, &output_path)?;
                println!("Saved proxies to {:?}", output_path);
            } else {
                for line in &lines {
                    println!("{}", line);
                }
            }
        }
        Commands::Detect {
            proxy,
            timeout,
            endpoint,
        } => {
            let candidate = proxy
                .as_deref()
                .map(|line| {
                    ProxyParser::parse_line(line)
                        .ok_or_else(|| anyhow!("Invalid proxy line: {}", line))
                })
                .transpose()?;

            let config = Config::new().with_endpoint(endpoint);
            let probe = IpInfoProbe::with_config(config.probe);
            let target = candidate
                .as_ref()
                .map_or_else(|| "direct".to_string(), |c| c.display());
            println!("Detecting via {}...", target);

            let (geo, latency_ms) = match probe
                .probe(candidate.as_ref(), Duration::from_secs(timeout))
                .await
            {
                ProbeOutcome::Success { geo, latency_ms } => (geo, latency_ms),
                ProbeOutcome::Failure { kind, latency_ms } => {
                    bail!("Detection failed: {} ({}ms)", kind, latency_ms)
                }
            };

            let matcher = TimezoneMatcher::global();
            let timezone = geo.timezone.clone();
            let lookup = matcher.clone();
            let matched =
                tokio::task::spawn_blocking(move || lookup.match_iana(&timezone)).await?;

            println!("IP:        {}", geo.ip);
            println!("Country:   {}", geo.country);
            println!("Timezone:  {}", geo.timezone);
            println!("Latency:   {}ms", latency_ms);
            println!("Platform:  {}", matched);

            match matcher.catalog().platform().current_id() {
                Ok(current) => {
                    println!("Current:   {}", current);
                    println!("{}", TimezoneAlignment::check(&current, &matched));
                }
                Err(e) => warn!(error = %e, "could not read the current timezone"),
            }
        }
        Commands::Timezones { offset } => {
            let catalog = TimezoneCatalog::global();
            match offset {
                Some(text) => {
                    let minutes = parse_offset(&text)
                        .ok_or_else(|| anyhow!("Invalid offset: {}. Use UTC±HH:MM", text))?;
                    let matched = TimezoneMatcher::new(catalog).match_offset(minutes)?;
                    println!("{} -> {}", format_offset(minutes), matched);
                }
                None => {
                    let entries = catalog.entries()?;
                    for entry in entries.iter() {
                        println!("{}\t{}", entry.platform_id, entry.display_label);
                    }
                    info!(count = entries.len(), "listed platform timezones");
                }
            }
        }
        Commands::SetTimezone { id } => {
            TimezoneCatalog::global()
                .platform()
                .set_current(&id)
                .with_context(|| format!("Failed to set timezone to {}", id))?;
            println!("Timezone set to {}", id);
        }
    }

    Ok(())
}

fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

fn print_summary(report: &RunReport) {
    let working: Vec<_> = report.working().collect();
    println!();
    println!(
        "Run {}: {} tested, {} working",
        report.state,
        report.records.len(),
        working.len()
    );

    if !working.is_empty() {
        println!("\nWorking proxies:");
        for record in working {
            println!("  {}", record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_rejects_input_with_fetch() {
        assert!(Cli::try_parse_from(["proxy-geotz", "check", "list.txt", "--fetch"]).is_err());
        assert!(Cli::try_parse_from(["proxy-geotz", "check", "--fetch"]).is_ok());
        assert!(Cli::try_parse_from(["proxy-geotz", "check", "list.txt"]).is_ok());
    }
}

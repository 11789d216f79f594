//! Run a Rhythm against a fixture

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::*;
use rhythm_domus::SandboxClient;
use rhythm_runtime::FilterDomain;
use rhythm_transport::{link, Domain};
use rhythm_types::RhythmSource;
use tracing::info;

use crate::config::CliConfig;
use crate::fixture::Fixture;
use crate::output::{post_rows, print_output, print_single, print_success, print_warning, OutputFormat};

/// Arguments for `rhythm run`
#[derive(Args)]
pub struct RunArgs {
    /// Rhythm script
    #[arg(short, long)]
    pub rhythm: PathBuf,

    /// JSON fixture with streams, posts, takes and the request
    #[arg(short, long)]
    pub fixture: PathBuf,

    /// Rhythm name; defaults to the script's file stem
    #[arg(long)]
    pub name: Option<String>,

    /// Rhythm version
    #[arg(long, default_value = "0")]
    pub version: String,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table")]
    pub output: OutputFormat,
}

fn rhythm_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("rhythm")
        .to_string()
}

/// Execute a run
pub async fn execute(args: RunArgs, config: &CliConfig) -> Result<()> {
    let source = std::fs::read_to_string(&args.rhythm)
        .with_context(|| format!("reading rhythm {}", args.rhythm.display()))?;
    let fixture = Fixture::from_path(&args.fixture)?;
    let host = fixture.host(&config.misc)?;

    let user = &fixture.request.user;
    let rhythm = RhythmSource {
        domain: user.domain.clone(),
        username: user.username.clone(),
        name: args.name.clone().unwrap_or_else(|| rhythm_name(&args.rhythm)),
        version: args.version.clone(),
        source,
    };
    let request = fixture.sort_request(rhythm);

    let (domus_end, filter_end) = link(
        Domain::new(format!("domus.{}", user.domain)),
        Domain::new(format!("filter.{}", user.domain)),
        64,
    );
    let client = SandboxClient::connect(domus_end, host.clone(), config.client.clone());
    let filter = FilterDomain::start(filter_end, config.filter.clone()).await?;
    client.await_ready().await?;

    let kindred = fixture.kindred(&host).await?;
    info!(entries = kindred.len(), "Kindred prepared");
    client.send_kindred(&kindred).await?;

    let outcome = client.run(&request).await;

    for fault in host.faults().await {
        print_warning(&format!("sandbox fault at {}: {}", fault.received_at, fault.report));
    }
    filter.shutdown();
    client.shutdown();

    let result = match outcome {
        Ok(result) => result,
        Err(report) => {
            if matches!(args.output, OutputFormat::Json) {
                print_single(&report);
            }
            bail!("sort failed: {}", report);
        }
    };

    match args.output {
        OutputFormat::Json => print_single(&result),
        OutputFormat::Table => {
            let count = result.posts.len();
            print_output(post_rows(&result), OutputFormat::Table);
            print_success(&format!(
                "{} posts ranked by {}",
                count,
                request.rhythm.identity().bold()
            ));
        }
    }
    Ok(())
}

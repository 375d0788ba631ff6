use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::EnvFilter;

use ratelimit_client::config::{ClientConfig, LoggingConfig};
use ratelimit_client::span::TRACE_STATUS;
use ratelimit_client::{check, factory_from_config, Decision, Descriptor, LimitStatus, Span};

/// Ask a rate limit service whether a request should be allowed.
///
/// Exits 0 when the request is allowed, 1 when it is over limit and 2 when
/// no decision could be obtained.
#[derive(Parser, Debug)]
#[command(name = "ratelimit-check", version)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rate limit service URI, overriding the configuration
    #[arg(short, long)]
    target: Option<String>,

    /// Rate limit domain
    #[arg(short, long)]
    domain: String,

    /// Descriptor as key=value[,key=value...]; repeat for multiple descriptors
    #[arg(short = 'D', long = "descriptor", required = true)]
    descriptors: Vec<Descriptor>,

    /// Per-call timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Print the decision as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let mut config = ClientConfig::load(args.config.as_deref())?;
    if let Some(target) = args.target {
        config
            .rate_limit_service
            .get_or_insert_with(Default::default)
            .target = target;
    }

    init_tracing(&config.logging);

    let factory = factory_from_config(&config)?;
    if factory.rate_limit_config().is_none() {
        warn!("Rate limiting is disabled, every request is allowed");
    }

    let mut client = factory.create(args.timeout_ms.map(Duration::from_millis));

    let span = info_span!(
        "ratelimit_check",
        domain = %args.domain,
        descriptor_count = args.descriptors.len(),
        ratelimit_status = tracing::field::Empty,
    );
    let tagged: Arc<dyn Span> = Arc::new(span.clone());

    let decision = tokio::select! {
        decision = check(client.as_mut(), &args.domain, &args.descriptors, tagged).instrument(span) => decision,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, cancelling rate limit check");
            None
        }
    };
    client.cancel();

    let decision = decision.unwrap_or(Decision {
        status: LimitStatus::Error,
        metadata: None,
    });

    print_decision(&decision, args.json)?;

    Ok(ExitCode::from(match decision.status {
        LimitStatus::Ok => 0,
        LimitStatus::OverLimit => 1,
        LimitStatus::Error => 2,
    }))
}

/// Logs go to stderr so stdout carries only the decision.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn print_decision(decision: &Decision, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(decision)?);
        return Ok(());
    }

    println!("{}: {}", TRACE_STATUS, decision.status);

    if let Some(metadata) = &decision.metadata {
        for header in &metadata.response_headers {
            println!("response header {}: {}", header.key, header.value);
        }
        for header in &metadata.request_headers {
            println!("request header {}: {}", header.key, header.value);
        }
        for (index, outcome) in metadata.statuses.iter().enumerate() {
            match &outcome.current_limit {
                Some(limit) => println!(
                    "descriptor {}: {} ({} remaining of {} per {})",
                    index,
                    outcome.status,
                    outcome.limit_remaining,
                    limit.requests_per_unit,
                    limit.unit.map_or("unknown", |u| u.as_str()),
                ),
                None => println!("descriptor {}: {}", index, outcome.status),
            }
        }
    }

    Ok(())
}

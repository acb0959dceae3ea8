use clap::{Args, Parser, Subcommand, ValueEnum};
use flowsmoke::application::engine::SmokeEngine;
use flowsmoke::application::mock::MockReport;
use flowsmoke::config::Config;
use flowsmoke::domain::flow::{RunKind, flow_key};
use flowsmoke::domain::ports::GatewayRef;
use flowsmoke::domain::status::StatusRecord;
use flowsmoke::error::Result as SmokeResult;
use flowsmoke::infrastructure::http::HttpGateway;
use flowsmoke::infrastructure::scripted::ScriptedGateway;
use flowsmoke::interfaces::json::template_reader::TemplateReader;
use flowsmoke::interfaces::report::report_writer::{ReportWriter, save_report};
use miette::{IntoDiagnostic, Result};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Target environment, selects `<config-dir>/<env>/config.yaml`
    #[arg(long, global = true, default_value = "ua1")]
    env: String,

    /// Explicit configuration file, overrides the environment lookup
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "config")]
    config_dir: PathBuf,

    /// Answer every request from an in-process scripted gateway
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dispatch flows, optionally mock downstream services, and print a report
    Smoke(SmokeArgs),
    /// Fire one flow at a fixed rate per second
    Burst {
        flow: String,
        #[arg(long, default_value_t = 5)]
        tps: u32,
        #[arg(long, default_value_t = 1)]
        minutes: u64,
        /// Remittance info for the run; a generated NFT label when omitted
        #[arg(long)]
        remittance: Option<String>,
    },
    /// Fire two flows every interval until Ctrl-C
    Soak {
        flow_a: String,
        flow_b: String,
        /// Dispatches of each flow per interval
        #[arg(long, default_value_t = 1)]
        count: usize,
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
        interval_minutes: u64,
        /// Expected run length, used for the logged estimate only
        #[arg(long, default_value_t = 60)]
        minutes: u64,
        #[arg(long)]
        remittance: Option<String>,
    },
    /// Trigger the extraction endpoint at a fixed rate per second
    Extraction {
        #[arg(long, default_value_t = 5)]
        tps: u32,
        #[arg(long, default_value_t = 1)]
        minutes: u64,
    },
    /// Print the prepared request body of flows
    Payload {
        /// Flows to print (all when omitted)
        flows: Vec<String>,
        /// Print the return leg instead of the forward leg
        #[arg(long)]
        returns: bool,
    },
}

#[derive(Args)]
struct SmokeArgs {
    /// Flows to dispatch (all when omitted)
    flows: Vec<String>,

    /// Also dispatch the return leg of every successful flow
    #[arg(long)]
    returns: bool,

    /// Flows to trigger with isBusinessLive 'N'
    #[arg(long, value_delimiter = ',')]
    mocked: Vec<String>,

    #[arg(long)]
    all_mocked: bool,

    /// Switch incoming flows between the gc2 and gxp source systems
    #[arg(long)]
    toggle_source_system: bool,

    /// Mocked responses to post after dispatch, in order
    #[arg(long, value_enum, value_delimiter = ',')]
    mock: Vec<MockStep>,

    /// Seconds to wait for the backend before each report or update round
    #[arg(long, default_value_t = 0)]
    settle_secs: u64,

    /// Rounds of re-dispatching flows that have not completed
    #[arg(long, default_value_t = 0)]
    update_rounds: u32,

    #[arg(short, long)]
    verbose: bool,

    /// Report return results where a flow has one
    #[arg(long)]
    prefer_returns: bool,

    /// Save the verbose report under the configured report directory
    #[arg(long)]
    save: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum MockStep {
    Sanctions,
    Funds,
    Posting,
    Clearing,
    FundsBook,
    PostingBook,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let path = cli
        .config
        .clone()
        .unwrap_or_else(|| Config::path_for_env(&cli.config_dir, &cli.env));
    let config = Config::from_file(&path).into_diagnostic()?;

    let gateway: GatewayRef = if cli.dry_run {
        info!("Dry run, no request leaves this process");
        Arc::new(
            ScriptedGateway::new()
                .with_call_log(0)
                .with_auto_status(dry_run_status()),
        )
    } else {
        Arc::new(
            HttpGateway::new(&config.endpoint, config.scheduler.request_timeout())
                .into_diagnostic()?,
        )
    };

    let engine = SmokeEngine::new(&config, gateway);
    engine
        .reload(&TemplateReader::new(config.main_dir(), config.return_dir()))
        .await
        .into_diagnostic()?;

    match cli.command {
        Command::Smoke(args) => smoke(&engine, &config, args).await.into_diagnostic()?,
        Command::Burst {
            flow,
            tps,
            minutes,
            remittance,
        } => {
            let report = engine
                .run_burst_schedule(&flow, tps, minutes, remittance)
                .await
                .into_diagnostic()?;
            println!(
                "{}: {} requests ({} accepted) in {:.2}s, {:.2} TPS",
                flow_key(&flow),
                report.dispatched,
                report.accepted,
                report.elapsed.as_secs_f64(),
                report.mean_tps
            );
        }
        Command::Soak {
            flow_a,
            flow_b,
            count,
            interval_minutes,
            minutes,
            remittance,
        } => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Ctrl-C handler failed: {e}");
                    std::future::pending::<()>().await;
                }
                info!("Stopping after the current batch ...");
            };
            let report = engine
                .run_interval_schedule(
                    &flow_a,
                    &flow_b,
                    count,
                    interval_minutes,
                    minutes,
                    remittance,
                    shutdown,
                )
                .await
                .into_diagnostic()?;
            println!(
                "{} batches, {} requests ({} accepted) in {:.2}s",
                report.batches,
                report.dispatched,
                report.accepted,
                report.elapsed.as_secs_f64()
            );
        }
        Command::Extraction { tps, minutes } => {
            let report = engine.run_extraction_schedule(tps, minutes).await;
            println!(
                "extraction: {} triggers ({} accepted) in {:.2}s, {:.2} TPS",
                report.dispatched,
                report.accepted,
                report.elapsed.as_secs_f64(),
                report.mean_tps
            );
        }
        Command::Payload { flows, returns } => {
            let kind = if returns {
                RunKind::Return
            } else {
                RunKind::Forward
            };
            let registry = engine.registry().read().await;
            let flows = if flows.is_empty() {
                match kind {
                    RunKind::Forward => registry.forward_flows(),
                    RunKind::Return => registry.return_flows(),
                }
            } else {
                flows.iter().map(|flow| flow_key(flow).to_string()).collect()
            };
            for flow in flows {
                let body = registry.prepare(&flow, kind).into_diagnostic()?;
                println!(
                    "[{flow}]\n{}",
                    serde_json::to_string_pretty(&body).into_diagnostic()?
                );
            }
        }
    }

    Ok(())
}

async fn smoke(engine: &SmokeEngine, config: &Config, args: SmokeArgs) -> SmokeResult<()> {
    if args.all_mocked {
        engine.set_all_mocked().await;
    }
    engine.toggle_mocked(&args.mocked).await;
    if args.toggle_source_system {
        engine.toggle_source_system().await;
    }

    if args.flows.is_empty() {
        engine.smokes().await;
    } else {
        engine.smoke(&args.flows).await;
    }
    if args.returns {
        engine.smokes_return().await;
    }

    for step in &args.mock {
        let report = match step {
            MockStep::Sanctions => engine.mock_sanctions().await?,
            MockStep::Funds => engine.mock_funds().await?,
            MockStep::Posting => engine.mock_posting().await?,
            MockStep::Clearing => engine.mock_clearing().await?,
            MockStep::FundsBook => engine.mock_funds_book().await?,
            MockStep::PostingBook => engine.mock_posting_book().await?,
        };
        log_mock_report(&report);
    }

    let settle = Duration::from_secs(args.settle_secs);
    for round in 1..=args.update_rounds {
        tokio::time::sleep(settle).await;
        engine.refresh().await;
        let outcome = engine.update_incomplete().await;
        info!("Update round {round}: {} flows re-triggered", outcome.len());
    }
    tokio::time::sleep(settle).await;

    let report = engine.report(args.prefer_returns).await;
    ReportWriter::new(io::stdout().lock()).write_report(&report, args.verbose)?;
    if args.save {
        save_report(&config.report.dir, &report)?;
    }
    Ok(())
}

fn log_mock_report(report: &MockReport) {
    let accepted = report
        .iter()
        .filter(|(_, outcome)| outcome.as_ref().is_ok_and(|outcome| outcome.is_accepted()))
        .count();
    info!("{accepted}/{} mocked responses accepted", report.len());
}

fn dry_run_status() -> StatusRecord {
    StatusRecord {
        qualification_status: "QUALIFIED".to_string(),
        sanctions_status: "PASSED".to_string(),
        funds_control_status: "ACK".to_string(),
        post_status: "ACK".to_string(),
        sett_status: "SETTLED".to_string(),
        tran_status: "CMP".to_string(),
    }
}

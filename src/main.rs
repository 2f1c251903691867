use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use axum_prometheus::PrometheusMetricLayer;
use clap::{Args, Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusHandle;
use seat_rounds::allocation::{
    DecisionSource, Eligibility, JsonFileRepository, RoundNo, RoundOrchestrator, SeatCategoryKey,
};
use seat_rounds::config::AppConfig;
use seat_rounds::error::AppError;
use seat_rounds::import::{load_decisions, load_quota, load_roster, ImportError};
use seat_rounds::{allocation, telemetry};
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
struct AppState {
    readiness: Arc<AtomicBool>,
    metrics: PrometheusHandle,
}

#[derive(Parser, Debug)]
#[command(
    name = "seat-rounds",
    about = "Run multi-round admission seat allocation from the command line or over HTTP",
    version
)]
struct Cli {
    /// Override the configured season store file
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Load the candidate roster
    Roster {
        #[command(subcommand)]
        command: RosterCommand,
    },
    /// Inspect or change the seat matrix
    Quota {
        #[command(subcommand)]
        command: QuotaCommand,
    },
    /// Record the decision reports for a generated round
    Decisions {
        #[command(subcommand)]
        command: DecisionsCommand,
    },
    /// Generate, reset or inspect allocation rounds
    Round {
        #[command(subcommand)]
        command: RoundCommand,
    },
    /// Write the offer lists of a round
    Offers {
        #[command(subcommand)]
        command: OffersCommand,
    },
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    port: Option<u16>,
}

#[derive(Subcommand, Debug)]
enum RosterCommand {
    /// Import candidates from a roster CSV; known ids are left untouched
    Import { csv: PathBuf },
}

#[derive(Subcommand, Debug)]
enum QuotaCommand {
    /// Replace the seat matrix from a CSV with category and seat columns
    Import { csv: PathBuf },
    /// Set the seat total of one category, e.g. OBC_Female_PWD
    Set { category: String, seats: u32 },
    /// Show totals, confirmed seats and remaining seats per category
    Show,
}

#[derive(Subcommand, Debug)]
enum DecisionsCommand {
    /// Ingest any subset of the three reports for a round
    Ingest(IngestArgs),
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Round the reports answer
    #[arg(long)]
    round: RoundNo,
    /// Local offer report (MTech Application No, Applicant Decision)
    #[arg(long)]
    local: Option<PathBuf>,
    /// Other institute report (MTech Application No, Other Institution Decision)
    #[arg(long)]
    other: Option<PathBuf>,
    /// Consolidated report (COAP Reg Id, Applicant Decision)
    #[arg(long)]
    consolidated: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum RoundCommand {
    /// Generate offers for a round
    Run { round: RoundNo },
    /// Discard a round's offers and the decisions that fed it
    Reset { round: RoundNo },
    /// Show where the season stands
    Status,
    /// List the candidates still in the pool for a round
    Eligible { round: RoundNo },
}

#[derive(Subcommand, Debug)]
enum OffersCommand {
    /// Write summary.csv and detailed.csv for a generated round
    Export {
        round: RoundNo,
        /// Directory the two CSV files are written to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[derive(Debug, Serialize)]
struct ExportedFiles {
    round: RoundNo,
    offers: usize,
    summary: PathBuf,
    detailed: PathBuf,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run_cli().await {
        eprintln!("application error: {err}");
        std::process::exit(1);
    }
}

async fn run_cli() -> Result<(), AppError> {
    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    if let Some(store) = cli.store {
        config.store.path = store;
    }

    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => run_server(config, args).await,
        command => {
            telemetry::init(&config.telemetry)?;
            let orchestrator = open_store(&config);
            run_command(&orchestrator, command)
        }
    }
}

fn open_store(config: &AppConfig) -> RoundOrchestrator<JsonFileRepository> {
    let repository = Arc::new(JsonFileRepository::new(config.store.path.clone()));
    RoundOrchestrator::new(repository, config.store.max_rounds)
}

fn run_command(
    orchestrator: &RoundOrchestrator<JsonFileRepository>,
    command: Command,
) -> Result<(), AppError> {
    match command {
        Command::Serve(_) => Ok(()),
        Command::Roster {
            command: RosterCommand::Import { csv },
        } => {
            let candidates = load_roster(&csv)?;
            let read = candidates.len();
            let added = orchestrator.load_roster(candidates)?;
            print_json(&json!({ "read": read, "added": added }))
        }
        Command::Quota { command } => match command {
            QuotaCommand::Import { csv } => {
                orchestrator.replace_quota(load_quota(&csv)?)?;
                print_json(&orchestrator.quota()?)
            }
            QuotaCommand::Set { category, seats } => {
                let key = category
                    .parse::<SeatCategoryKey>()
                    .map_err(|err| allocation::RoundError::Validation(err.to_string()))?;
                orchestrator.set_quota(key, seats)?;
                print_json(&orchestrator.quota()?)
            }
            QuotaCommand::Show => print_json(&orchestrator.quota()?),
        },
        Command::Decisions {
            command: DecisionsCommand::Ingest(args),
        } => {
            let sources = [
                (DecisionSource::LocalOffer, args.local),
                (DecisionSource::OtherInstitute, args.other),
                (DecisionSource::Consolidated, args.consolidated),
            ];
            let mut reports = Vec::new();
            let mut failed: Vec<ImportError> = Vec::new();
            for (source, path) in sources.into_iter().filter_map(|(s, p)| Some((s, p?))) {
                match load_decisions(source, &path) {
                    Ok(report) => reports.push(report),
                    Err(err) => {
                        warn!(%source, path = %path.display(), error = %err, "decision file not ingested");
                        failed.push(err);
                    }
                }
            }

            // Readable reports are recorded even when a sibling file fails;
            // the failure still ends the command with an error.
            if !reports.is_empty() || failed.is_empty() {
                let summary = orchestrator.ingest(args.round, reports)?;
                print_json(&summary)?;
            }
            match failed.into_iter().next() {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        }
        Command::Round { command } => match command {
            RoundCommand::Run { round } => print_json(&orchestrator.run(round)?),
            RoundCommand::Reset { round } => {
                orchestrator.reset(round)?;
                print_json(&orchestrator.status()?)
            }
            RoundCommand::Status => print_json(&orchestrator.status()?),
            RoundCommand::Eligible { round } => {
                let eligibility = orchestrator.eligible(round)?;
                let ids: Vec<&str> = match &eligibility {
                    Eligibility::Eligible(ids) => ids.iter().map(|id| id.as_str()).collect(),
                    Eligibility::RoundComplete => Vec::new(),
                };
                print_json(&json!({ "round": round, "eligible": ids }))
            }
        },
        Command::Offers {
            command: OffersCommand::Export { round, out_dir },
        } => {
            let export = orchestrator.export(round)?;
            std::fs::create_dir_all(&out_dir)?;

            let summary = out_dir.join(format!("round_{round}_summary.csv"));
            let detailed = out_dir.join(format!("round_{round}_detailed.csv"));
            export
                .write_summary_csv(BufWriter::new(File::create(&summary)?))
                .map_err(ImportError::Csv)?;
            export
                .write_detailed_csv(BufWriter::new(File::create(&detailed)?))
                .map_err(ImportError::Csv)?;

            info!(round, offers = export.summary.len(), "offer lists written");
            print_json(&ExportedFiles {
                round,
                offers: export.summary.len(),
                summary,
                detailed,
            })
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
    println!("{rendered}");
    Ok(())
}

async fn run_server(mut config: AppConfig, mut args: ServeArgs) -> Result<(), AppError> {
    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(AtomicBool::new(false));
    let state = AppState {
        readiness: readiness_flag.clone(),
        metrics: prometheus_handle,
    };

    let orchestrator = Arc::new(open_store(&config));
    let app = service_router(state)
        .merge(allocation::round_router(orchestrator))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        store = %config.store.path.display(),
        "seat allocation service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}

fn service_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
}

async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn readiness_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use clap::CommandFactory;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn state(ready: bool) -> AppState {
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: PrometheusBuilder::new().build_recorder().handle(),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ingest_with_a_subset_of_reports() {
        let cli = Cli::try_parse_from([
            "seat-rounds",
            "--store",
            "season.json",
            "decisions",
            "ingest",
            "--round",
            "2",
            "--local",
            "local.csv",
        ])
        .expect("arguments parse");

        assert_eq!(cli.store, Some(PathBuf::from("season.json")));
        match cli.command {
            Some(Command::Decisions {
                command: DecisionsCommand::Ingest(args),
            }) => {
                assert_eq!(args.round, 2);
                assert_eq!(args.local, Some(PathBuf::from("local.csv")));
                assert!(args.other.is_none());
                assert!(args.consolidated.is_none());
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn readiness_reflects_the_flag() {
        let response = service_router(state(false))
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = service_router(state(true))
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn health_route_answers_ok() {
        let response = service_router(state(false))
            .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
            .await
            .expect("router responds");
        assert_eq!(response.status(), StatusCode::OK);
    }
}

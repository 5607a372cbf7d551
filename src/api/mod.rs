use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    CellResult, DEFAULT_RATIO, GlobalParameters, ProfitabilityMatrix, SimulationResult,
    YearSummary, run_simulation,
};

const DEFAULT_PORT: u16 = 8080;

#[derive(Parser, Debug)]
#[command(
    name = "aga",
    about = "Cash bonus to free share (AGA) substitution simulator: grant value, IFRS cost, cash savings"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(about = "Serve the JSON simulation API")]
    Serve {
        #[arg(default_value_t = DEFAULT_PORT)]
        port: u16,
    },
    #[command(about = "Run one simulation pass and print the result as JSON")]
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
struct SimulateArgs {
    #[arg(
        long,
        help = "Number of agents; defaults to the profitability file rows, else 6"
    )]
    agent_count: Option<u32>,
    #[arg(
        long,
        help = "Number of simulated years; defaults to the profitability file columns, else 5"
    )]
    year_count: Option<u32>,
    #[arg(long, default_value_t = 100_000.0, help = "Gross variable pay forgone per agent")]
    gross_foregone_amount: f64,
    #[arg(
        long,
        default_value_t = 0.3,
        help = "Profitability ratio at or below which no bonus multiplier applies"
    )]
    profitability_threshold: f64,
    #[arg(long, default_value_t = 10.0)]
    share_price: f64,
    #[arg(long, default_value_t = 0.40)]
    employer_charge_rate_on_cash: f64,
    #[arg(long, default_value_t = 0.30)]
    employer_charge_rate_on_grant: f64,
    #[arg(long, default_value_t = 0.25, help = "Corporate income tax (IS) rate")]
    corporate_tax_rate: f64,
    #[arg(long, default_value_t = 0.45, help = "Marginal personal income tax (IRPP) rate")]
    personal_tax_rate: f64,
    #[arg(long, default_value_t = 2)]
    vesting_years: u32,
    #[arg(
        long,
        default_value_t = DEFAULT_RATIO,
        help = "Ratio seeded into every cell when no profitability file is given"
    )]
    default_ratio: f64,
    #[arg(long, help = "JSON file of profitability rows, one array of ratios per agent")]
    profitability_file: Option<PathBuf>,
    #[arg(
        long = "set",
        value_name = "AGENT:YEAR=RATIO",
        value_parser = parse_cell_edit,
        help = "Override one cell, may be repeated"
    )]
    edits: Vec<CellEdit>,
    #[arg(long)]
    pretty: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CellEdit {
    agent_id: u32,
    year: u32,
    ratio: f64,
}

fn parse_cell_edit(raw: &str) -> Result<CellEdit, String> {
    let usage = || format!("expected AGENT:YEAR=RATIO, got '{raw}'");
    let (cell, ratio) = raw.split_once('=').ok_or_else(usage)?;
    let (agent_id, year) = cell.split_once(':').ok_or_else(usage)?;
    Ok(CellEdit {
        agent_id: agent_id.trim().parse().map_err(|_| usage())?,
        year: year.trim().parse().map_err(|_| usage())?,
        ratio: ratio.trim().parse().map_err(|_| usage())?,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ParameterPayload {
    agent_count: Option<u32>,
    year_count: Option<u32>,
    gross_foregone_amount: Option<f64>,
    profitability_threshold: Option<f64>,
    share_price: Option<f64>,
    employer_charge_rate_on_cash: Option<f64>,
    employer_charge_rate_on_grant: Option<f64>,
    corporate_tax_rate: Option<f64>,
    personal_tax_rate: Option<f64>,
    vesting_years: Option<u32>,
    default_ratio: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    #[serde(flatten)]
    parameters: ParameterPayload,
    profitability: Option<Vec<Vec<f64>>>,
    edits: Vec<CellEdit>,
}

#[derive(Debug)]
struct SimulationRequest {
    params: GlobalParameters,
    matrix: ProfitabilityMatrix,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    matrix_version: u64,
    parameters: GlobalParameters,
    profitability: Vec<Vec<f64>>,
    cells: Vec<CellResult>,
    year_summaries: Vec<YearSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DefaultsResponse {
    parameters: GlobalParameters,
    default_ratio: f64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Serve { port } => run_http_server(port)
            .await
            .map_err(|e| format!("Server error: {e}")),
        Command::Simulate(args) => {
            let rows = args
                .profitability_file
                .as_deref()
                .map(read_profitability_file)
                .transpose()?;
            let request = build_request(&args, rows.as_deref(), &args.edits)?;
            let result =
                run_simulation(&request.params, &request.matrix).map_err(|e| e.to_string())?;
            let response = build_simulate_response(request, result);
            let output = if args.pretty {
                serde_json::to_string_pretty(&response)
            } else {
                serde_json::to_string(&response)
            }
            .map_err(|e| format!("Failed to encode result: {e}"))?;
            println!("{output}");
            Ok(())
        }
    }
}

fn read_profitability_file(path: &Path) -> Result<Vec<Vec<f64>>, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&raw)
        .map_err(|e| format!("Invalid profitability JSON in {}: {e}", path.display()))
}

fn build_request(
    args: &SimulateArgs,
    rows: Option<&[Vec<f64>]>,
    edits: &[CellEdit],
) -> Result<SimulationRequest, String> {
    let defaults = GlobalParameters::default();
    let params = GlobalParameters {
        agent_count: args
            .agent_count
            .or_else(|| rows.map(|r| r.len() as u32))
            .unwrap_or(defaults.agent_count),
        year_count: args
            .year_count
            .or_else(|| rows.and_then(|r| r.first()).map(|row| row.len() as u32))
            .unwrap_or(defaults.year_count),
        gross_foregone_amount: args.gross_foregone_amount,
        profitability_threshold: args.profitability_threshold,
        share_price: args.share_price,
        employer_charge_rate_on_cash: args.employer_charge_rate_on_cash,
        employer_charge_rate_on_grant: args.employer_charge_rate_on_grant,
        corporate_tax_rate: args.corporate_tax_rate,
        personal_tax_rate: args.personal_tax_rate,
        vesting_years: args.vesting_years,
    };
    params.validate().map_err(|e| e.to_string())?;

    let mut matrix = match rows {
        Some(rows) => ProfitabilityMatrix::from_rows(rows),
        None => {
            ProfitabilityMatrix::filled(params.agent_count, params.year_count, args.default_ratio)
        }
    }
    .map_err(|e| e.to_string())?;

    for edit in edits {
        matrix
            .set(edit.agent_id, edit.year, edit.ratio)
            .map_err(|e| e.to_string())?;
    }

    Ok(SimulationRequest { params, matrix })
}

fn build_app() -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/defaults", get(defaults_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "AGA simulation API listening");
    info!("Local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, build_app()).await
}

async fn defaults_handler() -> Response {
    json_response(
        StatusCode::OK,
        DefaultsResponse {
            parameters: GlobalParameters::default(),
            default_ratio: DEFAULT_RATIO,
        },
    )
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(parameters): Query<ParameterPayload>) -> Response {
    simulate_handler_impl(SimulatePayload {
        parameters,
        ..SimulatePayload::default()
    })
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload)
}

fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            warn!(error = %msg, "rejected simulation request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    match run_simulation(&request.params, &request.matrix) {
        Ok(result) => json_response(StatusCode::OK, build_simulate_response(request, result)),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<SimulationRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<SimulationRequest, String> {
    let mut args = default_args_for_api();
    let p = payload.parameters;

    args.agent_count = p.agent_count;
    args.year_count = p.year_count;
    if let Some(v) = p.gross_foregone_amount {
        args.gross_foregone_amount = v;
    }
    if let Some(v) = p.profitability_threshold {
        args.profitability_threshold = v;
    }
    if let Some(v) = p.share_price {
        args.share_price = v;
    }
    if let Some(v) = p.employer_charge_rate_on_cash {
        args.employer_charge_rate_on_cash = v;
    }
    if let Some(v) = p.employer_charge_rate_on_grant {
        args.employer_charge_rate_on_grant = v;
    }
    if let Some(v) = p.corporate_tax_rate {
        args.corporate_tax_rate = v;
    }
    if let Some(v) = p.personal_tax_rate {
        args.personal_tax_rate = v;
    }
    if let Some(v) = p.vesting_years {
        args.vesting_years = v;
    }
    if let Some(v) = p.default_ratio {
        args.default_ratio = v;
    }

    build_request(&args, payload.profitability.as_deref(), &payload.edits)
}

fn default_args_for_api() -> SimulateArgs {
    let defaults = GlobalParameters::default();
    SimulateArgs {
        agent_count: None,
        year_count: None,
        gross_foregone_amount: defaults.gross_foregone_amount,
        profitability_threshold: defaults.profitability_threshold,
        share_price: defaults.share_price,
        employer_charge_rate_on_cash: defaults.employer_charge_rate_on_cash,
        employer_charge_rate_on_grant: defaults.employer_charge_rate_on_grant,
        corporate_tax_rate: defaults.corporate_tax_rate,
        personal_tax_rate: defaults.personal_tax_rate,
        vesting_years: defaults.vesting_years,
        default_ratio: DEFAULT_RATIO,
        profitability_file: None,
        edits: Vec::new(),
        pretty: false,
    }
}

fn build_simulate_response(
    request: SimulationRequest,
    result: SimulationResult,
) -> SimulateResponse {
    SimulateResponse {
        matrix_version: result.matrix_version,
        profitability: request.matrix.rows(),
        parameters: request.params,
        cells: result.cells,
        year_summaries: result.year_summaries,
    }
}

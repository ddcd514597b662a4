use anyhow::Context;
use clap::builder::PossibleValuesParser;
use clap::{value_parser, Arg, ArgMatches, Command};
use migra_core::{
    ChatCompletionsOracle, ConversationState, EncryptionStrategy, MigraConfig, MigraError,
    SessionDriver, SessionParams, VERSION,
};
use migra_gateway::{secrets, SystemRunner, ToolGateway};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit code for configuration, secret and oracle failures
const EXIT_FATAL: i32 = 3;

fn cli() -> Command {
    Command::new("migra")
        .version(VERSION)
        .about("Agentic MySQL to Cloud SQL migration")
        .arg(
            Arg::new("volume")
                .long("volume")
                .required(true)
                .value_parser(value_parser!(u32).range(1..))
                .help("Estimated volume of the database in GB"),
        )
        .arg(
            Arg::new("encryption")
                .long("encryption")
                .required(true)
                .value_parser(PossibleValuesParser::new(EncryptionStrategy::VARIANTS))
                .help("Encryption strategy to use"),
        )
}

fn params_from(matches: &ArgMatches) -> anyhow::Result<SessionParams> {
    let volume_gb = *matches.get_one::<u32>("volume").context("--volume is required")?;
    let encryption = matches
        .get_one::<String>("encryption")
        .context("--encryption is required")?
        .parse::<EncryptionStrategy>()?;
    Ok(SessionParams {
        volume_gb,
        encryption,
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let matches = cli().get_matches();
    let code = match params_from(&matches) {
        Ok(params) => match run(params).await {
            Ok(state) => state.exit_code(),
            Err(e) => {
                let startup = e.downcast_ref::<MigraError>().is_some_and(MigraError::is_startup_failure);
                if startup {
                    tracing::error!(error = %format!("{e:#}"), "startup_failed");
                } else {
                    tracing::error!(error = %format!("{e:#}"), "session_aborted");
                }
                eprintln!("error: {e:#}");
                EXIT_FATAL
            }
        },
        Err(e) => {
            eprintln!("error: {e:#}");
            EXIT_FATAL
        }
    };
    std::process::exit(code);
}

async fn run(params: SessionParams) -> anyhow::Result<ConversationState> {
    let config = MigraConfig::load().map_err(MigraError::from)?;
    let provider = config.llm.provider_spec().map_err(MigraError::from)?;

    let runner = Arc::new(SystemRunner::new().with_timeout(config.gateway.command_timeout()));
    let secret_source = secrets::from_backend(
        &config.gateway.secrets,
        &config.gateway.gcp_project_id,
        runner.clone(),
    );

    let key_secret = config.llm.api_key_secret(&provider);
    let api_key = secret_source
        .get(key_secret)
        .await
        .map_err(MigraError::from)
        .with_context(|| format!("resolving API key for {provider}"))?;
    let oracle = ChatCompletionsOracle::new(
        &provider,
        api_key,
        config.llm.base_url(&provider),
        config.llm.temperature,
    )
    .context("building oracle client")?;
    tracing::info!(%provider, "oracle_ready");

    let gateway = Arc::new(ToolGateway::start(config.gateway.clone(), runner, secret_source).await);
    let driver = SessionDriver::new(Arc::new(oracle), config.session.coordinator_settings());
    let outcome = driver.run(gateway, params).await?;

    println!("Migration finished: {}", outcome.state);
    println!("  Turns: {}", outcome.turns);
    println!("  Anomalies: {}", outcome.anomalies);
    println!("  Messages: {}", outcome.transcript.len());
    if let Some(last) = outcome.transcript.last() {
        println!();
        println!("[{}]", last.speaker);
        println!("{}", last.content);
    }
    Ok(outcome.state)
}

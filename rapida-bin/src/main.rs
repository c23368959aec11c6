use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use rapida_core::{
    Callbacks, DeliveredResponse, FeedbackDataType, Provider, RapidaConfig, RapidaLogger, Rating,
    headers::HeaderBuilder,
};
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "rapida CLI smoke tool", long_about = None)]
struct Cli {
    /// Config file (JSON or TOML). RAPIDA_API_KEY / RAPIDA_BASE_URL fill gaps.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the headers proxy mode would attach to provider calls
    Headers,
    /// Ship a sample log record
    Log {
        #[arg(long, default_value = "davinci")]
        model: String,
        #[arg(short, long, help = "Prompt sent to the model")]
        prompt: String,
        #[arg(short, long, help = "Text the model answered with")]
        response: String,
        #[arg(long, default_value = "custom-model")]
        provider: String,
    },
    /// Rate a previously logged call
    Feedback {
        /// Correlation id returned when the call was logged
        id: String,
        #[arg(long)]
        negative: bool,
    },
    /// Attach a named metric to a previously logged call
    Metric {
        id: String,
        name: String,
        /// JSON literal (`4`, `true`, `"text"`); anything else is sent as a string
        value: String,
        #[arg(long)]
        data_type: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<RapidaConfig> {
    let cfg = match path {
        Some(p) => RapidaConfig::from_path(p)
            .with_context(|| format!("loading config from {}", p.display()))?,
        None => RapidaConfig::default(),
    };
    Ok(cfg.with_env_fallback())
}

fn print_response(label: &str, resp: Option<DeliveredResponse>) {
    match resp {
        Some(r) => println!(
            "{label}: {} rapida-id={}",
            r.status,
            r.rapida_id().unwrap_or("-")
        ),
        None => eprintln!("{label}: not delivered (see logs)"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Headers => {
            for (name, value) in HeaderBuilder::all(&cfg).iter() {
                println!("{name}: {value}");
            }
        }
        Commands::Log {
            model,
            prompt,
            response,
            provider,
        } => {
            let provider: Provider = provider.parse()?;
            let rapida = RapidaLogger::new(&cfg, Callbacks::default())?;
            let record = rapida
                .builder(json!({"model": model, "prompt": prompt}))
                .add_response(json!({"text": response}))
                .build();
            println!("{}", record.id());
            print_response("log", rapida.log(&record, provider).await);
        }
        Commands::Feedback { id, negative } => {
            let rapida = RapidaLogger::new(&cfg, Callbacks::default())?;
            let rating = if negative {
                Rating::Negative
            } else {
                Rating::Positive
            };
            print_response("feedback", rapida.feedback(&id, rating).await);
        }
        Commands::Metric {
            id,
            name,
            value,
            data_type,
        } => {
            let data_type = data_type
                .as_deref()
                .map(str::parse::<FeedbackDataType>)
                .transpose()?;
            let value = serde_json::from_str::<Value>(&value).unwrap_or(Value::String(value));
            let rapida = RapidaLogger::new(&cfg, Callbacks::default())?;
            print_response(
                "metric",
                rapida.named_feedback(&id, &name, value, data_type).await,
            );
        }
    }

    Ok(())
}

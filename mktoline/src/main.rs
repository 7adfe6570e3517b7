#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use colored::{Color, Colorize};
use marketo::types::{BatchStatus, ObjectField};
use marketo::{Error as MarketoError, MarketoClient, Query};
use mktoconfig::MarketoConfig;
use std::fmt::Write;
use std::fs;
use std::io;
use std::process;
use time::format_description::well_known::Rfc3339;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mktoline", about = "A CLI for the Marketo REST API")]
struct Cli {
    /// Log requests and response bodies to stderr
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the current access token and its expiry
    Token,
    /// List lead fields, searchable ones highlighted
    LeadFields,
    /// Fetch leads by a searchable field
    Leads {
        /// Field to filter on, e.g. email
        filter_type: String,
        /// Values to match (1 to 300)
        #[arg(required = true)]
        values: Vec<String>,
        /// Comma-separated fields to return
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        /// Page token from a previous call
        #[arg(long)]
        page: Option<String>,
    },
    /// List custom object types
    Objects,
    /// Describe a custom object type
    Object {
        /// API name, e.g. car_c
        name: String,
    },
    /// Fetch custom object records by a searchable field
    ObjectFilter {
        /// API name, e.g. car_c
        name: String,
        /// Field to filter on
        filter_type: String,
        /// Values to match (1 to 300)
        #[arg(required = true)]
        values: Vec<String>,
        /// Comma-separated fields to return
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,
        /// Page token from a previous call
        #[arg(long)]
        page: Option<String>,
    },
    /// Upload a CSV file of leads
    Import {
        /// Path to the CSV file
        file: String,
    },
    /// Show the state of an import batch
    ImportStatus {
        batch_id: i64,
    },
    /// List the failed rows of an import batch
    ImportFailures {
        batch_id: i64,
    },
    /// Generate shell completions
    #[command(hide = true)]
    Completions {
        /// The shell to generate completions for
        shell: Shell,
    },
}

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if debug { "marketo=debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn get_client(debug: bool) -> Result<MarketoClient> {
    let config =
        MarketoConfig::load_or_onboard().with_context(|| "Failed to load marketo config")?;
    let mut settings = config
        .client_config()
        .with_context(|| "Incomplete marketo config")?;
    if debug {
        settings = settings.with_debug(true);
    }
    Ok(MarketoClient::new(settings).await?)
}

fn build_query(
    filter_type: String,
    values: Vec<String>,
    fields: Vec<String>,
    page: Option<String>,
) -> Query {
    let mut query = Query::new(filter_type, values).with_fields(fields);
    if let Some(page) = page {
        query = query.with_page(page);
    }
    query
}

fn format_field(field: &ObjectField) -> String {
    let line = format!("{:30} {:12} {}", field.name, field.data_type, field.display_name);
    if field.searchable {
        line.color(Color::Green).to_string()
    } else {
        line
    }
}

fn status_color(status: &BatchStatus) -> Color {
    match status {
        BatchStatus::Complete => Color::Green,
        BatchStatus::Failed => Color::Red,
        BatchStatus::Queued | BatchStatus::Importing => Color::Yellow,
        BatchStatus::Other(_) => Color::White,
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", to_json(value)?);
    Ok(())
}

fn print_next_page(token: Option<&str>, more: bool) {
    if let Some(token) = token {
        if more {
            eprintln!("more results: --page {token}");
        }
    }
}

fn format_reasons(header: String, reasons: &[marketo::Reason]) -> String {
    let mut output = header;
    for reason in reasons {
        let _ = write!(output, "\n  - {reason}");
    }
    output
}

fn format_api_error(err: &MarketoError) -> Option<String> {
    match err {
        MarketoError::Api { status, reasons } => Some(format_reasons(
            format!("Marketo API error ({status}):"),
            reasons,
        )),
        MarketoError::TokenRejected { reasons } => Some(format_reasons(
            "Marketo rejected the access token twice:".to_string(),
            reasons,
        )),
        MarketoError::Http {
            operation,
            status,
            body,
        } => {
            let mut output = format!("Marketo HTTP error ({status}) during {operation}");
            if !body.trim().is_empty() {
                output.push('\n');
                output.push_str(body);
            }
            Some(output)
        }
        MarketoError::Auth { status, body } => {
            Some(format!("Marketo rejected the client credentials ({status}): {body}"))
        }
        _ => None,
    }
}

fn handle_error(err: &anyhow::Error) -> ! {
    if let Some(message) = err
        .downcast_ref::<MarketoError>()
        .and_then(format_api_error)
    {
        eprintln!("{message}");
        process::exit(1);
    }

    eprintln!("{err:#}");
    process::exit(1);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    if let Err(err) = run(cli).await {
        handle_error(&err);
    }

    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let debug = cli.debug;
    match cli.command {
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "mktoline", &mut io::stdout());
        }
        Command::Token => {
            let client = get_client(debug).await?;
            let info = client.token_info();
            println!("{}", info.token);
            println!("expires at {}", info.expires_at.format(&Rfc3339)?);
        }
        Command::LeadFields => {
            let client = get_client(debug).await?;
            for field in client.describe_lead_fields().await? {
                println!("{}", format_field(&field));
            }
        }
        Command::Leads {
            filter_type,
            values,
            fields,
            page,
        } => {
            let client = get_client(debug).await?;
            let query = build_query(filter_type, values, fields, page);
            let leads = client.filter_leads(&query).await?;
            print_json(&leads.items)?;
            print_next_page(leads.next_page_token.as_deref(), leads.more_result);
        }
        Command::Objects => {
            let client = get_client(debug).await?;
            for object in client.list_custom_objects().await? {
                println!("{:30} {}", object.name, object.display_name);
            }
        }
        Command::Object { name } => {
            let client = get_client(debug).await?;
            let object = client.describe_custom_object(&name).await?;
            println!("{} ({})", object.display_name.bold(), object.name);
            for field in &object.fields {
                println!("{}", format_field(field));
            }
        }
        Command::ObjectFilter {
            name,
            filter_type,
            values,
            fields,
            page,
        } => {
            let client = get_client(debug).await?;
            let query = build_query(filter_type, values, fields, page);
            let records = client.filter_custom_objects(&name, &query).await?;
            print_json(&records.items)?;
            print_next_page(records.next_page_token.as_deref(), records.more_result);
        }
        Command::Import { file } => {
            let client = get_client(debug).await?;
            let csv = fs::read(&file).with_context(|| format!("Failed to read file: {file}"))?;
            let response = client.create_lead_import(csv).await?;
            for batch in response.result {
                println!(
                    "batch {} {}",
                    batch.batch_id,
                    batch.status.to_string().color(status_color(&batch.status))
                );
            }
        }
        Command::ImportStatus { batch_id } => {
            let client = get_client(debug).await?;
            let response = client.get_lead_import(batch_id).await?;
            for batch in response.result {
                println!(
                    "batch {} {} processed={} failed={} warnings={}",
                    batch.batch_id,
                    batch.status.to_string().color(status_color(&batch.status)),
                    batch.leads_processed,
                    batch.failures,
                    batch.warnings
                );
                if let Some(message) = batch.message {
                    println!("  {message}");
                }
            }
        }
        Command::ImportFailures { batch_id } => {
            let client = get_client(debug).await?;
            let failures = client.lead_import_failures(batch_id).await?;
            if failures.is_empty() {
                println!("No failed rows.");
            }
            for failure in failures {
                println!("{}", failure.reason.color(Color::Red));
                let mut fields: Vec<_> = failure.fields.into_iter().collect();
                fields.sort();
                for (name, value) in fields {
                    println!("  {name}: {value}");
                }
            }
        }
    }

    Ok(())
}

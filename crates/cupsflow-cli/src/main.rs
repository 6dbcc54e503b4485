// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// cupsflow — command-line front end.
//
// Entry point. Initialises logging, loads the backend configuration, and runs
// one subcommand against the configured print server.

use std::error::Error;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use cupsflow_core::BackendConfig;
use cupsflow_core::error::CupsflowError;
use cupsflow_core::types::{JobSettings, PrinterState};
use cupsflow_print::ppd::UiKind;
use cupsflow_print::settings::{PrintPages, keys};
use cupsflow_print::{CupsBackend, Paper, PrintJob, prepare_for_print};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "cupsflow", version, about = "Talk to a CUPS print server")]
struct Args {
    /// JSON configuration file; the CUPS_* environment is used otherwise.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the server's printers and its default destination.
    Printers,
    /// Show the options and paper sizes from a printer's PPD.
    Ppd { printer: String },
    /// Refresh one printer's state from the server.
    Status { printer: String },
    /// Cancel a job by its server-assigned id.
    Cancel { job_id: i32 },
    /// Submit a file as a print job.
    Print {
        printer: String,
        file: PathBuf,
        /// Job option, as `name=value`.  Repeatable.
        #[arg(short = 'o', value_parser = parse_option)]
        options: Vec<(String, String)>,
        /// Job title (defaults to the file name).
        #[arg(long)]
        title: Option<String>,
        /// MIME type of the document; the server detects it otherwise.
        #[arg(long)]
        format: Option<String>,
        /// Number of copies.
        #[arg(short = 'n', long, default_value_t = 1)]
        copies: u32,
        #[arg(long)]
        collate: bool,
        /// Print the last page first.
        #[arg(long)]
        reverse: bool,
        /// Pages to print, e.g. `1-3,7`.
        #[arg(long)]
        pages: Option<String>,
        /// PPD paper size name, e.g. `A4`.
        #[arg(long)]
        paper: Option<String>,
        /// Follow the job until the server reports it finished.
        #[arg(long)]
        watch: bool,
    },
    /// Show how job options would be encoded as IPP attributes.
    Encode {
        #[arg(short = 'o', value_parser = parse_option, required = true)]
        options: Vec<(String, String)>,
    },
}

fn parse_option(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected name=value, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> CliResult {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Command::Encode { options } = &args.command {
        encode(options);
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => BackendConfig::load(path)?,
        None => BackendConfig::from_env()?,
    };
    tracing::debug!(server = %config.server, port = config.port, "configuration loaded");
    let backend = CupsBackend::new(config)?;

    match args.command {
        Command::Printers => printers(&backend).await,
        Command::Ppd { printer } => ppd(&backend, &printer).await,
        Command::Status { printer } => status(&backend, &printer).await,
        Command::Cancel { job_id } => {
            backend.cancel_job(job_id).await?;
            println!("cancelled job {job_id}");
            Ok(())
        }
        Command::Print {
            printer,
            file,
            options,
            title,
            format,
            copies,
            collate,
            reverse,
            pages,
            paper,
            watch,
        } => {
            let title = title.unwrap_or_else(|| {
                file.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "cupsflow".into())
            });
            let mut settings = JobSettings::new(title);
            settings.document_format = format;
            settings.track_status = watch;
            for (name, value) in options {
                settings.options.insert(format!("cups-{name}"), value);
            }
            let generic = [
                (keys::N_COPIES, Some(copies.to_string())),
                (keys::COLLATE, collate.then(|| "true".to_string())),
                (keys::REVERSE, reverse.then(|| "true".to_string())),
                (keys::PRINT_PAGES, pages.as_ref().map(|_| "ranges".to_string())),
                (keys::PAGE_RANGES, pages),
            ];
            for (key, value) in generic {
                if let Some(value) = value {
                    settings.options.insert(key.to_string(), value);
                }
            }
            let prepared = prepare_for_print(&mut settings, paper.map(Paper::Ppd).as_ref());
            // Nothing renders locally, so page selection goes to the server too.
            if let PrintPages::Ranges(ranges) = &prepared.pages {
                let ranges: Vec<String> = ranges
                    .iter()
                    .map(|r| match r.end {
                        Some(end) => format!("{}-{}", r.start + 1, end + 1),
                        None => format!("{}-{}", r.start + 1, i32::MAX),
                    })
                    .collect();
                settings.options.insert("cups-page-ranges".into(), ranges.join(","));
            }
            print(&backend, &printer, &file, settings).await
        }
        Command::Encode { .. } => Ok(()),
    }
}

fn encode(options: &[(String, String)]) {
    for (name, value) in options {
        let attribute = cupsflow_ipp::encode_option(name, value);
        println!("{} = {:?}", attribute.name(), attribute.value());
    }
}

async fn printers(backend: &CupsBackend) -> CliResult {
    backend.request_default_printer().await?;
    if let Some(handle) = backend.request_printer_list() {
        handle.await?;
    }

    let printers = backend.printers();
    if printers.is_empty() {
        println!("no printers");
        return Ok(());
    }
    for printer in printers {
        let state = state_name(printer.state);
        println!(
            "{}{:<24} {:<10} jobs={:<3} {}{}",
            if printer.is_default { "*" } else { " " },
            printer.name,
            state,
            printer.job_count,
            if printer.accepting_jobs { "" } else { "(rejecting) " },
            printer.description.as_deref().unwrap_or(""),
        );
    }
    Ok(())
}

fn state_name(state: PrinterState) -> &'static str {
    match state {
        PrinterState::Idle => "idle",
        PrinterState::Processing => "processing",
        PrinterState::Stopped => "stopped",
    }
}

async fn status(backend: &CupsBackend, printer: &str) -> CliResult {
    if let Some(handle) = backend.request_printer_list() {
        handle.await?;
    }
    backend.request_printer_attributes(printer)?.await?;
    if let Some(current) = backend.printer(printer) {
        println!(
            "{} {} jobs={}{}",
            current.name,
            state_name(current.state),
            current.job_count,
            current
                .state_message
                .as_deref()
                .map(|m| format!(" ({m})"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

async fn ppd(backend: &CupsBackend, printer: &str) -> CliResult {
    backend.request_details(printer)?.await?;
    let Some(ppd) = backend.ppd(printer) else {
        return Err(CupsflowError::Request(format!("no PPD available for '{printer}'")).into());
    };

    println!(
        "{} ({})",
        ppd.nick_name.as_deref().unwrap_or(printer),
        ppd.model_name.as_deref().unwrap_or("unknown model")
    );
    for group in &ppd.groups {
        println!("\n{}:", group.text);
        for option in &group.options {
            let kind = match option.ui {
                UiKind::PickOne => "one of",
                UiKind::PickMany => "any of",
                UiKind::Boolean => "boolean",
            };
            println!("  {} ({}) [{}]", option.keyword, option.text, kind);
            for choice in &option.choices {
                let marker = if option.default_choice.as_deref() == Some(choice.choice.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("    {marker}{} - {}", choice.choice, choice.text);
            }
        }
    }

    let papers = ppd.papers();
    if !papers.is_empty() {
        println!("\nPaper sizes (points):");
        for paper in papers {
            println!(
                "  {:<16} {:>7.1} x {:<7.1} margins {}/{}/{}/{}",
                paper.name,
                paper.width,
                paper.length,
                paper.margins.left,
                paper.margins.bottom,
                paper.margins.right,
                paper.margins.top
            );
        }
    }
    Ok(())
}

async fn print(
    backend: &CupsBackend,
    printer: &str,
    file: &Path,
    settings: JobSettings,
) -> CliResult {
    let document = std::fs::File::open(file)?;
    let watch = settings.track_status;
    let job = PrintJob::new(printer, settings);
    let mut status = job.subscribe();

    let (tx, rx) = tokio::sync::oneshot::channel();
    backend
        .print_stream(&job, document, move |_, outcome| {
            let _ = tx.send(outcome);
        })
        .await?;
    let job_id = rx.await??;
    println!("{printer}-{job_id}");

    if watch {
        let config = backend.config();
        let limit = config.job_poll_interval() * (config.max_job_polls + 1);
        let followed = tokio::time::timeout(limit, async {
            while status.changed().await.is_ok() {
                let current = *status.borrow_and_update();
                println!("{current:?}");
                if current.is_finished() {
                    break;
                }
            }
        })
        .await;
        if followed.is_err() {
            tracing::warn!(job_id, "stopped following job before it finished");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn arguments_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn print_options_parse() {
        let args = Args::parse_from([
            "cupsflow",
            "print",
            "laser",
            "report.pdf",
            "-o",
            "copies=2",
            "-o",
            "sides=two-sided-long-edge",
            "--watch",
        ]);
        let Command::Print { options, watch, .. } = args.command else {
            panic!("expected print");
        };
        assert!(watch);
        assert_eq!(
            options,
            vec![
                ("copies".to_string(), "2".to_string()),
                ("sides".to_string(), "two-sided-long-edge".to_string())
            ]
        );
    }

    #[test]
    fn print_flags_parse() {
        let args = Args::parse_from([
            "cupsflow", "print", "laser", "a.pdf", "-n", "3", "--collate", "--pages", "2-4",
            "--paper", "A4",
        ]);
        let Command::Print {
            copies,
            collate,
            reverse,
            pages,
            paper,
            ..
        } = args.command
        else {
            panic!("expected print");
        };
        assert_eq!(copies, 3);
        assert!(collate && !reverse);
        assert_eq!(pages.as_deref(), Some("2-4"));
        assert_eq!(paper.as_deref(), Some("A4"));
    }

    #[test]
    fn cancel_takes_a_job_id() {
        let args = Args::parse_from(["cupsflow", "cancel", "42"]);
        assert!(matches!(args.command, Command::Cancel { job_id: 42 }));
        assert!(Args::try_parse_from(["cupsflow", "cancel", "latest"]).is_err());
    }

    #[test]
    fn option_without_value_is_rejected() {
        assert!(parse_option("copies").is_err());
        assert!(parse_option("=2").is_err());
        assert_eq!(parse_option("media=a4=x").unwrap(), ("media".into(), "a4=x".into()));
    }
}

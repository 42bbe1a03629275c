//! ciwarden: CI guidance from accumulated test outcomes.
//!
//! Every CI run hands ciwarden its JUnit-style test reports. Outcomes are
//! appended to a local SQLite store, failures are correlated with the
//! components they were attributed to, and components whose failure rate
//! clearly exceeds the baseline earn an *active guidance* rule. Rules are
//! rendered as pull-request warnings and as a markdown section for
//! contributor docs, and retire once the evidence goes quiet.
//!
//! # Examples
//!
//! ```bash
//! # Create .ciwarden/warden.toml and the store
//! ciwarden init
//!
//! # Record a run and recompute guidance
//! ciwarden ingest report target/junit.xml --pr 42 --commit abc123
//! ciwarden recompute
//!
//! # Warn about the components a change touches
//! ciwarden guidance warn --changed-file src/api/routes.rs --notify
//!
//! # Fail the job when required commands did not run
//! ciwarden check --executed ci-manifest.json
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: configuration, errors, logging and the event store
//! - [`plugins`]: ingestion, compliance, correlation, rendering, notification
//! - [`pipeline`]: one CI invocation end to end

mod cli;
pub mod core;
pub mod pipeline;
pub mod plugins;

use crate::cli::{
    ChangedArgs, CheckCli, Cli, Command, GuidanceCommand, IngestCommand, InitCli, OutputFormat,
    PipelineCli, RunContextArgs,
};
use crate::core::config::{self, WardenConfig};
use crate::core::error::WardenError;
use crate::core::logging;
use crate::core::output;
use crate::core::store::EventStore;
use crate::core::time;
use crate::plugins::compliance::{self, ComplianceMode};
use crate::plugins::correlate::CorrelationEngine;
use crate::plugins::ingest::{self, ComponentAttribution, ReportContext};
use crate::plugins::notify::{Dispatcher, Notification};
use crate::plugins::render::GuidanceRenderer;

use clap::Parser;
use colored::Colorize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

pub fn run() -> Result<ExitCode, WardenError> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose, cli.log_format);

    let current_dir = std::env::current_dir()?;

    if let Command::Init(init) = &cli.command {
        return run_init(init, &current_dir);
    }

    let config = load_config(cli.config.as_deref(), cli.store.as_deref(), &current_dir)?;

    match cli.command {
        Command::Init(_) => Ok(ExitCode::SUCCESS),
        Command::Ingest(ingest_cli) => match ingest_cli.command {
            IngestCommand::Report {
                files,
                context,
                format,
            } => run_ingest_report(&config, &files, &context, format),
            IngestCommand::Manifest { file, format } => run_ingest_manifest(&file, format),
        },
        Command::Check(check_cli) => run_check(&config, &check_cli),
        Command::Recompute { format } => run_recompute(&config, format),
        Command::Guidance(guidance_cli) => match guidance_cli.command {
            GuidanceCommand::List { all, format } => run_guidance_list(&config, all, format),
            GuidanceCommand::Warn { changed, format } => {
                run_guidance_warn(&config, &changed, format)
            }
            GuidanceCommand::Section { title } => run_guidance_section(&config, title.as_deref()),
        },
        Command::Pipeline(pipeline_cli) => run_pipeline(&config, &pipeline_cli),
    }
}

/// `--config` wins over discovery; `--store` wins over `[store].path`.
fn load_config(
    config_path: Option<&Path>,
    store_override: Option<&Path>,
    current_dir: &Path,
) -> Result<WardenConfig, WardenError> {
    let mut config = match config_path {
        Some(path) => WardenConfig::load(&current_dir.join(path))?,
        None => WardenConfig::discover(current_dir)?,
    };
    if let Some(store) = store_override {
        config.store.path = current_dir.join(store);
    }
    tracing::debug!(
        base_dir = %config.base_dir.display(),
        store = %config.store_path().display(),
        "configuration loaded"
    );
    Ok(config)
}

fn open_store(config: &WardenConfig) -> Result<EventStore, WardenError> {
    EventStore::open(&config.store_path(), config.store.lock_policy())
}

fn report_context(args: &RunContextArgs) -> ReportContext {
    ReportContext {
        run_id: args.run_id.clone().unwrap_or_else(time::new_run_id),
        pr_id: args.pr_id,
        commit_sha: args.commit_sha.clone().unwrap_or_default(),
        timestamp: args.timestamp.clone().unwrap_or_else(time::now_epoch_z),
    }
}

fn print_envelope(cmd: &str, status: &str, extra: serde_json::Value) {
    let envelope = time::command_envelope(cmd, status, extra);
    println!(
        "{}",
        serde_json::to_string_pretty(&envelope).unwrap_or_else(|_| envelope.to_string())
    );
}

fn run_init(init: &InitCli, current_dir: &Path) -> Result<ExitCode, WardenError> {
    let root = match &init.dir {
        Some(dir) => current_dir.join(dir),
        None => current_dir.to_path_buf(),
    };
    let config_dir = root.join(config::CONFIG_DIR);
    let config_path = config_dir.join(config::CONFIG_FILE);

    if config_path.exists() && !init.force {
        return Err(WardenError::ValidationError(format!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        )));
    }
    fs::create_dir_all(&config_dir)?;
    fs::write(&config_path, config::default_config_toml())?;

    let config = WardenConfig::load(&config_path)?;
    let store = open_store(&config)?;

    println!(
        "{}",
        output::status_line(true, &format!("wrote {}", config_path.display()))
    );
    println!(
        "{}",
        output::status_line(
            true,
            &format!(
                "store ready at {} (schema v{})",
                store.path().display(),
                store.schema_version()
            )
        )
    );
    Ok(ExitCode::SUCCESS)
}

fn run_ingest_report(
    config: &WardenConfig,
    files: &[PathBuf],
    args: &RunContextArgs,
    format: OutputFormat,
) -> Result<ExitCode, WardenError> {
    let mut store = open_store(config)?;
    let ctx = report_context(args);
    let attribution =
        ComponentAttribution::from_rules(&config.components)?.forced(args.component.clone());

    let outcomes =
        pipeline::ingest_report_files(&mut store, files, &ctx, &attribution, args.allow_duplicate)?;
    let any_failed = outcomes.iter().any(pipeline::IngestOutcome::is_failed);

    match format {
        OutputFormat::Json => print_envelope(
            "ingest.report",
            if any_failed { "partial" } else { "ok" },
            json!({ "run_id": ctx.run_id, "reports": outcomes }),
        ),
        OutputFormat::Text => {
            for outcome in &outcomes {
                if let Some(error) = &outcome.error {
                    let label = format!("{}: not ingested: {error}", outcome.source);
                    eprintln!("{}", output::status_line(false, &label));
                    continue;
                }
                let label = if outcome.skipped_duplicate {
                    format!("{}: already ingested, skipped", outcome.source)
                } else {
                    format!(
                        "{}: {} event(s), {} coercion warning(s)",
                        outcome.source,
                        outcome.events,
                        outcome.warnings.len()
                    )
                };
                println!("{}", output::status_line(true, &label));
            }
            println!("run {}", ctx.run_id.bright_cyan());
        }
    }
    Ok(if any_failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn run_ingest_manifest(file: &Path, format: OutputFormat) -> Result<ExitCode, WardenError> {
    let commands = ingest::load_manifest_file(file)?;
    match format {
        OutputFormat::Json => print_envelope(
            "ingest.manifest",
            "ok",
            json!({ "source": file.display().to_string(), "commands": commands }),
        ),
        OutputFormat::Text => {
            for command in &commands {
                println!("{command}");
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_check(config: &WardenConfig, check_cli: &CheckCli) -> Result<ExitCode, WardenError> {
    let required: Vec<String> = if check_cli.required.is_empty() {
        match &config.compliance {
            Some(compliance) => compliance.required.clone(),
            None => {
                return Err(WardenError::ConfigurationError(
                    "no required commands: pass --required or set [compliance].required"
                        .to_string(),
                ));
            }
        }
    } else {
        check_cli.required.clone()
    };
    let mode = check_cli
        .mode
        .or_else(|| config.compliance.as_ref().map(|c| c.mode))
        .unwrap_or(ComplianceMode::All);

    let executed = ingest::load_manifest_file(&check_cli.executed)?;
    let result = compliance::check(&required, &executed, mode);
    tracing::info!(
        mode = %mode,
        compliant = result.compliant,
        missing = result.missing.len(),
        "compliance checked"
    );

    match check_cli.format {
        OutputFormat::Json => print_envelope(
            "check",
            if result.compliant { "ok" } else { "non_compliant" },
            json!({
                "mode": mode.to_string(),
                "compliant": result.compliant,
                "missing": result.missing,
            }),
        ),
        OutputFormat::Text => {
            if result.compliant {
                println!(
                    "{}",
                    output::status_line(true, &format!("compliant ({mode} of {})", required.len()))
                );
            } else {
                println!(
                    "{}",
                    output::status_line(false, &format!("not compliant ({mode})"))
                );
                for missing in &result.missing {
                    println!("  missing: {}", missing.bright_yellow());
                }
            }
        }
    }

    Ok(if result.compliant {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn run_recompute(config: &WardenConfig, format: OutputFormat) -> Result<ExitCode, WardenError> {
    let mut store = open_store(config)?;
    let summary = CorrelationEngine::from_config(config).recompute(&mut store)?;

    match format {
        OutputFormat::Json => print_envelope("recompute", "ok", json!({ "summary": summary })),
        OutputFormat::Text => {
            println!(
                "{}",
                output::status_line(
                    true,
                    &format!(
                        "{} run(s), {} component(s)",
                        summary.total_runs, summary.components
                    )
                )
            );
            let lines = [
                ("activated", &summary.activated),
                ("reinforced", &summary.reinforced),
                ("retired", &summary.retired),
            ];
            for (label, components) in lines {
                if !components.is_empty() {
                    println!("  {label}: {}", output::preview_list(components, 8, 40));
                }
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_guidance_list(
    config: &WardenConfig,
    all: bool,
    format: OutputFormat,
) -> Result<ExitCode, WardenError> {
    let store = open_store(config)?;
    let rules = if all {
        store.get_all_guidance()?
    } else {
        store.get_active_guidance()?
    };

    match format {
        OutputFormat::Json => {
            let items: Vec<serde_json::Value> = rules
                .iter()
                .map(|rule| {
                    let mut item = json!({
                        "component": rule.component,
                        "description": rule.description,
                        "support_prs": rule.support_prs,
                        "lift": rule.lift,
                    });
                    if all {
                        item["status"] = json!(rule.status.as_str());
                    }
                    item
                })
                .collect();
            print_envelope("guidance.list", "ok", json!({ "guidance": items }));
        }
        OutputFormat::Text => {
            if rules.is_empty() {
                println!("no guidance");
            }
            for rule in &rules {
                println!(
                    "{} {} (support: {} PRs, lift: {:.2}, {})",
                    format!("{}:", rule.component).bold(),
                    rule.description,
                    rule.support_prs,
                    rule.lift,
                    rule.status.as_str()
                );
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_guidance_warn(
    config: &WardenConfig,
    changed: &ChangedArgs,
    format: OutputFormat,
) -> Result<ExitCode, WardenError> {
    let store = open_store(config)?;
    let attribution = ComponentAttribution::from_rules(&config.components)?;
    let components =
        pipeline::resolve_changed_components(&changed.changed, &changed.changed_files, &attribution);
    let active = store.get_active_guidance()?;
    let warnings = GuidanceRenderer::new(&config.guidance.engine_tag).build_warnings(&components, &active);

    let dispatch = if changed.notify && !warnings.is_empty() {
        let report = Dispatcher::from_config(config).dispatch(&Notification {
            title: config.guidance.section_title.clone(),
            body: warnings.join("\n"),
        });
        for (channel, error) in &report.failed {
            eprintln!(
                "{}",
                output::status_line(false, &format!("notify via {channel} failed: {error}"))
            );
        }
        Some(report)
    } else {
        None
    };

    match format {
        OutputFormat::Json => print_envelope(
            "guidance.warn",
            "ok",
            json!({ "changed": components, "warnings": warnings, "dispatch": dispatch }),
        ),
        OutputFormat::Text => {
            for warning in &warnings {
                println!("{}", warning.bright_yellow());
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_guidance_section(config: &WardenConfig, title: Option<&str>) -> Result<ExitCode, WardenError> {
    let store = open_store(config)?;
    let active = store.get_active_guidance()?;
    let title = title.unwrap_or(&config.guidance.section_title);
    print!(
        "{}",
        GuidanceRenderer::new(&config.guidance.engine_tag).render_section(title, &active)
    );
    Ok(ExitCode::SUCCESS)
}

fn run_pipeline(config: &WardenConfig, pipeline_cli: &PipelineCli) -> Result<ExitCode, WardenError> {
    let mut store = open_store(config)?;
    let dispatcher = Dispatcher::from_config(config);
    let request = pipeline::PipelineRequest {
        reports: pipeline_cli.reports.clone(),
        context: Some(report_context(&pipeline_cli.context)),
        forced_component: pipeline_cli.context.component.clone(),
        changed_components: pipeline_cli.changed.changed.clone(),
        changed_files: pipeline_cli.changed.changed_files.clone(),
        allow_duplicate: pipeline_cli.context.allow_duplicate,
        notify: pipeline_cli.changed.notify,
    };
    let outcome = pipeline::run_pipeline(config, &mut store, &dispatcher, &request)?;

    match pipeline_cli.format {
        OutputFormat::Json => print_envelope(
            "pipeline",
            if outcome.has_failed_reports() { "partial" } else { "ok" },
            json!({ "pipeline": outcome }),
        ),
        OutputFormat::Text => {
            for report in &outcome.ingested {
                if let Some(error) = &report.error {
                    let label = format!("{}: not ingested: {error}", report.source);
                    eprintln!("{}", output::status_line(false, &label));
                    continue;
                }
                println!(
                    "{}",
                    output::status_line(
                        true,
                        &format!("{}: {} event(s)", report.source, report.events)
                    )
                );
            }
            println!(
                "{}",
                output::status_line(
                    true,
                    &format!(
                        "{} active rule(s) over {} run(s)",
                        outcome.active_guidance.len(),
                        outcome.recompute.total_runs
                    )
                )
            );
            for warning in &outcome.warnings {
                println!("{}", warning.bright_yellow());
            }
            if let Some(dispatch) = &outcome.dispatch {
                for (channel, error) in &dispatch.failed {
                    eprintln!(
                        "{}",
                        output::status_line(false, &format!("notify via {channel} failed: {error}"))
                    );
                }
            }
        }
    }
    Ok(if outcome.has_failed_reports() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

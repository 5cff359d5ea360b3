use std::time::Duration;

use anyhow::{Result, bail};
use backstop_app::{App, ConfigStore, EditError};
use backstop_core::model::{ConcreteRule, Rule, RuleKind};
use backstop_core::settings::BackstopSettings;
use backstop_tui::ScanUiOptions;
use serde_json::Value;
use tokio::runtime::Runtime;
use tracing::info;

use crate::cli::{
    Cli, Command, ConfigCommand, DirCommand, KindArg, PropCommand, RuleCommand, SkipCommand,
    Switch,
};
use crate::output::{render_config, render_metrics, render_status};

/// How long an edit waits for the backend to push the saved configuration.
const SAVE_CONFIRM_TIMEOUT: Duration = Duration::from_secs(5);

pub fn run_with_deps(
    cli: Cli,
    app: &App<'_>,
    runtime: &Runtime,
    settings: &BackstopSettings,
) -> Result<()> {
    match cli.command {
        Command::Status => {
            runtime.block_on(app.refresh_scan_status())?;
            println!("{}", render_status(&app.scan().status()));
            Ok(())
        }
        Command::Config {
            command: ConfigCommand::Show,
        } => {
            runtime.block_on(app.load_config())?;
            let config = app.config().final_config();
            if let Some(config) = (*config).as_ref() {
                println!("{}", render_config(config));
            }
            Ok(())
        }
        Command::Rule { command } => run_rule_command(command, app, runtime),
        Command::Dir { command } => run_dir_command(command, app, runtime),
        Command::Skip { command } => run_skip_command(command, app, runtime),
        Command::NoInclude { value } => edit_and_save(app, runtime, |config| {
            config.set_no_include(value)?;
            Ok(format!("No include turned {}.", if value { "on" } else { "off" }))
        }),
        Command::Scan => run_scan_command(app, runtime, settings),
        Command::Autostart { state } => run_autostart_command(state, app, runtime),
        Command::Prop { command } => run_prop_command(command, app, runtime),
        Command::Language { code } => run_language_command(code, app, runtime),
        Command::Stats => {
            let metrics = runtime.block_on(app.metrics())?;
            println!("{}", render_metrics(&metrics));
            Ok(())
        }
    }
}

/// Loads the saved configuration, applies one edit to the draft, saves it
/// and waits for the backend to push the result back.
fn edit_and_save<F>(app: &App<'_>, runtime: &Runtime, edit: F) -> Result<()>
where
    F: FnOnce(&ConfigStore) -> Result<String, EditError>,
{
    let message = runtime.block_on(save_edit(app, edit))?;
    println!("{message}");
    Ok(())
}

async fn save_edit<F>(app: &App<'_>, edit: F) -> Result<String>
where
    F: FnOnce(&ConfigStore) -> Result<String, EditError>,
{
    let mut events = app.subscribe();
    app.load_config().await?;

    let message = edit(app.config())?;
    if !app.config().is_dirty() {
        return Ok(format!("{message} Nothing to save."));
    }

    app.save_config().await?;
    let confirmed = events
        .settle_until(SAVE_CONFIRM_TIMEOUT, |app| !app.config().is_dirty())
        .await?;
    if !confirmed {
        bail!(
            "backend accepted the configuration but did not confirm it within {}s",
            SAVE_CONFIRM_TIMEOUT.as_secs()
        );
    }

    info!("configuration saved");
    Ok(message)
}

fn run_rule_command(command: RuleCommand, app: &App<'_>, runtime: &Runtime) -> Result<()> {
    match command {
        RuleCommand::Add { name } => edit_and_save(app, runtime, |config| {
            let name = config.add_rule(&name)?;
            Ok(format!("Added rule '{name}'."))
        }),
        RuleCommand::Rename { old, new } => edit_and_save(app, runtime, |config| {
            let new = config.rename_rule(&old, &new)?;
            Ok(format!("Renamed rule '{old}' to '{new}'."))
        }),
        RuleCommand::Remove { name } => edit_and_save(app, runtime, |config| {
            config.remove_rule(&name)?;
            Ok(format!("Removed rule '{name}'."))
        }),
        RuleCommand::Kind { name, kind } => edit_and_save(app, runtime, |config| {
            let kind = match kind {
                KindArg::Concrete => RuleKind::Concrete,
                KindArg::Merge => RuleKind::Merge,
            };
            config.toggle_rule_kind(&name, kind)?;
            Ok(format!("Rule '{name}' is now a {} rule.", kind.label()))
        }),
        RuleCommand::Set {
            name,
            excludes,
            if_exists,
            merge,
        } => edit_and_save(app, runtime, |config| {
            let rule = if merge.is_empty() {
                Rule::Concrete(ConcreteRule {
                    excludes,
                    if_exists,
                })
            } else {
                Rule::Merge(merge)
            };
            config.set_rule(&name, rule)?;
            Ok(format!("Updated rule '{name}'."))
        }),
    }
}

fn run_dir_command(command: DirCommand, app: &App<'_>, runtime: &Runtime) -> Result<()> {
    match command {
        DirCommand::Add { path } => edit_and_save(app, runtime, |config| {
            let path = config.add_directory(&path)?;
            Ok(format!("Watching '{path}'."))
        }),
        DirCommand::Remove { path } => edit_and_save(app, runtime, |config| {
            config.remove_directory(&path)?;
            Ok(format!("Stopped watching '{path}'."))
        }),
        DirCommand::Rules { path, rules } => edit_and_save(app, runtime, |config| {
            let count = rules.len();
            config.set_directory_rules(&path, rules)?;
            Ok(format!("'{path}' now uses {count} rule(s)."))
        }),
    }
}

fn run_skip_command(command: SkipCommand, app: &App<'_>, runtime: &Runtime) -> Result<()> {
    match command {
        SkipCommand::Add { path } => edit_and_save(app, runtime, |config| {
            let path = config.add_skip(&path)?;
            Ok(format!("Skipping '{path}'."))
        }),
        SkipCommand::Remove { path } => edit_and_save(app, runtime, |config| {
            config.remove_skip(&path)?;
            Ok(format!("No longer skipping '{path}'."))
        }),
    }
}

fn run_scan_command(app: &App<'_>, runtime: &Runtime, settings: &BackstopSettings) -> Result<()> {
    let events = runtime.block_on(app.start())?;
    let _ = backstop_tui::run_scan(
        app,
        runtime,
        events,
        ScanUiOptions {
            display_cap: settings.display.cap,
        },
    )?;
    Ok(())
}

fn run_autostart_command(state: Option<Switch>, app: &App<'_>, runtime: &Runtime) -> Result<()> {
    match state {
        None => {
            let enabled = runtime.block_on(app.auto_start())?;
            println!("Auto-start is {}.", if enabled { "on" } else { "off" });
        }
        Some(state) => {
            let enabled = state == Switch::On;
            runtime.block_on(app.set_auto_start(enabled))?;
            println!("Auto-start turned {}.", if enabled { "on" } else { "off" });
        }
    }
    Ok(())
}

/// Reads `raw` as JSON when it parses, otherwise keeps it as a plain string.
fn parse_property_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn run_prop_command(command: PropCommand, app: &App<'_>, runtime: &Runtime) -> Result<()> {
    match command {
        PropCommand::Get { key } => match runtime.block_on(app.store_get(&key))? {
            Some(value) => println!("{value}"),
            None => println!("'{key}' is not set."),
        },
        PropCommand::Set { key, value } => {
            runtime.block_on(app.store_set(&key, parse_property_value(&value)))?;
            println!("Stored '{key}'.");
        }
        PropCommand::Del { key } => {
            runtime.block_on(app.store_del(&key))?;
            println!("Deleted '{key}'.");
        }
    }
    Ok(())
}

fn run_language_command(code: Option<String>, app: &App<'_>, runtime: &Runtime) -> Result<()> {
    match code {
        None => {
            runtime.block_on(app.load_language())?;
            match app.language() {
                Some(language) => println!("{language}"),
                None => println!("No language set."),
            }
        }
        Some(code) => {
            let code = code.trim();
            if code.is_empty() {
                bail!("language code must not be empty");
            }
            runtime.block_on(app.set_language(code))?;
            println!("Language set to '{code}'.");
        }
    }
    Ok(())
}

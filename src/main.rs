use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use onboard::api::{build_client, EntityId, Record};
use onboard::config::Config;
use onboard::controller::{NextAction, StepController, StepError, Submitted};
use onboard::logging;
use onboard::merge::{parse_assignment, FieldValues};
use onboard::navigation::{Accepted, HistoryNavigator, Navigator, Route, SessionDriver};
use onboard::resume::{hydrate, resume};
use onboard::session::WizardSession;
use onboard::state::FileNavigator;
use onboard::validate::RequiredFields;
use onboard::wizard::{FieldSpec, WizardDefinition, WizardRegistry};

#[derive(Parser)]
#[command(name = "onboard")]
#[command(about = "Resumable multi-step onboarding wizards for admin records")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the effective configuration to .onboard/config.toml
    Init {
        /// Overwrite an existing project config
        #[arg(long)]
        force: bool,
    },

    /// List available wizards
    Wizards,

    /// Show a wizard's steps and the fields each step owns
    Steps {
        /// Wizard key (e.g., employee, store)
        wizard: String,
    },

    /// List records with the fragments each one has filled in
    List { wizard: String },

    /// Start a new record: submit the first step in Create mode
    Create {
        wizard: String,

        /// Field value as key=value, key:=json or group.key=value
        #[arg(short = 'f', long = "field")]
        fields: Vec<String>,
    },

    /// Submit the current step of the saved Create session
    Next {
        wizard: String,

        #[arg(short = 'f', long = "field")]
        fields: Vec<String>,
    },

    /// Move the saved Create session back one step
    Back { wizard: String },

    /// Show the saved Create session, if any
    Status { wizard: String },

    /// Drop the saved Create session; the record stays partially filled
    Abandon { wizard: String },

    /// Update one step of an existing record in Edit mode
    Edit {
        wizard: String,

        /// Record identifier
        id: String,

        /// Step to edit
        step: String,

        #[arg(short = 'f', long = "field")]
        fields: Vec<String>,
    },

    /// Show a record, or one step's prefilled values
    Show {
        wizard: String,

        /// Record identifier
        id: String,

        /// Step to prefill (whole record when omitted)
        step: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let logging_handle = logging::init_logging(&config, cli.debug)?;
    let registry = WizardRegistry::load(&config.wizards_path())?;

    let result = match cli.command {
        Commands::Init { force } => cmd_init(&config, force),
        Commands::Wizards => cmd_wizards(&registry),
        Commands::Steps { wizard } => cmd_steps(registry.get(&wizard)?),
        Commands::List { wizard } => cmd_list(&config, registry.get(&wizard)?).await,
        Commands::Create { wizard, fields } => {
            cmd_create(&config, registry.get(&wizard)?, &fields).await
        }
        Commands::Next { wizard, fields } => {
            cmd_next(&config, registry.get(&wizard)?, &fields).await
        }
        Commands::Back { wizard } => cmd_back(&config, registry.get(&wizard)?),
        Commands::Status { wizard } => cmd_status(&config, registry.get(&wizard)?).await,
        Commands::Abandon { wizard } => cmd_abandon(&config, registry.get(&wizard)?),
        Commands::Edit {
            wizard,
            id,
            step,
            fields,
        } => cmd_edit(&config, registry.get(&wizard)?, id, &step, &fields).await,
        Commands::Show { wizard, id, step } => {
            cmd_show(&config, registry.get(&wizard)?, id, step.as_deref()).await
        }
    };

    if let Some(log_path) = logging_handle.log_file_path {
        if log_path.metadata().is_ok_and(|m| m.len() > 0) {
            eprintln!("Session log: {}", log_path.display());
        }
    }

    result
}

fn parse_fields(raw: &[String]) -> Result<FieldValues> {
    let mut values = FieldValues::new();
    for assignment in raw {
        parse_assignment(&mut values, assignment)?;
    }
    Ok(values)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print field errors before failing, so every bad field is reported at once
fn report_step_error(err: StepError) -> anyhow::Error {
    if let StepError::Validation { validation, .. } = &err {
        for (field, message) in &validation.field_errors {
            eprintln!("  {}: {}", field, message);
        }
    }
    err.into()
}

/// Stored values for the step with the `-f` edits laid over them
async fn form_values(
    controller: &StepController<'_>,
    session: &WizardSession,
    step: &str,
    edits: &FieldValues,
) -> Result<FieldValues> {
    let form = controller.edit_values(session, step, edits).await?;
    if let Some(warning) = &form.warning {
        eprintln!("Warning: could not load saved values ({}); only -f values are used", warning);
    }
    Ok(form.values)
}

fn completeness(definition: &WizardDefinition, record: &Record) -> String {
    definition
        .steps
        .iter()
        .map(|step| {
            let mark = if record.has_fragment(&step.name) { "x" } else { " " };
            format!("[{}] {}", mark, step.name)
        })
        .collect::<Vec<_>>()
        .join("  ")
}

fn describe_field(field: &FieldSpec) -> Vec<String> {
    if field.is_group() {
        field.leaf_paths()
    } else if field.required {
        vec![format!("{}*", field.name)]
    } else {
        vec![field.name.clone()]
    }
}

fn print_outcome(definition: &WizardDefinition, submitted: &Submitted, accepted: &Accepted) {
    let id = &submitted.record.id;
    match (&submitted.next, accepted) {
        (_, Accepted::Stale) => {
            println!("Result for {} discarded: session is no longer active", id);
        }
        (NextAction::GoTo { step, .. }, _) => {
            let display = definition.step(step).map(|s| s.display_name()).unwrap_or(step.as_str());
            println!("Saved {} ({} field(s)). Next: {}", id, submitted.payload.len(), display);
        }
        (NextAction::ReturnToList, _) => {
            println!("Updated {} ({} field(s))", id, submitted.payload.len());
        }
        (NextAction::Complete, _) => {
            println!("Completed {}", id);
        }
    }
}

fn cmd_init(config: &Config, force: bool) -> Result<()> {
    let path = Config::project_config_path();
    if path.exists() && !force {
        bail!("{} already exists; pass --force to overwrite", path.display());
    }
    let path = config.save()?;
    println!("Wrote {}", path.display());
    println!("User wizard definitions are read from {}", config.wizards_path().display());
    Ok(())
}

fn cmd_wizards(registry: &WizardRegistry) -> Result<()> {
    for definition in registry.iter() {
        println!(
            "{:<12} {:<10} {} step(s)  /{}",
            definition.key,
            definition.name,
            definition.steps.len(),
            definition.resource
        );
    }
    Ok(())
}

fn cmd_steps(definition: &WizardDefinition) -> Result<()> {
    println!("{} ({})", definition.name, definition.key);
    println!("{}", "─".repeat(60));
    for (i, step) in definition.steps.iter().enumerate() {
        let fields: Vec<String> = step.fields.iter().flat_map(describe_field).collect();
        println!("{}. {:<20} {}", i + 1, step.display_name(), fields.join(", "));
    }
    Ok(())
}

async fn cmd_list(config: &Config, definition: &WizardDefinition) -> Result<()> {
    let client = build_client(config, definition)?;
    let records = client.list().await?;

    if records.is_empty() {
        println!("No {} records", definition.key);
        return Ok(());
    }

    for record in &records {
        println!("{:<10} {}", record.id, completeness(definition, record));
    }
    Ok(())
}

async fn cmd_create(config: &Config, definition: &WizardDefinition, fields: &[String]) -> Result<()> {
    let values = parse_fields(fields)?;
    let navigator = FileNavigator::open(config.sessions_path(), &definition.key)?;
    if let Some(saved) = navigator.saved() {
        bail!(
            "A {} session is already in progress at step '{}'; use `onboard next` or `onboard abandon`",
            definition.key,
            saved.step
        );
    }

    let first = definition
        .first_step()
        .context("Wizard has no steps")?
        .name
        .clone();

    let client = build_client(config, definition)?;
    let controller = StepController::new(definition, client.as_ref(), &RequiredFields);
    let session = WizardSession::create(definition);

    // Nothing is saved until the first step is accepted by the backend
    let submitted = controller
        .submit(&session, &first, &values)
        .await
        .map_err(report_step_error)?;

    let mut driver = SessionDriver::new(navigator);
    driver.begin(session, &first)?;
    let accepted = driver.accept(submitted.clone())?;
    print_outcome(definition, &submitted, &accepted);
    Ok(())
}

async fn cmd_next(config: &Config, definition: &WizardDefinition, fields: &[String]) -> Result<()> {
    let values = parse_fields(fields)?;
    let navigator = FileNavigator::open(config.sessions_path(), &definition.key)?;
    let Some(saved) = navigator.saved().cloned() else {
        bail!(
            "No {} session in progress; start one with `onboard create {}`",
            definition.key,
            definition.key
        );
    };

    let client = build_client(config, definition)?;
    let session = resume(client.as_ref(), definition, &saved.handoff, &saved.step).await?;
    let controller = StepController::new(definition, client.as_ref(), &RequiredFields);
    let values = form_values(&controller, &session, &saved.step, &values).await?;
    let mut driver = SessionDriver::new(navigator);
    driver.begin(session.clone(), &saved.step)?;

    let submitted = controller
        .submit(&session, &saved.step, &values)
        .await
        .map_err(report_step_error)?;
    let accepted = driver.accept(submitted.clone())?;
    print_outcome(definition, &submitted, &accepted);
    Ok(())
}

fn cmd_back(config: &Config, definition: &WizardDefinition) -> Result<()> {
    let mut navigator = FileNavigator::open(config.sessions_path(), &definition.key)?;
    match navigator.go_back()? {
        Some(Route::Step { step, .. }) => println!("Back at step '{}'", step),
        _ => println!("Nothing to go back to"),
    }
    Ok(())
}

async fn cmd_status(config: &Config, definition: &WizardDefinition) -> Result<()> {
    let navigator = FileNavigator::open(config.sessions_path(), &definition.key)?;
    let Some(saved) = navigator.saved() else {
        println!("No {} session in progress", definition.key);
        return Ok(());
    };

    let client = build_client(config, definition)?;
    let session = resume(client.as_ref(), definition, &saved.handoff, &saved.step).await?;
    let controller = StepController::new(definition, client.as_ref(), &RequiredFields);

    match session.entity_id() {
        Some(id) => println!("Record {} ({} mode)", id, session.mode()),
        None => println!("New record ({} mode)", session.mode()),
    }
    println!("{}", controller.progress(&session));
    println!("Saved {}", saved.saved_at.format("%Y-%m-%d %H:%M:%S UTC"));
    Ok(())
}

fn cmd_abandon(config: &Config, definition: &WizardDefinition) -> Result<()> {
    let mut navigator = FileNavigator::open(config.sessions_path(), &definition.key)?;
    match navigator.clear()? {
        Some(saved) => match saved.handoff.entity_id {
            Some(id) => println!(
                "Abandoned {} session; record {} keeps the steps already saved",
                definition.key, id
            ),
            None => println!("Abandoned {} session before any record was created", definition.key),
        },
        None => println!("No {} session in progress", definition.key),
    }
    Ok(())
}

async fn cmd_edit(
    config: &Config,
    definition: &WizardDefinition,
    id: String,
    step: &str,
    fields: &[String],
) -> Result<()> {
    let values = parse_fields(fields)?;
    let client = build_client(config, definition)?;
    let controller = StepController::new(definition, client.as_ref(), &RequiredFields);

    let session = hydrate(client.as_ref(), definition, &EntityId::new(id)).await?;
    let session = controller.enter(&session, step)?;
    let values = form_values(&controller, &session, step, &values).await?;

    let mut driver = SessionDriver::new(HistoryNavigator::new());
    driver.begin(session.clone(), step)?;

    let submitted = controller
        .submit(&session, step, &values)
        .await
        .map_err(report_step_error)?;
    let accepted = driver.accept(submitted.clone())?;
    print_outcome(definition, &submitted, &accepted);
    Ok(())
}

async fn cmd_show(
    config: &Config,
    definition: &WizardDefinition,
    id: String,
    step: Option<&str>,
) -> Result<()> {
    let client = build_client(config, definition)?;
    let entity_id = EntityId::new(id);

    let Some(step) = step else {
        let record = client.fetch(&entity_id).await?;
        println!("{}", completeness(definition, &record));
        return print_json(&record.to_json(&config.api.id_field));
    };

    let controller = StepController::new(definition, client.as_ref(), &RequiredFields);
    let session = WizardSession::edit(definition, entity_id);
    let prefill = controller.prefill(&session, step).await?;

    if let Some(warning) = &prefill.warning {
        eprintln!("Warning: could not load saved values ({}); showing empty form", warning);
    }
    print_json(&Value::Object(prefill.values))
}

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;

use tkt::api::{tracker, ApiError, HttpTransport, Transport};
use tkt::config::Config;
use tkt::fields::resolve::{
    compose_field_set, note_flag_overrides, resolve_field, resolve_version_field,
    take_version_value, Resolution, ResolveOptions, StdinPrompt,
};
use tkt::fields::validate::{missing_required_fields, validate_edit_fields, validate_fields};
use tkt::fields::{cache, create_view, normalize, normalize_name, IssueKind};
use tkt::issue::{is_issue_key, payload};
use tkt::logging;
use tkt::session::SessionStore;
use tkt::store::Store;

#[derive(Parser)]
#[command(name = "tkt")]
#[command(about = "Ticket workflow CLI with dynamic field discovery")]
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
    /// Create a new issue
    Create(CreateArgs),

    /// Update fields on an existing issue
    Update(UpdateArgs),

    /// Show an issue
    View {
        /// Issue key (e.g. OPS-42)
        key: String,

        /// Print the raw issue document as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or refresh discovered field metadata
    Fields {
        #[command(subcommand)]
        action: FieldsAction,
    },

    /// Manage stored field defaults
    Defaults {
        #[command(subcommand)]
        action: DefaultsAction,
    },

    /// Link local work sessions to issues
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Args)]
struct CreateArgs {
    /// Issue kind (bug, story, task, epic, spike)
    kind: String,

    /// One-line summary
    summary: String,

    /// Longer description
    #[arg(short, long)]
    description: Option<String>,

    /// Custom field as name=value (repeatable)
    #[arg(short, long = "field", value_name = "NAME=VALUE")]
    field: Vec<String>,

    /// Component name(s), comma separated
    #[arg(long)]
    component: Option<String>,

    /// Priority name
    #[arg(long)]
    priority: Option<String>,

    /// Label (repeatable)
    #[arg(long)]
    label: Vec<String>,

    /// Affected version
    #[arg(long)]
    affects_version: Option<String>,

    /// Assignee account name
    #[arg(long)]
    assignee: Option<String>,

    /// Force a field metadata refresh before creating
    #[arg(long)]
    refresh: bool,

    /// Print the payload instead of creating the issue
    #[arg(long)]
    dry_run: bool,

    /// Never prompt; fail on missing required fields
    #[arg(long)]
    no_input: bool,

    /// Machine-readable output (implies --no-input)
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct UpdateArgs {
    /// Issue key (e.g. OPS-42)
    key: String,

    /// Replace the summary
    #[arg(short, long)]
    summary: Option<String>,

    /// Replace the description
    #[arg(short, long)]
    description: Option<String>,

    /// Field to change as name=value (repeatable)
    #[arg(short, long = "field", value_name = "NAME=VALUE")]
    field: Vec<String>,

    /// Change the priority
    #[arg(long)]
    priority: Option<String>,

    /// Reassign to an account name
    #[arg(long)]
    assignee: Option<String>,

    /// Print the payload instead of updating the issue
    #[arg(long)]
    dry_run: bool,

    /// Machine-readable output
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand)]
enum FieldsAction {
    /// Re-run discovery against the tracker
    Refresh,

    /// List discovered fields
    List,

    /// Show one field in detail
    Show {
        /// Field name (any spelling the mapping knows)
        name: String,
    },
}

#[derive(Subcommand)]
enum DefaultsAction {
    /// Store a default as name=value
    Set {
        /// name=value pair
        entry: String,

        /// Store under system field ids (components, priority, ...)
        #[arg(long)]
        system: bool,
    },

    /// Remove a stored default
    Unset { name: String },

    /// List stored defaults
    List,
}

#[derive(Subcommand)]
enum SessionAction {
    /// Link a ticket to a working directory
    Link {
        /// Ticket key
        ticket: String,

        /// Session name (defaults to the directory name)
        #[arg(long)]
        name: Option<String>,

        /// Working directory (defaults to the current directory)
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// List session links
    List,

    /// Remove the link for a ticket
    Unlink { ticket: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    logging::init_logging(&config, cli.debug)?;

    match cli.command {
        Commands::Create(args) => cmd_create(&config, args),
        Commands::Update(args) => cmd_update(&config, args),
        Commands::View { key, json } => cmd_view(&config, &key, json),
        Commands::Fields { action } => cmd_fields(&config, action),
        Commands::Defaults { action } => cmd_defaults(&config, action),
        Commands::Session { action } => cmd_session(&config, action),
    }
}

/// Parse repeated name=value flags. Values that parse as JSON objects or
/// arrays pass through shaped; everything else stays a string.
fn parse_field_args(args: &[String]) -> Result<BTreeMap<String, Value>> {
    let mut fields = BTreeMap::new();
    for arg in args {
        let Some((name, value)) = arg.split_once('=') else {
            bail!("invalid --field '{}'; expected name=value", arg);
        };
        let name = name.trim();
        if name.is_empty() {
            bail!("invalid --field '{}'; expected name=value", arg);
        }
        let value = serde_json::from_str(value)
            .ok()
            .filter(|v: &Value| v.is_object() || v.is_array())
            .unwrap_or_else(|| Value::String(value.trim().to_string()));
        fields.insert(name.to_string(), value);
    }
    Ok(fields)
}

/// Make sure the store holds a usable field mapping, re-running discovery
/// when forced, missing, or stale. Returns whether this run produced a
/// degraded mapping.
fn ensure_fields(
    transport: &dyn Transport,
    config: &Config,
    store: &mut Store,
    force: bool,
) -> Result<bool> {
    let stale = cache::is_stale(
        store.field_cache_timestamp.as_deref(),
        config.fields.cache_max_age_days,
        config.fields.cache_max_age_hours,
    );

    if !force && !store.field_mappings.is_empty() && !stale {
        return Ok(false);
    }

    let discovery =
        cache::discover(transport, &config.tracker.project).context("Field discovery failed")?;
    if discovery.degraded {
        eprintln!(
            "Note: tracker did not serve creation metadata; using the flat field \
             catalog. Required-field checks are left to the server."
        );
    }
    store.record_mapping(discovery.mapping);
    store.save()?;
    Ok(discovery.degraded)
}

/// Print violations (human or JSON) and exit nonzero
fn exit_with_violations(
    json_output: bool,
    headline: &str,
    violations: &[String],
    hint: Option<&str>,
) -> ! {
    if json_output {
        println!(
            "{}",
            json!({"ok": false, "error": "validation", "violations": violations})
        );
    } else {
        eprintln!("{headline}:");
        for violation in violations {
            eprintln!("  - {violation}");
        }
        if let Some(hint) = hint {
            eprintln!();
            eprintln!("{hint}");
        }
    }
    std::process::exit(1);
}

/// Print a tracker failure (human or JSON) and exit nonzero. Auth failures
/// get a credentials reminder on the human path.
fn exit_with_api_error(json_output: bool, headline: &str, err: &ApiError) -> ! {
    if json_output {
        println!(
            "{}",
            json!({"ok": false, "error": err.code(), "message": err.to_string()})
        );
    } else {
        eprintln!("{headline}: {err}");
        if err.is_auth_error() {
            eprintln!("Check TKT_TRACKER_TOKEN (and TKT_TRACKER_EMAIL for basic auth).");
        }
    }
    std::process::exit(1);
}

fn cmd_create(config: &Config, args: CreateArgs) -> Result<()> {
    let kind: IssueKind = match args.kind.parse() {
        Ok(kind) => kind,
        Err(message) => {
            eprintln!("{message}");
            std::process::exit(2);
        }
    };

    if config.tracker.project.is_empty() {
        bail!("tracker.project is not configured; set it in .tkt/config.toml");
    }

    let transport = HttpTransport::from_config(config)?;
    let mut store = Store::load(&config.data_path())?;
    ensure_fields(&transport, config, &mut store, args.refresh)?;

    // the mapping is read throughout while the store mutates for writebacks
    let map = store.field_mappings.clone();

    let mut explicit = parse_field_args(&args.field)?;
    let mut system: BTreeMap<String, Value> = BTreeMap::new();
    if let Some(component) = &args.component {
        system.insert("components".to_string(), json!(component));
    }
    if let Some(priority) = &args.priority {
        system.insert("priority".to_string(), json!(priority));
    }
    if !args.label.is_empty() {
        system.insert("labels".to_string(), json!(args.label));
    }
    if let Some(assignee) = &args.assignee {
        system.insert("assignee".to_string(), json!(assignee));
    }

    // --field can name the version under any of its spellings; lift the
    // value onto the version path instead of the generic pass-through
    let field_version = take_version_value(&mut explicit, &map);
    let version_flag = args.affects_version.or(field_version);

    // stored defaults participate as provided values; explicit flags win,
    // and a flag shadowing a differing stored default is noted
    note_flag_overrides(&explicit, &store);
    note_flag_overrides(&system, &store);
    let mut custom_all = store.custom_field_defaults.clone();
    custom_all.extend(explicit);
    let mut system_all = store.system_field_defaults.clone();
    system_all.extend(system);

    let options = ResolveOptions {
        interactive: !args.no_input && !args.json,
    };
    let mut prompt = StdinPrompt;
    let hint = format!(
        "If field metadata looks outdated, run 'tkt fields refresh'.\n\
         Stored defaults live in {}.",
        config.data_path().join("defaults.json").display()
    );

    // version family first: it has its own lookup and validation path
    match resolve_version_field(
        kind,
        version_flag.as_deref(),
        &map,
        &mut store,
        &mut prompt,
        &options,
    ) {
        Ok(Some((name, Resolution::Value(value)))) => {
            custom_all.insert(name, Value::String(value));
        }
        Ok(Some((_, Resolution::Absent)) | None) => {}
        Err(err) => exit_with_violations(
            args.json,
            "Issue not created",
            &[err.to_string()],
            Some(&hint),
        ),
    }

    // remaining required fields: stored defaults or prompts
    let missing = missing_required_fields(kind, &custom_all, &system_all, &map);
    for (name, info) in missing {
        match resolve_field(
            &name,
            None,
            Some(&info),
            true,
            &mut store,
            &mut prompt,
            &options,
        ) {
            Ok(Resolution::Value(value)) => {
                custom_all.insert(name, Value::String(value));
            }
            Ok(Resolution::Absent) => {}
            Err(err) => exit_with_violations(
                args.json,
                "Issue not created",
                &[err.to_string()],
                Some(&hint),
            ),
        }
    }

    let report = validate_fields(kind, &custom_all, &system_all, &map);
    if !report.is_valid() {
        exit_with_violations(args.json, "Issue not created", &report.violations, Some(&hint));
    }

    let field_set = compose_field_set(&map, &custom_all, &system_all);
    let request = payload::build_create_payload(
        &config.tracker.project,
        kind,
        &args.summary,
        args.description.as_deref(),
        &field_set,
        &map,
    );

    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&request)?);
        return Ok(());
    }

    match tracker::create_issue(&transport, &request) {
        Ok(created) => {
            if args.json {
                println!(
                    "{}",
                    json!({
                        "ok": true,
                        "key": created.key,
                        "id": created.id,
                        "url": config.browse_url(&created.key),
                    })
                );
            } else {
                println!("Created {}", created.key);
                println!("{}", config.browse_url(&created.key));
            }
            Ok(())
        }
        Err(ApiError::Validation {
            messages,
            field_errors,
        }) => {
            let mut violations = messages;
            violations.extend(field_errors.iter().map(|(f, m)| format!("{f}: {m}")));
            exit_with_violations(
                args.json,
                "Tracker rejected the issue",
                &violations,
                Some(&hint),
            )
        }
        Err(err) => exit_with_api_error(args.json, "Issue not created", &err),
    }
}

fn cmd_update(config: &Config, args: UpdateArgs) -> Result<()> {
    if !is_issue_key(&args.key) {
        bail!(
            "'{}' does not look like an issue key (expected e.g. OPS-42)",
            args.key
        );
    }

    let mut edits = parse_field_args(&args.field)?;
    if let Some(summary) = &args.summary {
        edits.insert("summary".to_string(), Value::String(summary.clone()));
    }
    if let Some(description) = &args.description {
        edits.insert("description".to_string(), Value::String(description.clone()));
    }
    if let Some(priority) = &args.priority {
        edits.insert("priority".to_string(), Value::String(priority.clone()));
    }
    if let Some(assignee) = &args.assignee {
        edits.insert("assignee".to_string(), Value::String(assignee.clone()));
    }
    if edits.is_empty() {
        bail!("nothing to update; pass a flag or at least one --field name=value");
    }

    let transport = HttpTransport::from_config(config)?;

    let raw_meta = match tracker::fetch_edit_metadata(&transport, &args.key) {
        Ok(meta) => meta,
        Err(err) => {
            exit_with_api_error(args.json, &format!("{} not updated", args.key), &err)
        }
    };
    let edit_map = normalize::normalize_edit(&raw_meta);

    let report = validate_edit_fields(&edits, &edit_map);
    if !report.is_valid() {
        exit_with_violations(
            args.json,
            &format!("{} not updated", args.key),
            &report.violations,
            None,
        );
    }

    // translate names to wire ids; unknown names pass through for the
    // server to judge
    let view = create_view(&edit_map);
    let mut edits_by_id = BTreeMap::new();
    for (name, value) in &edits {
        let id = cache::field_id(&view, name).unwrap_or_else(|| name.clone());
        edits_by_id.insert(id, value.clone());
    }

    let request = payload::build_update_payload(&edits_by_id, &view);

    if args.dry_run {
        println!("{}", serde_json::to_string_pretty(&request)?);
        return Ok(());
    }

    match tracker::update_issue(&transport, &args.key, &request) {
        Ok(()) => {
            if args.json {
                println!("{}", json!({"ok": true, "key": args.key}));
            } else {
                println!("Updated {}", args.key);
            }
            Ok(())
        }
        Err(ApiError::Validation {
            messages,
            field_errors,
        }) => {
            let mut violations = messages;
            violations.extend(field_errors.iter().map(|(f, m)| format!("{f}: {m}")));
            exit_with_violations(
                args.json,
                &format!("Tracker rejected the update to {}", args.key),
                &violations,
                None,
            )
        }
        Err(err) => exit_with_api_error(args.json, &format!("{} not updated", args.key), &err),
    }
}

fn cmd_view(config: &Config, key: &str, json_output: bool) -> Result<()> {
    if !is_issue_key(key) {
        bail!("'{key}' does not look like an issue key (expected e.g. OPS-42)");
    }

    let transport = HttpTransport::from_config(config)?;
    let raw = match tracker::get_issue(&transport, key) {
        Ok(raw) => raw,
        Err(err) => exit_with_api_error(json_output, &format!("Could not fetch {key}"), &err),
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&raw)?);
        return Ok(());
    }

    let details = tracker::issue_details(&raw);
    println!("{}  {}", details.key, details.summary);
    println!("{}", "─".repeat(60));
    if let Some(kind) = &details.kind {
        println!("Type:     {kind}");
    }
    if let Some(status) = &details.status {
        println!("Status:   {status}");
    }
    if let Some(assignee) = &details.assignee {
        println!("Assignee: {assignee}");
    }
    if let Some(link) = SessionStore::load(&config.data_path())?.find(key) {
        println!("Session:  {} ({})", link.name, link.path.display());
    }
    if let Some(description) = &details.description {
        println!();
        println!("{description}");
    }

    Ok(())
}

fn cmd_fields(config: &Config, action: FieldsAction) -> Result<()> {
    let mut store = Store::load(&config.data_path())?;

    match action {
        FieldsAction::Refresh => {
            if config.tracker.project.is_empty() {
                bail!("tracker.project is not configured; set it in .tkt/config.toml");
            }
            let transport = HttpTransport::from_config(config)?;
            ensure_fields(&transport, config, &mut store, true)?;
            println!(
                "Discovered {} fields for {}",
                store.field_mappings.len(),
                config.tracker.project
            );
        }
        FieldsAction::List => {
            if store.field_mappings.is_empty() {
                println!("No field metadata cached. Run 'tkt fields refresh'.");
                return Ok(());
            }
            for (name, info) in &store.field_mappings {
                let required = if info.required_for.is_empty() {
                    String::new()
                } else {
                    format!(
                        "  required for {}",
                        info.required_for
                            .iter()
                            .map(|k| k.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )
                };
                println!("{:<28} {}{}", name, info.id, required);
            }
        }
        FieldsAction::Show { name } => {
            let Some(info) = cache::field_info(&store.field_mappings, &name) else {
                eprintln!("No field named '{name}' in the cached mapping.");
                eprintln!("Run 'tkt fields refresh' if the tracker changed.");
                std::process::exit(1);
            };
            println!("Field:     {name}");
            if !info.name.is_empty() {
                println!("Name:      {}", info.name);
            }
            println!("Id:        {}", info.id);
            if let Some(field_type) = &info.field_type {
                println!("Type:      {field_type}");
            }
            if info.schema != info.field_type {
                if let Some(schema) = &info.schema {
                    println!("Schema:    {schema}");
                }
            }
            if !info.available_for.is_empty() {
                println!(
                    "Available: {}",
                    info.available_for
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            if !info.required_for.is_empty() {
                println!(
                    "Required:  {}",
                    info.required_for
                        .iter()
                        .map(|k| k.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            if !info.allowed_values.is_empty() {
                println!("Allowed:");
                for value in &info.allowed_values {
                    println!("  - {value}");
                }
            }
        }
    }

    Ok(())
}

fn cmd_defaults(config: &Config, action: DefaultsAction) -> Result<()> {
    let mut store = Store::load(&config.data_path())?;

    match action {
        DefaultsAction::Set { entry, system } => {
            let Some((name, value)) = entry.split_once('=') else {
                bail!("invalid default '{}'; expected name=value", entry);
            };
            let name = name.trim();
            let value = Value::String(value.trim().to_string());
            if system {
                store.set_system_default(name, value);
            } else {
                store.set_custom_default(&normalize_name(name), value);
            }
            store.save()?;
            println!("Stored default for {name}");
        }
        DefaultsAction::Unset { name } => {
            if store.unset_default(&normalize_name(&name)) {
                store.save()?;
                println!("Removed default for {name}");
            } else {
                println!("No default stored for {name}");
            }
        }
        DefaultsAction::List => {
            if store.custom_field_defaults.is_empty() && store.system_field_defaults.is_empty() {
                println!("No defaults stored.");
                return Ok(());
            }
            for (name, value) in &store.custom_field_defaults {
                println!("{name:<28} {value}");
            }
            for (id, value) in &store.system_field_defaults {
                println!("{id:<28} {value}  (system)");
            }
        }
    }

    Ok(())
}

fn cmd_session(config: &Config, action: SessionAction) -> Result<()> {
    let mut sessions = SessionStore::load(&config.data_path())?;

    match action {
        SessionAction::Link { ticket, name, path } => {
            if !is_issue_key(&ticket) {
                bail!("'{ticket}' does not look like an issue key (expected e.g. OPS-42)");
            }
            let path = match path {
                Some(path) => path,
                None => std::env::current_dir().context("Failed to resolve current directory")?,
            };
            let name = name.unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| ticket.clone())
            });
            let link = sessions.link(&ticket, &name, path)?;
            println!("Linked {} to {}", link.ticket, link.path.display());
        }
        SessionAction::List => {
            if sessions.sessions.is_empty() {
                println!("No sessions linked.");
                return Ok(());
            }
            for link in &sessions.sessions {
                println!("{:<12} {:<20} {}", link.ticket, link.name, link.path.display());
            }
        }
        SessionAction::Unlink { ticket } => {
            if sessions.unlink(&ticket)? {
                println!("Unlinked {ticket}");
            } else {
                println!("No session linked to {ticket}");
            }
        }
    }

    Ok(())
}

//! CLI definition and command dispatch for `kibbler`.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgGroup, Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

use kibbler_core::aggregator::analytics::AnalyticsView;
use kibbler_core::aggregator::dashboard::{ChartPeriod, DashboardView};
use kibbler_core::aggregator::notifications::{
    NotificationFeed, NotificationFilter, NotificationItem, NotificationKind,
};
use kibbler_core::aggregator::pets::{
    InactiveHours, PetSortField, PetStats, PetsView, SortDirection, sort_pets,
};
use kibbler_core::aggregator::{Aggregator, AggregatorConfig};
use kibbler_core::core::config::Config;
use kibbler_core::core::errors::KibError;
use kibbler_core::demo::{self, DemoOptions};
use kibbler_core::logger::{AuditConfig, AuditLog};
use kibbler_core::ops::{DeviceOps, DeviceSettings, SettingsPatch};
use kibbler_core::snapshot::{Clock, DeviceSnapshot};
use kibbler_core::store::{DeviceStore, SqliteStore, StorePath, WriteBatch, read_snapshot};
use kibbler_core::watch::{self, StopSignal};

/// Kibbler pet feeder dashboard from the command line.
#[derive(Debug, Parser)]
#[command(
    name = "kibbler",
    author,
    version,
    about = "Kibbler pet feeder dashboard",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Device id to operate on (overrides config).
    #[arg(long, global = true, value_name = "ID")]
    device: Option<String>,
    /// Evaluate as if the current time were this RFC 3339 instant.
    #[arg(long, global = true, value_name = "RFC3339")]
    now: Option<String>,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Device status, feeding stats, dispense chart and tray freshness.
    Dashboard(DashboardArgs),
    /// Visit patterns per pet, peak hours and week-over-week change.
    Analytics,
    /// Registered pets with visit counts and inactivity.
    Pets(PetsArgs),
    /// Alerts and activity feed.
    Notifications(NotificationsArgs),
    /// Rename the pet bound to a tag everywhere it appears.
    Rename(RenameArgs),
    /// Manage the default pet name list.
    Names(NamesArgs),
    /// Show or change feeder settings.
    Settings(SettingsArgs),
    /// Mark notifications read.
    Read(ReadArgs),
    /// RFID tag registration.
    Tag(TagArgs),
    /// Replace the device tree with the contents of a JSON file.
    Import(ImportArgs),
    /// Print the raw device tree.
    Export,
    /// Re-derive and print on every store change until interrupted.
    Watch(WatchArgs),
    /// Seed the store with a randomized device tree.
    Demo(DemoArgs),
    /// View configuration state.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct DashboardArgs {
    /// Chart period: 7days, 4weeks or 6months (default from config).
    #[arg(long, value_name = "PERIOD")]
    period: Option<ChartPeriod>,
}

#[derive(Debug, Clone, Args)]
struct PetsArgs {
    /// Sort field: name, visits or inactive.
    #[arg(long, default_value = "name")]
    sort: PetSortField,
    /// Sort descending.
    #[arg(long)]
    desc: bool,
    /// Case-insensitive name filter.
    #[arg(long, value_name = "TEXT")]
    search: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct NotificationsArgs {
    /// Kind filter: all, alert, activity or reminder.
    #[arg(long, default_value = "all")]
    filter: NotificationFilter,
    /// Only unread items.
    #[arg(long)]
    unread: bool,
}

#[derive(Debug, Clone, Args)]
struct RenameArgs {
    /// RFID tag uid.
    uid: String,
    /// New pet name.
    name: String,
}

#[derive(Debug, Clone, Args)]
struct NamesArgs {
    #[command(subcommand)]
    command: Option<NamesCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum NamesCommand {
    /// Available, assigned and unassigned names.
    List,
    /// Add a name to the default list.
    Add { name: String },
    /// Remove a name from the default list.
    Remove { name: String },
    /// Seed the list from config when the device has none.
    Init,
}

#[derive(Debug, Clone, Args)]
struct SettingsArgs {
    #[command(subcommand)]
    command: Option<SettingsCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum SettingsCommand {
    /// Current settings with defaults applied.
    Show,
    /// Change one or more settings.
    Set(SettingsSetArgs),
    /// Ask the feeder to sleep now.
    Sleep,
    /// Write default auto-wake settings when absent.
    Init,
}

#[derive(Debug, Clone, Args)]
struct SettingsSetArgs {
    /// Portion size, 1-100 percent.
    #[arg(long, value_name = "PCT")]
    portion: Option<u32>,
    /// Feeding interval, 1-24 hours.
    #[arg(long, value_name = "HOURS")]
    interval: Option<u32>,
    /// Enable or disable auto wake.
    #[arg(long, value_name = "BOOL")]
    auto_wake: Option<bool>,
    /// Auto-wake delay, 1-24 hours.
    #[arg(long, value_name = "HOURS")]
    wake_hours: Option<u32>,
}

#[derive(Debug, Clone, Args)]
#[command(group(ArgGroup::new("target").required(true).args(["id", "all"])))]
struct ReadArgs {
    /// Notification id as shown by `kibbler notifications`.
    id: Option<String>,
    /// Mark every unread notification read.
    #[arg(long)]
    all: bool,
}

#[derive(Debug, Clone, Args)]
struct TagArgs {
    #[command(subcommand)]
    command: TagCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum TagCommand {
    /// Put the feeder into registration mode.
    Start,
    /// Leave registration mode.
    Stop,
    /// Name the most recently detected tag.
    Register { name: String },
}

#[derive(Debug, Clone, Args)]
struct ImportArgs {
    /// JSON file holding a device tree (or `kibbler export --json` output).
    file: PathBuf,
}

#[derive(Debug, Clone, Args)]
struct WatchArgs {
    /// How often to check for shutdown while idle, in milliseconds.
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,
}

#[derive(Debug, Clone, Args)]
struct DemoArgs {
    /// Seed for a reproducible tree.
    #[arg(long)]
    seed: Option<u64>,
    /// Number of pets.
    #[arg(long, default_value_t = 3)]
    pets: usize,
    /// Days of feeding history.
    #[arg(long, default_value_t = 14)]
    days: u32,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Validate configuration and exit.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<KibError> for CliError {
    fn from(err: KibError) -> Self {
        if err.is_user_error() {
            Self::User(err.to_string())
        } else if matches!(err, KibError::Serialization { .. }) {
            Self::Internal(err.to_string())
        } else {
            Self::Runtime(err.to_string())
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
        command => {
            let session = Session::load(cli)?;
            match command {
                Command::Dashboard(args) => run_dashboard(&session, args),
                Command::Analytics => run_analytics(&session),
                Command::Pets(args) => run_pets(&session, args),
                Command::Notifications(args) => run_notifications(&session, args),
                Command::Rename(args) => run_rename(&session, args),
                Command::Names(args) => run_names(&session, args),
                Command::Settings(args) => run_settings(&session, args),
                Command::Read(args) => run_read(&session, args),
                Command::Tag(args) => run_tag(&session, args),
                Command::Import(args) => run_import(&session, args),
                Command::Export => run_export(&session),
                Command::Watch(args) => run_watch(&session, args),
                Command::Demo(args) => run_demo(&session, args),
                Command::Config(_) | Command::Completions(_) => Err(CliError::Internal(
                    "command dispatched twice".to_string(),
                )),
            }
        }
    }
}

// ──────────────────── session ────────────────────

/// Everything a device command needs: effective config, device id, clock.
struct Session {
    config: Config,
    device: String,
    fixed_now: Option<Clock>,
    clock: Clock,
    mode: OutputMode,
}

impl Session {
    fn load(cli: &Cli) -> Result<Self, CliError> {
        let mut config = Config::load(cli.config.as_deref())?;
        if let Some(device) = &cli.device {
            config.device.id.clone_from(device);
            config.validate()?;
        }
        let fixed_now = cli
            .now
            .as_deref()
            .map(|raw| {
                Clock::from_rfc3339(raw)
                    .map_err(|e| CliError::User(format!("invalid --now value {raw:?}: {e}")))
            })
            .transpose()?;
        Ok(Self {
            device: config.device.id.clone(),
            clock: fixed_now.unwrap_or_else(Clock::system),
            fixed_now,
            config,
            mode: output_mode(cli),
        })
    }

    fn root(&self) -> Result<StorePath, CliError> {
        Ok(StorePath::device(&self.device)?)
    }

    fn open_store(&self) -> Result<SqliteStore, CliError> {
        Ok(SqliteStore::open(
            &self.config.store.sqlite_db,
            Duration::from_millis(self.config.store.poll_interval_ms),
        )?)
    }

    fn aggregator(&self) -> Aggregator {
        Aggregator::new(AggregatorConfig::from(&self.config))
    }

    fn snapshot(&self) -> Result<DeviceSnapshot, CliError> {
        let store = self.open_store()?;
        Ok(read_snapshot(&store, &self.root()?)?)
    }

    /// Fresh clock per call unless `--now` pinned one.
    fn tick_clock(&self) -> Clock {
        self.fixed_now.unwrap_or_else(Clock::system)
    }

    /// Run `f` against an audited [`DeviceOps`] for this device.
    fn with_ops<T>(
        &self,
        f: impl FnOnce(&DeviceOps<'_>) -> kibbler_core::core::errors::Result<T>,
    ) -> Result<T, CliError> {
        let store = self.open_store()?;
        let audit = AuditLog::open(AuditConfig::at(&self.config.paths.audit_log));
        let ops = DeviceOps::new(&store, &self.device)?
            .with_audit(&audit)
            .with_default_names(&self.config.pets.default_names);
        Ok(f(&ops)?)
    }

    fn emit_view<T: Serialize>(
        &self,
        command: &str,
        view: &T,
        human: impl FnOnce(),
    ) -> Result<(), CliError> {
        match self.mode {
            OutputMode::Human => {
                human();
                Ok(())
            }
            OutputMode::Json => write_json_line(&json!({
                "command": command,
                "device": self.device,
                "now": self.clock.now_iso(),
                "view": serde_json::to_value(view)?,
            })),
        }
    }

    /// Report a write. `revision` is `None` when nothing needed writing.
    fn emit_write(
        &self,
        command: &str,
        revision: Option<u64>,
        message: &str,
    ) -> Result<(), CliError> {
        match self.mode {
            OutputMode::Human => {
                if revision.is_some() {
                    println!("{}", message.green());
                } else {
                    println!("{}", "Nothing to change.".dimmed());
                }
                Ok(())
            }
            OutputMode::Json => write_json_line(&json!({
                "command": command,
                "device": self.device,
                "ok": true,
                "changed": revision.is_some(),
                "revision": revision,
            })),
        }
    }
}

// ──────────────────── read-side commands ────────────────────

fn run_dashboard(session: &Session, args: &DashboardArgs) -> Result<(), CliError> {
    let snapshot = session.snapshot()?;
    let mut aggregator_config = AggregatorConfig::from(&session.config);
    if let Some(period) = args.period {
        aggregator_config.period = period;
    }
    let view = Aggregator::new(aggregator_config).dashboard(&snapshot, &session.clock);
    session.emit_view("dashboard", &view, || print_dashboard(&session.device, &view))
}

fn run_analytics(session: &Session) -> Result<(), CliError> {
    let snapshot = session.snapshot()?;
    let view = session.aggregator().analytics(&snapshot, &session.clock);
    session.emit_view("analytics", &view, || print_analytics(&view))
}

fn run_pets(session: &Session, args: &PetsArgs) -> Result<(), CliError> {
    let snapshot = session.snapshot()?;
    let view = session.aggregator().pets(&snapshot, &session.clock);
    let direction = if args.desc {
        SortDirection::Desc
    } else {
        SortDirection::Asc
    };
    let rows = sort_pets(&view, args.sort, direction, args.search.as_deref());
    match session.mode {
        OutputMode::Human => {
            print_pets(&rows, &view);
            Ok(())
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "pets",
            "device": session.device,
            "now": session.clock.now_iso(),
            "pets": rows,
            "view": serde_json::to_value(&view)?,
        })),
    }
}

fn run_notifications(session: &Session, args: &NotificationsArgs) -> Result<(), CliError> {
    let snapshot = session.snapshot()?;
    let feed = session.aggregator().notifications(&snapshot, &session.clock);
    let items: Vec<_> = feed
        .filtered(args.filter)
        .filter(|n| !args.unread || !n.read)
        .collect();
    match session.mode {
        OutputMode::Human => {
            print_notifications(&items, &feed);
            Ok(())
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "notifications",
            "device": session.device,
            "now": session.clock.now_iso(),
            "filter": args.filter,
            "unread_count": feed.unread_count,
            "items": items,
        })),
    }
}

fn run_export(session: &Session) -> Result<(), CliError> {
    let store = session.open_store()?;
    let tree = store.read(&session.root()?)?;
    match session.mode {
        OutputMode::Human => {
            println!("{}", serde_json::to_string_pretty(&tree)?);
            Ok(())
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "export",
            "device": session.device,
            "tree": tree,
        })),
    }
}

// ──────────────────── write-side commands ────────────────────

fn run_rename(session: &Session, args: &RenameArgs) -> Result<(), CliError> {
    let pets = session.aggregator().pets(&session.snapshot()?, &session.clock);
    ensure_name_free(&pets, &args.name, &args.uid)?;
    let revision = session.with_ops(|ops| ops.rename_pet(&args.uid, &args.name))?;
    session.emit_write(
        "rename",
        Some(revision),
        &format!("Renamed {} to {}.", args.uid, args.name.trim()),
    )
}

fn run_names(session: &Session, args: &NamesArgs) -> Result<(), CliError> {
    match args.command.as_ref().unwrap_or(&NamesCommand::List) {
        NamesCommand::List => {
            let view = session.aggregator().pets(&session.snapshot()?, &session.clock);
            let names = json!({
                "all_names": view.all_names,
                "assigned_names": view.assigned_names,
                "unassigned_names": view.unassigned_names,
            });
            session.emit_view("names list", &names, || print_names(&view))
        }
        NamesCommand::Add { name } => {
            let revision = session.with_ops(|ops| ops.add_default_name(name))?;
            session.emit_write("names add", Some(revision), &format!("Added {}.", name.trim()))
        }
        NamesCommand::Remove { name } => {
            let revision = session.with_ops(|ops| ops.remove_default_name(name))?;
            session.emit_write("names remove", Some(revision), &format!("Removed {name}."))
        }
        NamesCommand::Init => {
            let revision = session.with_ops(|ops| ops.init_default_names())?;
            session.emit_write("names init", revision, "Default pet names initialised.")
        }
    }
}

fn run_settings(session: &Session, args: &SettingsArgs) -> Result<(), CliError> {
    match args.command.as_ref().unwrap_or(&SettingsCommand::Show) {
        SettingsCommand::Show => {
            let settings = DeviceSettings::current(&session.snapshot()?);
            session.emit_view("settings show", &settings, || print_settings(&settings))
        }
        SettingsCommand::Set(set) => {
            let patch = SettingsPatch {
                portion_level: set.portion,
                feeding_interval_hours: set.interval,
                auto_wake_enabled: set.auto_wake,
                auto_wake_hours: set.wake_hours,
            };
            if patch.is_empty() {
                return Err(CliError::User(
                    "nothing to set; pass --portion, --interval, --auto-wake or --wake-hours"
                        .to_string(),
                ));
            }
            let revision = session.with_ops(|ops| {
                let merged = patch.apply(DeviceSettings::current(&ops.snapshot()?));
                ops.save_settings(&merged)
            })?;
            session.emit_write("settings set", Some(revision), "Settings saved.")
        }
        SettingsCommand::Sleep => {
            let revision = session.with_ops(|ops| ops.send_sleep_command())?;
            session.emit_write("settings sleep", Some(revision), "Sleep command sent.")
        }
        SettingsCommand::Init => {
            let revision = session.with_ops(|ops| ops.ensure_sleep_settings())?;
            session.emit_write("settings init", revision, "Sleep settings initialised.")
        }
    }
}

fn run_read(session: &Session, args: &ReadArgs) -> Result<(), CliError> {
    let feed = session
        .aggregator()
        .notifications(&session.snapshot()?, &session.clock);
    if args.all {
        let revision = session.with_ops(|ops| ops.mark_all_read(&feed))?;
        return session.emit_write("read", revision, "All notifications marked read.");
    }
    let id = args
        .id
        .as_deref()
        .ok_or_else(|| CliError::User("pass a notification id or --all".to_string()))?;
    if feed.get(id).is_none() {
        return Err(CliError::User(format!("no notification with id {id:?}")));
    }
    let revision = session.with_ops(|ops| ops.mark_read(id))?;
    session.emit_write("read", Some(revision), "Notification marked read.")
}

fn run_tag(session: &Session, args: &TagArgs) -> Result<(), CliError> {
    match &args.command {
        TagCommand::Start => {
            let revision = session.with_ops(|ops| ops.start_tag_registration())?;
            session.emit_write(
                "tag start",
                Some(revision),
                "Registration mode on; scan a tag at the feeder.",
            )
        }
        TagCommand::Stop => {
            let revision = session.with_ops(|ops| ops.stop_tag_registration())?;
            session.emit_write("tag stop", Some(revision), "Registration mode off.")
        }
        TagCommand::Register { name } => {
            let snapshot = session.snapshot()?;
            if let Some(uid) = snapshot.detected_tag_uid() {
                let pets = session.aggregator().pets(&snapshot, &session.clock);
                ensure_name_free(&pets, name, uid)?;
            }
            let revision = session.with_ops(|ops| ops.register_tag(name))?;
            session.emit_write(
                "tag register",
                Some(revision),
                &format!("Tag registered as {}.", name.trim()),
            )
        }
    }
}

fn run_import(session: &Session, args: &ImportArgs) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(&args.file)
        .map_err(|e| CliError::User(format!("cannot read {}: {e}", args.file.display())))?;
    let parsed: Value = serde_json::from_str(&raw)
        .map_err(|e| CliError::User(format!("{} is not JSON: {e}", args.file.display())))?;
    // Accept both a bare tree and the JSON-mode export envelope.
    let tree = match parsed {
        Value::Object(mut map) if map.get("command").and_then(Value::as_str) == Some("export") => {
            map.remove("tree").unwrap_or(Value::Null)
        }
        other => other,
    };
    if !tree.is_object() {
        return Err(CliError::User(
            "import file must hold a JSON object device tree".to_string(),
        ));
    }
    let revision = session.with_ops(|ops| {
        let mut batch = WriteBatch::new();
        batch.set(ops.root().clone(), tree);
        ops.submit("import", &batch)
    })?;
    session.emit_write(
        "import",
        Some(revision),
        &format!("Imported {} into {}.", args.file.display(), session.device),
    )
}

fn run_demo(session: &Session, args: &DemoArgs) -> Result<(), CliError> {
    let options = DemoOptions {
        pets: args.pets,
        days: args.days,
        seed: args.seed,
    };
    let tree = demo::generate(&session.clock, &session.config.pets.default_names, &options);
    let revision = session.with_ops(|ops| {
        let mut batch = WriteBatch::new();
        batch.set(ops.root().clone(), tree);
        ops.submit("demo", &batch)
    })?;
    session.emit_write(
        "demo",
        Some(revision),
        &format!("Seeded {} with a demo device tree.", session.device),
    )
}

fn run_watch(session: &Session, args: &WatchArgs) -> Result<(), CliError> {
    let store = session.open_store()?;
    let rx = store.subscribe(&session.root()?)?;
    let stop = StopSignal::with_os_signals();
    let mode = session.mode;
    let device = session.device.clone();

    let summary = watch::run(
        &rx,
        &session.aggregator(),
        || session.tick_clock(),
        &stop,
        Duration::from_millis(args.tick_ms.max(10)),
        |view| {
            let emitted = match mode {
                OutputMode::Human => {
                    println!("{}", "─".repeat(60).dimmed());
                    print_dashboard(&device, &view.dashboard);
                    println!();
                    println!(
                        "{} unread notification(s)",
                        view.notifications.unread_count.to_string().bold()
                    );
                    Ok(())
                }
                OutputMode::Json => serde_json::to_value(view)
                    .map_err(CliError::from)
                    .and_then(|v| {
                        write_json_line(&json!({"command": "watch", "device": device, "view": v}))
                    }),
            };
            emitted.map_err(|e| KibError::Runtime {
                details: e.to_string(),
            })
        },
    )?;

    match mode {
        OutputMode::Human => {
            eprintln!(
                "Stopped after {} snapshot(s), {} update(s).",
                summary.snapshots, summary.emitted
            );
            Ok(())
        }
        OutputMode::Json => write_json_line(&json!({
            "command": "watch",
            "device": session.device,
            "stopped": true,
            "summary": summary,
        })),
    }
}

fn ensure_name_free(pets: &PetsView, name: &str, uid: &str) -> Result<(), CliError> {
    if pets.name_taken(name.trim(), Some(uid)) {
        return Err(CliError::User(format!(
            "{:?} is already assigned to another tag",
            name.trim()
        )));
    }
    Ok(())
}

// ──────────────────── config ────────────────────

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    let mode = output_mode(cli);
    match args.command.as_ref().unwrap_or(&ConfigCommand::Path) {
        ConfigCommand::Path => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();
            match mode {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => write_json_line(&json!({
                    "command": "config path",
                    "path": path.to_string_lossy(),
                    "exists": exists,
                }))?,
            }
            Ok(())
        }
        ConfigCommand::Show => {
            let config = Config::load(cli.config.as_deref())?;
            match mode {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Internal(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => write_json_line(&json!({
                    "command": "config show",
                    "config": serde_json::to_value(&config)?,
                }))?,
            }
            Ok(())
        }
        ConfigCommand::Validate => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;
                match mode {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.paths.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => write_json_line(&json!({
                        "command": "config validate",
                        "valid": true,
                        "path": config.paths.config_file.to_string_lossy(),
                        "hash": hash,
                    }))?,
                }
                Ok(())
            }
            Err(e) => {
                match mode {
                    OutputMode::Human => eprintln!("Configuration is INVALID: {e}"),
                    OutputMode::Json => write_json_line(&json!({
                        "command": "config validate",
                        "valid": false,
                        "error": e.to_string(),
                        "code": e.code(),
                    }))?,
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ──────────────────── human rendering ────────────────────

fn print_dashboard(device: &str, view: &DashboardView) {
    let ds = &view.device_status;
    let status = if ds.is_online {
        ds.status.green()
    } else {
        ds.status.red()
    };
    println!("{} {}  [{status}]", "Kibbler".bold(), device);
    print_level_bar("Battery", ds.battery_level);
    print_level_bar("Container", ds.container_level);
    print_level_bar("Tray", ds.tray_level);
    println!("    {:<10} {} ({})", "WiFi", ds.wifi_signal, ds.wifi_quality.label());
    println!("    {:<10} {}", "Last seen", or_dash(&ds.last_seen));

    let s = &view.stats;
    println!();
    println!("{}", "Feeding".bold());
    println!("    {:<16} {}", "Today", s.today_dispense_count);
    println!("    {:<16} {}", "This week", s.week_dispense_count);
    println!("    {:<16} {}", "Pets today", s.today_unique_pets);
    println!("    {:<16} {}", "Known tags", s.total_unique_uids);
    println!("    {:<16} {} ({})", "Last fed", s.last_fed_time, s.last_fed_pet);

    println!();
    println!("{} ({})", "Dispenses".bold(), view.chart.period);
    let max = view.chart.values.iter().copied().max().unwrap_or(0);
    for (label, value) in view.chart.labels.iter().zip(&view.chart.values) {
        println!("    {label:<7} |{:<30}| {value}", bar(*value, max, 30));
    }

    let f = &view.freshness;
    println!();
    println!("{}", "Tray freshness".bold());
    println!("    {:<16} {}", "Last emptied", f.last_empty_time);
    println!("    {:<16} {}", "Since reset", f.time_since_reset);
    let verdict = if f.is_stale {
        "STALE".red().bold()
    } else {
        "fresh".green()
    };
    println!("    {:<16} {verdict}", "Status");

    let c = &view.current_settings;
    println!();
    println!(
        "{}  portion {}%  interval {} h  stale alert {}",
        "Settings".bold(),
        c.portion_level,
        c.feeding_interval_hours,
        c.stale_food_alert
    );

    if !view.recent_activities.is_empty() {
        println!();
        println!("{}", "Recent activity".bold());
        for a in &view.recent_activities {
            println!("    {:<22} {:<10} {}", a.time.dimmed(), a.pet_name, a.message);
        }
    }
}

fn print_analytics(view: &AnalyticsView) {
    println!("{}", "This week".bold());
    if view.visits_per_pet_per_week.is_empty() {
        println!("    {}", "no visits".dimmed());
    }
    for (_, v) in view.visits_per_pet_per_week.iter() {
        println!("    {:<16} {}", v.name, v.count);
    }
    let change = match view.visit_rate_change {
        c if c > 0 => format!("+{c}%").green(),
        c if c < 0 => format!("{c}%").red(),
        c => format!("{c}%").normal(),
    };
    println!(
        "    {:<16} {} vs {} last week ({change})",
        "Total", view.this_week_visits, view.last_week_visits
    );

    println!();
    println!("{}", "Time of day".bold());
    for range in &view.time_of_day {
        println!(
            "    {:<12} {:>4}  {:>3}% |{:<20}|",
            range.label,
            range.count,
            range.percent,
            bar(range.percent, 100, 20)
        );
    }
    let peaks: Vec<String> = view.peak_hours.iter().map(|h| format!("{h:02}:00")).collect();
    println!(
        "    {:<12} {}",
        "Peak (UTC)",
        if peaks.is_empty() {
            "-".to_string()
        } else {
            peaks.join(", ")
        }
    );

    println!();
    println!("{}", "Pets".bold());
    for (_, last) in view.last_visit_times.iter() {
        println!("    {:<16} last visit {}", last.name, last.time);
    }
    for (_, tag) in view.new_tags_this_week.iter() {
        println!("    {:<16} {} {}", tag.name, "new this week, first seen".cyan(), tag.first_seen);
    }
    if let Some(top) = &view.most_frequent_visitor {
        println!("    Most frequent: {} ({} visits)", top.name.bold(), top.count);
    }
    if let Some(idle) = &view.most_inactive_pet {
        println!("    Most inactive: {} ({} h)", idle.name.bold(), idle.hours);
    }
}

fn print_pets(rows: &[&PetStats], view: &PetsView) {
    if rows.is_empty() {
        println!("{}", "No pets.".dimmed());
    } else {
        println!(
            "{}",
            format!(
                "{:<16} {:<12} {:>6}  {:<20} {:>9}",
                "NAME", "UID", "VISITS", "LAST VISIT", "INACTIVE"
            )
            .bold()
        );
        for p in rows {
            let name = if p.registered {
                p.name.normal()
            } else {
                p.name.yellow()
            };
            println!(
                "{:<16} {:<12} {:>6}  {:<20} {:>9}",
                name,
                p.uid,
                p.visit_count,
                p.last_visit_str,
                match p.inactive_hours {
                    InactiveHours::Hours(h) => format!("{h} h"),
                    InactiveHours::Unknown => "-".to_string(),
                }
            );
        }
    }
    if view.registration_mode {
        println!();
        match &view.detected_tag {
            Some(tag) => println!("{} detected tag {}", "Registration:".cyan(), tag.bold()),
            None => println!("{} waiting for a tag scan", "Registration:".cyan()),
        }
    }
}

fn print_names(view: &PetsView) {
    println!("{} {}", "Assigned:".bold(), view.assigned_names.join(", "));
    println!("{} {}", "Available:".bold(), view.unassigned_names.join(", "));
}

fn print_notifications(items: &[&NotificationItem], feed: &NotificationFeed) {
    println!("{} unread", feed.unread_count.to_string().bold());
    for n in items {
        let marker = if n.read { " ".normal() } else { "*".yellow().bold() };
        let title = if n.kind == NotificationKind::Alert {
            n.title.red().bold()
        } else {
            n.title.bold()
        };
        println!("{marker} {title}  {}", n.relative_time.dimmed());
        println!("    {}", n.message);
        println!("    {}", n.id.dimmed());
    }
}

fn print_settings(s: &DeviceSettings) {
    println!("    {:<18} {}%", "Portion", s.portion_level);
    println!("    {:<18} {} h", "Feeding interval", s.feeding_interval_hours);
    println!(
        "    {:<18} {}",
        "Auto wake",
        if s.auto_wake_enabled { "on" } else { "off" }
    );
    println!("    {:<18} {} h", "Auto-wake after", s.auto_wake_hours);
}

fn print_level_bar(label: &str, pct: u8) {
    let text = format!("{pct:>3}%");
    let coloured = match pct {
        0..=19 => text.red(),
        20..=49 => text.yellow(),
        _ => text.green(),
    };
    println!(
        "    {label:<10} {coloured} |{:<20}|",
        bar(u64::from(pct), 100, 20)
    );
}

/// `#` bar of `value / max` scaled to `width` columns.
fn bar(value: u64, max: u64, width: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let filled = usize::try_from(value.saturating_mul(width as u64) / max).unwrap_or(width);
    "#".repeat(filled.min(width))
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() { "-" } else { s }
}

// ──────────────────── output plumbing ────────────────────

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("KIBBLER_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}

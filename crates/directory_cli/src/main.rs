//! Command-line entry point for the residential directory.
//!
//! # Responsibility
//! - Resolve settings from the environment, open the database, start logging.
//! - Map subcommands onto `directory_core` use-cases and print JSON.
//!
//! Mutations are attributed to `--actor-id`/`--actor-email` when given.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use directory_core::db::open_db;
use directory_core::{
    export_residents_csv, import_residents_csv, init_logging_from_config, require_roles,
    AuditFilter, DirectoryConfig, FsBlobStore, NewResident, Pagination, Patch, PhotoUpload,
    Principal, ResidentFilter, ResidentId, ResidentPatch, ResidentService, ROLE_ADMIN,
    ROLE_VIEWER,
};
use log::info;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "directory")]
#[command(about = "Residential directory: residents, photos, CSV and audit trail", long_about = None)]
struct Cli {
    /// SQLite database path (overrides DIRECTORY_DB_PATH).
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Acting user id recorded in audit entries.
    #[arg(long, global = true, requires = "actor_email")]
    actor_id: Option<i64>,

    /// Acting user email recorded in audit entries.
    #[arg(long, global = true, requires = "actor_id")]
    actor_email: Option<String>,

    /// Roles held by the acting user.
    #[arg(long = "actor-role", global = true, default_value = ROLE_ADMIN)]
    actor_roles: Vec<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List residents, active first.
    List {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Show one resident.
    Get { id: ResidentId },
    /// Create a resident.
    Create {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        unit: String,
        #[command(flatten)]
        fields: OptionalFields,
        /// Create the resident already deactivated.
        #[arg(long)]
        inactive: bool,
    },
    /// Update only the supplied fields. An empty value clears an optional field.
    Update {
        id: ResidentId,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        unit: Option<String>,
        #[command(flatten)]
        fields: OptionalFields,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Deactivate a resident.
    Deactivate { id: ResidentId },
    /// Upload a resident photo.
    Photo { id: ResidentId, file: PathBuf },
    /// Import residents from a CSV file.
    Import { file: PathBuf },
    /// Export residents as CSV.
    Export {
        #[command(flatten)]
        filter: FilterArgs,
        /// Output file; stdout when omitted.
        #[arg(long, short)]
        out: Option<PathBuf>,
    },
    /// List audit entries, newest first.
    Audit {
        #[arg(long)]
        action: Option<String>,
        /// Substring of the acting user's email.
        #[arg(long)]
        by: Option<String>,
        #[arg(long)]
        entity_type: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Substring over name, unit, email and phone.
    #[arg(long)]
    q: Option<String>,
    #[arg(long)]
    building: Option<String>,
    #[arg(long)]
    floor: Option<String>,
    #[arg(long = "in-unit")]
    unit: Option<String>,
    #[arg(long)]
    active: Option<bool>,
}

impl From<FilterArgs> for ResidentFilter {
    fn from(args: FilterArgs) -> Self {
        ResidentFilter {
            q: args.q,
            building: args.building,
            floor: args.floor,
            unit: args.unit,
            is_active: args.active,
        }
    }
}

#[derive(Args)]
struct OptionalFields {
    #[arg(long)]
    building: Option<String>,
    #[arg(long)]
    floor: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    notes: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = DirectoryConfig::from_env().context("invalid environment configuration")?;
    if let Some(db) = cli.db.clone() {
        config.db_path = db;
    }
    init_logging_from_config(&config).map_err(|err| anyhow::anyhow!("{err}"))?;

    let actor = match (cli.actor_id, cli.actor_email.as_deref()) {
        (Some(id), Some(email)) => Some(Principal::new(id, email, cli.actor_roles.iter().cloned())),
        _ => None,
    };

    let mut conn = open_db(&config.db_path)
        .with_context(|| format!("failed to open database `{}`", config.db_path.display()))?;
    let mut service =
        ResidentService::new(&mut conn).with_photo_max_bytes(config.photo_max_bytes);
    info!(
        "event=cli_start module=cli status=ok attributed={}",
        actor.is_some()
    );

    run(cli.command, &mut service, actor.as_ref(), &config)
}

fn run(
    command: Commands,
    service: &mut ResidentService<'_>,
    actor: Option<&Principal>,
    config: &DirectoryConfig,
) -> anyhow::Result<()> {
    authorize(actor, required_roles(&command))?;
    match command {
        Commands::List {
            filter,
            limit,
            offset,
        } => {
            let page = service.list_residents(&filter.into(), Pagination::new(limit, offset))?;
            print_json(&page)
        }
        Commands::Get { id } => {
            print_json(&service.get_resident(id)?)
        }
        Commands::Create {
            full_name,
            unit,
            fields,
            inactive,
        } => {
            let resident = NewResident {
                building: fields.building.and_then(non_empty),
                floor: fields.floor.and_then(non_empty),
                phone: fields.phone.and_then(non_empty),
                email: fields.email.and_then(non_empty),
                notes: fields.notes.and_then(non_empty),
                is_active: !inactive,
                ..NewResident::new(full_name, unit)
            };
            print_json(&service.create_resident(actor, &resident)?)
        }
        Commands::Update {
            id,
            full_name,
            unit,
            fields,
            active,
        } => {
            let patch = ResidentPatch {
                full_name: full_name.map_or(Patch::Keep, Patch::Set),
                unit: unit.map_or(Patch::Keep, Patch::Set),
                building: clearable(fields.building),
                floor: clearable(fields.floor),
                phone: clearable(fields.phone),
                email: clearable(fields.email),
                notes: clearable(fields.notes),
                is_active: active.map_or(Patch::Keep, Patch::Set),
            };
            print_json(&service.update_resident(actor, id, &patch)?)
        }
        Commands::Deactivate { id } => {
            print_json(&service.deactivate_resident(actor, id)?)
        }
        Commands::Photo { id, file } => {
            let bytes = fs::read(&file)
                .with_context(|| format!("failed to read photo `{}`", file.display()))?;
            let store = FsBlobStore::new(&config.upload_dir, config.public_base_url.as_str());
            let upload = PhotoUpload {
                file_name: file.file_name().and_then(|name| name.to_str()),
                bytes: &bytes,
            };
            print_json(&service.upload_photo(actor, id, upload, &store)?)
        }
        Commands::Import { file } => {
            let bytes = fs::read(&file)
                .with_context(|| format!("failed to read csv `{}`", file.display()))?;
            print_json(&import_residents_csv(service, actor, &bytes)?)
        }
        Commands::Export { filter, out } => {
            let bytes = export_residents_csv(service, actor, &filter.into())?;
            match out {
                Some(path) => fs::write(&path, &bytes)
                    .with_context(|| format!("failed to write `{}`", path.display()))?,
                None => std::io::stdout().write_all(&bytes)?,
            }
            Ok(())
        }
        Commands::Audit {
            action,
            by,
            entity_type,
            limit,
            offset,
        } => {
            let filter = AuditFilter {
                action,
                actor_email: by,
                entity_type,
            };
            print_json(&service.list_audit_entries(&filter, Pagination::new(limit, offset))?)
        }
    }
}

/// Exports and every write need `admin`; reads and the audit log also admit `viewer`.
fn required_roles(command: &Commands) -> &'static [&'static str] {
    match command {
        Commands::List { .. } | Commands::Get { .. } | Commands::Audit { .. } => {
            &[ROLE_ADMIN, ROLE_VIEWER]
        }
        Commands::Create { .. }
        | Commands::Update { .. }
        | Commands::Deactivate { .. }
        | Commands::Photo { .. }
        | Commands::Import { .. }
        | Commands::Export { .. } => &[ROLE_ADMIN],
    }
}

/// Unattributed local runs are trusted; attributed runs need a matching role.
fn authorize(actor: Option<&Principal>, required: &[&str]) -> anyhow::Result<()> {
    if let Some(principal) = actor {
        require_roles(principal, required)?;
    }
    Ok(())
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn clearable(value: Option<String>) -> Patch<Option<String>> {
    match value {
        Some(value) => Patch::Set(non_empty(value)),
        None => Patch::Keep,
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

//! # Command Line Interface
//!
//! `arsenal` subcommands. Each `cmd_*` function is callable directly so the
//! integration tests can drive them without a process boundary.

use crate::api::{self, AppState, mail::LogMailer};
use crate::config::{
    DEFAULT_BIND, DEFAULT_LOGIN_ATTEMPTS_PER_MINUTE, DEFAULT_SESSION_TTL_HOURS, ServerConfig,
};
use arsenal_core::flags::{self, FeatureFlag};
use arsenal_core::password::hash_password;
use arsenal_core::user::RegistrationForm;
use arsenal_core::{ArsenalError, NewUser, Permission, Role, SandboxGateway, Store, User};
use clap::{ArgGroup, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

// =============================================================================
// ARGUMENTS
// =============================================================================

#[derive(Debug, Parser)]
#[command(name = "arsenal", version, about = "Personal firearm inventory server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a new database and seed the default feature flags.
    Init {
        #[arg(long)]
        db: PathBuf,
        /// Replace an existing database.
        #[arg(long)]
        force: bool,
    },

    /// Run the HTTP server.
    Serve {
        #[arg(long)]
        db: PathBuf,
        #[arg(long, default_value = DEFAULT_BIND)]
        bind: SocketAddr,
        #[arg(long, default_value_t = DEFAULT_SESSION_TTL_HOURS)]
        session_ttl_hours: u32,
        /// Mark cookies `Secure` (serve behind HTTPS).
        #[arg(long)]
        secure_cookies: bool,
        /// Login attempts allowed per email per minute.
        #[arg(long, default_value_t = DEFAULT_LOGIN_ATTEMPTS_PER_MINUTE)]
        login_attempts: u32,
        /// Origin used in emailed links. Defaults to `http://<bind>`.
        #[arg(long)]
        public_url: Option<String>,
    },

    /// Create a user with a confirmed email address.
    CreateUser {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        admin: bool,
    },

    /// Grant or revoke an admin-panel permission.
    Grant {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        email: String,
        /// manage-users, manage-flags or view-payments
        #[arg(long)]
        permission: String,
        #[arg(long)]
        revoke: bool,
    },

    /// Turn a feature flag on or off.
    #[command(group(ArgGroup::new("state").required(true).args(["enable", "disable"])))]
    Flag {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        key: String,
        #[arg(long)]
        enable: bool,
        #[arg(long)]
        disable: bool,
        #[arg(long)]
        description: Option<String>,
    },

    /// Show record counts and feature flags.
    Status {
        #[arg(long)]
        db: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Error)]
pub enum CliError {
    #[error("database already exists at {0} (use --force to replace it)")]
    AlreadyExists(PathBuf),

    #[error("no database at {0} (run `arsenal init` first)")]
    NotInitialized(PathBuf),

    #[error("no user with email {0}")]
    NoSuchUser(String),

    #[error("unknown permission {0:?} (expected manage-users, manage-flags or view-payments)")]
    UnknownPermission(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error(transparent)]
    Core(#[from] ArsenalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CliResult<T> = Result<T, CliError>;

/// Dispatch a parsed command line.
pub async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Init { db, force } => cmd_init(&db, force),
        Commands::Serve {
            db,
            bind,
            session_ttl_hours,
            secure_cookies,
            login_attempts,
            public_url,
        } => {
            let mut config = ServerConfig::new(db);
            config.bind = bind;
            config.session_ttl_hours = session_ttl_hours;
            config.secure_cookies = secure_cookies;
            config.login_attempts_per_minute = login_attempts;
            config.public_url = public_url.unwrap_or_else(|| format!("http://{bind}"));
            cmd_serve(config).await
        }
        Commands::CreateUser {
            db,
            email,
            password,
            name,
            admin,
        } => cmd_create_user(&db, &email, &password, name.as_deref(), admin).map(|_| ()),
        Commands::Grant {
            db,
            email,
            permission,
            revoke,
        } => cmd_grant(&db, &email, &permission, revoke).map(|_| ()),
        Commands::Flag {
            db,
            key,
            enable,
            disable: _,
            description,
        } => cmd_flag(&db, &key, enable, description.as_deref()).map(|_| ()),
        Commands::Status { db, json } => cmd_status(&db, json),
    }
}

fn open_existing(db: &Path) -> CliResult<Store> {
    if !db.exists() {
        return Err(CliError::NotInitialized(db.to_path_buf()));
    }
    Ok(Store::open(db)?)
}

// =============================================================================
// COMMANDS
// =============================================================================

pub fn cmd_init(db: &Path, force: bool) -> CliResult<()> {
    if db.exists() {
        if !force {
            return Err(CliError::AlreadyExists(db.to_path_buf()));
        }
        std::fs::remove_file(db)?;
    }
    let store = Store::open(db)?;
    let seeded = store.seed_default_flags()?;
    info!(path = %db.display(), seeded, "database initialised");
    println!("Initialised {} ({seeded} feature flags)", db.display());
    Ok(())
}

pub async fn cmd_serve(config: ServerConfig) -> CliResult<()> {
    let store = Arc::new(Store::open(&config.db_path)?);
    let seeded = store.seed_default_flags()?;
    if seeded > 0 {
        info!(seeded, "missing feature flags seeded");
    }
    let state = AppState::new(
        store,
        config,
        Arc::new(LogMailer),
        Arc::new(SandboxGateway),
    );
    api::serve(state).await?;
    Ok(())
}

pub fn cmd_create_user(
    db: &Path,
    email: &str,
    password: &str,
    name: Option<&str>,
    admin: bool,
) -> CliResult<User> {
    let store = open_existing(db)?;
    let form = RegistrationForm {
        email: email.to_string(),
        display_name: name.unwrap_or_default().to_string(),
        password: password.to_string(),
        confirm: password.to_string(),
    };
    let valid = form.validate().map_err(|errors| {
        CliError::Invalid(
            errors
                .iter()
                .map(|(field, message)| format!("{field}: {message}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    })?;

    let user = store.create_user(NewUser {
        email: valid.email,
        display_name: valid.display_name,
        password_hash: hash_password(&valid.password)?,
        role: if admin { Role::Admin } else { Role::Member },
        email_verified: true,
    })?;
    println!("Created {} user {} ({})", user.role.as_str(), user.email, user.id);
    Ok(user)
}

pub fn cmd_grant(db: &Path, email: &str, permission: &str, revoke: bool) -> CliResult<User> {
    let permission = Permission::parse(permission)
        .ok_or_else(|| CliError::UnknownPermission(permission.to_string()))?;
    let store = open_existing(db)?;
    let email = email.trim().to_lowercase();
    let found = store
        .user_by_email(&email)?
        .ok_or_else(|| CliError::NoSuchUser(email.clone()))?;

    let user = store.modify_user(found.id, |user| {
        if revoke {
            user.permissions.remove(&permission);
        } else {
            user.permissions.insert(permission);
        }
        Ok(())
    })?;

    let verb = if revoke { "Revoked" } else { "Granted" };
    println!("{verb} {permission} for {}", user.email);
    Ok(user)
}

pub fn cmd_flag(
    db: &Path,
    key: &str,
    enabled: bool,
    description: Option<&str>,
) -> CliResult<FeatureFlag> {
    let key = key.trim();
    if !flags::valid_key(key) {
        return Err(CliError::Invalid(format!(
            "flag key {key:?} must be 1-48 lowercase letters, digits, dashes or underscores"
        )));
    }
    let store = open_existing(db)?;
    let description = match (description, store.flag(key)?) {
        (Some(description), _) => description.trim().to_string(),
        (None, Some(existing)) => existing.description,
        (None, None) => String::new(),
    };
    let flag = FeatureFlag::new(key, description, enabled);
    store.put_flag(&flag)?;
    println!("{} is now {}", flag.key, if flag.enabled { "on" } else { "off" });
    Ok(flag)
}

pub fn cmd_status(db: &Path, json: bool) -> CliResult<()> {
    let store = open_existing(db)?;
    let stats = store.stats()?;
    let flags = store.flags()?;

    if json {
        let flags: serde_json::Map<String, serde_json::Value> = flags
            .iter()
            .map(|f| (f.key.clone(), serde_json::Value::Bool(f.enabled)))
            .collect();
        let document = serde_json::json!({
            "database": db.display().to_string(),
            "stats": stats,
            "flags": flags,
        });
        println!("{}", serde_json::to_string_pretty(&document)?);
        return Ok(());
    }

    println!("Database: {}", db.display());
    println!("  users:     {}", stats.users);
    println!("  firearms:  {}", stats.firearms);
    println!("  sessions:  {}", stats.sessions);
    println!("  payments:  {}", stats.payments);
    println!("Feature flags:");
    for flag in &flags {
        println!(
            "  {:<16} {:<3}  {}",
            flag.key,
            if flag.enabled { "on" } else { "off" },
            flag.description
        );
    }
    Ok(())
}

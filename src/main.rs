//! appcfg CLI - manage mobile apps, remote-config controls, and developer access.

use appconfigs::action_log::{self, ActionLog};
use appconfigs::cli::{
    AppCommands, Cli, Commands, ConfigCommands, ControlCommands, DevCommands, SystemCommands,
};
use appconfigs::commands::{self, Context, Environment, Output};
use appconfigs::config::{OutputFormat, Overrides};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::process;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Full filter directive, e.g. `appconfigs=debug`.
const LOG_ENV: &str = "APPCFG_LOG";

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut overrides = Overrides::new();
    if cli.human_readable {
        overrides = overrides.with_output_format(OutputFormat::Human);
    }

    // Serialize command for logging
    let (cmd_name, args_json) = serialize_command(&cli.command);

    let start = Instant::now();
    let mut human = cli.human_readable;
    let mut log_path: Option<PathBuf> = None;

    let result = Environment::load(&overrides).and_then(|env| {
        human = env.settings.output_format.value == OutputFormat::Human;
        if env.settings.action_log.value {
            log_path = Some(env.paths.action_log_file());
        }
        run_command(cli.command, env, human)
    });

    let duration = start.elapsed().as_millis() as u64;
    let error = result.as_ref().err().map(|e| e.to_string());

    // Logging problems are reported as warnings and never change the exit status
    if let Some(ref path) = log_path {
        let entry = ActionLog::new(&cmd_name, &args_json, error.is_none(), error.clone(), duration);
        action_log::log_action(path, &entry);
    }

    if let Some(message) = error {
        if human {
            eprintln!("Error: {}", message);
        } else {
            eprintln!("{}", json!({ "error": message }));
        }
        process::exit(1);
    }
}

/// Send diagnostics to stderr. `-v` wins over `APPCFG_LOG`; the default is `warn`.
fn init_tracing(verbose: u8) {
    let filter = match verbose {
        0 => std::env::var(LOG_ENV)
            .ok()
            .filter(|spec| !spec.trim().is_empty())
            .and_then(|spec| EnvFilter::try_new(spec).ok())
            .unwrap_or_else(|| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_command(command: Commands, env: Environment, human: bool) -> appconfigs::Result<()> {
    match command {
        Commands::System { command } => match command {
            SystemCommands::Init {
                admin_email,
                admin_password,
            } => {
                let admin = admin_email.as_deref().zip(admin_password.as_deref());
                let result = commands::system_init(&env, admin)?;
                output(&result, human);
            }
        },
        Commands::Login { email, password } => {
            let result = commands::login(Context::open(env)?, &email, &password)?;
            output(&result, human);
        }
        Commands::Logout => {
            let result = commands::logout(&Context::open(env)?)?;
            output(&result, human);
        }
        Commands::Whoami => {
            let result = commands::whoami(&Context::open(env)?)?;
            output(&result, human);
        }
        Commands::App { command } => {
            let ctx = Context::open(env)?;
            match command {
                AppCommands::List => {
                    let result = commands::app_list(&ctx)?;
                    output(&result, human);
                }
                AppCommands::Add {
                    name,
                    platform,
                    config_file,
                    url,
                } => {
                    let result =
                        commands::app_add(&ctx, &name, &platform, &config_file, url.as_deref())?;
                    output(&result, human);
                }
                AppCommands::Show { id } => {
                    let result = commands::app_show(&ctx, &id)?;
                    output(&result, human);
                }
                AppCommands::Rm { id } => {
                    let result = commands::app_rm(&ctx, &id)?;
                    output(&result, human);
                }
            }
        }
        Commands::Control { command } => {
            let ctx = Context::open(env)?;
            match command {
                ControlCommands::Add {
                    app_id,
                    name,
                    key,
                    description,
                } => {
                    let result = commands::control_add(
                        &ctx,
                        &app_id,
                        &name,
                        &key,
                        description.as_deref(),
                    )?;
                    output(&result, human);
                }
                ControlCommands::Rm { id } => {
                    let result = commands::control_rm(&ctx, &id)?;
                    output(&result, human);
                }
                ControlCommands::Set {
                    control_id,
                    value,
                    message,
                } => {
                    let result =
                        commands::control_set(&ctx, &control_id, &value, message.as_deref())?;
                    output(&result, human);
                }
            }
        }
        Commands::Dev { command } => {
            let ctx = Context::open(env)?;
            match command {
                DevCommands::List => {
                    let result = commands::dev_list(&ctx)?;
                    output(&result, human);
                }
                DevCommands::Toggle { user, app } => {
                    let result = commands::dev_toggle(&ctx, &user, &app)?;
                    output(&result, human);
                }
                DevCommands::Grant { user, app } => {
                    let result = commands::dev_grant(&ctx, &user, &app)?;
                    output(&result, human);
                }
                DevCommands::Revoke { user, app } => {
                    let result = commands::dev_revoke(&ctx, &user, &app)?;
                    output(&result, human);
                }
                DevCommands::Role { user, role } => {
                    let result = commands::dev_role(&ctx, &user, &role)?;
                    output(&result, human);
                }
                DevCommands::Add {
                    email,
                    password,
                    role,
                } => {
                    let result = commands::dev_add(&ctx, &email, &password, &role)?;
                    output(&result, human);
                }
            }
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let result = commands::config_show(&env)?;
                output(&result, human);
            }
            ConfigCommands::Set { key, value } => {
                let result = commands::config_set(&env, &key, &value)?;
                output(&result, human);
            }
            ConfigCommands::Unset { key } => {
                let result = commands::config_unset(&env, &key)?;
                output(&result, human);
            }
        },
    }
    Ok(())
}

fn output<T: Output>(result: &T, human: bool) {
    if human {
        println!("{}", result.to_human());
    } else {
        println!("{}", result.to_json());
    }
}

/// Command name and arguments for the action log. Secrets are redacted later.
fn serialize_command(command: &Commands) -> (String, serde_json::Value) {
    match command {
        Commands::System { command } => match command {
            SystemCommands::Init {
                admin_email,
                admin_password,
            } => (
                "system init".to_string(),
                json!({ "admin_email": admin_email, "admin_password": admin_password }),
            ),
        },
        Commands::Login { email, password } => (
            "login".to_string(),
            json!({ "email": email, "password": password }),
        ),
        Commands::Logout => ("logout".to_string(), json!({})),
        Commands::Whoami => ("whoami".to_string(), json!({})),

        Commands::App { command } => match command {
            AppCommands::List => ("app list".to_string(), json!({})),
            AppCommands::Add {
                name,
                platform,
                config_file,
                url,
            } => (
                "app add".to_string(),
                json!({
                    "name": name,
                    "platform": platform,
                    "config_file": config_file,
                    "url": url,
                }),
            ),
            AppCommands::Show { id } => ("app show".to_string(), json!({ "id": id })),
            AppCommands::Rm { id } => ("app rm".to_string(), json!({ "id": id })),
        },

        Commands::Control { command } => match command {
            ControlCommands::Add {
                app_id,
                name,
                key,
                description,
            } => (
                "control add".to_string(),
                json!({
                    "app_id": app_id,
                    "name": name,
                    "key_name": key,
                    "description": description,
                }),
            ),
            ControlCommands::Rm { id } => ("control rm".to_string(), json!({ "id": id })),
            ControlCommands::Set {
                control_id,
                value,
                message,
            } => (
                "control set".to_string(),
                json!({ "control_id": control_id, "value": value, "message": message }),
            ),
        },

        Commands::Dev { command } => match command {
            DevCommands::List => ("dev list".to_string(), json!({})),
            DevCommands::Toggle { user, app } => {
                ("dev toggle".to_string(), json!({ "user": user, "app": app }))
            }
            DevCommands::Grant { user, app } => {
                ("dev grant".to_string(), json!({ "user": user, "app": app }))
            }
            DevCommands::Revoke { user, app } => {
                ("dev revoke".to_string(), json!({ "user": user, "app": app }))
            }
            DevCommands::Role { user, role } => {
                ("dev role".to_string(), json!({ "user": user, "role": role }))
            }
            DevCommands::Add {
                email,
                password,
                role,
            } => (
                "dev add".to_string(),
                json!({ "email": email, "password": password, "role": role }),
            ),
        },

        Commands::Config { command } => match command {
            ConfigCommands::Show => ("config show".to_string(), json!({})),
            ConfigCommands::Set { key, value } => {
                // The key names the setting; the value may be a secret.
                let value = if matches!(key.as_str(), "github-token" | "store-key") {
                    json!("[REDACTED]")
                } else {
                    json!(value)
                };
                ("config set".to_string(), json!({ "key": key, "value": value }))
            }
            ConfigCommands::Unset { key } => {
                ("config unset".to_string(), json!({ "key": key }))
            }
        },
    }
}

//! CLI argument definitions for appcfg.

use clap::{ArgAction, Parser, Subcommand};

/// appcfg - manage mobile apps, their remote-config controls, and developer access.
///
/// Start with `appcfg system init`, then `appcfg login`.
#[derive(Parser, Debug)]
#[command(name = "appcfg")]
#[command(author, version, about = "Admin CLI for mobile-app remote configuration", long_about = None)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Log more (repeat for more detail). APPCFG_LOG takes a full filter instead.
    #[arg(short = 'v', long = "verbose", global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Local setup
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },

    /// Sign in with email and password
    Login {
        /// Account email
        #[arg(long)]
        email: String,

        /// Account password
        #[arg(long, env = "APPCFG_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show the signed-in user and role
    Whoami,

    /// Apps (the dashboard and app detail pages)
    App {
        #[command(subcommand)]
        command: AppCommands,
    },

    /// Controls and their live values
    Control {
        #[command(subcommand)]
        command: ControlCommands,
    },

    /// Developer access management (admin only)
    Dev {
        #[command(subcommand)]
        command: DevCommands,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

/// System subcommands
#[derive(Subcommand, Debug)]
pub enum SystemCommands {
    /// Create the local data directory and database
    Init {
        /// Email of the first admin account
        #[arg(long, requires = "admin_password")]
        admin_email: Option<String>,

        /// Password of the first admin account
        #[arg(long, requires = "admin_email", env = "APPCFG_ADMIN_PASSWORD", hide_env_values = true)]
        admin_password: Option<String>,
    },
}

/// App subcommands
#[derive(Subcommand, Debug)]
pub enum AppCommands {
    /// List the apps you can see, newest first
    List,

    /// Register an app (admin only)
    Add {
        /// Display name
        #[arg(long)]
        name: String,

        /// Platform: android or ios
        #[arg(long)]
        platform: String,

        /// Path of the JSON config file in the config repository
        #[arg(long = "config-file")]
        config_file: String,

        /// Store listing URL
        #[arg(long)]
        url: Option<String>,
    },

    /// Show an app with its config status and controls' live values
    Show {
        /// App ID
        id: String,
    },

    /// Delete an app with its controls and grants (admin only)
    Rm {
        /// App ID
        id: String,
    },
}

/// Control subcommands
#[derive(Subcommand, Debug)]
pub enum ControlCommands {
    /// Define a control on an app (admin only)
    Add {
        /// App ID
        app_id: String,

        /// Display name
        #[arg(long)]
        name: String,

        /// Dot-delimited key path in the config document (e.g. ads.main_banner)
        #[arg(long)]
        key: String,

        /// Description shown with the control
        #[arg(long)]
        description: Option<String>,
    },

    /// Delete a control (admin only)
    Rm {
        /// Control ID
        id: String,
    },

    /// Set a control's value and commit the config document
    Set {
        /// Control ID
        control_id: String,

        /// New value as JSON (true, 3, "text", {"a": 1}); other text is taken as a string
        value: String,

        /// Commit message
        #[arg(short, long)]
        message: Option<String>,
    },
}

/// Developer subcommands
#[derive(Subcommand, Debug)]
pub enum DevCommands {
    /// Show every developer's access to every app
    List,

    /// Flip a developer's access to an app
    Toggle {
        /// User ID or email
        user: String,
        /// App ID or name
        app: String,
    },

    /// Give a developer access to an app
    Grant {
        /// User ID or email
        user: String,
        /// App ID or name
        app: String,
    },

    /// Take a developer's access to an app away
    Revoke {
        /// User ID or email
        user: String,
        /// App ID or name
        app: String,
    },

    /// Change a user's role
    Role {
        /// User ID or email
        user: String,
        /// admin or developer
        role: String,
    },

    /// Create an account (local backend only)
    Add {
        /// Account email
        #[arg(long)]
        email: String,

        /// Initial password
        #[arg(long, env = "APPCFG_NEW_PASSWORD", hide_env_values = true)]
        password: String,

        /// admin or developer
        #[arg(long, default_value = "developer")]
        role: String,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective settings and where each comes from
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Remove a configuration value
    Unset {
        /// Configuration key
        key: String,
    },
}

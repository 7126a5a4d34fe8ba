pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "helplane",
    about = "Helplane operator CLI",
    long_about = "Operate helplane tenants, migrations, and runtime readiness.",
    after_help = "Examples:\n  helplane migrate\n  helplane create-tenant --slug acme-dental --name \"Acme Dental\"\n  helplane doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Provision a tenant and print its API key exactly once")]
    CreateTenant {
        #[arg(long, help = "URL-safe tenant identifier, e.g. acme-dental")]
        slug: String,
        #[arg(long, help = "Display name used in widget branding")]
        name: String,
        #[arg(long, default_value = "gpt-4o-mini", help = "Model the tenant starts on")]
        model: String,
    },
    #[command(about = "List provisioned tenant slugs")]
    ListTenants,
    #[command(about = "Suspend a tenant; all its channels stop answering")]
    Suspend {
        #[arg(long)]
        slug: String,
    },
    #[command(about = "Reactivate a suspended tenant")]
    Activate {
        #[arg(long)]
        slug: String,
    },
    #[command(about = "Validate config and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::CreateTenant { slug, name, model } => {
            commands::tenant::create(&slug, &name, &model)
        }
        Command::ListTenants => commands::tenant::list(),
        Command::Suspend { slug } => {
            commands::tenant::set_status(&slug, helplane_core::domain::tenant::TenantStatus::Suspended)
        }
        Command::Activate { slug } => {
            commands::tenant::set_status(&slug, helplane_core::domain::tenant::TenantStatus::Active)
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

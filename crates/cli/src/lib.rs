pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "clinibook",
    about = "Clinibook operator CLI",
    long_about = "Run migrations, check readiness, inspect configuration, and administer slots, blocked dates, staff handoffs and conversation logs.",
    after_help = "Examples:\n  clinibook doctor --json\n  clinibook slots 2026-07-20 30\n  clinibook blocked add 2026-08-15 --reason festivo\n  clinibook handoff clear +34600111222\n  clinibook log +34600111222 --limit 10"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution and redaction")]
    Config,
    #[command(about = "Validate config, adapter readiness and database connectivity")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List free start times for an appointment length on a date")]
    Slots {
        #[arg(help = "YYYY-MM-DD or a phrase such as \"mañana\"")]
        date: String,
        #[arg(help = "Appointment length in minutes", value_parser = clap::value_parser!(u32).range(1..=1440))]
        minutes: u32,
    },
    #[command(subcommand, about = "Manage dates on which nothing can be booked")]
    Blocked(BlockedCommand),
    #[command(subcommand, about = "Hand conversations to staff or back to the assistant")]
    Handoff(HandoffCommand),
    #[command(about = "Show the recorded conversation with one phone")]
    Log {
        phone: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[derive(Debug, Subcommand)]
enum BlockedCommand {
    Add {
        date: String,
        #[arg(long, default_value = "")]
        reason: String,
    },
    Remove {
        date: String,
    },
    List {
        #[arg(long, help = "Only dates on or after this YYYY-MM-DD")]
        from: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum HandoffCommand {
    Set {
        phone: String,
        #[arg(long)]
        reason: Option<String>,
    },
    Clear {
        phone: String,
    },
    List,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Config => commands::config::run(),
        Command::Doctor { json } => {
            let (exit_code, output) = commands::doctor::run(json);
            commands::CommandResult { exit_code, output }
        }
        Command::Slots { date, minutes } => commands::slots::run(&date, minutes),
        Command::Blocked(BlockedCommand::Add { date, reason }) => commands::blocked::add(&date, &reason),
        Command::Blocked(BlockedCommand::Remove { date }) => commands::blocked::remove(&date),
        Command::Blocked(BlockedCommand::List { from }) => commands::blocked::list(from.as_deref()),
        Command::Handoff(HandoffCommand::Set { phone, reason }) => {
            commands::handoff::set(&phone, reason.as_deref())
        }
        Command::Handoff(HandoffCommand::Clear { phone }) => commands::handoff::clear(&phone),
        Command::Handoff(HandoffCommand::List) => commands::handoff::list(),
        Command::Log { phone, limit } => commands::log::show(&phone, limit),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

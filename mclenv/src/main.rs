mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use mclenv_core::config::load_dotenv_from_dir;
use mclenv_core::error::BootstrapError;
use mclenv_core::observability;

fn main() {
    let cli = Cli::parse();
    // .env must be in the environment before tracing reads its settings.
    load_dotenv_from_dir(project_dir(&cli.command));
    observability::init_tracing();

    let code = match dispatch(cli.command) {
        Ok(code) => code,
        Err(e) => {
            report_error(&e);
            1
        }
    };
    std::process::exit(code);
}

fn project_dir(command: &Commands) -> &std::path::Path {
    match command {
        Commands::Activate { project, .. }
        | Commands::Prefetch { project, .. }
        | Commands::Status { project, .. }
        | Commands::Run { project, .. }
        | Commands::Test { project, .. }
        | Commands::Clean { project, .. } => &project.project,
    }
}

fn dispatch(command: Commands) -> anyhow::Result<i32> {
    match command {
        Commands::Activate {
            project,
            toolchain,
            force_reinstall,
        } => commands::activate::cmd_activate(&project, &toolchain, force_reinstall).map(|_| 0),
        Commands::Prefetch { source, project } => {
            commands::prefetch::cmd_prefetch(source, &project).map(|_| 0)
        }
        Commands::Status { project, json } => commands::status::cmd_status(&project, json).map(|_| 0),
        Commands::Run { project, cmd } => commands::run::cmd_run(&project, &cmd),
        Commands::Test {
            project,
            pattern,
            start_dir,
        } => commands::test::cmd_test(&project, &pattern, &start_dir),
        Commands::Clean {
            project,
            all,
            dry_run,
        } => commands::clean::cmd_clean(&project, all, dry_run).map(|_| 0),
    }
}

/// `✗ [<step>] <message>`, then the failing tool's output verbatim.
fn report_error(err: &anyhow::Error) {
    match err.downcast_ref::<BootstrapError>() {
        Some(e) => {
            eprintln!("✗ [{}] {}", e.step(), e);
            if let Some(output) = e.tool_output() {
                eprintln!("{}", output);
            }
        }
        None => eprintln!("✗ {:#}", err),
    }
}

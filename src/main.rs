use biometric_storage::cli::{commands, load_settings, open_storage, output, Cli, Commands};
use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            output::error(&e.to_string());
            std::process::exit(1);
        }
    };
    biometric_storage::logging::init(&settings.log_filter);

    let storage = match open_storage(&settings) {
        Ok(storage) => storage,
        Err(e) => {
            output::error(&e.to_string());
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::CanAuthenticate => commands::can_authenticate::execute(&storage),
        Commands::Read { ref name, policy } => commands::read::execute(&storage, name, &policy).await,
        Commands::Write {
            ref name,
            ref content,
            policy,
        } => commands::write::execute(&storage, name, content.as_deref(), &policy).await,
        Commands::Delete {
            ref name,
            force,
            policy,
        } => commands::delete::execute(&storage, name, force, &policy).await,
        Commands::Call {
            ref method,
            ref arguments,
        } => commands::call::execute(&storage, method.as_deref(), arguments.as_deref()).await,
    };

    if let Err(e) = result {
        output::error(&e.to_string());
        if e.is_auth_cancellation() {
            output::tip("Authentication was canceled; run the command again to retry.");
        }
        std::process::exit(1);
    }
}

use std::io;

use eyre::{Context, Result};
use inkwell::app::{App, commands};
use inkwell::backend::new_backend;
use inkwell::cli::Command;
use inkwell::config::{StorageConfig, init_logger, init_verbose, verbose};
use inkwell::storage::new_storage;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Command::new();
    if cmd.version() {
        cmd.print_version();
        return Ok(());
    }

    std::panic::set_hook(Box::new(|panic_info| {
        better_panic::Settings::auto().create_panic_handler()(panic_info);
    }));

    let config = cmd.get_config()?;
    init_verbose(config.general.verbose);
    init_logger(&config.log)?;
    verbose!("[+] Logger initialized");

    let context = cmd.session_context(&config)?;
    if context.user_id().is_none() {
        verbose!("[!] No user configured, history will not be loaded");
    }

    verbose!("[+] Initializing storage...");
    if matches!(&config.storage, StorageConfig::Sqlite(sqlite) if sqlite.path().is_none()) {
        verbose!("[!] No sqlite path configured, messages are kept in memory");
    }
    let storage = new_storage(&config.storage)
        .await
        .wrap_err("initializing storage")?;
    verbose!("[+] Storage initialized");

    if cmd.history() {
        return commands::print_history(&storage, &context, config.history.limit, &mut io::stdout())
            .await;
    }

    if cmd.delete() {
        return commands::delete_conversation(&storage, &context, &mut io::stdout()).await;
    }

    verbose!("[+] Initializing backend...");
    let backend = new_backend(&config.webhook).wrap_err("initializing backend")?;
    verbose!("[+] Backend {} initialized", backend.name());

    let token = CancellationToken::new();
    let ctrl_c_token = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::debug!("Received ctrl-c, shutting down");
                ctrl_c_token.cancel();
            }
            Err(err) => log::error!("Failed to listen for ctrl-c: {}", err),
        }
    });

    let mut app = App::new(
        context,
        storage,
        backend,
        config.history.limit,
        token.clone(),
    );

    if let Err(err) = app.run().await {
        eprintln!("Error: {}", err);
    }

    Ok(())
}

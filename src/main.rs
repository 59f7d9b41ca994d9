use anyhow::{bail, Result};
use log::{info, warn};
use tokio::sync::mpsc;

use retext::actions::{Action, Orchestrator, REQUEST_MS_KEY};
use retext::completion::CompletionClient;
use retext::desktop::DesktopHost;
use retext::presentation;
use retext::secure_keys;
use retext::settings::load_or_create_settings;
use retext::shortcut::ShortcutListener;
use retext::store::{default_config_dir, Stores};
use retext::transforms;

fn print_usage() {
    eprintln!("Usage: retext [COMMAND]");
    eprintln!();
    eprintln!("Without a command, runs the background agent.");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  set-api-key <KEY>   Store the completion API key");
    eprintln!("  delete-api-key      Remove the stored API key");
    eprintln!("  list-transforms     Print the transform catalog, most recent first");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logging comes up before anything that logs. The builder is left wide
    // open and the effective level set through the facade, so it can be
    // raised to the configured level once settings are readable. An explicit
    // RUST_LOG wins over both.
    let env_override = std::env::var_os("RUST_LOG").is_some();
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Trace)
        .parse_default_env()
        .init();
    if !env_override {
        log::set_max_level(log::LevelFilter::Info);
    }

    let stores = Stores::open(&default_config_dir()?)?;
    let settings = load_or_create_settings(&stores.sync);
    if !env_override {
        log::set_max_level(settings.log_level.into());
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("set-api-key") => {
            let Some(key) = args.get(1) else {
                print_usage();
                bail!("set-api-key requires the key as an argument");
            };
            secure_keys::set_api_key(&stores.sync, key)?;
            println!("API key stored.");
            return Ok(());
        }
        Some("delete-api-key") => {
            secure_keys::delete_api_key(&stores.sync)?;
            println!("API key removed.");
            return Ok(());
        }
        Some("list-transforms") => {
            for transform in transforms::get_transforms(&stores) {
                println!("{}", transform.display_name());
            }
            return Ok(());
        }
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            return Ok(());
        }
        Some(other) => {
            print_usage();
            bail!("Unknown command: {}", other);
        }
        None => {}
    }

    info!("retext starting (config: {})", default_config_dir()?.display());

    // A run left interrupted (crash, kill) must not block the next gesture
    // for a minute.
    let _ = stores.local.remove(REQUEST_MS_KEY);

    let listener = ShortcutListener::new();
    for binding in settings.bindings.values() {
        if let Err(e) = listener.register(&binding.id, &binding.current_binding) {
            warn!(
                "Skipping shortcut '{}' ({}): {}",
                binding.id, binding.current_binding, e
            );
        }
    }

    let (tx, mut rx) = mpsc::channel(4);
    listener.start(tx);

    let client = CompletionClient::new(&settings);
    let host = DesktopHost::new(settings.paste_combo, settings.notifications_enabled);
    let mut orchestrator = Orchestrator::new(stores, client, host);

    info!("Listening for shortcuts");
    while let Some(event) = rx.recv().await {
        let Some(action) = Action::from_binding_id(&event.id) else {
            continue;
        };
        orchestrator.dispatch(action).await;
        let notifications = orchestrator.settings().notifications_enabled;
        presentation::render(orchestrator.popup(), notifications);
    }

    Ok(())
}

//! Watch command: activate a profile and follow its saves until Ctrl+C.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use crate::config::Settings;
use crate::decoder::GamebryoDecoder;
use crate::host::MemoryHostStore;
use crate::notifications::{NotificationBody, UserNotification};
use crate::sync::{Activation, SaveSyncService};

/// Run watch command.
pub async fn run_watch(profile_id: &str, config: &Settings) -> anyhow::Result<()> {
    let host = Arc::new(MemoryHostStore::with_profiles(config.profile_states()));

    let mut builder = SaveSyncService::builder()
        .host(host.clone())
        .decoder(Arc::new(GamebryoDecoder::new()))
        .retry(config.scan.retry_policy())
        .debounce(config.watch.debounce());
    if let Some(root) = config.my_games_root() {
        builder = builder.my_games_root(root);
    }
    let mut service = builder.build()?;

    // Subscribe before activating so the initial scan's warnings are shown
    let mut notifications = service.notifications().subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match notifications.recv().await {
                Ok(notification) => print_notification(&notification),
                Err(RecvError::Lagged(missed)) => {
                    eprintln!("warning: {missed} notifications dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    match service.activate_profile(profile_id).await {
        Activation::Cancelled => {
            printer.abort();
            anyhow::bail!(
                "Unknown profile: {profile_id}\nAdd it under [profiles.{profile_id}] in .savewatch/settings.toml"
            );
        }
        Activation::Unsupported { game_id } => {
            printer.abort();
            anyhow::bail!("Profile {profile_id} uses {game_id}, which has no savegame support");
        }
        Activation::Watching { directory } => {
            println!(
                "Watching {} ({} saves). Press Ctrl+C to stop.",
                directory.display(),
                host.save_count()
            );
        }
        Activation::Unwatched { directory } => {
            println!(
                "Loaded {} saves from {}; live updates unavailable. Press Ctrl+C to stop.",
                host.save_count(),
                directory.display()
            );
        }
    }

    let mut reported = host.save_count();
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = ticker.tick() => {
                let count = host.save_count();
                if count != reported {
                    println!("{count} saves ({} new)", count.saturating_sub(reported));
                    reported = count;
                }
            }
        }
    }

    service.teardown();
    printer.abort();
    println!("Stopped watching.");
    Ok(())
}

fn print_notification(notification: &UserNotification) {
    match &notification.body {
        NotificationBody::Message(message) => {
            eprintln!("warning: {}: {message}", notification.title);
        }
        NotificationBody::Payload(serde_json::Value::Object(files)) => {
            eprintln!("warning: {}", notification.title);
            for (file, reason) in files {
                match reason.as_str() {
                    Some(reason) => eprintln!("  {file}: {reason}"),
                    None => eprintln!("  {file}: {reason}"),
                }
            }
        }
        NotificationBody::Payload(payload) => {
            eprintln!("warning: {}: {payload}", notification.title);
        }
    }
}

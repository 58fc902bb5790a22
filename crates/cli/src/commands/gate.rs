//! Access gate commands.
//!
//! # Usage
//!
//! ```bash
//! # One decision for the current session
//! shopfront gate /products
//!
//! # Re-evaluate whenever maintenance status changes (Ctrl+C to stop)
//! SHOPFRONT_MAINTENANCE_POLL_SECS=10 shopfront gate /products --watch
//! ```

use std::time::Duration;

use shopfront_client::Storefront;
use shopfront_client::gate::{AccessDecision, MaintenanceState};

/// Poll interval for `--watch` when none is configured.
const DEFAULT_WATCH_POLL: Duration = Duration::from_secs(30);

/// Print the decision for `path`.
pub fn check(storefront: &Storefront, path: &str) {
    print_decision(path, storefront.gate().maintenance(), &storefront.decide(path));
}

/// Print the decision for `path`, then again on every maintenance change.
pub async fn watch(storefront: &Storefront, path: &str, every: Option<Duration>) {
    let poller = storefront.spawn_maintenance_poll(every.unwrap_or(DEFAULT_WATCH_POLL));
    let mut changes = storefront.gate().subscribe();
    check(storefront, path);

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    break;
                }
                check(storefront, path);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    poller.abort();
}

#[allow(clippy::print_stdout)]
fn print_decision(path: &str, maintenance: MaintenanceState, decision: &AccessDecision) {
    let outcome = match decision {
        AccessDecision::Render => "render".to_string(),
        AccessDecision::Redirect(target) => format!("redirect to {target}"),
        AccessDecision::Placeholder => "placeholder".to_string(),
    };
    println!("{path}: {outcome} (maintenance {maintenance:?})");
}

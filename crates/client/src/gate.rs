//! Access gate: maintenance mode crossed with role and route.
//!
//! [`decide`] is a pure function; the caller performs any navigation a
//! [`AccessDecision::Redirect`] asks for, once, outside of rendering.
//! [`AccessGate`] owns the only async piece, the maintenance status, which
//! is fetched at boot and optionally re-polled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::api::CommerceApi;
use crate::config::RouteConfig;
use crate::session::{Session, SessionStatus};

/// Route classification by path prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// Admin area.
    Admin,
    /// Login or registration.
    Auth,
    /// The maintenance landing page.
    ComingSoon,
    /// Anything else.
    Other,
}

/// Classify a path. Query strings and fragments are ignored.
///
/// Checked in order: admin prefix, auth prefixes, maintenance landing path.
#[must_use]
pub fn classify(path: &str, routes: &RouteConfig) -> RouteClass {
    let path = path.split(['?', '#']).next().unwrap_or_default();

    if path.starts_with(&routes.admin_prefix) {
        RouteClass::Admin
    } else if routes
        .auth_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
    {
        RouteClass::Auth
    } else if path.trim_end_matches('/') == routes.maintenance_path.trim_end_matches('/') {
        RouteClass::ComingSoon
    } else {
        RouteClass::Other
    }
}

/// Resolution of the maintenance flag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum MaintenanceState {
    /// Status not fetched yet.
    #[default]
    Pending,
    /// Storefront is in maintenance mode.
    Active,
    /// Storefront is open (also the result of a failed fetch).
    Inactive,
}

/// What to show for a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccessDecision {
    /// Render the full application tree.
    Render,
    /// Navigate to this path and show a placeholder meanwhile.
    Redirect(String),
    /// Show a loading placeholder and nothing else.
    Placeholder,
}

/// Decide access. First matching rule wins:
///
/// 1. maintenance pending or session not yet resolved: placeholder
/// 2. maintenance inactive: render
/// 3. auth route: render
/// 4. admin on an admin route: render
/// 5. the landing page itself: render
/// 6. non-admin: redirect to the landing page
/// 7. otherwise (admin anywhere else): render
#[must_use]
pub fn decide(
    maintenance: MaintenanceState,
    session: &Session,
    route: RouteClass,
    landing: &str,
) -> AccessDecision {
    let resolving = matches!(
        session.status(),
        SessionStatus::Uninitialized | SessionStatus::Loading
    );
    if maintenance == MaintenanceState::Pending || resolving {
        return AccessDecision::Placeholder;
    }
    if maintenance == MaintenanceState::Inactive {
        return AccessDecision::Render;
    }

    let admin = session.is_admin();
    match route {
        RouteClass::Auth | RouteClass::ComingSoon => AccessDecision::Render,
        RouteClass::Admin if admin => AccessDecision::Render,
        _ if !admin => AccessDecision::Redirect(landing.to_string()),
        _ => AccessDecision::Render,
    }
}

/// Holder of the maintenance flag and route rules.
///
/// Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct AccessGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    api: Arc<dyn CommerceApi>,
    routes: RouteConfig,
    maintenance: watch::Sender<MaintenanceState>,
}

impl AccessGate {
    /// Create a gate with maintenance status pending.
    #[must_use]
    pub fn new(api: Arc<dyn CommerceApi>, routes: RouteConfig) -> Self {
        let (maintenance, _) = watch::channel(MaintenanceState::Pending);
        Self {
            inner: Arc::new(GateInner {
                api,
                routes,
                maintenance,
            }),
        }
    }

    /// Route rules in effect.
    #[must_use]
    pub fn routes(&self) -> &RouteConfig {
        &self.inner.routes
    }

    /// Current maintenance state.
    #[must_use]
    pub fn maintenance(&self) -> MaintenanceState {
        *self.inner.maintenance.borrow()
    }

    /// Subscribe to maintenance state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<MaintenanceState> {
        self.inner.maintenance.subscribe()
    }

    /// Fetch maintenance status. A failed fetch counts as inactive so a
    /// transient outage never locks everyone out.
    #[instrument(skip(self))]
    pub async fn resolve_maintenance(&self) -> MaintenanceState {
        let state = match self.inner.api.maintenance_status().await {
            Ok(status) if status.maintenance_active => MaintenanceState::Active,
            Ok(_) => MaintenanceState::Inactive,
            Err(e) => {
                warn!(error = %e, "Maintenance status unavailable, assuming inactive");
                MaintenanceState::Inactive
            }
        };

        let changed = self.inner.maintenance.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        if changed {
            debug!(?state, "Maintenance state changed");
        }
        state
    }

    /// Re-fetch maintenance status every `every`. Runs until the task is
    /// dropped; the first fetch happens after one full period.
    pub async fn poll(&self, every: Duration) {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        interval.tick().await;

        loop {
            interval.tick().await;
            self.resolve_maintenance().await;
        }
    }

    /// Decide access to `path` for `session` under the current maintenance state.
    #[must_use]
    pub fn evaluate(&self, session: &Session, path: &str) -> AccessDecision {
        let route = classify(path, &self.inner.routes);
        decide(
            self.maintenance(),
            session,
            route,
            &self.inner.routes.maintenance_path,
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use shopfront_core::{Email, Role, UserId};

    use super::*;
    use crate::api::{AccessToken, Identity, TokenPair};
    use crate::error::ApiError;
    use crate::testing::{Endpoint, InMemoryCommerce};

    const LANDING: &str = "/coming-soon";

    fn signed_in(role: Role) -> Session {
        Session::Authenticated {
            user: Identity {
                id: UserId::new(1),
                email: Email::parse("ana@example.com").unwrap(),
                role,
                first_name: None,
                last_name: None,
            },
            tokens: TokenPair {
                access_token: AccessToken::new("at"),
                refresh_token: None,
            },
        }
    }

    fn admin() -> Session {
        signed_in(Role::Admin)
    }

    #[test]
    fn test_classify_routes() {
        let routes = RouteConfig::default();
        assert_eq!(classify("/admin", &routes), RouteClass::Admin);
        assert_eq!(classify("/admin/orders/7", &routes), RouteClass::Admin);
        assert_eq!(classify("/login", &routes), RouteClass::Auth);
        assert_eq!(classify("/register?next=/cart", &routes), RouteClass::Auth);
        assert_eq!(classify("/coming-soon", &routes), RouteClass::ComingSoon);
        assert_eq!(classify("/coming-soon/", &routes), RouteClass::ComingSoon);
        assert_eq!(classify("/products", &routes), RouteClass::Other);
        assert_eq!(classify("/", &routes), RouteClass::Other);
    }

    #[test]
    fn test_pending_or_loading_shows_placeholder() {
        let all = [
            MaintenanceState::Pending,
            MaintenanceState::Active,
            MaintenanceState::Inactive,
        ];
        for maintenance in all {
            for session in [Session::Uninitialized, Session::Loading] {
                assert_eq!(
                    decide(maintenance, &session, RouteClass::Other, LANDING),
                    AccessDecision::Placeholder
                );
            }
        }
        assert_eq!(
            decide(MaintenanceState::Pending, &admin(), RouteClass::Admin, LANDING),
            AccessDecision::Placeholder
        );
    }

    #[test]
    fn test_inactive_renders_everything() {
        let routes = [
            RouteClass::Admin,
            RouteClass::Auth,
            RouteClass::ComingSoon,
            RouteClass::Other,
        ];
        for session in [Session::Anonymous, signed_in(Role::default()), admin()] {
            for route in routes {
                assert_eq!(
                    decide(MaintenanceState::Inactive, &session, route, LANDING),
                    AccessDecision::Render
                );
            }
        }
    }

    #[test]
    fn test_active_guest() {
        let guest = Session::Anonymous;
        let active = MaintenanceState::Active;
        assert_eq!(
            decide(active, &guest, RouteClass::Other, LANDING),
            AccessDecision::Redirect(LANDING.to_string())
        );
        assert_eq!(
            decide(active, &guest, RouteClass::Auth, LANDING),
            AccessDecision::Render
        );
        assert_eq!(
            decide(active, &guest, RouteClass::ComingSoon, LANDING),
            AccessDecision::Render
        );
        assert_eq!(
            decide(active, &guest, RouteClass::Admin, LANDING),
            AccessDecision::Redirect(LANDING.to_string())
        );
    }

    #[test]
    fn test_active_customer_is_redirected() {
        let customer = signed_in(Role::from("customer".to_string()));
        assert_eq!(
            decide(MaintenanceState::Active, &customer, RouteClass::Other, LANDING),
            AccessDecision::Redirect(LANDING.to_string())
        );
    }

    #[test]
    fn test_active_admin_renders_everywhere() {
        for route in [
            RouteClass::Admin,
            RouteClass::Auth,
            RouteClass::ComingSoon,
            RouteClass::Other,
        ] {
            assert_eq!(
                decide(MaintenanceState::Active, &admin(), route, LANDING),
                AccessDecision::Render
            );
        }
    }

    #[tokio::test]
    async fn test_resolve_maintenance_fails_open() {
        let backend = Arc::new(InMemoryCommerce::new());
        backend.set_maintenance(true);
        backend.fail_next(
            Endpoint::MaintenanceStatus,
            ApiError::Network("offline".to_string()),
        );
        let gate = AccessGate::new(backend.clone(), RouteConfig::default());
        assert_eq!(gate.maintenance(), MaintenanceState::Pending);

        assert_eq!(gate.resolve_maintenance().await, MaintenanceState::Inactive);
        assert_eq!(gate.resolve_maintenance().await, MaintenanceState::Active);
    }

    #[tokio::test]
    async fn test_evaluate_uses_configured_landing() {
        let backend = Arc::new(InMemoryCommerce::new());
        backend.set_maintenance(true);
        let routes = RouteConfig {
            maintenance_path: "/soon".to_string(),
            ..RouteConfig::default()
        };
        let gate = AccessGate::new(backend, routes);
        gate.resolve_maintenance().await;

        assert_eq!(
            gate.evaluate(&Session::Anonymous, "/products"),
            AccessDecision::Redirect("/soon".to_string())
        );
        assert_eq!(
            gate.evaluate(&Session::Anonymous, "/soon"),
            AccessDecision::Render
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_picks_up_changes() {
        let backend = Arc::new(InMemoryCommerce::new());
        let gate = AccessGate::new(backend.clone(), RouteConfig::default());
        gate.resolve_maintenance().await;
        let mut changes = gate.subscribe();

        let poller = tokio::spawn({
            let gate = gate.clone();
            async move { gate.poll(Duration::from_secs(30)).await }
        });
        backend.set_maintenance(true);

        changes.changed().await.unwrap();
        assert_eq!(*changes.borrow(), MaintenanceState::Active);
        poller.abort();
    }
}

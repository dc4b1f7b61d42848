//! Nudge HTTP Layer
//!
//! Axum handlers for triggering wakeups and managing device registrations.

mod api;

pub use api::*;

use axum::Router;
use nudge_core::WakeupMessage;
use nudge_dispatch::WakeupSender;
use nudge_gateway::PushGateway;
use nudge_storage::AccountStore;

/// Shared state for the wakeup API.
pub struct ApiState<S, G> {
    pub(crate) store: S,
    pub(crate) sender: WakeupSender<G>,
}

impl<S: Clone, G> Clone for ApiState<S, G> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            sender: self.sender.clone(),
        }
    }
}

/// Create the wakeup API router.
pub fn wakeup_router<S, G>(store: S, sender: WakeupSender<G>) -> Router
where
    S: AccountStore + Clone + 'static,
    G: PushGateway<WakeupMessage> + 'static,
{
    use axum::routing::{get, post, put};

    Router::new()
        .route(
            "/v1/wakeup/{identifier}/{device_id}",
            post(api::wakeup_handler::<S, G>),
        )
        .route(
            "/v1/accounts/{identifier}/devices/{device_id}",
            put(api::register_device_handler::<S, G>),
        )
        .route("/v1/wakeups/stats", get(api::stats_handler::<S, G>))
        .with_state(ApiState { store, sender })
}

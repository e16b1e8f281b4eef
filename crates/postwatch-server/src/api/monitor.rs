use axum::{extract::State, response::IntoResponse, Extension, Json};
use postwatch_core::LinkType;
use serde::Serialize;

use super::{ApiResponse, AppState, ResponseMeta};
use crate::middleware::RequestId;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(super) struct MonitorStatus {
    pub(super) public_tracked: usize,
    pub(super) private_tracked: usize,
    pub(super) live_workers: usize,
    pub(super) resolution_running: bool,
}

/// Read-only view of the engine: tracked-set sizes, live worker count, and
/// whether a resolution run currently holds its guard.
pub(super) async fn monitor_status(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> impl IntoResponse {
    let tracked = |link_type| {
        state
            .reconciler
            .snapshot(link_type)
            .map_or(0, |snapshot| snapshot.len())
    };

    Json(ApiResponse {
        data: MonitorStatus {
            public_tracked: tracked(LinkType::Public),
            private_tracked: tracked(LinkType::Private),
            live_workers: state.reconciler.live_workers(),
            resolution_running: state.resolver.is_running(),
        },
        meta: ResponseMeta::new(req_id.0),
    })
}

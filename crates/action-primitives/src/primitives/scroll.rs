//! Swipe and pull-to-refresh primitives

use crate::{
    errors::ActionError,
    geometry,
    primitives::DefaultActionDispatcher,
    spec::{AreaParams, SwipeParams},
    types::{ActionReport, ExecCtx, GestureOutcome},
};
use chrono::Utc;
use device_adapter::{Direction, Gesture};
use tokio::time::Instant;
use tracing::{debug, info};

/// Execute swipe primitive
///
/// Performs `count` swipes of `distance` on the screen or inside `area`,
/// pausing between consecutive swipes.
pub async fn execute_swipe(
    dispatcher: &DefaultActionDispatcher,
    ctx: &ExecCtx,
    params: &SwipeParams,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        direction = %params.direction,
        count = params.count,
        "Executing swipe primitive"
    );

    let area = dispatcher.swipe_area(ctx, params.area.as_deref()).await?;
    let gesture = dispatcher
        .swipe_gesture(params.direction, area, params.distance)
        .await?;

    for i in 0..params.count {
        if i > 0 {
            dispatcher
                .settle(ctx, dispatcher.settings().swipe_settle)
                .await?;
        }
        dispatcher.perform(ctx, &gesture).await?;
        debug!("Swipe {}/{} completed", i + 1, params.count);
    }

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    Ok(ActionReport::success("swipe", started_at, latency_ms).with_gesture(GestureOutcome {
        direction_used: Some(params.direction),
        swipes: params.count,
        attempted_directions: vec![params.direction],
    }))
}

/// Execute pull_to_refresh primitive
///
/// Pulls down from near the top edge, then waits for the refresh to land.
pub async fn execute_pull_to_refresh(
    dispatcher: &DefaultActionDispatcher,
    ctx: &ExecCtx,
    params: &AreaParams,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(action_id = %ctx.action_id, area = ?params.area, "Executing pull_to_refresh primitive");

    let area = dispatcher.swipe_area(ctx, params.area.as_deref()).await?;
    let viewport = dispatcher.adapter().viewport().await?;
    let (from, to) = geometry::refresh_swipe(viewport, area);
    let gesture = Gesture::Swipe {
        direction: Direction::Down,
        from,
        to,
        duration_ms: dispatcher.settings().swipe_duration_ms,
    };
    dispatcher.perform(ctx, &gesture).await?;
    dispatcher
        .settle(ctx, dispatcher.settings().refresh_settle)
        .await?;

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    Ok(
        ActionReport::success("pull_to_refresh", started_at, latency_ms).with_gesture(
            GestureOutcome {
                direction_used: Some(Direction::Down),
                swipes: 1,
                attempted_directions: vec![Direction::Down],
            },
        ),
    )
}

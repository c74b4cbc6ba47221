//! Swipe searches - swipe until a target shows up or goes away, and collect
//! list children across swipes.

use std::collections::HashSet;

use crate::{
    errors::ActionError,
    primitives::DefaultActionDispatcher,
    spec::{CollectChildrenParams, SwipeUntilNotVisibleParams, SwipeUntilVisibleParams},
    types::{ActionReport, CollectedChild, ExecCtx, GestureOutcome},
};
use action_locator::{LocatorSpec, Resolution, SelectorType};
use chrono::Utc;
use device_adapter::{BackendQuery, Gesture, Rect};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const SEEK_DISTANCE: f64 = 0.7;

/// Checks the target, then swipes up to `max_swipe` times in `direction`,
/// checking after each swipe.
async fn sweep_until_found(
    dispatcher: &DefaultActionDispatcher,
    ctx: &ExecCtx,
    target: &LocatorSpec,
    gesture: &Gesture,
    max_swipe: u32,
    swipes: &mut u32,
) -> Result<Option<Resolution>, ActionError> {
    if let Some(hit) = dispatcher.probe(ctx, target).await? {
        return Ok(Some(hit));
    }
    for n in 1..=max_swipe {
        dispatcher.perform(ctx, gesture).await?;
        *swipes += 1;
        dispatcher
            .settle(ctx, dispatcher.settings().swipe_settle)
            .await?;
        if let Some(hit) = dispatcher.probe(ctx, target).await? {
            return Ok(Some(hit));
        }
        debug!("Swipe {}/{} completed, '{}' not visible yet", n, max_swipe, target.key);
    }
    Ok(None)
}

/// Execute swipe_until_visible primitive
///
/// Sweeps in `direction`; when that is exhausted and a distinct
/// `fallback_direction` is configured, resets the scroll position (if the
/// device supports it) and sweeps again in the fallback direction.
pub async fn execute_swipe_until_visible(
    dispatcher: &DefaultActionDispatcher,
    ctx: &ExecCtx,
    params: &SwipeUntilVisibleParams,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        target = %params.target,
        direction = %params.direction,
        fallback_direction = ?params.fallback_direction,
        max_swipe = params.max_swipe,
        "Executing swipe_until_visible primitive"
    );

    let target = dispatcher.locator(&params.target)?;
    let area = dispatcher.swipe_area(ctx, params.area.as_deref()).await?;

    let mut directions = vec![params.direction];
    if let Some(fallback) = params.fallback_direction.filter(|d| *d != params.direction) {
        directions.push(fallback);
    }

    let mut outcome = GestureOutcome {
        direction_used: None,
        swipes: 0,
        attempted_directions: Vec::new(),
    };
    for (i, direction) in directions.into_iter().enumerate() {
        if i > 0 {
            info!(
                "Direction '{}' exhausted, trying fallback direction '{}'",
                params.direction, direction
            );
            let adapter = dispatcher.adapter();
            if adapter.supports_scroll_reset() {
                adapter.reset_scroll().await?;
            }
        }
        outcome.attempted_directions.push(direction);

        let gesture = dispatcher.swipe_gesture(direction, area, SEEK_DISTANCE).await?;
        let found = sweep_until_found(
            dispatcher,
            ctx,
            target,
            &gesture,
            params.max_swipe,
            &mut outcome.swipes,
        )
        .await?;

        if let Some(hit) = found {
            outcome.direction_used = Some(direction);
            let latency_ms = start_instant.elapsed().as_millis() as u64;
            info!(
                action_id = %ctx.action_id,
                swipes = outcome.swipes,
                direction = %direction,
                "Target '{}' found",
                params.target
            );
            return Ok(
                ActionReport::success("swipe_until_visible", started_at, latency_ms)
                    .with_healing(hit.healing)
                    .with_gesture(outcome),
            );
        }
    }

    warn!(
        "Target '{}' not found after {} swipe(s)",
        params.target, outcome.swipes
    );
    Err(ActionError::TargetNotFound {
        target: params.target.clone(),
        attempted_directions: outcome.attempted_directions,
        swipes_performed: outcome.swipes,
    })
}

/// Execute swipe_until_not_visible primitive
pub async fn execute_swipe_until_not_visible(
    dispatcher: &DefaultActionDispatcher,
    ctx: &ExecCtx,
    params: &SwipeUntilNotVisibleParams,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        target = %params.target,
        direction = %params.direction,
        "Executing swipe_until_not_visible primitive"
    );

    let target = dispatcher.locator(&params.target)?;
    let area = dispatcher.swipe_area(ctx, params.area.as_deref()).await?;
    let gesture = dispatcher
        .swipe_gesture(params.direction, area, SEEK_DISTANCE)
        .await?;

    let mut swipes = 0;
    let mut gone = dispatcher.probe(ctx, target).await?.is_none();
    if gone {
        info!("Target '{}' is already not visible", params.target);
    }
    while !gone && swipes < params.max_swipe {
        dispatcher.perform(ctx, &gesture).await?;
        swipes += 1;
        dispatcher
            .settle(ctx, dispatcher.settings().swipe_settle)
            .await?;
        gone = dispatcher.probe(ctx, target).await?.is_none();
    }

    if !gone {
        warn!(
            "Target '{}' still visible after {} swipe(s)",
            params.target, swipes
        );
        return Err(ActionError::TargetStillVisible {
            target: params.target.clone(),
            swipes_performed: swipes,
        });
    }

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    Ok(
        ActionReport::success("swipe_until_not_visible", started_at, latency_ms).with_gesture(
            GestureOutcome {
                direction_used: Some(params.direction),
                swipes,
                attempted_directions: vec![params.direction],
            },
        ),
    )
}

/// Adds the children visible right now; returns how many were new.
async fn collect_pass(
    dispatcher: &DefaultActionDispatcher,
    ctx: &ExecCtx,
    parent: &LocatorSpec,
    query: &BackendQuery,
    seen: &mut HashSet<String>,
    collected: &mut Vec<CollectedChild>,
) -> Result<usize, ActionError> {
    let Some(parent) = dispatcher.probe(ctx, parent).await? else {
        debug!("Parent not on screen during collection pass");
        return Ok(0);
    };

    let adapter = dispatcher.adapter();
    let children = match adapter.find_children(&parent.handle, query).await {
        Ok(children) => children,
        Err(err) if err.retriable || err.is_unsupported() => {
            debug!("Child query {} failed: {}", query, err);
            return Ok(0);
        }
        Err(err) => return Err(err.into()),
    };

    let mut added = 0;
    for child in children {
        let identity = match adapter.identity_key(&child).await {
            Ok(identity) => identity,
            Err(err) => {
                debug!("Skipping child {}: {}", child, err);
                continue;
            }
        };
        if seen.contains(&identity) {
            continue;
        }
        let bounds: Rect = match adapter.get_bounds(&child).await {
            Ok(bounds) => bounds,
            Err(err) => {
                debug!("Skipping child {}: {}", child, err);
                continue;
            }
        };
        let text = adapter.get_text(&child).await.unwrap_or_default();
        debug!("Collected new child element: {}", identity);
        seen.insert(identity.clone());
        collected.push(CollectedChild {
            identity,
            text,
            bounds,
        });
        added += 1;
    }
    Ok(added)
}

/// Execute swipe_and_collect_children primitive
///
/// Collects distinct children of `parent` before the first swipe and after
/// each swipe, until a swipe brings nothing new or `max_swipe` is reached.
pub async fn execute_swipe_and_collect(
    dispatcher: &DefaultActionDispatcher,
    ctx: &ExecCtx,
    params: &CollectChildrenParams,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        parent = %params.parent,
        child = %params.child.value,
        direction = %params.direction,
        max_swipe = params.max_swipe,
        "Executing swipe_and_collect_children primitive"
    );

    let parent = dispatcher.locator(&params.parent)?;
    let backend = dispatcher.adapter().backend();
    let query = dispatcher.resolver().transformer().transform(
        &SelectorType::new(&params.child.selector_type),
        &params.child.value,
        backend,
    )?;
    let area = dispatcher.swipe_area(ctx, params.area.as_deref()).await?;
    let gesture = dispatcher
        .swipe_gesture(params.direction, area, SEEK_DISTANCE)
        .await?;

    let mut seen = HashSet::new();
    let mut collected = Vec::new();
    let mut swipes = 0;
    loop {
        let added =
            collect_pass(dispatcher, ctx, parent, &query, &mut seen, &mut collected).await?;
        if swipes > 0 && added == 0 {
            debug!("No new children after swipe {}", swipes);
            break;
        }
        if swipes == params.max_swipe {
            break;
        }
        dispatcher.perform(ctx, &gesture).await?;
        swipes += 1;
        dispatcher
            .settle(ctx, dispatcher.settings().swipe_settle)
            .await?;
    }

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    info!(
        action_id = %ctx.action_id,
        collected = collected.len(),
        swipes = swipes,
        "Collected unique child elements"
    );

    Ok(
        ActionReport::success("swipe_and_collect_children", started_at, latency_ms)
            .with_gesture(GestureOutcome {
                direction_used: Some(params.direction),
                swipes,
                attempted_directions: vec![params.direction],
            })
            .with_collected(collected),
    )
}

//! Interactability check run on every located element.

use device_adapter::{AdapterError, AdapterErrorKind, ElementHandle, ElementProbe, Rect};
use serde::Serialize;

/// Smallest on-screen width and height, in device pixels, for an element to
/// count as interactable.
pub const MIN_INTERACTABLE_SIDE: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Visibility {
    Missing,
    Hidden,
    OffScreen { bounds: Rect },
    TooSmall { visible_area: Rect },
    Interactable { visible_area: Rect },
}

impl Visibility {
    pub fn is_interactable(&self) -> bool {
        matches!(self, Visibility::Interactable { .. })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VisibilityChecker {
    min_side: i32,
}

impl Default for VisibilityChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl VisibilityChecker {
    pub fn new() -> Self {
        Self {
            min_side: MIN_INTERACTABLE_SIDE,
        }
    }

    pub fn with_min_side(min_side: i32) -> Self {
        Self { min_side }
    }

    /// Runs exists -> visible flag -> viewport overlap -> minimum size, in
    /// that order, stopping at the first failed check.
    pub async fn check<P: ElementProbe + ?Sized>(
        &self,
        probe: &P,
        element: &ElementHandle,
    ) -> Result<Visibility, AdapterError> {
        match self.check_inner(probe, element).await {
            Err(err) if err.kind == AdapterErrorKind::StaleElement => Ok(Visibility::Missing),
            other => other,
        }
    }

    pub async fn is_interactable<P: ElementProbe + ?Sized>(
        &self,
        probe: &P,
        element: &ElementHandle,
    ) -> Result<bool, AdapterError> {
        Ok(self.check(probe, element).await?.is_interactable())
    }

    async fn check_inner<P: ElementProbe + ?Sized>(
        &self,
        probe: &P,
        element: &ElementHandle,
    ) -> Result<Visibility, AdapterError> {
        if !probe.exists(element).await? {
            return Ok(Visibility::Missing);
        }
        if !probe.is_visible(element).await? {
            return Ok(Visibility::Hidden);
        }

        let bounds = probe.bounds(element).await?;
        let viewport = probe.viewport().await?;
        let Some(visible_area) = bounds.intersection(&viewport) else {
            return Ok(Visibility::OffScreen { bounds });
        };

        if visible_area.width() < self.min_side || visible_area.height() < self.min_side {
            return Ok(Visibility::TooSmall { visible_area });
        }
        Ok(Visibility::Interactable { visible_area })
    }
}

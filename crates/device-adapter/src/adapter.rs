use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    AdapterError, AdapterErrorKind, Backend, BackendQuery, DeviceId, Direction, ElementHandle, Rect,
};

/// Minimal geometry/visibility capability the visibility checker runs against.
#[async_trait]
pub trait ElementProbe: Send + Sync {
    /// Whether the node is still attached to the hierarchy.
    async fn exists(&self, element: &ElementHandle) -> Result<bool, AdapterError>;

    /// The backend's own visibility flag (`displayed` / `visible`).
    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, AdapterError>;

    async fn bounds(&self, element: &ElementHandle) -> Result<Rect, AdapterError>;

    /// Current screen area in device pixels.
    async fn viewport(&self) -> Result<Rect, AdapterError>;
}

/// Low-level pointer gestures, in screen coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Gesture {
    Tap {
        x: i32,
        y: i32,
    },
    LongPress {
        x: i32,
        y: i32,
        duration_ms: u64,
    },
    Swipe {
        direction: Direction,
        from: (i32, i32),
        to: (i32, i32),
        duration_ms: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextInputOptions {
    pub clear_first: bool,
    pub submit: bool,
}

impl Default for TextInputOptions {
    fn default() -> Self {
        Self {
            clear_first: true,
            submit: false,
        }
    }
}

/// Device-level controls that do not target an element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceControl {
    Back,
    Home,
    OpenUrl {
        url: String,
    },
    LaunchApp {
        package: String,
        force_stop: bool,
        clear_data: bool,
    },
    StopApp {
        package: String,
    },
    SetOrientation {
        orientation: String,
    },
    PressKey {
        key: String,
    },
}

/// Capability interface every backend binding implements.
///
/// One adapter wraps exactly one device connection. Callers must not issue
/// concurrent operations against the same adapter.
#[async_trait]
pub trait DeviceAdapter: ElementProbe {
    fn backend(&self) -> Backend;

    fn device_id(&self) -> &DeviceId;

    /// First node matching `query`, in traversal order.
    async fn find_element(
        &self,
        query: &BackendQuery,
    ) -> Result<Option<ElementHandle>, AdapterError>;

    async fn find_elements(&self, query: &BackendQuery)
        -> Result<Vec<ElementHandle>, AdapterError>;

    /// Descendants of `parent` matching `query`, in traversal order.
    async fn find_children(
        &self,
        parent: &ElementHandle,
        query: &BackendQuery,
    ) -> Result<Vec<ElementHandle>, AdapterError>;

    /// Every node currently flagged visible and on screen, in traversal order.
    async fn visible_elements(&self) -> Result<Vec<ElementHandle>, AdapterError>;

    async fn get_text(&self, element: &ElementHandle) -> Result<String, AdapterError>;

    async fn get_bounds(&self, element: &ElementHandle) -> Result<Rect, AdapterError> {
        self.bounds(element).await
    }

    /// Raw attribute as the backend names it; `None` when the node lacks it.
    async fn get_attribute(
        &self,
        _element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, AdapterError> {
        Err(AdapterError::new(AdapterErrorKind::UnsupportedQuery)
            .with_hint(format!("attribute '{name}'")))
    }

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, AdapterError> {
        Ok(self.get_attribute(element, "enabled").await?.as_deref() == Some("true"))
    }

    async fn is_selected(&self, element: &ElementHandle) -> Result<bool, AdapterError> {
        Ok(self.get_attribute(element, "selected").await?.as_deref() == Some("true"))
    }

    /// Package of the app in the foreground, if any.
    async fn foreground_package(&self) -> Result<Option<String>, AdapterError> {
        Err(AdapterError::new(AdapterErrorKind::UnsupportedQuery).with_hint("foreground package"))
    }

    /// `portrait` or `landscape`, judged from the viewport unless the backend knows better.
    async fn screen_orientation(&self) -> Result<String, AdapterError> {
        let viewport = self.viewport().await?;
        let orientation = if viewport.width() > viewport.height() {
            "landscape"
        } else {
            "portrait"
        };
        Ok(orientation.to_string())
    }

    /// Stable identity used to de-duplicate nodes seen across swipes.
    async fn identity_key(&self, element: &ElementHandle) -> Result<String, AdapterError> {
        Ok(element.key.clone())
    }

    async fn perform_gesture(&self, gesture: Gesture) -> Result<(), AdapterError>;

    async fn perform_text_input(
        &self,
        element: &ElementHandle,
        text: &str,
        options: &TextInputOptions,
    ) -> Result<(), AdapterError>;

    async fn perform_device_control(&self, control: DeviceControl) -> Result<(), AdapterError>;

    fn supports_scroll_reset(&self) -> bool {
        false
    }

    async fn reset_scroll(&self) -> Result<(), AdapterError> {
        Ok(())
    }
}

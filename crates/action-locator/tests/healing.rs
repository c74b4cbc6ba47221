use std::sync::Arc;

use action_locator::{
    ElementResolver, HealingConfig, LocatorCatalog, LocatorError, LocatorResolver,
    ResolveOptions, SelectorTransformer,
};
use device_adapter::sim::{ScreenFixture, SimElement, SimulatedDevice};
use device_adapter::{Backend, DeviceId, Rect};
use tokio_util::sync::CancellationToken;

const LOCATORS: &str = r#"
wifi_row:
  primary: { type: xpath, value: "//android.widget.TextView[@text='Wi-Fi'][@selected='true']" }
settings_title:
  primary: { type: id, value: "com.android.settings:id/title_old" }
  fallback_1: { type: text, value: "Settings" }
ghost:
  primary: { type: id, value: "com.app:id/ghost" }
  fallback_1: { type: text, value: "Ghost" }
  fallback_2: { type: accessibility_id, value: "ghost" }
"#;

fn device(backend: Backend) -> Arc<SimulatedDevice> {
    let fixture = ScreenFixture::new(Rect::new(0, 0, 1080, 2340))
        .with_element(
            SimElement::new("title", Rect::new(0, 100, 1080, 250))
                .with_resource_id("com.android.settings:id/title")
                .with_class("android.widget.TextView")
                .with_text("Settings"),
        )
        .with_element(
            SimElement::new("wifi", Rect::new(0, 400, 1080, 560))
                .with_class("android.widget.TextView")
                .with_text("Wi-Fi"),
        );
    Arc::new(SimulatedDevice::new(DeviceId::new("sim"), backend, fixture))
}

#[tokio::test]
async fn xpath_recovery_drops_stale_predicate() {
    let catalog = LocatorCatalog::from_yaml_str(LOCATORS).unwrap();
    let mut healing = HealingConfig::default();
    healing.strategies.retain(|s| s.name == "xpath_recovery");

    let resolver =
        LocatorResolver::new(device(Backend::Appium), SelectorTransformer::new(), &healing)
            .unwrap();
    let resolution = resolver
        .resolve(
            catalog.get("wifi_row").unwrap(),
            &ResolveOptions::single_pass(CancellationToken::new()),
        )
        .await
        .unwrap();

    assert_eq!(resolution.handle.key, "wifi");
    let record = resolution.healing.unwrap();
    assert_eq!(record.strategy_used, "xpath_recovery");
    assert!((record.confidence - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn fallback_works_on_both_backends() {
    let catalog = LocatorCatalog::from_yaml_str(LOCATORS).unwrap();
    for backend in Backend::ALL {
        let resolver = LocatorResolver::new(
            device(backend),
            SelectorTransformer::new(),
            &HealingConfig::disabled(),
        )
        .unwrap();
        let resolution = resolver
            .resolve(
                catalog.get("settings_title").unwrap(),
                &ResolveOptions::single_pass(CancellationToken::new()),
            )
            .await
            .unwrap();
        assert_eq!(resolution.handle.key, "title", "{backend}");
        assert_eq!(resolution.healing.unwrap().candidate_index, 1);
    }
}

#[tokio::test]
async fn exhaustion_lists_every_candidate_once_in_order() {
    let catalog = LocatorCatalog::from_yaml_str(LOCATORS).unwrap();
    let mut healing = HealingConfig::default();
    healing.fallback_attempts = 7;
    let resolver =
        LocatorResolver::new(device(Backend::Uiautomator2), SelectorTransformer::new(), &healing)
            .unwrap();

    let err = resolver
        .resolve(
            catalog.get("ghost").unwrap(),
            &ResolveOptions::single_pass(CancellationToken::new()),
        )
        .await
        .unwrap_err();

    let LocatorError::ElementNotFound { attempted, locator_key } = err else {
        panic!("expected ElementNotFound");
    };
    assert_eq!(locator_key, "ghost");
    let types: Vec<&str> = attempted.iter().map(|a| a.selector_type.as_str()).collect();
    assert_eq!(types, vec!["id", "text", "accessibility_id"]);
}

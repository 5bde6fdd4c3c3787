//! Keys bound to Home Assistant entities.

use super::{
    decode_values, Appearance, AppearanceDefaults, AppearanceValues, Key, KeyContext, KeyKind,
    KeyPressResult, SharedAppearance,
};
use crate::backend::{entity_domain, Backend, EntityState, StateSubscription};
use crate::menu::RedrawTrigger;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

const TOGGLE_DEFAULTS: AppearanceDefaults = AppearanceDefaults {
    title: "Toggle",
    icon: "help",
    icon_color: "black",
};

const SCRIPT_DEFAULTS: AppearanceDefaults = AppearanceDefaults {
    title: "Script",
    icon: "script-text-play",
    icon_color: "black",
};

const CLIMATE_DEFAULTS: AppearanceDefaults = AppearanceDefaults {
    title: "Climate",
    icon: "help",
    icon_color: "black",
};

const DEFAULT_ICON_ON: &str = "toggle-switch";
const DEFAULT_ICON_OFF: &str = "toggle-switch-off";

/// Preset order walked by [`HomeAssistantClimatePreset`]. "none" is only an
/// entry point; the cycle itself skips it.
pub const PRESET_CYCLE: &[&str] = &["frost", "eco", "comfort", "boost"];

const PRESET_ATTRIBUTE: &str = "preset_mode";

/// Preset that follows `current`. Unknown or absent presets start the cycle.
pub fn next_preset(current: Option<&str>) -> &'static str {
    current
        .and_then(|current| PRESET_CYCLE.iter().position(|p| *p == current))
        .map_or(PRESET_CYCLE[0], |i| PRESET_CYCLE[(i + 1) % PRESET_CYCLE.len()])
}

fn default_preset_icon(preset: &str) -> Option<&'static str> {
    match preset {
        "none" => Some("thermometer-off"),
        "frost" => Some("snowflake"),
        "eco" => Some("leaf"),
        "comfort" => Some("sofa"),
        "boost" => Some("fire"),
        _ => None,
    }
}

fn entity_target(entity_id: &str) -> Value {
    json!({ "entity_id": entity_id })
}

/// Resolve appearance for an entity-bound key. Without an explicit title
/// the entity's friendly name (or its id) is used.
fn bound_appearance(
    values: &AppearanceValues,
    defaults: &AppearanceDefaults,
    entity_id: &str,
    state: Option<&EntityState>,
) -> Appearance {
    let mut appearance = Appearance::resolve(values, defaults);
    if values.title.is_none() {
        appearance.title = entity_title(entity_id, state).to_string();
    }
    appearance
}

fn entity_title<'a>(entity_id: &'a str, state: Option<&'a EntityState>) -> &'a str {
    state.and_then(EntityState::friendly_name).unwrap_or(entity_id)
}

#[derive(Clone, Debug, Deserialize)]
pub struct ToggleValues {
    pub entity_id: String,
    #[serde(default)]
    pub icon_on: Option<String>,
    #[serde(default)]
    pub icon_off: Option<String>,
    #[serde(flatten)]
    pub appearance: AppearanceValues,
}

#[derive(Clone, Debug)]
struct ToggleIcons {
    on: String,
    off: String,
    unknown: String,
}

impl ToggleIcons {
    fn for_state(&self, state: Option<&str>) -> &str {
        match state {
            Some("on") => &self.on,
            Some("off") => &self.off,
            _ => &self.unknown,
        }
    }
}

/// On/off entity (light, switch, ...). Shows the current state and flips it.
pub struct HomeAssistantToggle {
    entity_id: String,
    backend: Arc<dyn Backend>,
    appearance: SharedAppearance,
    icons: ToggleIcons,
    _subscription: StateSubscription,
}

impl HomeAssistantToggle {
    pub fn new(ctx: &KeyContext<'_>) -> Result<Self> {
        let kind = KeyKind::HomeAssistantToggle;
        let values: ToggleValues = decode_values(kind, ctx.values)?;
        let backend = ctx.require_backend(kind)?;

        let appearance = SharedAppearance::new(Appearance::resolve(&values.appearance, &TOGGLE_DEFAULTS));
        let icons = ToggleIcons {
            on: values.icon_on.clone().unwrap_or_else(|| DEFAULT_ICON_ON.to_string()),
            off: values.icon_off.clone().unwrap_or_else(|| DEFAULT_ICON_OFF.to_string()),
            unknown: appearance.get().icon,
        };

        // Register before reading the cache so no change slips in between
        let subscription = StateSubscription::register(
            &backend,
            &values.entity_id,
            observe_state(
                appearance.clone(),
                ctx.redraw.clone(),
                values.appearance.title.is_none(),
                {
                    let icons = icons.clone();
                    move |state: &EntityState| icons.for_state(Some(&state.state)).to_string()
                },
            ),
        );

        let state = backend.get_entity_info(&values.entity_id);
        let initial = bound_appearance(&values.appearance, &TOGGLE_DEFAULTS, &values.entity_id, state.as_deref());
        appearance.set_title(&initial.title);
        appearance.set_icon(icons.for_state(state.as_deref().map(|s| s.state.as_str())));

        Ok(Self {
            entity_id: values.entity_id,
            backend,
            appearance,
            icons,
            _subscription: subscription,
        })
    }
}

impl Key for HomeAssistantToggle {
    fn appearance(&self) -> Appearance {
        self.appearance.get()
    }

    fn pressed(&mut self) -> Option<KeyPressResult> {
        let current = self
            .backend
            .get_entity_info(&self.entity_id)
            .map(|state| state.state.clone());
        let domain = entity_domain(&self.entity_id);
        let target = entity_target(&self.entity_id);

        let (service, optimistic) = match current.as_deref() {
            Some("on") => ("turn_off", "off"),
            Some("off") => ("turn_on", "on"),
            other => {
                info!(entity_id = %self.entity_id, state = ?other, "State unknown, sending toggle");
                self.backend.call_service(domain, "toggle", json!({}), target);
                return None;
            }
        };

        self.backend.call_service(domain, service, json!({}), target);
        self.appearance.set_icon(self.icons.for_state(Some(optimistic)));
        Some(KeyPressResult::Redraw)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ScriptValues {
    pub entity_id: String,
    #[serde(flatten)]
    pub appearance: AppearanceValues,
}

/// Runs a script. Stateless icon, no navigation effect.
pub struct HomeAssistantScript {
    entity_id: String,
    backend: Arc<dyn Backend>,
    appearance: Appearance,
}

impl HomeAssistantScript {
    pub fn new(ctx: &KeyContext<'_>) -> Result<Self> {
        let kind = KeyKind::HomeAssistantScript;
        let values: ScriptValues = decode_values(kind, ctx.values)?;
        let backend = ctx.require_backend(kind)?;
        let state = backend.get_entity_info(&values.entity_id);

        Ok(Self {
            appearance: bound_appearance(&values.appearance, &SCRIPT_DEFAULTS, &values.entity_id, state.as_deref()),
            entity_id: values.entity_id,
            backend,
        })
    }
}

impl Key for HomeAssistantScript {
    fn appearance(&self) -> Appearance {
        self.appearance.clone()
    }

    fn pressed(&mut self) -> Option<KeyPressResult> {
        self.backend.call_service(
            entity_domain(&self.entity_id),
            "turn_on",
            json!({}),
            entity_target(&self.entity_id),
        );
        None
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ClimatePresetValues {
    pub entity_id: String,
    /// Per-preset icon overrides
    #[serde(default)]
    pub icons: BTreeMap<String, String>,
    #[serde(flatten)]
    pub appearance: AppearanceValues,
}

#[derive(Clone, Debug)]
struct PresetIcons {
    overrides: BTreeMap<String, String>,
    fallback: String,
}

impl PresetIcons {
    fn for_preset(&self, preset: Option<&str>) -> String {
        let preset = preset.unwrap_or("none");
        self.overrides
            .get(preset)
            .cloned()
            .or_else(|| default_preset_icon(preset).map(str::to_string))
            .unwrap_or_else(|| self.fallback.clone())
    }
}

/// Climate device; cycles through heating presets.
pub struct HomeAssistantClimatePreset {
    entity_id: String,
    backend: Arc<dyn Backend>,
    appearance: SharedAppearance,
    icons: PresetIcons,
    _subscription: StateSubscription,
}

impl HomeAssistantClimatePreset {
    pub fn new(ctx: &KeyContext<'_>) -> Result<Self> {
        let kind = KeyKind::HomeAssistantClimatePreset;
        let values: ClimatePresetValues = decode_values(kind, ctx.values)?;
        let backend = ctx.require_backend(kind)?;

        let appearance = SharedAppearance::new(Appearance::resolve(&values.appearance, &CLIMATE_DEFAULTS));
        let icons = PresetIcons {
            overrides: values.icons.clone(),
            fallback: appearance.get().icon,
        };

        let subscription = StateSubscription::register(
            &backend,
            &values.entity_id,
            observe_state(
                appearance.clone(),
                ctx.redraw.clone(),
                values.appearance.title.is_none(),
                {
                    let icons = icons.clone();
                    move |state: &EntityState| icons.for_preset(state.attribute_str(PRESET_ATTRIBUTE))
                },
            ),
        );

        let state = backend.get_entity_info(&values.entity_id);
        let initial = bound_appearance(&values.appearance, &CLIMATE_DEFAULTS, &values.entity_id, state.as_deref());
        appearance.set_title(&initial.title);
        if let Some(state) = state.as_deref() {
            appearance.set_icon(&icons.for_preset(state.attribute_str(PRESET_ATTRIBUTE)));
        }

        Ok(Self {
            entity_id: values.entity_id,
            backend,
            appearance,
            icons,
            _subscription: subscription,
        })
    }
}

impl Key for HomeAssistantClimatePreset {
    fn appearance(&self) -> Appearance {
        self.appearance.get()
    }

    fn pressed(&mut self) -> Option<KeyPressResult> {
        let state = self.backend.get_entity_info(&self.entity_id);
        let current = state.as_deref().and_then(|s| s.attribute_str(PRESET_ATTRIBUTE));
        let next = next_preset(current);

        info!(entity_id = %self.entity_id, from = ?current, to = next, "Switching preset");
        self.backend.call_service(
            "climate",
            "set_preset_mode",
            json!({ PRESET_ATTRIBUTE: next }),
            entity_target(&self.entity_id),
        );
        self.appearance.set_icon(&self.icons.for_preset(Some(next)));
        Some(KeyPressResult::Redraw)
    }
}

/// Build an observer that maps each new state to an icon and, unless the
/// title was set explicitly, follows the entity's friendly name. A redraw
/// is requested only when something visible changed.
fn observe_state(
    appearance: SharedAppearance,
    redraw: RedrawTrigger,
    follow_title: bool,
    icon_for: impl Fn(&EntityState) -> String + Send + Sync + 'static,
) -> crate::backend::StateChangeHandler {
    Box::new(move |state: &EntityState| {
        let icon = icon_for(state);
        let mut changed = appearance.set_icon(&icon);
        if follow_title {
            changed |= appearance.set_title(entity_title(&state.entity_id, Some(state)));
        }
        if changed {
            debug!(entity_id = %state.entity_id, icon = %icon, "Entity changed, redraw requested");
            redraw.request();
        }
    })
}

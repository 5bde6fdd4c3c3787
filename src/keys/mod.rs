//! Keys: one button's behaviour and appearance.
//!
//! Every key kind is a closed [`KeyKind`] variant resolved when the layout
//! is loaded. Kinds declare their default appearance as constants; explicit
//! `title`, `icon` and `icon_color` values override them.

mod generic;
mod home_assistant;

pub use generic::{BackButton, SubMenu, SubMenuValues};
pub use home_assistant::{
    next_preset, HomeAssistantClimatePreset, HomeAssistantScript, HomeAssistantToggle,
    PRESET_CYCLE,
};

use crate::backend::Backend;
use crate::config::MenuNode;
use crate::menu::RedrawTrigger;
use anyhow::{anyhow, Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};


/// Directive returned by [`Key::pressed`]
#[derive(Clone, Debug, PartialEq)]
pub enum KeyPressResult {
    /// Enter the given submenu
    MenuEnter(Vec<MenuNode>),
    /// Return from the current submenu
    MenuBack,
    /// The key changed its own appearance; re-render only
    Redraw,
}

/// What a renderer needs to draw one key
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Appearance {
    pub title: String,
    pub icon: String,
    pub icon_color: String,
}

/// Per-kind default appearance
#[derive(Clone, Copy, Debug)]
pub struct AppearanceDefaults {
    pub title: &'static str,
    pub icon: &'static str,
    pub icon_color: &'static str,
}

/// Appearance overrides accepted by every key kind
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppearanceValues {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub icon_color: Option<String>,
}

impl Appearance {
    pub fn resolve(values: &AppearanceValues, defaults: &AppearanceDefaults) -> Self {
        Self {
            title: values
                .title
                .clone()
                .unwrap_or_else(|| defaults.title.to_string()),
            icon: values
                .icon
                .clone()
                .unwrap_or_else(|| defaults.icon.to_string()),
            icon_color: values
                .icon_color
                .clone()
                .unwrap_or_else(|| defaults.icon_color.to_string()),
        }
    }
}

/// Appearance cell shared between a key and its state observer
#[derive(Clone, Debug)]
pub struct SharedAppearance(Arc<Mutex<Appearance>>);

impl SharedAppearance {
    pub fn new(appearance: Appearance) -> Self {
        Self(Arc::new(Mutex::new(appearance)))
    }

    pub fn get(&self) -> Appearance {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Set the icon, returning whether it changed
    pub fn set_icon(&self, icon: &str) -> bool {
        let mut appearance = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if appearance.icon == icon {
            return false;
        }
        appearance.icon = icon.to_string();
        true
    }

    /// Set the title, returning whether it changed
    pub fn set_title(&self, title: &str) -> bool {
        let mut appearance = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if appearance.title == title {
            return false;
        }
        appearance.title = title.to_string();
        true
    }
}

/// A live key on the current page
pub trait Key: Send {
    fn appearance(&self) -> Appearance;

    /// Handle a press. `None` means no visible effect.
    fn pressed(&mut self) -> Option<KeyPressResult>;
}

/// Everything a key constructor gets from the orchestrator
pub struct KeyContext<'a> {
    pub values: &'a Map<String, Value>,
    pub backend: Option<Arc<dyn Backend>>,
    pub redraw: RedrawTrigger,
}

impl KeyContext<'_> {
    fn require_backend(&self, kind: KeyKind) -> Result<Arc<dyn Backend>> {
        self.backend
            .clone()
            .ok_or_else(|| anyhow!("key kind {kind} needs a backend"))
    }
}

/// Key kinds compiled into this build
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum KeyKind {
    SubMenu,
    BackButton,
    HomeAssistantToggle,
    HomeAssistantScript,
    HomeAssistantClimatePreset,
}

pub const AVAILABLE: &[KeyKind] = &[
    KeyKind::SubMenu,
    KeyKind::BackButton,
    KeyKind::HomeAssistantToggle,
    KeyKind::HomeAssistantScript,
    KeyKind::HomeAssistantClimatePreset,
];

impl KeyKind {
    pub fn name(&self) -> &'static str {
        match self {
            KeyKind::SubMenu => "SubMenu",
            KeyKind::BackButton => "BackButton",
            KeyKind::HomeAssistantToggle => "HomeAssistantToggle",
            KeyKind::HomeAssistantScript => "HomeAssistantScript",
            KeyKind::HomeAssistantClimatePreset => "HomeAssistantClimatePreset",
        }
    }

    pub fn requires_backend(&self) -> bool {
        matches!(
            self,
            KeyKind::HomeAssistantToggle
                | KeyKind::HomeAssistantScript
                | KeyKind::HomeAssistantClimatePreset
        )
    }

    /// Decode the kind-specific values without creating the key
    pub fn check_values(&self, values: &Map<String, Value>) -> Result<()> {
        match self {
            KeyKind::SubMenu => decode_values::<SubMenuValues>(*self, values).map(|_| ()),
            KeyKind::BackButton => decode_values::<AppearanceValues>(*self, values).map(|_| ()),
            KeyKind::HomeAssistantToggle => {
                decode_values::<home_assistant::ToggleValues>(*self, values).map(|_| ())
            }
            KeyKind::HomeAssistantScript => {
                decode_values::<home_assistant::ScriptValues>(*self, values).map(|_| ())
            }
            KeyKind::HomeAssistantClimatePreset => {
                decode_values::<home_assistant::ClimatePresetValues>(*self, values).map(|_| ())
            }
        }
    }

    pub fn create(&self, ctx: KeyContext<'_>) -> Result<Box<dyn Key>> {
        let key: Box<dyn Key> = match self {
            KeyKind::SubMenu => Box::new(SubMenu::new(&ctx)?),
            KeyKind::BackButton => Box::new(BackButton::new(&ctx)?),
            KeyKind::HomeAssistantToggle => Box::new(HomeAssistantToggle::new(&ctx)?),
            KeyKind::HomeAssistantScript => Box::new(HomeAssistantScript::new(&ctx)?),
            KeyKind::HomeAssistantClimatePreset => {
                Box::new(HomeAssistantClimatePreset::new(&ctx)?)
            }
        };
        Ok(key)
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn decode_values<T: DeserializeOwned>(
    kind: KeyKind,
    values: &Map<String, Value>,
) -> Result<T> {
    serde_json::from_value(Value::Object(values.clone()))
        .with_context(|| format!("invalid values for key kind {kind}"))
}

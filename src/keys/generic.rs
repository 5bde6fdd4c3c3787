use super::{decode_values, Appearance, AppearanceDefaults, AppearanceValues, Key, KeyContext, KeyKind, KeyPressResult};
use crate::config::MenuNode;
use anyhow::Result;
use serde::Deserialize;

const SUBMENU_DEFAULTS: AppearanceDefaults = AppearanceDefaults {
    title: "SubMenu",
    icon: "folder",
    icon_color: "black",
};

const BACK_DEFAULTS: AppearanceDefaults = AppearanceDefaults {
    title: "Back",
    icon: "arrow-left",
    icon_color: "black",
};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SubMenuValues {
    /// Nodes of the nested page
    #[serde(default)]
    pub keys: Vec<MenuNode>,
    #[serde(flatten)]
    pub appearance: AppearanceValues,
}

/// Enters a nested page
pub struct SubMenu {
    appearance: Appearance,
    keys: Vec<MenuNode>,
}

impl SubMenu {
    pub fn new(ctx: &KeyContext<'_>) -> Result<Self> {
        let values: SubMenuValues = decode_values(KeyKind::SubMenu, ctx.values)?;
        Ok(Self {
            appearance: Appearance::resolve(&values.appearance, &SUBMENU_DEFAULTS),
            keys: values.keys,
        })
    }
}

impl Key for SubMenu {
    fn appearance(&self) -> Appearance {
        self.appearance.clone()
    }

    fn pressed(&mut self) -> Option<KeyPressResult> {
        Some(KeyPressResult::MenuEnter(self.keys.clone()))
    }
}

/// Returns from a nested page
pub struct BackButton {
    appearance: Appearance,
}

impl BackButton {
    pub fn new(ctx: &KeyContext<'_>) -> Result<Self> {
        let values: AppearanceValues = decode_values(KeyKind::BackButton, ctx.values)?;
        Ok(Self {
            appearance: Appearance::resolve(&values, &BACK_DEFAULTS),
        })
    }
}

impl Key for BackButton {
    fn appearance(&self) -> Appearance {
        self.appearance.clone()
    }

    fn pressed(&mut self) -> Option<KeyPressResult> {
        Some(KeyPressResult::MenuBack)
    }
}

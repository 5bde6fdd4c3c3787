use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

// Re-export kind registries the layout refers to
pub use crate::backend::{BackendConfig, HomeAssistantConfig};
pub use crate::frontend::FrontendKind;
pub use crate::keys::KeyKind;

/// One grid slot: a key or an empty cell (`null`)
pub type MenuNode = Option<KeyConfig>;

/// Complete layout file
#[derive(Debug, Clone, Deserialize)]
pub struct LayoutConfig {
    #[serde(default)]
    pub backends: BTreeMap<String, BackendConfig>,
    pub frontend: FrontendConfig,
    #[serde(default)]
    pub style: StyleConfig,
    #[serde(default)]
    pub keys: Vec<MenuNode>,
}

/// Key descriptor in the menu tree
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct KeyConfig {
    pub kind: KeyKind,
    /// Name of the backend in `backends` this key is bound to
    #[serde(default)]
    pub backend: Option<String>,
    /// Kind-specific values
    #[serde(default)]
    pub values: Map<String, Value>,
}

/// Largest grid any frontend is asked to show
pub const MAX_CELLS: usize = 1024;

/// Frontend selection and grid geometry
#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    pub kind: FrontendKind,
    pub rows: usize,
    pub columns: usize,
    /// Disable the display after this many idle seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

impl FrontendConfig {
    pub fn cells(&self) -> usize {
        self.rows.saturating_mul(self.columns)
    }
}

/// Renderer style
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StyleConfig {
    #[serde(default = "default_padding")]
    pub padding: u32,
    #[serde(default = "default_font")]
    pub font: String,
    #[serde(default = "default_max_fontsize")]
    pub max_fontsize: u32,
}

fn default_padding() -> u32 {
    4
}

fn default_font() -> String {
    "DejaVuSans.ttf".to_string()
}

fn default_max_fontsize() -> u32 {
    16
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            padding: default_padding(),
            font: default_font(),
            max_fontsize: default_max_fontsize(),
        }
    }
}

impl LayoutConfig {
    /// Reject everything that would otherwise fail on first use: bad grid
    /// geometry, broken backend values, keys referring to missing backends
    /// and key values that do not decode for their kind.
    pub fn validate(&self) -> Result<()> {
        if self.frontend.rows == 0 || self.frontend.columns == 0 {
            bail!(
                "frontend {} needs at least one row and one column, got {}x{}",
                self.frontend.kind,
                self.frontend.rows,
                self.frontend.columns
            );
        }
        if self.frontend.cells() > MAX_CELLS {
            bail!(
                "frontend {} grid {}x{} exceeds {MAX_CELLS} keys",
                self.frontend.kind,
                self.frontend.rows,
                self.frontend.columns
            );
        }

        for (name, backend) in &self.backends {
            backend
                .validate()
                .with_context(|| format!("backend '{name}' ({})", backend.kind()))?;
        }

        self.validate_nodes(&self.keys, "keys")
    }

    fn validate_nodes(&self, nodes: &[MenuNode], path: &str) -> Result<()> {
        for (index, node) in nodes.iter().enumerate() {
            let Some(key) = node else { continue };
            let position = format!("{path}[{index}]");

            match (&key.backend, key.kind.requires_backend()) {
                (Some(name), _) if !self.backends.contains_key(name) => {
                    bail!("{position}: key {} refers to unknown backend '{name}'", key.kind);
                }
                (None, true) => {
                    bail!("{position}: key {} needs a backend", key.kind);
                }
                _ => {}
            }

            key.kind
                .check_values(&key.values)
                .with_context(|| position.clone())?;

            if key.kind == KeyKind::SubMenu {
                let submenu: crate::keys::SubMenuValues =
                    crate::keys::decode_values(key.kind, &key.values)?;
                self.validate_nodes(&submenu.keys, &format!("{position}.values.keys"))?;
            }
        }
        Ok(())
    }
}

/// Load and validate a YAML layout file
pub fn load_config(path: impl AsRef<Path>) -> Result<LayoutConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read layout file {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("Invalid layout file {}", path.display()))
}

/// Parse and validate a YAML layout document
pub fn parse_config(contents: &str) -> Result<LayoutConfig> {
    let config: LayoutConfig = serde_yaml::from_str(contents)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests;

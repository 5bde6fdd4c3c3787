// Display surfaces showing the key grid

mod terminal;

pub use terminal::TerminalFrontend;

use crate::config::FrontendConfig;
use crate::menu::KeypressSender;
use crate::render::KeyImage;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// A grid of keys that can show images and reports presses.
///
/// Presses are delivered through the [`KeypressSender`] the frontend was
/// created with.
pub trait Frontend: Send {
    /// Pixel size of one key image
    fn image_size(&self) -> (u32, u32);

    /// Forget all key images without updating the display
    fn clear(&mut self);

    fn set_key(&mut self, index: usize, image: KeyImage);

    /// Show the images set since the last `clear`
    fn draw(&mut self) -> Result<()>;

    /// Start delivering keypresses. Returns once input is being read.
    fn run(&mut self) -> Result<()>;

    fn set_enabled(&mut self, enabled: bool);

    fn is_enabled(&self) -> bool;
}

/// Frontend kinds compiled into this build
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum FrontendKind {
    TerminalFrontend,
}

pub const AVAILABLE: &[FrontendKind] = &[FrontendKind::TerminalFrontend];

impl FrontendKind {
    pub fn name(&self) -> &'static str {
        match self {
            FrontendKind::TerminalFrontend => "TerminalFrontend",
        }
    }
}

impl fmt::Display for FrontendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn create_frontend(
    config: &FrontendConfig,
    keypresses: KeypressSender,
) -> Result<Box<dyn Frontend>> {
    let frontend: Box<dyn Frontend> = match config.kind {
        FrontendKind::TerminalFrontend => {
            Box::new(TerminalFrontend::new(config.rows, config.columns, keypresses))
        }
    };
    info!(kind = %config.kind, rows = config.rows, columns = config.columns, "Loaded frontend");
    Ok(frontend)
}

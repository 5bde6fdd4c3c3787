//! Process wiring: backends, frontend, renderer and the menu loop.

use crate::backend;
use crate::config::LayoutConfig;
use crate::frontend;
use crate::keys;
use crate::menu::{self, MenuOrchestrator};
use crate::render::TextRenderer;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Start one task per backend and serve the menu until ctrl-c
pub async fn run(layout: LayoutConfig) -> Result<()> {
    let frontend_names: Vec<_> = frontend::AVAILABLE.iter().map(|k| k.name()).collect();
    info!(available = %frontend_names.join(", "), "Available frontends");
    info!(available = %backend::AVAILABLE.join(", "), "Available backends");
    let key_names: Vec<_> = keys::AVAILABLE.iter().map(|k| k.name()).collect();
    info!(available = %key_names.join(", "), "Available keys");

    let (redraw, keypresses, events) = menu::event_channel();
    let frontend = frontend::create_frontend(&layout.frontend, keypresses)?;
    let backends = backend::create_backends(&layout.backends)?;
    let renderer = TextRenderer::new(frontend.image_size(), layout.style.clone());

    for (name, backend) in &backends {
        tokio::spawn(Arc::clone(backend).run());
        info!(backend = %name, "Backend session started");
    }

    let orchestrator = MenuOrchestrator::new(
        layout.keys,
        &layout.frontend,
        backends,
        frontend,
        Box::new(renderer),
        redraw,
    );

    tokio::select! {
        result = orchestrator.run(events) => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for ctrl_c signal")?;
            info!("Shutdown signal received");
            Ok(())
        }
    }
}

//! Menu orchestration: navigation stack, live keys of the current page and
//! the event loop that serves keypresses and redraw requests.
//!
//! The orchestrator is the only owner of the stack and the key list. Backend
//! tasks never touch either; they only queue [`MenuEvent::Redraw`] through a
//! [`RedrawTrigger`].

use crate::backend::Backend;
use crate::config::{FrontendConfig, KeyConfig, MenuNode};
use crate::frontend::Frontend;
use crate::keys::{Key, KeyContext, KeyPressResult};
use crate::render::Renderer;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};


/// Events consumed by the orchestrator loop
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuEvent {
    /// A frontend key was pressed
    KeyPressed(usize),
    /// Some key changed its appearance
    Redraw,
}

/// Handle keys use to request a re-render from any thread
#[derive(Clone, Debug)]
pub struct RedrawTrigger {
    tx: mpsc::UnboundedSender<MenuEvent>,
}

impl RedrawTrigger {
    pub fn request(&self) {
        if self.tx.send(MenuEvent::Redraw).is_err() {
            debug!("Redraw requested after menu loop stopped");
        }
    }
}

/// Keypress callback handed to frontends
#[derive(Clone, Debug)]
pub struct KeypressSender {
    tx: mpsc::UnboundedSender<MenuEvent>,
}

impl KeypressSender {
    pub fn pressed(&self, index: usize) {
        if self.tx.send(MenuEvent::KeyPressed(index)).is_err() {
            debug!(index = index, "Keypress after menu loop stopped");
        }
    }
}

/// Create the single-consumer event queue shared by frontend and keys
pub fn event_channel() -> (RedrawTrigger, KeypressSender, mpsc::UnboundedReceiver<MenuEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        RedrawTrigger { tx: tx.clone() },
        KeypressSender { tx },
        rx,
    )
}

/// Owns the navigation stack and the keys of the visible page
pub struct MenuOrchestrator {
    rows: usize,
    columns: usize,
    timeout: Option<Duration>,

    /// Page history, root at index 0, never empty
    stack: Vec<Vec<MenuNode>>,

    /// One slot per grid cell of the current page
    keys: Vec<Option<Box<dyn Key>>>,

    backends: BTreeMap<String, Arc<dyn Backend>>,
    frontend: Box<dyn Frontend>,
    renderer: Box<dyn Renderer>,
    redraw: RedrawTrigger,
    last_action: Instant,
}

impl MenuOrchestrator {
    pub fn new(
        root: Vec<MenuNode>,
        grid: &FrontendConfig,
        backends: BTreeMap<String, Arc<dyn Backend>>,
        frontend: Box<dyn Frontend>,
        renderer: Box<dyn Renderer>,
        redraw: RedrawTrigger,
    ) -> Self {
        Self {
            rows: grid.rows,
            columns: grid.columns,
            timeout: grid.timeout.map(Duration::from_secs),
            stack: vec![root],
            keys: Vec::new(),
            backends,
            frontend,
            renderer,
            redraw,
            last_action: Instant::now(),
        }
    }

    /// Current submenu depth (1 at the root)
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Number of cells that currently hold a key
    pub fn live_keys(&self) -> usize {
        self.keys.iter().filter(|k| k.is_some()).count()
    }

    pub fn key(&self, index: usize) -> Option<&dyn Key> {
        self.keys.get(index).and_then(|k| k.as_deref())
    }

    pub fn frontend(&self) -> &dyn Frontend {
        self.frontend.as_ref()
    }

    fn current_page(&self) -> &[MenuNode] {
        self.stack.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace the keys of the current page.
    ///
    /// The previous generation is dropped before the first new key is
    /// created, so stale observers are gone before new ones register.
    pub fn build_page(&mut self) {
        self.keys.clear();

        let cells = self.rows.saturating_mul(self.columns);
        let mut keys = Vec::with_capacity(cells);
        for index in 0..cells {
            let key = match self.current_page().get(index) {
                Some(Some(config)) => self.create_key(index, config),
                _ => None,
            };
            keys.push(key);
        }
        self.keys = keys;
    }

    fn create_key(&self, index: usize, config: &KeyConfig) -> Option<Box<dyn Key>> {
        let (row, col) = (index / self.columns, index % self.columns);

        let backend = match config.backend.as_deref() {
            Some(name) => match self.backends.get(name) {
                Some(backend) => Some(Arc::clone(backend)),
                None => {
                    error!(key = %config.kind, backend = %name, row = row, col = col, "Unknown backend, leaving cell empty");
                    return None;
                }
            },
            None => None,
        };

        let ctx = KeyContext {
            values: &config.values,
            backend,
            redraw: self.redraw.clone(),
        };
        match config.kind.create(ctx) {
            Ok(key) => {
                info!(key = %config.kind, row = row, col = col, "Loaded key");
                Some(key)
            }
            Err(e) => {
                error!(key = %config.kind, row = row, col = col, error = %format!("{e:#}"), "Failed to create key");
                None
            }
        }
    }

    /// Push the current appearance of every key to the frontend
    pub fn render_page(&mut self) {
        if !self.frontend.is_enabled() {
            debug!("Frontend disabled, skipping render");
            return;
        }

        self.frontend.clear();
        for (index, key) in self.keys.iter().enumerate() {
            if let Some(key) = key {
                let image = self.renderer.render(&key.appearance());
                self.frontend.set_key(index, image);
            }
        }
        if let Err(e) = self.frontend.draw() {
            error!(error = %format!("{e:#}"), "Frontend draw failed");
        }
    }

    /// Route a keypress to its key and act on the returned directive
    pub fn handle_keypress(&mut self, index: usize) {
        self.last_action = Instant::now();
        if !self.frontend.is_enabled() {
            info!("Keypress while idle, enabling frontend");
            self.frontend.set_enabled(true);
            self.render_page();
        }

        let Some(Some(key)) = self.keys.get_mut(index) else {
            info!(index = index, "Key pressed, but it has no mapping");
            return;
        };

        let result = key.pressed();
        debug!(index = index, result = ?result, "Keypress handled");

        match result {
            Some(KeyPressResult::MenuEnter(nodes)) => {
                self.stack.push(nodes);
                info!(level = self.depth() - 1, "Entering submenu");
                self.build_page();
                self.render_page();
            }
            Some(KeyPressResult::MenuBack) => {
                if self.stack.len() <= 1 {
                    warn!("Already at the root menu, no way back");
                    return;
                }
                self.stack.pop();
                info!(level = self.depth() - 1, "Going back to submenu");
                self.build_page();
                self.render_page();
            }
            Some(KeyPressResult::Redraw) => self.render_page(),
            None => {}
        }
    }

    /// Disable the frontend once it has been idle longer than the timeout
    pub fn check_idle(&mut self) {
        let Some(timeout) = self.timeout else { return };
        if self.frontend.is_enabled() && self.last_action.elapsed() >= timeout {
            self.frontend.set_enabled(false);
            info!(timeout_secs = timeout.as_secs(), "Disabled frontend after inactivity");
        }
    }

    /// Serve events until the queue closes
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<MenuEvent>) -> Result<()> {
        self.frontend.run()?;
        self.build_page();
        self.render_page();

        let mut idle_check = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, &mut events),
                    None => return Err(anyhow!("menu event queue closed")),
                },
                _ = idle_check.tick() => self.check_idle(),
            }
        }
    }

    fn handle_event(&mut self, event: MenuEvent, events: &mut mpsc::UnboundedReceiver<MenuEvent>) {
        match event {
            MenuEvent::KeyPressed(index) => self.handle_keypress(index),
            MenuEvent::Redraw => {
                // Collapse a burst of redraws (e.g. initial states) into one render
                let mut deferred = Vec::new();
                while let Ok(next) = events.try_recv() {
                    if next != MenuEvent::Redraw {
                        deferred.push(next);
                    }
                }
                self.render_page();
                for next in deferred {
                    self.handle_event(next, events);
                }
            }
        }
    }
}

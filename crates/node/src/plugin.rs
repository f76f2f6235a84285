//! Capability plugins.
//!
//! Plugins are registered explicitly under a unique id. The registry starts
//! them in registration order, stops them in reverse order and forwards node
//! events to every one of them.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin '{id}' is already registered")]
    Duplicate { id: String },

    #[error("plugin '{id}' failed to start: {reason}")]
    Start { id: String, reason: String },
}

impl PluginError {
    pub fn start<S: ToString>(id: impl Into<String>, reason: S) -> Self {
        Self::Start { id: id.into(), reason: reason.to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    Started { local_addr: SocketAddr },
    Stopped,
    /// A connection was closed after a failed handling cycle.
    ConnectionFailed { category: &'static str },
}

#[cfg_attr(test, mockall::automock)]
pub trait Plugin: Send + Sync {
    fn start(&self) -> Result<(), PluginError>;

    fn stop(&self);

    fn on_event(&self, event: &NodeEvent);
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<(String, Arc<dyn Plugin>)>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: impl Into<String>, plugin: Arc<dyn Plugin>) -> Result<(), PluginError> {
        let id = id.into();
        if self.get(&id).is_some() {
            return Err(PluginError::Duplicate { id });
        }
        self.plugins.push((id, plugin));
        Ok(())
    }

    pub fn unregister(&mut self, id: &str) -> Option<Arc<dyn Plugin>> {
        let index = self.plugins.iter().position(|(plugin_id, _)| plugin_id == id)?;
        Some(self.plugins.remove(index).1)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.iter().find(|(plugin_id, _)| plugin_id == id).map(|(_, plugin)| plugin)
    }

    /// Registered ids, in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.plugins.iter().map(|(id, _)| id.as_str())
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Starts every plugin in registration order.
    ///
    /// Stops at the first failure; plugins started before it are stopped
    /// again, in reverse order, before the error is returned.
    pub fn start_all(&self) -> Result<(), PluginError> {
        for (index, (id, plugin)) in self.plugins.iter().enumerate() {
            if let Err(e) = plugin.start() {
                error!(plugin_id = %id, cause = %e, "start plugin error");
                for (started_id, started) in self.plugins[..index].iter().rev() {
                    info!(plugin_id = %started_id, "stopping plugin");
                    started.stop();
                }
                return Err(e);
            }
            info!(plugin_id = %id, "plugin started");
        }
        Ok(())
    }

    /// Stops every plugin in reverse registration order.
    pub fn stop_all(&self) {
        for (id, plugin) in self.plugins.iter().rev() {
            plugin.stop();
            info!(plugin_id = %id, "plugin stopped");
        }
    }

    pub fn dispatch(&self, event: &NodeEvent) {
        for (_, plugin) in &self.plugins {
            plugin.on_event(event);
        }
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry").field("ids", &self.ids().collect::<Vec<_>>()).finish()
    }
}

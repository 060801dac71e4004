//! Named registry of services.
//!
//! Registry mutations take the write lock; lookups and snapshots take the
//! read lock. No lock is held across an `.await`: every operation clones
//! the `Service` handles it needs and releases the registry before
//! starting, stopping or sleeping.

use crate::error::{SupervisorError, SupervisorResult};
use crate::service::Service;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use warden_common::consts::RESTART_SETTLE;
use warden_common::service::{ServiceDescriptor, ServiceInfo, ServiceStatus};

#[derive(Default)]
struct Registry {
    services: HashMap<String, Service>,
    /// Registration order.
    order: Vec<String>,
}

impl Registry {
    fn snapshot(&self) -> Vec<Service> {
        self.order
            .iter()
            .filter_map(|name| self.services.get(name).cloned())
            .collect()
    }
}

/// Registry and bulk orchestration of supervised services.
pub struct Manager {
    registry: RwLock<Registry>,
    log_dir: PathBuf,
}

impl Manager {
    /// Create an empty manager. Service logs default to `log_dir`.
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        let log_dir = log_dir.into();
        if let Err(e) = std::fs::create_dir_all(&log_dir) {
            warn!("Couldn't create log directory {}: {}", log_dir.display(), e);
        }
        Self {
            registry: RwLock::new(Registry::default()),
            log_dir,
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Register a service. Zero-valued policy fields get defaults.
    ///
    /// # Errors
    ///
    /// `Configuration` if the name is taken or the descriptor is invalid.
    pub fn add_service(&self, descriptor: ServiceDescriptor) -> SupervisorResult<Service> {
        descriptor
            .validate()
            .map_err(|e| SupervisorError::Configuration(e.to_string()))?;

        let mut registry = self.registry.write();
        if registry.services.contains_key(&descriptor.name) {
            return Err(SupervisorError::Configuration(format!(
                "service {} already exists",
                descriptor.name
            )));
        }

        let service = Service::new(descriptor, &self.log_dir);
        let name = service.name().to_string();
        debug!("[{}] Registered (log: {})", name, service.log_path().display());
        registry.order.push(name.clone());
        registry.services.insert(name, service.clone());
        Ok(service)
    }

    /// Unregister a service and stop it.
    ///
    /// The entry disappears under the write lock first, so bulk operations
    /// that snapshot afterwards no longer see it; the stop itself happens
    /// outside any registry lock.
    pub async fn remove_service(&self, name: &str) -> SupervisorResult<()> {
        let service = {
            let mut registry = self.registry.write();
            let service = registry.services.remove(name).ok_or_else(|| not_found(name))?;
            registry.order.retain(|n| n != name);
            service
        };
        info!("[{}] Removing service", name);
        service.stop().await
    }

    /// Handle to a registered service.
    pub fn get_service(&self, name: &str) -> Option<Service> {
        self.registry.read().services.get(name).cloned()
    }

    /// Registered names, in registration order.
    pub fn service_names(&self) -> Vec<String> {
        self.registry.read().order.clone()
    }

    pub fn len(&self) -> usize {
        self.registry.read().services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup(&self, name: &str) -> SupervisorResult<Service> {
        self.get_service(name).ok_or_else(|| not_found(name))
    }

    pub async fn start(&self, name: &str) -> SupervisorResult<()> {
        self.lookup(name)?.start().await
    }

    pub async fn stop(&self, name: &str) -> SupervisorResult<()> {
        self.lookup(name)?.stop().await
    }

    /// Stop, wait [`RESTART_SETTLE`], start.
    pub async fn restart(&self, name: &str) -> SupervisorResult<()> {
        let service = self.lookup(name)?;
        service.stop().await?;
        tokio::time::sleep(RESTART_SETTLE).await;
        service.start().await
    }

    /// Start every registered service in registration order.
    ///
    /// Services that are already running are skipped. Stops at the first
    /// launch failure and returns it.
    pub async fn start_all(&self) -> SupervisorResult<()> {
        let services = self.registry.read().snapshot();
        for service in services {
            match service.start().await {
                Ok(()) => {}
                Err(SupervisorError::AlreadyRunning { name }) => {
                    debug!("[{}] Already running, skipping", name);
                }
                Err(e) => {
                    error!("[{}] Failed to start: {}", service.name(), e);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Stop every registered service in reverse registration order.
    ///
    /// Best effort: keeps going past failures, logs each, and returns the
    /// last error seen.
    pub async fn stop_all(&self) -> SupervisorResult<()> {
        let services = self.registry.read().snapshot();
        let mut last_err = None;
        for service in services.into_iter().rev() {
            if let Err(e) = service.stop().await {
                error!("[{}] Error stopping: {}", service.name(), e);
                last_err = Some(e);
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn get_status(&self, name: &str) -> SupervisorResult<ServiceStatus> {
        Ok(self.lookup(name)?.status())
    }

    pub fn get_all_status(&self) -> BTreeMap<String, ServiceStatus> {
        self.registry
            .read()
            .services
            .iter()
            .map(|(name, service)| (name.clone(), service.status()))
            .collect()
    }

    pub fn get_info(&self, name: &str) -> SupervisorResult<ServiceInfo> {
        Ok(self.lookup(name)?.info())
    }

    /// Info for every service, in registration order.
    pub fn get_all_info(&self) -> Vec<ServiceInfo> {
        self.registry
            .read()
            .snapshot()
            .iter()
            .map(Service::info)
            .collect()
    }
}

fn not_found(name: &str) -> SupervisorError {
    SupervisorError::NotFound {
        name: name.to_string(),
    }
}

//! Device registry
//!
//! Owns every [`Device`] found on the platform. Devices are added once with
//! their register block and then opened and closed by index.

use std::sync::{Arc, Mutex};

use log::info;

use crate::dma::AddressTranslate;
use crate::driver::config::RegistryConfig;
use crate::driver::device::{Device, DeviceShared};
use crate::driver::error::{ConfigError, Result};
use crate::driver::work::WorkDispatch;
use crate::internal::register::RegisterAccess;

/// Table of SpaceWire devices
pub struct Registry {
    config: RegistryConfig,
    dispatch: Arc<dyn WorkDispatch>,
    translator: Arc<dyn AddressTranslate>,
    devices: Mutex<Vec<Arc<Device>>>,
}

impl core::fmt::Debug for Registry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Registry")
            .field("config", &self.config)
            .field("devices", &self.device_count())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Create an empty registry.
    ///
    /// Interrupt handlers of every device post work to `dispatch`; `translator`
    /// maps buffer addresses for packets that request translation.
    pub fn new(
        config: RegistryConfig,
        dispatch: Arc<dyn WorkDispatch>,
        translator: Arc<dyn AddressTranslate>,
    ) -> Self {
        Self {
            config,
            dispatch,
            translator,
            devices: Mutex::new(Vec::new()),
        }
    }

    /// Registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Add a device and return its index.
    ///
    /// Capabilities are read from the control register here, so the core
    /// must be out of reset.
    pub fn add_device(&self, regs: Arc<dyn RegisterAccess>) -> Result<usize> {
        let mut devices = self.devices.lock()?;
        if devices.len() >= self.config.max_devices {
            return Err(ConfigError::ResourceExhausted.into());
        }

        let index = devices.len();
        let shared = DeviceShared::new(index, regs, self.translator.clone(), self.dispatch.clone());
        devices.push(Arc::new(Device::new(shared, self.config.dma)));

        info!("spw{index}: added");
        Ok(index)
    }

    /// Number of devices added
    pub fn device_count(&self) -> usize {
        self.devices.lock().map_or(0, |devices| devices.len())
    }

    /// Open device `index` for exclusive use
    pub fn open(&self, index: usize) -> Result<Arc<Device>> {
        let dev = self.device(index).ok_or(ConfigError::NotOpen)?;
        dev.open()?;
        Ok(dev)
    }

    /// Stop and close every channel of `dev` and release it
    pub fn close(&self, dev: &Device) -> Result<()> {
        dev.close()
    }

    /// Device `index`, open or not
    pub fn device(&self, index: usize) -> Option<Arc<Device>> {
        self.devices.lock().ok()?.get(index).cloned()
    }
}

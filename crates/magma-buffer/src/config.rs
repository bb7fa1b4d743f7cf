//! # Device Configuration
//!
//! Toggles and staging settings a device is created with.

use magma_mem::StagingConfig;

bitflags::bitflags! {
    /// Device behavior toggles
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Toggles: u32 {
        /// Zero buffer memory the first time the CPU can see it
        const LAZY_CLEAR_RESOURCE_ON_FIRST_USE = 1 << 0;
        /// Fill new mappings with 1 so missing initialization is visible
        const NONZERO_CLEAR_RESOURCES_ON_CREATION_FOR_TESTING = 1 << 1;
        /// Disable descriptor validation and validation-only usages
        const SKIP_VALIDATION = 1 << 2;
    }
}

/// Device configuration
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Behavior toggles
    pub toggles: Toggles,
    /// Staging pool settings
    pub staging: StagingConfig,
}

impl DeviceConfig {
    /// Default configuration with lazy clearing enabled
    pub fn new() -> Self {
        Self {
            toggles: Toggles::LAZY_CLEAR_RESOURCE_ON_FIRST_USE,
            staging: StagingConfig::default(),
        }
    }

    /// Replace the toggles
    pub fn toggles(mut self, toggles: Toggles) -> Self {
        self.toggles = toggles;
        self
    }

    /// Replace the staging settings
    pub fn staging(mut self, staging: StagingConfig) -> Self {
        self.staging = staging;
        self
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new()
    }
}

//! Settings persistence
//!
//! Loads the settings blob from flash at boot and writes it back when the
//! communication context is asked to. Only comms ever holds the store.

use defmt::*;

use crema_core::config::persistence::{self, ConfigError, MAX_BLOB_SIZE};
use crema_core::config::{MachineProfile, Settings};
use crema_hal::{FlashError, FlashStorage, StorageKey};

pub struct SettingsStore<S: FlashStorage> {
    storage: S,
}

impl<S: FlashStorage> SettingsStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Give the flash back, e.g. to the bootloader
    pub fn storage(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Stored settings, or the profile defaults if there are none usable
    ///
    /// Defaults leave the electrical limits unset, which holds the machine
    /// in SAFE until they arrive over the link.
    pub async fn load_or_default(&mut self, profile: &MachineProfile) -> Settings {
        match self.load().await {
            Ok(settings) => {
                info!(
                    "Settings loaded: brew {} steam {} env valid {}",
                    settings.brew_setpoint_x10,
                    settings.steam_setpoint_x10,
                    settings.env.is_valid()
                );
                settings
            }
            Err(ConfigError::Flash(FlashError::NotFound)) => {
                info!("No stored settings, using defaults");
                Settings::defaults(profile)
            }
            Err(e) => {
                warn!("Stored settings unusable ({:?}), using defaults", e);
                Settings::defaults(profile)
            }
        }
    }

    pub async fn load(&mut self) -> Result<Settings, ConfigError> {
        let mut blob = [0u8; MAX_BLOB_SIZE];
        let len = self
            .storage
            .read(StorageKey::MachineSettings, &mut blob)
            .await?;
        debug!("Read {} byte settings blob", len);
        persistence::decode(&blob[..len])
    }

    pub async fn save(&mut self, settings: &Settings) -> Result<(), ConfigError> {
        let mut blob = [0u8; MAX_BLOB_SIZE];
        let len = persistence::encode(settings, &mut blob)?;
        self.storage
            .write(StorageKey::MachineSettings, &blob[..len])
            .await?;
        debug!("Wrote {} byte settings blob", len);
        Ok(())
    }
}

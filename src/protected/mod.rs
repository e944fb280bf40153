//! Protected configuration pages. Reachable only through the bounds checked calls below; no image
//! or commit operation ever addresses them.

use embedded_storage::nor_flash::NorFlash;

use crate::{
    error::LoaderError,
    flash::{self, flash_error},
    hardware::Region,
    log, Address,
};

pub struct ProtectedConfig {
    banks: [Region; 2],
}

impl ProtectedConfig {
    pub const fn new(banks: [Region; 2]) -> Self {
        Self { banks }
    }

    /// The page holding all of `[address, address + length)`, if there is one.
    fn bank(&self, address: Address, length: usize, page_size: usize) -> Option<Region> {
        if length > page_size {
            return None;
        }
        self.banks
            .iter()
            .copied()
            .find(|bank| bank.contains(address, length))
    }

    /// Replace the page holding the range with `data`. Every byte of the page outside the range
    /// reads back erased afterwards.
    pub fn write<F: NorFlash>(
        &self,
        storage: &mut F,
        address: Address,
        data: &[u8],
    ) -> Result<(), LoaderError> {
        let Some(bank) = self.bank(address, data.len(), F::ERASE_SIZE) else {
            log::error!(
                "Config write of {} bytes at 0x{:x} is outside the protected pages",
                data.len(),
                address
            );
            return Err(LoaderError::FlashError);
        };
        if data.is_empty() {
            return Ok(());
        }

        log::info!("Writing {} config bytes at 0x{:x}", data.len(), address);
        flash::erase(storage, bank).map_err(flash_error)?;
        flash::write_padded(storage, address, data).map_err(flash_error)
    }

    pub fn read<F: NorFlash>(
        &self,
        storage: &mut F,
        address: Address,
        buf: &mut [u8],
    ) -> Result<(), LoaderError> {
        if self.bank(address, buf.len(), F::ERASE_SIZE).is_none() {
            log::error!(
                "Config read of {} bytes at 0x{:x} is outside the protected pages",
                buf.len(),
                address
            );
            return Err(LoaderError::FlashError);
        }
        if buf.is_empty() {
            return Ok(());
        }
        storage.read(address, buf).map_err(flash_error)
    }

    /// Write build-time defaults to the start of each page that is still erased. A page holding
    /// anything already is left alone, so seeding never clobbers a configuration.
    pub fn seed<F: NorFlash>(
        &self,
        storage: &mut F,
        defaults: &[&[u8]; 2],
    ) -> Result<(), LoaderError> {
        for (bank, data) in self.banks.iter().zip(defaults) {
            if data.is_empty() {
                continue;
            }
            let erased = flash::is_erased(storage, bank.location, bank.size as usize)
                .map_err(flash_error)?;
            if !erased {
                log::info!("Config page 0x{:x} already populated", bank.location);
                continue;
            }
            log::info!("Seeding config page 0x{:x} with defaults", bank.location);
            self.write(storage, bank.location, data)?;
        }
        Ok(())
    }
}

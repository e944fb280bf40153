use crate::{
    error::LoaderError,
    flash::{self, flash_error},
    hardware::BLOCK_SIZE,
    image, log, Address, Context,
};

use super::TwinbootManager;

impl<CONTEXT: Context> TwinbootManager<CONTEXT> {
    /// Open a download session into the image that is not running, erasing it completely.
    pub fn start_download(&mut self) -> Result<(), LoaderError> {
        if self.state.download_active {
            return Err(LoaderError::DownloadInProgress);
        }

        let target = self.state.download_target();
        if target == self.state.running {
            return Err(LoaderError::ImageRunning);
        }
        // Erasing the committed image would leave the next reset with nothing to boot but a
        // fallback. Commit the running image first.
        if self.committed_image()? == target {
            log::warn!(
                "Image {:?} is committed, refusing to erase it for a download",
                target
            );
            return Err(LoaderError::ImageRunning);
        }

        let region = self.layout.image(target);
        log::info!(
            "Starting download into image {:?} (address: 0x{:x}, size: {}K)",
            target,
            region.location,
            region.size / 1024
        );
        flash::erase(&mut self.storage, region).map_err(flash_error)?;

        self.state.download_active = true;
        Ok(())
    }

    /// Program one block run of the image being downloaded. `address` is a flash address inside
    /// the target image; it and the length must both be multiples of [`BLOCK_SIZE`].
    pub fn download_image_block(
        &mut self,
        address: Address,
        data: &[u8],
    ) -> Result<(), LoaderError> {
        if !self.state.download_active {
            return Err(LoaderError::DownloadNotStarted);
        }

        let region = self.layout.image(self.state.download_target());
        if !region.contains(address, data.len()) {
            log::error!(
                "Block of {} bytes at 0x{:x} is outside image 0x{:x}..0x{:x}",
                data.len(),
                address,
                region.location,
                region.end()
            );
            return Err(LoaderError::FlashError);
        }
        if address as usize % BLOCK_SIZE != 0 || data.len() % BLOCK_SIZE != 0 {
            log::error!(
                "Block of {} bytes at 0x{:x} is not {}-byte aligned",
                data.len(),
                address,
                BLOCK_SIZE
            );
            return Err(LoaderError::FlashError);
        }
        if data.is_empty() {
            return Ok(());
        }

        flash::write(&mut self.storage, address, data).map_err(flash_error)
    }

    /// Close the session. The partial image stays in flash until the next `start_download`.
    pub fn abort_upgrade(&mut self) -> Result<(), LoaderError> {
        if !self.state.download_active {
            return Err(LoaderError::DownloadNotStarted);
        }
        log::info!("Download aborted");
        self.state.download_active = false;
        Ok(())
    }

    /// Close the session and check the downloaded image. The session is closed whatever the
    /// outcome, so a failed image can simply be downloaded again.
    pub fn complete_download(&mut self) -> Result<(), LoaderError> {
        if !self.state.download_active {
            return Err(LoaderError::DownloadNotStarted);
        }
        self.state.download_active = false;

        let target = self.state.download_target();
        if image::validate(&mut self.storage, self.layout.image(target)) {
            log::info!("Image {:?} downloaded and valid", target);
            Ok(())
        } else {
            log::warn!("Downloaded image {:?} is not valid", target);
            Err(LoaderError::ImageNotValid)
        }
    }
}

mod download;

use crate::{
    error::{InitError, LoaderError},
    flash::flash_error,
    hardware::{processor::Processor, Image, Layout},
    image::{self, ImageStatus},
    protected::ProtectedConfig,
    state::{commit::CommitLog, LoaderState, StatusReport},
    version, Address, Context,
};

use crate::log;

/// Instantiate this in your application to download, run and commit images and to reach the
/// protected configuration pages. Every operation returns `Ok` on success or the
/// [`LoaderError`] describing why nothing (or only the documented part) happened.
pub struct TwinbootManager<CONTEXT: Context> {
    layout: Layout,
    storage: CONTEXT::Storage,
    processor: CONTEXT::Processor,
    state: LoaderState,
    commit_log: CommitLog,
    protected: ProtectedConfig,
}

impl<CONTEXT: Context> TwinbootManager<CONTEXT> {
    /// `state` normally comes from the boot decision, or `LoaderState::new(image)` in an
    /// application that knows which slot it was linked for.
    pub fn new(
        layout: Layout,
        mut storage: CONTEXT::Storage,
        processor: CONTEXT::Processor,
        state: LoaderState,
    ) -> Result<Self, InitError> {
        if let Err(err) = layout.check(&storage) {
            log::error!("Invalid flash layout: {:?}", err);
            return Err(err.into());
        }

        if !image::validate(&mut storage, layout.image(state.running)) {
            log::error!(
                "Loader state names image {:?} as running, but it is not valid",
                state.running
            );
            return Err(InitError::UntrustedState);
        }

        Ok(Self {
            layout,
            storage,
            processor,
            state,
            commit_log: CommitLog::new(layout.commit_log),
            protected: ProtectedConfig::new(layout.protected),
        })
    }

    /// Destroy this instance of the manager and return access to the hardware peripherals
    pub fn destroy(self) -> (CONTEXT::Storage, CONTEXT::Processor) {
        (self.storage, self.processor)
    }

    pub fn state(&self) -> LoaderState {
        self.state
    }

    pub fn committed_image(&mut self) -> Result<Image, LoaderError> {
        self.commit_log
            .committed_image(&mut self.storage)
            .map_err(flash_error)
    }

    /// Make `image` the running image without handing off to it. Any download session is over
    /// once another image starts, so it is closed here.
    pub fn select_image(&mut self, image: Image) -> Result<(), LoaderError> {
        if self.state.download_active && self.state.download_target() == image {
            log::warn!("Image {:?} is being downloaded, refusing to run it", image);
            return Err(LoaderError::DownloadInProgress);
        }

        let region = self.layout.image(image);
        if image != self.state.running && !image::validate(&mut self.storage, region) {
            log::warn!("Image {:?} is not valid, refusing to run it", image);
            return Err(LoaderError::ImageNotValid);
        }

        self.state.running = image;
        self.state.download_active = false;
        Ok(())
    }

    /// Select `image` and transfer control to it. Only returns on error.
    pub fn run_image(&mut self, image: Image) -> Result<void::Void, LoaderError> {
        self.select_image(image)?;

        let address = self.layout.entry(image);
        log::info!("Running image {:?} at 0x{:x}", image, address);
        self.processor.hand_off(address)
    }

    pub fn run_image_a(&mut self) -> Result<void::Void, LoaderError> {
        self.run_image(Image::A)
    }

    pub fn run_image_b(&mut self) -> Result<void::Void, LoaderError> {
        self.run_image(Image::B)
    }

    /// Record `image` as the one to boot after the next reset. Only the running image can be
    /// committed, which also rules out the target of an open download.
    pub fn commit_image(&mut self, image: Image) -> Result<(), LoaderError> {
        if self.state.download_active && self.state.download_target() == image {
            return Err(LoaderError::DownloadInProgress);
        }

        if self.committed_image()? == image {
            log::info!("Image {:?} is already committed", image);
            return Ok(());
        }

        if image != self.state.running {
            log::warn!(
                "Image {:?} has not been run yet, run it before committing",
                image
            );
            return Err(LoaderError::ImageNotValid);
        }

        self.commit_log
            .commit(&mut self.storage, image)
            .map_err(flash_error)?;
        Ok(())
    }

    pub fn commit_image_a(&mut self) -> Result<(), LoaderError> {
        self.commit_image(Image::A)
    }

    pub fn commit_image_b(&mut self) -> Result<(), LoaderError> {
        self.commit_image(Image::B)
    }

    /// Running image, committed image and the contents of both slots. The target of an open
    /// download is never reported valid.
    pub fn image_status(&mut self) -> Result<StatusReport, LoaderError> {
        let committed = self.committed_image()?;
        let a = self.slot_status(Image::A);
        let b = self.slot_status(Image::B);
        Ok(StatusReport::new(self.state.running, committed, a, b))
    }

    fn slot_status(&mut self, image: Image) -> ImageStatus {
        let status = image::status(&mut self.storage, self.layout.image(image));
        if self.state.download_active
            && self.state.download_target() == image
            && status == ImageStatus::Valid
        {
            ImageStatus::Invalid
        } else {
            status
        }
    }

    /// `major << 8 | minor`
    pub fn version(&self) -> u32 {
        version::version()
    }

    /// `year << 16 | month << 8 | day`, two digit year
    pub fn build_date(&self) -> u32 {
        version::build_date()
    }

    pub fn flash_config_write(
        &mut self,
        address: Address,
        data: &[u8],
    ) -> Result<(), LoaderError> {
        self.protected.write(&mut self.storage, address, data)
    }

    pub fn flash_config_read(
        &mut self,
        address: Address,
        buf: &mut [u8],
    ) -> Result<(), LoaderError> {
        self.protected.read(&mut self.storage, address, buf)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::vec::Vec;

    use super::*;
    use crate::mock::{install_image, layout, MockFlash, MockProcessor, TestContext};

    pub(crate) fn payload(seed: u8, len: usize) -> Vec<u8> {
        (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
    }

    /// Manager running `running`, with valid images in the given slots.
    pub(crate) fn manager(running: Image, valid: &[Image]) -> TwinbootManager<TestContext> {
        let mut flash = MockFlash::new();
        for image in valid {
            install_image(&mut flash, layout().image(*image), &payload(*image as u8, 200));
        }
        TwinbootManager::new(layout(), flash, MockProcessor, LoaderState::new(running))
            .unwrap()
    }

    #[test]
    fn new_rejects_an_invalid_running_image() {
        let result = TwinbootManager::<TestContext>::new(
            layout(),
            MockFlash::new(),
            MockProcessor,
            LoaderState::new(Image::A),
        );
        assert!(matches!(result, Err(InitError::UntrustedState)));
    }

    #[test]
    fn new_rejects_a_bad_layout() {
        let mut bad = layout();
        bad.image_b = bad.image_a;
        let result = TwinbootManager::<TestContext>::new(
            bad,
            MockFlash::new(),
            MockProcessor,
            LoaderState::new(Image::A),
        );
        assert!(matches!(result, Err(InitError::Layout(_))));
    }

    #[test]
    fn select_refuses_an_invalid_image() {
        let mut manager = manager(Image::A, &[Image::A]);
        assert_eq!(
            manager.select_image(Image::B),
            Err(LoaderError::ImageNotValid)
        );
        assert_eq!(manager.state().running, Image::A);
        assert_eq!(manager.select_image(Image::A), Ok(()));
    }

    #[test]
    fn select_refuses_the_download_target() {
        let mut manager = manager(Image::A, &[Image::A, Image::B]);
        manager.start_download().unwrap();
        assert_eq!(
            manager.select_image(Image::B),
            Err(LoaderError::DownloadInProgress)
        );
        assert!(manager.state().download_active);
    }

    #[test]
    fn selecting_the_running_image_closes_the_session() {
        let mut manager = manager(Image::A, &[Image::A]);
        manager.start_download().unwrap();
        manager.select_image(Image::A).unwrap();
        assert!(!manager.state().download_active);
    }

    #[test]
    #[should_panic(expected = "hand-off to 0x10000800")]
    fn run_hands_off_to_the_image_entry() {
        let mut manager = manager(Image::A, &[Image::A, Image::B]);
        let _ = manager.run_image_b();
    }

    #[test]
    fn run_returns_errors_without_hand_off() {
        let mut manager = manager(Image::B, &[Image::B]);
        assert!(matches!(
            manager.run_image_a(),
            Err(LoaderError::ImageNotValid)
        ));
    }

    #[test]
    fn committing_the_committed_image_succeeds_without_writing() {
        let mut manager = manager(Image::A, &[Image::A]);
        assert_eq!(manager.commit_image_a(), Ok(()));
        let (flash, _) = manager.destroy();
        assert_eq!(flash.writes(), 0);
    }

    #[test]
    fn only_the_running_image_can_be_committed() {
        let mut manager = manager(Image::A, &[Image::A, Image::B]);
        assert_eq!(manager.commit_image_b(), Err(LoaderError::ImageNotValid));

        manager.select_image(Image::B).unwrap();
        assert_eq!(manager.commit_image_b(), Ok(()));
        assert_eq!(manager.committed_image(), Ok(Image::B));

        manager.select_image(Image::A).unwrap();
        assert_eq!(manager.commit_image_a(), Ok(()));
        assert_eq!(manager.committed_image(), Ok(Image::A));
    }

    #[test]
    fn commit_refuses_the_download_target() {
        let mut manager = manager(Image::A, &[Image::A]);
        manager.start_download().unwrap();
        assert_eq!(
            manager.commit_image_b(),
            Err(LoaderError::DownloadInProgress)
        );
    }

    #[test]
    fn commit_write_failure_is_a_flash_error() {
        let mut flash = MockFlash::new();
        install_image(&mut flash, layout().image_a, &payload(1, 64));
        install_image(&mut flash, layout().image_b, &payload(2, 64));
        flash.fail_writes(true);
        let mut manager = TwinbootManager::<TestContext>::new(
            layout(),
            flash,
            MockProcessor,
            LoaderState::new(Image::B),
        )
        .unwrap();
        assert_eq!(manager.commit_image_b(), Err(LoaderError::FlashError));
    }

    #[test]
    fn status_reports_empty_and_invalid_slots() {
        let mut manager = manager(Image::A, &[Image::A]);
        let report = manager.image_status().unwrap();
        assert_eq!(report.active_commit_status, 0x00);
        assert_eq!(report.image_status, 0x10);

        manager.start_download().unwrap();
        manager
            .download_image_block(layout().image_b.location, &[0x11; 32])
            .unwrap();
        let report = manager.image_status().unwrap();
        assert_eq!(report.image(Image::B), Some(ImageStatus::Invalid));
    }

    #[test]
    fn status_never_reports_an_open_download_as_valid() {
        let mut manager = manager(Image::A, &[Image::A]);
        manager.start_download().unwrap();
        let image = crate::mock::image_bytes(layout().image_b, &payload(9, 128));
        manager
            .download_image_block(layout().image_b.location, &image)
            .unwrap();
        assert_eq!(
            manager.image_status().unwrap().image(Image::B),
            Some(ImageStatus::Invalid)
        );

        manager.complete_download().unwrap();
        assert_eq!(
            manager.image_status().unwrap().image(Image::B),
            Some(ImageStatus::Valid)
        );
    }

    #[test]
    fn version_packs_major_and_minor() {
        let manager = manager(Image::A, &[Image::A]);
        assert_eq!(manager.version(), 0x0001);
    }

    #[test]
    fn config_access_goes_through_the_protected_store() {
        let mut manager = manager(Image::A, &[Image::A]);
        let address = layout().protected[0].location + 16;
        manager.flash_config_write(address, b"calibration").unwrap();

        let mut buf = [0_u8; 11];
        manager.flash_config_read(address, &mut buf).unwrap();
        assert_eq!(&buf, b"calibration");

        assert_eq!(
            manager.flash_config_write(layout().image_a.location, b"x"),
            Err(LoaderError::FlashError)
        );
        assert_eq!(manager.committed_image(), Ok(Image::A));
    }
}

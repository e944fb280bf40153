use crate::{
    error::InitError,
    hardware::{processor::Processor, Image, Layout},
    image,
    protected::ProtectedConfig,
    state::{commit::CommitLog, LoaderState},
    Context,
};

use crate::log;

#[cfg(feature = "use-defmt")]
use defmt::Format;

/// How the image to boot was chosen.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootKind {
    /// The commit log was empty; the chosen image has just been committed
    FirstBoot,
    /// The committed image is valid
    Committed,
    /// The committed image is not valid, the other one is booted without committing it
    Fallback,
}

#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootDecision {
    pub image: Image,
    pub kind: BootKind,
}

impl BootDecision {
    /// Loader state to hand to the manager once `image` runs.
    pub fn state(&self) -> LoaderState {
        LoaderState::new(self.image)
    }
}

#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// Neither image slot holds a valid image
    NoValidImage,
}

/// Use this from your loader's reset path and call boot() to pick an image from the commit log
/// and jump to it.
pub struct TwinbootBoot<'a, CONTEXT: Context> {
    layout: Layout,
    storage: CONTEXT::Storage,
    processor: CONTEXT::Processor,
    defaults: [&'a [u8]; 2],
}

impl<'a, CONTEXT: Context> TwinbootBoot<'a, CONTEXT> {
    /// `defaults` is written to each protected page that is still erased on the first boot.
    pub fn new(
        layout: Layout,
        storage: CONTEXT::Storage,
        processor: CONTEXT::Processor,
        defaults: [&'a [u8]; 2],
    ) -> Result<Self, InitError> {
        if let Err(err) = layout.check(&storage) {
            log::error!("Invalid flash layout: {:?}", err);
            return Err(err.into());
        }

        Ok(Self {
            layout,
            storage,
            processor,
            defaults,
        })
    }

    /// Destroy this instance of the loader and return access to the hardware peripherals
    pub fn destroy(self) -> (CONTEXT::Storage, CONTEXT::Processor) {
        (self.storage, self.processor)
    }

    fn valid(&mut self, image: Image) -> bool {
        image::validate(&mut self.storage, self.layout.image(image))
    }

    /// Choose the image to boot. Only writes to flash on the first boot of a device, to seed the
    /// protected pages and record the first commit.
    pub fn decide(&mut self) -> Result<BootDecision, BootError> {
        let commit_log = CommitLog::new(self.layout.commit_log);

        let empty = match commit_log.is_empty(&mut self.storage) {
            Ok(empty) => empty,
            Err(_) => {
                log::error!("Could not read the commit log, assuming image A is committed");
                false
            }
        };

        if empty {
            self.first_boot(&commit_log)
        } else {
            let committed = commit_log
                .committed_image(&mut self.storage)
                .unwrap_or(Image::A);
            self.normal_boot(committed)
        }
    }

    fn first_boot(&mut self, commit_log: &CommitLog) -> Result<BootDecision, BootError> {
        log::info!("Commit log is empty, first boot");

        let protected = ProtectedConfig::new(self.layout.protected);
        if let Err(err) = protected.seed(&mut self.storage, &self.defaults) {
            log::error!("Could not seed the protected configuration: {:?}", err);
        }

        let image = if self.valid(Image::A) {
            Image::A
        } else if self.valid(Image::B) {
            Image::B
        } else {
            log::error!("No valid image on first boot");
            return Err(BootError::NoValidImage);
        };

        if commit_log.commit(&mut self.storage, image).is_err() {
            log::error!("Could not commit image {:?}, booting it anyway", image);
        }

        Ok(BootDecision {
            image,
            kind: BootKind::FirstBoot,
        })
    }

    fn normal_boot(&mut self, committed: Image) -> Result<BootDecision, BootError> {
        log::info!("Image {:?} is committed", committed);

        if self.valid(committed) {
            return Ok(BootDecision {
                image: committed,
                kind: BootKind::Committed,
            });
        }

        let other = committed.other();
        log::warn!(
            "Committed image {:?} is not valid, trying image {:?}",
            committed,
            other
        );
        if self.valid(other) {
            Ok(BootDecision {
                image: other,
                kind: BootKind::Fallback,
            })
        } else {
            log::error!("Neither image is valid");
            Err(BootError::NoValidImage)
        }
    }

    /// Decide and hand off to the chosen image, or halt when there is none.
    pub fn boot(&mut self) -> ! {
        log::info!("Booting with twinboot!");

        self.processor.setup(&self.layout);

        match self.decide() {
            Ok(decision) => {
                let address = self.layout.entry(decision.image);
                log::info!(
                    "Jumping to image {:?} at 0x{:x} ({:?})",
                    decision.image,
                    address,
                    decision.kind
                );
                self.processor.hand_off(address)
            }
            Err(err) => {
                log::error!("Nothing to boot: {:?}", err);
                self.processor.halt()
            }
        }
    }
}

pub mod commit;

use crate::{hardware::Image, image::ImageStatus};

#[cfg(feature = "use-defmt")]
use defmt::Format;
#[cfg(feature = "derive")]
use serde::{Deserialize, Serialize};

/// Volatile state of the loader. Built from the boot decision on every reset; the committed
/// image is deliberately absent, it is always derived from the commit log.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[cfg_attr(feature = "derive", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderState {
    /// Image currently executing
    pub running: Image,
    /// Whether a download session into the other image is open
    pub download_active: bool,
}

impl LoaderState {
    pub const fn new(running: Image) -> Self {
        Self {
            running,
            download_active: false,
        }
    }

    /// The only image a download may ever write to.
    pub const fn download_target(&self) -> Image {
        self.running.other()
    }
}

const RUN_B: u8 = 0x80;
const COMMIT_B: u8 = 0x40;
const IMAGE_A_SHIFT: u8 = 4;
const IMAGE_B_SHIFT: u8 = 0;
const IMAGE_MASK: u8 = 0x3;

/// Packed status bytes as reported to the console front-end.
///
/// `active_commit_status`: bit 7 is the running image, bit 6 the committed image (0 = A, 1 = B).
/// `image_status`: bits 5:4 hold the status of image A, bits 1:0 the status of image B.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusReport {
    pub active_commit_status: u8,
    pub image_status: u8,
}

impl StatusReport {
    pub fn new(running: Image, committed: Image, a: ImageStatus, b: ImageStatus) -> Self {
        let mut active_commit_status = 0;
        if running == Image::B {
            active_commit_status |= RUN_B;
        }
        if committed == Image::B {
            active_commit_status |= COMMIT_B;
        }
        Self {
            active_commit_status,
            image_status: (a.bits() << IMAGE_A_SHIFT) | (b.bits() << IMAGE_B_SHIFT),
        }
    }

    pub fn running(&self) -> Image {
        if self.active_commit_status & RUN_B != 0 {
            Image::B
        } else {
            Image::A
        }
    }

    pub fn committed(&self) -> Image {
        if self.active_commit_status & COMMIT_B != 0 {
            Image::B
        } else {
            Image::A
        }
    }

    pub fn image(&self, image: Image) -> Option<ImageStatus> {
        let shift = match image {
            Image::A => IMAGE_A_SHIFT,
            Image::B => IMAGE_B_SHIFT,
        };
        ImageStatus::from_bits((self.image_status >> shift) & IMAGE_MASK)
    }
}

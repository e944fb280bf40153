pub mod processor;

use embedded_storage::nor_flash::NorFlash;

use crate::{image::FOOTER_SIZE, state::commit::RECORD_SIZE, Address};

#[cfg(feature = "use-defmt")]
use defmt::Format;
#[cfg(feature = "derive")]
use serde::{Deserialize, Serialize};

/// Write granularity of the download protocol and of every record the loader writes.
pub const BLOCK_SIZE: usize = 16;

/// One of the two firmware image slots.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[cfg_attr(feature = "derive", derive(Serialize, Deserialize))]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Image {
    A,
    B,
}

impl Image {
    /// The slot that is not `self`.
    pub const fn other(self) -> Image {
        match self {
            Image::A => Image::B,
            Image::B => Image::A,
        }
    }
}

/// A contiguous range of the flash device, addressed by offset from the start of the device.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[cfg_attr(feature = "derive", derive(Serialize, Deserialize))]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Region {
    /// Starting offset of this region
    pub location: Address,
    /// Size of this region in bytes
    pub size: Address,
}

impl Region {
    pub const fn new(location: Address, size: Address) -> Self {
        Self { location, size }
    }

    /// First offset past the end of this region. Saturates instead of wrapping.
    pub const fn end(&self) -> Address {
        self.location.saturating_add(self.size)
    }

    /// Whether `[address, address + length)` lies entirely within this region.
    ///
    /// This is the only bounds check used for caller supplied ranges; it never wraps.
    pub fn contains(&self, address: Address, length: usize) -> bool {
        let Ok(length) = Address::try_from(length) else {
            return false;
        };
        match address.checked_add(length) {
            Some(end) => address >= self.location && end <= self.end(),
            None => false,
        }
    }

    fn overlaps(&self, other: &Region) -> bool {
        self.location < other.end() && other.location < self.end()
    }
}

/// Reasons a [`Layout`] cannot be used with a given flash device.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum LayoutError {
    /// `BLOCK_SIZE` is not a multiple of the write size, or the page is not a multiple of it
    BlockSize,
    /// A region is empty or does not start and end on a page boundary
    Misaligned(Region),
    /// A region reaches past the end of the device
    OutOfBounds(Region),
    /// Two regions share at least one byte
    Overlap(Region, Region),
    /// A protected configuration region is not exactly one page
    ProtectedPageSize(Region),
    /// The commit log cannot hold an even number of records
    CommitLogSize,
    /// An image region has no room for a payload in front of its footer
    ImageTooSmall(Image),
}

/// Static partition of the flash device.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[cfg_attr(feature = "derive", derive(Serialize, Deserialize))]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Layout {
    /// region the loader itself lives in
    pub bootloader: Region,
    /// one configuration page per bank, never touched by image or commit operations
    pub protected: [Region; 2],
    /// append-only record of which image is committed
    pub commit_log: Region,
    /// first image slot, footer included
    pub image_a: Region,
    /// second image slot, footer included
    pub image_b: Region,
    /// address the flash device is mapped at, used for the hand-off
    pub flash_origin: Address,
}

impl Layout {
    /// Region backing the given image slot.
    pub const fn image(&self, image: Image) -> Region {
        match image {
            Image::A => self.image_a,
            Image::B => self.image_b,
        }
    }

    /// Execution address of the given image slot.
    pub const fn entry(&self, image: Image) -> Address {
        self.flash_origin.wrapping_add(self.image(image).location)
    }

    fn regions(&self) -> [Region; 6] {
        [
            self.bootloader,
            self.protected[0],
            self.protected[1],
            self.commit_log,
            self.image_a,
            self.image_b,
        ]
    }

    /// Check this layout against the geometry of `storage`.
    pub fn check<F: NorFlash>(&self, storage: &F) -> Result<(), LayoutError> {
        let page = F::ERASE_SIZE as Address;

        if F::WRITE_SIZE == 0 || BLOCK_SIZE % F::WRITE_SIZE != 0 || F::ERASE_SIZE % BLOCK_SIZE != 0
        {
            return Err(LayoutError::BlockSize);
        }

        let capacity = storage.capacity();
        let regions = self.regions();
        for (index, region) in regions.iter().enumerate() {
            if region.size == 0 || region.location % page != 0 || region.size % page != 0 {
                return Err(LayoutError::Misaligned(*region));
            }
            match region.location.checked_add(region.size) {
                Some(end) if end as usize <= capacity => {}
                _ => return Err(LayoutError::OutOfBounds(*region)),
            }
            if let Some(other) = regions[index + 1..].iter().find(|o| region.overlaps(o)) {
                return Err(LayoutError::Overlap(*region, *other));
            }
        }

        if let Some(region) = self.protected.iter().find(|r| r.size != page) {
            return Err(LayoutError::ProtectedPageSize(*region));
        }

        let record_pair = 2 * RECORD_SIZE as Address;
        if self.commit_log.location % record_pair != 0 || self.commit_log.size % record_pair != 0 {
            return Err(LayoutError::CommitLogSize);
        }

        for image in [Image::A, Image::B] {
            if self.image(image).size as usize <= FOOTER_SIZE {
                return Err(LayoutError::ImageTooSmall(image));
            }
        }

        Ok(())
    }
}

/// Where flash and RAM are mapped on the target, for linker script generation.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[cfg_attr(feature = "derive", derive(Serialize, Deserialize))]
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct LinkerConfig {
    pub ram_origin: Address,
    pub ram_length: Address,
}

//! Append-only record of the committed image.
//!
//! The log is a run of 16-byte slots filled from the top of its region downwards. A written
//! slot is all zeros; the newest record is the lowest written slot, and bit 4 of its address
//! names the image (set = A, clear = B). Writing a record is a single block program, so a power
//! loss leaves at most one torn slot. Torn slots are not counted as written: the previous
//! record stands and the next commit programs the same slot again.

use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};

use crate::{
    flash,
    hardware::{Image, Region},
    log, Address,
};

/// Size of a commit record slot.
pub const RECORD_SIZE: usize = 16;

const RECORD_PARITY: Address = 0x10;
const WRITTEN: [u8; RECORD_SIZE] = [0; RECORD_SIZE];

pub struct CommitLog {
    region: Region,
}

impl CommitLog {
    pub const fn new(region: Region) -> Self {
        Self { region }
    }

    fn last_slot(&self) -> Address {
        self.region.end() - RECORD_SIZE as Address
    }

    /// Image a record written at `address` stands for.
    pub const fn image_at(address: Address) -> Image {
        if address & RECORD_PARITY != 0 {
            Image::A
        } else {
            Image::B
        }
    }

    /// Address of the newest durable record, if any.
    fn newest<F: ReadNorFlash>(&self, storage: &mut F) -> Result<Option<Address>, F::Error> {
        let mut record = [0_u8; RECORD_SIZE];
        let mut address = self.region.location;
        while address < self.region.end() {
            storage.read(address, &mut record)?;
            if record == WRITTEN {
                return Ok(Some(address));
            }
            if record.iter().any(|b| *b != 0xFF) {
                log::warn!("Ignoring torn commit record at 0x{:x}", address);
            }
            address += RECORD_SIZE as Address;
        }
        Ok(None)
    }

    /// Whether no record has ever been committed since the log was last erased.
    pub fn is_empty<F: ReadNorFlash>(&self, storage: &mut F) -> Result<bool, F::Error> {
        Ok(self.newest(storage)?.is_none())
    }

    /// Image recorded by the newest record; `A` when the log is empty.
    pub fn committed_image<F: ReadNorFlash>(&self, storage: &mut F) -> Result<Image, F::Error> {
        Ok(self
            .newest(storage)?
            .map(Self::image_at)
            .unwrap_or(Image::A))
    }

    /// Slot the next record goes to. When the lowest slot is already written the log is full and
    /// is erased here, dropping its history, before the topmost slot is handed out.
    pub fn next_slot<F: NorFlash>(&self, storage: &mut F) -> Result<Address, F::Error> {
        match self.newest(storage)? {
            Some(address) if address == self.region.location => {
                log::info!("Commit log full, erasing it");
                flash::erase(storage, self.region)?;
                Ok(self.last_slot())
            }
            Some(address) => Ok(address - RECORD_SIZE as Address),
            None => Ok(self.last_slot()),
        }
    }

    /// Record `image` as committed. Returns `false` without touching flash when the newest record
    /// already names it.
    pub fn commit<F: NorFlash>(&self, storage: &mut F, image: Image) -> Result<bool, F::Error> {
        if let Some(address) = self.newest(storage)? {
            if Self::image_at(address) == image {
                log::info!("Image {:?} is already committed", image);
                return Ok(false);
            }
        }

        let mut slot = self.next_slot(storage)?;
        if Self::image_at(slot) != image {
            // Only on an empty log: the topmost slot always stands for A.
            slot -= RECORD_SIZE as Address;
        }

        log::info!("Committing image {:?} at 0x{:x}", image, slot);
        flash::write(storage, slot, &WRITTEN)?;
        Ok(true)
    }
}

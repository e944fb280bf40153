use embedded_storage::nor_flash::ReadNorFlash;

use crc::{Crc, CRC_32_ISO_HDLC};
#[cfg(feature = "use-defmt")]
use defmt::Format;
#[cfg(feature = "derive")]
use serde::{Deserialize, Serialize};

use crate::{
    flash::{self, CHUNK_SIZE},
    hardware::Region,
    log, Address,
};

/// Size of the trailer at the end of every image region.
pub const FOOTER_SIZE: usize = 16;

const FOOTER_CRC: core::ops::Range<usize> = 8..12;
const FOOTER_LENGTH: core::ops::Range<usize> = 12..16;

/// Reflected 0xEDB88320 polynomial, initial value and final XOR of 0xFFFFFFFF.
pub const IMAGE_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Trailer written by the build into the last 16 bytes of an image region:
/// 8 reserved bytes, then the payload CRC-32 and the payload length, both little-endian.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageFooter {
    pub crc: u32,
    pub length: u32,
}

impl ImageFooter {
    /// Footer describing `payload`.
    pub fn for_payload(payload: &[u8]) -> Self {
        Self {
            crc: IMAGE_CRC.checksum(payload),
            length: payload.len() as u32,
        }
    }

    pub fn decode(bytes: &[u8; FOOTER_SIZE]) -> Self {
        let mut crc = [0_u8; 4];
        let mut length = [0_u8; 4];
        crc.copy_from_slice(&bytes[FOOTER_CRC]);
        length.copy_from_slice(&bytes[FOOTER_LENGTH]);
        Self {
            crc: u32::from_le_bytes(crc),
            length: u32::from_le_bytes(length),
        }
    }

    /// Reserved bytes are left erased.
    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut bytes = [0xFF_u8; FOOTER_SIZE];
        bytes[FOOTER_CRC].copy_from_slice(&self.crc.to_le_bytes());
        bytes[FOOTER_LENGTH].copy_from_slice(&self.length.to_le_bytes());
        bytes
    }
}

/// What an image region currently holds.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[cfg_attr(feature = "derive", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    /// The region is entirely erased
    NoImage = 0,
    /// Footer and payload CRC agree
    Valid = 1,
    /// Anything else, including a partially downloaded image
    Invalid = 2,
}

impl ImageStatus {
    pub const fn bits(self) -> u8 {
        self as u8
    }

    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(ImageStatus::NoImage),
            1 => Some(ImageStatus::Valid),
            2 => Some(ImageStatus::Invalid),
            _ => None,
        }
    }
}

/// Address of the footer of an image region.
pub const fn footer_address(region: Region) -> Address {
    region.location + region.size - FOOTER_SIZE as Address
}

pub fn read_footer<F: ReadNorFlash>(
    storage: &mut F,
    region: Region,
) -> Result<ImageFooter, F::Error> {
    let mut bytes = [0_u8; FOOTER_SIZE];
    storage.read(footer_address(region), &mut bytes)?;
    Ok(ImageFooter::decode(&bytes))
}

fn payload_crc<F: ReadNorFlash>(
    storage: &mut F,
    location: Address,
    length: u32,
) -> Result<u32, F::Error> {
    let mut digest = IMAGE_CRC.digest();
    let mut buf = [0_u8; CHUNK_SIZE];
    let end = location + length;
    let mut address = location;
    while address < end {
        let len = CHUNK_SIZE.min((end - address) as usize);
        storage.read(address, &mut buf[..len])?;
        digest.update(&buf[..len]);
        address += len as Address;
    }
    Ok(digest.finalize())
}

fn inspect<F: ReadNorFlash>(storage: &mut F, region: Region) -> Result<ImageStatus, F::Error> {
    // An erased region is never valid, whatever its footer happens to say.
    if flash::is_erased(storage, region.location, region.size as usize)? {
        return Ok(ImageStatus::NoImage);
    }

    let footer = read_footer(storage, region)?;
    let max_length = region.size - FOOTER_SIZE as Address;
    if footer.length > max_length {
        log::trace!(
            "Image at 0x{:x} claims {} bytes, at most {} fit",
            region.location,
            footer.length,
            max_length
        );
        return Ok(ImageStatus::Invalid);
    }

    let crc = payload_crc(storage, region.location, footer.length)?;
    if crc == footer.crc {
        Ok(ImageStatus::Valid)
    } else {
        log::trace!(
            "Image at 0x{:x}: CRC 0x{:x}, footer expects 0x{:x}",
            region.location,
            crc,
            footer.crc
        );
        Ok(ImageStatus::Invalid)
    }
}

/// Classify the contents of an image region. Read failures count as an invalid image.
pub fn status<F: ReadNorFlash>(storage: &mut F, region: Region) -> ImageStatus {
    match inspect(storage, region) {
        Ok(status) => status,
        Err(_) => {
            log::error!("Could not read image at 0x{:x}", region.location);
            ImageStatus::Invalid
        }
    }
}

/// Whether the image region holds a payload matching its footer. Never fails, never writes.
pub fn validate<F: ReadNorFlash>(storage: &mut F, region: Region) -> bool {
    status(storage, region) == ImageStatus::Valid
}

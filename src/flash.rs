//! Thin layer over the `NorFlash` capability. Every mutation runs inside a critical section so
//! interrupts stay masked while the controller is busy and are restored on every exit path.

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash};

use crate::{
    error::LoaderError,
    hardware::{Region, BLOCK_SIZE},
    log, Address,
};

/// Size of the RAM buffer used when streaming flash contents.
pub(crate) const CHUNK_SIZE: usize = 64;

const ERASED: u8 = 0xFF;

pub(crate) fn erase<F: NorFlash>(storage: &mut F, region: Region) -> Result<(), F::Error> {
    log::trace!(
        "Erasing 0x{:x}..0x{:x}",
        region.location,
        region.end()
    );
    critical_section::with(|_| storage.erase(region.location, region.end()))
}

pub(crate) fn write<F: NorFlash>(
    storage: &mut F,
    address: Address,
    data: &[u8],
) -> Result<(), F::Error> {
    log::trace!("Writing {} bytes at 0x{:x}", data.len(), address);
    critical_section::with(|_| storage.write(address, data))
}

/// Write `data` at an address that need not be block aligned, into flash that is known to be
/// erased. The bytes around `data` inside each touched block are written as `0xFF`.
pub(crate) fn write_padded<F: NorFlash>(
    storage: &mut F,
    address: Address,
    data: &[u8],
) -> Result<(), F::Error> {
    let block_size = BLOCK_SIZE as Address;
    let end = address + data.len() as Address;
    let mut cursor = address - address % block_size;
    let mut block = [ERASED; BLOCK_SIZE];

    while cursor < end {
        for (index, byte) in block.iter_mut().enumerate() {
            let at = cursor + index as Address;
            *byte = if (address..end).contains(&at) {
                data[(at - address) as usize]
            } else {
                ERASED
            };
        }
        // Nothing to program, the block already reads back erased.
        if block.iter().any(|b| *b != ERASED) {
            write(storage, cursor, &block)?;
        }
        cursor += block_size;
    }

    Ok(())
}

/// Whether `[address, address + length)` reads back as erased flash.
pub(crate) fn is_erased<F: ReadNorFlash>(
    storage: &mut F,
    address: Address,
    length: usize,
) -> Result<bool, F::Error> {
    let mut buf = [0_u8; CHUNK_SIZE];
    let mut offset = 0;
    while offset < length {
        let len = CHUNK_SIZE.min(length - offset);
        storage.read(address + offset as Address, &mut buf[..len])?;
        if buf[..len].iter().any(|b| *b != ERASED) {
            return Ok(false);
        }
        offset += len;
    }
    Ok(true)
}

fn describe(kind: NorFlashErrorKind) -> &'static str {
    match kind {
        NorFlashErrorKind::NotAligned => "not aligned",
        NorFlashErrorKind::OutOfBounds => "out of bounds",
        _ => "other",
    }
}

/// Log a flash controller error and fold it into [`LoaderError::FlashError`].
pub(crate) fn flash_error<E: NorFlashError>(err: E) -> LoaderError {
    log::error!("Flash operation failed: {}", describe(err.kind()));
    LoaderError::FlashError
}

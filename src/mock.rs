//! In-memory flash device and processor used by the unit tests.

use std::{cell::Cell, vec::Vec};

use critical_section::RawRestoreState;

use embedded_storage::nor_flash::{
    check_erase, check_read, check_write, ErrorType, NorFlash, NorFlashErrorKind, ReadNorFlash,
};

use crate::{
    hardware::{processor::Processor, Layout, Region},
    image::{footer_address, ImageFooter},
    Address, Context,
};

std::thread_local! {
    static CRITICAL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Counts nesting instead of masking anything. Tests run on several threads, so the count is
/// kept per thread.
struct TestCriticalSection;
critical_section::set_impl!(TestCriticalSection);

// Safety: nothing is shared between threads, the count is thread local.
unsafe impl critical_section::Impl for TestCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        CRITICAL_DEPTH.with(|depth| depth.set(depth.get() + 1));
    }

    unsafe fn release(_token: RawRestoreState) {
        CRITICAL_DEPTH.with(|depth| depth.set(depth.get() - 1));
    }
}

/// How many critical sections the current thread is inside of.
pub fn critical_depth() -> usize {
    CRITICAL_DEPTH.with(|depth| depth.get())
}

pub const PAGE_SIZE: usize = 256;
const CAPACITY: usize = 12 * PAGE_SIZE;

/// Loader page, two protected pages, one commit log page and four pages per image.
pub fn layout() -> Layout {
    let page = PAGE_SIZE as Address;
    Layout {
        bootloader: Region::new(0, page),
        protected: [Region::new(page, page), Region::new(2 * page, page)],
        commit_log: Region::new(3 * page, page),
        image_a: Region::new(4 * page, 4 * page),
        image_b: Region::new(8 * page, 4 * page),
        flash_origin: 0x1000_0000,
    }
}

/// NOR semantics: erase sets bytes to `0xFF`, programming can only clear bits.
pub struct MockFlash {
    memory: Vec<u8>,
    reads: usize,
    writes: usize,
    erases: usize,
    fail_reads: bool,
    fail_writes: bool,
    fail_erases: bool,
}

impl MockFlash {
    pub fn new() -> Self {
        Self {
            memory: std::vec![0xFF; CAPACITY],
            reads: 0,
            writes: 0,
            erases: 0,
            fail_reads: false,
            fail_writes: false,
            fail_erases: false,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.memory
    }

    pub fn read_at(&self, address: Address, length: usize) -> Vec<u8> {
        let start = address as usize;
        self.memory[start..start + length].to_vec()
    }

    /// Set bytes directly, bypassing the controller and its counters.
    pub fn poke(&mut self, address: Address, data: &[u8]) {
        let start = address as usize;
        self.memory[start..start + data.len()].copy_from_slice(data);
    }

    pub fn corrupt(&mut self, address: Address) {
        self.memory[address as usize] ^= 0x01;
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn writes(&self) -> usize {
        self.writes
    }

    pub fn erases(&self) -> usize {
        self.erases
    }

    /// Every controller call so far, successful or not.
    pub fn accesses(&self) -> usize {
        self.reads + self.writes + self.erases
    }

    pub fn fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    pub fn fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn fail_erases(&mut self, fail: bool) {
        self.fail_erases = fail;
    }
}

impl ErrorType for MockFlash {
    type Error = NorFlashErrorKind;
}

impl ReadNorFlash for MockFlash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.reads += 1;
        if self.fail_reads {
            return Err(NorFlashErrorKind::Other);
        }
        check_read(self, offset, bytes.len())?;
        let start = offset as usize;
        bytes.copy_from_slice(&self.memory[start..start + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        CAPACITY
    }
}

impl NorFlash for MockFlash {
    const WRITE_SIZE: usize = 4;
    const ERASE_SIZE: usize = PAGE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert!(critical_depth() > 0, "flash erase outside a critical section");
        self.erases += 1;
        if self.fail_erases {
            return Err(NorFlashErrorKind::Other);
        }
        check_erase(self, from, to)?;
        self.memory[from as usize..to as usize].fill(0xFF);
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        assert!(critical_depth() > 0, "flash write outside a critical section");
        self.writes += 1;
        if self.fail_writes {
            return Err(NorFlashErrorKind::Other);
        }
        check_write(self, offset, bytes.len())?;
        let start = offset as usize;
        for (cell, value) in self.memory[start..start + bytes.len()].iter_mut().zip(bytes) {
            *cell &= *value;
        }
        Ok(())
    }
}

/// Place a payload and its footer into an image region without going through the controller.
pub fn install_image(flash: &mut MockFlash, region: Region, payload: &[u8]) {
    flash.poke(region.location, payload);
    flash.poke(
        footer_address(region),
        &ImageFooter::for_payload(payload).encode(),
    );
}

/// Payload and footer as one buffer, the way a host streams a complete image.
pub fn image_bytes(region: Region, payload: &[u8]) -> Vec<u8> {
    let mut bytes = std::vec![0xFF; region.size as usize];
    bytes[..payload.len()].copy_from_slice(payload);
    let footer = footer_address(region) - region.location;
    bytes[footer as usize..].copy_from_slice(&ImageFooter::for_payload(payload).encode());
    bytes
}

/// Hand-off and halt cannot return, so they panic with a recognisable message.
pub struct MockProcessor;

impl Processor for MockProcessor {
    fn setup(&mut self, _layout: &Layout) {}

    fn hand_off(&mut self, address: Address) -> ! {
        panic!("hand-off to 0x{:x}", address);
    }

    fn halt(&mut self) -> ! {
        panic!("halted");
    }
}

pub struct TestContext;

impl Context for TestContext {
    type Storage = MockFlash;
    type Processor = MockProcessor;
}

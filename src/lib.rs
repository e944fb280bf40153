#![no_std]

#[cfg(test)]
extern crate std;

pub mod boot;
pub mod error;
mod flash;
pub mod hardware;
pub mod image;
pub mod manager;
pub mod protected;
pub mod state;
pub mod version;

#[cfg(test)]
mod mock;

pub use embedded_storage;

use embedded_storage::nor_flash::NorFlash;
use hardware::processor::Processor;

// Address type in RAM or ROM
pub type Address = u32;

/// Hardware a loader instance operates on: the flash device holding every region and the
/// processor that performs the hand-off.
pub trait Context {
    type Storage: NorFlash;
    type Processor: Processor;
}

#[cfg(feature = "use-defmt")]
pub(crate) use defmt as log;

#[cfg(feature = "use-log")]
pub(crate) use logger_crate as log;

#[cfg(not(any(feature = "use-log", feature = "use-defmt")))]
pub(crate) mod log {
    macro_rules! info {
        ( $( $x:expr ),* ) => {{ $( let _ = &$x; )* }};
    }
    pub(crate) use info;
    macro_rules! trace {
        ( $( $x:expr ),* ) => {{ $( let _ = &$x; )* }};
    }
    pub(crate) use trace;
    macro_rules! error {
        ( $( $x:expr ),* ) => {{ $( let _ = &$x; )* }};
    }
    pub(crate) use error;
    macro_rules! warner {
        ( $( $x:expr ),* ) => {{ $( let _ = &$x; )* }};
    }
    pub(crate) use warner as warn;
}

use crate::hardware::LayoutError;

#[cfg(feature = "use-defmt")]
use defmt::Format;

/// Result of every loader operation that can fail. `Ok(())` is the "success" outcome.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderError {
    /// The image fails validation, or may not be committed yet
    ImageNotValid,
    /// The requested image is in use and cannot be erased
    ImageRunning,
    /// A download session is already active, or targets the requested image
    DownloadInProgress,
    /// The operation needs an active download session
    DownloadNotStarted,
    /// A bounds or alignment check failed, or the flash controller reported an error
    FlashError,
    /// A result that none of the above describes
    UnknownError,
}

impl LoaderError {
    /// Numeric result code as reported to the console front-end.
    pub const fn code(self) -> u8 {
        match self {
            LoaderError::ImageNotValid => 1,
            LoaderError::ImageRunning => 2,
            LoaderError::DownloadInProgress => 3,
            LoaderError::DownloadNotStarted => 4,
            LoaderError::FlashError => 5,
            LoaderError::UnknownError => 6,
        }
    }

    /// Inverse of [`result_code`]. Codes outside the table decode to `UnknownError`.
    pub const fn from_code(code: u8) -> Result<(), LoaderError> {
        match code {
            SUCCESS => Ok(()),
            1 => Err(LoaderError::ImageNotValid),
            2 => Err(LoaderError::ImageRunning),
            3 => Err(LoaderError::DownloadInProgress),
            4 => Err(LoaderError::DownloadNotStarted),
            5 => Err(LoaderError::FlashError),
            _ => Err(LoaderError::UnknownError),
        }
    }
}

/// Result code of a successful operation.
pub const SUCCESS: u8 = 0;

/// Flatten an operation result into its numeric result code.
pub fn result_code<T>(result: &Result<T, LoaderError>) -> u8 {
    match result {
        Ok(_) => SUCCESS,
        Err(err) => err.code(),
    }
}

/// Errors raised while constructing a loader instance.
#[cfg_attr(feature = "use-defmt", derive(Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// The layout does not fit the flash device
    Layout(LayoutError),
    /// The loader state names a running image that does not validate
    UntrustedState,
}

impl From<LayoutError> for InitError {
    fn from(err: LayoutError) -> Self {
        InitError::Layout(err)
    }
}

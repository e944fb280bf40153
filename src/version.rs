//! Loader version and build date, packed the way the console front-end reports them.

/// Decimal digits of a build-time string. Anything else yields 0.
const fn parse(digits: &str) -> u32 {
    let bytes = digits.as_bytes();
    let mut value: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        if !bytes[i].is_ascii_digit() {
            return 0;
        }
        value = value * 10 + (bytes[i] - b'0') as u32;
        i += 1;
    }
    value
}

pub const VERSION_MAJOR: u32 = parse(env!("CARGO_PKG_VERSION_MAJOR"));
pub const VERSION_MINOR: u32 = parse(env!("CARGO_PKG_VERSION_MINOR"));

pub const BUILD_YEAR: u32 = parse(env!("TWINBOOT_BUILD_YEAR"));
pub const BUILD_MONTH: u32 = parse(env!("TWINBOOT_BUILD_MONTH"));
pub const BUILD_DAY: u32 = parse(env!("TWINBOOT_BUILD_DAY"));

/// `major << 8 | minor`
pub const fn version() -> u32 {
    (VERSION_MAJOR & 0xFF) << 8 | (VERSION_MINOR & 0xFF)
}

/// `year << 16 | month << 8 | day`, with the year reduced to two digits.
pub const fn build_date() -> u32 {
    (BUILD_YEAR % 100) << 16 | (BUILD_MONTH & 0xFF) << 8 | (BUILD_DAY & 0xFF)
}

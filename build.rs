use chrono::{DateTime, Datelike, Utc};

fn main() {
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");

    let date = match std::env::var("SOURCE_DATE_EPOCH") {
        Ok(value) => value
            .parse::<i64>()
            .ok()
            .and_then(|seconds| DateTime::from_timestamp(seconds, 0))
            .unwrap_or_else(Utc::now),
        Err(_) => {
            // Stamp every rebuild of the crate, not only the first one.
            println!("cargo:rerun-if-changed=build.rs");
            println!("cargo:rerun-if-changed=src");
            Utc::now()
        }
    };

    println!("cargo:rustc-env=TWINBOOT_BUILD_YEAR={}", date.year());
    println!("cargo:rustc-env=TWINBOOT_BUILD_MONTH={}", date.month());
    println!("cargo:rustc-env=TWINBOOT_BUILD_DAY={}", date.day());
}

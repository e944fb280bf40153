use twinboot::{
    hardware::{Image, Layout, LinkerConfig, Region},
    image::FOOTER_SIZE,
    Address,
};

fn generate_linker_script(
    flash_origin: Address,
    flash_length: Address,
    ram_origin: Address,
    ram_length: Address,
    footer: Option<Address>,
) -> String {
    let mut script = format!(
        "
    MEMORY {{
        FLASH : ORIGIN = 0x{flash_origin:08x}, LENGTH = {flash_length}
        RAM : ORIGIN = 0x{ram_origin:08x}, LENGTH = {ram_length}
    }}
",
        flash_origin = flash_origin,
        flash_length = flash_length,
        ram_origin = ram_origin,
        ram_length = ram_length,
    );

    if let Some(footer) = footer {
        script.push_str(&format!(
            "
    _twinboot_footer_start = 0x{footer:08x};
    _twinboot_footer_size = {footer_size};
",
            footer = footer,
            footer_size = FOOTER_SIZE,
        ));
    }

    script
}

/// Memory layout for the loader itself.
pub fn generate_bootloader_script(layout: Layout, linker_config: LinkerConfig) -> String {
    let region = layout.bootloader;
    generate_linker_script(
        layout.flash_origin + region.location,
        region.size,
        linker_config.ram_origin,
        linker_config.ram_length,
        None,
    )
}

/// Memory layout for an application linked to run from `image`. The footer at the end of the
/// slot is kept out of `FLASH`.
pub fn generate_application_script(
    layout: Layout,
    linker_config: LinkerConfig,
    image: Image,
) -> String {
    let region: Region = layout.image(image);
    let payload = region.size - FOOTER_SIZE as Address;
    let origin = layout.flash_origin + region.location;

    generate_linker_script(
        origin,
        payload,
        linker_config.ram_origin,
        linker_config.ram_length,
        Some(origin + payload),
    )
}

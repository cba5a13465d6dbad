//! Demo loading a few in-memory assets through handles

use std::io::Cursor;

use asset_runtime::prelude::*;
use image::{ImageFormat, Rgba, RgbaImage};

const CONFIG: &str = "(max_pooled_per_kind: 64, complete_empty_batches: true, diagnostic_capacity: 16)";

fn checkerboard(size: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| {
        if (x / 4 + y / 4) % 2 == 0 {
            Rgba([255, 255, 255, 255])
        } else {
            Rgba([32, 32, 32, 255])
        }
    })
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

fn build_source() -> Result<MemorySource, image::ImageError> {
    let mut source = MemorySource::new();
    source.insert_bundled("hero", Texture::new(checkerboard(16)));
    source.insert_raw("tiles.png", encode_png(&checkerboard(32))?);
    source.insert_raw("motd.txt", b"Welcome back".to_vec());
    source.insert_external("stats.json", br#"{"hp": 12, "speed": 1.5}"#.to_vec());
    Ok(source)
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = HandleConfig::from_ron_str(CONFIG)?;
    let ctx = AssetContext::with_converters(config, ConverterRegistry::with_defaults());
    let manager = AssetManager::new(ctx, build_source()?);

    let sprite = manager.load_asset::<Sprite>("hero");
    let tiles = manager.load_asset::<Texture>("tiles.png");
    let motd = manager.load_asset_with::<String>("motd.txt", |handle| {
        if let Some(text) = handle.asset() {
            log::info!("Message of the day: {text}");
        }
    });

    let batch = manager.batch_load_asset_with(&["stats.json", "missing.ogg", "hero"], |members| {
        for member in members {
            log::info!("Batch member '{}' finished as {:?}", member.name(), member.state());
        }
    });

    // Members outlive the batch and are unloaded by the caller
    let members = batch.handlers();

    log::info!("{} loads pending", manager.pending_count());
    let delivered = manager.update();
    log::info!("Delivered {delivered} loads, batch is now {:?}", batch.state());

    if let Some(sprite) = sprite.asset() {
        log::info!(
            "Sprite rect {:?} pivot {:?}",
            sprite.rect().size,
            sprite.pivot()
        );
    }

    let texture = pollster::block_on(tiles.clone().into_future());
    if let Some(texture) = texture {
        log::info!("Decoded tiles.png at {}x{}", texture.width(), texture.height());
    }

    sprite.unload();
    tiles.unload();
    motd.unload();
    for member in members.iter().filter(|member| member.is_valid()) {
        member.unload();
    }
    log::info!("{} objects still loaded", manager.loaded().len());

    for diagnostic in manager.context().take_diagnostics() {
        log::info!("Diagnostic: {diagnostic}");
    }
    Ok(())
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Demo error: {}", e);
    }
}

//! Pixel-level canonicalization for player skins and capes.
//!
//! The renderer upstream only ever samples two fixed layouts: a 64x64 skin
//! atlas and a 64x32 cape frame. This crate turns whatever an image source
//! actually contains into those layouts:
//!
//! - modern square skins (64x64 and HD multiples) are normalized to 64x64,
//! - legacy 64x32 skins are upgraded by mirroring the right arm/leg boxes
//!   into the left-side slots introduced by the 64x64 format,
//! - capes arrive as 64x32 frames or legacy 22x17 images that get pasted
//!   into the canonical frame.
//!
//! Slim-vs-wide detection inspects the unused arm columns of the atlas and
//! is kept here so the viewer never reasons about pixel coordinates.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

/// Canonical skin atlas dimensions.
pub const SKIN_WIDTH: u32 = 64;
pub const SKIN_HEIGHT: u32 = 64;

/// Canonical cape frame dimensions.
pub const CAPE_WIDTH: u32 = 64;
pub const CAPE_HEIGHT: u32 = 32;

/// Legacy cape images as distributed by third-party hosts.
const LEGACY_CAPE_WIDTH: u32 = 22;
const LEGACY_CAPE_HEIGHT: u32 = 17;

#[derive(Debug, thiserror::Error)]
pub enum SkinError {
    #[error("unsupported skin dimensions {width}x{height} (expected 64x64, 64x32, or an HD multiple)")]
    UnsupportedSkinSize { width: u32, height: u32 },
    #[error("unsupported cape dimensions {width}x{height} (expected 64x32, 22x17, or an HD multiple)")]
    UnsupportedCapeSize { width: u32, height: u32 },
}

/// Normalizes a decoded skin into the canonical 64x64 atlas.
///
/// HD skins are downsampled with nearest filtering so hard pixel edges
/// survive; legacy 64x32 skins go through [`upgrade_legacy_skin`].
pub fn canonicalize_skin(source: &RgbaImage) -> Result<RgbaImage, SkinError> {
    let (width, height) = source.dimensions();

    if width == height && is_atlas_multiple(width) {
        if width == SKIN_WIDTH {
            return Ok(source.clone());
        }
        return Ok(imageops::resize(
            source,
            SKIN_WIDTH,
            SKIN_HEIGHT,
            FilterType::Nearest,
        ));
    }

    if width == height * 2 && is_atlas_multiple(width) {
        let legacy = if width == SKIN_WIDTH {
            source.clone()
        } else {
            imageops::resize(source, SKIN_WIDTH, SKIN_HEIGHT / 2, FilterType::Nearest)
        };
        return Ok(upgrade_legacy_skin(&legacy));
    }

    Err(SkinError::UnsupportedSkinSize { width, height })
}

/// Normalizes a decoded cape into the canonical 64x32 frame.
pub fn canonicalize_cape(source: &RgbaImage) -> Result<RgbaImage, SkinError> {
    let (width, height) = source.dimensions();

    if width == height * 2 && width % CAPE_WIDTH == 0 {
        if width == CAPE_WIDTH {
            return Ok(source.clone());
        }
        return Ok(imageops::resize(
            source,
            CAPE_WIDTH,
            CAPE_HEIGHT,
            FilterType::Nearest,
        ));
    }

    // Legacy capes cover only the 22x17 box region; paste them into an
    // otherwise transparent canonical frame.
    if width * LEGACY_CAPE_HEIGHT == height * LEGACY_CAPE_WIDTH {
        let legacy = if width == LEGACY_CAPE_WIDTH {
            source.clone()
        } else {
            imageops::resize(
                source,
                LEGACY_CAPE_WIDTH,
                LEGACY_CAPE_HEIGHT,
                FilterType::Nearest,
            )
        };
        let mut canonical = RgbaImage::from_pixel(CAPE_WIDTH, CAPE_HEIGHT, Rgba([0, 0, 0, 0]));
        imageops::overlay(&mut canonical, &legacy, 0, 0);
        return Ok(canonical);
    }

    Err(SkinError::UnsupportedCapeSize { width, height })
}

/// Detects the slim (3px-wide arm) model variant.
///
/// The wide arm's top face occupies x 50..54 at y 16..20; a slim skin leaves
/// the trailing columns fully transparent because its arm box is one pixel
/// narrower.
pub fn is_slim_skin(skin: &RgbaImage) -> bool {
    debug_assert_eq!(skin.dimensions(), (SKIN_WIDTH, SKIN_HEIGHT));
    area_transparent(skin, 50, 16, 2, 4)
}

fn area_transparent(image: &RgbaImage, x: u32, y: u32, w: u32, h: u32) -> bool {
    for py in y..y + h {
        for px in x..x + w {
            if image.get_pixel(px, py).0[3] != 0 {
                return false;
            }
        }
    }
    true
}

fn is_atlas_multiple(width: u32) -> bool {
    width >= SKIN_WIDTH && width % SKIN_WIDTH == 0
}

/// Upgrades a legacy 64x32 skin to the 64x64 layout.
///
/// The top half carries over untouched. The left arm and left leg slots the
/// new format adds are filled by mirroring the right-side boxes face by
/// face; plain region copies would put the outside of the limb on the wrong
/// side.
fn upgrade_legacy_skin(legacy: &RgbaImage) -> RgbaImage {
    let mut skin = RgbaImage::from_pixel(SKIN_WIDTH, SKIN_HEIGHT, Rgba([0, 0, 0, 0]));
    imageops::overlay(&mut skin, legacy, 0, 0);

    // Right leg box at (0, 16) -> left leg slot at (16, 48).
    mirror_limb(&mut skin, (0, 16), (16, 48));
    // Right arm box at (40, 16) -> left arm slot at (32, 48).
    mirror_limb(&mut skin, (40, 16), (32, 48));

    skin
}

/// Mirrors one 4x12x4 limb box into another box slot.
///
/// Face order within a box row: left, front, right, back; mirroring swaps
/// the left and right faces and flips every face horizontally.
fn mirror_limb(skin: &mut RgbaImage, src: (u32, u32), dst: (u32, u32)) {
    const W: u32 = 4; // limb width and depth
    const H: u32 = 12; // limb height

    let (sx, sy) = src;
    let (dx, dy) = dst;

    // Top and bottom faces sit above the side row.
    copy_flipped(skin, (sx + W, sy), (dx + W, dy), W, W);
    copy_flipped(skin, (sx + 2 * W, sy), (dx + 2 * W, dy), W, W);

    // Side faces: right face lands in the left slot and vice versa.
    copy_flipped(skin, (sx, sy + W), (dx + 2 * W, dy + W), W, H);
    copy_flipped(skin, (sx + W, sy + W), (dx + W, dy + W), W, H);
    copy_flipped(skin, (sx + 2 * W, sy + W), (dx, dy + W), W, H);
    copy_flipped(skin, (sx + 3 * W, sy + W), (dx + 3 * W, dy + W), W, H);
}

/// Copies a rectangle inside one image, flipping it horizontally.
fn copy_flipped(image: &mut RgbaImage, src: (u32, u32), dst: (u32, u32), w: u32, h: u32) {
    let (sx, sy) = src;
    let (dx, dy) = dst;
    for row in 0..h {
        for col in 0..w {
            let pixel = *image.get_pixel(sx + col, sy + row);
            image.put_pixel(dx + (w - 1 - col), dy + row, pixel);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]))
    }

    #[test]
    fn modern_skin_passes_through() {
        let skin = blank(64, 64);
        let canonical = canonicalize_skin(&skin).unwrap();
        assert_eq!(canonical.dimensions(), (64, 64));
    }

    #[test]
    fn hd_skin_downsamples() {
        let skin = blank(128, 128);
        let canonical = canonicalize_skin(&skin).unwrap();
        assert_eq!(canonical.dimensions(), (64, 64));
    }

    #[test]
    fn legacy_skin_upgrades_and_mirrors() {
        let mut legacy = blank(64, 32);
        // Mark the right arm's right face at (48, 20): after mirroring it
        // must land flipped in the left arm's left-face slot at (32, 52).
        legacy.put_pixel(48, 20, Rgba([255, 0, 0, 255]));
        let canonical = canonicalize_skin(&legacy).unwrap();
        assert_eq!(canonical.dimensions(), (64, 64));
        // Original pixel carries over.
        assert_eq!(canonical.get_pixel(48, 20).0, [255, 0, 0, 255]);
        // Mirrored: column 0 within a 4-wide face flips to column 3.
        assert_eq!(canonical.get_pixel(35, 52).0, [255, 0, 0, 255]);
    }

    #[test]
    fn rejects_odd_skin_dimensions() {
        let skin = blank(63, 41);
        assert!(matches!(
            canonicalize_skin(&skin),
            Err(SkinError::UnsupportedSkinSize {
                width: 63,
                height: 41
            })
        ));
    }

    #[test]
    fn slim_detection_reads_arm_columns() {
        let mut skin = blank(64, 64);
        assert!(is_slim_skin(&skin));
        skin.put_pixel(51, 17, Rgba([1, 2, 3, 255]));
        assert!(!is_slim_skin(&skin));
    }

    #[test]
    fn legacy_cape_pads_into_frame() {
        let mut cape = blank(22, 17);
        cape.put_pixel(1, 1, Rgba([0, 255, 0, 255]));
        let canonical = canonicalize_cape(&cape).unwrap();
        assert_eq!(canonical.dimensions(), (64, 32));
        assert_eq!(canonical.get_pixel(1, 1).0, [0, 255, 0, 255]);
        assert_eq!(canonical.get_pixel(40, 20).0[3], 0);
    }

    #[test]
    fn modern_cape_passes_through() {
        let cape = blank(64, 32);
        assert_eq!(canonicalize_cape(&cape).unwrap().dimensions(), (64, 32));
    }

    #[test]
    fn rejects_unknown_cape_dimensions() {
        let cape = blank(17, 22);
        assert!(canonicalize_cape(&cape).is_err());
    }
}

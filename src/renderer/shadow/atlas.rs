//! Tile layout for the single shadow atlas. The atlas is a square depth
//! texture partitioned into a grid of equal square tiles; each shadow view
//! renders into one tile via a viewport.

/// Pixel rectangle plus the normalized region used for sampling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AtlasRegion {
    pub x: u32,
    pub y: u32,
    pub size: u32,
    /// xy = uv offset, zw = uv scale.
    pub uv_offset_scale: [f32; 4],
}

#[derive(Clone, Copy, Debug)]
pub struct AtlasLayout {
    atlas_size: u32,
    tile_size: u32,
    tiles_per_row: u32,
}

impl AtlasLayout {
    pub fn new(atlas_size: u32, tile_size: u32) -> Self {
        debug_assert!(tile_size > 0 && atlas_size >= tile_size);
        Self {
            atlas_size,
            tile_size,
            tiles_per_row: atlas_size / tile_size,
        }
    }

    pub fn atlas_size(&self) -> u32 {
        self.atlas_size
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn capacity(&self) -> u32 {
        self.tiles_per_row * self.tiles_per_row
    }

    /// Texel size in uv units, for PCF offsets.
    pub fn texel_size(&self) -> f32 {
        1.0 / self.atlas_size as f32
    }

    pub fn region(&self, tile: u32) -> AtlasRegion {
        debug_assert!(tile < self.capacity());
        let col = tile % self.tiles_per_row;
        let row = tile / self.tiles_per_row;
        let x = col * self.tile_size;
        let y = row * self.tile_size;
        let scale = self.tile_size as f32 / self.atlas_size as f32;
        AtlasRegion {
            x,
            y,
            size: self.tile_size,
            uv_offset_scale: [
                x as f32 / self.atlas_size as f32,
                y as f32 / self.atlas_size as f32,
                scale,
                scale,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_is_the_full_grid() {
        let layout = AtlasLayout::new(4096, 512);
        assert_eq!(layout.capacity(), 64);
        assert_eq!(AtlasLayout::new(1024, 1024).capacity(), 1);
    }

    #[test]
    fn regions_tile_the_atlas_without_overlap() {
        let layout = AtlasLayout::new(1024, 256);
        let mut seen = std::collections::HashSet::new();
        for tile in 0..layout.capacity() {
            let region = layout.region(tile);
            assert!(region.x + region.size <= 1024);
            assert!(region.y + region.size <= 1024);
            assert!(seen.insert((region.x, region.y)));
        }
        assert_eq!(seen.len(), 16);
    }

    #[test]
    fn uv_region_matches_the_pixel_rect() {
        let layout = AtlasLayout::new(2048, 512);
        let region = layout.region(5);
        let [u, v, su, sv] = region.uv_offset_scale;
        assert_eq!(u * 2048.0, region.x as f32);
        assert_eq!(v * 2048.0, region.y as f32);
        assert_eq!(su, 0.25);
        assert_eq!(sv, 0.25);
    }
}

//! Rendered axis-aligned slice of the data region and its mask.

use std::path::Path;

use image::RgbaImage;

use crate::core::config::EngineConfig;
use crate::core::error::Error;
use crate::core::types::{Rgba, Result, TRANSPARENT};
use crate::mask::MaskLayer;
use crate::math::Axis;
use crate::volume::buffer::VolumeBuffer;
use crate::volume::region::Region;
use super::color::{self, map_value};
use super::grid::Grid2;
use super::labeler::{draw_borders, label_regions};

/// One slice of the active region, ready for a 2D image display.
///
/// Pixel `(u, v)` spans the slice's free axes (see [`Axis::free_axes`]).
/// The view remembers the generations it was built from; once either source
/// moves on it is stale and should be rebuilt.
#[derive(Clone, Debug)]
pub struct SliceView {
    axis: Axis,
    index: i32,
    values: Grid2<f32>,
    pixel_colors: Grid2<Rgba>,
    mask_values: Grid2<i16>,
    overlay: Grid2<Rgba>,
    data_generation: u64,
    mask_generation: Option<u64>,
}

impl SliceView {
    /// Cut slice `index` (1-based) perpendicular to `axis` out of the installed region.
    pub fn extract(
        data: &VolumeBuffer,
        mask: Option<&MaskLayer>,
        axis: Axis,
        index: i32,
        config: &EngineConfig,
    ) -> Result<Self> {
        let region = data.region().ok_or(Error::NoRegion)?;
        let mut view = Self::from_region(region, mask, axis, index, config)?;
        view.data_generation = data.generation();
        Ok(view)
    }

    /// Same as [`extract`](Self::extract) for a bare region, with data generation 0.
    pub fn from_region(
        region: &Region,
        mask: Option<&MaskLayer>,
        axis: Axis,
        index: i32,
        config: &EngineConfig,
    ) -> Result<Self> {
        let extent = region.extent();
        let len = extent[axis.index()];
        if index < 1 || index > len {
            return Err(Error::SliceOutOfRange { axis, index, len });
        }
        if let Some(layer) = mask {
            if layer.extent() != extent {
                return Err(Error::ShapeMismatch { expected: extent, actual: layer.extent() });
            }
        }

        let (h, v) = axis.free_axes();
        let (width, height) = (extent[h.index()], extent[v.index()]);
        let values = Grid2::from_fn(width, height, |u, w| region.value(axis.voxel_from_pixel(u, w, index)));

        let range = region.value_range().unwrap_or((0.0, 1.0));
        let pixel_colors = values.map(|x| map_value(x, range, config.scaling, config.color_map));

        let mut view = Self {
            axis,
            index,
            values,
            pixel_colors,
            mask_values: Grid2::filled(width, height, 0),
            overlay: Grid2::filled(width, height, TRANSPARENT),
            data_generation: 0,
            mask_generation: None,
        };
        if let Some(layer) = mask {
            view.refresh_mask(layer, config);
        }
        Ok(view)
    }

    /// Recompute the mask values and overlay only, keeping data colors.
    pub fn refresh_mask(&mut self, layer: &MaskLayer, config: &EngineConfig) {
        let (width, height) = (self.width(), self.height());
        self.mask_values = layer
            .slice(self.axis, self.index)
            .filter(|s| s.width() == width && s.height() == height)
            .unwrap_or_else(|| Grid2::filled(width, height, 0));

        let regions = label_regions(&self.mask_values.map(f32::from));
        let borders = draw_borders(
            &regions,
            &self.mask_values,
            layer.highlighted_source(),
            config.mask_color,
            config.highlight_color,
        );

        self.overlay = if config.mask_opacity > 0.0 {
            let fill = color::with_opacity(config.mask_color, config.mask_opacity);
            Grid2::from_fn(width, height, |u, v| {
                let border = borders.get(u, v).unwrap_or(TRANSPARENT);
                if border != TRANSPARENT {
                    border
                } else if self.mask_values.get(u, v).unwrap_or(0) != 0 {
                    fill
                } else {
                    TRANSPARENT
                }
            })
        } else {
            borders
        };
        self.mask_generation = Some(layer.generation());
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    pub fn width(&self) -> i32 {
        self.pixel_colors.width()
    }

    pub fn height(&self) -> i32 {
        self.pixel_colors.height()
    }

    /// Raw region values (NaN for blanks)
    pub fn values(&self) -> &Grid2<f32> {
        &self.values
    }

    pub fn pixel_colors(&self) -> &Grid2<Rgba> {
        &self.pixel_colors
    }

    /// Source ID per pixel, all zero without a mask
    pub fn mask_values(&self) -> &Grid2<i16> {
        &self.mask_values
    }

    /// Mask borders (and fill, if enabled) over a transparent background
    pub fn overlay(&self) -> &Grid2<Rgba> {
        &self.overlay
    }

    /// Data value under a pixel, NaN off the slice
    pub fn value_at(&self, u: i32, v: i32) -> f32 {
        self.values.get(u, v).unwrap_or(f32::NAN)
    }

    /// True once the data region or mask changed since this view was built
    pub fn is_stale(&self, data: &VolumeBuffer, mask: Option<&MaskLayer>) -> bool {
        self.data_generation != data.generation() || self.is_mask_stale(mask)
    }

    /// True if only the mask needs refreshing
    pub fn is_mask_stale(&self, mask: Option<&MaskLayer>) -> bool {
        self.mask_generation != mask.map(MaskLayer::generation)
    }

    /// Data colors as an image. Row `v = 1` is the bottom row.
    pub fn to_image(&self) -> RgbaImage {
        to_image(&self.pixel_colors)
    }

    /// Mask overlay as an image
    pub fn overlay_image(&self) -> RgbaImage {
        to_image(&self.overlay)
    }

    /// Overlay blended over the data colors
    pub fn composite(&self) -> RgbaImage {
        let blended = Grid2::from_fn(self.width(), self.height(), |u, v| {
            let base = self.pixel_colors.get(u, v).unwrap_or(TRANSPARENT);
            let top = self.overlay.get(u, v).unwrap_or(TRANSPARENT);
            color::blend(base, top)
        });
        to_image(&blended)
    }

    /// Write the composite image as PNG.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.composite().save_with_format(path, image::ImageFormat::Png)?;
        log::info!("Saved slice {:?}={} to {}", self.axis, self.index, path.display());
        Ok(())
    }
}

fn to_image(grid: &Grid2<Rgba>) -> RgbaImage {
    let (width, height) = (grid.width() as u32, grid.height() as u32);
    RgbaImage::from_fn(width, height, |x, y| {
        let u = x as i32 + 1;
        let v = (height - y) as i32;
        image::Rgba(grid.get(u, v).unwrap_or(TRANSPARENT))
    })
}
